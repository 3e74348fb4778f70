// src/background.rs
//! CPU-side sampling of the generated background world.
//!
//! Mirrors the `bg_world` shader fragment so gameplay code (collision, camera
//! clamping) can ask for the height the GPU draws outside the sculpted
//! regions. The noise is Inigo Quilez' gradient value noise with analytic
//! derivatives: quintic fade, four hashed tile corners, and a fixed rotation
//! between octaves.

use glam::{IVec2, Mat2, Vec2, Vec3};

use crate::materials::property_store::PropertyStore;

/// World units covered by one background noise tile.
const TILE: f32 = 1024.0;
/// Offset that moves the world origin to the middle of the 32x32 tile grid.
const ORIGIN_OFFSET: f32 = 16.0 * TILE;

/// Integer-lattice hash in `[0, 1)`.
#[inline]
pub fn ihashv2(iv: IVec2) -> f32 {
    let x = iv.x.wrapping_mul(17) as f32 + iv.y as f32 * 0.1;
    let y = iv.y.wrapping_mul(13) as f32 + iv.x as f32;
    let h = 1e4 * x.sin() * (y.sin().abs() + 0.1);
    h - h.floor()
}

/// Value noise at `x` plus its partial derivatives: `(value, d/dx, d/dy)`.
pub fn noise2d(x: Vec2) -> Vec3 {
    let f = x - x.floor();
    let f2 = f * f;
    let u = f2 * f * (f * (f * 6.0 - 15.0) + 10.0);
    let du = 30.0 * f2 * (f * (f - 2.0) + 1.0);

    let p = x.floor().as_ivec2();
    let a = ihashv2(p);
    let b = ihashv2(p + IVec2::new(1, 0));
    let c = ihashv2(p + IVec2::new(0, 1));
    let d = ihashv2(p + IVec2::new(1, 1));

    let k1 = b - a;
    let k2 = c - a;
    let k3 = a - b - c + d;
    let deriv = du * (Vec2::new(k1, k2) + k3 * Vec2::new(u.y, u.x));
    Vec3::new(a + k1 * u.x + k2 * u.y + k3 * u.x * u.y, deriv.x, deriv.y)
}

/// Fractal sum of `octaves` layers of [`noise2d`], damped by accumulated slope.
pub fn noise_type1(mut p: Vec2, octaves: i32) -> f32 {
    // columns (0.8, -0.6) and (0.6, 0.8)
    let m = Mat2::from_cols(Vec2::new(0.8, -0.6), Vec2::new(0.6, 0.8));
    let mut a = 0.0;
    let mut b = 1.0;
    let mut d = Vec2::ZERO;
    for _ in 0..octaves.max(0) {
        let n = noise2d(p);
        d += Vec2::new(n.y, n.z);
        a += b * n.x / (1.0 + d.dot(d));
        b *= 0.5;
        p = m * p * 2.0;
    }
    a
}

/// Background-world parameters, read from the `bg_world_*` properties.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BgWorldParams {
    pub max_octaves: i32,
    pub min_octaves: i32,
    pub lod_distance: f32,
    pub scale: f32,
    pub height: f32,
    pub offset: Vec3,
}

impl Default for BgWorldParams {
    fn default() -> Self {
        Self {
            max_octaves: 6,
            min_octaves: 3,
            lod_distance: 2500.0,
            scale: 5.0,
            height: 64.0,
            offset: Vec3::ZERO,
        }
    }
}

impl BgWorldParams {
    /// Reads the current values from a terrain store. Missing fields keep
    /// their defaults, so an ocean store yields [`BgWorldParams::default`].
    pub fn from_store(store: &PropertyStore) -> Self {
        let defaults = Self::default();
        Self {
            max_octaves: store.int_value("bg_world_max_octaves").unwrap_or(defaults.max_octaves),
            min_octaves: store.int_value("bg_world_min_octaves").unwrap_or(defaults.min_octaves),
            lod_distance: store.float_value("bg_world_lod_distance").unwrap_or(defaults.lod_distance),
            scale: store.float_value("bg_world_scale").unwrap_or(defaults.scale),
            height: store.float_value("bg_world_height").unwrap_or(defaults.height),
            offset: store
                .get("bg_world_offset")
                .ok()
                .and_then(|v| v.as_vec3())
                .unwrap_or(defaults.offset),
        }
    }

    /// Octave count for a sample `distance` away from the camera. Drops one
    /// octave per `lod_distance`, bounded by the min/max settings.
    pub fn octaves_by_distance(&self, distance: f32) -> i32 {
        let lod = if self.lod_distance > 0.0 {
            (distance / self.lod_distance).floor()
        } else {
            0.0
        };
        let octaves = self.max_octaves as f32 - lod;
        // max then min: never panics when min > max
        octaves.max(self.min_octaves as f32).min(self.max_octaves as f32) as i32
    }

    /// Height of the generated background at `world_pos` (y ignored).
    pub fn generated_height(&self, world_pos: Vec3, octaves: i32) -> f32 {
        let pos = world_pos + self.offset;
        let uv = Vec2::new(
            (pos.x + ORIGIN_OFFSET) / TILE - 16.0,
            (pos.z + ORIGIN_OFFSET) / TILE - 16.0,
        );
        noise_type1(uv * self.scale * 0.1, octaves) * (self.height * 10.0) + self.offset.y * 100.0
    }
}
