// src/materials/world_state.rs
//! Cached copy of the terrain facts the material depends on.
//!
//! The terrain subsystem owns these values. The composer keeps a read-only
//! snapshot that is only ever replaced as a whole, so the assembler never sees
//! a region size without its matching vector.

use glam::IVec2;
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};

use crate::value::PropertyValue;

/// Regions per side of the region map.
pub const REGION_MAP_SIZE: u32 = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    pub region_size: i32,
    pub region_size_vector: IVec2,
    pub vertex_spacing: f32,
    pub texture_count: i32,
    /// `REGION_MAP_SIZE²` entries, non-zero where a region exists.
    pub region_map: Vec<i32>,
}

impl Default for WorldState {
    fn default() -> Self {
        Self::new(1024, 1.0, 0, vec![0; (REGION_MAP_SIZE * REGION_MAP_SIZE) as usize])
    }
}

impl WorldState {
    /// Builds a snapshot with the size vector derived from `region_size`.
    pub fn new(region_size: i32, vertex_spacing: f32, texture_count: i32, region_map: Vec<i32>) -> Self {
        Self {
            region_size,
            region_size_vector: IVec2::splat(region_size),
            vertex_spacing,
            texture_count,
            region_map,
        }
    }

    pub fn with_region_size(mut self, region_size: i32) -> Self {
        self.region_size = region_size;
        self.region_size_vector = IVec2::splat(region_size);
        self
    }

    pub fn with_texture_count(mut self, texture_count: i32) -> Self {
        self.texture_count = texture_count;
        self
    }

    pub fn with_region_map(mut self, region_map: Vec<i32>) -> Self {
        self.region_map = region_map;
        self
    }

    pub fn with_vertex_spacing(mut self, vertex_spacing: f32) -> Self {
        self.vertex_spacing = vertex_spacing;
        self
    }

    /// Values for the private `_region_*` / `_mesh_*` uniforms.
    pub fn uniforms(&self) -> Vec<(&'static str, PropertyValue)> {
        let pixel_size = if self.region_size != 0 {
            1.0 / self.region_size as f32
        } else {
            0.0
        };
        let density = if self.vertex_spacing != 0.0 {
            1.0 / self.vertex_spacing
        } else {
            0.0
        };
        vec![
            ("_region_size", PropertyValue::Float(self.region_size as f32)),
            ("_region_pixel_size", PropertyValue::Float(pixel_size)),
            ("_region_map_size", PropertyValue::Int(REGION_MAP_SIZE as i32)),
            ("_region_map", PropertyValue::IntArray(self.region_map.clone())),
            ("_mesh_vertex_spacing", PropertyValue::Float(self.vertex_spacing)),
            ("_mesh_vertex_density", PropertyValue::Float(density)),
        ]
    }
}

/// What a refresh changed, for deciding how much work follows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorldChange {
    pub region_size: bool,
    pub texture_count: bool,
    pub region_map: bool,
    pub vertex_spacing: bool,
}

impl WorldChange {
    /// Facts rendered into the shader header.
    pub fn is_structural(&self) -> bool {
        self.region_size || self.texture_count
    }

    pub fn any(&self) -> bool {
        self.region_size || self.texture_count || self.region_map || self.vertex_spacing
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorldStateMirror {
    current: WorldState,
}

impl WorldStateMirror {
    #[inline]
    pub fn get(&self) -> &WorldState {
        &self.current
    }

    /// Replaces the snapshot as a whole and reports what differs.
    pub fn refresh(&mut self, next: WorldState) -> WorldChange {
        let change = WorldChange {
            region_size: next.region_size != self.current.region_size
                || next.region_size_vector != self.current.region_size_vector,
            texture_count: next.texture_count != self.current.texture_count,
            region_map: next.region_map != self.current.region_map,
            vertex_spacing: next.vertex_spacing != self.current.vertex_spacing,
        };
        self.current = next;
        change
    }
}

/// Greyscale coverage mask: white where a region exists, scaled up to
/// `size × size` with triangle filtering. `None` if the map has the wrong
/// length.
pub fn region_blend_map(region_map: &[i32], size: u32) -> Option<GrayImage> {
    let n = REGION_MAP_SIZE;
    if region_map.len() != (n * n) as usize {
        log::error!(
            "region map has {} entries, expected {}",
            region_map.len(),
            n * n
        );
        return None;
    }

    let small = GrayImage::from_fn(n, n, |x, y| {
        let present = region_map[(y * n + x) as usize] > 0;
        Luma([if present { 255 } else { 0 }])
    });
    Some(imageops::resize(&small, size, size, FilterType::Triangle))
}
