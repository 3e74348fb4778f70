// src/materials/fragments.rs
//! Feature fragment library.
//!
//! Each property group owns one fragment of shader source. Fragments are always
//! present in the rendered header; the code inside them is switched on and off
//! by `#define` lines that are emitted from the current property values, so a
//! disabled feature's uniforms simply drop out of the active parameter set.
//!
//! Fragments render in group-declaration order. A fragment may test defines of
//! earlier groups, never later ones.

use crate::materials::catalog::{
    Catalog, FILL_FLAT, FILL_NOISE, FILTER_LINEAR, FILTER_NEAREST, NORMALS_BY_DISTANCE, NORMALS_PIXEL,
    NORMALS_VERTEX, OCEAN_BACKGROUND_INFINITE,
};
use crate::materials::property_store::PropertyStore;

/// Predicate over a single field, by global name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Condition {
    IsTrue(&'static str),
    Equals(&'static str, i32),
    AtLeast(&'static str, i32),
}

impl Condition {
    fn holds(&self, store: &PropertyStore) -> bool {
        match *self {
            Condition::IsTrue(field) => store.bool_value(field),
            Condition::Equals(field, v) => store.int_value(field) == Some(v),
            Condition::AtLeast(field, v) => store.int_value(field).is_some_and(|x| x >= v),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DefineRule {
    pub name: &'static str,
    pub when: Condition,
}

const fn rule(name: &'static str, when: Condition) -> DefineRule {
    DefineRule { name, when }
}

#[derive(Debug)]
pub struct FeatureFragment {
    pub group: &'static str,
    pub defines: &'static [DefineRule],
    pub source: &'static str,
}

/// The static parts of a material's shader.
#[derive(Debug)]
pub struct ShaderTemplate {
    /// `shader_type` / `render_mode` lines, emitted before the defines.
    pub preamble: &'static str,
    /// Shared declarations emitted before the fragments, including the
    /// private world uniforms.
    pub base_header: &'static str,
    /// Initial user-owned body, used until a previous source exists.
    pub body: &'static str,
}

/// Defines that hold for the current store, in group order. Groups whose
/// gate is closed contribute nothing.
pub fn active_defines(catalog: &Catalog, store: &PropertyStore) -> Vec<&'static str> {
    catalog
        .fragments
        .iter()
        .filter(|fragment| store.group_enabled(fragment.group).unwrap_or(false))
        .flat_map(|fragment| fragment.defines.iter())
        .filter(|rule| rule.when.holds(store))
        .map(|rule| rule.name)
        .collect()
}

/// Every define a catalog can emit, in group order.
pub fn known_defines(catalog: &Catalog) -> impl Iterator<Item = &'static str> + '_ {
    catalog
        .fragments
        .iter()
        .flat_map(|fragment| fragment.defines.iter().map(|rule| rule.name))
}

// ====================================================================================
// Terrain
// ====================================================================================

pub static TERRAIN_TEMPLATE: ShaderTemplate = ShaderTemplate {
    preamble: "shader_type spatial;\n\
render_mode blend_mix,depth_draw_opaque,cull_back,diffuse_burley,specular_schlick_ggx,skip_vertex_transform;\n",
    base_header: r#"
// Private uniforms, fed from the terrain world state.
uniform float _region_size = 1024.0;
uniform float _region_pixel_size = 0.0009765625;
uniform int _region_map_size = 16;
uniform int _region_map[256];
uniform float _mesh_vertex_spacing = 1.0;
uniform float _mesh_vertex_density = 1.0;
uniform sampler2D _region_blend_map : hint_default_black, filter_linear, repeat_disable;

uniform sampler2D _height_maps : repeat_disable;
uniform sampler2DArray _control_maps : repeat_disable;
uniform sampler2DArray _texture_array_albedo : source_color, repeat_enable;
uniform sampler2DArray _texture_array_normal : hint_normal, repeat_enable;

varying vec3 v_vertex;
varying float v_vertex_dist;

ivec3 get_region_uv(vec2 uv) {
	uv *= _region_pixel_size;
	ivec2 pos = ivec2(floor(uv)) + (_region_map_size / 2);
	int bounds = int(pos.x >= 0 && pos.x < _region_map_size && pos.y >= 0 && pos.y < _region_map_size);
	int layer_index = _region_map[pos.y * _region_map_size + pos.x] * bounds - 1;
	return ivec3(ivec2((uv - _region_pixel_size * 0.5) * _region_size) & int(_region_size - 1.0), layer_index);
}
"#,
    body: r#"
void vertex() {
	v_vertex = (MODEL_MATRIX * vec4(VERTEX, 1.0)).xyz;
	v_vertex_dist = length(VERTEX + VIEW_MATRIX[3].xyz);
	vec2 uv = v_vertex.xz * _mesh_vertex_density;
	ivec3 region = get_region_uv(uv);
	float h = region.z >= 0 ? texelFetch(_height_maps, region.xy, 0).r : 0.0;
#if defined(BG_WORLD_ENABLED) || defined(BG_FLAT_ENABLED)
	h = region.z >= 0 ? h : get_background_height(v_vertex.xz, v_vertex_dist);
#endif
	VERTEX.y = h;
	VERTEX = (VIEW_MATRIX * vec4(VERTEX, 1.0)).xyz;
	NORMAL = (VIEW_MATRIX * vec4(NORMAL, 0.0)).xyz;
}

void fragment() {
	vec2 uv = v_vertex.xz * _mesh_vertex_density;
	vec3 albedo = texture(_texture_array_albedo, vec3(uv, 0.0)).rgb;
	float roughness = 0.9;
#ifdef UV_DISTORTION_ENABLED
	uv = distort_uv(uv);
#endif
#ifdef AUTO_TEXTURING_ENABLED
	albedo = auto_texture(albedo, uv, NORMAL);
#endif
#ifdef MULTI_SCALING_ENABLED
	albedo = multi_scale(albedo, uv, v_vertex_dist);
#endif
#ifdef NOISE_TINT_ENABLED
	albedo *= noise_tint(uv, v_vertex_dist);
#endif
	ALBEDO = debug_albedo(albedo, uv);
	ROUGHNESS = roughness;
}
"#,
};

pub static TERRAIN_FRAGMENTS: [FeatureFragment; 8] = [
    FeatureFragment {
        group: "bg_world",
        defines: &[
            rule("BG_FLAT_ENABLED", Condition::Equals("bg_world_fill", FILL_FLAT)),
            rule("BG_WORLD_ENABLED", Condition::AtLeast("bg_world_fill", FILL_NOISE)),
        ],
        source: r#"
#if defined(BG_WORLD_ENABLED) || defined(BG_FLAT_ENABLED)
uniform int bg_world_fill;
uniform float bg_world_blend_near = 0.5;
uniform float bg_world_blend_far = 1.0;
#endif
#ifdef BG_WORLD_ENABLED
uniform int bg_world_max_octaves = 6;
uniform int bg_world_min_octaves = 3;
uniform float bg_world_lod_distance = 2500.0;
uniform float bg_world_scale = 5.0;
uniform float bg_world_height = 64.0;
uniform vec3 bg_world_offset;

float hashv2(vec2 v) {
	return fract(1e4 * sin(17.0 * v.x + v.y * 0.1) * (0.1 + abs(sin(v.y * 13.0 + v.x))));
}

vec3 noise2d(vec2 x) {
	vec2 f = fract(x);
	vec2 u = f * f * f * (f * (f * 6.0 - 15.0) + 10.0);
	vec2 du = 30.0 * f * f * (f * (f - 2.0) + 1.0);
	vec2 p = floor(x);
	float a = hashv2(p + vec2(0, 0));
	float b = hashv2(p + vec2(1, 0));
	float c = hashv2(p + vec2(0, 1));
	float d = hashv2(p + vec2(1, 1));
	float k1 = b - a;
	float k2 = c - a;
	float k3 = a - b - c + d;
	return vec3(a + k1 * u.x + k2 * u.y + k3 * u.x * u.y,
		du * (vec2(k1, k2) + k3 * u.yx));
}

float noise_type1(vec2 p, int octaves) {
	float a = 0.0;
	float b = 1.0;
	vec2 d = vec2(0.0);
	mat2 m = mat2(vec2(0.8, -0.6), vec2(0.6, 0.8));
	for (int i = 0; i < octaves; i++) {
		vec3 n = noise2d(p);
		d += n.yz;
		a += b * n.x / (1.0 + dot(d, d));
		b *= 0.5;
		p = m * p * 2.0;
	}
	return a;
}
#endif
#if defined(BG_WORLD_ENABLED) || defined(BG_FLAT_ENABLED)
float get_background_height(vec2 pos, float dist) {
#ifdef BG_WORLD_ENABLED
	int octaves = clamp(bg_world_max_octaves - int(floor(dist / bg_world_lod_distance)),
		bg_world_min_octaves, bg_world_max_octaves);
	pos += bg_world_offset.xz;
	vec2 uv = (pos + 16384.0) / 1024.0 - 16.0;
	return noise_type1(uv * bg_world_scale * 0.1, octaves) * bg_world_height * 10.0
		+ bg_world_offset.y * 100.0;
#else
	return 0.0;
#endif
}
#endif
"#,
    },
    FeatureFragment {
        group: "blending",
        defines: &[
            rule("TEXTURE_SAMPLERS_LINEAR", Condition::Equals("blending_texture_filtering", FILTER_LINEAR)),
            rule("TEXTURE_SAMPLERS_NEAREST", Condition::Equals("blending_texture_filtering", FILTER_NEAREST)),
            rule("HEIGHT_BLENDING_ENABLED", Condition::IsTrue("blending_by_height")),
        ],
        source: r#"
uniform float blending_sharpness : hint_range(0, 1) = 0.6;

float blend_weight(float weight, float height) {
#ifdef HEIGHT_BLENDING_ENABLED
	weight *= height;
#endif
	return smoothstep(0.5 - blending_sharpness * 0.5, 0.5 + blending_sharpness * 0.5, weight);
}
"#,
    },
    FeatureFragment {
        group: "normals",
        defines: &[
            rule("NORMALS_PER_PIXEL", Condition::Equals("normals_quality", NORMALS_PIXEL)),
            rule("NORMALS_PER_VERTEX", Condition::Equals("normals_quality", NORMALS_VERTEX)),
            rule("NORMALS_BY_DISTANCE", Condition::Equals("normals_quality", NORMALS_BY_DISTANCE)),
        ],
        source: r#"
#ifdef NORMALS_BY_DISTANCE
uniform float normals_distance = 128.0;
#endif

bool use_pixel_normals(float dist) {
#if defined(NORMALS_PER_PIXEL)
	return true;
#elif defined(NORMALS_BY_DISTANCE)
	return dist > normals_distance;
#else
	return false;
#endif
}
"#,
    },
    FeatureFragment {
        group: "tinting",
        defines: &[rule("NOISE_TINT_ENABLED", Condition::IsTrue("tinting_enabled"))],
        source: r#"
#ifdef NOISE_TINT_ENABLED
uniform sampler2D tinting_texture : hint_default_white, filter_linear_mipmap, repeat_enable;
uniform vec4 tinting_macro_variation1 : source_color;
uniform vec4 tinting_macro_variation2 : source_color;
uniform float tinting_noise1_scale = 0.5;
uniform float tinting_noise1_angle = 42.0;
uniform vec2 tinting_noise1_offset = vec2(0.37, 0.12);
uniform float tinting_noise2_scale = 0.36143;
uniform float tinting_noise3_scale = 0.23921;

vec3 noise_tint(vec2 uv, float dist) {
	float c = cos(tinting_noise1_angle);
	float s = sin(tinting_noise1_angle);
	vec2 uv1 = mat2(vec2(c, -s), vec2(s, c)) * uv * tinting_noise1_scale * 0.1 + tinting_noise1_offset;
	float n1 = texture(tinting_texture, uv1).r;
	float n2 = texture(tinting_texture, uv * tinting_noise2_scale * 0.1).r;
	vec3 tint = mix(vec3(1.0), tinting_macro_variation1.rgb, clamp(n1 + dist * 0.0002, 0.0, 1.0));
	return tint * mix(vec3(1.0), tinting_macro_variation2.rgb, n2);
}
#endif
"#,
    },
    FeatureFragment {
        group: "multi_scaling",
        defines: &[rule("MULTI_SCALING_ENABLED", Condition::IsTrue("multi_scaling_enabled"))],
        source: r#"
#ifdef MULTI_SCALING_ENABLED
uniform int multi_scaling_texture = 0;
uniform float multi_scaling_far = 800.0;
uniform float multi_scaling_near = 150.0;
uniform float multi_scaling_distant_size = 0.65;
uniform float multi_scaling_near_size = 0.5;

vec3 multi_scale(vec3 albedo, vec2 uv, float dist) {
	float layer = float(multi_scaling_texture);
	vec3 near_col = texture(_texture_array_albedo, vec3(uv * multi_scaling_near_size, layer)).rgb;
	vec3 far_col = texture(_texture_array_albedo, vec3(uv * multi_scaling_distant_size * 0.1, layer)).rgb;
	float t = smoothstep(multi_scaling_near, multi_scaling_far, dist);
	return mix(albedo, mix(near_col, far_col, t), 0.5);
}
#endif
"#,
    },
    FeatureFragment {
        group: "auto_texturing",
        defines: &[rule("AUTO_TEXTURING_ENABLED", Condition::IsTrue("auto_texturing_enabled"))],
        source: r#"
#ifdef AUTO_TEXTURING_ENABLED
uniform float auto_texturing_slope = 1.45;
uniform float auto_texturing_height_reduction = 0.0;
uniform int auto_texturing_base_texture = 0;
uniform int auto_texturing_overlay_texture = 1;

vec3 auto_texture(vec3 albedo, vec2 uv, vec3 normal) {
	float slope = clamp(normal.y * auto_texturing_slope - auto_texturing_height_reduction, 0.0, 1.0);
	vec3 base = texture(_texture_array_albedo, vec3(uv, float(auto_texturing_base_texture))).rgb;
	vec3 over = texture(_texture_array_albedo, vec3(uv, float(auto_texturing_overlay_texture))).rgb;
	return mix(base, over, blend_weight(slope, 1.0));
}
#endif
"#,
    },
    FeatureFragment {
        group: "uv_distortion",
        defines: &[rule("UV_DISTORTION_ENABLED", Condition::IsTrue("uv_distortion_enabled"))],
        source: r#"
#ifdef UV_DISTORTION_ENABLED
uniform float uv_distortion_size = 60.0;
uniform float uv_distortion_power = 30.0;

vec2 distort_uv(vec2 uv) {
	vec2 p = uv / uv_distortion_size;
	vec2 offset = vec2(sin(p.y * 6.2831), cos(p.x * 6.2831));
	return uv + offset * uv_distortion_power * 0.001;
}
#endif
"#,
    },
    FeatureFragment {
        group: "debug_view",
        defines: &[
            rule("DEBUG_CHECKERED", Condition::IsTrue("debug_view_checkered")),
            rule("DEBUG_GREY", Condition::IsTrue("debug_view_grey")),
            rule("DEBUG_HEIGHTMAP", Condition::IsTrue("debug_view_heightmap")),
            rule("DEBUG_COLORMAP", Condition::IsTrue("debug_view_colormap")),
            rule("DEBUG_ROUGHMAP", Condition::IsTrue("debug_view_roughmap")),
            rule("DEBUG_CONTROL_TEXTURE", Condition::IsTrue("debug_view_control_texture")),
            rule("DEBUG_CONTROL_BLEND", Condition::IsTrue("debug_view_control_blend")),
            rule("DEBUG_AUTOSHADER", Condition::IsTrue("debug_view_autoshader")),
            rule("DEBUG_HOLES", Condition::IsTrue("debug_view_holes")),
            rule("EDITOR_NAVIGATION", Condition::IsTrue("debug_view_navigation")),
            rule("DEBUG_TEXTURE_HEIGHT", Condition::IsTrue("debug_view_texture_height")),
            rule("DEBUG_TEXTURE_NORMAL", Condition::IsTrue("debug_view_texture_normal")),
            rule("DEBUG_TEXTURE_ROUGHNESS", Condition::IsTrue("debug_view_texture_rough")),
            rule("DEBUG_VERTEX_GRID", Condition::IsTrue("debug_view_vertex_grid")),
        ],
        source: r#"
vec3 debug_albedo(vec3 albedo, vec2 uv) {
#ifdef DEBUG_CHECKERED
	albedo = vec3(mod(floor(uv.x) + floor(uv.y), 2.0) * 0.5 + 0.25);
#endif
#ifdef DEBUG_GREY
	albedo = vec3(0.2);
#endif
#ifdef DEBUG_HEIGHTMAP
	albedo = vec3(clamp(v_vertex.y / 300.0, 0.0, 1.0));
#endif
#ifdef DEBUG_VERTEX_GRID
	vec2 grid = step(vec2(0.95), fract(v_vertex.xz * _mesh_vertex_density));
	albedo = mix(albedo, vec3(0.5), max(grid.x, grid.y));
#endif
#ifdef EDITOR_NAVIGATION
	albedo = mix(albedo, vec3(0.6, 0.0, 1.0), 0.3);
#endif
	return albedo;
}
"#,
    },
];

// ====================================================================================
// Ocean
// ====================================================================================

pub static OCEAN_TEMPLATE: ShaderTemplate = ShaderTemplate {
    preamble: "shader_type spatial;\nrender_mode blend_mix,depth_draw_opaque,cull_back,specular_schlick_ggx;\n",
    base_header: r#"
uniform float _region_size = 1024.0;
uniform float _region_pixel_size = 0.0009765625;
uniform int _region_map_size = 16;
uniform int _region_map[256];
uniform float _mesh_vertex_spacing = 1.0;
uniform float _mesh_vertex_density = 1.0;
uniform sampler2D _region_blend_map : hint_default_black, filter_linear, repeat_disable;

uniform vec4 water_color : source_color = vec4(0.05, 0.2, 0.3, 1.0);
"#,
    body: r#"
void fragment() {
	float coverage = texture(_region_blend_map, UV).r;
#ifndef WORLD_BACKGROUND_INFINITE
	if (coverage < 0.01) {
		discard;
	}
#endif
	ALBEDO = water_color.rgb;
	ROUGHNESS = 0.05;
}
"#,
};

pub static OCEAN_FRAGMENTS: [FeatureFragment; 1] = [FeatureFragment {
    group: "world",
    defines: &[rule(
        "WORLD_BACKGROUND_INFINITE",
        Condition::Equals("world_background", OCEAN_BACKGROUND_INFINITE),
    )],
    source: "",
}];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materials::catalog::{FILL_NONE, TERRAIN};
    use crate::value::PropertyValue;

    #[test]
    fn test_default_defines() {
        let store = PropertyStore::new(&TERRAIN).unwrap();
        assert_eq!(
            active_defines(&TERRAIN, &store),
            vec!["BG_FLAT_ENABLED", "TEXTURE_SAMPLERS_LINEAR", "NORMALS_BY_DISTANCE"]
        );
    }

    #[test]
    fn test_defines_follow_group_order() {
        let mut store = PropertyStore::new(&TERRAIN).unwrap();
        store.set("debug_view_grey", PropertyValue::Bool(true)).unwrap();
        store.set("auto_texturing_enabled", PropertyValue::Bool(true)).unwrap();
        store.set("bg_world_fill", PropertyValue::Int(FILL_NOISE)).unwrap();
        let defines = active_defines(&TERRAIN, &store);
        assert_eq!(
            defines,
            vec![
                "BG_WORLD_ENABLED",
                "TEXTURE_SAMPLERS_LINEAR",
                "NORMALS_BY_DISTANCE",
                "AUTO_TEXTURING_ENABLED",
                "DEBUG_GREY",
            ]
        );
    }

    #[test]
    fn test_closed_gate_emits_nothing() {
        let mut store = PropertyStore::new(&TERRAIN).unwrap();
        store.set("bg_world_fill", PropertyValue::Int(FILL_NONE)).unwrap();
        let defines = active_defines(&TERRAIN, &store);
        assert!(!defines.iter().any(|d| d.starts_with("BG_")));
    }

    #[test]
    fn test_known_defines_are_unique() {
        let all: Vec<_> = known_defines(&TERRAIN).collect();
        let mut dedup = all.clone();
        dedup.sort_unstable();
        dedup.dedup();
        assert_eq!(all.len(), dedup.len());
        assert_eq!(all.len(), 26);
    }
}
