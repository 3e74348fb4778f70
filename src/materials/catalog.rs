// src/materials/catalog.rs
//
// Declarative field tables for the managed material properties.
//
// Every property group is one static array of `FieldDescriptor`s. The store,
// the dispatcher and the inspector listing are generic over these tables, so
// adding a field means adding one row here (plus its uniform in the fragment
// library when it is shader-visible).
//
// Global property name = `group + "_" + field`, which is also the uniform name
// for fields that declare one.

use std::collections::HashSet;

use glam::{Vec2, Vec3, Vec4};

use crate::context::OptionContext;
use crate::error::{Error, Result};
use crate::materials::fragments::{
    Condition, FeatureFragment, ShaderTemplate, OCEAN_FRAGMENTS, OCEAN_TEMPLATE,
    TERRAIN_FRAGMENTS, TERRAIN_TEMPLATE,
};
use crate::value::PropertyValue;

// ═══════════════════════════════════════════════════════════════════════════════
// Section 1 — Descriptor Types
// ═══════════════════════════════════════════════════════════════════════════════

/// How a write to a field reaches the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateKind {
    /// Changes which code paths exist: re-render, recompile, replay.
    Structural,
    /// Consumed by an already-declared uniform: push the one value.
    ValueOnly,
}

/// Editor hint for a field. Ranges are advisory and never enforced.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Hint {
    None,
    Range { min: f32, max: f32, step: f32 },
    Variants(&'static [&'static str]),
}

/// What decides whether a group counts as enabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupGate {
    Always,
    /// Local name of a bool field in the same group.
    Flag(&'static str),
    /// Local name of an enum field; the group is off while it holds `off`.
    EnumNot { field: &'static str, off: i32 },
}

#[derive(Debug)]
pub struct FieldDescriptor {
    pub name: &'static str,
    /// Human label, used in log lines ("Sharpness: 0.8").
    pub label: &'static str,
    pub default: PropertyValue,
    pub update: UpdateKind,
    /// Whether the field's value is declared as a shader uniform.
    pub uniform: bool,
    pub hint: Hint,
}

impl FieldDescriptor {
    pub const fn value(
        name: &'static str,
        label: &'static str,
        default: PropertyValue,
        hint: Hint,
    ) -> Self {
        Self {
            name,
            label,
            default,
            update: UpdateKind::ValueOnly,
            uniform: true,
            hint,
        }
    }

    pub const fn structural(
        name: &'static str,
        label: &'static str,
        default: PropertyValue,
        hint: Hint,
    ) -> Self {
        Self {
            name,
            label,
            default,
            update: UpdateKind::Structural,
            uniform: false,
            hint,
        }
    }

    /// Structural field whose value is also pushed as a uniform once the
    /// rebuilt shader declares it.
    pub const fn structural_uniform(
        name: &'static str,
        label: &'static str,
        default: PropertyValue,
        hint: Hint,
    ) -> Self {
        Self {
            name,
            label,
            default,
            update: UpdateKind::Structural,
            uniform: true,
            hint,
        }
    }

    const fn toggle(name: &'static str, label: &'static str) -> Self {
        Self::structural(name, label, PropertyValue::Bool(false), Hint::None)
    }
}

#[derive(Debug)]
pub struct GroupDescriptor {
    pub name: &'static str,
    pub title: &'static str,
    pub gate: GroupGate,
    pub help: &'static str,
    pub fields: &'static [FieldDescriptor],
}

/// A complete material definition: groups, the fragments they drive, and the
/// static template those fragments are spliced into.
#[derive(Debug)]
pub struct Catalog {
    pub name: &'static str,
    pub groups: &'static [GroupDescriptor],
    pub fragments: &'static [FeatureFragment],
    pub template: &'static ShaderTemplate,
}

impl Catalog {
    pub fn group(&self, name: &str) -> Option<&'static GroupDescriptor> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Every field in declaration order with its global name.
    pub fn fields(&self) -> impl Iterator<Item = (String, &'static GroupDescriptor, &'static FieldDescriptor)> + '_ {
        self.groups.iter().flat_map(|g| {
            g.fields
                .iter()
                .map(move |f| (global_name(g.name, f.name), g, f))
        })
    }

    /// Checks the tables for duplicate global names and dangling references
    /// from gates and define rules.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for (name, group, field) in self.fields() {
            if !seen.insert(name.clone()) {
                return Err(Error::DuplicateProperty(name));
            }
            if let Hint::Variants(variants) = field.hint {
                crate::ensure!(
                    matches!(field.default, PropertyValue::Int(v) if v >= 0 && (v as usize) < variants.len()),
                    "default of '{}' in group '{}' is not a valid variant",
                    name,
                    group.name
                );
            }
        }

        for group in self.groups {
            match group.gate {
                GroupGate::Always => {}
                GroupGate::Flag(field) | GroupGate::EnumNot { field, .. } => {
                    crate::ensure!(
                        group.fields.iter().any(|f| f.name == field),
                        "group '{}' is gated on missing field '{}'",
                        group.name,
                        field
                    );
                }
            }
        }

        for fragment in self.fragments {
            self.group(fragment.group).with_context(|| {
                format!("fragment references unknown group '{}'", fragment.group)
            })?;
            for rule in fragment.defines {
                let field = match rule.when {
                    Condition::IsTrue(f) | Condition::Equals(f, _) | Condition::AtLeast(f, _) => f,
                };
                crate::ensure!(
                    seen.contains(field),
                    "define {} depends on unknown field '{}'",
                    rule.name,
                    field
                );
            }
        }
        Ok(())
    }
}

pub fn global_name(group: &str, field: &str) -> String {
    format!("{group}_{field}")
}

// ═══════════════════════════════════════════════════════════════════════════════
// Section 2 — Enumerations
// ═══════════════════════════════════════════════════════════════════════════════

pub const WORLD_FILL_VARIANTS: &[&str] = &["None", "Flat", "Noise"];
pub const FILL_NONE: i32 = 0;
pub const FILL_FLAT: i32 = 1;
pub const FILL_NOISE: i32 = 2;

pub const TEXTURE_FILTERING_VARIANTS: &[&str] = &["Linear", "Nearest"];
pub const FILTER_LINEAR: i32 = 0;
pub const FILTER_NEAREST: i32 = 1;

pub const NORMAL_QUALITY_VARIANTS: &[&str] = &["Pixel", "Vertex", "By_Distance"];
pub const NORMALS_PIXEL: i32 = 0;
pub const NORMALS_VERTEX: i32 = 1;
pub const NORMALS_BY_DISTANCE: i32 = 2;

pub const OCEAN_BACKGROUND_VARIANTS: &[&str] = &["None", "Infinite"];
pub const OCEAN_BACKGROUND_INFINITE: i32 = 1;

const fn range(min: f32, max: f32, step: f32) -> Hint {
    Hint::Range { min, max, step }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Section 3 — Terrain Groups
// ═══════════════════════════════════════════════════════════════════════════════

static BG_WORLD_FIELDS: [FieldDescriptor; 9] = [
    FieldDescriptor::structural_uniform("fill", "Fill", PropertyValue::Int(FILL_FLAT), Hint::Variants(WORLD_FILL_VARIANTS)),
    FieldDescriptor::value("max_octaves", "Max Octaves", PropertyValue::Int(6), range(0.0, 15.0, 1.0)),
    FieldDescriptor::value("min_octaves", "Min Octaves", PropertyValue::Int(3), range(0.0, 15.0, 1.0)),
    FieldDescriptor::value("lod_distance", "LOD Distance", PropertyValue::Float(2500.0), range(0.0, 40000.0, 1.0)),
    FieldDescriptor::value("scale", "Scale", PropertyValue::Float(5.0), range(0.25, 20.0, 0.01)),
    FieldDescriptor::value("height", "Height", PropertyValue::Float(64.0), range(0.0, 1000.0, 0.1)),
    FieldDescriptor::value("offset", "Offset", PropertyValue::Vec3(Vec3::ZERO), Hint::None),
    FieldDescriptor::value("blend_near", "Blend Near", PropertyValue::Float(0.5), range(0.0, 0.95, 0.01)),
    FieldDescriptor::value("blend_far", "Blend Far", PropertyValue::Float(1.0), range(0.05, 1.0, 0.01)),
];

static BLENDING_FIELDS: [FieldDescriptor; 3] = [
    FieldDescriptor::value("sharpness", "Sharpness", PropertyValue::Float(0.6), range(0.001, 0.999, 0.001)),
    FieldDescriptor::structural("texture_filtering", "Filtering", PropertyValue::Int(FILTER_LINEAR), Hint::Variants(TEXTURE_FILTERING_VARIANTS)),
    FieldDescriptor::structural("by_height", "Height Blending Enabled", PropertyValue::Bool(false), Hint::None),
];

static NORMALS_FIELDS: [FieldDescriptor; 2] = [
    FieldDescriptor::structural("quality", "Quality", PropertyValue::Int(NORMALS_BY_DISTANCE), Hint::Variants(NORMAL_QUALITY_VARIANTS)),
    FieldDescriptor::value("distance", "Distance", PropertyValue::Float(128.0), range(0.0, 1024.0, 1.0)),
];

static TINTING_FIELDS: [FieldDescriptor; 9] = [
    FieldDescriptor::structural("enabled", "Enabled", PropertyValue::Bool(false), Hint::None),
    FieldDescriptor::structural_uniform("texture", "Texture", PropertyValue::Texture(None), Hint::None),
    FieldDescriptor::value(
        "macro_variation1",
        "Color #1",
        PropertyValue::Color(Vec4::new(159.0 / 255.0, 204.0 / 255.0, 159.0 / 255.0, 1.0)),
        Hint::None,
    ),
    FieldDescriptor::value(
        "macro_variation2",
        "Color #2",
        PropertyValue::Color(Vec4::new(171.0 / 255.0, 139.0 / 255.0, 114.0 / 255.0, 1.0)),
        Hint::None,
    ),
    FieldDescriptor::value("noise1_scale", "Phase 1 Scale", PropertyValue::Float(0.5), range(0.001, 1.0, 0.001)),
    FieldDescriptor::value("noise1_angle", "Phase 1 Angle", PropertyValue::Float(42.0), range(0.25, 20.0, 0.01)),
    FieldDescriptor::value("noise1_offset", "Phase 1 Offset", PropertyValue::Vec2(Vec2::new(0.37, 0.12)), Hint::None),
    FieldDescriptor::value("noise2_scale", "Phase 2 Scale", PropertyValue::Float(0.36143), range(0.001, 1.0, 0.001)),
    FieldDescriptor::value("noise3_scale", "Phase 3 Scale", PropertyValue::Float(0.23921), range(0.001, 1.0, 0.001)),
];

static MULTI_SCALING_FIELDS: [FieldDescriptor; 6] = [
    FieldDescriptor::structural("enabled", "Enabled", PropertyValue::Bool(false), Hint::None),
    FieldDescriptor::value("texture", "Texture ID", PropertyValue::Int(0), range(0.0, 31.0, 1.0)),
    FieldDescriptor::value("far", "Far Range", PropertyValue::Float(800.0), range(0.0, 1000.0, 0.1)),
    FieldDescriptor::value("near", "Near Range", PropertyValue::Float(150.0), range(0.0, 1000.0, 0.1)),
    FieldDescriptor::value("distant_size", "Distant Size", PropertyValue::Float(0.65), range(0.001, 1.0, 0.001)),
    FieldDescriptor::value("near_size", "Near Size", PropertyValue::Float(0.5), range(0.001, 1.0, 0.001)),
];

static AUTO_TEXTURING_FIELDS: [FieldDescriptor; 5] = [
    FieldDescriptor::structural("enabled", "Enabled", PropertyValue::Bool(false), Hint::None),
    FieldDescriptor::value("slope", "Slope", PropertyValue::Float(1.45), range(0.01, 10.0, 0.01)),
    FieldDescriptor::value("height_reduction", "Height Reduction", PropertyValue::Float(0.0), range(-0.5, 1.0, 0.01)),
    FieldDescriptor::value("base_texture", "Base Texture", PropertyValue::Int(0), range(0.0, 31.0, 1.0)),
    FieldDescriptor::value("overlay_texture", "Overlay Texture", PropertyValue::Int(1), range(0.0, 31.0, 1.0)),
];

static UV_DISTORTION_FIELDS: [FieldDescriptor; 3] = [
    FieldDescriptor::structural("enabled", "Enabled", PropertyValue::Bool(false), Hint::None),
    FieldDescriptor::value("size", "Size", PropertyValue::Float(60.0), range(0.001, 100.0, 0.01)),
    FieldDescriptor::value("power", "Power", PropertyValue::Float(30.0), range(0.001, 100.0, 0.01)),
];

static DEBUG_VIEW_FIELDS: [FieldDescriptor; 14] = [
    FieldDescriptor::toggle("checkered", "Checkered"),
    FieldDescriptor::toggle("grey", "Grey"),
    FieldDescriptor::toggle("heightmap", "Heightmap"),
    FieldDescriptor::toggle("colormap", "Colormap"),
    FieldDescriptor::toggle("roughmap", "Roughmap"),
    FieldDescriptor::toggle("control_texture", "Control Texture"),
    FieldDescriptor::toggle("control_blend", "Control Blend"),
    FieldDescriptor::toggle("autoshader", "Autoshader"),
    FieldDescriptor::toggle("holes", "Holes"),
    FieldDescriptor::toggle("navigation", "Navigation"),
    FieldDescriptor::toggle("texture_height", "Texture Height"),
    FieldDescriptor::toggle("texture_normal", "Texture Normal"),
    FieldDescriptor::toggle("texture_rough", "Texture Rough"),
    FieldDescriptor::toggle("vertex_grid", "Vertex Grid"),
];

static TERRAIN_GROUPS: [GroupDescriptor; 8] = [
    GroupDescriptor {
        name: "bg_world",
        title: "Background World",
        gate: GroupGate::EnumNot { field: "fill", off: FILL_NONE },
        help: r"
A background world of rolling hills, plains and mountains can be generated
automatically around the terrain. Adjust the overall size of the landforms,
their maximum height, a height and position offset, and how detailed they are
with the min/max octaves settings. Raising octaves too far impacts frame rate.
",
        fields: &BG_WORLD_FIELDS,
    },
    GroupDescriptor {
        name: "blending",
        title: "Blending",
        gate: GroupGate::Always,
        help: r"
Sharpness: affects how quickly materials change between layers. Auto texturing
and multi-scaling are strongly influenced by this setting.

Texture Filtering: linear mip-mapping by default. Nearest gives a pixelated,
chunky look up close and is slightly faster.

By Height: blends materials by the height stored in each albedo alpha channel,
so higher areas of one show through lower portions of the other.
",
        fields: &BLENDING_FIELDS,
    },
    GroupDescriptor {
        name: "normals",
        title: "Mesh Normals",
        gate: GroupGate::Always,
        help: r"
How the surface normal is calculated trades quality against speed. Per-pixel
gives the highest quality, per-vertex is the fastest. By distance uses
per-vertex close to the camera, where the mesh is dense, and per-pixel beyond.

Distance sets the vertex/pixel switch-over range for the by distance option.
",
        fields: &NORMALS_FIELDS,
    },
    GroupDescriptor {
        name: "tinting",
        title: "Tinting",
        gate: GroupGate::Flag("enabled"),
        help: r"
Adds a two-tone tint to the ground as it approaches the camera. The noise 1
settings place and size macro variation 1, noise 2 does the same for macro
variation 2, and noise 3 adds variation to height blending. The tint colors
multiply the terrain albedo, so keep them close to pastels or white.
",
        fields: &TINTING_FIELDS,
    },
    GroupDescriptor {
        name: "multi_scaling",
        title: "Multi-Scaling",
        gate: GroupGate::Flag("enabled"),
        help: r"
Selects one texture id that is sampled at two scales depending on camera
distance, e.g. a rock texture that is detailed up close and still covers far
away mountains. The two scales blend together between near and far.
",
        fields: &MULTI_SCALING_FIELDS,
    },
    GroupDescriptor {
        name: "auto_texturing",
        title: "Auto Texturing",
        gate: GroupGate::Flag("enabled"),
        help: r"
Selects two texture ids that are applied automatically based on slope.
",
        fields: &AUTO_TEXTURING_FIELDS,
    },
    GroupDescriptor {
        name: "uv_distortion",
        title: "UV Distortion",
        gate: GroupGate::Flag("enabled"),
        help: r"
Shifts texture coordinates per vertex by a position-based noise. Size and power
control the effect.

At small sizes power has a much stronger effect and can look overly distorted.
",
        fields: &UV_DISTORTION_FIELDS,
    },
    GroupDescriptor {
        name: "debug_view",
        title: "Debug Views",
        gate: GroupGate::Always,
        help: r"
Alternate albedo outputs for inspecting the terrain. Checkered is switched on
automatically while the texture list is empty.

Vertex grid overlays the mesh vertices on top of any other view. Navigation
shows the area used to generate the navigation mesh.
",
        fields: &DEBUG_VIEW_FIELDS,
    },
];

/// The terrain material catalog.
pub static TERRAIN: Catalog = Catalog {
    name: "terrain",
    groups: &TERRAIN_GROUPS,
    fragments: &TERRAIN_FRAGMENTS,
    template: &TERRAIN_TEMPLATE,
};

// ═══════════════════════════════════════════════════════════════════════════════
// Section 4 — Ocean Groups
// ═══════════════════════════════════════════════════════════════════════════════

static OCEAN_WORLD_FIELDS: [FieldDescriptor; 1] = [FieldDescriptor::structural(
    "background",
    "World Background",
    PropertyValue::Int(0),
    Hint::Variants(OCEAN_BACKGROUND_VARIANTS),
)];

static OCEAN_GROUPS: [GroupDescriptor; 1] = [GroupDescriptor {
    name: "world",
    title: "World",
    gate: GroupGate::Always,
    help: r"
Infinite extends the ocean surface past the loaded regions to the horizon.
",
    fields: &OCEAN_WORLD_FIELDS,
}];

/// The ocean material catalog.
pub static OCEAN: Catalog = Catalog {
    name: "ocean",
    groups: &OCEAN_GROUPS,
    fragments: &OCEAN_FRAGMENTS,
    template: &OCEAN_TEMPLATE,
};
