// src/materials/composer.rs
//! Material composer: property surface, update dispatch, override handling.
//!
//! Every successful mutating call performs exactly one dispatch and says which
//! one in its [`DispatchReport`]:
//!
//! - **Rebuild**: render the header (generated mode only), upload the
//!   effective source, rescan the active parameter set, then replay every
//!   persisted value the new source declares.
//! - **Pushed**: one uniform written in place on the live material.
//! - **Deferred**: nothing reached the backend (uniform not declared, no
//!   backend attached, or a structural field while the override is in force).
//!   The value is still recorded and replays on the next rebuild.
//!
//! Writes are not compared against the stored value before dispatch. A write
//! of the current value still triggers its rebuild or push.

use std::fmt;

use crate::backend::{MaterialHandle, ParamStatus, RenderBackend, ShaderHandle};
use crate::background::BgWorldParams;
use crate::config::ComposerConfig;
use crate::error::{Error, Result, Warning};
use crate::materials::assembler::{fingerprint, render, render_header, splice_header, ShaderSource};
use crate::materials::catalog::{Catalog, UpdateKind, OCEAN, TERRAIN};
use crate::materials::override_ctl::{
    OverrideController, OverrideState, OVERRIDE_HELP, OVERRIDE_HELP_TOPIC,
};
use crate::materials::parameters::{ActiveParameterSet, PersistedParameterSet};
use crate::materials::property_store::{format_inline_help, GroupInfo, PropertyInfo, PropertyStore};
use crate::materials::snapshot::MaterialSnapshot;
use crate::materials::world_state::{region_blend_map, WorldState, WorldStateMirror};
use crate::value::{PropertyValue, TextureRef, ValueKind};

/// Field forced on when the terrain has no textures.
const CHECKERED_FIELD: &str = "debug_view_checkered";
/// Private uniform holding the region coverage texture.
const BLEND_MAP_UNIFORM: &str = "_region_blend_map";

// ====================================================================================
// Dispatch reporting
// ====================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    /// The live source does not declare the uniform.
    UniformInactive,
    /// Structural field written while the override source is in force.
    OverrideActive,
    /// Override source stored while the override is disabled.
    OverrideDisabled,
    BackendUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Source re-rendered and uploaded; `pushed` values were replayed.
    Rebuild { pushed: usize },
    /// One uniform updated in place.
    Pushed { uniform: String },
    /// World uniforms pushed without a rebuild.
    WorldUniforms { pushed: usize },
    Deferred { reason: DeferReason },
}

impl Dispatch {
    #[inline]
    pub fn is_rebuild(&self) -> bool {
        matches!(self, Dispatch::Rebuild { .. })
    }

    #[inline]
    pub fn is_deferred(&self) -> bool {
        matches!(self, Dispatch::Deferred { .. })
    }
}

impl fmt::Display for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dispatch::Rebuild { pushed } => write!(f, "rebuild ({pushed} replayed)"),
            Dispatch::Pushed { uniform } => write!(f, "push {uniform}"),
            Dispatch::WorldUniforms { pushed } => write!(f, "world uniforms ({pushed} pushed)"),
            Dispatch::Deferred { reason } => write!(f, "deferred ({reason:?})"),
        }
    }
}

/// What a mutating call did.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReport {
    pub dispatch: Dispatch,
    /// Whether the stored value differs from what it was before the call.
    pub changed: bool,
    pub warnings: Vec<Warning>,
}

impl DispatchReport {
    fn new(dispatch: Dispatch, changed: bool, warnings: Vec<Warning>) -> Self {
        for warning in &warnings {
            log::warn!("{warning}");
        }
        Self {
            dispatch,
            changed,
            warnings,
        }
    }
}

// ====================================================================================
// Composer
// ====================================================================================

struct Live<B> {
    backend: B,
    shader: ShaderHandle,
    material: MaterialHandle,
    /// Fingerprint of the source the backend last accepted.
    fingerprint: Option<u64>,
    blend_map: Option<TextureRef>,
}

pub struct MaterialComposer<B: RenderBackend> {
    config: ComposerConfig,
    store: PropertyStore,
    world: WorldStateMirror,
    generated: ShaderSource,
    override_ctl: OverrideController,
    active: ActiveParameterSet,
    persisted: PersistedParameterSet,
    live: Option<Live<B>>,
}

impl<B: RenderBackend> MaterialComposer<B> {
    /// Creates a composer with every field at its default. Nothing touches a
    /// backend until [`attach_backend`](Self::attach_backend).
    pub fn new(catalog: &'static Catalog, config: ComposerConfig) -> Result<Self> {
        let store = PropertyStore::new(catalog)?;
        let world = WorldStateMirror::default();
        let generated = render(catalog, &store, world.get(), None, config.inject_editor_block);
        let active = ActiveParameterSet::from_source(&generated.text());
        let persisted = seed_persisted(&store, world.get());

        log::debug!(
            "{} material: {} properties, {} active uniforms",
            catalog.name,
            store.iter().count(),
            active.len()
        );

        Ok(Self {
            config,
            store,
            world,
            generated,
            override_ctl: OverrideController::new(),
            active,
            persisted,
            live: None,
        })
    }

    pub fn terrain(config: ComposerConfig) -> Result<Self> {
        Self::new(&TERRAIN, config)
    }

    pub fn ocean(config: ComposerConfig) -> Result<Self> {
        Self::new(&OCEAN, config)
    }

    // ---------------------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------------------

    #[inline]
    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    #[inline]
    pub fn catalog(&self) -> &'static Catalog {
        self.store.catalog()
    }

    #[inline]
    pub fn store(&self) -> &PropertyStore {
        &self.store
    }

    #[inline]
    pub fn world(&self) -> &WorldState {
        self.world.get()
    }

    /// Last generated source. Not refreshed while the override is enabled.
    #[inline]
    pub fn generated_source(&self) -> &ShaderSource {
        &self.generated
    }

    #[inline]
    pub fn active_parameters(&self) -> &ActiveParameterSet {
        &self.active
    }

    #[inline]
    pub fn persisted_parameters(&self) -> &PersistedParameterSet {
        &self.persisted
    }

    pub fn backend(&self) -> Option<&B> {
        self.live.as_ref().map(|l| &l.backend)
    }

    pub fn shader_handle(&self) -> Option<ShaderHandle> {
        self.live.as_ref().map(|l| l.shader)
    }

    pub fn material_handle(&self) -> Option<MaterialHandle> {
        self.live.as_ref().map(|l| l.material)
    }

    pub fn blend_map(&self) -> Option<TextureRef> {
        self.live.as_ref().and_then(|l| l.blend_map)
    }

    /// Background-world parameters for CPU height queries.
    pub fn background(&self) -> BgWorldParams {
        BgWorldParams::from_store(&self.store)
    }

    // ---------------------------------------------------------------------------------
    // Property surface
    // ---------------------------------------------------------------------------------

    pub fn get_property(&self, name: &str) -> Result<&PropertyValue> {
        self.store.get(name)
    }

    /// Validates, stores, and dispatches a write. Rejected writes change
    /// nothing and never reach the backend.
    pub fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<DispatchReport> {
        let applied = self.store.set(name, value)?;
        self.dispatch_field(name, applied.changed)
    }

    /// Resets a field to its default. Dispatches like a write; returns the
    /// value held before the call.
    pub fn revert_property(&mut self, name: &str) -> Result<(PropertyValue, DispatchReport)> {
        let previous = self.store.revert(name)?;
        let changed = self.store.get(name)? != &previous;
        let report = self.dispatch_field(name, changed)?;
        Ok((previous, report))
    }

    pub fn can_revert(&self, name: &str) -> Result<bool> {
        self.store.can_revert(name)
    }

    pub fn list_properties(&self, group: Option<&str>) -> Result<Vec<PropertyInfo>> {
        self.store.list(group)
    }

    pub fn groups(&self) -> Vec<GroupInfo> {
        self.store.groups()
    }

    pub fn group_enabled(&self, group: &str) -> Result<bool> {
        self.store.group_enabled(group)
    }

    /// Inline help for a group, or for the override toggle under
    /// `shader_override`.
    pub fn help_topic(&self, topic: &str) -> Option<String> {
        if topic == OVERRIDE_HELP_TOPIC {
            return Some(format_inline_help(OVERRIDE_HELP));
        }
        self.catalog().group(topic).map(|g| format_inline_help(g.help))
    }

    fn dispatch_field(&mut self, name: &str, changed: bool) -> Result<DispatchReport> {
        let value = self.store.get(name)?.clone();
        let (_, field) = self.store.descriptor(name)?;
        log::debug!("{}: {}", field.label, value);

        if field.uniform {
            self.persisted.record(name, value.clone());
        }

        let (dispatch, warnings) = match field.update {
            UpdateKind::ValueOnly => self.push_value(name, &value),
            UpdateKind::Structural if self.override_ctl.is_enabled() => {
                if field.uniform && self.active.contains(name) {
                    self.push_value(name, &value)
                } else {
                    (
                        Dispatch::Deferred {
                            reason: DeferReason::OverrideActive,
                        },
                        Vec::new(),
                    )
                }
            }
            UpdateKind::Structural => self.rebuild(),
        };
        Ok(DispatchReport::new(dispatch, changed, warnings))
    }

    // ---------------------------------------------------------------------------------
    // Custom shader parameters
    // ---------------------------------------------------------------------------------

    /// Writes a uniform that only the live source declares (typically an
    /// override). Catalog names are routed through [`set_property`](Self::set_property).
    pub fn set_shader_param(&mut self, name: &str, value: PropertyValue) -> Result<DispatchReport> {
        if self.store.contains(name) {
            return self.set_property(name, value);
        }
        let decl = self
            .active
            .get(name)
            .filter(|d| !d.is_private())
            .ok_or_else(|| Error::UnknownProperty(name.to_string()))?;

        let is_sampler = decl.type_name.starts_with("sampler");
        match (is_sampler, value.kind()) {
            (false, ValueKind::Texture) => {
                return Err(Error::InvalidTextureFormat(format!(
                    "'{name}' is declared as {}, not a sampler",
                    decl.type_name
                )))
            }
            (true, kind) if kind != ValueKind::Texture => {
                return Err(Error::TypeMismatch {
                    name: name.to_string(),
                    expected: ValueKind::Texture,
                    got: kind,
                })
            }
            _ => {}
        }

        let changed = self.persisted.get(name) != Some(&value);
        log::debug!("{name}: {value}");
        self.persisted.record(name, value.clone());
        let (dispatch, warnings) = self.push_value(name, &value);
        Ok(DispatchReport::new(dispatch, changed, warnings))
    }

    /// Last value written to a live custom uniform, `None` if never written.
    pub fn shader_param(&self, name: &str) -> Result<Option<&PropertyValue>> {
        if self.store.contains(name) {
            return self.store.get(name).map(Some);
        }
        if !self.active.contains(name) {
            return Err(Error::UnknownProperty(name.to_string()));
        }
        Ok(self.persisted.get(name))
    }

    // ---------------------------------------------------------------------------------
    // Override
    // ---------------------------------------------------------------------------------

    #[inline]
    pub fn override_state(&self) -> OverrideState {
        self.override_ctl.state()
    }

    #[inline]
    pub fn override_buffer(&self) -> &str {
        self.override_ctl.buffer()
    }

    /// Turns the override on or off and rebuilds with the resulting source.
    /// Disabling renders a fresh generated source from current properties.
    pub fn enable_override(&mut self, enabled: bool) -> DispatchReport {
        let was = self.override_ctl.is_enabled();
        let state = if enabled {
            self.override_ctl.enable(&self.generated.text())
        } else {
            self.override_ctl.disable()
        };
        log::info!("{} material: shader override {:?}", self.catalog().name, state);
        let (dispatch, warnings) = self.rebuild();
        DispatchReport::new(dispatch, was != enabled, warnings)
    }

    /// Stores override source. Takes effect immediately while the override
    /// is enabled; otherwise it is kept for the next enable.
    pub fn set_override_source(&mut self, text: &str) -> DispatchReport {
        let before = self.override_ctl.buffer().to_string();
        let state = self.override_ctl.set_source(text, &self.generated.text());
        let changed = before != self.override_ctl.buffer();
        log::debug!("override source set ({} bytes), {:?}", text.len(), state);

        if !self.override_ctl.is_enabled() {
            return DispatchReport::new(
                Dispatch::Deferred {
                    reason: DeferReason::OverrideDisabled,
                },
                changed,
                Vec::new(),
            );
        }
        let (dispatch, warnings) = self.rebuild();
        DispatchReport::new(dispatch, changed, warnings)
    }

    /// The source in force: the override buffer while enabled, otherwise the
    /// generated source.
    pub fn effective_shader_source(&self) -> String {
        let generated = self.generated.text();
        self.override_ctl.effective(&generated).to_string()
    }

    /// Puts a freshly rendered header on the override buffer, keeping its
    /// body. In generated mode this is a plain rebuild.
    pub fn regenerate_override_header(&mut self) -> DispatchReport {
        if !self.override_ctl.is_enabled() {
            let (dispatch, warnings) = self.rebuild();
            return DispatchReport::new(dispatch, false, warnings);
        }

        let header = render_header(
            self.catalog(),
            &self.store,
            self.world.get(),
            self.config.inject_editor_block,
        );
        let (spliced, warning) = splice_header(header, self.override_ctl.buffer());
        let text = spliced.text();
        let changed = text != self.override_ctl.buffer();
        self.override_ctl.replace_buffer(text);

        let (dispatch, mut warnings) = self.rebuild();
        warnings.extend(warning);
        DispatchReport::new(dispatch, changed, warnings)
    }

    // ---------------------------------------------------------------------------------
    // World state
    // ---------------------------------------------------------------------------------

    /// Replaces the cached world snapshot. Header-affecting changes rebuild
    /// (generated mode only); the private world uniforms are always pushed
    /// and the region blend map is regenerated when the region map changed.
    pub fn refresh_world_state(&mut self, next: WorldState) -> DispatchReport {
        let change = self.world.refresh(next);
        if change.texture_count && self.store.contains(CHECKERED_FIELD) {
            let checkered = self.world.get().texture_count == 0;
            if let Err(e) = self.store.set(CHECKERED_FIELD, PropertyValue::Bool(checkered)) {
                log::warn!("could not update {CHECKERED_FIELD}: {e}");
            }
        }

        for (name, value) in self.world.get().uniforms() {
            self.persisted.record(name, value);
        }

        let mut warnings = Vec::new();
        if change.region_map || self.blend_map().is_none() {
            self.upload_blend_map(&mut warnings);
        }

        let dispatch = if change.is_structural() && !self.override_ctl.is_enabled() {
            let (dispatch, rebuild_warnings) = self.rebuild();
            warnings.extend(rebuild_warnings);
            dispatch
        } else {
            self.push_world_uniforms(&mut warnings)
        };
        DispatchReport::new(dispatch, change.any(), warnings)
    }

    fn push_world_uniforms(&mut self, warnings: &mut Vec<Warning>) -> Dispatch {
        let Some(live) = self.live.as_mut() else {
            return Dispatch::Deferred {
                reason: DeferReason::BackendUnavailable,
            };
        };
        let mut pushed = 0;
        for (name, value) in self.world.get().uniforms() {
            if !self.active.contains(name) {
                continue;
            }
            match live.backend.set_material_param(live.material, name, &value) {
                ParamStatus::Ok => pushed += 1,
                ParamStatus::UnknownParam => warnings.push(Warning::ParamRejected(name.to_string())),
            }
        }
        Dispatch::WorldUniforms { pushed }
    }

    /// Builds the coverage texture for the current region map and swaps it
    /// in, destroying the previous one. Recorded for replay.
    fn upload_blend_map(&mut self, warnings: &mut Vec<Warning>) {
        if !self.config.generate_blend_map {
            return;
        }
        let Some(live) = self.live.as_mut() else {
            return;
        };
        let Some(image) = region_blend_map(&self.world.get().region_map, self.config.blend_map_size)
        else {
            return;
        };

        let texture = live.backend.create_texture(&image);
        if let Some(old) = live.blend_map.replace(texture) {
            live.backend.destroy_texture(old);
        }
        let value = PropertyValue::Texture(Some(texture));
        self.persisted.record(BLEND_MAP_UNIFORM, value.clone());
        if self.active.contains(BLEND_MAP_UNIFORM)
            && live.backend.set_material_param(live.material, BLEND_MAP_UNIFORM, &value)
                == ParamStatus::UnknownParam
        {
            warnings.push(Warning::ParamRejected(BLEND_MAP_UNIFORM.to_string()));
        }
        log::debug!("region blend map uploaded as {texture}");
    }

    // ---------------------------------------------------------------------------------
    // Backend lifecycle
    // ---------------------------------------------------------------------------------

    /// Creates the shader and material on `backend`, uploads the effective
    /// source and replays every persisted value. A previously attached
    /// backend is detached (and dropped) first.
    pub fn attach_backend(&mut self, mut backend: B) -> DispatchReport {
        if self.live.is_some() {
            log::warn!("replacing attached render backend");
            let _ = self.detach_backend();
        }
        let shader = backend.create_shader();
        let material = backend.create_material(shader);
        self.live = Some(Live {
            backend,
            shader,
            material,
            fingerprint: None,
            blend_map: None,
        });
        log::info!(
            "{} material attached (shader {:?}, material {:?})",
            self.catalog().name,
            shader,
            material
        );

        let (dispatch, mut warnings) = self.rebuild();
        self.upload_blend_map(&mut warnings);
        DispatchReport::new(dispatch, true, warnings)
    }

    /// Destroys the backend resources and hands the backend back.
    pub fn detach_backend(&mut self) -> Option<B> {
        let mut live = self.live.take()?;
        if let Some(texture) = live.blend_map.take() {
            live.backend.destroy_texture(texture);
            self.persisted.record(BLEND_MAP_UNIFORM, PropertyValue::Texture(None));
        }
        live.backend.destroy_material(live.material);
        live.backend.destroy_shader(live.shader);
        log::info!("{} material detached", self.catalog().name);
        Some(live.backend)
    }

    // ---------------------------------------------------------------------------------
    // Save / restore
    // ---------------------------------------------------------------------------------

    pub fn save(&self) -> MaterialSnapshot {
        let shader_params = self
            .persisted
            .iter()
            .filter(|(name, _)| !name.starts_with('_') && !self.store.contains(name))
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        MaterialSnapshot {
            catalog: self.catalog().name.to_string(),
            values: self
                .store
                .iter()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect(),
            override_enabled: self.override_ctl.is_enabled(),
            override_source: if self.override_ctl.is_authored() {
                self.override_ctl.buffer().to_string()
            } else {
                String::new()
            },
            shader_params,
        }
    }

    /// Applies a snapshot without per-field dispatch, then rebuilds once.
    /// Unknown or invalid entries are skipped with a warning log. The
    /// persisted set is recomputed from the restored store, the world
    /// snapshot and the saved custom uniforms; earlier custom writes are
    /// dropped.
    pub fn restore(&mut self, snapshot: &MaterialSnapshot) -> DispatchReport {
        if !snapshot.catalog.is_empty() && snapshot.catalog != self.catalog().name {
            log::warn!(
                "restoring a '{}' snapshot into a '{}' material",
                snapshot.catalog,
                self.catalog().name
            );
        }

        let mut changed = false;
        for (name, value) in &snapshot.values {
            match self.store.set(name, value.clone()) {
                Ok(applied) => changed |= applied.changed,
                Err(e) => log::warn!("skipping saved property: {e}"),
            }
        }

        let mut persisted = seed_persisted(&self.store, self.world.get());
        for (name, value) in &snapshot.shader_params {
            persisted.record(name, value.clone());
        }
        if let Some(texture) = self.blend_map() {
            persisted.record(BLEND_MAP_UNIFORM, PropertyValue::Texture(Some(texture)));
        }
        changed |= persisted != self.persisted;
        self.persisted = persisted;

        changed |= self.override_ctl.is_enabled() != snapshot.override_enabled
            || self.override_ctl.buffer() != snapshot.override_source;
        self.override_ctl =
            OverrideController::with_buffer(snapshot.override_enabled, snapshot.override_source.clone());
        self.regenerate();
        if self.override_ctl.is_enabled() && !self.override_ctl.is_authored() {
            self.override_ctl.enable(&self.generated.text());
        }

        let (dispatch, warnings) = self.rebuild();
        DispatchReport::new(dispatch, changed, warnings)
    }

    // ---------------------------------------------------------------------------------
    // Dispatch internals
    // ---------------------------------------------------------------------------------

    fn regenerate(&mut self) {
        self.generated = render(
            self.store.catalog(),
            &self.store,
            self.world.get(),
            Some(&self.generated),
            self.config.inject_editor_block,
        );
    }

    /// Renders (generated mode), uploads and replays.
    fn rebuild(&mut self) -> (Dispatch, Vec<Warning>) {
        if !self.override_ctl.is_enabled() {
            self.regenerate();
        }
        let source = self.effective_shader_source();
        self.active = ActiveParameterSet::from_source(&source);

        let Some(live) = self.live.as_mut() else {
            return (Dispatch::Rebuild { pushed: 0 }, vec![Warning::BackendUnavailable]);
        };

        let hash = fingerprint(&source);
        if self.config.skip_identical_sources && live.fingerprint == Some(hash) {
            log::debug!("shader source unchanged, upload skipped");
        } else {
            match live.backend.set_shader_source(live.shader, &source) {
                Ok(()) => live.fingerprint = Some(hash),
                Err(e) => {
                    return (
                        Dispatch::Rebuild { pushed: 0 },
                        vec![Warning::ShaderRejected(e.to_string())],
                    )
                }
            }
        }

        let mut warnings = Vec::new();
        let mut pushed = 0;
        for (name, value) in self.persisted.replay(&self.active) {
            match live.backend.set_material_param(live.material, name, value) {
                ParamStatus::Ok => pushed += 1,
                ParamStatus::UnknownParam => warnings.push(Warning::ParamRejected(name.to_string())),
            }
        }
        (Dispatch::Rebuild { pushed }, warnings)
    }

    fn push_value(&mut self, name: &str, value: &PropertyValue) -> (Dispatch, Vec<Warning>) {
        if !self.active.contains(name) {
            return (
                Dispatch::Deferred {
                    reason: DeferReason::UniformInactive,
                },
                Vec::new(),
            );
        }
        let Some(live) = self.live.as_mut() else {
            return (
                Dispatch::Deferred {
                    reason: DeferReason::BackendUnavailable,
                },
                Vec::new(),
            );
        };
        let warnings = match live.backend.set_material_param(live.material, name, value) {
            ParamStatus::Ok => Vec::new(),
            ParamStatus::UnknownParam => vec![Warning::ParamRejected(name.to_string())],
        };
        (
            Dispatch::Pushed {
                uniform: name.to_string(),
            },
            warnings,
        )
    }
}

/// Every catalog uniform at its current value plus the private world uniforms.
fn seed_persisted(store: &PropertyStore, world: &WorldState) -> PersistedParameterSet {
    let mut persisted = PersistedParameterSet::new();
    for (name, value) in store.uniform_values() {
        persisted.record(name, value.clone());
    }
    for (name, value) in world.uniforms() {
        persisted.record(name, value);
    }
    persisted
}

impl<B: RenderBackend> Drop for MaterialComposer<B> {
    fn drop(&mut self) {
        self.detach_backend();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCall, InMemoryBackend};
    use crate::materials::assembler::HEADER_END_MARK;
    use crate::materials::catalog::{FILL_NOISE, OCEAN_BACKGROUND_INFINITE};
    use glam::Vec4;

    fn attached() -> (MaterialComposer<InMemoryBackend>, InMemoryBackend) {
        let backend = InMemoryBackend::new();
        let probe = backend.clone();
        let mut composer = MaterialComposer::terrain(ComposerConfig::default()).unwrap();
        composer.attach_backend(backend);
        probe.clear_calls();
        (composer, probe)
    }

    #[test]
    fn test_value_write_pushes_without_rebuild() {
        let (mut composer, probe) = attached();
        let report = composer
            .set_property("blending_sharpness", PropertyValue::Float(0.8))
            .unwrap();
        assert_eq!(
            report.dispatch,
            Dispatch::Pushed {
                uniform: "blending_sharpness".into()
            }
        );
        assert!(report.changed);
        assert_eq!(probe.rebuild_count(), 0);
        assert_eq!(
            probe.pushes(),
            vec![("blending_sharpness".to_string(), PropertyValue::Float(0.8))]
        );
    }

    #[test]
    fn test_enabling_group_rebuilds_and_replays_defaults() {
        let (mut composer, probe) = attached();
        assert!(!composer.active_parameters().contains("auto_texturing_slope"));

        let report = composer
            .set_property("auto_texturing_enabled", PropertyValue::Bool(true))
            .unwrap();
        assert!(report.dispatch.is_rebuild());
        assert_eq!(probe.rebuild_count(), 1);
        assert!(composer.active_parameters().contains("auto_texturing_slope"));

        let material = composer.material_handle().unwrap();
        assert_eq!(
            probe.param(material, "auto_texturing_slope"),
            Some(PropertyValue::Float(1.45))
        );
        assert_eq!(
            probe.param(material, "auto_texturing_base_texture"),
            Some(PropertyValue::Int(0))
        );
    }

    #[test]
    fn test_unknown_property_touches_nothing() {
        let (mut composer, probe) = attached();
        let err = composer
            .set_property("bogus_field", PropertyValue::Bool(true))
            .unwrap_err();
        assert!(err.is_unknown_property());
        assert_eq!(probe.call_count(), 0);
    }

    #[test]
    fn test_type_mismatch_touches_nothing() {
        let (mut composer, probe) = attached();
        let err = composer
            .set_property("blending_sharpness", PropertyValue::Int(1))
            .unwrap_err();
        assert!(err.is_type_mismatch());
        assert_eq!(
            composer.get_property("blending_sharpness").unwrap(),
            &PropertyValue::Float(0.6)
        );
        assert_eq!(probe.call_count(), 0);
    }

    #[test]
    fn test_identical_write_still_dispatches() {
        let (mut composer, probe) = attached();
        let report = composer
            .set_property("tinting_enabled", PropertyValue::Bool(false))
            .unwrap();
        assert!(report.dispatch.is_rebuild());
        assert!(!report.changed);

        probe.clear_calls();
        let report = composer
            .set_property("blending_sharpness", PropertyValue::Float(0.6))
            .unwrap();
        assert!(!report.changed);
        assert_eq!(probe.pushes().len(), 1);
    }

    #[test]
    fn test_inactive_uniform_is_deferred_then_restored() {
        let (mut composer, probe) = attached();
        let report = composer
            .set_property("uv_distortion_size", PropertyValue::Float(12.0))
            .unwrap();
        assert_eq!(
            report.dispatch,
            Dispatch::Deferred {
                reason: DeferReason::UniformInactive
            }
        );
        assert_eq!(probe.call_count(), 0);

        composer
            .set_property("uv_distortion_enabled", PropertyValue::Bool(true))
            .unwrap();
        let material = composer.material_handle().unwrap();
        assert_eq!(
            probe.param(material, "uv_distortion_size"),
            Some(PropertyValue::Float(12.0))
        );
    }

    #[test]
    fn test_disable_then_enable_restores_last_values() {
        let (mut composer, probe) = attached();
        composer
            .set_property("multi_scaling_enabled", PropertyValue::Bool(true))
            .unwrap();
        composer
            .set_property("multi_scaling_far", PropertyValue::Float(900.0))
            .unwrap();
        composer
            .set_property("multi_scaling_enabled", PropertyValue::Bool(false))
            .unwrap();
        assert!(!composer.active_parameters().contains("multi_scaling_far"));
        composer
            .set_property("multi_scaling_enabled", PropertyValue::Bool(true))
            .unwrap();

        let material = composer.material_handle().unwrap();
        assert_eq!(
            probe.param(material, "multi_scaling_far"),
            Some(PropertyValue::Float(900.0))
        );
    }

    #[test]
    fn test_every_field_dispatches_exactly_once() {
        let (mut composer, probe) = attached();
        let fields: Vec<_> = composer
            .list_properties(None)
            .unwrap()
            .into_iter()
            .map(|p| (p.name, p.value, p.update))
            .collect();
        for (name, value, update) in fields {
            probe.clear_calls();
            let report = composer.set_property(&name, value).unwrap();
            match report.dispatch {
                Dispatch::Pushed { uniform } => {
                    assert_eq!(uniform, name);
                    assert_eq!(probe.call_count(), 1, "{name}");
                }
                Dispatch::Deferred { .. } => assert_eq!(probe.call_count(), 0, "{name}"),
                Dispatch::Rebuild { .. } => {
                    assert_eq!(update, UpdateKind::Structural, "{name}");
                    assert!(probe.rebuild_count() <= 1, "{name}");
                }
                Dispatch::WorldUniforms { .. } => panic!("{name}: unexpected world push"),
            }
        }
    }

    #[test]
    fn test_revert_twice() {
        let (mut composer, _probe) = attached();
        composer
            .set_property("normals_distance", PropertyValue::Float(64.0))
            .unwrap();
        assert!(composer.can_revert("normals_distance").unwrap());

        let (previous, report) = composer.revert_property("normals_distance").unwrap();
        assert_eq!(previous, PropertyValue::Float(64.0));
        assert!(report.changed);
        assert!(!composer.can_revert("normals_distance").unwrap());

        let (previous, report) = composer.revert_property("normals_distance").unwrap();
        assert_eq!(previous, PropertyValue::Float(128.0));
        assert!(!report.changed);
        assert!(!composer.can_revert("normals_distance").unwrap());
        assert_eq!(
            composer.get_property("normals_distance").unwrap(),
            &PropertyValue::Float(128.0)
        );
    }

    #[test]
    fn test_override_empty_seeds_and_disable_regenerates() {
        let (mut composer, _probe) = attached();
        let generated = composer.generated_source().text();

        let report = composer.enable_override(true);
        assert!(report.changed);
        assert_eq!(composer.override_state(), OverrideState::OverrideEmpty);
        assert_eq!(composer.effective_shader_source(), generated);

        // structural write while overridden: no regeneration
        let report = composer
            .set_property("tinting_enabled", PropertyValue::Bool(true))
            .unwrap();
        assert_eq!(
            report.dispatch,
            Dispatch::Deferred {
                reason: DeferReason::OverrideActive
            }
        );
        assert_eq!(composer.generated_source().text(), generated);

        composer.enable_override(false);
        assert_eq!(composer.override_state(), OverrideState::Generated);
        assert_ne!(composer.effective_shader_source(), generated);
        assert!(composer.effective_shader_source().contains("#define NOISE_TINT_ENABLED"));
    }

    #[test]
    fn test_override_source_keeps_value_pushes() {
        let (mut composer, probe) = attached();
        composer.enable_override(true);
        let report = composer.set_override_source(
            "shader_type spatial;\nuniform float blending_sharpness;\nuniform float wetness;\n",
        );
        assert!(report.dispatch.is_rebuild());
        assert_eq!(composer.override_state(), OverrideState::OverrideActive);
        probe.clear_calls();

        let report = composer
            .set_property("blending_sharpness", PropertyValue::Float(0.3))
            .unwrap();
        assert!(matches!(report.dispatch, Dispatch::Pushed { .. }));

        let report = composer
            .set_shader_param("wetness", PropertyValue::Float(0.7))
            .unwrap();
        assert!(matches!(report.dispatch, Dispatch::Pushed { .. }));
        assert_eq!(
            composer.shader_param("wetness").unwrap(),
            Some(&PropertyValue::Float(0.7))
        );
        assert_eq!(probe.rebuild_count(), 0);

        let err = composer
            .set_shader_param("not_declared", PropertyValue::Float(1.0))
            .unwrap_err();
        assert!(err.is_unknown_property());
    }

    #[test]
    fn test_override_empty_keeps_value_pushes() {
        let (mut composer, probe) = attached();
        composer.enable_override(true);
        assert_eq!(composer.override_state(), OverrideState::OverrideEmpty);
        probe.clear_calls();

        let report = composer
            .set_property("blending_sharpness", PropertyValue::Float(0.3))
            .unwrap();
        assert_eq!(
            report.dispatch,
            Dispatch::Pushed {
                uniform: "blending_sharpness".into()
            }
        );
        assert_eq!(probe.rebuild_count(), 0);
        assert_eq!(
            probe.pushes(),
            vec![("blending_sharpness".to_string(), PropertyValue::Float(0.3))]
        );
    }

    #[test]
    fn test_texture_to_non_sampler_rejected() {
        let (mut composer, _probe) = attached();
        composer.enable_override(true);
        composer.set_override_source("uniform float wetness;\n");
        let err = composer
            .set_shader_param("wetness", PropertyValue::Texture(Some(TextureRef(9))))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTextureFormat(_)));
    }

    #[test]
    fn test_override_source_while_disabled_is_buffered() {
        let (mut composer, probe) = attached();
        let report = composer.set_override_source("uniform float a;\n");
        assert_eq!(
            report.dispatch,
            Dispatch::Deferred {
                reason: DeferReason::OverrideDisabled
            }
        );
        assert_eq!(probe.call_count(), 0);
        composer.enable_override(true);
        assert_eq!(composer.effective_shader_source(), "uniform float a;\n");
    }

    #[test]
    fn test_regenerate_override_header_preserves_body() {
        let (mut composer, _probe) = attached();
        composer.enable_override(true);
        let seeded = composer.override_buffer().to_string();
        let body = "\nvoid fragment() { ALBEDO = vec3(1.0); }\n";
        let (header, _) = seeded.split_at(seeded.find(HEADER_END_MARK).unwrap());
        let user = format!("{header}{HEADER_END_MARK}{body}");
        composer.set_override_source(&user);

        composer
            .set_property("auto_texturing_enabled", PropertyValue::Bool(true))
            .unwrap();
        let report = composer.regenerate_override_header();
        assert!(report.changed);
        assert!(report.warnings.is_empty());

        let text = composer.effective_shader_source();
        assert!(text.contains("#define AUTO_TEXTURING_ENABLED"));
        assert!(text.ends_with(body));
        assert!(composer.active_parameters().contains("auto_texturing_slope"));
    }

    #[test]
    fn test_corrupt_editor_block_keeps_whole_buffer() {
        let (mut composer, _probe) = attached();
        composer.enable_override(true);
        let user = "//// __EDITOR_BLOCK_BEGIN__\nuniform float a;\nvoid fragment() {}\n";
        composer.set_override_source(user);

        let report = composer.regenerate_override_header();
        assert!(matches!(
            report.warnings.as_slice(),
            [Warning::InjectionCorruption { .. }]
        ));
        assert!(composer.effective_shader_source().ends_with(user));
    }

    #[test]
    fn test_writes_before_attach_are_cached() {
        let mut composer: MaterialComposer<InMemoryBackend> =
            MaterialComposer::terrain(ComposerConfig::default()).unwrap();
        let report = composer
            .set_property("tinting_enabled", PropertyValue::Bool(true))
            .unwrap();
        assert!(report.dispatch.is_rebuild());
        assert_eq!(report.warnings, vec![Warning::BackendUnavailable]);
        assert!(composer.effective_shader_source().contains("NOISE_TINT_ENABLED"));

        let report = composer
            .set_property("tinting_noise1_scale", PropertyValue::Float(0.2))
            .unwrap();
        assert_eq!(
            report.dispatch,
            Dispatch::Deferred {
                reason: DeferReason::BackendUnavailable
            }
        );

        let backend = InMemoryBackend::new();
        let probe = backend.clone();
        composer.attach_backend(backend);
        let material = composer.material_handle().unwrap();
        assert_eq!(
            probe.param(material, "tinting_noise1_scale"),
            Some(PropertyValue::Float(0.2))
        );
        assert!(composer.blend_map().is_some());
    }

    #[test]
    fn test_skip_identical_upload() {
        let (mut composer, probe) = attached();
        composer
            .set_property("blending_by_height", PropertyValue::Bool(false))
            .unwrap();
        assert_eq!(probe.rebuild_count(), 0);
        assert!(!probe.pushes().is_empty());
    }

    #[test]
    fn test_identical_upload_when_skip_disabled() {
        let backend = InMemoryBackend::new();
        let probe = backend.clone();
        let config = ComposerConfig {
            skip_identical_sources: false,
            ..ComposerConfig::default()
        };
        let mut composer = MaterialComposer::terrain(config).unwrap();
        composer.attach_backend(backend);
        probe.clear_calls();

        let report = composer
            .set_property("blending_by_height", PropertyValue::Bool(false))
            .unwrap();
        assert!(report.dispatch.is_rebuild());
        assert!(!report.changed);
        assert_eq!(probe.rebuild_count(), 1);
        let material = composer.material_handle().unwrap();
        assert_eq!(
            probe.param(material, "blending_sharpness"),
            Some(PropertyValue::Float(0.6))
        );
    }

    #[test]
    fn test_rejected_shader_is_a_warning() {
        let (mut composer, probe) = attached();
        probe.reject_sources_containing("HEIGHT_BLENDING_ENABLED");
        let report = composer
            .set_property("blending_by_height", PropertyValue::Bool(true))
            .unwrap();
        assert!(matches!(
            report.warnings.as_slice(),
            [Warning::ShaderRejected(_)]
        ));
        assert_eq!(
            composer.get_property("blending_by_height").unwrap(),
            &PropertyValue::Bool(true)
        );
    }

    #[test]
    fn test_world_refresh() {
        let (mut composer, probe) = attached();
        let mut map = vec![0; 256];
        map[17] = 1;
        let report = composer.refresh_world_state(
            WorldState::default()
                .with_region_size(256)
                .with_texture_count(0)
                .with_region_map(map),
        );
        assert!(report.dispatch.is_rebuild());
        assert!(composer.effective_shader_source().contains("#define REGION_SIZE 256"));

        let material = composer.material_handle().unwrap();
        assert_eq!(probe.param(material, "_region_size"), Some(PropertyValue::Float(256.0)));
        let textures: Vec<_> = probe
            .calls()
            .into_iter()
            .filter(|c| matches!(c, BackendCall::CreateTexture { .. } | BackendCall::DestroyTexture(_)))
            .collect();
        assert_eq!(textures.len(), 2);

        let report = composer.refresh_world_state(composer.world().clone().with_texture_count(3));
        assert!(report.dispatch.is_rebuild());
        assert_eq!(
            composer.get_property("debug_view_checkered").unwrap(),
            &PropertyValue::Bool(false)
        );
        let report = composer.refresh_world_state(composer.world().clone().with_texture_count(0));
        assert!(report.dispatch.is_rebuild());
        assert_eq!(
            composer.get_property("debug_view_checkered").unwrap(),
            &PropertyValue::Bool(true)
        );

        let report = composer.refresh_world_state(composer.world().clone().with_vertex_spacing(2.0));
        assert!(matches!(report.dispatch, Dispatch::WorldUniforms { pushed } if pushed > 0));
    }

    #[test]
    fn test_snapshot_restore_rebuilds_once() {
        let (mut composer, _probe) = attached();
        composer
            .set_property("bg_world_fill", PropertyValue::Int(FILL_NOISE))
            .unwrap();
        composer
            .set_property(
                "tinting_macro_variation1",
                PropertyValue::Color(Vec4::new(1.0, 0.0, 0.0, 1.0)),
            )
            .unwrap();
        composer.set_override_source("uniform float a;\n");
        let snapshot = composer.save();
        assert_eq!(snapshot.catalog, "terrain");

        let backend = InMemoryBackend::new();
        let probe = backend.clone();
        let mut other = MaterialComposer::terrain(ComposerConfig::default()).unwrap();
        other.attach_backend(backend);
        probe.clear_calls();

        let json = snapshot.to_json().unwrap();
        let report = other.restore(&MaterialSnapshot::from_json(&json).unwrap());
        assert!(report.dispatch.is_rebuild());
        assert!(report.changed);
        assert_eq!(probe.rebuild_count(), 1);
        assert_eq!(other.get_property("bg_world_fill").unwrap(), &PropertyValue::Int(FILL_NOISE));
        assert_eq!(other.override_buffer(), "uniform float a;\n");
        assert_eq!(other.effective_shader_source(), composer.effective_shader_source());
        assert!(other.active_parameters().contains("bg_world_scale"));
    }

    #[test]
    fn test_restore_drops_unsaved_custom_params() {
        let (mut composer, probe) = attached();
        let source = "uniform float blending_sharpness;\nuniform float wetness;\n";
        composer.enable_override(true);
        composer.set_override_source(source);
        composer
            .set_shader_param("wetness", PropertyValue::Float(0.7))
            .unwrap();

        let snapshot = MaterialSnapshot {
            catalog: "terrain".into(),
            override_enabled: true,
            override_source: source.into(),
            ..Default::default()
        };
        probe.clear_calls();
        let report = composer.restore(&snapshot);
        assert!(report.dispatch.is_rebuild());
        assert!(report.changed);
        assert_eq!(composer.shader_param("wetness").unwrap(), None);
        assert!(composer.persisted_parameters().get("wetness").is_none());
        assert!(probe.pushes().iter().all(|(name, _)| name != "wetness"));
        assert!(probe
            .pushes()
            .contains(&("blending_sharpness".to_string(), PropertyValue::Float(0.6))));
    }

    #[test]
    fn test_override_help_topic() {
        let (composer, _probe) = attached();
        let help = composer.help_topic(OVERRIDE_HELP_TOPIC).unwrap();
        assert!(help.starts_with("While the override is enabled"));
        assert!(help.contains("__END_HEADER__"));
        assert_eq!(help.matches("\n\n").count(), 1);
        assert!(!help.replace("\n\n", "").contains('\n'));

        let blending = composer
            .groups()
            .into_iter()
            .find(|g| g.name == "blending")
            .unwrap();
        assert_eq!(composer.help_topic("blending"), Some(blending.help));
        assert_eq!(composer.help_topic("bogus_topic"), None);
    }

    #[test]
    fn test_invalid_variant_rejected() {
        let (mut composer, probe) = attached();
        let err = composer
            .set_property("normals_quality", PropertyValue::Int(7))
            .unwrap_err();
        assert!(matches!(err.root(), Error::InvalidVariant { .. }));
        assert_eq!(probe.call_count(), 0);
    }

    #[test]
    fn test_detach_and_drop_release_resources() {
        let (mut composer, probe) = attached();
        assert_eq!(probe.live_resources(), (1, 1, 1));
        let backend = composer.detach_backend().unwrap();
        assert_eq!(probe.live_resources(), (0, 0, 0));

        composer.attach_backend(backend);
        assert_eq!(probe.live_resources(), (1, 1, 1));
        drop(composer);
        assert_eq!(probe.live_resources(), (0, 0, 0));
    }

    #[test]
    fn test_ocean_background_define() {
        let backend = InMemoryBackend::new();
        let mut composer = MaterialComposer::ocean(ComposerConfig::default()).unwrap();
        composer.attach_backend(backend);
        assert!(!composer.effective_shader_source().contains("#define WORLD_BACKGROUND_INFINITE"));
        composer
            .set_property("world_background", PropertyValue::Int(OCEAN_BACKGROUND_INFINITE))
            .unwrap();
        assert!(composer.effective_shader_source().contains("#define WORLD_BACKGROUND_INFINITE"));

        let report = composer
            .set_shader_param("water_color", PropertyValue::Color(Vec4::ONE))
            .unwrap();
        assert!(matches!(report.dispatch, Dispatch::Pushed { .. }));
    }
}
