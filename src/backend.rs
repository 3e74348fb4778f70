// src/backend.rs
//! Render backend seam.
//!
//! The composer never allocates GPU resources itself. Everything goes through
//! [`RenderBackend`]: one shader resource, one material bound to it, and the
//! occasional texture (the region blend map). Calls are synchronous and made
//! from the thread that owns the composer.
//!
//! [`InMemoryBackend`] keeps resources in memory behind a shared lock and
//! records every call. The demo binary and the tests drive the composer with
//! it; clones share state, so a caller can keep a probe while the composer
//! owns another clone.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use image::GrayImage;
use parking_lot::Mutex;
use thiserror::Error;

use crate::materials::assembler::fingerprint;
use crate::materials::preprocess::scan_uniforms;
use crate::value::{PropertyValue, TextureRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialHandle(pub u64);

/// Outcome of a material parameter write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamStatus {
    Ok,
    /// The compiled shader does not declare this uniform.
    UnknownParam,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("shader compilation failed: {0}")]
    Compilation(String),
    #[error("invalid shader handle {0}")]
    InvalidHandle(u64),
}

/// Operations the composer needs from the renderer.
///
/// `set_shader_source` must leave the previous program usable until the new
/// one is installed; on error the previous program stays in place.
pub trait RenderBackend {
    fn create_shader(&mut self) -> ShaderHandle;
    fn set_shader_source(&mut self, shader: ShaderHandle, source: &str) -> Result<(), BackendError>;
    fn destroy_shader(&mut self, shader: ShaderHandle);

    fn create_material(&mut self, shader: ShaderHandle) -> MaterialHandle;
    fn set_material_param(
        &mut self,
        material: MaterialHandle,
        name: &str,
        value: &PropertyValue,
    ) -> ParamStatus;
    fn destroy_material(&mut self, material: MaterialHandle);

    fn create_texture(&mut self, image: &GrayImage) -> TextureRef;
    fn destroy_texture(&mut self, texture: TextureRef);
}

// ====================================================================================
// In-memory backend
// ====================================================================================

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    CreateShader(ShaderHandle),
    SetShaderSource {
        shader: ShaderHandle,
        fingerprint: u64,
        accepted: bool,
    },
    DestroyShader(ShaderHandle),
    CreateMaterial {
        material: MaterialHandle,
        shader: ShaderHandle,
    },
    SetMaterialParam {
        material: MaterialHandle,
        name: String,
        value: PropertyValue,
        status: ParamStatus,
    },
    DestroyMaterial(MaterialHandle),
    CreateTexture {
        texture: TextureRef,
        width: u32,
        height: u32,
    },
    DestroyTexture(TextureRef),
}

#[derive(Debug, Default)]
struct ShaderRecord {
    source: String,
    declared: HashSet<String>,
}

#[derive(Debug)]
struct MaterialRecord {
    shader: ShaderHandle,
    params: HashMap<String, PropertyValue>,
}

#[derive(Debug, Default)]
struct BackendState {
    next_id: u64,
    shaders: HashMap<ShaderHandle, ShaderRecord>,
    materials: HashMap<MaterialHandle, MaterialRecord>,
    textures: HashMap<TextureRef, (u32, u32)>,
    calls: Vec<BackendCall>,
    reject_marker: Option<String>,
}

impl BackendState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<Mutex<BackendState>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `set_shader_source` fail for any source containing `marker`.
    pub fn reject_sources_containing(&self, marker: impl Into<String>) {
        self.state.lock().reject_marker = Some(marker.into());
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Number of `set_shader_source` calls since the last clear.
    pub fn rebuild_count(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, BackendCall::SetShaderSource { .. }))
            .count()
    }

    /// Accepted parameter writes since the last clear, in call order.
    pub fn pushes(&self) -> Vec<(String, PropertyValue)> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                BackendCall::SetMaterialParam {
                    name,
                    value,
                    status: ParamStatus::Ok,
                    ..
                } => Some((name.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn shader_source(&self, shader: ShaderHandle) -> Option<String> {
        self.state.lock().shaders.get(&shader).map(|s| s.source.clone())
    }

    /// Current value of a parameter on a live material.
    pub fn param(&self, material: MaterialHandle, name: &str) -> Option<PropertyValue> {
        self.state
            .lock()
            .materials
            .get(&material)
            .and_then(|m| m.params.get(name).cloned())
    }

    /// Live `(shaders, materials, textures)`.
    pub fn live_resources(&self) -> (usize, usize, usize) {
        let state = self.state.lock();
        (state.shaders.len(), state.materials.len(), state.textures.len())
    }
}

impl RenderBackend for InMemoryBackend {
    fn create_shader(&mut self) -> ShaderHandle {
        let mut state = self.state.lock();
        let handle = ShaderHandle(state.next_id());
        state.shaders.insert(handle, ShaderRecord::default());
        state.calls.push(BackendCall::CreateShader(handle));
        handle
    }

    fn set_shader_source(&mut self, shader: ShaderHandle, source: &str) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        let rejected = state
            .reject_marker
            .as_deref()
            .is_some_and(|marker| source.contains(marker));
        state.calls.push(BackendCall::SetShaderSource {
            shader,
            fingerprint: fingerprint(source),
            accepted: !rejected,
        });
        if rejected {
            return Err(BackendError::Compilation("source contains rejected marker".into()));
        }

        let record = state
            .shaders
            .get_mut(&shader)
            .ok_or(BackendError::InvalidHandle(shader.0))?;
        record.source = source.to_string();
        record.declared = scan_uniforms(source).into_iter().map(|u| u.name).collect();

        // recompiling drops parameter values on every bound material
        for material in state.materials.values_mut().filter(|m| m.shader == shader) {
            material.params.clear();
        }
        Ok(())
    }

    fn destroy_shader(&mut self, shader: ShaderHandle) {
        let mut state = self.state.lock();
        state.shaders.remove(&shader);
        state.calls.push(BackendCall::DestroyShader(shader));
    }

    fn create_material(&mut self, shader: ShaderHandle) -> MaterialHandle {
        let mut state = self.state.lock();
        let material = MaterialHandle(state.next_id());
        state.materials.insert(
            material,
            MaterialRecord {
                shader,
                params: HashMap::new(),
            },
        );
        state.calls.push(BackendCall::CreateMaterial { material, shader });
        material
    }

    fn set_material_param(
        &mut self,
        material: MaterialHandle,
        name: &str,
        value: &PropertyValue,
    ) -> ParamStatus {
        let mut state = self.state.lock();
        let declared = state
            .materials
            .get(&material)
            .and_then(|m| state.shaders.get(&m.shader))
            .is_some_and(|s| s.declared.contains(name));
        let status = if declared {
            ParamStatus::Ok
        } else {
            ParamStatus::UnknownParam
        };
        if declared {
            if let Some(m) = state.materials.get_mut(&material) {
                m.params.insert(name.to_string(), value.clone());
            }
        }
        state.calls.push(BackendCall::SetMaterialParam {
            material,
            name: name.to_string(),
            value: value.clone(),
            status,
        });
        status
    }

    fn destroy_material(&mut self, material: MaterialHandle) {
        let mut state = self.state.lock();
        state.materials.remove(&material);
        state.calls.push(BackendCall::DestroyMaterial(material));
    }

    fn create_texture(&mut self, image: &GrayImage) -> TextureRef {
        let mut state = self.state.lock();
        let texture = TextureRef(state.next_id());
        let (width, height) = image.dimensions();
        state.textures.insert(texture, (width, height));
        state.calls.push(BackendCall::CreateTexture {
            texture,
            width,
            height,
        });
        texture
    }

    fn destroy_texture(&mut self, texture: TextureRef) {
        let mut state = self.state.lock();
        state.textures.remove(&texture);
        state.calls.push(BackendCall::DestroyTexture(texture));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_param_until_declared() {
        let mut backend = InMemoryBackend::new();
        let probe = backend.clone();
        let shader = backend.create_shader();
        let material = backend.create_material(shader);

        let v = PropertyValue::Float(0.8);
        assert_eq!(
            backend.set_material_param(material, "blending_sharpness", &v),
            ParamStatus::UnknownParam
        );

        backend
            .set_shader_source(shader, "uniform float blending_sharpness;\n")
            .unwrap();
        assert_eq!(
            backend.set_material_param(material, "blending_sharpness", &v),
            ParamStatus::Ok
        );
        assert_eq!(probe.param(material, "blending_sharpness"), Some(v));
        assert_eq!(probe.pushes().len(), 1);
    }

    #[test]
    fn test_recompile_clears_params() {
        let mut backend = InMemoryBackend::new();
        let shader = backend.create_shader();
        let material = backend.create_material(shader);
        backend.set_shader_source(shader, "uniform int a;").unwrap();
        backend.set_material_param(material, "a", &PropertyValue::Int(3));
        backend.set_shader_source(shader, "uniform int a;").unwrap();
        assert_eq!(backend.param(material, "a"), None);
    }

    #[test]
    fn test_rejected_source_keeps_previous() {
        let mut backend = InMemoryBackend::new();
        backend.reject_sources_containing("#error");
        let shader = backend.create_shader();
        backend.set_shader_source(shader, "uniform int a;").unwrap();
        let err = backend.set_shader_source(shader, "#error\n").unwrap_err();
        assert!(matches!(err, BackendError::Compilation(_)));
        assert_eq!(backend.shader_source(shader).unwrap(), "uniform int a;");
        assert_eq!(backend.rebuild_count(), 2);
    }

    #[test]
    fn test_resource_lifecycle() {
        let mut backend = InMemoryBackend::new();
        let shader = backend.create_shader();
        let material = backend.create_material(shader);
        let tex = backend.create_texture(&GrayImage::new(4, 4));
        assert_eq!(backend.live_resources(), (1, 1, 1));
        backend.destroy_texture(tex);
        backend.destroy_material(material);
        backend.destroy_shader(shader);
        assert_eq!(backend.live_resources(), (0, 0, 0));
    }
}
