// src/lib.rs
//! Terrain material composer.
//!
//! Turns a set of toggleable rendering features into one shader program and
//! keeps its uniforms in sync with the property values, through any
//! [`RenderBackend`]. See [`MaterialComposer`] for the entry point.

pub mod backend;
pub mod background;
pub mod config;
pub mod context;
pub mod error;
pub mod materials;
pub mod value;

pub use backend::{InMemoryBackend, MaterialHandle, ParamStatus, RenderBackend, ShaderHandle};
pub use config::ComposerConfig;
pub use error::{Error, Result, Warning};
pub use materials::{
    DeferReason, Dispatch, DispatchReport, MaterialComposer, MaterialSnapshot, OverrideState,
    WorldState,
};
pub use value::{PropertyValue, TextureRef, ValueKind};
