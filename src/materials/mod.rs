// src/materials/mod.rs
//! Terrain and ocean material composition.

pub mod assembler;
pub mod catalog;
pub mod composer;
pub mod fragments;
pub mod override_ctl;
pub mod parameters;
pub mod preprocess;
pub mod property_store;
pub mod snapshot;
pub mod world_state;

pub use composer::{DeferReason, Dispatch, DispatchReport, MaterialComposer};
pub use override_ctl::OverrideState;
pub use property_store::{GroupInfo, PropertyInfo, PropertyStore};
pub use snapshot::MaterialSnapshot;
pub use world_state::WorldState;
