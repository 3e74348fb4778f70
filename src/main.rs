#![cfg(not(target_arch = "wasm32"))]

use std::backtrace::Backtrace;
use std::panic;

use anyhow::{Context, Result};
use glam::Vec3;
use log::{info, LevelFilter};

use terra_material::{
    ComposerConfig, InMemoryBackend, MaterialComposer, MaterialSnapshot, PropertyValue, WorldState,
};

fn main() -> Result<()> {
    setup_diagnostics();

    let config = match std::env::args().nth(1) {
        Some(path) => ComposerConfig::from_file(&path)
            .with_context(|| format!("loading composer config from {path}"))?,
        None => ComposerConfig::default(),
    };
    info!("Starting terra-material demo with {config:?}");

    let backend = InMemoryBackend::new();
    let probe = backend.clone();
    let mut terrain = MaterialComposer::terrain(config)?;
    terrain.attach_backend(backend);

    let mut map = vec![0; 256];
    map[..4].fill(1);
    let report = terrain.refresh_world_state(
        WorldState::default()
            .with_region_size(256)
            .with_texture_count(4)
            .with_region_map(map),
    );
    info!("world refresh: {}", report.dispatch);

    for (name, value) in [
        ("blending_sharpness", PropertyValue::Float(0.8)),
        ("auto_texturing_enabled", PropertyValue::Bool(true)),
        ("auto_texturing_slope", PropertyValue::Float(2.0)),
        ("bg_world_fill", PropertyValue::Int(2)),
    ] {
        let report = terrain.set_property(name, value)?;
        info!("{name}: {} (changed: {})", report.dispatch, report.changed);
    }

    let bg = terrain.background();
    let pos = Vec3::new(5000.0, 0.0, -1200.0);
    info!(
        "background height at {pos}: {:.2}",
        bg.generated_height(pos, bg.octaves_by_distance(pos.length()))
    );

    for group in terrain.groups() {
        info!("[{}] {} enabled={}", group.name, group.title, group.enabled);
    }

    let snapshot = terrain.save();
    info!("snapshot: {} values", snapshot.values.len());
    match std::env::args().nth(2) {
        Some(out) => {
            snapshot
                .save_to_file(&out)
                .with_context(|| format!("saving material snapshot to {out}"))?;
            let reloaded = MaterialSnapshot::load_from_file(&out)?;
            info!("snapshot written to {out} ({} values)", reloaded.values.len());
        }
        None => println!("{}", snapshot.to_json()?),
    }

    if let Some(help) = terrain.help_topic("shader_override") {
        info!("shader_override: {help}");
    }

    terrain.detach_backend();
    info!("{} backend calls recorded", probe.call_count());
    Ok(())
}

/// Logging plus a panic hook that prints a backtrace.
fn setup_diagnostics() {
    env_logger::Builder::new()
        .filter_level(if cfg!(debug_assertions) {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .format_timestamp_millis()
        .format_target(false)
        .parse_default_env()
        .init();

    panic::set_hook(Box::new(|panic_info| {
        let backtrace = Backtrace::force_capture();
        let msg = match panic_info.payload().downcast_ref::<&'static str>() {
            Some(s) => *s,
            None => match panic_info.payload().downcast_ref::<String>() {
                Some(s) => &s[..],
                None => "Box<dyn Any>",
            },
        };
        let location = panic_info
            .location()
            .map_or("unknown location".to_string(), |loc| {
                format!("{}:{}", loc.file(), loc.line())
            });
        eprintln!("terra-material panicked: {msg}\nat {location}\n\n{backtrace}");
    }));
}
