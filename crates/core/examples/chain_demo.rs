//! Builds an effect chain, renders it, walks undo/redo and stores it as a preset
//!
//! Run with: cargo run --package resonare-core --example chain_demo

use resonare_core::domain::audio::PcmBuffer;
use resonare_core::domain::chain::{EditSession, EffectChain};
use resonare_core::domain::config::{PresetManager, ResonareConfig};
use resonare_core::domain::effects::EffectRequest;
use resonare_core::domain::render::RenderEngine;
use std::f32::consts::PI;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("resonare_core=debug,info")
        .init();

    println!("=== Resonare Chain Demo ===\n");

    // 1. Half a second of a 440 Hz tone in stereo
    let sample_rate = 44100;
    let tone: Vec<f32> = (0..sample_rate / 2)
        .map(|i| 0.5 * (2.0 * PI * 440.0 * i as f32 / sample_rate as f32).sin())
        .collect();
    let original = PcmBuffer::new(sample_rate, vec![tone.clone(), tone])?;
    println!(
        "1. Source: {} channels, {} frames, {:.2} s",
        original.number_of_channels(),
        original.len(),
        original.duration_secs()
    );

    // 2. Apply effects one at a time
    let config = ResonareConfig::default();
    let mut session = EditSession::new(RenderEngine::new(config.render.clone()), original);
    for request in [
        EffectRequest::parse("lowpass", 2000.0)?,
        EffectRequest::parse("compression", 0.5)?,
        EffectRequest::parse("reverb", 0.3)?,
    ] {
        session.apply(request)?;
        println!(
            "2. {:<28} -> {} frames, peak {:.3}",
            session.chain().effects().last().map(ToString::to_string).unwrap_or_default(),
            session.current().len(),
            session.current().peak()
        );
    }

    // 3. Undo and redo
    session.undo()?;
    println!("3. After undo: {} effects, {} frames", session.chain().len(), session.current().len());
    session.redo()?;
    println!("   After redo: {} effects, {} frames", session.chain().len(), session.current().len());

    // 4. Store the chain as a preset and replay it on a fresh session
    let dir = tempfile::tempdir()?;
    let presets = PresetManager::new(dir.path().join("presets"));
    presets.save_preset("warm_room", session.chain()).await?;
    println!("\n4. Presets on disk: {:?}", presets.list_presets().await?);

    let loaded: EffectChain = presets.load_preset("warm_room").await?;
    let mut replayed = EditSession::new(session.engine().clone(), session.original().clone());
    replayed.load_chain(&loaded)?;
    println!(
        "   Replayed preset matches session: {}",
        replayed.current() == session.current()
    );

    println!("\n=== Demo Complete ===");
    Ok(())
}
