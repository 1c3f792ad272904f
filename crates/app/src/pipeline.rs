//! Load -> render chain -> export
//!
//! Decoding and rendering are CPU-bound and run on the blocking pool; only
//! the final write is async.

use anyhow::Context;
use resonare_core::domain::chain::{EditSession, EffectChain};
use resonare_core::domain::render::{RenderEngine, RenderSettings};
use resonare_infra::wav::{read_wav, save_wav};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Summary printed after a render
#[derive(Debug, Clone, Serialize)]
pub struct RenderReport {
    pub output: PathBuf,
    pub applied: usize,
    pub sample_rate: u32,
    pub channels: usize,
    pub frames: usize,
    pub duration_secs: f64,
    /// Playback gain requested by `volume` effects; not written to the file
    pub volume: f32,
}

/// Apply `chain` to the WAV at `input` and write the result to `output`
pub async fn render_file(
    input: &Path,
    output: &Path,
    chain: EffectChain,
    settings: RenderSettings,
) -> anyhow::Result<RenderReport> {
    let input_path = input.to_path_buf();
    let original = tokio::task::spawn_blocking(move || read_wav(&input_path))
        .await?
        .with_context(|| format!("reading {}", input.display()))?;

    let session = tokio::task::spawn_blocking(move || -> anyhow::Result<EditSession> {
        let mut session = EditSession::new(RenderEngine::new(settings), original);
        for request in chain.iter() {
            let label = request.to_string();
            if !session
                .apply(request.clone())
                .with_context(|| format!("applying {}", label))?
            {
                warn!(effect = %label, "input is empty, effect skipped");
            }
        }
        Ok(session)
    })
    .await??;

    let buffer = session.current();
    save_wav(output, buffer)
        .await
        .with_context(|| format!("writing {}", output.display()))?;

    let report = RenderReport {
        output: output.to_path_buf(),
        applied: session.chain().len(),
        sample_rate: buffer.sample_rate(),
        channels: buffer.number_of_channels(),
        frames: buffer.len(),
        duration_secs: buffer.duration_secs(),
        volume: session.volume(),
    };
    info!(
        output = %report.output.display(),
        applied = report.applied,
        frames = report.frames,
        "render complete"
    );
    Ok(report)
}
