//! Resonare CLI Application

use anyhow::Context;
use clap::{Parser, Subcommand};
use resonare_app::{parse_effect_arg, render_file};
use resonare_core::domain::analysis::{spectrogram, waveform};
use resonare_core::domain::chain::EffectChain;
use resonare_core::domain::config::{ConfigManager, PresetManager, ResonareConfig};
use resonare_core::domain::effects::{EffectKind, EffectRequest};
use resonare_infra::wav::read_wav;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "resonare")]
#[command(about = "Offline audio effects: render, analyse and export WAV files", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply effects in order and export the result
    Render {
        #[arg(short, long)]
        input: PathBuf,

        /// Defaults to `export.default_file_name` from the config
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Effect as KIND=VALUE, e.g. `reverb=0.4` or `eq=3,0,-2` (repeatable)
        #[arg(short, long = "effect", value_parser = parse_effect_arg)]
        effects: Vec<EffectRequest>,

        /// Start from a saved preset; `--effect`s are appended to it
        #[arg(long)]
        preset: Option<String>,

        /// Seed for reverb impulse responses
        #[arg(long)]
        seed: Option<u32>,
    },

    /// Print one sample per pixel column as JSON
    Waveform {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long, default_value_t = 800)]
        width: usize,

        /// Print canvas points for this height instead of raw samples
        #[arg(long)]
        height: Option<f32>,
    },

    /// Print spectrogram frames as JSON
    Spectrogram {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long, default_value_t = 800.0)]
        width: f32,
    },

    /// Manage effect chain presets
    Preset {
        #[command(subcommand)]
        action: PresetAction,
    },

    /// List the known effect kinds
    Effects,
}

#[derive(Subcommand)]
enum PresetAction {
    /// Save the given effects as a named preset
    Save {
        name: String,

        #[arg(short, long = "effect", value_parser = parse_effect_arg, required = true)]
        effects: Vec<EffectRequest>,
    },
    /// Print a preset as JSON
    Load { name: String },
    List,
    Delete { name: String },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn config_manager(path: Option<&Path>) -> anyhow::Result<ConfigManager> {
    match path {
        Some(path) => Ok(ConfigManager::with_file(path.to_path_buf())),
        None => Ok(ConfigManager::new(ConfigManager::default_config_dir()?)),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn load_input(path: PathBuf) -> anyhow::Result<resonare_core::domain::audio::PcmBuffer> {
    let display = path.display().to_string();
    tokio::task::spawn_blocking(move || read_wav(&path))
        .await?
        .with_context(|| format!("reading {}", display))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let manager = config_manager(cli.config.as_deref())?;
    let config: ResonareConfig = manager.load().await;
    let presets = PresetManager::new(manager.preset_dir());

    match cli.command {
        Command::Render {
            input,
            output,
            effects,
            preset,
            seed,
        } => {
            let mut chain = match preset {
                Some(name) => presets.load_preset(&name).await?,
                None => EffectChain::new(),
            };
            for request in effects {
                chain.push(request);
            }
            if let Some(seed) = seed {
                chain = chain.iter().map(|r| r.with_seed(seed)).collect();
            }

            let output =
                output.unwrap_or_else(|| PathBuf::from(&config.export.default_file_name));
            let report = render_file(&input, &output, chain, config.render.clone()).await?;
            print_json(&report)?;
        }

        Command::Waveform {
            input,
            width,
            height,
        } => {
            let buffer = load_input(input).await?;
            let wave = waveform(&buffer, width)?;
            match height {
                Some(height) => print_json(&wave.points(height))?,
                None => print_json(&wave)?,
            }
        }

        Command::Spectrogram { input, width } => {
            let buffer = load_input(input).await?;
            let analysis = config.analysis.clone();
            let spec =
                tokio::task::spawn_blocking(move || spectrogram(&buffer, width, &analysis))
                    .await??;
            print_json(&spec)?;
        }

        Command::Preset { action } => match action {
            PresetAction::Save { name, effects } => {
                let chain: EffectChain = effects.into_iter().collect();
                presets.save_preset(&name, &chain).await?;
            }
            PresetAction::Load { name } => {
                print_json(&presets.load_preset(&name).await?)?;
            }
            PresetAction::List => {
                for name in presets.list_presets().await? {
                    println!("{}", name);
                }
            }
            PresetAction::Delete { name } => {
                presets.delete_preset(&name).await?;
            }
        },

        Command::Effects => {
            for kind in EffectKind::ALL {
                println!("{}", kind);
            }
        }
    }

    Ok(())
}
