// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use duration_string::DurationString;
use padkeys::audio::{self, envelope::VOICE_SECONDS};
use padkeys::config;
use padkeys::keyboard;
use padkeys::{NoteName, SampleEngine};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const RANDOM: &str = "random";

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "Plays a sampled pad at the notes of a major scale."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prints the pitch table and the keyboard mapping.
    Notes {},
    /// Lists the available audio output devices.
    Devices {},
    /// Plays notes in sequence, then waits for them to ring out.
    Play {
        /// The path to the engine config.
        #[arg[short, long]]
        config: Option<PathBuf>,
        /// The sample location (path or http(s) URL). Overrides the config.
        #[arg[short, long]]
        asset: Option<String>,
        /// The audio device. "mock" plays nothing.
        #[arg[short, long]]
        device: Option<String>,
        /// The time between notes.
        #[arg[short, long, default_value = "250ms"]]
        gap: String,
        /// The notes to play (C D E F G A B C2, or "random").
        #[arg(required = true)]
        notes: Vec<String>,
    },
    /// Plays notes typed on the keyboard until stdin closes.
    Keys {
        /// The path to the engine config.
        #[arg[short, long]]
        config: Option<PathBuf>,
        /// The sample location (path or http(s) URL). Overrides the config.
        #[arg[short, long]]
        asset: Option<String>,
        /// The audio device. "mock" plays nothing.
        #[arg[short, long]]
        device: Option<String>,
    },
}

fn load_engine(
    config: Option<PathBuf>,
    asset: Option<String>,
    device: Option<String>,
) -> Result<SampleEngine, Box<dyn Error>> {
    let config = match config {
        Some(path) => config::Engine::deserialize(&path)?,
        None => config::Engine::default(),
    }
    .with_asset(asset)
    .with_device(device);

    Ok(SampleEngine::from_config(&config)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Notes {} => {
            println!("Notes:");
            for note in NoteName::ALL {
                println!(
                    "- {:<2} key={} rate={}",
                    note,
                    note.key(),
                    note.playback_rate()
                );
            }
        }
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Play {
            config,
            asset,
            device,
            gap,
            notes,
        } => {
            let gap: Duration = DurationString::from_string(gap)
                .map_err(|e| format!("invalid gap: {}", e))?
                .into();
            let engine = load_engine(config, asset, device)?;
            engine.prefetch();
            if !engine.ensure_ready().await {
                return Err(format!(
                    "unable to play {} ({})",
                    engine.location(),
                    engine.state()
                )
                .into());
            }

            let mut rng = rand::thread_rng();
            for (i, token) in notes.iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(gap).await;
                }
                let note = if token == RANDOM {
                    NoteName::random(&mut rng).to_string()
                } else {
                    if token.parse::<NoteName>().is_err() {
                        warn!(note = token, "Unknown note, playing at native pitch");
                    }
                    token.clone()
                };
                engine.play(&note);
            }

            tokio::time::sleep(Duration::from_secs_f64(VOICE_SECONDS)).await;
        }
        Commands::Keys {
            config,
            asset,
            device,
        } => {
            let engine = load_engine(config, asset, device)?;
            engine.prefetch();
            info!(asset = engine.location(), "Ready for keys");

            keyboard::Driver::new(engine).monitor().await??;
        }
    }

    Ok(())
}
