//! stagemix demo player.
//!
//! Plays the given files on channel 0 in order (first played, the rest
//! queued back-to-back), printing position until the channel drains.

use clap::Parser;
use stagemix::{AudioEngine, EngineConfig, MediaInput, PlayParams, SymphoniaBackend};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// stagemix demo player
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Audio files to play in order
    #[arg(required = true, value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Channel mixer volume (0.0 - 1.0)
    #[arg(long, default_value_t = 1.0)]
    volume: f32,

    /// Fade each track in over this many milliseconds
    #[arg(long, default_value_t = 0)]
    fadein: i64,

    /// Hand off between tracks without a restart fade
    #[arg(long)]
    tight: bool,

    /// Output device name (default device when omitted)
    #[arg(long, value_name = "NAME")]
    device: Option<String>,

    /// Output sample rate in Hz
    #[arg(long, default_value_t = 48000)]
    rate: u32,

    /// Device buffer size in frames
    #[arg(long, default_value_t = 1024)]
    buffer: u32,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("stagemix={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = EngineConfig {
        freq: args.rate,
        samples: args.buffer,
        device: args.device.clone(),
        status: args.verbose,
        ..Default::default()
    };

    let mut engine = AudioEngine::init(config, Arc::new(SymphoniaBackend::new()))?;
    engine.set_volume(0, args.volume)?;

    let params_for = |path: &PathBuf| PlayParams {
        name: path.display().to_string(),
        fadein_ms: args.fadein,
        tight: args.tight,
        ..Default::default()
    };

    let (first, rest) = args.files.split_first().expect("clap requires one file");
    engine.play(0, MediaInput::Path(first.clone()), "", params_for(first))?;
    for path in rest {
        engine.queue(0, MediaInput::Path(path.clone()), "", params_for(path))?;
    }

    info!("playing {} file(s) at {} Hz", args.files.len(), engine.sample_rate());

    loop {
        engine.periodic();
        let depth = engine.queue_depth(0)?;
        if depth == 0 {
            break;
        }
        if let Some(name) = engine.playing_name(0)? {
            let pos = engine.get_pos(0)?;
            let duration = engine.get_duration(0)?;
            info!("{}  {:.1}s / {:.1}s", name, pos as f64 / 1000.0, duration);
        }
        std::thread::sleep(Duration::from_millis(500));
    }

    info!("queue drained");
    engine.quit();
    Ok(())
}
