//! The capture daemon entrypoint (`spec.md` §4.1).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use corvid_sentinel::capture::{self, CaptureConfig, Filter, FilterChain, Gain, HighPass};
use corvid_sentinel::config::{self, CorvidConfig};

#[derive(Parser, Debug)]
#[command(name = "corvid-capture")]
#[command(about = "Owns the audio input device and streams PCM to the analysis/livestream FIFOs")]
struct CliArgs {
    /// Path to config.yaml; falls back to $CORVID_CONFIG, then ./config.yaml.
    #[arg(long, env = "CORVID_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the analysis.fifo/livestream.fifo pair.
    #[arg(long, env = "CORVID_DATA_DIR", default_value = "/var/lib/corvid-sentinel")]
    data_dir: PathBuf,
}

fn main() -> anyhow::Result<()> {
    corvid_sentinel::telemetry::init("corvid-capture");

    let args = CliArgs::parse();
    let loaded = CorvidConfig::load(args.config.as_deref())?;
    config::init(loaded);
    let cfg = config::get();

    let shutdown = Arc::new(AtomicBool::new(false));
    let signal_shutdown = shutdown.clone();
    ctrlc::set_handler(move || {
        tracing::info!("shutdown signal received");
        signal_shutdown.store(true, Ordering::Relaxed);
    })?;

    // Gentle high-pass ahead of the model input; gain left at unity until
    // a `gain_db` config key exists to drive it.
    let chain = FilterChain::new()
        .push(Box::new(HighPass::new(80.0, cfg.audio.sample_rate as f32)) as Box<dyn Filter>)
        .push(Box::new(Gain::new(1.0)));

    let capture_config = CaptureConfig {
        device_index: cfg.audio.audio_device_index,
        sample_rate: cfg.audio.sample_rate,
        channels: cfg.audio.audio_channels,
        fifo_dir: args.data_dir.join("fifos"),
    };

    capture::run(capture_config, chain, shutdown)?;
    Ok(())
}
