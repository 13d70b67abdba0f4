//! The analysis daemon entrypoint (`spec.md` §4.2): reads raw PCM from the
//! analysis FIFO, segments it into windows, runs inference, and persists
//! + publishes whatever survives post-filtering.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use corvid_sentinel::analysis::{
    self, birdnet_week, AnalysisError, Detector, DetectorParams, OrtInterpreter, OrtMetadataRegionFilter,
    RegionFilterCache, Windower,
};
use corvid_sentinel::config::{self, CorvidConfig};
use corvid_sentinel::eventbus::EventBus;
use corvid_sentinel::store::{self, AudioFileStore, DetectionStore};
use corvid_sentinel::transport::{self, FifoPair};

#[derive(Parser, Debug)]
#[command(name = "corvid-analysis")]
#[command(about = "Runs neural inference over the analysis FIFO and persists detections")]
struct CliArgs {
    /// Path to config.yaml; falls back to $CORVID_CONFIG, then ./config.yaml.
    #[arg(long, env = "CORVID_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the analysis.fifo pair and the SQLite database.
    #[arg(long, env = "CORVID_DATA_DIR", default_value = "/var/lib/corvid-sentinel")]
    data_dir: PathBuf,
}

/// Bytes read per blocking read from the FIFO; large enough to amortise
/// the syscall without adding noticeable windowing latency.
const READ_CHUNK_BYTES: usize = 8192;

/// Used only when the labels file is missing entirely, so the placeholder
/// fallback still produces a plausible BirdNET-sized class count rather
/// than an empty label list.
const DEFAULT_LABEL_COUNT: usize = 6522;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    corvid_sentinel::telemetry::init("corvid-analysis");

    let args = CliArgs::parse();
    let loaded = CorvidConfig::load(args.config.as_deref())?;
    config::init(loaded);
    let cfg = config::get();

    let fifos = FifoPair::new(args.data_dir.join("fifos"));
    fifos.ensure_created()?;

    let db_path = args.data_dir.join("corvid.db");
    let pool = store::open_pool(&db_path).await?;
    let detection_store = DetectionStore::new(&pool);
    let audio_store = AudioFileStore::new(&pool);
    let event_bus = EventBus::new(256);

    let labels_path = args.data_dir.join("labels.txt");
    let expected_label_count = std::fs::read_to_string(&labels_path)
        .map(|text| text.lines().filter(|l| !l.trim().is_empty()).count())
        .unwrap_or(DEFAULT_LABEL_COUNT);
    let labels = analysis::load_labels(&labels_path, expected_label_count)?;

    let interpreter = OrtInterpreter::load(std::path::Path::new(&cfg.model.model))?;

    let region_filter = match &cfg.model.metadata_model {
        Some(path) => {
            let plausibility = OrtMetadataRegionFilter::load(std::path::Path::new(path), labels.clone())?;
            Some(RegionFilterCache::new(plausibility))
        }
        None => None,
    };

    let week = Some(birdnet_week(Utc::now().date_naive()));
    let params = DetectorParams {
        latitude: cfg.location.latitude,
        longitude: cfg.location.longitude,
        week,
        species_confidence_threshold: cfg.model.species_confidence_threshold,
        sensitivity_setting: cfg.model.sensitivity_setting,
        privacy_threshold_percent: cfg.model.privacy_threshold,
        overlap_seconds: cfg.audio.audio_overlap,
    };

    let mut detector: Detector<OrtInterpreter, OrtMetadataRegionFilter> =
        Detector::new(interpreter, labels, region_filter, params);

    let shutdown = Arc::new(AtomicBool::new(false));
    let signal_shutdown = shutdown.clone();
    ctrlc::set_handler(move || {
        tracing::info!("shutdown signal received");
        signal_shutdown.store(true, Ordering::Relaxed);
    })?;

    let sample_rate = cfg.audio.sample_rate;
    let overlap_seconds = cfg.audio.audio_overlap;
    let (tx, mut rx) = tokio::sync::mpsc::channel::<Vec<f32>>(32);

    let reader_shutdown = shutdown.clone();
    let reader_path = fifos.analysis_path.clone();
    let reader = tokio::task::spawn_blocking(move || read_fifo_loop(&reader_path, reader_shutdown, tx));

    let mut windower = Windower::new(sample_rate, overlap_seconds, Utc::now());
    let dropped_counter = AtomicU64::new(0);
    let recordings_dir = cfg.audio.record_audio.then(|| args.data_dir.join("recordings"));

    while let Some(samples) = rx.recv().await {
        for window in windower.push(&samples) {
            if let Err(e) = handle_window(
                &mut detector,
                &detection_store,
                &audio_store,
                &event_bus,
                window,
                &dropped_counter,
                recordings_dir.as_deref(),
                sample_rate,
            )
            .await
            {
                tracing::error!(error = %e, "failed to process analysis window");
            }
        }
    }

    if let Some(window) = windower.flush() {
        if let Err(e) = handle_window(
            &mut detector,
            &detection_store,
            &audio_store,
            &event_bus,
            window,
            &dropped_counter,
            recordings_dir.as_deref(),
            sample_rate,
        )
        .await
        {
            tracing::error!(error = %e, "failed to process final analysis window");
        }
    }

    reader.await??;
    pool.close().await;
    Ok(())
}

async fn handle_window(
    detector: &mut Detector<OrtInterpreter, OrtMetadataRegionFilter>,
    detection_store: &DetectionStore<'_>,
    audio_store: &AudioFileStore<'_>,
    event_bus: &EventBus,
    window: corvid_sentinel::analysis::Window,
    dropped_counter: &AtomicU64,
    recordings_dir: Option<&std::path::Path>,
    sample_rate: u32,
) -> Result<(), AnalysisError> {
    let window_start = window.start;
    let predictions = detector.process_window(&window)?;
    if predictions.is_empty() {
        return Ok(());
    }

    let audio_file_id = match recordings_dir {
        Some(dir) => match write_window_wav(dir, &window, sample_rate) {
            Ok((path, duration_seconds, size_bytes)) => {
                analysis::persist_audio_file(audio_store, path, duration_seconds, size_bytes).await
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to write captured audio, detection will have no audio_file_id");
                None
            }
        },
        None => None,
    };

    let detections = detector
        .to_detections(predictions, window_start, audio_file_id)
        .map_err(|e| {
            tracing::error!(error = %e, "detection failed validation, dropping window's output");
            e
        })
        .unwrap_or_default();

    for detection in detections {
        analysis::persist_and_publish(detection_store, event_bus, detection, dropped_counter).await;
    }

    Ok(())
}

/// Writes one window's samples to `<recordings_dir>/<date>/<timestamp>.wav`
/// (`spec.md` persisted-state layout: `recordings/**/*.wav`), returning the
/// path, duration, and on-disk size `persist_audio_file` needs to insert
/// the `AudioFile` row.
fn write_window_wav(
    recordings_dir: &std::path::Path,
    window: &corvid_sentinel::analysis::Window,
    sample_rate: u32,
) -> anyhow::Result<(PathBuf, f64, u64)> {
    let day_dir = recordings_dir.join(window.start.format("%Y-%m-%d").to_string());
    std::fs::create_dir_all(&day_dir)?;
    let path = day_dir.join(format!("{}.wav", window.start.format("%Y%m%dT%H%M%S%.3fZ")));

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec)?;
    for &sample in &window.samples {
        let pcm = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        writer.write_sample(pcm)?;
    }
    writer.finalize()?;

    let duration_seconds = window.samples.len() as f64 / f64::from(sample_rate);
    let size_bytes = std::fs::metadata(&path)?.len();
    Ok((path, duration_seconds, size_bytes))
}

/// Blocking read loop run on a dedicated thread: the FIFO is a blocking
/// file descriptor and has no async equivalent worth wrapping, so it's
/// kept off the Tokio runtime entirely and bridged in by a channel.
fn read_fifo_loop(
    path: &std::path::Path,
    shutdown: Arc<AtomicBool>,
    tx: tokio::sync::mpsc::Sender<Vec<f32>>,
) -> anyhow::Result<()> {
    use std::io::Read;

    let mut file = transport::open_for_reading(path)?;
    let mut raw = vec![0u8; READ_CHUNK_BYTES];
    let mut carry = Vec::new();

    while !shutdown.load(Ordering::Relaxed) {
        let n = match file.read(&mut raw) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };

        carry.extend_from_slice(&raw[..n]);
        let usable_bytes = carry.len() - (carry.len() % 2);
        let samples: Vec<f32> = carry[..usable_bytes]
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / f32::from(i16::MAX))
            .collect();
        carry.drain(..usable_bytes);

        if !samples.is_empty() && tx.blocking_send(samples).is_err() {
            break;
        }
    }

    Ok(())
}
