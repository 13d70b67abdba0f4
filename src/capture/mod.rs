//! The capture daemon (`spec.md` §4.1): owns the audio input device for
//! the process lifetime and streams raw PCM frames to the analysis and
//! livestream FIFOs, in that order, with blocking backpressure.

mod filters;
mod resample;
mod state;

pub use filters::{Filter, FilterChain, Gain, HighPass, LowPass, Passthrough};
pub use resample::{ResampleError, Resampler};
pub use state::{CaptureState, IllegalTransition};

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::HeapRb;
use thiserror::Error;

use crate::transport::{self, FifoPair, TransportError};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("no input device available (configured index: {0})")]
    NoDevice(i32),
    #[error("failed to query device config: {0}")]
    DeviceConfig(#[from] cpal::DefaultStreamConfigError),
    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error("failed to start input stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
    #[error("fatal device error: {0}")]
    Fatal(String),
}

/// Selects the configured input device, or the host default when
/// `device_index` is -1 (`spec.md` §6 "`audio_device_index` (−1 =
/// default)"), grounded in the enumeration/scoring approach used for
/// microphone selection elsewhere in the audio-capture reference stack.
pub fn select_device(device_index: i32) -> Result<cpal::Device, CaptureError> {
    let host = cpal::default_host();

    if device_index < 0 {
        return host.default_input_device().ok_or(CaptureError::NoDevice(device_index));
    }

    let devices: Vec<cpal::Device> = host
        .input_devices()
        .map_err(|_| CaptureError::NoDevice(device_index))?
        .collect();

    devices
        .into_iter()
        .nth(device_index as usize)
        .ok_or(CaptureError::NoDevice(device_index))
}

pub struct CaptureConfig {
    pub device_index: i32,
    pub sample_rate: u32,
    pub channels: u16,
    pub fifo_dir: std::path::PathBuf,
}

/// Runs the capture daemon's read loop until `shutdown` is set. Blocks the
/// calling thread (cpal's stream callback runs on its own OS thread; the
/// writer loop here blocks on FIFO writes as the spec's backpressure
/// contract requires).
pub fn run(
    config: CaptureConfig,
    mut filter_chain: FilterChain,
    shutdown: Arc<AtomicBool>,
) -> Result<(), CaptureError> {
    let mut state = CaptureState::Init;

    let fifos = FifoPair::new(&config.fifo_dir);
    fifos.ensure_created()?;
    state = state
        .advance(CaptureState::FifosReady)
        .map_err(|e| CaptureError::Fatal(e.to_string()))?;

    let mut analysis_writer = transport::open_for_writing(&fifos.analysis_path)?;
    let mut livestream_writer = transport::open_for_writing(&fifos.livestream_path)?;

    let device = select_device(config.device_index)?;

    // Devices are only guaranteed to support their own reported default
    // config; asking cpal to open a stream at an arbitrary configured
    // rate the hardware doesn't support would fail outright. Capture at
    // the device's native rate and resample down to the configured rate
    // below, rather than assuming the two always match.
    let native_rate = device
        .default_input_config()
        .map(|c| c.sample_rate().0)
        .unwrap_or(config.sample_rate);

    let mut resampler = if native_rate == config.sample_rate {
        None
    } else {
        Some(Resampler::new(native_rate, config.sample_rate).map_err(|e| CaptureError::Fatal(e.to_string()))?)
    };

    let stream_config = cpal::StreamConfig {
        channels: config.channels,
        sample_rate: cpal::SampleRate(native_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    // Ring buffer bridges the realtime audio callback thread to this
    // blocking writer loop; sized for roughly one second of mono 16-bit
    // audio so a brief writer stall doesn't force the callback to drop
    // samples.
    let capacity = native_rate as usize * config.channels as usize;
    let ring = HeapRb::<i16>::new(capacity.max(1));
    let (mut producer, mut consumer) = ring.split();

    let stream_shutdown = shutdown.clone();
    let stream = device.build_input_stream(
        &stream_config,
        move |data: &[i16], _info: &cpal::InputCallbackInfo| {
            if stream_shutdown.load(Ordering::Relaxed) {
                return;
            }
            for &sample in data {
                let _ = producer.try_push(sample);
            }
        },
        move |err| {
            tracing::error!(error = %err, "audio input stream error");
        },
        None,
    )?;
    stream.play()?;

    state = state
        .advance(CaptureState::Capturing)
        .map_err(|e| CaptureError::Fatal(e.to_string()))?;
    tracing::info!(state = %state, "capture daemon running");

    let frame_size = 1024usize;
    let mut frame = vec![0i16; frame_size];
    let mut consecutive_empty_polls = 0u32;

    while !shutdown.load(Ordering::Relaxed) {
        let read = consumer.pop_slice(&mut frame);
        if read == 0 {
            consecutive_empty_polls += 1;
            std::thread::sleep(backoff_delay(consecutive_empty_polls));
            continue;
        }
        consecutive_empty_polls = 0;

        let mut samples = match resampler.as_mut() {
            Some(resampler) => match resampler.push(&frame[..read]) {
                Ok(resampled) => resampled,
                Err(e) => {
                    tracing::warn!(error = %e, "resampling failed, dropping frame");
                    continue;
                }
            },
            None => frame[..read].to_vec(),
        };

        // The resampler buffers partial chunks internally; an empty
        // return just means it hasn't accumulated a full chunk yet.
        if samples.is_empty() {
            continue;
        }

        filter_chain.apply(&mut samples);

        let mut frame_bytes = vec![0u8; samples.len() * 2];
        for (i, sample) in samples.iter().enumerate() {
            let bytes = sample.to_le_bytes();
            frame_bytes[i * 2] = bytes[0];
            frame_bytes[i * 2 + 1] = bytes[1];
        }
        let byte_window = &frame_bytes[..];

        // Analysis first, then livestream, per the ordering contract;
        // a blocked write here is the intended backpressure signal.
        if let Err(e) = analysis_writer.write_all(byte_window) {
            tracing::warn!(error = %e, "analysis FIFO write failed, reopening");
            analysis_writer = transport::open_for_writing(&fifos.analysis_path)?;
        }
        if let Err(e) = livestream_writer.write_all(byte_window) {
            tracing::warn!(error = %e, "livestream FIFO write failed, reopening");
            livestream_writer = transport::open_for_writing(&fifos.livestream_path)?;
        }
    }

    state = state
        .advance(CaptureState::Draining)
        .map_err(|e| CaptureError::Fatal(e.to_string()))?;
    drop(stream);
    let _ = analysis_writer.flush();
    let _ = livestream_writer.flush();
    let _ = state
        .advance(CaptureState::Exited)
        .map_err(|e| CaptureError::Fatal(e.to_string()))?;
    tracing::info!("capture daemon exited cleanly");

    Ok(())
}

fn backoff_delay(consecutive_empty_polls: u32) -> Duration {
    let capped = consecutive_empty_polls.min(50);
    Duration::from_micros(200 * u64::from(capped).max(1))
}
