//! Sample-rate conversion from the audio device's native rate to the
//! appliance's configured rate (`spec.md` §4.1, §6 "`sample_rate` (Hz)").
//!
//! Real input devices are free to report whatever native rate they like;
//! the FIFO contract downstream assumes PCM at the configured rate, so
//! capture resamples at the source rather than pushing the mismatch onto
//! the analysis daemon.

use rubato::Resampler as _;
use rubato::{SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResampleError {
    #[error("failed to construct resampler: {0}")]
    Construct(#[from] rubato::ResamplerConstructionError),
    #[error("resampling failed: {0}")]
    Process(#[from] rubato::ResampleError),
}

/// Fixed input chunk size the underlying `SincFixedIn` resampler expects
/// per `process` call; samples are buffered up to this size before each
/// resampling pass.
const CHUNK_SIZE: usize = 1024;

/// Converts mono `i16` PCM from the device's native rate to the
/// configured rate, buffering partial chunks across [`Resampler::push`]
/// calls so callers can feed it arbitrarily-sized reads off the ring
/// buffer.
pub struct Resampler {
    inner: SincFixedIn<f32>,
    carry: Vec<i16>,
}

impl Resampler {
    pub fn new(source_rate: u32, target_rate: u32) -> Result<Self, ResampleError> {
        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        let inner = SincFixedIn::<f32>::new(
            f64::from(target_rate) / f64::from(source_rate),
            2.0,
            params,
            CHUNK_SIZE,
            1,
        )?;

        Ok(Self {
            inner,
            carry: Vec::with_capacity(CHUNK_SIZE * 2),
        })
    }

    /// Feeds `samples` into the carry buffer and returns every fully
    /// resampled chunk produced so far. Samples short of a full chunk
    /// remain buffered for the next call, so an empty return is normal
    /// while the buffer is still filling.
    pub fn push(&mut self, samples: &[i16]) -> Result<Vec<i16>, ResampleError> {
        self.carry.extend_from_slice(samples);
        let mut out = Vec::new();

        while self.carry.len() >= CHUNK_SIZE {
            let chunk: Vec<f32> = self.carry[..CHUNK_SIZE]
                .iter()
                .map(|&s| f32::from(s) / f32::from(i16::MAX))
                .collect();
            self.carry.drain(..CHUNK_SIZE);

            let waves_in = vec![chunk];
            let waves_out = self.inner.process(&waves_in, None)?;
            if let Some(channel) = waves_out.into_iter().next() {
                out.extend(
                    channel
                        .into_iter()
                        .map(|s| (s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16),
                );
            }
        }

        Ok(out)
    }
}
