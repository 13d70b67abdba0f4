//! Stream segmentation into 3.0-second overlapping windows (`spec.md`
//! §4.2, §8 invariant 2).

use chrono::{DateTime, Utc};

pub const WINDOW_SECONDS: f64 = 3.0;
pub const MIN_WINDOW_SECONDS: f64 = 1.5;

/// One segmented window of float32 PCM, zero-padded to the full window
/// length if it arrived short (but still at least [`MIN_WINDOW_SECONDS`]
/// long); the instant here is the window's start, used as the
/// `Detection::timestamp` for anything emitted from it.
pub struct Window {
    pub samples: Vec<f32>,
    pub start: DateTime<Utc>,
}

/// Buffers an endless `f32` sample stream into fixed-size, possibly
/// overlapping windows. A trailing window shorter than
/// [`MIN_WINDOW_SECONDS`] is discarded entirely (the caller sees no
/// [`Window`] for it); one between [`MIN_WINDOW_SECONDS`] and
/// [`WINDOW_SECONDS`] is zero-padded to the full length.
pub struct Windower {
    sample_rate: u32,
    window_len: usize,
    min_len: usize,
    hop_len: usize,
    buffer: Vec<f32>,
    /// Instant the next sample pushed into `buffer` corresponds to;
    /// advanced by one sample's worth of time per push so a window's
    /// `start` reflects the wall-clock time its first sample arrived.
    next_sample_at: DateTime<Utc>,
    sample_period: chrono::Duration,
}

impl Windower {
    pub fn new(sample_rate: u32, overlap_seconds: f64, start: DateTime<Utc>) -> Self {
        let window_len = (WINDOW_SECONDS * f64::from(sample_rate)).round() as usize;
        let min_len = (MIN_WINDOW_SECONDS * f64::from(sample_rate)).round() as usize;
        let overlap_len = (overlap_seconds * f64::from(sample_rate)).round() as usize;
        let hop_len = window_len.saturating_sub(overlap_len).max(1);

        let sample_period = chrono::Duration::nanoseconds(
            (1_000_000_000.0 / f64::from(sample_rate.max(1))).round() as i64,
        );

        Self {
            sample_rate,
            window_len,
            min_len,
            hop_len,
            buffer: Vec::with_capacity(window_len * 2),
            next_sample_at: start,
            sample_period,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Appends newly-read samples to the internal buffer and returns every
    /// full or long-enough-to-pad window that can now be emitted, sliding
    /// the buffer forward by `hop_len` after each one.
    pub fn push(&mut self, samples: &[f32]) -> Vec<Window> {
        self.buffer.extend_from_slice(samples);

        let mut windows = Vec::new();
        while self.buffer.len() >= self.window_len {
            let start = self.window_start_time(0);
            let mut win: Vec<f32> = self.buffer[..self.window_len].to_vec();
            win.resize(self.window_len, 0.0);
            windows.push(Window { samples: win, start });

            self.advance(self.hop_len);
        }
        windows
    }

    /// Drains whatever is left in the buffer at shutdown, discarding it if
    /// below [`MIN_WINDOW_SECONDS`] and zero-padding it to the full window
    /// length otherwise.
    pub fn flush(mut self) -> Option<Window> {
        if self.buffer.len() < self.min_len {
            return None;
        }
        let start = self.window_start_time(0);
        let mut win = std::mem::take(&mut self.buffer);
        win.resize(self.window_len, 0.0);
        Some(Window { samples: win, start })
    }

    fn window_start_time(&self, _offset: usize) -> DateTime<Utc> {
        self.next_sample_at
    }

    fn advance(&mut self, samples: usize) {
        let consumed = samples.min(self.buffer.len());
        self.buffer.drain(..consumed);
        self.next_sample_at += self.sample_period * consumed as i32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_a_full_window_at_the_configured_sample_rate() {
        let sample_rate = 100;
        let mut windower = Windower::new(sample_rate, 0.0, Utc::now());
        let samples = vec![0.5f32; (WINDOW_SECONDS * f64::from(sample_rate)) as usize];

        let windows = windower.push(&samples);
        assert_eq!(windows.len(), 1);
        assert_eq!(
            windows[0].samples.len(),
            (WINDOW_SECONDS * f64::from(sample_rate)).round() as usize
        );
    }

    #[test]
    fn overlap_produces_overlapping_windows_from_a_longer_stream() {
        let sample_rate = 100;
        let mut windower = Windower::new(sample_rate, 1.0, Utc::now());
        let samples = vec![0.1f32; (WINDOW_SECONDS * f64::from(sample_rate) * 2.0) as usize];

        let windows = windower.push(&samples);
        assert!(windows.len() >= 2);
    }

    #[test]
    fn trailing_short_buffer_under_minimum_is_discarded_on_flush() {
        let sample_rate = 100;
        let mut windower = Windower::new(sample_rate, 0.0, Utc::now());
        let samples = vec![0.2f32; (1.0 * f64::from(sample_rate)) as usize];
        windower.push(&samples);
        assert!(windower.flush().is_none());
    }

    #[test]
    fn trailing_buffer_between_minimum_and_full_is_zero_padded() {
        let sample_rate = 100;
        let mut windower = Windower::new(sample_rate, 0.0, Utc::now());
        let samples = vec![0.3f32; (2.0 * f64::from(sample_rate)) as usize];
        windower.push(&samples);

        let window = windower.flush().unwrap();
        assert_eq!(
            window.samples.len(),
            (WINDOW_SECONDS * f64::from(sample_rate)).round() as usize
        );
        assert_eq!(*window.samples.last().unwrap(), 0.0);
    }
}
