//! Byte-scaled frequency magnitudes, the way a browser `AnalyserNode`
//! produces them for `getByteFrequencyData`.
//!
//! Per call:
//!
//! 1. Blackman window over the newest `fft_size` time-domain samples.
//! 2. Forward FFT, magnitude divided by `fft_size`.
//! 3. Exponential smoothing against the previous call
//!    (`smoothing_time_constant`).
//! 4. `20·log10`, then a linear map of `[min_decibels, max_decibels]` onto
//!    `[0, 255]`, floored and clamped.
//!
//! The output has `fft_size / 2` bins.

use std::sync::Arc;

use rustfft::{num_complex::Complex, FftPlanner};

const DEFAULT_MIN_DECIBELS: f32 = -100.0;
const DEFAULT_MAX_DECIBELS: f32 = -30.0;

/// Stateful magnitude analyser; the smoothing memory lives across calls.
pub struct SpectrumAnalyser {
    fft: Arc<dyn rustfft::Fft<f32>>,
    fft_size: usize,
    window: Vec<f32>,
    smoothed: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    smoothing: f32,
    min_decibels: f32,
    max_decibels: f32,
}

impl SpectrumAnalyser {
    /// `fft_size` is raised to at least 2.  A decibel span that is empty,
    /// inverted or non-finite falls back to `[-100, -30]`.
    pub fn new(fft_size: usize, smoothing: f32, min_decibels: f32, max_decibels: f32) -> Self {
        let fft_size = fft_size.max(2);
        let usable =
            min_decibels.is_finite() && max_decibels.is_finite() && min_decibels < max_decibels;
        let (min_decibels, max_decibels) = if usable {
            (min_decibels, max_decibels)
        } else {
            log::warn!(
                "spectrum: decibel span [{min_decibels}, {max_decibels}] is unusable; \
                 using [{DEFAULT_MIN_DECIBELS}, {DEFAULT_MAX_DECIBELS}]"
            );
            (DEFAULT_MIN_DECIBELS, DEFAULT_MAX_DECIBELS)
        };

        let fft = FftPlanner::<f32>::new().plan_fft_forward(fft_size);
        Self {
            fft,
            fft_size,
            window: blackman(fft_size),
            smoothed: vec![0.0; fft_size / 2],
            scratch: vec![Complex::new(0.0, 0.0); fft_size],
            smoothing: if smoothing.is_nan() { 0.0 } else { smoothing.clamp(0.0, 1.0) },
            min_decibels,
            max_decibels,
        }
    }

    /// Number of frequency bins produced per call.
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Compute byte magnitudes of `time` (length `fft_size`) into `out`
    /// (length [`bin_count`](Self::bin_count)).  Each value is an integer in
    /// `[0, 255]` stored as `f32`.
    pub fn byte_frequency_data(&mut self, time: &[f32], out: &mut [f32]) {
        debug_assert_eq!(time.len(), self.fft_size);
        debug_assert_eq!(out.len(), self.bin_count());

        for ((slot, &sample), &w) in self.scratch.iter_mut().zip(time).zip(&self.window) {
            *slot = Complex::new(sample * w, 0.0);
        }
        self.fft.process(&mut self.scratch);

        let norm = 1.0 / self.fft_size as f32;
        let tau = self.smoothing;
        let scale = 255.0 / (self.max_decibels - self.min_decibels);

        for (k, byte) in out.iter_mut().enumerate() {
            let magnitude = self.scratch[k].norm() * norm;
            let smoothed = tau * self.smoothed[k] + (1.0 - tau) * magnitude;
            self.smoothed[k] = smoothed;

            *byte = if smoothed > 0.0 {
                let db = 20.0 * smoothed.log10();
                (scale * (db - self.min_decibels)).floor().clamp(0.0, 255.0)
            } else {
                0.0
            };
        }
    }
}

fn blackman(n: usize) -> Vec<f32> {
    const A0: f32 = 0.42;
    const A1: f32 = 0.5;
    const A2: f32 = 0.08;
    let tau = 2.0 * std::f32::consts::PI;
    (0..n)
        .map(|i| {
            let x = i as f32 / n as f32;
            A0 - A1 * (tau * x).cos() + A2 * (2.0 * tau * x).cos()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
