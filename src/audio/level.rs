//! RMS loudness of a sample window.
//!
//! # Example
//!
//! ```rust
//! use decibel_meter::audio::{level, SampleWindow, WindowKind};
//!
//! let window = SampleWindow::new(WindowKind::TimeDomain, vec![0.5, -0.5, 0.5, -0.5]);
//! let metric = level::estimate(&window);
//! assert!((metric.value() - 0.5).abs() < 1e-9);
//! ```

use super::window::SampleWindow;

/// Root-mean-square of a window.  Never negative, never NaN.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct LoudnessMetric(f64);

impl LoudnessMetric {
    /// Wrap a raw RMS value.  Negative or NaN input is stored as `0.0`.
    pub fn new(value: f64) -> Self {
        if value > 0.0 {
            Self(value)
        } else {
            Self(0.0)
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn is_silent(self) -> bool {
        self.0 == 0.0
    }
}

/// `sqrt(mean(sample²))` over the window.
pub fn estimate(window: &SampleWindow) -> LoudnessMetric {
    LoudnessMetric::new(rms(window.samples()))
}

/// RMS of a raw slice, accumulated in `f64`.  An empty slice yields `0.0`.
pub fn rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples
        .iter()
        .map(|&s| {
            let s = f64::from(s);
            s * s
        })
        .sum();
    (sum_sq / samples.len() as f64).sqrt()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::WindowKind;

    fn window(samples: &[f32]) -> SampleWindow {
        SampleWindow::new(WindowKind::TimeDomain, samples.to_vec())
    }

    #[test]
    fn all_zero_window_is_silent() {
        let metric = estimate(&window(&[0.0, 0.0, 0.0, 0.0]));
        assert_eq!(metric.value(), 0.0);
        assert!(metric.is_silent());
    }

    #[test]
    fn empty_window_is_silent() {
        assert_eq!(estimate(&window(&[])).value(), 0.0);
    }

    #[test]
    fn constant_signal_rms_equals_magnitude() {
        let metric = estimate(&window(&[0.1; 2048]));
        assert!((metric.value() - 0.1).abs() < 1e-7, "rms = {}", metric.value());
    }

    #[test]
    fn sine_rms_is_amplitude_over_root_two() {
        let n = 4800;
        let samples: Vec<f32> = (0..n)
            .map(|i| 0.8 * (2.0 * std::f32::consts::PI * 10.0 * i as f32 / n as f32).sin())
            .collect();
        let metric = estimate(&window(&samples));
        let expected = 0.8 / 2.0_f64.sqrt();
        assert!((metric.value() - expected).abs() < 1e-4, "rms = {}", metric.value());
    }

    #[test]
    fn byte_magnitudes_use_the_same_formula() {
        let bins = SampleWindow::new(WindowKind::FrequencyMagnitude, vec![255.0, 0.0, 255.0, 0.0]);
        let metric = estimate(&bins);
        assert!((metric.value() - 255.0 / 2.0_f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn any_nonzero_sample_gives_positive_rms() {
        // Smallest positive subnormal f32 must not vanish.
        let mut samples = vec![0.0_f32; 2048];
        samples[1000] = f32::from_bits(1);
        assert!(estimate(&window(&samples)).value() > 0.0);

        samples[1000] = -0.25;
        assert!(estimate(&window(&samples)).value() > 0.0);
    }

    #[test]
    fn metric_is_never_negative() {
        assert_eq!(LoudnessMetric::new(-1.0).value(), 0.0);
        assert_eq!(LoudnessMetric::new(f64::NAN).value(), 0.0);
        let w = window(&[-1.0, -0.5, -0.25]);
        assert!(estimate(&w).value() >= 0.0);
    }
}
