//! Analysis windows read from a live capture session.
//!
//! [`SignalBuffer`] is bound to one [`CaptureSession`] and hands out a fresh
//! [`SampleWindow`] per meter tick.  What the window contains is fixed at
//! construction by [`WindowKind`]:
//!
//! | Kind | Length | Values |
//! |------|--------|--------|
//! | `TimeDomain` | `fft_size` | amplitude in `[-1.0, 1.0]` |
//! | `FrequencyMagnitude` | `fft_size / 2` | byte magnitude in `[0, 255]` |
//!
//! Both feed the same RMS estimator; the frequency variant is an
//! approximation of signal energy, not a spectral loudness measure.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::capture::{CaptureError, CaptureSession, SampleTap};
use super::spectrum::SpectrumAnalyser;
use crate::config::AnalysisConfig;

// ---------------------------------------------------------------------------
// WindowKind
// ---------------------------------------------------------------------------

/// Which representation of the signal a [`SignalBuffer`] produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    /// Normalised amplitude samples.
    #[default]
    TimeDomain,
    /// Byte-scaled frequency-bin magnitudes.
    FrequencyMagnitude,
}

impl WindowKind {
    /// Largest magnitude a sample of this kind can take.
    pub fn full_scale(self) -> f64 {
        match self {
            WindowKind::TimeDomain => 1.0,
            WindowKind::FrequencyMagnitude => 255.0,
        }
    }
}

// ---------------------------------------------------------------------------
// SampleWindow
// ---------------------------------------------------------------------------

/// The most recent buffered audio frame, in the representation of `kind`.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleWindow {
    kind: WindowKind,
    samples: Vec<f32>,
}

impl SampleWindow {
    pub fn new(kind: WindowKind, samples: Vec<f32>) -> Self {
        Self { kind, samples }
    }

    pub fn kind(&self) -> WindowKind {
        self.kind
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

// ---------------------------------------------------------------------------
// SignalBuffer
// ---------------------------------------------------------------------------

/// Window reader bound to a capture session's sample tap.
pub struct SignalBuffer {
    tap: Arc<SampleTap>,
    kind: WindowKind,
    /// Newest `fft_size` time-domain samples, reused across reads.
    time: Vec<f32>,
    spectrum: Option<SpectrumAnalyser>,
}

impl SignalBuffer {
    pub fn new(session: &CaptureSession, config: &AnalysisConfig) -> Self {
        let spectrum = match config.window_kind {
            WindowKind::TimeDomain => None,
            WindowKind::FrequencyMagnitude => Some(SpectrumAnalyser::new(
                config.fft_size,
                config.smoothing_time_constant,
                config.min_decibels,
                config.max_decibels,
            )),
        };

        log::debug!(
            "signal buffer: {:?} window over {} samples from '{}'",
            config.window_kind,
            config.fft_size,
            session.device_name()
        );

        Self {
            tap: session.tap(),
            kind: config.window_kind,
            time: vec![0.0; config.fft_size],
            spectrum,
        }
    }

    pub fn kind(&self) -> WindowKind {
        self.kind
    }

    /// Number of samples in every window this buffer returns.
    pub fn window_size(&self) -> usize {
        match &self.spectrum {
            Some(analyser) => analyser.bin_count(),
            None => self.time.len(),
        }
    }

    /// Read the current window.
    ///
    /// # Errors
    ///
    /// Returns the fault the stream reported since the last read, if any.
    pub fn read_window(&mut self) -> Result<SampleWindow, CaptureError> {
        if let Some(fault) = self.tap.take_fault() {
            return Err(fault);
        }

        self.tap.copy_latest(&mut self.time);

        let samples = match &mut self.spectrum {
            None => self.time.clone(),
            Some(analyser) => {
                let mut bins = vec![0.0; analyser.bin_count()];
                analyser.byte_frequency_data(&self.time, &mut bins);
                bins
            }
        };

        Ok(SampleWindow::new(self.kind, samples))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::capture::{CaptureConstraints, CaptureSource, FakeCaptureSource};

    fn analysis(kind: WindowKind, fft_size: usize) -> AnalysisConfig {
        AnalysisConfig {
            window_kind: kind,
            fft_size,
            ..AnalysisConfig::default()
        }
    }

    fn granted_session(source: &mut FakeCaptureSource) -> CaptureSession {
        source
            .acquire(&CaptureConstraints::default())
            .try_complete()
            .expect("fake resolves immediately")
            .expect("fake grants")
    }

    #[test]
    fn time_domain_window_has_fft_size_samples() {
        let mut source = FakeCaptureSource::granting();
        let session = granted_session(&mut source);
        let mut buffer = SignalBuffer::new(&session, &analysis(WindowKind::TimeDomain, 4));

        source.tap().push(&[0.1, 0.2, 0.3, 0.4, 0.5]);
        let window = buffer.read_window().unwrap();

        assert_eq!(buffer.window_size(), 4);
        assert_eq!(window.kind(), WindowKind::TimeDomain);
        assert_eq!(window.samples(), &[0.2, 0.3, 0.4, 0.5]);
    }

    #[test]
    fn frequency_window_has_half_fft_size_bins() {
        let mut source = FakeCaptureSource::granting();
        let session = granted_session(&mut source);
        let mut buffer =
            SignalBuffer::new(&session, &analysis(WindowKind::FrequencyMagnitude, 256));

        let window = buffer.read_window().unwrap();
        assert_eq!(buffer.window_size(), 128);
        assert_eq!(window.len(), 128);
        assert_eq!(window.kind(), WindowKind::FrequencyMagnitude);
        // Nothing captured yet: silent spectrum.
        assert!(window.samples().iter().all(|&b| b == 0.0));
    }

    #[test]
    fn stream_fault_surfaces_once() {
        let mut source = FakeCaptureSource::granting();
        let session = granted_session(&mut source);
        let mut buffer = SignalBuffer::new(&session, &analysis(WindowKind::TimeDomain, 4));

        source
            .tap()
            .fail(CaptureError::DeviceNotFound("unplugged".into()));

        assert!(matches!(
            buffer.read_window(),
            Err(CaptureError::DeviceNotFound(_))
        ));
        assert!(buffer.read_window().is_ok());
    }

    #[test]
    fn same_tone_reads_alike_in_both_windows() {
        use crate::audio::{level, CalibrationMapper, CalibrationPolicy, DecibelRange};

        let tone: Vec<f32> = (0..2048)
            .map(|i| 0.01 * (2.0 * std::f32::consts::PI * 64.0 * i as f32 / 2048.0).sin())
            .collect();

        let mut readings = Vec::new();
        for kind in [WindowKind::TimeDomain, WindowKind::FrequencyMagnitude] {
            let mut source = FakeCaptureSource::granting();
            let session = granted_session(&mut source);
            let mut buffer = SignalBuffer::new(&session, &analysis(kind, 2048));
            let mapper = CalibrationMapper::new(
                CalibrationPolicy::default(),
                DecibelRange::default(),
                kind,
            );

            source.tap().push(&tone);
            let window = buffer.read_window().unwrap();
            readings.push(mapper.to_decibels(level::estimate(&window)).db());
        }

        // A -43 dBFS tone sits mid-scale on either window, nowhere near the clamp.
        for &db in &readings {
            assert!(db > 40.0 && db < 110.0, "readings {readings:?}");
        }
    }

    #[test]
    fn full_scale_matches_kind() {
        assert_eq!(WindowKind::TimeDomain.full_scale(), 1.0);
        assert_eq!(WindowKind::FrequencyMagnitude.full_scale(), 255.0);
    }

    #[test]
    fn default_kind_is_time_domain() {
        assert_eq!(WindowKind::default(), WindowKind::TimeDomain);
    }
}
