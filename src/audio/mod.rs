//! Audio side of the meter: microphone capture → sample windows → RMS → dB.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → downmix_to_mono → SampleTap (RingBuffer)
//!           → SignalBuffer::read_window ─┬─ TimeDomain: newest fft_size samples
//!                                        └─ FrequencyMagnitude: SpectrumAnalyser bytes
//!           → level::estimate (RMS) → CalibrationMapper::to_decibels
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use decibel_meter::audio::{
//!     level, CalibrationMapper, CaptureConstraints, CaptureSource, CpalSource, SignalBuffer,
//! };
//! use decibel_meter::config::AppConfig;
//!
//! let config = AppConfig::default();
//! let pending = CpalSource::new().acquire(&CaptureConstraints::default());
//! let session = loop {
//!     if let Some(outcome) = pending.try_complete() {
//!         break outcome.unwrap();
//!     }
//! };
//! let mut buffer = SignalBuffer::new(&session, &config.analysis);
//! let mapper = CalibrationMapper::new(
//!     config.calibration.policy.clone(),
//!     config.calibration.range(),
//!     buffer.kind(),
//! );
//! let window = buffer.read_window().unwrap();
//! println!("{:.1} dB", mapper.to_decibels(level::estimate(&window)).db());
//! ```

pub mod buffer;
pub mod calibration;
pub mod capture;
pub mod level;
pub mod spectrum;
pub mod window;

pub use buffer::RingBuffer;
pub use calibration::{CalibrationMapper, CalibrationPolicy, DecibelRange, DecibelReading};
pub use capture::{
    downmix_to_mono, CaptureConstraints, CaptureError, CaptureErrorKind, CaptureSession,
    CaptureSource, CpalSource, PendingCapture, SampleTap,
};
pub use level::LoudnessMetric;
pub use spectrum::SpectrumAnalyser;
pub use window::{SampleWindow, SignalBuffer, WindowKind};

#[cfg(test)]
pub use capture::{FakeCaptureSource, FakeMode};
