//! Live sound-pressure-level meter.
//!
//! ```text
//! Microphone → cpal callback → SampleTap (ring buffer) → SignalBuffer
//!           → level::estimate (RMS) → CalibrationMapper (dB) → MeterPresenter
//! ```
//!
//! [`meter::MeterController`] owns the start/stop state machine and runs one
//! measurement per display frame; [`app::DecibelMeterApp`] hosts it in an
//! egui window.

pub mod app;
pub mod audio;
pub mod config;
pub mod meter;
