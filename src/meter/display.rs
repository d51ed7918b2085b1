//! Presentation model: what the meter window shows for a reading.
//!
//! The controller reports through [`MeterPresenter`]; [`MeterView`] turns
//! those callbacks into the values the egui window paints:
//!
//! | Reading | Text | Fill | Label |
//! |---------|------|------|-------|
//! | none (after reset) | `-- dB SPL` | 0 % | none |
//! | 30.0 | `30.0 dB SPL` | 0 % | Low |
//! | 65.0 | `65.0 dB SPL` | 50 % | Average |
//! | 85.0 | `85.0 dB SPL` | 78.6 % | High |
//! | 100.0+ | `…` | 100 % | Extremely High |

use crate::audio::{CaptureError, DecibelReading};
use crate::config::UiConfig;

// ---------------------------------------------------------------------------
// Controls
// ---------------------------------------------------------------------------

/// Enablement of the Start / Stop buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    pub start_enabled: bool,
    pub stop_enabled: bool,
}

impl Controls {
    /// Nothing running: only Start is available.
    pub fn idle() -> Self {
        Self {
            start_enabled: true,
            stop_enabled: false,
        }
    }

    /// Acquiring or measuring: only Stop is available.
    pub fn active() -> Self {
        Self {
            start_enabled: false,
            stop_enabled: true,
        }
    }
}

impl Default for Controls {
    fn default() -> Self {
        Self::idle()
    }
}

// ---------------------------------------------------------------------------
// MeterPresenter
// ---------------------------------------------------------------------------

/// Receiver of everything the controller wants shown.
pub trait MeterPresenter {
    /// A fresh reading, once per tick.
    fn on_reading(&mut self, reading: DecibelReading);
    /// Measurement stopped: clear the reading.
    fn on_reset(&mut self);
    fn on_controls(&mut self, controls: Controls);
    /// A capture failure the user must act on.
    fn on_error(&mut self, error: &CaptureError);
}

// ---------------------------------------------------------------------------
// LevelLabel
// ---------------------------------------------------------------------------

/// Qualitative description of a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelLabel {
    Low,
    Average,
    High,
    ExtremelyHigh,
}

impl LevelLabel {
    /// Bucket a displayed (one-decimal) reading.  85.0 is still `High`.
    pub fn for_db(db: f64) -> Self {
        if db < 50.0 {
            LevelLabel::Low
        } else if db < 70.0 {
            LevelLabel::Average
        } else if db <= 85.0 {
            LevelLabel::High
        } else {
            LevelLabel::ExtremelyHigh
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            LevelLabel::Low => "Low",
            LevelLabel::Average => "Average",
            LevelLabel::High => "High",
            LevelLabel::ExtremelyHigh => "Extremely High",
        }
    }
}

/// A reading rounded to the single decimal the UI shows.
pub fn displayed_db(reading: DecibelReading) -> f64 {
    (reading.db() * 10.0).round() / 10.0
}

// ---------------------------------------------------------------------------
// MeterScale
// ---------------------------------------------------------------------------

/// Decibel span of the bar.  Readings outside it pin the bar to an end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterScale {
    pub floor_db: f64,
    pub ceiling_db: f64,
}

impl Default for MeterScale {
    fn default() -> Self {
        Self {
            floor_db: 30.0,
            ceiling_db: 100.0,
        }
    }
}

impl MeterScale {
    pub fn from_config(ui: &UiConfig) -> Self {
        Self {
            floor_db: ui.meter_floor_db,
            ceiling_db: ui.meter_ceiling_db,
        }
    }

    /// Bar fill in percent, `[0, 100]`.
    pub fn fill_percent(&self, db: f64) -> f64 {
        let span = self.ceiling_db - self.floor_db;
        if !(span > 0.0) || !db.is_finite() {
            return 0.0;
        }
        ((db - self.floor_db) * 100.0 / span).clamp(0.0, 100.0)
    }
}

// ---------------------------------------------------------------------------
// MeterView
// ---------------------------------------------------------------------------

/// Everything the meter window renders, updated through [`MeterPresenter`].
#[derive(Debug, Clone)]
pub struct MeterView {
    scale: MeterScale,
    reading: Option<DecibelReading>,
    controls: Controls,
    error: Option<String>,
}

impl MeterView {
    pub fn new(scale: MeterScale) -> Self {
        Self {
            scale,
            reading: None,
            controls: Controls::idle(),
            error: None,
        }
    }

    pub fn reading(&self) -> Option<DecibelReading> {
        self.reading
    }

    /// `"72.4 dB SPL"`, or `"-- dB SPL"` with no reading.
    pub fn text(&self) -> String {
        match self.reading {
            Some(r) => format!("{:.1} dB SPL", displayed_db(r)),
            None => "-- dB SPL".to_string(),
        }
    }

    pub fn fill_percent(&self) -> f64 {
        self.reading
            .map(|r| self.scale.fill_percent(r.db()))
            .unwrap_or(0.0)
    }

    pub fn label(&self) -> Option<LevelLabel> {
        self.reading.map(|r| LevelLabel::for_db(displayed_db(r)))
    }

    pub fn controls(&self) -> Controls {
        self.controls
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

impl Default for MeterView {
    fn default() -> Self {
        Self::new(MeterScale::default())
    }
}

impl MeterPresenter for MeterView {
    fn on_reading(&mut self, reading: DecibelReading) {
        self.reading = Some(reading);
    }

    fn on_reset(&mut self) {
        self.reading = None;
    }

    fn on_controls(&mut self, controls: Controls) {
        // Start was pressed: the previous failure is no longer relevant.
        if !controls.start_enabled {
            self.error = None;
        }
        self.controls = controls;
    }

    fn on_error(&mut self, error: &CaptureError) {
        self.error = Some(error.user_message().to_string());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
