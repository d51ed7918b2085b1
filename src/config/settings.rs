//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files.  Every section is
//! `#[serde(default)]`, so a settings file only needs the keys it changes.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::AppPaths;
use crate::audio::{CalibrationPolicy, CaptureConstraints, DecibelRange, WindowKind};

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// A setting that parsed but is outside the range the meter can work with.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("analysis.fft_size must be a power of two in 32..=32768, got {0}")]
    FftSize(usize),

    #[error("analysis.smoothing_time_constant must be within [0, 1], got {0}")]
    Smoothing(f32),

    #[error("analysis.min_decibels ({min}) must be below analysis.max_decibels ({max})")]
    AnalyserRange { min: f32, max: f32 },

    #[error("capture.buffer_samples ({buffer}) must hold a window of {fft_size} samples")]
    BufferTooSmall { buffer: usize, fft_size: usize },

    #[error("calibration.min_db ({min}) must be below calibration.max_db ({max})")]
    DecibelRange { min: f64, max: f64 },

    #[error("calibration.policy.{field} must be positive and finite, got {value}")]
    PolicyParameter { field: &'static str, value: f64 },

    #[error("calibration.policy.{field} must be finite, got {value}")]
    PolicyOffset { field: &'static str, value: f64 },

    #[error("ui.meter_floor_db ({floor}) must be below ui.meter_ceiling_db ({ceiling})")]
    MeterScale { floor: f64, ceiling: f64 },
}

// ---------------------------------------------------------------------------
// CaptureConfig
// ---------------------------------------------------------------------------

/// Microphone selection and the processing the meter asks the device for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Input device name; `None` means the system default.
    pub device: Option<String>,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    /// Must stay off for meaningful readings.
    pub auto_gain_control: bool,
    /// Capacity of the capture ring buffer in mono samples.
    pub buffer_samples: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        let c = CaptureConstraints::default();
        Self {
            device: c.device,
            echo_cancellation: c.echo_cancellation,
            noise_suppression: c.noise_suppression,
            auto_gain_control: c.auto_gain_control,
            buffer_samples: c.buffer_samples,
        }
    }
}

impl CaptureConfig {
    pub fn to_constraints(&self) -> CaptureConstraints {
        CaptureConstraints {
            device: self.device.clone(),
            echo_cancellation: self.echo_cancellation,
            noise_suppression: self.noise_suppression,
            auto_gain_control: self.auto_gain_control,
            buffer_samples: self.buffer_samples,
        }
    }
}

// ---------------------------------------------------------------------------
// AnalysisConfig
// ---------------------------------------------------------------------------

/// Shape of the window each meter tick analyses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub window_kind: WindowKind,
    /// Time-domain samples per analysis (the frequency variant yields half
    /// as many bins).
    pub fft_size: usize,
    /// Frequency variant only: weight of the previous tick's magnitudes.
    pub smoothing_time_constant: f32,
    /// Frequency variant only: dB mapped to byte 0.
    pub min_decibels: f32,
    /// Frequency variant only: dB mapped to byte 255.
    pub max_decibels: f32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_kind: WindowKind::default(),
            fft_size: 2048,
            smoothing_time_constant: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

// ---------------------------------------------------------------------------
// CalibrationConfig
// ---------------------------------------------------------------------------

/// RMS → dB mapping and the clamp range of the result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub min_db: f64,
    pub max_db: f64,
    pub policy: CalibrationPolicy,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        let range = DecibelRange::default();
        Self {
            min_db: range.min_db,
            max_db: range.max_db,
            policy: CalibrationPolicy::default(),
        }
    }
}

impl CalibrationConfig {
    pub fn range(&self) -> DecibelRange {
        DecibelRange {
            min_db: self.min_db,
            max_db: self.max_db,
        }
    }
}

// ---------------------------------------------------------------------------
// UiConfig
// ---------------------------------------------------------------------------

/// egui window appearance and meter scale settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Reading shown as an empty bar.
    pub meter_floor_db: f64,
    /// Reading shown as a full bar.
    pub meter_ceiling_db: f64,
    /// Keep the meter floating above all other windows.
    pub always_on_top: bool,
    /// Window position `(x, y)` in screen pixels, stored when the window
    /// closes.  `None` means let the OS / window manager pick a position.
    pub window_position: Option<(f32, f32)>,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            meter_floor_db: 30.0,
            meter_ceiling_db: 100.0,
            always_on_top: false,
            window_position: None,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use decibel_meter::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
/// config.validate().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Microphone settings.
    pub capture: CaptureConfig,
    /// Window shape / analyser settings.
    pub analysis: AnalysisConfig,
    /// Decibel mapping settings.
    pub calibration: CalibrationConfig,
    /// UI / window settings.
    pub ui: UiConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// (first-run scenario) so callers never need to special-case a missing
    /// file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Record the window position in the platform-appropriate
    /// `settings.toml`.
    pub fn store_window_position(position: (f32, f32)) -> Result<()> {
        Self::store_window_position_to(&AppPaths::new().settings_file, position)
    }

    /// Record the window position at `path`, keeping every other value that
    /// file holds.  A malformed file is left untouched.
    pub fn store_window_position_to(path: &std::path::Path, position: (f32, f32)) -> Result<()> {
        let mut config = Self::load_from(path)?;
        config.ui.window_position = Some(position);
        config.save_to(path)
    }

    /// Check every value the meter depends on.  Reports the first problem.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let a = &self.analysis;
        if !a.fft_size.is_power_of_two() || !(32..=32_768).contains(&a.fft_size) {
            return Err(ConfigError::FftSize(a.fft_size));
        }
        if !(0.0..=1.0).contains(&a.smoothing_time_constant) {
            return Err(ConfigError::Smoothing(a.smoothing_time_constant));
        }
        if !(a.min_decibels < a.max_decibels) {
            return Err(ConfigError::AnalyserRange {
                min: a.min_decibels,
                max: a.max_decibels,
            });
        }
        if self.capture.buffer_samples < a.fft_size {
            return Err(ConfigError::BufferTooSmall {
                buffer: self.capture.buffer_samples,
                fft_size: a.fft_size,
            });
        }

        let c = &self.calibration;
        if !(c.min_db.is_finite() && c.max_db.is_finite() && c.min_db < c.max_db) {
            return Err(ConfigError::DecibelRange {
                min: c.min_db,
                max: c.max_db,
            });
        }
        validate_policy(&c.policy)?;

        let ui = &self.ui;
        if !(ui.meter_floor_db.is_finite()
            && ui.meter_ceiling_db.is_finite()
            && ui.meter_floor_db < ui.meter_ceiling_db)
        {
            return Err(ConfigError::MeterScale {
                floor: ui.meter_floor_db,
                ceiling: ui.meter_ceiling_db,
            });
        }

        Ok(())
    }
}

fn validate_policy(policy: &CalibrationPolicy) -> std::result::Result<(), ConfigError> {
    let positive = |field: &'static str, value: f64| {
        if value.is_finite() && value > 0.0 {
            Ok(())
        } else {
            Err(ConfigError::PolicyParameter { field, value })
        }
    };
    let finite = |field: &'static str, value: f64| {
        if value.is_finite() {
            Ok(())
        } else {
            Err(ConfigError::PolicyOffset { field, value })
        }
    };

    match *policy {
        CalibrationPolicy::PressureReferenced {
            sensitivity,
            pressure_scale,
            reference_pressure,
            offset_db,
        } => {
            positive("sensitivity", sensitivity)?;
            positive("pressure_scale", pressure_scale)?;
            positive("reference_pressure", reference_pressure)?;
            finite("offset_db", offset_db)
        }
        CalibrationPolicy::SelfReferenced {
            anchor_rms,
            anchor_db,
        } => {
            positive("anchor_rms", anchor_rms)?;
            finite("anchor_db", anchor_db)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
