//! Configuration module for the decibel meter.
//!
//! Provides `AppConfig` (top-level settings) with one section per subsystem,
//! `AppPaths` for the cross-platform settings location, TOML persistence via
//! `AppConfig::load` / `AppConfig::save`, and range checks via
//! `AppConfig::validate`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AnalysisConfig, AppConfig, CalibrationConfig, CaptureConfig, ConfigError, UiConfig,
};
