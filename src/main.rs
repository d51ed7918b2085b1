//! Application entry point for the Decibel Meter.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run) and
//!    validate it, falling back to defaults on any problem.
//! 3. Run [`eframe::run_native`], which blocks the main thread until the window
//!    is closed.  The microphone is only opened when the user presses Start.

use decibel_meter::{app::DecibelMeterApp, config::AppConfig};

use eframe::egui;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

fn load_config() -> AppConfig {
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            log::warn!("Failed to load config ({e:#}); using defaults");
            return AppConfig::default();
        }
    };

    match config.validate() {
        Ok(()) => config,
        Err(e) => {
            log::warn!("Invalid config ({e}); using defaults");
            AppConfig::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Native options builder
// ---------------------------------------------------------------------------

fn native_options(config: &AppConfig) -> eframe::NativeOptions {
    let mut vp = egui::ViewportBuilder::default()
        .with_decorations(false)
        .with_transparent(true)
        .with_inner_size([320.0, 190.0])
        .with_min_inner_size([260.0, 150.0])
        .with_resizable(false);

    if config.ui.always_on_top {
        vp = vp.with_always_on_top();
    }

    if let Some((x, y)) = config.ui.window_position {
        vp = vp.with_position(egui::pos2(x, y));
    }

    eframe::NativeOptions {
        viewport: vp,
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> eframe::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Decibel Meter starting up");

    let config = load_config();
    log::info!(
        "Analysis: {:?} window of {} samples, calibration {:?}",
        config.analysis.window_kind,
        config.analysis.fft_size,
        config.calibration.policy
    );

    let options = native_options(&config);

    eframe::run_native(
        "Decibel Meter",
        options,
        Box::new(move |cc| Ok(Box::new(DecibelMeterApp::new(cc.egui_ctx.clone(), config)))),
    )
}
