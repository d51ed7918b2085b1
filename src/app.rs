//! Decibel meter window: the egui/eframe application.
//!
//! # Architecture
//!
//! [`DecibelMeterApp`] is the top-level [`eframe::App`].  It owns the
//! [`MeterController`] and the [`MeterView`] the controller reports into.
//! Every `update()` call is one display frame: the controller gets its
//! `on_frame`, then the view is painted.
//!
//! The controller keeps itself ticking through [`EguiScheduler`], which asks
//! egui for another repaint; when the meter stops, nothing requests repaints
//! and the window goes quiet.
//!
//! # Layout
//!
//! | Row | Content |
//! |-----|---------|
//! | title bar | draggable title, settings / minimise / close |
//! | readout | `72.4 dB SPL` |
//! | bar | fill from `ui.meter_floor_db` to `ui.meter_ceiling_db` |
//! | label | Low / Average / High / Extremely High |
//! | controls | Start / Stop (Space toggles) |
//! | error | the last capture failure, until the next Start |

use std::time::Duration;

use eframe::egui;

use crate::audio::CpalSource;
use crate::config::AppConfig;
use crate::meter::{
    FrameScheduler, LevelLabel, MeterController, MeterScale, MeterView, TickHandle,
};

// ---------------------------------------------------------------------------
// EguiScheduler
// ---------------------------------------------------------------------------

/// [`FrameScheduler`] that requests an egui repaint per tick.
///
/// egui has no way to withdraw a repaint request, so cancelling is a no-op;
/// the controller ignores the stray frame because it no longer holds a tick.
pub struct EguiScheduler {
    ctx: egui::Context,
    next: u64,
}

impl EguiScheduler {
    pub fn new(ctx: egui::Context) -> Self {
        Self { ctx, next: 0 }
    }
}

impl FrameScheduler for EguiScheduler {
    fn request_frame(&mut self) -> TickHandle {
        self.next += 1;
        self.ctx.request_repaint();
        TickHandle(self.next)
    }

    fn cancel_frame(&mut self, _handle: TickHandle) {}
}

// ---------------------------------------------------------------------------
// DecibelMeterApp
// ---------------------------------------------------------------------------

/// eframe application: the meter window.
pub struct DecibelMeterApp {
    controller: MeterController<CpalSource, EguiScheduler>,
    view: MeterView,
    /// Whether the settings summary replaces the meter panel.
    show_settings: bool,
    /// Application configuration (read-only after startup).
    config: AppConfig,
    /// Outer window position seen on the latest frame.
    window_position: Option<(f32, f32)>,
}

impl DecibelMeterApp {
    /// * `ctx`: the egui context from the creation callback.
    /// * `config`: loaded, validated application configuration.
    pub fn new(ctx: egui::Context, config: AppConfig) -> Self {
        let controller =
            MeterController::new(CpalSource::new(), EguiScheduler::new(ctx), &config);
        Self {
            controller,
            view: MeterView::new(MeterScale::from_config(&config.ui)),
            show_settings: false,
            window_position: config.ui.window_position,
            config,
        }
    }

    fn toggle(&mut self) {
        if self.view.controls().start_enabled {
            self.controller.start(&mut self.view);
        } else {
            self.controller.stop(&mut self.view);
        }
    }

    // ── Custom title bar ─────────────────────────────────────────────────

    /// Draggable title with window controls (settings, minimise, close).
    fn draw_title_bar(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.horizontal(|ui| {
            let title_resp = ui.label(
                egui::RichText::new("Decibel Meter")
                    .color(egui::Color32::from_rgb(200, 200, 200))
                    .size(13.0),
            );
            if title_resp.is_pointer_button_down_on() {
                if let Some(outer_rect) = ctx.input(|i| i.viewport().outer_rect) {
                    let delta = ctx.input(|i| i.pointer.delta());
                    ctx.send_viewport_cmd(egui::ViewportCommand::OuterPosition(
                        outer_rect.min + delta,
                    ));
                }
            }

            ui.label(
                egui::RichText::new(self.controller.state().label())
                    .color(egui::Color32::from_rgb(120, 120, 120))
                    .size(11.0),
            );

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if title_button(ui, "x", egui::Color32::from_rgb(200, 100, 100)).clicked() {
                    ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                }
                if title_button(ui, "-", egui::Color32::from_rgb(150, 150, 150)).clicked() {
                    ctx.send_viewport_cmd(egui::ViewportCommand::Minimized(true));
                }
                if title_button(ui, "=", egui::Color32::from_rgb(150, 150, 150)).clicked() {
                    self.show_settings = !self.show_settings;
                }
            });
        });
    }

    // ── Meter panel ──────────────────────────────────────────────────────

    fn draw_meter(&mut self, ui: &mut egui::Ui) {
        let label = self.view.label();
        let accent = label.map(label_color).unwrap_or(egui::Color32::from_rgb(120, 120, 120));

        ui.add_space(4.0);
        ui.vertical_centered(|ui| {
            ui.label(
                egui::RichText::new(self.view.text())
                    .color(egui::Color32::from_rgb(230, 230, 230))
                    .size(28.0)
                    .monospace(),
            );
        });

        ui.add_space(4.0);
        self.draw_bar(ui, accent);

        ui.add_space(2.0);
        ui.vertical_centered(|ui| {
            let text = label.map(LevelLabel::text).unwrap_or(" ");
            ui.label(egui::RichText::new(text).color(accent).size(13.0));
        });

        ui.add_space(6.0);
        self.draw_controls(ui);

        if let Some(message) = self.view.error_message() {
            ui.add_space(4.0);
            ui.label(
                egui::RichText::new(message)
                    .color(egui::Color32::from_rgb(255, 136, 68))
                    .size(11.0),
            );
        }
    }

    /// Horizontal bar filled to the view's fill percentage.
    fn draw_bar(&self, ui: &mut egui::Ui, color: egui::Color32) {
        let (rect, _) = ui.allocate_exact_size(
            egui::vec2(ui.available_width(), 18.0),
            egui::Sense::hover(),
        );

        let painter = ui.painter();
        painter.rect_filled(rect, 4.0, egui::Color32::from_rgb(55, 55, 55));

        let fraction = (self.view.fill_percent() / 100.0) as f32;
        if fraction > 0.0 {
            let mut filled = rect;
            filled.set_width(rect.width() * fraction);
            painter.rect_filled(filled, 4.0, color);
        }
    }

    fn draw_controls(&mut self, ui: &mut egui::Ui) {
        let controls = self.view.controls();
        ui.horizontal(|ui| {
            if ui
                .add_enabled(
                    controls.start_enabled,
                    egui::Button::new(egui::RichText::new("Start").size(13.0)),
                )
                .clicked()
            {
                self.controller.start(&mut self.view);
            }
            if ui
                .add_enabled(
                    controls.stop_enabled,
                    egui::Button::new(egui::RichText::new("Stop").size(13.0)),
                )
                .clicked()
            {
                self.controller.stop(&mut self.view);
            }
            if self.controller.is_acquiring() {
                ui.spinner();
            }
        });
    }

    /// Render the settings summary.
    fn draw_settings(&self, ui: &mut egui::Ui) {
        ui.add_space(4.0);
        let device = self
            .controller
            .device_name()
            .or(self.config.capture.device.as_deref())
            .unwrap_or("system default");
        setting_line(ui, format!("  Device: {device}"));
        setting_line(
            ui,
            format!(
                "  Window: {:?}, {} samples",
                self.config.analysis.window_kind, self.config.analysis.fft_size
            ),
        );
        setting_line(ui, format!("  Calibration: {:?}", self.config.calibration.policy));
        setting_line(
            ui,
            format!(
                "  Range: {:.0} to {:.0} dB",
                self.config.calibration.min_db, self.config.calibration.max_db
            ),
        );
    }
}

fn setting_line(ui: &mut egui::Ui, text: String) {
    ui.label(
        egui::RichText::new(text)
            .color(egui::Color32::from_rgb(140, 140, 140))
            .size(11.0),
    );
}

fn title_button(ui: &mut egui::Ui, text: &str, color: egui::Color32) -> egui::Response {
    ui.add(egui::Button::new(egui::RichText::new(text).color(color).size(12.0)).frame(false))
}

fn outer_position(rect: Option<egui::Rect>) -> Option<(f32, f32)> {
    rect.map(|r| (r.min.x, r.min.y))
}

fn label_color(label: LevelLabel) -> egui::Color32 {
    match label {
        LevelLabel::Low => egui::Color32::from_rgb(80, 200, 120),
        LevelLabel::Average => egui::Color32::from_rgb(200, 200, 80),
        LevelLabel::High => egui::Color32::from_rgb(255, 160, 60),
        LevelLabel::ExtremelyHigh => egui::Color32::from_rgb(255, 68, 68),
    }
}

// ---------------------------------------------------------------------------
// eframe::App impl
// ---------------------------------------------------------------------------

impl eframe::App for DecibelMeterApp {
    /// One display frame: keyboard, meter tick, then paint.
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if ctx.input(|i| i.key_pressed(egui::Key::Space)) {
            self.toggle();
        }

        if let Some(position) = outer_position(ctx.input(|i| i.viewport().outer_rect)) {
            self.window_position = Some(position);
        }

        self.controller.on_frame(&mut self.view);

        // Keep polling while the OS is still deciding on microphone access.
        if self.controller.is_acquiring() {
            ctx.request_repaint_after(Duration::from_millis(50));
        }

        let frame = egui::Frame::new()
            .fill(egui::Color32::from_rgba_premultiplied(30, 30, 30, 235))
            .corner_radius(egui::CornerRadius::same(8))
            .inner_margin(egui::Margin::same(8));

        egui::CentralPanel::default().frame(frame).show(ctx, |ui| {
            self.draw_title_bar(ui, ctx);
            ui.separator();

            if self.show_settings {
                self.draw_settings(ui);
            } else {
                self.draw_meter(ui);
            }
        });
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.controller.stop(&mut self.view);
        if let Some(position) = self.window_position {
            if self.config.ui.window_position != Some(position) {
                if let Err(e) = AppConfig::store_window_position(position) {
                    log::warn!("Failed to save window position: {e:#}");
                }
            }
        }
        log::info!("decibel meter closing");
    }
}
