//! Meter controller: drives the measure → render loop.
//!
//! [`MeterController`] owns the capture session and everything derived from
//! it.  It never blocks and never spawns; all progress happens inside
//! [`start`](MeterController::start), [`stop`](MeterController::stop) and
//! [`on_frame`](MeterController::on_frame), which the host calls from its UI
//! thread.
//!
//! # Flow
//!
//! ```text
//! start()
//!   └─▶ CaptureSource::acquire ─▶ PendingCapture        [Idle, acquiring]
//!
//! on_frame()
//!   ├─▶ pending resolved Ok  ─▶ SignalBuffer + mapper    [Running]
//!   │                          └─▶ request_frame
//!   ├─▶ pending resolved Err ─▶ on_error                [Idle]
//!   └─▶ tick (if one was requested)
//!         read_window ─▶ estimate ─▶ to_decibels ─▶ on_reading
//!         └─▶ request_frame (exactly one successor)
//!
//! stop()
//!   └─▶ cancel tick, abandon acquisition, release session [Idle]
//! ```

use crate::audio::{
    level, CalibrationMapper, CaptureConstraints, CaptureError, CaptureSession, CaptureSource,
    PendingCapture, SignalBuffer,
};
use crate::config::{AnalysisConfig, AppConfig, CalibrationConfig};

use super::display::{Controls, MeterPresenter};
use super::scheduler::{FrameScheduler, TickHandle};
use super::state::MeterState;

// ---------------------------------------------------------------------------
// Measurement
// ---------------------------------------------------------------------------

/// Everything that lives exactly as long as one capture session.
struct Measurement {
    session: CaptureSession,
    buffer: SignalBuffer,
    mapper: CalibrationMapper,
}

// ---------------------------------------------------------------------------
// MeterController
// ---------------------------------------------------------------------------

/// Start/stop state machine and per-frame tick driver.
///
/// ```rust,no_run
/// use decibel_meter::audio::CpalSource;
/// use decibel_meter::config::AppConfig;
/// use decibel_meter::meter::{FrameScheduler, MeterController, MeterView, TickHandle};
///
/// struct EveryFrame(u64);
/// impl FrameScheduler for EveryFrame {
///     fn request_frame(&mut self) -> TickHandle {
///         self.0 += 1;
///         TickHandle(self.0)
///     }
///     fn cancel_frame(&mut self, _: TickHandle) {}
/// }
///
/// let mut view = MeterView::default();
/// let mut meter = MeterController::new(CpalSource::new(), EveryFrame(0), &AppConfig::default());
/// meter.start(&mut view);
/// loop {
///     meter.on_frame(&mut view);
///     println!("{}", view.text());
/// #   break;
/// }
/// ```
pub struct MeterController<S, F> {
    source: S,
    scheduler: F,
    constraints: CaptureConstraints,
    analysis: AnalysisConfig,
    calibration: CalibrationConfig,

    state: MeterState,
    acquiring: Option<PendingCapture>,
    measurement: Option<Measurement>,
    pending_tick: Option<TickHandle>,
}

impl<S: CaptureSource, F: FrameScheduler> MeterController<S, F> {
    pub fn new(source: S, scheduler: F, config: &AppConfig) -> Self {
        Self {
            source,
            scheduler,
            constraints: config.capture.to_constraints(),
            analysis: config.analysis.clone(),
            calibration: config.calibration.clone(),
            state: MeterState::Idle,
            acquiring: None,
            measurement: None,
            pending_tick: None,
        }
    }

    pub fn state(&self) -> MeterState {
        self.state
    }

    /// `true` while a microphone acquisition is outstanding.
    pub fn is_acquiring(&self) -> bool {
        self.acquiring.is_some()
    }

    pub fn has_pending_tick(&self) -> bool {
        self.pending_tick.is_some()
    }

    pub fn scheduler(&self) -> &F {
        &self.scheduler
    }

    /// Name of the device being measured, while running.
    pub fn device_name(&self) -> Option<&str> {
        self.measurement.as_ref().map(|m| m.session.device_name())
    }

    /// Begin measuring.  No-op while running or already acquiring.
    pub fn start(&mut self, presenter: &mut impl MeterPresenter) {
        if self.state.is_running() || self.acquiring.is_some() {
            log::debug!("meter: start ignored ({:?})", self.state);
            return;
        }

        log::info!("meter: acquiring microphone");
        self.acquiring = Some(self.source.acquire(&self.constraints));
        presenter.on_controls(Controls::active());

        // Sources that answer synchronously start measuring right away.
        self.poll_acquisition(presenter);
    }

    /// Stop measuring and release the microphone.  No-op when idle.
    pub fn stop(&mut self, presenter: &mut impl MeterPresenter) {
        if !self.state.is_running() && self.acquiring.is_none() {
            return;
        }

        self.teardown();
        presenter.on_reset();
        presenter.on_controls(Controls::idle());
        log::info!("meter: stopped");
    }

    /// Per-frame entry point.  Completes a pending acquisition, then runs the
    /// tick that was requested on the previous frame, if any.
    pub fn on_frame(&mut self, presenter: &mut impl MeterPresenter) {
        self.poll_acquisition(presenter);

        if self.pending_tick.take().is_some() {
            self.tick(presenter);
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn poll_acquisition(&mut self, presenter: &mut impl MeterPresenter) {
        let Some(outcome) = self.acquiring.as_ref().and_then(PendingCapture::try_complete) else {
            return;
        };
        self.acquiring = None;

        match outcome {
            Ok(session) => self.enter_running(session),
            Err(e) => self.fail(e, presenter),
        }
    }

    fn enter_running(&mut self, session: CaptureSession) {
        let buffer = SignalBuffer::new(&session, &self.analysis);
        let mapper = CalibrationMapper::new(
            self.calibration.policy.clone(),
            self.calibration.range(),
            buffer.kind(),
        );

        log::info!(
            "meter: measuring '{}' ({} Hz, {:?} window of {})",
            session.device_name(),
            session.sample_rate(),
            buffer.kind(),
            buffer.window_size()
        );

        self.measurement = Some(Measurement {
            session,
            buffer,
            mapper,
        });
        self.state = MeterState::Running;
        self.pending_tick = Some(self.scheduler.request_frame());
    }

    fn tick(&mut self, presenter: &mut impl MeterPresenter) {
        if !self.state.is_running() {
            return;
        }
        let Some(m) = self.measurement.as_mut() else {
            return;
        };

        let reading = m
            .buffer
            .read_window()
            .map(|window| m.mapper.to_decibels(level::estimate(&window)));

        match reading {
            Ok(reading) => {
                log::trace!("meter: {:.1} dB", reading.db());
                presenter.on_reading(reading);
            }
            Err(e) => {
                self.teardown();
                presenter.on_reset();
                self.fail(e, presenter);
                return;
            }
        }

        if self.state.is_running() {
            self.pending_tick = Some(self.scheduler.request_frame());
        }
    }

    /// Return to Idle and release everything.  Safe to call in any state.
    fn teardown(&mut self) {
        if let Some(handle) = self.pending_tick.take() {
            self.scheduler.cancel_frame(handle);
        }
        if self.acquiring.take().is_some() {
            log::info!("meter: acquisition abandoned");
        }
        if let Some(mut m) = self.measurement.take() {
            m.session.release();
        }
        self.state = MeterState::Idle;
    }

    fn fail(&mut self, error: CaptureError, presenter: &mut impl MeterPresenter) {
        log::warn!("meter: {error}");
        self.state = MeterState::Idle;
        presenter.on_error(&error);
        presenter.on_controls(Controls::idle());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{CaptureErrorKind, FakeCaptureSource, FakeMode};
    use crate::meter::{LevelLabel, ManualScheduler, MeterView};

    type TestMeter = MeterController<FakeCaptureSource, ManualScheduler>;

    /// Presenter that records every callback in order.
    #[derive(Debug, Default)]
    struct Recorder {
        readings: Vec<f64>,
        resets: usize,
        controls: Vec<Controls>,
        errors: Vec<CaptureErrorKind>,
    }

    impl MeterPresenter for Recorder {
        fn on_reading(&mut self, reading: crate::audio::DecibelReading) {
            self.readings.push(reading.db());
        }
        fn on_reset(&mut self) {
            self.resets += 1;
        }
        fn on_controls(&mut self, controls: Controls) {
            self.controls.push(controls);
        }
        fn on_error(&mut self, error: &CaptureError) {
            self.errors.push(error.kind());
        }
    }

    fn meter(source: &FakeCaptureSource) -> TestMeter {
        MeterController::new(
            source.clone(),
            ManualScheduler::default(),
            &AppConfig::default(),
        )
    }

    // ---- start -------------------------------------------------------------

    #[test]
    fn start_enters_running_and_schedules_one_tick() {
        let source = FakeCaptureSource::granting();
        let mut meter = meter(&source);
        let mut rec = Recorder::default();

        meter.start(&mut rec);

        assert_eq!(meter.state(), MeterState::Running);
        assert!(!meter.is_acquiring());
        assert!(meter.has_pending_tick());
        assert_eq!(meter.scheduler().requested.len(), 1);
        assert_eq!(rec.controls, vec![Controls::active()]);
        assert_eq!(meter.device_name(), Some("fake microphone"));
    }

    #[test]
    fn start_while_running_is_a_no_op() {
        let source = FakeCaptureSource::granting();
        let mut meter = meter(&source);
        let mut rec = Recorder::default();

        meter.start(&mut rec);
        meter.start(&mut rec);

        assert_eq!(source.acquisitions(), 1);
        assert_eq!(meter.scheduler().requested.len(), 1);
        assert_eq!(rec.controls.len(), 1);
        assert_eq!(meter.state(), MeterState::Running);
    }

    #[test]
    fn start_while_acquiring_is_a_no_op() {
        let source = FakeCaptureSource::deferred();
        let mut meter = meter(&source);
        let mut rec = Recorder::default();

        meter.start(&mut rec);
        meter.start(&mut rec);

        assert_eq!(source.acquisitions(), 1);
        assert!(meter.is_acquiring());
        assert_eq!(meter.state(), MeterState::Idle);
    }

    // ---- ticks -------------------------------------------------------------

    #[test]
    fn silent_window_reads_minimum_and_low() {
        let source = FakeCaptureSource::granting();
        source.tap().push(&[0.0, 0.0, 0.0, 0.0]);
        let mut meter = meter(&source);
        let mut view = MeterView::default();

        meter.start(&mut view);
        meter.on_frame(&mut view);

        let reading = view.reading().expect("one reading");
        assert_eq!(reading.db(), 30.0);
        assert_eq!(view.text(), "30.0 dB SPL");
        assert_eq!(view.fill_percent(), 0.0);
        assert_eq!(view.label(), Some(LevelLabel::Low));
    }

    #[test]
    fn anchor_level_reads_85_and_high() {
        let source = FakeCaptureSource::granting();
        source.tap().push(&[0.1; 2048]);
        let mut meter = meter(&source);
        let mut view = MeterView::default();

        meter.start(&mut view);
        meter.on_frame(&mut view);

        let reading = view.reading().expect("one reading");
        assert!((reading.db() - 85.0).abs() < 1e-3, "got {}", reading.db());
        assert_eq!(view.text(), "85.0 dB SPL");
        assert_eq!(view.label(), Some(LevelLabel::High));
    }

    #[test]
    fn each_tick_schedules_exactly_one_successor() {
        let source = FakeCaptureSource::granting();
        let mut meter = meter(&source);
        let mut rec = Recorder::default();

        meter.start(&mut rec);
        for _ in 0..5 {
            meter.on_frame(&mut rec);
        }

        assert_eq!(rec.readings.len(), 5);
        // One from start, one per tick.
        assert_eq!(meter.scheduler().requested.len(), 6);
        assert!(meter.has_pending_tick());
    }

    #[test]
    fn frame_without_requested_tick_does_nothing() {
        let source = FakeCaptureSource::granting();
        let mut meter = meter(&source);
        let mut rec = Recorder::default();

        meter.on_frame(&mut rec);
        assert!(rec.readings.is_empty());
        assert_eq!(meter.state(), MeterState::Idle);
        assert!(meter.scheduler().requested.is_empty());
    }

    // ---- stop --------------------------------------------------------------

    #[test]
    fn stop_twice_equals_stop_once() {
        let source = FakeCaptureSource::granting();
        let mut meter = meter(&source);
        let mut rec = Recorder::default();

        meter.start(&mut rec);
        meter.on_frame(&mut rec);
        meter.stop(&mut rec);
        meter.stop(&mut rec);

        assert_eq!(meter.state(), MeterState::Idle);
        assert_eq!(source.releases(), 1);
        assert_eq!(rec.resets, 1);
        assert_eq!(rec.controls, vec![Controls::active(), Controls::idle()]);
        assert_eq!(meter.scheduler().cancelled.len(), 1);
        assert!(!meter.has_pending_tick());
    }

    #[test]
    fn stop_when_idle_is_a_no_op() {
        let source = FakeCaptureSource::granting();
        let mut meter = meter(&source);
        let mut rec = Recorder::default();

        meter.stop(&mut rec);

        assert_eq!(rec.resets, 0);
        assert!(rec.controls.is_empty());
        assert_eq!(source.releases(), 0);
    }

    #[test]
    fn no_readings_after_stop() {
        let source = FakeCaptureSource::granting();
        let mut meter = meter(&source);
        let mut rec = Recorder::default();

        meter.start(&mut rec);
        meter.stop(&mut rec);
        meter.on_frame(&mut rec);
        meter.on_frame(&mut rec);

        assert!(rec.readings.is_empty());
    }

    #[test]
    fn stop_mid_acquisition_releases_late_session_once() {
        let source = FakeCaptureSource::deferred();
        let mut meter = meter(&source);
        let mut rec = Recorder::default();

        meter.start(&mut rec);
        assert!(meter.is_acquiring());
        assert_eq!(rec.controls, vec![Controls::active()]);

        meter.stop(&mut rec);
        assert!(!meter.is_acquiring());
        assert_eq!(meter.state(), MeterState::Idle);

        // The grant arrives after the user gave up.
        assert!(!source.resolve_deferred());
        assert_eq!(source.releases(), 1);

        meter.on_frame(&mut rec);
        assert_eq!(meter.state(), MeterState::Idle);
        assert!(rec.readings.is_empty());
    }

    #[test]
    fn deferred_grant_starts_on_next_frame() {
        let source = FakeCaptureSource::deferred();
        let mut meter = meter(&source);
        let mut rec = Recorder::default();

        meter.start(&mut rec);
        meter.on_frame(&mut rec);
        assert_eq!(meter.state(), MeterState::Idle);

        assert!(source.resolve_deferred());
        meter.on_frame(&mut rec);
        assert_eq!(meter.state(), MeterState::Running);
        assert!(rec.readings.is_empty());

        meter.on_frame(&mut rec);
        assert_eq!(rec.readings.len(), 1);
    }

    #[test]
    fn restart_after_stop_acquires_again() {
        let source = FakeCaptureSource::granting();
        let mut meter = meter(&source);
        let mut rec = Recorder::default();

        meter.start(&mut rec);
        meter.stop(&mut rec);
        meter.start(&mut rec);

        assert_eq!(source.acquisitions(), 2);
        assert_eq!(meter.state(), MeterState::Running);
        assert_eq!(source.releases(), 1);
    }

    // ---- errors ------------------------------------------------------------

    #[test]
    fn permission_denied_returns_to_idle_with_message() {
        let source =
            FakeCaptureSource::failing(CaptureError::PermissionDenied("user declined".into()));
        let mut meter = meter(&source);
        let mut view = MeterView::default();

        meter.start(&mut view);

        assert_eq!(meter.state(), MeterState::Idle);
        assert!(!meter.is_acquiring());
        assert_eq!(view.controls(), Controls::idle());
        let message = view.error_message().expect("error shown");
        assert!(message.contains("denied"), "{message}");
        assert_eq!(
            message,
            CaptureError::PermissionDenied(String::new()).user_message()
        );
    }

    #[test]
    fn retry_after_failure_clears_error() {
        let source = FakeCaptureSource::failing(CaptureError::DeviceNotFound("none".into()));
        let mut meter = meter(&source);
        let mut view = MeterView::default();

        meter.start(&mut view);
        assert!(view.error_message().is_some());

        source.set_mode(FakeMode::Grant);
        meter.start(&mut view);
        assert!(view.error_message().is_none());
        assert_eq!(meter.state(), MeterState::Running);
    }

    #[test]
    fn stream_fault_stops_meter_and_reports() {
        let source = FakeCaptureSource::granting();
        let mut meter = meter(&source);
        let mut rec = Recorder::default();

        meter.start(&mut rec);
        meter.on_frame(&mut rec);
        source
            .tap()
            .fail(CaptureError::DeviceNotFound("unplugged".into()));
        meter.on_frame(&mut rec);

        assert_eq!(meter.state(), MeterState::Idle);
        assert_eq!(rec.errors, vec![CaptureErrorKind::DeviceNotFound]);
        assert_eq!(rec.readings.len(), 1);
        assert_eq!(rec.controls.last(), Some(&Controls::idle()));
        assert_eq!(source.releases(), 1);
        assert!(!meter.has_pending_tick());

        // Already idle: stop changes nothing.
        meter.stop(&mut rec);
        assert_eq!(source.releases(), 1);
    }

    #[test]
    fn dropping_running_meter_releases_session() {
        let source = FakeCaptureSource::granting();
        let mut meter = meter(&source);
        let mut rec = Recorder::default();

        meter.start(&mut rec);
        drop(meter);
        assert_eq!(source.releases(), 1);
    }
}
