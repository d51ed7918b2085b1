//! Meter run state.

// ---------------------------------------------------------------------------
// MeterState
// ---------------------------------------------------------------------------

/// States of the meter.
///
/// ```text
/// Idle ──start + acquisition granted──▶ Running
/// Running ──stop──▶ Idle
/// Running ──stream fault──▶ Idle   (error reported)
/// Idle ──acquisition failed──▶ Idle (error reported)
/// ```
///
/// An acquisition in flight does not change the state; the controller
/// tracks it separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeterState {
    /// No capture session; nothing is measured.
    #[default]
    Idle,
    /// A session is live and frame ticks are being scheduled.
    Running,
}

impl MeterState {
    pub fn is_running(self) -> bool {
        self == MeterState::Running
    }

    /// A short label for the status line.
    ///
    /// ```
    /// use decibel_meter::meter::MeterState;
    ///
    /// assert_eq!(MeterState::Idle.label(), "Stopped");
    /// assert_eq!(MeterState::Running.label(), "Measuring");
    /// ```
    pub fn label(self) -> &'static str {
        match self {
            MeterState::Idle => "Stopped",
            MeterState::Running => "Measuring",
        }
    }
}
