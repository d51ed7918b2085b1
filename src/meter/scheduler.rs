//! Frame scheduling capability.
//!
//! The controller never loops on its own; it asks a [`FrameScheduler`] for
//! the next display frame and does its work when the host calls back into
//! [`MeterController::on_frame`](super::MeterController::on_frame).  The
//! egui host implements this by requesting a repaint; tests step frames by
//! hand with `ManualScheduler`.

/// Identifies one requested frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TickHandle(pub u64);

/// Source of display-refresh callbacks.
pub trait FrameScheduler {
    /// Ask for one more frame.
    fn request_frame(&mut self) -> TickHandle;

    /// Withdraw a request made with [`request_frame`](Self::request_frame).
    fn cancel_frame(&mut self, handle: TickHandle);
}

// ---------------------------------------------------------------------------
// ManualScheduler (tests only)
// ---------------------------------------------------------------------------

/// Scheduler that only counts; the test decides when frames happen.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct ManualScheduler {
    next: u64,
    pub requested: Vec<TickHandle>,
    pub cancelled: Vec<TickHandle>,
}

#[cfg(test)]
impl FrameScheduler for ManualScheduler {
    fn request_frame(&mut self) -> TickHandle {
        self.next += 1;
        let handle = TickHandle(self.next);
        self.requested.push(handle);
        handle
    }

    fn cancel_frame(&mut self, handle: TickHandle) {
        self.cancelled.push(handle);
    }
}
