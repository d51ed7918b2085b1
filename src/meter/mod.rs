//! The meter: start/stop state machine, frame-tick loop and the
//! presentation model it reports to.
//!
//! # Architecture
//!
//! ```text
//! egui update() ──▶ MeterController::on_frame ──▶ MeterPresenter (MeterView)
//!        ▲                    │
//!        └── request_repaint ◀┘ FrameScheduler
//! ```

pub mod controller;
pub mod display;
pub mod scheduler;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use controller::MeterController;
pub use display::{displayed_db, Controls, LevelLabel, MeterPresenter, MeterScale, MeterView};
pub use scheduler::{FrameScheduler, TickHandle};
pub use state::MeterState;

#[cfg(test)]
pub use scheduler::ManualScheduler;
