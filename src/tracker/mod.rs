pub mod controller;
pub mod loop_worker;
pub mod state;

pub use controller::TrackerController;
pub use state::{TickOutcome, TrackerState, TrackerStatus};
