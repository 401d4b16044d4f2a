pub mod format;
pub mod logging;

pub use format::{date_range, format_duration, format_duration_detailed};
