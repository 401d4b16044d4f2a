pub mod reports;
pub mod session;

pub use reports::{AggregateRow, DailyUsage, RankingRow, StatsRange};
pub use session::{UsageLog, UsageSession};
