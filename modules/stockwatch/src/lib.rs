pub mod app;
pub mod checks;
pub mod cycle;
pub mod notify;
pub mod scheduler;
pub mod sources;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use app::App;
pub use cycle::{Cycle, CycleStats, SourceOutcome, StockMonitor};
pub use scheduler::{Scheduler, SchedulerStats};
pub use store::{SeenStore, SqliteSeenStore};
