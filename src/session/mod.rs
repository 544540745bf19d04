//! Session lifecycle: cooperative stop and the end-of-run report.

pub mod control;
pub mod report;

pub use control::{StopToken, Watchdog};
pub use report::{SessionReporter, SessionSummary, LAST_SESSION_FILE};
