// Scheduled refresh.
// Keeps the configured users' snapshots warm on a fixed wall-clock schedule.

pub mod driver;
pub mod schedule;

pub use driver::{DEFAULT_KEY_DELAY, DriverState, PassReport, RefreshDriver};
pub use schedule::{DEFAULT_SCHEDULE, DEFAULT_TIMEZONE, RefreshSchedule};
