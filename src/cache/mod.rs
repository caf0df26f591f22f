// Cache module.
// Snapshot store, request coalescing, and the refresh policy that ties them together.

pub mod clock;
pub mod coalescer;
pub mod paths;
pub mod policy;
pub mod service;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use coalescer::{Coalescer, FetchOutcome, PendingOutcome};
pub use policy::{Decision, RefreshPolicy, Served};
pub use service::SnapshotCache;
pub use store::{CacheEntry, SnapshotStore};
