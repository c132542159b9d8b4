//! The polling engine: when to check a thread, how to fetch it cheaply, and
//! how to bring each subscriber up to date.

pub mod interval;
pub mod planner;
pub mod reconcile;
pub mod scheduler;

pub use interval::{calculate_interval, MAX_INTERVAL, MIN_INTERVAL};
pub use planner::{FetchedThread, SmartFetcher};
pub use reconcile::{find_new_posts, reconcile, ReconcileError, ReconcileOutcome};
pub use scheduler::{poll_loop, CycleOutcome, CycleStats, PollError, Scheduler};
