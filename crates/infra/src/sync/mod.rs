//! Keeping the offer cache in step with the upstream service.
//!
//! - `service`: single-product sync, scheduled tick, on-demand refresh
//! - `scheduler`: cron timer + worker that drives the tick
//! - `locks`: per-product mutual exclusion shared by both paths

pub mod locks;
pub mod scheduler;
pub mod service;

pub use locks::ProductLocks;
pub use scheduler::{SchedulerError, SyncScheduler};
pub use service::{OfferSync, RefreshOutcome, SyncError, TickReport};
