//! Usage Tracking and Quota Module
//!
//! Per-owner consumption accounting for rate-limited models with fixed
//! per-minute and per-day windows.
//!
//! # Features
//!
//! - Fixed-window counters for requests, tokens and an auxiliary unit
//! - Lazy window rollover on every read and write
//! - Remaining-quota snapshots per owner and model
//! - Priority-ordered selection of models that still have quota
//! - Pluggable persistence (in-memory or PostgREST table)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Usage Tracker                          │
//! │        track · get · list · delete · remaining · select      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐          │
//! │  │ Window      │  │ Remaining   │  │ Selector    │          │
//! │  │ Policy      │  │ Calculator  │  │             │          │
//! │  └─────────────┘  └─────────────┘  └─────────────┘          │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                 Catalog (read-only)                  │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │          Usage Store (Memory | PostgREST)            │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod catalog;
pub mod clock;
pub mod remaining;
pub mod selector;
pub mod store;
pub mod tracker;
pub mod usage;
pub mod window;

#[cfg(test)]
mod proptests;

pub use catalog::{Catalog, ResourceDefinition};
pub use clock::{Clock, ManualClock, SystemClock};
pub use remaining::remaining;
pub use selector::{select, SelectRequest};
pub use store::{MemoryStore, RestStore, UsageStore};
pub use tracker::UsageTracker;
pub use usage::{RemainingQuota, UsageDelta, UsageRecord};
