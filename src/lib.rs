//! modelquota Library
//!
//! Per-owner usage tracking for rate-limited models: fixed-window counters,
//! remaining-quota snapshots, priority-based model selection, and the HTTP
//! service that exposes them.

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod quota;
pub mod server;

pub use error::{QuotaError, Result};
