//! Windowgate - Sliding-Window Request Admission Gate
//!
//! This crate decides, for a stream of calls sharing one process-wide quota,
//! whether each call may proceed. The quota is enforced by a sliding-window
//! counter over a ring of fixed-duration buckets; rejected callers get an
//! estimate of how long to wait before retrying.

pub mod config;
pub mod error;
pub mod load;
pub mod ratelimit;
pub mod telemetry;
