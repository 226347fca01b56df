//! Sliding-window admission control.

mod backend;
mod gate;
mod limiter;
mod window;

pub use backend::AdmissionControl;
pub use gate::{
    AdmissionGate, Decision, ErrorResponse, Rejection, RejectionData, ResponseStatus,
    RATE_LIMIT_EXCEEDED,
};
pub use limiter::SlidingWindowLimiter;
pub use window::{RateWindow, WindowSettings, WindowSnapshot, MAX_BUCKETS};
