//! Temporal smoothing of noisy per-frame predictions.
//!
//! A `TemporalSmoother` owns a fixed-capacity window of the most recent
//! predictions and derives a stabilised label (majority vote) and
//! probability vector (component-wise mean) from it on every query.

mod smoother;
mod window;

pub use smoother::{SmootherError, TemporalSmoother, DEFAULT_WINDOW_SIZE};
pub use window::SmoothingWindow;
