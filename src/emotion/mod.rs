//! Emotion labels and per-frame predictions.
//!
//! The face model emits one probability per class in a fixed order:
//! aggressive, lazy_nervous, normal, tired_sleepy.

mod label;
mod prediction;

pub use label::{EmotionLabel, NUM_LABELS};
pub use prediction::{Prediction, Probabilities, SmoothedResult};
