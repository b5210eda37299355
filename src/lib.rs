//! Facial emotion analysis of video clips.
//!
//! Frames are decoded, sampled, classified by a face emotion model, smoothed
//! over a sliding window of recent predictions, annotated and re-encoded.
//! A per-video summary reports the dominant emotion and label distribution.

pub mod classifier;
pub mod config;
pub mod emotion;
pub mod pipeline;
pub mod smoothing;
pub mod video;

#[cfg(test)]
mod pipeline_tests;

pub use classifier::{ClassifierError, FrameClassifier};
pub use config::Config;
pub use emotion::{EmotionLabel, Prediction, SmoothedResult};
pub use pipeline::{PipelineError, VideoPipeline, VideoSummary};
pub use smoothing::TemporalSmoother;
