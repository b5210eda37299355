//! Single-frame facial emotion classification.
//!
//! `FrameClassifier` is the seam between the video driver and the model.
//! The production implementation runs an ONNX export of the face model;
//! tests substitute scripted classifiers.

mod onnx;
pub mod preprocess;

pub use onnx::{ClassifierConfig, OnnxFrameClassifier};
pub use preprocess::{Normalization, Preprocessor, TensorLayout, DEFAULT_INPUT_SIZE};

use std::path::PathBuf;
use thiserror::Error;

use crate::emotion::Prediction;
use crate::video::Frame;

/// Errors that can occur while classifying a frame
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Failed to load model: {0}")]
    ModelLoadError(String),

    #[error("Model not found at path: {0}")]
    ModelNotFound(PathBuf),

    #[error("Inference error: {0}")]
    InferenceError(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Feature not enabled: frame classification requires the 'onnx' feature")]
    FeatureNotEnabled,
}

#[cfg(feature = "onnx")]
impl From<ort::Error> for ClassifierError {
    fn from(e: ort::Error) -> Self {
        ClassifierError::InferenceError(e.to_string())
    }
}

/// Maps one decoded frame to an emotion prediction
pub trait FrameClassifier {
    /// Classify a frame. The label is the arg-max of the returned probabilities.
    fn classify(&mut self, frame: &Frame) -> Result<Prediction, ClassifierError>;

    /// Whether the underlying model is loaded and usable
    fn is_ready(&self) -> bool {
        true
    }
}

impl<C: FrameClassifier + ?Sized> FrameClassifier for Box<C> {
    fn classify(&mut self, frame: &Frame) -> Result<Prediction, ClassifierError> {
        (**self).classify(frame)
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }
}
