//! Face emotion classifier backed by ONNX Runtime.
//!
//! Expects an ONNX export of the MobileNetV2-based face model with a single
//! image input and a single `[1, 4]` softmax output.

#[cfg(feature = "onnx")]
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::Value,
};
use std::path::PathBuf;

use super::preprocess::Preprocessor;
use super::{ClassifierError, FrameClassifier};
use crate::emotion::Prediction;
use crate::video::Frame;

/// Configuration for the ONNX face classifier
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Path to the ONNX model
    pub model_path: PathBuf,
    /// Number of threads for ONNX inference
    pub n_threads: usize,
    pub preprocessor: Preprocessor,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::new(),
            n_threads: 1,
            preprocessor: Preprocessor::default(),
        }
    }
}

/// Face emotion classifier using an ONNX Runtime session
#[cfg(feature = "onnx")]
pub struct OnnxFrameClassifier {
    session: Session,
    config: ClassifierConfig,
}

#[cfg(feature = "onnx")]
impl OnnxFrameClassifier {
    /// Load the model. The session lives until the classifier is dropped.
    pub fn new(config: ClassifierConfig) -> Result<Self, ClassifierError> {
        if !config.model_path.exists() {
            return Err(ClassifierError::ModelNotFound(config.model_path.clone()));
        }

        let session = Session::builder()
            .map_err(|e: ort::Error| ClassifierError::ModelLoadError(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e: ort::Error| ClassifierError::ModelLoadError(e.to_string()))?
            .with_intra_threads(config.n_threads)
            .map_err(|e: ort::Error| ClassifierError::ModelLoadError(e.to_string()))?
            .commit_from_file(&config.model_path)
            .map_err(|e: ort::Error| ClassifierError::ModelLoadError(e.to_string()))?;

        tracing::info!(
            "Face emotion model loaded from {:?} (input {:?})",
            config.model_path,
            config.preprocessor.input_shape()
        );

        Ok(Self { session, config })
    }

    fn infer(&mut self, tensor: Vec<f32>) -> Result<Vec<f32>, ClassifierError> {
        let input_shape = self.config.preprocessor.input_shape();

        let input_tensor = Value::from_array((input_shape, tensor))
            .map_err(|e: ort::Error| ClassifierError::InferenceError(e.to_string()))?;

        let outputs = self.session.run(ort::inputs![input_tensor])?;

        // Output is [batch, num_classes] = [1, 4]
        let output = outputs
            .iter()
            .next()
            .ok_or_else(|| ClassifierError::InferenceError("No output from model".to_string()))?;

        let scores = output.1.try_extract_tensor::<f32>()?;

        Ok(scores.1.to_vec())
    }
}

#[cfg(feature = "onnx")]
impl FrameClassifier for OnnxFrameClassifier {
    fn classify(&mut self, frame: &Frame) -> Result<Prediction, ClassifierError> {
        let tensor = self.config.preprocessor.to_tensor(frame)?;
        let scores = self.infer(tensor)?;

        let prediction = Prediction::from_scores(&scores).ok_or_else(|| {
            ClassifierError::InferenceError(format!(
                "Unexpected model output: {} values ({:?})",
                scores.len(),
                scores
            ))
        })?;

        tracing::debug!(
            "Frame {}: {} ({:.0}%)",
            frame.number,
            prediction.label(),
            prediction.confidence() * 100.0
        );

        Ok(prediction)
    }
}

// Stub implementation when feature is not enabled
#[cfg(not(feature = "onnx"))]
pub struct OnnxFrameClassifier;

#[cfg(not(feature = "onnx"))]
impl OnnxFrameClassifier {
    pub fn new(_config: ClassifierConfig) -> Result<Self, ClassifierError> {
        Err(ClassifierError::FeatureNotEnabled)
    }
}

#[cfg(not(feature = "onnx"))]
impl FrameClassifier for OnnxFrameClassifier {
    fn classify(&mut self, _frame: &Frame) -> Result<Prediction, ClassifierError> {
        Err(ClassifierError::FeatureNotEnabled)
    }

    fn is_ready(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClassifierConfig::default();
        assert_eq!(config.n_threads, 1);
        assert_eq!(config.preprocessor.input_size, 224);
    }

    #[cfg(feature = "onnx")]
    #[test]
    fn test_missing_model() {
        let config = ClassifierConfig {
            model_path: PathBuf::from("/nonexistent/face_model.onnx"),
            ..ClassifierConfig::default()
        };
        let result = OnnxFrameClassifier::new(config);
        assert!(matches!(result, Err(ClassifierError::ModelNotFound(_))));
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn test_stub_classifier() {
        let result = OnnxFrameClassifier::new(ClassifierConfig::default());
        assert!(matches!(result, Err(ClassifierError::FeatureNotEnabled)));
    }
}
