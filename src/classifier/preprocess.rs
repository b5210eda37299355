//! Frame preprocessing for the face emotion model
//!
//! The model was trained on square RGB crops with MobileNetV2 input scaling.
//! Frames are resized (no padding) and flattened into an f32 tensor.

use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};

use super::ClassifierError;
use crate::video::Frame;

/// Default square input edge in pixels
pub const DEFAULT_INPUT_SIZE: u32 = 224;

/// Pixel value scaling applied before inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// `x / 127.5 - 1`, range [-1, 1]
    #[default]
    #[serde(rename = "mobilenet_v2")]
    MobileNetV2,
    /// `x / 255`, range [0, 1]
    UnitRange,
}

impl Normalization {
    fn apply(self, value: u8) -> f32 {
        match self {
            Self::MobileNetV2 => value as f32 / 127.5 - 1.0,
            Self::UnitRange => value as f32 / 255.0,
        }
    }
}

/// Memory layout of the input tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// [batch, height, width, channels] (Keras export)
    #[default]
    Nhwc,
    /// [batch, channels, height, width]
    Nchw,
}

/// Preprocessing parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preprocessor {
    pub input_size: u32,
    pub normalization: Normalization,
    pub layout: TensorLayout,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self {
            input_size: DEFAULT_INPUT_SIZE,
            normalization: Normalization::default(),
            layout: TensorLayout::default(),
        }
    }
}

impl Preprocessor {
    /// Tensor shape for a single frame
    pub fn input_shape(&self) -> [usize; 4] {
        let size = self.input_size as usize;
        match self.layout {
            TensorLayout::Nhwc => [1, size, size, 3],
            TensorLayout::Nchw => [1, 3, size, size],
        }
    }

    /// Resize and normalise a frame into a flat tensor matching `input_shape`
    pub fn to_tensor(&self, frame: &Frame) -> Result<Vec<f32>, ClassifierError> {
        if frame.is_empty() {
            return Err(ClassifierError::InvalidFrame(format!(
                "frame {} has no pixels ({}x{})",
                frame.number,
                frame.width(),
                frame.height()
            )));
        }
        if self.input_size == 0 {
            return Err(ClassifierError::InvalidFrame(
                "model input size is zero".to_string(),
            ));
        }

        let size = self.input_size;
        let resized = if frame.width() == size && frame.height() == size {
            frame.image.clone()
        } else {
            imageops::resize(&frame.image, size, size, FilterType::Triangle)
        };

        let plane = (size * size) as usize;
        let mut tensor = vec![0.0f32; plane * 3];

        match self.layout {
            TensorLayout::Nhwc => {
                for (dst, src) in tensor.iter_mut().zip(resized.as_raw().iter()) {
                    *dst = self.normalization.apply(*src);
                }
            }
            TensorLayout::Nchw => {
                for (i, pixel) in resized.pixels().enumerate() {
                    for c in 0..3 {
                        tensor[c * plane + i] = self.normalization.apply(pixel[c]);
                    }
                }
            }
        }

        Ok(tensor)
    }
}
