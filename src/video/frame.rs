use image::{DynamicImage, RgbImage};

/// A decoded RGB video frame
#[derive(Debug, Clone)]
pub struct Frame {
    /// 1-based position of the frame in the stream
    pub number: u64,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(number: u64, image: RgbImage) -> Self {
        Self { number, image }
    }

    /// Build a frame from a packed rgb24 buffer.
    /// Returns `None` if the buffer length does not match the dimensions.
    pub fn from_rgb24(number: u64, width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        RgbImage::from_raw(width, height, data).map(|image| Self { number, image })
    }

    /// Wrap a still image as frame number 1
    pub fn from_image(image: DynamicImage) -> Self {
        Self::new(1, image.to_rgb8())
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }

    pub fn as_rgb24(&self) -> &[u8] {
        self.image.as_raw()
    }
}
