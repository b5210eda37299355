use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::Path;
use tracing::{debug, info, warn};

use super::VideoError;
use crate::emotion::{EmotionLabel, SmoothedResult};

const TEXT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const MARGIN_X: i32 = 10;
const TITLE_Y: i32 = 10;
const TITLE_SCALE: f32 = 30.0;
const HEADER_Y: i32 = 50;
const LINE_HEIGHT: i32 = 30;
const LINE_SCALE: f32 = 20.0;
const BAR_HEIGHT: u32 = 14;
const BAR_MAX_WIDTH: f32 = 150.0;
/// Bars sit right of the text column when a font is loaded
const BAR_X_WITH_TEXT: i32 = 190;
/// Gap between a bar and the frame marking the smoothed label's row
const MARKER_PAD: i32 = 2;

/// Families tried, in order, when no font file is configured
const SYSTEM_FONT_FAMILIES: &[&str] = &["DejaVu Sans", "Liberation Sans", "sans-serif"];

/// Draws the smoothed emotion and class probabilities onto frames
pub struct Annotator {
    font: Option<FontVec>,
}

impl Annotator {
    /// Annotator without a font: only probability bars are drawn
    pub fn bars_only() -> Self {
        Self { font: None }
    }

    pub fn with_font(font: FontVec) -> Self {
        Self { font: Some(font) }
    }

    /// Load a TrueType/OpenType font from disk
    pub fn from_font_file(path: &Path) -> Result<Self, VideoError> {
        let bytes = std::fs::read(path)?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|e| VideoError::Font(format!("{:?}: {}", path, e)))?;
        info!("Loaded overlay font from {:?}", path);
        Ok(Self::with_font(font))
    }

    /// Look up a sans-serif font through fontconfig. `None` when fontconfig
    /// or a usable font is not installed.
    pub fn with_system_font() -> Option<Self> {
        let fc = fontconfig::Fontconfig::new()?;
        SYSTEM_FONT_FAMILIES.iter().find_map(|family| {
            let font = fc.find(family, None)?;
            match Self::from_font_file(&font.path) {
                Ok(annotator) => Some(annotator),
                Err(e) => {
                    debug!("Skipping system font {:?}: {}", font.path, e);
                    None
                }
            }
        })
    }

    /// Annotator for a configured font file, falling back to a system font
    /// and then to bars with the smoothed row marked
    pub fn load(font_path: Option<&Path>) -> Result<Self, VideoError> {
        if let Some(path) = font_path {
            return Self::from_font_file(path);
        }
        Ok(Self::with_system_font().unwrap_or_else(|| {
            warn!("No overlay font found, drawing probability bars only");
            Self::bars_only()
        }))
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Overlay `result` in the top-left corner of `image`
    pub fn annotate(&self, image: &mut RgbImage, result: &SmoothedResult) {
        let bar_x = match &self.font {
            Some(font) => {
                draw_text_mut(
                    image,
                    TEXT_COLOR,
                    MARGIN_X,
                    TITLE_Y,
                    PxScale::from(TITLE_SCALE),
                    font,
                    &format!("Emotion: {}", result.label),
                );
                draw_text_mut(
                    image,
                    TEXT_COLOR,
                    MARGIN_X,
                    HEADER_Y,
                    PxScale::from(LINE_SCALE),
                    font,
                    "Probabilities:",
                );
                for (row, label) in EmotionLabel::ALL.iter().enumerate() {
                    draw_text_mut(
                        image,
                        TEXT_COLOR,
                        MARGIN_X,
                        line_y(row),
                        PxScale::from(LINE_SCALE),
                        font,
                        &format!("{}: {:.2}", label, result.probabilities[label.index()]),
                    );
                }
                BAR_X_WITH_TEXT
            }
            None => MARGIN_X,
        };

        for (row, label) in EmotionLabel::ALL.iter().enumerate() {
            let width = bar_width(result.probabilities[label.index()]);
            let rect = Rect::at(bar_x, line_y(row) + 3).of_size(width, BAR_HEIGHT);
            draw_filled_rect_mut(image, rect, TEXT_COLOR);

            // The majority label need not have the longest bar, so frame its row
            if *label == result.label {
                let marker = Rect::at(bar_x - MARKER_PAD, line_y(row) + 3 - MARKER_PAD).of_size(
                    BAR_MAX_WIDTH as u32 + 2 * MARKER_PAD as u32,
                    BAR_HEIGHT + 2 * MARKER_PAD as u32,
                );
                draw_hollow_rect_mut(image, marker, TEXT_COLOR);
            }
        }
    }
}

fn line_y(row: usize) -> i32 {
    HEADER_Y + LINE_HEIGHT * (row as i32 + 1)
}

/// Rect sizes must be non-zero, so an empty bar is a 1px tick
fn bar_width(probability: f32) -> u32 {
    let p = if probability.is_finite() {
        probability.clamp(0.0, 1.0)
    } else {
        0.0
    };
    ((p * BAR_MAX_WIDTH).round() as u32).max(1)
}
