mod engine;
mod render;

use image::DynamicImage;

use crate::error::OcrError;

pub use engine::{TesseractEngine, bounded_size, filter_tokens, preprocess};
pub use render::{OverlayRenderer, OverlayStyle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct BBoxPx {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl BBoxPx {
    pub fn scaled(&self, sx: f32, sy: f32) -> BBoxPx {
        BBoxPx {
            x: (self.x as f32 * sx).round() as u32,
            y: (self.y as f32 * sy).round() as u32,
            w: (self.w as f32 * sx).round() as u32,
            h: (self.h as f32 * sy).round() as u32,
        }
    }
}

/// One span of text reported by the OCR engine. `id` is the engine's row
/// index, `conf` is 0-100 or -1 when the engine gave no usable score.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RecognizedToken {
    pub id: usize,
    pub text: String,
    pub conf: f32,
    pub bbox: BBoxPx,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedToken {
    pub token: RecognizedToken,
    pub translated: Option<String>,
}

/// Tokens of one image, in engine order, with the size of the image the
/// boxes refer to (the preprocessed image, not the upload).
#[derive(Debug, Clone, PartialEq)]
pub struct OcrResult {
    pub width: u32,
    pub height: u32,
    pub tokens: Vec<TranslatedToken>,
}

pub trait Recognizer: Send + Sync {
    fn recognize(
        &self,
        image: &DynamicImage,
        language: &str,
    ) -> Result<Vec<RecognizedToken>, OcrError>;

    fn languages(&self) -> Result<Vec<String>, OcrError> {
        Ok(Vec::new())
    }
}
