use futures_util::stream::{self, StreamExt};
use image::DynamicImage;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::ocr::{
    OcrResult, RecognizedToken, Recognizer, TranslatedToken, filter_tokens, preprocess,
};
use crate::providers::{AUTO_SOURCE, TranslationProvider};
use crate::settings::Settings;

/// Shown in place of a translation when the live loop cannot translate a frame.
pub const TRANSLATION_FAILED_MARKER: &str = "❌ Translation failed";

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineDefaults {
    pub source_lang: String,
    pub target_lang: String,
    pub threshold: f32,
    pub max_dimension: u32,
    pub concurrency: usize,
}

impl PipelineDefaults {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            source_lang: settings.ocr.source_lang.clone(),
            target_lang: settings.translation.target_lang.clone(),
            threshold: settings.ocr.confidence_threshold,
            max_dimension: settings.ocr.max_dimension,
            concurrency: settings.translation.concurrency.max(1),
        }
    }
}

/// Per-call overrides. `None` or blank strings fall back to the defaults.
#[derive(Debug, Clone, Default)]
pub struct OcrOptions {
    pub source_lang: Option<String>,
    pub target_lang: Option<String>,
    pub threshold: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextTranslation {
    pub original: String,
    pub translated: String,
}

/// What the live loop learned from one frame. Boxes are in the coordinate
/// space of the `width`x`height` processed image.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutcome {
    pub text: String,
    pub translated: String,
    pub tokens: Vec<RecognizedToken>,
    pub width: u32,
    pub height: u32,
}

/// Image to tokens to translations. Holds no mutable state; clones share the
/// engines.
///
/// Recognition runs synchronously inside the async methods, so callers drive
/// them from a blocking-capable thread (`spawn_blocking` + `Handle::block_on`).
#[derive(Clone)]
pub struct Pipeline {
    recognizer: Arc<dyn Recognizer>,
    provider: Arc<dyn TranslationProvider>,
    defaults: PipelineDefaults,
}

impl Pipeline {
    pub fn new(
        recognizer: Arc<dyn Recognizer>,
        provider: Arc<dyn TranslationProvider>,
        defaults: PipelineDefaults,
    ) -> Self {
        Self {
            recognizer,
            provider,
            defaults,
        }
    }

    pub fn defaults(&self) -> &PipelineDefaults {
        &self.defaults
    }

    /// Decodes, preprocesses, recognizes, filters and translates one upload.
    ///
    /// Only an undecodable image is an error; OCR and translation failures
    /// degrade to "no tokens" and `translated: None` respectively.
    pub async fn ocr_image(
        &self,
        image_bytes: &[u8],
        options: OcrOptions,
    ) -> Result<OcrResult, PipelineError> {
        let image = decode_image(image_bytes)?;
        let source_lang = resolve(options.source_lang.as_deref(), &self.defaults.source_lang);
        let target_lang = resolve(options.target_lang.as_deref(), &self.defaults.target_lang);
        let threshold = options.threshold.unwrap_or(self.defaults.threshold);

        let (tokens, width, height) = self.recognize_filtered(&image, &source_lang, threshold);
        debug!(
            "ocr: {} tokens kept (lang={}, threshold={}, {}x{})",
            tokens.len(),
            source_lang,
            threshold,
            width,
            height
        );
        let tokens = self.translate_tokens(tokens, &target_lang).await;
        Ok(OcrResult {
            width,
            height,
            tokens,
        })
    }

    /// Returns the surviving tokens and the processed image size.
    pub fn recognize_filtered(
        &self,
        image: &DynamicImage,
        language: &str,
        threshold: f32,
    ) -> (Vec<RecognizedToken>, u32, u32) {
        let processed = preprocess(image, self.defaults.max_dimension);
        let (width, height) = processed.dimensions();
        let tokens = match self
            .recognizer
            .recognize(&DynamicImage::ImageLuma8(processed), language)
        {
            Ok(tokens) => filter_tokens(tokens, threshold),
            Err(err) => {
                warn!("ocr: {}; continuing without text", err);
                Vec::new()
            }
        };
        (tokens, width, height)
    }

    /// Translates every token, keeping engine order. Identical texts within
    /// one call share a single request; a failed request leaves those tokens
    /// untranslated without affecting the others.
    pub async fn translate_tokens(
        &self,
        tokens: Vec<RecognizedToken>,
        target_lang: &str,
    ) -> Vec<TranslatedToken> {
        let mut seen = HashSet::new();
        let unique = tokens
            .iter()
            .filter(|token| seen.insert(token.text.as_str()))
            .map(|token| token.text.clone())
            .collect::<Vec<_>>();

        let provider = self.provider.as_ref();
        let translations: HashMap<String, Option<String>> = stream::iter(unique)
            .map(|text| async move {
                let translated = match provider.translate(&text, target_lang, AUTO_SOURCE).await {
                    Ok(translated) => Some(translated),
                    Err(err) => {
                        warn!("translate: {:?} -> {} failed: {}", text, target_lang, err);
                        None
                    }
                };
                (text, translated)
            })
            .buffered(self.defaults.concurrency.max(1))
            .collect()
            .await;

        tokens
            .into_iter()
            .map(|token| {
                let translated = translations.get(&token.text).cloned().flatten();
                TranslatedToken { token, translated }
            })
            .collect()
    }

    /// Translates free text. Blank text is rejected without calling the
    /// translation service; service failures are returned to the caller.
    pub async fn translate_text(
        &self,
        text: &str,
        target_lang: Option<&str>,
    ) -> Result<TextTranslation, PipelineError> {
        if text.trim().is_empty() {
            return Err(PipelineError::InvalidInput("No text provided".to_string()));
        }
        let target_lang = resolve(target_lang, &self.defaults.target_lang);
        let translated = self
            .provider
            .translate(text, &target_lang, AUTO_SOURCE)
            .await?;
        Ok(TextTranslation {
            original: text.to_string(),
            translated,
        })
    }

    /// One live-loop step: the frame's filtered tokens are joined and
    /// translated with a single request.
    pub async fn process_frame(&self, frame: &DynamicImage, target_lang: &str) -> FrameOutcome {
        let (tokens, width, height) = self.recognize_filtered(
            frame,
            &self.defaults.source_lang,
            self.defaults.threshold,
        );
        let text = tokens
            .iter()
            .map(|token| token.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let translated = if text.is_empty() {
            String::new()
        } else {
            let request = self.provider.translate(&text, target_lang, AUTO_SOURCE);
            match request.await {
                Ok(translated) => translated,
                Err(err) => {
                    warn!("translate: frame text failed: {}", err);
                    TRANSLATION_FAILED_MARKER.to_string()
                }
            }
        };

        FrameOutcome {
            text,
            translated,
            tokens,
            width,
            height,
        }
    }

    pub fn ocr_languages(&self) -> Result<Vec<String>, crate::error::OcrError> {
        self.recognizer.languages()
    }
}

/// Decodes an uploaded image. Bytes sniffed as a non-image type are rejected
/// before decoding is attempted.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::InvalidInput(
            "Invalid image file: empty upload".to_string(),
        ));
    }
    if let Some(kind) = infer::get(bytes) {
        if kind.matcher_type() != infer::MatcherType::Image {
            return Err(PipelineError::InvalidInput(format!(
                "Invalid image file: unsupported content type {}",
                kind.mime_type()
            )));
        }
        debug!("decode: sniffed {}", kind.mime_type());
    }
    image::load_from_memory(bytes)
        .map_err(|err| PipelineError::InvalidInput(format!("Invalid image file: {}", err)))
}

fn resolve(value: Option<&str>, default: &str) -> String {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(default)
        .to_string()
}
