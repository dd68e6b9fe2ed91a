use serde_json::Value;
use tracing::debug;

use crate::error::TranslationError;

use super::{TranslateFuture, TranslationProvider, check_length, endpoint, truncate_body};

const TRANSLATE_PATH: &str = "/translate_a/single";

/// Client for the public Google Translate endpoint used by browser widgets.
#[derive(Debug, Clone)]
pub struct GoogleTranslate {
    client: reqwest::Client,
    base_url: String,
}

impl GoogleTranslate {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

impl TranslationProvider for GoogleTranslate {
    fn kind(&self) -> &'static str {
        "google"
    }

    fn translate<'a>(
        &'a self,
        text: &'a str,
        target_lang: &'a str,
        source_lang: &'a str,
    ) -> TranslateFuture<'a> {
        Box::pin(async move {
            check_length(text)?;
            let url = endpoint(&self.base_url, TRANSLATE_PATH);
            debug!(
                "google: translating {} chars ({} -> {})",
                text.chars().count(),
                source_lang,
                target_lang
            );
            let response = self
                .client
                .get(&url)
                .query(&[
                    ("client", "gtx"),
                    ("sl", source_lang),
                    ("tl", target_lang),
                    ("dt", "t"),
                    ("q", text),
                ])
                .send()
                .await?;

            let status = response.status();
            let body = response.text().await?;
            if !status.is_success() {
                return Err(TranslationError::Service {
                    status: status.as_u16(),
                    body: truncate_body(&body),
                });
            }
            parse_translation(&body)
        })
    }
}

/// Joins the translated segments of a `translate_a/single` response.
///
/// The payload is a nested array whose first element lists
/// `[translated, original, ...]` pairs, one per sentence.
pub(crate) fn parse_translation(body: &str) -> Result<String, TranslationError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|err| TranslationError::InvalidResponse(err.to_string()))?;
    let segments = value
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| TranslationError::InvalidResponse("missing translation segments".into()))?;

    let mut translated = String::new();
    for segment in segments {
        if let Some(part) = segment.get(0).and_then(Value::as_str) {
            translated.push_str(part);
        }
    }
    if translated.is_empty() {
        return Err(TranslationError::InvalidResponse(
            "translation segments are empty".into(),
        ));
    }
    Ok(translated)
}
