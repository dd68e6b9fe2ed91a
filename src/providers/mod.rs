use anyhow::{Result, anyhow};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::error::TranslationError;
use crate::settings::TranslationSettings;

mod google;
mod libretranslate;

pub use google::GoogleTranslate;
pub use libretranslate::LibreTranslate;

/// Source language value that asks the service to detect the language.
pub const AUTO_SOURCE: &str = "auto";

/// Longest text accepted per call; the public endpoints reject larger payloads.
pub const MAX_TEXT_CHARS: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Google,
    LibreTranslate,
}

impl ProviderKind {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(ProviderKind::Google),
            "libretranslate" | "libre" => Ok(ProviderKind::LibreTranslate),
            other => Err(anyhow!(
                "unknown translation provider '{}' (expected google or libretranslate)",
                other
            )),
        }
    }
}

pub type TranslateFuture<'a> =
    Pin<Box<dyn Future<Output = Result<String, TranslationError>> + Send + 'a>>;

pub trait TranslationProvider: Send + Sync {
    fn kind(&self) -> &'static str;

    fn translate<'a>(
        &'a self,
        text: &'a str,
        target_lang: &'a str,
        source_lang: &'a str,
    ) -> TranslateFuture<'a>;
}

#[derive(Debug, Clone)]
pub enum ProviderImpl {
    Google(GoogleTranslate),
    LibreTranslate(LibreTranslate),
}

impl TranslationProvider for ProviderImpl {
    fn kind(&self) -> &'static str {
        match self {
            ProviderImpl::Google(provider) => provider.kind(),
            ProviderImpl::LibreTranslate(provider) => provider.kind(),
        }
    }

    fn translate<'a>(
        &'a self,
        text: &'a str,
        target_lang: &'a str,
        source_lang: &'a str,
    ) -> TranslateFuture<'a> {
        match self {
            ProviderImpl::Google(provider) => provider.translate(text, target_lang, source_lang),
            ProviderImpl::LibreTranslate(provider) => {
                provider.translate(text, target_lang, source_lang)
            }
        }
    }
}

pub fn build_provider(settings: &TranslationSettings) -> Result<ProviderImpl> {
    let kind = ProviderKind::parse(&settings.provider)?;
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.timeout_secs))
        .build()
        .map_err(|err| anyhow!("failed to build HTTP client: {}", err))?;
    let provider = match kind {
        ProviderKind::Google => {
            ProviderImpl::Google(GoogleTranslate::new(client, settings.base_url.clone()))
        }
        ProviderKind::LibreTranslate => ProviderImpl::LibreTranslate(LibreTranslate::new(
            client,
            settings.base_url.clone(),
            settings.api_key.clone(),
        )),
    };
    Ok(provider)
}

pub(crate) fn check_length(text: &str) -> Result<(), TranslationError> {
    let len = text.chars().count();
    if len > MAX_TEXT_CHARS {
        return Err(TranslationError::TextTooLong {
            len,
            max: MAX_TEXT_CHARS,
        });
    }
    Ok(())
}

pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

/// Keeps service error bodies short enough for logs and API responses.
pub(crate) fn truncate_body(body: &str) -> String {
    const LIMIT: usize = 300;
    let trimmed = body.trim();
    if trimmed.chars().count() <= LIMIT {
        return trimmed.to_string();
    }
    let mut out = trimmed.chars().take(LIMIT).collect::<String>();
    out.push('…');
    out
}
