use serde::{Deserialize, Serialize};

use crate::error::TranslationError;

use super::{TranslateFuture, TranslationProvider, check_length, endpoint, truncate_body};

#[derive(Debug, Clone)]
pub struct LibreTranslate {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct LibreRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Deserialize)]
struct LibreResponse {
    #[serde(rename = "translatedText")]
    translated_text: Option<String>,
    error: Option<String>,
}

impl LibreTranslate {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
        }
    }
}

impl TranslationProvider for LibreTranslate {
    fn kind(&self) -> &'static str {
        "libretranslate"
    }

    fn translate<'a>(
        &'a self,
        text: &'a str,
        target_lang: &'a str,
        source_lang: &'a str,
    ) -> TranslateFuture<'a> {
        Box::pin(async move {
            check_length(text)?;
            let body = LibreRequest {
                q: text,
                source: source_lang,
                target: target_lang,
                format: "text",
                api_key: self.api_key.as_deref(),
            };
            let response = self
                .client
                .post(endpoint(&self.base_url, "/translate"))
                .json(&body)
                .send()
                .await?;
            let status = response.status();
            let payload = response.text().await?;
            if !status.is_success() {
                let message = parse_response(&payload)
                    .err()
                    .map(|err| err.to_string())
                    .unwrap_or(payload);
                return Err(TranslationError::Service {
                    status: status.as_u16(),
                    body: truncate_body(&message),
                });
            }
            parse_response(&payload)
        })
    }
}

fn parse_response(body: &str) -> Result<String, TranslationError> {
    let parsed: LibreResponse = serde_json::from_str(body)
        .map_err(|err| TranslationError::InvalidResponse(err.to_string()))?;
    if let Some(error) = parsed.error {
        return Err(TranslationError::InvalidResponse(error));
    }
    parsed
        .translated_text
        .ok_or_else(|| TranslationError::InvalidResponse("missing translatedText".into()))
}
