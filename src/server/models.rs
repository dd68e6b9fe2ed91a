use serde::{Deserialize, Serialize};

use crate::ocr::OcrResult;

#[derive(Debug, Serialize)]
pub(crate) struct OcrResponse {
    pub(crate) boxes: Vec<BoxPayload>,
    pub(crate) width: u32,
    pub(crate) height: u32,
}

#[derive(Debug, Serialize)]
pub(crate) struct BoxPayload {
    pub(crate) id: usize,
    pub(crate) text: String,
    pub(crate) conf: f32,
    pub(crate) x: u32,
    pub(crate) y: u32,
    pub(crate) w: u32,
    pub(crate) h: u32,
    pub(crate) translated: Option<String>,
}

impl From<OcrResult> for OcrResponse {
    fn from(result: OcrResult) -> Self {
        let boxes = result
            .tokens
            .into_iter()
            .map(|item| BoxPayload {
                id: item.token.id,
                text: item.token.text,
                conf: item.token.conf,
                x: item.token.bbox.x,
                y: item.token.bbox.y,
                w: item.token.bbox.w,
                h: item.token.bbox.h,
                translated: item.translated,
            })
            .collect();
        Self {
            boxes,
            width: result.width,
            height: result.height,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct TranslateRequest {
    pub(crate) text: Option<String>,
    pub(crate) target_lang: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TranslateResponse {
    pub(crate) original: String,
    #[serde(rename = "translatedText")]
    pub(crate) translated_text: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct StartCameraQuery {
    pub(crate) target_lang: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct StatusResponse {
    pub(crate) status: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct LanguagesResponse {
    pub(crate) languages: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}
