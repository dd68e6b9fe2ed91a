use axum::http::StatusCode;
use tracing::debug;

use crate::error::PipelineError;
use crate::pipeline::OcrOptions;

use super::models::{OcrResponse, TranslateRequest, TranslateResponse};
use super::state::ServerState;
use super::util::{non_blank, parse_threshold};

#[derive(Debug)]
pub(crate) struct ServerError {
    pub(crate) status: StatusCode,
    pub(crate) message: String,
}

impl ServerError {
    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<PipelineError> for ServerError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::InvalidInput(message) => ServerError::bad_request(message),
            PipelineError::Translation(err) => ServerError::internal(err.to_string()),
        }
    }
}

/// Fields of an `/ocr/` multipart upload.
#[derive(Debug, Default)]
pub(crate) struct OcrForm {
    pub(crate) file: Option<Vec<u8>>,
    pub(crate) target_lang: Option<String>,
    pub(crate) src_lang: Option<String>,
    pub(crate) bbox_conf_threshold: Option<String>,
}

pub(crate) async fn ocr_request(
    state: &ServerState,
    form: OcrForm,
) -> Result<OcrResponse, ServerError> {
    let Some(file) = form.file else {
        return Err(ServerError::bad_request("file is required"));
    };
    let options = OcrOptions {
        source_lang: non_blank(form.src_lang),
        target_lang: non_blank(form.target_lang),
        threshold: parse_threshold(form.bbox_conf_threshold.as_deref())?,
    };
    debug!("ocr: {} byte upload, options {:?}", file.len(), options);
    let result = state.pipeline.ocr_image(&file, options).await?;
    Ok(OcrResponse::from(result))
}

pub(crate) async fn translate_request(
    state: &ServerState,
    request: TranslateRequest,
) -> Result<TranslateResponse, ServerError> {
    let text = request.text.unwrap_or_default();
    let translation = state
        .pipeline
        .translate_text(&text, request.target_lang.as_deref())
        .await?;
    Ok(TranslateResponse {
        original: translation.original,
        translated_text: translation.translated,
    })
}
