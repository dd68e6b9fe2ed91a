use thiserror::Error;

/// Failures that abort a single request.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("translation failed: {0}")]
    Translation(#[from] TranslationError),
}

/// OCR engine failures. These are recovered by the pipeline as "no text found".
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("ocr engine degraded: {0}")]
    EngineDegraded(String),
}

#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("translation request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("translation service error ({status}): {body}")]
    Service { status: u16, body: String },
    #[error("invalid translation response: {0}")]
    InvalidResponse(String),
    #[error("text too long to translate ({len} characters, max {max})")]
    TextTooLong { len: usize, max: usize },
}

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("camera disconnected: {0}")]
    Disconnected(String),
}
