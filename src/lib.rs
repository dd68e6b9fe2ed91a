use anyhow::{Context, Result};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod camera;
pub mod error;
pub mod logging;
pub mod ocr;
pub mod pipeline;
pub mod providers;
pub mod server;
pub mod settings;

#[cfg(test)]
mod test_util;

pub use camera::{CameraStatus, CameraSupervisor, LoopState, StartOutcome};
pub use pipeline::{OcrOptions, Pipeline, PipelineDefaults, TextTranslation};
pub use settings::Settings;

use camera::FfmpegCamera;
use ocr::{OverlayRenderer, Recognizer, TesseractEngine};

/// Builds the production pipeline: tesseract for OCR and the configured
/// translation provider.
pub fn build_pipeline(settings: &Settings) -> Result<Pipeline> {
    let recognizer = Arc::new(TesseractEngine::from_settings(&settings.ocr));
    let provider = Arc::new(providers::build_provider(&settings.translation)?);
    Ok(Pipeline::new(
        recognizer,
        provider,
        PipelineDefaults::from_settings(settings),
    ))
}

/// Builds the live-loop supervisor around the configured ffmpeg device.
pub fn build_camera(
    settings: &Settings,
    pipeline: Pipeline,
    preview_path: Option<PathBuf>,
) -> Result<Arc<CameraSupervisor>> {
    let device = Arc::new(FfmpegCamera::from_settings(&settings.camera));
    let renderer = OverlayRenderer::new(&settings.overlay)?;
    Ok(Arc::new(CameraSupervisor::new(
        device,
        pipeline,
        renderer,
        preview_path,
    )))
}

/// OCR + translation of an image file, formatted like the `/ocr/` response.
pub async fn run_ocr(settings: &Settings, image: &Path, options: OcrOptions) -> Result<String> {
    let bytes = std::fs::read(image)
        .with_context(|| format!("failed to read image: {}", image.display()))?;
    let pipeline = build_pipeline(settings)?;
    let handle = tokio::runtime::Handle::current();
    let result =
        tokio::task::spawn_blocking(move || handle.block_on(pipeline.ocr_image(&bytes, options)))
            .await??;
    server::render_ocr_json(result)
}

pub async fn run_translate(
    settings: &Settings,
    text: &str,
    target_lang: Option<&str>,
) -> Result<TextTranslation> {
    let pipeline = build_pipeline(settings)?;
    Ok(pipeline.translate_text(text, target_lang).await?)
}

/// Runs the live loop until `stop` resolves or the device goes away.
pub async fn run_camera<F>(
    settings: &Settings,
    target_lang: Option<&str>,
    preview_path: Option<PathBuf>,
    stop: F,
) -> Result<CameraStatus>
where
    F: Future<Output = ()>,
{
    let pipeline = build_pipeline(settings)?;
    let camera = build_camera(settings, pipeline, preview_path)?;
    Ok(camera.run_until(target_lang, stop).await)
}

pub fn list_languages(settings: &Settings) -> Result<Vec<String>> {
    let engine = TesseractEngine::from_settings(&settings.ocr);
    Ok(engine.languages()?)
}
