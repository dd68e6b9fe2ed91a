use anyhow::{Context, Result};
use tera::{Context as TeraContext, Tera};

const CAMERA_TEMPLATE: &str = include_str!("templates/camera.html.tera");
const REFRESH_MS: u64 = 500;

/// Renders the live preview page served at `/camera`.
pub(crate) fn render_camera_page(target_lang: &str) -> Result<String> {
    let mut context = TeraContext::new();
    context.insert("title", "Live OCR translator");
    context.insert("target_lang", target_lang);
    context.insert("frame_url_json", &serde_json::to_string("camera/frame")?);
    context.insert("status_url_json", &serde_json::to_string("camera-status")?);
    context.insert("refresh_ms", &REFRESH_MS);
    Tera::one_off(CAMERA_TEMPLATE, &context, true)
        .with_context(|| "failed to render camera template")
}
