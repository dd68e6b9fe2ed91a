use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub ocr: OcrSettings,
    pub translation: TranslationSettings,
    pub server: ServerSettings,
    pub camera: CameraSettings,
    pub overlay: OverlaySettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OcrSettings {
    pub tesseract_cmd: String,
    pub tessdata_prefix: Option<PathBuf>,
    pub source_lang: String,
    pub confidence_threshold: f32,
    pub max_dimension: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranslationSettings {
    pub provider: String,
    pub api_key: Option<String>,
    pub target_lang: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub concurrency: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub addr: String,
    pub allowed_origin: Option<String>,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraSettings {
    pub device: String,
    pub input_format: String,
    pub width: u32,
    pub height: u32,
    pub ffmpeg_cmd: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlaySettings {
    pub text_color: String,
    pub box_color: String,
    pub font_size: f32,
    pub font_family: String,
    pub font_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ocr: OcrSettings {
                tesseract_cmd: "tesseract".to_string(),
                tessdata_prefix: None,
                source_lang: "tam".to_string(),
                confidence_threshold: 30.0,
                max_dimension: 1600,
            },
            translation: TranslationSettings {
                provider: "google".to_string(),
                api_key: None,
                target_lang: "en".to_string(),
                base_url: "https://translate.googleapis.com".to_string(),
                timeout_secs: 15,
                concurrency: 4,
            },
            server: ServerSettings {
                addr: "0.0.0.0:8000".to_string(),
                allowed_origin: Some("https://image-livetranslator.netlify.app".to_string()),
                max_upload_bytes: 20 * 1024 * 1024,
            },
            camera: CameraSettings {
                device: "/dev/video0".to_string(),
                input_format: "v4l2".to_string(),
                width: 640,
                height: 480,
                ffmpeg_cmd: "ffmpeg".to_string(),
            },
            overlay: OverlaySettings {
                text_color: "#00ff00".to_string(),
                box_color: "#ff8800".to_string(),
                font_size: 20.0,
                font_family: "sans-serif".to_string(),
                font_path: None,
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    ocr: Option<OcrSection>,
    translation: Option<TranslationSection>,
    server: Option<ServerSection>,
    camera: Option<CameraSection>,
    overlay: Option<OverlaySection>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrSection {
    tesseract_cmd: Option<String>,
    tessdata_prefix: Option<String>,
    source_lang: Option<String>,
    confidence_threshold: Option<f32>,
    max_dimension: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslationSection {
    provider: Option<String>,
    api_key: Option<String>,
    target_lang: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    concurrency: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSection {
    addr: Option<String>,
    allowed_origin: Option<String>,
    max_upload_bytes: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct CameraSection {
    device: Option<String>,
    input_format: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    ffmpeg_cmd: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OverlaySection {
    text_color: Option<String>,
    box_color: Option<String>,
    font_size: Option<f32>,
    font_family: Option<String>,
    font_path: Option<String>,
}

/// Loads settings from `settings.toml`, `settings.local.toml`, the optional
/// extra file and finally the process environment. Later sources win.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    let mut settings = load_settings_from(&ordered_paths)?;
    settings.apply_env_overrides(|key| std::env::var(key).ok())?;
    settings.validate()?;
    Ok(settings)
}

pub(crate) fn load_settings_from(paths: &[PathBuf]) -> Result<Settings> {
    let mut settings = Settings::default();
    for path in paths {
        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
        }
    }
    Ok(settings)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(ocr) = incoming.ocr {
            if let Some(cmd) = non_empty(ocr.tesseract_cmd) {
                self.ocr.tesseract_cmd = cmd;
            }
            if let Some(prefix) = ocr.tessdata_prefix {
                self.ocr.tessdata_prefix = non_empty(Some(prefix)).map(PathBuf::from);
            }
            if let Some(lang) = non_empty(ocr.source_lang) {
                self.ocr.source_lang = lang;
            }
            if let Some(threshold) = ocr.confidence_threshold {
                self.ocr.confidence_threshold = threshold;
            }
            if let Some(max) = ocr.max_dimension {
                self.ocr.max_dimension = max;
            }
        }
        if let Some(translation) = incoming.translation {
            if let Some(provider) = non_empty(translation.provider) {
                self.translation.provider = provider;
            }
            if let Some(key) = translation.api_key {
                self.translation.api_key = non_empty(Some(key));
            }
            if let Some(lang) = non_empty(translation.target_lang) {
                self.translation.target_lang = lang;
            }
            if let Some(url) = non_empty(translation.base_url) {
                self.translation.base_url = url;
            }
            if let Some(secs) = translation.timeout_secs {
                if secs > 0 {
                    self.translation.timeout_secs = secs;
                }
            }
            if let Some(concurrency) = translation.concurrency {
                if concurrency > 0 {
                    self.translation.concurrency = concurrency;
                }
            }
        }
        if let Some(server) = incoming.server {
            if let Some(addr) = non_empty(server.addr) {
                self.server.addr = addr;
            }
            if let Some(origin) = server.allowed_origin {
                self.server.allowed_origin = non_empty(Some(origin));
            }
            if let Some(limit) = server.max_upload_bytes {
                if limit > 0 {
                    self.server.max_upload_bytes = limit;
                }
            }
        }
        if let Some(camera) = incoming.camera {
            if let Some(device) = non_empty(camera.device) {
                self.camera.device = device;
            }
            if let Some(format) = non_empty(camera.input_format) {
                self.camera.input_format = format;
            }
            if let Some(width) = camera.width {
                self.camera.width = width;
            }
            if let Some(height) = camera.height {
                self.camera.height = height;
            }
            if let Some(cmd) = non_empty(camera.ffmpeg_cmd) {
                self.camera.ffmpeg_cmd = cmd;
            }
        }
        if let Some(overlay) = incoming.overlay {
            if let Some(color) = non_empty(overlay.text_color) {
                self.overlay.text_color = color;
            }
            if let Some(color) = non_empty(overlay.box_color) {
                self.overlay.box_color = color;
            }
            if let Some(size) = overlay.font_size {
                if size > 0.0 {
                    self.overlay.font_size = size;
                }
            }
            if let Some(family) = non_empty(overlay.font_family) {
                self.overlay.font_family = family;
            }
            if let Some(path) = overlay.font_path {
                self.overlay.font_path = non_empty(Some(path)).map(PathBuf::from);
            }
        }
    }

    /// Applies environment overrides. `lookup` is the variable source so the
    /// override rules can be exercised without touching the real environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| non_empty(lookup(key));

        if let Some(value) = get("OCR_TRANSLATOR_SOURCE_LANG") {
            self.ocr.source_lang = value;
        }
        if let Some(value) = get("OCR_TRANSLATOR_TARGET_LANG") {
            self.translation.target_lang = value;
        }
        if let Some(value) = get("OCR_TRANSLATOR_CONFIDENCE_THRESHOLD") {
            self.ocr.confidence_threshold = value.parse().with_context(|| {
                format!(
                    "OCR_TRANSLATOR_CONFIDENCE_THRESHOLD is not a number: {}",
                    value
                )
            })?;
        }
        if let Some(value) = get("OCR_TRANSLATOR_MAX_DIMENSION") {
            self.ocr.max_dimension = value.parse().with_context(|| {
                format!("OCR_TRANSLATOR_MAX_DIMENSION is not an integer: {}", value)
            })?;
        }
        if let Some(value) = get("OCR_TRANSLATOR_TESSERACT_CMD") {
            self.ocr.tesseract_cmd = value;
        }
        if let Some(value) = get("TESSDATA_PREFIX") {
            self.ocr.tessdata_prefix = Some(PathBuf::from(value));
        }
        if let Some(value) = get("OCR_TRANSLATOR_ADDR") {
            self.server.addr = value;
        }
        if let Some(value) = get("OCR_TRANSLATOR_ALLOWED_ORIGIN") {
            self.server.allowed_origin = Some(value);
        }
        if let Some(value) = get("OCR_TRANSLATOR_CAMERA_DEVICE") {
            self.camera.device = value;
        }
        if let Some(value) = get("OCR_TRANSLATOR_TRANSLATE_URL") {
            self.translation.base_url = value;
        }
        if let Some(value) = get("OCR_TRANSLATOR_TRANSLATE_PROVIDER") {
            self.translation.provider = value;
        }
        if let Some(value) = get("OCR_TRANSLATOR_TRANSLATE_KEY") {
            self.translation.api_key = Some(value);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.ocr.max_dimension == 0 {
            return Err(anyhow!("ocr.max_dimension must be greater than zero"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!(
                "camera size must be non-zero (got {}x{})",
                self.camera.width,
                self.camera.height
            ));
        }
        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
