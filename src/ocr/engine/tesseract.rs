use image::DynamicImage;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use crate::error::OcrError;
use crate::ocr::{RecognizedToken, Recognizer};
use crate::settings::OcrSettings;

use super::parse::parse_tsv_tokens;

/// Runs the `tesseract` executable on a temporary PNG and reads its TSV output.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    command: String,
    tessdata_prefix: Option<PathBuf>,
}

impl TesseractEngine {
    pub fn new(command: impl Into<String>, tessdata_prefix: Option<PathBuf>) -> Self {
        Self {
            command: command.into(),
            tessdata_prefix,
        }
    }

    pub fn from_settings(settings: &OcrSettings) -> Self {
        Self::new(
            settings.tesseract_cmd.clone(),
            settings.tessdata_prefix.clone(),
        )
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.command);
        if let Some(prefix) = &self.tessdata_prefix {
            command.env("TESSDATA_PREFIX", prefix);
        }
        command
    }

    fn run_tsv(&self, path: &Path, language: &str) -> Result<String, OcrError> {
        let output = self
            .command()
            .arg(path)
            .arg("stdout")
            .arg("-l")
            .arg(language)
            .arg("tsv")
            .output()
            .map_err(|err| {
                OcrError::EngineDegraded(format!(
                    "failed to run {} (is it installed?): {}",
                    self.command, err
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::EngineDegraded(format!(
                "tesseract failed: {}",
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl Recognizer for TesseractEngine {
    fn recognize(
        &self,
        image: &DynamicImage,
        language: &str,
    ) -> Result<Vec<RecognizedToken>, OcrError> {
        let language = language.trim();
        if language.is_empty() {
            return Err(OcrError::EngineDegraded(
                "ocr language is empty".to_string(),
            ));
        }

        let mut tmp = tempfile::Builder::new()
            .prefix("ocr-translator-")
            .suffix(".png")
            .tempfile()
            .map_err(|err| {
                OcrError::EngineDegraded(format!("failed to create temp file for OCR: {}", err))
            })?;
        image
            .write_to(&mut tmp, image::ImageFormat::Png)
            .map_err(|err| {
                OcrError::EngineDegraded(format!("failed to write temp image for OCR: {}", err))
            })?;
        tmp.flush().map_err(|err| {
            OcrError::EngineDegraded(format!("failed to flush temp image for OCR: {}", err))
        })?;

        let tsv = self.run_tsv(tmp.path(), language)?;
        let tokens = parse_tsv_tokens(&tsv);
        debug!("tesseract: {} rows (lang={})", tokens.len(), language);
        Ok(tokens)
    }

    fn languages(&self) -> Result<Vec<String>, OcrError> {
        let output = self
            .command()
            .arg("--list-langs")
            .output()
            .map_err(|err| {
                OcrError::EngineDegraded(format!("failed to run tesseract --list-langs: {}", err))
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::EngineDegraded(format!(
                "tesseract --list-langs failed: {}",
                stderr.trim()
            )));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_language_list(&stdout))
    }
}

fn parse_language_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
