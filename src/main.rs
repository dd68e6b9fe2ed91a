use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use ocr_translator_rust::{OcrOptions, settings};

#[derive(Parser, Debug)]
#[command(
    name = "ocr-translator",
    version,
    about = "Recognize text in images and camera frames and translate it"
)]
struct Cli {
    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings", global = true)]
    read_settings: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Listen address (default: [server] addr)
        #[arg(long = "addr")]
        addr: Option<String>,
    },
    /// OCR an image file and print the boxes as JSON
    Ocr {
        image: PathBuf,

        /// Target language (default: [translation] target_lang)
        #[arg(short = 'l', long = "lang")]
        lang: Option<String>,

        /// OCR language, tesseract code (default: [ocr] source_lang)
        #[arg(short = 'L', long = "source-lang")]
        source_lang: Option<String>,

        /// Minimum token confidence (default: [ocr] confidence_threshold)
        #[arg(
            short = 't',
            long = "threshold",
            allow_negative_numbers = true,
            value_parser = parse_threshold
        )]
        threshold: Option<f32>,
    },
    /// Translate text and print the result
    Translate {
        text: String,

        /// Target language (default: [translation] target_lang)
        #[arg(short = 'l', long = "lang")]
        lang: Option<String>,
    },
    /// Run the live camera overlay until `q` + Enter
    Camera {
        /// Target language (default: [translation] target_lang)
        #[arg(short = 'l', long = "lang")]
        lang: Option<String>,

        /// Write every overlay frame to this PNG file
        #[arg(long = "preview")]
        preview: Option<PathBuf>,
    },
    /// List the OCR languages installed for tesseract
    Languages,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    ocr_translator_rust::logging::init(cli.verbose)?;
    let settings = settings::load_settings(cli.read_settings.as_deref())?;

    match cli.command {
        Command::Serve { addr } => {
            ocr_translator_rust::server::run_server(settings, addr).await?;
        }
        Command::Ocr {
            image,
            lang,
            source_lang,
            threshold,
        } => {
            let options = OcrOptions {
                source_lang,
                target_lang: lang,
                threshold,
            };
            let json = ocr_translator_rust::run_ocr(&settings, &image, options).await?;
            println!("{}", json);
        }
        Command::Translate { text, lang } => {
            let translation =
                ocr_translator_rust::run_translate(&settings, &text, lang.as_deref()).await?;
            println!("{}", translation.translated);
        }
        Command::Camera { lang, preview } => {
            eprintln!("Camera running. Type q and press Enter to stop.");
            let status = ocr_translator_rust::run_camera(
                &settings,
                lang.as_deref(),
                preview,
                wait_for_quit(),
            )
            .await?;
            if let Some(err) = status.last_error {
                warn!("camera loop ended: {}", err);
            }
            eprintln!("Camera stopped after {} frames.", status.frames);
        }
        Command::Languages => {
            for language in ocr_translator_rust::list_languages(&settings)? {
                println!("{}", language);
            }
        }
    }
    Ok(())
}

fn parse_threshold(value: &str) -> Result<f32, String> {
    let threshold = value
        .trim()
        .parse::<f32>()
        .map_err(|err| format!("invalid threshold {:?}: {}", value, err))?;
    if !threshold.is_finite() {
        return Err(format!(
            "threshold must be a finite number, got {:?}",
            value
        ));
    }
    Ok(threshold)
}

/// Resolves on a `q` line or when stdin closes.
async fn wait_for_quit() {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().eq_ignore_ascii_case("q") => break,
            Ok(Some(_)) => continue,
            Ok(None) | Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn threshold_of(args: &[&str]) -> Result<Option<f32>, clap::Error> {
        let cli = Cli::try_parse_from(args)?;
        match cli.command {
            Command::Ocr { threshold, .. } => Ok(threshold),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn threshold_accepts_finite_numbers() {
        let parsed = threshold_of(&["ocr-translator", "ocr", "page.png", "-t", "42.5"]);
        assert_eq!(parsed.expect("parse"), Some(42.5));
        let parsed = threshold_of(&["ocr-translator", "ocr", "page.png", "-t", "-1"]);
        assert_eq!(parsed.expect("parse"), Some(-1.0));
        let parsed = threshold_of(&["ocr-translator", "ocr", "page.png"]);
        assert_eq!(parsed.expect("parse"), None);
    }

    #[test]
    fn threshold_rejects_non_finite_values() {
        for value in ["NaN", "inf", "-inf", "high"] {
            let parsed = threshold_of(&["ocr-translator", "ocr", "page.png", "-t", value]);
            assert!(parsed.is_err(), "{} was accepted", value);
        }
    }
}
