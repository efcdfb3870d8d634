//! OCR engine seam and the Tesseract command-line backend.

use std::io::Write;
use std::process::Command;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// OCR configuration to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrMode {
    /// Plain text recognition
    Standard,
    /// Recognition tuned for equations
    Math,
}

/// An OCR engine.
///
/// Engines receive a preprocessed PNG and return recognized text.
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the engine can run at all.
    fn is_available(&self) -> bool;

    /// Whether the engine supports a mode.
    fn supports(&self, mode: OcrMode) -> bool;

    /// Recognize text in a PNG image.
    fn recognize(&self, png: &[u8], mode: OcrMode, language: &str) -> Result<String>;
}

/// Tesseract invoked as an external process.
///
/// Math mode adds the `equ` traineddata to the language list when it is installed.
#[derive(Debug)]
pub struct TesseractCli {
    binary: String,
    available: OnceLock<bool>,
    languages: OnceLock<Vec<String>>,
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new()
    }
}

impl TesseractCli {
    pub fn new() -> Self {
        Self::with_binary("tesseract")
    }

    /// Use a specific tesseract executable.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            available: OnceLock::new(),
            languages: OnceLock::new(),
        }
    }

    /// Installed traineddata names, as reported by `--list-langs`.
    pub fn languages(&self) -> &[String] {
        self.languages.get_or_init(|| {
            match Command::new(&self.binary).arg("--list-langs").output() {
                Ok(output) if output.status.success() => {
                    // Some builds print the list on stderr.
                    let listing = [output.stdout, output.stderr].concat();
                    String::from_utf8_lossy(&listing)
                        .lines()
                        .skip_while(|l| !l.starts_with("List of available languages"))
                        .skip(1)
                        .map(|l| l.trim().to_string())
                        .filter(|l| !l.is_empty())
                        .collect()
                }
                _ => Vec::new(),
            }
        })
    }
}

impl OcrEngine for TesseractCli {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn is_available(&self) -> bool {
        *self.available.get_or_init(|| {
            Command::new(&self.binary)
                .arg("--version")
                .output()
                .is_ok_and(|o| o.status.success())
        })
    }

    fn supports(&self, mode: OcrMode) -> bool {
        match mode {
            OcrMode::Standard => self.is_available(),
            OcrMode::Math => self.is_available() && self.languages().iter().any(|l| l == "equ"),
        }
    }

    fn recognize(&self, png: &[u8], mode: OcrMode, language: &str) -> Result<String> {
        let mut file = tempfile::Builder::new()
            .prefix("eduparse-ocr-")
            .suffix(".png")
            .tempfile()?;
        file.write_all(png)?;
        file.flush()?;

        let languages = match mode {
            OcrMode::Standard => language.to_string(),
            OcrMode::Math => format!("{}+equ", language),
        };

        let output = Command::new(&self.binary)
            .arg(file.path())
            .arg("stdout")
            .args(["-l", &languages])
            .output();

        match output {
            Ok(output) if output.status.success() => {
                Ok(String::from_utf8_lossy(&output.stdout).into_owned())
            }
            Ok(output) => Err(Error::Ocr(format!(
                "tesseract failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::Ocr(format!(
                "{} not found (install tesseract-ocr)",
                self.binary
            ))),
            Err(e) => Err(e.into()),
        }
    }
}
