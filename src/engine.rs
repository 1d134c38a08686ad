//! The recognition capability: a trait boundary around the external engine.
//!
//! The pipeline never talks to a concrete OCR engine directly. It is handed
//! an `Arc<dyn RecognitionEngine>` and asks it one thing: given an image,
//! return a text string and a confidence score. Everything else — timeouts,
//! retries, failure bookkeeping — lives in [`crate::pipeline::recognize`],
//! so an engine implementation stays a dumb transport.
//!
//! The crate ships one reference implementation, [`TesseractCommand`],
//! which shells out to an external `tesseract` executable. The engine
//! binary itself stays outside the crate; the adapter only does subprocess
//! plumbing (temp PNG in, TSV out). Tests inject their own mock engines
//! through the same trait.

use crate::error::RestoreError;
use async_trait::async_trait;
use image::GrayImage;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

/// Layout hint passed to the engine alongside each variant image.
///
/// Different preprocessing recipes pair with different page-segmentation
/// behaviour: a thresholded rendering reads best as a single uniform block,
/// while a denoised one benefits from sparse-text mode that re-detects
/// isolated words (section headers live on isolated lines).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RecognitionHint {
    /// Single column with variable text sizes (typical resume layout).
    SingleColumn,
    /// Fully automatic page segmentation.
    AutoPage,
    /// Sparse text: find as much isolated text as possible.
    SparseText,
    /// Assume one uniform block of text.
    UniformBlock,
}

/// One successful engine invocation: raw text plus a per-call confidence
/// in `0.0..=1.0`.
#[derive(Debug, Clone)]
pub struct Recognition {
    pub text: String,
    pub confidence: f32,
}

/// Errors an engine implementation may report.
///
/// `Unavailable` is terminal for the whole run (the binary is missing, the
/// service is down); `Failed` is a per-call error the adapter may retry.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine cannot be reached at all. Fatal — surfaced immediately.
    #[error("engine unavailable: {detail}")]
    Unavailable { detail: String },

    /// A single invocation failed; the adapter decides whether to retry.
    #[error("engine call failed: {detail}")]
    Failed { detail: String },
}

/// The opaque recognition capability.
///
/// Implementations must be cheap to call concurrently — the adapter issues
/// one call per variant in parallel. The pipeline applies its own timeout
/// around each call, so implementations need not enforce one.
#[async_trait]
pub trait RecognitionEngine: Send + Sync {
    /// Recognize the text in one variant image.
    async fn recognize(
        &self,
        image: &GrayImage,
        hint: RecognitionHint,
    ) -> Result<Recognition, EngineError>;
}

// ── Reference adapter: external tesseract binary ─────────────────────────

/// Reference engine: shells out to an external `tesseract` executable.
///
/// The image is written to a temporary PNG, tesseract is invoked with a
/// PSM mode mapped from the [`RecognitionHint`], and the TSV output is
/// parsed back into line-structured text plus a mean word confidence.
pub struct TesseractCommand {
    binary: PathBuf,
    language: String,
    dpi: u32,
}

impl TesseractCommand {
    /// Locate `tesseract` on PATH, or fail with a fatal, actionable error.
    pub fn from_path_lookup(dpi: u32) -> Result<Self, RestoreError> {
        let binary = which::which("tesseract").map_err(|e| RestoreError::EngineUnavailable {
            detail: format!("tesseract not found in PATH: {e}"),
            hint: "Install tesseract (e.g. apt-get install tesseract-ocr) or pass \
                   an explicit binary path."
                .into(),
        })?;
        Ok(Self::with_binary(binary, dpi))
    }

    /// Use an explicit binary path (CLI `--engine-path`).
    pub fn with_binary(binary: PathBuf, dpi: u32) -> Self {
        Self {
            binary,
            language: "eng".into(),
            dpi,
        }
    }

    /// Override the recognition language (default `eng`).
    pub fn language(mut self, lang: impl Into<String>) -> Self {
        self.language = lang.into();
        self
    }

    fn psm_for(hint: RecognitionHint) -> &'static str {
        match hint {
            RecognitionHint::SingleColumn => "4",
            RecognitionHint::AutoPage => "3",
            RecognitionHint::SparseText => "11",
            RecognitionHint::UniformBlock => "6",
        }
    }
}

#[async_trait]
impl RecognitionEngine for TesseractCommand {
    async fn recognize(
        &self,
        image: &GrayImage,
        hint: RecognitionHint,
    ) -> Result<Recognition, EngineError> {
        // tesseract reads from a file; hand it a short-lived PNG.
        let tmp = tempfile::Builder::new()
            .prefix("rescribe-variant-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| EngineError::Failed {
                detail: format!("tempfile: {e}"),
            })?;
        image
            .save(tmp.path())
            .map_err(|e| EngineError::Failed {
                detail: format!("variant PNG write: {e}"),
            })?;

        let output = tokio::process::Command::new(&self.binary)
            .arg(tmp.path())
            .arg("stdout")
            .args(["--psm", Self::psm_for(hint)])
            .args(["-l", &self.language])
            .args(["--dpi", &self.dpi.to_string()])
            .arg("tsv")
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EngineError::Unavailable {
                        detail: format!("'{}' is not executable: {e}", self.binary.display()),
                    }
                } else {
                    EngineError::Failed {
                        detail: format!("spawn: {e}"),
                    }
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Failed {
                detail: format!("tesseract exited with {}: {}", output.status, stderr.trim()),
            });
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        let recognition = parse_tsv(&tsv);
        debug!(
            chars = recognition.text.len(),
            confidence = recognition.confidence,
            "engine call complete"
        );
        Ok(recognition)
    }
}

/// Reconstruct line-structured text and a mean confidence from tesseract's
/// TSV output (one row per detected word, level 5).
///
/// Line breaks follow tesseract's own line numbering; a paragraph or block
/// change becomes a blank line so section headers keep their isolation.
fn parse_tsv(tsv: &str) -> Recognition {
    let mut text = String::new();
    let mut conf_sum = 0.0f32;
    let mut conf_count = 0usize;
    // (block, par, line) of the previously emitted word
    let mut prev: Option<(u32, u32, u32)> = None;

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let word = cols[11].trim();
        if word.is_empty() {
            continue;
        }
        let block: u32 = cols[2].parse().unwrap_or(0);
        let par: u32 = cols[3].parse().unwrap_or(0);
        let line: u32 = cols[4].parse().unwrap_or(0);

        match prev {
            None => {}
            Some((b, p, _)) if b != block || p != par => text.push_str("\n\n"),
            Some((_, _, l)) if l != line => text.push('\n'),
            Some(_) => text.push(' '),
        }
        text.push_str(word);
        prev = Some((block, par, line));

        if let Ok(conf) = cols[10].parse::<f32>() {
            if conf >= 0.0 {
                conf_sum += conf;
                conf_count += 1;
            }
        }
    }

    let confidence = if conf_count > 0 {
        (conf_sum / conf_count as f32) / 100.0
    } else {
        0.0
    };
    Recognition { text, confidence }
}
