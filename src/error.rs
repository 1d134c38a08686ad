//! Error types for the rescribe library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`RestoreError`] — **Fatal**: the restoration cannot proceed at all
//!   (bad input path, recognition engine unreachable, invalid config).
//!   Returned as `Err(RestoreError)` from the top-level `restore*` functions.
//!
//! * [`VariantError`] — **Non-fatal**: a single recognition attempt failed
//!   (engine timeout, empty result, preprocessing glitch) but the other
//!   variants of the same page are fine. Stored inside
//!   [`crate::output::PageResult`] so callers can inspect partial success
//!   rather than losing the whole page to one bad rendering.
//!
//! The separation lets callers decide their own tolerance: abort on the
//! first failed page, log and continue, or collect all errors for a
//! post-run report. Only total recognition unavailability is fatal.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the rescribe library.
///
/// Variant-level failures use [`VariantError`] and are stored in
/// [`crate::output::PageResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum RestoreError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input path was not found.
    #[error("input not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { path: PathBuf },

    /// Process does not have read permission on the input.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input exists but is not a supported page image.
    #[error("File is not a supported page image: '{path}' (expected PNG/JPEG)")]
    UnsupportedImage { path: PathBuf },

    /// A page image exists on disk but could not be decoded.
    #[error("Failed to decode page image '{path}': {detail}")]
    ImageDecode { path: PathBuf, detail: String },

    /// A directory input contained no page images at all.
    #[error("No page images found under '{path}'")]
    NoPages { path: PathBuf },

    // ── Engine errors ─────────────────────────────────────────────────────
    /// The recognition engine is unreachable or not installed.
    ///
    /// Fatal for the whole run and surfaced immediately — unlike a timeout
    /// or empty result, nothing downstream can recover from an engine that
    /// does not exist.
    #[error("Recognition engine unavailable: {detail}\n{hint}")]
    EngineUnavailable { detail: String, hint: String },

    /// Every page failed recognition entirely; output would be empty.
    #[error("All {total} pages failed recognition.\nFirst error: {first_error}")]
    AllPagesFailed { total: usize, first_error: String },

    // ── Run control ───────────────────────────────────────────────────────
    /// The document run was cancelled; partial state was discarded.
    #[error("Restoration cancelled")]
    Cancelled,

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal failure of a single recognition attempt.
///
/// Stored alongside [`crate::output::PageResult`]. The page continues with
/// the remaining variants; the overall run continues unless every variant
/// of every page fails.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum VariantError {
    /// The preprocessing recipe could not produce a variant image.
    #[error("variant '{recipe}': preprocessing failed: {detail}")]
    Preprocess { recipe: String, detail: String },

    /// The engine call exceeded the configured timeout.
    #[error("variant '{recipe}': engine timed out after {secs}s")]
    Timeout { recipe: String, secs: u64 },

    /// The engine returned no text for this variant.
    #[error("variant '{recipe}': engine returned an empty result")]
    Empty { recipe: String },

    /// The engine call failed after retries.
    #[error("variant '{recipe}': engine failed after {retries} retries: {detail}")]
    Failed {
        recipe: String,
        retries: u32,
        detail: String,
    },
}

impl VariantError {
    /// The recipe tag this failure belongs to.
    pub fn recipe(&self) -> &str {
        match self {
            VariantError::Preprocess { recipe, .. }
            | VariantError::Timeout { recipe, .. }
            | VariantError::Empty { recipe }
            | VariantError::Failed { recipe, .. } => recipe,
        }
    }
}
