//! # rescribe
//!
//! Reconstruct clean, structured text from noisy resume scans using
//! multi-pass OCR consensus.
//!
//! ## Why this crate?
//!
//! A scanned resume through a single recognition pass comes out mangled:
//! words fused together ("UtahActed"), lines broken mid-sentence, section
//! headers swallowed inside sentences ("tasks.EMPLOYMENTCreated"), dates
//! torn across line breaks, emails with spaces around the `@`. No single
//! rendering of the page avoids all of these at once. Instead this crate
//! derives several visually distinct renderings of each page, runs the
//! recognition engine over every one, merges the attempts by word-level
//! voting, then repairs the known defect classes with an ordered,
//! idempotent rule table and segments the result into labelled resume
//! sections — deterministically, so the same scans always produce the
//! same document.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PageImage
//!  │
//!  ├─ 1. Variants   derive renderings per recipe (contrast, threshold, …)
//!  ├─ 2. Recognize  one engine call per variant (timeout, bounded retry)
//!  ├─ 3. Consensus  word-position voting, deterministic tie-breaks
//!  ├─ 4. Correct    ordered, idempotent rewrite rules per defect class
//!  ├─ 5. Segment    labelled sections with per-boundary confidence
//!  └─ 6. Output     Document + per-page stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rescribe::{restore, resolve_pages, RestoreConfig, TesseractCommand};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RestoreConfig::default();
//!     let engine = Arc::new(TesseractCommand::from_path_lookup(config.dpi)?);
//!     let pages = resolve_pages("scans/")?;
//!     let document = restore(engine, pages, &config).await?;
//!     println!("{}", document.plain_text());
//!     for section in &document.sections {
//!         eprintln!("{:?}: {} bytes", section.kind, section.content.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `rescribe` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! rescribe = { version = "0.3", default-features = false }
//! ```
//!
//! ## Bring your own engine
//!
//! The recognition engine is a trait, [`RecognitionEngine`]: given an
//! image, return a text string and a confidence score. The crate ships
//! [`TesseractCommand`], a reference adapter that shells out to an
//! external `tesseract` binary; servers wrapping a remote OCR service
//! implement the same trait and inject it.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod engine;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod restore;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{OverrideEntry, OverrideLexicon, RestoreConfig, RestoreConfigBuilder, VariantSet};
pub use engine::{EngineError, Recognition, RecognitionEngine, RecognitionHint, TesseractCommand};
pub use error::{RestoreError, VariantError};
pub use output::{Document, PageResult, RestoreStats, Section, SectionKind};
pub use pipeline::consensus::{ConsensusText, ConsensusToken};
pub use pipeline::correct::{correct_all, rule_table, CorrectionRule, DefectClass};
pub use pipeline::input::{resolve_pages, PageImage};
pub use pipeline::recognize::Candidate;
pub use pipeline::segment::segment;
pub use pipeline::variants::{recipes_for, RecipeKind, Variant};
pub use progress::{NoopProgressCallback, ProgressCallback, RestoreProgressCallback};
pub use restore::{restore, restore_sync, restore_to_file};
