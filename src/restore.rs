//! Eager (full-document) restoration entry points.
//!
//! ## Orchestration
//!
//! Pages are independent, so they run through the pipeline concurrently
//! under a bounded pool; within one page, the engine is called once per
//! variant, also concurrently. Everything a worker touches is exclusively
//! owned by it — the only shared state is the read-only config (lexicon,
//! rule table), so no locking exists anywhere in the run.
//!
//! Page results complete out of order; assembly buffers them and sorts by
//! page number, then applies one more (idempotent) correction pass over
//! the joined text so document-scoped rules see cross-page duplicates, and
//! segments the result.
//!
//! Cancellation is document-granular: when the configured token fires,
//! in-flight work is abandoned and [`RestoreError::Cancelled`] is
//! returned. No partial document is ever returned as if complete.

use crate::config::RestoreConfig;
use crate::engine::RecognitionEngine;
use crate::error::RestoreError;
use crate::output::{Document, PageResult, RestoreStats};
use crate::pipeline::input::PageImage;
use crate::pipeline::{consensus, correct, recognize, segment, variants};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Agreement below this marks a page low-confidence even when it produced
/// text.
const LOW_AGREEMENT: f32 = 0.4;

/// Restore a document from its page images.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(Document)` on success, even if some pages failed (check
/// `document.stats.failed_pages` and the per-page `low_confidence` flags).
///
/// # Errors
/// Returns `Err(RestoreError)` only for fatal conditions:
/// - the recognition engine is unavailable
/// - the run was cancelled
/// - every page failed recognition entirely
pub async fn restore(
    engine: Arc<dyn RecognitionEngine>,
    pages: Vec<PageImage>,
    config: &RestoreConfig,
) -> Result<Document, RestoreError> {
    let total_start = Instant::now();
    let total_pages = pages.len();
    info!("Starting restoration: {} pages", total_pages);

    if let Some(ref cb) = config.progress_callback {
        cb.on_document_start(total_pages);
    }

    let cancel = config.cancel.clone().unwrap_or_default();
    if cancel.is_cancelled() {
        return Err(RestoreError::Cancelled);
    }

    // ── Per-page pipeline under a bounded pool ───────────────────────────
    let page_futures = pages.into_iter().map(|page| {
        let engine = Arc::clone(&engine);
        let cancel = cancel.clone();
        async move { process_page(engine, page, total_pages, cancel, config).await }
    });

    let run = stream::iter(page_futures)
        .buffer_unordered(config.concurrency)
        .try_collect::<Vec<(PageResult, u64)>>();

    let collected = tokio::select! {
        _ = cancel.cancelled() => {
            warn!("restoration cancelled; discarding partial state");
            return Err(RestoreError::Cancelled);
        }
        collected = run => collected?,
    };

    // ── Assemble in page order regardless of completion order ────────────
    let recognition_duration_ms: u64 = collected.iter().map(|(_, ms)| ms).sum();
    let mut pages: Vec<PageResult> = collected.into_iter().map(|(p, _)| p).collect();
    pages.sort_by_key(|p| p.page_num);

    let processed = pages.iter().filter(|p| p.succeeded()).count();
    let failed = pages.len() - processed;

    if processed == 0 {
        let first_error = pages
            .iter()
            .find_map(|p| p.errors.first())
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no pages supplied".to_string());
        return Err(RestoreError::AllPagesFailed {
            total: total_pages,
            first_error,
        });
    }

    // Document-level correction pass: idempotent over already-corrected
    // page text, but duplicate-header demotion needs whole-document scope.
    let joined = pages
        .iter()
        .filter(|p| p.succeeded())
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    let text = correct::correct(&joined, config);
    let sections = segment::segment(&text, config);

    let stats = RestoreStats {
        total_pages,
        processed_pages: processed,
        failed_pages: failed,
        variants_attempted: pages.iter().map(|p| p.variants_attempted).sum(),
        variants_failed: pages.iter().map(|p| p.variants_failed).sum(),
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        recognition_duration_ms,
    };

    info!(
        "Restoration complete: {}/{} pages, {} sections, {}ms total",
        processed,
        total_pages,
        sections.len(),
        stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_document_complete(total_pages, processed);
    }

    Ok(Document {
        text,
        sections,
        pages,
        stats,
    })
}

/// One page: variants → recognition → consensus → correction.
///
/// Returns the page result plus the time spent inside engine calls.
/// Only fatal conditions propagate as `Err`.
async fn process_page(
    engine: Arc<dyn RecognitionEngine>,
    page: PageImage,
    total_pages: usize,
    cancel: CancellationToken,
    config: &RestoreConfig,
) -> Result<(PageResult, u64), RestoreError> {
    if cancel.is_cancelled() {
        return Err(RestoreError::Cancelled);
    }

    let page_num = page.index + 1;
    let page_start = Instant::now();

    if let Some(ref cb) = config.progress_callback {
        cb.on_page_start(page_num, total_pages);
    }

    // ── Variants (CPU-bound, blocking pool) ──────────────────────────────
    let (variants, mut errors) =
        variants::generate_variants(page.image, config.variant_set, config.dpi).await?;
    let attempted = variants.len() + errors.len();

    if variants.is_empty() {
        warn!(page = page_num, "every recipe failed; page yields no text");
        if let Some(ref cb) = config.progress_callback {
            cb.on_page_error(page_num, total_pages, "all preprocessing recipes failed".into());
        }
        return Ok((PageResult::empty_flagged(page_num, attempted, errors), 0));
    }

    if cancel.is_cancelled() {
        return Err(RestoreError::Cancelled);
    }

    // ── Recognition (the only outside I/O) ───────────────────────────────
    let recog_start = Instant::now();
    let candidates = recognize::recognize_variants(&engine, variants, config).await?;
    let recog_ms = recog_start.elapsed().as_millis() as u64;

    errors.extend(candidates.iter().filter_map(|c| c.error().cloned()));
    let succeeded = candidates.iter().filter(|c| c.is_recognized()).count();

    if succeeded == 0 {
        warn!(page = page_num, "no candidates survived; page yields no text");
        if let Some(ref cb) = config.progress_callback {
            cb.on_page_error(page_num, total_pages, "every recognition attempt failed".into());
        }
        let mut result = PageResult::empty_flagged(page_num, attempted, errors);
        result.duration_ms = page_start.elapsed().as_millis() as u64;
        return Ok((result, recog_ms));
    }

    // ── Consensus + correction (pure, single-threaded per page) ──────────
    let resolved = consensus::resolve(&candidates, config);
    let corrected = correct::correct(&resolved.text, config);
    debug!(
        page = page_num,
        tokens = resolved.tokens.len(),
        agreement = resolved.agreement,
        "page resolved"
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_page_complete(page_num, total_pages, corrected.len(), resolved.agreement);
    }

    let low_confidence = corrected.trim().is_empty() || resolved.agreement < LOW_AGREEMENT;
    let result = PageResult {
        page_num,
        text: corrected,
        variants_attempted: attempted,
        variants_failed: errors.len(),
        agreement: resolved.agreement,
        confidence: resolved.confidence,
        duration_ms: page_start.elapsed().as_millis() as u64,
        low_confidence,
        errors,
    };
    Ok((result, recog_ms))
}

/// Restore and write the plain-text artifact directly to a file.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn restore_to_file(
    engine: Arc<dyn RecognitionEngine>,
    pages: Vec<PageImage>,
    output_path: impl AsRef<Path>,
    config: &RestoreConfig,
) -> Result<RestoreStats, RestoreError> {
    let document = restore(engine, pages, config).await?;
    let path = output_path.as_ref();

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| RestoreError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
    }

    let tmp_path = path.with_extension("txt.tmp");
    tokio::fs::write(&tmp_path, document.plain_text())
        .await
        .map_err(|e| RestoreError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| RestoreError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    Ok(document.stats)
}

/// Synchronous wrapper around [`restore`].
///
/// Creates a temporary tokio runtime internally.
pub fn restore_sync(
    engine: Arc<dyn RecognitionEngine>,
    pages: Vec<PageImage>,
    config: &RestoreConfig,
) -> Result<Document, RestoreError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| RestoreError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(restore(engine, pages, config))
}
