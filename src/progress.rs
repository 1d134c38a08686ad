//! Progress-callback trait for per-page restoration events.
//!
//! Inject an [`Arc<dyn RestoreProgressCallback>`] via
//! [`crate::config::RestoreConfigBuilder::progress_callback`] to receive
//! real-time events as the pipeline processes each page.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers
//! can forward events to a channel, a WebSocket, a database record, or a
//! terminal progress bar — without the library knowing anything about how
//! the host application communicates. The trait is `Send + Sync` so it
//! works correctly when pages are processed concurrently.

use std::sync::Arc;

/// Called by the restoration pipeline as it processes each page.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. When pages run concurrently, `on_page_*` may be
/// called from different tasks; implementations must protect shared
/// mutable state themselves.
pub trait RestoreProgressCallback: Send + Sync {
    /// Called once before any page is processed.
    fn on_document_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before a page's variants are generated.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page's text has been resolved and corrected.
    ///
    /// `chars` is the length of the corrected page text; `agreement` is the
    /// mean vote agreement across the page's consensus tokens.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, chars: usize, agreement: f32) {
        let _ = (page_num, total_pages, chars, agreement);
    }

    /// Called when every variant of a page failed recognition.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: String) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after all pages have been attempted.
    fn on_document_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl RestoreProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::RestoreConfig`].
pub type ProgressCallback = Arc<dyn RestoreProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
    }

    impl RestoreProgressCallback for TrackingCallback {
        fn on_page_start(&self, _page_num: usize, _total: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }
        fn on_page_complete(&self, _page_num: usize, _total: usize, _chars: usize, _a: f32) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }
        fn on_page_error(&self, _page_num: usize, _total: usize, _error: String) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_document_start(2);
        cb.on_page_start(1, 2);
        cb.on_page_complete(1, 2, 42, 0.9);
        cb.on_page_error(2, 2, "all variants failed".into());
        cb.on_document_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback {
            starts: AtomicUsize::new(0),
            completes: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        };
        tracker.on_page_start(1, 3);
        tracker.on_page_complete(1, 3, 100, 0.8);
        tracker.on_page_start(2, 3);
        tracker.on_page_error(2, 3, "timeout".into());

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_is_send_in_spawned_task() {
        let cb: Arc<dyn RestoreProgressCallback> = Arc::new(NoopProgressCallback);
        std::thread::spawn(move || {
            cb.on_page_error(1, 1, "moved across threads".into());
        })
        .join()
        .unwrap();
    }
}
