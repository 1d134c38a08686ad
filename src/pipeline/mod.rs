//! Pipeline stages for scan restoration.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. a different alignment strategy in consensus)
//! without touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ variants ──▶ recognize ──▶ consensus ──▶ correct ──▶ segment
//! (pages)  (recipes)    (engine×N)    (word vote)   (rules)     (sections)
//! ```
//!
//! 1. [`input`]     — resolve a path (file or directory) into an ordered
//!    page list
//! 2. [`variants`]  — derive one preprocessed rendering per recipe; runs in
//!    `spawn_blocking` because the transforms are CPU-bound
//! 3. [`recognize`] — one engine call per variant with timeout/retry; the
//!    only stage with outside I/O
//! 4. [`consensus`] — merge candidate texts by positional word voting with
//!    deterministic tie-breaks and lexicon overrides
//! 5. [`correct`]   — ordered, idempotent rewrite rules for known scan
//!    defects (merged tokens, broken dates, embedded headers, …)
//! 6. [`segment`]   — classify the corrected text into labelled sections
//!    with per-boundary confidence

pub mod consensus;
pub mod correct;
pub mod input;
pub mod recognize;
pub mod segment;
pub mod variants;
