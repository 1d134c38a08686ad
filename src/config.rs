//! Configuration types for scan restoration.
//!
//! All pipeline behaviour is controlled through [`RestoreConfig`], built via
//! its [`RestoreConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share configs across workers, serialise them for logging, and
//! diff two runs to understand why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A dozen-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! well-documented defaults for the rest.
//!
//! # Design choice: immutable override lexicon
//! The known-problem-word dictionary is folded into an [`OverrideLexicon`]
//! at build time and never mutated afterwards, so concurrent document runs
//! sharing a config can never interfere through it.

use crate::error::RestoreError;
use crate::progress::RestoreProgressCallback;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Which preprocessing recipes to run per page.
///
/// More variants cost more engine calls but give the vote more independent
/// observations of the same page. `Thorough` runs every recipe; `Fast`
/// keeps the three that disagree most usefully in practice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VariantSet {
    /// Three recipes: traditional, high-contrast, adaptive-threshold.
    Fast,
    /// All seven recipes. (default)
    #[default]
    Thorough,
}

/// One entry of the known-problem-word dictionary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideEntry {
    /// The correct form that should replace the misread word.
    pub replacement: String,
    /// How much we trust this correction, in `0.0..=1.0`. An override only
    /// displaces a plurality winner when this exceeds the vote margin.
    pub confidence: f32,
}

/// Immutable dictionary of deterministic engine misreadings.
///
/// Built once at config construction and shared read-only across workers.
/// Keys are lowercase; lookups are case-insensitive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverrideLexicon {
    entries: HashMap<String, OverrideEntry>,
}

impl OverrideLexicon {
    /// The built-in dictionary: misreadings observed consistently across
    /// engines, mostly `rn`→`m` confusions and place names whose glyph
    /// shapes collapse at scan resolution.
    pub fn builtin() -> Self {
        let seed: &[(&str, &str, f32)] = &[
            ("villereek", "millcreek", 0.95),
            ("ciplomacy", "diplomacy", 0.9),
            ("cornpany", "company", 0.85),
            ("comrnittee", "committee", 0.85),
            ("rnanagement", "management", 0.85),
            ("cornmunication", "communication", 0.85),
            ("rnanufacturing", "manufacturing", 0.85),
            ("rnarketing", "marketing", 0.85),
            ("developrnent", "development", 0.85),
            ("environrnent", "environment", 0.85),
            ("requirernents", "requirements", 0.85),
            ("achievernent", "achievement", 0.85),
            ("irnplementation", "implementation", 0.85),
            ("docurnent", "document", 0.85),
            ("rnonitoring", "monitoring", 0.85),
            ("problern", "problem", 0.85),
        ];
        let entries = seed
            .iter()
            .map(|(wrong, right, conf)| {
                (
                    wrong.to_string(),
                    OverrideEntry {
                        replacement: right.to_string(),
                        confidence: *conf,
                    },
                )
            })
            .collect();
        Self { entries }
    }

    /// Merge caller-supplied overrides on top of the built-in set.
    /// User entries win on key collision and carry high confidence — the
    /// caller asserted the correction explicitly.
    pub fn with_user_overrides(mut self, overrides: &HashMap<String, String>) -> Self {
        for (wrong, right) in overrides {
            self.entries.insert(
                wrong.to_lowercase(),
                OverrideEntry {
                    replacement: right.clone(),
                    confidence: 0.95,
                },
            );
        }
        self
    }

    /// Case-insensitive lookup of a misread word.
    pub fn lookup(&self, word: &str) -> Option<&OverrideEntry> {
        self.entries.get(&word.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Configuration for a scan-restoration run.
///
/// Built via [`RestoreConfig::builder()`] or [`RestoreConfig::default()`].
///
/// # Example
/// ```rust
/// use rescribe::{RestoreConfig, VariantSet};
///
/// let config = RestoreConfig::builder()
///     .dpi(300)
///     .variant_set(VariantSet::Fast)
///     .concurrency(2)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct RestoreConfig {
    /// Resolution hint for the page bitmaps, in dots per inch. Range:
    /// 72–1200. Default: 300.
    ///
    /// Recipes scale their parameters from this: low-DPI pages get a larger
    /// upscale factor and a smaller threshold window, high-DPI pages the
    /// reverse. It is a hint about the input, not a resampling target.
    pub dpi: u32,

    /// Which preprocessing recipes to run. Default: [`VariantSet::Thorough`].
    pub variant_set: VariantSet,

    /// Caller-supplied misread→correct word pairs, merged into the built-in
    /// lexicon at build time.
    pub known_word_overrides: HashMap<String, String>,

    /// Correction rules to run, by id. Empty set = run the full table.
    ///
    /// Disabling a rule is for diagnosis and regression bisection; the
    /// shipped table is ordered so that every rule may assume the normal
    /// form established by the rules before it.
    pub enabled_rule_ids: HashSet<String>,

    /// Number of pages processed concurrently. Default: 4.
    ///
    /// Pages are independent; the engine call is the only blocking step, so
    /// modest parallelism hides most of its latency without flooding the
    /// engine with requests.
    pub concurrency: usize,

    /// Per-engine-call timeout in seconds. Default: 30.
    ///
    /// A timed-out variant is marked failed and excluded from the vote; it
    /// is not retried — a slow engine stays slow, and six other variants
    /// are still in flight for the same page.
    pub engine_timeout_secs: u64,

    /// Retry attempts per variant on a transient engine failure. Default: 2.
    ///
    /// The cap is per variant, not per page, so an unavailable engine can
    /// never trigger unbounded backoff across a long document.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (doubles per attempt). Default: 250.
    pub retry_backoff_ms: u64,

    /// Section boundaries scoring below this are kept but flagged
    /// `low_confidence`. Default: 0.45.
    pub segment_confidence_threshold: f32,

    /// Optional per-page progress events.
    pub progress_callback: Option<Arc<dyn RestoreProgressCallback>>,

    /// Optional document-level cancellation. Cancelling abandons in-flight
    /// work and the run returns [`RestoreError::Cancelled`]; no partial
    /// document is ever returned as if complete.
    pub cancel: Option<CancellationToken>,

    /// The merged override lexicon. Populated by `build()`.
    pub(crate) lexicon: OverrideLexicon,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            variant_set: VariantSet::default(),
            known_word_overrides: HashMap::new(),
            enabled_rule_ids: HashSet::new(),
            concurrency: 4,
            engine_timeout_secs: 30,
            max_retries: 2,
            retry_backoff_ms: 250,
            segment_confidence_threshold: 0.45,
            progress_callback: None,
            cancel: None,
            lexicon: OverrideLexicon::builtin(),
        }
    }
}

impl fmt::Debug for RestoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestoreConfig")
            .field("dpi", &self.dpi)
            .field("variant_set", &self.variant_set)
            .field("known_word_overrides", &self.known_word_overrides.len())
            .field("enabled_rule_ids", &self.enabled_rule_ids)
            .field("concurrency", &self.concurrency)
            .field("engine_timeout_secs", &self.engine_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field(
                "segment_confidence_threshold",
                &self.segment_confidence_threshold,
            )
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn callback>"),
            )
            .field("cancel", &self.cancel.is_some())
            .finish()
    }
}

impl RestoreConfig {
    /// Create a new builder for `RestoreConfig`.
    pub fn builder() -> RestoreConfigBuilder {
        RestoreConfigBuilder {
            config: Self::default(),
        }
    }

    /// The merged (built-in + user) override lexicon.
    pub fn lexicon(&self) -> &OverrideLexicon {
        &self.lexicon
    }

    /// Whether a correction rule id is enabled under this config.
    pub fn rule_enabled(&self, id: &str) -> bool {
        self.enabled_rule_ids.is_empty() || self.enabled_rule_ids.contains(id)
    }
}

/// Builder for [`RestoreConfig`].
#[derive(Debug)]
pub struct RestoreConfigBuilder {
    config: RestoreConfig,
}

impl RestoreConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 1200);
        self
    }

    pub fn variant_set(mut self, set: VariantSet) -> Self {
        self.config.variant_set = set;
        self
    }

    pub fn known_word_override(
        mut self,
        wrong: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        self.config
            .known_word_overrides
            .insert(wrong.into(), right.into());
        self
    }

    pub fn known_word_overrides(mut self, overrides: HashMap<String, String>) -> Self {
        self.config.known_word_overrides.extend(overrides);
        self
    }

    pub fn enabled_rule_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.enabled_rule_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn engine_timeout_secs(mut self, secs: u64) -> Self {
        self.config.engine_timeout_secs = secs.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn segment_confidence_threshold(mut self, t: f32) -> Self {
        self.config.segment_confidence_threshold = t.clamp(0.0, 1.0);
        self
    }

    pub fn progress_callback(mut self, cb: Arc<dyn RestoreProgressCallback>) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.config.cancel = Some(token);
        self
    }

    /// Build the configuration, validating constraints and folding the user
    /// overrides into the immutable lexicon.
    pub fn build(mut self) -> Result<RestoreConfig, RestoreError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 1200 {
            return Err(RestoreError::InvalidConfig(format!(
                "DPI must be 72–1200, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(RestoreError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        for (wrong, right) in &c.known_word_overrides {
            if wrong.trim().is_empty() || right.trim().is_empty() {
                return Err(RestoreError::InvalidConfig(
                    "Override entries must map a non-empty word to a non-empty word".into(),
                ));
            }
        }
        self.config.lexicon =
            OverrideLexicon::builtin().with_user_overrides(&self.config.known_word_overrides);
        Ok(self.config)
    }
}
