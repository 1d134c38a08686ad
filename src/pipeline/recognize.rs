//! Recognition adapter: drive the engine once per variant.
//!
//! This module converts each variant image into one engine call and wraps
//! the result in a [`Candidate`] with an explicit success/failure
//! discriminant, so the consensus stage can pattern-match instead of
//! probing attributes. It is intentionally thin — all preprocessing lives
//! in [`crate::pipeline::variants`] and all merging in
//! [`crate::pipeline::consensus`].
//!
//! ## Failure policy
//!
//! * A **timeout** marks the candidate failed immediately. The engine is
//!   the only blocking step in the pipeline; a slow call is not retried
//!   because the page's other variants are already in flight.
//! * A **transient engine failure** is retried with exponential backoff
//!   (`retry_backoff_ms * 2^attempt`), capped per variant — never per
//!   page — so an ailing engine cannot trigger unbounded backoff across a
//!   long document.
//! * An **unavailable engine** aborts the run: nothing downstream can
//!   recover from a capability that does not exist.

use crate::config::RestoreConfig;
use crate::engine::{EngineError, RecognitionEngine};
use crate::error::{RestoreError, VariantError};
use crate::pipeline::variants::{RecipeKind, Variant};
use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Recognition output for one variant, success or failure made explicit.
#[derive(Debug, Clone)]
pub enum Candidate {
    /// The engine produced text for this variant.
    Recognized {
        recipe: RecipeKind,
        text: String,
        confidence: f32,
    },
    /// The variant produced no usable text; excluded from the vote.
    Failed {
        recipe: RecipeKind,
        error: VariantError,
    },
}

impl Candidate {
    pub fn recipe(&self) -> RecipeKind {
        match self {
            Candidate::Recognized { recipe, .. } | Candidate::Failed { recipe, .. } => *recipe,
        }
    }

    pub fn is_recognized(&self) -> bool {
        matches!(self, Candidate::Recognized { .. })
    }

    /// The failure, when this candidate carries one.
    pub fn error(&self) -> Option<&VariantError> {
        match self {
            Candidate::Failed { error, .. } => Some(error),
            Candidate::Recognized { .. } => None,
        }
    }
}

/// Run the engine over every variant of one page, concurrently.
///
/// Results come back in recipe order regardless of completion order —
/// recipe order is the consensus tie-break, so it must be stable here.
///
/// # Errors
/// Only [`RestoreError::EngineUnavailable`] is returned; every other
/// failure becomes a `Candidate::Failed` entry.
pub async fn recognize_variants(
    engine: &Arc<dyn RecognitionEngine>,
    variants: Vec<Variant>,
    config: &RestoreConfig,
) -> Result<Vec<Candidate>, RestoreError> {
    let calls = variants.into_iter().map(|variant| {
        let engine = Arc::clone(engine);
        async move { recognize_one(&engine, variant, config).await }
    });

    // join_all preserves input order.
    let results = futures::future::join_all(calls).await;

    let mut candidates = Vec::with_capacity(results.len());
    for result in results {
        candidates.push(result?);
    }
    Ok(candidates)
}

/// One variant through the engine, with timeout and bounded retries.
async fn recognize_one(
    engine: &Arc<dyn RecognitionEngine>,
    variant: Variant,
    config: &RestoreConfig,
) -> Result<Candidate, RestoreError> {
    let recipe = variant.recipe;
    let call_timeout = Duration::from_secs(config.engine_timeout_secs);
    let mut last_err: Option<String> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                recipe = recipe.tag(),
                attempt,
                max = config.max_retries,
                backoff_ms = backoff,
                "retrying engine call"
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match timeout(call_timeout, engine.recognize(&variant.image, recipe.hint())).await {
            Err(_elapsed) => {
                // Not retried: the page's other variants cover for it.
                return Ok(Candidate::Failed {
                    recipe,
                    error: VariantError::Timeout {
                        recipe: recipe.tag().into(),
                        secs: config.engine_timeout_secs,
                    },
                });
            }
            Ok(Ok(recognition)) => {
                if recognition.text.trim().is_empty() {
                    return Ok(Candidate::Failed {
                        recipe,
                        error: VariantError::Empty {
                            recipe: recipe.tag().into(),
                        },
                    });
                }
                debug!(
                    recipe = recipe.tag(),
                    chars = recognition.text.len(),
                    confidence = recognition.confidence,
                    "candidate recognized"
                );
                return Ok(Candidate::Recognized {
                    recipe,
                    text: recognition.text,
                    confidence: recognition.confidence.clamp(0.0, 1.0),
                });
            }
            Ok(Err(EngineError::Unavailable { detail })) => {
                return Err(RestoreError::EngineUnavailable {
                    detail,
                    hint: "Check that the recognition engine is installed and reachable.".into(),
                });
            }
            Ok(Err(EngineError::Failed { detail })) => {
                warn!(recipe = recipe.tag(), attempt, error = %detail, "engine call failed");
                last_err = Some(detail);
            }
        }
    }

    Ok(Candidate::Failed {
        recipe,
        error: VariantError::Failed {
            recipe: recipe.tag().into(),
            retries: config.max_retries,
            detail: last_err.unwrap_or_else(|| "unknown engine error".into()),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RestoreConfig;
    use crate::engine::{Recognition, RecognitionHint};
    use async_trait::async_trait;
    use image::GrayImage;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn variants(n: usize) -> Vec<Variant> {
        crate::pipeline::variants::recipes_for(crate::config::VariantSet::Thorough)[..n]
            .iter()
            .map(|&recipe| Variant {
                recipe,
                image: GrayImage::new(4, 4),
            })
            .collect()
    }

    fn config() -> RestoreConfig {
        RestoreConfig::builder()
            .max_retries(2)
            .retry_backoff_ms(10)
            .engine_timeout_secs(5)
            .build()
            .unwrap()
    }

    struct EchoEngine;

    #[async_trait]
    impl RecognitionEngine for EchoEngine {
        async fn recognize(
            &self,
            _image: &GrayImage,
            hint: RecognitionHint,
        ) -> Result<Recognition, EngineError> {
            Ok(Recognition {
                text: format!("{hint:?}"),
                confidence: 0.9,
            })
        }
    }

    struct FlakyEngine {
        calls: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl RecognitionEngine for FlakyEngine {
        async fn recognize(
            &self,
            _image: &GrayImage,
            _hint: RecognitionHint,
        ) -> Result<Recognition, EngineError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(EngineError::Failed {
                    detail: "transient".into(),
                })
            } else {
                Ok(Recognition {
                    text: "recovered".into(),
                    confidence: 0.8,
                })
            }
        }
    }

    struct DownEngine;

    #[async_trait]
    impl RecognitionEngine for DownEngine {
        async fn recognize(
            &self,
            _image: &GrayImage,
            _hint: RecognitionHint,
        ) -> Result<Recognition, EngineError> {
            Err(EngineError::Unavailable {
                detail: "service down".into(),
            })
        }
    }

    struct SilentEngine;

    #[async_trait]
    impl RecognitionEngine for SilentEngine {
        async fn recognize(
            &self,
            _image: &GrayImage,
            _hint: RecognitionHint,
        ) -> Result<Recognition, EngineError> {
            Ok(Recognition {
                text: "   ".into(),
                confidence: 0.1,
            })
        }
    }

    struct StuckEngine;

    #[async_trait]
    impl RecognitionEngine for StuckEngine {
        async fn recognize(
            &self,
            _image: &GrayImage,
            _hint: RecognitionHint,
        ) -> Result<Recognition, EngineError> {
            sleep(Duration::from_secs(3600)).await;
            unreachable!("timeout must fire first")
        }
    }

    #[tokio::test]
    async fn candidates_come_back_in_recipe_order() {
        let engine: Arc<dyn RecognitionEngine> = Arc::new(EchoEngine);
        let out = recognize_variants(&engine, variants(3), &config())
            .await
            .unwrap();
        let order: Vec<RecipeKind> = out.iter().map(|c| c.recipe()).collect();
        assert_eq!(
            order,
            vec![
                RecipeKind::Traditional,
                RecipeKind::HighContrast,
                RecipeKind::AdaptiveThreshold
            ]
        );
        assert!(out.iter().all(|c| c.is_recognized()));
    }

    #[tokio::test]
    async fn transient_failures_are_retried_then_succeed() {
        let engine = Arc::new(FlakyEngine {
            calls: AtomicU32::new(0),
            fail_first: 2,
        });
        let dyn_engine: Arc<dyn RecognitionEngine> = engine.clone();
        let out = recognize_variants(&dyn_engine, variants(1), &config())
            .await
            .unwrap();
        assert!(out[0].is_recognized(), "got {:?}", out[0]);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_exhausted_yields_failed_candidate() {
        let engine = Arc::new(FlakyEngine {
            calls: AtomicU32::new(0),
            fail_first: u32::MAX,
        });
        let dyn_engine: Arc<dyn RecognitionEngine> = engine.clone();
        let out = recognize_variants(&dyn_engine, variants(1), &config())
            .await
            .unwrap();
        match out[0].error() {
            Some(VariantError::Failed { retries, .. }) => assert_eq!(*retries, 2),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unavailable_engine_is_fatal() {
        let engine: Arc<dyn RecognitionEngine> = Arc::new(DownEngine);
        let err = recognize_variants(&engine, variants(2), &config())
            .await
            .unwrap_err();
        assert!(matches!(err, RestoreError::EngineUnavailable { .. }));
    }

    #[tokio::test]
    async fn whitespace_only_text_becomes_empty_failure() {
        let engine: Arc<dyn RecognitionEngine> = Arc::new(SilentEngine);
        let out = recognize_variants(&engine, variants(1), &config())
            .await
            .unwrap();
        assert!(matches!(out[0].error(), Some(VariantError::Empty { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_engine_times_out_without_retry() {
        let engine: Arc<dyn RecognitionEngine> = Arc::new(StuckEngine);
        let out = recognize_variants(&engine, variants(1), &config())
            .await
            .unwrap();
        match out[0].error() {
            Some(VariantError::Timeout { secs, .. }) => assert_eq!(*secs, 5),
            other => panic!("expected Timeout, got {other:?}"),
        }
    }
}
