//! Article extraction pipeline.
//!
//! Three tiers, tried in order until one yields content:
//!
//! 1. the primary extractor (Readability), whose summary is widened by
//!    [`rescue`] back to the original container so images survive;
//! 2. the secondary [`fallback::TrafilaturaExtractor`];
//! 3. the input HTML itself.
//!
//! Oversized or deeply nested documents skip the engines that would stall
//! on them (see the budget fields of [`Options`]).
//!
//! # Usage
//!
//! ```rust
//! use rs_surf::extractor::ExtractionPipeline;
//!
//! let pipeline = ExtractionPipeline::default();
//! let result = pipeline.extract("<html><head><title>T</title></head><body><p>Hi</p></body></html>");
//! println!("{} via {}", result.title_or_default(), result.strategy);
//! ```

pub mod fallback;
pub mod primary;
pub mod rescue;

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{debug, info, warn};

use crate::dom::{self, Document, TreeShape};
use crate::error::{ErrorKind, Result};
use crate::preprocess;
use crate::result::{ExtractionResult, ExtractionStrategy, TierAttempt, TierOutcome};
use crate::Options;

pub use fallback::TrafilaturaExtractor;
pub use primary::ReadabilityExtractor;
pub use rescue::rescue_content;

/// Output of an [`ArticleExtractor`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Article {
    /// Title found by the extractor.
    pub title: Option<String>,
    /// Cleaned summary HTML.
    pub content_html: String,
}

/// Title-and-summary extractor (the primary tier).
pub trait ArticleExtractor: Send + Sync {
    /// Extract an article from a parsed document.
    ///
    /// The pipeline reuses `doc` afterwards; implementations that edit the
    /// tree must work on a copy.
    fn extract(&self, doc: &Document) -> Result<Article>;
}

/// Content-only extractor (the secondary tier).
///
/// `Ok(None)` means the extractor ran but found nothing usable.
pub trait ContentExtractor: Send + Sync {
    /// Extract the main content of a full HTML document.
    fn extract(&self, html: &str, options: &Options) -> Result<Option<String>>;
}

/// Widens a primary summary against the document it came from.
///
/// Arguments are the preprocessed document, the summary and the options.
pub type RescueFn = fn(&str, &str, &Options) -> String;

/// Tiered article extractor. Never fails.
pub struct ExtractionPipeline {
    primary: Option<Box<dyn ArticleExtractor>>,
    secondary: Box<dyn ContentExtractor>,
    rescue: RescueFn,
    options: Options,
}

impl Default for ExtractionPipeline {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl std::fmt::Debug for ExtractionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionPipeline")
            .field("primary", &self.primary.is_some())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ExtractionPipeline {
    /// Pipeline with the built-in extractors.
    ///
    /// The primary tier is skipped when `options.use_readability` is false.
    #[must_use]
    pub fn new(options: Options) -> Self {
        let primary: Option<Box<dyn ArticleExtractor>> = options.use_readability.then(|| {
            Box::new(ReadabilityExtractor::new(options.max_readability_elements)) as Box<dyn ArticleExtractor>
        });
        Self {
            primary,
            secondary: Box::new(TrafilaturaExtractor),
            rescue: rescue_content,
            options,
        }
    }

    /// Replace the primary extractor.
    #[must_use]
    pub fn with_primary(mut self, extractor: impl ArticleExtractor + 'static) -> Self {
        self.primary = Some(Box::new(extractor));
        self
    }

    /// Drop the primary tier.
    #[must_use]
    pub fn without_primary(mut self) -> Self {
        self.primary = None;
        self
    }

    /// Replace the secondary extractor.
    #[must_use]
    pub fn with_secondary(mut self, extractor: impl ContentExtractor + 'static) -> Self {
        self.secondary = Box::new(extractor);
        self
    }

    /// Replace the rescue step applied to primary summaries.
    #[must_use]
    pub fn with_rescue(mut self, rescue: RescueFn) -> Self {
        self.rescue = rescue;
        self
    }

    /// Options in effect.
    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Extract the article from `html`.
    ///
    /// Errors and panics inside a tier are recorded in
    /// [`ExtractionResult::attempts`] and move on to the next tier.
    #[must_use]
    pub fn extract(&self, html: &str) -> ExtractionResult {
        let preprocessed = preprocess::normalize(html);
        let document = preprocessed.html();
        let parsed = dom::parse(document);
        let page_title = dom::document_title(&parsed);
        let shape = dom::tree_shape(&parsed.root());
        let mut attempts = Vec::new();

        if shape.depth > self.options.max_extract_depth {
            warn!(
                "document nesting depth {} exceeds {}, returning raw HTML",
                shape.depth, self.options.max_extract_depth
            );
            if self.primary.is_some() {
                attempts.push(skipped(ExtractionStrategy::PrimaryRescue));
            }
            attempts.push(skipped(ExtractionStrategy::Secondary));
            attempts.push(accepted(ExtractionStrategy::RawFallback));
            return finish(page_title, html.to_string(), ExtractionStrategy::RawFallback, attempts);
        }

        if let Some(primary) = &self.primary {
            if self.over_primary_budget(shape) {
                debug!(
                    "skipping primary extractor ({} elements, depth {})",
                    shape.elements, shape.depth
                );
                attempts.push(skipped(ExtractionStrategy::PrimaryRescue));
            } else {
                let outcome = guarded(|| {
                    let article = primary.extract(&parsed)?;
                    if is_blank(&article.content_html) {
                        return Ok(None);
                    }
                    let content = (self.rescue)(document, &article.content_html, &self.options);
                    Ok(Some((article.title, content)))
                });
                match outcome {
                    Ok(Some((title, content))) => {
                        attempts.push(accepted(ExtractionStrategy::PrimaryRescue));
                        let title = title.or(page_title);
                        return finish(title, content, ExtractionStrategy::PrimaryRescue, attempts);
                    }
                    Ok(None) => {
                        debug!("primary extractor returned an empty summary");
                        attempts.push(TierAttempt {
                            strategy: ExtractionStrategy::PrimaryRescue,
                            outcome: TierOutcome::Empty,
                        });
                    }
                    Err(kind) => {
                        warn!("primary extractor failed ({kind}), trying secondary");
                        attempts.push(TierAttempt {
                            strategy: ExtractionStrategy::PrimaryRescue,
                            outcome: TierOutcome::Failed(kind),
                        });
                    }
                }
            }
        }

        match guarded(|| self.secondary.extract(document, &self.options)) {
            Ok(Some(content)) if !is_blank(&content) => {
                attempts.push(accepted(ExtractionStrategy::Secondary));
                return finish(page_title, content, ExtractionStrategy::Secondary, attempts);
            }
            Ok(_) => {
                debug!("secondary extractor found no content");
                attempts.push(TierAttempt {
                    strategy: ExtractionStrategy::Secondary,
                    outcome: TierOutcome::Empty,
                });
            }
            Err(kind) => {
                warn!("secondary extractor failed ({kind}), returning raw HTML");
                attempts.push(TierAttempt {
                    strategy: ExtractionStrategy::Secondary,
                    outcome: TierOutcome::Failed(kind),
                });
            }
        }

        attempts.push(accepted(ExtractionStrategy::RawFallback));
        finish(page_title, html.to_string(), ExtractionStrategy::RawFallback, attempts)
    }

    fn over_primary_budget(&self, shape: TreeShape) -> bool {
        shape.elements > self.options.max_readability_elements || shape.depth > self.options.max_readability_depth
    }
}

fn accepted(strategy: ExtractionStrategy) -> TierAttempt {
    TierAttempt {
        strategy,
        outcome: TierOutcome::Accepted,
    }
}

fn skipped(strategy: ExtractionStrategy) -> TierAttempt {
    TierAttempt {
        strategy,
        outcome: TierOutcome::Skipped,
    }
}

fn finish(
    title: Option<String>,
    content_html: String,
    strategy: ExtractionStrategy,
    attempts: Vec<TierAttempt>,
) -> ExtractionResult {
    let image_count = dom::html_image_count(&content_html);
    info!("extracted content via {strategy} ({image_count} image(s))");
    ExtractionResult {
        title,
        content_html,
        image_count,
        strategy,
        attempts,
    }
}

/// No text and no images.
fn is_blank(html: &str) -> bool {
    dom::html_plain_text(html).is_empty() && dom::html_image_count(html) == 0
}

/// Run a tier, turning both errors and panics into an [`ErrorKind`].
fn guarded<T>(tier: impl FnOnce() -> Result<T>) -> std::result::Result<T, ErrorKind> {
    match catch_unwind(AssertUnwindSafe(tier)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
            debug!("extraction tier error: {err}");
            Err(err.kind())
        }
        Err(payload) => {
            warn!("extraction tier panicked: {}", panic_message(payload.as_ref()));
            Err(ErrorKind::ExtractionEngine)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
