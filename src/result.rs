//! Documents flowing through the pipeline.
//!
//! `RawDocument` leaves the fetcher, `PreprocessedDocument` leaves the
//! preprocessor and `ExtractionResult` leaves the extraction pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// How a document was retrieved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStrategy {
    /// A site handler produced it.
    Handler(String),
    /// Plain HTTP GET.
    Static,
    /// Generic browser rendering.
    Browser,
}

impl fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handler(site) => write!(f, "handler:{site}"),
            Self::Static => f.write_str("static"),
            Self::Browser => f.write_str("browser"),
        }
    }
}

/// Fetcher output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDocument {
    /// Page HTML.
    pub html: String,
    /// URL the caller asked for.
    pub source_url: String,
    /// URL after redirects.
    pub final_url: String,
    /// Strategy that produced the HTML.
    pub strategy: FetchStrategy,
}

/// HTML with canonical image markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessedDocument {
    html: String,
}

impl PreprocessedDocument {
    pub(crate) fn new(html: String) -> Self {
        Self { html }
    }

    /// The normalized HTML.
    #[must_use]
    pub fn html(&self) -> &str {
        &self.html
    }

    /// Take ownership of the HTML.
    #[must_use]
    pub fn into_html(self) -> String {
        self.html
    }
}

/// Which extraction tier produced the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// Primary extractor, possibly widened by rescue.
    PrimaryRescue,
    /// Trafilatura-based secondary extractor.
    Secondary,
    /// The input HTML, unchanged.
    RawFallback,
}

impl fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PrimaryRescue => "primary_rescue",
            Self::Secondary => "secondary",
            Self::RawFallback => "raw_fallback",
        })
    }
}

/// Outcome of one tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierOutcome {
    /// The tier produced the result.
    Accepted,
    /// The tier ran but produced nothing usable.
    Empty,
    /// The document was over the tier's size or depth budget.
    Skipped,
    /// The tier failed.
    Failed(ErrorKind),
}

/// Diagnostic record of one tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierAttempt {
    /// Tier tried.
    pub strategy: ExtractionStrategy,
    /// What happened.
    pub outcome: TierOutcome,
}

/// Pipeline output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Article title, if one was found.
    pub title: Option<String>,
    /// Article body as HTML.
    pub content_html: String,
    /// Number of `<img>` elements in `content_html`.
    pub image_count: usize,
    /// Tier that produced the content.
    pub strategy: ExtractionStrategy,
    /// Every tier tried, in order.
    pub attempts: Vec<TierAttempt>,
}

impl ExtractionResult {
    /// Title, or `"Untitled"` when none was found.
    #[must_use]
    pub fn title_or_default(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or("Untitled")
    }
}
