//! # rs-surf
//!
//! Turn a URL into a readable article, images included.
//!
//! Acquisition and extraction are separate stages:
//!
//! - [`Fetcher`] retrieves HTML. It picks a site handler for known sites
//!   (oEmbed, WeChat mobile rendering, authenticated browsing), otherwise
//!   tries a plain GET and escalates to a headless browser when the page
//!   looks script-rendered.
//! - [`ExtractionPipeline`] canonicalizes image markup, runs Readability, then
//!   *rescues* the original container of the summary so figures survive.
//!   Trafilatura and finally the raw HTML back it up.
//!
//! ## Quick Start
//!
//! ```rust
//! use rs_surf::extract;
//!
//! let html = r#"<html><head><title>My Article</title></head>
//! <body><article><p>Main content here.</p></article></body></html>"#;
//!
//! let result = extract(html);
//! println!("Title: {}", result.title_or_default());
//! println!("Strategy: {}", result.strategy);
//! ```
//!
//! Fetching needs a tokio runtime:
//!
//! ```rust,no_run
//! use rs_surf::{extract, Config, FetchRequest, Fetcher};
//!
//! # async fn run() -> rs_surf::Result<()> {
//! let fetcher = Fetcher::new(Config::default())?;
//! let raw = fetcher.fetch("https://example.com/post", &FetchRequest::default()).await?;
//! let article = extract(&raw.html);
//! println!("{} images", article.image_count);
//! # Ok(())
//! # }
//! ```

mod error;
mod options;
mod result;

/// Session persistence and interactive login.
pub mod auth;

/// Configuration file and defaults.
pub mod config;

/// DOM helpers on top of `dom_query`.
pub mod dom;

/// Character encoding detection and transcoding.
pub mod encoding;

/// Extraction tiers: primary + rescue, trafilatura, raw.
pub mod extractor;

/// URL retrieval state machine and site handlers.
pub mod fetcher;

/// Static HTTP retrieval.
pub mod http;

/// Image markup canonicalization.
pub mod preprocess;

/// Proxy mode resolution.
pub mod proxy;

/// Browser abstraction and the Chromium driver.
pub mod renderer;

/// Site rules and policy resolution.
pub mod sites;

/// URL utilities for image sources and navigation checks.
pub mod url_utils;

// Public API - re-exports
pub use auth::{AuthSession, AuthStore, ConsolePrompt, LoginPrompt};
pub use config::{Config, FetchSettings, NetworkConfig};
pub use error::{Error, ErrorKind, Result};
pub use extractor::{Article, ArticleExtractor, ContentExtractor, ExtractionPipeline};
pub use fetcher::{FetchRequest, Fetcher};
pub use options::Options;
pub use proxy::{ProxyConfig, ProxyMode, ProxyResolver};
pub use result::{
    ExtractionResult, ExtractionStrategy, FetchStrategy, PreprocessedDocument, RawDocument, TierAttempt,
    TierOutcome,
};
pub use sites::{PolicyOverrides, ResolvedPolicy, RetrievalStrategy, SiteRegistry, SiteRule};

/// Extracts the article from an HTML document using default options.
///
/// Never fails: when every extractor comes up empty the input HTML is
/// returned with [`ExtractionStrategy::RawFallback`].
///
/// # Example
///
/// ```rust
/// use rs_surf::{extract, ExtractionStrategy};
///
/// let result = extract("<html><head><title>T</title></head><body></body></html>");
/// assert_eq!(result.strategy, ExtractionStrategy::RawFallback);
/// assert_eq!(result.title.as_deref(), Some("T"));
/// ```
#[must_use]
pub fn extract(html: &str) -> ExtractionResult {
    extract_with_options(html, &Options::default())
}

/// Extracts the article from an HTML document with custom options.
///
/// # Example
///
/// ```rust
/// use rs_surf::{extract_with_options, Options};
///
/// let options = Options {
///     use_readability: false,
///     ..Options::default()
/// };
/// let result = extract_with_options("<html><body><p>Content</p></body></html>", &options);
/// # let _ = result;
/// ```
#[must_use]
pub fn extract_with_options(html: &str, options: &Options) -> ExtractionResult {
    ExtractionPipeline::new(options.clone()).extract(html)
}

/// Extracts the article from HTML bytes, detecting the encoding from `<meta>`.
///
/// # Example
///
/// ```rust
/// use rs_surf::extract_bytes;
///
/// let html = b"<html><head><meta charset=\"ISO-8859-1\"><title>Caf\xE9</title></head><body></body></html>";
/// let result = extract_bytes(html);
/// assert_eq!(result.title.as_deref(), Some("Café"));
/// ```
#[must_use]
pub fn extract_bytes(html: &[u8]) -> ExtractionResult {
    extract(&encoding::decode_html(html, None))
}
