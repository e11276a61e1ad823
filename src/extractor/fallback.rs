//! Secondary extraction through `rs_trafilatura`.
//!
//! Trafilatura scores the page's own structure and tolerates layouts
//! Readability gives up on (text in `<div>`s and `<br>`s, sparse markup).
//! Its HTML output keeps images when [`Options::include_images`] is set.

use tracing::debug;

use super::ContentExtractor;
use crate::error::{Error, Result};
use crate::Options;

/// Content extractor backed by trafilatura.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrafilaturaExtractor;

impl TrafilaturaExtractor {
    fn engine_options(options: &Options) -> rs_trafilatura::Options {
        rs_trafilatura::Options {
            include_images: options.include_images,
            include_tables: true,
            // Readability already had its turn as the primary tier.
            use_readability_fallback: false,
            ..rs_trafilatura::Options::default()
        }
    }
}

impl ContentExtractor for TrafilaturaExtractor {
    fn extract(&self, html: &str, options: &Options) -> Result<Option<String>> {
        let result = rs_trafilatura::extract_with_options(html, &Self::engine_options(options))
            .map_err(|e| Error::ExtractionEngine(format!("trafilatura failed: {e}")))?;

        for warning in &result.warnings {
            debug!("trafilatura: {warning}");
        }
        Ok(result.content_html.filter(|content| !content.trim().is_empty()))
    }
}
