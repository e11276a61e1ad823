//! Primary extractor: Mozilla Readability via `dom_smoothie`.

use super::{Article, ArticleExtractor};
use crate::dom::Document;
use crate::error::{Error, Result};
use crate::Options;

/// Readability-based article extractor.
///
/// Produces a cleaned summary that tends to drop images; the pipeline runs
/// rescue on its output.
#[derive(Debug, Clone, Copy)]
pub struct ReadabilityExtractor {
    max_elements: usize,
}

impl ReadabilityExtractor {
    /// Extractor refusing documents with more than `max_elements` elements.
    #[must_use]
    pub fn new(max_elements: usize) -> Self {
        Self { max_elements }
    }
}

impl Default for ReadabilityExtractor {
    fn default() -> Self {
        Self::new(Options::default().max_readability_elements)
    }
}

#[cfg(feature = "readability")]
impl ArticleExtractor for ReadabilityExtractor {
    fn extract(&self, doc: &Document) -> Result<Article> {
        use dom_smoothie::{Config, Readability};

        let config = Config {
            max_elements_to_parse: self.max_elements,
            ..Config::default()
        };
        // Readability edits the tree it works on.
        let mut reader = Readability::with_document(doc.clone(), None, Some(config))
            .map_err(|e| Error::ExtractionEngine(format!("readability setup failed: {e}")))?;
        let article = reader
            .parse()
            .map_err(|e| Error::ExtractionEngine(format!("readability parse failed: {e}")))?;

        let title = article.title.trim().to_string();
        Ok(Article {
            title: (!title.is_empty()).then_some(title),
            content_html: article.content.to_string(),
        })
    }
}

#[cfg(not(feature = "readability"))]
impl ArticleExtractor for ReadabilityExtractor {
    fn extract(&self, _doc: &Document) -> Result<Article> {
        Err(Error::ExtractionEngine(
            "readability support is not compiled in".to_string(),
        ))
    }
}
