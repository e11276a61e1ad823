//! Tuning knobs for content extraction.
//!
//! The `Options` struct holds every threshold used by the extraction
//! pipeline: when rescue applies, how long the fingerprints are, and how
//! large a document may be before the engines are skipped.

/// Configuration options for content extraction.
///
/// All fields are public for easy configuration. Use `Default::default()`
/// for standard settings.
///
/// # Example
///
/// ```rust
/// use rs_surf::Options;
///
/// let options = Options {
///     fingerprint_len: 80,
///     ..Options::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct Options {
    /// Run the primary (Readability) extractor.
    ///
    /// When false, or when the `readability` feature is disabled, the
    /// pipeline starts at the secondary extractor.
    ///
    /// Default: `true`
    pub use_readability: bool,

    /// Summaries with less plain text than this are returned unchanged.
    ///
    /// Default: `50`
    pub min_rescue_text_len: usize,

    /// Length (characters) of the fingerprint taken from the summary text.
    ///
    /// Default: `100`
    pub fingerprint_len: usize,

    /// Length of the fallback fingerprint tried when the long one is not found.
    ///
    /// Default: `30`
    pub short_fingerprint_len: usize,

    /// Keep images in secondary extractor output.
    ///
    /// Default: `true`
    pub include_images: bool,

    /// Documents with more elements than this skip the primary tier.
    ///
    /// Also handed to Readability as its own parse limit.
    ///
    /// Default: `20_000`
    pub max_readability_elements: usize,

    /// Documents nested deeper than this skip the primary tier.
    ///
    /// Readability slows down sharply with nesting depth.
    ///
    /// Default: `128`
    pub max_readability_depth: usize,

    /// Documents nested deeper than this skip every extractor and come back
    /// as raw HTML.
    ///
    /// Default: `256`
    pub max_extract_depth: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            use_readability: true,
            min_rescue_text_len: 50,
            fingerprint_len: 100,
            short_fingerprint_len: 30,
            include_images: true,
            max_readability_elements: 20_000,
            max_readability_depth: 128,
            max_extract_depth: 256,
        }
    }
}
