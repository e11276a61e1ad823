//! Image markup canonicalization.
//!
//! Extractors only understand plain `<img src>`. Lazy-loading attributes and
//! responsive `<picture>` wrappers are folded into that form before any
//! extraction runs.

use tracing::debug;

use crate::dom::{self, Document, NodeRef, Selection};
use crate::result::PreprocessedDocument;
use crate::url_utils::{first_srcset_url, is_placeholder_src, upgrade_protocol_relative};

/// Attributes holding the real image URL, in order of preference.
pub const LAZY_SRC_ATTRS: &[&str] = &["data-src", "data-original", "data-url", "data-srcset", "srcset"];

/// Canonicalize image markup in `html`.
///
/// Every `<img>` with a missing, empty or `data:` `src` adopts the first
/// available lazy-loading source; `<picture>`/`<source>` wrappers are replaced
/// by the image they contain.
#[must_use]
pub fn normalize(html: &str) -> PreprocessedDocument {
    let doc = dom::parse(html);
    normalize_document(&doc);
    PreprocessedDocument::new(doc.html().to_string())
}

/// In-place variant of [`normalize`] for an already parsed document.
pub fn normalize_document(doc: &Document) {
    let adopted = adopt_lazy_sources(doc);
    let flattened = flatten_pictures(doc);
    if adopted > 0 || flattened > 0 {
        debug!("preprocess: {adopted} lazy image source(s) adopted, {flattened} picture wrapper(s) flattened");
    }
}

fn adopt_lazy_sources(doc: &Document) -> usize {
    let mut adopted = 0;
    for img in doc.select("img").iter() {
        let src = img.attr("src");
        if !is_placeholder_src(src.as_deref()) {
            continue;
        }

        let candidate = LAZY_SRC_ATTRS
            .iter()
            .find_map(|name| {
                img.attr(name)
                    .filter(|v| !v.trim().is_empty())
                    .and_then(|v| first_srcset_url(&v).map(str::to_string))
            })
            .or_else(|| picture_source(&img));

        if let Some(url) = candidate {
            img.set_attr("src", &upgrade_protocol_relative(&url));
            adopted += 1;
        }
    }
    adopted
}

/// First `<source>` URL of the `<picture>` enclosing `img`.
fn picture_source(img: &Selection) -> Option<String> {
    let node = img.nodes().first()?;
    let mut current = node.parent();
    while let Some(ancestor) = current {
        match dom::node_tag(&ancestor).as_deref() {
            Some("picture") => {
                return Selection::from(ancestor).select("source").iter().find_map(|source| {
                    ["srcset", "data-srcset"].iter().find_map(|name| {
                        source
                            .attr(name)
                            .and_then(|v| first_srcset_url(&v).map(str::to_string))
                    })
                });
            }
            Some("source") => current = ancestor.parent(),
            _ => return None,
        }
    }
    None
}

/// Outermost node of the contiguous `<picture>`/`<source>` chain above `img`.
fn outermost_wrapper<'a>(img: &NodeRef<'a>) -> Option<NodeRef<'a>> {
    let mut outer = None;
    let mut current = img.parent();
    while let Some(ancestor) = current {
        match dom::node_tag(&ancestor).as_deref() {
            Some("picture" | "source") => {
                current = ancestor.parent();
                outer = Some(ancestor);
            }
            _ => break,
        }
    }
    outer
}

fn flatten_pictures(doc: &Document) -> usize {
    let mut flattened = 0;
    loop {
        let images = doc.select("img").nodes().to_vec();
        let next = images
            .iter()
            .find_map(|img| outermost_wrapper(img).map(|outer| (*img, outer)));
        let Some((img, outer)) = next else {
            break;
        };
        let img_html = Selection::from(img).html();
        Selection::from(outer).replace_with_html(img_html);
        flattened += 1;
    }
    flattened
}
