//! Rescue: recover the original container of a cleaned summary.
//!
//! Readability-style cleaners drop images and figures. Rescue takes a
//! fingerprint (the first characters of the summary's plain text), finds the
//! text node in the full document that contains it, and walks up to the
//! enclosing article container, which still has its images.

use tracing::debug;

use crate::dom::{self, Document, NodeRef, Selection};
use crate::Options;

/// Container ids skipped when searching outside `<body>` text.
const SKIPPED_CONTAINER_IDS: &[&str] = &["content", "main", "article", "body"];

/// Ids that mark a container as the article boundary.
const BOUNDARY_IDS: &[&str] = &["main", "content", "article"];

/// Outcome of a rescue attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rescue {
    /// The summary is kept as is.
    Summary,
    /// A container from the full document replaces the summary.
    Container(String),
}

/// Rescued HTML for `summary_html`, or the summary unchanged.
///
/// `document_html` is the preprocessed full document the summary was made from.
#[must_use]
pub fn rescue_content(document_html: &str, summary_html: &str, options: &Options) -> String {
    match rescue(document_html, summary_html, options) {
        Rescue::Summary => summary_html.to_string(),
        Rescue::Container(html) => html,
    }
}

/// Like [`rescue_content`], reporting which branch was taken.
#[must_use]
pub fn rescue(document_html: &str, summary_html: &str, options: &Options) -> Rescue {
    let text = dom::html_plain_text(summary_html);
    let text_len = text.chars().count();
    if text_len < options.min_rescue_text_len {
        debug!("rescue skipped: summary text has {text_len} chars");
        return Rescue::Summary;
    }

    let doc = dom::parse(document_html);
    let Some(node) = locate_fingerprint(&doc, &text, options) else {
        debug!("rescue: fingerprint not found in document");
        return Rescue::Summary;
    };

    let container = Selection::from(expand_to_container(node));
    let rescued_images = dom::image_count(&container);
    let summary_images = dom::html_image_count(summary_html);
    if rescued_images < summary_images {
        debug!("rescue rejected: container has {rescued_images} images, summary {summary_images}");
        return Rescue::Summary;
    }

    debug!(
        "rescued <{}> container with {rescued_images} image(s)",
        dom::tag_name(&container).unwrap_or_default()
    );
    Rescue::Container(container.html().to_string())
}

fn prefix(text: &str, chars: usize) -> String {
    text.chars().take(chars).collect()
}

fn find_text_node<'a>(root: &NodeRef<'a>, fingerprint: &str) -> Option<NodeRef<'a>> {
    dom::text_nodes(root)
        .into_iter()
        .find(|node| node.text().contains(fingerprint))
}

/// Text node containing the summary fingerprint.
///
/// Long fingerprint: `<body>`, then `article`/`main`/`section`/`div`
/// containers whose id is not a generic wrapper id. Short fingerprint:
/// `<body>`, then `article`/`main`/`section`.
fn locate_fingerprint<'a>(doc: &'a Document, text: &str, options: &Options) -> Option<NodeRef<'a>> {
    let body = doc.select("body").nodes().first().copied();

    let long = prefix(text, options.fingerprint_len);
    if let Some(found) = body.as_ref().and_then(|b| find_text_node(b, &long)) {
        return Some(found);
    }
    let containers = doc.select("article, main, section, div").nodes().to_vec();
    for container in &containers {
        let skipped = dom::node_id_lower(container)
            .is_some_and(|id| SKIPPED_CONTAINER_IDS.contains(&id.as_str()));
        if skipped {
            continue;
        }
        if let Some(found) = find_text_node(container, &long) {
            return Some(found);
        }
    }

    let short = prefix(text, options.short_fingerprint_len);
    if let Some(found) = body.as_ref().and_then(|b| find_text_node(b, &short)) {
        return Some(found);
    }
    doc.select("article, main, section")
        .nodes()
        .iter()
        .find_map(|container| find_text_node(container, &short))
}

/// Walk up from the text node's parent to the best article container.
///
/// Image-bearing ancestors replace the candidate; `article`/`main` or a
/// `main`/`content`/`article` id ends the walk; `body`/`html` are never chosen
/// unless the text sits directly in them.
fn expand_to_container(text_node: NodeRef<'_>) -> NodeRef<'_> {
    let Some(start) = text_node.parent() else {
        return text_node;
    };
    let mut best = start;
    let mut current = Some(start);
    while let Some(node) = current {
        let Some(tag) = dom::node_tag(&node) else {
            break;
        };
        if tag == "body" || tag == "html" {
            break;
        }
        if Selection::from(node).select("img").length() > 0 {
            best = node;
        }
        let boundary_id = dom::node_id_lower(&node).is_some_and(|id| BOUNDARY_IDS.contains(&id.as_str()));
        if tag == "article" || tag == "main" || boundary_id {
            best = node;
            break;
        }
        current = node.parent();
    }
    best
}
