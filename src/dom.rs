//! DOM helpers on top of `dom_query`.
//!
//! Small adapters shared by the preprocessor, the cleanup passes and the
//! extractors: tag and attribute access on nodes, text-node traversal and
//! plain-text flattening.

pub use dom_query::{Document, NodeRef, Selection};

/// Tags whose text is never article text.
pub const NON_CONTENT_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Parse an HTML string (fragment or document).
#[inline]
#[must_use]
pub fn parse(html: &str) -> Document {
    Document::from(html)
}

/// Lowercase tag name of the first node of `sel`.
#[must_use]
pub fn tag_name(sel: &Selection) -> Option<String> {
    sel.nodes().first().and_then(node_tag)
}

/// Lowercase tag name of an element node.
#[must_use]
pub fn node_tag(node: &NodeRef) -> Option<String> {
    if !node.is_element() {
        return None;
    }
    node.node_name().map(|t| t.to_ascii_lowercase())
}

/// Lowercased `id` attribute of a node.
#[must_use]
pub fn node_id_lower(node: &NodeRef) -> Option<String> {
    node.attr("id").map(|v| v.to_ascii_lowercase())
}

/// Remove every node of `sel` from the tree.
pub fn remove_all(sel: &Selection) {
    for node in sel.nodes().iter().rev() {
        Selection::from(*node).remove();
    }
}

/// All descendants of `root` in document order.
///
/// Subtrees rooted at elements named in `skip` are not entered.
#[must_use]
pub fn descendants<'a>(root: &NodeRef<'a>, skip: &[&str]) -> Vec<NodeRef<'a>> {
    let mut out = Vec::new();
    let mut stack: Vec<NodeRef<'a>> = children_of(root).into_iter().rev().collect();
    while let Some(node) = stack.pop() {
        if node_tag(&node).is_some_and(|t| skip.contains(&t.as_str())) {
            continue;
        }
        stack.extend(children_of(&node).into_iter().rev());
        out.push(node);
    }
    out
}

/// Element count and deepest element nesting of a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TreeShape {
    /// Number of element nodes.
    pub elements: usize,
    /// Nesting depth of the deepest element; a root's children are at depth 1.
    pub depth: usize,
}

/// Measure the elements under `root` without recursion.
#[must_use]
pub fn tree_shape(root: &NodeRef) -> TreeShape {
    let mut shape = TreeShape::default();
    let mut stack: Vec<(NodeRef, usize)> = children_of(root).into_iter().map(|c| (c, 1)).collect();
    while let Some((node, depth)) = stack.pop() {
        if !node.is_element() {
            continue;
        }
        shape.elements += 1;
        shape.depth = shape.depth.max(depth);
        stack.extend(children_of(&node).into_iter().map(|c| (c, depth + 1)));
    }
    shape
}

fn children_of<'a>(node: &NodeRef<'a>) -> Vec<NodeRef<'a>> {
    let mut children = Vec::new();
    let mut child = node.first_child();
    while let Some(c) = child {
        child = c.next_sibling();
        children.push(c);
    }
    children
}

/// Text nodes under `root`, outside scripts, styles and templates.
#[must_use]
pub fn text_nodes<'a>(root: &NodeRef<'a>) -> Vec<NodeRef<'a>> {
    descendants(root, NON_CONTENT_TAGS)
        .into_iter()
        .filter(NodeRef::is_text)
        .collect()
}

/// Concatenation of every trimmed text node under `root`, without separators.
#[must_use]
pub fn plain_text(root: &NodeRef) -> String {
    let mut out = String::new();
    for node in text_nodes(root) {
        out.push_str(node.text().trim());
    }
    out
}

/// Plain text of an HTML fragment or document.
#[must_use]
pub fn html_plain_text(html: &str) -> String {
    let doc = parse(html);
    plain_text(&doc.root())
}

/// Number of `<img>` elements inside `sel` (including `sel` itself).
#[must_use]
pub fn image_count(sel: &Selection) -> usize {
    let own = sel
        .nodes()
        .iter()
        .filter(|n| node_tag(n).as_deref() == Some("img"))
        .count();
    own + sel.select("img").length()
}

/// Number of `<img>` elements in an HTML string.
#[must_use]
pub fn html_image_count(html: &str) -> usize {
    parse(html).select("img").length()
}

/// Escape text for use inside HTML element content or attribute values.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Text of the first `<title>` element, trimmed; `None` when absent or blank.
#[must_use]
pub fn document_title(doc: &Document) -> Option<String> {
    let title = doc.select("title").first().text().trim().to_string();
    (!title.is_empty()).then_some(title)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_name_is_lowercase() {
        let doc = parse("<DIV id='Main'><P>x</P></DIV>");
        assert_eq!(tag_name(&doc.select("div")), Some("div".to_string()));
        let node = doc.select("div").nodes()[0];
        assert_eq!(node_id_lower(&node), Some("main".to_string()));
    }

    #[test]
    fn test_plain_text_concatenates_trimmed_nodes() {
        let doc = parse("<div><p>  Hello </p>\n<p> world </p><script>var x = 1;</script></div>");
        assert_eq!(plain_text(&doc.root()), "Helloworld");
    }

    #[test]
    fn test_text_nodes_skip_non_content() {
        let doc = parse("<body><p>a</p><style>p{}</style><noscript>b</noscript><template>c</template><p>d</p></body>");
        let texts: Vec<String> = text_nodes(&doc.root())
            .iter()
            .map(|n| n.text().to_string())
            .collect();
        assert_eq!(texts, vec!["a".to_string(), "d".to_string()]);
    }

    #[test]
    fn test_descendants_document_order() {
        let doc = parse("<body><div><span>1</span></div><p>2</p></body>");
        let tags: Vec<String> = descendants(&doc.select("body").nodes()[0], &[])
            .iter()
            .filter_map(node_tag)
            .collect();
        assert_eq!(tags, vec!["div", "span", "p"]);
    }

    #[test]
    fn test_tree_shape() {
        let doc = parse("<html><head></head><body><div><div><p>x</p></div></div></body></html>");
        let shape = tree_shape(&doc.root());
        assert_eq!(shape.elements, 6);
        assert_eq!(shape.depth, 5);

        let deep = parse(&format!("{}<p>x</p>", "<div>".repeat(3_000)));
        assert!(tree_shape(&deep.root()).depth > 3_000);
    }

    #[test]
    fn test_image_count() {
        let doc = parse("<div><img src='a'><p><img src='b'></p></div>");
        assert_eq!(image_count(&doc.select("div")), 2);
        assert_eq!(image_count(&doc.select("img").first()), 1);
        assert_eq!(html_image_count("<p>none</p>"), 0);
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html(r#"<a href="x">&'"#), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn test_remove_all() {
        let doc = parse("<div><span>a</span><span>b</span><p>c</p></div>");
        remove_all(&doc.select("span"));
        assert_eq!(doc.select("span").length(), 0);
        assert_eq!(doc.select("p").length(), 1);
    }

    #[test]
    fn test_document_title() {
        assert_eq!(document_title(&parse("<title> T </title>")), Some("T".to_string()));
        assert_eq!(document_title(&parse("<p>x</p>")), None);
    }
}
