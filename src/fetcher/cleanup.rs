//! Site-specific HTML cleanup and assembly.
//!
//! Pure string-to-string transforms applied to what the site handlers
//! retrieve, kept apart from the browser plumbing so they can be tested on
//! fixtures.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::dom::{self, NodeRef, Selection};

/// Twitter/X interface chrome removed from rendered articles.
const TWITTER_UI_SELECTORS: &[&str] = &[
    "[data-testid='app-text-transition-container']",
    "[data-testid='likeCount']",
    "[data-testid='replyCount']",
    "[data-testid='retweetCount']",
    "[data-testid='analyticsButton']",
    "[data-testid='like']",
    "[data-testid='reply']",
    "[data-testid='retweet']",
    "[data-testid='share']",
    "[data-testid='bookmark']",
    "[data-testid='Tweet-User-Avatar']",
    "[data-testid='UserAvatar']",
    "img[src*='profile_images']",
    "[data-testid='premium-upgrade-button']",
    "[data-testid='subscribe-button']",
    "a[href*='premium']",
    "a[href*='subscribe']",
    "[role='menu']",
    "[role='dialog']",
    "[aria-label='Analytics']",
    "div[class*='css-1dbjc4n r-1']",
];

#[allow(clippy::expect_used)]
static TWITTER_UI_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bviews?\b|\banalytics\b|\bpromoted\b|\bsponsored\b|想发布你自己的文章|发布你自己的文章|publish your own article",
    )
    .expect("valid regex")
});

#[allow(clippy::expect_used)]
static TCO_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https://t\.co/\w+$").expect("valid regex"));

#[allow(clippy::expect_used)]
static XHS_AVATAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)sns-avatar-qc\.xhscdn\.com").expect("valid regex"));

const XHS_AVATAR_STYLE: &str = "width: 60px; height: 60px; object-fit: cover; border-radius: 50%;";

const REFERRER_META: &str = r#"<meta name="referrer" content="no-referrer-when-downgrade">"#;

/// Whether an oEmbed `html` payload carries no tweet text.
///
/// True when the payload is empty, has no `<p>`, its first `<p>` reads as a
/// bare `https://t.co/…` link, or every link in that paragraph is a `t.co` link.
#[must_use]
pub fn is_link_only_embed(html: &str) -> bool {
    if html.trim().is_empty() {
        return true;
    }
    let doc = dom::parse(html);
    let paragraph = doc.select("p").first();
    let Some(node) = paragraph.nodes().first().copied() else {
        return true;
    };

    if TCO_LINK.is_match(&dom::plain_text(&node)) {
        info!("oEmbed payload is a bare t.co link");
        return true;
    }

    let links = paragraph.select("a");
    if links.length() > 0
        && links
            .iter()
            .all(|a| a.attr("href").is_some_and(|href| href.contains("t.co/")))
    {
        info!("oEmbed payload only holds t.co links");
        return true;
    }
    false
}

/// Strip Twitter/X interface chrome from a rendered article page.
///
/// Keeps text, images, author and date; removes counters, action buttons,
/// avatars, upsell links, menus and call-to-action footers.
#[must_use]
pub fn clean_twitter_article(html: &str) -> String {
    if html.trim().is_empty() {
        return html.to_string();
    }
    let doc = dom::parse(html);
    let mut removed = 0;

    for selector in TWITTER_UI_SELECTORS {
        let matched = doc.select(selector);
        removed += matched.length();
        dom::remove_all(&matched);
    }

    let mut parents: Vec<NodeRef> = Vec::new();
    for text in dom::text_nodes(&doc.root()) {
        if !TWITTER_UI_TEXT.is_match(&text.text()) {
            continue;
        }
        let Some(parent) = text.parent() else {
            continue;
        };
        if matches!(dom::node_tag(&parent).as_deref(), None | Some("html" | "head" | "body")) {
            continue;
        }
        if !parents.iter().any(|p| p.id == parent.id) {
            parents.push(parent);
        }
    }
    removed += parents.len();
    for parent in parents.into_iter().rev() {
        Selection::from(parent).remove();
    }

    for div in doc.select("div").nodes().iter().rev() {
        let sel = Selection::from(*div);
        let empty = sel.text().trim().is_empty()
            && sel.select("img").length() == 0
            && sel.children().length() == 0;
        if empty {
            sel.remove();
            removed += 1;
        }
    }

    if removed > 0 {
        info!("twitter article: removed {removed} interface element(s)");
    }
    doc.html().to_string()
}

/// Size avatar images and add a referrer policy the image CDN accepts.
#[must_use]
pub fn clean_xiaohongshu(html: &str) -> String {
    if html.trim().is_empty() {
        return html.to_string();
    }
    let doc = dom::parse(html);
    for img in doc.select("img").iter() {
        if img.attr("src").is_some_and(|src| XHS_AVATAR.is_match(&src)) {
            img.set_attr("style", XHS_AVATAR_STYLE);
            debug!("styled avatar image {:?}", img.attr("src"));
        }
    }
    doc.select("head").prepend_html(REFERRER_META);
    doc.html().to_string()
}

/// Standalone document around a retrieved article body.
#[must_use]
pub fn wrap_article(title: &str, content_html: &str) -> String {
    let title = if title.trim().is_empty() { "Untitled" } else { title.trim() };
    format!(
        "<html><head><meta charset='utf-8'><title>{}</title></head><body><article>{content_html}</article></body></html>",
        dom::escape_html(title)
    )
}

/// Note document: title heading, body, then the CDN images outside avatars.
#[must_use]
pub fn build_xiaohongshu_note(title: &str, content_html: &str, images: &[String]) -> String {
    let title = dom::escape_html(title.trim());
    let mut html = format!(
        "<html><head><meta charset='utf-8'><title>{title}</title></head><body><article><h1>{title}</h1>{content_html}"
    );
    if !images.is_empty() {
        html.push_str("<div class='images'>");
        for src in images.iter().filter(|src| !XHS_AVATAR.is_match(src)) {
            html.push_str(&format!("<img src=\"{}\" />", dom::escape_html(src)));
        }
        html.push_str("</div>");
    }
    html.push_str("</article></body></html>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_only_embed_detection() {
        assert!(is_link_only_embed(""));
        assert!(is_link_only_embed("<blockquote>no paragraph</blockquote>"));
        assert!(is_link_only_embed(
            r#"<blockquote><p lang="en"><a href="https://t.co/AbC123">https://t.co/AbC123</a></p>&mdash; Someone</blockquote>"#
        ));
        assert!(is_link_only_embed(
            r#"<blockquote><p>Read this <a href="https://t.co/xyz">piece</a></p></blockquote>"#
        ));
        assert!(!is_link_only_embed(
            r#"<blockquote><p>Shipping the new release today, notes at <a href="https://example.com/notes">example.com</a></p></blockquote>"#
        ));
        assert!(!is_link_only_embed("<blockquote><p>Just words, no links at all.</p></blockquote>"));
    }

    #[test]
    fn test_clean_twitter_article_removes_chrome() {
        let html = r#"<html><body><article>
            <div data-testid="UserAvatar"><img src="https://pbs.twimg.com/profile_images/1/a.jpg"></div>
            <h1>Long read</h1>
            <p>The actual article text stays in place.</p>
            <img src="https://pbs.twimg.com/media/figure.jpg">
            <span>12.3K Views</span>
            <div><button data-testid="like">Like</button></div>
            <a href="https://x.com/i/premium_sign_up">Upgrade</a>
            <div><span>Want to publish your own Article?</span></div>
            <div></div>
            </article></body></html>"#;
        let cleaned = clean_twitter_article(html);
        assert!(cleaned.contains("The actual article text"));
        assert!(cleaned.contains("media/figure.jpg"));
        assert!(cleaned.contains("Long read"));
        assert!(!cleaned.contains("profile_images"));
        assert!(!cleaned.contains("Views"));
        assert!(!cleaned.contains("Like"));
        assert!(!cleaned.contains("Upgrade"));
        assert!(!cleaned.contains("publish your own"));
        assert!(!cleaned.contains("<div></div>"));
    }

    #[test]
    fn test_clean_twitter_article_keeps_words_containing_view() {
        let html = "<html><body><p>An overview of the review process.</p></body></html>";
        let cleaned = clean_twitter_article(html);
        assert!(cleaned.contains("overview of the review"));
    }

    #[test]
    fn test_clean_xiaohongshu_styles_avatars_and_adds_referrer() {
        let html = r#"<html><head><title>t</title></head><body>
            <img src="https://sns-avatar-qc.xhscdn.com/avatar/1.jpg">
            <img src="https://sns-webpic-qc.xhscdn.com/photo.jpg"></body></html>"#;
        let cleaned = clean_xiaohongshu(html);
        let doc = dom::parse(&cleaned);
        assert_eq!(
            doc.select("img[src*='sns-avatar-qc']").attr("style").as_deref(),
            Some(XHS_AVATAR_STYLE)
        );
        assert!(doc.select("img[src*='webpic']").attr("style").is_none());
        assert_eq!(
            doc.select("head > meta").first().attr("content").as_deref(),
            Some("no-referrer-when-downgrade")
        );
    }

    #[test]
    fn test_wrap_article_escapes_title() {
        let html = wrap_article("A <b> & C", "<p>x</p>");
        let doc = dom::parse(&html);
        assert_eq!(dom::document_title(&doc).as_deref(), Some("A <b> & C"));
        assert_eq!(doc.select("article > p").text().to_string(), "x");
        assert!(wrap_article("  ", "<p>x</p>").contains("<title>Untitled</title>"));
    }

    #[test]
    fn test_note_skips_avatar_images() {
        let images = vec![
            "https://sns-avatar-qc.xhscdn.com/a.jpg".to_string(),
            "https://sns-webpic-qc.xhscdn.com/b.jpg".to_string(),
        ];
        let html = build_xiaohongshu_note("My Note", "<p>Body</p>", &images);
        let doc = dom::parse(&html);
        assert_eq!(doc.select("article > h1").text().to_string(), "My Note");
        assert_eq!(doc.select("div.images img").length(), 1);
        assert_eq!(
            doc.select("div.images img").attr("src").as_deref(),
            Some("https://sns-webpic-qc.xhscdn.com/b.jpg")
        );
    }
}
