//! Site handlers.
//!
//! Each [`RetrievalStrategy`] has one handler. A handler returns
//! `Ok(Some(doc))` on success and `Ok(None)` to let generic retrieval take
//! over; the only error it raises is a session that expires again right
//! after a fresh login.

use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::{cleanup, close_context, settle, Fetcher};
use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::proxy::ProxyConfig;
use crate::renderer::{
    wait_for_condition, BrowserProfile, LaunchOptions, RenderContext, StorageState, Viewport, WaitStrategy,
};
use crate::result::{FetchStrategy, RawDocument};
use crate::sites::{RetrievalStrategy, SiteRule};
use crate::url_utils::{is_login_redirect, oembed_request_url};

const WECHAT_READY_SCRIPT: &str = "!!document.querySelector('#js_content')";

const WECHAT_TITLE_SCRIPT: &str =
    "(document.querySelector('#activity-name')?.innerText || document.title || '').trim()";

const WECHAT_CONTENT_SCRIPT: &str = r#"(() => {
    const el = document.querySelector('#js_content') || document.querySelector('.rich_media_content');
    if (el && el.innerHTML && el.innerHTML.trim().length > 20) return el.innerHTML;
    let match = null;
    for (const script of Array.from(document.scripts)) {
        const text = script.textContent || '';
        let m = text.match(/desc\s*:\s*JsDecode\(("[\s\S]*?")\)/);
        if (m) { match = m[1]; break; }
        m = text.match(/desc\s*:\s*"([\s\S]*?)"/);
        if (m) { match = '"' + m[1] + '"'; break; }
    }
    if (match) {
        try { return JSON.parse(match); } catch (e) {}
    }
    return '';
})()"#;

const XHS_TITLE_SCRIPT: &str = r#"(() => {
    const el = document.querySelector('h1.title') || document.querySelector('.note-title') || document.querySelector('h1');
    return (el && el.innerText && el.innerText.trim()) || document.title;
})()"#;

const XHS_CONTENT_SCRIPT: &str = r#"(() => {
    const selectors = ['.note-content', '.content', '.desc', '.note-desc', '[class*="content"]', '[class*="desc"]'];
    for (const selector of selectors) {
        const el = document.querySelector(selector);
        if (el && el.innerText && el.innerText.trim().length > 10) return el.innerHTML;
    }
    const main = document.querySelector('main') || document.querySelector('article');
    if (main) return main.innerHTML;
    return document.body ? document.body.innerHTML : '';
})()"#;

const XHS_IMAGES_SCRIPT: &str =
    "Array.from(document.querySelectorAll('img')).map(img => img.src).filter(src => src && src.includes('xhscdn.com'))";

/// One authenticated page load.
enum AuthAttempt {
    Page(RawDocument),
    LoginRedirect(String),
    Failed,
}

impl Fetcher {
    pub(super) async fn run_handler(
        &self,
        rule: &SiteRule,
        url: &str,
        proxy: &ProxyConfig,
    ) -> Result<Option<RawDocument>> {
        match rule.strategy {
            RetrievalStrategy::GenericOembed => Ok(self.fetch_oembed(rule, url, proxy).await),
            RetrievalStrategy::MobileBrowser => Ok(self.fetch_mobile(rule, url, proxy).await),
            RetrievalStrategy::AuthenticatedBrowser => self.fetch_authenticated(rule, url, proxy).await,
        }
    }

    async fn fetch_oembed(&self, rule: &SiteRule, url: &str, proxy: &ProxyConfig) -> Option<RawDocument> {
        let settings = &self.config.fetch;
        let request_url = match oembed_request_url(&settings.oembed_endpoint, url) {
            Ok(request_url) => request_url,
            Err(e) => {
                warn!("{e}");
                return None;
            }
        };
        let client = match HttpClient::new(&settings.user_agent, proxy.client_proxy().as_ref()) {
            Ok(client) => client,
            Err(e) => {
                warn!("cannot build oEmbed client: {e}");
                return None;
            }
        };

        let payload = match client.get_json(&request_url, settings.oembed_timeout()).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!("oEmbed request failed ({e}), falling back to generic retrieval");
                return None;
            }
        };
        let author = payload.get("author_name").and_then(Value::as_str).unwrap_or_default();
        let provider = payload.get("provider_name").and_then(Value::as_str).unwrap_or_default();
        info!("oEmbed response: author={author}, provider={provider}");
        let embed = payload.get("html").and_then(Value::as_str).unwrap_or_default();

        if !cleanup::is_link_only_embed(embed) {
            return Some(RawDocument {
                html: embed.to_string(),
                source_url: url.to_string(),
                final_url: url.to_string(),
                strategy: FetchStrategy::Handler(rule.site_id.clone()),
            });
        }

        info!("oEmbed returned a link-only embed, rendering the article page");
        let options = LaunchOptions {
            headless: true,
            proxy: proxy.browser_proxy(),
            profile: BrowserProfile::bot_sensitive(),
            storage_state: None,
        };
        match self
            .render_page(options, url, WaitStrategy::DomContentLoaded, settings.bot_sensitive_settle_ms)
            .await
        {
            Ok((html, final_url)) => Some(RawDocument {
                html: cleanup::clean_twitter_article(&html),
                source_url: url.to_string(),
                final_url,
                strategy: FetchStrategy::Handler(rule.site_id.clone()),
            }),
            Err(e) => {
                warn!("article render failed: {e}");
                None
            }
        }
    }

    async fn fetch_mobile(&self, rule: &SiteRule, url: &str, proxy: &ProxyConfig) -> Option<RawDocument> {
        let options = LaunchOptions {
            headless: true,
            proxy: proxy.browser_proxy(),
            profile: BrowserProfile::mobile(),
            storage_state: None,
        };
        let mut ctx = match self.renderer.launch(options).await {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!("{} handler: cannot launch browser: {e}", rule.site_id);
                return None;
            }
        };
        let outcome = self.read_mobile_article(ctx.as_mut(), url).await;
        close_context(ctx).await;

        match outcome {
            Ok(Some((html, final_url))) => Some(RawDocument {
                html,
                source_url: url.to_string(),
                final_url,
                strategy: FetchStrategy::Handler(rule.site_id.clone()),
            }),
            Ok(None) => {
                warn!("{} handler found no article body", rule.site_id);
                None
            }
            Err(e) => {
                warn!("{} handler failed: {e}", rule.site_id);
                None
            }
        }
    }

    async fn read_mobile_article(&self, ctx: &mut dyn RenderContext, url: &str) -> Result<Option<(String, String)>> {
        let settings = &self.config.fetch;
        ctx.navigate(url, WaitStrategy::DomContentLoaded, settings.navigation_timeout())
            .await?;
        if !wait_for_condition(
            &*ctx,
            WECHAT_READY_SCRIPT,
            settings.selector_timeout(),
            std::time::Duration::from_millis(250),
        )
        .await
        {
            debug!("#js_content did not appear, trying page scripts");
        }

        let title = js_string(&ctx.evaluate(WECHAT_TITLE_SCRIPT).await?);
        let content = js_string(&ctx.evaluate(WECHAT_CONTENT_SCRIPT).await?);
        if content.trim().is_empty() {
            return Ok(None);
        }
        let final_url = ctx.current_url().await.unwrap_or_else(|_| url.to_string());
        Ok(Some((cleanup::wrap_article(&title, &content), final_url)))
    }

    async fn fetch_authenticated(
        &self,
        rule: &SiteRule,
        url: &str,
        proxy: &ProxyConfig,
    ) -> Result<Option<RawDocument>> {
        let site_id = rule.site_id.as_str();
        let Some(login_url) = rule.login_url.as_deref() else {
            warn!("{site_id} requires a session but has no login page");
            return Ok(None);
        };

        if !self.auth.has_session(site_id) {
            warn!("no saved session for {site_id}, starting interactive login");
            if !self.run_login(site_id, login_url, proxy).await {
                error!("interactive login for {site_id} failed");
                return Ok(None);
            }
            info!("login for {site_id} saved, fetching content");
        }

        let mut relogged = false;
        loop {
            let state = self.auth.load(site_id).map(|session| session.storage_state);
            match self.authenticated_attempt(rule, url, proxy, state).await {
                AuthAttempt::Page(doc) => return Ok(Some(doc)),
                AuthAttempt::Failed => return Ok(None),
                AuthAttempt::LoginRedirect(current) if relogged => {
                    error!("{site_id} session expired again right after login");
                    return Err(Error::AuthExpired {
                        site_id: site_id.to_string(),
                        url: current,
                    });
                }
                AuthAttempt::LoginRedirect(current) => {
                    warn!("{site_id} session expired (landed on {current}), logging in again");
                    if let Err(e) = self.auth.clear(Some(site_id)) {
                        warn!("cannot remove stale session for {site_id}: {e}");
                    }
                    if !self.run_login(site_id, login_url, proxy).await {
                        error!("interactive login for {site_id} failed");
                        return Ok(None);
                    }
                    relogged = true;
                }
            }
        }
    }

    async fn authenticated_attempt(
        &self,
        rule: &SiteRule,
        url: &str,
        proxy: &ProxyConfig,
        storage_state: Option<StorageState>,
    ) -> AuthAttempt {
        let options = LaunchOptions {
            headless: true,
            proxy: proxy.browser_proxy(),
            profile: BrowserProfile {
                viewport: Viewport {
                    width: 1280,
                    height: 800,
                    mobile: false,
                },
                ..BrowserProfile::desktop(&self.config.fetch.user_agent)
            },
            storage_state,
        };
        let mut ctx = match self.renderer.launch(options).await {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!("{} handler: cannot launch browser: {e}", rule.site_id);
                return AuthAttempt::Failed;
            }
        };
        let outcome = self.read_note(ctx.as_mut(), url).await;
        close_context(ctx).await;

        match outcome {
            Ok(NotePage::Note { html, final_url }) => AuthAttempt::Page(RawDocument {
                html,
                source_url: url.to_string(),
                final_url,
                strategy: FetchStrategy::Handler(rule.site_id.clone()),
            }),
            Ok(NotePage::Login(current)) => AuthAttempt::LoginRedirect(current),
            Err(e) => {
                warn!("{} handler failed: {e}", rule.site_id);
                AuthAttempt::Failed
            }
        }
    }

    async fn read_note(&self, ctx: &mut dyn RenderContext, url: &str) -> Result<NotePage> {
        let settings = &self.config.fetch;
        ctx.navigate(url, WaitStrategy::DomContentLoaded, settings.navigation_timeout())
            .await?;
        settle(settings.auth_settle_ms).await;

        let current = ctx.current_url().await?;
        if is_login_redirect(&current) {
            return Ok(NotePage::Login(current));
        }

        let title = js_string(&ctx.evaluate(XHS_TITLE_SCRIPT).await?);
        let content = js_string(&ctx.evaluate(XHS_CONTENT_SCRIPT).await?);
        let images: Vec<String> = match ctx.evaluate(XHS_IMAGES_SCRIPT).await? {
            Value::Array(items) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };
        debug!("note has {} CDN image(s)", images.len());

        let note = cleanup::build_xiaohongshu_note(&title, &content, &images);
        Ok(NotePage::Note {
            html: cleanup::clean_xiaohongshu(&note),
            final_url: current,
        })
    }
}

enum NotePage {
    Note { html: String, final_url: String },
    Login(String),
}

/// String result of a page script; anything else reads as empty.
fn js_string(value: &Value) -> String {
    value.as_str().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_string() {
        assert_eq!(js_string(&Value::String("x".to_string())), "x");
        assert_eq!(js_string(&Value::Null), "");
        assert_eq!(js_string(&serde_json::json!(3)), "");
    }
}
