//! URL retrieval.
//!
//! [`Fetcher::fetch`] walks a small state machine:
//!
//! ```text
//! Start ──► TryHandler ──► Done
//!   │           │ falls through
//!   ├──────► TryStatic ──► Done
//!   │           │ error, short body or <noscript>
//!   └──────► TryBrowser ─► Done | FetchExhausted
//! ```
//!
//! Site handlers run first when the URL matches a [`SiteRule`]. A plain GET
//! follows unless the caller forces the browser, and the generic browser
//! render is the last resort.

pub mod cleanup;
mod handlers;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::auth::{AuthStore, ConsolePrompt, LoginPrompt};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::proxy::{ProxyConfig, ProxyResolver};
use crate::renderer::{self, BrowserProfile, LaunchOptions, RenderContext, Renderer, WaitStrategy};
use crate::result::{FetchStrategy, RawDocument};
use crate::sites::{PolicyOverrides, ResolvedPolicy, SiteRegistry, SiteRule};
use crate::url_utils::parse_http_url;

/// Per-call options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchRequest {
    /// Skip the plain GET and render in the browser directly.
    pub force_browser: bool,
    /// Caller policy flags (proxy, translation).
    pub overrides: PolicyOverrides,
}

impl FetchRequest {
    /// Request forcing the browser strategy.
    #[must_use]
    pub fn browser() -> Self {
        Self {
            force_browser: true,
            ..Self::default()
        }
    }
}

/// Retrieval state.
#[derive(Debug)]
enum FetchState<'r> {
    Start,
    TryHandler(&'r SiteRule),
    TryStatic,
    TryBrowser,
    Done(RawDocument),
}

/// Retrieves the HTML of a URL.
pub struct Fetcher {
    config: Config,
    registry: SiteRegistry,
    resolver: ProxyResolver,
    renderer: Arc<dyn Renderer>,
    auth: AuthStore,
    prompt: Arc<dyn LoginPrompt>,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("resolver", &self.resolver)
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

impl Fetcher {
    /// Fetcher with the built-in site rules, the process environment's
    /// proxy settings, the default browser and a console login prompt.
    pub fn new(config: Config) -> Result<Self> {
        let auth = AuthStore::from_config(&config)?;
        let renderer = renderer::default_renderer(&config);
        Ok(Self {
            registry: SiteRegistry::builtin().clone(),
            resolver: ProxyResolver::from_environment(),
            renderer,
            auth,
            prompt: Arc::new(ConsolePrompt),
            config,
        })
    }

    /// Replace the site rule table.
    #[must_use]
    pub fn with_registry(mut self, registry: SiteRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the proxy resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: ProxyResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Replace the browser driver.
    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Replace the session store.
    #[must_use]
    pub fn with_auth_store(mut self, auth: AuthStore) -> Self {
        self.auth = auth;
        self
    }

    /// Replace the interactive login prompt.
    #[must_use]
    pub fn with_prompt(mut self, prompt: Arc<dyn LoginPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Site rule table in use.
    #[must_use]
    pub fn registry(&self) -> &SiteRegistry {
        &self.registry
    }

    /// Session store in use.
    #[must_use]
    pub fn auth_store(&self) -> &AuthStore {
        &self.auth
    }

    /// Effective policy for `url`, translation flag included.
    #[must_use]
    pub fn policy(&self, url: &str, overrides: &PolicyOverrides) -> ResolvedPolicy {
        self.registry.resolve_policy(url, overrides, &self.config)
    }

    /// Open a visible browser on `site_id`'s login page and save the session.
    pub async fn login(&self, site_id: &str) -> Result<bool> {
        let rule = self
            .registry
            .get(site_id)
            .ok_or_else(|| Error::Configuration(format!("unknown site {site_id}")))?;
        let login_url = rule
            .login_url
            .as_deref()
            .ok_or_else(|| Error::Configuration(format!("site {site_id} has no login page")))?;
        let proxy = self.proxy_for(login_url, Some(rule), &PolicyOverrides::default());
        Ok(self.run_login(site_id, login_url, &proxy).await)
    }

    /// Retrieve `url`.
    ///
    /// Only a failed final browser attempt ([`Error::FetchExhausted`]) or a
    /// session that keeps expiring ([`Error::AuthExpired`]) is returned as an
    /// error; every other failure moves on to the next strategy.
    pub async fn fetch(&self, url: &str, request: &FetchRequest) -> Result<RawDocument> {
        parse_http_url(url)?;
        let rule = self.registry.match_url(url);
        let proxy = self.proxy_for(url, rule, &request.overrides);

        let mut state = FetchState::Start;
        loop {
            state = match state {
                FetchState::Start => match rule {
                    Some(rule) => {
                        info!("{url} matches site {}", rule.site_id);
                        FetchState::TryHandler(rule)
                    }
                    None => self.generic_entry(request),
                },
                FetchState::TryHandler(rule) => match self.run_handler(rule, url, &proxy).await? {
                    Some(doc) => FetchState::Done(doc),
                    None => {
                        info!("{} handler produced nothing, using generic retrieval", rule.site_id);
                        self.generic_entry(request)
                    }
                },
                FetchState::TryStatic => match self.try_static(url, &proxy).await {
                    Some(doc) => FetchState::Done(doc),
                    None => FetchState::TryBrowser,
                },
                FetchState::TryBrowser => match self.try_browser(url, rule, &proxy).await {
                    Ok(doc) => FetchState::Done(doc),
                    Err(e) => {
                        warn!("browser retrieval of {url} failed: {e}");
                        return Err(Error::FetchExhausted {
                            strategy: FetchStrategy::Browser.to_string(),
                            source: Box::new(e),
                        });
                    }
                },
                FetchState::Done(doc) => {
                    info!("fetched {url} via {} ({} bytes)", doc.strategy, doc.html.len());
                    return Ok(doc);
                }
            };
        }
    }

    fn generic_entry(&self, request: &FetchRequest) -> FetchState<'static> {
        if request.force_browser {
            debug!("browser forced by caller");
            FetchState::TryBrowser
        } else {
            FetchState::TryStatic
        }
    }

    /// Proxy for every request of one fetch.
    ///
    /// Sites flagged `force_proxy` use the forced resolution; others resolve
    /// the mode chosen by explicit override, then site default, then config.
    fn proxy_for(&self, url: &str, rule: Option<&SiteRule>, overrides: &PolicyOverrides) -> ProxyConfig {
        let network = &self.config.network;
        if rule.is_some_and(|r| r.force_proxy) {
            return self.resolver.resolve_forced(
                overrides.proxy_mode,
                overrides.custom_proxy.as_deref(),
                network.custom_proxy.as_deref(),
            );
        }
        let policy = self.policy(url, overrides);
        self.resolver.resolve(
            policy.proxy_mode,
            policy.custom_proxy.as_deref(),
            network.proxy_bypass.as_deref(),
        )
    }

    async fn try_static(&self, url: &str, proxy: &ProxyConfig) -> Option<RawDocument> {
        let settings = &self.config.fetch;
        let client = match HttpClient::new(&settings.user_agent, proxy.client_proxy().as_ref()) {
            Ok(client) => client,
            Err(e) => {
                warn!("cannot build HTTP client: {e}");
                return None;
            }
        };

        let response = match client.get(url, settings.static_timeout()).await {
            Ok(response) => response,
            Err(e) => {
                warn!("static fetch failed: {e}, switching to browser");
                return None;
            }
        };

        let chars = response.body.chars().count();
        if chars < settings.min_static_body_chars {
            info!("static body has only {chars} chars, switching to browser");
            return None;
        }
        if response.body.contains("<noscript>") {
            info!("static body contains <noscript>, switching to browser");
            return None;
        }

        Some(RawDocument {
            html: response.body,
            source_url: url.to_string(),
            final_url: response.final_url,
            strategy: FetchStrategy::Static,
        })
    }

    async fn try_browser(&self, url: &str, rule: Option<&SiteRule>, proxy: &ProxyConfig) -> Result<RawDocument> {
        let settings = &self.config.fetch;
        let bot_sensitive = rule.is_some_and(|r| r.bot_sensitive);
        let (profile, wait, settle) = if bot_sensitive {
            debug!("bot-sensitive site: DOM-ready wait with {}ms settle", settings.bot_sensitive_settle_ms);
            (
                BrowserProfile::bot_sensitive(),
                WaitStrategy::DomContentLoaded,
                settings.bot_sensitive_settle_ms,
            )
        } else {
            (
                BrowserProfile::desktop(&settings.user_agent),
                WaitStrategy::NetworkIdle,
                settings.settle_ms,
            )
        };

        let options = LaunchOptions {
            headless: true,
            proxy: proxy.browser_proxy(),
            profile,
            storage_state: None,
        };
        let (html, final_url) = self.render_page(options, url, wait, settle).await?;
        Ok(RawDocument {
            html,
            source_url: url.to_string(),
            final_url,
            strategy: FetchStrategy::Browser,
        })
    }

    /// Launch, navigate, settle and read the page. The context is closed
    /// whatever happens after launch.
    async fn render_page(
        &self,
        options: LaunchOptions,
        url: &str,
        wait: WaitStrategy,
        settle_ms: u64,
    ) -> Result<(String, String)> {
        info!("launching browser for {url}");
        let mut ctx = self.renderer.launch(options).await?;
        let outcome = self.read_rendered(ctx.as_mut(), url, wait, settle_ms).await;
        close_context(ctx).await;
        outcome
    }

    async fn read_rendered(
        &self,
        ctx: &mut dyn RenderContext,
        url: &str,
        wait: WaitStrategy,
        settle_ms: u64,
    ) -> Result<(String, String)> {
        ctx.navigate(url, wait, self.config.fetch.navigation_timeout()).await?;
        settle(settle_ms).await;
        let html = ctx.content().await?;
        let final_url = ctx.current_url().await.unwrap_or_else(|_| url.to_string());
        Ok((html, final_url))
    }

    async fn run_login(&self, site_id: &str, login_url: &str, proxy: &ProxyConfig) -> bool {
        self.auth
            .interactive_login(
                site_id,
                login_url,
                self.renderer.as_ref(),
                proxy.browser_proxy(),
                self.prompt.as_ref(),
                self.config.fetch.navigation_timeout(),
            )
            .await
    }
}

async fn settle(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

async fn close_context(ctx: Box<dyn RenderContext>) {
    if let Err(e) = ctx.close().await {
        debug!("browser close failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::{NoSystemProxy, ProxyEnv, ProxyMode};

    fn fetcher() -> Fetcher {
        let config = Config {
            auth_dir: Some(std::env::temp_dir().join("rs-surf-unit-auth")),
            ..Config::default()
        };
        Fetcher::new(config)
            .expect("fetcher")
            .with_resolver(ProxyResolver::new(ProxyEnv::default(), Box::new(NoSystemProxy)))
    }

    #[test]
    fn test_policy_exposes_site_defaults() {
        let f = fetcher();
        let policy = f.policy("https://mp.weixin.qq.com/s/abc", &PolicyOverrides::default());
        assert_eq!(policy.site_id.as_deref(), Some("wechat"));
        assert!(!policy.translate);
        assert_eq!(policy.proxy_mode, ProxyMode::None);
    }

    #[test]
    fn test_generic_entry_honours_force_browser() {
        let f = fetcher();
        assert!(matches!(f.generic_entry(&FetchRequest::browser()), FetchState::TryBrowser));
        assert!(matches!(f.generic_entry(&FetchRequest::default()), FetchState::TryStatic));
    }

    #[test]
    fn test_proxy_for_wechat_is_direct() {
        let f = fetcher();
        let rule = f.registry().get("wechat");
        let proxy = f.proxy_for("https://mp.weixin.qq.com/s/abc", rule, &PolicyOverrides::default());
        assert!(proxy.is_direct());
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let f = fetcher();
        let err = f.fetch("not a url", &FetchRequest::default()).await.expect_err("invalid");
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }
}
