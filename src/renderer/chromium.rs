//! Chromium renderer using chromiumoxide.
//!
//! Every [`Renderer::launch`] starts a dedicated browser process so proxy,
//! user agent and headless mode can differ per context. Closing the context
//! shuts the process down.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetTimezoneOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    Cookie, CookieParam, CookieSameSite, Headers, SetExtraHttpHeadersParams, TimeSinceEpoch,
};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, NavigateParams,
};
use chromiumoxide::handler::viewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{
    LaunchOptions, OriginState, RenderContext, Renderer, StorageEntry, StorageState,
    StoredCookie, WaitStrategy, STEALTH_SCRIPT,
};
use crate::error::{Error, Result};

/// Environment variable naming the Chromium executable.
pub const CHROMIUM_PATH_ENV: &str = "SURF_CHROMIUM_PATH";

const NETWORK_QUIET: Duration = Duration::from_millis(500);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Locate a Chromium executable.
///
/// Order: `SURF_CHROMIUM_PATH`, well-known names on `PATH`, the standard
/// macOS application bundle.
#[must_use]
pub fn find_chromium() -> Option<PathBuf> {
    if let Ok(p) = std::env::var(CHROMIUM_PATH_ENV) {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
        warn!("{CHROMIUM_PATH_ENV} points at missing file {p}");
    }

    for name in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser", "chrome"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    if cfg!(target_os = "macos") {
        let bundle = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if bundle.exists() {
            return Some(bundle);
        }
    }

    None
}

/// Launches one Chromium process per context.
#[derive(Debug, Clone, Default)]
pub struct ChromiumRenderer {
    executable: Option<PathBuf>,
}

impl ChromiumRenderer {
    /// Renderer using `executable`, or [`find_chromium`] when `None`.
    #[must_use]
    pub fn new(executable: Option<PathBuf>) -> Self {
        Self { executable }
    }

    fn browser_config(&self, options: &LaunchOptions) -> Result<BrowserConfig> {
        let executable = self
            .executable
            .clone()
            .or_else(find_chromium)
            .ok_or_else(|| Error::Render(format!("Chromium not found; set {CHROMIUM_PATH_ENV}")))?;

        let profile = &options.profile;
        let mut builder = BrowserConfig::builder()
            .chrome_executable(executable)
            .viewport(Some(viewport::Viewport {
                width: profile.viewport.width,
                height: profile.viewport.height,
                emulating_mobile: profile.viewport.mobile,
                has_touch: profile.viewport.mobile,
                ..Default::default()
            }))
            .window_size(profile.viewport.width, profile.viewport.height)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-sandbox")
            .arg(format!("--user-agent={}", profile.user_agent))
            .arg(format!("--lang={}", profile.locale));
        for arg in &profile.extra_args {
            builder = builder.arg(arg.as_str());
        }

        if !options.headless {
            builder = builder.with_head();
        }

        if let Some(proxy) = &options.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy.server));
            if let Some(bypass) = &proxy.bypass {
                builder = builder.arg(format!("--proxy-bypass-list={}", bypass.replace(',', ";")));
            }
        }

        builder.build().map_err(Error::Render)
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn launch(&self, options: LaunchOptions) -> Result<Box<dyn RenderContext>> {
        let config = self.browser_config(&options)?;
        debug!(
            "launching Chromium (headless: {}, proxy: {:?})",
            options.headless,
            options.proxy.as_ref().map(|p| &p.server)
        );

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| Error::Render(format!("failed to launch Chromium: {e}")))?;
        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        let mut context = ChromiumContext {
            browser,
            page: None,
            handler_task,
        };

        // Any setup failure must still tear the process down.
        let prepared = context.prepare(&options).await;
        match prepared {
            Ok(()) => Ok(Box::new(context)),
            Err(e) => {
                Box::new(context).shutdown().await;
                Err(e)
            }
        }
    }
}

/// A Chromium process with a single page.
pub struct ChromiumContext {
    browser: Browser,
    page: Option<Page>,
    handler_task: JoinHandle<()>,
}

impl ChromiumContext {
    async fn prepare(&mut self, options: &LaunchOptions) -> Result<()> {
        let page = self.browser.new_page("about:blank").await.map_err(Error::render)?;

        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
            .await
            .map_err(Error::render)?;

        if !options.profile.extra_headers.is_empty() {
            let headers: serde_json::Map<String, serde_json::Value> = options
                .profile
                .extra_headers
                .iter()
                .map(|(name, value)| (name.clone(), serde_json::Value::String(value.clone())))
                .collect();
            page.execute(SetExtraHttpHeadersParams::new(Headers::new(serde_json::Value::Object(headers))))
                .await
                .map_err(Error::render)?;
        }

        if let Some(tz) = &options.profile.timezone {
            if let Err(e) = page.execute(SetTimezoneOverrideParams::new(tz.clone())).await {
                debug!("timezone override rejected: {e}");
            }
        }

        if let Some(state) = &options.storage_state {
            let cookies = state
                .cookies
                .iter()
                .filter_map(|c| match to_cookie_param(c) {
                    Ok(param) => Some(param),
                    Err(e) => {
                        debug!("skipping cookie {}: {e}", c.name);
                        None
                    }
                })
                .collect::<Vec<_>>();
            if !cookies.is_empty() {
                page.set_cookies(cookies).await.map_err(Error::render)?;
            }
            if let Some(script) = state.local_storage_script() {
                page.execute(AddScriptToEvaluateOnNewDocumentParams::new(script))
                    .await
                    .map_err(Error::render)?;
            }
        }

        self.page = Some(page);
        Ok(())
    }

    fn page(&self) -> Result<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| Error::Render("browser page is not open".to_string()))
    }

    async fn ready_state(&self) -> Option<String> {
        let page = self.page.as_ref()?;
        let result = page.evaluate("document.readyState").await.ok()?;
        result.value().and_then(|v| v.as_str()).map(str::to_string)
    }

    async fn resource_count(&self) -> Option<u64> {
        let page = self.page.as_ref()?;
        let result = page
            .evaluate("performance.getEntriesByType('resource').length")
            .await
            .ok()?;
        result.value().and_then(serde_json::Value::as_u64)
    }

    async fn wait_ready_state(&self, accepted: &[&str]) {
        loop {
            match self.ready_state().await {
                Some(state) if accepted.contains(&state.as_str()) => return,
                _ => tokio::time::sleep(POLL_INTERVAL).await,
            }
        }
    }

    async fn wait_network_quiet(&self) {
        let mut last = self.resource_count().await;
        let mut quiet_since = tokio::time::Instant::now();
        loop {
            tokio::time::sleep(POLL_INTERVAL).await;
            let now = self.resource_count().await;
            if now != last {
                last = now;
                quiet_since = tokio::time::Instant::now();
            } else if quiet_since.elapsed() >= NETWORK_QUIET {
                return;
            }
        }
    }

    async fn shutdown(mut self: Box<Self>) {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!("page close failed: {e}");
            }
        }
        if let Err(e) = self.browser.close().await {
            debug!("browser close failed: {e}");
        }
        if let Err(e) = self.browser.wait().await {
            debug!("browser wait failed: {e}");
        }
        self.handler_task.abort();
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, wait: WaitStrategy, timeout: Duration) -> Result<()> {
        let page = self.page()?.clone();
        let outcome = tokio::time::timeout(timeout, async {
            let response = page
                .execute(NavigateParams::new(url))
                .await
                .map_err(|e| Error::Render(format!("navigation to {url} failed: {e}")))?;
            // DNS, connection and TLS failures only show up here; the page
            // itself becomes Chrome's error page.
            if let Some(err) = response.result.error_text.as_deref() {
                return Err(Error::Render(format!("navigation to {url} failed: {err}")));
            }
            match wait {
                WaitStrategy::DomContentLoaded => self.wait_ready_state(&["interactive", "complete"]).await,
                WaitStrategy::NetworkIdle => {
                    self.wait_ready_state(&["complete"]).await;
                    self.wait_network_quiet().await;
                }
            }
            Ok::<(), Error>(())
        })
        .await;

        match outcome {
            Ok(result) => result,
            Err(_) => Err(Error::Render(format!(
                "navigation to {url} timed out after {}ms",
                timeout.as_millis()
            ))),
        }
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let result = self.page()?.evaluate(script).await.map_err(Error::render)?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn content(&self) -> Result<String> {
        self.page()?.content().await.map_err(Error::render)
    }

    async fn current_url(&self) -> Result<String> {
        let url = self.page()?.url().await.map_err(Error::render)?;
        Ok(url.unwrap_or_default())
    }

    async fn storage_state(&self) -> Result<StorageState> {
        let page = self.page()?;
        let cookies = page
            .get_cookies()
            .await
            .map_err(Error::render)?
            .into_iter()
            .map(from_cookie)
            .collect();

        let origin = self.evaluate("location.origin").await?;
        let entries = self
            .evaluate("Object.entries(localStorage).map(([name, value]) => ({ name, value }))")
            .await?;
        let local_storage: Vec<StorageEntry> = serde_json::from_value(entries).unwrap_or_default();

        let origins = match origin.as_str() {
            Some(origin) if origin != "null" && !local_storage.is_empty() => vec![OriginState {
                origin: origin.to_string(),
                local_storage,
            }],
            _ => Vec::new(),
        };

        Ok(StorageState { cookies, origins })
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.shutdown().await;
        Ok(())
    }
}

fn to_cookie_param(cookie: &StoredCookie) -> std::result::Result<CookieParam, String> {
    let mut builder = CookieParam::builder()
        .name(cookie.name.clone())
        .value(cookie.value.clone())
        .domain(cookie.domain.clone())
        .path(cookie.path.clone())
        .http_only(cookie.http_only)
        .secure(cookie.secure);
    if let Some(expires) = cookie.expires.filter(|e| *e > 0.0) {
        builder = builder.expires(TimeSinceEpoch::new(expires));
    }
    if let Some(same_site) = cookie.same_site.as_deref().and_then(parse_same_site) {
        builder = builder.same_site(same_site);
    }
    builder.build()
}

fn parse_same_site(value: &str) -> Option<CookieSameSite> {
    match value.to_ascii_lowercase().as_str() {
        "strict" => Some(CookieSameSite::Strict),
        "lax" => Some(CookieSameSite::Lax),
        "none" => Some(CookieSameSite::None),
        _ => None,
    }
}

fn from_cookie(cookie: Cookie) -> StoredCookie {
    let same_site = cookie.same_site.map(|s| {
        match s {
            CookieSameSite::Strict => "Strict",
            CookieSameSite::Lax => "Lax",
            CookieSameSite::None => "None",
        }
        .to_string()
    });
    StoredCookie {
        name: cookie.name,
        value: cookie.value,
        domain: cookie.domain,
        path: cookie.path,
        expires: (!cookie.session && cookie.expires > 0.0).then_some(cookie.expires),
        http_only: cookie.http_only,
        secure: cookie.secure,
        same_site,
    }
}
