//! Shared test doubles: a scripted browser and a scripted login prompt.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rs_surf::proxy::{NoSystemProxy, ProxyEnv};
use rs_surf::renderer::{LaunchOptions, RenderContext, Renderer, StorageState, StoredCookie, WaitStrategy};
use rs_surf::{Config, Error, Fetcher, LoginPrompt, ProxyResolver, Result};
use serde_json::Value;

/// What the scripted browser shows for one navigation.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPage {
    pub html: String,
    pub final_url: Option<String>,
    pub scripts: Vec<(String, Value)>,
}

impl ScriptedPage {
    pub fn new(html: &str) -> Self {
        Self {
            html: html.to_string(),
            ..Self::default()
        }
    }

    /// The navigation ends on `url` instead of the requested one.
    pub fn redirected_to(mut self, url: &str) -> Self {
        self.final_url = Some(url.to_string());
        self
    }

    /// Scripts containing `needle` evaluate to `value`.
    pub fn on_script(mut self, needle: &str, value: Value) -> Self {
        self.scripts.push((needle.to_string(), value));
        self
    }
}

/// One recorded browser launch.
#[derive(Debug, Clone)]
pub struct Launch {
    pub headless: bool,
    pub user_agent: String,
    pub width: u32,
    pub mobile: bool,
    pub proxy: Option<String>,
    pub storage_state: Option<StorageState>,
}

#[derive(Default)]
struct Inner {
    pages: Mutex<HashMap<String, VecDeque<ScriptedPage>>>,
    launches: Mutex<Vec<Launch>>,
    navigations: Mutex<Vec<String>>,
    closes: AtomicUsize,
}

/// Browser double. Pages are queued per URL; the last queued page repeats.
#[derive(Clone, Default)]
pub struct ScriptedRenderer {
    inner: Arc<Inner>,
}

impl ScriptedRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, url: &str, page: ScriptedPage) -> Self {
        self.inner
            .pages
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(page);
        self
    }

    pub fn launches(&self) -> Vec<Launch> {
        self.inner.launches.lock().unwrap().clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.inner.navigations.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    async fn launch(&self, options: LaunchOptions) -> Result<Box<dyn RenderContext>> {
        self.inner.launches.lock().unwrap().push(Launch {
            headless: options.headless,
            user_agent: options.profile.user_agent.clone(),
            width: options.profile.viewport.width,
            mobile: options.profile.viewport.mobile,
            proxy: options.proxy.map(|p| p.server),
            storage_state: options.storage_state,
        });
        Ok(Box::new(ScriptedContext {
            inner: Arc::clone(&self.inner),
            page: None,
            url: String::new(),
        }))
    }
}

struct ScriptedContext {
    inner: Arc<Inner>,
    page: Option<ScriptedPage>,
    url: String,
}

impl ScriptedContext {
    fn current(&self) -> Result<&ScriptedPage> {
        self.page
            .as_ref()
            .ok_or_else(|| Error::Render("no page loaded".to_string()))
    }
}

#[async_trait]
impl RenderContext for ScriptedContext {
    async fn navigate(&mut self, url: &str, _wait: WaitStrategy, _timeout: Duration) -> Result<()> {
        self.inner.navigations.lock().unwrap().push(url.to_string());
        let page = {
            let mut pages = self.inner.pages.lock().unwrap();
            let queue = pages.get_mut(url);
            match queue {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };
        let page = page.ok_or_else(|| Error::Render(format!("navigation to {url} timed out")))?;
        self.page = Some(page);
        self.url = url.to_string();
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        let page = self.current()?;
        Ok(page
            .scripts
            .iter()
            .find(|(needle, _)| script.contains(needle.as_str()))
            .map(|(_, value)| value.clone())
            .unwrap_or(Value::Null))
    }

    async fn content(&self) -> Result<String> {
        Ok(self.current()?.html.clone())
    }

    async fn current_url(&self) -> Result<String> {
        let page = self.current()?;
        Ok(page.final_url.clone().unwrap_or_else(|| self.url.clone()))
    }

    async fn storage_state(&self) -> Result<StorageState> {
        Ok(session_state())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.inner.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Storage state captured by every scripted login.
pub fn session_state() -> StorageState {
    StorageState {
        cookies: vec![StoredCookie {
            name: "web_session".to_string(),
            value: "abc123".to_string(),
            domain: ".xiaohongshu.com".to_string(),
            path: "/".to_string(),
            expires: Some(1_893_456_000.0),
            http_only: true,
            secure: true,
            same_site: Some("Lax".to_string()),
        }],
        origins: Vec::new(),
    }
}

/// Login prompt double answering a fixed value.
pub struct ScriptedPrompt {
    answer: bool,
    calls: AtomicUsize,
}

impl ScriptedPrompt {
    pub fn answering(answer: bool) -> Arc<Self> {
        Arc::new(Self {
            answer,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LoginPrompt for ScriptedPrompt {
    async fn confirm(&self, _site_id: &str, _login_url: &str) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer
    }
}

/// Configuration with every settle delay removed.
pub fn fast_config(auth_dir: &Path) -> Config {
    let mut config = Config {
        auth_dir: Some(auth_dir.to_path_buf()),
        ..Config::default()
    };
    config.fetch.settle_ms = 0;
    config.fetch.bot_sensitive_settle_ms = 0;
    config.fetch.auth_settle_ms = 0;
    config.fetch.selector_timeout_ms = 50;
    config.fetch.static_timeout_ms = 2_000;
    config.fetch.oembed_timeout_ms = 2_000;
    config
}

/// Fetcher over the doubles, isolated from the host's proxy settings.
pub fn fetcher(config: Config, renderer: &ScriptedRenderer, prompt: &Arc<ScriptedPrompt>) -> Fetcher {
    Fetcher::new(config)
        .expect("fetcher")
        .with_resolver(ProxyResolver::new(ProxyEnv::default(), Box::new(NoSystemProxy)))
        .with_renderer(Arc::new(renderer.clone()))
        .with_prompt(Arc::clone(prompt) as Arc<dyn LoginPrompt>)
}

/// Body long enough to pass the dynamic-content check.
pub fn long_article(marker: &str) -> String {
    let paragraph = format!("<p>{marker}: the council approved the budget, the plan, and the schedule after a long debate.</p>");
    format!(
        "<html><head><title>{marker}</title></head><body><article>{}</article></body></html>",
        paragraph.repeat(20)
    )
}
