//! Browser abstraction.
//!
//! The fetcher only talks to the [`Renderer`] and [`RenderContext`] traits.
//! [`chromium::ChromiumRenderer`] drives a real Chromium over CDP; tests
//! substitute a scripted implementation.

#[cfg(feature = "browser")]
pub mod chromium;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{Config, DESKTOP_USER_AGENT};
use crate::error::{Error, Result};
use crate::proxy::BrowserProxy;

/// User agent of the bot-sensitive profile.
pub const MAC_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                                  AppleWebKit/537.36 (KHTML, like Gecko) \
                                  Chrome/120.0.0.0 Safari/537.36";

/// User agent of the WeChat in-app browser on iPhone.
pub const WECHAT_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) \
                                     AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148 \
                                     MicroMessenger/8.0.38(0x1800262c) NetType/WIFI Language/zh_CN";

/// Init script hiding the usual automation fingerprints.
pub const STEALTH_SCRIPT: &str = r"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
window.chrome = { runtime: {} };
";

/// When a navigation counts as finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStrategy {
    /// Load event plus a quiet network.
    NetworkIdle,
    /// The DOM has been parsed; subresources may still be loading.
    DomContentLoaded,
}

/// Window size and device class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    /// CSS pixels.
    pub width: u32,
    /// CSS pixels.
    pub height: u32,
    /// Emulate a touch device.
    pub mobile: bool,
}

/// Identity the browser presents to sites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserProfile {
    /// `User-Agent` header and `navigator.userAgent`.
    pub user_agent: String,
    /// Window size.
    pub viewport: Viewport,
    /// Browser UI language.
    pub locale: String,
    /// IANA timezone, `None` keeps the host's.
    pub timezone: Option<String>,
    /// Extra Chromium command-line switches.
    pub extra_args: Vec<String>,
    /// Headers sent with every request of the page.
    pub extra_headers: Vec<(String, String)>,
}

impl BrowserProfile {
    /// Generic desktop profile.
    #[must_use]
    pub fn desktop(user_agent: &str) -> Self {
        Self {
            user_agent: user_agent.to_string(),
            viewport: Viewport {
                width: 1920,
                height: 1080,
                mobile: false,
            },
            locale: "en-US".to_string(),
            timezone: Some("America/New_York".to_string()),
            extra_args: Vec::new(),
            extra_headers: Vec::new(),
        }
    }

    /// Conservative profile for sites that fingerprint automation.
    ///
    /// Relaxes site isolation and same-origin checks and sends the headers
    /// of an ordinary desktop browser.
    #[must_use]
    pub fn bot_sensitive() -> Self {
        Self {
            user_agent: MAC_USER_AGENT.to_string(),
            viewport: Viewport {
                width: 1280,
                height: 800,
                mobile: false,
            },
            extra_args: vec![
                "--disable-features=IsolateOrigins,site-per-process,BlockInsecurePrivateNetworkRequests".to_string(),
                "--disable-web-security".to_string(),
            ],
            extra_headers: vec![
                ("Accept-Language".to_string(), "en-US,en;q=0.9".to_string()),
                (
                    "Accept".to_string(),
                    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8".to_string(),
                ),
            ],
            ..Self::desktop(MAC_USER_AGENT)
        }
    }

    /// WeChat in-app browser on an iPhone.
    #[must_use]
    pub fn mobile() -> Self {
        Self {
            user_agent: WECHAT_USER_AGENT.to_string(),
            viewport: Viewport {
                width: 375,
                height: 812,
                mobile: true,
            },
            locale: "zh-CN".to_string(),
            timezone: Some("Asia/Shanghai".to_string()),
            extra_args: Vec::new(),
            extra_headers: Vec::new(),
        }
    }

    /// Visible window for interactive login.
    #[must_use]
    pub fn login() -> Self {
        Self {
            viewport: Viewport {
                width: 1280,
                height: 800,
                mobile: false,
            },
            timezone: None,
            ..Self::desktop(DESKTOP_USER_AGENT)
        }
    }
}

impl Default for BrowserProfile {
    fn default() -> Self {
        Self::desktop(DESKTOP_USER_AGENT)
    }
}

/// Everything needed to start one browser context.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Run without a window.
    pub headless: bool,
    /// Proxy server, `None` for direct.
    pub proxy: Option<BrowserProxy>,
    /// Identity to present.
    pub profile: BrowserProfile,
    /// Session to restore before the first navigation.
    pub storage_state: Option<StorageState>,
}

/// Cookies and per-origin local storage of a browser context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageState {
    /// All cookies of the context.
    #[serde(default)]
    pub cookies: Vec<StoredCookie>,
    /// Local storage, grouped by origin.
    #[serde(default)]
    pub origins: Vec<OriginState>,
}

/// One cookie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Domain attribute.
    pub domain: String,
    /// Path attribute.
    #[serde(default = "root_path")]
    pub path: String,
    /// Expiry as seconds since the epoch; negative or absent for session cookies.
    #[serde(default)]
    pub expires: Option<f64>,
    /// `HttpOnly` flag.
    #[serde(default)]
    pub http_only: bool,
    /// `Secure` flag.
    #[serde(default)]
    pub secure: bool,
    /// `Strict`, `Lax` or `None`.
    #[serde(default)]
    pub same_site: Option<String>,
}

fn root_path() -> String {
    "/".to_string()
}

/// Local storage of one origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginState {
    /// `scheme://host[:port]`.
    pub origin: String,
    /// Key/value pairs.
    #[serde(default)]
    pub local_storage: Vec<StorageEntry>,
}

/// One local storage item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEntry {
    /// Key.
    pub name: String,
    /// Value.
    pub value: String,
}

impl StorageState {
    /// Whether the state carries nothing to restore.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.origins.iter().all(|o| o.local_storage.is_empty())
    }

    /// Init script that refills local storage for the matching origin.
    ///
    /// `None` when there is no local storage to restore.
    #[must_use]
    pub fn local_storage_script(&self) -> Option<String> {
        let map: serde_json::Map<String, serde_json::Value> = self
            .origins
            .iter()
            .filter(|o| !o.local_storage.is_empty())
            .map(|o| {
                let entries = o
                    .local_storage
                    .iter()
                    .map(|e| serde_json::json!([e.name, e.value]))
                    .collect();
                (o.origin.clone(), serde_json::Value::Array(entries))
            })
            .collect();
        if map.is_empty() {
            return None;
        }
        let data = serde_json::Value::Object(map);
        Some(format!(
            "(() => {{ const entries = ({data})[location.origin]; if (!entries) return; \
             for (const [k, v] of entries) {{ try {{ localStorage.setItem(k, v); }} catch (e) {{}} }} }})();"
        ))
    }
}

/// A browser engine.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Start a fresh browser context.
    async fn launch(&self, options: LaunchOptions) -> Result<Box<dyn RenderContext>>;
}

/// One live browser context with a single page.
///
/// Callers must call [`RenderContext::close`] on every path.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate and wait per `wait`, bounded by `timeout`.
    async fn navigate(&mut self, url: &str, wait: WaitStrategy, timeout: Duration) -> Result<()>;
    /// Evaluate a JavaScript expression; `undefined` comes back as `null`.
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;
    /// Serialized DOM of the page.
    async fn content(&self) -> Result<String>;
    /// URL currently displayed.
    async fn current_url(&self) -> Result<String>;
    /// Export cookies and local storage.
    async fn storage_state(&self) -> Result<StorageState>;
    /// Tear the context (and its browser) down.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Renderer used when browser support is compiled out.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRenderer;

#[async_trait]
impl Renderer for NoopRenderer {
    async fn launch(&self, _options: LaunchOptions) -> Result<Box<dyn RenderContext>> {
        Err(Error::Render("browser support is not available in this build".to_string()))
    }
}

/// Default renderer for `config`.
#[must_use]
pub fn default_renderer(config: &Config) -> Arc<dyn Renderer> {
    #[cfg(feature = "browser")]
    {
        Arc::new(chromium::ChromiumRenderer::new(config.chromium_path.clone()))
    }
    #[cfg(not(feature = "browser"))]
    {
        let _ = config;
        Arc::new(NoopRenderer)
    }
}

/// Poll `script` until it evaluates truthy or `timeout` elapses.
///
/// Returns whether the condition was met. Evaluation errors count as "not yet".
pub async fn wait_for_condition(
    ctx: &dyn RenderContext,
    script: &str,
    timeout: Duration,
    interval: Duration,
) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Ok(value) = ctx.evaluate(script).await {
            if is_truthy(&value) {
                return true;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(interval).await;
    }
}

fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        serde_json::Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_state_json_shape() {
        let json = r#"{
            "cookies": [{"name": "web_session", "value": "abc", "domain": ".xiaohongshu.com",
                         "path": "/", "expires": 1893456000.0, "httpOnly": true, "secure": true,
                         "sameSite": "Lax"}],
            "origins": [{"origin": "https://www.xiaohongshu.com",
                         "localStorage": [{"name": "token", "value": "t"}]}]
        }"#;
        let state: StorageState = serde_json::from_str(json).expect("parses");
        assert_eq!(state.cookies.len(), 1);
        assert!(state.cookies[0].http_only);
        assert_eq!(state.cookies[0].same_site.as_deref(), Some("Lax"));
        assert_eq!(state.origins[0].local_storage[0].name, "token");
        assert!(!state.is_empty());
    }

    #[test]
    fn test_cookie_defaults() {
        let cookie: StoredCookie =
            serde_json::from_str(r#"{"name": "a", "value": "b", "domain": "example.com"}"#).expect("parses");
        assert_eq!(cookie.path, "/");
        assert!(cookie.expires.is_none());
        assert!(!cookie.secure);
    }

    #[test]
    fn test_local_storage_script_is_origin_guarded() {
        let state = StorageState {
            cookies: Vec::new(),
            origins: vec![OriginState {
                origin: "https://www.xiaohongshu.com".to_string(),
                local_storage: vec![StorageEntry {
                    name: "k".to_string(),
                    value: "it's \"quoted\"".to_string(),
                }],
            }],
        };
        let script = state.local_storage_script().expect("script");
        assert!(script.contains("location.origin"));
        assert!(script.contains("https://www.xiaohongshu.com"));
        assert!(script.contains(r#"it's \"quoted\""#));

        assert!(StorageState::default().local_storage_script().is_none());
    }

    #[test]
    fn test_profiles() {
        let mobile = BrowserProfile::mobile();
        assert!(mobile.user_agent.contains("MicroMessenger"));
        assert!(mobile.viewport.mobile);

        let guarded = BrowserProfile::bot_sensitive();
        assert_eq!((guarded.viewport.width, guarded.viewport.height), (1280, 800));
        assert!(guarded.user_agent.contains("Macintosh"));
        assert!(guarded.extra_args.iter().any(|a| a == "--disable-web-security"));
        assert!(guarded
            .extra_args
            .iter()
            .any(|a| a.starts_with("--disable-features=") && a.contains("IsolateOrigins,site-per-process")));
        assert!(guarded
            .extra_headers
            .iter()
            .any(|(name, value)| name == "Accept-Language" && value == "en-US,en;q=0.9"));
        assert!(guarded.extra_headers.iter().any(|(name, _)| name == "Accept"));

        assert!(BrowserProfile::default().extra_args.is_empty());
        assert!(BrowserProfile::mobile().extra_headers.is_empty());
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&serde_json::Value::Null));
        assert!(!is_truthy(&serde_json::json!(false)));
        assert!(!is_truthy(&serde_json::json!("")));
        assert!(is_truthy(&serde_json::json!(true)));
        assert!(is_truthy(&serde_json::json!({"a": 1})));
    }
}
