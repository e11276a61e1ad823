//! Process-wide configuration for acquisition.
//!
//! `Config` is built once at startup, either from defaults or from a JSON
//! file, and passed by reference to the fetcher. Every field has a default so
//! partial files are accepted.
//!
//! ```json
//! {
//!   "network": { "proxy_mode": "set", "custom_proxy": "http://127.0.0.1:7890" },
//!   "fetch": { "static_timeout_ms": 8000 }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::proxy::ProxyMode;

/// Desktop user agent used for static requests and the generic browser profile.
pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                                      AppleWebKit/537.36 (KHTML, like Gecko) \
                                      Chrome/120.0.0.0 Safari/537.36";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Proxy settings.
    pub network: NetworkConfig,

    /// Global default for the translation policy.
    ///
    /// Site rules and explicit caller overrides take precedence.
    ///
    /// Default: `true`
    pub translate_by_default: bool,

    /// Timeouts and retrieval knobs.
    pub fetch: FetchSettings,

    /// Directory holding saved browser sessions.
    ///
    /// Default: `~/.surf/auth`
    pub auth_dir: Option<PathBuf>,

    /// Chromium executable. Falls back to `SURF_CHROMIUM_PATH`, then `PATH`.
    pub chromium_path: Option<PathBuf>,
}

/// The `[network]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Proxy mode used when neither the caller nor a site rule decides.
    pub proxy_mode: ProxyMode,

    /// Proxy URL for `custom` mode, and the last resort for forced-proxy sites.
    pub custom_proxy: Option<String>,

    /// Bypass list handed to the browser in `custom` mode.
    pub proxy_bypass: Option<String>,
}

/// Timeouts and thresholds for the fetcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    /// User agent for static requests.
    pub user_agent: String,

    /// Timeout for the plain HTTP GET.
    ///
    /// Default: `10000`
    pub static_timeout_ms: u64,

    /// Timeout for the oEmbed request.
    ///
    /// Default: `30000`
    pub oembed_timeout_ms: u64,

    /// Timeout for a browser navigation.
    ///
    /// Default: `60000`
    pub navigation_timeout_ms: u64,

    /// Post-load delay for ordinary sites.
    ///
    /// Default: `2000`
    pub settle_ms: u64,

    /// Post-DOM-ready delay for bot-sensitive sites.
    ///
    /// Default: `5000`
    pub bot_sensitive_settle_ms: u64,

    /// Post-DOM-ready delay for authenticated sites.
    ///
    /// Default: `3000`
    pub auth_settle_ms: u64,

    /// How long to wait for a site's content selector to appear.
    ///
    /// Default: `15000`
    pub selector_timeout_ms: u64,

    /// Static bodies shorter than this are treated as JS-rendered.
    ///
    /// Default: `1000`
    pub min_static_body_chars: usize,

    /// oEmbed endpoint for the twitter handler.
    pub oembed_endpoint: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            translate_by_default: true,
            fetch: FetchSettings::default(),
            auth_dir: None,
            chromium_path: None,
        }
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            user_agent: DESKTOP_USER_AGENT.to_string(),
            static_timeout_ms: 10_000,
            oembed_timeout_ms: 30_000,
            navigation_timeout_ms: 60_000,
            settle_ms: 2_000,
            bot_sensitive_settle_ms: 5_000,
            auth_settle_ms: 3_000,
            selector_timeout_ms: 15_000,
            min_static_body_chars: 1_000,
            oembed_endpoint: "https://publish.twitter.com/oembed".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::Configuration(format!("{}: {e}", path.display())))
    }

    /// Load `path` if it exists, otherwise fall back to defaults with a warning.
    #[must_use]
    pub fn from_file_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!("config file {} not found, using defaults", path.display());
            return Self::default();
        }
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("ignoring unreadable config: {e}");
                Self::default()
            }
        }
    }

    /// Session directory, resolving the per-user default.
    pub fn auth_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.auth_dir {
            return Ok(dir.clone());
        }
        dirs::home_dir()
            .map(|home| home.join(".surf").join("auth"))
            .ok_or_else(|| Error::Configuration("cannot locate home directory".to_string()))
    }
}

impl FetchSettings {
    /// Static request timeout.
    #[must_use]
    pub fn static_timeout(&self) -> Duration {
        Duration::from_millis(self.static_timeout_ms)
    }

    /// oEmbed request timeout.
    #[must_use]
    pub fn oembed_timeout(&self) -> Duration {
        Duration::from_millis(self.oembed_timeout_ms)
    }

    /// Browser navigation timeout.
    #[must_use]
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    /// Selector wait timeout.
    #[must_use]
    pub fn selector_timeout(&self) -> Duration {
        Duration::from_millis(self.selector_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.network.proxy_mode, ProxyMode::Auto);
        assert!(config.network.custom_proxy.is_none());
        assert!(config.translate_by_default);
        assert_eq!(config.fetch.static_timeout_ms, 10_000);
        assert_eq!(config.fetch.navigation_timeout_ms, 60_000);
        assert_eq!(config.fetch.min_static_body_chars, 1_000);
        assert_eq!(config.fetch.settle_ms, 2_000);
        assert_eq!(config.fetch.bot_sensitive_settle_ms, 5_000);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{"network": {{"proxy_mode": "set", "custom_proxy": "http://127.0.0.1:7890"}}, "fetch": {{"static_timeout_ms": 5000}}}}"#
        )
        .expect("write config");

        let config = Config::from_file(file.path()).expect("config parses");
        assert_eq!(config.network.proxy_mode, ProxyMode::Custom);
        assert_eq!(
            config.network.custom_proxy.as_deref(),
            Some("http://127.0.0.1:7890")
        );
        assert_eq!(config.fetch.static_timeout_ms, 5_000);
        assert_eq!(config.fetch.navigation_timeout_ms, 60_000);
        assert!(config.translate_by_default);
    }

    #[test]
    fn test_unknown_proxy_mode_is_configuration_error() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"network": {{"proxy_mode": "sometimes"}}}}"#).expect("write config");

        let err = Config::from_file(file.path()).expect_err("bad mode rejected");
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = Config::from_file_or_default("/definitely/not/here.json");
        assert_eq!(config.fetch.static_timeout_ms, 10_000);
    }

    #[test]
    fn test_explicit_auth_dir_wins() {
        let config = Config {
            auth_dir: Some(PathBuf::from("/tmp/sessions")),
            ..Config::default()
        };
        assert_eq!(
            config.auth_dir().expect("dir"),
            PathBuf::from("/tmp/sessions")
        );
    }
}
