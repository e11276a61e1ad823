//! Proxy resolution.
//!
//! Turns a proxy mode (from the caller, a site rule or the global config)
//! into the two forms the acquisition layer needs: a proxy set for the HTTP
//! client and a single server (+ bypass list) for the browser.
//!
//! Resolution never fails. A mode that cannot be honoured degrades to
//! [`ProxyMode::Auto`] with a logged warning, and forced-proxy sites without
//! any proxy available go direct with a warning.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// How the proxy is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProxyMode {
    /// Standard proxy environment variables, direct if unset.
    #[default]
    Auto,
    /// Always direct.
    None,
    /// Operating system proxy settings.
    System,
    /// An explicitly configured proxy URL.
    Custom,
}

impl ProxyMode {
    /// Canonical lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::None => "no",
            Self::System => "system",
            Self::Custom => "custom",
        }
    }
}

impl FromStr for ProxyMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Ok(Self::Auto),
            "no" | "none" | "off" => Ok(Self::None),
            "win" | "system" => Ok(Self::System),
            "set" | "custom" => Ok(Self::Custom),
            other => Err(Error::Configuration(format!("unknown proxy mode '{other}'"))),
        }
    }
}

impl TryFrom<String> for ProxyMode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ProxyMode> for String {
    fn from(mode: ProxyMode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for ProxyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the standard proxy environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyEnv {
    /// `http_proxy` / `HTTP_PROXY`
    pub http_proxy: Option<String>,
    /// `https_proxy` / `HTTPS_PROXY`
    pub https_proxy: Option<String>,
    /// `no_proxy` / `NO_PROXY`
    pub no_proxy: Option<String>,
}

impl ProxyEnv {
    /// Read the variables of the current process.
    #[must_use]
    pub fn from_process() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a snapshot from an arbitrary variable source.
    ///
    /// The lowercase name wins over the uppercase one. An empty value counts
    /// as unset, so an empty lowercase variable falls through to the uppercase one.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let var = |name: &str| non_empty(name).or_else(|| non_empty(&name.to_ascii_uppercase()));
        Self {
            http_proxy: var("http_proxy"),
            https_proxy: var("https_proxy"),
            no_proxy: var("no_proxy"),
        }
    }

    fn is_empty(&self) -> bool {
        self.http_proxy.is_none() && self.https_proxy.is_none()
    }
}

/// Source of the operating system's proxy setting.
pub trait SystemProxyLookup: Send + Sync {
    /// Raw proxy server string, `Ok(None)` when no system proxy is enabled.
    fn lookup(&self) -> Result<Option<String>>;
}

/// Reads the WinINET proxy from the Windows registry via `reg query`.
///
/// Reports no proxy on other platforms.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryProxyLookup;

const INTERNET_SETTINGS_KEY: &str =
    r"HKCU\Software\Microsoft\Windows\CurrentVersion\Internet Settings";

impl SystemProxyLookup for RegistryProxyLookup {
    fn lookup(&self) -> Result<Option<String>> {
        if !cfg!(windows) {
            return Ok(None);
        }
        let enabled = query_registry_value("ProxyEnable")?;
        let enabled = enabled
            .as_deref()
            .is_some_and(|v| v != "0x0" && v != "0");
        if !enabled {
            return Ok(None);
        }
        query_registry_value("ProxyServer")
    }
}

fn query_registry_value(name: &str) -> Result<Option<String>> {
    let output = std::process::Command::new("reg")
        .args(["query", INTERNET_SETTINGS_KEY, "/v", name])
        .output()?;
    if !output.status.success() {
        return Ok(None);
    }
    Ok(parse_reg_value(&String::from_utf8_lossy(&output.stdout), name))
}

/// Extract a value from `reg query` output (`    Name    REG_SZ    value`).
#[must_use]
pub fn parse_reg_value(output: &str, name: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        if !parts.next()?.eq_ignore_ascii_case(name) {
            return None;
        }
        let kind = parts.next()?;
        if !kind.starts_with("REG_") {
            return None;
        }
        let value = parts.collect::<Vec<_>>().join(" ");
        (!value.is_empty()).then_some(value)
    })
}

/// A lookup that never finds a system proxy.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSystemProxy;

impl SystemProxyLookup for NoSystemProxy {
    fn lookup(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Effective proxy configuration for one fetch call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Mode actually applied after any degradation.
    pub mode: ProxyMode,
    /// Proxy for `http://` URLs.
    pub http: Option<String>,
    /// Proxy for `https://` URLs.
    pub https: Option<String>,
    /// Hosts that bypass the proxy.
    pub bypass: Option<String>,
}

/// Proxy form consumed by the HTTP client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientProxy {
    /// Proxy for `http://` URLs.
    pub http: Option<String>,
    /// Proxy for `https://` URLs.
    pub https: Option<String>,
    /// Hosts that bypass the proxy.
    pub no_proxy: Option<String>,
}

/// Proxy form consumed by the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserProxy {
    /// `host:port` or URL of the proxy server.
    pub server: String,
    /// Hosts that bypass the proxy.
    pub bypass: Option<String>,
}

impl ProxyConfig {
    /// No proxy at all.
    #[must_use]
    pub fn direct() -> Self {
        Self {
            mode: ProxyMode::None,
            ..Self::default()
        }
    }

    fn single(mode: ProxyMode, url: &str, bypass: Option<String>) -> Self {
        Self {
            mode,
            http: Some(url.to_string()),
            https: Some(url.to_string()),
            bypass,
        }
    }

    fn from_env(env: &ProxyEnv) -> Self {
        Self {
            mode: ProxyMode::Auto,
            http: env.http_proxy.clone(),
            https: env.https_proxy.clone(),
            bypass: env.no_proxy.clone(),
        }
    }

    /// Whether requests go out without a proxy.
    #[must_use]
    pub fn is_direct(&self) -> bool {
        self.http.is_none() && self.https.is_none()
    }

    /// Form for the HTTP client, `None` when direct.
    #[must_use]
    pub fn client_proxy(&self) -> Option<ClientProxy> {
        if self.is_direct() {
            return None;
        }
        Some(ClientProxy {
            http: self.http.clone(),
            https: self.https.clone(),
            no_proxy: self.bypass.clone(),
        })
    }

    /// Form for the browser, `None` when direct.
    ///
    /// System settings prefer the `http` entry; every other mode prefers HTTPS.
    #[must_use]
    pub fn browser_proxy(&self) -> Option<BrowserProxy> {
        let server = match self.mode {
            ProxyMode::System => self.http.as_ref().or(self.https.as_ref()),
            _ => self.https.as_ref().or(self.http.as_ref()),
        }?;
        Some(BrowserProxy {
            server: server.clone(),
            bypass: self.bypass.clone(),
        })
    }
}

/// Parse a WinINET proxy string.
///
/// Accepts `http=host:port;https=host:port` and the single `host:port` form.
#[must_use]
pub fn parse_system_proxy(raw: &str) -> Option<ProxyConfig> {
    let mut config = ProxyConfig {
        mode: ProxyMode::System,
        ..ProxyConfig::default()
    };
    for part in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('=') {
            Some((proto, server)) => match proto.trim().to_ascii_lowercase().as_str() {
                "http" => config.http = Some(server.trim().to_string()),
                "https" => config.https = Some(server.trim().to_string()),
                _ => {}
            },
            None => {
                config.http = Some(part.to_string());
                config.https = Some(part.to_string());
            }
        }
    }
    (!config.is_direct()).then_some(config)
}

/// Resolves proxy modes against the environment and system settings.
pub struct ProxyResolver {
    env: ProxyEnv,
    system: Box<dyn SystemProxyLookup>,
}

impl fmt::Debug for ProxyResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyResolver").field("env", &self.env).finish_non_exhaustive()
    }
}

impl Default for ProxyResolver {
    fn default() -> Self {
        Self::from_environment()
    }
}

impl ProxyResolver {
    /// Resolver over an explicit environment snapshot and system lookup.
    #[must_use]
    pub fn new(env: ProxyEnv, system: Box<dyn SystemProxyLookup>) -> Self {
        Self { env, system }
    }

    /// Resolver over the current process environment and OS settings.
    #[must_use]
    pub fn from_environment() -> Self {
        Self::new(ProxyEnv::from_process(), Box::new(RegistryProxyLookup))
    }

    /// The environment snapshot in use.
    #[must_use]
    pub fn env(&self) -> &ProxyEnv {
        &self.env
    }

    /// Resolve `mode` into an effective configuration.
    ///
    /// `custom` is the proxy URL for [`ProxyMode::Custom`]; `bypass` the
    /// configured bypass list (environment `no_proxy` is used when absent).
    #[must_use]
    pub fn resolve(&self, mode: ProxyMode, custom: Option<&str>, bypass: Option<&str>) -> ProxyConfig {
        let mut mode = mode;

        if mode == ProxyMode::None {
            return ProxyConfig::direct();
        }

        if mode == ProxyMode::Custom {
            match custom.map(str::trim).filter(|c| !c.is_empty()) {
                Some(url) => {
                    let bypass = bypass.map(str::to_string).or_else(|| self.env.no_proxy.clone());
                    return ProxyConfig::single(ProxyMode::Custom, url, bypass);
                }
                None => {
                    warn!("custom proxy mode selected but no proxy URL configured, falling back to auto");
                    mode = ProxyMode::Auto;
                }
            }
        }

        if mode == ProxyMode::System {
            if let Some(config) = self.system_proxy() {
                info!("using system proxy {:?}", config.http.as_ref().or(config.https.as_ref()));
                return config;
            }
            info!("system proxy not available, falling back to auto");
        }

        ProxyConfig::from_env(&self.env)
    }

    /// Resolution for sites where unproxied access is known to fail.
    ///
    /// Priority: explicit override, environment, system proxy, `fallback`
    /// (the configured custom proxy). With none of them the request goes
    /// direct and a warning is logged.
    #[must_use]
    pub fn resolve_forced(
        &self,
        override_mode: Option<ProxyMode>,
        override_custom: Option<&str>,
        fallback: Option<&str>,
    ) -> ProxyConfig {
        match (override_mode, override_custom.filter(|c| !c.trim().is_empty())) {
            (Some(ProxyMode::None), _) => {
                info!("forced-proxy site: caller requested no proxy");
                return ProxyConfig::direct();
            }
            (Some(ProxyMode::Custom), Some(url)) => {
                info!("forced-proxy site: using caller proxy {url}");
                return ProxyConfig::single(ProxyMode::Custom, url.trim(), None);
            }
            _ => {}
        }

        if !self.env.is_empty() {
            debug!("forced-proxy site: using environment proxy");
            return ProxyConfig::from_env(&self.env);
        }

        if let Some(config) = self.system_proxy() {
            debug!("forced-proxy site: using system proxy");
            return config;
        }

        if let Some(url) = fallback.map(str::trim).filter(|c| !c.is_empty()) {
            debug!("forced-proxy site: using configured proxy {url}");
            return ProxyConfig::single(ProxyMode::Custom, url, None);
        }

        warn!("no proxy available for a site that usually requires one; requests may be blocked");
        ProxyConfig::direct()
    }

    fn system_proxy(&self) -> Option<ProxyConfig> {
        match self.system.lookup() {
            Ok(Some(raw)) => parse_system_proxy(&raw),
            Ok(None) => None,
            Err(e) => {
                warn!("failed to read system proxy: {e}");
                None
            }
        }
    }
}
