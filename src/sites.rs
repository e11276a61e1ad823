//! Site handler registry.
//!
//! Maps URLs to per-site rules: which retrieval strategy to run before the
//! generic path, and which policy defaults (proxy, translation) apply.
//! Rules are matched in registration order and the first match wins.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::proxy::ProxyMode;

/// Site-specific retrieval strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    /// Ask an oEmbed endpoint, render the page when the embed is link-only.
    GenericOembed,
    /// Browser with a restored login session.
    AuthenticatedBrowser,
    /// Browser posing as a mobile in-app client.
    MobileBrowser,
}

/// One entry of the registry.
#[derive(Debug, Clone)]
pub struct SiteRule {
    /// Stable identifier, also used to name saved sessions.
    pub site_id: String,
    /// URL patterns, tried in order.
    pub patterns: Vec<Regex>,
    /// Strategy run before generic retrieval.
    pub strategy: RetrievalStrategy,
    /// Go direct unless the caller asks for a proxy.
    pub default_no_proxy: bool,
    /// Skip translation unless the caller asks for it.
    pub default_no_translate: bool,
    /// Unproxied access is known to fail; use the forced-proxy chain.
    pub force_proxy: bool,
    /// Use DOM-ready plus a fixed settle delay instead of network idle.
    pub bot_sensitive: bool,
    /// Where interactive login starts.
    pub login_url: Option<String>,
}

impl SiteRule {
    /// Compile a rule. Invalid patterns are a configuration error.
    pub fn new(site_id: &str, patterns: &[&str], strategy: RetrievalStrategy) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    Error::Configuration(format!("invalid pattern for site {site_id}: {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            site_id: site_id.to_string(),
            patterns,
            strategy,
            default_no_proxy: false,
            default_no_translate: false,
            force_proxy: false,
            bot_sensitive: false,
            login_url: None,
        })
    }

    /// Direct connection and no translation by default.
    #[must_use]
    pub fn local_only(mut self) -> Self {
        self.default_no_proxy = true;
        self.default_no_translate = true;
        self
    }

    /// Mark the site as needing a proxy and a conservative wait.
    #[must_use]
    pub fn proxied_and_guarded(mut self) -> Self {
        self.force_proxy = true;
        self.bot_sensitive = true;
        self
    }

    /// Set the interactive login URL.
    #[must_use]
    pub fn with_login_url(mut self, url: &str) -> Self {
        self.login_url = Some(url.to_string());
        self
    }

    /// Whether any pattern matches `url`.
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(url))
    }
}

/// Ordered table of site rules.
#[derive(Debug, Clone, Default)]
pub struct SiteRegistry {
    rules: Vec<SiteRule>,
}

#[allow(clippy::expect_used)]
static BUILTIN: LazyLock<SiteRegistry> = LazyLock::new(|| {
    SiteRegistry::new(builtin_rules().expect("built-in site patterns compile"))
});

fn builtin_rules() -> Result<Vec<SiteRule>> {
    Ok(vec![
        SiteRule::new(
            "twitter",
            &[r"^https?://(www\.)?twitter\.com/", r"^https?://(www\.)?x\.com/"],
            RetrievalStrategy::GenericOembed,
        )?
        .proxied_and_guarded(),
        SiteRule::new(
            "wechat",
            &[
                r"^https?://mp\.weixin\.qq\.com/s/",
                r"^https?://mp\.weixin\.qq\.com/.*__biz=",
            ],
            RetrievalStrategy::MobileBrowser,
        )?
        .local_only(),
        SiteRule::new(
            "xiaohongshu",
            &[
                r"^https?://(www\.)?xiaohongshu\.com/explore/",
                r"^https?://(www\.)?xiaohongshu\.com/user/profile/",
            ],
            RetrievalStrategy::AuthenticatedBrowser,
        )?
        .local_only()
        .with_login_url("https://www.xiaohongshu.com"),
    ])
}

impl SiteRegistry {
    /// Registry over a custom rule table.
    #[must_use]
    pub fn new(rules: Vec<SiteRule>) -> Self {
        Self { rules }
    }

    /// The shared built-in registry.
    #[must_use]
    pub fn builtin() -> &'static SiteRegistry {
        &BUILTIN
    }

    /// Append a rule; it is tried after every existing one.
    pub fn push(&mut self, rule: SiteRule) {
        self.rules.push(rule);
    }

    /// Registered rules in match order.
    #[must_use]
    pub fn rules(&self) -> &[SiteRule] {
        &self.rules
    }

    /// First rule matching `url`.
    #[must_use]
    pub fn match_url(&self, url: &str) -> Option<&SiteRule> {
        self.rules.iter().find(|rule| rule.matches(url))
    }

    /// Rule by identifier.
    #[must_use]
    pub fn get(&self, site_id: &str) -> Option<&SiteRule> {
        self.rules.iter().find(|rule| rule.site_id == site_id)
    }

    /// Combine caller overrides, the matched site's defaults and the global
    /// configuration. For every flag: explicit > site default > global.
    #[must_use]
    pub fn resolve_policy(&self, url: &str, overrides: &PolicyOverrides, config: &Config) -> ResolvedPolicy {
        let rule = self.match_url(url);

        let proxy_mode = match (overrides.proxy_mode, rule) {
            (Some(mode), _) => mode,
            (None, Some(rule)) if rule.default_no_proxy => ProxyMode::None,
            (None, _) => config.network.proxy_mode,
        };

        let translate = match (overrides.no_translate, rule) {
            (Some(no_translate), _) => !no_translate,
            (None, Some(rule)) if rule.default_no_translate => false,
            (None, _) => config.translate_by_default,
        };

        ResolvedPolicy {
            site_id: rule.map(|r| r.site_id.clone()),
            proxy_mode,
            proxy_mode_explicit: overrides.proxy_mode.is_some(),
            custom_proxy: overrides
                .custom_proxy
                .clone()
                .or_else(|| config.network.custom_proxy.clone()),
            translate,
        }
    }
}

/// Caller-supplied policy flags. `None` means "not specified".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyOverrides {
    /// Proxy mode chosen by the caller.
    pub proxy_mode: Option<ProxyMode>,
    /// Proxy URL for custom mode.
    pub custom_proxy: Option<String>,
    /// Explicit translation opt-out (or opt-in with `Some(false)`).
    pub no_translate: Option<bool>,
}

/// Effective policy for one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPolicy {
    /// Matched site, if any.
    pub site_id: Option<String>,
    /// Proxy mode to resolve.
    pub proxy_mode: ProxyMode,
    /// Whether `proxy_mode` came from the caller.
    pub proxy_mode_explicit: bool,
    /// Proxy URL for custom mode.
    pub custom_proxy: Option<String>,
    /// Whether the translation collaborator should run.
    pub translate: bool,
}
