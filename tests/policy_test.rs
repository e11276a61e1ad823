use rs_surf::proxy::{NoSystemProxy, ProxyEnv, SystemProxyLookup};
use rs_surf::{Config, PolicyOverrides, ProxyMode, ProxyResolver, Result, RetrievalStrategy, SiteRegistry, SiteRule};

struct FixedSystemProxy(&'static str);

impl SystemProxyLookup for FixedSystemProxy {
    fn lookup(&self) -> Result<Option<String>> {
        Ok(Some(self.0.to_string()))
    }
}

fn env_with_proxy() -> ProxyEnv {
    ProxyEnv::from_lookup(|name| match name {
        "HTTPS_PROXY" => Some("http://env-proxy:3128".to_string()),
        "no_proxy" => Some("localhost,127.0.0.1".to_string()),
        _ => None,
    })
}

#[test]
fn explicit_override_beats_site_default_and_config() {
    let mut config = Config::default();
    config.network.proxy_mode = ProxyMode::System;
    let registry = SiteRegistry::builtin();
    let overrides = PolicyOverrides {
        proxy_mode: Some(ProxyMode::Custom),
        custom_proxy: Some("http://127.0.0.1:7890".to_string()),
        no_translate: Some(false),
    };

    let policy = registry.resolve_policy("https://mp.weixin.qq.com/s/abc", &overrides, &config);

    assert_eq!(policy.site_id.as_deref(), Some("wechat"));
    assert_eq!(policy.proxy_mode, ProxyMode::Custom);
    assert!(policy.proxy_mode_explicit);
    assert!(policy.translate);
    assert_eq!(policy.custom_proxy.as_deref(), Some("http://127.0.0.1:7890"));
}

#[test]
fn site_default_beats_config() {
    let mut config = Config::default();
    config.network.proxy_mode = ProxyMode::System;

    let policy = SiteRegistry::builtin().resolve_policy(
        "https://www.xiaohongshu.com/explore/abc",
        &PolicyOverrides::default(),
        &config,
    );

    assert_eq!(policy.proxy_mode, ProxyMode::None);
    assert!(!policy.proxy_mode_explicit);
    assert!(!policy.translate);
}

#[test]
fn unmatched_url_uses_config() {
    let mut config = Config::default();
    config.network.proxy_mode = ProxyMode::System;
    config.translate_by_default = false;

    let policy = SiteRegistry::builtin().resolve_policy(
        "https://blog.example.org/post",
        &PolicyOverrides::default(),
        &config,
    );

    assert_eq!(policy.site_id, None);
    assert_eq!(policy.proxy_mode, ProxyMode::System);
    assert!(!policy.translate);
}

#[test]
fn resolved_policy_feeds_resolver() {
    let config = Config::default();
    let resolver = ProxyResolver::new(env_with_proxy(), Box::new(NoSystemProxy));
    let registry = SiteRegistry::builtin();

    let generic = registry.resolve_policy("https://example.com/a", &PolicyOverrides::default(), &config);
    let proxy = resolver.resolve(generic.proxy_mode, generic.custom_proxy.as_deref(), None);
    assert_eq!(proxy.mode, ProxyMode::Auto);
    assert_eq!(
        proxy.browser_proxy().map(|p| p.server).as_deref(),
        Some("http://env-proxy:3128")
    );
    assert_eq!(
        proxy.client_proxy().and_then(|p| p.no_proxy).as_deref(),
        Some("localhost,127.0.0.1")
    );

    let wechat = registry.resolve_policy("https://mp.weixin.qq.com/s/x", &PolicyOverrides::default(), &config);
    let proxy = resolver.resolve(wechat.proxy_mode, wechat.custom_proxy.as_deref(), None);
    assert!(proxy.is_direct());
    assert_eq!(proxy.browser_proxy(), None);
}

#[test]
fn forced_proxy_chain() {
    let direct_env = ProxyResolver::new(ProxyEnv::default(), Box::new(FixedSystemProxy("10.0.0.1:8080")));
    let forced = direct_env.resolve_forced(None, None, Some("http://fallback:1080"));
    assert_eq!(forced.mode, ProxyMode::System);
    assert_eq!(forced.http.as_deref(), Some("10.0.0.1:8080"));

    let nothing = ProxyResolver::new(ProxyEnv::default(), Box::new(NoSystemProxy));
    let forced = nothing.resolve_forced(None, None, Some("http://fallback:1080"));
    assert_eq!(forced.https.as_deref(), Some("http://fallback:1080"));

    let forced = nothing.resolve_forced(None, None, None);
    assert!(forced.is_direct());

    let forced = nothing.resolve_forced(Some(ProxyMode::None), None, Some("http://fallback:1080"));
    assert!(forced.is_direct());
}

#[test]
fn custom_rules_append_after_builtins() {
    let mut registry = SiteRegistry::builtin().clone();
    registry.push(
        SiteRule::new("medium", &[r"^https?://([a-z0-9-]+\.)?medium\.com/"], RetrievalStrategy::MobileBrowser)
            .expect("valid pattern")
            .local_only(),
    );

    let rule = registry.match_url("https://blog.medium.com/some-post").expect("match");
    assert_eq!(rule.site_id, "medium");
    assert!(rule.default_no_proxy);
    assert_eq!(registry.match_url("https://x.com/a/status/1").map(|r| r.site_id.as_str()), Some("twitter"));
}

#[test]
fn invalid_pattern_is_configuration_error() {
    let err = SiteRule::new("broken", &["(unclosed"], RetrievalStrategy::GenericOembed).expect_err("invalid");
    assert_eq!(err.kind(), rs_surf::ErrorKind::Configuration);
}

#[test]
fn config_file_overrides_only_given_fields() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("surf.json");
    std::fs::write(
        &path,
        r#"{"network": {"proxy_mode": "set", "custom_proxy": "http://127.0.0.1:7890"}, "fetch": {"static_timeout_ms": 8000}}"#,
    )
    .expect("write config");

    let config = Config::from_file(&path).expect("load");

    assert_eq!(config.network.proxy_mode, ProxyMode::Custom);
    assert_eq!(config.network.custom_proxy.as_deref(), Some("http://127.0.0.1:7890"));
    assert_eq!(config.fetch.static_timeout_ms, 8_000);
    assert_eq!(config.fetch.min_static_body_chars, 1_000);
    assert!(config.translate_by_default);
}

#[test]
fn unreadable_config_falls_back_to_defaults() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ not json").expect("write config");

    assert!(Config::from_file(&path).is_err());
    let config = Config::from_file_or_default(&path);
    assert_eq!(config.network.proxy_mode, ProxyMode::Auto);
    assert_eq!(Config::from_file_or_default(dir.path().join("missing.json")).fetch.settle_ms, 2_000);
}
