//! Fetch a URL, extract the article and print it as JSON.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use rs_surf::{extract, Config, FetchRequest, Fetcher, PolicyOverrides, ProxyMode};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Serialize)]
struct Output<'a> {
    title: &'a str,
    fetch_strategy: String,
    strategy: String,
    image_count: usize,
    translate: bool,
    content_html: &'a str,
}

#[derive(Parser)]
#[command(
    name = "fetch_article",
    about = "Fetch a web page and print its article as JSON",
    version
)]
struct Cli {
    /// Enable debug logging
    #[arg(long, short)]
    verbose: bool,

    /// Skip the static request and render with a browser
    #[arg(long)]
    browser: bool,

    /// JSON configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Proxy mode: auto, none, system or custom
    #[arg(long, value_name = "MODE", value_parser = parse_proxy_mode)]
    proxy_mode: Option<ProxyMode>,

    /// Proxy URL; implies --proxy-mode custom unless a mode is given
    #[arg(long, value_name = "URL")]
    proxy: Option<String>,

    /// Log in to SITE interactively and save the session
    #[arg(long, value_name = "SITE")]
    login: Option<String>,

    /// Delete the saved session of SITE, or every session
    #[arg(long, value_name = "SITE", num_args = 0..=1, require_equals = true)]
    clear_auth: Option<Option<String>>,

    /// Page to fetch
    url: Option<String>,
}

impl Cli {
    fn proxy_mode(&self) -> Option<ProxyMode> {
        self.proxy_mode
            .or_else(|| self.proxy.as_ref().map(|_| ProxyMode::Custom))
    }
}

fn parse_proxy_mode(raw: &str) -> Result<ProxyMode, String> {
    raw.parse().map_err(|e| format!("{e}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    let config = args
        .config
        .as_deref()
        .map_or_else(Config::default, Config::from_file_or_default);
    let fetcher = match Fetcher::new(config) {
        Ok(fetcher) => fetcher,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(site) = &args.clear_auth {
        if let Err(e) = fetcher.auth_store().clear(site.as_deref()) {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
        if args.url.is_none() && args.login.is_none() {
            return ExitCode::SUCCESS;
        }
    }

    if let Some(site) = &args.login {
        match fetcher.login(site).await {
            Ok(true) => eprintln!("session for {site} saved"),
            Ok(false) => {
                eprintln!("login for {site} failed");
                return ExitCode::FAILURE;
            }
            Err(e) => {
                eprintln!("{e}");
                return ExitCode::FAILURE;
            }
        }
        if args.url.is_none() {
            return ExitCode::SUCCESS;
        }
    }

    let proxy_mode = args.proxy_mode();
    let Some(url) = args.url else {
        eprintln!("a URL is required (see --help)");
        return ExitCode::from(2);
    };

    let request = FetchRequest {
        force_browser: args.browser,
        overrides: PolicyOverrides {
            proxy_mode,
            custom_proxy: args.proxy,
            no_translate: None,
        },
    };
    let policy = fetcher.policy(&url, &request.overrides);

    let raw = match fetcher.fetch(&url, &request).await {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let article = extract(&raw.html);

    let output = Output {
        title: article.title_or_default(),
        fetch_strategy: raw.strategy.to_string(),
        strategy: article.strategy.to_string(),
        image_count: article.image_count,
        translate: policy.translate,
        content_html: &article.content_html,
    };
    match serde_json::to_string_pretty(&output) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
