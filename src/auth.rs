//! Saved browser sessions.
//!
//! One JSON file per site under the session directory
//! (`<dir>/<site_id>_state.json`). Reads never fail: a missing, unreadable
//! or corrupt file means "no session". Concurrent writers are not
//! coordinated; the last write wins.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::proxy::BrowserProxy;
use crate::renderer::{BrowserProfile, LaunchOptions, Renderer, StorageState, WaitStrategy};

const SESSION_SUFFIX: &str = "_state.json";

/// Persisted login state of one site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    /// Site the session belongs to.
    pub site_id: String,
    /// Cookies and local storage captured after login.
    pub storage_state: StorageState,
    /// When the session was captured.
    pub saved_at: DateTime<Utc>,
}

impl AuthSession {
    /// Session captured now.
    #[must_use]
    pub fn new(site_id: &str, storage_state: StorageState) -> Self {
        Self {
            site_id: site_id.to_string(),
            storage_state,
            saved_at: Utc::now(),
        }
    }
}

/// Asks the human to finish logging in.
#[async_trait]
pub trait LoginPrompt: Send + Sync {
    /// Block until the user reports the login as done. `false` means declined.
    async fn confirm(&self, site_id: &str, login_url: &str) -> bool;
}

/// Prompt on the terminal; Enter confirms, end of input declines.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsolePrompt;

#[async_trait]
impl LoginPrompt for ConsolePrompt {
    async fn confirm(&self, site_id: &str, login_url: &str) -> bool {
        eprintln!();
        eprintln!("Log in to {site_id} in the browser window ({login_url}).");
        eprintln!("Press Enter here once you are logged in...");

        let read = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)
        })
        .await;

        match read {
            Ok(Ok(n)) => n > 0,
            Ok(Err(e)) => {
                warn!("failed to read login confirmation: {e}");
                false
            }
            Err(e) => {
                warn!("login prompt task failed: {e}");
                false
            }
        }
    }
}

/// File-backed session store.
#[derive(Debug, Clone)]
pub struct AuthStore {
    dir: PathBuf,
}

fn is_session_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(SESSION_SUFFIX) && name.len() > SESSION_SUFFIX.len())
}

fn remove_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Replace every character outside `[A-Za-z0-9_-]` with `_`.
#[must_use]
pub fn sanitize_site_id(site_id: &str) -> String {
    let cleaned: String = site_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

impl AuthStore {
    /// Store rooted at `dir`. The directory is created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store at the configured (or default) session directory.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(config.auth_dir()?))
    }

    /// Session directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the session of `site_id`.
    #[must_use]
    pub fn path_for(&self, site_id: &str) -> PathBuf {
        self.dir.join(format!("{}{SESSION_SUFFIX}", sanitize_site_id(site_id)))
    }

    /// Saved session of `site_id`, if any.
    #[must_use]
    pub fn load(&self, site_id: &str) -> Option<AuthSession> {
        let path = self.path_for(site_id);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("cannot read session {}: {e}", path.display());
                return None;
            }
        };
        match serde_json::from_str::<AuthSession>(&raw) {
            Ok(session) => {
                debug!("loaded session for {site_id} saved at {}", session.saved_at);
                Some(session)
            }
            Err(e) => {
                warn!("ignoring corrupt session {}: {e}", path.display());
                None
            }
        }
    }

    /// Whether a usable session exists for `site_id`.
    #[must_use]
    pub fn has_session(&self, site_id: &str) -> bool {
        self.load(site_id).is_some()
    }

    /// Persist `session`, replacing any previous one.
    pub fn save(&self, session: &AuthSession) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&session.site_id);
        let json = serde_json::to_string_pretty(session)?;
        std::fs::write(&path, json)?;
        info!("saved session for {} to {}", session.site_id, path.display());
        Ok(())
    }

    /// Remove the session of one site, or every session with `None`.
    ///
    /// Only `*_state.json` session files are deleted; anything else in the
    /// directory is left alone.
    pub fn clear(&self, site_id: Option<&str>) -> Result<()> {
        if let Some(id) = site_id {
            remove_if_present(&self.path_for(id))?;
            info!("cleared session for {id}");
            return Ok(());
        }

        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let mut removed = 0usize;
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && is_session_file(&path) {
                remove_if_present(&path)?;
                removed += 1;
            }
        }
        info!("cleared {removed} session(s) in {}", self.dir.display());
        Ok(())
    }

    /// Open a visible browser at `login_url`, wait for the user, save the session.
    ///
    /// Returns `false` on launch or navigation failure, a declined prompt, or
    /// a failed capture. The browser is closed on every path.
    pub async fn interactive_login(
        &self,
        site_id: &str,
        login_url: &str,
        renderer: &dyn Renderer,
        proxy: Option<BrowserProxy>,
        prompt: &dyn LoginPrompt,
        navigation_timeout: Duration,
    ) -> bool {
        info!("starting interactive login for {site_id}");
        let options = LaunchOptions {
            headless: false,
            proxy,
            profile: BrowserProfile::login(),
            storage_state: None,
        };
        let mut ctx = match renderer.launch(options).await {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!("cannot open login browser for {site_id}: {e}");
                return false;
            }
        };

        let mut saved = false;
        match ctx.navigate(login_url, WaitStrategy::DomContentLoaded, navigation_timeout).await {
            Err(e) => warn!("cannot open login page {login_url}: {e}"),
            Ok(()) => {
                if prompt.confirm(site_id, login_url).await {
                    match ctx.storage_state().await {
                        Ok(state) => match self.save(&AuthSession::new(site_id, state)) {
                            Ok(()) => saved = true,
                            Err(e) => warn!("cannot save session for {site_id}: {e}"),
                        },
                        Err(e) => warn!("cannot capture session for {site_id}: {e}"),
                    }
                } else {
                    info!("login for {site_id} was not confirmed");
                }
            }
        }

        if let Err(e) = ctx.close().await {
            debug!("login browser close failed: {e}");
        }
        saved
    }
}
