//! Page fetching.
//!
//! Two strategies:
//! - [`FetchMode::Simple`]: a single GET with a browser-like user agent
//! - [`FetchMode::Rendered`]: a throwaway headless Chromium session that
//!   serialises the DOM after client-side rendering has settled
//!
//! Neither mode retries. The rendered session owns a temporary profile
//! directory and a child process; both are released when the
//! [`BrowserSession`] guard drops, on every exit path.

use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::models::FetchedPage;
use clap::ValueEnum;
use reqwest::Client;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use tempfile::TempDir;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

/// Binaries tried, in order, when no browser is configured.
const BROWSER_CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FetchMode {
    /// Plain HTTP request.
    Simple,
    /// Headless browser with JavaScript rendering.
    Rendered,
}

impl fmt::Display for FetchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchMode::Simple => f.write_str("simple"),
            FetchMode::Rendered => f.write_str("rendered"),
        }
    }
}

/// Fetches pages in either mode.
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: Client,
    config: FetchConfig,
}

impl PageFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.simple_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Fetch `url` using `mode`.
    #[instrument(level = "info", skip(self), fields(%url, %mode))]
    pub async fn fetch(&self, url: &str, mode: FetchMode) -> Result<FetchedPage, FetchError> {
        let html = match mode {
            FetchMode::Simple => self.fetch_simple(url).await?,
            FetchMode::Rendered => self.fetch_rendered(url).await?,
        };
        info!(bytes = html.len(), "Fetched page");
        Ok(FetchedPage {
            url: url.to_string(),
            html,
        })
    }

    async fn fetch_simple(&self, url: &str) -> Result<String, FetchError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Network(format!("HTTP {status} for {url}")));
        }

        resp.text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))
    }

    async fn fetch_rendered(&self, url: &str) -> Result<String, FetchError> {
        let binary = locate_browser(self.config.browser_binary.as_deref())?;
        let session = BrowserSession::launch(&binary, url, &self.config)?;
        let budget = self.config.navigation_timeout() + self.config.settle();
        session.dump_dom(budget).await
    }
}

/// Resolve the browser binary, or report the engine as unavailable.
pub fn locate_browser(configured: Option<&str>) -> Result<PathBuf, FetchError> {
    if let Some(path) = configured {
        return which::which(path)
            .map_err(|e| FetchError::Unavailable(format!("configured browser `{path}`: {e}")));
    }
    BROWSER_CANDIDATES
        .iter()
        .find_map(|name| which::which(name).ok())
        .ok_or_else(|| {
            FetchError::Unavailable(format!(
                "no headless browser found on PATH (tried {})",
                BROWSER_CANDIDATES.join(", ")
            ))
        })
}

/// Command-line arguments for one headless Chromium run.
///
/// `--virtual-time-budget` holds the DOM dump until the page has had the
/// settle period to run its scripts.
fn browser_args(url: &str, profile: &std::path::Path, config: &FetchConfig) -> Vec<String> {
    vec![
        "--headless=new".to_string(),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--no-first-run".to_string(),
        "--hide-scrollbars".to_string(),
        "--mute-audio".to_string(),
        format!("--user-agent={}", config.user_agent),
        format!("--user-data-dir={}", profile.display()),
        format!("--timeout={}", config.navigation_timeout().as_millis()),
        format!("--virtual-time-budget={}", config.settle().as_millis()),
        "--dump-dom".to_string(),
        url.to_string(),
    ]
}

/// A running headless browser with its own throwaway profile.
///
/// Dropping the session kills the process (if still running) and deletes
/// the profile directory.
struct BrowserSession {
    child: Child,
    _profile: TempDir,
}

impl BrowserSession {
    fn launch(binary: &std::path::Path, url: &str, config: &FetchConfig) -> Result<Self, FetchError> {
        let profile = tempfile::Builder::new()
            .prefix("news-scout-profile-")
            .tempdir()
            .map_err(|e| FetchError::Render(format!("profile directory: {e}")))?;

        let args = browser_args(url, profile.path(), config);
        debug!(binary = %binary.display(), ?args, "Launching headless browser");

        let child = Command::new(binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FetchError::Render(format!("spawn {}: {e}", binary.display())))?;

        Ok(Self {
            child,
            _profile: profile,
        })
    }

    /// Wait for the serialised DOM, bounded by `budget`.
    async fn dump_dom(self, budget: std::time::Duration) -> Result<String, FetchError> {
        let Self { child, _profile } = self;
        let output = match timeout(budget, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(FetchError::Render(e.to_string())),
            Err(_) => {
                warn!(?budget, "Headless browser timed out");
                return Err(FetchError::Render(format!("timed out after {budget:?}")));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::Render(format!(
                "browser exited with {}: {}",
                output.status,
                crate::utils::truncate_for_log(stderr.trim(), 300)
            )));
        }

        let html = String::from_utf8_lossy(&output.stdout).into_owned();
        if html.trim().is_empty() {
            return Err(FetchError::Render("browser returned an empty DOM".to_string()));
        }
        Ok(html)
    }
}
