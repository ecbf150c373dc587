//! Run configuration.
//!
//! Every tunable resolves in the same order: explicit value (CLI flag) >
//! `TRENDLINE_*` environment variable > built-in default. The resolved
//! values are immutable for the rest of the run.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default search term.
pub const DEFAULT_KEYWORD: &str = "bitcoin";
/// Default geography code.
pub const DEFAULT_GEO: &str = "US";
/// Default timeframe, in the target site's relative-window grammar.
pub const DEFAULT_TIMEFRAME: &str = "today 12-m";
/// Default artifact path, consumed by the dashboard as a static asset.
pub const DEFAULT_OUTPUT: &str = "public/btc_google_trends.json";
/// Default scratch directory for exported files.
pub const DEFAULT_DOWNLOAD_DIR: &str = "temp_downloads";

/// Desktop Chrome user agent presented to the target.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                                      AppleWebKit/537.36 (KHTML, like Gecko) \
                                      Chrome/131.0.0.0 Safari/537.36";

/// What to scrape and where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeConfig {
    /// Search term; also the value field name in the output file.
    pub keyword: String,
    /// Geography code (e.g. "US").
    pub geography: String,
    /// Timeframe expression (e.g. "today 12-m").
    pub timeframe: String,
    /// Where the JSON artifact is written.
    pub output_path: PathBuf,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            keyword: DEFAULT_KEYWORD.to_string(),
            geography: DEFAULT_GEO.to_string(),
            timeframe: DEFAULT_TIMEFRAME.to_string(),
            output_path: PathBuf::from(DEFAULT_OUTPUT),
        }
    }
}

impl ScrapeConfig {
    /// Resolve each field from explicit values, then the environment, then defaults.
    pub fn resolve(
        keyword: Option<&str>,
        geography: Option<&str>,
        timeframe: Option<&str>,
        output_path: Option<&Path>,
    ) -> Self {
        Self {
            keyword: resolve_string(keyword, "TRENDLINE_KEYWORD", DEFAULT_KEYWORD),
            geography: resolve_string(geography, "TRENDLINE_GEO", DEFAULT_GEO),
            timeframe: resolve_string(timeframe, "TRENDLINE_TIMEFRAME", DEFAULT_TIMEFRAME),
            output_path: resolve_path(output_path, "TRENDLINE_OUTPUT", DEFAULT_OUTPUT),
        }
    }
}

/// Browser session options.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Run without a visible window.
    pub headless: bool,
    /// Fixed viewport size.
    pub window: (u32, u32),
    /// User agent override.
    pub user_agent: String,
    /// Download directory; only set when a file-download strategy is enabled.
    pub download_dir: Option<PathBuf>,
    /// Explicit browser executable, bypassing discovery.
    pub executable: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window: (1920, 1080),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            download_dir: None,
            executable: None,
        }
    }
}

impl SessionConfig {
    /// Builder-style setter for the download directory.
    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = Some(dir.into());
        self
    }

    /// Resolve the executable override from an explicit path or `TRENDLINE_CHROMIUM_PATH`.
    pub fn with_executable_from_env(mut self, explicit: Option<&Path>) -> Self {
        self.executable = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("TRENDLINE_CHROMIUM_PATH").map(PathBuf::from));
        self
    }
}

/// Bounded waits and pauses used across the run.
#[derive(Debug, Clone)]
pub struct Timeouts {
    /// Upper bound for a page load.
    pub page_load: Duration,
    /// Upper bound for element presence (chart container, export control).
    pub element: Duration,
    /// Upper bound for the consent prompt to show up.
    pub consent: Duration,
    /// Pause after dismissing the consent prompt.
    pub consent_fade: Duration,
    /// Pause after clearing cookies, before visiting the site root.
    pub reroute_cooldown: Duration,
    /// Pause on the site root before returning to the target.
    pub reroute_dwell: Duration,
    /// Fixed wait for an exported file to land.
    pub download_settle: Duration,
    /// Poll interval for every bounded wait.
    pub poll: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            page_load: Duration::from_secs(15),
            element: Duration::from_secs(15),
            consent: Duration::from_secs(5),
            consent_fade: Duration::from_secs(2),
            reroute_cooldown: Duration::from_secs(3),
            reroute_dwell: Duration::from_secs(2),
            download_settle: Duration::from_secs(10),
            poll: Duration::from_millis(250),
        }
    }
}

impl Timeouts {
    /// Every wait collapsed to a few milliseconds; for in-memory backends.
    pub fn immediate() -> Self {
        let tick = Duration::from_millis(1);
        Self {
            page_load: Duration::from_millis(50),
            element: Duration::from_millis(20),
            consent: Duration::from_millis(5),
            consent_fade: tick,
            reroute_cooldown: tick,
            reroute_dwell: tick,
            download_settle: tick,
            poll: tick,
        }
    }

    /// Apply `TRENDLINE_DOWNLOAD_SETTLE_SECS` / `TRENDLINE_PAGE_TIMEOUT_SECS` overrides.
    pub fn from_env() -> Self {
        let mut timeouts = Self::default();
        if let Some(secs) = env_u64("TRENDLINE_PAGE_TIMEOUT_SECS") {
            timeouts.page_load = Duration::from_secs(secs);
            timeouts.element = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("TRENDLINE_DOWNLOAD_SETTLE_SECS") {
            timeouts.download_settle = Duration::from_secs(secs);
        }
        timeouts
    }
}

/// Resolve the download directory (`TRENDLINE_DOWNLOAD_DIR`).
pub fn resolve_download_dir(explicit: Option<&Path>) -> PathBuf {
    resolve_path(explicit, "TRENDLINE_DOWNLOAD_DIR", DEFAULT_DOWNLOAD_DIR)
}

/// Resolve the diagnostics directory (`TRENDLINE_DIAGNOSTICS_DIR`), defaulting to the cwd.
pub fn resolve_diagnostics_dir(explicit: Option<&Path>) -> PathBuf {
    resolve_path(explicit, "TRENDLINE_DIAGNOSTICS_DIR", ".")
}

fn resolve_string(explicit: Option<&str>, var: &str, default: &str) -> String {
    if let Some(v) = explicit {
        return v.to_string();
    }
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => default.to_string(),
    }
}

fn resolve_path(explicit: Option<&Path>, var: &str, default: &str) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    match std::env::var_os(var) {
        Some(v) if !v.is_empty() => PathBuf::from(v),
        _ => PathBuf::from(default),
    }
}

fn env_u64(var: &str) -> Option<u64> {
    std::env::var(var).ok()?.trim().parse().ok()
}
