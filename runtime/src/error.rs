//! Error taxonomy for a scrape run.

use std::time::Duration;

/// Fatal run-level errors. Per-row parse failures are not here; they are
/// counted by the normalizer and only surface as [`ScrapeError::NoDataFound`].
#[derive(thiserror::Error, Debug)]
pub enum ScrapeError {
    #[error("browser backend unavailable: {0}")]
    Environment(String),

    #[error("blocked by target ({reason})")]
    Blocked { reason: String },

    #[error("page load timed out after {0:?}: {1}")]
    NavigationTimeout(Duration, String),

    #[error("chart container not present after {0:?}")]
    ChartMissing(Duration),

    #[error("all extraction strategies exhausted: {0}")]
    StrategyExhausted(String),

    #[error("no usable data points: {0}")]
    NoDataFound(String),

    #[error("failed to write output {path}: {source}")]
    Output {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("browser operation failed: {0:#}")]
    Browser(#[from] anyhow::Error),
}

/// Flat classification of [`ScrapeError`], carried by a failed pipeline result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Environment,
    Blocked,
    NavigationTimeout,
    ChartMissing,
    StrategyExhausted,
    NoDataFound,
    Output,
    Browser,
}

impl ScrapeError {
    /// The taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScrapeError::Environment(_) => ErrorKind::Environment,
            ScrapeError::Blocked { .. } => ErrorKind::Blocked,
            ScrapeError::NavigationTimeout(..) => ErrorKind::NavigationTimeout,
            ScrapeError::ChartMissing(_) => ErrorKind::ChartMissing,
            ScrapeError::StrategyExhausted(_) => ErrorKind::StrategyExhausted,
            ScrapeError::NoDataFound(_) => ErrorKind::NoDataFound,
            ScrapeError::Output { .. } => ErrorKind::Output,
            ScrapeError::Browser(_) => ErrorKind::Browser,
        }
    }

    /// Whether the diagnostics handler can do anything useful for this error.
    /// Environment errors happen before a page exists.
    pub fn wants_diagnostics(&self) -> bool {
        !matches!(self, ScrapeError::Environment(_))
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Environment => "environment",
            ErrorKind::Blocked => "blocked",
            ErrorKind::NavigationTimeout => "navigation_timeout",
            ErrorKind::ChartMissing => "chart_missing",
            ErrorKind::StrategyExhausted => "strategy_exhausted",
            ErrorKind::NoDataFound => "no_data_found",
            ErrorKind::Output => "output",
            ErrorKind::Browser => "browser",
        };
        f.write_str(s)
    }
}

/// Convenience alias used across the pipeline.
pub type Result<T> = std::result::Result<T, ScrapeError>;
