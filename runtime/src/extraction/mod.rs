// Copyright 2026 Trendline Contributors
// SPDX-License-Identifier: Apache-2.0

//! Extraction strategy chain.
//!
//! Once the page is `READY`, strategies run strictly one after another in
//! priority order until one yields rows. Each attempt reports an
//! [`ExtractionOutcome`]; the chain decides whether to move on, escalate a
//! block to the navigation controller, or fail the run.

pub mod export;
pub mod table;

use crate::error::{Result, ScrapeError};
use crate::navigation::NavigationController;
use crate::renderer::RenderContext;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{info, warn};

pub use export::ExportStrategy;
pub use table::DomTableStrategy;

/// Strategy order used when none is configured.
pub const DEFAULT_STRATEGIES: &[&str] = &["export", "table"];

/// Untyped text pulled from the page or an exported file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub date_text: String,
    pub value_text: String,
}

impl RawRow {
    pub fn new(date_text: impl Into<String>, value_text: impl Into<String>) -> Self {
        Self {
            date_text: date_text.into(),
            value_text: value_text.into(),
        }
    }
}

/// Result of one strategy attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    /// Rows in page/file order; never empty.
    Success(Vec<RawRow>),
    /// The target answered with a block page.
    Blocked { reason: String },
    /// The strategy's element or file was not there.
    StrategyNotApplicable { reason: String },
    /// The strategy's source was there but held no rows.
    NoDataFound { reason: String },
}

impl ExtractionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ExtractionOutcome::Success(_) => "success",
            ExtractionOutcome::Blocked { .. } => "blocked",
            ExtractionOutcome::StrategyNotApplicable { .. } => "not_applicable",
            ExtractionOutcome::NoDataFound { .. } => "no_data",
        }
    }

    pub(crate) fn not_applicable(reason: impl Into<String>) -> Self {
        ExtractionOutcome::StrategyNotApplicable {
            reason: reason.into(),
        }
    }

    pub(crate) fn no_data(reason: impl Into<String>) -> Self {
        ExtractionOutcome::NoDataFound {
            reason: reason.into(),
        }
    }
}

/// One self-contained way of getting raw rows off a ready page.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Short identifier used in logs and on the command line.
    fn name(&self) -> &'static str;

    /// Download directory the browser must be configured with, if any.
    fn download_dir(&self) -> Option<&std::path::Path> {
        None
    }

    /// Make one attempt. `Err` is reserved for backend failures that are
    /// not a property of the page.
    async fn attempt(
        &self,
        page: &dyn RenderContext,
        nav: &NavigationController,
    ) -> anyhow::Result<ExtractionOutcome>;
}

/// Rows produced by the chain and how they were obtained.
#[derive(Debug, Clone)]
pub struct ChainOutput {
    pub strategy: &'static str,
    pub rows: Vec<RawRow>,
    /// `(strategy, outcome label)` for every attempt, in order.
    pub attempts: Vec<(&'static str, &'static str)>,
}

/// Ordered, configurable list of strategies.
pub struct StrategyChain {
    strategies: Vec<Box<dyn Strategy>>,
}

impl StrategyChain {
    pub fn new(strategies: Vec<Box<dyn Strategy>>) -> Self {
        Self { strategies }
    }

    /// Export first, then the accessibility table.
    pub fn standard(download_dir: PathBuf) -> Self {
        Self::new(vec![
            Box::new(ExportStrategy::new(download_dir)),
            Box::new(DomTableStrategy::default()),
        ])
    }

    /// Build from strategy names (`export`, `table`) in the given order.
    pub fn from_names<S: AsRef<str>>(names: &[S], download_dir: PathBuf) -> anyhow::Result<Self> {
        let mut strategies: Vec<Box<dyn Strategy>> = Vec::new();
        for name in names {
            match name.as_ref().trim() {
                "export" => strategies.push(Box::new(ExportStrategy::new(download_dir.clone()))),
                "table" => strategies.push(Box::new(DomTableStrategy::default())),
                other => anyhow::bail!("unknown strategy {other:?} (expected export or table)"),
            }
        }
        if strategies.is_empty() {
            anyhow::bail!("at least one strategy is required");
        }
        Ok(Self::new(strategies))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// The download directory of the first strategy that needs one.
    pub fn download_dir(&self) -> Option<PathBuf> {
        self.strategies
            .iter()
            .find_map(|s| s.download_dir().map(|d| d.to_path_buf()))
    }

    /// Single pass over the strategies.
    ///
    /// Moves on after `StrategyNotApplicable`. A `Blocked` outcome spends
    /// the controller's reroute and the chain resumes with the next
    /// strategy; a block with no reroute left aborts. `NoDataFound` ends the
    /// pass. No strategy runs twice.
    pub async fn run(
        &self,
        page: &mut dyn RenderContext,
        nav: &mut NavigationController,
    ) -> Result<ChainOutput> {
        let mut attempts = Vec::new();
        let mut skipped = Vec::new();

        for strategy in &self.strategies {
            let name = strategy.name();
            let outcome = strategy.attempt(page, nav).await.map_err(ScrapeError::Browser)?;
            info!(strategy = name, outcome = outcome.label(), "strategy attempted");
            attempts.push((name, outcome.label()));

            match outcome {
                ExtractionOutcome::Success(rows) if !rows.is_empty() => {
                    info!(strategy = name, rows = rows.len(), "raw rows extracted");
                    return Ok(ChainOutput {
                        strategy: name,
                        rows,
                        attempts,
                    });
                }
                ExtractionOutcome::Success(_) => {
                    return Err(ScrapeError::NoDataFound(format!("{name}: empty result")));
                }
                ExtractionOutcome::StrategyNotApplicable { reason } => {
                    skipped.push(format!("{name}: {reason}"));
                }
                ExtractionOutcome::NoDataFound { reason } => {
                    return Err(ScrapeError::NoDataFound(format!("{name}: {reason}")));
                }
                ExtractionOutcome::Blocked { reason } => {
                    warn!(strategy = name, %reason, "strategy hit a block");
                    nav.escalate_block(page, format!("{name}: {reason}")).await?;
                    skipped.push(format!("{name}: blocked, rerouted"));
                }
            }
        }

        Err(ScrapeError::StrategyExhausted(skipped.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ScrapeConfig, Timeouts};
    use crate::error::ErrorKind;
    use crate::navigation::chart_selectors;
    use crate::renderer::scripted::{ScriptedPage, ScriptedRenderer};
    use crate::renderer::Renderer;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Strategy returning a fixed outcome and counting its calls.
    struct Fixed {
        name: &'static str,
        outcome: ExtractionOutcome,
        calls: Arc<AtomicUsize>,
    }

    impl Fixed {
        fn boxed(
            name: &'static str,
            outcome: ExtractionOutcome,
        ) -> (Box<dyn Strategy>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let s: Box<dyn Strategy> = Box::new(Fixed {
                name,
                outcome,
                calls: Arc::clone(&calls),
            });
            (s, calls)
        }
    }

    #[async_trait]
    impl Strategy for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn attempt(
            &self,
            _page: &dyn RenderContext,
            _nav: &NavigationController,
        ) -> anyhow::Result<ExtractionOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.outcome.clone())
        }
    }

    async fn ready() -> (Box<dyn RenderContext>, NavigationController) {
        let renderer = ScriptedRenderer::new(vec![
            ScriptedPage::new("Explore").with_element(chart_selectors()[0].clone())
        ]);
        let mut page = renderer.new_context().await.unwrap();
        let mut nav = NavigationController::for_site(
            "https://trends.test/explore",
            "https://trends.test/",
            &ScrapeConfig::default(),
            Timeouts::immediate(),
        )
        .unwrap();
        nav.open(page.as_mut()).await.unwrap();
        (page, nav)
    }

    fn rows() -> Vec<RawRow> {
        vec![RawRow::new("Jan 1, 2024", "42")]
    }

    #[tokio::test]
    async fn test_not_applicable_falls_through() {
        let (a, a_calls) = Fixed::boxed("a", ExtractionOutcome::not_applicable("no button"));
        let (b, b_calls) = Fixed::boxed("b", ExtractionOutcome::Success(rows()));
        let chain = StrategyChain::new(vec![a, b]);
        let (mut page, mut nav) = ready().await;

        let out = chain.run(page.as_mut(), &mut nav).await.unwrap();
        assert_eq!(out.strategy, "b");
        assert_eq!(out.rows, rows());
        assert_eq!(out.attempts, vec![("a", "not_applicable"), ("b", "success")]);
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_all_not_applicable_is_exhaustion() {
        let (a, _) = Fixed::boxed("a", ExtractionOutcome::not_applicable("x"));
        let (b, _) = Fixed::boxed("b", ExtractionOutcome::not_applicable("y"));
        let chain = StrategyChain::new(vec![a, b]);
        let (mut page, mut nav) = ready().await;

        let err = chain.run(page.as_mut(), &mut nav).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StrategyExhausted);
        assert!(err.to_string().contains("a: x; b: y"));
    }

    #[tokio::test]
    async fn test_no_data_stops_the_pass() {
        let (a, _) = Fixed::boxed("a", ExtractionOutcome::no_data("empty csv"));
        let (b, b_calls) = Fixed::boxed("b", ExtractionOutcome::Success(rows()));
        let chain = StrategyChain::new(vec![a, b]);
        let (mut page, mut nav) = ready().await;

        let err = chain.run(page.as_mut(), &mut nav).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoDataFound);
        assert_eq!(b_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_block_reroutes_then_continues() {
        let blocked = ExtractionOutcome::Blocked {
            reason: "429".into(),
        };
        let (a, a_calls) = Fixed::boxed("a", blocked);
        let (b, _) = Fixed::boxed("b", ExtractionOutcome::Success(rows()));
        let chain = StrategyChain::new(vec![a, b]);
        let (mut page, mut nav) = ready().await;

        let out = chain.run(page.as_mut(), &mut nav).await.unwrap();
        assert_eq!(out.strategy, "b");
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(nav.reroutes_left(), 0);
    }

    #[tokio::test]
    async fn test_second_block_is_fatal() {
        let blocked = ExtractionOutcome::Blocked {
            reason: "429".into(),
        };
        let (a, _) = Fixed::boxed("a", blocked.clone());
        let (b, _) = Fixed::boxed("b", blocked);
        let (c, c_calls) = Fixed::boxed("c", ExtractionOutcome::Success(rows()));
        let chain = StrategyChain::new(vec![a, b, c]);
        let (mut page, mut nav) = ready().await;

        let err = chain.run(page.as_mut(), &mut nav).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Blocked);
        assert_eq!(c_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_from_names() {
        let chain = StrategyChain::from_names(&["table", "export"], PathBuf::from("dl")).unwrap();
        assert_eq!(chain.names(), vec!["table", "export"]);
        assert_eq!(chain.download_dir(), Some(PathBuf::from("dl")));

        let chain = StrategyChain::from_names(&["table"], PathBuf::from("dl")).unwrap();
        assert_eq!(chain.download_dir(), None);

        assert!(StrategyChain::from_names(&["pdf"], PathBuf::from("dl")).is_err());
        assert!(StrategyChain::from_names::<&str>(&[], PathBuf::from("dl")).is_err());
    }
}
