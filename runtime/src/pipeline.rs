// Copyright 2026 Trendline Contributors
// SPDX-License-Identifier: Apache-2.0

//! End-to-end run: session -> navigation -> strategy chain -> normalizer ->
//! output, with diagnostics on failure.
//!
//! The session is released exactly once on every exit path. Diagnostics are
//! captured before release, while the page is still there to photograph.

use crate::config::{ScrapeConfig, SessionConfig, Timeouts};
use crate::diagnostics::{DiagnosticsArtifacts, DiagnosticsHandler};
use crate::error::{ErrorKind, Result, ScrapeError};
use crate::extraction::StrategyChain;
use crate::navigation::block::BlockDetector;
use crate::navigation::{NavigationController, EXPLORE_URL, SITE_ROOT};
use crate::normalize::{normalize_all, TimeSeriesPoint};
use crate::output::OutputAssembler;
use crate::renderer::Renderer;
use crate::session::{Session, SessionManager};
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Counters reported after a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub strategy: &'static str,
    pub raw_rows: usize,
    pub parse_failures: usize,
    pub points: usize,
    pub output: PathBuf,
}

/// Final outcome of one run.
#[derive(Debug, Clone)]
pub enum PipelineResult {
    Success {
        points: Vec<TimeSeriesPoint>,
        count: usize,
        summary: RunSummary,
    },
    Failure {
        reason: ErrorKind,
        message: String,
        diagnostics: Option<DiagnosticsArtifacts>,
    },
}

impl PipelineResult {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineResult::Success { .. })
    }

    /// Process exit status for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineResult::Success { .. } => 0,
            PipelineResult::Failure { .. } => 1,
        }
    }
}

/// One configured scrape.
pub struct Pipeline {
    config: ScrapeConfig,
    timeouts: Timeouts,
    chain: StrategyChain,
    diagnostics: DiagnosticsHandler,
    explore_url: String,
    site_root: String,
    detector: Option<Arc<dyn BlockDetector>>,
}

impl Pipeline {
    pub fn new(config: ScrapeConfig, chain: StrategyChain, diagnostics: DiagnosticsHandler) -> Self {
        Self {
            config,
            timeouts: Timeouts::default(),
            chain,
            diagnostics,
            explore_url: EXPLORE_URL.to_string(),
            site_root: SITE_ROOT.to_string(),
            detector: None,
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Point the run at a different explore page and site root.
    pub fn with_site(mut self, explore_url: impl Into<String>, site_root: impl Into<String>) -> Self {
        self.explore_url = explore_url.into();
        self.site_root = site_root.into();
        self
    }

    pub fn with_detector(mut self, detector: Arc<dyn BlockDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn config(&self) -> &ScrapeConfig {
        &self.config
    }

    /// `base` with the download directory set iff a strategy needs one.
    pub fn session_config(&self, base: SessionConfig) -> SessionConfig {
        SessionConfig {
            download_dir: self.chain.download_dir(),
            ..base
        }
    }

    /// Acquire a Chromium session through `manager` and run.
    pub async fn run(&self, manager: &SessionManager) -> PipelineResult {
        match manager.acquire().await {
            Ok(session) => self.run_session(session).await,
            Err(err) => self.fail(err, None).await,
        }
    }

    /// Run against an already-started renderer.
    pub async fn run_with_renderer(&self, renderer: Box<dyn Renderer>) -> PipelineResult {
        match Session::open(renderer).await {
            Ok(session) => self.run_session(session).await,
            Err(err) => self.fail(err, None).await,
        }
    }

    /// Drive `session` to completion and release it, whatever happens.
    pub async fn run_session(&self, mut session: Session) -> PipelineResult {
        let outcome = AssertUnwindSafe(self.drive(&mut session)).catch_unwind().await;
        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => self.fail(err, Some(&session)).await,
            Err(panic) => {
                session.release().await;
                std::panic::resume_unwind(panic);
            }
        };
        session.release().await;
        result
    }

    async fn drive(&self, session: &mut Session) -> Result<PipelineResult> {
        let page = session.page()?;

        let mut nav = NavigationController::for_site(
            &self.explore_url,
            &self.site_root,
            &self.config,
            self.timeouts.clone(),
        )?;
        if let Some(detector) = &self.detector {
            nav = nav.with_detector(Arc::clone(detector));
        }

        nav.open(page).await?;
        let extracted = self.chain.run(page, &mut nav).await?;

        let report = normalize_all(&extracted.rows);
        info!(
            raw_rows = report.raw_rows,
            parsed = report.points.len(),
            failures = report.failures,
            "rows normalized"
        );
        if report.points.is_empty() {
            return Err(ScrapeError::NoDataFound(format!(
                "none of {} raw rows could be parsed",
                report.raw_rows
            )));
        }

        let assembler = OutputAssembler::new(self.config.keyword.as_str());
        let points = assembler.assemble(report.points);
        assembler.write(&points, &self.config.output_path)?;

        let summary = RunSummary {
            strategy: extracted.strategy,
            raw_rows: report.raw_rows,
            parse_failures: report.failures,
            points: points.len(),
            output: self.config.output_path.clone(),
        };
        info!(
            strategy = summary.strategy,
            points = summary.points,
            raw_rows = summary.raw_rows,
            parse_failures = summary.parse_failures,
            "run complete"
        );
        Ok(PipelineResult::Success {
            count: points.len(),
            points,
            summary,
        })
    }

    async fn fail(&self, err: ScrapeError, session: Option<&Session>) -> PipelineResult {
        error!(kind = %err.kind(), "run failed: {err}");
        let page = session.and_then(Session::page_ref);
        let diagnostics = match page {
            Some(page) if err.wants_diagnostics() => Some(self.diagnostics.capture_now(page).await),
            _ => None,
        };
        PipelineResult::Failure {
            reason: err.kind(),
            message: err.to_string(),
            diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::table::table_selectors;
    use crate::navigation::chart_selectors;
    use crate::renderer::scripted::{ScriptedPage, ScriptedRenderer};
    use tempfile::TempDir;

    fn pipeline(dir: &TempDir, chain: StrategyChain) -> Pipeline {
        let config = ScrapeConfig {
            output_path: dir.path().join("out.json"),
            ..ScrapeConfig::default()
        };
        Pipeline::new(config, chain, DiagnosticsHandler::new(dir.path().join("diag")))
            .with_timeouts(Timeouts::immediate())
            .with_site("https://trends.test/explore", "https://trends.test/")
    }

    #[test]
    fn test_exit_codes() {
        let failure = PipelineResult::Failure {
            reason: ErrorKind::Blocked,
            message: String::new(),
            diagnostics: None,
        };
        assert_eq!(failure.exit_code(), 1);
        assert!(!failure.is_success());
    }

    #[test]
    fn test_session_config_download_dir_follows_chain() {
        let dir = TempDir::new().unwrap();
        let export = pipeline(&dir, StrategyChain::standard(PathBuf::from("dl")));
        assert_eq!(
            export.session_config(SessionConfig::default()).download_dir,
            Some(PathBuf::from("dl"))
        );

        let table_only =
            pipeline(&dir, StrategyChain::from_names(&["table"], PathBuf::from("dl")).unwrap());
        assert!(table_only
            .session_config(SessionConfig::default())
            .download_dir
            .is_none());
    }

    #[tokio::test]
    async fn test_summary_counts_parse_failures() {
        let dir = TempDir::new().unwrap();
        let rows = vec![
            vec!["Date".to_string(), "bitcoin".to_string()],
            vec!["Jan 1, 2024".to_string(), "42".to_string()],
        ];
        let page = ScriptedPage::new("Explore")
            .with_element(chart_selectors()[0].clone())
            .with_table(table_selectors()[0].clone(), rows);
        let renderer = ScriptedRenderer::new(vec![page]);
        let probe = renderer.probe();

        let chain = StrategyChain::from_names(&["table"], dir.path().join("dl")).unwrap();
        let result = pipeline(&dir, chain).run_with_renderer(Box::new(renderer)).await;

        let PipelineResult::Success { count, summary, .. } = result else {
            panic!("expected success, got {result:?}");
        };
        assert_eq!(count, 1);
        assert_eq!(summary.strategy, "table");
        assert_eq!(summary.raw_rows, 2);
        assert_eq!(summary.parse_failures, 1);
        assert_eq!(probe.log().shutdowns, 1);
    }
}
