// Copyright 2026 Trendline Contributors
// SPDX-License-Identifier: Apache-2.0

//! Navigation & block controller.
//!
//! Drives the tab from a blank page to a page whose chart is rendered:
//!
//! ```text
//! INIT -> NAVIGATING -> LOADED -> BLOCKED ---(reroute, once)---> NAVIGATING
//!                                  \-> CONSENT_PENDING -> READY
//!                                  \-> READY
//! any failure after the retry budget -> ABORTED
//! ```
//!
//! Blocks and consent prompts are ordinary transitions, not errors. The
//! single reroute is shared with the extraction chain through
//! [`NavigationController::escalate_block`].

pub mod block;
pub mod consent;

use crate::config::{ScrapeConfig, Timeouts};
use crate::error::{Result, ScrapeError};
use crate::renderer::{wait_for_any, RenderContext, Selector};
use block::{BlockDetector, ErrorPageSignature, PageSnapshot};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Site root used for the reroute detour.
pub const SITE_ROOT: &str = "https://trends.google.com/";
/// Explore page the target URL is built on.
pub const EXPLORE_URL: &str = "https://trends.google.com/trends/explore";

/// Block-triggered reroutes allowed per run.
pub const REROUTE_BUDGET: u32 = 1;

/// Controller states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavState {
    Init,
    Navigating,
    Loaded,
    Blocked,
    ConsentPending,
    Ready,
    Aborted,
}

/// Build the explore URL for `config`, query-encoding every field.
pub fn target_url(base: &str, config: &ScrapeConfig) -> Result<String> {
    let url = Url::parse_with_params(
        base,
        &[
            ("date", config.timeframe.as_str()),
            ("geo", config.geography.as_str()),
            ("q", config.keyword.as_str()),
        ],
    )
    .map_err(|e| ScrapeError::Browser(anyhow::anyhow!("bad explore url {base}: {e}")))?;
    Ok(url.to_string())
}

/// Elements that only exist once the interest-over-time chart is drawn.
pub fn chart_selectors() -> Vec<Selector> {
    vec![
        Selector::css("widget[type='fe_line_chart']"),
        Selector::css(".fe-line-chart"),
        Selector::css("line-chart-directive"),
        Selector::xpath("(//button[.//i[text()='file_download']])[1]"),
    ]
}

/// Owns the run's navigation state and reroute budget.
pub struct NavigationController {
    target: String,
    site_root: String,
    timeouts: Timeouts,
    detector: Arc<dyn BlockDetector>,
    reroutes_left: u32,
    state: NavState,
    history: Vec<NavState>,
}

impl NavigationController {
    /// Controller for the real site with the default block signature.
    pub fn new(config: &ScrapeConfig, timeouts: Timeouts) -> Result<Self> {
        Self::for_site(EXPLORE_URL, SITE_ROOT, config, timeouts)
    }

    /// Controller for an arbitrary explore page / site root pair.
    pub fn for_site(
        explore_url: &str,
        site_root: &str,
        config: &ScrapeConfig,
        timeouts: Timeouts,
    ) -> Result<Self> {
        Ok(Self {
            target: target_url(explore_url, config)?,
            site_root: site_root.to_string(),
            timeouts,
            detector: Arc::new(ErrorPageSignature::default()),
            reroutes_left: REROUTE_BUDGET,
            state: NavState::Init,
            history: vec![NavState::Init],
        })
    }

    /// Replace the block predicate.
    pub fn with_detector(mut self, detector: Arc<dyn BlockDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn state(&self) -> NavState {
        self.state
    }

    /// Every state entered so far, in order.
    pub fn history(&self) -> &[NavState] {
        &self.history
    }

    pub fn reroutes_left(&self) -> u32 {
        self.reroutes_left
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    fn transition(&mut self, next: NavState) {
        debug!(from = ?self.state, to = ?next, "navigation transition");
        self.state = next;
        self.history.push(next);
    }

    fn abort(&mut self, err: ScrapeError) -> ScrapeError {
        self.transition(NavState::Aborted);
        err
    }

    /// Drive the page to `READY`, rerouting once if the target blocks us.
    pub async fn open(&mut self, page: &mut dyn RenderContext) -> Result<()> {
        loop {
            self.load(page).await?;

            if let Some(reason) = self.check_blocked(page).await? {
                self.transition(NavState::Blocked);
                self.reroute(page, reason).await?;
                continue;
            }

            self.transition(NavState::ConsentPending);
            consent::dismiss(page, &self.timeouts).await;

            // The prompt can hide a block page behind it.
            if let Some(reason) = self.check_blocked(page).await? {
                self.transition(NavState::Blocked);
                self.reroute(page, reason).await?;
                continue;
            }

            return self.await_chart(page).await;
        }
    }

    /// A strategy saw a block after `READY`: spend the reroute if one is
    /// left and bring the page back to `READY`, else abort.
    pub async fn escalate_block(
        &mut self,
        page: &mut dyn RenderContext,
        reason: String,
    ) -> Result<()> {
        self.transition(NavState::Blocked);
        self.reroute(page, reason).await?;
        self.open(page).await
    }

    /// Run the block predicate against the current page.
    pub async fn check_blocked(&self, page: &dyn RenderContext) -> Result<Option<String>> {
        let snapshot = PageSnapshot {
            title: page.title().await?,
            html: page.get_html().await?,
        };
        Ok(self.detector.detect(&snapshot))
    }

    async fn load(&mut self, page: &mut dyn RenderContext) -> Result<()> {
        self.transition(NavState::Navigating);
        info!(url = %self.target, "navigating");
        let timeout = self.timeouts.page_load;
        match page.navigate(&self.target, timeout.as_millis() as u64).await {
            Ok(nav) => {
                self.transition(NavState::Loaded);
                let title = page.title().await.unwrap_or_default();
                info!(
                    title = %title,
                    final_url = %nav.final_url,
                    load_ms = nav.load_time_ms,
                    "page loaded"
                );
                Ok(())
            }
            Err(e) => Err(self.abort(ScrapeError::NavigationTimeout(timeout, format!("{e:#}")))),
        }
    }

    /// Clear cookies, detour through the site root, and leave the caller to
    /// re-navigate. Fails once the budget is spent.
    async fn reroute(&mut self, page: &mut dyn RenderContext, reason: String) -> Result<()> {
        if self.reroutes_left == 0 {
            warn!(%reason, "blocked again with no reroute left");
            return Err(self.abort(ScrapeError::Blocked { reason }));
        }
        self.reroutes_left -= 1;
        warn!(%reason, "blocked; rerouting through site root");

        if let Err(e) = page.clear_cookies().await {
            warn!("failed to clear cookies: {e:#}");
        }
        tokio::time::sleep(self.timeouts.reroute_cooldown).await;

        let timeout_ms = self.timeouts.page_load.as_millis() as u64;
        if let Err(e) = page.navigate(&self.site_root, timeout_ms).await {
            warn!(root = %self.site_root, "root detour failed: {e:#}");
        }
        tokio::time::sleep(self.timeouts.reroute_dwell).await;
        Ok(())
    }

    async fn await_chart(&mut self, page: &dyn RenderContext) -> Result<()> {
        let selectors = chart_selectors();
        match wait_for_any(page, &selectors, self.timeouts.element, self.timeouts.poll).await {
            Some(found) => {
                debug!(signal = %found, "chart present");
                self.transition(NavState::Ready);
                Ok(())
            }
            None => Err(self.abort(ScrapeError::ChartMissing(self.timeouts.element))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::renderer::scripted::{ScriptedPage, ScriptedRenderer};
    use crate::renderer::Renderer;

    const EXPLORE: &str = "https://trends.test/explore";
    const ROOT: &str = "https://trends.test/";

    fn ready_page() -> ScriptedPage {
        ScriptedPage::new("bitcoin - Explore").with_element(chart_selectors()[1].clone())
    }

    fn controller() -> NavigationController {
        NavigationController::for_site(EXPLORE, ROOT, &ScrapeConfig::default(), Timeouts::immediate())
            .unwrap()
    }

    #[test]
    fn test_target_url_encodes_whitespace() {
        let url = target_url(EXPLORE_URL, &ScrapeConfig::default()).unwrap();
        assert_eq!(
            url,
            "https://trends.google.com/trends/explore?date=today+12-m&geo=US&q=bitcoin"
        );

        let config = ScrapeConfig {
            keyword: "buy bitcoin & eth".into(),
            ..ScrapeConfig::default()
        };
        let url = target_url(EXPLORE_URL, &config).unwrap();
        assert!(url.ends_with("q=buy+bitcoin+%26+eth"));
    }

    #[tokio::test]
    async fn test_open_reaches_ready() {
        let renderer = ScriptedRenderer::new(vec![ready_page()]);
        let mut page = renderer.new_context().await.unwrap();
        let mut nav = controller();

        nav.open(page.as_mut()).await.unwrap();
        assert_eq!(nav.state(), NavState::Ready);
        assert_eq!(
            nav.history(),
            &[
                NavState::Init,
                NavState::Navigating,
                NavState::Loaded,
                NavState::ConsentPending,
                NavState::Ready
            ]
        );
        assert_eq!(nav.reroutes_left(), 1);
    }

    #[tokio::test]
    async fn test_single_block_is_rerouted() {
        let renderer = ScriptedRenderer::new(vec![ScriptedPage::rate_limited(), ready_page()])
            .with_root(ROOT, ScriptedPage::new("Home"));
        let probe = renderer.probe();
        let mut page = renderer.new_context().await.unwrap();
        let mut nav = controller();

        nav.open(page.as_mut()).await.unwrap();
        assert_eq!(nav.state(), NavState::Ready);
        assert_eq!(nav.reroutes_left(), 0);

        let log = probe.log();
        assert_eq!(log.cookie_clears, 1);
        assert_eq!(log.navigations.len(), 3);
        assert_eq!(log.navigations[1], ROOT);
    }

    #[tokio::test]
    async fn test_second_block_aborts() {
        let renderer = ScriptedRenderer::new(vec![ScriptedPage::rate_limited()]);
        let probe = renderer.probe();
        let mut page = renderer.new_context().await.unwrap();
        let mut nav = controller();

        let err = nav.open(page.as_mut()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Blocked);
        assert_eq!(nav.state(), NavState::Aborted);
        assert_eq!(probe.log().cookie_clears, 1);
    }

    #[tokio::test]
    async fn test_escalation_shares_budget() {
        let renderer = ScriptedRenderer::new(vec![ready_page()]);
        let mut page = renderer.new_context().await.unwrap();
        let mut nav = controller();

        nav.open(page.as_mut()).await.unwrap();
        nav.escalate_block(page.as_mut(), "export answered 429".into())
            .await
            .unwrap();
        assert_eq!(nav.state(), NavState::Ready);

        let err = nav
            .escalate_block(page.as_mut(), "again".into())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Blocked);
    }

    #[tokio::test]
    async fn test_missing_chart_is_not_a_block() {
        let renderer = ScriptedRenderer::new(vec![ScriptedPage::new("bitcoin - Explore")]);
        let mut page = renderer.new_context().await.unwrap();
        let mut nav = controller();

        let err = nav.open(page.as_mut()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChartMissing);
        assert_eq!(nav.reroutes_left(), 1);
    }

    #[tokio::test]
    async fn test_load_failure_is_navigation_timeout() {
        let renderer = ScriptedRenderer::new(vec![ready_page()]).hanging();
        let mut page = renderer.new_context().await.unwrap();
        let mut nav = controller();

        let err = nav.open(page.as_mut()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NavigationTimeout);
        assert_eq!(nav.state(), NavState::Aborted);
    }
}
