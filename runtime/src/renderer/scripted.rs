//! Scripted in-memory renderer.
//!
//! Serves canned page states instead of driving a browser, so the
//! navigation controller, strategies and pipeline can be exercised without
//! Chromium. Every interaction is recorded in a [`ScriptLog`] that stays
//! readable through a [`ScriptProbe`] after the renderer has been handed off.

use super::{NavigationResult, RenderContext, Renderer, Selector};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

/// What a click on a scripted element does.
#[derive(Debug, Clone)]
pub enum ClickEffect {
    /// Write a file into the configured download directory.
    Download { file_name: String, contents: String },
    /// Replace the current page (e.g. the site answers the click with an error page).
    Replace(Box<ScriptedPage>),
    /// Accept the click and change nothing.
    Nothing,
}

/// One canned page state.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPage {
    pub title: String,
    pub html: String,
    present: Vec<Selector>,
    tables: Vec<(Selector, Vec<Vec<String>>)>,
    clicks: Vec<(Selector, ClickEffect)>,
}

impl ScriptedPage {
    pub fn new(title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            html: format!("<html><head><title>{title}</title></head><body></body></html>"),
            title,
            ..Default::default()
        }
    }

    /// A rate-limit error page.
    pub fn rate_limited() -> Self {
        Self::new("Error 429 (Too Many Requests)!!1")
            .with_html("<html><body><p>429. That's an error.</p></body></html>")
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = html.into();
        self
    }

    /// Mark an element as present and visible.
    pub fn with_element(mut self, selector: Selector) -> Self {
        self.present.push(selector);
        self
    }

    /// Attach a table reachable through `selector`.
    pub fn with_table(mut self, selector: Selector, rows: Vec<Vec<String>>) -> Self {
        self.tables.push((selector, rows));
        self
    }

    /// Make `selector` present and give clicking it an effect.
    pub fn on_click(mut self, selector: Selector, effect: ClickEffect) -> Self {
        self.present.push(selector.clone());
        self.clicks.push((selector, effect));
        self
    }

    fn has(&self, selector: &Selector) -> bool {
        self.present.contains(selector) || self.tables.iter().any(|(s, _)| s == selector)
    }
}

/// Everything the scripted backend observed.
#[derive(Debug, Clone, Default)]
pub struct ScriptLog {
    pub navigations: Vec<String>,
    pub clicks: Vec<Selector>,
    pub cookie_clears: usize,
    pub screenshots: usize,
    pub contexts_opened: usize,
    pub contexts_closed: usize,
    pub shutdowns: usize,
}

#[derive(Debug)]
struct SiteState {
    root_url: Option<String>,
    root_page: ScriptedPage,
    target_pages: VecDeque<ScriptedPage>,
    current: ScriptedPage,
    download_dir: Option<PathBuf>,
    hang: bool,
    log: ScriptLog,
}

impl SiteState {
    /// The next target response; the last one repeats forever.
    fn next_target(&mut self) -> ScriptedPage {
        if self.target_pages.len() > 1 {
            self.target_pages.pop_front().unwrap_or_default()
        } else {
            self.target_pages.front().cloned().unwrap_or_default()
        }
    }
}

/// Shared handle onto the scripted site's state.
#[derive(Clone)]
pub struct ScriptProbe {
    state: Arc<Mutex<SiteState>>,
}

impl ScriptProbe {
    /// Snapshot of everything recorded so far.
    pub fn log(&self) -> ScriptLog {
        lock(&self.state).log.clone()
    }
}

fn lock(state: &Arc<Mutex<SiteState>>) -> MutexGuard<'_, SiteState> {
    // A panicking test thread must not hide the log from the next assertion.
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Renderer that answers navigations with scripted pages.
pub struct ScriptedRenderer {
    state: Arc<Mutex<SiteState>>,
}

impl ScriptedRenderer {
    /// Target navigations are answered with `pages` in order; the last
    /// page repeats for any further navigation.
    pub fn new(pages: Vec<ScriptedPage>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SiteState {
                root_url: None,
                root_page: ScriptedPage::new("Home"),
                target_pages: pages.into(),
                current: ScriptedPage::new(""),
                download_dir: None,
                hang: false,
                log: ScriptLog::default(),
            })),
        }
    }

    /// Answer navigations to `url` with `page` instead of a target page.
    pub fn with_root(self, url: impl Into<String>, page: ScriptedPage) -> Self {
        {
            let mut state = lock(&self.state);
            state.root_url = Some(url.into());
            state.root_page = page;
        }
        self
    }

    /// Directory that `ClickEffect::Download` writes into.
    pub fn with_download_dir(self, dir: impl Into<PathBuf>) -> Self {
        lock(&self.state).download_dir = Some(dir.into());
        self
    }

    /// Every navigation fails as if the load never completed.
    pub fn hanging(self) -> Self {
        lock(&self.state).hang = true;
        self
    }

    pub fn probe(&self) -> ScriptProbe {
        ScriptProbe {
            state: Arc::clone(&self.state),
        }
    }
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        lock(&self.state).log.contexts_opened += 1;
        Ok(Box::new(ScriptedContext {
            state: Arc::clone(&self.state),
        }))
    }

    async fn shutdown(self: Box<Self>) -> Result<()> {
        lock(&self.state).log.shutdowns += 1;
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        let state = lock(&self.state);
        state.log.contexts_opened - state.log.contexts_closed
    }
}

/// A tab on the scripted site.
pub struct ScriptedContext {
    state: Arc<Mutex<SiteState>>,
}

#[async_trait]
impl RenderContext for ScriptedContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let mut state = lock(&self.state);
        state.log.navigations.push(url.to_string());
        if state.hang {
            bail!("navigation timed out after {timeout_ms}ms");
        }
        let page = if state.root_url.as_deref() == Some(url) {
            state.root_page.clone()
        } else {
            state.next_target()
        };
        state.current = page;
        Ok(NavigationResult {
            final_url: url.to_string(),
            load_time_ms: 1,
        })
    }

    async fn get_html(&self) -> Result<String> {
        Ok(lock(&self.state).current.html.clone())
    }

    async fn title(&self) -> Result<String> {
        Ok(lock(&self.state).current.title.clone())
    }

    async fn count_visible(&self, selector: &Selector) -> Result<usize> {
        Ok(usize::from(lock(&self.state).current.has(selector)))
    }

    async fn click(&self, selector: &Selector) -> Result<bool> {
        let mut state = lock(&self.state);
        if !state.current.has(selector) {
            return Ok(false);
        }
        state.log.clicks.push(selector.clone());
        let effect = state
            .current
            .clicks
            .iter()
            .find(|(s, _)| s == selector)
            .map(|(_, e)| e.clone())
            .unwrap_or(ClickEffect::Nothing);
        match effect {
            ClickEffect::Download {
                file_name,
                contents,
            } => {
                let Some(dir) = state.download_dir.clone() else {
                    bail!("download triggered without a download directory");
                };
                std::fs::write(dir.join(file_name), contents)?;
            }
            ClickEffect::Replace(page) => state.current = *page,
            ClickEffect::Nothing => {}
        }
        Ok(true)
    }

    async fn table_rows(&self, selector: &Selector) -> Result<Vec<Vec<String>>> {
        Ok(lock(&self.state)
            .current
            .tables
            .iter()
            .find(|(s, _)| s == selector)
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    async fn clear_cookies(&self) -> Result<()> {
        lock(&self.state).log.cookie_clears += 1;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        lock(&self.state).log.screenshots += 1;
        // PNG signature only; enough for artifact plumbing.
        Ok(vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])
    }

    async fn close(self: Box<Self>) -> Result<()> {
        lock(&self.state).log.contexts_closed += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_last_target_page_repeats() {
        let renderer = ScriptedRenderer::new(vec![
            ScriptedPage::rate_limited(),
            ScriptedPage::new("Explore"),
        ]);
        let mut ctx = renderer.new_context().await.unwrap();

        ctx.navigate("https://x/a", 10).await.unwrap();
        assert!(ctx.title().await.unwrap().contains("429"));
        ctx.navigate("https://x/a", 10).await.unwrap();
        assert_eq!(ctx.title().await.unwrap(), "Explore");
        ctx.navigate("https://x/a", 10).await.unwrap();
        assert_eq!(ctx.title().await.unwrap(), "Explore");
    }

    #[tokio::test]
    async fn test_click_replace_and_log() {
        let button = Selector::css("button");
        let renderer = ScriptedRenderer::new(vec![ScriptedPage::new("A").on_click(
            button.clone(),
            ClickEffect::Replace(Box::new(ScriptedPage::new("B"))),
        )]);
        let probe = renderer.probe();
        let mut ctx = renderer.new_context().await.unwrap();
        ctx.navigate("https://x", 10).await.unwrap();

        assert!(ctx.click(&button).await.unwrap());
        assert_eq!(ctx.title().await.unwrap(), "B");
        assert!(!ctx.click(&button).await.unwrap());

        ctx.close().await.unwrap();
        let log = probe.log();
        assert_eq!(log.clicks, vec![button]);
        assert_eq!(log.contexts_closed, 1);
        assert_eq!(renderer.active_contexts(), 0);
    }
}
