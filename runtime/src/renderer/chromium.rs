//! Chromium-based renderer using chromiumoxide.

use super::{NavigationResult, RenderContext, Renderer, Selector};
use crate::config::SessionConfig;
use crate::stealth;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::network::ClearBrowserCookiesParams;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Provisioned install location under the user's home directory.
const PROVISIONED_DIR: &str = ".trendline/chromium";

/// Executables a provisioned install may contain, most specific first.
fn provisioned_candidates(root: &Path) -> Vec<PathBuf> {
    let mut layouts: Vec<&str> = Vec::new();
    if cfg!(target_os = "macos") {
        layouts.push("chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing");
        layouts.push("chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing");
    } else {
        layouts.push("chrome-linux64/chrome");
    }
    layouts.push("chrome");
    layouts.into_iter().map(|rel| root.join(rel)).collect()
}

/// Locate a Chromium binary.
///
/// Lookup order: `TRENDLINE_CHROMIUM_PATH`, the provisioned install in
/// `~/.trendline/chromium`, browsers on `PATH`, then the stock macOS app.
pub fn find_chromium() -> Option<PathBuf> {
    let from_env = std::env::var_os("TRENDLINE_CHROMIUM_PATH").map(PathBuf::from);
    let provisioned = dirs::home_dir()
        .map(|home| provisioned_candidates(&home.join(PROVISIONED_DIR)))
        .unwrap_or_default();
    let mac_app = cfg!(target_os = "macos")
        .then(|| PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"));

    let on_disk = from_env
        .into_iter()
        .chain(provisioned)
        .find(|candidate| candidate.is_file());
    on_disk
        .or_else(|| {
            ["google-chrome", "chromium", "chromium-browser"]
                .into_iter()
                .find_map(|name| which::which(name).ok())
        })
        .or_else(|| mac_app.filter(|app| app.is_file()))
}

/// Chromium-based renderer owning one browser process.
pub struct ChromiumRenderer {
    browser: Browser,
    handler: tokio::task::JoinHandle<()>,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Launch headless Chromium.
    ///
    /// With an explicit executable only that binary is tried. Otherwise the
    /// backend's own default detection goes first and the provisioned lookup
    /// from [`find_chromium`] is the second attempt.
    pub async fn launch(session: &SessionConfig) -> Result<Self> {
        if let Some(exe) = &session.executable {
            return Self::launch_with(session, Some(exe.clone())).await;
        }

        let first = match Self::launch_with(session, None).await {
            Ok(renderer) => return Ok(renderer),
            Err(e) => e,
        };
        warn!("default browser launch failed: {first:#}; trying provisioned binary");

        let provisioned = find_chromium().with_context(|| {
            format!("default launch failed ({first:#}) and no provisioned Chromium was found")
        })?;
        Self::launch_with(session, Some(provisioned))
            .await
            .with_context(|| format!("default launch also failed: {first:#}"))
    }

    async fn launch_with(session: &SessionConfig, executable: Option<PathBuf>) -> Result<Self> {
        let (width, height) = session.window;
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(width, height)
            .viewport(Viewport {
                width,
                height,
                ..Default::default()
            })
            .args(stealth::launch_args(&session.user_agent));

        builder = if session.headless {
            builder.new_headless_mode()
        } else {
            builder.with_head()
        };
        if let Some(exe) = &executable {
            builder = builder.chrome_executable(exe);
        }

        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut events) = Browser::launch(config)
            .await
            .context("browser process did not start")?;

        // CDP traffic only flows while the event stream is drained.
        let handler = tokio::spawn(async move { while events.next().await.is_some() {} });

        if let Some(dir) = &session.download_dir {
            let absolute = std::path::absolute(dir)
                .with_context(|| format!("bad download dir: {}", dir.display()))?;
            let mut params = SetDownloadBehaviorParams::new(SetDownloadBehaviorBehavior::Allow);
            params.download_path = Some(absolute.display().to_string());
            browser
                .execute(params)
                .await
                .context("failed to configure download directory")?;
        }

        info!(
            executable = %executable.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "default".into()),
            headless = session.headless,
            "Chromium launched"
        );

        Ok(Self {
            browser,
            handler,
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("could not open a browser tab")?;

        // Masking must be in place before the first real navigation.
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(
            stealth::init_script(),
        ))
        .await
        .context("failed to inject init script")?;

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumContext {
            page,
            active_count: Arc::clone(&self.active_count),
        }))
    }

    async fn shutdown(mut self: Box<Self>) -> Result<()> {
        let _ = self.browser.close().await;
        let _ = self.browser.wait().await;
        self.handler.abort();
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// A single Chromium page context.
pub struct ChromiumContext {
    page: Page,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumContext {
    /// Evaluate `script` in the page and decode its JSON result.
    async fn eval_json<T: serde::de::DeserializeOwned>(&self, script: String) -> Result<T> {
        let evaluation = self
            .page
            .evaluate(script)
            .await
            .context("page script raised")?;
        evaluation
            .into_value()
            .map_err(|e| anyhow::anyhow!("unexpected page script result: {e:?}"))
    }
}

/// JS prelude binding `nodes` to every element matched by `selector`.
fn nodes_js(selector: &Selector) -> String {
    // serde_json string encoding doubles as JS string-literal escaping.
    match selector {
        Selector::Css(css) => {
            let lit = serde_json::to_string(css).unwrap_or_else(|_| "\"\"".into());
            format!("const nodes = Array.from(document.querySelectorAll({lit}));")
        }
        Selector::XPath(xp) => {
            let lit = serde_json::to_string(xp).unwrap_or_else(|_| "\"\"".into());
            format!(
                "const snap = document.evaluate({lit}, document, null, \
                 XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null); \
                 const nodes = []; \
                 for (let i = 0; i < snap.snapshotLength; i++) nodes.push(snap.snapshotItem(i));"
            )
        }
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let started = Instant::now();
        let budget = Duration::from_millis(timeout_ms);

        match tokio::time::timeout(budget, self.page.goto(url)).await {
            Err(_) => bail!("{url} did not load within {timeout_ms}ms"),
            Ok(Err(e)) => bail!("loading {url} failed: {e}"),
            Ok(Ok(_)) => {}
        }
        // Redirects may still be settling after goto resolves.
        let _ = self.page.wait_for_navigation().await;

        let final_url = match self.page.url().await {
            Ok(Some(current)) => current,
            _ => url.to_string(),
        };
        Ok(NavigationResult {
            final_url,
            load_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn get_html(&self) -> Result<String> {
        self.eval_json("document.documentElement.outerHTML".to_string())
            .await
            .context("failed to get HTML")
    }

    async fn title(&self) -> Result<String> {
        Ok(self
            .page
            .get_title()
            .await
            .context("failed to get title")?
            .unwrap_or_default())
    }

    async fn count_visible(&self, selector: &Selector) -> Result<usize> {
        let script = format!(
            "(() => {{ {} return nodes.filter(n => n.getClientRects().length > 0 && !n.disabled).length; }})()",
            nodes_js(selector)
        );
        self.eval_json(script).await
    }

    async fn click(&self, selector: &Selector) -> Result<bool> {
        let script = format!(
            "(() => {{ {} if (!nodes.length) return false; nodes[0].click(); return true; }})()",
            nodes_js(selector)
        );
        self.eval_json(script).await
    }

    async fn table_rows(&self, selector: &Selector) -> Result<Vec<Vec<String>>> {
        let script = format!(
            "(() => {{ {} const t = nodes[0]; if (!t) return []; \
             return Array.from(t.querySelectorAll('tr')).map(r => \
               Array.from(r.querySelectorAll('th,td')).map(c => c.textContent || '')); }})()",
            nodes_js(selector)
        );
        self.eval_json(script).await
    }

    async fn clear_cookies(&self) -> Result<()> {
        self.page
            .execute(ClearBrowserCookiesParams::default())
            .await
            .context("failed to clear cookies")?;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
            .context("failed to capture screenshot")
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        let _ = self.page.close().await;
        Ok(())
    }
}
