//! Forensic capture on failure.
//!
//! Writes `debug_screenshot_<unix>.png` and `debug_page_<unix>.html` for the
//! page as it stood when the run gave up. Capture problems are logged and
//! never replace the error that triggered the capture.

use crate::renderer::RenderContext;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Files written by a capture. Either may be missing if its capture failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticsArtifacts {
    pub screenshot: Option<PathBuf>,
    pub markup: Option<PathBuf>,
}

impl DiagnosticsArtifacts {
    pub fn is_empty(&self) -> bool {
        self.screenshot.is_none() && self.markup.is_none()
    }
}

/// Captures failure artifacts into one directory.
#[derive(Debug, Clone)]
pub struct DiagnosticsHandler {
    dir: PathBuf,
}

impl DiagnosticsHandler {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Snapshot `page`, stamping both files with `timestamp` (unix seconds).
    pub async fn capture(&self, page: &dyn RenderContext, timestamp: i64) -> DiagnosticsArtifacts {
        let mut artifacts = DiagnosticsArtifacts::default();

        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            error!(dir = %self.dir.display(), "cannot create diagnostics directory: {e}");
            return artifacts;
        }

        let shot = self.dir.join(format!("debug_screenshot_{timestamp}.png"));
        match page.screenshot().await {
            Ok(png) => match tokio::fs::write(&shot, png).await {
                Ok(()) => artifacts.screenshot = Some(shot),
                Err(e) => warn!(path = %shot.display(), "failed to save screenshot: {e}"),
            },
            Err(e) => warn!("screenshot capture failed: {e:#}"),
        }

        let dump = self.dir.join(format!("debug_page_{timestamp}.html"));
        match page.get_html().await {
            Ok(html) => match tokio::fs::write(&dump, html).await {
                Ok(()) => artifacts.markup = Some(dump),
                Err(e) => warn!(path = %dump.display(), "failed to save page source: {e}"),
            },
            Err(e) => warn!("page source capture failed: {e:#}"),
        }

        if !artifacts.is_empty() {
            info!(
                screenshot = ?artifacts.screenshot,
                markup = ?artifacts.markup,
                "diagnostics captured"
            );
        }
        artifacts
    }

    /// Capture stamped with the current time.
    pub async fn capture_now(&self, page: &dyn RenderContext) -> DiagnosticsArtifacts {
        self.capture(page, chrono::Utc::now().timestamp()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::scripted::{ScriptedPage, ScriptedRenderer};
    use crate::renderer::Renderer;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_capture_writes_both_files() {
        let dir = TempDir::new().unwrap();
        let renderer = ScriptedRenderer::new(vec![
            ScriptedPage::new("Explore").with_html("<html>chart</html>")
        ]);
        let probe = renderer.probe();
        let mut page = renderer.new_context().await.unwrap();
        page.navigate("https://trends.test/", 10).await.unwrap();

        let artifacts = DiagnosticsHandler::new(dir.path())
            .capture(&*page, 1_700_000_000)
            .await;

        let shot = dir.path().join("debug_screenshot_1700000000.png");
        let dump = dir.path().join("debug_page_1700000000.html");
        assert_eq!(artifacts.screenshot.as_deref(), Some(shot.as_path()));
        assert_eq!(artifacts.markup.as_deref(), Some(dump.as_path()));
        assert_eq!(std::fs::read_to_string(dump).unwrap(), "<html>chart</html>");
        assert_eq!(probe.log().screenshots, 1);
    }

    #[tokio::test]
    async fn test_unwritable_dir_yields_no_artifacts() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let renderer = ScriptedRenderer::new(vec![ScriptedPage::new("Explore")]);
        let page = renderer.new_context().await.unwrap();
        let artifacts = DiagnosticsHandler::new(blocker.join("sub"))
            .capture(&*page, 1)
            .await;
        assert!(artifacts.is_empty());
    }
}
