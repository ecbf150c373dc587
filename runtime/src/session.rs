//! Browser session ownership for one run.
//!
//! A session holds the browser process and the single tab the pipeline
//! drives. [`Session::release`] is idempotent; the pipeline calls it on
//! every exit path, panics included.

use crate::config::SessionConfig;
use crate::error::ScrapeError;
use crate::renderer::chromium::ChromiumRenderer;
use crate::renderer::{RenderContext, Renderer};
use anyhow::Result;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Exclusive handle on one browser connection and its tab.
pub struct Session {
    renderer: Option<Box<dyn Renderer>>,
    context: Option<Box<dyn RenderContext>>,
    created_at: Instant,
}

impl Session {
    /// Open a tab on an already-started renderer.
    pub async fn open(renderer: Box<dyn Renderer>) -> std::result::Result<Self, ScrapeError> {
        match renderer.new_context().await {
            Ok(context) => Ok(Self {
                renderer: Some(renderer),
                context: Some(context),
                created_at: Instant::now(),
            }),
            Err(e) => {
                let _ = renderer.shutdown().await;
                Err(ScrapeError::Environment(format!("failed to open tab: {e:#}")))
            }
        }
    }

    /// The tab, unless the session was already released.
    pub fn page(&mut self) -> Result<&mut dyn RenderContext> {
        match self.context.as_mut() {
            Some(ctx) => Ok(ctx.as_mut()),
            None => anyhow::bail!("session already released"),
        }
    }

    /// Read-only view of the tab, if still held.
    pub fn page_ref(&self) -> Option<&dyn RenderContext> {
        self.context.as_deref()
    }

    pub fn is_released(&self) -> bool {
        self.context.is_none() && self.renderer.is_none()
    }

    /// How long the session has been alive.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Close the tab, then the browser. Safe to call more than once.
    pub async fn release(&mut self) {
        if let Some(context) = self.context.take() {
            if let Err(e) = context.close().await {
                warn!("failed to close tab: {e:#}");
            }
        }
        if let Some(renderer) = self.renderer.take() {
            if let Err(e) = renderer.shutdown().await {
                warn!("failed to shut down browser: {e:#}");
            }
            info!(age_ms = self.age().as_millis() as u64, "session released");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.is_released() {
            // No async close from Drop; the backend's own teardown takes over.
            warn!("session dropped without release");
        }
    }
}

/// Acquires sessions for the configured backend.
pub struct SessionManager {
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Start Chromium and open a tab. Any failure here is an environment error.
    pub async fn acquire(&self) -> std::result::Result<Session, ScrapeError> {
        if let Some(dir) = &self.config.download_dir {
            debug!(dir = %dir.display(), "download directory configured");
        }
        let renderer = ChromiumRenderer::launch(&self.config)
            .await
            .map_err(|e| ScrapeError::Environment(format!("{e:#}")))?;
        Session::open(Box::new(renderer)).await
    }
}
