//! Renderer abstraction for browser-based page control.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over
//! the browser engine (Chromium via chromiumoxide in production, a scripted
//! in-memory page in tests). The pipeline never touches a backend type
//! directly.

pub mod chromium;
pub mod scripted;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Outcome of a completed page load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// Where the tab ended up once redirects settled.
    pub final_url: String,
    /// Wall-clock load time in milliseconds.
    pub load_time_ms: u64,
}

/// How to locate elements on a page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Selector {
    /// CSS selector, matched with `querySelectorAll`.
    Css(String),
    /// XPath expression, matched in document order.
    XPath(String),
}

impl Selector {
    pub fn css(s: impl Into<String>) -> Self {
        Selector::Css(s.into())
    }

    pub fn xpath(s: impl Into<String>) -> Self {
        Selector::XPath(s.into())
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::Css(s) => write!(f, "css:{s}"),
            Selector::XPath(s) => write!(f, "xpath:{s}"),
        }
    }
}

/// A running browser that hands out tabs.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Open a fresh tab.
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Close the browser process.
    async fn shutdown(self: Box<Self>) -> Result<()>;
    /// Tabs opened and not yet closed.
    fn active_contexts(&self) -> usize;
}

/// A single browser context (tab) for driving one page.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Load `url`, giving up after `timeout_ms`.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    /// Serialized markup of the current document.
    async fn get_html(&self) -> Result<String>;
    /// Get the document title.
    async fn title(&self) -> Result<String>;
    /// Number of elements matching `selector` that are attached and rendered.
    async fn count_visible(&self, selector: &Selector) -> Result<usize>;
    /// Click the first element matching `selector` via a script-dispatched
    /// click. Returns `false` when nothing matched.
    async fn click(&self, selector: &Selector) -> Result<bool>;
    /// Raw `textContent` of every cell, row by row, of the first table
    /// matching `selector`.
    async fn table_rows(&self, selector: &Selector) -> Result<Vec<Vec<String>>>;
    /// Drop every cookie held by the browser.
    async fn clear_cookies(&self) -> Result<()>;
    /// PNG snapshot of the full page.
    async fn screenshot(&self) -> Result<Vec<u8>>;
    /// Close the tab.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Wait until any of `selectors` has a visible match, polling every `poll`.
///
/// Returns the first selector (in the given priority order) that matched on
/// the earliest successful poll, or `None` once `timeout` elapses. Backend
/// errors during polling are treated as "not yet present".
pub async fn wait_for_any<'a>(
    ctx: &dyn RenderContext,
    selectors: &'a [Selector],
    timeout: std::time::Duration,
    poll: std::time::Duration,
) -> Option<&'a Selector> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        for selector in selectors {
            match ctx.count_visible(selector).await {
                Ok(n) if n > 0 => return Some(selector),
                Ok(_) => {}
                Err(e) => tracing::trace!("probe {selector} failed: {e:#}"),
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(poll).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_display() {
        assert_eq!(Selector::css("button.x").to_string(), "css:button.x");
        assert_eq!(Selector::xpath("//i").to_string(), "xpath://i");
    }
}
