//! Consent / cookie prompt handling.

use crate::config::Timeouts;
use crate::renderer::{wait_for_any, RenderContext, Selector};
use tracing::{debug, info, warn};

/// Known consent buttons, most specific first.
pub fn consent_selectors() -> Vec<Selector> {
    vec![
        Selector::css("button.cookieBarConsentButton"),
        Selector::css("form[action*='consent'] button[aria-label*='Accept' i]"),
        Selector::css("button[aria-label='Accept all']"),
        Selector::xpath("//button[.//span[normalize-space(text())='Accept all']]"),
    ]
}

/// Dismiss a consent prompt if one appears within the consent wait.
///
/// Returns whether a prompt was clicked. A missing prompt is normal; a
/// prompt that refuses the click is logged and otherwise ignored.
pub async fn dismiss(page: &dyn RenderContext, timeouts: &Timeouts) -> bool {
    let selectors = consent_selectors();
    let Some(selector) = wait_for_any(page, &selectors, timeouts.consent, timeouts.poll).await
    else {
        debug!("no consent prompt");
        return false;
    };

    match page.click(selector).await {
        Ok(true) => {
            info!(%selector, "consent prompt dismissed");
            tokio::time::sleep(timeouts.consent_fade).await;
            true
        }
        Ok(false) => {
            debug!(%selector, "consent prompt vanished before click");
            false
        }
        Err(e) => {
            warn!(%selector, "consent click failed: {e:#}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::scripted::{ClickEffect, ScriptedPage, ScriptedRenderer};
    use crate::renderer::Renderer;

    #[tokio::test]
    async fn test_dismiss_clicks_banner() {
        let banner = consent_selectors()[0].clone();
        let renderer = ScriptedRenderer::new(vec![
            ScriptedPage::new("Explore").on_click(banner.clone(), ClickEffect::Nothing)
        ]);
        let probe = renderer.probe();
        let mut page = renderer.new_context().await.unwrap();
        page.navigate("https://x", 10).await.unwrap();

        assert!(dismiss(&*page, &Timeouts::immediate()).await);
        assert_eq!(probe.log().clicks, vec![banner]);
    }

    #[tokio::test]
    async fn test_missing_banner_is_not_an_error() {
        let renderer = ScriptedRenderer::new(vec![ScriptedPage::new("Explore")]);
        let mut page = renderer.new_context().await.unwrap();
        page.navigate("https://x", 10).await.unwrap();

        assert!(!dismiss(&*page, &Timeouts::immediate()).await);
    }
}
