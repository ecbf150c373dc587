//! DOM-table strategy: read the accessibility table rendered next to the
//! chart, cell by cell, from element content rather than formatted text.

use super::{ExtractionOutcome, RawRow, Strategy};
use crate::navigation::NavigationController;
use crate::renderer::{RenderContext, Selector};
use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, trace};

/// Where the chart's tabular twin lives, most specific first.
pub fn table_selectors() -> Vec<Selector> {
    vec![
        Selector::css("div[aria-label*='tabular representation' i] table"),
        Selector::css("widget[type='fe_line_chart'] table"),
        Selector::css(".fe-line-chart table"),
        Selector::css("line-chart-directive table"),
    ]
}

/// Keep rows with at least two cells; the two leading cells are date and value.
pub fn rows_from_cells(cells: Vec<Vec<String>>) -> Vec<RawRow> {
    cells
        .into_iter()
        .filter_map(|row| {
            let mut it = row.into_iter();
            let date = it.next()?;
            let value = it.next()?;
            Some(RawRow::new(date.trim(), value.trim()))
        })
        .collect()
}

pub struct DomTableStrategy {
    selectors: Vec<Selector>,
}

impl Default for DomTableStrategy {
    fn default() -> Self {
        Self {
            selectors: table_selectors(),
        }
    }
}

impl DomTableStrategy {
    /// First selector that resolves to a table with any rows at all.
    async fn find_table(&self, page: &dyn RenderContext) -> Option<(&Selector, Vec<Vec<String>>)> {
        for selector in &self.selectors {
            match page.table_rows(selector).await {
                Ok(cells) if !cells.is_empty() => return Some((selector, cells)),
                Ok(_) => {}
                Err(e) => trace!("table probe {selector} failed: {e:#}"),
            }
        }
        None
    }
}

#[async_trait]
impl Strategy for DomTableStrategy {
    fn name(&self) -> &'static str {
        "table"
    }

    async fn attempt(
        &self,
        page: &dyn RenderContext,
        nav: &NavigationController,
    ) -> Result<ExtractionOutcome> {
        if let Some(reason) = nav.check_blocked(page).await? {
            return Ok(ExtractionOutcome::Blocked { reason });
        }

        let timeouts = nav.timeouts();
        let deadline = tokio::time::Instant::now() + timeouts.element;
        let (selector, cells) = loop {
            if let Some(found) = self.find_table(page).await {
                break found;
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(ExtractionOutcome::not_applicable("no data table rendered"));
            }
            tokio::time::sleep(timeouts.poll).await;
        };

        let rows = rows_from_cells(cells);
        debug!(selector = %selector, rows = rows.len(), "data table read");
        if rows.is_empty() {
            return Ok(ExtractionOutcome::no_data("data table has no two-cell rows"));
        }
        Ok(ExtractionOutcome::Success(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ScrapeConfig, Timeouts};
    use crate::navigation::chart_selectors;
    use crate::renderer::scripted::{ScriptedPage, ScriptedRenderer};
    use crate::renderer::Renderer;

    fn cells(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    async fn run(page: ScriptedPage) -> ExtractionOutcome {
        let renderer = ScriptedRenderer::new(vec![page.with_element(chart_selectors()[0].clone())]);
        let mut ctx = renderer.new_context().await.unwrap();
        let mut nav = NavigationController::for_site(
            "https://trends.test/explore",
            "https://trends.test/",
            &ScrapeConfig::default(),
            Timeouts::immediate(),
        )
        .unwrap();
        nav.open(ctx.as_mut()).await.unwrap();
        DomTableStrategy::default()
            .attempt(&*ctx, &nav)
            .await
            .unwrap()
    }

    #[test]
    fn test_rows_from_cells_drops_short_rows() {
        let rows = rows_from_cells(cells(&[
            &["Jan 1, 2024", " 42 ", "extra"],
            &["lonely"],
            &[],
            &["Jan 8, 2024", "<1"],
        ]));
        assert_eq!(
            rows,
            vec![RawRow::new("Jan 1, 2024", "42"), RawRow::new("Jan 8, 2024", "<1")]
        );
    }

    #[tokio::test]
    async fn test_reads_fallback_table() {
        let page = ScriptedPage::new("Explore").with_table(
            table_selectors()[2].clone(),
            cells(&[&["Jan 1, 2024", "42"]]),
        );
        let outcome = run(page).await;
        assert_eq!(
            outcome,
            ExtractionOutcome::Success(vec![RawRow::new("Jan 1, 2024", "42")])
        );
    }

    #[tokio::test]
    async fn test_missing_table_is_not_applicable() {
        let outcome = run(ScriptedPage::new("Explore")).await;
        assert!(matches!(outcome, ExtractionOutcome::StrategyNotApplicable { .. }));
    }

    #[tokio::test]
    async fn test_single_cell_table_is_no_data() {
        let page = ScriptedPage::new("Explore")
            .with_table(table_selectors()[0].clone(), cells(&[&["Date"], &["x"]]));
        let outcome = run(page).await;
        assert!(matches!(outcome, ExtractionOutcome::NoDataFound { .. }));
    }
}
