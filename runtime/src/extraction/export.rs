//! Export-trigger strategy: click the chart's CSV export and read the file
//! the browser drops into the download directory.

use super::{ExtractionOutcome, RawRow, Strategy};
use crate::navigation::NavigationController;
use crate::renderer::{wait_for_any, RenderContext, Selector};
use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Export control heuristics in priority order: icon text, accessibility
/// label, title attribute, then the first widget action button.
pub fn export_selectors() -> Vec<Selector> {
    vec![
        Selector::xpath("(//button[.//i[text()='file_download']])[1]"),
        Selector::css("button[aria-label*='CSV' i]"),
        Selector::css("button[aria-label*='download' i]"),
        Selector::css("button[title*='CSV' i]"),
        Selector::css("button[title*='download' i]"),
        Selector::css(".widget-actions-item.export"),
        Selector::css(".widget-actions button"),
    ]
}

fn iso_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date-shape regex is valid"))
}

/// Pull `date,value` rows out of an exported CSV.
///
/// Header and metadata lines are dropped by requiring the first field to
/// have the `YYYY-MM-DD` shape; values stay untyped.
pub fn parse_export_csv(contents: &str) -> Vec<RawRow> {
    contents
        .lines()
        .filter_map(|line| {
            let mut fields = line.trim_start_matches('\u{FEFF}').split(',');
            let date = unquote(fields.next()?);
            let value = unquote(fields.next()?);
            iso_date_re()
                .is_match(date)
                .then(|| RawRow::new(date, value))
        })
        .collect()
}

fn unquote(field: &str) -> &str {
    field.trim().trim_matches('"').trim()
}

/// Finished CSV downloads currently in `dir`, sorted by name.
async fn csv_files(dir: &Path) -> Result<BTreeSet<PathBuf>> {
    let mut files = BTreeSet::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("failed to list {}", dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv {
            files.insert(path);
        }
    }
    Ok(files)
}

async fn listing(dir: &Path) -> Vec<String> {
    let mut names = Vec::new();
    if let Ok(mut entries) = tokio::fs::read_dir(dir).await {
        while let Ok(Some(entry)) = entries.next_entry().await {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    names
}

/// Clicks the export control and parses the downloaded file.
pub struct ExportStrategy {
    download_dir: PathBuf,
    selectors: Vec<Selector>,
}

impl ExportStrategy {
    pub fn new(download_dir: PathBuf) -> Self {
        Self {
            download_dir,
            selectors: export_selectors(),
        }
    }

    /// Wait up to the settle time for a CSV that was not there before the click.
    async fn await_new_file(
        &self,
        before: &BTreeSet<PathBuf>,
        nav: &NavigationController,
    ) -> Result<Option<PathBuf>> {
        let timeouts = nav.timeouts();
        let deadline = tokio::time::Instant::now() + timeouts.download_settle;
        loop {
            let after = csv_files(&self.download_dir).await?;
            if let Some(path) = after.difference(before).next() {
                return Ok(Some(path.clone()));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(timeouts.poll).await;
        }
    }
}

#[async_trait]
impl Strategy for ExportStrategy {
    fn name(&self) -> &'static str {
        "export"
    }

    fn download_dir(&self) -> Option<&Path> {
        Some(&self.download_dir)
    }

    async fn attempt(
        &self,
        page: &dyn RenderContext,
        nav: &NavigationController,
    ) -> Result<ExtractionOutcome> {
        tokio::fs::create_dir_all(&self.download_dir)
            .await
            .with_context(|| format!("failed to create {}", self.download_dir.display()))?;
        let before = csv_files(&self.download_dir).await?;

        let timeouts = nav.timeouts();
        let Some(control) = wait_for_any(page, &self.selectors, timeouts.element, timeouts.poll).await
        else {
            return Ok(ExtractionOutcome::not_applicable("no export control found"));
        };
        debug!(selector = %control, "export control located");

        if !page.click(control).await? {
            return Ok(ExtractionOutcome::not_applicable("export control vanished before click"));
        }

        // A file on disk outranks whatever the page says afterwards.
        let Some(file) = self.await_new_file(&before, nav).await? else {
            if let Some(reason) = nav.check_blocked(page).await? {
                return Ok(ExtractionOutcome::Blocked { reason });
            }
            let contents = listing(&self.download_dir).await;
            warn!(
                dir = %self.download_dir.display(),
                ?contents,
                "no exported file appeared"
            );
            return Ok(ExtractionOutcome::not_applicable("no exported file appeared"));
        };
        info!(file = %file.display(), "exported file found");

        let contents = tokio::fs::read_to_string(&file)
            .await
            .with_context(|| format!("failed to read {}", file.display()))?;
        let rows = parse_export_csv(&contents);

        if let Err(e) = tokio::fs::remove_file(&file).await {
            debug!(file = %file.display(), "could not remove export: {e}");
        }

        if rows.is_empty() {
            return Ok(ExtractionOutcome::no_data("exported file has no dated rows"));
        }
        Ok(ExtractionOutcome::Success(rows))
    }
}
