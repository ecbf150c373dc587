//! Output assembler: dedupe, order and persist the series.
//!
//! The artifact is a JSON array of `{"date": "YYYY-MM-DD", "<keyword>": n}`
//! objects, ascending by date, pretty-printed with two-space indentation.
//! The whole document is rendered in memory and then swapped into place, so
//! a reader never sees a half-written file.

use crate::error::ScrapeError;
use crate::normalize::TimeSeriesPoint;
use chrono::NaiveDate;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::info;

/// One output object; `date` always serializes first.
struct Entry<'a> {
    keyword: &'a str,
    point: &'a TimeSeriesPoint,
}

impl Serialize for Entry<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("date", &self.point.date.format("%Y-%m-%d").to_string())?;
        let value = self.point.value;
        // Whole readings stay integers, matching the scale the site reports.
        if value.fract() == 0.0 && value.abs() < 9.0e15 {
            map.serialize_entry(self.keyword, &(value as i64))?;
        } else {
            map.serialize_entry(self.keyword, &value)?;
        }
        map.end()
    }
}

/// Builds and writes the artifact for one keyword.
#[derive(Debug, Clone)]
pub struct OutputAssembler {
    keyword: String,
}

impl OutputAssembler {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
        }
    }

    /// One point per date, the last one seen winning, in ascending order.
    pub fn assemble<I>(&self, points: I) -> Vec<TimeSeriesPoint>
    where
        I: IntoIterator<Item = TimeSeriesPoint>,
    {
        let by_date: BTreeMap<NaiveDate, TimeSeriesPoint> =
            points.into_iter().map(|p| (p.date, p)).collect();
        by_date.into_values().collect()
    }

    /// Render assembled points as the pretty-printed JSON document.
    pub fn render(&self, points: &[TimeSeriesPoint]) -> serde_json::Result<String> {
        let entries: Vec<Entry<'_>> = points
            .iter()
            .map(|point| Entry {
                keyword: &self.keyword,
                point,
            })
            .collect();
        serde_json::to_string_pretty(&entries)
    }

    /// Render, then atomically replace `path`.
    pub fn write(&self, points: &[TimeSeriesPoint], path: &Path) -> Result<(), ScrapeError> {
        let io_err = |source: std::io::Error| ScrapeError::Output {
            path: path.display().to_string(),
            source,
        };

        let mut document = self.render(points).map_err(|e| io_err(e.into()))?;
        document.push('\n');

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(io_err)?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(document.as_bytes()).map_err(io_err)?;
        tmp.flush().map_err(io_err)?;
        tmp.as_file_mut().sync_all().map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;

        info!(path = %path.display(), points = points.len(), "output written");
        Ok(())
    }
}
