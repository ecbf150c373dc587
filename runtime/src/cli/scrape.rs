//! `trendline scrape`: one extraction run.

use super::OutputFlags;
use crate::config::{
    resolve_diagnostics_dir, resolve_download_dir, ScrapeConfig, SessionConfig, Timeouts,
};
use crate::diagnostics::DiagnosticsHandler;
use crate::extraction::{StrategyChain, DEFAULT_STRATEGIES};
use crate::pipeline::{Pipeline, PipelineResult};
use crate::session::SessionManager;
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug, Clone, Default)]
pub struct ScrapeArgs {
    /// Search term, also used as the value key in the output file
    #[arg(long)]
    pub keyword: Option<String>,
    /// Geography code (e.g. "US")
    #[arg(long)]
    pub geo: Option<String>,
    /// Timeframe expression (e.g. "today 12-m")
    #[arg(long)]
    pub timeframe: Option<String>,
    /// Output JSON path
    #[arg(long, short)]
    pub output: Option<PathBuf>,
    /// Scratch directory for exported files
    #[arg(long)]
    pub download_dir: Option<PathBuf>,
    /// Where failure screenshots and page dumps go
    #[arg(long)]
    pub diagnostics_dir: Option<PathBuf>,
    /// Extraction strategies in priority order (export, table)
    #[arg(long, value_delimiter = ',')]
    pub strategies: Vec<String>,
    /// Show the browser window
    #[arg(long)]
    pub headful: bool,
    /// Browser executable, skipping discovery
    #[arg(long)]
    pub chromium: Option<PathBuf>,
}

impl ScrapeArgs {
    /// Strategy names from the flag, then `TRENDLINE_STRATEGIES`, then the default order.
    fn strategy_names(&self) -> Vec<String> {
        if !self.strategies.is_empty() {
            return self.strategies.clone();
        }
        if let Ok(v) = std::env::var("TRENDLINE_STRATEGIES") {
            let names: Vec<String> = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !names.is_empty() {
                return names;
            }
        }
        DEFAULT_STRATEGIES.iter().map(|s| s.to_string()).collect()
    }

    pub fn build_pipeline(&self) -> Result<Pipeline> {
        let config = ScrapeConfig::resolve(
            self.keyword.as_deref(),
            self.geo.as_deref(),
            self.timeframe.as_deref(),
            self.output.as_deref(),
        );
        let chain = StrategyChain::from_names(
            &self.strategy_names(),
            resolve_download_dir(self.download_dir.as_deref()),
        )?;
        let diagnostics =
            DiagnosticsHandler::new(resolve_diagnostics_dir(self.diagnostics_dir.as_deref()));
        Ok(Pipeline::new(config, chain, diagnostics).with_timeouts(Timeouts::from_env()))
    }

    pub fn session_config(&self, pipeline: &Pipeline) -> SessionConfig {
        let base = SessionConfig {
            headless: !self.headful,
            ..SessionConfig::default()
        }
        .with_executable_from_env(self.chromium.as_deref());
        pipeline.session_config(base)
    }
}

/// Run the pipeline and report. Returns the process exit status.
pub async fn run(args: &ScrapeArgs, flags: &OutputFlags) -> Result<i32> {
    let pipeline = args.build_pipeline()?;
    let manager = SessionManager::new(args.session_config(&pipeline));

    let config = pipeline.config();
    flags.say(format!(
        "Scraping \"{}\" ({}, {})",
        config.keyword, config.geography, config.timeframe
    ));

    let result = pipeline.run(&manager).await;
    report(&result, flags);
    Ok(result.exit_code())
}

fn report(result: &PipelineResult, flags: &OutputFlags) {
    match result {
        PipelineResult::Success { count, summary, .. } => {
            if flags.json {
                flags.print_json(&serde_json::json!({
                    "success": true,
                    "count": count,
                    "summary": summary,
                }));
            } else {
                flags.say(format!(
                    "[OK] {count} points written to {} (strategy: {}, raw rows: {}, skipped: {})",
                    summary.output.display(),
                    summary.strategy,
                    summary.raw_rows,
                    summary.parse_failures
                ));
            }
        }
        PipelineResult::Failure {
            reason,
            message,
            diagnostics,
        } => {
            if flags.json {
                flags.print_json(&serde_json::json!({
                    "success": false,
                    "reason": reason,
                    "message": message,
                    "diagnostics": diagnostics,
                }));
                return;
            }
            if !flags.quiet {
                eprintln!("  Error ({reason}): {message}");
                if let Some(d) = diagnostics {
                    for path in d.screenshot.iter().chain(d.markup.iter()) {
                        eprintln!("  Saved {}", path.display());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: ScrapeArgs,
    }

    #[test]
    fn test_strategy_flag_is_comma_separated() {
        let h = Harness::parse_from(["t", "--strategies", "table,export", "--headful"]);
        assert_eq!(h.args.strategy_names(), vec!["table", "export"]);
        assert!(h.args.headful);
    }

    #[test]
    fn test_table_only_run_has_no_download_dir() {
        let h = Harness::parse_from(["t", "--strategies", "table", "--keyword", "eth"]);
        let pipeline = h.args.build_pipeline().unwrap();
        assert_eq!(pipeline.config().keyword, "eth");
        assert!(h.args.session_config(&pipeline).download_dir.is_none());
    }

    #[test]
    fn test_unknown_strategy_is_rejected() {
        let h = Harness::parse_from(["t", "--strategies", "ocr"]);
        assert!(h.args.build_pipeline().is_err());
    }
}
