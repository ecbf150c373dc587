// Copyright 2026 Trendline Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use trendline::cli::{self, scrape::ScrapeArgs, OutputFlags};

#[derive(Parser)]
#[command(
    name = "trendline",
    about = "Trendline: scrape an interest-over-time series into a JSON artifact",
    version,
    after_help = "Run 'trendline <command> --help' for details on each command.\nRun 'trendline' with no command to scrape with the defaults."
)]
struct Cli {
    /// Print the run report and logs as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Only print errors
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Log at debug level
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one extraction and write the output file
    Scrape(ScrapeArgs),
    /// Check for a browser and writable directories
    Doctor,
    /// Print shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let flags = OutputFlags {
        json: cli.json,
        quiet: cli.quiet,
        verbose: cli.verbose,
    };
    cli::init_tracing(&flags);

    let result = match cli.command {
        None => cli::scrape::run(&ScrapeArgs::default(), &flags).await,
        Some(Commands::Scrape(args)) => cli::scrape::run(&args, &flags).await,
        Some(Commands::Doctor) => cli::doctor::run(&flags).await,
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "trendline", &mut std::io::stdout());
            Ok(0)
        }
    };

    // 0 on a written artifact, 1 on any failure
    match result {
        Ok(0) => Ok(()),
        Ok(code) => std::process::exit(code),
        Err(e) => {
            if flags.json {
                flags.print_json(&serde_json::json!({
                    "success": false,
                    "message": format!("{e:#}"),
                }));
            } else if !flags.quiet {
                eprintln!("  Error: {e:#}");
            }
            std::process::exit(1);
        }
    }
}
