//! CLI subcommand implementations for the trendline binary.

pub mod doctor;
pub mod scrape;

use tracing_subscriber::EnvFilter;

/// Global presentation flags shared by every subcommand.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputFlags {
    pub json: bool,
    pub quiet: bool,
    pub verbose: bool,
}

impl OutputFlags {
    /// Print a human-readable line unless `--quiet` or `--json` is set.
    pub fn say(&self, line: impl AsRef<str>) {
        if !self.quiet && !self.json {
            println!("{}", line.as_ref());
        }
    }

    /// Print a JSON document to stdout.
    pub fn print_json(&self, value: &serde_json::Value) {
        match serde_json::to_string_pretty(value) {
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("failed to serialize output: {e}"),
        }
    }
}

/// Install the tracing subscriber. `RUST_LOG` wins over the flags.
pub fn init_tracing(flags: &OutputFlags) {
    let default = if flags.verbose {
        "trendline=debug"
    } else if flags.quiet {
        "trendline=warn"
    } else {
        "trendline=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let installed = if flags.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = installed {
        eprintln!("tracing already initialised: {e}");
    }
}
