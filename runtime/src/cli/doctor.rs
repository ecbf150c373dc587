//! Environment readiness check.

use super::OutputFlags;
use crate::config::{resolve_download_dir, ScrapeConfig};
use crate::renderer::chromium::find_chromium;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// One doctor line.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Check {
    pub name: &'static str,
    pub ok: bool,
    pub detail: String,
}

/// Whether `dir` exists (or can be created) and accepts a file.
fn writable(dir: &Path) -> std::result::Result<(), String> {
    std::fs::create_dir_all(dir).map_err(|e| e.to_string())?;
    tempfile::NamedTempFile::new_in(dir)
        .map(drop)
        .map_err(|e| e.to_string())
}

/// Checks against the resolved output and download directories.
pub fn checks() -> Vec<Check> {
    let config = ScrapeConfig::resolve(None, None, None, None);
    let output_dir = match config.output_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    checks_for(output_dir, resolve_download_dir(None))
}

fn checks_for(output_dir: PathBuf, download_dir: PathBuf) -> Vec<Check> {
    let mut out = Vec::new();

    match find_chromium() {
        Some(path) => out.push(Check {
            name: "chromium",
            ok: true,
            detail: path.display().to_string(),
        }),
        None => out.push(Check {
            name: "chromium",
            ok: false,
            detail: "not found; set TRENDLINE_CHROMIUM_PATH or install Chrome for Testing \
                     under ~/.trendline/chromium"
                .to_string(),
        }),
    }

    for (name, dir) in [("output_dir", output_dir), ("download_dir", download_dir)] {
        let result = writable(&dir);
        out.push(Check {
            name,
            ok: result.is_ok(),
            detail: match result {
                Ok(()) => format!("{} is writable", dir.display()),
                Err(e) => format!("{}: {e}", dir.display()),
            },
        });
    }

    out
}

/// Print the checks. Exit status 1 when any check fails.
pub async fn run(flags: &OutputFlags) -> Result<i32> {
    let checks = checks();
    let ready = checks.iter().all(|c| c.ok);

    if flags.json {
        flags.print_json(&serde_json::json!({
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "ready": ready,
            "checks": checks,
        }));
    } else {
        flags.say("Trendline Doctor");
        flags.say("================");
        flags.say("");
        flags.say(format!("OS:   {}", std::env::consts::OS));
        flags.say(format!("Arch: {}", std::env::consts::ARCH));
        flags.say("");
        for c in &checks {
            let mark = if c.ok { "[OK]" } else { "[!!]" };
            flags.say(format!("{mark} {}: {}", c.name, c.detail));
        }
        flags.say("");
        flags.say(if ready { "Status: READY" } else { "Status: NOT READY" });
    }

    Ok(if ready { 0 } else { 1 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_writable_creates_missing_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a/b");
        assert!(writable(&nested).is_ok());
        assert!(nested.is_dir());
    }

    #[test]
    fn test_checks_cover_browser_and_dirs() {
        let dir = TempDir::new().unwrap();
        let checks = checks_for(dir.path().join("public"), dir.path().join("dl"));
        let names: Vec<&str> = checks.iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["chromium", "output_dir", "download_dir"]);
        assert!(checks[1].ok && checks[2].ok);
    }
}
