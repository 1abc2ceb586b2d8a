//! Fixed artifact layout under `<runs_dir>/<run_id>/`.
//!
//! Directories are created lazily by the writers, so a run directory only
//! contains the subdirectories of the steps that actually ran.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Serialize;

use crate::core::feature::disambiguate_run_id;

/// Upper bound on `-<n>` suffixes tried for one second's worth of run ids.
const MAX_RUN_ID_ATTEMPTS: u32 = 1000;

#[derive(Debug, Clone)]
pub struct RunPaths {
    pub dir: PathBuf,
    pub ledger_path: PathBuf,
    pub intake_feature_path: PathBuf,
    pub plan_path: PathBuf,
    pub execute_output_path: PathBuf,
    pub verify_path: PathBuf,
    pub review_path: PathBuf,
    pub report_path: PathBuf,
}

impl RunPaths {
    pub fn new(run_dir: &Path) -> Self {
        let dir = run_dir.to_path_buf();
        Self {
            ledger_path: dir.join("ledger.jsonl"),
            intake_feature_path: dir.join("intake").join("feature.md"),
            plan_path: dir.join("plan").join("plan.md"),
            execute_output_path: dir.join("execute").join("claude-output.txt"),
            verify_path: dir.join("verify").join("pytest.txt"),
            review_path: dir.join("review").join("review.md"),
            report_path: dir.join("publish").join("report.json"),
            dir,
        }
    }

    pub fn verify_after_fix_path(&self, iteration: u32) -> PathBuf {
        self.dir
            .join("verify")
            .join(format!("pytest-fix-{iteration}.txt"))
    }

    pub fn fix_output_path(&self, iteration: u32) -> PathBuf {
        self.dir
            .join("fix")
            .join(format!("claude-fix-{iteration}.txt"))
    }

    pub fn status_raw_path(&self, label: &str) -> PathBuf {
        self.dir
            .join("usage")
            .join(format!("codex-status-{label}.txt"))
    }

    pub fn status_parsed_path(&self, label: &str) -> PathBuf {
        self.dir
            .join("usage")
            .join(format!("codex-status-{label}.json"))
    }
}

/// Create a fresh directory `<runs_dir>/<base>` (or `<base>-<n>` when taken) and
/// return the run id actually used.
pub fn allocate_run_dir(runs_dir: &Path, base: &str) -> Result<(String, PathBuf)> {
    fs::create_dir_all(runs_dir)
        .with_context(|| format!("create runs dir {}", runs_dir.display()))?;
    for attempt in 1..=MAX_RUN_ID_ATTEMPTS {
        let run_id = if attempt == 1 {
            base.to_string()
        } else {
            disambiguate_run_id(base, attempt)
        };
        let dir = runs_dir.join(&run_id);
        match fs::create_dir(&dir) {
            Ok(()) => return Ok((run_id, dir)),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(err) => {
                return Err(err).with_context(|| format!("create run dir {}", dir.display()));
            }
        }
    }
    bail!("no free run directory for '{base}' in {}", runs_dir.display())
}

/// Write `contents` to `path`, creating parent directories.
pub fn write_text(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

/// Serialize `value` to pretty-printed JSON with trailing newline.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value).context("serialize json")?;
    buf.push('\n');
    write_text(path, &buf)
}

pub fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}
