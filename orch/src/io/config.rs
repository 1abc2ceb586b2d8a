//! Orchestrator settings.
//!
//! Layering: built-in defaults, then an optional `orch.toml` in the repo root,
//! then `ORCH_<FIELD>` environment variables. The result is validated once and
//! passed by reference for the rest of the run.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::allowlist::CommandAllowlist;
use crate::error::OrchError;

/// Default settings file name, looked up in the repo root.
pub const CONFIG_FILE_NAME: &str = "orch.toml";

const ENV_PREFIX: &str = "ORCH_";

/// Env overrides always echoed into the publish report, set or not.
pub const REPORTED_ENV_KEYS: [&str; 2] = ["ORCH_CODEX_CMD", "ORCH_CLAUDE_CMD"];

/// Orchestrator configuration (TOML / env).
///
/// Missing fields default to values that drive the local stand-in tools.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub repo_root: PathBuf,
    pub docs_dir: PathBuf,
    /// Holds one `<feature_id>/feature.md` per feature.
    pub features_dir: PathBuf,
    /// Holds one directory per run.
    pub runs_dir: PathBuf,

    /// Base shell command for the planning/review tool.
    pub codex_cmd: String,
    /// Base shell command for the execution/fix tool.
    pub claude_cmd: String,

    /// Must be allowed by `allowlist_regex`.
    pub verify_command: String,
    pub max_fix_iterations: u32,
    pub allowlist_regex: Vec<String>,

    pub tool_timeout_secs: Option<u64>,
    pub verify_timeout_secs: Option<u64>,
    /// Captured stdout/stderr beyond this many bytes is dropped.
    pub output_limit_bytes: usize,

    /// `ORCH_*` variables that were applied, by name.
    #[serde(skip)]
    pub env_overrides: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            repo_root: PathBuf::from("."),
            docs_dir: PathBuf::from("docs"),
            features_dir: PathBuf::from("docs/features"),
            runs_dir: PathBuf::from("runs"),
            codex_cmd: "python tools/fake_codex.py".to_string(),
            claude_cmd: "python tools/fake_claude.py".to_string(),
            verify_command: "python -m pytest -q tests/test_integration.py tests/test_e2e.py"
                .to_string(),
            max_fix_iterations: 3,
            allowlist_regex: vec![
                r"^python(3)?(\s|$)".to_string(),
                r"^pytest(\s|$)".to_string(),
                r"^uv(\s|$)".to_string(),
                r"^pip(\s|$)".to_string(),
                r"^git(\s|$)".to_string(),
            ],
            tool_timeout_secs: None,
            verify_timeout_secs: None,
            output_limit_bytes: 10 * 1024 * 1024,
            env_overrides: BTreeMap::new(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        let invalid =
            |msg: &str| -> Result<()> { Err(OrchError::InvalidSettings(msg.to_string()).into()) };
        if self.max_fix_iterations < 1 {
            return invalid("max_fix_iterations must be >= 1");
        }
        if self.codex_cmd.trim().is_empty() {
            return invalid("codex_cmd must not be empty");
        }
        if self.claude_cmd.trim().is_empty() {
            return invalid("claude_cmd must not be empty");
        }
        if self.verify_command.trim().is_empty() {
            return invalid("verify_command must not be empty");
        }
        if self.output_limit_bytes == 0 {
            return invalid("output_limit_bytes must be > 0");
        }
        if self.tool_timeout_secs == Some(0) {
            return invalid("tool_timeout_secs must be > 0");
        }
        if self.verify_timeout_secs == Some(0) {
            return invalid("verify_timeout_secs must be > 0");
        }
        self.allowlist()?;
        Ok(())
    }

    /// Compile `allowlist_regex` in order.
    pub fn allowlist(&self) -> Result<CommandAllowlist> {
        CommandAllowlist::from_patterns(&self.allowlist_regex)
            .map_err(|err| OrchError::InvalidSettings(err.to_string()).into())
    }

    pub fn features_path(&self) -> PathBuf {
        self.repo_root.join(&self.features_dir)
    }

    pub fn runs_path(&self) -> PathBuf {
        self.repo_root.join(&self.runs_dir)
    }

    pub fn feature_doc_path(&self, feature_id: &str) -> PathBuf {
        self.features_path().join(feature_id).join("feature.md")
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_secs.map(Duration::from_secs)
    }

    pub fn verify_timeout(&self) -> Option<Duration> {
        self.verify_timeout_secs.map(Duration::from_secs)
    }

    /// Values for the publish report's `env` object.
    pub fn reported_env(&self) -> BTreeMap<String, Option<String>> {
        let mut env: BTreeMap<String, Option<String>> = REPORTED_ENV_KEYS
            .iter()
            .map(|key| (key.to_string(), None))
            .collect();
        for (key, value) in &self.env_overrides {
            env.insert(key.clone(), Some(value.clone()));
        }
        env
    }

    /// Apply `ORCH_<FIELD>` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |field: &str| -> Option<(String, String)> {
            let key = format!("{ENV_PREFIX}{}", field.to_ascii_uppercase());
            lookup(&key).map(|value| (key, value))
        };
        let mut applied = Vec::new();

        if let Some((key, v)) = get("repo_root") {
            self.repo_root = PathBuf::from(&v);
            applied.push((key, v));
        }
        if let Some((key, v)) = get("docs_dir") {
            self.docs_dir = PathBuf::from(&v);
            applied.push((key, v));
        }
        if let Some((key, v)) = get("features_dir") {
            self.features_dir = PathBuf::from(&v);
            applied.push((key, v));
        }
        if let Some((key, v)) = get("runs_dir") {
            self.runs_dir = PathBuf::from(&v);
            applied.push((key, v));
        }
        if let Some((key, v)) = get("codex_cmd") {
            self.codex_cmd = v.clone();
            applied.push((key, v));
        }
        if let Some((key, v)) = get("claude_cmd") {
            self.claude_cmd = v.clone();
            applied.push((key, v));
        }
        if let Some((key, v)) = get("verify_command") {
            self.verify_command = v.clone();
            applied.push((key, v));
        }
        if let Some((key, v)) = get("max_fix_iterations") {
            self.max_fix_iterations = parse_env(&key, &v)?;
            applied.push((key, v));
        }
        if let Some((key, v)) = get("allowlist_regex") {
            self.allowlist_regex = serde_json::from_str(&v).with_context(|| {
                OrchError::InvalidSettings(format!("{key} must be a JSON array of strings"))
            })?;
            applied.push((key, v));
        }
        if let Some((key, v)) = get("tool_timeout_secs") {
            self.tool_timeout_secs = Some(parse_env(&key, &v)?);
            applied.push((key, v));
        }
        if let Some((key, v)) = get("verify_timeout_secs") {
            self.verify_timeout_secs = Some(parse_env(&key, &v)?);
            applied.push((key, v));
        }
        if let Some((key, v)) = get("output_limit_bytes") {
            self.output_limit_bytes = parse_env(&key, &v)?;
            applied.push((key, v));
        }

        for (key, value) in applied {
            debug!(key = %key, "applied env override");
            self.env_overrides.insert(key, value);
        }
        Ok(())
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| OrchError::InvalidSettings(format!("parse {key}='{value}'")))
}

/// Load settings from a TOML file.
///
/// If the file is missing, returns `Settings::default()`. Not validated; see [`load_settings`].
pub fn load_config_file(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let settings: Settings = toml::from_str(&contents)
        .with_context(|| OrchError::InvalidSettings(format!("parse {}", path.display())))?;
    Ok(settings)
}

/// Build the settings for one process: file (if any), then env, then validation.
///
/// `config_path` defaults to `<repo_root>/orch.toml`, where `repo_root` is taken from
/// `ORCH_REPO_ROOT` or the current directory.
pub fn load_settings<F>(config_path: Option<&Path>, lookup: F) -> Result<Settings>
where
    F: Fn(&str) -> Option<String>,
{
    let default_path = lookup(&format!("{ENV_PREFIX}REPO_ROOT"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_FILE_NAME);
    let path = config_path.unwrap_or(&default_path);
    let mut settings = load_config_file(path)?;
    settings.apply_env(lookup)?;
    settings.validate()?;
    debug!(
        repo_root = %settings.repo_root.display(),
        max_fix_iterations = settings.max_fix_iterations,
        "settings loaded"
    );
    Ok(settings)
}

/// `std::env::var` as a lookup function.
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        Settings::default().validate().expect("valid");
    }

    #[test]
    fn missing_file_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let settings = load_config_file(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn file_then_env_layering() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            "codex_cmd = \"codex exec\"\nmax_fix_iterations = 5\nverify_command = \"pytest -q\"\n",
        )
        .expect("write");

        let settings = load_settings(
            Some(&path),
            env(&[
                ("ORCH_MAX_FIX_ITERATIONS", "2"),
                ("ORCH_CLAUDE_CMD", "claude -p"),
            ]),
        )
        .expect("load");

        assert_eq!(settings.codex_cmd, "codex exec");
        assert_eq!(settings.verify_command, "pytest -q");
        assert_eq!(settings.max_fix_iterations, 2);
        assert_eq!(settings.claude_cmd, "claude -p");
        assert_eq!(
            settings.env_overrides.keys().collect::<Vec<_>>(),
            vec!["ORCH_CLAUDE_CMD", "ORCH_MAX_FIX_ITERATIONS"]
        );
    }

    #[test]
    fn allowlist_env_is_json_array() {
        let mut settings = Settings::default();
        settings
            .apply_env(env(&[("ORCH_ALLOWLIST_REGEX", r#"["^cargo(\\s|$)", "^make"]"#)]))
            .expect("apply");
        assert_eq!(settings.allowlist_regex, vec![r"^cargo(\s|$)", "^make"]);
        assert!(settings.allowlist().expect("compile").check("cargo test").is_ok());
    }

    #[test]
    fn malformed_numeric_env_fails() {
        let mut settings = Settings::default();
        let err = settings
            .apply_env(env(&[("ORCH_MAX_FIX_ITERATIONS", "three")]))
            .unwrap_err();
        assert!(err.to_string().contains("ORCH_MAX_FIX_ITERATIONS"));
        assert_eq!(
            crate::error::exit_code_for(&err),
            crate::exit_codes::CONFIG
        );
    }

    #[test]
    fn zero_fix_iterations_rejected() {
        let settings = Settings {
            max_fix_iterations: 0,
            ..Settings::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OrchError>(),
            Some(OrchError::InvalidSettings(_))
        ));
    }

    #[test]
    fn invalid_allowlist_pattern_rejected() {
        let settings = Settings {
            allowlist_regex: vec!["(".to_string()],
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "max_fix_iteration = 2\n").expect("write");
        assert!(load_config_file(&path).is_err());
    }

    #[test]
    fn reported_env_always_lists_tool_commands() {
        let mut settings = Settings::default();
        settings
            .apply_env(env(&[("ORCH_CODEX_CMD", "codex")]))
            .expect("apply");
        let reported = settings.reported_env();
        assert_eq!(reported["ORCH_CODEX_CMD"].as_deref(), Some("codex"));
        assert_eq!(reported["ORCH_CLAUDE_CMD"], None);
    }

    #[test]
    fn paths_resolve_against_repo_root() {
        let settings = Settings {
            repo_root: PathBuf::from("/work"),
            ..Settings::default()
        };
        assert_eq!(
            settings.feature_doc_path("F-001"),
            PathBuf::from("/work/docs/features/F-001/feature.md")
        );
        assert_eq!(settings.runs_path(), PathBuf::from("/work/runs"));
    }
}
