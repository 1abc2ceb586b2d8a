//! Test-only helpers: a scripted command runner and a throwaway repo layout.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::io::config::Settings;
use crate::io::invoke::{CommandRunner, ProcessOutput, ShellRequest};

/// Canonical six-line usage report.
pub const STATUS_REPORT: &str = "Model: gpt-5.2-codex\nInput tokens: 1200\nOutput tokens: 300\nTotal tokens: 1500\nCost (USD): $0.003\nElapsed: 0.2s\n";

pub fn ok_output(stdout: &str) -> ProcessOutput {
    ProcessOutput {
        returncode: 0,
        stdout: stdout.to_string(),
        stderr: String::new(),
        timed_out: false,
    }
}

pub fn failed_output(returncode: i32, stdout: &str) -> ProcessOutput {
    ProcessOutput {
        returncode,
        stdout: stdout.to_string(),
        stderr: String::new(),
        timed_out: false,
    }
}

struct Rule {
    prefix: String,
    replies: VecDeque<ProcessOutput>,
}

/// Runner that never spawns a process.
///
/// Commands are answered by the first rule whose prefix they start with; a rule's
/// last reply repeats once the earlier ones are used up. Commands without a rule
/// take the next queued output, or an empty success. Every command is recorded.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: RefCell<Vec<Rule>>,
    queue: RefCell<VecDeque<ProcessOutput>>,
    commands: RefCell<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, output: ProcessOutput) {
        self.queue.borrow_mut().push_back(output);
    }

    pub fn on(&self, prefix: &str, replies: Vec<ProcessOutput>) {
        self.rules.borrow_mut().push(Rule {
            prefix: prefix.to_string(),
            replies: replies.into(),
        });
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.commands
            .borrow()
            .iter()
            .filter(|command| command.starts_with(prefix))
            .count()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, request: &ShellRequest) -> Result<ProcessOutput> {
        self.commands.borrow_mut().push(request.command.clone());

        let mut rules = self.rules.borrow_mut();
        if let Some(rule) = rules
            .iter_mut()
            .find(|rule| request.command.starts_with(&rule.prefix))
        {
            let reply = if rule.replies.len() > 1 {
                rule.replies.pop_front()
            } else {
                rule.replies.front().cloned()
            };
            return Ok(reply.unwrap_or_default());
        }

        Ok(self.queue.borrow_mut().pop_front().unwrap_or_default())
    }
}

/// Temporary repo root with a features directory and test-friendly settings.
pub struct TestRepo {
    dir: tempfile::TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        fs::create_dir_all(dir.path().join("docs/features"))?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_feature(&self, feature_id: &str, contents: &str) -> Result<PathBuf> {
        let dir = self.path().join("docs/features").join(feature_id);
        fs::create_dir_all(&dir)?;
        let path = dir.join("feature.md");
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Settings rooted here, with short tool commands that are easy to script.
    pub fn settings(&self) -> Settings {
        Settings {
            repo_root: self.path().to_path_buf(),
            codex_cmd: "codex".to_string(),
            claude_cmd: "claude".to_string(),
            verify_command: "pytest -q".to_string(),
            ..Settings::default()
        }
    }
}
