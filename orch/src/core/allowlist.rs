//! Shell command allowlist.
//!
//! A command may run when at least one configured regular expression finds a
//! match in it. Matching is a search over the whole trimmed command rather than
//! a match against its first word, so `^`-anchored patterns bind to the start
//! of the string while unanchored patterns can be satisfied by any clause of a
//! compound command.

use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

/// A command refused by [`CommandAllowlist::check`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("empty command")]
    Empty,
    #[error("command is not valid shell syntax. Refusing to run: {command}")]
    Malformed { command: String },
    #[error("command is not in allowlist. Refusing to run: {command}")]
    NotAllowed { command: String },
}

/// Invalid pattern supplied while building an allowlist.
#[derive(Debug, Error)]
#[error("invalid allowlist pattern '{pattern}': {source}")]
pub struct PatternError {
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

/// Ordered set of compiled command rules.
#[derive(Debug, Clone)]
pub struct CommandAllowlist {
    patterns: Vec<Regex>,
}

impl CommandAllowlist {
    pub fn from_patterns<I, S>(patterns: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                Regex::new(pattern).map_err(|source| PatternError {
                    pattern: pattern.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(Regex::as_str)
    }

    /// Decide whether `command` may be handed to a shell.
    ///
    /// The command is trimmed, must split into shell words (unbalanced quotes
    /// are refused before any pattern runs), and must be matched by some rule.
    pub fn check(&self, command: &str) -> Result<(), PolicyViolation> {
        let command = command.trim();
        if command.is_empty() {
            warn!("refusing empty command");
            return Err(PolicyViolation::Empty);
        }

        if shlex::split(command).is_none() {
            warn!(command, "refusing command with malformed quoting");
            return Err(PolicyViolation::Malformed {
                command: command.to_string(),
            });
        }

        if let Some(rule) = self.patterns.iter().find(|rule| rule.is_match(command)) {
            debug!(command, rule = rule.as_str(), "command allowed");
            return Ok(());
        }

        warn!(command, "command not in allowlist");
        Err(PolicyViolation::NotAllowed {
            command: command.to_string(),
        })
    }
}
