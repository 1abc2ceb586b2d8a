//! Parser for the codex `/status` usage report.
//!
//! The report is a short block of labeled lines:
//!
//! ```text
//! Model: gpt-5.2-codex
//! Input tokens: 1200
//! Output tokens: 300
//! Total tokens: 1500
//! Cost (USD): $0.003
//! Elapsed: 0.2s
//! ```
//!
//! Every field is located independently. A missing or malformed line leaves
//! only that field empty.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static MODEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^Model:[ \t]*(?P<v>.+?)[ \t]*\r?$").unwrap());
static INPUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^Input tokens:[ \t]*(?P<v>\d+)[ \t]*\r?$").unwrap());
static OUTPUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^Output tokens:[ \t]*(?P<v>\d+)[ \t]*\r?$").unwrap());
static TOTAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^Total tokens:[ \t]*(?P<v>\d+)[ \t]*\r?$").unwrap());
static COST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^Cost \(USD\):[ \t]*\$?(?P<v>[0-9.]+)[ \t]*\r?$").unwrap()
});
static ELAPSED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^Elapsed:[ \t]*(?P<v>[0-9.]+)s[ \t]*\r?$").unwrap());

/// Parsed usage metrics. This is the `parsed` object in the ledger and the
/// content of `usage/codex-status-<label>.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageMetrics {
    pub model: Option<String>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
    pub cost_usd: Option<f64>,
    pub elapsed_s: Option<f64>,
}

/// A status report together with the text it was parsed from.
#[derive(Debug, Clone, PartialEq)]
pub struct CodexStatus {
    pub raw: String,
    pub metrics: UsageMetrics,
}

impl CodexStatus {
    pub fn parse(text: &str) -> Self {
        let metrics = UsageMetrics {
            model: capture(&MODEL_RE, text)
                .map(str::trim)
                .filter(|model| !model.is_empty())
                .map(str::to_string),
            input_tokens: capture_parsed(&INPUT_RE, text),
            output_tokens: capture_parsed(&OUTPUT_RE, text),
            total_tokens: capture_parsed(&TOTAL_RE, text),
            cost_usd: capture_parsed(&COST_RE, text),
            elapsed_s: capture_parsed(&ELAPSED_RE, text),
        };
        Self {
            raw: text.to_string(),
            metrics,
        }
    }
}

fn capture<'t>(re: &Regex, text: &'t str) -> Option<&'t str> {
    re.captures(text)
        .and_then(|caps| caps.name("v"))
        .map(|m| m.as_str())
}

// A value the pattern accepted but the number type rejects (e.g. "1.2.3" or an
// overflowing count) is reported as absent.
fn capture_parsed<T: FromStr>(re: &Regex, text: &str) -> Option<T> {
    capture(re, text).and_then(|v| v.parse().ok())
}
