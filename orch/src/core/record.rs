//! Typed ledger records.
//!
//! Each pipeline step appends one of a closed set of record shapes. The open
//! JSON-lines form (`ts`, `step`, then step-specific fields) only exists at the
//! persistence boundary, see [`LedgerEntry::to_json_line`].

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::status::UsageMetrics;
use crate::core::step::Step;

/// Field holding the append timestamp. It overrides any same-named record field.
pub const TS_FIELD: &str = "ts";

/// External AI tool invoked by a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    Codex,
    Claude,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntakeRecord {
    pub feature_id: String,
    pub run_id: String,
    /// Copied feature document; `None` on the record that opens the run.
    pub artifact: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusCaptureRecord {
    pub label: String,
    pub returncode: i32,
    pub raw_path: PathBuf,
    pub parsed: UsageMetrics,
}

/// Outcome of a PLAN, EXECUTE or REVIEW tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRecord {
    pub tool: ToolKind,
    pub returncode: i32,
    pub ok: bool,
    pub stdout_path: PathBuf,
    pub stderr: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyRecord {
    pub command: String,
    pub returncode: i32,
    pub stdout_path: PathBuf,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_fix_iteration: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixLoopRecord {
    pub iteration: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixRecord {
    pub tool: ToolKind,
    pub iteration: u32,
    pub returncode: i32,
    pub ok: bool,
    pub stdout_path: PathBuf,
    pub stderr: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateRecord {
    pub ok: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishRecord {
    pub report_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbortRecord {
    pub during: Step,
    pub error: String,
}

/// One ledger line without its timestamp. The serde tag is the `step` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step")]
pub enum LedgerRecord {
    #[serde(rename = "INTAKE")]
    Intake(IntakeRecord),
    #[serde(rename = "CODEX_STATUS")]
    CodexStatus(StatusCaptureRecord),
    #[serde(rename = "PLAN")]
    Plan(ToolRecord),
    #[serde(rename = "EXECUTE")]
    Execute(ToolRecord),
    #[serde(rename = "VERIFY")]
    Verify(VerifyRecord),
    #[serde(rename = "FIXLOOP")]
    FixLoop(FixLoopRecord),
    #[serde(rename = "FIX")]
    Fix(FixRecord),
    #[serde(rename = "REVIEW")]
    Review(ToolRecord),
    #[serde(rename = "GATE")]
    Gate(GateRecord),
    #[serde(rename = "PUBLISH")]
    Publish(PublishRecord),
    #[serde(rename = "ABORT")]
    Abort(AbortRecord),
}

impl LedgerRecord {
    pub fn step(&self) -> Step {
        match self {
            LedgerRecord::Intake(_) => Step::Intake,
            LedgerRecord::CodexStatus(_) => Step::CodexStatus,
            LedgerRecord::Plan(_) => Step::Plan,
            LedgerRecord::Execute(_) => Step::Execute,
            LedgerRecord::Verify(_) => Step::Verify,
            LedgerRecord::FixLoop(_) => Step::FixLoop,
            LedgerRecord::Fix(_) => Step::Fix,
            LedgerRecord::Review(_) => Step::Review,
            LedgerRecord::Gate(_) => Step::Gate,
            LedgerRecord::Publish(_) => Step::Publish,
            LedgerRecord::Abort(_) => Step::Abort,
        }
    }

    /// True for a `VERIFY` record whose outcome flag is set.
    pub fn is_passing_verify(&self) -> bool {
        matches!(self, LedgerRecord::Verify(verify) if verify.ok)
    }
}

/// A record as stored: the append timestamp plus the record fields.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub ts: DateTime<Utc>,
    pub record: LedgerRecord,
}

impl LedgerEntry {
    /// Serialize to one JSON object without a trailing newline.
    pub fn to_json_line(&self) -> Result<String> {
        let value = serde_json::to_value(&self.record).context("serialize ledger record")?;
        let Value::Object(mut fields) = value else {
            return Err(anyhow!("ledger record did not serialize to an object"));
        };
        fields.insert(
            TS_FIELD.to_string(),
            Value::String(self.ts.to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        serde_json::to_string(&Value::Object(fields)).context("serialize ledger line")
    }

    pub fn from_json_line(line: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(line).context("parse ledger line")?;
        let Value::Object(mut fields) = value else {
            return Err(anyhow!("ledger line is not a JSON object"));
        };
        let ts = match fields.remove(TS_FIELD) {
            Some(Value::String(ts)) => DateTime::parse_from_rfc3339(&ts)
                .with_context(|| format!("parse ledger timestamp '{ts}'"))?
                .with_timezone(&Utc),
            Some(other) => return Err(anyhow!("ledger timestamp is not a string: {other}")),
            None => return Err(anyhow!("ledger line missing '{TS_FIELD}'")),
        };
        let record = serde_json::from_value(Value::Object(fields)).context("decode ledger record")?;
        Ok(Self { ts, record })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn verify_line_has_flat_fields() {
        let entry = LedgerEntry {
            ts: at_noon(),
            record: LedgerRecord::Verify(VerifyRecord {
                command: "python -m pytest -q".to_string(),
                returncode: 0,
                stdout_path: PathBuf::from("runs/F-1/verify/pytest.txt"),
                ok: true,
                after_fix_iteration: None,
            }),
        };
        let line = entry.to_json_line().expect("serialize");
        let value: Value = serde_json::from_str(&line).expect("json");
        assert_eq!(value["step"], "VERIFY");
        assert_eq!(value["ok"], true);
        assert_eq!(value["returncode"], 0);
        assert_eq!(value["ts"], "2026-10-15T12:00:00.000000Z");
        assert!(value.get("after_fix_iteration").is_none());
        assert!(!line.contains('\n'));
    }

    #[test]
    fn status_capture_nests_parsed_metrics() {
        let entry = LedgerEntry {
            ts: at_noon(),
            record: LedgerRecord::CodexStatus(StatusCaptureRecord {
                label: "pre-plan".to_string(),
                returncode: 0,
                raw_path: PathBuf::from("usage/codex-status-pre-plan.txt"),
                parsed: UsageMetrics {
                    model: Some("gpt".to_string()),
                    total_tokens: Some(10),
                    ..UsageMetrics::default()
                },
            }),
        };
        let value: Value =
            serde_json::from_str(&entry.to_json_line().expect("serialize")).expect("json");
        assert_eq!(value["step"], "CODEX_STATUS");
        assert_eq!(value["parsed"]["model"], "gpt");
        assert_eq!(value["parsed"]["total_tokens"], 10);
        assert!(value["parsed"]["cost_usd"].is_null());
    }

    #[test]
    fn lines_decode_back_to_typed_entries() {
        let entry = LedgerEntry {
            ts: at_noon(),
            record: LedgerRecord::Fix(FixRecord {
                tool: ToolKind::Claude,
                iteration: 2,
                returncode: 1,
                ok: false,
                stdout_path: PathBuf::from("fix/claude-fix-2.txt"),
                stderr: "boom".to_string(),
            }),
        };
        let decoded =
            LedgerEntry::from_json_line(&entry.to_json_line().expect("serialize")).expect("decode");
        assert_eq!(decoded, entry);
        assert_eq!(decoded.record.step(), Step::Fix);
    }

    #[test]
    fn decoding_requires_timestamp() {
        let err = LedgerEntry::from_json_line(r#"{"step":"GATE","ok":true}"#).unwrap_err();
        assert!(err.to_string().contains("missing 'ts'"));
    }

    #[test]
    fn only_true_verify_counts_as_passing() {
        let verify = |ok: bool| {
            LedgerRecord::Verify(VerifyRecord {
                command: "pytest".to_string(),
                returncode: i32::from(!ok),
                stdout_path: PathBuf::from("verify/pytest.txt"),
                ok,
                after_fix_iteration: Some(1),
            })
        };
        assert!(verify(true).is_passing_verify());
        assert!(!verify(false).is_passing_verify());
        assert!(!LedgerRecord::Gate(GateRecord { ok: true }).is_passing_verify());
    }
}
