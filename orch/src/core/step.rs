//! Step names written to the ledger `step` field.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Pipeline states plus the sub-events recorded alongside them.
///
/// The serialized form is the ledger's `step` value, so renaming a variant is a
/// file-format change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Step {
    #[serde(rename = "INTAKE")]
    Intake,
    #[serde(rename = "PLAN")]
    Plan,
    #[serde(rename = "EXECUTE")]
    Execute,
    #[serde(rename = "VERIFY")]
    Verify,
    #[serde(rename = "FIXLOOP")]
    FixLoop,
    #[serde(rename = "FIX")]
    Fix,
    #[serde(rename = "CODEX_STATUS")]
    CodexStatus,
    #[serde(rename = "REVIEW")]
    Review,
    #[serde(rename = "GATE")]
    Gate,
    #[serde(rename = "PUBLISH")]
    Publish,
    #[serde(rename = "ABORT")]
    Abort,
}

impl Step {
    pub fn as_str(self) -> &'static str {
        match self {
            Step::Intake => "INTAKE",
            Step::Plan => "PLAN",
            Step::Execute => "EXECUTE",
            Step::Verify => "VERIFY",
            Step::FixLoop => "FIXLOOP",
            Step::Fix => "FIX",
            Step::CodexStatus => "CODEX_STATUS",
            Step::Review => "REVIEW",
            Step::Gate => "GATE",
            Step::Publish => "PUBLISH",
            Step::Abort => "ABORT",
        }
    }

    /// Successor in the state machine when the step succeeds.
    ///
    /// `Verify` skips `FixLoop` on success; `FixLoop` is only entered through
    /// [`Step::on_failure`].
    pub fn on_success(self) -> Option<Step> {
        match self {
            Step::Intake => Some(Step::Plan),
            Step::Plan => Some(Step::Execute),
            Step::Execute => Some(Step::Verify),
            Step::Verify | Step::FixLoop => Some(Step::Review),
            Step::Review => Some(Step::Gate),
            Step::Gate => Some(Step::Publish),
            Step::Publish | Step::Fix | Step::CodexStatus | Step::Abort => None,
        }
    }

    /// Successor when the step fails without being fatal.
    pub fn on_failure(self) -> Option<Step> {
        match self {
            Step::Verify => Some(Step::FixLoop),
            // Tool failures are recorded and the pipeline moves on.
            Step::Plan | Step::Execute | Step::Review => self.on_success(),
            Step::Intake
            | Step::FixLoop
            | Step::Fix
            | Step::CodexStatus
            | Step::Gate
            | Step::Publish
            | Step::Abort => None,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Main states in order. Sub-events are not part of it.
    const MAIN_STATES: [Step; 8] = [
        Step::Intake,
        Step::Plan,
        Step::Execute,
        Step::Verify,
        Step::FixLoop,
        Step::Review,
        Step::Gate,
        Step::Publish,
    ];

    #[test]
    fn serde_name_matches_as_str() {
        for step in [
            Step::Intake,
            Step::Plan,
            Step::Execute,
            Step::Verify,
            Step::FixLoop,
            Step::Fix,
            Step::CodexStatus,
            Step::Review,
            Step::Gate,
            Step::Publish,
            Step::Abort,
        ] {
            let json = serde_json::to_string(&step).expect("serialize");
            assert_eq!(json, format!("\"{}\"", step.as_str()));
        }
    }

    #[test]
    fn success_path_walks_pipeline_without_fix_loop() {
        let mut visited = vec![Step::Intake];
        let mut current = Step::Intake;
        while let Some(next) = current.on_success() {
            visited.push(next);
            current = next;
        }
        let expected: Vec<Step> = MAIN_STATES
            .into_iter()
            .filter(|step| *step != Step::FixLoop)
            .collect();
        assert_eq!(visited, expected);
    }

    #[test]
    fn only_verify_routes_into_fix_loop() {
        assert_eq!(Step::Verify.on_failure(), Some(Step::FixLoop));
        assert_eq!(Step::FixLoop.on_failure(), None);
        assert_eq!(Step::Gate.on_failure(), None);
        assert_eq!(Step::Plan.on_failure(), Some(Step::Execute));
    }
}
