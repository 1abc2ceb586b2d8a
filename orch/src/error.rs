//! Fatal pipeline errors.
//!
//! These travel inside `anyhow::Error` and are recovered with `downcast_ref`
//! where the caller needs to tell them apart (exit codes, tests). Tool calls
//! that merely exit non-zero are not errors; they are recorded in the ledger.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::core::allowlist::PolicyViolation;
use crate::exit_codes;

#[derive(Debug, Error)]
pub enum OrchError {
    #[error("missing feature doc: {}", path.display())]
    MissingFeatureDoc { path: PathBuf },

    #[error("invalid feature id '{id}': {reason}")]
    InvalidFeatureId { id: String, reason: String },

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error(transparent)]
    Policy(#[from] PolicyViolation),

    #[error("command timed out after {timeout:?}: {command}")]
    TimedOut { command: String, timeout: Duration },

    #[error("fix loop exhausted after {iterations} iterations; verification still failing")]
    FixLoopExhausted { iterations: u32 },

    #[error("gate failed: no passing VERIFY recorded")]
    GateFailed,
}

impl OrchError {
    pub fn exit_code(&self) -> i32 {
        match self {
            OrchError::MissingFeatureDoc { .. }
            | OrchError::InvalidFeatureId { .. }
            | OrchError::InvalidSettings(_) => exit_codes::CONFIG,
            OrchError::Policy(_) => exit_codes::POLICY,
            OrchError::FixLoopExhausted { .. } => exit_codes::FIX_LOOP_EXHAUSTED,
            OrchError::GateFailed => exit_codes::GATE,
            OrchError::TimedOut { .. } => exit_codes::FAILED,
        }
    }
}

/// Map any error to the process exit code.
///
/// An `OrchError` attached as context counts as well as one in the source chain.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(orch) = err.downcast_ref::<OrchError>() {
        return orch.exit_code();
    }
    err.chain()
        .find_map(|cause| cause.downcast_ref::<OrchError>())
        .map(OrchError::exit_code)
        .or_else(|| {
            err.chain()
                .find_map(|cause| cause.downcast_ref::<PolicyViolation>())
                .map(|_| exit_codes::POLICY)
        })
        .unwrap_or(exit_codes::FAILED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn exit_code_survives_context_wrapping() {
        let err = Err::<(), _>(OrchError::GateFailed)
            .context("run F-001")
            .unwrap_err();
        assert_eq!(exit_code_for(&err), exit_codes::GATE);
    }

    #[test]
    fn policy_violation_maps_to_policy_code() {
        let err = anyhow::Error::new(OrchError::from(PolicyViolation::Empty));
        assert_eq!(exit_code_for(&err), exit_codes::POLICY);
        let bare = anyhow::Error::new(PolicyViolation::Empty);
        assert_eq!(exit_code_for(&bare), exit_codes::POLICY);
    }

    #[test]
    fn unclassified_errors_map_to_failed() {
        let err = anyhow::anyhow!("disk full");
        assert_eq!(exit_code_for(&err), exit_codes::FAILED);
    }
}
