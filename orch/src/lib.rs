//! Audited AI-assisted change pipeline.
//!
//! Takes a feature description and drives it through plan, execute, verify,
//! a bounded fix loop, review, gate and publish. Each step writes an artifact
//! under `runs/<run_id>/` and appends one record to that run's `ledger.jsonl`.
//!
//! - **[`core`]**: Pure logic (step transitions, record shapes, allowlist,
//!   prompts, status parsing). No I/O.
//! - **[`io`]**: Settings, subprocesses, the ledger file, the run directory.
//! - **[`pipeline`]**: The state machine that coordinates both.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
