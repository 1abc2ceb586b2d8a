//! Stable exit codes for orch CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Unclassified failure (I/O, tool launch, timeout).
pub const FAILED: i32 = 1;
/// Invalid settings, invalid feature id, or missing feature document.
pub const CONFIG: i32 = 2;
/// A command was refused by the allowlist.
pub const POLICY: i32 = 3;
/// Verification never passed within `max_fix_iterations`.
pub const FIX_LOOP_EXHAUSTED: i32 = 4;
/// The gate found no passing verification in the ledger.
pub const GATE: i32 = 5;
