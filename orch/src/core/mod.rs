//! Pure pipeline logic: step names, record shapes, command policy, prompt
//! rendering and status parsing.
//!
//! Nothing in here touches the filesystem or spawns processes.

pub mod allowlist;
pub mod feature;
pub mod prompt;
pub mod record;
pub mod status;
pub mod step;
