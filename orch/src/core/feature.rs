//! Feature and run identifiers.

use chrono::{DateTime, TimeZone};

use crate::error::OrchError;

/// Feature ids name a directory under the features dir, so they are restricted
/// to `[A-Za-z0-9._-]` and may not be `.` or `..`.
pub fn validate_feature_id(id: &str) -> Result<(), OrchError> {
    let invalid = |reason: &str| OrchError::InvalidFeatureId {
        id: id.to_string(),
        reason: reason.to_string(),
    };
    if id.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if id == "." || id == ".." {
        return Err(invalid("must not be a relative path component"));
    }
    if id
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'))
    {
        return Err(invalid("must be [A-Za-z0-9._-] only"));
    }
    Ok(())
}

/// `<feature_id>-<YYYYmmdd-HHMMSS>` in the given clock's zone.
pub fn run_id_for<Tz: TimeZone>(feature_id: &str, started: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("{feature_id}-{}", started.format("%Y%m%d-%H%M%S"))
}

/// Candidate run id when `base` is already taken; `attempt` starts at 2.
pub fn disambiguate_run_id(base: &str, attempt: u32) -> String {
    format!("{base}-{attempt}")
}
