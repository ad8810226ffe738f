//! Validation for supervisor configuration values.

use fusevisor_common::{SupervisorError, SupervisorResult};
use std::path::Path;

/// Validate a program name or path.
///
/// Bare names are looked up on `PATH` at spawn time and only checked for
/// emptiness. Anything containing a `/` must name an existing regular file.
pub fn validate_executable(program: &str) -> SupervisorResult<()> {
    if program.trim().is_empty() {
        return Err(SupervisorError::configuration("program cannot be empty"));
    }

    if program.contains('/') {
        let path = Path::new(program);
        if !path.is_file() {
            return Err(SupervisorError::configuration(format!(
                "program '{program}' does not exist or is not a file"
            )));
        }
    }

    Ok(())
}

/// Validate a supervisor identifier used in logs and errors.
pub fn validate_mount_id(id: &str) -> SupervisorResult<()> {
    if id.is_empty() {
        return Err(SupervisorError::configuration("mount id cannot be empty"));
    }

    if !id.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') {
        return Err(SupervisorError::configuration(format!(
            "mount id '{id}' can only contain alphanumeric characters, hyphens, and underscores"
        )));
    }

    Ok(())
}
