//! Schema versioning for persisted documents.

/// Current schema version for configuration files and policy checkpoints.
///
/// Bump on any breaking change to the serialized shape.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Returns true if `version` can be read by this build.
///
/// Only the major component has to match.
pub fn is_compatible(version: &str) -> bool {
    major(version).is_some() && major(version) == major(SCHEMA_VERSION)
}

fn major(version: &str) -> Option<u32> {
    version.split('.').next()?.parse().ok()
}
