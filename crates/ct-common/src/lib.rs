//! Chronotherapy policy core common types, IDs, and errors.
//!
//! This crate provides foundational types shared across ct-core modules:
//! - Round, arm, patient, and stream identifiers
//! - Schema versioning
//! - Common error types
//! - Output format specifications

pub mod error;
pub mod id;
pub mod output;
pub mod schema;

pub use error::{format_error_human, Error, ErrorCategory, Result, StructuredError, SuggestedAction};
pub use id::{ArmId, PatientId, RoundId, StreamId};
pub use output::OutputFormat;
pub use schema::SCHEMA_VERSION;
