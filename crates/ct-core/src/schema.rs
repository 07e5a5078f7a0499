//! JSON Schema generation for configuration, checkpoint, and output types.
//!
//! ```bash
//! ct-core config schema --list
//! ct-core config schema PolicyState
//! ct-core config schema --all
//! ```

use schemars::schema_for;
use serde_json::Value;
use std::collections::BTreeMap;

pub use crate::context::PatientProfile;
pub use crate::engine::{Decision, PolicyState};
pub use crate::evaluator::EvaluationSummary;
pub use crate::gate::GateDecision;
pub use crate::round::RoundRecord;
pub use crate::safety::EligibleSet;
pub use crate::stats::ArmStats;
pub use ct_config::{ActionSpaceConfig, PolicyConfig};

/// Available schema types with their descriptions.
pub fn available_schemas() -> Vec<(&'static str, &'static str)> {
    vec![
        // Configuration
        ("PolicyConfig", "Bandit strategy, safety caps, and reward weights"),
        ("ActionSpaceConfig", "Time bins, clinic hours, and drug profiles"),
        // Inputs
        ("PatientProfile", "Raw patient covariates before encoding"),
        // Decisions
        ("EligibleSet", "Arms that passed the safety filter, with exclusions"),
        ("GateDecision", "Recommended arm or standard-of-care override"),
        ("Decision", "Administration time chosen for one round"),
        // Audit and evaluation
        ("RoundRecord", "Closed round with outcome and reward"),
        ("EvaluationSummary", "Cumulative reward, regret, and arm counts"),
        // Checkpoint
        ("ArmStats", "Sufficient statistics of one arm"),
        ("PolicyState", "Serialized engine checkpoint"),
    ]
}

/// Generate JSON Schema for a type by name.
///
/// Returns None if the type is unknown.
pub fn generate_schema(type_name: &str) -> Option<Value> {
    let schema = match type_name {
        "PolicyConfig" => schema_for!(PolicyConfig),
        "ActionSpaceConfig" => schema_for!(ActionSpaceConfig),
        "PatientProfile" => schema_for!(PatientProfile),
        "EligibleSet" => schema_for!(EligibleSet),
        "GateDecision" => schema_for!(GateDecision),
        "Decision" => schema_for!(Decision),
        "RoundRecord" => schema_for!(RoundRecord),
        "EvaluationSummary" => schema_for!(EvaluationSummary),
        "ArmStats" => schema_for!(ArmStats),
        "PolicyState" => schema_for!(PolicyState),
        _ => return None,
    };
    serde_json::to_value(schema).ok()
}

/// Generate all schemas as a map from type name to schema.
pub fn generate_all_schemas() -> BTreeMap<String, Value> {
    available_schemas()
        .into_iter()
        .filter_map(|(name, _)| generate_schema(name).map(|s| (name.to_string(), s)))
        .collect()
}

/// Schema output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaFormat {
    /// Pretty-printed JSON (default)
    Json,
    /// Compact single-line JSON
    JsonCompact,
}

/// Format a schema value for output.
pub fn format_schema(schema: &Value, format: SchemaFormat) -> serde_json::Result<String> {
    match format {
        SchemaFormat::Json => serde_json::to_string_pretty(schema),
        SchemaFormat::JsonCompact => serde_json::to_string(schema),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_schemas_generate() {
        for (name, _desc) in available_schemas() {
            assert!(
                generate_schema(name).is_some(),
                "Schema for '{}' should generate",
                name
            );
        }
    }

    #[test]
    fn test_unknown_schema_returns_none() {
        assert!(generate_schema("UnknownType").is_none());
        assert!(generate_schema("").is_none());
    }

    #[test]
    fn test_policy_state_schema_names_its_fields() {
        let schema = generate_schema("PolicyState").unwrap();
        let props = schema.get("properties").expect("object schema");
        for field in ["epoch", "strategy", "arms", "rounds_issued"] {
            assert!(props.get(field).is_some(), "missing {}", field);
        }
    }

    #[test]
    fn test_generate_all_schemas() {
        let all = generate_all_schemas();
        assert_eq!(all.len(), available_schemas().len());
        assert!(all.contains_key("Decision"));
        assert!(all.contains_key("PolicyConfig"));
    }

    #[test]
    fn test_format_schema() {
        let schema = generate_schema("GateDecision").unwrap();
        let pretty = format_schema(&schema, SchemaFormat::Json).unwrap();
        let compact = format_schema(&schema, SchemaFormat::JsonCompact).unwrap();
        assert!(pretty.contains('\n'));
        assert!(!compact.contains('\n'));
    }
}
