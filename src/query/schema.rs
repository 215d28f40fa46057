//! Field Schema Registry
//!
//! The single source of truth for which fields an expression may
//! reference, which storage column each maps to, and which operators are
//! legal for it. Built once on first use, read-only afterwards, so it is
//! thread-safe by construction. Both the parser (unknown-identifier
//! rejection) and the compiler (column mapping, operator legality)
//! consult this table; operator/type legality is decided nowhere else.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Value type of a queryable field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Int,
    Float,
    Time,
    Json,
}

/// Definition of one queryable field
#[derive(Debug, Clone)]
pub struct FieldDefinition {
    /// Name as written in expressions
    pub name: &'static str,
    /// Storage column the field maps to
    pub column: &'static str,
    /// Value type, drives operator translation
    pub field_type: FieldType,
    /// Operators the compiler may emit for this field
    pub operators: &'static [&'static str],
}

impl FieldDefinition {
    /// Whether the compiler may emit `op` for this field
    pub fn allows(&self, op: &str) -> bool {
        self.operators.contains(&op)
    }
}

const STRING_OPS: &[&str] = &["==", "!=", "in", "contains", "startsWith", "endsWith"];
const TEXT_OPS: &[&str] = &[
    "==",
    "!=",
    "in",
    "contains",
    "startsWith",
    "endsWith",
    "matches",
];
const NUMERIC_OPS: &[&str] = &["==", "!=", ">", ">=", "<", "<=", "in"];
const TIME_OPS: &[&str] = &["==", "!=", ">", ">=", "<", "<="];
const JSON_OPS: &[&str] = &["==", "!=", "contains", "startsWith", "endsWith"];

fn build_registry() -> HashMap<&'static str, FieldDefinition> {
    let defs = [
        FieldDefinition {
            name: "level",
            column: "level",
            field_type: FieldType::String,
            operators: STRING_OPS,
        },
        FieldDefinition {
            name: "message",
            column: "message",
            field_type: FieldType::String,
            operators: TEXT_OPS,
        },
        FieldDefinition {
            name: "source",
            column: "source",
            field_type: FieldType::String,
            operators: TEXT_OPS,
        },
        FieldDefinition {
            name: "type",
            column: "type",
            field_type: FieldType::String,
            operators: STRING_OPS,
        },
        FieldDefinition {
            name: "agent_id",
            column: "agent_id",
            field_type: FieldType::String,
            operators: STRING_OPS,
        },
        FieldDefinition {
            name: "file_path",
            column: "file_path",
            field_type: FieldType::String,
            operators: TEXT_OPS,
        },
        FieldDefinition {
            name: "timestamp",
            column: "timestamp",
            field_type: FieldType::Time,
            operators: TIME_OPS,
        },
        FieldDefinition {
            name: "http_status",
            column: "http_status",
            field_type: FieldType::Int,
            operators: NUMERIC_OPS,
        },
        FieldDefinition {
            name: "http_method",
            column: "http_method",
            field_type: FieldType::String,
            operators: STRING_OPS,
        },
        FieldDefinition {
            name: "uri",
            column: "uri",
            field_type: FieldType::String,
            operators: TEXT_OPS,
        },
        // JSON-encoded text columns; expressions reach into them with
        // member access (fields.x, labels.x) only.
        FieldDefinition {
            name: "fields",
            column: "fields",
            field_type: FieldType::Json,
            operators: JSON_OPS,
        },
        FieldDefinition {
            name: "labels",
            column: "labels",
            field_type: FieldType::Json,
            operators: JSON_OPS,
        },
    ];

    defs.into_iter().map(|d| (d.name, d)).collect()
}

fn registry() -> &'static HashMap<&'static str, FieldDefinition> {
    static REGISTRY: OnceLock<HashMap<&'static str, FieldDefinition>> = OnceLock::new();
    REGISTRY.get_or_init(build_registry)
}

/// Look up a field definition by expression name
pub fn lookup(name: &str) -> Option<&'static FieldDefinition> {
    registry().get(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_fields() {
        for name in [
            "level",
            "message",
            "source",
            "type",
            "agent_id",
            "file_path",
            "timestamp",
            "http_status",
            "http_method",
            "uri",
            "fields",
            "labels",
        ] {
            assert!(lookup(name).is_some(), "missing field {name}");
        }
    }

    #[test]
    fn test_lookup_unknown_field() {
        assert!(lookup("password").is_none());
        assert!(lookup("LEVEL").is_none());
    }

    #[test]
    fn test_operator_legality() {
        let level = lookup("level").unwrap();
        assert!(level.allows("=="));
        assert!(level.allows("in"));
        assert!(!level.allows(">"));
        assert!(!level.allows("matches"));

        let status = lookup("http_status").unwrap();
        assert!(status.allows(">="));
        assert!(!status.allows("contains"));

        let message = lookup("message").unwrap();
        assert!(message.allows("matches"));

        let ts = lookup("timestamp").unwrap();
        assert!(ts.allows("<"));
        assert!(!ts.allows("in"));
    }

    #[test]
    fn test_json_fields() {
        for name in ["fields", "labels"] {
            let def = lookup(name).unwrap();
            assert_eq!(def.field_type, FieldType::Json);
            assert!(def.allows("=="));
            assert!(!def.allows(">"));
        }
    }
}
