//! Property descriptors: the inferred (name, type) pairs a record type is built from.

use crate::gateway::{StructuredOutput, ValidationContext};
use crate::models::{DynaschemaError, FieldValue, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Primitive type of an inferred property.
///
/// Closed set: no nesting, no optionals, no lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    String,
    Integer,
    Boolean,
}

impl TypeTag {
    /// Structural default carried by every field of this type.
    pub fn zero_value(self) -> FieldValue {
        match self {
            Self::String => FieldValue::Text(String::new()),
            Self::Integer => FieldValue::Integer(0),
            Self::Boolean => FieldValue::Boolean(true),
        }
    }

    /// JSON Schema `type` keyword for this tag.
    pub fn json_type(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.json_type())
    }
}

/// property name and corresponding type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PropertyDescriptor {
    /// must be snake case
    pub name: String,

    #[serde(rename = "type")]
    pub type_tag: TypeTag,
}

impl PropertyDescriptor {
    /// Create a descriptor, normalizing the name to snake_case.
    pub fn new(name: &str, type_tag: TypeTag) -> Result<Self> {
        let normalized = to_snake_case(name);
        if normalized.is_empty() {
            return Err(DynaschemaError::InvalidProperty(name.to_string()));
        }
        Ok(Self {
            name: normalized,
            type_tag,
        })
    }
}

/// Normalize an arbitrary label to a snake_case identifier.
///
/// Word boundaries are separators, lower→upper transitions and the last
/// capital of an acronym followed by lowercase ("HTTPServer" → "http_server").
/// A leading digit gets a `field_` prefix. Returns an empty string when the
/// input has no alphanumeric characters.
pub fn to_snake_case(raw: &str) -> String {
    let chars: Vec<char> = raw.trim().chars().collect();
    let mut out = String::with_capacity(chars.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            continue;
        }

        if c.is_uppercase() && i > 0 && !out.is_empty() && !out.ends_with('_') {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_numeric() || (prev.is_uppercase() && next_is_lower) {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
    }

    let trimmed = out.trim_end_matches('_');
    match trimmed.chars().next() {
        None => String::new(),
        Some(first) if first.is_numeric() => format!("field_{trimmed}"),
        Some(_) => trimmed.to_string(),
    }
}

/// Convert a concept label to a PascalCase type name fragment.
pub fn to_pascal_case(raw: &str) -> String {
    to_snake_case(raw)
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Properties needed to capture a concept, as returned by schema inference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SchemaProposal {
    /// all properties needed to capture every given detail, each with a unique snake case name
    pub custom_properties: Vec<PropertyDescriptor>,
}

impl SchemaProposal {
    /// Normalize names and enforce uniqueness within the sequence.
    pub fn normalized(self) -> Result<Vec<PropertyDescriptor>> {
        let mut seen = HashSet::new();
        let mut properties = Vec::with_capacity(self.custom_properties.len());

        for property in self.custom_properties {
            let property = PropertyDescriptor::new(&property.name, property.type_tag)?;
            if !seen.insert(property.name.clone()) {
                return Err(DynaschemaError::DuplicateProperty(property.name));
            }
            properties.push(property);
        }

        Ok(properties)
    }
}

impl StructuredOutput for SchemaProposal {
    fn validate(self, _context: &ValidationContext) -> std::result::Result<Self, String> {
        let custom_properties = self.normalized().map_err(|e| e.to_string())?;
        Ok(Self { custom_properties })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_case_normalization() {
        assert_eq!(to_snake_case("age"), "age");
        assert_eq!(to_snake_case("firstName"), "first_name");
        assert_eq!(to_snake_case("First Name"), "first_name");
        assert_eq!(to_snake_case("  Job Title "), "job_title");
        assert_eq!(to_snake_case("years-of-service"), "years_of_service");
        assert_eq!(to_snake_case("HTTPServer"), "http_server");
        assert_eq!(to_snake_case("userID"), "user_id");
        assert_eq!(to_snake_case("is_retired"), "is_retired");
        assert_eq!(to_snake_case("start__age"), "start_age");
        assert_eq!(to_snake_case("2nd place"), "field_2nd_place");
        assert_eq!(to_snake_case("!!!"), "");
    }

    #[test]
    fn test_snake_case_is_idempotent() {
        for raw in ["firstName", "HTTPServer", "Years of Service", "userID"] {
            let once = to_snake_case(raw);
            assert_eq!(to_snake_case(&once), once);
        }
    }

    #[test]
    fn test_pascal_case() {
        assert_eq!(to_pascal_case("person"), "Person");
        assert_eq!(to_pascal_case("job posting"), "JobPosting");
        assert_eq!(to_pascal_case("userAccount"), "UserAccount");
    }

    #[test]
    fn test_descriptor_rejects_empty_name() {
        let err = PropertyDescriptor::new("--", TypeTag::String).unwrap_err();
        assert!(matches!(err, DynaschemaError::InvalidProperty(_)));
    }

    #[test]
    fn test_type_tag_wire_format() {
        let descriptor: PropertyDescriptor =
            serde_json::from_str(r#"{"name": "age", "type": "integer"}"#).unwrap();
        assert_eq!(descriptor.type_tag, TypeTag::Integer);

        let bad = serde_json::from_str::<PropertyDescriptor>(r#"{"name": "tags", "type": "list"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_zero_values() {
        assert_eq!(TypeTag::String.zero_value(), FieldValue::Text(String::new()));
        assert_eq!(TypeTag::Integer.zero_value(), FieldValue::Integer(0));
        assert_eq!(TypeTag::Boolean.zero_value(), FieldValue::Boolean(true));
    }

    #[test]
    fn test_proposal_rejects_duplicates_after_normalization() {
        let proposal = SchemaProposal {
            custom_properties: vec![
                PropertyDescriptor {
                    name: "firstName".to_string(),
                    type_tag: TypeTag::String,
                },
                PropertyDescriptor {
                    name: "first_name".to_string(),
                    type_tag: TypeTag::String,
                },
            ],
        };
        let err = proposal.validate(&ValidationContext::default()).unwrap_err();
        assert!(err.contains("first_name"));
    }

    #[test]
    fn test_proposal_normalizes_names() {
        let proposal = SchemaProposal {
            custom_properties: vec![
                PropertyDescriptor {
                    name: "Full Name".to_string(),
                    type_tag: TypeTag::String,
                },
                PropertyDescriptor {
                    name: "isRetired".to_string(),
                    type_tag: TypeTag::Boolean,
                },
            ],
        };
        let proposal = proposal.validate(&ValidationContext::default()).unwrap();
        let names: Vec<&str> = proposal
            .custom_properties
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["full_name", "is_retired"]);
    }
}
