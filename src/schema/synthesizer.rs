//! Schema synthesizer.
//!
//! Turns a sequence of property descriptors into a `RecordType`. Purely
//! structural: names and types are not judged for plausibility.

use crate::models::{
    DynaschemaError, FieldDefinition, PropertyDescriptor, RecordType, Result, to_pascal_case,
    to_snake_case,
};
use std::collections::HashSet;
use tracing::debug;

/// Build a record type named `name` with one field per descriptor.
///
/// Field order follows the descriptors. Each call mints a new type identity,
/// even for identical input.
///
/// # Errors
///
/// - `EmptySchema` if `descriptors` is empty
/// - `InvalidProperty` if a name has no identifier characters
/// - `DuplicateProperty` if two names normalize to the same identifier
pub fn synthesize(name: &str, descriptors: &[PropertyDescriptor]) -> Result<RecordType> {
    if descriptors.is_empty() {
        return Err(DynaschemaError::EmptySchema {
            concept: name.to_string(),
        });
    }

    let mut seen = HashSet::with_capacity(descriptors.len());
    let mut fields = Vec::with_capacity(descriptors.len());

    for descriptor in descriptors {
        let field_name = to_snake_case(&descriptor.name);
        if field_name.is_empty() {
            return Err(DynaschemaError::InvalidProperty(descriptor.name.clone()));
        }
        if !seen.insert(field_name.clone()) {
            return Err(DynaschemaError::DuplicateProperty(field_name));
        }
        fields.push(FieldDefinition {
            name: field_name,
            type_tag: descriptor.type_tag,
            default: descriptor.type_tag.zero_value(),
        });
    }

    let record_type = RecordType::from_fields(name.to_string(), fields);
    debug!(
        record_type = record_type.name(),
        id = %record_type.id(),
        fields = ?record_type.field_names().collect::<Vec<_>>(),
        "Synthesized record type"
    );
    Ok(record_type)
}

/// Type name used for records of a concept ("job posting" → "JobPostingRecord").
pub fn record_type_name(concept: &str) -> String {
    let base = to_pascal_case(concept);
    if base.is_empty() {
        "DataRecord".to_string()
    } else {
        format!("{base}Record")
    }
}
