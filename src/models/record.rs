//! Runtime record types and their instances.
//!
//! A `RecordType` is a schema built from data at run time: an ordered list of
//! named, typed fields. Instances hold `FieldValue`s and are checked against
//! their type when parsed, with typed accessors validated again at read time.

use crate::models::{DynaschemaError, Result, TypeTag};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// A primitive field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Boolean(bool),
}

impl FieldValue {
    /// Type tag of this value.
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Self::Text(_) => TypeTag::String,
            Self::Integer(_) => TypeTag::Integer,
            Self::Boolean(_) => TypeTag::Boolean,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Coerce a JSON value into a field of the given type.
    ///
    /// Lenient in the way model output needs: integral floats and numeric
    /// strings are integers; `0/1` and yes/no style strings are booleans.
    /// Text only accepts strings.
    pub fn coerce(type_tag: TypeTag, value: &Value) -> std::result::Result<Self, String> {
        match (type_tag, value) {
            (TypeTag::String, Value::String(s)) => Ok(Self::Text(s.clone())),

            (TypeTag::Integer, Value::Number(n)) => {
                // 2^63 is exactly representable; i64::MAX as f64 rounds up to it.
                const UPPER: f64 = 9_223_372_036_854_775_808.0;
                if let Some(i) = n.as_i64() {
                    Ok(Self::Integer(i))
                } else if n.is_u64() {
                    Err(format!("integer out of range: {n}"))
                } else if let Some(f) = n.as_f64().filter(|f| f.fract() == 0.0 && f.is_finite()) {
                    if (-UPPER..UPPER).contains(&f) {
                        Ok(Self::Integer(f as i64))
                    } else {
                        Err(format!("integer out of range: {n}"))
                    }
                } else {
                    Err(format!("expected integer, got fractional number {n}"))
                }
            }
            (TypeTag::Integer, Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Self::Integer)
                .map_err(|_| format!("expected integer, got string {s:?}")),

            (TypeTag::Boolean, Value::Bool(b)) => Ok(Self::Boolean(*b)),
            (TypeTag::Boolean, Value::Number(n)) => match n.as_i64() {
                Some(0) => Ok(Self::Boolean(false)),
                Some(1) => Ok(Self::Boolean(true)),
                _ => Err(format!("expected boolean, got number {n}")),
            },
            (TypeTag::Boolean, Value::String(s)) => {
                match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "yes" | "on" | "1" => Ok(Self::Boolean(true)),
                    "false" | "no" | "off" | "0" => Ok(Self::Boolean(false)),
                    _ => Err(format!("expected boolean, got string {s:?}")),
                }
            }

            (expected, other) => Err(format!("expected {expected}, got {}", json_kind(other))),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Boolean(b) => write!(f, "{b}"),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One field of a synthesized record type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDefinition {
    pub name: String,
    pub type_tag: TypeTag,
    pub default: FieldValue,
}

/// A record type synthesized at run time.
///
/// K_i: Field names are unique, non-empty and in descriptor order.
///
/// Every synthesis mints a fresh identity, so two types with equal field
/// layouts are still distinct types. Records remember the identity of the
/// type that produced them.
#[derive(Debug, Clone)]
pub struct RecordType {
    id: Uuid,
    name: String,
    fields: Vec<FieldDefinition>,
}

impl RecordType {
    /// Built only by the schema synthesizer, which enforces the field invariants.
    pub(crate) fn from_fields(name: String, fields: Vec<FieldDefinition>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            fields,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Instance with every field at its structural default.
    pub fn default_instance(&self) -> Record {
        Record {
            type_id: self.id,
            values: self
                .fields
                .iter()
                .map(|f| (f.name.clone(), f.default.clone()))
                .collect(),
        }
    }

    /// JSON Schema for one instance, in strict structured-output form.
    pub fn json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|f| {
                let default = serde_json::to_value(&f.default).unwrap_or(Value::Null);
                (
                    f.name.clone(),
                    json!({ "type": f.type_tag.json_type(), "default": default }),
                )
            })
            .collect();
        let required: Vec<&str> = self.field_names().collect();

        json!({
            "title": self.name,
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    /// Parse model output into an instance of this type.
    ///
    /// Missing fields take their default, unknown keys are ignored, and every
    /// field error is reported in one message.
    pub fn coerce(&self, value: &Value) -> std::result::Result<Record, String> {
        let object = value
            .as_object()
            .ok_or_else(|| format!("expected object, got {}", json_kind(value)))?;

        let mut values = Vec::with_capacity(self.fields.len());
        let mut errors = Vec::new();

        for field in &self.fields {
            match object.get(&field.name) {
                None => values.push((field.name.clone(), field.default.clone())),
                Some(raw) => match FieldValue::coerce(field.type_tag, raw) {
                    Ok(v) => values.push((field.name.clone(), v)),
                    Err(e) => errors.push(format!("{}: {e}", field.name)),
                },
            }
        }

        if !errors.is_empty() {
            return Err(errors.join("; "));
        }

        Ok(Record {
            type_id: self.id,
            values,
        })
    }
}

/// An instance of a `RecordType`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    type_id: Uuid,
    values: Vec<(String, FieldValue)>,
}

impl Record {
    /// Identity of the record type this instance conforms to.
    pub fn type_id(&self) -> Uuid {
        self.type_id
    }

    /// Whether this record was produced by the given type.
    pub fn is_instance_of(&self, record_type: &RecordType) -> bool {
        self.type_id == record_type.id()
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values
            .iter()
            .find_map(|(name, value)| (name == field).then_some(value))
    }

    /// Field values in type order.
    pub fn values(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn text(&self, field: &str) -> Result<&str> {
        let value = self.require(field)?;
        value
            .as_text()
            .ok_or_else(|| type_mismatch(field, TypeTag::String, value))
    }

    pub fn integer(&self, field: &str) -> Result<i64> {
        let value = self.require(field)?;
        value
            .as_integer()
            .ok_or_else(|| type_mismatch(field, TypeTag::Integer, value))
    }

    pub fn boolean(&self, field: &str) -> Result<bool> {
        let value = self.require(field)?;
        value
            .as_boolean()
            .ok_or_else(|| type_mismatch(field, TypeTag::Boolean, value))
    }

    /// Flat projection: field name → primitive value.
    pub fn to_map(&self) -> BTreeMap<String, FieldValue> {
        self.values.iter().cloned().collect()
    }

    fn require(&self, field: &str) -> Result<&FieldValue> {
        self.get(field)
            .ok_or_else(|| DynaschemaError::UnknownField(field.to_string()))
    }
}

fn type_mismatch(field: &str, expected: TypeTag, found: &FieldValue) -> DynaschemaError {
    DynaschemaError::FieldType {
        field: field.to_string(),
        expected,
        found: found.type_tag(),
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in &self.values {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PropertyDescriptor, TypeTag};
    use crate::schema::synthesize;

    fn person_type() -> RecordType {
        synthesize(
            "PersonRecord",
            &[
                PropertyDescriptor::new("name", TypeTag::String).unwrap(),
                PropertyDescriptor::new("age", TypeTag::Integer).unwrap(),
                PropertyDescriptor::new("is_retired", TypeTag::Boolean).unwrap(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_coerce_well_typed_object() {
        let person = person_type();
        let record = person
            .coerce(&json!({"name": "Ann", "age": 30, "is_retired": false}))
            .unwrap();

        assert_eq!(record.text("name").unwrap(), "Ann");
        assert_eq!(record.integer("age").unwrap(), 30);
        assert!(!record.boolean("is_retired").unwrap());
        assert!(record.is_instance_of(&person));
    }

    #[test]
    fn test_coerce_lenient_scalars() {
        let person = person_type();
        let record = person
            .coerce(&json!({"name": "Ann", "age": "30", "is_retired": "no"}))
            .unwrap();
        assert_eq!(record.integer("age").unwrap(), 30);
        assert!(!record.boolean("is_retired").unwrap());

        let record = person
            .coerce(&json!({"name": "Bob", "age": 45.0, "is_retired": 1}))
            .unwrap();
        assert_eq!(record.integer("age").unwrap(), 45);
        assert!(record.boolean("is_retired").unwrap());
    }

    #[test]
    fn test_coerce_missing_fields_take_defaults() {
        let person = person_type();
        let record = person.coerce(&json!({"name": "Ann", "nickname": "A"})).unwrap();

        assert_eq!(record.integer("age").unwrap(), 0);
        assert!(record.boolean("is_retired").unwrap());
        assert!(record.get("nickname").is_none());
    }

    #[test]
    fn test_coerce_reports_every_field_error() {
        let person = person_type();
        let err = person
            .coerce(&json!({"name": 7, "age": "thirty", "is_retired": null}))
            .unwrap_err();

        assert!(err.contains("name: expected string, got number"));
        assert!(err.contains("age: expected integer, got string \"thirty\""));
        assert!(err.contains("is_retired: expected boolean, got null"));
    }

    #[test]
    fn test_coerce_rejects_fractional_and_non_objects() {
        let person = person_type();
        assert!(person.coerce(&json!({"age": 30.5})).is_err());
        assert!(person.coerce(&json!(["Ann", 30])).unwrap_err().contains("expected object"));
    }

    #[test]
    fn test_coerce_integer_bounds() {
        let max = FieldValue::coerce(TypeTag::Integer, &json!(i64::MAX)).unwrap();
        assert_eq!(max, FieldValue::Integer(i64::MAX));

        let err = FieldValue::coerce(TypeTag::Integer, &json!(9_223_372_036_854_775_808u64))
            .unwrap_err();
        assert!(err.contains("out of range"));
        assert!(FieldValue::coerce(TypeTag::Integer, &json!(u64::MAX)).is_err());
        assert!(FieldValue::coerce(TypeTag::Integer, &json!(9.223372036854775808e18)).is_err());

        let min = FieldValue::coerce(TypeTag::Integer, &json!(-9.223372036854775808e18)).unwrap();
        assert_eq!(min, FieldValue::Integer(i64::MIN));
    }

    #[test]
    fn test_typed_accessors_validate_at_read_time() {
        let record = person_type().default_instance();

        assert!(matches!(
            record.integer("name"),
            Err(DynaschemaError::FieldType {
                expected: TypeTag::Integer,
                found: TypeTag::String,
                ..
            })
        ));
        assert!(matches!(
            record.text("salary"),
            Err(DynaschemaError::UnknownField(_))
        ));
    }

    #[test]
    fn test_json_schema_is_strict() {
        let schema = person_type().json_schema();

        assert_eq!(schema["title"], "PersonRecord");
        assert_eq!(schema["additionalProperties"], false);
        assert_eq!(schema["properties"]["age"]["type"], "integer");
        assert_eq!(schema["properties"]["is_retired"]["default"], true);
        assert_eq!(schema["required"], json!(["name", "age", "is_retired"]));
    }

    #[test]
    fn test_record_serializes_in_field_order() {
        let record = person_type()
            .coerce(&json!({"is_retired": false, "age": 30, "name": "Ann"}))
            .unwrap();
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"name":"Ann","age":30,"is_retired":false}"#);
    }
}
