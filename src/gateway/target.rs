//! Target descriptors: what shape the gateway should coerce model output into.
//!
//! A descriptor is a value, not a type parameter, so record types synthesized
//! at run time can be targets just like static Rust types.

use crate::models::{Record, RecordType};
use crate::schema::strict_schema;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::marker::PhantomData;

/// Session-wide data handed to every validation hook.
///
/// Opaque to the gateway: it is passed through unchanged and never becomes
/// part of the requested schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationContext(Map<String, Value>);

impl ValidationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_string(), value);
    }

    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String elements of an array entry; empty when absent.
    pub fn strings(&self, key: &str) -> impl Iterator<Item = &str> {
        self.0
            .get(key)
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A static Rust type usable as structured output.
pub trait StructuredOutput: JsonSchema + DeserializeOwned + Send {
    /// Post-deserialization checks; an `Err` triggers a re-ask.
    fn validate(self, context: &ValidationContext) -> Result<Self, String> {
        let _ = context;
        Ok(self)
    }
}

/// Describes the output expected from one gateway request.
pub trait ResponseModel: Send + Sync {
    type Output: Send;

    /// Name reported in logs, errors and the `response_format`.
    fn name(&self) -> String;

    /// JSON Schema sent to the model.
    fn json_schema(&self) -> Value;

    /// Coerce and validate one JSON reply.
    fn parse(&self, value: &Value, context: &ValidationContext) -> Result<Self::Output, String>;
}

impl<M: ResponseModel + ?Sized> ResponseModel for &M {
    type Output = M::Output;

    fn name(&self) -> String {
        (**self).name()
    }

    fn json_schema(&self) -> Value {
        (**self).json_schema()
    }

    fn parse(&self, value: &Value, context: &ValidationContext) -> Result<Self::Output, String> {
        (**self).parse(value, context)
    }
}

/// Exactly one instance of a static type.
pub struct Model<T>(PhantomData<fn() -> T>);

impl<T> Model<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for Model<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: StructuredOutput> ResponseModel for Model<T> {
    type Output = T;

    fn name(&self) -> String {
        T::schema_name()
    }

    fn json_schema(&self) -> Value {
        strict_schema::<T>()
    }

    fn parse(&self, value: &Value, context: &ValidationContext) -> Result<T, String> {
        let parsed: T = serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
        parsed.validate(context)
    }
}

/// Exactly one instance of a synthesized record type.
impl ResponseModel for RecordType {
    type Output = Record;

    fn name(&self) -> String {
        RecordType::name(self).to_string()
    }

    fn json_schema(&self) -> Value {
        RecordType::json_schema(self)
    }

    fn parse(&self, value: &Value, _context: &ValidationContext) -> Result<Record, String> {
        self.coerce(value)
    }
}

/// Zero or more instances of the inner descriptor.
///
/// Requested as `{"items": [...]}`; a bare array is accepted too.
pub struct Many<M>(M);

impl<M: ResponseModel> Many<M> {
    pub fn of(model: M) -> Self {
        Self(model)
    }
}

impl<M: ResponseModel> ResponseModel for Many<M> {
    type Output = Vec<M::Output>;

    fn name(&self) -> String {
        format!("{}List", self.0.name())
    }

    fn json_schema(&self) -> Value {
        json!({
            "title": self.name(),
            "type": "object",
            "properties": {
                "items": {
                    "type": "array",
                    "items": self.0.json_schema(),
                }
            },
            "required": ["items"],
            "additionalProperties": false,
        })
    }

    fn parse(&self, value: &Value, context: &ValidationContext) -> Result<Self::Output, String> {
        let items = match value {
            Value::Array(items) => items,
            Value::Object(map) => map
                .get("items")
                .and_then(Value::as_array)
                .ok_or_else(|| "expected an object with an `items` array".to_string())?,
            _ => return Err("expected an object with an `items` array".to_string()),
        };

        let mut parsed = Vec::with_capacity(items.len());
        let mut errors = Vec::new();
        for (i, item) in items.iter().enumerate() {
            match self.0.parse(item, context) {
                Ok(v) => parsed.push(v),
                Err(e) => errors.push(format!("items[{i}]: {e}")),
            }
        }

        if errors.is_empty() {
            Ok(parsed)
        } else {
            Err(errors.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PropertyDescriptor, SchemaProposal, TypeTag};
    use crate::schema::synthesize;

    fn person_type() -> RecordType {
        synthesize(
            "PersonRecord",
            &[
                PropertyDescriptor::new("name", TypeTag::String).unwrap(),
                PropertyDescriptor::new("age", TypeTag::Integer).unwrap(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_many_accepts_wrapped_and_bare_arrays() {
        let person = person_type();
        let target = Many::of(&person);
        let context = ValidationContext::default();

        let wrapped = json!({"items": [{"name": "Ann", "age": 30}, {"name": "Bob", "age": 45}]});
        assert_eq!(target.parse(&wrapped, &context).unwrap().len(), 2);

        let bare = json!([{"name": "Ann", "age": 30}]);
        assert_eq!(target.parse(&bare, &context).unwrap().len(), 1);

        let empty = json!({"items": []});
        assert!(target.parse(&empty, &context).unwrap().is_empty());
    }

    #[test]
    fn test_many_reports_element_index() {
        let person = person_type();
        let target = Many::of(&person);
        let value = json!({"items": [{"name": "Ann", "age": 30}, {"name": "Bob", "age": "old"}]});

        let err = target.parse(&value, &ValidationContext::default()).unwrap_err();
        assert!(err.starts_with("items[1]: age:"));
        assert!(target.parse(&json!("nope"), &ValidationContext::default()).is_err());
    }

    #[test]
    fn test_many_schema_wraps_inner() {
        let person = person_type();
        let schema = Many::of(&person).json_schema();

        assert_eq!(schema["title"], "PersonRecordList");
        assert_eq!(schema["properties"]["items"]["items"]["title"], "PersonRecord");
        assert_eq!(schema["required"], json!(["items"]));
    }

    #[test]
    fn test_model_runs_validate_hook() {
        let target = Model::<SchemaProposal>::new();
        let value = json!({"custom_properties": [
            {"name": "Age", "type": "integer"},
            {"name": "age", "type": "integer"}
        ]});

        let err = target.parse(&value, &ValidationContext::default()).unwrap_err();
        assert!(err.contains("Duplicate property name: age"));

        let err = target
            .parse(&json!({"custom_properties": [{"name": "x", "type": "float"}]}), &ValidationContext::default())
            .unwrap_err();
        assert!(err.contains("unknown variant"));
    }

    #[test]
    fn test_context_strings() {
        let context = ValidationContext::new().with("existing", json!(["a", 1, "b"]));
        assert_eq!(context.strings("existing").collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(context.strings("missing").count(), 0);
        assert!(!context.is_empty());
        assert_eq!(Model::<SchemaProposal>::new().name(), "SchemaProposal");
    }
}
