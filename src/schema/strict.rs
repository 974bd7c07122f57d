//! Strict JSON Schemas for static response types.
//!
//! Structured output endpoints want every object closed
//! (`additionalProperties: false`), every property listed in `required`, and
//! no `$ref` indirection. `schemars` output is rewritten to that form.

use schemars::{JsonSchema, schema_for};
use serde_json::{Map, Value};

/// Generate the strict schema for `T`.
pub fn strict_schema<T: JsonSchema>() -> Value {
    let mut value = serde_json::to_value(schema_for!(T)).unwrap_or_default();

    close_objects(&mut value);

    let definitions = match &mut value {
        Value::Object(map) => {
            map.remove("$schema");
            map.remove("definitions")
        }
        _ => None,
    };
    if let Some(Value::Object(definitions)) = definitions {
        inline_refs(&mut value, &definitions);
    }

    value
}

/// Close every object schema and require all of its properties.
fn close_objects(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if map.get("type").and_then(Value::as_str) == Some("object") {
                map.insert("additionalProperties".to_string(), Value::Bool(false));

                let keys: Option<Vec<Value>> = map
                    .get("properties")
                    .and_then(Value::as_object)
                    .map(|props| props.keys().cloned().map(Value::String).collect());
                if let Some(keys) = keys {
                    map.insert("required".to_string(), Value::Array(keys));
                }
            }
            for child in map.values_mut() {
                close_objects(child);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(close_objects),
        _ => {}
    }
}

/// Replace `{"$ref": "#/definitions/X"}` with the definition of `X`.
fn inline_refs(value: &mut Value, definitions: &Map<String, Value>) {
    match value {
        Value::Object(map) => {
            // schemars wraps documented references as `allOf: [{"$ref": ..}]`.
            let single = match map.get("allOf") {
                Some(Value::Array(all)) if all.len() == 1 => Some(all[0].clone()),
                _ => None,
            };
            if let Some(Value::Object(inner)) = single {
                map.remove("allOf");
                for (k, v) in inner {
                    map.entry(k).or_insert(v);
                }
            }

            let target = map
                .get("$ref")
                .and_then(Value::as_str)
                .and_then(|r| r.strip_prefix("#/definitions/"))
                .and_then(|name| definitions.get(name))
                .cloned();

            if let Some(mut inlined) = target {
                // Keywords at the reference site (field docs) win over the definition's.
                if let Value::Object(inlined_map) = &mut inlined {
                    for (k, v) in map.iter().filter(|(k, _)| k.as_str() != "$ref") {
                        inlined_map.insert(k.clone(), v.clone());
                    }
                }
                *value = inlined;
                inline_refs(value, definitions);
                return;
            }

            for child in map.values_mut() {
                inline_refs(child, definitions);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| inline_refs(v, definitions)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnswerVerification, MultipleChoiceQuestion, SchemaProposal};

    #[test]
    fn test_nested_refs_are_inlined() {
        let schema = strict_schema::<MultipleChoiceQuestion>();
        let text = serde_json::to_string(&schema).unwrap();

        assert!(!text.contains("$ref"));
        assert!(!text.contains("allOf"));
        assert!(schema.get("definitions").is_none());
        assert!(schema.get("$schema").is_none());

        let correct = &schema["properties"]["correct_answer"];
        assert_eq!(correct["type"], "object");
        assert_eq!(correct["additionalProperties"], false);
        assert!(correct["properties"].get("answer_text").is_some());
    }

    #[test]
    fn test_optional_fields_are_required() {
        let schema = strict_schema::<AnswerVerification>();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();

        assert!(required.contains(&"maybe_new_answer"));
        assert!(required.contains(&"answer_validated"));
        assert_eq!(schema["additionalProperties"], false);
    }

    #[test]
    fn test_doc_comments_become_descriptions() {
        let schema = strict_schema::<SchemaProposal>();
        let item = &schema["properties"]["custom_properties"]["items"];

        assert_eq!(item["properties"]["name"]["description"], "must be snake case");
        assert_eq!(
            item["properties"]["type"]["enum"],
            serde_json::json!(["string", "integer", "boolean"])
        );
    }
}
