//! Flat projection of produced records.

use crate::client::Usage;
use crate::models::{FieldValue, MultipleChoiceQuestion, Record};
use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::BTreeMap;

/// Anything that can be flattened to `field name → primitive value`.
pub trait Projectable {
    fn project(&self) -> BTreeMap<String, FieldValue>;
}

impl Projectable for Record {
    fn project(&self) -> BTreeMap<String, FieldValue> {
        self.to_map()
    }
}

/// Answers are projected to their text.
impl Projectable for MultipleChoiceQuestion {
    fn project(&self) -> BTreeMap<String, FieldValue> {
        [
            ("question", &self.question),
            ("correct_answer", &self.correct_answer.answer_text),
            ("wrong_answer_1", &self.wrong_answer_1.answer_text),
            ("wrong_answer_2", &self.wrong_answer_2.answer_text),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), FieldValue::Text(v.clone())))
        .collect()
    }
}

/// One output row: projected fields plus optional usage counters.
///
/// Serialized flat. A record field that shares a name with a metadata key
/// (`produced_at`, `total_tokens`, ...) keeps its value and the metadata
/// entry is dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub produced_at: DateTime<Utc>,
    pub fields: BTreeMap<String, FieldValue>,
    pub usage: Option<Usage>,
}

impl Row {
    pub fn new(item: &impl Projectable) -> Self {
        Self {
            produced_at: Utc::now(),
            fields: item.project(),
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }

        let free = |key: &str| !self.fields.contains_key(key);
        if let Some(usage) = &self.usage {
            let counters = [
                ("total_tokens", usage.total_tokens),
                ("prompt_tokens", usage.prompt_tokens),
                ("completion_tokens", usage.completion_tokens),
            ];
            for (k, v) in counters.into_iter().filter(|(k, _)| free(*k)) {
                map.serialize_entry(k, &v)?;
            }
        }
        if free("produced_at") {
            map.serialize_entry("produced_at", &self.produced_at)?;
        }
        map.end()
    }
}
