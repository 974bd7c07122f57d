//! Multiple choice question types used by the self-validating quiz pipeline.

use crate::gateway::{StructuredOutput, ValidationContext};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Context key holding the questions generated earlier in the session.
pub const EXISTING_QUESTIONS: &str = "existing_questions";

/// One answer option together with its claimed correctness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Answer {
    /// string representation of the answer
    pub answer_text: String,

    /// classifies if the answer is correct (true) or incorrect (false)
    pub answer_classification: bool,
}

impl Answer {
    pub fn new(answer_text: impl Into<String>, answer_classification: bool) -> Self {
        Self {
            answer_text: answer_text.into(),
            answer_classification,
        }
    }
}

/// Verdict of the independent reasoner on a single answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AnswerVerification {
    /// whether the answer is correct
    #[serde(default = "default_true")]
    pub answer_classification: bool,

    /// whether the answer is validated
    #[serde(default = "default_true")]
    pub answer_validated: bool,

    /// new answer if the answer is not validated, otherwise null
    #[serde(default)]
    pub maybe_new_answer: Option<String>,
}

fn default_true() -> bool {
    true
}

impl StructuredOutput for AnswerVerification {}

/// Data Model for a multiple choice question with three answers, while only one should be correct
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MultipleChoiceQuestion {
    /// An interesting and unique question related to the given topic.
    pub question: String,

    /// A correct answer to the question
    pub correct_answer: Answer,

    /// a unique wrong answer to the question
    pub wrong_answer_1: Answer,

    /// a unique wrong answer to the question which is different from wrong_answer_1 and not an empty string
    pub wrong_answer_2: Answer,
}

/// Answer fields of a question that go through self-validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerSlot {
    WrongAnswer1,
    WrongAnswer2,
}

impl AnswerSlot {
    /// Field name as it appears in the question schema.
    pub fn field_name(self) -> &'static str {
        match self {
            Self::WrongAnswer1 => "wrong_answer_1",
            Self::WrongAnswer2 => "wrong_answer_2",
        }
    }
}

impl fmt::Display for AnswerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

impl MultipleChoiceQuestion {
    /// Fields flagged for self-validation.
    pub const FLAGGED: [AnswerSlot; 2] = [AnswerSlot::WrongAnswer1, AnswerSlot::WrongAnswer2];

    pub fn answer(&self, slot: AnswerSlot) -> &Answer {
        match slot {
            AnswerSlot::WrongAnswer1 => &self.wrong_answer_1,
            AnswerSlot::WrongAnswer2 => &self.wrong_answer_2,
        }
    }

    pub fn set_answer(&mut self, slot: AnswerSlot, answer: Answer) {
        match slot {
            AnswerSlot::WrongAnswer1 => self.wrong_answer_1 = answer,
            AnswerSlot::WrongAnswer2 => self.wrong_answer_2 = answer,
        }
    }

    /// Whether the two wrong answers carry different text.
    pub fn wrong_answers_distinct(&self) -> bool {
        normalize(&self.wrong_answer_1.answer_text) != normalize(&self.wrong_answer_2.answer_text)
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl StructuredOutput for MultipleChoiceQuestion {
    fn validate(self, context: &ValidationContext) -> Result<Self, String> {
        let mut errors = Vec::new();

        if self.question.trim().is_empty() {
            errors.push("question: must not be empty".to_string());
        }

        let answers = [
            ("correct_answer", &self.correct_answer, true),
            ("wrong_answer_1", &self.wrong_answer_1, false),
            ("wrong_answer_2", &self.wrong_answer_2, false),
        ];
        for (field, answer, expected) in answers {
            if answer.answer_text.trim().is_empty() {
                errors.push(format!("{field}: answer_text must not be empty"));
            }
            if answer.answer_classification != expected {
                errors.push(format!("{field}: answer_classification must be {expected}"));
            }
        }

        if !self.wrong_answers_distinct() {
            errors.push("wrong_answer_2: must be different from wrong_answer_1".to_string());
        }

        let question = normalize(&self.question);
        let repeated = context
            .strings(EXISTING_QUESTIONS)
            .any(|existing| normalize(existing) == question);
        if repeated {
            errors.push("question: repeats an existing question, ask something new".to_string());
        }

        if errors.is_empty() {
            Ok(self)
        } else {
            Err(errors.join("; "))
        }
    }
}
