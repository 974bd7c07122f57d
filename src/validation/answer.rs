//! Self-validation of flagged answer fields.
//!
//! Construction of a question stays pure: the gateway builds the raw
//! composite, then `AnswerValidator::validate` runs one verification call per
//! flagged field and applies `resolve` to the verdict.
//!
//! Epistemic foundation:
//! - B_i: A generated wrong answer is actually wrong (verified per field)
//! - K_i: The correctness label is never flipped, only the text replaced
//! - B_i falsified without a replacement → `UnresolvedValidation`

use crate::client::{CompletionService, Message, Usage};
use crate::gateway::{Completion, Gateway, GatewayRequest, GenerationOptions, Model};
use crate::models::{
    Answer, AnswerSlot, AnswerVerification, DynaschemaError, ModelSpec, MultipleChoiceQuestion,
    Result,
};
use tracing::{debug, info};

const VALIDATOR_SYSTEM_PROMPT: &str = "You are a world class validation model and your job is to validate the answers of a multiple choice test.";

/// Outcome of resolving one candidate against its verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Verdict agreed; the candidate is accepted unchanged
    Kept(Answer),
    /// Verdict disagreed; the text was replaced, the label kept
    Replaced(Answer),
}

impl Resolution {
    pub fn answer(&self) -> &Answer {
        match self {
            Self::Kept(a) | Self::Replaced(a) => a,
        }
    }

    pub fn into_answer(self) -> Answer {
        match self {
            Self::Kept(a) | Self::Replaced(a) => a,
        }
    }

    pub fn is_replaced(&self) -> bool {
        matches!(self, Self::Replaced(_))
    }
}

/// Apply a verification verdict to a candidate answer.
///
/// The correctness label is never changed here, only the text. A missing or
/// blank replacement for a disputed answer fails with `UnresolvedValidation`.
pub fn resolve(
    candidate: Answer,
    verification: &AnswerVerification,
    field: &str,
) -> Result<Resolution> {
    if verification.answer_validated {
        return Ok(Resolution::Kept(candidate));
    }

    match verification
        .maybe_new_answer
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
    {
        Some(text) => Ok(Resolution::Replaced(Answer::new(
            text,
            candidate.answer_classification,
        ))),
        None => Err(DynaschemaError::unresolved(
            field,
            format!(
                "answer {:?} disputed and no replacement was offered",
                candidate.answer_text
            ),
        )),
    }
}

/// A question whose flagged fields all passed self-validation.
#[derive(Debug, Clone)]
pub struct ValidatedQuestion {
    pub question: MultipleChoiceQuestion,
    /// Fields whose text was replaced
    pub replaced: Vec<AnswerSlot>,
    /// Usage of the verification calls
    pub usage: Usage,
    /// Service calls made by the verification requests
    pub service_calls: u32,
}

/// Runs the verification call for flagged answer fields.
pub struct AnswerValidator<S> {
    gateway: Gateway<S>,
    options: GenerationOptions,
    max_retries: u32,
}

impl<S: CompletionService> AnswerValidator<S> {
    pub fn new(gateway: Gateway<S>, model: &ModelSpec, max_retries: u32) -> Self {
        Self {
            gateway,
            options: GenerationOptions::from(model),
            max_retries,
        }
    }

    fn build_user_prompt(question: &str, candidate: &Answer) -> String {
        let negation = if candidate.answer_classification {
            ""
        } else {
            "not "
        };
        format!(
            "multiple choice question: `{question}`\n\
             one of the answers: `{}`\n\
             Given the above multiple choice question, please verify if the given answer is one correct answer to it, or not.\n\
             If you think the answer is {negation}correct, the answer is now validated, otherwise the answer is not validated. \
             Only if it is not validated, suggest a new answer which is a negated variant of the original answer.",
            candidate.answer_text
        )
    }

    /// Ask the reasoner whether `candidate` carries the right label for `question`.
    pub async fn verify(
        &self,
        question: &str,
        candidate: &Answer,
    ) -> Result<Completion<AnswerVerification>> {
        let request = GatewayRequest::new(
            vec![
                Message::system(VALIDATOR_SYSTEM_PROMPT),
                Message::user(Self::build_user_prompt(question, candidate)),
            ],
            self.options.clone(),
        )
        .with_max_retries(self.max_retries);

        self.gateway
            .request(&Model::<AnswerVerification>::new(), request)
            .await
    }

    /// Validate every flagged field of `question`, in order.
    ///
    /// Each field is checked in isolation. The first unresolved field aborts
    /// the question; nothing is retried at this level.
    pub async fn validate(&self, mut question: MultipleChoiceQuestion) -> Result<ValidatedQuestion> {
        let mut replaced = Vec::new();
        let mut usage = Usage::default();
        let mut service_calls = 0;

        for slot in MultipleChoiceQuestion::FLAGGED {
            let candidate = question.answer(slot).clone();
            let verification = self.verify(&question.question, &candidate).await?;
            usage += verification.usage;
            service_calls += verification.attempts;

            debug!(
                field = slot.field_name(),
                answer = %candidate.answer_text,
                classification = candidate.answer_classification,
                validated = verification.value.answer_validated,
                "Answer verified"
            );

            let resolution = resolve(candidate, &verification.value, slot.field_name())?;
            if resolution.is_replaced() {
                info!(
                    field = slot.field_name(),
                    replacement = %resolution.answer().answer_text,
                    "Replaced disputed answer"
                );
                replaced.push(slot);
            }
            question.set_answer(slot, resolution.into_answer());
        }

        Ok(ValidatedQuestion {
            question,
            replaced,
            usage,
            service_calls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedService;
    use serde_json::json;
    use std::sync::Arc;

    fn verification(validated: bool, new_answer: Option<&str>) -> AnswerVerification {
        AnswerVerification {
            answer_classification: false,
            answer_validated: validated,
            maybe_new_answer: new_answer.map(str::to_string),
        }
    }

    fn question() -> MultipleChoiceQuestion {
        MultipleChoiceQuestion {
            question: "What does LoRA add to a frozen model?".to_string(),
            correct_answer: Answer::new("Trainable low-rank update matrices.", true),
            wrong_answer_1: Answer::new("A second full copy of the weights.", false),
            wrong_answer_2: Answer::new("A larger vocabulary.", false),
        }
    }

    fn validator(service: &Arc<ScriptedService>) -> AnswerValidator<Arc<ScriptedService>> {
        AnswerValidator::new(
            Gateway::new(Arc::clone(service)),
            &ModelSpec::new("validator", 0.0),
            1,
        )
    }

    #[test]
    fn test_validated_answer_is_identical() {
        for label in [true, false] {
            let candidate = Answer::new("  Exactly as written ", label);
            let resolution =
                resolve(candidate.clone(), &verification(true, Some("ignored")), "wrong_answer_1")
                    .unwrap();
            assert_eq!(resolution, Resolution::Kept(candidate));
        }
    }

    #[test]
    fn test_replacement_keeps_label() {
        let candidate = Answer::new("Paris is in Germany", false);
        let resolution = resolve(
            candidate,
            &AnswerVerification {
                answer_classification: true,
                answer_validated: false,
                maybe_new_answer: Some("Paris is in Spain".to_string()),
            },
            "wrong_answer_1",
        )
        .unwrap();

        assert!(resolution.is_replaced());
        assert_eq!(resolution.into_answer(), Answer::new("Paris is in Spain", false));
    }

    #[test]
    fn test_missing_replacement_is_unresolved() {
        for new_answer in [None, Some(""), Some("   ")] {
            let err = resolve(
                Answer::new("x", false),
                &verification(false, new_answer),
                "wrong_answer_2",
            )
            .unwrap_err();
            assert!(matches!(
                err,
                DynaschemaError::UnresolvedValidation { ref field, .. } if field == "wrong_answer_2"
            ));
        }
    }

    #[test]
    fn test_prompt_mentions_label() {
        let prompt = AnswerValidator::<ScriptedService>::build_user_prompt(
            "Q?",
            &Answer::new("A", false),
        );
        assert!(prompt.contains("one of the answers: `A`"));
        assert!(prompt.contains("If you think the answer is not correct"));

        let prompt =
            AnswerValidator::<ScriptedService>::build_user_prompt("Q?", &Answer::new("A", true));
        assert!(prompt.contains("If you think the answer is correct"));
    }

    #[tokio::test]
    async fn test_validate_replaces_only_disputed_field() {
        let service = Arc::new(
            ScriptedService::new()
                .reply_json(json!({"answer_classification": false, "answer_validated": true, "maybe_new_answer": null}))
                .reply_json(json!({"answer_classification": true, "answer_validated": false, "maybe_new_answer": "A smaller tokenizer."})),
        );
        let original = question();

        let validated = validator(&service).validate(original.clone()).await.unwrap();

        assert_eq!(validated.question.wrong_answer_1, original.wrong_answer_1);
        assert_eq!(
            validated.question.wrong_answer_2,
            Answer::new("A smaller tokenizer.", false)
        );
        assert_eq!(validated.question.correct_answer, original.correct_answer);
        assert_eq!(validated.replaced, vec![AnswerSlot::WrongAnswer2]);
        assert_eq!(validated.service_calls, 2);
        assert_eq!(validated.usage.total_tokens, 2 * ScriptedService::USAGE.total_tokens);

        let requests = service.requests();
        assert!(requests[0].messages[1].content.contains("A second full copy"));
        assert!(requests[1].messages[1].content.contains("A larger vocabulary."));
        assert_eq!(requests[0].temperature, Some(0.0));
    }

    #[tokio::test]
    async fn test_validate_stops_at_unresolved_field() {
        let service = Arc::new(
            ScriptedService::new()
                .reply_json(json!({"answer_validated": false}))
                .reply_json(json!({"answer_validated": true})),
        );

        let err = validator(&service).validate(question()).await.unwrap_err();

        assert!(matches!(
            err,
            DynaschemaError::UnresolvedValidation { ref field, .. } if field == "wrong_answer_1"
        ));
        assert_eq!(service.calls(), 1);
    }
}
