//! Self-validating multiple choice quiz pipeline.
//!
//! Pipeline flow:
//! Topic + existing questions → Gateway (composite) → AnswerValidator →
//! distinctness check → QuizItem
//!
//! Questions are generated strictly one after another: each prompt carries
//! every question accepted so far.

use crate::client::{CompletionService, Message, Usage};
use crate::gateway::{Gateway, GatewayRequest, Model, ValidationContext};
use crate::models::{
    AnswerSlot, DynaschemaError, EXISTING_QUESTIONS, MultipleChoiceQuestion, QuizConfig, Result,
    RunStats, UnresolvedPolicy,
};
use crate::schema::strict_schema;
use crate::validation::AnswerValidator;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::time::Instant;
use tracing::{debug, info, warn};

const GENERATOR_SYSTEM_PROMPT: &str = "You are system that generates interesting and unique multiple choice questions. \
The Questions should be on expert level and in the area of the given topic.";

/// A generated question that passed self-validation.
#[derive(Debug, Clone)]
pub struct QuizItem {
    pub question: MultipleChoiceQuestion,
    /// Wrong answers whose text the validator replaced
    pub replaced: Vec<AnswerSlot>,
    /// Usage of the generation and verification calls
    pub usage: Usage,
    /// Service calls for this question
    pub service_calls: u32,
}

/// Result of a batch run.
///
/// Questions finished before an abort are kept in `items`.
#[derive(Debug)]
pub struct QuizRun {
    pub items: Vec<QuizItem>,
    /// Record-scoped failures that were skipped, by question index
    pub skipped: Vec<(usize, DynaschemaError)>,
    /// Failure that ended the run early, by question index
    pub aborted: Option<(usize, DynaschemaError)>,
    pub stats: RunStats,
}

impl QuizRun {
    /// Hand back the finished questions, or the failure that ended the run.
    pub fn into_result(self) -> Result<Vec<QuizItem>> {
        match self.aborted {
            Some((_, e)) => Err(e),
            None => Ok(self.items),
        }
    }
}

/// Generates multiple choice questions and self-validates their wrong answers.
pub struct QuizPipeline<S> {
    gateway: Gateway<S>,
    validator: AnswerValidator<S>,
    config: QuizConfig,
    show_progress: bool,
}

impl<S: CompletionService> QuizPipeline<S> {
    pub fn new(gateway: Gateway<S>, config: QuizConfig) -> Self {
        let validator = AnswerValidator::new(
            gateway.clone(),
            &config.validation_model,
            config.validation_retries,
        );
        Self {
            gateway,
            validator,
            config,
            show_progress: false,
        }
    }

    /// Draw a progress bar during `run`.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    fn build_user_prompt(topic: &str, existing: &[String]) -> String {
        format!(
            "Given the topic: `{topic}`\n\nCreate one unique multiple choice question.\n\
             Remember to only create unique questions with different focus, use the following context to find already existing questions.\n\
             existing questions: {existing:?}"
        )
    }

    /// Generate one question on `topic` and self-validate its wrong answers.
    ///
    /// `existing` questions are named in the prompt and a repeat is rejected
    /// and re-asked by the gateway.
    ///
    /// # Errors
    ///
    /// - `UnresolvedValidation` if a wrong answer is disputed without a
    ///   replacement, or the wrong answers coincide after validation
    /// - any gateway error, unmodified
    pub async fn generate_validated_composite(
        &self,
        topic: &str,
        existing: &[String],
    ) -> Result<QuizItem> {
        if topic.trim().is_empty() {
            return Err(DynaschemaError::InvalidInput(
                "topic must not be empty".to_string(),
            ));
        }

        let context = ValidationContext::new().with(EXISTING_QUESTIONS, json!(existing));
        let request = GatewayRequest::new(
            vec![
                Message::system(GENERATOR_SYSTEM_PROMPT),
                Message::user(Self::build_user_prompt(topic, existing)),
            ],
            (&self.config.generation_model).into(),
        )
        .with_max_retries(self.config.generation_retries)
        .with_context(context);

        let generated = self
            .gateway
            .request(&Model::<MultipleChoiceQuestion>::new(), request)
            .await?;
        debug!(
            question = %generated.value.question,
            attempts = generated.attempts,
            "Generated question"
        );

        let validated = self.validator.validate(generated.value).await?;
        if !validated.question.wrong_answers_distinct() {
            return Err(DynaschemaError::unresolved(
                AnswerSlot::WrongAnswer2.field_name(),
                "identical to wrong_answer_1 after validation",
            ));
        }

        Ok(QuizItem {
            question: validated.question,
            replaced: validated.replaced,
            usage: generated.usage + validated.usage,
            service_calls: generated.attempts + validated.service_calls,
        })
    }

    fn progress_bar(&self, len: usize) -> Result<ProgressBar> {
        if !self.show_progress {
            return Ok(ProgressBar::hidden());
        }
        let pb = ProgressBar::new(len as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}")
                .map_err(|e| DynaschemaError::Internal(format!("Invalid progress template: {e}")))?
                .progress_chars("##-"),
        );
        Ok(pb)
    }

    /// Generate `count` questions on `topic`, one at a time.
    ///
    /// Record-scoped failures follow `on_unresolved`: skipped questions are
    /// counted and the run continues; with `abort` the first one ends the run.
    /// Session failures always end the run. An early end is reported in
    /// `QuizRun::aborted` next to the questions already produced.
    pub async fn run(&self, topic: &str, count: usize) -> Result<QuizRun> {
        let start = Instant::now();

        info!(
            topic = topic,
            questions = count,
            generation_model = %self.config.generation_model.id,
            validation_model = %self.config.validation_model.id,
            "Starting quiz pipeline"
        );
        debug!(
            schema = %strict_schema::<MultipleChoiceQuestion>(),
            "Composite schema"
        );

        let pb = self.progress_bar(count)?;
        let mut stats = RunStats {
            requested: count,
            ..Default::default()
        };
        let mut items: Vec<QuizItem> = Vec::with_capacity(count);
        let mut skipped = Vec::new();
        let mut aborted = None;
        let mut existing: Vec<String> = Vec::with_capacity(count);

        for index in 0..count {
            match self.generate_validated_composite(topic, &existing).await {
                Ok(item) => {
                    stats.produced += 1;
                    stats.answers_replaced += item.replaced.len();
                    stats.service_calls += item.service_calls;
                    stats.usage += item.usage;
                    existing.push(item.question.question.clone());
                    items.push(item);
                }
                Err(e) if e.is_record_scoped() && self.config.on_unresolved == UnresolvedPolicy::Skip => {
                    warn!(index = index, error = %e, "Skipping question");
                    stats.skipped += 1;
                    skipped.push((index, e));
                }
                Err(e) => {
                    warn!(index = index, produced = stats.produced, error = %e, "Quiz run aborted");
                    aborted = Some((index, e));
                    break;
                }
            }

            pb.inc(1);
            pb.set_message(format!("produced: {}, skipped: {}", stats.produced, stats.skipped));
        }

        match &aborted {
            Some((index, _)) => pb.abandon_with_message(format!(
                "Failed at question {}, {} produced",
                index + 1,
                stats.produced
            )),
            None => pb.finish_with_message(format!(
                "Done! {} produced, {} skipped",
                stats.produced, stats.skipped
            )),
        }

        stats.runtime_secs = start.elapsed().as_secs_f64();
        stats.finalize();

        info!(
            produced = stats.produced,
            skipped = stats.skipped,
            answers_replaced = stats.answers_replaced,
            total_tokens = stats.usage.total_tokens,
            throughput = format!("{:.0}/hr", stats.throughput_per_hour),
            "Quiz pipeline complete"
        );

        Ok(QuizRun {
            items,
            skipped,
            aborted,
            stats,
        })
    }
}
