//! The structured-output gateway.
//!
//! Sends messages to a `CompletionService`, coerces the reply into a target
//! descriptor, and re-asks with the validation errors until the reply is
//! valid or the retry budget is spent.
//!
//! Epistemic foundation:
//! - B_i: The reply matches the target (checked on every attempt)
//! - K_i: At most `max_retries + 1` calls per request
//! - I^B: Service failures are not re-asked; they propagate as-is

use crate::client::{CompletionRequest, CompletionService, Message, ResponseFormat, Usage};
use crate::gateway::{ResponseModel, ValidationContext};
use crate::models::{DynaschemaError, ModelSpec, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Sampling parameters for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub model: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl From<&ModelSpec> for GenerationOptions {
    fn from(spec: &ModelSpec) -> Self {
        Self {
            model: spec.id.clone(),
            temperature: Some(spec.temperature),
            max_tokens: spec.max_tokens,
        }
    }
}

/// A request for structured output.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub messages: Vec<Message>,
    pub options: GenerationOptions,
    /// Re-asks after the first attempt; at most `max_retries + 1` service calls.
    pub max_retries: u32,
    pub context: ValidationContext,
}

impl GatewayRequest {
    pub fn new(messages: Vec<Message>, options: GenerationOptions) -> Self {
        Self {
            messages,
            options,
            max_retries: 0,
            context: ValidationContext::default(),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_context(mut self, context: ValidationContext) -> Self {
        self.context = context;
        self
    }
}

/// A validated value plus what it cost to get it.
#[derive(Debug, Clone)]
pub struct Completion<T> {
    pub value: T,
    /// Usage summed over every attempt, including rejected ones
    pub usage: Usage,
    /// Service calls made (1 = accepted on first try)
    pub attempts: u32,
    /// Model reported by the service for the accepted reply
    pub model: String,
}

impl<T> Completion<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Completion<U> {
        Completion {
            value: f(self.value),
            usage: self.usage,
            attempts: self.attempts,
            model: self.model,
        }
    }
}

/// Result of checking one reply.
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    Valid(T),
    Invalid(String),
}

/// Structured-output gateway over a completion service.
pub struct Gateway<S> {
    service: Arc<S>,
}

impl<S> Clone for Gateway<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}

impl<S: CompletionService> Gateway<S> {
    pub fn new(service: S) -> Self {
        Self {
            service: Arc::new(service),
        }
    }

    pub fn from_arc(service: Arc<S>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Request one value shaped like `target`.
    ///
    /// # Errors
    ///
    /// - `ServiceUnavailable` as soon as the service fails; never re-asked
    /// - `SchemaValidation` when every attempt produced an invalid reply
    pub async fn request<M: ResponseModel>(
        &self,
        target: &M,
        request: GatewayRequest,
    ) -> Result<Completion<M::Output>> {
        let name = target.name();
        let schema = target.json_schema();
        let max_attempts = request.max_retries.saturating_add(1);

        let mut messages = request.messages;
        place_schema_instruction(&mut messages, schema_instruction(&name, &schema));
        let response_format = ResponseFormat::json_schema(&name, schema);

        let mut usage = Usage::default();
        let mut last_reason = String::new();

        for attempt in 1..=max_attempts {
            let response = self
                .service
                .complete(CompletionRequest {
                    model: request.options.model.clone(),
                    messages: messages.clone(),
                    temperature: request.options.temperature,
                    max_tokens: request.options.max_tokens,
                    response_format: Some(response_format.clone()),
                })
                .await?;
            usage += response.usage;

            match evaluate(target, &response.content, &request.context) {
                AttemptOutcome::Valid(value) => {
                    debug!(
                        target_name = %name,
                        attempt = attempt,
                        total_tokens = usage.total_tokens,
                        "Structured output accepted"
                    );
                    return Ok(Completion {
                        value,
                        usage,
                        attempts: attempt,
                        model: response.model,
                    });
                }
                AttemptOutcome::Invalid(reason) => {
                    warn!(
                        target_name = %name,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        reason = %reason,
                        "Structured output failed validation"
                    );
                    messages.push(Message::assistant(response.content));
                    messages.push(Message::user(reask_prompt(&reason)));
                    last_reason = reason;
                }
            }
        }

        Err(DynaschemaError::SchemaValidation {
            target: name,
            attempts: max_attempts,
            reason: last_reason,
        })
    }
}

/// Parse and validate one reply against `target`.
pub fn evaluate<M: ResponseModel + ?Sized>(
    target: &M,
    content: &str,
    context: &ValidationContext,
) -> AttemptOutcome<M::Output> {
    let value = match extract_json(content) {
        Ok(v) => v,
        Err(reason) => return AttemptOutcome::Invalid(reason),
    };
    match target.parse(&value, context) {
        Ok(v) => AttemptOutcome::Valid(v),
        Err(reason) => AttemptOutcome::Invalid(reason),
    }
}

/// Pull the first JSON value out of a reply.
///
/// Accepts bare JSON, fenced code blocks, and JSON surrounded by prose.
pub fn extract_json(content: &str) -> std::result::Result<Value, String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err("response was empty".to_string());
    }
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    let unfenced = strip_fence(trimmed);
    if let Ok(value) = serde_json::from_str(unfenced) {
        return Ok(value);
    }

    let start = unfenced
        .find(['{', '['])
        .ok_or_else(|| "response contained no JSON value".to_string())?;
    serde_json::Deserializer::from_str(&unfenced[start..])
        .into_iter::<Value>()
        .next()
        .ok_or_else(|| "response contained no JSON value".to_string())?
        .map_err(|e| format!("invalid JSON: {e}"))
}

fn strip_fence(text: &str) -> &str {
    let Some(open) = text.find("```") else {
        return text;
    };
    let body = &text[open + 3..];
    // Skip the language tag on the opening fence.
    let body = body.split_once('\n').map_or(body, |(_, rest)| rest);
    body.find("```").map_or(body, |close| &body[..close]).trim()
}

fn schema_instruction(name: &str, schema: &Value) -> String {
    format!(
        "Respond only with a JSON value for `{name}` conforming to this JSON Schema:\n{schema}"
    )
}

/// Chat templates reject a system turn that is not first, so the instruction
/// joins the leading system message or opens the conversation.
fn place_schema_instruction(messages: &mut Vec<Message>, instruction: String) {
    match messages.first_mut() {
        Some(first) if first.role == "system" => {
            first.content.push_str("\n\n");
            first.content.push_str(&instruction);
        }
        _ => messages.insert(0, Message::system(instruction)),
    }
}

fn reask_prompt(reason: &str) -> String {
    format!(
        "Your previous response failed validation: {reason}\nFix the errors and respond again with the corrected JSON only."
    )
}
