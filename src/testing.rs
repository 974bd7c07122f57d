//! Test doubles shared across modules.

use crate::client::{CompletionRequest, CompletionResponse, CompletionService, Usage};
use crate::models::{DynaschemaError, Result, ServiceError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// A `CompletionService` that replays canned replies in order and records
/// every request it receives.
pub(crate) struct ScriptedService {
    replies: Mutex<VecDeque<std::result::Result<String, ServiceError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedService {
    /// Usage reported for every reply.
    pub const USAGE: Usage = Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    };

    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(self, content: impl Into<String>) -> Self {
        self.replies.lock().unwrap().push_back(Ok(content.into()));
        self
    }

    pub fn reply_json(self, value: Value) -> Self {
        self.reply(value.to_string())
    }

    pub fn fail(self, error: ServiceError) -> Self {
        self.replies.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionService for ScriptedService {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);

        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Ok(content)) => Ok(CompletionResponse {
                content,
                model,
                usage: Self::USAGE,
                duration: Duration::ZERO,
            }),
            Some(Err(e)) => Err(e.into()),
            None => Err(DynaschemaError::ServiceUnavailable(
                ServiceError::InvalidResponse("script exhausted".to_string()),
            )),
        }
    }
}
