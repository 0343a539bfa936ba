//! Scripted provider for tests
//!
//! Replays a queue of canned responses and records every request so tests
//! can assert on what the model was shown.

use crate::{
    CompletionRequest, CompletionResponse, ContentBlock, LLMError, LLMProvider, Message, Result,
    StopReason, TokenUsage,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Provider that answers from a fixed script
#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<CompletionResponse>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: impl IntoIterator<Item = CompletionResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().map(Ok).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue another response
    pub fn push(&self, response: CompletionResponse) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Ok(response));
        }
    }

    /// Queue a provider failure
    pub fn push_error(&self, error: LLMError) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(error));
        }
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        self.script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or_else(|| Err(LLMError::RequestFailed("script exhausted".to_string())))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// A final answer with no tool calls
pub fn text(content: &str) -> CompletionResponse {
    CompletionResponse {
        message: Message::assistant(content),
        stop_reason: StopReason::EndTurn,
        usage: TokenUsage::default(),
    }
}

/// An assistant turn requesting the given `(name, arguments)` calls in order
///
/// Call ids are `call_0`, `call_1`, ... in emitted order.
pub fn tool_calls(calls: &[(&str, serde_json::Value)]) -> CompletionResponse {
    let blocks = calls
        .iter()
        .enumerate()
        .map(|(i, (name, input))| ContentBlock::ToolUse {
            id: format!("call_{i}"),
            name: (*name).to_string(),
            input: input.clone(),
        })
        .collect();

    CompletionResponse {
        message: Message::assistant_blocks(blocks),
        stop_reason: StopReason::ToolUse,
        usage: TokenUsage::default(),
    }
}
