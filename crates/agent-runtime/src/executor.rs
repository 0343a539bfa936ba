//! Reasoning loop executor
//!
//! The loop is a small state machine:
//!
//! ```text
//! AwaitingModel ──text──────────────▶ Done
//!       │  ▲
//! tools │  │ results appended
//!       ▼  │
//! ExecutingTools          (any state) ──▶ Failed
//! ```
//!
//! Every transition from `AwaitingModel` to `ExecutingTools` counts as one
//! step; crossing `recursion_limit` fails the run.

use crate::{Result, RuntimeError, SessionStore, ToolCallRecord};
use agent_llm::{CompletionRequest, LLMProvider, Message};
use agent_tools::ToolRegistry;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Configuration for the reasoning loop
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Model to use
    pub model: String,

    /// Instruction prefixed to a thread's first turn
    pub system_prompt: Option<String>,

    /// Max tokens per completion
    pub max_tokens: usize,

    /// Temperature
    pub temperature: Option<f32>,

    /// Maximum tool rounds per run
    pub recursion_limit: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            model: "deepseek-chat".to_string(),
            system_prompt: None,
            max_tokens: 4096,
            temperature: Some(0.0),
            recursion_limit: 50,
        }
    }
}

/// A tool call as reported to stream consumers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub args: Value,
}

/// Emitted after every model turn
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// The model answered in text
    Message { content: String },
    /// The model asked for tools
    ToolCalls { tools: Vec<ToolInvocation> },
}

/// Result recorded for tool calls interrupted by cancellation
const CANCELLED_RESULT: &str = "Error: cancelled before the tool finished";

enum LoopState {
    AwaitingModel,
    ExecutingTools(Message),
    Done(String),
    Failed(RuntimeError),
}

/// Drives a model and a tool registry until the model answers in text
pub struct ReasoningLoop<S: Send> {
    provider: Arc<dyn LLMProvider>,
    tools: Arc<ToolRegistry<S>>,
    sessions: Arc<dyn SessionStore<S>>,
    config: LoopConfig,
    cancel: CancellationToken,
}

impl<S: Send + 'static> ReasoningLoop<S> {
    /// Create a builder
    pub fn builder(
        provider: Arc<dyn LLMProvider>,
        tools: Arc<ToolRegistry<S>>,
        sessions: Arc<dyn SessionStore<S>>,
    ) -> ReasoningLoopBuilder<S> {
        ReasoningLoopBuilder {
            provider,
            tools,
            sessions,
            config: LoopConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Token that aborts any run of this loop
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run `messages` on `thread_id` to completion and return the final text
    pub async fn run(&self, thread_id: &str, messages: Vec<Message>) -> Result<String> {
        self.drive(thread_id, messages, None).await
    }

    /// Like [`run`](Self::run), sending a [`TurnEvent`] after every model turn
    ///
    /// A closed channel counts as cancellation.
    pub async fn run_streamed(
        &self,
        thread_id: &str,
        messages: Vec<Message>,
        tx: &mpsc::Sender<TurnEvent>,
    ) -> Result<String> {
        self.drive(thread_id, messages, Some(tx)).await
    }

    #[instrument(skip(self, messages, tx), fields(model = %self.config.model))]
    async fn drive(
        &self,
        thread_id: &str,
        messages: Vec<Message>,
        tx: Option<&mpsc::Sender<TurnEvent>>,
    ) -> Result<String> {
        let handle = self.sessions.open(thread_id).await?;
        let mut guard = handle.lock().await;
        let session = &mut *guard;

        if session.is_fresh() {
            if let Some(prompt) = &self.config.system_prompt {
                session.messages.push(Message::system(prompt.clone()));
            }
        }
        session.messages.extend(messages);

        let mut steps = 0usize;
        let mut state = LoopState::AwaitingModel;

        loop {
            state = match state {
                LoopState::AwaitingModel => {
                    match self.call_model(session.messages.clone()).await {
                        Err(e) => LoopState::Failed(e),
                        Ok(reply) => {
                            let calls = reply.tool_calls();

                            if calls.is_empty() {
                                let text = reply.text().unwrap_or_default();
                                session.messages.push(reply);
                                match emit(tx, TurnEvent::Message { content: text.clone() }).await {
                                    Ok(()) => LoopState::Done(text),
                                    Err(e) => LoopState::Failed(e),
                                }
                            } else {
                                // a tool request only joins the history once its results will follow
                                steps += 1;
                                let event = TurnEvent::ToolCalls {
                                    tools: calls
                                        .iter()
                                        .map(|c| ToolInvocation {
                                            id: c.id.to_string(),
                                            name: c.name.to_string(),
                                            args: c.input.clone(),
                                        })
                                        .collect(),
                                };
                                if steps > self.config.recursion_limit {
                                    warn!(limit = self.config.recursion_limit, "Recursion limit reached");
                                    LoopState::Failed(RuntimeError::RecursionLimitExceeded {
                                        limit: self.config.recursion_limit,
                                    })
                                } else {
                                    match emit(tx, event).await {
                                        Ok(()) => {
                                            session.messages.push(reply.clone());
                                            LoopState::ExecutingTools(reply)
                                        }
                                        Err(e) => LoopState::Failed(e),
                                    }
                                }
                            }
                        }
                    }
                }

                LoopState::ExecutingTools(reply) => {
                    let mut cancelled = false;
                    for call in reply.tool_calls() {
                        if cancelled {
                            session.messages.push(Message::tool_error(call.id, CANCELLED_RESULT));
                            continue;
                        }

                        let input_preview: String = call.input.to_string().chars().take(300).collect();
                        info!(tool_name = %call.name, tool_id = %call.id, input_preview = %input_preview, "Executing tool");

                        let outcome = tokio::select! {
                            biased;
                            () = self.cancel.cancelled() => None,
                            outcome = self.tools.execute(call.name, call.input.clone(), &mut session.state) => Some(outcome),
                        };
                        let Some(outcome) = outcome else {
                            warn!(tool_name = %call.name, "Tool execution cancelled");
                            cancelled = true;
                            session.messages.push(Message::tool_error(call.id, CANCELLED_RESULT));
                            continue;
                        };

                        let (message, output) = match outcome {
                            Ok(output) => {
                                let preview: String = output.chars().take(300).collect();
                                debug!(tool_name = %call.name, result_preview = %preview, "Tool succeeded");
                                (Message::tool_result(call.id, output.clone()), output)
                            }
                            Err(e) => {
                                warn!(tool_name = %call.name, error = %e, "Tool execution failed");
                                let output = format!("Error: {e}");
                                (Message::tool_error(call.id, output.clone()), output)
                            }
                        };

                        session.messages.push(message);
                        session.tool_calls.push(ToolCallRecord {
                            call_id: call.id.to_string(),
                            name: call.name.to_string(),
                            input: call.input.clone(),
                            output,
                        });
                    }

                    if cancelled {
                        LoopState::Failed(RuntimeError::Cancelled)
                    } else {
                        LoopState::AwaitingModel
                    }
                }

                LoopState::Done(text) => {
                    info!(thread_id, steps, response_length = text.len(), "Reasoning loop completed");
                    return Ok(text);
                }

                LoopState::Failed(error) => {
                    warn!(thread_id, steps, error = %error, "Reasoning loop failed");
                    return Err(error);
                }
            };
        }
    }

    async fn call_model(&self, history: Vec<Message>) -> Result<Message> {
        if self.cancel.is_cancelled() {
            return Err(RuntimeError::Cancelled);
        }

        let mut builder = CompletionRequest::builder(&self.config.model)
            .messages(history)
            .max_tokens(self.config.max_tokens)
            .tools(self.tools.definitions());
        if let Some(temperature) = self.config.temperature {
            builder = builder.temperature(temperature);
        }

        let response = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(RuntimeError::Cancelled),
            response = self.provider.complete(builder.build()) => response?,
        };

        info!(
            stop_reason = ?response.stop_reason,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "LLM response received"
        );
        Ok(response.message)
    }
}

async fn emit(tx: Option<&mpsc::Sender<TurnEvent>>, event: TurnEvent) -> Result<()> {
    match tx {
        Some(tx) => tx.send(event).await.map_err(|_| RuntimeError::Cancelled),
        None => Ok(()),
    }
}

/// Builder for ReasoningLoop
pub struct ReasoningLoopBuilder<S: Send> {
    provider: Arc<dyn LLMProvider>,
    tools: Arc<ToolRegistry<S>>,
    sessions: Arc<dyn SessionStore<S>>,
    config: LoopConfig,
    cancel: CancellationToken,
}

impl<S: Send + 'static> ReasoningLoopBuilder<S> {
    /// Set the full configuration
    pub fn config(mut self, config: LoopConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the model
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    /// Set the system prompt
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    /// Set the tool round ceiling
    pub fn recursion_limit(mut self, limit: usize) -> Self {
        self.config.recursion_limit = limit;
        self
    }

    /// Share an external cancellation token
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn build(self) -> ReasoningLoop<S> {
        ReasoningLoop {
            provider: self.provider,
            tools: self.tools,
            sessions: self.sessions,
            config: self.config,
            cancel: self.cancel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemorySessionStore;
    use agent_llm::mock::{ScriptedProvider, text, tool_calls};
    use agent_llm::{CompletionResponse, Role};
    use agent_tools::{Tool, params};
    use async_trait::async_trait;
    use serde_json::json;

    /// Appends its argument to the session state
    struct Note;

    #[async_trait]
    impl Tool<Vec<String>> for Note {
        async fn execute(&self, params: Value, state: &mut Vec<String>) -> agent_tools::Result<String> {
            let note = params::required_str(&params, "note")?;
            state.push(note.to_string());
            Ok(format!("noted {note}"))
        }

        fn name(&self) -> &str {
            "note"
        }

        fn description(&self) -> &str {
            "Remember a note"
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object", "properties": {"note": {"type": "string"}}, "required": ["note"]})
        }
    }

    /// Never finishes
    struct Stall;

    #[async_trait]
    impl Tool<Vec<String>> for Stall {
        async fn execute(&self, _params: Value, _state: &mut Vec<String>) -> agent_tools::Result<String> {
            std::future::pending().await
        }

        fn name(&self) -> &str {
            "stall"
        }

        fn description(&self) -> &str {
            "Wait forever"
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }
    }

    /// Every tool call in `messages` is answered by a tool message
    fn assert_calls_answered(messages: &[Message]) {
        let answered: Vec<&str> = messages.iter().filter_map(Message::tool_use_id).collect();
        for message in messages.iter().filter(|m| m.has_tool_calls()) {
            for call in message.tool_calls() {
                assert!(answered.contains(&call.id), "unanswered tool call {}", call.id);
            }
        }
    }

    fn build(
        provider: Arc<ScriptedProvider>,
        sessions: Arc<MemorySessionStore<Vec<String>>>,
    ) -> ReasoningLoop<Vec<String>> {
        ReasoningLoop::builder(provider, Arc::new(ToolRegistry::new().with(Note)), sessions)
            .system_prompt("sys")
            .build()
    }

    #[tokio::test]
    async fn test_tool_results_follow_call_order() {
        let provider = Arc::new(ScriptedProvider::new([
            tool_calls(&[
                ("note", json!({"note": "first"})),
                ("missing_tool", json!({})),
                ("note", json!({"bad": 1})),
                ("note", json!({"note": "second"})),
            ]),
            text("done"),
        ]));
        let sessions = Arc::new(MemorySessionStore::new());
        let agent = build(provider.clone(), sessions.clone());

        let answer = agent.run("t", vec![Message::user("go")]).await.unwrap();
        assert_eq!(answer, "done");

        let handle = sessions.open("t").await.unwrap();
        let session = handle.lock().await;
        assert_eq!(session.state, vec!["first", "second"]);

        let tool_ids: Vec<&str> = session
            .messages
            .iter()
            .filter_map(Message::tool_use_id)
            .collect();
        assert_eq!(tool_ids, vec!["call_0", "call_1", "call_2", "call_3"]);
        assert!(session.tool_calls[1].output.contains("Tool not found"));
        assert!(session.tool_calls[2].output.starts_with("Error: Invalid parameters"));

        // second request carries the four tool results
        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].messages.iter().filter(|m| m.role == Role::Tool).count(), 4);
        assert_eq!(requests[0].tools.as_ref().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_recursion_limit() {
        let looping: Vec<CompletionResponse> = (0..10)
            .map(|_| tool_calls(&[("note", json!({"note": "again"}))]))
            .collect();
        let provider = Arc::new(ScriptedProvider::new(looping));
        let agent = ReasoningLoop::builder(
            provider.clone(),
            Arc::new(ToolRegistry::new().with(Note)),
            Arc::new(MemorySessionStore::new()),
        )
        .recursion_limit(3)
        .build();

        let err = agent.run("t", vec![Message::user("loop")]).await.unwrap_err();
        assert!(matches!(err, RuntimeError::RecursionLimitExceeded { limit: 3 }));
        assert_eq!(provider.requests().len(), 4);
    }

    #[tokio::test]
    async fn test_session_accumulates_across_runs() {
        let provider = Arc::new(ScriptedProvider::new([text("one"), text("two")]));
        let sessions = Arc::new(MemorySessionStore::new());
        let agent = build(provider.clone(), sessions.clone());

        agent.run("t", vec![Message::user("a")]).await.unwrap();
        agent.run("t", vec![Message::user("b")]).await.unwrap();

        let requests = provider.requests();
        let second = &requests[1].messages;
        // system, a, one, b
        assert_eq!(second.len(), 4);
        assert_eq!(second.iter().filter(|m| m.role == Role::System).count(), 1);
        assert_eq!(second[2].text().as_deref(), Some("one"));
    }

    #[tokio::test]
    async fn test_fresh_thread_starts_empty() {
        let provider = Arc::new(ScriptedProvider::new([text("one"), text("two")]));
        let agent = build(provider.clone(), Arc::new(MemorySessionStore::new()));

        agent.run("a", vec![Message::user("x")]).await.unwrap();
        agent.run("b", vec![Message::user("y")]).await.unwrap();

        assert_eq!(provider.requests()[1].messages.len(), 2);
    }

    #[tokio::test]
    async fn test_streamed_events() {
        let provider = Arc::new(ScriptedProvider::new([
            tool_calls(&[("note", json!({"note": "n"}))]),
            text("final"),
        ]));
        let agent = build(provider, Arc::new(MemorySessionStore::new()));
        let (tx, mut rx) = mpsc::channel(8);

        let answer = agent
            .run_streamed("t", vec![Message::user("go")], &tx)
            .await
            .unwrap();
        drop(tx);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(answer, "final");
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], TurnEvent::ToolCalls { tools } if tools[0].name == "note"));
        assert_eq!(events[1], TurnEvent::Message { content: "final".to_string() });
    }

    #[tokio::test]
    async fn test_provider_error_keeps_partial_history() {
        let provider = Arc::new(ScriptedProvider::new([tool_calls(&[(
            "note",
            json!({"note": "kept"}),
        )])]));
        let sessions = Arc::new(MemorySessionStore::new());
        let agent = build(provider, sessions.clone());

        let err = agent.run("t", vec![Message::user("go")]).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Provider(_)));

        let handle = sessions.open("t").await.unwrap();
        let session = handle.lock().await;
        assert_eq!(session.state, vec!["kept"]);
        assert_eq!(session.messages.len(), 4);
    }

    struct Hanging;

    #[async_trait]
    impl LLMProvider for Hanging {
        async fn complete(&self, _request: CompletionRequest) -> agent_llm::Result<CompletionResponse> {
            std::future::pending().await
        }

        fn name(&self) -> &str {
            "hanging"
        }
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_model_call() {
        let token = CancellationToken::new();
        let agent: ReasoningLoop<Vec<String>> = ReasoningLoop::builder(
            Arc::new(Hanging),
            Arc::new(ToolRegistry::new()),
            Arc::new(MemorySessionStore::new()),
        )
        .cancellation(token.clone())
        .build();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            token.cancel();
        });

        let err = agent.run("t", vec![Message::user("wait")]).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Cancelled));
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_stream_cancels() {
        let provider = Arc::new(ScriptedProvider::new([text("unheard")]));
        let agent = build(provider, Arc::new(MemorySessionStore::new()));
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let err = agent
            .run_streamed("t", vec![Message::user("go")], &tx)
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Cancelled));
    }

    #[tokio::test]
    async fn test_thread_reusable_after_recursion_limit() {
        let provider = Arc::new(ScriptedProvider::new([
            tool_calls(&[("note", json!({"note": "one"}))]),
            tool_calls(&[("note", json!({"note": "two"}))]),
            text("recovered"),
        ]));
        let sessions = Arc::new(MemorySessionStore::new());
        let agent = ReasoningLoop::builder(
            provider.clone(),
            Arc::new(ToolRegistry::new().with(Note)),
            sessions.clone(),
        )
        .recursion_limit(1)
        .build();

        let err = agent.run("t", vec![Message::user("loop")]).await.unwrap_err();
        assert!(matches!(err, RuntimeError::RecursionLimitExceeded { limit: 1 }));
        {
            let handle = sessions.open("t").await.unwrap();
            let session = handle.lock().await;
            assert_eq!(session.state, vec!["one"]);
            assert_calls_answered(&session.messages);
            assert!(!session.messages.last().unwrap().has_tool_calls());
        }

        let answer = agent.run("t", vec![Message::user("again")]).await.unwrap();
        assert_eq!(answer, "recovered");

        let requests = provider.requests();
        assert_eq!(requests.len(), 3);
        assert_calls_answered(&requests[2].messages);
    }

    #[tokio::test]
    async fn test_closed_stream_drops_unrun_tool_calls() {
        let provider = Arc::new(ScriptedProvider::new([tool_calls(&[(
            "note",
            json!({"note": "never"}),
        )])]));
        let sessions = Arc::new(MemorySessionStore::new());
        let agent = build(provider, sessions.clone());
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let err = agent
            .run_streamed("t", vec![Message::user("go")], &tx)
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Cancelled));

        let handle = sessions.open("t").await.unwrap();
        let session = handle.lock().await;
        assert!(session.state.is_empty());
        // system, go
        assert_eq!(session.messages.len(), 2);
        assert_calls_answered(&session.messages);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_tool() {
        let provider = Arc::new(ScriptedProvider::new([tool_calls(&[
            ("stall", json!({})),
            ("note", json!({"note": "skipped"})),
        ])]));
        let sessions = Arc::new(MemorySessionStore::new());
        let token = CancellationToken::new();
        let agent = ReasoningLoop::builder(
            provider,
            Arc::new(ToolRegistry::new().with(Stall).with(Note)),
            sessions.clone(),
        )
        .cancellation(token.clone())
        .build();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            token.cancel();
        });

        let err = agent.run("t", vec![Message::user("wait")]).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Cancelled));
        canceller.await.unwrap();

        let handle = sessions.open("t").await.unwrap();
        let session = handle.lock().await;
        assert!(session.state.is_empty());
        let tool_ids: Vec<&str> = session
            .messages
            .iter()
            .filter_map(Message::tool_use_id)
            .collect();
        assert_eq!(tool_ids, vec!["call_0", "call_1"]);
        assert_calls_answered(&session.messages);
    }
}
