//! End-to-end report pipeline and its progress stream

mod orchestrator;

pub use orchestrator::Orchestrator;

use agent_runtime::TurnEvent;
use futures::Stream;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Kind of a progress event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Progress,
    Analyzing,
    Complete,
    Error,
}

/// One record of the progress stream, `{status, step, message | data}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub status: EventStatus,
    pub step: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ProgressEvent {
    pub fn progress(step: &str, message: impl Into<String>) -> Self {
        Self {
            status: EventStatus::Progress,
            step: step.to_string(),
            message: Some(message.into()),
            data: None,
        }
    }

    /// A reasoning turn of analysis step `step` (1-based)
    pub fn analyzing(step: usize, turn: &TurnEvent) -> Self {
        Self {
            status: EventStatus::Analyzing,
            step: step.to_string(),
            message: None,
            data: serde_json::to_value(turn).ok(),
        }
    }

    pub fn complete(data: Value) -> Self {
        Self {
            status: EventStatus::Complete,
            step: "complete".to_string(),
            message: Some("分析完成".to_string()),
            data: Some(data),
        }
    }

    /// Failure during `step`
    pub fn error(step: &str, message: impl Into<String>) -> Self {
        Self {
            status: EventStatus::Error,
            step: step.to_string(),
            message: Some(message.into()),
            data: None,
        }
    }

    /// `status/step`, e.g. `progress/download`
    pub fn tag(&self) -> String {
        let status = match self.status {
            EventStatus::Progress => "progress",
            EventStatus::Analyzing => "analyzing",
            EventStatus::Complete => "complete",
            EventStatus::Error => "error",
        };
        format!("{status}/{}", self.step)
    }

    /// Whether no further events follow this one
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, EventStatus::Complete | EventStatus::Error)
    }
}

/// Consumer side of a running pipeline
///
/// Dropping the run, or the stream made from it, cancels the producer.
pub struct PipelineRun {
    events: mpsc::Receiver<ProgressEvent>,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl PipelineRun {
    pub(crate) fn new(events: mpsc::Receiver<ProgressEvent>, cancel: CancellationToken) -> Self {
        Self {
            events,
            _guard: cancel.clone().drop_guard(),
            cancel,
        }
    }

    /// Next event; `None` once the pipeline has finished
    pub async fn next(&mut self) -> Option<ProgressEvent> {
        self.events.recv().await
    }

    /// Abort the in-flight stage; no further events are emitted
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drain every remaining event
    pub async fn collect(mut self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event);
        }
        events
    }

    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent> + Send {
        futures::stream::unfold(self, |mut run| async move {
            let event = run.next().await?;
            Some((event, run))
        })
    }
}
