//! Typed progress events and the caller-owned queue that delivers them.
//!
//! The driver's caller owns the consuming half ([`EventStream`]); the
//! engine and the driver's background worker hold cloned producer halves
//! ([`EventPublisher`]). The worker enqueues a sentinel when it
//! terminates, which ends the stream. Producers never drop events; a
//! closed consumer is how the worker learns it has been abandoned.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::chain::{ChainMetrics, ReasoningStep};
use crate::task::{MessagePart, TaskState};

/// A progress event for one task execution.
///
/// Serialized with a `type` tag matching the SSE wire format
/// (`status`, `message`, `reasoning_step`, `done`, `error`, and the
/// three chain events).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    /// A reasoning chain began.
    ChainStarted {
        /// The task being executed.
        task_id: String,
        /// The new chain's id.
        chain_id: Uuid,
        /// Event time.
        timestamp: DateTime<Utc>,
    },
    /// A step was appended to the chain.
    ReasoningStep {
        /// The task being executed.
        task_id: String,
        /// The appended step.
        step: Box<ReasoningStep>,
        /// Event time.
        timestamp: DateTime<Utc>,
    },
    /// The chain finished successfully.
    ChainCompleted {
        /// The task being executed.
        task_id: String,
        /// The finished chain's id.
        chain_id: Uuid,
        /// Final rolled-up metrics.
        metrics: ChainMetrics,
        /// Event time.
        timestamp: DateTime<Utc>,
    },
    /// The chain finished with an error.
    ChainFailed {
        /// The task being executed.
        task_id: String,
        /// The failed chain's id.
        chain_id: Uuid,
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        error_message: String,
        /// Event time.
        timestamp: DateTime<Utc>,
    },
    /// The task changed lifecycle state.
    #[serde(rename = "status")]
    TaskStatus {
        /// The task being executed.
        task_id: String,
        /// Its new state.
        state: TaskState,
        /// Event time.
        timestamp: DateTime<Utc>,
    },
    /// The agent produced (part of) an answer message.
    #[serde(rename = "message")]
    TaskMessage {
        /// The task being executed.
        task_id: String,
        /// Message content parts.
        message_parts: Vec<MessagePart>,
        /// Whether more parts will follow.
        is_partial: bool,
        /// Event time.
        timestamp: DateTime<Utc>,
    },
    /// The task reached a terminal state.
    #[serde(rename = "done")]
    TaskDone {
        /// The task being executed.
        task_id: String,
        /// Its terminal state.
        final_state: TaskState,
        /// Event time.
        timestamp: DateTime<Utc>,
    },
    /// A task-level error, derivable from a chain failure.
    #[serde(rename = "error")]
    TaskError {
        /// The task being executed.
        task_id: String,
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        error_message: String,
        /// Event time.
        timestamp: DateTime<Utc>,
    },
}

impl TaskEvent {
    /// The task this event belongs to.
    #[must_use]
    pub fn task_id(&self) -> &str {
        match self {
            Self::ChainStarted { task_id, .. }
            | Self::ReasoningStep { task_id, .. }
            | Self::ChainCompleted { task_id, .. }
            | Self::ChainFailed { task_id, .. }
            | Self::TaskStatus { task_id, .. }
            | Self::TaskMessage { task_id, .. }
            | Self::TaskDone { task_id, .. }
            | Self::TaskError { task_id, .. } => task_id,
        }
    }

    /// The SSE event name for this event.
    #[must_use]
    pub const fn sse_event_name(&self) -> &'static str {
        match self {
            Self::ChainStarted { .. } => "chain_started",
            Self::ReasoningStep { .. } => "reasoning_step",
            Self::ChainCompleted { .. } => "chain_completed",
            Self::ChainFailed { .. } => "chain_failed",
            Self::TaskStatus { .. } => "status",
            Self::TaskMessage { .. } => "message",
            Self::TaskDone { .. } => "done",
            Self::TaskError { .. } => "error",
        }
    }
}

#[derive(Debug)]
pub(crate) enum QueueItem {
    Event(Box<TaskEvent>),
    Done,
}

/// Producer half of the caller-owned event queue.
///
/// Cloned into the engine and any delegated sub-agents so all producers
/// feed the single consumer.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    tx: mpsc::UnboundedSender<QueueItem>,
}

impl EventPublisher {
    /// Create a connected publisher/stream pair. The stream side is the
    /// single consumer.
    #[must_use]
    pub fn channel() -> (Self, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, EventStream { rx, finished: false })
    }

    /// Publish an event. Returns `false` when the consumer has gone
    /// away, which producers treat as a cancellation signal.
    pub fn publish(&self, event: TaskEvent) -> bool {
        self.tx.send(QueueItem::Event(Box::new(event))).is_ok()
    }

    /// Whether the consumer is still listening.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Enqueue the terminating sentinel. Called exactly once by the
    /// worker when it exits, success or not.
    pub(crate) fn finish(&self) {
        let _ = self.tx.send(QueueItem::Done);
    }
}

/// Consumer half of the event queue. Yields events in production order
/// and ends when the worker's sentinel arrives.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<QueueItem>,
    finished: bool,
}

impl EventStream {
    /// Receive the next event, or `None` once the worker has finished.
    pub async fn next_event(&mut self) -> Option<TaskEvent> {
        if self.finished {
            return None;
        }
        match self.rx.recv().await {
            Some(QueueItem::Event(event)) => Some(*event),
            Some(QueueItem::Done) | None => {
                self.finished = true;
                None
            }
        }
    }

    /// Drain every remaining event into a vector.
    pub async fn collect_events(mut self) -> Vec<TaskEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        events
    }
}

impl futures::Stream for EventStream {
    type Item = TaskEvent;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        if self.finished {
            return std::task::Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            std::task::Poll::Pending => std::task::Poll::Pending,
            std::task::Poll::Ready(Some(QueueItem::Event(event))) => {
                std::task::Poll::Ready(Some(*event))
            }
            std::task::Poll::Ready(Some(QueueItem::Done) | None) => {
                self.finished = true;
                std::task::Poll::Ready(None)
            }
        }
    }
}
