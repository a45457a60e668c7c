//! Omniforge: a multi-tenant autonomous agent execution runtime.
//!
//! The runtime drives LLM-backed agents through a Reason-Act-Observe
//! loop, executes tool calls on their behalf, enforces per-tenant
//! quotas, records a fully-inspectable reasoning chain, and streams
//! typed progress events to the caller in real time.
//!
//! # Architecture
//!
//! ```text
//! caller -> AutonomousDriver::submit(task) -> background worker
//!     worker: build prompt -> llm (via ReasoningEngine)
//!             -> parse ReAct JSON -> ToolExecutor
//!                  gates (RateLimiter, ModelGovernance, budget)
//!                  -> Tool -> record into ReasoningChain
//!             -> loop until final answer or max iterations
//!     caller: drains TaskHandle events -> SSE / anything
//!     completion: chain persisted (ChainRepository); sentinel ends stream
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use omniforge::agent::{AutonomousDriver, DriverConfig};
//! use omniforge::executor::ToolExecutor;
//! use omniforge::llm::{ChatProvider, MockProvider};
//! use omniforge::task::{Task, TaskMessage};
//! use omniforge::tool::builtin::LlmTool;
//! use omniforge::tool::ToolRegistry;
//!
//! # async fn run() {
//! let registry = Arc::new(ToolRegistry::new());
//! let provider = Arc::new(MockProvider::new().reply(
//!     r#"{"thought":"done","action":"final_answer","action_input":"42","is_final":true}"#,
//! ));
//! registry
//!     .register(LlmTool::new(provider as Arc<dyn ChatProvider>, "claude-sonnet-4"), false)
//!     .unwrap();
//!
//! let driver = AutonomousDriver::new(
//!     Arc::new(ToolExecutor::new(registry)),
//!     DriverConfig::default(),
//! );
//! let task = Task::new("agent-1", "tenant-1", "user-1", vec![TaskMessage::user_text("hi")]);
//! let mut handle = driver.submit(task);
//! while let Some(event) = handle.next_event().await {
//!     println!("{}", event.sse_event_name());
//! }
//! # }
//! ```

pub mod agent;
pub mod chain;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod executor;
pub mod limits;
pub mod llm;
pub mod repository;
pub mod server;
pub mod task;
pub mod tool;
pub mod visibility;

pub use error::{Error, Result};
