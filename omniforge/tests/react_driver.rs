//! End-to-end tests for the autonomous ReAct driver: happy path, gate
//! denials, malformed replies, iteration limits, and cancellation.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use omniforge::agent::{AutonomousDriver, DriverConfig};
use omniforge::chain::StepType;
use omniforge::events::TaskEvent;
use omniforge::executor::ToolExecutor;
use omniforge::limits::{ModelGovernance, ModelPolicy, RateLimitConfig, RateLimiter};
use omniforge::llm::{ChatProvider, MockProvider};
use omniforge::task::{Task, TaskMessage, TaskState};
use omniforge::tool::builtin::{FunctionTool, LlmTool};
use omniforge::tool::{ParameterType, ToolDefinition, ToolRegistry, ToolType};

fn calculator() -> FunctionTool {
    let definition = ToolDefinition::new("calculator", ToolType::Function, "Arithmetic")
        .param("a", ParameterType::Float, "Left operand")
        .param("b", ParameterType::Float, "Right operand")
        .optional_param("op", ParameterType::String, "add | sub | mul");
    FunctionTool::new(definition, |args| async move {
        let a = args.get("a").and_then(Value::as_f64).unwrap_or(0.0);
        let b = args.get("b").and_then(Value::as_f64).unwrap_or(0.0);
        match args.get("op").and_then(Value::as_str).unwrap_or("add") {
            "add" => Ok(json!(a + b)),
            "sub" => Ok(json!(a - b)),
            "mul" => Ok(json!(a * b)),
            other => Err(format!("unknown op '{other}'")),
        }
    })
}

fn registry_with(provider: MockProvider) -> Arc<ToolRegistry> {
    let registry = Arc::new(ToolRegistry::new());
    registry
        .register(
            LlmTool::new(Arc::new(provider) as Arc<dyn ChatProvider>, "claude-sonnet-4"),
            false,
        )
        .unwrap();
    registry.register(calculator(), false).unwrap();
    registry
}

fn simple_task(message: &str) -> Task {
    Task::new(
        "agent-1",
        "tenant-1",
        "user-1",
        vec![TaskMessage::user_text(message)],
    )
}

fn driver_for(registry: Arc<ToolRegistry>) -> AutonomousDriver {
    AutonomousDriver::new(
        Arc::new(ToolExecutor::new(registry)),
        DriverConfig::default(),
    )
}

#[tokio::test]
async fn happy_path_streams_the_expected_events() {
    let provider = MockProvider::new()
        .reply(
            r#"{"thought":"I'll compute it","action":"calculator","action_input":{"a":2,"b":2,"op":"add"},"is_final":false}"#,
        )
        .reply(r#"{"thought":"Done","action":"final_answer","action_input":"4","is_final":true}"#);

    let driver = driver_for(registry_with(provider));
    let handle = driver.submit(simple_task("What is 2+2?"));
    let events = handle.collect_events().await;

    // Order: chain_started first, working status next, done(completed) last.
    assert!(matches!(events[0], TaskEvent::ChainStarted { .. }));
    assert!(matches!(
        events[1],
        TaskEvent::TaskStatus {
            state: TaskState::Working,
            ..
        }
    ));
    assert!(matches!(
        events.last(),
        Some(TaskEvent::TaskDone {
            final_state: TaskState::Completed,
            ..
        })
    ));

    // The answer message carries "4".
    let message = events
        .iter()
        .find_map(|e| match e {
            TaskEvent::TaskMessage { message_parts, .. } => message_parts[0].as_text(),
            _ => None,
        })
        .unwrap();
    assert_eq!(message, "4");

    // chain_completed precedes done.
    let completed_pos = events
        .iter()
        .position(|e| matches!(e, TaskEvent::ChainCompleted { .. }))
        .unwrap();
    let done_pos = events
        .iter()
        .position(|e| matches!(e, TaskEvent::TaskDone { .. }))
        .unwrap();
    assert!(completed_pos < done_pos);

    // The reasoning steps include, in order: a thought, the calculator
    // call and its result, the final thought, and the synthesis.
    let step_types: Vec<StepType> = events
        .iter()
        .filter_map(|e| match e {
            TaskEvent::ReasoningStep { step, .. } => Some(step.step_type()),
            _ => None,
        })
        .collect();
    let calculator_sequence: Vec<StepType> = step_types
        .iter()
        .copied()
        .filter(|t| *t != StepType::ToolCall && *t != StepType::ToolResult)
        .collect();
    assert_eq!(
        calculator_sequence,
        vec![StepType::Thinking, StepType::Thinking, StepType::Synthesis]
    );
    // Tool steps always come in call/result pairs (llm and calculator).
    assert_eq!(
        step_types
            .iter()
            .filter(|t| **t == StepType::ToolCall)
            .count(),
        step_types
            .iter()
            .filter(|t| **t == StepType::ToolResult)
            .count()
    );

    // The chain metrics event reflects the two model calls and the
    // calculator call.
    let metrics = events
        .iter()
        .find_map(|e| match e {
            TaskEvent::ChainCompleted { metrics, .. } => Some(*metrics),
            _ => None,
        })
        .unwrap();
    assert_eq!(metrics.llm_calls, 2);
    assert_eq!(metrics.tool_calls, 3);
}

#[tokio::test]
async fn unknown_action_is_an_observation_not_a_crash() {
    // Only llm + calculator are registered; the model insists on "shell".
    let provider = MockProvider::new()
        .reply(r#"{"thought":"try shell","action":"shell","action_input":{"cmd":"ls"},"is_final":false}"#)
        .reply(r#"{"thought":"try again","action":"shell","action_input":{"cmd":"ls"},"is_final":false}"#);

    let registry = registry_with(provider);
    let driver = AutonomousDriver::new(
        Arc::new(ToolExecutor::new(registry)),
        DriverConfig {
            max_iterations: 2,
            ..DriverConfig::default()
        },
    );

    let events = driver.submit(simple_task("run ls")).collect_events().await;

    // The gated call is visible as a failing tool_result step.
    let shell_result = events
        .iter()
        .find_map(|e| match e {
            TaskEvent::ReasoningStep { step, .. } => match &step.payload {
                omniforge::chain::StepPayload::ToolResult(info)
                    if !info.success
                        && info.error.as_deref().is_some_and(|m| m.contains("shell")) =>
                {
                    Some(info.clone())
                }
                _ => None,
            },
            _ => None,
        })
        .unwrap();
    assert!(shell_result.error.unwrap().contains("not registered"));

    // The loop kept going until the iteration budget, then failed.
    let failure = events
        .iter()
        .find_map(|e| match e {
            TaskEvent::ChainFailed { error_code, .. } => Some(error_code.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(failure, "max_iterations_exceeded");
    assert!(matches!(
        events.last(),
        Some(TaskEvent::TaskDone {
            final_state: TaskState::Failed,
            ..
        })
    ));
}

#[tokio::test]
async fn max_iterations_one_with_non_final_reply_fails() {
    let provider = MockProvider::new().reply(
        r#"{"thought":"still working","action":"calculator","action_input":{"a":1,"b":1},"is_final":false}"#,
    );
    let driver = AutonomousDriver::new(
        Arc::new(ToolExecutor::new(registry_with(provider))),
        DriverConfig {
            max_iterations: 1,
            ..DriverConfig::default()
        },
    );

    let events = driver.submit(simple_task("loop")).collect_events().await;
    let error_code = events
        .iter()
        .find_map(|e| match e {
            TaskEvent::ChainFailed { error_code, .. } => Some(error_code.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(error_code, "max_iterations_exceeded");
}

#[tokio::test]
async fn three_malformed_replies_fail_the_chain() {
    let provider = MockProvider::new()
        .reply("the answer is four")
        .reply("still not json")
        .reply("{broken");
    let driver = driver_for(registry_with(provider));

    let events = driver.submit(simple_task("2+2?")).collect_events().await;

    let (code, message) = events
        .iter()
        .find_map(|e| match e {
            TaskEvent::ChainFailed {
                error_code,
                error_message,
                ..
            } => Some((error_code.clone(), error_message.clone())),
            _ => None,
        })
        .unwrap();
    assert_eq!(code, "reasoning_failed");
    assert!(message.contains("malformed"));
    assert!(matches!(
        events.last(),
        Some(TaskEvent::TaskDone {
            final_state: TaskState::Failed,
            ..
        })
    ));
}

#[tokio::test]
async fn a_single_malformed_reply_recovers() {
    let provider = MockProvider::new()
        .reply("oops, plain prose")
        .reply(r#"{"thought":"done","action":"final_answer","action_input":"fine","is_final":true}"#);
    let driver = driver_for(registry_with(provider));

    let events = driver.submit(simple_task("hello")).collect_events().await;
    assert!(matches!(
        events.last(),
        Some(TaskEvent::TaskDone {
            final_state: TaskState::Completed,
            ..
        })
    ));
}

#[tokio::test]
async fn rate_limited_tenant_fails_third_task() {
    // Two llm calls per minute; three tasks needing one call each.
    let rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig {
        llm_calls_per_minute: 2,
        ..RateLimitConfig::default()
    }));
    let final_reply =
        r#"{"thought":"done","action":"final_answer","action_input":"ok","is_final":true}"#;
    let provider = MockProvider::new().reply(final_reply).reply(final_reply);

    let executor =
        Arc::new(ToolExecutor::new(registry_with(provider)).with_rate_limiter(rate_limiter));
    let driver = AutonomousDriver::new(executor, DriverConfig::default());

    for expected in [TaskState::Completed, TaskState::Completed, TaskState::Failed] {
        let events = driver.submit(simple_task("one call")).collect_events().await;
        let final_state = events
            .iter()
            .find_map(|e| match e {
                TaskEvent::TaskDone { final_state, .. } => Some(*final_state),
                _ => None,
            })
            .unwrap();
        assert_eq!(final_state, expected);
    }
}

#[tokio::test]
async fn rate_limit_failure_mentions_rate_in_the_chain() {
    let rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig {
        llm_calls_per_minute: 0,
        ..RateLimitConfig::default()
    }));
    let provider = MockProvider::new();
    let executor =
        Arc::new(ToolExecutor::new(registry_with(provider)).with_rate_limiter(rate_limiter));
    let driver = AutonomousDriver::new(executor, DriverConfig::default());

    let events = driver.submit(simple_task("gated")).collect_events().await;
    let message = events
        .iter()
        .find_map(|e| match e {
            TaskEvent::ChainFailed { error_message, .. } => Some(error_message.clone()),
            _ => None,
        })
        .unwrap();
    assert!(message.contains("rate limit"));
}

#[tokio::test]
async fn cost_policy_failure_mentions_cost() {
    let governance = Arc::new(ModelGovernance::with_default_policy(ModelPolicy {
        max_cost_per_call_usd: Some(0.000_000_1),
        ..ModelPolicy::default()
    }));
    let provider = MockProvider::new();
    let executor =
        Arc::new(ToolExecutor::new(registry_with(provider)).with_governance(governance));
    let driver = AutonomousDriver::new(executor, DriverConfig::default());

    let events = driver
        .submit(simple_task("a message long enough to estimate tokens from"))
        .collect_events()
        .await;

    let (code, message) = events
        .iter()
        .find_map(|e| match e {
            TaskEvent::ChainFailed {
                error_code,
                error_message,
                ..
            } => Some((error_code.clone(), error_message.clone())),
            _ => None,
        })
        .unwrap();
    assert_eq!(code, "reasoning_failed");
    assert!(message.contains("cost"));
}

#[tokio::test]
async fn cancellation_emits_cancelled_terminal_state() {
    // A tool that sleeps long enough for the cancel to land.
    let registry = Arc::new(ToolRegistry::new());
    let provider = MockProvider::new().reply(
        r#"{"thought":"wait","action":"sleepy","action_input":{},"is_final":false}"#,
    );
    registry
        .register(
            LlmTool::new(Arc::new(provider) as Arc<dyn ChatProvider>, "claude-sonnet-4"),
            false,
        )
        .unwrap();
    registry
        .register(
            FunctionTool::new(
                ToolDefinition::new("sleepy", ToolType::Function, "Sleeps"),
                |_args| async move {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(Value::Null)
                },
            ),
            false,
        )
        .unwrap();

    let driver = driver_for(registry);
    let mut handle = driver.submit(simple_task("wait for me"));
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.cancel();

    let mut events = Vec::new();
    while let Some(event) = handle.next_event().await {
        events.push(event);
    }

    let final_state = events
        .iter()
        .find_map(|e| match e {
            TaskEvent::TaskDone { final_state, .. } => Some(*final_state),
            _ => None,
        })
        .unwrap();
    assert_eq!(final_state, TaskState::Cancelled);

    let code = events
        .iter()
        .find_map(|e| match e {
            TaskEvent::ChainFailed { error_code, .. } => Some(error_code.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(code, "cancelled");
}

#[tokio::test]
async fn empty_task_uses_the_fallback_prompt() {
    let provider = MockProvider::new().reply(
        r#"{"thought":"nothing to do","action":"final_answer","action_input":"hello","is_final":true}"#,
    );
    let registry = registry_with(provider);
    let driver = driver_for(Arc::clone(&registry));

    let mut task = simple_task("ignored");
    task.messages.clear();
    let events = driver.submit(task).collect_events().await;

    assert!(matches!(
        events.last(),
        Some(TaskEvent::TaskDone {
            final_state: TaskState::Completed,
            ..
        })
    ));
}

#[tokio::test]
async fn events_preserve_per_task_production_order() {
    let provider = MockProvider::new().reply(
        r#"{"thought":"done","action":"final_answer","action_input":"ok","is_final":true}"#,
    );
    let driver = driver_for(registry_with(provider));
    let events = driver.submit(simple_task("hi")).collect_events().await;

    // chain_started strictly precedes every reasoning step; the done
    // event is last.
    let started = events
        .iter()
        .position(|e| matches!(e, TaskEvent::ChainStarted { .. }))
        .unwrap();
    let first_step = events
        .iter()
        .position(|e| matches!(e, TaskEvent::ReasoningStep { .. }))
        .unwrap();
    assert!(started < first_step);
    assert!(matches!(events.last(), Some(TaskEvent::TaskDone { .. })));
}
