//! Reasoning chain model: the fully-inspectable record of an agent's
//! work on one task.

#[allow(clippy::module_inception)]
mod chain;
mod step;

pub use chain::{ChainMetrics, ChainStatus, ReasoningChain};
pub use step::{
    ReasoningStep, StepPayload, StepType, StepVisibility, SynthesisInfo, ThinkingInfo,
    ToolCallInfo, ToolResultInfo, VisibilityLevel,
};
