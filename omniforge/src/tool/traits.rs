//! The core [`Tool`] trait.

use async_trait::async_trait;
use serde_json::Value;

use super::definition::{ToolCallContext, ToolDefinition, ToolResult};

/// A registered side-effect with a typed schema and a timeout.
///
/// Tools are infallible at the trait level: anything that goes wrong is
/// encoded in the returned [`ToolResult`], which is what lets the
/// executor feed failures back to the model as observations instead of
/// unwinding the loop.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The tool's definition (name, type, parameters, timeout).
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with model-supplied `arguments`.
    async fn execute(&self, context: &ToolCallContext, arguments: &Value) -> ToolResult;
}

/// Boxed, shareable tool handle stored in the registry.
pub type BoxedTool = std::sync::Arc<dyn Tool>;

/// Validate model-supplied arguments against a definition's declared
/// parameters. Returns the first missing required parameter, if any.
#[must_use]
pub fn missing_required_argument<'a>(
    definition: &'a ToolDefinition,
    arguments: &Value,
) -> Option<&'a str> {
    definition
        .parameters
        .iter()
        .filter(|p| p.required)
        .find(|p| arguments.get(&p.name).is_none())
        .map(|p| p.name.as_str())
}
