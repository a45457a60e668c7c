//! Strict parsing of ReAct-protocol model replies.
//!
//! The driver asks the model for exactly this JSON shape:
//!
//! ```json
//! { "thought": "...", "action": "<tool_name or 'final_answer'>",
//!   "action_input": { } , "is_final": false }
//! ```
//!
//! Markdown code fences are tolerated and stripped; everything else is
//! validated strictly so a malformed reply is caught here rather than
//! half-way through dispatch.

use serde_json::Value;

/// A parsed ReAct reply.
#[derive(Debug, Clone)]
pub struct ReactReply {
    /// The model's reasoning for this step.
    pub thought: String,
    /// Tool name to dispatch, or `"final_answer"`.
    pub action: String,
    /// Arguments for the tool, or the final answer payload.
    pub action_input: Value,
    /// Whether the model considers the task finished. Dominates
    /// `action` when `true`.
    pub is_final: bool,
}

impl ReactReply {
    /// Whether this reply terminates the loop.
    #[must_use]
    pub fn terminates(&self) -> bool {
        self.is_final || self.action == "final_answer"
    }

    /// The final answer as a string: string inputs pass through,
    /// anything else is serialized.
    #[must_use]
    pub fn answer_text(&self) -> String {
        match &self.action_input {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// Strip an optional leading/trailing markdown code fence.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop a language tag like ```json.
    let rest = rest
        .split_once('\n')
        .map_or(rest.trim_start_matches(|c: char| c.is_alphanumeric()), |(_, body)| body);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse and validate a ReAct reply.
///
/// Returns a description of the defect on failure: not JSON, not an
/// object, or a missing/mistyped required field.
pub fn parse_react_reply(text: &str) -> Result<ReactReply, String> {
    let cleaned = strip_code_fences(text);
    let value: Value =
        serde_json::from_str(cleaned).map_err(|e| format!("reply is not valid JSON: {e}"))?;

    let Value::Object(ref object) = value else {
        return Err("reply must be a JSON object".into());
    };

    let thought = match object.get("thought") {
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err("'thought' must be a string".into()),
        None => return Err("missing required field 'thought'".into()),
    };
    let action = match object.get("action") {
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err("'action' must be a string".into()),
        None => return Err("missing required field 'action'".into()),
    };
    let is_final = match object.get("is_final") {
        Some(Value::Bool(b)) => *b,
        Some(_) => return Err("'is_final' must be a boolean".into()),
        None => return Err("missing required field 'is_final'".into()),
    };
    let action_input = object.get("action_input").cloned().unwrap_or(Value::Null);

    Ok(ReactReply {
        thought,
        action,
        action_input,
        is_final,
    })
}
