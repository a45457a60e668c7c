//! Thread-safe, insertion-order-preserving tool registry.

use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use crate::error::{Error, Result};

use super::definition::{ToolDefinition, ToolType};
use super::traits::{BoxedTool, Tool};

/// Name-keyed map of registered tools.
///
/// Registration order is preserved for listing; reads never block each
/// other. All paths are safe under concurrent callers.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<Vec<(String, BoxedTool)>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = self.list(None);
        f.debug_struct("ToolRegistry").field("tools", &names).finish()
    }
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its definition name.
    ///
    /// Fails with [`Error::ToolAlreadyRegistered`] when the name is taken
    /// and `replace` is `false`.
    pub fn register(&self, tool: impl Tool + 'static, replace: bool) -> Result<()> {
        self.register_boxed(Arc::new(tool), replace)
    }

    /// Register an already-boxed tool.
    pub fn register_boxed(&self, tool: BoxedTool, replace: bool) -> Result<()> {
        let name = tool.definition().name;
        let mut tools = self
            .tools
            .write()
            .map_err(|_| Error::Internal("tool registry lock poisoned".into()))?;

        if let Some(slot) = tools.iter_mut().find(|(n, _)| *n == name) {
            if !replace {
                return Err(Error::ToolAlreadyRegistered(name));
            }
            slot.1 = tool;
            return Ok(());
        }
        tools.push((name, tool));
        Ok(())
    }

    /// Remove a tool by name.
    pub fn unregister(&self, name: &str) -> Result<()> {
        let mut tools = self
            .tools
            .write()
            .map_err(|_| Error::Internal("tool registry lock poisoned".into()))?;
        let before = tools.len();
        tools.retain(|(n, _)| n != name);
        if tools.len() == before {
            return Err(Error::ToolNotFound(name.to_owned()));
        }
        Ok(())
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Result<BoxedTool> {
        self.tools
            .read()
            .ok()
            .and_then(|tools| {
                tools
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, t)| Arc::clone(t))
            })
            .ok_or_else(|| Error::ToolNotFound(name.to_owned()))
    }

    /// Look up a tool's definition by name.
    pub fn get_definition(&self, name: &str) -> Result<ToolDefinition> {
        self.get(name).map(|t| t.definition())
    }

    /// Whether a tool with this name is registered.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.tools
            .read()
            .is_ok_and(|tools| tools.iter().any(|(n, _)| n == name))
    }

    /// Sorted names of registered tools, optionally filtered by type.
    #[must_use]
    pub fn list(&self, tool_type: Option<ToolType>) -> Vec<String> {
        let mut names: Vec<String> = self
            .tools
            .read()
            .map(|tools| {
                tools
                    .iter()
                    .filter(|(_, t)| tool_type.is_none_or(|ty| t.definition().tool_type == ty))
                    .map(|(n, _)| n.clone())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Definitions of every registered tool, in registration order.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .read()
            .map(|tools| tools.iter().map(|(_, t)| t.definition()).collect())
            .unwrap_or_default()
    }

    /// Remove every registered tool.
    pub fn clear(&self) {
        if let Ok(mut tools) = self.tools.write() {
            tools.clear();
        }
    }
}

static DEFAULT_REGISTRY: Lazy<Arc<ToolRegistry>> = Lazy::new(|| Arc::new(ToolRegistry::new()));

/// The process-wide default registry.
///
/// Initialized on first access and never torn down. Tests should build
/// private [`ToolRegistry`] instances instead of mutating this one.
#[must_use]
pub fn default_registry() -> Arc<ToolRegistry> {
    Arc::clone(&DEFAULT_REGISTRY)
}
