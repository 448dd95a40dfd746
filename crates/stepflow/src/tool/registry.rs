//! Tool registry: declared tools and their optional executors.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;

use super::ToolHandler;
use crate::{Error, ToolCall, ToolDefinition};

/// A registered tool: its declaration plus an executor, if it has one.
#[derive(Clone)]
struct RegisteredTool {
    definition: ToolDefinition,
    handler: Option<Arc<dyn ToolHandler>>,
}

/// The tools the model may call, indexed by name.
///
/// A tool either has an executor ([`register`](Self::register)) or is
/// only declared ([`declare`](Self::declare)). Declared-only tools are
/// sent to the model like any other; their calls are forwarded to the
/// caller and never get a result.
///
/// Lookups are read-only while a call runs; share one registry across
/// calls with `Arc<ToolRegistry>`.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool with an executor.
    ///
    /// If a tool with the same name already exists, it is replaced.
    pub fn register(&mut self, handler: impl ToolHandler + 'static) -> &mut Self {
        self.register_shared(Arc::new(handler))
    }

    /// Registers a shared tool handler.
    pub fn register_shared(&mut self, handler: Arc<dyn ToolHandler>) -> &mut Self {
        let definition = handler.definition();
        self.tools.insert(
            definition.name.clone(),
            RegisteredTool {
                definition,
                handler: Some(handler),
            },
        );
        self
    }

    /// Declares a tool without an executor. Its calls are resolved by the
    /// caller.
    pub fn declare(&mut self, definition: ToolDefinition) -> &mut Self {
        self.tools.insert(
            definition.name.clone(),
            RegisteredTool {
                definition,
                handler: None,
            },
        );
        self
    }

    /// Returns the executor for `name`, if the tool exists and has one.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ToolHandler>> {
        self.tools.get(name).and_then(|t| t.handler.as_ref())
    }

    /// Returns the declaration for `name`.
    pub fn definition(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name).map(|t| &t.definition)
    }

    /// Returns whether a tool with the given name is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Declarations of every tool, sorted by name.
    ///
    /// Pass this to [`ModelRequest::tools`](crate::ModelRequest::tools).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> =
            self.tools.values().map(|t| t.definition.clone()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of declared tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns true if no tools are declared.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Returns a new registry excluding the named tools.
    ///
    /// ```rust
    /// use stepflow::ToolRegistry;
    ///
    /// let full = ToolRegistry::new();
    /// let restricted = full.without(["delete_file"]);
    /// assert!(restricted.is_empty());
    /// ```
    #[must_use]
    pub fn without<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Self {
        let exclude: HashSet<&str> = names.into_iter().collect();
        self.filtered(|name| !exclude.contains(name))
    }

    /// Returns a new registry with only the named tools. Use it to limit
    /// the active tools for one request.
    #[must_use]
    pub fn only<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Self {
        let include: HashSet<&str> = names.into_iter().collect();
        self.filtered(|name| include.contains(name))
    }

    fn filtered(&self, keep: impl Fn(&str) -> bool) -> Self {
        Self {
            tools: self
                .tools
                .iter()
                .filter(|(name, _)| keep(name.as_str()))
                .map(|(name, tool)| (name.clone(), tool.clone()))
                .collect(),
        }
    }

    /// Checks `arguments` against the parameter schema of `name`.
    ///
    /// Without the `schema` feature every argument value is accepted.
    pub fn validate_arguments(&self, name: &str, arguments: &Value) -> Result<(), Error> {
        let definition = self.definition(name).ok_or_else(|| self.no_such_tool(name))?;
        definition
            .parameters
            .check(arguments)
            .map_err(|e| Error::InvalidToolArguments {
                tool_name: name.to_owned(),
                arguments: arguments.clone(),
                message: e.to_string(),
            })
    }

    /// Resolves a complete tool call before it is forwarded.
    ///
    /// Fails with [`Error::NoSuchTool`] for undeclared tools and
    /// [`Error::InvalidToolArguments`] for arguments that violate the
    /// schema. Otherwise returns the executor, or `None` for a
    /// declared-only tool.
    pub fn resolve(&self, call: &ToolCall) -> Result<Option<Arc<dyn ToolHandler>>, Error> {
        self.validate_arguments(&call.name, &call.arguments)?;
        Ok(self.get(&call.name).cloned())
    }

    fn no_such_tool(&self, name: &str) -> Error {
        Error::NoSuchTool {
            tool_name: name.to_owned(),
            available_tools: self.names(),
        }
    }
}
