pub mod builtin;
pub mod schema;

use std::collections::HashMap;

use crate::error::IncantError;
use schema::ToolSchema;

/// Catalog of declared tools. Schemas are immutable after registration and
/// owned exclusively by the registry; everything downstream borrows.
///
/// Read-mostly after startup — wrap in `Arc` to share across sessions.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<ToolSchema>,
    by_name: HashMap<String, usize>,
    /// keyword → tool indices, maintained on registration. The resolver uses
    /// it to shortlist candidates without walking every schema.
    keyword_index: HashMap<String, Vec<usize>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tool_count", &self.tools.len())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in tool set.
    pub fn with_builtins() -> Self {
        Self::with_builtins_for(true)
    }

    /// Preloaded registry where the delete tool honors the
    /// `trash_instead_of_delete` preference.
    pub fn with_builtins_for(trash_instead_of_delete: bool) -> Self {
        let mut registry = Self::new();
        for schema in builtin::builtin_tools_with(trash_instead_of_delete) {
            // Built-in names are unique by construction.
            registry
                .register(schema)
                .expect("builtin tools must register");
        }
        registry
    }

    /// Register a schema. Runs the static schema check, rejects name
    /// collisions, and updates the keyword index.
    pub fn register(&mut self, schema: ToolSchema) -> Result<(), IncantError> {
        schema.validate()?;
        if self.by_name.contains_key(&schema.name) {
            return Err(IncantError::DuplicateTool(schema.name));
        }

        let index = self.tools.len();
        self.by_name.insert(schema.name.clone(), index);
        for keyword in &schema.keywords {
            self.keyword_index
                .entry(keyword.to_lowercase())
                .or_default()
                .push(index);
        }
        self.tools.push(schema);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&ToolSchema, IncantError> {
        self.by_name
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| IncantError::UnknownTool(name.to_owned()))
    }

    /// Lazy, restartable walk over every registered schema, in
    /// registration order.
    pub fn all(&self) -> impl Iterator<Item = &ToolSchema> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tools whose declared keywords include `word`, in registration order.
    pub fn by_keyword(&self, word: &str) -> impl Iterator<Item = &ToolSchema> {
        self.keyword_index
            .get(&word.to_lowercase())
            .into_iter()
            .flatten()
            .map(|&i| &self.tools[i])
    }
}
