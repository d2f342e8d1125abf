use thiserror::Error;

#[derive(Debug, Error)]
pub enum IncantError {
    #[error("duplicate tool: {0}")]
    DuplicateTool(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid tool schema: {0}")]
    SchemaValidation(String),

    #[error("template expansion failed: {0}")]
    Template(String),

    #[error("config error: {0}")]
    ConfigLoad(String),

    #[error("batch script error: {0}")]
    ScriptParse(String),

    #[error("plugin rejected: {0}")]
    PluginValidation(String),
}
