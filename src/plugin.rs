//! Plugin tool packs: TOML manifests that contribute extra tool schemas.
//!
//! A manifest declares tools in a declarative form. Installation is
//! plugin-atomic: every tool in the manifest must convert and validate
//! before any of them is registered, and tool names are namespaced as
//! `<plugin>_<tool>` so packs cannot collide with builtins or each other.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::IncantError;
use crate::registry::schema::{
    ArgCheck, ArgSpec, ArgType, ArgValue, BoundArgs, Clause, Condition, DangerLevel, Example,
    Generator, ToolSchema,
};
use crate::registry::ToolRegistry;

const MAX_MANIFEST_SIZE: u64 = 64 * 1024;

#[derive(Debug, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    tools: Vec<PluginTool>,
}

#[derive(Debug, Deserialize)]
struct PluginTool {
    name: String,
    summary: String,
    command: String,
    #[serde(default)]
    danger: DangerSpec,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    requires_confirmation: bool,
    #[serde(default)]
    args: Vec<PluginArg>,
    #[serde(default)]
    clauses: Vec<PluginClause>,
    #[serde(default)]
    examples: Vec<PluginExample>,
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum DangerSpec {
    #[default]
    ReadOnly,
    Safe,
    Destructive,
}

impl From<DangerSpec> for DangerLevel {
    fn from(spec: DangerSpec) -> Self {
        match spec {
            DangerSpec::ReadOnly => DangerLevel::ReadOnly,
            DangerSpec::Safe => DangerLevel::Safe,
            DangerSpec::Destructive => DangerLevel::Destructive,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PluginArg {
    name: String,
    #[serde(rename = "type")]
    ty: TypeSpec,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    default: Option<toml::Value>,
    #[serde(default)]
    check: Option<CheckSpec>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum TypeSpec {
    String,
    Number,
    Boolean,
    Array,
}

impl From<TypeSpec> for ArgType {
    fn from(spec: TypeSpec) -> Self {
        match spec {
            TypeSpec::String => ArgType::String,
            TypeSpec::Number => ArgType::Number,
            TypeSpec::Boolean => ArgType::Boolean,
            TypeSpec::Array => ArgType::Array,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum CheckSpec {
    Path,
    Identifier,
    Size,
    Duration,
    Port,
    Glob,
}

impl From<CheckSpec> for ArgCheck {
    fn from(spec: CheckSpec) -> Self {
        match spec {
            CheckSpec::Path => ArgCheck::Path,
            CheckSpec::Identifier => ArgCheck::Identifier,
            CheckSpec::Size => ArgCheck::SizeSpec,
            CheckSpec::Duration => ArgCheck::Duration,
            CheckSpec::Port => ArgCheck::Port,
            CheckSpec::Glob => ArgCheck::GlobPattern,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PluginClause {
    name: String,
    template: String,
    /// `bound:arg`, `is_true:arg`, `non_empty:arg`, `eq:arg:value`, or
    /// `len_at_least:arg:n`.
    condition: String,
}

#[derive(Debug, Deserialize)]
struct PluginExample {
    utterance: String,
    #[serde(default)]
    args: toml::Table,
}

impl PluginManifest {
    pub fn parse(text: &str) -> Result<Self, IncantError> {
        toml::from_str(text).map_err(|err| IncantError::PluginValidation(err.to_string()))
    }

    /// Convert every declared tool into a namespaced schema. Fails as a
    /// whole; a manifest with one bad tool contributes nothing.
    pub fn schemas(&self) -> Result<Vec<ToolSchema>, IncantError> {
        self.tools
            .iter()
            .map(|tool| self.convert(tool))
            .collect()
    }

    fn convert(&self, tool: &PluginTool) -> Result<ToolSchema, IncantError> {
        let mut generator = Generator::new(&tool.command);
        for clause in &tool.clauses {
            let condition = parse_condition(&clause.condition).map_err(|reason| {
                IncantError::PluginValidation(format!(
                    "{}: tool {}: {reason}",
                    self.name, tool.name
                ))
            })?;
            generator = generator.clause(&clause.name, &clause.template, condition);
        }

        let mut args = Vec::with_capacity(tool.args.len());
        for arg in &tool.args {
            let mut spec = ArgSpec::new(&arg.name, arg.ty.into());
            if arg.required {
                spec = spec.required();
            }
            if let Some(default) = &arg.default {
                spec = spec.default(convert_value(default).ok_or_else(|| {
                    IncantError::PluginValidation(format!(
                        "{}: tool {}: unsupported default for {}",
                        self.name, tool.name, arg.name
                    ))
                })?);
            }
            if let Some(check) = arg.check {
                spec = spec.check(check.into());
            }
            args.push(spec);
        }

        let mut examples = Vec::with_capacity(tool.examples.len());
        for example in &tool.examples {
            let mut bound = BoundArgs::new();
            for (key, value) in &example.args {
                bound.bind(
                    key,
                    convert_value(value).ok_or_else(|| {
                        IncantError::PluginValidation(format!(
                            "{}: tool {}: unsupported example value for {key}",
                            self.name, tool.name
                        ))
                    })?,
                );
            }
            examples.push(Example::new(&example.utterance, bound));
        }

        let schema = ToolSchema {
            name: format!("{}_{}", self.name, tool.name),
            summary: tool.summary.clone(),
            args,
            generator,
            danger_level: tool.danger.into(),
            examples,
            keywords: tool.keywords.clone(),
            requires_confirmation: tool.requires_confirmation,
        };
        schema.validate().map_err(|err| {
            IncantError::PluginValidation(format!("{}: {err}", self.name))
        })?;
        Ok(schema)
    }

    /// Register the manifest's tools. Name collisions are checked up front
    /// so a failing manifest leaves the registry untouched.
    pub fn install(&self, registry: &mut ToolRegistry) -> Result<usize, IncantError> {
        let schemas = self.schemas()?;
        for schema in &schemas {
            if registry.lookup(&schema.name).is_ok() {
                return Err(IncantError::PluginValidation(format!(
                    "{}: tool {} is already registered",
                    self.name, schema.name
                )));
            }
        }
        let count = schemas.len();
        for schema in schemas {
            registry.register(schema)?;
        }
        info!(plugin = %self.name, version = %self.version, tools = count, "installed");
        Ok(count)
    }
}

fn parse_condition(text: &str) -> Result<Condition, String> {
    let mut parts = text.splitn(3, ':');
    let kind = parts.next().unwrap_or_default();
    let arg = parts
        .next()
        .ok_or_else(|| format!("condition {text:?} is missing an argument name"))?;
    match kind {
        "bound" => Ok(Condition::Bound(arg.to_owned())),
        "is_true" => Ok(Condition::IsTrue(arg.to_owned())),
        "non_empty" => Ok(Condition::NonEmpty(arg.to_owned())),
        "eq" => {
            let value = parts
                .next()
                .ok_or_else(|| format!("condition {text:?} is missing a comparison value"))?;
            Ok(Condition::Eq(arg.to_owned(), value.to_owned()))
        }
        "len_at_least" => {
            let n = parts
                .next()
                .and_then(|n| n.parse().ok())
                .ok_or_else(|| format!("condition {text:?} needs a numeric length"))?;
            Ok(Condition::LenAtLeast(arg.to_owned(), n))
        }
        other => Err(format!("unknown condition kind {other:?}")),
    }
}

fn convert_value(value: &toml::Value) -> Option<ArgValue> {
    match value {
        toml::Value::String(s) => Some(ArgValue::Str(s.clone())),
        toml::Value::Integer(n) => Some(ArgValue::Num(*n)),
        toml::Value::Boolean(b) => Some(ArgValue::Bool(*b)),
        toml::Value::Array(items) => {
            let strings: Option<Vec<String>> = items
                .iter()
                .map(|item| item.as_str().map(str::to_owned))
                .collect();
            strings.map(ArgValue::List)
        }
        _ => None,
    }
}

/// Load every `*.toml` manifest under `dir`. A bad manifest is logged and
/// skipped; it never takes the session down or poisons other plugins.
pub fn load_plugins(registry: &mut ToolRegistry, dir: &Path) -> Vec<String> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut paths: Vec<_> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    paths.sort();

    let mut loaded = Vec::new();
    for path in paths {
        match load_one(registry, &path) {
            Ok(name) => loaded.push(name),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "plugin rejected");
            }
        }
    }
    loaded
}

fn load_one(registry: &mut ToolRegistry, path: &Path) -> Result<String, IncantError> {
    let size = fs::metadata(path)
        .map_err(|err| IncantError::PluginValidation(err.to_string()))?
        .len();
    if size > MAX_MANIFEST_SIZE {
        return Err(IncantError::PluginValidation(format!(
            "manifest exceeds {MAX_MANIFEST_SIZE} bytes"
        )));
    }
    let text =
        fs::read_to_string(path).map_err(|err| IncantError::PluginValidation(err.to_string()))?;
    let manifest = PluginManifest::parse(&text)?;
    manifest.install(registry)?;
    Ok(manifest.name)
}
