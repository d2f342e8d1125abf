//! Session-scoped memory for multi-turn reference resolution.
//!
//! One `SessionContext` per session, created at session start and never
//! shared across sessions. All mutation happens between turns on the single
//! session thread.

use std::collections::HashMap;

use crate::registry::schema::{ArgValue, BoundArgs};

/// Semantic role an entity plays for anaphoric reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityRole {
    /// Paths produced by the last successful command ("those files").
    LastResult,
    /// The directory the last command targeted ("there", "same place").
    LastPath,
    /// The last size/time filter applied ("same filter").
    LastFilter,
}

/// A remembered, typed reference to a prior result.
#[derive(Debug, Clone)]
pub struct ContextEntity {
    pub role: EntityRole,
    pub value: ArgValue,
    /// Name of the tool whose execution produced this entity.
    pub produced_by: String,
}

/// Words that refer back to session context rather than carrying a literal.
const ANAPHORS: &[&str] = &["those", "them", "these", "it", "same"];

const MAX_RESULT_PATHS: usize = 50;

#[derive(Debug, Default)]
pub struct SessionContext {
    entities: HashMap<EntityRole, ContextEntity>,
    turns: usize,
    pub lang: Option<String>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicit context-clear operation. Turn count survives; entities do not.
    pub fn clear(&mut self) {
        self.entities.clear();
    }

    pub fn entity(&self, role: EntityRole) -> Option<&ContextEntity> {
        self.entities.get(&role)
    }

    pub fn remember(&mut self, role: EntityRole, value: ArgValue, produced_by: &str) {
        self.entities.insert(
            role,
            ContextEntity {
                role,
                value,
                produced_by: produced_by.to_owned(),
            },
        );
    }

    pub fn turns(&self) -> usize {
        self.turns
    }

    /// Record a successful step: each new referenceable result overwrites
    /// the entity in its role. Failed or timed-out steps must not reach
    /// here — partial output is not trusted as context.
    pub fn record_success(&mut self, tool_name: &str, args: &BoundArgs, output: &str) {
        self.turns += 1;

        if let Some(path) = args.get("path").and_then(ArgValue::as_str) {
            if path != "." {
                self.remember(EntityRole::LastPath, ArgValue::Str(path.to_owned()), tool_name);
            }
        }

        let mut filters = Vec::new();
        for key in ["min_size", "modified_within", "name", "pattern"] {
            if let Some(v) = args.get(key) {
                filters.push(format!("{key}={}", v.render_plain()));
            }
        }
        if !filters.is_empty() {
            self.remember(
                EntityRole::LastFilter,
                ArgValue::Str(filters.join(",")),
                tool_name,
            );
        }

        let paths = extract_paths(output);
        if !paths.is_empty() {
            self.remember(EntityRole::LastResult, ArgValue::List(paths), tool_name);
        }
    }

    /// Whether the utterance refers back to session context.
    pub fn has_anaphor(utterance: &str) -> bool {
        utterance
            .split(|c: char| !c.is_ascii_alphabetic())
            .any(|word| ANAPHORS.contains(&word.to_ascii_lowercase().as_str()))
    }
}

/// Pull path-shaped lines out of captured output (the shape `find`/`ls -d`
/// produce). Lines with embedded whitespace are skipped rather than guessed.
fn extract_paths(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| {
            !line.is_empty()
                && !line.contains(char::is_whitespace)
                && (line.starts_with('/')
                    || line.starts_with("./")
                    || line.starts_with('~')
                    || line.contains('/'))
        })
        .take(MAX_RESULT_PATHS)
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_entity_overwritten_per_step() {
        let mut ctx = SessionContext::new();
        ctx.record_success("find_files", &BoundArgs::new(), "/tmp/a\n/tmp/b\n");
        ctx.record_success("find_files", &BoundArgs::new(), "/var/log/syslog\n");

        let entity = ctx.entity(EntityRole::LastResult).expect("entity");
        assert_eq!(
            entity.value,
            ArgValue::List(vec!["/var/log/syslog".into()])
        );
        assert_eq!(entity.produced_by, "find_files");
    }

    #[test]
    fn path_and_filter_entities() {
        let mut ctx = SessionContext::new();
        let args = BoundArgs::from([
            ("path", ArgValue::Str("~/Downloads".into())),
            ("min_size", ArgValue::Str("1G".into())),
        ]);
        ctx.record_success("find_files", &args, "");

        assert_eq!(
            ctx.entity(EntityRole::LastPath).unwrap().value,
            ArgValue::Str("~/Downloads".into())
        );
        assert_eq!(
            ctx.entity(EntityRole::LastFilter).unwrap().value,
            ArgValue::Str("min_size=1G".into())
        );
        // No path-shaped output, so no result entity.
        assert!(ctx.entity(EntityRole::LastResult).is_none());
    }

    #[test]
    fn default_path_not_remembered() {
        let mut ctx = SessionContext::new();
        let args = BoundArgs::from([("path", ArgValue::Str(".".into()))]);
        ctx.record_success("list_files", &args, "");
        assert!(ctx.entity(EntityRole::LastPath).is_none());
    }

    #[test]
    fn clear_drops_entities_keeps_turns() {
        let mut ctx = SessionContext::new();
        ctx.record_success("find_files", &BoundArgs::new(), "/tmp/a\n");
        ctx.clear();
        assert!(ctx.entity(EntityRole::LastResult).is_none());
        assert_eq!(ctx.turns(), 1);
    }

    #[test]
    fn anaphor_detection() {
        assert!(SessionContext::has_anaphor("delete those"));
        assert!(SessionContext::has_anaphor("move them to /tmp"));
        assert!(SessionContext::has_anaphor("Delete THOSE files"));
        assert!(!SessionContext::has_anaphor("delete /tmp/a.log"));
        // "item" contains "it" but is not an anaphor.
        assert!(!SessionContext::has_anaphor("list items"));
    }

    #[test]
    fn output_lines_with_spaces_not_trusted_as_paths() {
        let paths = extract_paths("total 12\n/tmp/a.log\n-rw-r--r-- 1 u u 0 /tmp/b\n");
        assert_eq!(paths, vec!["/tmp/a.log".to_string()]);
    }
}
