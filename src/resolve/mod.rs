//! Intent resolution: match a normalized utterance plus session context
//! against the tool registry, producing a scored intent or `Unresolved`.
//!
//! Resolution is deterministic for a fixed (utterance, context) pair: no
//! randomness, ties broken by score then registration order.

pub mod extract;

use std::collections::HashSet;

use crate::context::{EntityRole, SessionContext};
use crate::registry::ToolRegistry;
use crate::registry::schema::{ArgSpec, ArgType, ArgValue, BoundArgs, ToolSchema};

/// Minimum match score a candidate must clear. Below this the resolver
/// answers `Unresolved` rather than guessing.
const MIN_CONFIDENCE: f32 = 0.25;

/// A tool with fully bound arguments, ready for synthesis. Borrows its
/// schema from the registry; lives for one turn.
#[derive(Debug)]
pub struct ResolvedIntent<'a> {
    pub tool: &'a ToolSchema,
    pub bound_args: BoundArgs,
    pub confidence: f32,
    pub source_utterance: String,
}

/// Resolution outcome. `Unresolved` is a value, not an error — the caller
/// surfaces a clarification request and never guesses.
#[derive(Debug)]
pub enum Resolution<'a> {
    Resolved(ResolvedIntent<'a>),
    Unresolved { reason: String },
}

impl<'a> Resolution<'a> {
    fn unresolved(reason: impl Into<String>) -> Self {
        Resolution::Unresolved {
            reason: reason.into(),
        }
    }
}

pub struct IntentResolver<'a> {
    registry: &'a ToolRegistry,
}

impl<'a> IntentResolver<'a> {
    pub fn new(registry: &'a ToolRegistry) -> Self {
        Self { registry }
    }

    pub fn resolve(&self, utterance: &str, context: &SessionContext) -> Resolution<'a> {
        let processed = extract::preprocess(utterance);
        if processed.is_empty() {
            return Resolution::unresolved("empty utterance");
        }
        let lower = processed.to_lowercase();

        // An exact example-utterance match short-circuits scoring entirely.
        for tool in self.registry.all() {
            for example in &tool.examples {
                if example.utterance.to_lowercase() == lower {
                    let mut args = example.args.clone();
                    apply_defaults(tool, &mut args);
                    return Resolution::Resolved(ResolvedIntent {
                        tool,
                        bound_args: args,
                        confidence: 1.0,
                        source_utterance: utterance.to_owned(),
                    });
                }
            }
        }

        let words: HashSet<&str> = lower
            .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .filter(|w| !w.is_empty())
            .collect();

        // Shortlist via the keyword index, then score each candidate once.
        let mut shortlist: Vec<&ToolSchema> = Vec::new();
        for word in &words {
            for tool in self.registry.by_keyword(word) {
                if !shortlist.iter().any(|t| t.name == tool.name) {
                    shortlist.push(tool);
                }
            }
        }

        let mut best: Option<(&ToolSchema, f32)> = None;
        for tool in shortlist {
            let score = match_score(tool, &lower, &words);
            // Strictly-greater keeps the earliest-registered tool on ties.
            if best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((tool, score));
            }
        }

        let Some((tool, score)) = best.filter(|&(_, s)| s >= MIN_CONFIDENCE) else {
            return Resolution::unresolved(format!(
                "no tool matched \"{processed}\" with enough confidence"
            ));
        };

        match bind_args(tool, &processed, context) {
            Ok(bound_args) => Resolution::Resolved(ResolvedIntent {
                tool,
                bound_args,
                confidence: score.min(1.0),
                source_utterance: utterance.to_owned(),
            }),
            Err(reason) => Resolution::unresolved(reason),
        }
    }
}

/// Keyword overlap + example-utterance similarity + tool-name mention.
/// Weights are fixed; the cap keeps scores comparable across tools.
fn match_score(tool: &ToolSchema, lower: &str, words: &HashSet<&str>) -> f32 {
    let mut score = 0.0;

    for keyword in &tool.keywords {
        if words.contains(keyword.to_lowercase().as_str()) {
            score += 0.3;
        }
    }

    let mut best_example = 0.0f32;
    for example in &tool.examples {
        let example_words: Vec<String> = example
            .utterance
            .to_lowercase()
            .split_whitespace()
            .map(str::to_owned)
            .collect();
        if example_words.is_empty() {
            continue;
        }
        let overlap = example_words
            .iter()
            .filter(|w| words.contains(w.as_str()))
            .count();
        best_example = best_example.max(0.4 * overlap as f32 / example_words.len() as f32);
    }
    score += best_example;

    if lower.contains(&tool.name.replace('_', " ")) {
        score += 0.5;
    }

    score.min(1.0)
}

fn apply_defaults(tool: &ToolSchema, args: &mut BoundArgs) {
    for spec in &tool.args {
        if !args.contains(&spec.name) {
            if let Some(default) = &spec.default {
                args.bind(&spec.name, default.clone());
            }
        }
    }
}

/// Bind extracted values, then defaults, then context entities for anaphoric
/// references. A required argument left unbound fails the resolution.
fn bind_args(
    tool: &ToolSchema,
    utterance: &str,
    context: &SessionContext,
) -> Result<BoundArgs, String> {
    let mut args = BoundArgs::new();
    let anaphoric = SessionContext::has_anaphor(utterance);

    for spec in &tool.args {
        if let Some(value) = extract::extract_for(&tool.name, spec, utterance) {
            if value.type_of() == spec.ty && spec.check.is_none_or(|c| c.accepts(&value)) {
                args.bind(&spec.name, value);
                continue;
            }
            if spec.required {
                return Err(format!(
                    "value for required argument '{}' failed validation",
                    spec.name
                ));
            }
            // Optional argument with a bad literal: drop it, keep going.
        }

        if anaphoric {
            if let Some(value) = context_fallback(spec, context) {
                args.bind(&spec.name, value);
                continue;
            }
        }

        match (&spec.default, spec.required) {
            (Some(default), _) => args.bind(&spec.name, default.clone()),
            (None, true) => {
                return Err(format!(
                    "missing required argument '{}' for {}",
                    spec.name, tool.name
                ));
            }
            (None, false) => {}
        }
    }

    Ok(args)
}

/// A context entity is compatible when its value type-checks against the
/// declared argument and passes its shape check.
fn context_fallback(spec: &ArgSpec, context: &SessionContext) -> Option<ArgValue> {
    let role = match (spec.ty, spec.name.as_str()) {
        (ArgType::Array, _) => EntityRole::LastResult,
        (ArgType::String, "path" | "file" | "output") => EntityRole::LastPath,
        _ => return None,
    };
    let value = context.entity(role)?.value.clone();
    if value.type_of() == spec.ty && spec.check.is_none_or(|c| c.accepts(&value)) {
        Some(value)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ToolRegistry {
        ToolRegistry::with_builtins()
    }

    fn resolve_ok<'a>(
        resolver: &IntentResolver<'a>,
        context: &SessionContext,
        utterance: &str,
    ) -> ResolvedIntent<'a> {
        match resolver.resolve(utterance, context) {
            Resolution::Resolved(intent) => intent,
            Resolution::Unresolved { reason } => {
                panic!("expected resolution for {utterance:?}, got: {reason}")
            }
        }
    }

    #[test]
    fn exact_example_short_circuits_with_full_confidence() {
        let registry = registry();
        let resolver = IntentResolver::new(&registry);
        let context = SessionContext::new();

        let intent = resolve_ok(&resolver, &context, "list files sorted by size");
        assert_eq!(intent.tool.name, "list_files");
        assert_eq!(intent.confidence, 1.0);
        assert_eq!(intent.bound_args.get("sort"), Some(&ArgValue::Str("size".into())));
        // Defaults backfilled for unbound optional args.
        assert_eq!(intent.bound_args.get("path"), Some(&ArgValue::Str(".".into())));
    }

    #[test]
    fn keyword_match_binds_extracted_literals() {
        let registry = registry();
        let resolver = IntentResolver::new(&registry);
        let context = SessionContext::new();

        let intent = resolve_ok(
            &resolver,
            &context,
            "find files larger than 2GB in ~/Videos",
        );
        assert_eq!(intent.tool.name, "find_files");
        assert_eq!(intent.bound_args.get("min_size"), Some(&ArgValue::Str("2G".into())));
        assert_eq!(
            intent.bound_args.get("path"),
            Some(&ArgValue::Str("~/Videos".into()))
        );
    }

    #[test]
    fn nonsense_is_unresolved_not_a_guess() {
        let registry = registry();
        let resolver = IntentResolver::new(&registry);
        let context = SessionContext::new();

        assert!(matches!(
            resolver.resolve("florble the wingding", &context),
            Resolution::Unresolved { .. }
        ));
    }

    #[test]
    fn missing_required_arg_is_unresolved() {
        let registry = registry();
        let resolver = IntentResolver::new(&registry);
        let context = SessionContext::new();

        // "delete" matches delete_files but no paths and no context.
        let resolution = resolver.resolve("delete", &context);
        assert!(matches!(resolution, Resolution::Unresolved { .. }));
    }

    #[test]
    fn anaphor_binds_last_result_from_context() {
        let registry = registry();
        let resolver = IntentResolver::new(&registry);
        let mut context = SessionContext::new();
        context.record_success(
            "find_files",
            &BoundArgs::new(),
            "/tmp/a.log\n/tmp/b.log\n/tmp/c.log\n",
        );

        let intent = resolve_ok(&resolver, &context, "delete those");
        assert_eq!(intent.tool.name, "delete_files");
        assert_eq!(
            intent.bound_args.get("paths"),
            Some(&ArgValue::List(vec![
                "/tmp/a.log".into(),
                "/tmp/b.log".into(),
                "/tmp/c.log".into()
            ]))
        );
    }

    #[test]
    fn explicit_literal_wins_over_context() {
        let registry = registry();
        let resolver = IntentResolver::new(&registry);
        let mut context = SessionContext::new();
        context.record_success("find_files", &BoundArgs::new(), "/tmp/old.log\n");

        let intent = resolve_ok(&resolver, &context, "delete /srv/new.log");
        assert_eq!(
            intent.bound_args.get("paths"),
            Some(&ArgValue::List(vec!["/srv/new.log".into()]))
        );
    }

    #[test]
    fn deterministic_for_same_inputs() {
        let registry = registry();
        let resolver = IntentResolver::new(&registry);
        let context = SessionContext::new();

        let a = resolve_ok(&resolver, &context, "find files larger than 1GB");
        let b = resolve_ok(&resolver, &context, "find files larger than 1GB");
        assert_eq!(a.tool.name, b.tool.name);
        assert_eq!(a.bound_args, b.bound_args);
        assert_eq!(a.confidence, b.confidence);
    }

    #[test]
    fn every_builtin_example_resolves_to_its_own_tool() {
        let registry = registry();
        let resolver = IntentResolver::new(&registry);
        let context = SessionContext::new();

        for tool in registry.all() {
            for example in &tool.examples {
                let intent = resolve_ok(&resolver, &context, &example.utterance);
                assert_eq!(
                    intent.tool.name, tool.name,
                    "example {:?} resolved to the wrong tool",
                    example.utterance
                );
                for (name, value) in example.args.iter() {
                    assert_eq!(
                        intent.bound_args.get(name),
                        Some(value),
                        "example {:?}: argument '{name}' diverged",
                        example.utterance
                    );
                }
            }
        }
    }
}
