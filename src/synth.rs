//! Command synthesis: expand a resolved intent's generator template into a
//! final command string, with shell-injection defenses applied to every
//! substituted value.

use crate::error::IncantError;
use crate::registry::schema::{ArgValue, BoundArgs, ToolSchema};
use crate::resolve::ResolvedIntent;

/// A finished command plus the structured record of which clauses fired,
/// for the safety layer and audit logging.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedCommand {
    pub command: String,
    pub fired_clauses: Vec<String>,
}

pub fn synthesize(intent: &ResolvedIntent<'_>) -> Result<SynthesizedCommand, IncantError> {
    synthesize_parts(intent.tool, &intent.bound_args)
}

/// Template expansion over an immutable argument map. Clause placeholders
/// expand to their clause text when the clause's condition holds, otherwise
/// to nothing; argument placeholders expand to escaped values.
pub fn synthesize_parts(
    tool: &ToolSchema,
    args: &BoundArgs,
) -> Result<SynthesizedCommand, IncantError> {
    let mut fired_clauses = Vec::new();

    let mut command = String::with_capacity(tool.generator.template.len());
    expand(tool, args, &tool.generator.template, &mut command, &mut fired_clauses)?;

    Ok(SynthesizedCommand {
        command,
        fired_clauses,
    })
}

fn expand(
    tool: &ToolSchema,
    args: &BoundArgs,
    template: &str,
    out: &mut String,
    fired: &mut Vec<String>,
) -> Result<(), IncantError> {
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        rest = &rest[open + 1..];

        let Some(close) = rest.find('}') else {
            // Unterminated brace is literal text.
            out.push('{');
            break;
        };
        let name = &rest[..close];
        rest = &rest[close + 1..];

        // Brace content that is not placeholder-shaped (awk bodies, glob
        // alternations) passes through as literal text.
        let placeholder_shaped =
            !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !placeholder_shaped {
            out.push('{');
            out.push_str(name);
            out.push('}');
            continue;
        }

        if let Some(clause) = tool.generator.clauses.iter().find(|c| c.name == name) {
            if clause.condition.holds(args) {
                fired.push(clause.name.clone());
                expand(tool, args, &clause.template, out, fired)?;
            }
            continue;
        }

        match args.get(name) {
            Some(value) => out.push_str(&render(tool, name, value)?),
            None => {
                return Err(IncantError::Template(format!(
                    "tool '{}': no value bound for placeholder '{{{name}}}'",
                    tool.name
                )));
            }
        }
    }
    out.push_str(rest);
    Ok(())
}

/// Render one bound value for splicing. Numbers and booleans render as bare
/// digits/words. Strings and lists are single-quoted unless the ArgSpec
/// carries a shape check, in which case the value is re-verified against the
/// check and spliced raw.
fn render(tool: &ToolSchema, name: &str, value: &ArgValue) -> Result<String, IncantError> {
    if value.render_plain().contains('\0') {
        return Err(IncantError::Template(format!(
            "tool '{}': argument '{name}' contains a NUL byte",
            tool.name
        )));
    }

    let pre_validated = tool.arg(name).is_some_and(|spec| spec.pre_validated());
    match value {
        ArgValue::Num(n) => Ok(n.to_string()),
        ArgValue::Bool(b) => Ok(b.to_string()),
        ArgValue::Str(s) => {
            if pre_validated {
                verify_check(tool, name, value)?;
                Ok(s.clone())
            } else {
                Ok(shell_quote(s))
            }
        }
        ArgValue::List(items) => {
            if pre_validated {
                verify_check(tool, name, value)?;
                Ok(items.join(" "))
            } else {
                Ok(items
                    .iter()
                    .map(|item| shell_quote(item))
                    .collect::<Vec<_>>()
                    .join(" "))
            }
        }
    }
}

/// Re-run the argument's shape check at synthesis time. Binding already
/// checked it; a failure here means a caller bypassed resolution.
fn verify_check(tool: &ToolSchema, name: &str, value: &ArgValue) -> Result<(), IncantError> {
    let ok = tool
        .arg(name)
        .and_then(|spec| spec.check)
        .map(|check| check.accepts(value))
        .unwrap_or(false);
    if ok {
        Ok(())
    } else {
        Err(IncantError::Template(format!(
            "tool '{}': argument '{name}' failed its pre-validation check",
            tool.name
        )))
    }
}

/// POSIX single-quote escaping: the only metacharacter inside single quotes
/// is the quote itself.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
