//! Batch script parsing.
//!
//! The dialect is line oriented: `@name` / `@description` headers,
//! `KEY=value` variable definitions, `> utterance` step lines, and indented
//! `key: value` modifiers that attach to the most recent step. `${KEY}`
//! references are substituted at parse time; an unknown key is a parse
//! error, not a silent empty string.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::IncantError;

/// How a step's dependency outcomes gate its execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunCondition {
    /// Run only when every dependency succeeded.
    #[default]
    Success,
    /// Run only when a dependency failed or was skipped.
    Failure,
    /// Run once dependencies are settled, whatever their outcomes.
    Always,
}

impl std::str::FromStr for RunCondition {
    type Err = IncantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" | "on_success" => Ok(Self::Success),
            "failure" | "on_failure" => Ok(Self::Failure),
            "always" => Ok(Self::Always),
            other => Err(IncantError::ScriptParse(format!(
                "unknown condition {other:?}, expected success, failure, or always"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchStep {
    /// 1-based position, the ordinal `depends:` lines refer to.
    pub ordinal: usize,
    pub utterance: String,
    pub depends_on: Vec<usize>,
    pub condition: RunCondition,
    pub timeout: Option<Duration>,
    pub retries: u32,
}

impl BatchStep {
    fn new(ordinal: usize, utterance: String) -> Self {
        Self {
            ordinal,
            utterance,
            depends_on: Vec::new(),
            condition: RunCondition::default(),
            timeout: None,
            retries: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchScript {
    pub name: Option<String>,
    pub description: Option<String>,
    pub steps: Vec<BatchStep>,
}

impl BatchScript {
    /// Wrap a plain list of utterances as a sequential script.
    pub fn from_commands(commands: &[String]) -> Self {
        Self {
            name: None,
            description: None,
            steps: commands
                .iter()
                .enumerate()
                .map(|(i, c)| BatchStep::new(i + 1, c.clone()))
                .collect(),
        }
    }

    pub fn parse(text: &str) -> Result<Self, IncantError> {
        let mut script = Self::default();
        let mut variables: HashMap<String, String> = HashMap::new();

        for (line_no, raw) in text.lines().enumerate() {
            let line_no = line_no + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(value) = line.strip_prefix("@name") {
                script.name = Some(value.trim().to_owned());
            } else if let Some(value) = line.strip_prefix("@description") {
                script.description = Some(value.trim().to_owned());
            } else if let Some(utterance) = line.strip_prefix('>') {
                let utterance = substitute(utterance.trim(), &variables, line_no)?;
                if utterance.is_empty() {
                    return Err(IncantError::ScriptParse(format!(
                        "line {line_no}: empty step"
                    )));
                }
                let ordinal = script.steps.len() + 1;
                script.steps.push(BatchStep::new(ordinal, utterance));
            } else if let Some((key, value)) = split_modifier(line) {
                let step = script.steps.last_mut().ok_or_else(|| {
                    IncantError::ScriptParse(format!(
                        "line {line_no}: modifier {key:?} before any step"
                    ))
                })?;
                apply_modifier(step, key, value, line_no)?;
            } else if let Some((key, value)) = split_variable(line) {
                let value = substitute(value, &variables, line_no)?;
                variables.insert(key.to_owned(), value);
            } else {
                return Err(IncantError::ScriptParse(format!(
                    "line {line_no}: unrecognized line {line:?}"
                )));
            }
        }

        script.validate()?;
        Ok(script)
    }

    /// Dependency sanity: ordinals must name earlier steps.
    fn validate(&self) -> Result<(), IncantError> {
        for step in &self.steps {
            for &dep in &step.depends_on {
                if dep == step.ordinal {
                    return Err(IncantError::ScriptParse(format!(
                        "step {} depends on itself",
                        step.ordinal
                    )));
                }
                if dep == 0 || dep > self.steps.len() {
                    return Err(IncantError::ScriptParse(format!(
                        "step {} depends on nonexistent step {dep}",
                        step.ordinal
                    )));
                }
                if dep > step.ordinal {
                    return Err(IncantError::ScriptParse(format!(
                        "step {} depends on later step {dep}",
                        step.ordinal
                    )));
                }
            }
        }
        Ok(())
    }
}

fn apply_modifier(
    step: &mut BatchStep,
    key: &str,
    value: &str,
    line_no: usize,
) -> Result<(), IncantError> {
    match key {
        "depends" => {
            for part in value.split(',') {
                let ordinal = part.trim().parse::<usize>().map_err(|_| {
                    IncantError::ScriptParse(format!(
                        "line {line_no}: invalid step number {:?}",
                        part.trim()
                    ))
                })?;
                step.depends_on.push(ordinal);
            }
        }
        "condition" => step.condition = value.parse()?,
        "timeout" => {
            let secs = value.parse::<u64>().map_err(|_| {
                IncantError::ScriptParse(format!("line {line_no}: invalid timeout {value:?}"))
            })?;
            step.timeout = Some(Duration::from_secs(secs));
        }
        "retry" => {
            step.retries = value.parse::<u32>().map_err(|_| {
                IncantError::ScriptParse(format!("line {line_no}: invalid retry count {value:?}"))
            })?;
        }
        other => {
            return Err(IncantError::ScriptParse(format!(
                "line {line_no}: unknown modifier {other:?}"
            )));
        }
    }
    Ok(())
}

fn split_modifier(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    if matches!(key, "depends" | "condition" | "timeout" | "retry") {
        Some((key, value.trim()))
    } else {
        None
    }
}

fn split_variable(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    let valid = !key.is_empty()
        && key.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then(|| (key, value.trim()))
}

/// Expand `${KEY}` references. `LAST_OUTPUT` is resolved at run time, so it
/// passes through untouched here.
fn substitute(
    text: &str,
    variables: &HashMap<String, String>,
    line_no: usize,
) -> Result<String, IncantError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(IncantError::ScriptParse(format!(
                "line {line_no}: unterminated variable reference"
            )));
        };
        let key = &after[..end];
        if key == "LAST_OUTPUT" {
            out.push_str("${LAST_OUTPUT}");
        } else {
            let value = variables.get(key).ok_or_else(|| {
                IncantError::ScriptParse(format!("line {line_no}: undefined variable {key:?}"))
            })?;
            out.push_str(value);
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
