use std::collections::BTreeMap;
use std::fmt;

use crate::error::IncantError;

/// Tool danger classification driving default confirmation policy.
/// Variant order defines the `Ord` derivation: ReadOnly < Safe < Destructive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DangerLevel {
    ReadOnly,
    Safe,
    Destructive,
}

impl fmt::Display for DangerLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DangerLevel::ReadOnly => "read_only",
            DangerLevel::Safe => "safe",
            DangerLevel::Destructive => "destructive",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    String,
    Number,
    Boolean,
    Array,
}

/// A bound argument value. Numbers are kept as i64 — every quantity the
/// extractors produce (sizes, counts, ports, pids) is integral.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Str(String),
    Num(i64),
    Bool(bool),
    List(Vec<String>),
}

impl ArgValue {
    pub fn type_of(&self) -> ArgType {
        match self {
            ArgValue::Str(_) => ArgType::String,
            ArgValue::Num(_) => ArgType::Number,
            ArgValue::Bool(_) => ArgType::Boolean,
            ArgValue::List(_) => ArgType::Array,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ArgValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Plain textual rendering, before any shell escaping. Lists join with
    /// a single space; the synthesizer escapes each element separately.
    pub fn render_plain(&self) -> String {
        match self {
            ArgValue::Str(s) => s.clone(),
            ArgValue::Num(n) => n.to_string(),
            ArgValue::Bool(b) => b.to_string(),
            ArgValue::List(items) => items.join(" "),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ArgValue::Str(s) => s.is_empty(),
            ArgValue::List(items) => items.is_empty(),
            _ => false,
        }
    }
}

/// Shape check for an argument value. A passing check also marks the value
/// as pre-validated: it contains no shell metacharacters and may be spliced
/// into a command without quoting. Unchecked values are always quoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgCheck {
    /// Filesystem path: `/`, `~`, alphanumerics, `._-+`.
    Path,
    /// Bare identifier: alphanumerics, `._-`.
    Identifier,
    /// `find`-style size spec: digits plus one of `ckMG`.
    SizeSpec,
    /// Day-granular duration: digits plus `d`.
    Duration,
    /// TCP/UDP port, 1..=65535.
    Port,
    /// Shell glob like `*.py`. Validated with the `glob` crate.
    GlobPattern,
}

impl ArgCheck {
    pub fn accepts(self, value: &ArgValue) -> bool {
        match self {
            ArgCheck::Port => matches!(value, ArgValue::Num(n) if (1..=65535).contains(n)),
            ArgCheck::Path => match value {
                ArgValue::Str(s) => !s.is_empty() && s.chars().all(Self::path_char),
                ArgValue::List(items) => {
                    !items.is_empty()
                        && items.iter().all(|s| !s.is_empty() && s.chars().all(Self::path_char))
                }
                _ => false,
            },
            ArgCheck::Identifier => matches!(
                value,
                ArgValue::Str(s) if !s.is_empty()
                    && s.chars().all(|c| c.is_ascii_alphanumeric() || "._-".contains(c))
                    && !s.starts_with('-')
            ),
            ArgCheck::SizeSpec => {
                matches!(value, ArgValue::Str(s) if Self::digits_then(s, "ckMG"))
            }
            ArgCheck::Duration => {
                matches!(value, ArgValue::Str(s) if Self::digits_then(s, "d"))
            }
            ArgCheck::GlobPattern => matches!(
                value,
                ArgValue::Str(s) if !s.is_empty()
                    && glob::Pattern::new(s).is_ok()
                    && s.chars().all(|c| {
                        c.is_ascii_alphanumeric() || "*?._/-".contains(c)
                    })
            ),
        }
    }

    fn path_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || "/~._-+".contains(c)
    }

    /// One or more ASCII digits followed by exactly one unit char from `units`.
    fn digits_then(s: &str, units: &str) -> bool {
        let mut chars = s.chars().peekable();
        let mut saw_digit = false;
        while let Some(c) = chars.peek() {
            if c.is_ascii_digit() {
                saw_digit = true;
                chars.next();
            } else {
                break;
            }
        }
        saw_digit && matches!(chars.next(), Some(u) if units.contains(u)) && chars.next().is_none()
    }
}

#[derive(Debug, Clone)]
pub struct ArgSpec {
    pub name: String,
    pub ty: ArgType,
    pub required: bool,
    pub default: Option<ArgValue>,
    pub check: Option<ArgCheck>,
}

impl ArgSpec {
    pub fn new(name: &str, ty: ArgType) -> Self {
        Self {
            name: name.to_owned(),
            ty,
            required: false,
            default: None,
            check: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default(mut self, value: ArgValue) -> Self {
        self.default = Some(value);
        self
    }

    pub fn check(mut self, check: ArgCheck) -> Self {
        self.check = Some(check);
        self
    }

    /// Whether a passing value may be spliced without quoting.
    pub fn pre_validated(&self) -> bool {
        self.check.is_some()
    }
}

/// Immutable map of bound argument values, keyed by argument name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundArgs(BTreeMap<String, ArgValue>);

impl BoundArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, name: &str, value: ArgValue) {
        self.0.insert(name.to_owned(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<const N: usize> From<[(&str, ArgValue); N]> for BoundArgs {
    fn from(pairs: [(&str, ArgValue); N]) -> Self {
        let mut args = BoundArgs::new();
        for (name, value) in pairs {
            args.bind(name, value);
        }
        args
    }
}

/// Inclusion condition for a template clause. A small closed expression
/// language over the bound-argument map: presence, truth, equality,
/// non-emptiness, and length comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Bound(String),
    IsTrue(String),
    Eq(String, String),
    NonEmpty(String),
    LenAtLeast(String, usize),
}

impl Condition {
    pub fn holds(&self, args: &BoundArgs) -> bool {
        match self {
            Condition::Bound(name) => args.contains(name),
            Condition::IsTrue(name) => {
                args.get(name).and_then(ArgValue::as_bool).unwrap_or(false)
            }
            Condition::Eq(name, expected) => args
                .get(name)
                .map(|v| v.render_plain() == *expected)
                .unwrap_or(false),
            Condition::NonEmpty(name) => {
                args.get(name).map(|v| !v.is_empty()).unwrap_or(false)
            }
            Condition::LenAtLeast(name, min) => match args.get(name) {
                Some(ArgValue::List(items)) => items.len() >= *min,
                Some(ArgValue::Str(s)) => s.len() >= *min,
                _ => false,
            },
        }
    }

    /// Argument name the condition reads, for static validation.
    pub fn arg(&self) -> &str {
        match self {
            Condition::Bound(n)
            | Condition::IsTrue(n)
            | Condition::Eq(n, _)
            | Condition::NonEmpty(n)
            | Condition::LenAtLeast(n, _) => n,
        }
    }
}

/// Optional command fragment spliced in only when its condition holds.
#[derive(Debug, Clone)]
pub struct Clause {
    pub name: String,
    pub template: String,
    pub condition: Condition,
}

impl Clause {
    pub fn new(name: &str, template: &str, condition: Condition) -> Self {
        Self {
            name: name.to_owned(),
            template: template.to_owned(),
            condition,
        }
    }
}

/// Command generator: a base template whose `{placeholders}` name either
/// declared arguments or clauses.
#[derive(Debug, Clone)]
pub struct Generator {
    pub template: String,
    pub clauses: Vec<Clause>,
}

impl Generator {
    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_owned(),
            clauses: Vec::new(),
        }
    }

    pub fn clause(mut self, name: &str, template: &str, condition: Condition) -> Self {
        self.clauses.push(Clause::new(name, template, condition));
        self
    }
}

/// Declared example utterance with the arguments it should resolve to.
/// Used both for matching and for self-consistency tests.
#[derive(Debug, Clone)]
pub struct Example {
    pub utterance: String,
    pub args: BoundArgs,
}

impl Example {
    pub fn new(utterance: &str, args: BoundArgs) -> Self {
        Self {
            utterance: utterance.to_owned(),
            args,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub summary: String,
    pub args: Vec<ArgSpec>,
    pub generator: Generator,
    pub danger_level: DangerLevel,
    pub examples: Vec<Example>,
    pub keywords: Vec<String>,
    /// Force a confirm verdict regardless of danger level.
    pub requires_confirmation: bool,
}

impl ToolSchema {
    pub fn arg(&self, name: &str) -> Option<&ArgSpec> {
        self.args.iter().find(|a| a.name == name)
    }

    /// Static schema check, run at registration time: every placeholder must
    /// name a declared argument or clause, every clause placeholder and
    /// condition must name a declared argument, defaults and example
    /// arguments must type-check.
    pub fn validate(&self) -> Result<(), IncantError> {
        let fail = |msg: String| {
            Err(IncantError::SchemaValidation(format!(
                "tool '{}': {msg}",
                self.name
            )))
        };

        if self.name.is_empty() {
            return fail("name must not be empty".into());
        }

        for holder in placeholders(&self.generator.template) {
            let is_clause = self.generator.clauses.iter().any(|c| c.name == holder);
            if !is_clause && self.arg(holder).is_none() {
                return fail(format!("template placeholder '{{{holder}}}' is undeclared"));
            }
        }

        for clause in &self.generator.clauses {
            if self.arg(&clause.name).is_some() {
                return fail(format!("clause '{}' shadows an argument", clause.name));
            }
            for holder in placeholders(&clause.template) {
                if self.arg(holder).is_none() {
                    return fail(format!(
                        "clause '{}' placeholder '{{{holder}}}' is undeclared",
                        clause.name
                    ));
                }
            }
            if self.arg(clause.condition.arg()).is_none() {
                return fail(format!(
                    "clause '{}' condition reads undeclared argument '{}'",
                    clause.name,
                    clause.condition.arg()
                ));
            }
        }

        for spec in &self.args {
            if let Some(default) = &spec.default {
                if default.type_of() != spec.ty {
                    return fail(format!("default for '{}' has the wrong type", spec.name));
                }
            }
        }

        for example in &self.examples {
            for (name, value) in example.args.iter() {
                match self.arg(name) {
                    None => {
                        return fail(format!(
                            "example '{}' binds undeclared argument '{name}'",
                            example.utterance
                        ));
                    }
                    Some(spec) if spec.ty != value.type_of() => {
                        return fail(format!(
                            "example '{}' binds '{name}' with the wrong type",
                            example.utterance
                        ));
                    }
                    Some(_) => {}
                }
            }
        }

        Ok(())
    }
}

/// Scan `{name}` placeholders out of a template. Unterminated braces are
/// ignored here; the synthesizer treats them as literal text.
pub fn placeholders(template: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        rest = &rest[open + 1..];
        if let Some(close) = rest.find('}') {
            let name = &rest[..close];
            if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                found.push(name);
            }
            rest = &rest[close + 1..];
        } else {
            break;
        }
    }
    found
}
