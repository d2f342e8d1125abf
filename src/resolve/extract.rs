//! Literal extraction from normalized utterances: quantities, units, paths,
//! time ranges, ports, and content patterns.
//!
//! Extraction is keyed by argument name, the same dispatch the tool schemas
//! are written against. All regexes compile once.

use std::sync::LazyLock;

use regex::Regex;

use crate::registry::schema::{ArgSpec, ArgValue};

macro_rules! re {
    ($name:ident, $pattern:expr) => {
        static $name: LazyLock<Regex> =
            LazyLock::new(|| Regex::new($pattern).expect("static regex"));
    };
}

re!(RE_PATH_PREP, r"(?:in|under|from|of)\s+([~/][^\s,]+)");
re!(RE_PATH_BARE, r"([~/][^\s,]+)");
re!(
    RE_SIZE,
    r"(?i)(?:>|larger\s+than|bigger\s+than|over|above)\s*(\d+)\s*(gb|mb|kb|g|m|k)\b"
);
re!(RE_DAYS_LAST, r"(?i)last\s+(\d+)\s+days?");
re!(RE_DAYS_AGO, r"(?i)(\d+)\s+days?\s+ago");
re!(RE_GLOB, r"(\*\.\w+)");
re!(RE_FILETYPE_GLOB, r"(?i)in\s+(\*\.\w+)(?:\s+files)?");
re!(RE_FILETYPE_WORD, r"(?i)in\s+([a-z]+)\s+files");
re!(RE_PORT, r"(?i)port\s+(\d{1,5})");
re!(RE_PID, r"(?i)(?:process|pid)\s+(\d+)");
re!(RE_COUNT, r"(?i)(?:last|top|first|limit)\s+(\d+)");
re!(RE_TIMES, r"(?i)(\d+)\s+(?:times|pings?|commits?)");
re!(RE_URL, r"(https?://[^\s'\x22]+)");
re!(RE_HOST, r"(?i)\b([a-z0-9][a-z0-9-]*(?:\.[a-z0-9-]+)*\.[a-z]{2,})\b");
re!(RE_IP, r"\b(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})\b");
re!(RE_QUOTED, r#"['\x22]([^'\x22]+)['\x22]"#);
re!(RE_SEARCH_FOR, r"(?i)(?:search|grep|look)(?:\s+for)?\s+([A-Za-z][\w.]*)");
re!(RE_PACKAGE_PREP, r"(?i)(?:package|about|for)\s+([a-z][a-z0-9_.+-]*)\b");
re!(RE_PACKAGE_POST, r"(?i)(?:the\s+)?([a-z][a-z0-9_.+-]*)\s+package\b");
re!(RE_AUTHOR, r"(?i)(?:author|by)\s+([A-Za-z][\w-]*)");
re!(RE_KILL_NAME, r"(?i)(?:kill|terminate|stop)\s+(?:the\s+)?([a-z][a-z0-9_-]*)");
re!(RE_PROC_POST, r"(?i)([a-z][a-z0-9_-]*)\s+process");
re!(RE_DEPTH, r"(?i)(\d+)\s+levels?");
re!(RE_OUTPUT_AS, r"(?i)(?:as|to|into)\s+([~/][^\s,]+)");

/// Normalize an utterance before matching: strip filler phrases and
/// canonicalize size units, preserving case elsewhere (content patterns
/// like `TODO` are case-significant).
pub fn preprocess(utterance: &str) -> String {
    re!(RE_FILLER, r"(?i)\b(?:show me|find me|list me|please)\b");
    re!(RE_GIGA, r"(?i)(\d+)\s*(?:gigabytes?|giga|gb)\b");
    re!(RE_MEGA, r"(?i)(\d+)\s*(?:megabytes?|mega|mb)\b");
    re!(RE_KILO, r"(?i)(\d+)\s*(?:kilobytes?|kilo|kb)\b");

    let text = RE_FILLER.replace_all(utterance.trim(), "");
    let text = RE_GIGA.replace_all(&text, "${1}GB");
    let text = RE_MEGA.replace_all(&text, "${1}MB");
    let text = RE_KILO.replace_all(&text, "${1}KB");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract a value for one declared argument from the utterance.
/// Returns `None` when the utterance carries no literal for it.
pub fn extract_for(tool_name: &str, spec: &ArgSpec, utterance: &str) -> Option<ArgValue> {
    match spec.name.as_str() {
        "path" => extract_path(utterance),
        "paths" => extract_path_list(utterance),
        "output" => RE_OUTPUT_AS
            .captures(utterance)
            .map(|c| ArgValue::Str(c[1].to_owned())),
        "min_size" => extract_size(utterance),
        "modified_within" => extract_days(utterance),
        "name" if tool_name == "kill_by_name" => extract_process_name(utterance),
        "name" => RE_GLOB
            .captures(utterance)
            .map(|c| ArgValue::Str(c[1].to_owned())),
        "pattern" => extract_content_pattern(utterance),
        "file_pattern" => extract_file_pattern(utterance),
        "port" => RE_PORT
            .captures(utterance)
            .and_then(|c| c[1].parse::<i64>().ok())
            .filter(|p| (1..=65535).contains(p))
            .map(ArgValue::Num),
        "pid" => RE_PID
            .captures(utterance)
            .and_then(|c| c[1].parse().ok())
            .map(ArgValue::Num),
        "count" | "limit" => extract_count(utterance),
        "depth" => RE_DEPTH
            .captures(utterance)
            .and_then(|c| c[1].parse().ok())
            .map(ArgValue::Num),
        "host" => extract_host(utterance),
        "url" => extract_url(utterance),
        "package" => extract_package(utterance),
        "author" => RE_AUTHOR
            .captures(utterance)
            .map(|c| ArgValue::Str(c[1].to_owned())),
        "file" => extract_path(utterance),
        "sort" => extract_sort(tool_name, utterance),
        "signal" => extract_signal(utterance),
        "method" => extract_method(utterance),
        "record_type" => extract_record_type(utterance),
        "all" => flag(utterance, &["all", "hidden", "everything"]),
        "ignore_case" => phrase_flag(utterance, &["ignoring case", "case insensitive", "any case"]),
        "staged" => flag(utterance, &["staged", "cached"]),
        "oneline" => phrase_flag(utterance, &["oneline", "one line", "compact"]),
        "short" => flag(utterance, &["short", "brief"]),
        "upgradable" => flag(utterance, &["upgradable", "upgradeable", "updates"]),
        _ => None,
    }
}

fn extract_path(utterance: &str) -> Option<ArgValue> {
    RE_PATH_PREP
        .captures(utterance)
        .or_else(|| RE_PATH_BARE.captures(utterance))
        .map(|c| ArgValue::Str(c[1].to_owned()))
}

fn extract_path_list(utterance: &str) -> Option<ArgValue> {
    let paths: Vec<String> = RE_PATH_BARE
        .captures_iter(utterance)
        .map(|c| c[1].to_owned())
        .collect();
    if paths.is_empty() {
        None
    } else {
        Some(ArgValue::List(paths))
    }
}

fn extract_size(utterance: &str) -> Option<ArgValue> {
    let caps = RE_SIZE.captures(utterance)?;
    let unit = match caps[2].to_ascii_lowercase().as_str() {
        "gb" | "g" => "G",
        "mb" | "m" => "M",
        _ => "k",
    };
    Some(ArgValue::Str(format!("{}{unit}", &caps[1])))
}

fn extract_days(utterance: &str) -> Option<ArgValue> {
    let lower = utterance.to_ascii_lowercase();
    if let Some(caps) = RE_DAYS_LAST.captures(utterance).or_else(|| RE_DAYS_AGO.captures(utterance))
    {
        return caps[1].parse().ok().map(ArgValue::Num);
    }
    let days = if lower.contains("today") {
        1
    } else if lower.contains("yesterday") {
        2
    } else if lower.contains("this week") {
        7
    } else if lower.contains("last week") {
        14
    } else if lower.contains("this month") {
        30
    } else {
        return None;
    };
    Some(ArgValue::Num(days))
}

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "process", "all", "files", "file", "for", "in", "on",
];

fn extract_process_name(utterance: &str) -> Option<ArgValue> {
    let candidate = RE_KILL_NAME
        .captures(utterance)
        .or_else(|| RE_PROC_POST.captures(utterance))
        .map(|c| c[1].to_ascii_lowercase())?;
    if STOPWORDS.contains(&candidate.as_str()) {
        // "kill the nginx process" — retry on the noun before "process".
        return RE_PROC_POST
            .captures(utterance)
            .map(|c| c[1].to_ascii_lowercase())
            .filter(|name| !STOPWORDS.contains(&name.as_str()))
            .map(ArgValue::Str);
    }
    Some(ArgValue::Str(candidate))
}

/// Terms worth searching for even when unquoted.
const CONTENT_TERMS: &[&str] = &[
    "TODO", "FIXME", "HACK", "import", "error", "warning", "panic", "debug",
];

fn extract_content_pattern(utterance: &str) -> Option<ArgValue> {
    if let Some(caps) = RE_QUOTED.captures(utterance) {
        return Some(ArgValue::Str(caps[1].to_owned()));
    }
    for term in CONTENT_TERMS {
        if utterance.contains(term) {
            return Some(ArgValue::Str((*term).to_owned()));
        }
    }
    RE_SEARCH_FOR.captures(utterance).and_then(|c| {
        let word = &c[1];
        if STOPWORDS.contains(&word.to_ascii_lowercase().as_str()) {
            None
        } else {
            Some(ArgValue::Str(word.to_owned()))
        }
    })
}

fn extract_file_pattern(utterance: &str) -> Option<ArgValue> {
    if let Some(caps) = RE_FILETYPE_GLOB.captures(utterance) {
        return Some(ArgValue::Str(caps[1].to_owned()));
    }
    let word = RE_FILETYPE_WORD.captures(utterance)?[1].to_ascii_lowercase();
    let ext = match word.as_str() {
        "python" => "py",
        "javascript" => "js",
        "typescript" => "ts",
        "rust" => "rs",
        "java" => "java",
        "text" => "txt",
        other if other.len() <= 4 => other,
        _ => return None,
    };
    Some(ArgValue::Str(format!("*.{ext}")))
}

fn extract_count(utterance: &str) -> Option<ArgValue> {
    RE_COUNT
        .captures(utterance)
        .or_else(|| RE_TIMES.captures(utterance))
        .and_then(|c| c[1].parse().ok())
        .map(ArgValue::Num)
}

fn extract_host(utterance: &str) -> Option<ArgValue> {
    if let Some(caps) = RE_IP.captures(utterance) {
        return Some(ArgValue::Str(caps[1].to_owned()));
    }
    if utterance.to_ascii_lowercase().contains("localhost") {
        return Some(ArgValue::Str("localhost".into()));
    }
    // Strip any URL scheme before matching a bare host.
    let stripped = RE_URL.replace_all(utterance, "");
    RE_HOST
        .captures(&stripped)
        .map(|c| ArgValue::Str(c[1].to_ascii_lowercase()))
}

fn extract_url(utterance: &str) -> Option<ArgValue> {
    if let Some(caps) = RE_URL.captures(utterance) {
        return Some(ArgValue::Str(caps[1].to_owned()));
    }
    extract_host(utterance)
        .and_then(|v| v.as_str().map(|h| ArgValue::Str(format!("https://{h}"))))
}

fn extract_package(utterance: &str) -> Option<ArgValue> {
    let candidate = RE_PACKAGE_POST
        .captures(utterance)
        .or_else(|| RE_PACKAGE_PREP.captures(utterance))
        .map(|c| c[1].to_ascii_lowercase())?;
    if STOPWORDS.contains(&candidate.as_str()) {
        None
    } else {
        Some(ArgValue::Str(candidate))
    }
}

fn extract_sort(tool_name: &str, utterance: &str) -> Option<ArgValue> {
    let lower = utterance.to_ascii_lowercase();
    if tool_name == "list_processes" {
        if lower.contains("mem") || lower.contains("ram") {
            return Some(ArgValue::Str("%mem".into()));
        }
        if lower.contains("cpu") {
            return Some(ArgValue::Str("%cpu".into()));
        }
        return None;
    }
    for key in ["size", "time", "extension"] {
        if lower.contains(key) {
            return Some(ArgValue::Str(key.to_owned()));
        }
    }
    None
}

fn extract_signal(utterance: &str) -> Option<ArgValue> {
    let lower = utterance.to_ascii_lowercase();
    if lower.contains("force") || lower.contains("-9") || lower.contains("sigkill") {
        Some(ArgValue::Str("KILL".into()))
    } else {
        None
    }
}

fn extract_method(utterance: &str) -> Option<ArgValue> {
    let lower = utterance.to_ascii_lowercase();
    for method in ["post", "put", "delete", "head"] {
        if lower.split_whitespace().any(|w| w == method) {
            return Some(ArgValue::Str(method.to_ascii_uppercase()));
        }
    }
    None
}

fn extract_record_type(utterance: &str) -> Option<ArgValue> {
    let lower = utterance.to_ascii_lowercase();
    let records = [
        ("mx", "MX"),
        ("mail", "MX"),
        ("ns", "NS"),
        ("nameserver", "NS"),
        ("cname", "CNAME"),
        ("txt", "TXT"),
        ("aaaa", "AAAA"),
        ("ipv6", "AAAA"),
    ];
    for (keyword, record) in records {
        if lower.split_whitespace().any(|w| w == keyword) {
            return Some(ArgValue::Str(record.to_owned()));
        }
    }
    None
}

fn flag(utterance: &str, words: &[&str]) -> Option<ArgValue> {
    let lower = utterance.to_ascii_lowercase();
    lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|w| words.contains(&w))
        .then_some(ArgValue::Bool(true))
}

fn phrase_flag(utterance: &str, phrases: &[&str]) -> Option<ArgValue> {
    let lower = utterance.to_ascii_lowercase();
    phrases
        .iter()
        .any(|p| lower.contains(p))
        .then_some(ArgValue::Bool(true))
}
