//! Built-in tool schemas: file, process, network, package, and git families.
//!
//! Everything here goes through the same `register` contract as
//! plugin-provided tools; nothing is special-cased downstream.

use super::schema::{
    ArgCheck, ArgSpec, ArgType, ArgValue, BoundArgs, Condition, DangerLevel, Example, Generator,
    ToolSchema,
};

fn str_val(s: &str) -> ArgValue {
    ArgValue::Str(s.to_owned())
}

fn tool(
    name: &str,
    summary: &str,
    danger_level: DangerLevel,
    args: Vec<ArgSpec>,
    generator: Generator,
    keywords: &[&str],
    examples: Vec<Example>,
) -> ToolSchema {
    ToolSchema {
        name: name.to_owned(),
        summary: summary.to_owned(),
        args,
        generator,
        danger_level,
        examples,
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        requires_confirmation: false,
    }
}

/// The default tool set, with file deletion routed to the trash directory.
pub fn builtin_tools() -> Vec<ToolSchema> {
    builtin_tools_with(true)
}

/// Built-in tools; `trash_instead_of_delete` decides at registration time
/// whether `delete_files` synthesizes an `rm` or a move into the trash.
pub fn builtin_tools_with(trash_instead_of_delete: bool) -> Vec<ToolSchema> {
    let mut tools = file_tools(trash_instead_of_delete);
    tools.extend(process_tools());
    tools.extend(network_tools());
    tools.extend(package_tools());
    tools.extend(git_tools());
    tools
}

fn file_tools(trash_instead_of_delete: bool) -> Vec<ToolSchema> {
    let delete_generator = if trash_instead_of_delete {
        Generator::new("mkdir -p ~/.incant_trash && mv -- {paths} ~/.incant_trash/")
    } else {
        Generator::new("rm -- {paths}")
    };

    vec![
        tool(
            "find_files",
            "Find files by size, age, or name pattern",
            DangerLevel::ReadOnly,
            vec![
                ArgSpec::new("path", ArgType::String)
                    .default(str_val("."))
                    .check(ArgCheck::Path),
                ArgSpec::new("min_size", ArgType::String).check(ArgCheck::SizeSpec),
                ArgSpec::new("modified_within", ArgType::Number),
                ArgSpec::new("name", ArgType::String),
                ArgSpec::new("file_type", ArgType::String)
                    .default(str_val("f"))
                    .check(ArgCheck::Identifier),
            ],
            Generator::new("find {path} -type {file_type}{size_clause}{time_clause}{name_clause}")
                .clause(
                    "size_clause",
                    " -size +{min_size}",
                    Condition::Bound("min_size".into()),
                )
                .clause(
                    "time_clause",
                    " -mtime -{modified_within}",
                    Condition::Bound("modified_within".into()),
                )
                .clause("name_clause", " -name {name}", Condition::Bound("name".into())),
            &["find", "files", "large", "size", "modified", "recent", "old"],
            vec![
                Example::new(
                    "find files larger than 1GB modified this week",
                    BoundArgs::from([
                        ("min_size", str_val("1G")),
                        ("modified_within", ArgValue::Num(7)),
                    ]),
                ),
                Example::new(
                    "find large files in ~/Downloads",
                    BoundArgs::from([
                        ("path", str_val("~/Downloads")),
                        ("min_size", str_val("100M")),
                    ]),
                ),
                Example::new(
                    "find *.py files modified today",
                    BoundArgs::from([
                        ("name", str_val("*.py")),
                        ("modified_within", ArgValue::Num(1)),
                    ]),
                ),
            ],
        ),
        tool(
            "list_files",
            "List directory contents with details",
            DangerLevel::ReadOnly,
            vec![
                ArgSpec::new("path", ArgType::String)
                    .default(str_val("."))
                    .check(ArgCheck::Path),
                ArgSpec::new("all", ArgType::Boolean).default(ArgValue::Bool(false)),
                ArgSpec::new("sort", ArgType::String).check(ArgCheck::Identifier),
            ],
            Generator::new("ls -lh{all_clause}{sort_clause} {path}")
                .clause("all_clause", " -a", Condition::IsTrue("all".into()))
                .clause(
                    "sort_clause",
                    " --sort={sort}",
                    Condition::Bound("sort".into()),
                ),
            &["list", "ls", "show", "directory", "contents"],
            vec![
                Example::new("list files in the current directory", BoundArgs::new()),
                Example::new(
                    "list all files including hidden",
                    BoundArgs::from([("all", ArgValue::Bool(true))]),
                ),
                Example::new(
                    "list files sorted by size",
                    BoundArgs::from([("sort", str_val("size"))]),
                ),
            ],
        ),
        tool(
            "search_content",
            "Search for text content within files",
            DangerLevel::ReadOnly,
            vec![
                ArgSpec::new("pattern", ArgType::String).required(),
                ArgSpec::new("path", ArgType::String)
                    .default(str_val("."))
                    .check(ArgCheck::Path),
                ArgSpec::new("file_pattern", ArgType::String),
                ArgSpec::new("ignore_case", ArgType::Boolean).default(ArgValue::Bool(false)),
            ],
            Generator::new("grep -rn{case_clause}{include_clause} {pattern} {path}")
                .clause("case_clause", " -i", Condition::IsTrue("ignore_case".into()))
                .clause(
                    "include_clause",
                    " --include={file_pattern}",
                    Condition::Bound("file_pattern".into()),
                ),
            &["search", "grep", "containing", "content", "text", "todo"],
            vec![
                Example::new(
                    "search for TODO in python files",
                    BoundArgs::from([
                        ("pattern", str_val("TODO")),
                        ("file_pattern", str_val("*.py")),
                    ]),
                ),
                Example::new(
                    "grep for error ignoring case",
                    BoundArgs::from([
                        ("pattern", str_val("error")),
                        ("ignore_case", ArgValue::Bool(true)),
                    ]),
                ),
            ],
        ),
        tool(
            "disk_usage",
            "Show disk usage below a directory",
            DangerLevel::ReadOnly,
            vec![
                ArgSpec::new("path", ArgType::String)
                    .default(str_val("."))
                    .check(ArgCheck::Path),
                ArgSpec::new("depth", ArgType::Number).default(ArgValue::Num(1)),
            ],
            Generator::new("du -h --max-depth={depth} {path} | sort -hr"),
            &["disk", "usage", "space", "du", "biggest"],
            vec![
                Example::new("show disk usage here", BoundArgs::new()),
                Example::new(
                    "disk usage of /var two levels deep",
                    BoundArgs::from([("path", str_val("/var")), ("depth", ArgValue::Num(2))]),
                ),
            ],
        ),
        tool(
            "file_info",
            "Show metadata for one file or directory",
            DangerLevel::ReadOnly,
            vec![
                ArgSpec::new("path", ArgType::String)
                    .required()
                    .check(ArgCheck::Path),
            ],
            Generator::new("stat {path}"),
            &["info", "stat", "metadata", "details"],
            vec![Example::new(
                "show info about /etc/hosts",
                BoundArgs::from([("path", str_val("/etc/hosts"))]),
            )],
        ),
        tool(
            "delete_files",
            "Delete files (routed to trash when configured)",
            DangerLevel::Destructive,
            vec![
                ArgSpec::new("paths", ArgType::Array)
                    .required()
                    .check(ArgCheck::Path),
            ],
            delete_generator,
            &["delete", "remove", "rm", "trash"],
            vec![Example::new(
                "delete ~/old.log",
                BoundArgs::from([("paths", ArgValue::List(vec!["~/old.log".into()]))]),
            )],
        ),
    ]
}

fn process_tools() -> Vec<ToolSchema> {
    vec![
        tool(
            "list_processes",
            "List running processes ordered by resource use",
            DangerLevel::ReadOnly,
            vec![
                ArgSpec::new("sort", ArgType::String).default(str_val("%cpu")),
                ArgSpec::new("limit", ArgType::Number).default(ArgValue::Num(20)),
            ],
            Generator::new("ps aux --sort=-{sort} | head -n {limit}"),
            &["processes", "ps", "running", "cpu", "memory"],
            vec![
                Example::new("list running processes", BoundArgs::new()),
                Example::new(
                    "show top processes by memory",
                    BoundArgs::from([("sort", str_val("%mem"))]),
                ),
            ],
        ),
        tool(
            "kill_process",
            "Send a signal to a process by pid",
            DangerLevel::Destructive,
            vec![
                ArgSpec::new("pid", ArgType::Number).required(),
                ArgSpec::new("signal", ArgType::String)
                    .default(str_val("TERM"))
                    .check(ArgCheck::Identifier),
            ],
            Generator::new("kill -{signal} {pid}"),
            &["kill", "terminate", "stop", "signal", "pid"],
            vec![Example::new(
                "kill process 4242",
                BoundArgs::from([("pid", ArgValue::Num(4242))]),
            )],
        ),
        tool(
            "kill_by_name",
            "Send a signal to processes matching a name",
            DangerLevel::Destructive,
            vec![
                ArgSpec::new("name", ArgType::String)
                    .required()
                    .check(ArgCheck::Identifier),
                ArgSpec::new("signal", ArgType::String)
                    .default(str_val("TERM"))
                    .check(ArgCheck::Identifier),
            ],
            Generator::new("pkill -{signal} {name}"),
            &["kill", "terminate", "stop", "process"],
            vec![Example::new(
                "terminate the nginx process",
                BoundArgs::from([("name", str_val("nginx"))]),
            )],
        ),
        tool(
            "process_by_port",
            "Show which process is using a port",
            DangerLevel::ReadOnly,
            vec![ArgSpec::new("port", ArgType::Number).required().check(ArgCheck::Port)],
            Generator::new("lsof -i :{port} -P -n"),
            &["port", "listening", "using", "lsof"],
            vec![Example::new(
                "what is using port 3000",
                BoundArgs::from([("port", ArgValue::Num(3000))]),
            )],
        ),
    ]
}

fn network_tools() -> Vec<ToolSchema> {
    vec![
        tool(
            "ping_host",
            "Ping a host a bounded number of times",
            DangerLevel::ReadOnly,
            vec![
                ArgSpec::new("host", ArgType::String)
                    .required()
                    .check(ArgCheck::Identifier),
                ArgSpec::new("count", ArgType::Number).default(ArgValue::Num(4)),
            ],
            Generator::new("ping -c {count} {host}"),
            &["ping", "reachable", "latency"],
            vec![Example::new(
                "ping google.com 5 times",
                BoundArgs::from([("host", str_val("google.com")), ("count", ArgValue::Num(5))]),
            )],
        ),
        tool(
            "http_request",
            "Make an HTTP request with curl",
            DangerLevel::ReadOnly,
            vec![
                ArgSpec::new("url", ArgType::String).required(),
                ArgSpec::new("method", ArgType::String)
                    .default(str_val("GET"))
                    .check(ArgCheck::Identifier),
            ],
            Generator::new("curl -X {method} -L --max-time 30 {url}"),
            &["http", "curl", "request", "fetch", "url"],
            vec![Example::new(
                "fetch https://example.com",
                BoundArgs::from([("url", str_val("https://example.com"))]),
            )],
        ),
        tool(
            "dns_lookup",
            "Resolve DNS records for a host",
            DangerLevel::ReadOnly,
            vec![
                ArgSpec::new("host", ArgType::String)
                    .required()
                    .check(ArgCheck::Identifier),
                ArgSpec::new("record_type", ArgType::String)
                    .default(str_val("A"))
                    .check(ArgCheck::Identifier),
            ],
            Generator::new("dig {record_type} {host} +short"),
            &["dns", "lookup", "resolve", "dig", "records"],
            vec![Example::new(
                "look up MX records for example.com",
                BoundArgs::from([
                    ("host", str_val("example.com")),
                    ("record_type", str_val("MX")),
                ]),
            )],
        ),
        tool(
            "download_file",
            "Download a file over HTTP",
            DangerLevel::Safe,
            vec![
                ArgSpec::new("url", ArgType::String).required(),
                ArgSpec::new("output", ArgType::String).check(ArgCheck::Path),
            ],
            Generator::new("wget{output_clause} {url}").clause(
                "output_clause",
                " -O {output}",
                Condition::Bound("output".into()),
            ),
            &["download", "wget", "save"],
            vec![Example::new(
                "download https://example.com/a.tar.gz",
                BoundArgs::from([("url", str_val("https://example.com/a.tar.gz"))]),
            )],
        ),
    ]
}

fn package_tools() -> Vec<ToolSchema> {
    vec![
        tool(
            "apt_search",
            "Search the apt package index",
            DangerLevel::ReadOnly,
            vec![
                ArgSpec::new("package", ArgType::String)
                    .required()
                    .check(ArgCheck::Identifier),
            ],
            Generator::new("apt-cache search {package}"),
            &["apt", "package", "search", "install"],
            vec![Example::new(
                "search for the ripgrep package",
                BoundArgs::from([("package", str_val("ripgrep"))]),
            )],
        ),
        tool(
            "apt_list",
            "List installed or upgradable packages",
            DangerLevel::ReadOnly,
            vec![ArgSpec::new("upgradable", ArgType::Boolean).default(ArgValue::Bool(false))],
            Generator::new("apt list --installed{upgradable_clause}").clause(
                "upgradable_clause",
                " --upgradable",
                Condition::IsTrue("upgradable".into()),
            ),
            &["apt", "packages", "installed", "upgradable"],
            vec![Example::new("list installed packages", BoundArgs::new())],
        ),
    ]
}

fn git_tools() -> Vec<ToolSchema> {
    vec![
        tool(
            "git_status",
            "Show git working tree status",
            DangerLevel::ReadOnly,
            vec![ArgSpec::new("short", ArgType::Boolean).default(ArgValue::Bool(false))],
            Generator::new("git status{short_clause}").clause(
                "short_clause",
                " -s",
                Condition::IsTrue("short".into()),
            ),
            &["git", "status", "changes"],
            vec![Example::new("show git status", BoundArgs::new())],
        ),
        tool(
            "git_log",
            "Show recent git commit history",
            DangerLevel::ReadOnly,
            vec![
                ArgSpec::new("limit", ArgType::Number).default(ArgValue::Num(10)),
                ArgSpec::new("oneline", ArgType::Boolean).default(ArgValue::Bool(false)),
                ArgSpec::new("author", ArgType::String).check(ArgCheck::Identifier),
            ],
            Generator::new("git log -n {limit}{oneline_clause}{author_clause}")
                .clause("oneline_clause", " --oneline", Condition::IsTrue("oneline".into()))
                .clause(
                    "author_clause",
                    " --author={author}",
                    Condition::Bound("author".into()),
                ),
            &["git", "log", "commits", "history"],
            vec![
                Example::new(
                    "show the last 5 commits",
                    BoundArgs::from([("limit", ArgValue::Num(5))]),
                ),
                Example::new(
                    "git log by author alice",
                    BoundArgs::from([("author", str_val("alice"))]),
                ),
            ],
        ),
        tool(
            "git_diff",
            "Show git changes, optionally staged or per file",
            DangerLevel::ReadOnly,
            vec![
                ArgSpec::new("staged", ArgType::Boolean).default(ArgValue::Bool(false)),
                ArgSpec::new("file", ArgType::String).check(ArgCheck::Path),
            ],
            Generator::new("git diff{staged_clause}{file_clause}")
                .clause("staged_clause", " --staged", Condition::IsTrue("staged".into()))
                .clause("file_clause", " -- {file}", Condition::Bound("file".into())),
            &["git", "diff", "staged"],
            vec![Example::new(
                "show staged git changes",
                BoundArgs::from([("staged", ArgValue::Bool(true))]),
            )],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_schema_validates() {
        for schema in builtin_tools() {
            schema
                .validate()
                .unwrap_or_else(|e| panic!("builtin '{}' invalid: {e}", schema.name));
        }
    }

    #[test]
    fn delete_generator_honors_trash_preference() {
        let trashed = builtin_tools_with(true);
        let hard = builtin_tools_with(false);
        let find = |set: &[ToolSchema]| {
            set.iter()
                .find(|t| t.name == "delete_files")
                .unwrap()
                .generator
                .template
                .clone()
        };
        assert!(find(&trashed).contains(".incant_trash"));
        assert!(find(&hard).starts_with("rm "));
    }

    #[test]
    fn destructive_tools_marked() {
        let by_name: std::collections::HashMap<_, _> = builtin_tools()
            .into_iter()
            .map(|t| (t.name.clone(), t.danger_level))
            .collect();
        assert_eq!(by_name["delete_files"], DangerLevel::Destructive);
        assert_eq!(by_name["kill_process"], DangerLevel::Destructive);
        assert_eq!(by_name["find_files"], DangerLevel::ReadOnly);
    }
}
