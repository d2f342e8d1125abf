use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use incant::batch::{BatchOrchestrator, BatchScript, StepState};
use incant::config::Config;
use incant::exec::Executor;
use incant::plugin;
use incant::session::{PendingCommand, Pipeline, TurnOutcome};

/// Natural-language shell: describe what you want, review the command,
/// confirm, run.
#[derive(Debug, Parser)]
#[command(name = "incant", version, about)]
struct Cli {
    /// Run a batch script instead of starting the interactive session.
    #[arg(long, value_name = "FILE")]
    batch: Option<PathBuf>,

    /// Run the given utterances as a sequential batch.
    #[arg(long = "batch-commands", value_name = "TEXT", num_args = 1..)]
    batch_commands: Vec<String>,

    /// Preferred language tag for utterances (recorded in session context).
    #[arg(long, value_name = "CODE")]
    lang: Option<String>,

    /// Configuration file (default: ~/.config/incant/config.toml).
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory of plugin manifests (default: ~/.config/incant/plugins).
    #[arg(long, value_name = "DIR")]
    plugins: Option<PathBuf>,

    /// Resolve and validate but never execute.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "incant=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let mut pipeline = Pipeline::new(config).dry_run(cli.dry_run);
    pipeline.context_mut().lang = cli.lang.clone();

    let plugin_dir = cli
        .plugins
        .clone()
        .or_else(|| config_dir().map(|d| d.join("plugins")));
    if let Some(dir) = plugin_dir {
        let loaded = plugin::load_plugins(pipeline.registry_mut(), &dir);
        if !loaded.is_empty() {
            tracing::info!(plugins = ?loaded, "plugins loaded");
        }
    }

    if cli.batch.is_some() || !cli.batch_commands.is_empty() {
        let script = match &cli.batch {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading batch script {}", path.display()))?;
                BatchScript::parse(&text)?
            }
            None => BatchScript::from_commands(&cli.batch_commands),
        };
        return run_batch(&mut pipeline, &script).await;
    }

    repl(&mut pipeline).await
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    if let Some(path) = &cli.config {
        return Ok(Config::load(path)?);
    }
    match config_dir().map(|d| d.join("config.toml")) {
        Some(path) if path.exists() => Ok(Config::load(&path)?),
        _ => Ok(Config::default()),
    }
}

fn config_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config").join("incant"))
}

async fn run_batch<E: Executor>(
    pipeline: &mut Pipeline<E>,
    script: &BatchScript,
) -> anyhow::Result<()> {
    let report = BatchOrchestrator::new(pipeline).run(script).await;

    if let Some(name) = &report.name {
        println!("batch: {name}");
    }
    for step in &report.steps {
        let marker = match step.state {
            StepState::Succeeded => "ok",
            StepState::Failed => "FAILED",
            StepState::Skipped => "skipped",
            _ => "?",
        };
        println!("  [{marker}] {}. {}", step.ordinal, step.utterance);
        if let Some(command) = &step.command {
            println!("        $ {command}");
        }
        if step.state == StepState::Failed {
            println!("        {}", step.detail);
        }
    }
    println!(
        "{} ok, {} failed, {} skipped",
        report.succeeded(),
        report.failed(),
        report.skipped()
    );

    if report.failed() > 0 {
        std::process::exit(1);
    }
    Ok(())
}

async fn repl<E: Executor>(pipeline: &mut Pipeline<E>) -> anyhow::Result<()> {
    let mut editor = DefaultEditor::new()?;
    println!("incant - describe what you want; :help for commands");

    loop {
        let line = match editor.readline("incant> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        editor.add_history_entry(input)?;

        if let Some(meta) = input.strip_prefix(':') {
            if !meta_command(pipeline, meta) {
                break;
            }
            continue;
        }

        if let Some(utterance) = input.strip_prefix('?') {
            println!("{}", pipeline.explain(utterance.trim()));
            continue;
        }

        let outcome = pipeline.run_turn(input, false, None).await;
        match outcome {
            TurnOutcome::Unresolved { reason } => {
                println!("could not interpret that ({reason})");
            }
            TurnOutcome::Blocked { pending, verdict } => {
                println!("blocked: {}", verdict.reason);
                println!("  $ {}", pending.command);
            }
            TurnOutcome::NeedsConfirmation { pending, verdict } => {
                confirm(pipeline, &mut editor, pending, &verdict.reason).await?;
            }
            TurnOutcome::DryRun { pending, verdict } => {
                println!("dry run [{:?}]: $ {}", verdict.decision, pending.command);
            }
            TurnOutcome::Executed { pending, outcome } => {
                print_execution(&pending, &outcome);
            }
        }
    }

    println!("bye");
    Ok(())
}

async fn confirm<E: Executor>(
    pipeline: &mut Pipeline<E>,
    editor: &mut DefaultEditor,
    pending: PendingCommand,
    reason: &str,
) -> anyhow::Result<()> {
    println!("{} ({reason})", pending.tool);
    println!("  $ {}", pending.command);
    let answer = match editor.readline("run? [y/N/e(dit)] ") {
        Ok(answer) => answer,
        Err(ReadlineError::Interrupted | ReadlineError::Eof) => {
            println!("cancelled");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    let outcome = match answer.trim() {
        "y" | "yes" => pipeline.run_confirmed(pending).await,
        "e" | "edit" => {
            let command = pending.command.clone();
            match editor.readline_with_initial("edit> ", (&command, "")) {
                Ok(amended) => pipeline.run_amended(pending, amended.trim()).await,
                Err(_) => {
                    println!("cancelled");
                    return Ok(());
                }
            }
        }
        _ => {
            println!("cancelled");
            return Ok(());
        }
    };

    match outcome {
        TurnOutcome::Blocked { verdict, .. } => println!("blocked: {}", verdict.reason),
        TurnOutcome::Executed { pending, outcome } => print_execution(&pending, &outcome),
        TurnOutcome::DryRun { pending, .. } => println!("dry run: $ {}", pending.command),
        _ => {}
    }
    Ok(())
}

fn print_execution(pending: &PendingCommand, outcome: &incant::exec::ExecutionOutcome) {
    println!("$ {}", pending.command);
    if !outcome.output.is_empty() {
        println!("{}", outcome.output.trim_end());
    }
    if !outcome.success {
        if outcome.timed_out {
            println!("(timed out)");
        } else {
            println!("(exit {})", outcome.exit_code.unwrap_or(-1));
        }
        if !outcome.error.is_empty() {
            eprintln!("{}", outcome.error.trim_end());
        }
    }
}

/// Returns false when the session should end.
fn meta_command<E: Executor>(pipeline: &mut Pipeline<E>, meta: &str) -> bool {
    match meta.trim() {
        "help" => {
            println!(":tools            list registered tools");
            println!(":context          show what the session remembers");
            println!(":clear            forget session context");
            println!(":audit            print the session audit trail as JSON lines");
            println!("?<utterance>      explain how an utterance would be interpreted");
            println!(":quit             exit");
        }
        "tools" => {
            for tool in pipeline.registry().all() {
                println!("  {:<18} [{:?}] {}", tool.name, tool.danger_level, tool.summary);
            }
        }
        "context" => {
            let context = pipeline.context();
            if let Some(lang) = &context.lang {
                println!("  lang: {lang}");
            }
            println!("  turns: {}", context.turns());
            for role in [
                incant::context::EntityRole::LastResult,
                incant::context::EntityRole::LastPath,
                incant::context::EntityRole::LastFilter,
            ] {
                if let Some(entity) = context.entity(role) {
                    println!(
                        "  {role:?}: {} (from {})",
                        entity.value.render_plain(),
                        entity.produced_by
                    );
                }
            }
        }
        "clear" => {
            pipeline.context_mut().clear();
            println!("context cleared");
        }
        "audit" => {
            let json = pipeline.audit().to_json_lines();
            if !json.is_empty() {
                println!("{json}");
            }
        }
        "quit" | "exit" | "q" => return false,
        other => println!("unknown command :{other} (:help)"),
    }
    true
}
