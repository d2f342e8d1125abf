//! The per-turn pipeline: preprocess, resolve, synthesize, validate, and
//! (verdict permitting) execute. Every utterance that produces a command
//! receives exactly one verdict before anything runs, and the validator is
//! consulted again whenever the user amends the command text by hand.

use std::time::Duration;
use std::time::SystemTime;

use tracing::debug;

use crate::audit::{AuditRecord, AuditTrail};
use crate::config::Config;
use crate::context::SessionContext;
use crate::exec::{ExecutionOutcome, ExecutionRequest, Executor, ProcessExecutor};
use crate::registry::schema::{BoundArgs, DangerLevel};
use crate::registry::ToolRegistry;
use crate::resolve::{IntentResolver, Resolution};
use crate::safety::{Decision, SafetyValidator, SafetyVerdict};
use crate::synth;

/// A synthesized command carried out of the resolution phase. Owns
/// everything it needs so the registry borrow does not outlive the turn.
#[derive(Debug, Clone)]
pub struct PendingCommand {
    pub tool: String,
    pub summary: String,
    pub command: String,
    pub danger_level: DangerLevel,
    pub requires_confirmation: bool,
    pub confidence: f32,
    pub args: BoundArgs,
    pub fired_clauses: Vec<String>,
    pub utterance: String,
}

#[derive(Debug)]
pub enum TurnOutcome {
    /// No tool matched with enough confidence; nothing was synthesized.
    Unresolved { reason: String },
    /// The validator refused the command. Non-overridable.
    Blocked {
        pending: PendingCommand,
        verdict: SafetyVerdict,
    },
    /// The command needs an explicit yes before execution.
    NeedsConfirmation {
        pending: PendingCommand,
        verdict: SafetyVerdict,
    },
    /// Dry-run mode: validated but deliberately not executed.
    DryRun {
        pending: PendingCommand,
        verdict: SafetyVerdict,
    },
    Executed {
        pending: PendingCommand,
        outcome: ExecutionOutcome,
    },
}

pub struct Pipeline<E: Executor> {
    registry: ToolRegistry,
    context: SessionContext,
    validator: SafetyValidator,
    executor: E,
    config: Config,
    audit: AuditTrail,
    dry_run: bool,
}

impl Pipeline<ProcessExecutor> {
    pub fn new(config: Config) -> Self {
        Self::with_executor(config, ProcessExecutor)
    }
}

impl<E: Executor> Pipeline<E> {
    pub fn with_executor(config: Config, executor: E) -> Self {
        let registry =
            ToolRegistry::with_builtins_for(config.preferences.trash_instead_of_delete);
        let validator = SafetyValidator::new(&config);
        Self {
            registry,
            context: SessionContext::new(),
            validator,
            executor,
            config,
            audit: AuditTrail::default(),
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, on: bool) -> Self {
        self.dry_run = on;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ToolRegistry {
        &mut self.registry
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut SessionContext {
        &mut self.context
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Resolve and synthesize without side effects. The returned command has
    /// not been validated yet.
    pub fn prepare(&self, utterance: &str) -> Result<PendingCommand, String> {
        let resolver = IntentResolver::new(&self.registry);
        let intent = match resolver.resolve(utterance, &self.context) {
            Resolution::Resolved(intent) => intent,
            Resolution::Unresolved { reason } => return Err(reason),
        };
        let synthesized = match synth::synthesize(&intent) {
            Ok(synthesized) => synthesized,
            Err(err) => return Err(err.to_string()),
        };
        Ok(PendingCommand {
            tool: intent.tool.name.clone(),
            summary: intent.tool.summary.clone(),
            command: synthesized.command,
            danger_level: intent.tool.danger_level,
            requires_confirmation: intent.tool.requires_confirmation,
            confidence: intent.confidence,
            args: intent.bound_args,
            fired_clauses: synthesized.fired_clauses,
            utterance: utterance.to_owned(),
        })
    }

    /// Human-readable account of how an utterance would be interpreted.
    pub fn explain(&self, utterance: &str) -> String {
        match self.prepare(utterance) {
            Err(reason) => format!("could not interpret: {reason}"),
            Ok(pending) => {
                let mut out = format!(
                    "tool: {} ({})\nconfidence: {:.2}\n",
                    pending.tool, pending.summary, pending.confidence
                );
                for (name, value) in pending.args.iter() {
                    out.push_str(&format!("  {name} = {}\n", value.render_plain()));
                }
                if !pending.fired_clauses.is_empty() {
                    out.push_str(&format!("clauses: {}\n", pending.fired_clauses.join(", ")));
                }
                out.push_str(&format!("command: {}", pending.command));
                out
            }
        }
    }

    /// Run one utterance through the full pipeline. With `auto_confirm` the
    /// confirm verdict proceeds straight to execution; without it the caller
    /// receives `NeedsConfirmation` and decides.
    pub async fn run_turn(
        &mut self,
        utterance: &str,
        auto_confirm: bool,
        timeout_override: Option<Duration>,
    ) -> TurnOutcome {
        let pending = match self.prepare(utterance) {
            Ok(pending) => pending,
            Err(reason) => {
                debug!(utterance, %reason, "unresolved");
                return TurnOutcome::Unresolved { reason };
            }
        };

        let verdict = self.validator.validate(
            &pending.command,
            pending.danger_level,
            pending.requires_confirmation,
        );
        debug!(
            tool = %pending.tool,
            command = %pending.command,
            decision = ?verdict.decision,
            "validated"
        );

        match verdict.decision {
            Decision::Block => {
                self.record(&pending, Decision::Block, false, None);
                TurnOutcome::Blocked { pending, verdict }
            }
            Decision::Confirm if !auto_confirm => {
                self.record(&pending, Decision::Confirm, false, None);
                TurnOutcome::NeedsConfirmation { pending, verdict }
            }
            decision => {
                if self.dry_run {
                    self.record(&pending, decision, false, None);
                    return TurnOutcome::DryRun { pending, verdict };
                }
                self.execute(pending, decision, timeout_override).await
            }
        }
    }

    /// Execute a command the user has already confirmed. The command text is
    /// exactly what was validated, so no second verdict is needed.
    pub async fn run_confirmed(&mut self, pending: PendingCommand) -> TurnOutcome {
        if self.dry_run {
            let verdict = SafetyVerdict {
                decision: Decision::Confirm,
                reason: "confirmed".to_owned(),
                matched_rule: None,
            };
            self.record(&pending, Decision::Confirm, false, None);
            return TurnOutcome::DryRun { pending, verdict };
        }
        self.execute(pending, Decision::Confirm, None).await
    }

    /// The user edited the command text by hand. The amended text goes back
    /// through the validator; a block still blocks, while a confirm verdict
    /// is satisfied by the edit itself.
    pub async fn run_amended(
        &mut self,
        mut pending: PendingCommand,
        amended: &str,
    ) -> TurnOutcome {
        pending.command = amended.to_owned();
        let verdict = self.validator.validate(
            &pending.command,
            pending.danger_level,
            pending.requires_confirmation,
        );
        if verdict.decision == Decision::Block {
            self.record(&pending, Decision::Block, false, None);
            return TurnOutcome::Blocked { pending, verdict };
        }
        if self.dry_run {
            self.record(&pending, verdict.decision, false, None);
            return TurnOutcome::DryRun { pending, verdict };
        }
        self.execute(pending, verdict.decision, None).await
    }

    async fn execute(
        &mut self,
        pending: PendingCommand,
        decision: Decision,
        timeout_override: Option<Duration>,
    ) -> TurnOutcome {
        let timeout = timeout_override
            .unwrap_or_else(|| Duration::from_secs(self.config.safety.timeout_seconds));
        let mut request = ExecutionRequest::new(pending.command.clone())
            .timeout(timeout)
            .max_output_bytes(self.config.safety.max_output_size.bytes());
        // Commands start from the first allowed directory, so relative paths
        // cannot reach outside it.
        if let Some(dir) = self.working_dir() {
            request = request.working_dir(dir);
        }
        let outcome = self.executor.execute(request).await;

        if outcome.success {
            self.context
                .record_success(&pending.tool, &pending.args, &outcome.output);
        }
        self.record(&pending, decision, true, Some(outcome.success));
        TurnOutcome::Executed { pending, outcome }
    }

    fn working_dir(&self) -> Option<std::path::PathBuf> {
        let first = self.config.preferences.allowed_directories.first()?;
        match (first.strip_prefix("~"), std::env::var_os("HOME")) {
            (Ok(rest), Some(home)) => Some(std::path::PathBuf::from(home).join(rest)),
            _ => Some(first.clone()),
        }
    }

    fn record(
        &mut self,
        pending: &PendingCommand,
        decision: Decision,
        executed: bool,
        success: Option<bool>,
    ) {
        self.audit.record(AuditRecord {
            timestamp: SystemTime::now(),
            utterance: pending.utterance.clone(),
            tool: pending.tool.clone(),
            command: pending.command.clone(),
            decision,
            executed,
            success,
        });
    }
}
