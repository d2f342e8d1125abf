//! Batch orchestration: run a parsed script's steps in declaration order,
//! gating each on its dependencies' outcomes and retrying failed attempts
//! by re-running the whole pipeline, not just the shell command.

pub mod script;

use tracing::{info, warn};

use crate::exec::Executor;
use crate::session::{Pipeline, TurnOutcome};

pub use script::{BatchScript, BatchStep, RunCondition};

/// Lifecycle of one step. Terminal states are `Succeeded`, `Failed`, and
/// `Skipped`; dependents settle only on terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Pending,
    Ready,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl StepState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }
}

#[derive(Debug)]
pub struct StepReport {
    pub ordinal: usize,
    pub utterance: String,
    pub state: StepState,
    /// Attempts actually made. At most `retries + 1`.
    pub attempts: u32,
    pub command: Option<String>,
    pub detail: String,
}

#[derive(Debug)]
pub struct BatchReport {
    pub name: Option<String>,
    pub steps: Vec<StepReport>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.count(StepState::Succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count(StepState::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(StepState::Skipped)
    }

    fn count(&self, state: StepState) -> usize {
        self.steps.iter().filter(|s| s.state == state).count()
    }
}

pub struct BatchOrchestrator<'a, E: Executor> {
    pipeline: &'a mut Pipeline<E>,
    /// Confirm verdicts proceed without a prompt. Batch runs are
    /// unattended, so this defaults on; blocks are still final.
    auto_confirm: bool,
}

impl<'a, E: Executor> BatchOrchestrator<'a, E> {
    pub fn new(pipeline: &'a mut Pipeline<E>) -> Self {
        Self {
            pipeline,
            auto_confirm: true,
        }
    }

    pub fn auto_confirm(mut self, on: bool) -> Self {
        self.auto_confirm = on;
        self
    }

    pub async fn run(&mut self, batch: &BatchScript) -> BatchReport {
        let mut states = vec![StepState::Pending; batch.steps.len()];
        let mut reports = Vec::with_capacity(batch.steps.len());
        let mut last_output = String::new();
        let mut any_failed = false;

        for step in &batch.steps {
            let index = step.ordinal - 1;
            if !self.gate_open(step, &states, any_failed) {
                states[index] = StepState::Skipped;
                info!(step = step.ordinal, utterance = %step.utterance, "skipped");
                reports.push(StepReport {
                    ordinal: step.ordinal,
                    utterance: step.utterance.clone(),
                    state: StepState::Skipped,
                    attempts: 0,
                    command: None,
                    detail: "dependency outcome did not satisfy run condition".to_owned(),
                });
                continue;
            }

            states[index] = StepState::Running;
            let utterance = step.utterance.replace("${LAST_OUTPUT}", last_output.trim());
            let report = self.run_step(step, &utterance, &mut last_output).await;
            states[index] = report.state;
            any_failed |= report.state == StepState::Failed;
            reports.push(report);
        }

        BatchReport {
            name: batch.name.clone(),
            steps: reports,
        }
    }

    /// Whether the step's gate is open. The gate is the `depends:` set, or
    /// the immediately preceding step when none is declared. A skipped
    /// dependency counts as a failed one, so skips cascade. A failure
    /// anywhere earlier halts every later `success`-conditioned step, even
    /// one whose own dependencies all succeeded.
    fn gate_open(&self, step: &BatchStep, states: &[StepState], any_failed: bool) -> bool {
        let gate: Vec<StepState> = if step.depends_on.is_empty() {
            match step.ordinal {
                1 => Vec::new(),
                n => vec![states[n - 2]],
            }
        } else {
            step.depends_on.iter().map(|&d| states[d - 1]).collect()
        };

        debug_assert!(gate.iter().all(|s| s.is_terminal()));
        let all_succeeded = gate.iter().all(|&s| s == StepState::Succeeded);
        match step.condition {
            RunCondition::Always => true,
            RunCondition::Success => all_succeeded && !any_failed,
            RunCondition::Failure => !all_succeeded && !gate.is_empty(),
        }
    }

    async fn run_step(
        &mut self,
        step: &BatchStep,
        utterance: &str,
        last_output: &mut String,
    ) -> StepReport {
        let max_attempts = step.retries + 1;
        let mut report = StepReport {
            ordinal: step.ordinal,
            utterance: step.utterance.clone(),
            state: StepState::Failed,
            attempts: 0,
            command: None,
            detail: String::new(),
        };

        for attempt in 1..=max_attempts {
            report.attempts = attempt;
            info!(step = step.ordinal, attempt, max_attempts, %utterance, "running");

            // Every attempt goes back through resolution and validation, so
            // a changed session context changes the synthesized command.
            let outcome = self
                .pipeline
                .run_turn(utterance, self.auto_confirm, step.timeout)
                .await;

            match outcome {
                TurnOutcome::Unresolved { reason } => {
                    report.detail = format!("unresolved: {reason}");
                }
                TurnOutcome::Blocked { pending, verdict } => {
                    // A block is final. Retrying cannot downgrade it.
                    report.command = Some(pending.command);
                    report.detail = format!("blocked: {}", verdict.reason);
                    warn!(step = step.ordinal, reason = %verdict.reason, "blocked");
                    break;
                }
                TurnOutcome::NeedsConfirmation { pending, .. } => {
                    report.command = Some(pending.command);
                    report.detail = "confirmation required but batch is unattended".to_owned();
                    break;
                }
                TurnOutcome::DryRun { pending, verdict } => {
                    report.command = Some(pending.command);
                    report.state = StepState::Succeeded;
                    report.detail = format!("dry run, verdict {:?}", verdict.decision);
                    return report;
                }
                TurnOutcome::Executed { pending, outcome } => {
                    report.command = Some(pending.command);
                    if outcome.success {
                        report.state = StepState::Succeeded;
                        report.detail = "ok".to_owned();
                        *last_output = outcome.output;
                        return report;
                    }
                    report.detail = if outcome.timed_out {
                        outcome.error
                    } else {
                        format!(
                            "exit {}: {}",
                            outcome.exit_code.map_or_else(|| "?".to_owned(), |c| c.to_string()),
                            outcome.error.lines().next().unwrap_or("")
                        )
                    };
                }
            }
        }

        warn!(step = step.ordinal, attempts = report.attempts, detail = %report.detail, "failed");
        report
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::config::Config;
    use crate::exec::{ExecutionOutcome, ExecutionRequest};
    use crate::session::Pipeline;

    /// Fails every command whose text contains a marker substring; counts
    /// invocations.
    struct FailMatching {
        marker: &'static str,
        calls: AtomicU32,
    }

    impl FailMatching {
        fn new(marker: &'static str) -> Self {
            Self {
                marker,
                calls: AtomicU32::new(0),
            }
        }
    }

    impl Executor for FailMatching {
        async fn execute(&self, request: ExecutionRequest) -> ExecutionOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if request.command.contains(self.marker) {
                ExecutionOutcome {
                    success: false,
                    exit_code: Some(1),
                    output: String::new(),
                    error: "induced failure".to_owned(),
                    timed_out: false,
                    duration: Duration::ZERO,
                }
            } else {
                ExecutionOutcome {
                    success: true,
                    exit_code: Some(0),
                    output: request.command,
                    error: String::new(),
                    timed_out: false,
                    duration: Duration::ZERO,
                }
            }
        }
    }

    fn pipeline(marker: &'static str) -> Pipeline<FailMatching> {
        let config: Config = "
[preferences]
confirm_by_default = false
allowed_directories = [\"/\", \"~\"]
"
        .parse()
        .unwrap();
        Pipeline::with_executor(config, FailMatching::new(marker))
    }

    #[tokio::test]
    async fn failed_dependency_skips_dependent() {
        // Step 1 pings (fails), step 2 depends on it.
        let script = BatchScript::parse(
            "
> ping example.com
> list files in ~/Downloads
  depends: 1
",
        )
        .unwrap();
        let mut pipeline = pipeline("ping");
        let report = BatchOrchestrator::new(&mut pipeline).run(&script).await;

        assert_eq!(report.steps[0].state, StepState::Failed);
        assert_eq!(report.steps[1].state, StepState::Skipped);
        assert_eq!(report.steps[1].attempts, 0);
        assert_eq!(report.skipped(), 1);
    }

    #[tokio::test]
    async fn retry_makes_exactly_n_plus_one_attempts() {
        let script = BatchScript::parse(
            "
> ping example.com
  retry: 2
",
        )
        .unwrap();
        let mut pipeline = pipeline("ping");
        let report = BatchOrchestrator::new(&mut pipeline).run(&script).await;

        assert_eq!(report.steps[0].state, StepState::Failed);
        assert_eq!(report.steps[0].attempts, 3);
        assert_eq!(pipeline.audit().len(), 3);
    }

    #[tokio::test]
    async fn condition_failure_runs_only_after_a_failure() {
        let script = BatchScript::parse(
            "
> ping example.com
> list files in ~/Downloads
  depends: 1
  condition: failure
> disk usage of ~/Downloads
  depends: 1
  condition: success
",
        )
        .unwrap();
        let mut pipeline = pipeline("ping");
        let report = BatchOrchestrator::new(&mut pipeline).run(&script).await;

        assert_eq!(report.steps[0].state, StepState::Failed);
        assert_eq!(report.steps[1].state, StepState::Succeeded);
        assert_eq!(report.steps[2].state, StepState::Skipped);
    }

    #[tokio::test]
    async fn earlier_failure_halts_later_success_conditioned_steps() {
        // Step 3's declared dependency succeeded, but step 2 failed; a
        // failed terminal halts everything later unless the condition is
        // failure or always.
        let script = BatchScript::parse(
            "
> list files in ~/Downloads
> ping example.com
  depends: 1
> disk usage of ~/Downloads
  depends: 1
  condition: success
",
        )
        .unwrap();
        let mut pipeline = pipeline("ping");
        let report = BatchOrchestrator::new(&mut pipeline).run(&script).await;

        assert_eq!(report.steps[0].state, StepState::Succeeded);
        assert_eq!(report.steps[1].state, StepState::Failed);
        assert_eq!(report.steps[2].state, StepState::Skipped);
    }

    #[tokio::test]
    async fn steps_without_deps_follow_the_previous_step() {
        let script = BatchScript::parse(
            "
> ping example.com
> list files in ~/Downloads
",
        )
        .unwrap();
        let mut pipeline = pipeline("ping");
        let report = BatchOrchestrator::new(&mut pipeline).run(&script).await;

        assert_eq!(report.steps[1].state, StepState::Skipped);
    }

    #[tokio::test]
    async fn skipped_dependency_cascades() {
        let script = BatchScript::parse(
            "
> ping example.com
> list files in ~/Downloads
  depends: 1
> disk usage of ~/Downloads
  depends: 2
",
        )
        .unwrap();
        let mut pipeline = pipeline("ping");
        let report = BatchOrchestrator::new(&mut pipeline).run(&script).await;

        assert_eq!(report.steps[1].state, StepState::Skipped);
        assert_eq!(report.steps[2].state, StepState::Skipped);
    }

    #[tokio::test]
    async fn successful_chain_carries_last_output() {
        let script = BatchScript::parse(
            "
> list files in ~/Downloads
> ping example.com
  depends: 1
",
        )
        .unwrap();
        let mut pipeline = pipeline("never-matches");
        let report = BatchOrchestrator::new(&mut pipeline).run(&script).await;

        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 0);
    }

    #[tokio::test]
    async fn unresolved_step_fails_without_verdict() {
        let script = BatchScript::parse("> commune with the spirits").unwrap();
        let mut pipeline = pipeline("never-matches");
        let report = BatchOrchestrator::new(&mut pipeline).run(&script).await;

        assert_eq!(report.steps[0].state, StepState::Failed);
        assert!(report.steps[0].command.is_none());
        assert!(report.steps[0].detail.starts_with("unresolved"));
    }
}
