//! The pipeline state machine: INTAKE → PLAN → EXECUTE → VERIFY → (FIXLOOP) →
//! REVIEW → GATE → PUBLISH.
//!
//! Every step persists its artifact under the run directory and appends one
//! ledger record. Tool failures are recorded and the run moves on; missing
//! inputs, policy refusals, timeouts, an exhausted fix loop and a failed gate
//! stop the run. A stopped run keeps its partial ledger and artifacts, plus an
//! `ABORT` record naming the step it stopped in.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use chrono::Local;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::core::allowlist::CommandAllowlist;
use crate::core::feature::{run_id_for, validate_feature_id};
use crate::core::prompt::{Prompts, STATUS_PROMPT};
use crate::core::record::{
    AbortRecord, FixLoopRecord, FixRecord, GateRecord, IntakeRecord, LedgerRecord, PublishRecord,
    StatusCaptureRecord, ToolKind, ToolRecord, VerifyRecord,
};
use crate::core::status::CodexStatus;
use crate::core::step::Step;
use crate::error::OrchError;
use crate::io::config::Settings;
use crate::io::invoke::{CommandRunner, ShellExecutor, ToolInvoker, ToolResult};
use crate::io::ledger::Ledger;
use crate::io::run_dir::{RunPaths, allocate_run_dir, read_text, write_json, write_text};

/// Everything a step needs to know about the run it belongs to.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub feature_id: String,
    pub run_id: String,
    pub paths: RunPaths,
    pub ledger: Ledger,
}

/// What a successful run leaves behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub report_path: PathBuf,
    /// Fix attempts consumed before verification passed; 0 when it passed first time.
    pub fix_iterations: u32,
}

/// Content of `publish/report.json`.
#[derive(Debug, Clone, Serialize)]
pub struct PublishReport {
    pub feature_id: String,
    pub run_id: String,
    pub run_dir: PathBuf,
    pub published: bool,
    pub env: BTreeMap<String, Option<String>>,
}

pub struct Orchestrator<'a, R: CommandRunner + ?Sized> {
    settings: &'a Settings,
    runner: &'a R,
    allowlist: CommandAllowlist,
    prompts: Prompts,
}

impl<'a, R: CommandRunner + ?Sized> Orchestrator<'a, R> {
    pub fn new(settings: &'a Settings, runner: &'a R) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            runner,
            allowlist: settings.allowlist()?,
            prompts: Prompts::new()?,
        })
    }

    /// Run the whole pipeline for one feature.
    #[instrument(skip(self))]
    pub fn run_feature(&self, feature_id: &str) -> Result<RunOutcome> {
        validate_feature_id(feature_id)?;
        let ctx = self.open_run(feature_id)?;
        info!(run_id = %ctx.run_id, run_dir = %ctx.paths.dir.display(), "run started");

        let mut current = Step::Intake;
        match self.drive(&ctx, &mut current) {
            Ok(fix_iterations) => {
                info!(run_id = %ctx.run_id, fix_iterations, "run published");
                Ok(RunOutcome {
                    run_id: ctx.run_id,
                    run_dir: ctx.paths.dir.clone(),
                    report_path: ctx.paths.report_path.clone(),
                    fix_iterations,
                })
            }
            Err(err) => {
                error!(run_id = %ctx.run_id, during = %current, "run stopped: {err:#}");
                let abort = LedgerRecord::Abort(AbortRecord {
                    during: current,
                    error: format!("{err:#}"),
                });
                if let Err(append_err) = ctx.ledger.append(abort) {
                    warn!("could not record ABORT: {append_err:#}");
                }
                Err(err)
            }
        }
    }

    /// Allocate the run directory and append the opening INTAKE record.
    pub fn open_run(&self, feature_id: &str) -> Result<RunContext> {
        let base = run_id_for(feature_id, &Local::now());
        let (run_id, dir) = allocate_run_dir(&self.settings.runs_path(), &base)?;
        let paths = RunPaths::new(&dir);
        let ledger = Ledger::new(paths.ledger_path.clone());
        ledger.append(LedgerRecord::Intake(IntakeRecord {
            feature_id: feature_id.to_string(),
            run_id: run_id.clone(),
            artifact: None,
        }))?;
        Ok(RunContext {
            feature_id: feature_id.to_string(),
            run_id,
            paths,
            ledger,
        })
    }

    fn drive(&self, ctx: &RunContext, current: &mut Step) -> Result<u32> {
        let mut fix_iterations = 0;
        let mut state = Some(Step::Intake);
        while let Some(step) = state {
            *current = step;
            let passed = match step {
                Step::Intake => {
                    self.intake(ctx)?;
                    true
                }
                Step::Plan => self.plan(ctx)?,
                Step::Execute => self.execute(ctx)?,
                Step::Verify => self.verify(ctx, None)?,
                Step::FixLoop => {
                    fix_iterations = self.fix_loop(ctx)?;
                    true
                }
                Step::Review => self.review(ctx)?,
                Step::Gate => {
                    self.gate(ctx)?;
                    true
                }
                Step::Publish => {
                    self.publish(ctx)?;
                    true
                }
                Step::Fix | Step::CodexStatus | Step::Abort => {
                    bail!("{step} is recorded inside other steps, not entered as a state")
                }
            };
            state = if passed {
                step.on_success()
            } else {
                step.on_failure()
            };
        }
        Ok(fix_iterations)
    }

    fn tools(&self) -> ToolInvoker<'_, R> {
        ToolInvoker::new(
            self.runner,
            &self.settings.repo_root,
            self.settings.tool_timeout(),
        )
    }

    fn shell(&self) -> ShellExecutor<'_, R> {
        ShellExecutor::new(
            self.runner,
            &self.allowlist,
            &self.settings.repo_root,
            self.settings.verify_timeout(),
        )
    }

    /// Copy the feature document into the run and record the artifact.
    pub fn intake(&self, ctx: &RunContext) -> Result<()> {
        let source = self.settings.feature_doc_path(&ctx.feature_id);
        if !source.is_file() {
            return Err(OrchError::MissingFeatureDoc { path: source }.into());
        }
        let feature = read_text(&source)?;
        write_text(&ctx.paths.intake_feature_path, &feature)?;
        ctx.ledger.append(LedgerRecord::Intake(IntakeRecord {
            feature_id: ctx.feature_id.clone(),
            run_id: ctx.run_id.clone(),
            artifact: Some(ctx.paths.intake_feature_path.clone()),
        }))?;
        Ok(())
    }

    /// Ask codex for its usage report and keep both the raw text and the parsed metrics.
    #[instrument(skip(self, ctx))]
    pub fn capture_status(&self, ctx: &RunContext, label: &str) -> Result<()> {
        let result = self.tools().invoke(&self.settings.codex_cmd, STATUS_PROMPT)?;
        let status = CodexStatus::parse(&result.stdout);
        let raw_path = ctx.paths.status_raw_path(label);
        write_text(&raw_path, &result.combined_output())?;
        write_json(&ctx.paths.status_parsed_path(label), &status.metrics)?;
        ctx.ledger
            .append(LedgerRecord::CodexStatus(StatusCaptureRecord {
                label: label.to_string(),
                returncode: result.returncode,
                raw_path,
                parsed: status.metrics,
            }))?;
        Ok(())
    }

    #[instrument(skip_all)]
    pub fn plan(&self, ctx: &RunContext) -> Result<bool> {
        self.capture_status(ctx, "pre-plan")?;
        let feature = read_text(&ctx.paths.intake_feature_path)?;
        let prompt = self.prompts.plan(&feature)?;
        let result = self.tools().invoke(&self.settings.codex_cmd, &prompt)?;
        write_text(&ctx.paths.plan_path, &result.stdout)?;
        let ok = result.ok();
        ctx.ledger.append(LedgerRecord::Plan(tool_record(
            ToolKind::Codex,
            &result,
            &ctx.paths.plan_path,
        )))?;
        self.capture_status(ctx, "post-plan")?;
        Ok(ok)
    }

    #[instrument(skip_all)]
    pub fn execute(&self, ctx: &RunContext) -> Result<bool> {
        let plan = read_text(&ctx.paths.plan_path)?;
        let feature = read_text(&ctx.paths.intake_feature_path)?;
        let prompt = self.prompts.execute(&plan, &feature)?;
        let result = self.tools().invoke(&self.settings.claude_cmd, &prompt)?;
        write_text(&ctx.paths.execute_output_path, &result.stdout)?;
        ctx.ledger.append(LedgerRecord::Execute(tool_record(
            ToolKind::Claude,
            &result,
            &ctx.paths.execute_output_path,
        )))?;
        Ok(result.ok())
    }

    /// Run the verify command. `after_fix` selects the per-iteration artifact.
    #[instrument(skip(self, ctx))]
    pub fn verify(&self, ctx: &RunContext, after_fix: Option<u32>) -> Result<bool> {
        let command = &self.settings.verify_command;
        let result = self.shell().run(command)?;
        let stdout_path = match after_fix {
            Some(iteration) => ctx.paths.verify_after_fix_path(iteration),
            None => ctx.paths.verify_path.clone(),
        };
        write_text(&stdout_path, &result.combined_output())?;
        let ok = result.ok();
        if !ok {
            warn!(returncode = result.returncode, "verification failed");
        }
        ctx.ledger.append(LedgerRecord::Verify(VerifyRecord {
            command: command.clone(),
            returncode: result.returncode,
            stdout_path,
            ok,
            after_fix_iteration: after_fix,
        }))?;
        Ok(ok)
    }

    /// Bounded fix attempts. Returns the iteration that made verification pass.
    #[instrument(skip_all)]
    pub fn fix_loop(&self, ctx: &RunContext) -> Result<u32> {
        let max = self.settings.max_fix_iterations;
        let mut failing_output = read_text(&ctx.paths.verify_path)?;
        for iteration in 1..=max {
            info!(iteration, max, "fix attempt");
            ctx.ledger
                .append(LedgerRecord::FixLoop(FixLoopRecord { iteration }))?;

            let prompt = self.prompts.fix(&failing_output)?;
            let result = self.tools().invoke(&self.settings.claude_cmd, &prompt)?;
            let fix_path = ctx.paths.fix_output_path(iteration);
            write_text(&fix_path, &result.stdout)?;
            ctx.ledger.append(LedgerRecord::Fix(FixRecord {
                tool: ToolKind::Claude,
                iteration,
                returncode: result.returncode,
                ok: result.ok(),
                stdout_path: fix_path,
                stderr: result.stderr,
            }))?;

            if self.verify(ctx, Some(iteration))? {
                return Ok(iteration);
            }
            failing_output = read_text(&ctx.paths.verify_after_fix_path(iteration))?;
        }
        Err(OrchError::FixLoopExhausted { iterations: max }.into())
    }

    #[instrument(skip_all)]
    pub fn review(&self, ctx: &RunContext) -> Result<bool> {
        self.capture_status(ctx, "pre-review")?;
        let plan = read_text(&ctx.paths.plan_path)?;
        let prompt = self.prompts.review(&plan)?;
        let result = self.tools().invoke(&self.settings.codex_cmd, &prompt)?;
        write_text(&ctx.paths.review_path, &result.stdout)?;
        let ok = result.ok();
        ctx.ledger.append(LedgerRecord::Review(tool_record(
            ToolKind::Codex,
            &result,
            &ctx.paths.review_path,
        )))?;
        self.capture_status(ctx, "post-review")?;
        Ok(ok)
    }

    /// Pass only if the ledger already holds a successful verification.
    ///
    /// A ledger that cannot be read back fails the gate.
    pub fn gate(&self, ctx: &RunContext) -> Result<()> {
        let ok = ctx.ledger.has_passing_verify().unwrap_or_else(|err| {
            warn!("ledger unreadable at gate: {err:#}");
            false
        });
        ctx.ledger.append(LedgerRecord::Gate(GateRecord { ok }))?;
        if !ok {
            return Err(OrchError::GateFailed.into());
        }
        Ok(())
    }

    pub fn publish(&self, ctx: &RunContext) -> Result<()> {
        let report = PublishReport {
            feature_id: ctx.feature_id.clone(),
            run_id: ctx.run_id.clone(),
            run_dir: ctx.paths.dir.clone(),
            published: true,
            env: self.settings.reported_env(),
        };
        write_json(&ctx.paths.report_path, &report)?;
        ctx.ledger.append(LedgerRecord::Publish(PublishRecord {
            report_path: ctx.paths.report_path.clone(),
        }))?;
        Ok(())
    }
}

fn tool_record(tool: ToolKind, result: &ToolResult, stdout_path: &Path) -> ToolRecord {
    ToolRecord {
        tool,
        returncode: result.returncode,
        ok: result.ok(),
        stdout_path: stdout_path.to_path_buf(),
        stderr: result.stderr.clone(),
    }
}

/// Convenience wrapper: build an [`Orchestrator`] and run one feature.
pub fn run_feature<R: CommandRunner + ?Sized>(
    feature_id: &str,
    settings: &Settings,
    runner: &R,
) -> Result<RunOutcome> {
    Orchestrator::new(settings, runner)?.run_feature(feature_id)
}
