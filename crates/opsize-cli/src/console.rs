//! Console front end: live progress, per-operator tables, and the
//! interactive continue-or-stop prompt.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::sync::Mutex;
use std::time::Duration;

use dialoguer::theme::ColorfulTheme;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use opsize_common::config::SizingPolicy;
use opsize_common::constants::APP_NAME;
use opsize_common::types::ExecutionStatus;
use opsize_profiler::event::{RunEvent, RunObserver};
use opsize_profiler::policy::{Decision, DecisionPrompt};
use opsize_profiler::report;
use opsize_profiler::{OperatorExecution, PipelineReport, RunOutcome};

use crate::output::{failure_banner, indent, section_header, BOLD, DIM, GREEN, RESET, YELLOW};

/// Prints run progress to the terminal.
#[derive(Debug)]
pub struct ConsoleReporter {
    verbose: bool,
    metrics_to_files: bool,
    sizing: SizingPolicy,
    spinner: Mutex<Option<ProgressBar>>,
}

impl ConsoleReporter {
    /// Creates a reporter. Raw samples are printed only in verbose mode
    /// when no metrics directory receives them.
    #[must_use]
    pub const fn new(verbose: bool, metrics_to_files: bool, sizing: SizingPolicy) -> Self {
        Self {
            verbose,
            metrics_to_files,
            sizing,
            spinner: Mutex::new(None),
        }
    }

    fn start_spinner(&self, message: String) {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("  {spinner:.green} {msg} {elapsed:.dim}") {
            bar.set_style(style);
        }
        bar.set_message(message);
        bar.enable_steady_tick(Duration::from_millis(100));
        if let Ok(mut slot) = self.spinner.lock() {
            if let Some(previous) = slot.replace(bar) {
                previous.finish_and_clear();
            }
        }
    }

    fn update_spinner(&self, message: String) {
        if let Ok(slot) = self.spinner.lock() {
            if let Some(bar) = slot.as_ref() {
                bar.set_message(message);
            }
        }
    }

    fn stop_spinner(&self) {
        if let Ok(mut slot) = self.spinner.lock() {
            if let Some(bar) = slot.take() {
                bar.finish_and_clear();
            }
        }
    }

    fn print_execution(&self, exec: &OperatorExecution) {
        if let Some(id) = &exec.container_id {
            eprintln!("  {DIM}container {id}{RESET}");
        }
        if let Some(path) = &exec.metrics_file {
            eprintln!("  {DIM}metrics written to {}{RESET}", path.display());
        }
        if self.verbose && !self.metrics_to_files && !exec.samples.is_empty() {
            eprintln!("{}", indent(&report::render_samples(&exec.samples)));
        }
        if let Some(summary) = &exec.summary {
            eprintln!("{}", indent(&report::render_operator_summary(summary, &self.sizing)));
        }

        match exec.status {
            ExecutionStatus::Succeeded => {
                eprintln!("  {GREEN}✓ {} completed{RESET}", exec.operator);
            }
            ExecutionStatus::Failed | ExecutionStatus::TimedOut => {
                let detail = exec.reason.as_deref().unwrap_or("unknown failure");
                eprintln!("  {}", failure_banner(&exec.operator, detail));
                if let Some(code) = exec.exit_code {
                    eprintln!("  {DIM}exit code {code}{RESET}");
                }
                if self.verbose {
                    if let Some(command) = &exec.launch_command {
                        eprintln!("  {DIM}launched with:{RESET} {command}");
                    }
                }
            }
            ExecutionStatus::Skipped => {}
        }
        eprintln!();
    }

    fn print_report(report: &PipelineReport) {
        eprintln!("{BOLD}Summary{RESET}");
        println!("{}", report::render_pipeline_summary(report));
        let color = match report.outcome {
            RunOutcome::AllSucceeded => GREEN,
            RunOutcome::AbortedEarly | RunOutcome::CompletedWithFailures => YELLOW,
        };
        eprintln!(
            "{color}{BOLD}{}{RESET}: {} attempted, {} failed, {} skipped",
            report.outcome,
            report.attempted(),
            report.failures(),
            report.skipped()
        );
    }
}

impl RunObserver for ConsoleReporter {
    fn on_event(&self, event: &RunEvent<'_>) {
        match event {
            RunEvent::RunStarted {
                pipeline,
                operators,
            } => {
                eprintln!();
                eprintln!("  {BOLD}{APP_NAME}{RESET} {DIM}v{}{RESET}", env!("CARGO_PKG_VERSION"));
                eprintln!("  profiling {BOLD}{pipeline}{RESET}: {operators} operator(s)");
                eprintln!();
            }
            RunEvent::OperatorStarted {
                index,
                total,
                operator,
            } => {
                eprintln!("{}", section_header(*index, *total, operator));
                self.start_spinner(format!("provisioning {operator}"));
            }
            RunEvent::ContainerStarted { operator, id } => {
                self.update_spinner(format!("{operator} running ({}), sampling", id.short()));
            }
            RunEvent::OperatorFinished { execution } => {
                self.stop_spinner();
                self.print_execution(execution);
            }
            RunEvent::OperatorSkipped { operator } => {
                eprintln!("  {YELLOW}- {operator} skipped{RESET}");
            }
            RunEvent::RunFinished { report } => {
                self.stop_spinner();
                Self::print_report(report);
            }
        }
    }
}

/// Asks on the terminal whether to continue after a failure.
#[derive(Debug, Default)]
pub struct ConsolePrompt;

impl DecisionPrompt for ConsolePrompt {
    fn decide(&self, failed: &OperatorExecution) -> Option<Decision> {
        let answer = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("{} failed. Continue with the next operator?", failed.operator))
            .default(false)
            .interact_opt();
        match answer {
            Ok(Some(true)) => Some(Decision::Continue),
            Ok(Some(false)) => Some(Decision::Stop),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "no terminal to ask on");
                None
            }
        }
    }
}
