// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The CI jobs of `.github/workflows/ci.yml`, runnable locally.
//!
//! Jobs are plain data built from a [`CiConfig`]; running them goes through a
//! [`StepRunner`] so the pipeline logic can be tested without spawning cargo.

use crate::commands::config::CiConfig;
use crate::helpers::*;
use anyhow::{Context, Result};
use std::time::{Duration, Instant};

/// A single tool invocation. Its exit status decides whether it passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub name: &'static str,
    pub info: &'static str,
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
}

impl Step {
    /// A `cargo` step, pinned to the configured toolchain if there is one.
    fn cargo(config: &CiConfig, name: &'static str, info: &'static str, args: &[&str]) -> Self {
        let toolchain = config.toolchain.iter().map(|t| format!("+{t}"));
        Self {
            name,
            info,
            program: "cargo".to_string(),
            args: toolchain
                .chain(args.iter().map(|a| a.to_string()))
                .collect(),
            envs: Vec::new(),
        }
    }

    fn with_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.args.extend(args);
        self
    }

    fn with_env(mut self, key: &str, value: String) -> Self {
        self.envs.push((key.to_string(), value));
        self
    }

    pub fn command_line(&self) -> String {
        format_command(&self.program, &self.args, &self.envs)
    }
}

/// An ordered list of steps. A job stops at its first failing step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub name: &'static str,
    pub emoji: &'static str,
    pub color: &'static str,
    pub steps: Vec<Step>,
}

impl Job {
    pub fn single(name: &'static str, emoji: &'static str, color: &'static str, step: Step) -> Self {
        Self {
            name,
            emoji,
            color,
            steps: vec![step],
        }
    }
}

/// Runs the steps of a job.
pub trait StepRunner {
    fn run(&mut self, step: &Step) -> Result<()>;
}

/// Spawns the step as a child process with inherited stdio.
pub struct ProcessRunner;

impl StepRunner for ProcessRunner {
    fn run(&mut self, step: &Step) -> Result<()> {
        println!("{}💡 Info:{} {}", BOLD, RESET, step.info);
        execute_command(&step.program, &step.args, &step.envs, step.name)
    }
}

// --- STEPS ---

pub fn build_step(config: &CiConfig) -> Step {
    Step::cargo(
        config,
        "Build",
        "Compiling all workspace crates in debug mode",
        &["build", "--workspace"],
    )
}

pub fn check_step(config: &CiConfig) -> Step {
    Step::cargo(
        config,
        "Check",
        "Checking every target for errors without building executables",
        &["check", "--workspace", "--all-targets"],
    )
}

pub fn test_step(config: &CiConfig) -> Step {
    Step::cargo(
        config,
        "Tests",
        "Running unit tests, integration tests and doc tests",
        &["test", "--workspace"],
    )
}

pub fn miri_step(config: &CiConfig) -> Step {
    let packages = config
        .miri_packages
        .iter()
        .flat_map(|p| ["-p".to_string(), p.clone()]);
    Step::cargo(
        config,
        "Miri",
        "Running the library tests under Miri",
        &["miri", "test"],
    )
    .with_args(packages)
    .with_env("MIRIFLAGS", config.miri_flags_env())
}

pub fn fmt_step(config: &CiConfig, fix: bool) -> Step {
    if fix {
        // `fmt` takes `--all`, not `--workspace`
        Step::cargo(
            config,
            "Format",
            "Formatting code using rustfmt with default settings",
            &["fmt", "--all"],
        )
    } else {
        Step::cargo(
            config,
            "Format check",
            "Checking formatting without touching any file",
            &["fmt", "--all", "--", "--check"],
        )
    }
}

pub fn clippy_step(config: &CiConfig) -> Step {
    Step::cargo(
        config,
        "Clippy",
        "Running Clippy linter on all targets",
        &["clippy", "--workspace", "--all-targets", "--"],
    )
    .with_args(config.clippy_args.iter().cloned())
}

// --- JOBS ---

/// The `test` job: the test suite, then the same suite under Miri.
pub fn test_job(config: &CiConfig) -> Job {
    Job {
        name: "test",
        emoji: TEST_TUBE,
        color: GREEN,
        steps: vec![test_step(config), miri_step(config)],
    }
}

/// The `lints` job: formatting check, then clippy.
pub fn lints_job(config: &CiConfig) -> Job {
    Job {
        name: "lints",
        emoji: CLIPPY,
        color: YELLOW,
        steps: vec![fmt_step(config, false), clippy_step(config)],
    }
}

/// Every job of the workflow, in declaration order.
pub fn workflow_jobs(config: &CiConfig) -> Vec<Job> {
    vec![test_job(config), lints_job(config)]
}

// --- RUNNING ---

/// Runs the steps of `job` in order and stops at the first one that fails.
pub fn run_job(job: &Job, runner: &mut impl StepRunner) -> Result<()> {
    print_task_start(job.name, job.emoji, job.color);
    let total = job.steps.len();
    for (i, step) in job.steps.iter().enumerate() {
        println!(
            "\n{}{}[{}/{}] {}{}",
            BOLD,
            job.color,
            i + 1,
            total,
            step.name,
            RESET
        );
        runner
            .run(step)
            .with_context(|| {
                format!(
                    "Job '{}' stopped at step '{}' ({})",
                    job.name,
                    step.name,
                    step.command_line()
                )
            })?;
    }
    Ok(())
}

#[derive(Debug)]
pub struct JobOutcome {
    pub name: &'static str,
    pub result: Result<()>,
    pub duration: Duration,
}

impl JobOutcome {
    pub fn passed(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs every job, whether or not an earlier one failed.
pub fn run_jobs(jobs: &[Job], runner: &mut impl StepRunner) -> Vec<JobOutcome> {
    jobs.iter()
        .map(|job| {
            let start_time = Instant::now();
            let result = run_job(job, runner);
            if let Err(e) = &result {
                print_status(false, &format!("{:#}", e));
            }
            JobOutcome {
                name: job.name,
                result,
                duration: start_time.elapsed(),
            }
        })
        .collect()
}

fn print_summary(outcomes: &[JobOutcome], total_duration: Duration) {
    println!(
        "\n{}{}╔═══════════════════════════════════════╗{}",
        BOLD, CYAN, RESET
    );
    println!(
        "{}{}║            PIPELINE SUMMARY           ║{}",
        BOLD, CYAN, RESET
    );
    println!(
        "{}{}╚═══════════════════════════════════════╝{}",
        BOLD, CYAN, RESET
    );

    for outcome in outcomes {
        let line = format!(
            "{} ({:.2}s)",
            outcome.name,
            outcome.duration.as_secs_f64()
        );
        print_status(outcome.passed(), &line);
    }

    let passed = outcomes.iter().filter(|o| o.passed()).count();
    if passed == outcomes.len() {
        println!(
            "{}{} {} All {} jobs completed successfully! {}{}",
            BOLD,
            GREEN,
            CHECK,
            outcomes.len(),
            ROCKET,
            RESET
        );
    } else {
        println!(
            "{}{} ⚠ {}/{} jobs completed{}",
            BOLD,
            YELLOW,
            passed,
            outcomes.len(),
            RESET
        );
    }

    println!(
        "{}{}Total time: {:.2}s{}",
        BOLD,
        BLUE,
        total_duration.as_secs_f64(),
        RESET
    );
}

/// Runs the jobs, prints the summary and fails if any job failed.
pub fn run_pipeline(jobs: &[Job], runner: &mut impl StepRunner) -> Result<()> {
    let start_time = Instant::now();
    let outcomes = run_jobs(jobs, runner);
    print_summary(&outcomes, start_time.elapsed());

    let failed: Vec<&str> = outcomes
        .iter()
        .filter(|o| !o.passed())
        .map(|o| o.name)
        .collect();
    if !failed.is_empty() {
        anyhow::bail!(
            "Pipeline failed: {}/{} jobs failed ({}).",
            failed.len(),
            outcomes.len(),
            failed.join(", ")
        );
    }

    Ok(())
}

/// `cargo xtask ci`: the whole workflow.
pub fn ci(config: &CiConfig) -> Result<()> {
    println!("{}", BANNER);
    println!("{}{}Starting CI pipeline...{}", BOLD, CYAN, RESET);
    println!(
        "{}💡 Pipeline:{} test (tests → miri), lints (fmt → clippy)",
        BOLD, RESET
    );
    run_pipeline(&workflow_jobs(config), &mut ProcessRunner)
}

/// Runs a single job with real processes.
pub fn run(job: Job) -> Result<()> {
    run_job(&job, &mut ProcessRunner)
}

// --- TESTS ---

#[cfg(test)]
mod tests {
    use super::*;

    /// Records the steps it is asked to run and fails the ones named in `failing`.
    #[derive(Default)]
    struct ScriptedRunner {
        failing: Vec<&'static str>,
        ran: Vec<&'static str>,
    }

    impl StepRunner for ScriptedRunner {
        fn run(&mut self, step: &Step) -> Result<()> {
            self.ran.push(step.name);
            if self.failing.contains(&step.name) {
                anyhow::bail!("{} exited with status 1", step.name);
            }
            Ok(())
        }
    }

    fn command_lines(job: &Job) -> Vec<String> {
        job.steps.iter().map(Step::command_line).collect()
    }

    #[test]
    fn test_test_job_plan() {
        let job = test_job(&CiConfig::default());
        assert_eq!(
            command_lines(&job),
            [
                "cargo test --workspace",
                "MIRIFLAGS=\"-Zmiri-strict-provenance -Zmiri-symbolic-alignment-check\" \
                 cargo miri test -p erasure -p erasure-alloc",
            ]
        );
    }

    #[test]
    fn test_lints_job_plan() {
        let job = lints_job(&CiConfig::default());
        assert_eq!(
            command_lines(&job),
            [
                "cargo fmt --all -- --check",
                "cargo clippy --workspace --all-targets -- -D warnings",
            ]
        );
    }

    #[test]
    fn test_toolchain_override() {
        let config = CiConfig {
            toolchain: Some("nightly-2025-06-01".to_string()),
            ..CiConfig::default()
        };
        for job in workflow_jobs(&config) {
            for step in &job.steps {
                assert_eq!(step.args[0], "+nightly-2025-06-01", "{}", step.name);
            }
        }
    }

    #[test]
    fn test_fmt_fix_rewrites() {
        let step = fmt_step(&CiConfig::default(), true);
        assert_eq!(step.command_line(), "cargo fmt --all");
    }

    #[test]
    fn test_job_stops_at_first_failure() {
        let mut runner = ScriptedRunner {
            failing: vec!["Tests"],
            ..Default::default()
        };
        let result = run_job(&test_job(&CiConfig::default()), &mut runner);

        assert!(result.is_err());
        assert_eq!(runner.ran, ["Tests"]);
    }

    #[test]
    fn test_pipeline_runs_every_job() {
        let mut runner = ScriptedRunner {
            failing: vec!["Miri"],
            ..Default::default()
        };
        let outcomes = run_jobs(&workflow_jobs(&CiConfig::default()), &mut runner);

        assert_eq!(runner.ran, ["Tests", "Miri", "Format check", "Clippy"]);
        assert!(!outcomes[0].passed());
        assert!(outcomes[1].passed());
    }

    #[test]
    fn test_pipeline_reports_failed_jobs() {
        let mut runner = ScriptedRunner {
            failing: vec!["Format check"],
            ..Default::default()
        };
        let error = run_pipeline(&workflow_jobs(&CiConfig::default()), &mut runner)
            .unwrap_err()
            .to_string();

        assert_eq!(error, "Pipeline failed: 1/2 jobs failed (lints).");
    }

    #[test]
    fn test_pipeline_passes() {
        let mut runner = ScriptedRunner::default();
        assert!(run_pipeline(&workflow_jobs(&CiConfig::default()), &mut runner).is_ok());
        assert_eq!(runner.ran.len(), 4);
    }
}
