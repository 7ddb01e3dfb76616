// Demo run command
//
// Sums the squares of 1..=N on a worker pool through StatefulTaskRunner,
// optionally injecting a failure, and reports the accumulated state.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use taskgrid_engine::prelude::*;
use tracing::{info, warn};

use crate::output::{OutputFormat, TextReport};

/// Resolution of the progress bar, which is fed fractions
const PROGRESS_TICKS: u64 = 1000;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Number of tasks to submit (squares of 1..=N)
    #[arg(long, short = 'n', default_value = "1000")]
    pub tasks: u64,

    /// Worker threads per pool (default: 4)
    #[arg(long, short, env = "TASKGRID_WORKERS")]
    pub workers: Option<usize>,

    /// Make this task fail with an error-tagged result
    #[arg(long)]
    pub fail_on: Option<u64>,

    /// Simulated work per task in milliseconds
    #[arg(long, default_value = "0")]
    pub delay_ms: u64,
}

/// One error-tagged result, as stored by the application
#[derive(Debug, Clone, Serialize)]
pub struct FailedTask {
    pub task: u64,
    pub kind: TaskErrorKind,
    pub message: String,
}

/// Demo application: workers square numbers, the runner sums them
#[derive(Debug, Clone, Default, Serialize)]
pub struct SumOfSquares {
    #[serde(skip)]
    fail_on: Option<u64>,
    #[serde(skip)]
    delay: Duration,
    pub sum: u64,
    pub succeeded: u64,
    pub failures: Vec<FailedTask>,
    pub mean: Option<f64>,
}

impl SumOfSquares {
    pub fn new(fail_on: Option<u64>, delay: Duration) -> Self {
        Self {
            fail_on,
            delay,
            ..Default::default()
        }
    }
}

impl Application for SumOfSquares {
    type Task = u64;
    type Output = u64;

    fn name(&self) -> &str {
        "sum-of-squares"
    }

    fn prepare(&mut self) {
        self.sum = 0;
        self.succeeded = 0;
        self.failures.clear();
        self.mean = None;
    }

    fn task_function(&self, task: &u64) -> TaskOutcome<u64> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        if self.fail_on == Some(*task) {
            return Err(TaskError::failed(format!("injected failure on task {task}")));
        }
        task.checked_mul(*task)
            .ok_or_else(|| TaskError::failed(format!("square of {task} overflows")))
    }

    fn store_result(&mut self, task: &u64, outcome: &TaskOutcome<u64>) {
        match outcome {
            Ok(square) => {
                self.sum = self.sum.saturating_add(*square);
                self.succeeded += 1;
            }
            Err(e) => self.failures.push(FailedTask {
                task: *task,
                kind: e.kind,
                message: e.message.clone(),
            }),
        }
    }

    fn finalize(&mut self) {
        if self.succeeded > 0 {
            self.mean = Some(self.sum as f64 / self.succeeded as f64);
        }
    }
}

/// Everything printed at the end of a run
#[derive(Debug, Serialize)]
struct RunSummary {
    tasks: u64,
    workers: usize,
    interrupted: bool,
    elapsed_ms: u64,
    application: SumOfSquares,
    stats: EngineStats,
}

pub async fn run(args: RunArgs, output: OutputFormat, quiet: bool) -> Result<()> {
    let mut config = CoordinatorConfig::from_env().with_name("taskgrid");
    if let Some(workers) = args.workers {
        config = config.with_workers(workers);
    }
    let workers = config.n_workers;

    let app = SumOfSquares::new(args.fail_on, Duration::from_millis(args.delay_ms));
    let runner = Arc::new(
        StatefulTaskRunner::new(app, config).context("Failed to create task runner")?,
    );

    let started = Instant::now();
    runner.prepare()?;
    runner.submit_many(1..=args.tasks)?;
    runner.start()?;
    info!(tasks = args.tasks, workers, "Run started");

    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        progress_bar()?
    };
    let mut watcher = {
        let runner = Arc::clone(&runner);
        let progress = progress.clone();
        let show_warnings = !quiet && output.is_text();
        let total = args.tasks;
        tokio::task::spawn_blocking(move || watch(&runner, total, &progress, show_warnings))
    };

    let interrupted = tokio::select! {
        watched = &mut watcher => {
            watched.context("Event watcher panicked")?;
            false
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping after in-flight tasks");
            runner.stop();
            watcher.await.context("Event watcher panicked")?;
            true
        }
    };
    progress.finish_and_clear();

    runner.finalize().context("Failed to finalize application")?;

    let summary = RunSummary {
        tasks: args.tasks,
        workers,
        interrupted,
        elapsed_ms: started.elapsed().as_millis() as u64,
        application: runner.application_state(),
        stats: runner.stats(),
    };

    match output.render(&summary)? {
        Some(rendered) => print!("{rendered}"),
        None => print!("{}", text_report(&summary).render()),
    }
    Ok(())
}

fn progress_bar() -> Result<ProgressBar> {
    let progress = ProgressBar::new(PROGRESS_TICKS);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% {msg}")?
            .progress_chars("=>-"),
    );
    Ok(progress)
}

/// Feed events into the progress bar; stops the runner once every task reported
fn watch(
    runner: &StatefulTaskRunner<SumOfSquares>,
    total: u64,
    progress: &ProgressBar,
    show_warnings: bool,
) {
    let events = runner.events();
    let mut results = 0u64;
    if total == 0 {
        runner.stop();
    }

    for event in events.iter() {
        match event {
            EngineEvent::Progress(fraction) => {
                progress.set_position((fraction * PROGRESS_TICKS as f64).round() as u64);
            }
            EngineEvent::Result { task, outcome } => {
                results += 1;
                progress.set_message(format!("{results}/{total}"));
                if let Err(e) = outcome {
                    if show_warnings {
                        progress.println(format!("warning: task {task}: {e}"));
                    }
                }
                if results == total {
                    runner.stop();
                }
            }
            EngineEvent::Finished => break,
        }
    }
}

fn text_report(summary: &RunSummary) -> TextReport {
    let app = &summary.application;
    let mut report = TextReport::default();
    report
        .field("Tasks", summary.tasks)
        .field("Workers", summary.workers)
        .field("Succeeded", app.succeeded)
        .field("Failed", app.failures.len())
        .field("Sum", app.sum);
    if let Some(mean) = app.mean {
        report.field("Mean", format!("{mean:.2}"));
    }
    report.field("Elapsed", format!("{}ms", summary.elapsed_ms));
    if summary.interrupted {
        report.field("Status", "interrupted");
    }

    let rows = app
        .failures
        .iter()
        .map(|failure| {
            vec![
                failure.task.to_string(),
                failure.kind.to_string(),
                failure.message.clone(),
            ]
        })
        .collect();
    report.table(&[("TASK", 10), ("KIND", 10), ("MESSAGE", 40)], rows);
    report
}
