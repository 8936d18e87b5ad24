use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing_subscriber::EnvFilter;

use job_dispatch::config::{DispatcherConfig, QueueConfig};
use job_dispatch::scheduler::{Dispatcher, JobQueue, JobStatus};
use job_dispatch::shutdown::install_shutdown_handler;
use job_dispatch::worker::ShellProcessor;

#[derive(Parser, Debug)]
#[command(name = "job-dispatch")]
#[command(version)]
#[command(about = "Run shell commands on a pool of single-job processors")]
struct Args {
    /// Number of processors to register
    #[arg(long, short = 'w', default_value = "2")]
    workers: usize,

    /// Slots in the dispatcher's re-check signal channel
    #[arg(long, default_value = "100")]
    signal_capacity: usize,

    /// Maximum number of jobs the queue accepts
    #[arg(long, default_value = "10000")]
    max_jobs: usize,

    /// Output format for the final summary
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,

    /// Commands to run, one job each (e.g. "echo hello")
    #[arg(required = true)]
    commands: Vec<String>,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Serialize)]
struct JobSummary {
    job_id: String,
    status: String,
    command: String,
    duration_ms: Option<i64>,
}

#[derive(Serialize)]
struct RunSummary {
    jobs: Vec<JobSummary>,
    complete: usize,
    failed: usize,
    unfinished: usize,
}

fn summarize(queue: &JobQueue) -> RunSummary {
    let jobs: Vec<JobSummary> = queue
        .all_jobs()
        .into_iter()
        .map(|job| JobSummary {
            job_id: job.id.to_string(),
            status: job.status.to_string(),
            command: job.command.clone(),
            duration_ms: job
                .completed_at
                .map(|done| (done - job.created_at).num_milliseconds()),
        })
        .collect();

    RunSummary {
        complete: queue.jobs_with_status(JobStatus::Complete).len(),
        failed: queue.jobs_with_status(JobStatus::Failed).len(),
        unfinished: queue
            .all_jobs()
            .iter()
            .filter(|j| !j.status.is_terminal())
            .count(),
        jobs,
    }
}

fn print_table(summary: &RunSummary) {
    println!("{:<38} {:<10} {:>10}  COMMAND", "JOB ID", "STATUS", "MS");
    for job in &summary.jobs {
        let duration = job
            .duration_ms
            .map(|ms| ms.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<38} {:<10} {:>10}  {}",
            job.job_id, job.status, duration, job.command
        );
    }
    println!(
        "\n{} complete, {} failed, {} unfinished",
        summary.complete, summary.failed, summary.unfinished
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if args.workers == 0 {
        return Err("--workers must be at least 1".into());
    }

    let queue_config = QueueConfig::default().with_max_jobs(args.max_jobs);
    let job_queue = Arc::new(RwLock::new(JobQueue::with_config(&queue_config)));
    {
        let mut queue = job_queue.write().await;
        for command in &args.commands {
            queue.enqueue_job(command.clone())?;
        }
    }

    let dispatcher =
        Dispatcher::new(DispatcherConfig::default().with_signal_capacity(args.signal_capacity));
    let loop_handle = dispatcher.start_loop(job_queue.clone())?;

    for _ in 0..args.workers {
        dispatcher
            .register_processor(Arc::new(ShellProcessor::new()))
            .await;
    }

    let shutdown = install_shutdown_handler()?;
    let mut check = tokio::time::interval(Duration::from_millis(100));

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = check.tick() => {
                let queue = job_queue.read().await;
                if queue.all_jobs().iter().all(|j| j.status.is_terminal()) {
                    break;
                }
            }
        }
    }

    // Waits for in-flight runs, including after SIGINT
    dispatcher.shutdown().await;
    loop_handle.await?;

    let summary = summarize(&*job_queue.read().await);
    match args.output {
        OutputFormat::Table => print_table(&summary),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
    }

    if summary.failed > 0 {
        tracing::warn!(failed = summary.failed, "Some jobs failed");
    }
    Ok(())
}
