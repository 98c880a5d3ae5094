//! Demo binary: exercises the proxy/listener protocol and the worker
//! supervisor end to end, wired up with ordinary CLI config and logging.

mod object;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use chain::Kwargs;
use proxy::{Called, ProxyOptions};
use tracing_subscriber::EnvFilter;
use worker::{registry::EntryError, Job, JobOptions};

use object::Counter;

fn register_entry_points() {
    worker::register("double_and_report", |args| {
        let n = args.as_i64().ok_or_else(|| EntryError("expected an integer argument".into()))?;
        Ok(serde_json::Value::from(n * 2))
    });
}

#[derive(Parser)]
#[command(name = "relay", about = "Demonstrates a cross-process proxy/listener pair and a worker supervisor")]
struct Cli {
    /// Emit logs as JSON instead of the default human-readable format.
    #[arg(long, env = "RELAY_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the proxy/listener round trip against an in-process root object.
    Demo,
    /// Spawn a thread-mode and a process-mode worker and report their results.
    Worker {
        #[arg(long, default_value_t = 21)]
        value: i64,
        /// How long to wait for each worker to finish, e.g. "5s", "500ms".
        #[arg(long, value_parser = humantime::parse_duration, default_value = "5s")]
        job_timeout: Duration,
    },
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[tokio::main]
async fn main() {
    // Must run before anything else touches stdio or argv: a re-exec'd
    // process-mode worker never reaches the rest of `main`.
    register_entry_points();
    worker::process::maybe_run_as_worker();

    let cli = Cli::parse();
    init_logging(cli.log_json);

    match cli.command {
        Command::Demo => run_demo().await,
        Command::Worker { value, job_timeout } => run_worker(value, job_timeout).await,
    }
}

async fn run_demo() {
    let (proxy, listener) = proxy::pair(Counter::new(10), ProxyOptions::default());
    let listener = Arc::new(listener);
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let stop_reader = stop.clone();
    let listen_handle = listener.clone().background_listen(move || stop_reader.load(Ordering::Acquire), Duration::from_micros(200));

    proxy.wait_until_listening(|| true).await.expect("listener starts promptly");

    let x = proxy.attr("x").get_(None).await.unwrap();
    tracing::info!(?x, "initial remote value");

    let called = proxy.attr("double").call(vec![], Kwargs::new()).await.unwrap();
    let chained = match called {
        Called::Resolved(resolved) => {
            assert!(resolved.is_self());
            proxy.clone()
        }
        Called::Pending(p) => p,
    };
    let x = chained.attr("x").get_(None).await.unwrap();
    tracing::info!(?x, "remote value after double()");

    match proxy.attr("error").call(vec![], Kwargs::new()).await {
        Ok(_) => unreachable!("the demo root's error() always fails"),
        Err(e) => tracing::info!(error = %e, "remote call failed as expected"),
    }

    stop.store(true, Ordering::Release);
    listen_handle.await.expect("listener task joins cleanly");
}

async fn run_worker(value: i64, job_timeout: Duration) {
    let mut thread_job: Job<i64> = Job::thread(
        move |_| -> Result<i64, std::convert::Infallible> { Ok(value * 2) },
        JobOptions { timeout: Some(job_timeout), ..JobOptions::default() },
    );
    thread_job.join(None, None).await.expect("thread worker completes without error");
    if let except::ResultView::Value(v) = thread_job.result() {
        tracing::info!(result = v, "thread-mode worker finished");
    }

    let mut process_job = Job::process(
        "double_and_report",
        serde_json::Value::from(value),
        JobOptions { timeout: Some(job_timeout), ..JobOptions::default() },
    )
    .expect("spawning a process-mode worker");
    process_job.join(None, None).await.expect("process worker completes without error");
    if let except::ResultView::Value(v) = process_job.result() {
        tracing::info!(result = %v, "process-mode worker finished");
    }
}
