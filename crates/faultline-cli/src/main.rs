//! faultline - fire-and-forget fault reporting demo
//!
//! 1. 2 種類の handler を登録（unhandled fault / unobserved task failure）
//! 2. 失敗するタスクを 1 本 fire-and-forget で起動
//! 3. Enter を待ってから shutdown（最後の sweep）

use std::io::Write;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use faultline_core::impls::LoggingHandler;
use faultline_core::{FaultContext, FaultEvent, FaultKind, Supervisor, SupervisorConfig};
use tokio::io::{AsyncBufReadExt, BufReader};

const UNHANDLED_LINE: &str = "Unhandled exception was caught!";
const UNOBSERVED_LINE: &str = "Unhandled task scheduler exception was caught!";

#[derive(Parser)]
#[command(name = "faultline")]
#[command(about = "Shows which fault hook fires when a fire-and-forget task fails")]
#[command(version)]
struct Cli {
    /// Fault message raised by the launched task
    #[arg(long, default_value = "Hello World!")]
    message: String,

    /// Join the task instead of detaching it (the fault is then observed)
    #[arg(long)]
    observe: bool,

    /// Periodic sweep interval in milliseconds (0 disables it)
    #[arg(long, value_name = "MS")]
    sweep_interval_ms: Option<u64>,
}

async fn fail(message: String) {
    panic!("{message}");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout は demo の出力専用、ログは stderr へ
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = SupervisorConfig::from_env().context("invalid FAULTLINE_* environment")?;
    if let Some(ms) = cli.sweep_interval_ms {
        config = config.with_sweep_interval(Duration::from_millis(ms));
    }

    let context = FaultContext::new();
    context
        .on_unhandled_fault(|_: &FaultEvent| say(UNHANDLED_LINE))
        .on_unobserved_failure(|_: &FaultEvent| say(UNOBSERVED_LINE))
        .on_unhandled_fault(LoggingHandler::new(FaultKind::Fault))
        .on_unobserved_failure(LoggingHandler::new(FaultKind::UnobservedFailure));
    context.install_panic_hook();

    let supervisor = Supervisor::start(context, config)?;
    let launcher = supervisor.launcher();

    if cli.observe {
        let handle = launcher.launch(fail(cli.message));
        println!("Fire and forget!");
        if let Err(event) = handle.join().await {
            println!("Task fault observed: {}", event.message());
        }
    } else {
        let task_id = launcher.fire_and_forget(fail(cli.message));
        tracing::debug!(%task_id, "fired");
        println!("Fire and forget!");
    }

    wait_for_enter().await?;

    supervisor.shutdown().await;
    Ok(())
}

/// Fault handlers must not panic, so a closed stdout is ignored here.
fn say(line: &str) {
    let _ = writeln!(std::io::stdout(), "{line}");
}

/// Block until a line (or EOF) arrives on stdin.
async fn wait_for_enter() -> anyhow::Result<()> {
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("failed to read stdin")?;
    Ok(())
}
