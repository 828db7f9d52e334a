use std::process::ExitCode;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use monit_lib::runtime_config::MonitSettings;
use monit_lib::stream::consumer::DEFAULT_QUEUE_CAPACITY;
use monit_lib::{init_tracing, load_env_files, resolve_workspace_root, MonitRuntime};

#[tokio::main]
async fn main() -> ExitCode {
    match resolve_workspace_root() {
        Ok(root) => load_env_files(&root),
        Err(err) => eprintln!("{err}"),
    }
    init_tracing();

    let runtime = match MonitRuntime::bootstrap(MonitSettings::from_env()).await {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "startup failed");
            return ExitCode::FAILURE;
        }
    };

    let (sender, consumer) = runtime.spawn_consumer(DEFAULT_QUEUE_CAPACITY);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("reading vitals as newline-delimited JSON from stdin");

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if sender.send(line.to_string()).await.is_err() {
                        warn!("vitals consumer stopped early");
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    error!(error = %err, "stdin read failed");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, draining queued vitals");
                break;
            }
        }
    }

    drop(sender);
    match consumer.await {
        Ok(stats) => info!(
            received = stats.received,
            skipped = stats.skipped,
            failed = stats.failed,
            alerted = stats.alerted,
            analyzed = stats.analyzed,
            "vitals stream closed"
        ),
        Err(err) => error!(error = %err, "vitals consumer aborted"),
    }
    runtime.shutdown().await;
    ExitCode::SUCCESS
}
