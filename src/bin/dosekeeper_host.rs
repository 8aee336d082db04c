//! Reminder host: runs the poller and answers user actions over stdio.
//!
//! Reads newline-delimited JSON actions `{"user", "message_ref", "token"}`
//! from stdin and writes `{"user", "ok", "notice"}` lines to stdout. All
//! tracing output goes to stderr (and optionally a log directory) so that
//! stdout stays a clean JSON channel.

use clap::Parser;
use dosekeeper::channels::{MessageChannel, RecordingChannel, WebhookChannel};
use dosekeeper::clock::SystemClock;
use dosekeeper::config::LoggingConfig;
use dosekeeper::model::{MessageRef, UserKey};
use dosekeeper::store::JsonFileProfileStore;
use dosekeeper::{DosekeeperConfig, Poller, PollerSettings, ReminderService, ServiceSettings};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Medication reminder host.
#[derive(Parser)]
#[command(name = "dosekeeper-host", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run a single poll, print its report and exit.
    #[arg(long)]
    once: bool,
}

#[derive(Debug, Deserialize)]
struct ActionLine {
    user: String,
    message_ref: String,
    token: String,
}

#[derive(Debug, Serialize)]
struct ActionReply {
    user: String,
    ok: bool,
    notice: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let _log_guard = init_tracing(&config.logging);

    config.validate()?;
    info!(store = %config.store.path.display(), "dosekeeper-host starting");

    let store = Arc::new(JsonFileProfileStore::open(&config.store.path).await?);
    let channel: Arc<dyn MessageChannel> = match &config.channel.webhook_url {
        Some(url) => Arc::new(WebhookChannel::new(url.clone(), &config.channel)?),
        None => {
            warn!("no channel.webhook_url configured, messages are recorded only");
            Arc::new(RecordingChannel::new())
        }
    };
    let service = Arc::new(ReminderService::new(
        store,
        channel,
        Arc::new(SystemClock),
        ServiceSettings::from_config(&config)?,
    ));
    let poller = Arc::new(Poller::new(
        Arc::clone(&service),
        PollerSettings::from(&config.poller),
    ));

    if cli.once {
        let report = poller.run_once().await;
        println!("{}", serde_json::to_string(&report)?);
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let poller_handle = Arc::clone(&poller).run(cancel.child_token());

    tokio::select! {
        result = run_action_bridge(service) => {
            if let Err(e) = result {
                error!(error = %e, "action bridge failed");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received");
        }
    }

    cancel.cancel();
    if let Err(e) = poller_handle.await {
        error!(error = %e, "poller task ended abnormally");
    }
    info!("dosekeeper-host shut down cleanly");
    Ok(())
}

fn load_config(explicit: Option<&std::path::Path>) -> anyhow::Result<DosekeeperConfig> {
    if let Some(path) = explicit {
        return Ok(DosekeeperConfig::from_file(path)?);
    }
    let path = DosekeeperConfig::default_config_path();
    if path.exists() {
        Ok(DosekeeperConfig::from_file(&path)?)
    } else {
        Ok(DosekeeperConfig::default())
    }
}

/// Stderr logging plus an optional daily file. The returned guard flushes
/// the file writer on drop.
fn init_tracing(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter))
    };
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter());

    let (file_layer, guard) = match &config.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "dosekeeper.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
    guard
}

/// Answer action lines from stdin until EOF.
async fn run_action_bridge(service: Arc<ReminderService>) -> anyhow::Result<()> {
    let mut reader = BufReader::new(tokio::io::stdin());
    let mut writer = BufWriter::new(tokio::io::stdout());
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            info!("stdin closed (EOF); stopping action bridge");
            return Ok(());
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<ActionLine>(trimmed) {
            Ok(action) => {
                let response = service
                    .on_user_action(
                        &UserKey::new(action.user.clone()),
                        &MessageRef::new(action.message_ref),
                        &action.token,
                    )
                    .await;
                ActionReply {
                    user: action.user,
                    ok: response.ok,
                    notice: response.notice,
                }
            }
            Err(e) => {
                warn!(error = %e, raw_line = %trimmed, "cannot parse action line");
                ActionReply {
                    user: String::new(),
                    ok: false,
                    notice: format!("malformed action: {e}"),
                }
            }
        };

        let json = serde_json::to_string(&reply)?;
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
}
