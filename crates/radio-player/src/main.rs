mod backend;
mod http;
mod mpv;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use radio_core::config::Config;
use radio_core::core::{PlayerClient, PlayerCore, EVENT_CHANNEL_CAPACITY, NOTICE_CHANNEL_CAPACITY};
use radio_core::protocol::{Command, Notice, PlayerEvent, Reply};
use radio_core::source::{ConfiguredSource, DirectorySink};
use radio_core::storage::FileStore;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::backend::MpvBackend;

/// Internet radio player with an HTTP control API
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file to use instead of the per-user default
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Do not start the HTTP API
    #[arg(long = "no-http")]
    no_http: bool,

    /// Import a station list file before starting
    #[arg(short = 'i', long = "import", value_name = "FILE")]
    import: Option<PathBuf>,

    /// Log at debug level
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

/// Forwards WARN and ERROR log lines to notice subscribers.
struct NoticeLayer {
    sender: broadcast::Sender<Notice>,
}

impl<S> tracing_subscriber::Layer<S> for NoticeLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let level = event.metadata().level();
        if !matches!(*level, tracing::Level::WARN | tracing::Level::ERROR) {
            return;
        }

        let now = chrono::Local::now();
        let mut message = format!("{} [{}] ", now.format("%H:%M:%S"), level);
        let mut visitor = MessageVisitor(&mut message);
        event.record(&mut visitor);

        // no subscribers is fine
        let _ = self.sender.send(Notice::log(message));
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl<'a> tracing::field::Visit for MessageVisitor<'a> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.push_str(&format!("{:?}", value));
        } else {
            self.0.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

fn init_logging(verbose: bool, notice_tx: broadcast::Sender<Notice>) -> anyhow::Result<PathBuf> {
    let data_dir = radio_core::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("player.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new("info,radio_core=debug,radio_player=debug")
        })
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(NoticeLayer { sender: notice_tx })
        .with(filter)
        .init();

    Ok(log_path)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let (notice_tx, _) = broadcast::channel::<Notice>(NOTICE_CHANNEL_CAPACITY);
    let log_path = init_logging(args.verbose, notice_tx.clone())?;
    info!("Log file: {:?}", log_path);

    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    info!(
        "Config loaded from: {:?}",
        args.config.clone().unwrap_or_else(Config::config_path)
    );

    std::fs::create_dir_all(&config.storage.dir)?;
    let store = Arc::new(FileStore::new(&config.storage.dir));
    let source = ConfiguredSource::from_setting(&config.stations.default_source);
    let sink = Arc::new(DirectorySink::new(&config.stations.export_dir));

    // Everything the core reacts to funnels through this channel
    let (event_tx, event_rx) = mpsc::channel::<PlayerEvent>(EVENT_CHANNEL_CAPACITY);
    let backend = MpvBackend::new(event_tx.clone());

    let mut core = PlayerCore::new(
        &config,
        store,
        backend,
        source,
        sink,
        event_tx.clone(),
        notice_tx.clone(),
    );
    core.start().await;

    let client = PlayerClient::new(event_tx, core.subscribe(), notice_tx);

    info!("Player initialised, running event loop");
    let mut core_handle = tokio::spawn(core.run(event_rx));

    if let Some(path) = args.import {
        match client.request(Command::ImportFile { path: path.clone() }).await {
            Ok(Reply::Imported { summary }) => info!(
                "Imported {} stations from {:?} ({} skipped)",
                summary.imported_count, path, summary.skipped_count
            ),
            Ok(other) => warn!("Unexpected import reply: {:?}", other),
            Err(e) => error!("Import of {:?} failed: {}", path, e),
        }
    }

    if config.http.enabled && !args.no_http {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            client.clone(),
        );
    }

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                error!("Failed to listen for ctrl-c: {}", e);
            }
            info!("Shutting down");
            client.shutdown().await;
            core_handle.await?;
        }
        res = &mut core_handle => {
            res?;
            warn!("Event loop stopped on its own");
        }
    }

    Ok(())
}
