mod catalog;
mod error;
mod http;
mod notify;
mod socket;
mod vlc;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use audiogrid_proto::config::Config;
use audiogrid_proto::i18n::Messages;
use audiogrid_proto::protocol::{Notification, NotificationLevel, ShellEvent};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::catalog::AudioCatalog;
use crate::http::HttpState;
use crate::notify::{NotificationSink, ShellNotifier};
use crate::vlc::{PlayerControl, VlcClient, VlcSupervisor};

/// Inputs that end the daemon's main wait.
#[derive(Debug)]
pub enum DaemonEvent {
    Shutdown,
}

/// LAN audio trigger: serves a remote page and drives a local VLC.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/audiogrid/config.toml)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Use the VLC found on PATH instead of a bundled copy
    #[arg(long = "use-system-deps")]
    use_system_deps: bool,
}

fn init_tracing() -> anyhow::Result<PathBuf> {
    let data_dir = audiogrid_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("audiogrid.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(
                    "info,audiogrid=debug,hyper_util=warn,reqwest=warn",
                )
            }),
        )
        .init();

    Ok(log_path)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    audiogrid_proto::platform::set_use_system_deps(cli.use_system_deps);

    let log_path = init_tracing()?;
    info!("Log file: {:?}", log_path);

    let config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load config {:?}", path))?,
        None => Config::load().context("failed to load config")?,
    };
    info!(
        "Config loaded from: {:?}",
        cli.config.clone().unwrap_or_else(Config::config_path)
    );

    let messages = Messages::load(&config.paths.i18n_file);
    let lan_ip = audiogrid_proto::platform::resolve_lan_ipv4().to_string();
    info!("LAN address: {}", lan_ip);

    // Shell events: notifications and status pushes to the desktop shell
    let (events_tx, _) = broadcast::channel::<ShellEvent>(64);
    let notifier: Arc<dyn NotificationSink> = Arc::new(ShellNotifier::new(events_tx.clone()));

    let player_host = config.player.host.clone().unwrap_or_else(|| lan_ip.clone());
    let mut supervisor = VlcSupervisor::new(config.player.clone(), player_host);
    let player: Option<Arc<dyn PlayerControl>> = match supervisor.start().await {
        Ok(session) => {
            info!(
                "VLC control interface at {}:{} (running: {})",
                session.host(),
                session.port(),
                supervisor.is_running()
            );
            match VlcClient::new(session, config.player.request_timeout()) {
                Ok(client) => {
                    if client.session().is_running() {
                        match client.playlist().await {
                            Ok(items) => {
                                info!("VLC playlist has {} item(s)", items.len());
                                for item in &items {
                                    debug!(
                                        "  [{}] {} ({:?}, {:?}s)",
                                        item.id, item.name, item.uri, item.duration
                                    );
                                }
                            }
                            Err(e) => warn!("Could not read VLC playlist: {}", e),
                        }
                    }
                    Some(Arc::new(client))
                }
                Err(e) => {
                    error!("Failed to build VLC control client: {}", e);
                    None
                }
            }
        }
        Err(e) => {
            error!("Failed to start VLC: {}", e);
            let body = format!("{}: {}", messages.get("vlc_start_error"), e);
            if let Err(e) = notifier.notify(&Notification::new(
                NotificationLevel::Error,
                messages.get("error"),
                body,
            )) {
                warn!("notification dropped: {}", e);
            }
            None
        }
    };

    let http_addr = format!("{}:{}", config.http.bind_address, config.http.port);
    let http_listener = match TcpListener::bind(&http_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            supervisor.kill().await;
            return Err(e).with_context(|| format!("failed to bind HTTP API on {}", http_addr));
        }
    };

    let state = HttpState::new(
        player,
        AudioCatalog::new(config.paths.audio_dir.clone()),
        notifier,
        messages.clone(),
        config.paths.remote_page.clone(),
        lan_ip.clone(),
        config.http.port,
    );
    let _http_handle = http::start_server(http_listener, state.clone());

    let (event_tx, mut event_rx) = mpsc::channel::<DaemonEvent>(8);
    if config.shell.enabled {
        let shell_addr = format!("{}:{}", config.shell.bind_address, config.shell.port);
        match TcpListener::bind(&shell_addr).await {
            Ok(listener) => {
                let _shell_handle =
                    socket::start_server(listener, state.clone(), events_tx.clone(), event_tx);
            }
            Err(e) => warn!("Desktop shell socket unavailable on {}: {}", shell_addr, e),
        }
    }

    info!(
        "{} http://{}:{}",
        messages.get("server_running_in"),
        lan_ip,
        config.http.port
    );

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for Ctrl-C: {}", e);
            }
            info!("Interrupt received, shutting down");
        }
        Some(DaemonEvent::Shutdown) = event_rx.recv() => {
            info!("Shutdown requested by desktop shell");
        }
    }

    supervisor.kill().await;
    info!("Daemon stopped");
    Ok(())
}
