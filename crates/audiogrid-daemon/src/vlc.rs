//! VLC process supervisor and HTTP control-channel client.
//!
//! Architecture:
//!
//! ```text
//!   VlcSupervisor::start()
//!         │
//!         ├── spawns `vlc --extraintf http --intf dummy --http-host H --http-port P --http-password S`
//!         ├── waits `startup_delay`, then probes /requests/status.json (short timeout)
//!         └── returns Arc<PlayerSession>   (running flag = probe result)
//!
//!   VlcClient::new(session, timeout)
//!         ├── info()      GET /requests/status.json
//!         ├── playlist()  GET /requests/playlist.json
//!         └── command()   GET /requests/status.json?command=..&k=v   (guarded by running flag)
//! ```
//!
//! Every request carries basic auth with an empty user and the session's
//! generated password, plus a per-request timeout.  Nothing is retried.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rand::Rng;
use serde::Deserialize;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use audiogrid_proto::config::PlayerConfig;

/// Same byte set URLSearchParams leaves alone.  Space becomes `%20`, never `+`.
const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'*')
    .remove(b'-')
    .remove(b'.')
    .remove(b'_');

#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error("VLC binary not found")]
    BinaryNotFound,
    #[error("failed to spawn VLC: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("VLC is not running")]
    Unavailable,
    #[error("{0}")]
    Channel(String),
}

// ── session ───────────────────────────────────────────────────────────────────

/// One running VLC instance: where its control interface listens and the
/// password it was launched with.  Both are fixed for the session's lifetime.
pub struct PlayerSession {
    credential: String,
    host: String,
    port: u16,
    running: AtomicBool,
}

impl PlayerSession {
    pub fn new(credential: String, host: String, port: u16) -> Self {
        Self {
            credential,
            host,
            port,
            running: AtomicBool::new(false),
        }
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn base_url(&self) -> String {
        if self.host.contains(':') {
            format!("http://[{}]:{}", self.host, self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }

    /// Last liveness observation.  Never probes.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    /// Command-line flags selecting the HTTP control interface.
    pub fn launch_args(&self) -> Vec<String> {
        vec![
            "--extraintf".into(),
            "http".into(),
            "--intf".into(),
            "dummy".into(),
            "--http-host".into(),
            self.host.clone(),
            "--http-port".into(),
            self.port.to_string(),
            "--http-password".into(),
            self.credential.clone(),
        ]
    }
}

impl std::fmt::Debug for PlayerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerSession")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

fn generate_credential() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

async fn allocate_port(host: &str) -> std::io::Result<u16> {
    let listener = tokio::net::TcpListener::bind((host, 0)).await?;
    Ok(listener.local_addr()?.port())
}

// ── commands ──────────────────────────────────────────────────────────────────

/// A single control-channel command.  Built per call, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlCommand {
    pub name: String,
    pub params: Vec<(String, String)>,
}

impl ControlCommand {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn stop() -> Self {
        Self::new("pl_stop")
    }

    pub fn play(path: &Path) -> Self {
        Self::new("in_play").param("input", path.to_string_lossy())
    }

    /// `command=<name>&k=v...`, percent-encoded.
    pub fn query(&self) -> String {
        std::iter::once(("command", self.name.as_str()))
            .chain(self.params.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .map(|(k, v)| {
                format!(
                    "{}={}",
                    utf8_percent_encode(k, QUERY_ENCODE_SET),
                    utf8_percent_encode(v, QUERY_ENCODE_SET)
                )
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// What the gateway needs from a player.  Implemented by [`VlcClient`];
/// tests substitute fakes.
pub trait PlayerControl: Send + Sync {
    fn is_running(&self) -> bool;
    fn send(&self, command: ControlCommand) -> BoxFuture<'_, Result<(), PlayerError>>;
}

/// Stop whatever is playing, then play `path`.
///
/// Not atomic: a failed stop is logged and play is attempted anyway.  The
/// error returned is the one from the last command that failed.
pub async fn play_track(player: &dyn PlayerControl, path: &Path) -> Result<(), PlayerError> {
    let stopped = player.send(ControlCommand::stop()).await;
    if let Err(e) = &stopped {
        warn!("vlc: stop failed, still attempting play: {}", e);
    }
    player.send(ControlCommand::play(path)).await?;
    stopped
}

// ── client ────────────────────────────────────────────────────────────────────

/// Subset of `/requests/status.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlayerStatus {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlaylistItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub uri: Option<String>,
    /// Seconds; VLC reports -1 when unknown.
    #[serde(default)]
    pub duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PlaylistNode {
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    children: Vec<PlaylistNode>,
}

impl PlaylistNode {
    fn collect_leaves(self, out: &mut Vec<PlaylistItem>) {
        if self.kind == "leaf" {
            out.push(PlaylistItem {
                id: self.id,
                name: self.name,
                uri: self.uri,
                duration: self.duration,
            });
            return;
        }
        for child in self.children {
            child.collect_leaves(out);
        }
    }
}

/// Flatten VLC's playlist tree.  Only the "Playlist" node counts as enqueued;
/// the media library sits beside it.
fn flatten_playlist(root: PlaylistNode) -> Vec<PlaylistItem> {
    let mut items = Vec::new();
    let PlaylistNode { kind, children, .. } = root;
    match children.iter().position(|c| c.name == "Playlist") {
        Some(idx) => {
            if let Some(playlist) = children.into_iter().nth(idx) {
                playlist.collect_leaves(&mut items);
            }
        }
        None => PlaylistNode {
            kind,
            id: String::new(),
            name: String::new(),
            uri: None,
            duration: None,
            children,
        }
        .collect_leaves(&mut items),
    }
    items
}

/// Authenticated client bound to one [`PlayerSession`].
#[derive(Clone)]
pub struct VlcClient {
    session: Arc<PlayerSession>,
    http: reqwest::Client,
}

impl VlcClient {
    pub fn new(session: Arc<PlayerSession>, timeout: Duration) -> Result<Self, PlayerError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PlayerError::Channel(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { session, http })
    }

    pub fn session(&self) -> &Arc<PlayerSession> {
        &self.session
    }

    async fn get(&self, path_and_query: &str) -> Result<reqwest::Response, PlayerError> {
        let url = format!("{}/{}", self.session.base_url(), path_and_query);
        debug!("vlc: GET {}", url);
        let response = self
            .http
            .get(&url)
            .basic_auth("", Some(self.session.credential()))
            .send()
            .await
            .map_err(|e| PlayerError::Channel(format!("{}: {}", path_and_query, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PlayerError::Channel(format!(
                "{} returned {}",
                path_and_query, status
            )));
        }
        Ok(response)
    }

    pub async fn info(&self) -> Result<PlayerStatus, PlayerError> {
        self.get("requests/status.json")
            .await?
            .json()
            .await
            .map_err(|e| PlayerError::Channel(format!("invalid status.json: {}", e)))
    }

    pub async fn playlist(&self) -> Result<Vec<PlaylistItem>, PlayerError> {
        let root: PlaylistNode = self
            .get("requests/playlist.json")
            .await?
            .json()
            .await
            .map_err(|e| PlayerError::Channel(format!("invalid playlist.json: {}", e)))?;
        Ok(flatten_playlist(root))
    }

    /// Fails fast with [`PlayerError::Unavailable`] when the session is not running.
    pub async fn command(&self, command: &ControlCommand) -> Result<(), PlayerError> {
        if !self.session.is_running() {
            return Err(PlayerError::Unavailable);
        }
        self.get(&format!("requests/status.json?{}", command.query()))
            .await
            .map_err(|e| match e {
                PlayerError::Channel(msg) => {
                    PlayerError::Channel(format!("VLC command {} failed: {}", command.name, msg))
                }
                other => other,
            })?;
        debug!("vlc: command {} ok", command.name);
        Ok(())
    }
}

impl PlayerControl for VlcClient {
    fn is_running(&self) -> bool {
        self.session.is_running()
    }

    fn send(&self, command: ControlCommand) -> BoxFuture<'_, Result<(), PlayerError>> {
        Box::pin(async move { self.command(&command).await })
    }
}

// ── supervisor ────────────────────────────────────────────────────────────────

/// Owns the VLC child process.  At most one live session at a time.
pub struct VlcSupervisor {
    config: PlayerConfig,
    host: String,
    process: Option<Child>,
    session: Option<Arc<PlayerSession>>,
}

impl VlcSupervisor {
    /// `host` is the control-interface bind address (normally the LAN IP).
    pub fn new(config: PlayerConfig, host: String) -> Self {
        Self {
            config,
            host,
            process: None,
            session: None,
        }
    }

    /// Most recent liveness observation; does not probe.
    pub fn is_running(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_running())
    }

    fn binary(&self) -> Option<PathBuf> {
        self.config
            .binary
            .clone()
            .or_else(audiogrid_proto::platform::find_vlc_binary)
    }

    /// Spawn VLC with a fresh password and wait (bounded) for it to answer.
    ///
    /// A failed readiness probe still yields a session, flagged not running.
    pub async fn start(&mut self) -> Result<Arc<PlayerSession>, PlayerError> {
        // Kill stale process
        self.kill().await;

        let binary = self.binary().ok_or(PlayerError::BinaryNotFound)?;
        let port = match self.config.port {
            0 => allocate_port(&self.host).await.map_err(PlayerError::Spawn)?,
            fixed => fixed,
        };
        let session = Arc::new(PlayerSession::new(
            generate_credential(),
            self.host.clone(),
            port,
        ));

        info!(
            "vlc: spawning {:?} with control interface on {}",
            binary,
            session.base_url()
        );
        let child = Command::new(&binary)
            .args(session.launch_args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(PlayerError::Spawn)?;
        self.process = Some(child);
        self.session = Some(session.clone());

        tokio::time::sleep(self.config.startup_delay()).await;

        if let Some(Ok(Some(status))) = self.process.as_mut().map(|c| c.try_wait()) {
            warn!("vlc: process exited during startup: {}", status);
        }

        let probe = VlcClient::new(session.clone(), self.config.probe_timeout())?;
        match probe.info().await {
            Ok(status) => {
                info!(
                    "vlc: control interface ready (state={}, version={})",
                    status.state,
                    status.version.as_deref().unwrap_or("?")
                );
                session.set_running(true);
            }
            Err(e) => {
                warn!("vlc: readiness probe failed: {}", e);
                session.set_running(false);
            }
        }

        Ok(session)
    }

    /// Terminate the process.  Idempotent; failures are logged only.
    pub async fn kill(&mut self) {
        if let Some(session) = self.session.take() {
            session.set_running(false);
        }
        if let Some(mut child) = self.process.take() {
            match child.kill().await {
                Ok(()) => info!("vlc: process terminated"),
                Err(e) => warn!("vlc: kill failed (already exited?): {}", e),
            }
        }
    }
}
