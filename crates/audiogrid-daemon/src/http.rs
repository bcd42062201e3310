use std::path::PathBuf;
use std::sync::Arc;

use audiogrid_proto::i18n::Messages;
use audiogrid_proto::protocol::{
    AudioList, Notification, NotificationLevel, PlayResponse, ServerStatus,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    response::{Html, IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::catalog::{leaf_name, AudioCatalog};
use crate::error::{ApiError, ErrorKind};
use crate::notify::NotificationSink;
use crate::vlc::{play_track, PlayerControl};

/// Hostname the remote page is authored against; replaced by the LAN address.
pub const REMOTE_PAGE_PLACEHOLDER: &str = "localhost";

/// Everything the gateway handlers share.  Cheap to clone.
#[derive(Clone)]
pub struct HttpState {
    /// `None` when the player could not be started at all.
    player: Option<Arc<dyn PlayerControl>>,
    catalog: Arc<AudioCatalog>,
    notifier: Arc<dyn NotificationSink>,
    messages: Arc<Messages>,
    remote_page: Arc<PathBuf>,
    lan_ip: Arc<str>,
    port: u16,
    /// Serialises stop/play pairs against the one player session.
    playback: Arc<Mutex<()>>,
}

impl HttpState {
    pub fn new(
        player: Option<Arc<dyn PlayerControl>>,
        catalog: AudioCatalog,
        notifier: Arc<dyn NotificationSink>,
        messages: Messages,
        remote_page: PathBuf,
        lan_ip: String,
        port: u16,
    ) -> Self {
        Self {
            player,
            catalog: Arc::new(catalog),
            notifier,
            messages: Arc::new(messages),
            remote_page: Arc::new(remote_page),
            lan_ip: lan_ip.into(),
            port,
            playback: Arc::new(Mutex::new(())),
        }
    }

    pub fn status(&self) -> ServerStatus {
        ServerStatus {
            status: "running".to_string(),
            player_running: self.player_running(),
            ip: self.lan_ip.to_string(),
            port: self.port,
            timestamp: chrono::Utc::now(),
        }
    }

    fn player_running(&self) -> bool {
        self.player.as_ref().is_some_and(|p| p.is_running())
    }

    fn msg(&self, key: &str) -> String {
        self.messages.get(key).to_string()
    }

    pub fn notify(&self, notification: Notification) {
        if let Err(e) = self.notifier.notify(&notification) {
            debug!("notification dropped: {}", e);
        }
    }

    /// Log and notify a handler failure, then hand it back for the response.
    fn reject(&self, err: ApiError) -> ApiError {
        match err.kind {
            ErrorKind::ControlChannel | ErrorKind::Internal => error!(
                "HTTP API: {} ({})",
                err.message,
                err.details.as_deref().unwrap_or("-")
            ),
            _ => warn!(
                "HTTP API: {} ({})",
                err.message,
                err.details.as_deref().unwrap_or("-")
            ),
        }
        self.notify(Notification::new(
            NotificationLevel::Error,
            self.msg("error"),
            err.notification_body(),
        ));
        err
    }

    async fn play(&self, body: Result<Json<Value>, JsonRejection>) -> Result<PlayResponse, ApiError> {
        let invalid = || ApiError::new(ErrorKind::Validation, self.msg("error_mandatory_name_field"));

        let Json(body) = body.map_err(|e| invalid().with_details(e.body_text()))?;
        let raw = body
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .ok_or_else(invalid)?;
        let leaf = leaf_name(raw)
            .ok_or_else(|| invalid().with_details(format!("invalid file name: {}", raw)))?;

        let candidate = self.catalog.dir().join(leaf);
        let path = match tokio::fs::metadata(&candidate).await {
            Ok(meta) if meta.is_file() => tokio::fs::canonicalize(&candidate)
                .await
                .unwrap_or(candidate),
            _ => {
                return Err(
                    ApiError::new(ErrorKind::NotFound, self.msg("error_file_not_found"))
                        .with_details(leaf),
                )
            }
        };

        let player = self
            .player
            .as_ref()
            .filter(|p| p.is_running())
            .ok_or_else(|| ApiError::new(ErrorKind::PlayerUnavailable, self.msg("vlc_not_running")))?;

        {
            let _guard = self.playback.lock().await;
            play_track(player.as_ref(), &path)
                .await
                .map_err(|e| ApiError::from_source(&e, self.msg("vlc_play_error")))?;
        }

        info!("HTTP API: playing {:?}", path);
        Ok(PlayResponse {
            success: true,
            message: self.msg("audio_playing_success"),
            file: leaf.to_string(),
        })
    }

    async fn audio_names(&self) -> Result<AudioList, ApiError> {
        let audio_files = self.catalog.list().await.map_err(|e| {
            let key = match ErrorKind::from(&e) {
                ErrorKind::NotFound => "error_audios_folder_not_found",
                _ => "error_reading_audios_folder",
            };
            ApiError::from_source(&e, self.msg(key))
        })?;

        if audio_files.is_empty() {
            self.notify(Notification::new(
                NotificationLevel::Warning,
                self.msg("no_audio_files"),
                self.msg("no_audio_files_message"),
            ));
        }
        Ok(AudioList { audio_files })
    }

    async fn remote_page(&self) -> Result<String, ApiError> {
        let template = tokio::fs::read_to_string(self.remote_page.as_path())
            .await
            .map_err(|e| {
                ApiError::new(ErrorKind::Internal, self.msg("error_reading_index"))
                    .with_details(format!("{}: {}", self.remote_page.display(), e))
            })?;
        Ok(render_remote_page(&template, &self.lan_ip))
    }
}

/// Literal substitution of every placeholder occurrence.
pub fn render_remote_page(template: &str, host: &str) -> String {
    template.replace(REMOTE_PAGE_PLACEHOLDER, host)
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/playAudio", post(play_audio))
        .route("/getAudioNames", get(get_audio_names))
        .route("/remote", get(get_remote))
        .fallback(route_not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub fn start_server(listener: TcpListener, state: HttpState) -> tokio::task::JoinHandle<()> {
    let app = router(state);
    tokio::spawn(async move {
        match listener.local_addr() {
            Ok(addr) => info!("HTTP API server listening on http://{}", addr),
            Err(e) => warn!("HTTP API server listening on unknown address: {}", e),
        }
        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn get_status(State(state): State<HttpState>) -> Json<ServerStatus> {
    Json(state.status())
}

async fn play_audio(
    State(state): State<HttpState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<PlayResponse>, ApiError> {
    state.play(body).await.map(Json).map_err(|e| state.reject(e))
}

async fn get_audio_names(State(state): State<HttpState>) -> Result<Json<AudioList>, ApiError> {
    state.audio_names().await.map(Json).map_err(|e| state.reject(e))
}

async fn get_remote(State(state): State<HttpState>) -> Result<Html<String>, ApiError> {
    state.remote_page().await.map(Html).map_err(|e| state.reject(e))
}

async fn route_not_found(State(state): State<HttpState>) -> impl IntoResponse {
    ApiError::new(ErrorKind::NotFound, state.msg("route_not_found"))
}
