use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub shell: ShellConfig,
}

/// REST gateway listener. Bound to all interfaces so LAN peers can reach it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

/// External player (VLC) process and its HTTP control interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Explicit player binary. When unset the binary is discovered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<PathBuf>,
    /// Control interface bind host. Defaults to the resolved LAN address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Control interface port; `0` picks a free port at start.
    #[serde(default = "default_player_port")]
    pub port: u16,
    /// Fixed delay between spawn and the readiness probe.
    #[serde(default = "default_startup_delay_ms")]
    pub startup_delay_ms: u64,
    /// Timeout of the readiness probe.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Timeout of every control-channel request.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory scanned for playable audio.
    #[serde(default = "default_audio_dir")]
    pub audio_dir: PathBuf,
    /// HTML template served at `/remote`.
    #[serde(default = "default_remote_page")]
    pub remote_page: PathBuf,
    /// `key=value` message catalog.
    #[serde(default = "default_i18n_file")]
    pub i18n_file: PathBuf,
}

/// Local socket the desktop shell connects to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    #[serde(default = "default_shell_enabled")]
    pub enabled: bool,
    #[serde(default = "default_shell_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_shell_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: default_http_bind_address(),
            port: default_http_port(),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            binary: None,
            host: None,
            port: default_player_port(),
            startup_delay_ms: default_startup_delay_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl PlayerConfig {
    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            audio_dir: default_audio_dir(),
            remote_page: default_remote_page(),
            i18n_file: default_i18n_file(),
        }
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            enabled: default_shell_enabled(),
            bind_address: default_shell_bind_address(),
            port: default_shell_port(),
        }
    }
}

fn default_http_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    3000
}

fn default_player_port() -> u16 {
    3001
}

fn default_startup_delay_ms() -> u64 {
    5000
}

fn default_probe_timeout_ms() -> u64 {
    2000
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_audio_dir() -> PathBuf {
    platform::resource_path("audios")
}

fn default_remote_page() -> PathBuf {
    platform::resource_path("index.html")
}

fn default_i18n_file() -> PathBuf {
    platform::resource_path("i18n.properties")
}

fn default_shell_enabled() -> bool {
    true
}

fn default_shell_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_shell_port() -> u16 {
    platform::SHELL_TCP_PORT
}

impl Config {
    /// Load from the default location, writing defaults on first run.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> anyhow::Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
