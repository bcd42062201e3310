use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current shell-socket protocol version.  Bump this when the framing or the
/// message shapes change in a breaking way.
pub const PROTOCOL_VERSION: u32 = 1;

// ── REST gateway bodies ───────────────────────────────────────────────────────

/// `GET /status`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub status: String,
    pub player_running: bool,
    pub ip: String,
    pub port: u16,
    pub timestamp: DateTime<Utc>,
}

/// `POST /playAudio` success body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayResponse {
    pub success: bool,
    pub message: String,
    /// Leaf name actually played.
    pub file: String,
}

/// One playable file. `duration` is in seconds, `0.0` when unknown.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioEntry {
    pub name: String,
    pub duration: f64,
}

/// `GET /getAudioNames`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AudioList {
    pub audio_files: Vec<AudioEntry>,
}

/// Body of every non-2xx gateway response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

// ── notifications ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationLevel {
    pub fn label(&self) -> &'static str {
        match self {
            NotificationLevel::Info => "INFO",
            NotificationLevel::Success => "SUCCESS",
            NotificationLevel::Warning => "WARNING",
            NotificationLevel::Error => "ERROR",
        }
    }
}

/// A user-visible desktop notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub level: NotificationLevel,
}

impl Notification {
    pub fn new(level: NotificationLevel, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            level,
        }
    }
}

// ── desktop shell socket ──────────────────────────────────────────────────────

/// Messages sent from the desktop shell to the daemon
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "cmd")]
pub enum ShellCommand {
    GetStatus,
    /// Tear down the player and exit.
    Shutdown,
}

/// Messages sent from the daemon to the desktop shell
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum ShellEvent {
    /// Sent immediately on connect.
    Hello {
        protocol_version: u32,
        status: ServerStatus,
    },
    Status {
        data: ServerStatus,
    },
    Notification {
        title: String,
        body: String,
        level: NotificationLevel,
    },
}

impl From<Notification> for ShellEvent {
    fn from(n: Notification) -> Self {
        ShellEvent::Notification {
            title: n.title,
            body: n.body,
            level: n.level,
        }
    }
}

/// Wrapper for socket communication.  Frames are a 4-byte big-endian length
/// followed by that many bytes of JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Message {
    Command(ShellCommand),
    Event(ShellEvent),
}

impl Message {
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        let len = json.len() as u32;
        let mut result = Vec::with_capacity(4 + json.len());
        result.extend_from_slice(&len.to_be_bytes());
        result.extend_from_slice(&json);
        Ok(result)
    }

    pub fn decode(data: &[u8]) -> anyhow::Result<(Self, usize)> {
        if data.len() < 4 {
            anyhow::bail!("Insufficient data for length header");
        }
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if data.len() < 4 + len {
            anyhow::bail!("Insufficient data for message");
        }
        let msg: Self = serde_json::from_slice(&data[4..4 + len])?;
        Ok((msg, 4 + len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status() -> ServerStatus {
        ServerStatus {
            status: "running".into(),
            player_running: true,
            ip: "192.168.1.20".into(),
            port: 3000,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_status_wire_shape() {
        let value = serde_json::to_value(status()).unwrap();
        assert_eq!(value["playerRunning"], true);
        assert_eq!(value["ip"], "192.168.1.20");
        assert_eq!(value["port"], 3000);
        assert!(value["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_error_body_omits_missing_details() {
        let body = ErrorBody {
            error: "Audio file not found.".into(),
            details: None,
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"error":"Audio file not found."}"#
        );
    }

    #[test]
    fn test_audio_list_key() {
        let list = AudioList {
            audio_files: vec![AudioEntry {
                name: "a.mp3".into(),
                duration: 1.5,
            }],
        };
        let value = serde_json::to_value(list).unwrap();
        assert_eq!(value["audioFiles"][0]["name"], "a.mp3");
        assert_eq!(value["audioFiles"][0]["duration"], 1.5);
    }

    #[test]
    fn test_command_frame_decode() {
        let encoded = Message::Command(ShellCommand::Shutdown).encode().unwrap();
        let (decoded, len) = Message::decode(&encoded).unwrap();
        assert_eq!(len, encoded.len());
        assert_eq!(decoded, Message::Command(ShellCommand::Shutdown));
    }

    #[test]
    fn test_partial_frame_is_rejected() {
        let encoded = Message::Event(ShellEvent::Hello {
            protocol_version: PROTOCOL_VERSION,
            status: status(),
        })
        .encode()
        .unwrap();
        assert!(Message::decode(&encoded[..2]).is_err());
        assert!(Message::decode(&encoded[..encoded.len() - 1]).is_err());
        match Message::decode(&encoded).unwrap().0 {
            Message::Event(ShellEvent::Hello {
                protocol_version, ..
            }) => assert_eq!(protocol_version, PROTOCOL_VERSION),
            other => panic!("Wrong message type: {:?}", other),
        }
    }
}
