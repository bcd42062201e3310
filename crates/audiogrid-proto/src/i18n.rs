//! `key=value` message catalog with built-in fallbacks.

use std::collections::HashMap;
use std::path::Path;

/// Localised user-facing strings.
///
/// Lookups never fail: a key missing from the loaded file resolves to the
/// built-in English text, and an unknown key resolves to itself.
#[derive(Debug, Clone, Default)]
pub struct Messages {
    entries: HashMap<String, String>,
}

impl Messages {
    /// Load from disk. A missing or unreadable file yields the fallbacks only.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(e) => {
                tracing::debug!("i18n: no catalog at {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Parse a properties file: one `key=value` per line, `#` comments,
    /// split on the first `=`, surrounding whitespace trimmed.
    pub fn parse(content: &str) -> Self {
        let entries = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let (key, value) = line.split_once('=')?;
                let (key, value) = (key.trim(), value.trim());
                if key.is_empty() || value.is_empty() {
                    None
                } else {
                    Some((key.to_string(), value.to_string()))
                }
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Unknown keys come back unchanged.
    pub fn get<'a>(&'a self, key: &'a str) -> &'a str {
        self.entries
            .get(key)
            .map(String::as_str)
            .or_else(|| fallback(key))
            .unwrap_or(key)
    }
}

fn fallback(key: &str) -> Option<&'static str> {
    let text = match key {
        "title" => "AudioGrid",
        "error" => "Error",
        "warning" => "Warning",
        "unknown_error" => "Internal server error",
        "error_mandatory_name_field" => "The \"name\" parameter is required.",
        "error_file_not_found" => "Audio file not found.",
        "error_audios_folder_not_found" => "Audios folder not found.",
        "error_reading_audios_folder" => "Error reading audios folder",
        "error_reading_index" => "Error reading HTML file",
        "no_audio_files" => "No audio found",
        "no_audio_files_message" => "No audio files were found in the folder",
        "vlc_not_running" => "VLC is not running.",
        "vlc_start_error" => "Error starting VLC",
        "vlc_play_error" => "Error playing audio in VLC",
        "audio_playing_success" => "Audio played successfully",
        "server_running_in" => "Server running at",
        "route_not_found" => "Route not found",
        _ => return None,
    };
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_properties() {
        let messages = Messages::parse(
            "# header\n\
             error = Erro\n\
             \n\
             vlc_not_running=VLC não está rodando.\n\
             url=http://host/?a=b\n\
             empty=\n\
             =orphan\n\
             no separator\n",
        );
        assert_eq!(messages.len(), 3);
        assert_eq!(messages.get("error"), "Erro");
        assert_eq!(messages.get("vlc_not_running"), "VLC não está rodando.");
        assert_eq!(messages.get("url"), "http://host/?a=b");
    }

    #[test]
    fn test_fallbacks() {
        let messages = Messages::default();
        assert!(messages.is_empty());
        assert_eq!(messages.get("error_file_not_found"), "Audio file not found.");
        assert_eq!(messages.get("some_unknown_key"), "some_unknown_key");
    }

    #[test]
    fn test_unknown_owned_key_echoes_back() {
        let messages = Messages::parse("error=Erro\n");
        let key = format!("missing_{}", 7);
        let text = messages.get(&key);
        assert_eq!(text, "missing_7");
        assert_eq!(messages.get("error"), "Erro");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let messages = Messages::load(&dir.path().join("i18n.properties"));
        assert!(messages.is_empty());
        assert_eq!(messages.get("title"), "AudioGrid");
    }
}
