//! Audio directory listing with concurrent duration probing.

use std::cmp::Ordering;
use std::path::{Component, Path, PathBuf};

use anyhow::Context;
use futures_util::future::join_all;
use lofty::prelude::*;
use lofty::probe::Probe;
use tracing::warn;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use audiogrid_proto::protocol::AudioEntry;

/// Container formats offered for playback (lower-case, no dot).
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "ogg", "oga", "wav", "m4a", "flac"];

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("audio directory not found: {0}")]
    DirectoryNotFound(PathBuf),
    #[error("failed to read audio directory {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Reduce a client-supplied file name to a single path component.
///
/// Both `/` and `\` count as separators regardless of platform.  Returns
/// `None` for names that have no usable leaf (`""`, `"."`, `".."`, `"dir/"`)
/// or that would still not be a plain component (e.g. `C:x` on Windows).
pub fn leaf_name(raw: &str) -> Option<&str> {
    let leaf = raw.rsplit(['/', '\\']).next()?;
    let mut components = Path::new(leaf).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Some(leaf),
        _ => None,
    }
}

pub fn is_audio_file(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| AUDIO_EXTENSIONS.iter().any(|a| e.eq_ignore_ascii_case(a)))
        .unwrap_or(false)
}

/// Collation for file names: accents and case are ignored first, then
/// unaccented sorts before accented, then lower case before upper case.
///
/// `Ávila` lands between `abc` and `Bola`.  No ICU tailoring.
pub fn locale_cmp(a: &str, b: &str) -> Ordering {
    fn base(s: &str) -> String {
        s.nfd()
            .filter(|c| !is_combining_mark(*c))
            .flat_map(char::to_lowercase)
            .collect()
    }
    fn lower(s: &str) -> String {
        s.chars().flat_map(char::to_lowercase).collect()
    }

    base(a)
        .cmp(&base(b))
        .then_with(|| lower(a).cmp(&lower(b)))
        .then_with(|| b.cmp(a))
}

/// The playable files of one directory.  Rebuilt on every call, never cached.
#[derive(Debug, Clone)]
pub struct AudioCatalog {
    dir: PathBuf,
}

impl AudioCatalog {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn list(&self) -> Result<Vec<AudioEntry>, CatalogError> {
        match tokio::fs::metadata(&self.dir).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(CatalogError::DirectoryNotFound(self.dir.clone())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CatalogError::DirectoryNotFound(self.dir.clone()))
            }
            Err(source) => {
                return Err(CatalogError::Read {
                    path: self.dir.clone(),
                    source,
                })
            }
        }

        let read_err = |source| CatalogError::Read {
            path: self.dir.clone(),
            source,
        };
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(read_err)?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
            let Ok(name) = entry.file_name().into_string() else {
                warn!(
                    "catalog: skipping {:?}, the name is not valid UTF-8",
                    entry.file_name()
                );
                continue;
            };
            if !is_audio_file(&name) {
                continue;
            }
            // Follows symlinks; dangling links and directories are skipped.
            match tokio::fs::metadata(entry.path()).await {
                Ok(meta) if meta.is_file() => names.push(name),
                _ => continue,
            }
        }
        names.sort_by(|a, b| locale_cmp(a, b));

        let probes = names.into_iter().map(|name| {
            let path = self.dir.join(&name);
            async move {
                let duration = match probe_duration(path).await {
                    Ok(secs) => secs,
                    Err(e) => {
                        warn!("catalog: could not read duration of {}: {:#}", name, e);
                        0.0
                    }
                };
                AudioEntry { name, duration }
            }
        });
        Ok(join_all(probes).await)
    }
}

async fn probe_duration(path: PathBuf) -> anyhow::Result<f64> {
    tokio::task::spawn_blocking(move || probe_duration_blocking(&path))
        .await
        .context("duration probe task failed")?
}

fn probe_duration_blocking(path: &Path) -> anyhow::Result<f64> {
    let tagged_file = Probe::open(path)?
        .guess_file_type()?
        .read()
        .context("unreadable audio file")?;
    let secs = tagged_file.properties().duration().as_secs_f64();
    Ok(secs.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Silent mono 16-bit PCM at 8 kHz.
    fn write_wav(path: &Path, secs: u32) {
        let rate: u32 = 8000;
        let data_len = rate * secs * 2;
        let mut bytes = Vec::with_capacity(44 + data_len as usize);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
        bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
        bytes.extend_from_slice(&rate.to_le_bytes());
        bytes.extend_from_slice(&(rate * 2).to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        bytes.resize(44 + data_len as usize, 0);
        std::fs::write(path, bytes).unwrap();
    }

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"not really audio").unwrap();
    }

    #[test]
    fn test_leaf_name() {
        assert_eq!(leaf_name("a.mp3"), Some("a.mp3"));
        assert_eq!(leaf_name("../../etc/passwd"), Some("passwd"));
        assert_eq!(leaf_name("..\\..\\boot.ini"), Some("boot.ini"));
        assert_eq!(leaf_name("/abs/path/b c.ogg"), Some("b c.ogg"));
        assert_eq!(leaf_name(""), None);
        assert_eq!(leaf_name(".."), None);
        assert_eq!(leaf_name("sub/.."), None);
        assert_eq!(leaf_name("trailing/"), None);
    }

    #[test]
    fn test_leaf_never_escapes_directory() {
        let base = Path::new("/srv/audios");
        let hostile = [
            "../secret.mp3",
            "../../../../etc/shadow",
            "a/b/../../c.mp3",
            "..\\..\\windows\\win.ini",
            "./././x.mp3",
            "/etc/passwd",
            "....//....//x",
            "%2e%2e/x.mp3",
        ];
        for raw in hostile {
            if let Some(leaf) = leaf_name(raw) {
                let joined = base.join(leaf);
                assert_eq!(joined.parent(), Some(base), "{} escaped as {:?}", raw, joined);
            }
        }
    }

    #[test]
    fn test_is_audio_file() {
        assert!(is_audio_file("a.mp3"));
        assert!(is_audio_file("LOUD.FLAC"));
        assert!(is_audio_file("x.Oga"));
        assert!(!is_audio_file("c.txt"));
        assert!(!is_audio_file("mp3"));
        assert!(!is_audio_file("archive.mp3.zip"));
    }

    #[test]
    fn test_locale_cmp_orders_case_insensitively() {
        let mut names = vec!["b.mp3", "A.mp3", "a.mp3", "Zeta.ogg", "alpha.wav"];
        names.sort_by(|a, b| locale_cmp(a, b));
        assert_eq!(names, ["a.mp3", "A.mp3", "alpha.wav", "b.mp3", "Zeta.ogg"]);
    }

    #[test]
    fn test_locale_cmp_ignores_accents() {
        let mut names = vec!["Zebra.mp3", "Ávila.mp3", "Bola.mp3", "ação.mp3", "abc.mp3"];
        names.sort_by(|a, b| locale_cmp(a, b));
        assert_eq!(names, ["abc.mp3", "ação.mp3", "Ávila.mp3", "Bola.mp3", "Zebra.mp3"]);

        // Same letters: the plain form first, then lower case first.
        let mut names = vec!["Élan.ogg", "elan.ogg", "élan.ogg", "Elan.ogg"];
        names.sort_by(|a, b| locale_cmp(a, b));
        assert_eq!(names, ["elan.ogg", "Elan.ogg", "élan.ogg", "Élan.ogg"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_list_skips_non_utf8_names() {
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "ok.mp3");
        let raw = std::ffi::OsStr::from_bytes(b"bad\xff.mp3");
        if std::fs::write(dir.path().join(raw), b"x").is_err() {
            // Filesystem refuses non UTF-8 names (e.g. some macOS volumes).
            return;
        }

        let entries = AudioCatalog::new(dir.path().to_path_buf())
            .list()
            .await
            .unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["ok.mp3"]);
    }

    #[tokio::test]
    async fn test_list_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "b.ogg");
        touch(dir.path(), "a.mp3");
        touch(dir.path(), "c.txt");
        std::fs::create_dir(dir.path().join("folder.mp3")).unwrap();

        let catalog = AudioCatalog::new(dir.path().to_path_buf());
        let entries = catalog.list().await.unwrap();

        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a.mp3", "b.ogg"]);
        // Unreadable files still list, with a zero duration.
        assert!(entries.iter().all(|e| e.duration == 0.0));
    }

    #[tokio::test]
    async fn test_list_only_audio_returns_everything() {
        let dir = tempfile::tempdir().unwrap();
        let mut expected = Vec::new();
        for (i, ext) in AUDIO_EXTENSIONS.iter().enumerate() {
            let name = format!("track{:02}.{}", 20 - i, ext.to_uppercase());
            touch(dir.path(), &name);
            expected.push(name);
        }
        expected.sort_by(|a, b| locale_cmp(a, b));

        let entries = AudioCatalog::new(dir.path().to_path_buf())
            .list()
            .await
            .unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, expected);
        assert!(entries.iter().all(|e| e.duration >= 0.0));
    }

    #[tokio::test]
    async fn test_list_probes_real_duration() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("tone.wav"), 1);
        touch(dir.path(), "broken.wav");

        let entries = AudioCatalog::new(dir.path().to_path_buf())
            .list()
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "broken.wav");
        assert_eq!(entries[0].duration, 0.0);
        assert_eq!(entries[1].name, "tone.wav");
        assert!((entries[1].duration - 1.0).abs() < 0.05, "{}", entries[1].duration);
    }

    #[tokio::test]
    async fn test_list_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = AudioCatalog::new(dir.path().join("audios"));
        assert!(matches!(
            catalog.list().await,
            Err(CatalogError::DirectoryNotFound(_))
        ));

        touch(dir.path(), "audios");
        assert!(matches!(
            catalog.list().await,
            Err(CatalogError::DirectoryNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let entries = AudioCatalog::new(dir.path().to_path_buf())
            .list()
            .await
            .unwrap();
        assert!(entries.is_empty());
    }
}
