use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

pub const SHELL_TCP_PORT: u16 = 9877;

/// Global flag to control whether to use system-installed binaries from PATH
/// instead of bundled ones beside the executable.
/// Defaults to false (bundled binaries win).
static USE_SYSTEM_DEPS: AtomicBool = AtomicBool::new(false);

/// Set whether to use system dependencies (from PATH) instead of bundled ones.
pub fn set_use_system_deps(use_system: bool) {
    USE_SYSTEM_DEPS.store(use_system, Ordering::Relaxed);
}

/// Check whether to use system dependencies from PATH.
pub fn should_use_system_deps() -> bool {
    USE_SYSTEM_DEPS.load(Ordering::Relaxed)
}

/// Directory holding the running executable, if it can be determined.
pub fn exe_dir() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    exe.parent().map(|p| p.to_path_buf())
}

pub fn data_dir() -> PathBuf {
    // On macOS and Linux, use ~/.local/share/audiogrid/ (XDG standard)
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join("audiogrid")
    }
    #[cfg(windows)]
    {
        // Portable data directory beside the executable wins
        if let Some(dir) = exe_dir() {
            let portable_data = dir.join("data");
            if portable_data.exists() {
                return portable_data;
            }
        }

        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("audiogrid")
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Some(dir) = exe_dir() {
            if dir.join("config.toml").exists() {
                return dir;
            }
        }
    }

    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("audiogrid")
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("audiogrid")
    }
}

/// Resolve a resource that ships beside the executable (`audios/`,
/// `index.html`, `i18n.properties`), falling back to the data dir.
pub fn resource_path(name: &str) -> PathBuf {
    if let Some(dir) = exe_dir() {
        let beside = dir.join(name);
        if beside.exists() {
            return beside;
        }
    }
    data_dir().join(name)
}

#[cfg(unix)]
fn vlc_binary_names() -> &'static [&'static str] {
    &["vlc"]
}

#[cfg(windows)]
fn vlc_binary_names() -> &'static [&'static str] {
    &["vlc.exe", "vlc"]
}

#[cfg(target_os = "windows")]
fn vlc_install_dirs() -> Vec<PathBuf> {
    ["ProgramFiles", "ProgramFiles(x86)"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .map(|root| PathBuf::from(root).join("VideoLAN").join("VLC"))
        .collect()
}

#[cfg(target_os = "macos")]
fn vlc_install_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("/Applications/VLC.app/Contents/MacOS")]
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn vlc_install_dirs() -> Vec<PathBuf> {
    Vec::new()
}

fn find_beside_exe(names: &[&str]) -> Option<PathBuf> {
    let dir = exe_dir()?;
    for name in names {
        let p = dir.join(name);
        if p.exists() {
            return Some(p);
        }
        let p = dir.join("external").join(name);
        if p.exists() {
            return Some(p);
        }
    }
    None
}

fn find_in_dirs(dirs: &[PathBuf], names: &[&str]) -> Option<PathBuf> {
    for dir in dirs {
        for name in names {
            let p = dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }
    None
}

fn find_on_path(names: &[&str]) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    let dirs: Vec<PathBuf> = std::env::split_paths(&path).collect();
    find_in_dirs(&dirs, names)
}

/// Find the VLC binary used for playback.
///
/// Searches in order:
/// 1. Beside the current executable, or its `external/` folder
/// 2. Standard install locations (Windows, macOS)
/// 3. PATH
///
/// Steps 1 and 2 are skipped when system deps are forced.
pub fn find_vlc_binary() -> Option<PathBuf> {
    if !should_use_system_deps() {
        if let Some(p) = find_beside_exe(vlc_binary_names()) {
            return Some(p);
        }
        if let Some(p) = find_in_dirs(&vlc_install_dirs(), vlc_binary_names()) {
            return Some(p);
        }
    }

    find_on_path(vlc_binary_names())
}

/// Outbound IPv4 address of the default route.
///
/// Connecting a UDP socket sends no packets; it only asks the OS which local
/// address it would use. Falls back to loopback when the host is offline.
pub fn resolve_lan_ipv4() -> IpAddr {
    let probe = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(192, 168, 0, 1), 80))?;
        Ok(socket.local_addr()?.ip())
    };

    match probe() {
        Ok(ip) if !ip.is_unspecified() => ip,
        Ok(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
        Err(e) => {
            tracing::warn!("Unable to resolve LAN address, using loopback: {}", e);
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}
