//! Centralized directory structure management for peerchat
//!
//! Directory layout:
//! ```text
//! peerchat_data/
//! ├── local/                 # Node-local settings
//! └── cache/
//!     └── {user_id}/         # One message cache per signed-in user
//!         └── {conversation}.json
//! ```

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable that overrides the data root.
pub const ROOT_ENV: &str = "PEERCHAT_ROOT";

const DEFAULT_ROOT: &str = "peerchat_data";

/// Bytes left as-is in a file-name segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

#[derive(Serialize, Deserialize, Debug, Default)]
struct PeerchatConfig {
    data_root: Option<PathBuf>,
}

/// Get the global configuration path
fn get_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("peerchat").join("config.json"))
}

fn read_root_from(path: &Path) -> Option<PathBuf> {
    if !path.exists() {
        return None;
    }

    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<PeerchatConfig>(&content) {
            Ok(config) => config.data_root,
            Err(e) => {
                warn!("Failed to parse config file at {:?}: {}", path, e);
                None
            }
        },
        Err(e) => {
            warn!("Failed to read config file at {:?}: {}", path, e);
            None
        }
    }
}

fn write_root_to(path: &Path, root: PathBuf) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let config = PeerchatConfig {
        data_root: Some(root),
    };
    let json = serde_json::to_string_pretty(&config)?;
    fs::write(path, json)?;
    Ok(())
}

/// Load the persistent root from the user config file
pub fn load_persistent_root() -> Option<PathBuf> {
    read_root_from(&get_config_path()?)
}

/// Save a path as the persistent data root
pub fn save_persistent_root(root: PathBuf) -> anyhow::Result<()> {
    let path =
        get_config_path().ok_or_else(|| anyhow::anyhow!("Could not determine config dir"))?;
    write_root_to(&path, root)
}

/// Get the data root from environment, persistent config, or default
pub fn peerchat_root() -> PathBuf {
    // 1. Environment variable
    if let Ok(val) = std::env::var(ROOT_ENV) {
        if !val.trim().is_empty() {
            return PathBuf::from(val);
        }
    }

    // 2. Persistent config
    if let Some(root) = load_persistent_root() {
        return root;
    }

    // 3. Default fallback
    PathBuf::from(DEFAULT_ROOT)
}

/// Set the data root for this process and its children
pub fn set_peerchat_root(path: &Path) {
    info!("Setting {} to: {:?}", ROOT_ENV, path);
    std::env::set_var(ROOT_ENV, path);
}

/// Node-local settings directory
pub fn local_dir() -> PathBuf {
    peerchat_root().join("local")
}

/// Root of all message caches
pub fn cache_dir() -> PathBuf {
    peerchat_root().join("cache")
}

/// Message cache directory for one signed-in user, below `base`
pub fn user_cache_dir(base: &Path, user_id: &str) -> PathBuf {
    base.join(sanitize_segment(user_id))
}

/// Make an arbitrary identifier safe to use as a single path segment.
///
/// Alphanumerics, `-`, `_` and `.` pass through; everything else becomes
/// `%XX` so distinct identifiers never map to the same file name.
pub fn sanitize_segment(raw: &str) -> String {
    let encoded = utf8_percent_encode(raw, SEGMENT).to_string();
    // `.` and `..` must never name a real directory entry
    match encoded.strip_prefix('.') {
        Some(rest) => format!("%2E{}", rest),
        None => encoded,
    }
}

/// Ensure a single directory exists
pub fn ensure_dir(path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
        info!("Created directory: {:?}", path);
    }
    Ok(())
}

/// Initialize the complete directory structure
/// Call this once at startup before any other operations
pub fn init_structure() -> anyhow::Result<PathBuf> {
    let root = peerchat_root();

    ensure_dir(&root)?;
    ensure_dir(&local_dir())?;
    ensure_dir(&cache_dir())?;

    let canonical = fs::canonicalize(&root).unwrap_or_else(|_| root.clone());

    info!("peerchat directory structure initialized at: {:?}", canonical);

    Ok(canonical)
}
