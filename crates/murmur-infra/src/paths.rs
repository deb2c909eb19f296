//! Data directory resolution.

use std::path::PathBuf;

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "MURMUR_DATA_DIR";

/// Resolve the directory holding `murmur.db` and `config.toml`.
///
/// `MURMUR_DATA_DIR` wins; otherwise `~/.murmur`, or `./.murmur` when no home
/// directory can be determined.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".murmur");
    }

    PathBuf::from(".murmur")
}
