//! Locating the configuration file.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const CONFIG_FILE: &str = "toolbridge.toml";
pub const CONFIG_ENV: &str = "TOOLBRIDGE_CONFIG";

/// Pick the configuration file: an explicit path wins, then `TOOLBRIDGE_CONFIG`,
/// then `./toolbridge.toml`, then `<config dir>/toolbridge/config.toml`.
pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }

    let candidates = candidates(dirs::config_dir());
    candidates
        .iter()
        .find(|path| path.is_file())
        .cloned()
        .ok_or(Error::ConfigNotFound {
            searched: candidates,
        })
}

fn candidates(config_dir: Option<PathBuf>) -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE)];
    if let Some(dir) = config_dir {
        paths.push(dir.join("toolbridge").join("config.toml"));
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_wins() {
        let path = resolve_path(Some(Path::new("/etc/custom.toml"))).unwrap();
        assert_eq!(path, PathBuf::from("/etc/custom.toml"));
    }

    #[test]
    fn candidates_include_user_config_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = candidates(Some(dir.path().to_path_buf()));
        assert_eq!(paths[0], PathBuf::from(CONFIG_FILE));
        assert_eq!(paths[1], dir.path().join("toolbridge/config.toml"));
    }

    #[test]
    fn example_config_is_valid() {
        let config =
            bridge::BridgeConfig::parse(include_str!("../../../toolbridge.example.toml")).unwrap();
        assert_eq!(config.primary_server, "filesystem");
    }

    #[test]
    fn not_found_lists_searched_paths() {
        let err = Error::ConfigNotFound {
            searched: candidates(None),
        };
        assert!(err.to_string().contains(CONFIG_FILE));
    }
}
