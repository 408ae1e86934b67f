//! Host configuration, loaded from TOML.
//!
//! Command-line flags and environment variables override anything set here.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level host config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostConfig {
    /// Address to bind the HTTP/WebSocket server.
    pub bind: Option<SocketAddr>,
    /// Shared access token required by the auth gate.
    pub token: Option<String>,
    /// Default working directory for launched commands.
    pub project_root: Option<PathBuf>,
    /// Optional endpoint announcement on startup.
    pub announce: Option<AnnounceConfig>,
}

/// Where to announce this server's connection endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnounceConfig {
    /// URL to POST connection info to.
    pub url: String,
    /// Host to advertise. Falls back to the system hostname.
    pub host: Option<String>,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {}: {}", .0.display(), .1)]
    ReadFailed(PathBuf, #[source] std::io::Error),
    #[error("failed to parse config {}: {}", .0.display(), .1)]
    ParseFailed(PathBuf, #[source] toml::de::Error),
}

impl HostConfig {
    /// Load config from a TOML file path. Returns None if the file doesn't
    /// exist.
    ///
    /// Checks file permissions and warns if world-readable.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        // Warn if the config file is world-readable (it may contain the token).
        check_config_permissions(path);

        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?;
        Ok(Some(config))
    }

    /// Default config file location: `<config dir>/omnihost/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("omnihost").join("config.toml"))
    }
}

/// Check file permissions on a config file and warn if world-readable.
#[cfg(unix)]
fn check_config_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(_) => return,
    };

    let mode = metadata.permissions().mode();
    if mode & 0o004 != 0 {
        tracing::warn!(
            "config file {} is world-readable (mode {:o}). \
             It may contain the access token -- consider restricting permissions to 600.",
            path.display(),
            mode & 0o7777,
        );
    }
}

#[cfg(not(unix))]
fn check_config_permissions(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let toml = r#"
            token = "shared-secret"
        "#;
        let config: HostConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.token.as_deref(), Some("shared-secret"));
        assert!(config.bind.is_none());
        assert!(config.project_root.is_none());
        assert!(config.announce.is_none());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
            bind = "0.0.0.0:4700"
            token = "shared-secret"
            project_root = "/srv/projects/app"

            [announce]
            url = "https://example.test/endpoints"
            host = "workstation-1"
        "#;
        let config: HostConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.bind.unwrap().port(), 4700);
        assert_eq!(
            config.project_root.as_deref(),
            Some(Path::new("/srv/projects/app"))
        );
        let announce = config.announce.unwrap();
        assert_eq!(announce.url, "https://example.test/endpoints");
        assert_eq!(announce.host.as_deref(), Some("workstation-1"));
    }

    #[test]
    fn parse_empty_config() {
        let config: HostConfig = toml::from_str("").unwrap();
        assert!(config.token.is_none());
    }

    #[test]
    fn load_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        assert!(HostConfig::load(&path).unwrap().is_none());
    }

    #[test]
    fn load_parses_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "token = \"abc\"\n").unwrap();

        let config = HostConfig::load(&path).unwrap().unwrap();
        assert_eq!(config.token.as_deref(), Some("abc"));
    }

    #[test]
    fn load_rejects_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "token = [broken").unwrap();

        assert!(matches!(
            HostConfig::load(&path),
            Err(ConfigError::ParseFailed(..))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn permission_check_does_not_panic() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "# test").unwrap();

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        check_config_permissions(&path);

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();
        check_config_permissions(&path);
    }

    #[test]
    fn default_path_is_under_config_dir() {
        if let Some(path) = HostConfig::default_path() {
            assert!(path.ends_with("omnihost/config.toml"));
        }
    }
}
