//! TOML configuration: where the catalog lives and the credentials for
//! each backend.
//!
//! ```toml
//! database = "/data/tourer/catalog.db"
//!
//! [panorama]
//! access_token = "ya29..."
//!
//! [trail]
//! access_token = "..."
//!
//! [metadata]
//! api_key = "..."
//! base_url = "https://explorer.trekview.org/api/v1"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::backend::Credential;
use crate::domain::Backend;
use crate::error::Result;

/// Directory under `$HOME` holding the default config and catalog.
pub const HOME_DIR: &str = ".tourer";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Catalog database path; defaults to `~/.tourer/catalog.db`.
    pub database: Option<PathBuf>,
    pub panorama: PanoramaConfig,
    pub trail: TrailConfig,
    pub metadata: MetadataConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PanoramaConfig {
    pub access_token: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrailConfig {
    pub access_token: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetadataConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    /// Version string sent as `tourer[version]`.
    pub client_version: Option<String>,
}

impl Config {
    /// Load from `path`. A missing file is not an error: every backend is
    /// simply left unconfigured.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| home_dir().join("catalog.db"))
    }

    pub fn credential(&self, backend: Backend) -> Credential {
        let secret = match backend {
            Backend::PanoramaHost => self.panorama.access_token.as_deref(),
            Backend::TrailHost => self.trail.access_token.as_deref(),
            Backend::MetadataHost => self.metadata.api_key.as_deref(),
        };
        Credential::from_secret(secret)
    }

    pub fn base_url(&self, backend: Backend) -> Option<&str> {
        match backend {
            Backend::PanoramaHost => self.panorama.base_url.as_deref(),
            Backend::TrailHost => self.trail.base_url.as_deref(),
            Backend::MetadataHost => self.metadata.base_url.as_deref(),
        }
    }

    pub fn client_version(&self) -> &str {
        self.metadata
            .client_version
            .as_deref()
            .unwrap_or(env!("CARGO_PKG_VERSION"))
    }
}

/// `~/.tourer`, or `./.tourer` when `HOME` is unset.
pub fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(HOME_DIR)
}

pub fn default_path() -> PathBuf {
    home_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_missing_file_is_unconfigured() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("config.toml")).unwrap();
        for backend in Backend::ALL {
            assert_eq!(config.credential(backend), Credential::Unconfigured);
        }
        assert!(config.database_path().ends_with("catalog.db"));
    }

    #[test]
    fn test_parse_full_file() {
        let config = Config::parse(
            r#"
            database = "/tmp/tours.db"

            [panorama]
            access_token = "pano-token"

            [trail]
            access_token = "  "
            base_url = "http://localhost:8080/api"

            [metadata]
            api_key = "key-1"
            client_version = "0.9.0"
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path(), PathBuf::from("/tmp/tours.db"));
        assert_eq!(
            config.credential(Backend::PanoramaHost),
            Credential::Bearer("pano-token".into())
        );
        assert_eq!(config.credential(Backend::TrailHost), Credential::Unconfigured);
        assert_eq!(config.base_url(Backend::TrailHost), Some("http://localhost:8080/api"));
        assert_eq!(config.base_url(Backend::PanoramaHost), None);
        assert_eq!(config.credential(Backend::MetadataHost), Credential::Bearer("key-1".into()));
        assert_eq!(config.client_version(), "0.9.0");
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let err = Config::parse("[trail]\ntoken = \"x\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[metadata]\napi_key = \"abc\"\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert!(config.credential(Backend::MetadataHost).is_ready());
        assert_eq!(config.client_version(), env!("CARGO_PKG_VERSION"));
    }
}
