use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::auth::Credential;

pub const DEFAULT_BASE_URL: &str = "https://cogniz.online";
pub const DEFAULT_PROJECT_ID: &str = "default";

pub const API_KEY_ENV: &str = "COGNIZ_API_KEY";
pub const BASE_URL_ENV: &str = "COGNIZ_BASE_URL";
pub const PROJECT_ID_ENV: &str = "COGNIZ_PROJECT_ID";

/// One configuration source. The config file uses the same field names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigLayer {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

impl ConfigLayer {
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var(API_KEY_ENV).ok(),
            base_url: std::env::var(BASE_URL_ENV).ok(),
            project_id: std::env::var(PROJECT_ID_ENV).ok(),
        }
    }
}

/// Whether a missing credential is fatal at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialMode {
    /// stdio and hosted single-tenant servers
    Required,
    /// multi-tenant server; the key is only a per-request fallback
    Optional,
}

/// All configuration sources, highest precedence first.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub explicit: ConfigLayer,
    pub env: ConfigLayer,
    pub file: Option<ConfigLayer>,
    pub file_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub endpoint_base: Url,
    pub credential: Option<Credential>,
    pub default_project_id: String,
}

impl ResolvedConfig {
    /// Base URL as configured, without trailing slash.
    pub fn endpoint_display(&self) -> String {
        self.endpoint_base.as_str().trim_end_matches('/').to_string()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No Cogniz API key configured. Set COGNIZ_API_KEY, pass --api-key, or add \"api_key\" to {path}")]
    MissingCredential { path: String },
    #[error("Could not read config file {path}: {message}")]
    UnreadableFile { path: String, message: String },
    #[error("Invalid base URL '{value}': {reason}")]
    InvalidBaseUrl { value: String, reason: String },
}

/// `~/.cogniz/config.json`
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cogniz")
        .join("config.json")
}

/// Load a config file. A missing file is not an error; a malformed one is.
pub fn load_config_file(path: &Path) -> Result<Option<ConfigLayer>, ConfigError> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(ConfigError::UnreadableFile {
                path: path.display().to_string(),
                message: err.to_string(),
            });
        }
    };
    serde_json::from_str(&data)
        .map(Some)
        .map_err(|err| ConfigError::UnreadableFile {
            path: path.display().to_string(),
            message: err.to_string(),
        })
}

/// Resolve configuration (per field, priority order):
/// 1. explicit value (CLI flag)
/// 2. environment variable
/// 3. config file
/// 4. built-in default (none for the API key)
pub fn resolve(
    sources: &ConfigSources,
    mode: CredentialMode,
) -> Result<ResolvedConfig, ConfigError> {
    let file = sources.file.as_ref();
    let base_url = first_set([
        sources.explicit.base_url.as_ref(),
        sources.env.base_url.as_ref(),
        file.and_then(|layer| layer.base_url.as_ref()),
    ])
    .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let endpoint_base = parse_base_url(&base_url)?;

    let default_project_id = first_set([
        sources.explicit.project_id.as_ref(),
        sources.env.project_id.as_ref(),
        file.and_then(|layer| layer.project_id.as_ref()),
    ])
    .unwrap_or_else(|| DEFAULT_PROJECT_ID.to_string());

    let credential = first_set([
        sources.explicit.api_key.as_ref(),
        sources.env.api_key.as_ref(),
        file.and_then(|layer| layer.api_key.as_ref()),
    ])
    .and_then(Credential::new);
    if credential.is_none() && mode == CredentialMode::Required {
        let path = sources
            .file_path
            .clone()
            .unwrap_or_else(default_config_path);
        return Err(ConfigError::MissingCredential {
            path: path.display().to_string(),
        });
    }

    Ok(ResolvedConfig {
        endpoint_base,
        credential,
        default_project_id,
    })
}

fn first_set<'a>(candidates: impl IntoIterator<Item = Option<&'a String>>) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|err| ConfigError::InvalidBaseUrl {
        value: raw.to_string(),
        reason: err.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidBaseUrl {
            value: raw.to_string(),
            reason: "scheme must be http or https".to_string(),
        });
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(api_key: Option<&str>, base_url: Option<&str>, project_id: Option<&str>) -> ConfigLayer {
        ConfigLayer {
            api_key: api_key.map(str::to_string),
            base_url: base_url.map(str::to_string),
            project_id: project_id.map(str::to_string),
        }
    }

    #[test]
    fn explicit_beats_env_beats_file() {
        let sources = ConfigSources {
            explicit: layer(Some("mp_explicit"), None, None),
            env: layer(Some("mp_env"), Some("https://env.example"), None),
            file: Some(layer(
                Some("mp_file"),
                Some("https://file.example"),
                Some("file-project"),
            )),
            file_path: None,
        };
        let resolved = resolve(&sources, CredentialMode::Required).unwrap();
        assert_eq!(resolved.credential.as_ref().unwrap().expose(), "mp_explicit");
        assert_eq!(resolved.endpoint_display(), "https://env.example");
        assert_eq!(resolved.default_project_id, "file-project");
    }

    #[test]
    fn defaults_apply_when_no_source_sets_a_field() {
        let sources = ConfigSources {
            env: layer(Some("mp_env"), None, None),
            ..Default::default()
        };
        let resolved = resolve(&sources, CredentialMode::Required).unwrap();
        assert_eq!(resolved.endpoint_display(), DEFAULT_BASE_URL);
        assert_eq!(resolved.default_project_id, DEFAULT_PROJECT_ID);
    }

    #[test]
    fn blank_values_count_as_absent() {
        let sources = ConfigSources {
            explicit: layer(Some("  "), Some(""), Some(" ")),
            env: layer(None, None, None),
            file: Some(layer(Some("mp_file"), None, Some("notes"))),
            file_path: None,
        };
        let resolved = resolve(&sources, CredentialMode::Required).unwrap();
        assert_eq!(resolved.credential.as_ref().unwrap().expose(), "mp_file");
        assert_eq!(resolved.default_project_id, "notes");
    }

    #[test]
    fn missing_credential_is_fatal_only_when_required() {
        let sources = ConfigSources {
            file_path: Some(PathBuf::from("/tmp/cogniz/config.json")),
            ..Default::default()
        };
        let err = resolve(&sources, CredentialMode::Required).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential { .. }));
        assert!(err.to_string().contains("/tmp/cogniz/config.json"));
        assert!(err.to_string().contains(API_KEY_ENV));

        let resolved = resolve(&sources, CredentialMode::Optional).unwrap();
        assert!(resolved.credential.is_none());
    }

    #[test]
    fn rejects_non_http_base_url() {
        let sources = ConfigSources {
            explicit: layer(Some("mp_key"), Some("ftp://cogniz.online"), None),
            ..Default::default()
        };
        let err = resolve(&sources, CredentialMode::Required).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBaseUrl { .. }));

        let sources = ConfigSources {
            explicit: layer(Some("mp_key"), Some("not a url"), None),
            ..Default::default()
        };
        assert!(resolve(&sources, CredentialMode::Required).is_err());
    }

    #[test]
    fn config_file_loading() {
        let dir = std::env::temp_dir().join(format!("cogniz-core-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let missing = dir.join("missing.json");
        assert!(load_config_file(&missing).unwrap().is_none());

        let valid = dir.join("config.json");
        std::fs::write(
            &valid,
            r#"{"api_key":"mp_1_key","base_url":"https://cogniz.online","project_id":"default"}"#,
        )
        .unwrap();
        let loaded = load_config_file(&valid).unwrap().unwrap();
        assert_eq!(loaded.api_key.as_deref(), Some("mp_1_key"));

        let broken = dir.join("broken.json");
        std::fs::write(&broken, "{not json").unwrap();
        let err = load_config_file(&broken).unwrap_err();
        assert!(matches!(err, ConfigError::UnreadableFile { .. }));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
