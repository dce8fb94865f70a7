//! Configuration module for the TDR backend.
//!
//! Values are layered: built-in defaults, then `TDR_*` environment variables
//! (a `.env` file is honoured), then the YAML config file if it exists. The
//! file wins over the environment key by key.

use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Default location of the optional config file.
pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

const ENV_PREFIX: &str = "TDR_";

/// Errors raised while assembling the configuration. All of them are fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} cannot be empty")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind the HTTP server to
    pub address: SocketAddr,
    /// Origin allowed by CORS on the protected routes
    pub frontend_origin: String,
    /// Base URL of the GitLab v4 API
    pub gitlab_url: String,
    /// Access token for GitLab API reads
    pub gitlab_token: String,
    /// Pipeline trigger token
    pub trigger_token: String,
    /// Shared secret expected in the `api_token` header
    pub api_token: String,
    /// Upstream id of the group whose subgroups are the logical groups
    pub parent_group_id: u64,
    /// Namespace prefix used to build project paths (`<ns>/<group>/<project>`)
    pub project_namespace: String,
    /// Path of the project whose pipeline is triggered
    pub pipeline_project: String,
    /// Git ref the pipeline is triggered on
    pub trigger_ref: String,
    /// Tags starting with this prefix mark build commits
    pub build_tag_prefix: String,
    /// Logical group names to track
    pub groups: Vec<String>,
    /// Commit history window in days; 0 lists the full history
    pub commit_history_days: u32,
    /// Seconds between catalog refreshes
    pub update_interval_seconds: u64,
    /// Timeout for a single upstream request
    pub request_timeout_seconds: u64,
    /// Enables debug logging and request header echo on `/version`
    pub debug: bool,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Config file the values were read from, if any
    pub source: Option<PathBuf>,
}

/// One layer of partially specified configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
struct ConfigLayer {
    address: Option<String>,
    #[serde(alias = "frontendOrigin")]
    frontend_origin: Option<String>,
    #[serde(alias = "gitlabURL")]
    gitlab_url: Option<String>,
    #[serde(alias = "gitlabToken")]
    gitlab_token: Option<String>,
    #[serde(alias = "triggerToken")]
    trigger_token: Option<String>,
    #[serde(alias = "apiToken")]
    api_token: Option<String>,
    parent_group_id: Option<u64>,
    project_namespace: Option<String>,
    pipeline_project: Option<String>,
    trigger_ref: Option<String>,
    build_tag_prefix: Option<String>,
    #[serde(alias = "groupIds")]
    groups: Option<Vec<String>>,
    #[serde(alias = "commitHistoryDays")]
    commit_history_days: Option<u32>,
    #[serde(alias = "updateIntervalSeconds")]
    update_interval_seconds: Option<u64>,
    request_timeout_seconds: Option<u64>,
    debug: Option<bool>,
    log_level: Option<String>,
}

impl ConfigLayer {
    /// Read a layer from `TDR_*` variables through `lookup`. Empty values count as unset.
    fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Ok(Self {
            address: var("ADDRESS"),
            frontend_origin: var("FRONTEND_ORIGIN"),
            gitlab_url: var("GITLAB_URL"),
            gitlab_token: var("GITLAB_TOKEN"),
            trigger_token: var("TRIGGER_TOKEN"),
            api_token: var("API_TOKEN"),
            parent_group_id: parse_var("parent_group_id", var("PARENT_GROUP_ID"))?,
            project_namespace: var("PROJECT_NAMESPACE"),
            pipeline_project: var("PIPELINE_PROJECT"),
            trigger_ref: var("TRIGGER_REF"),
            build_tag_prefix: var("BUILD_TAG_PREFIX"),
            groups: var("GROUPS").map(|v| split_list(&v)),
            commit_history_days: parse_var("commit_history_days", var("COMMIT_HISTORY_DAYS"))?,
            update_interval_seconds: parse_var(
                "update_interval_seconds",
                var("UPDATE_INTERVAL_SECONDS"),
            )?,
            request_timeout_seconds: parse_var(
                "request_timeout_seconds",
                var("REQUEST_TIMEOUT_SECONDS"),
            )?,
            debug: parse_var("debug", var("DEBUG"))?,
            log_level: var("LOG_LEVEL"),
        })
    }

    /// Read a layer from a YAML file. A missing file yields `None`.
    fn from_file(path: &Path) -> Result<Option<Self>, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        if contents.trim().is_empty() {
            return Ok(Some(Self::default()));
        }

        serde_yaml::from_str::<Self>(&contents)
            .map(|layer| Some(layer.without_blanks()))
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Treat blank strings as unset keys, as the environment layer does.
    fn without_blanks(self) -> Self {
        Self {
            address: non_blank(self.address),
            frontend_origin: non_blank(self.frontend_origin),
            gitlab_url: non_blank(self.gitlab_url),
            gitlab_token: non_blank(self.gitlab_token),
            trigger_token: non_blank(self.trigger_token),
            api_token: non_blank(self.api_token),
            project_namespace: non_blank(self.project_namespace),
            pipeline_project: non_blank(self.pipeline_project),
            trigger_ref: non_blank(self.trigger_ref),
            build_tag_prefix: non_blank(self.build_tag_prefix),
            log_level: non_blank(self.log_level),
            ..self
        }
    }

    /// Overlay `top` onto `self`; values set in `top` win.
    fn overlay(self, top: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            address: top.address.or(self.address),
            frontend_origin: top.frontend_origin.or(self.frontend_origin),
            gitlab_url: top.gitlab_url.or(self.gitlab_url),
            gitlab_token: top.gitlab_token.or(self.gitlab_token),
            trigger_token: top.trigger_token.or(self.trigger_token),
            api_token: top.api_token.or(self.api_token),
            parent_group_id: top.parent_group_id.or(self.parent_group_id),
            project_namespace: top.project_namespace.or(self.project_namespace),
            pipeline_project: top.pipeline_project.or(self.pipeline_project),
            trigger_ref: top.trigger_ref.or(self.trigger_ref),
            build_tag_prefix: top.build_tag_prefix.or(self.build_tag_prefix),
            groups: top.groups.or(self.groups),
            commit_history_days: top.commit_history_days.or(self.commit_history_days),
            update_interval_seconds: top.update_interval_seconds.or(self.update_interval_seconds),
            request_timeout_seconds: top.request_timeout_seconds.or(self.request_timeout_seconds),
            debug: top.debug.or(self.debug),
            log_level: top.log_level.or(self.log_level),
        }
    }
}

impl Config {
    /// Load configuration from the environment and the config file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::load_with(path, |key| env::var(key).ok())
    }

    /// Load configuration using `lookup` in place of the process environment.
    pub fn load_with(
        path: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let env_layer = ConfigLayer::from_vars(lookup)?;

        match ConfigLayer::from_file(path)? {
            Some(file_layer) => {
                let mut config = Self::from_layer(env_layer.overlay(file_layer))?;
                config.source = Some(path.to_path_buf());
                Ok(config)
            }
            None => Self::from_layer(env_layer),
        }
    }

    fn from_layer(layer: ConfigLayer) -> Result<Self, ConfigError> {
        let address = parse_address(layer.address.as_deref().unwrap_or(":8000"))?;

        let gitlab_token = required("gitlab_token", layer.gitlab_token)?;
        let trigger_token = required("trigger_token", layer.trigger_token)?;
        let api_token = required("api_token", layer.api_token)?;

        let groups: Vec<String> = layer
            .groups
            .unwrap_or_else(|| vec!["papers".into(), "notes".into(), "reports".into()])
            .into_iter()
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty())
            .collect();
        if groups.is_empty() {
            return Err(ConfigError::Missing("groups"));
        }

        let update_interval_seconds = layer.update_interval_seconds.unwrap_or(600);
        if update_interval_seconds == 0 {
            return Err(ConfigError::Invalid {
                key: "update_interval_seconds",
                value: "0".into(),
                reason: "must be greater than zero".into(),
            });
        }

        let request_timeout_seconds = layer.request_timeout_seconds.unwrap_or(30);
        if request_timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                key: "request_timeout_seconds",
                value: "0".into(),
                reason: "must be greater than zero".into(),
            });
        }

        Ok(Self {
            address,
            frontend_origin: layer
                .frontend_origin
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            gitlab_url: layer
                .gitlab_url
                .unwrap_or_else(|| "https://gitlab.cern.ch/api/v4".to_string()),
            gitlab_token,
            trigger_token,
            api_token,
            parent_group_id: layer.parent_group_id.unwrap_or(16284),
            project_namespace: layer.project_namespace.unwrap_or_else(|| "tdr".to_string()),
            pipeline_project: layer
                .pipeline_project
                .unwrap_or_else(|| "clange/tdr-diff".to_string()),
            trigger_ref: layer.trigger_ref.unwrap_or_else(|| "master".to_string()),
            build_tag_prefix: layer
                .build_tag_prefix
                .unwrap_or_else(|| "CADI-BuildTag".to_string()),
            groups,
            commit_history_days: layer.commit_history_days.unwrap_or(90),
            update_interval_seconds,
            request_timeout_seconds,
            debug: layer.debug.unwrap_or(false),
            log_level: layer.log_level.unwrap_or_else(|| "info".to_string()),
            source: None,
        })
    }

    /// Interval between two catalog refreshes.
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_seconds)
    }

    /// Fully populated configuration for unit tests.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            address: "127.0.0.1:0".parse().unwrap(),
            frontend_origin: "http://localhost:3000".to_string(),
            gitlab_url: "http://127.0.0.1:1/api/v4".to_string(),
            gitlab_token: "gitlab-token".to_string(),
            trigger_token: "trigger-token".to_string(),
            api_token: "test-api-key".to_string(),
            parent_group_id: 16284,
            project_namespace: "tdr".to_string(),
            pipeline_project: "clange/tdr-diff".to_string(),
            trigger_ref: "master".to_string(),
            build_tag_prefix: "CADI-BuildTag".to_string(),
            groups: vec!["papers".to_string(), "notes".to_string()],
            commit_history_days: 0,
            update_interval_seconds: 600,
            request_timeout_seconds: 5,
            debug: false,
            log_level: "warn".to_string(),
            source: None,
        }
    }
}

fn required(key: &'static str, value: Option<String>) -> Result<String, ConfigError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn parse_var<T>(key: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|v| {
            v.parse().map_err(|e: T::Err| ConfigError::Invalid {
                key,
                value: v.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

/// Parse a listen address; a bare `:port` binds all interfaces.
fn parse_address(value: &str) -> Result<SocketAddr, ConfigError> {
    let normalized = if value.starts_with(':') {
        format!("0.0.0.0{value}")
    } else {
        value.to_string()
    };

    normalized.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
        key: "address",
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const SECRETS: [(&str, &str); 3] = [
        ("TDR_GITLAB_TOKEN", "gl"),
        ("TDR_TRIGGER_TOKEN", "tr"),
        ("TDR_API_TOKEN", "api"),
    ];

    fn missing_file() -> PathBuf {
        PathBuf::from("/nonexistent/tdr/config.yaml")
    }

    #[test]
    fn test_default_config() {
        let config = Config::load_with(&missing_file(), vars(&SECRETS)).unwrap();

        assert_eq!(config.address.to_string(), "0.0.0.0:8000");
        assert_eq!(config.frontend_origin, "http://localhost:3000");
        assert_eq!(config.gitlab_url, "https://gitlab.cern.ch/api/v4");
        assert_eq!(config.parent_group_id, 16284);
        assert_eq!(config.groups, vec!["papers", "notes", "reports"]);
        assert_eq!(config.commit_history_days, 90);
        assert_eq!(config.update_interval(), Duration::from_secs(600));
        assert_eq!(config.build_tag_prefix, "CADI-BuildTag");
        assert_eq!(config.log_level, "info");
        assert!(!config.debug);
        assert!(config.source.is_none());
    }

    #[test]
    fn test_missing_secrets_rejected() {
        let err = Config::load_with(&missing_file(), vars(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("gitlab_token")));

        let err = Config::load_with(
            &missing_file(),
            vars(&[("TDR_GITLAB_TOKEN", "gl"), ("TDR_TRIGGER_TOKEN", "tr")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("api_token")));
    }

    #[test]
    fn test_empty_env_value_counts_as_missing() {
        let mut pairs = SECRETS.to_vec();
        pairs.push(("TDR_API_TOKEN", "   "));
        // Later entries win in the HashMap.
        let err = Config::load_with(&missing_file(), vars(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("api_token")));
    }

    #[test]
    fn test_env_values_parsed() {
        let mut pairs = SECRETS.to_vec();
        pairs.extend([
            ("TDR_GROUPS", "papers, notes ,,"),
            ("TDR_ADDRESS", "127.0.0.1:9000"),
            ("TDR_UPDATE_INTERVAL_SECONDS", "30"),
            ("TDR_DEBUG", "true"),
        ]);
        let config = Config::load_with(&missing_file(), vars(&pairs)).unwrap();

        assert_eq!(config.groups, vec!["papers", "notes"]);
        assert_eq!(config.address.to_string(), "127.0.0.1:9000");
        assert_eq!(config.update_interval_seconds, 30);
        assert!(config.debug);
    }

    #[test]
    fn test_invalid_number_rejected() {
        let mut pairs = SECRETS.to_vec();
        pairs.push(("TDR_PARENT_GROUP_ID", "tdr"));
        let err = Config::load_with(&missing_file(), vars(&pairs)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "parent_group_id",
                ..
            }
        ));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut pairs = SECRETS.to_vec();
        pairs.push(("TDR_UPDATE_INTERVAL_SECONDS", "0"));
        assert!(Config::load_with(&missing_file(), vars(&pairs)).is_err());
    }

    #[test]
    fn test_file_overrides_environment() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "apiToken: from-file\ngroups: [papers]\nupdateIntervalSeconds: 60\nfrontend_origin: https://tdr.example.com"
        )
        .unwrap();

        let mut pairs = SECRETS.to_vec();
        pairs.push(("TDR_FRONTEND_ORIGIN", "http://env.example.com"));
        pairs.push(("TDR_LOG_LEVEL", "debug"));
        let config = Config::load_with(file.path(), vars(&pairs)).unwrap();

        assert_eq!(config.api_token, "from-file");
        assert_eq!(config.gitlab_token, "gl");
        assert_eq!(config.groups, vec!["papers"]);
        assert_eq!(config.update_interval_seconds, 60);
        assert_eq!(config.frontend_origin, "https://tdr.example.com");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.source.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_blank_file_values_fall_back_to_environment() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(include_str!("../../config/config.example.yaml").as_bytes())
            .unwrap();

        let config = Config::load_with(file.path(), vars(&SECRETS)).unwrap();

        assert_eq!(config.gitlab_token, "gl");
        assert_eq!(config.trigger_token, "tr");
        assert_eq!(config.api_token, "api");
        assert_eq!(config.groups, vec!["papers", "notes", "reports"]);
        assert_eq!(config.source.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_malformed_file_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "groups: {{ not: [a list").unwrap();

        let err = Config::load_with(file.path(), vars(&SECRETS)).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_parse_address_bare_port() {
        assert_eq!(parse_address(":8000").unwrap().to_string(), "0.0.0.0:8000");
        assert!(parse_address("localhost").is_err());
    }
}
