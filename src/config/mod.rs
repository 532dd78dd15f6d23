//! Configuration management.
//!
//! Precedence, lowest first: built-in defaults, the TOML config file,
//! environment variables.

mod features;

pub use features::FeatureFlags;

use crate::models::KnowledgeBase;
use crate::services::DEFAULT_OUTPUT_TOKEN_ESTIMATE;
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Directory name under the platform config dir.
const CONFIG_DIR_NAME: &str = "clinical-brain";

/// Main configuration for the clinical brain.
#[derive(Debug, Clone, Default)]
pub struct BrainConfig {
    /// HTTP server settings.
    pub server: ServerSettings,
    /// Vertex AI settings.
    pub vertex: VertexSettings,
    /// Outbound HTTP timeouts.
    pub http: HttpSettings,
    /// Tier selection settings.
    pub selection: SelectionSettings,
    /// Remote model name overrides keyed by tier.
    pub models: BTreeMap<String, String>,
    /// Optional knowledge-base JSON file.
    pub knowledge_base_path: Option<PathBuf>,
    /// Feature flags.
    pub features: FeatureFlags,
    /// Logging settings.
    pub logging: LoggingSettings,
    /// Metrics settings.
    pub metrics: MetricsSettings,
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Maximum accepted request body size.
    pub max_body_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Vertex AI settings.
#[derive(Debug, Clone)]
pub struct VertexSettings {
    /// GCP project.
    pub project_id: String,
    /// Region.
    pub location: String,
    /// Base endpoint override.
    pub endpoint: Option<String>,
    /// OAuth bearer token.
    pub access_token: Option<SecretString>,
}

impl Default for VertexSettings {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            location: "us-central1".to_string(),
            endpoint: None,
            access_token: None,
        }
    }
}

/// Outbound HTTP timeout settings. Unset values use the client defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct HttpSettings {
    /// Per-call timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: Option<u64>,
    /// Overall request budget in milliseconds.
    pub request_deadline_ms: Option<u64>,
}

/// Tier selection settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionSettings {
    /// Output tokens assumed when estimating cost.
    pub output_token_estimate: usize,
}

impl Default for SelectionSettings {
    fn default() -> Self {
        Self {
            output_token_estimate: DEFAULT_OUTPUT_TOKEN_ESTIMATE,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LoggingSettings {
    /// `json` or `pretty`.
    pub format: Option<String>,
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: Option<String>,
}

/// Metrics settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct MetricsSettings {
    /// Whether the Prometheus exporter is installed.
    pub enabled: Option<bool>,
    /// Exporter listen port.
    pub port: Option<u16>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Server section.
    pub server: Option<ConfigFileServer>,
    /// Vertex section.
    pub vertex: Option<ConfigFileVertex>,
    /// HTTP section.
    pub http: Option<HttpSettings>,
    /// Selection section.
    pub selection: Option<ConfigFileSelection>,
    /// Per-tier model sections.
    pub models: Option<BTreeMap<String, ConfigFileModel>>,
    /// Knowledge-base file path.
    pub knowledge_base_path: Option<String>,
    /// Features section.
    pub features: Option<ConfigFileFeatures>,
    /// Logging section.
    pub logging: Option<LoggingSettings>,
    /// Metrics section.
    pub metrics: Option<MetricsSettings>,
}

/// Server section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileServer {
    /// Bind address.
    pub host: Option<String>,
    /// Bind port.
    pub port: Option<u16>,
    /// Maximum request body size.
    pub max_body_bytes: Option<usize>,
}

/// Vertex section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileVertex {
    /// GCP project.
    pub project_id: Option<String>,
    /// Region.
    pub location: Option<String>,
    /// Base endpoint override.
    pub endpoint: Option<String>,
    /// Bearer token.
    pub access_token: Option<String>,
}

/// Selection section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileSelection {
    /// Output-token estimate.
    pub output_token_estimate: Option<usize>,
}

/// Model section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileModel {
    /// Remote model name for the tier.
    pub model: Option<String>,
}

/// Features section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileFeatures {
    /// Prompt audit log.
    pub audit_log: Option<bool>,
}

impl BrainConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from an explicit path, or the default location,
    /// then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit path cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load_default(),
        };
        Ok(config.with_env_overrides())
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> crate::Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| crate::Error::OperationFailed {
                operation: "read_config_file".to_string(),
                cause: format!("{}: {e}", path.display()),
            })?;

        Self::from_toml(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid config file.
    pub fn from_toml(contents: &str) -> crate::Result<Self> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| crate::Error::OperationFailed {
                operation: "parse_config_file".to_string(),
                cause: e.to_string(),
            })?;

        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the platform config dir, then `~/.config/clinical-brain/`.
    /// Returns the default configuration if no readable file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let candidates = [
            base_dirs.config_dir().join(CONFIG_DIR_NAME).join("config.toml"),
            base_dirs
                .home_dir()
                .join(".config")
                .join(CONFIG_DIR_NAME)
                .join("config.toml"),
        ];

        for path in candidates.iter().filter(|path| path.exists()) {
            match Self::load_from_file(path) {
                Ok(config) => {
                    tracing::debug!(path = %path.display(), "Loaded config file");
                    return config;
                },
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Ignoring config file"),
            }
        }

        Self::default()
    }

    /// Converts a `ConfigFile` to `BrainConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(server) = file.server {
            if let Some(host) = server.host {
                config.server.host = host;
            }
            if let Some(port) = server.port {
                config.server.port = port;
            }
            if let Some(max_body_bytes) = server.max_body_bytes {
                config.server.max_body_bytes = max_body_bytes;
            }
        }
        if let Some(vertex) = file.vertex {
            if let Some(project_id) = vertex.project_id {
                config.vertex.project_id = project_id;
            }
            if let Some(location) = vertex.location {
                config.vertex.location = location;
            }
            config.vertex.endpoint = vertex.endpoint;
            config.vertex.access_token = vertex.access_token.map(SecretString::from);
        }
        if let Some(http) = file.http {
            config.http = http;
        }
        if let Some(estimate) = file.selection.and_then(|s| s.output_token_estimate) {
            config.selection.output_token_estimate = estimate;
        }
        if let Some(models) = file.models {
            config.models = models
                .into_iter()
                .filter_map(|(tier, model)| model.model.map(|name| (tier, name)))
                .collect();
        }
        config.knowledge_base_path = file.knowledge_base_path.map(PathBuf::from);
        if let Some(audit_log) = file.features.and_then(|f| f.audit_log) {
            config.features.audit_log = audit_log;
        }
        if let Some(logging) = file.logging {
            config.logging = logging;
        }
        if let Some(metrics) = file.metrics {
            config.metrics = metrics;
        }

        config
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Applies overrides from an arbitrary variable lookup.
    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(host) = var("CLINICAL_BRAIN_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("CLINICAL_BRAIN_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
        if let Some(max) = var("CLINICAL_BRAIN_MAX_BODY_BYTES").and_then(|v| v.parse().ok()) {
            self.server.max_body_bytes = max;
        }
        if let Some(project_id) =
            var("CLINICAL_BRAIN_VERTEX_PROJECT").or_else(|| var("GOOGLE_CLOUD_PROJECT"))
        {
            self.vertex.project_id = project_id;
        }
        if let Some(location) = var("CLINICAL_BRAIN_VERTEX_LOCATION") {
            self.vertex.location = location;
        }
        if let Some(endpoint) = var("CLINICAL_BRAIN_VERTEX_ENDPOINT") {
            self.vertex.endpoint = Some(endpoint);
        }
        if let Some(token) = var("VERTEX_ACCESS_TOKEN") {
            self.vertex.access_token = Some(SecretString::from(token));
        }
        let millis = |name: &str| var(name).and_then(|v| v.parse::<u64>().ok());
        if let Some(timeout_ms) = millis("CLINICAL_BRAIN_HTTP_TIMEOUT_MS") {
            self.http.timeout_ms = Some(timeout_ms);
        }
        if let Some(connect_timeout_ms) = millis("CLINICAL_BRAIN_HTTP_CONNECT_TIMEOUT_MS") {
            self.http.connect_timeout_ms = Some(connect_timeout_ms);
        }
        if let Some(deadline_ms) = millis("CLINICAL_BRAIN_REQUEST_DEADLINE_MS") {
            self.http.request_deadline_ms = Some(deadline_ms);
        }
        if let Some(estimate) =
            var("CLINICAL_BRAIN_OUTPUT_TOKEN_ESTIMATE").and_then(|v| v.parse().ok())
        {
            self.selection.output_token_estimate = estimate;
        }
        if let Some(path) = var("CLINICAL_BRAIN_KNOWLEDGE_BASE") {
            self.knowledge_base_path = Some(PathBuf::from(path));
        }
        if let Some(audit_log) = var("CLINICAL_BRAIN_AUDIT_LOG").and_then(|v| parse_bool(&v)) {
            self.features.audit_log = audit_log;
        }

        self
    }

    /// Remote model name overrides as `(tier, model)` pairs.
    pub fn model_overrides(&self) -> impl Iterator<Item = (&str, &str)> {
        self.models
            .iter()
            .map(|(tier, model)| (tier.as_str(), model.as_str()))
    }

    /// Loads the configured knowledge base, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if a path is configured but cannot be loaded.
    pub fn load_knowledge_base(&self) -> crate::Result<Option<KnowledgeBase>> {
        self.knowledge_base_path
            .as_deref()
            .map(KnowledgeBase::load_from_file)
            .transpose()
    }

    /// Server bind address as `host:port`.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Parses a boolean flag value.
#[must_use]
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
knowledge_base_path = "/etc/clinical-brain/kb.json"

[server]
port = 9000
max_body_bytes = 2048

[vertex]
project_id = "clinic-prod"
location = "europe-west1"
access_token = "ya29.token"

[http]
timeout_ms = 20000

[selection]
output_token_estimate = 2000

[models.premium]
model = "gemini-2.5-pro-preview"

[features]
audit_log = true

[logging]
format = "json"

[metrics]
enabled = true
port = 9100
"#;

    #[test]
    fn test_defaults() {
        let config = BrainConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.vertex.location, "us-central1");
        assert_eq!(config.selection.output_token_estimate, 1500);
        assert!(!config.features.audit_log);
        assert!(config.knowledge_base_path.is_none());
    }

    #[test]
    fn test_from_toml() {
        let config = BrainConfig::from_toml(SAMPLE).unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.max_body_bytes, 2048);
        assert_eq!(config.vertex.project_id, "clinic-prod");
        assert_eq!(config.vertex.location, "europe-west1");
        assert_eq!(
            config.vertex.access_token.as_ref().map(|t| t.expose_secret()),
            Some("ya29.token")
        );
        assert_eq!(config.http.timeout_ms, Some(20_000));
        assert_eq!(config.http.request_deadline_ms, None);
        assert_eq!(config.selection.output_token_estimate, 2000);
        assert_eq!(
            config.model_overrides().collect::<Vec<_>>(),
            vec![("premium", "gemini-2.5-pro-preview")]
        );
        assert!(config.features.audit_log);
        assert_eq!(config.logging.format.as_deref(), Some("json"));
        assert_eq!(config.metrics.port, Some(9100));
        assert_eq!(
            config.knowledge_base_path.as_deref(),
            Some(Path::new("/etc/clinical-brain/kb.json"))
        );
    }

    #[test]
    fn test_invalid_toml() {
        let err = BrainConfig::from_toml("[server\nport = 1").unwrap_err();
        assert!(err.to_string().contains("parse_config_file"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nport = 7070\n").unwrap();

        let config = BrainConfig::load_from_file(&path).unwrap();
        assert_eq!(config.server.port, 7070);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = BrainConfig::load(Some(&dir.path().join("missing.toml"))).unwrap_err();
        assert!(err.to_string().contains("read_config_file"));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CLINICAL_BRAIN_PORT", "9999"),
            ("GOOGLE_CLOUD_PROJECT", "from-gcloud"),
            ("VERTEX_ACCESS_TOKEN", "secret"),
            ("CLINICAL_BRAIN_AUDIT_LOG", "yes"),
            ("CLINICAL_BRAIN_OUTPUT_TOKEN_ESTIMATE", "not-a-number"),
            ("CLINICAL_BRAIN_HOST", "  "),
        ]
        .into_iter()
        .collect();

        let config = BrainConfig::from_toml(SAMPLE)
            .unwrap()
            .with_overrides_from(|name| vars.get(name).map(ToString::to_string));

        assert_eq!(config.server.port, 9999);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.vertex.project_id, "from-gcloud");
        assert_eq!(
            config.vertex.access_token.as_ref().map(|t| t.expose_secret()),
            Some("secret")
        );
        assert!(config.features.audit_log);
        assert_eq!(config.selection.output_token_estimate, 2000);
    }

    #[test]
    fn test_http_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CLINICAL_BRAIN_HTTP_TIMEOUT_MS", "15000"),
            ("CLINICAL_BRAIN_REQUEST_DEADLINE_MS", "40000"),
            ("CLINICAL_BRAIN_HTTP_CONNECT_TIMEOUT_MS", "soon"),
        ]
        .into_iter()
        .collect();

        let config = BrainConfig::default()
            .with_overrides_from(|name| vars.get(name).map(ToString::to_string));

        assert_eq!(config.http.timeout_ms, Some(15000));
        assert_eq!(config.http.request_deadline_ms, Some(40000));
        assert_eq!(config.http.connect_timeout_ms, None);
    }

    #[test]
    fn test_specific_project_wins_over_gcloud() {
        let config = BrainConfig::default().with_overrides_from(|name| match name {
            "CLINICAL_BRAIN_VERTEX_PROJECT" => Some("specific".to_string()),
            "GOOGLE_CLOUD_PROJECT" => Some("generic".to_string()),
            _ => None,
        });
        assert_eq!(config.vertex.project_id, "specific");
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = BrainConfig::from_toml(SAMPLE).unwrap();
        assert!(!format!("{config:?}").contains("ya29.token"));
    }

    #[test]
    fn test_load_knowledge_base() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.json");
        std::fs::write(&path, r#"{"rules": {"cardiologia": ["ECG en < 10 min"]}}"#).unwrap();

        let mut config = BrainConfig::default();
        assert!(config.load_knowledge_base().unwrap().is_none());

        config.knowledge_base_path = Some(path);
        let kb = config.load_knowledge_base().unwrap().unwrap();
        assert!(!kb.is_empty());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
