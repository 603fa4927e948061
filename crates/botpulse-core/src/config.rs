//! Configuration management for botpulse
//!
//! Settings for the time-series sink and for subject classification. Loaded
//! from a TOML file; every key has a default so an absent file is valid.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{BotpulseError, Result};

/// Analytics configuration
///
/// Usually loaded from `.botpulse/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Time-series database base URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Write token; falls back to the `credential_env` variable when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,

    /// Environment variable containing the write token
    #[serde(default = "default_credential_env")]
    pub credential_env: String,

    #[serde(default = "default_organization")]
    pub organization: String,

    /// Bucket (write target) points land in
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Timestamp precision sent with each write
    #[serde(default)]
    pub precision: Precision,

    /// Sink request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Candidate subjects, in match priority order
    #[serde(default)]
    pub subjects: Vec<String>,

    /// Subject used when a block name matches no candidate
    #[serde(default = "default_subject")]
    pub default_subject: String,

    /// Tag key the resolved subject is recorded under
    #[serde(default = "default_subject_tag")]
    pub subject_tag: String,
}

/// Timestamp precision of the write API
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    S,
    #[default]
    Ms,
    Us,
    Ns,
}

impl Precision {
    /// Query parameter value for the write API
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S => "s",
            Self::Ms => "ms",
            Self::Us => "us",
            Self::Ns => "ns",
        }
    }
}

impl std::fmt::Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A credential that never shows up in logs
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            f.write_str("<unset>")
        } else {
            f.write_str("***")
        }
    }
}

/// Everything needed to open a sink connection
#[derive(Debug, Clone, PartialEq)]
pub struct SinkSettings {
    pub endpoint: String,
    pub credential: Secret,
    pub organization: String,
    pub bucket: String,
    pub precision: Precision,
    pub timeout_secs: u64,
}

impl SinkSettings {
    pub fn new(endpoint: impl Into<String>, credential: Secret) -> Self {
        Self {
            endpoint: endpoint.into(),
            credential,
            organization: default_organization(),
            bucket: default_bucket(),
            precision: Precision::default(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Subject classification rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectRules {
    /// Candidate subjects, first match wins
    pub candidates: Vec<String>,
    pub default_subject: String,
}

impl SubjectRules {
    pub fn new<I, S>(candidates: I, default_subject: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            candidates: candidates.into_iter().map(Into::into).collect(),
            default_subject: default_subject.into(),
        }
    }
}

impl Default for SubjectRules {
    fn default() -> Self {
        Self {
            candidates: Vec::new(),
            default_subject: default_subject(),
        }
    }
}

// Default value providers
fn default_endpoint() -> String {
    "http://localhost:8086".to_string()
}

fn default_credential_env() -> String {
    "INFLUX_TOKEN".to_string()
}

fn default_organization() -> String {
    "botpulse".to_string()
}

fn default_bucket() -> String {
    "botpulse".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_subject() -> String {
    "Other".to_string()
}

fn default_subject_tag() -> String {
    "subject".to_string()
}

impl MetricsConfig {
    /// Load configuration from `path` or use defaults when it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)
                .map_err(|e| BotpulseError::Config(format!("Failed to parse config file: {}", e)))
        } else {
            Ok(Self::default())
        }
    }

    /// Write the default configuration to `path`
    pub fn write_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(&Self::default())
            .map_err(|e| BotpulseError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Resolve the write token: explicit value first, then the environment
    pub fn resolve_credential(&self) -> Secret {
        match &self.credential {
            Some(token) if !token.is_empty() => Secret::new(token.clone()),
            _ => std::env::var(&self.credential_env)
                .map(Secret::new)
                .unwrap_or_default(),
        }
    }

    pub fn sink_settings(&self) -> SinkSettings {
        SinkSettings {
            endpoint: self.endpoint.clone(),
            credential: self.resolve_credential(),
            organization: self.organization.clone(),
            bucket: self.bucket.clone(),
            precision: self.precision,
            timeout_secs: self.timeout_secs,
        }
    }

    pub fn subject_rules(&self) -> SubjectRules {
        SubjectRules {
            candidates: self.subjects.clone(),
            default_subject: self.default_subject.clone(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            credential: None,
            credential_env: default_credential_env(),
            organization: default_organization(),
            bucket: default_bucket(),
            precision: Precision::default(),
            timeout_secs: default_timeout_secs(),
            subjects: Vec::new(),
            default_subject: default_subject(),
            subject_tag: default_subject_tag(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = MetricsConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(config.endpoint, "http://localhost:8086");
        assert_eq!(config.precision, Precision::Ms);
        assert_eq!(config.default_subject, "Other");
        assert_eq!(config.subject_tag, "subject");
        assert!(config.subjects.is_empty());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
endpoint = "https://influx.example.com"
credential = "tok"
subjects = ["Greeting", "Question"]
precision = "s"
"#,
        )
        .unwrap();

        let config = MetricsConfig::load_or_default(&path).unwrap();
        assert_eq!(config.endpoint, "https://influx.example.com");
        assert_eq!(config.bucket, "botpulse");
        assert_eq!(config.precision, Precision::S);
        assert_eq!(config.resolve_credential().expose(), "tok");

        let rules = config.subject_rules();
        assert_eq!(rules.candidates, vec!["Greeting", "Question"]);
        assert_eq!(rules.default_subject, "Other");
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "subjects = 12").unwrap();

        let err = MetricsConfig::load_or_default(&path).unwrap_err();
        assert!(matches!(err, BotpulseError::Config(_)));
    }

    #[test]
    fn test_write_default_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".botpulse/config.toml");

        MetricsConfig::write_default(&path).unwrap();
        let loaded = MetricsConfig::load_or_default(&path).unwrap();
        assert_eq!(loaded.organization, "botpulse");
        assert_eq!(loaded.timeout_secs, 10);
    }

    #[test]
    fn test_credential_from_environment() {
        let config = MetricsConfig {
            credential_env: "BOTPULSE_TEST_TOKEN_ENV".to_string(),
            ..Default::default()
        };

        std::env::set_var("BOTPULSE_TEST_TOKEN_ENV", "from-env");
        assert_eq!(config.sink_settings().credential.expose(), "from-env");
        std::env::remove_var("BOTPULSE_TEST_TOKEN_ENV");
        assert!(config.resolve_credential().is_empty());
    }

    #[test]
    fn test_secret_is_redacted() {
        let secret = Secret::new("hunter2");
        assert_eq!(format!("{:?}", secret), "Secret(***)");
        assert_eq!(secret.to_string(), "***");
        assert_eq!(Secret::default().to_string(), "<unset>");
    }
}
