//! Configuration file parser for ~/.config/newsdedup/config.toml.
//!
//! Unlike the deduplication settings, which all have defaults, the backend
//! credentials must be present: a missing or malformed file is a fatal
//! startup error. Unknown keys are accepted but logged as likely typos.
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::dedup::SimilarityMethod;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// A value parsed but makes no sense.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Which reader service to talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Ttrss,
    Miniflux,
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendKind,

    /// Where the checkpoint is persisted. Defaults to `checkpoint` next to
    /// the config file.
    pub state_file: Option<PathBuf>,

    pub ttrss: Option<TtRssConfig>,

    pub miniflux: Option<MinifluxConfig>,

    pub dedup: DedupConfig,
}

/// Tiny Tiny RSS credentials.
#[derive(Clone, Deserialize)]
pub struct TtRssConfig {
    pub hostname: String,
    pub username: String,
    pub password: String,
}

/// Mask the password in Debug output to prevent secret leakage.
impl std::fmt::Debug for TtRssConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtRssConfig")
            .field("hostname", &self.hostname)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Miniflux credentials.
#[derive(Clone, Deserialize)]
pub struct MinifluxConfig {
    pub hostname: String,
    pub api_token: String,
}

impl std::fmt::Debug for MinifluxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MinifluxConfig")
            .field("hostname", &self.hostname)
            .field("api_token", &"[REDACTED]")
            .finish()
    }
}

/// Deduplication tuning. Every key is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Capacity of the recency cache.
    pub max_count: NonZeroUsize,

    /// Read articles learned per feed during warm-up.
    pub learn_count: usize,

    /// Titles scoring strictly above this (0-100) are duplicates.
    pub ratio: u8,

    /// Similarity method name, see [`SimilarityMethod::from_name`].
    pub method: String,

    /// Seconds to sleep between poll cycles.
    pub sleep: u64,

    /// Poll cycles between forced re-learns. 0 = never.
    pub relearn_interval: u64,

    /// Whether matching canonical links count as duplicates.
    pub check_urls: bool,

    /// Run one pass without marking anything, then exit.
    pub evaluate_only: bool,

    /// Feed ids exempt from deduplication.
    pub ignore: Vec<i64>,

    /// Feed ids whose duplicates are marked read but not starred.
    pub nostar: Vec<i64>,

    /// Feed ids only compared against their own articles.
    pub internal_only: Vec<i64>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            max_count: NonZeroUsize::new(500).unwrap_or(NonZeroUsize::MIN),
            learn_count: 50,
            ratio: 80,
            method: SimilarityMethod::TokenSort.as_str().to_string(),
            sleep: 60,
            relearn_interval: 60,
            check_urls: true,
            evaluate_only: false,
            ignore: Vec::new(),
            nostar: Vec::new(),
            internal_only: Vec::new(),
        }
    }
}

impl DedupConfig {
    /// The configured similarity method; unknown names fall back to token sort.
    pub fn similarity_method(&self) -> SimilarityMethod {
        SimilarityMethod::from_name(&self.method).unwrap_or_else(|| {
            tracing::warn!(
                method = %self.method,
                fallback = %SimilarityMethod::default(),
                "Unknown similarity method, using fallback"
            );
            SimilarityMethod::default()
        })
    }

    pub fn sleep_interval(&self) -> Duration {
        Duration::from_secs(self.sleep)
    }
}

const KNOWN_TOP_LEVEL_KEYS: &[&str] = &["backend", "state_file", "ttrss", "miniflux", "dedup"];
const KNOWN_DEDUP_KEYS: &[&str] = &[
    "max_count",
    "learn_count",
    "ratio",
    "method",
    "sleep",
    "relearn_interval",
    "check_urls",
    "evaluate_only",
    "ignore",
    "nostar",
    "internal_only",
];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load and validate configuration from a TOML file.
    ///
    /// - Missing file → `Err(ConfigError::NotFound)`
    /// - Invalid TOML or wrong value types → `Err(ConfigError::Parse)`
    /// - Out-of-range values or missing credentials → `Err(ConfigError::Invalid)`
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to prevent memory exhaustion
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::parse(&content)?;
        tracing::info!(
            path = %path.display(),
            backend = ?config.backend,
            method = %config.dedup.method,
            ratio = config.dedup.ratio,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse and validate configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        // Parse the TOML content first as a raw table to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_TOP_LEVEL_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
            if let Some(toml::Value::Table(dedup)) = raw.get("dedup") {
                for key in dedup.keys() {
                    if !KNOWN_DEDUP_KEYS.contains(&key.as_str()) {
                        tracing::warn!(key = %key, "Unknown key in [dedup], ignoring");
                    }
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.dedup.ratio > 100 {
            return Err(ConfigError::Invalid(format!(
                "dedup.ratio must be between 0 and 100, got {}",
                self.dedup.ratio
            )));
        }
        if self.dedup.sleep == 0 {
            return Err(ConfigError::Invalid(
                "dedup.sleep must be at least 1 second".to_string(),
            ));
        }

        match self.backend {
            BackendKind::Ttrss => match &self.ttrss {
                Some(section) if !section.hostname.trim().is_empty() => {}
                Some(_) => return Err(ConfigError::Invalid("ttrss.hostname is empty".to_string())),
                None => {
                    return Err(ConfigError::Invalid(
                        "backend is \"ttrss\" but the [ttrss] section is missing".to_string(),
                    ))
                }
            },
            BackendKind::Miniflux => match &self.miniflux {
                Some(section) if !section.hostname.trim().is_empty() => {}
                Some(_) => {
                    return Err(ConfigError::Invalid("miniflux.hostname is empty".to_string()))
                }
                None => {
                    return Err(ConfigError::Invalid(
                        "backend is \"miniflux\" but the [miniflux] section is missing"
                            .to_string(),
                    ))
                }
            },
        }

        if SimilarityMethod::from_name(&self.dedup.method).is_none() {
            tracing::warn!(
                method = %self.dedup.method,
                "Unknown similarity method, token_sort will be used"
            );
        }

        Ok(())
    }

    /// Checkpoint file location: `state_file` if set, else next to the config file.
    pub fn state_path(&self, config_path: &Path) -> PathBuf {
        match &self.state_file {
            Some(path) => path.clone(),
            None => config_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("checkpoint"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
