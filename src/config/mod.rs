mod file_config;

pub use file_config::{ExtractorConfig, FileConfig, StagingConfig};

use crate::server::RequestsLoggingLevel;
use anyhow::{anyhow, bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub database_url: Option<String>,
    pub session_secret: Option<String>,
    pub staging_dir: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub content_cache_age_sec: usize,
    pub frontend_dir_path: Option<String>,
    pub staging_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub sweep_on_convert: bool,
    pub yt_dlp_path: String,
    pub extraction_timeout_secs: u64,
}

/// Secret value that never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionSecret(String);

impl SessionSecret {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SessionSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionSecret(***)")
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Required settings
    pub database_path: PathBuf,
    pub session_secret: SessionSecret,

    // Core settings
    pub staging_dir: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub content_cache_age_sec: usize,
    pub frontend_dir_path: Option<String>,

    // Feature configs
    pub staging: StagingSettings,
    pub extractor: ExtractorSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingSettings {
    pub ttl: Duration,
    pub sweep_interval: Duration,
    pub sweep_on_convert: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorSettings {
    pub yt_dlp_path: String,
    pub timeout: Duration,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let database_url = file
            .database_url
            .or_else(|| cli.database_url.clone())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                anyhow!("DATABASE_URL must be specified via --database-url, the environment or the config file")
            })?;
        let database_path = parse_database_url(&database_url)?;
        if let Some(parent) = database_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                bail!("Database directory does not exist: {:?}", parent);
            }
        }

        let session_secret = file
            .session_secret
            .or_else(|| cli.session_secret.clone())
            .filter(|s| !s.is_empty())
            .map(SessionSecret)
            .ok_or_else(|| {
                anyhow!("SESSION_SECRET must be specified via --session-secret, the environment or the config file")
            })?;

        let staging_dir = file
            .staging_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| cli.staging_dir.clone());
        if staging_dir.exists() && !staging_dir.is_dir() {
            bail!("staging_dir is not a directory: {:?}", staging_dir);
        }

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let content_cache_age_sec = file
            .content_cache_age_sec
            .unwrap_or(cli.content_cache_age_sec);
        let frontend_dir_path = file
            .frontend_dir_path
            .or_else(|| cli.frontend_dir_path.clone());

        let staging_file = file.staging.unwrap_or_default();
        let staging = StagingSettings {
            ttl: Duration::from_secs(staging_file.ttl_secs.unwrap_or(cli.staging_ttl_secs)),
            sweep_interval: Duration::from_secs(
                staging_file
                    .sweep_interval_secs
                    .unwrap_or(cli.sweep_interval_secs),
            ),
            sweep_on_convert: staging_file
                .sweep_on_convert
                .unwrap_or(cli.sweep_on_convert),
        };
        if staging.ttl.is_zero() {
            bail!("Staging TTL must be greater than zero");
        }
        if staging.sweep_interval.is_zero() {
            bail!("Sweep interval must be greater than zero");
        }

        let extractor_file = file.extractor.unwrap_or_default();
        let extractor = ExtractorSettings {
            yt_dlp_path: extractor_file
                .yt_dlp_path
                .unwrap_or_else(|| cli.yt_dlp_path.clone()),
            timeout: Duration::from_secs(
                extractor_file
                    .timeout_secs
                    .unwrap_or(cli.extraction_timeout_secs),
            ),
        };
        if extractor.timeout.is_zero() {
            bail!("Extraction timeout must be greater than zero");
        }

        Ok(Self {
            database_path,
            session_secret,
            staging_dir,
            port,
            metrics_port,
            logging_level,
            content_cache_age_sec,
            frontend_dir_path,
            staging,
            extractor,
        })
    }
}

/// Accepts a plain path or a `sqlite:` URL.
fn parse_database_url(url: &str) -> Result<PathBuf> {
    let url = url.trim();
    let path = if let Some(rest) = url.strip_prefix("sqlite://") {
        rest
    } else if let Some(rest) = url.strip_prefix("sqlite:") {
        rest
    } else if url.contains("://") {
        bail!("Unsupported DATABASE_URL scheme, only SQLite is supported: {}", url);
    } else {
        url
    };
    let path = path.split('?').next().unwrap_or_default();
    if path.is_empty() {
        bail!("DATABASE_URL does not contain a database path");
    }
    Ok(PathBuf::from(path))
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
