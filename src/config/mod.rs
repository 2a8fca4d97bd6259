//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::str::FromStr;

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::domain::spaces::MAX_SPACE_DEPTH;

mod cli;

pub use cli::{
    AuditArgs, CliArgs, Command, MovePostArgs, MoveSpaceArgs, RuntimeOverrides, TreeArgs,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "canopy";
const ENV_PREFIX: &str = "CANOPY";
const DEFAULT_CACHE_INITIAL_CAPACITY: usize = 256;
const MAX_CONFIGURABLE_DEPTH: u8 = 8;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub spaces: SpaceSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone, Copy)]
pub struct SpaceSettings {
    /// Number of nesting levels a space forest may have.
    pub max_depth: u8,
}

#[derive(Debug, Clone, Copy)]
pub struct CacheSettings {
    pub initial_capacity: usize,
    pub audit_on_load: bool,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(cli.overrides());

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    spaces: RawSpaceSettings,
    cache: RawCacheSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSpaceSettings {
    max_depth: Option<u8>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    initial_capacity: Option<usize>,
    audit_on_load: Option<bool>,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &RuntimeOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(depth) = overrides.spaces_max_depth {
            self.spaces.max_depth = Some(depth);
        }
        if let Some(audit) = overrides.cache_audit_on_load {
            self.cache.audit_on_load = Some(audit);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            spaces,
            cache,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            spaces: build_space_settings(spaces)?,
            cache: build_cache_settings(cache),
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_space_settings(spaces: RawSpaceSettings) -> Result<SpaceSettings, LoadError> {
    let max_depth = spaces.max_depth.unwrap_or(MAX_SPACE_DEPTH);
    if !(1..=MAX_CONFIGURABLE_DEPTH).contains(&max_depth) {
        return Err(LoadError::invalid(
            "spaces.max_depth",
            format!("must be between 1 and {MAX_CONFIGURABLE_DEPTH}"),
        ));
    }

    Ok(SpaceSettings { max_depth })
}

fn build_cache_settings(cache: RawCacheSettings) -> CacheSettings {
    CacheSettings {
        initial_capacity: cache
            .initial_capacity
            .unwrap_or(DEFAULT_CACHE_INITIAL_CAPACITY),
        audit_on_load: cache.audit_on_load.unwrap_or(true),
    }
}
