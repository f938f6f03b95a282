//! Configuration layer: typed settings with layered precedence (file → env).

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Args, Parser, Subcommand};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "spurgo";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 4;
const DEFAULT_PROVIDER_ENDPOINT: &str = "https://cloudfront.amazonaws.com";
const DEFAULT_REFERENCE_PREFIX: &str = "spurgo";

/// Command-line arguments for the spurgo binary.
#[derive(Debug, Parser)]
#[command(
    name = "spurgo",
    version,
    about = "CDN cache invalidation for self-hosted publishing systems"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "SPURGO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Build and print the pending invalidation plan, one path per line.
    Plan,
    /// Submit the pending invalidations to the provider.
    Flush(FlushArgs),
    /// Resolve and persist the provider distribution details.
    Configure(ConfigureArgs),
}

#[derive(Debug, Args, Clone, Default)]
pub struct FlushArgs {
    /// Submit this operator-edited, line-delimited path list instead of a
    /// freshly built plan.
    #[arg(long = "paths", value_name = "FILE")]
    pub paths: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct ConfigureArgs {
    /// CloudFront distribution id the invalidations target.
    #[arg(long = "distribution", value_name = "ID")]
    pub distribution: String,
}

/// Fully-resolved deployment settings after precedence resolution and
/// validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub provider: ProviderSettings,
    pub expansion: ExpansionSettings,
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

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    /// Postgres URL of the host system exposing the `spurgo_content` view.
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// AWS access key id; supply via `SPURGO_PROVIDER__ACCESS_KEY_ID` in
    /// production rather than a file on disk.
    pub access_key_id: String,
    /// AWS secret access key; supply via
    /// `SPURGO_PROVIDER__SECRET_ACCESS_KEY`.
    pub secret_access_key: String,
    /// API endpoint; overridable for tests and API-compatible stand-ins.
    pub endpoint: String,
    /// Prefix of the idempotent caller reference attached to each batch.
    pub reference_prefix: String,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            access_key_id: String::new(),
            secret_access_key: String::new(),
            endpoint: DEFAULT_PROVIDER_ENDPOINT.to_string(),
            reference_prefix: DEFAULT_REFERENCE_PREFIX.to_string(),
        }
    }
}

/// Expansion rules declared in configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExpansionSettings {
    pub listings: Vec<ListingRuleSettings>,
    pub asset_trees: Vec<AssetTreeRuleSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListingRuleSettings {
    /// Content kinds the rule applies to.
    pub kinds: Vec<String>,
    /// Listing page path prefix, e.g. `/videos`.
    pub listing_root: String,
    /// Query parameter naming the embedded item.
    pub param: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetTreeRuleSettings {
    /// Content kind whose items carry an asset directory.
    pub kind: String,
    /// Directory holding one subdirectory per item slug.
    pub directory: PathBuf,
    /// Site root stripped from file paths to form URLs.
    pub site_root: PathBuf,
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

/// Parse CLI arguments and resolve settings.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let cli = CliArgs::parse();
    let settings = load(&cli)?;
    Ok((cli, settings))
}

/// Load settings using the configured precedence (file → environment).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("SPURGO").separator("__"));

    let raw: RawSettings = builder.build()?.try_deserialize()?;
    Settings::from_raw(raw)
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        Ok(Self {
            logging: build_logging_settings(raw.logging)?,
            database: build_database_settings(raw.database),
            provider: build_provider_settings(raw.provider),
            expansion: raw.expansion,
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

fn build_database_settings(database: RawDatabaseSettings) -> DatabaseSettings {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    DatabaseSettings {
        url,
        max_connections: database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS),
    }
}

fn build_provider_settings(provider: RawProviderSettings) -> ProviderSettings {
    let defaults = ProviderSettings::default();
    ProviderSettings {
        access_key_id: provider.access_key_id.unwrap_or_default(),
        secret_access_key: provider.secret_access_key.unwrap_or_default(),
        endpoint: non_blank(provider.endpoint).unwrap_or(defaults.endpoint),
        reference_prefix: non_blank(provider.reference_prefix).unwrap_or(defaults.reference_prefix),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|raw| {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    provider: RawProviderSettings,
    expansion: ExpansionSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawProviderSettings {
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    endpoint: Option<String>,
    reference_prefix: Option<String>,
}
