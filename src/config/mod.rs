//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroU32, path::PathBuf, str::FromStr};

use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::pricing::{DEFAULT_CURRENCY_SCALE, MAX_CURRENCY_SCALE};
use crate::cache::{CacheConfig, DEFAULT_NAMESPACE};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "vitrine";
const ENV_PREFIX: &str = "VITRINE";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_TIMEZONE: &str = "America/Sao_Paulo";

/// Command-line arguments for the vitrine binary.
#[derive(Debug, Parser)]
#[command(
    name = "vitrine",
    version,
    about = "Promotional price resolution and cache invalidation"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "VITRINE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Resolve the effective price of a variation and print it as JSON.
    Price {
        /// Variation identifier.
        #[arg(value_name = "VARIATION_ID")]
        variation_id: i64,
    },
    /// Run a mutation hook as if the entity had just been written.
    #[command(subcommand)]
    Invalidate(InvalidateTarget),
    /// Remove every cached entry under the configured namespace, in both tiers.
    #[command(name = "clear-cache")]
    ClearCache,
}

#[derive(Debug, Subcommand, Clone)]
pub enum InvalidateTarget {
    /// Invalidate whatever a promotion's target covers.
    Promotion {
        #[arg(value_name = "PROMOTION_ID")]
        id: i64,
    },
    /// Invalidate every price of a product.
    Product {
        #[arg(value_name = "PRODUCT_ID")]
        id: i64,
    },
}

#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL", global = true)]
    pub database_url: Option<String>,

    /// Override the Redis connection URL.
    #[arg(long = "redis-url", value_name = "URL", global = true)]
    pub redis_url: Option<String>,

    /// Override the cache key namespace.
    #[arg(long = "cache-namespace", value_name = "NAME", global = true)]
    pub cache_namespace: Option<String>,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub cache: CacheSettings,
    pub pricing: PricingSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enable_local_tier: bool,
    pub enable_remote_tier: bool,
    pub local_capacity: usize,
    pub local_ttl_secs: u64,
    pub remote_ttl_secs: u64,
    pub remote_timeout_ms: u64,
    pub namespace: String,
}

#[derive(Debug, Clone)]
pub struct PricingSettings {
    pub timezone: Tz,
    pub currency_scale: u32,
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
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Parse the process arguments and load settings from them.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    redis: RawRedisSettings,
    cache: RawCacheSettings,
    pricing: RawPricingSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.format = Some(if json { "json" } else { "compact" }.to_string());
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(url) = overrides.redis_url.as_ref() {
            self.redis.url = Some(url.clone());
        }
        if let Some(namespace) = overrides.cache_namespace.as_ref() {
            self.cache.namespace = Some(namespace.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            redis,
            cache,
            pricing,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            redis: build_redis_settings(redis),
            cache: build_cache_settings(cache)?,
            pricing: build_pricing_settings(pricing)?,
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

    let format = match logging.format.as_deref().map(str::trim) {
        None | Some("compact") => LogFormat::Compact,
        Some("json") => LogFormat::Json,
        Some(other) => {
            return Err(LoadError::invalid(
                "logging.format",
                format!("expected `compact` or `json`, got `{other}`"),
            ));
        }
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let max_connections = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);

    Ok(DatabaseSettings {
        url: non_blank(database.url),
        max_connections: NonZeroU32::new(max_connections).ok_or_else(|| {
            LoadError::invalid("database.max_connections", "must be greater than zero")
        })?,
    })
}

fn build_redis_settings(redis: RawRedisSettings) -> RedisSettings {
    RedisSettings {
        url: non_blank(redis.url),
    }
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let defaults = CacheConfig::default();

    let local_capacity = cache.local_capacity.unwrap_or(defaults.local_capacity);
    if local_capacity == 0 {
        return Err(LoadError::invalid(
            "cache.local_capacity",
            "must be greater than zero",
        ));
    }

    let local_ttl_secs = positive(
        cache.local_ttl_secs.unwrap_or(defaults.local_ttl_secs),
        "cache.local_ttl_secs",
    )?;
    let remote_ttl_secs = positive(
        cache.remote_ttl_secs.unwrap_or(defaults.remote_ttl_secs),
        "cache.remote_ttl_secs",
    )?;
    let remote_timeout_ms = positive(
        cache.remote_timeout_ms.unwrap_or(defaults.remote_timeout_ms),
        "cache.remote_timeout_ms",
    )?;

    let namespace = cache
        .namespace
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
    if namespace.is_empty() {
        return Err(LoadError::invalid(
            "cache.namespace",
            "namespace must not be empty",
        ));
    }
    if namespace.contains(char::is_whitespace) {
        return Err(LoadError::invalid(
            "cache.namespace",
            "namespace must not contain whitespace",
        ));
    }
    // `:` separates the namespace from the key, so `shop` would also own `shop:eu:*`.
    if namespace.contains(':') {
        return Err(LoadError::invalid(
            "cache.namespace",
            "namespace must not contain `:`",
        ));
    }

    Ok(CacheSettings {
        enable_local_tier: cache.enable_local_tier.unwrap_or(defaults.enable_local_tier),
        enable_remote_tier: cache
            .enable_remote_tier
            .unwrap_or(defaults.enable_remote_tier),
        local_capacity,
        local_ttl_secs,
        remote_ttl_secs,
        remote_timeout_ms,
        namespace,
    })
}

fn build_pricing_settings(pricing: RawPricingSettings) -> Result<PricingSettings, LoadError> {
    let name = pricing
        .timezone
        .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
    let timezone = Tz::from_str(name.trim()).map_err(|err| {
        LoadError::invalid("pricing.timezone", format!("unknown timezone `{name}`: {err}"))
    })?;

    let currency_scale = pricing.currency_scale.unwrap_or(DEFAULT_CURRENCY_SCALE);
    if currency_scale > MAX_CURRENCY_SCALE {
        return Err(LoadError::invalid(
            "pricing.currency_scale",
            format!("must be at most {MAX_CURRENCY_SCALE}"),
        ));
    }

    Ok(PricingSettings {
        timezone,
        currency_scale,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn positive(value: u64, key: &'static str) -> Result<u64, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(value)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    format: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRedisSettings {
    url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enable_local_tier: Option<bool>,
    enable_remote_tier: Option<bool>,
    local_capacity: Option<usize>,
    local_ttl_secs: Option<u64>,
    remote_ttl_secs: Option<u64>,
    remote_timeout_ms: Option<u64>,
    namespace: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPricingSettings {
    timezone: Option<String>,
    currency_scale: Option<u32>,
}
