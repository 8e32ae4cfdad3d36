#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! File + environment configuration for the pipeline CLI.
//!
//! Config lives in `.spt/config.toml` as flat `key = "value"` lines with
//! `${VAR:-default}` expansion; every knob also has an `SPT_*` environment
//! fallback so a bare shell can run without a config file.

use std::path::PathBuf;
use std::time::Duration;

use spt::recovery::RetrySettings;
use spt::router::RouterConfig;
use spt::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollaboratorCommands {
    pub reasoning: String,
    pub property_registry: String,
    pub zoning_source: String,
    pub renderer: String,
}

impl Default for CollaboratorCommands {
    fn default() -> Self {
        Self {
            reasoning: "spt-reasoning --tier {tier}".to_string(),
            property_registry: "spt-registry lookup {key}".to_string(),
            zoning_source: "spt-zoning fetch {key}".to_string(),
            renderer: "spt-render {key}".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub router: RouterConfig,
    pub retry: RetrySettings,
    pub run_timeout: Duration,
    pub lease_ttl_ms: i64,
    pub commands: CollaboratorCommands,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            router: RouterConfig::default(),
            retry: RetrySettings::default(),
            run_timeout: Duration::from_secs(900),
            lease_ttl_ms: 600_000,
            commands: CollaboratorCommands::default(),
        }
    }
}

pub async fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let config_path = path.unwrap_or_else(|| PathBuf::from(".spt/config.toml"));
    let mut config = if config_path.exists() {
        let content = tokio::fs::read_to_string(&config_path)
            .await
            .map_err(|e| PipelineError::ConfigError(format!("Failed to read config: {e}")))?;
        parse_config_content(&content)?
    } else {
        Config::default()
    };

    apply_env_overrides(&mut config)?;
    Ok(config)
}

pub fn parse_config_content(content: &str) -> Result<Config> {
    let mut config = Config::default();

    for line in content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
    {
        if let Some(value) = parse_key_value(line, "database_url") {
            config.database_url = Some(expand_env_vars(value));
        }
        if let Some(value) = parse_key_value(line, "free_tier_ceiling") {
            config.router.cheap_ceiling = parse_number(value, "free_tier_ceiling")?;
        }
        if let Some(value) = parse_key_value(line, "routing_window") {
            config.router.window = parse_number(value, "routing_window")?;
        }
        if let Some(value) = parse_key_value(line, "max_attempts") {
            config.retry.max_attempts = parse_number(value, "max_attempts")?;
        }
        if let Some(value) = parse_key_value(line, "base_backoff_ms") {
            config.retry.base_backoff_ms = parse_number(value, "base_backoff_ms")?;
        }
        if let Some(value) = parse_key_value(line, "max_backoff_ms") {
            config.retry.max_backoff_ms = parse_number(value, "max_backoff_ms")?;
        }
        if let Some(value) = parse_key_value(line, "run_timeout_secs") {
            config.run_timeout = Duration::from_secs(parse_number(value, "run_timeout_secs")?);
        }
        if let Some(value) = parse_key_value(line, "lease_ttl_ms") {
            config.lease_ttl_ms = parse_number(value, "lease_ttl_ms")?;
        }
        if let Some(value) = parse_key_value(line, "reasoning_cmd") {
            config.commands.reasoning = expand_env_vars(value);
        }
        if let Some(value) = parse_key_value(line, "property_registry_cmd") {
            config.commands.property_registry = expand_env_vars(value);
        }
        if let Some(value) = parse_key_value(line, "zoning_source_cmd") {
            config.commands.zoning_source = expand_env_vars(value);
        }
        if let Some(value) = parse_key_value(line, "renderer_cmd") {
            config.commands.renderer = expand_env_vars(value);
        }
    }

    Ok(config)
}

fn apply_env_overrides(config: &mut Config) -> Result<()> {
    if let Some(url) = non_empty_env_var("DATABASE_URL").or_else(|| non_empty_env_var("SPT_DATABASE_URL"))
    {
        config.database_url = Some(url);
    }
    if let Some(value) = non_empty_env_var("SPT_FREE_TIER_CEILING") {
        config.router.cheap_ceiling = parse_number(&value, "SPT_FREE_TIER_CEILING")?;
    }
    if let Some(value) = non_empty_env_var("SPT_ROUTING_WINDOW") {
        config.router.window = parse_number(&value, "SPT_ROUTING_WINDOW")?;
    }
    if let Some(value) = non_empty_env_var("SPT_MAX_ATTEMPTS") {
        config.retry.max_attempts = parse_number(&value, "SPT_MAX_ATTEMPTS")?;
    }
    if let Some(value) = non_empty_env_var("SPT_RUN_TIMEOUT_SECS") {
        config.run_timeout = Duration::from_secs(parse_number(&value, "SPT_RUN_TIMEOUT_SECS")?);
    }
    if let Some(value) = non_empty_env_var("SPT_LEASE_TTL_MS") {
        config.lease_ttl_ms = parse_number(&value, "SPT_LEASE_TTL_MS")?;
    }
    if let Some(value) = non_empty_env_var("SPT_REASONING_CMD") {
        config.commands.reasoning = value;
    }
    if let Some(value) = non_empty_env_var("SPT_PROPERTY_REGISTRY_CMD") {
        config.commands.property_registry = value;
    }
    if let Some(value) = non_empty_env_var("SPT_ZONING_SOURCE_CMD") {
        config.commands.zoning_source = value;
    }
    if let Some(value) = non_empty_env_var("SPT_RENDERER_CMD") {
        config.commands.renderer = value;
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr>(value: &str, key: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| PipelineError::ConfigError(format!("invalid value for {key}: {value}")))
}

fn expand_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_part = &result[start + 2..start + end];
            let (var_name, default) = var_part.split_once(":-").unwrap_or((var_part, ""));
            let value = std::env::var(var_name).unwrap_or_else(|_| default.to_string());
            result.replace_range(start..=(start + end), &value);
        } else {
            break;
        }
    }
    result
}

pub fn parse_key_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    line.split_once('=')
        .and_then(|(lhs, rhs)| (lhs.trim() == key).then_some(rhs.trim().trim_matches('"')))
}

fn non_empty_env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
