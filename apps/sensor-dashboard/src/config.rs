use anyhow::{anyhow, bail, Context, Result};
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::query::{Bucket, MAX_LOOKBACK_DAYS};

const DEFAULT_INFLUXDB_URL: &str = "https://us-east-1-1.aws.cloud2.influxdata.com";
const DEFAULT_INFLUXDB_BUCKET: &str = "EXTREME_MANUFACTURING";
const DEFAULT_HTTP_BIND: &str = "127.0.0.1:8501";
const DEFAULT_LOOKBACK_DAYS: u64 = 3;

#[derive(Debug, Clone)]
pub struct Config {
    pub influx_url: String,
    pub influx_token: String,
    pub influx_org: String,
    pub influx_bucket: Bucket,
    pub influx_timeout: Option<Duration>,

    pub http_bind: String,

    pub default_lookback_days: u32,
    pub max_lookback_days: u32,
}

/// Optional JSON file with store coordinates. Environment variables win.
#[derive(Debug, Clone, Default, Deserialize)]
struct SetupConfigOverrides {
    #[serde(default)]
    influxdb_url: Option<String>,
    #[serde(default)]
    influxdb_org: Option<String>,
    #[serde(default)]
    influxdb_bucket: Option<String>,
}

fn load_setup_config_overrides(path: &Path) -> Option<SetupConfigOverrides> {
    if !path.exists() {
        return None;
    }
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to read setup config; using env defaults"
            );
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to parse setup config; using env defaults"
            );
            None
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let overrides = env_optional("DASHBOARD_SETUP_CONFIG_PATH")
            .map(PathBuf::from)
            .and_then(|path| load_setup_config_overrides(&path))
            .unwrap_or_default();

        let influx_url = env_optional("INFLUXDB_URL")
            .or_else(|| non_empty(overrides.influxdb_url.as_deref()))
            .unwrap_or_else(|| DEFAULT_INFLUXDB_URL.to_string());
        let parsed = Url::parse(&influx_url).context("invalid INFLUXDB_URL")?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!("INFLUXDB_URL must be http or https, got {}", parsed.scheme());
        }

        let influx_token = env_optional("INFLUXDB_TOKEN")
            .ok_or_else(|| anyhow!("missing env var INFLUXDB_TOKEN"))?;
        let influx_org = env_optional("INFLUXDB_ORG")
            .or_else(|| non_empty(overrides.influxdb_org.as_deref()))
            .ok_or_else(|| anyhow!("missing env var INFLUXDB_ORG"))?;

        let bucket_name = env_optional("INFLUXDB_BUCKET")
            .or_else(|| non_empty(overrides.influxdb_bucket.as_deref()))
            .unwrap_or_else(|| DEFAULT_INFLUXDB_BUCKET.to_string());
        let influx_bucket = Bucket::new(bucket_name).context("invalid INFLUXDB_BUCKET")?;

        let influx_timeout = match env_optional("INFLUXDB_TIMEOUT_SECONDS") {
            Some(raw) => {
                let secs = raw
                    .parse::<u64>()
                    .context("invalid INFLUXDB_TIMEOUT_SECONDS")?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            None => None,
        };

        let http_bind = env_string("DASHBOARD_HTTP_BIND", Some(DEFAULT_HTTP_BIND.to_string()))?;

        let max_lookback_days =
            env_u64("DASHBOARD_MAX_LOOKBACK_DAYS", Some(u64::from(MAX_LOOKBACK_DAYS)))?;
        let default_lookback_days =
            env_u64("DASHBOARD_DEFAULT_LOOKBACK_DAYS", Some(DEFAULT_LOOKBACK_DAYS))?;
        let (default_lookback_days, max_lookback_days) =
            check_lookback_bounds(default_lookback_days, max_lookback_days)?;

        Ok(Self {
            influx_url,
            influx_token,
            influx_org,
            influx_bucket,
            influx_timeout,
            http_bind,
            default_lookback_days,
            max_lookback_days,
        })
    }
}

fn check_lookback_bounds(default: u64, max: u64) -> Result<(u32, u32)> {
    let max = u32::try_from(max).context("DASHBOARD_MAX_LOOKBACK_DAYS out of range")?;
    let default =
        u32::try_from(default).context("DASHBOARD_DEFAULT_LOOKBACK_DAYS out of range")?;
    if max == 0 {
        bail!("DASHBOARD_MAX_LOOKBACK_DAYS must be at least 1");
    }
    if default == 0 || default > max {
        bail!("DASHBOARD_DEFAULT_LOOKBACK_DAYS must be between 1 and {max}, got {default}");
    }
    Ok((default, max))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn env_string(key: &str, default: Option<String>) -> Result<String> {
    match env::var(key) {
        Ok(value) => Ok(value.trim().to_string()),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

fn env_u64(key: &str, default: Option<u64>) -> Result<u64> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .with_context(|| format!("invalid {key}")),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
