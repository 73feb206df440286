//! Process configuration loaded from `keyword-pulse.toml` and the environment.

pub mod profiles;
pub mod tokens;

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use url::Url;

pub use profiles::{FetchProfile, Profiles};
pub use tokens::TokenDomain;

/// Optional file layered beneath the environment.
pub const CONFIG_FILE: &str = "keyword-pulse.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no bearer token for {domain}: set {domain_key} or the shared {shared_key}")]
    MissingToken {
        domain: TokenDomain,
        domain_key: &'static str,
        shared_key: &'static str,
    },
    #[error("{key} is not a valid URL ('{value}')")]
    InvalidUrl {
        key: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(
        default = "default_shutdown_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub shutdown_timeout: Duration,

    /// Upstream search endpoint that count queries are POSTed to.
    pub search_api_url: String,
    /// Shared bearer token used when no domain-specific token is set.
    pub api_token: Option<String>,
    pub search_api_token: Option<String>,
    pub bulk_api_token: Option<String>,
    pub vuln_api_token: Option<String>,
    /// Fixed structural filter added to every count query.
    pub search_record_type: Option<String>,

    pub vuln_api_url: Option<String>,
    #[serde(default = "default_vuln_page_size")]
    pub vuln_page_size: u32,
    pub stix_generator_url: Option<String>,

    #[serde(
        default = "default_upstream_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub upstream_timeout: Duration,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(
        default = "default_weekly_pacing",
        deserialize_with = "deserialize_duration"
    )]
    pub weekly_pacing: Duration,
    #[serde(
        default = "default_report_pacing",
        deserialize_with = "deserialize_duration"
    )]
    pub report_pacing: Duration,
    #[serde(
        default = "default_bulk_pacing",
        deserialize_with = "deserialize_duration"
    )]
    pub bulk_pacing: Duration,
    #[serde(
        default = "default_bulk_budget",
        deserialize_with = "deserialize_duration"
    )]
    pub bulk_budget: Duration,
    #[serde(
        default = "default_weekly_budget",
        deserialize_with = "deserialize_duration"
    )]
    pub weekly_budget: Duration,
    #[serde(
        default = "default_report_budget",
        deserialize_with = "deserialize_duration"
    )]
    pub report_budget: Duration,
    #[serde(default = "default_max_bulk_terms")]
    pub max_bulk_terms: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(8)
}

fn default_vuln_page_size() -> u32 {
    500
}

fn default_upstream_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_weekly_pacing() -> Duration {
    Duration::from_millis(100)
}

fn default_report_pacing() -> Duration {
    Duration::from_millis(250)
}

fn default_bulk_pacing() -> Duration {
    Duration::from_millis(500)
}

fn default_bulk_budget() -> Duration {
    Duration::from_secs(280)
}

fn default_weekly_budget() -> Duration {
    Duration::from_secs(45)
}

fn default_report_budget() -> Duration {
    Duration::from_secs(280)
}

fn default_max_bulk_terms() -> usize {
    200
}

impl Config {
    /// File first, environment on top.
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::raw())
    }

    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    pub fn search_url(&self) -> Result<Url, ConfigError> {
        parse_url("SEARCH_API_URL", &self.search_api_url)
    }

    pub fn vuln_url(&self) -> Option<Result<Url, ConfigError>> {
        non_empty(self.vuln_api_url.as_deref()).map(|v| parse_url("VULN_API_URL", v))
    }

    pub fn generator_url(&self) -> Option<Result<Url, ConfigError>> {
        non_empty(self.stix_generator_url.as_deref()).map(|v| parse_url("STIX_GENERATOR_URL", v))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_url(key: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value.trim()).map_err(|source| ConfigError::InvalidUrl {
        key,
        value: value.to_string(),
        source,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DurationValue {
    Seconds(u64),
    Text(String),
}

/// Accepts integer seconds or a unit-suffixed string such as `250ms` or `1.5s`.
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match DurationValue::deserialize(deserializer)? {
        DurationValue::Seconds(secs) => Ok(Duration::from_secs(secs)),
        DurationValue::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let parser = fundu::DurationParser::with_all_time_units();
    let parsed = parser
        .parse(text.trim())
        .map_err(|e| format!("invalid duration '{text}': {e}"))?;
    Duration::try_from(parsed).map_err(|e| format!("invalid duration '{text}': {e}"))
}
