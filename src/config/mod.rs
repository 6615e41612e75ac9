//! Configuration module for the CarMart backend.
//!
//! Configuration is loaded from environment variables. Paths and tunables have
//! defaults; credentials never do, and startup fails when the API key is absent.

use std::env;
use std::fmt::Display;
use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::path::PathBuf;

use thiserror::Error;

/// Upload links and sessions live between an hour and a year.
const TTL_HOURS: RangeInclusive<i64> = 1..=24 * 365;
/// Largest accepted loan document, decoded.
const DOCUMENT_BYTES: RangeInclusive<usize> = 1..=50 * 1024 * 1024;

/// Configuration errors that abort startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
    #[error("{0} and {1} must be set together")]
    Incomplete(&'static str, &'static str),
}

/// Credentials for the payment gateway.
#[derive(Debug, Clone)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: String,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Key for the function endpoints and session issuance
    pub api_key: String,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Path to Tantivy listing index directory
    pub index_path: PathBuf,
    /// Root directory for uploaded loan documents
    pub document_dir: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Public URL of the web app, used to build upload links
    pub public_url: String,
    /// Payment gateway credentials; order creation is disabled without them
    pub razorpay: Option<RazorpayConfig>,
    /// Base URL of the reverse geocoding service
    pub geocoder_url: String,
    pub upload_link_ttl_hours: i64,
    pub session_ttl_hours: i64,
    pub max_document_bytes: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = non_empty("CARMART_API_KEY").ok_or(ConfigError::Missing("CARMART_API_KEY"))?;

        let db_path = non_empty("CARMART_DB_PATH")
            .unwrap_or_else(|| "./data/carmart.sqlite".to_string())
            .into();

        let index_path = non_empty("CARMART_INDEX_PATH")
            .unwrap_or_else(|| "./data/index".to_string())
            .into();

        let document_dir = non_empty("CARMART_DOCUMENT_DIR")
            .unwrap_or_else(|| "./data/documents".to_string())
            .into();

        let raw_addr =
            non_empty("CARMART_BIND_ADDR").unwrap_or_else(|| "127.0.0.1:8080".to_string());
        let bind_addr = raw_addr.parse().map_err(|_| ConfigError::Invalid {
            key: "CARMART_BIND_ADDR",
            value: raw_addr.clone(),
        })?;

        let log_level = non_empty("CARMART_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let public_url = non_empty("CARMART_PUBLIC_URL")
            .unwrap_or_else(|| "http://localhost:5173".to_string())
            .trim_end_matches('/')
            .to_string();

        let razorpay = match (
            non_empty("CARMART_RAZORPAY_KEY_ID"),
            non_empty("CARMART_RAZORPAY_KEY_SECRET"),
        ) {
            (Some(key_id), Some(key_secret)) => Some(RazorpayConfig { key_id, key_secret }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Incomplete(
                    "CARMART_RAZORPAY_KEY_ID",
                    "CARMART_RAZORPAY_KEY_SECRET",
                ))
            }
        };

        let geocoder_url = non_empty("CARMART_GEOCODER_URL")
            .unwrap_or_else(|| "https://nominatim.openstreetmap.org".to_string())
            .trim_end_matches('/')
            .to_string();

        let upload_link_ttl_hours =
            parse_number(&non_empty, "CARMART_UPLOAD_LINK_TTL_HOURS", 72, TTL_HOURS)?;
        let session_ttl_hours =
            parse_number(&non_empty, "CARMART_SESSION_TTL_HOURS", 168, TTL_HOURS)?;
        let max_document_bytes = parse_number(
            &non_empty,
            "CARMART_MAX_DOCUMENT_BYTES",
            5 * 1024 * 1024,
            DOCUMENT_BYTES,
        )?;

        Ok(Self {
            api_key,
            db_path,
            index_path,
            document_dir,
            bind_addr,
            log_level,
            public_url,
            razorpay,
            geocoder_url,
            upload_link_ttl_hours,
            session_ttl_hours,
            max_document_bytes,
        })
    }
}

/// Parse a numeric setting, rejecting values outside `range`.
fn parse_number<T, F>(
    lookup: &F,
    key: &'static str,
    default: T,
    range: RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    let value: T = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value: raw.clone() })?;
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            key,
            value: format!("{} (allowed {}..={})", value, range.start(), range.end()),
        })
    }
}
