use std::{env, io};

use secrecy::SecretString;
use serde::Serialize;
use tracing::debug;

pub const DEFAULT_GEOCODE_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/geocode/json";
const DEFAULT_TELEMETRY_BUFFER_MAX_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub store_api_base: Option<String>,
    pub store_consumer_key: Option<SecretString>,
    pub store_consumer_secret: Option<SecretString>,
    pub google_api_key: Option<SecretString>,
    pub google_geocode_endpoint: String,
    pub http_timeout_secs: u64,
    pub default_per_page: u32,
    pub telemetry_enabled_by_default: bool,
    pub telemetry_batch_size: usize,
    pub telemetry_buffer_max_bytes: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublicAppConfig {
    pub store_api_base: Option<String>,
    pub google_geocode_endpoint: String,
    pub http_timeout_secs: u64,
    pub default_per_page: u32,
    pub telemetry_enabled_by_default: bool,
    pub telemetry_batch_size: usize,
    pub telemetry_buffer_max_bytes: u64,
    pub has_store_credentials: bool,
    pub has_google_api_key: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        Self {
            store_api_base: non_blank("STORE_API_BASE"),
            store_consumer_key: non_blank("STORE_CONSUMER_KEY").map(SecretString::from),
            store_consumer_secret: non_blank("STORE_CONSUMER_SECRET").map(SecretString::from),
            google_api_key: non_blank("GOOGLE_API_KEY").map(SecretString::from),
            google_geocode_endpoint: non_blank("GOOGLE_GEOCODE_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_GEOCODE_ENDPOINT.to_string()),
            http_timeout_secs: parse_u64("HTTP_TIMEOUT_SECS", 10).max(1),
            default_per_page: parse_u32("DEFAULT_PER_PAGE", 4).max(1),
            telemetry_enabled_by_default: parse_bool("TELEMETRY_ENABLED", true),
            telemetry_batch_size: parse_usize("TELEMETRY_BATCH_SIZE", 25).max(1),
            telemetry_buffer_max_bytes: parse_u64(
                "TELEMETRY_BUFFER_MAX_BYTES",
                DEFAULT_TELEMETRY_BUFFER_MAX_BYTES,
            ),
        }
    }

    pub fn public_profile(&self) -> PublicAppConfig {
        PublicAppConfig {
            store_api_base: self.store_api_base.clone(),
            google_geocode_endpoint: self.google_geocode_endpoint.clone(),
            http_timeout_secs: self.http_timeout_secs,
            default_per_page: self.default_per_page,
            telemetry_enabled_by_default: self.telemetry_enabled_by_default,
            telemetry_batch_size: self.telemetry_batch_size,
            telemetry_buffer_max_bytes: self.telemetry_buffer_max_bytes,
            has_store_credentials: self.store_consumer_key.is_some()
                && self.store_consumer_secret.is_some(),
            has_google_api_key: self.google_api_key.is_some(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_api_base: None,
            store_consumer_key: None,
            store_consumer_secret: None,
            google_api_key: None,
            google_geocode_endpoint: DEFAULT_GEOCODE_ENDPOINT.to_string(),
            http_timeout_secs: 10,
            default_per_page: 4,
            telemetry_enabled_by_default: true,
            telemetry_batch_size: 25,
            telemetry_buffer_max_bytes: DEFAULT_TELEMETRY_BUFFER_MAX_BYTES,
        }
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn non_blank(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}
