use std::path::PathBuf;
use std::{env, io};

use secrecy::SecretString;
use serde::Serialize;
use tracing::debug;

pub const DEFAULT_GEOCODE_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/geocode/json";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GEOCODE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_address: String,
    pub port: u16,
    pub max_body_bytes: usize,
    pub geocode_endpoint: String,
    pub geocode_timeout_secs: u64,
    pub database_dir: PathBuf,
    pub database_file_name: String,
    pub google_api_key: Option<SecretString>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublicAppConfig {
    pub bind_address: String,
    pub port: u16,
    pub max_body_bytes: usize,
    pub geocode_endpoint: String,
    pub geocode_timeout_secs: u64,
    pub database_dir: String,
    pub database_file_name: String,
    pub has_google_api_key: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        Self {
            bind_address: env::var("BIND_ADDRESS")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_u16("PORT", DEFAULT_PORT),
            max_body_bytes: parse_usize("MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES).max(1),
            geocode_endpoint: env::var("GEOCODE_ENDPOINT")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_GEOCODE_ENDPOINT.to_string()),
            geocode_timeout_secs: parse_u64("GEOCODE_TIMEOUT_SECS", DEFAULT_GEOCODE_TIMEOUT_SECS),
            database_dir: env::var("DATABASE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
            database_file_name: env::var("DATABASE_FILE_NAME")
                .unwrap_or_else(|_| "validated-addresses.db".to_string()),
            google_api_key: env::var("GOOGLE_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from),
        }
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn public_profile(&self) -> PublicAppConfig {
        PublicAppConfig {
            bind_address: self.bind_address.clone(),
            port: self.port,
            max_body_bytes: self.max_body_bytes,
            geocode_endpoint: self.geocode_endpoint.clone(),
            geocode_timeout_secs: self.geocode_timeout_secs,
            database_dir: self.database_dir.to_string_lossy().to_string(),
            database_file_name: self.database_file_name.clone(),
            has_google_api_key: self.google_api_key.is_some(),
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

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn parse_u16(key: &str, default: u16) -> u16 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u16>().ok())
        .unwrap_or(default)
}
