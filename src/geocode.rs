use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::address::{CanonicalKey, Coordinates};
use crate::config::AppConfig;
use crate::errors::{AppError, AppResult, ValidationError};

const STATUS_OK: &str = "OK";
const STATUS_ZERO_RESULTS: &str = "ZERO_RESULTS";

/// Resolves a canonical address key to coordinates.
///
/// Every failure, including an empty result set, is reported as
/// [`ValidationError::GeocodeProvider`].
#[async_trait]
pub trait GeocodeClient: Send + Sync {
    async fn resolve(&self, key: &CanonicalKey) -> Result<Coordinates, ValidationError>;
}

pub struct GoogleGeocodeClient {
    http: reqwest::Client,
    endpoint: Url,
    api_key: Option<SecretString>,
}

impl GoogleGeocodeClient {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("address-validator/", env!("CARGO_PKG_VERSION")));
        if config.geocode_timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.geocode_timeout_secs));
        }
        let endpoint = Url::parse(&config.geocode_endpoint)
            .map_err(|err| AppError::Config(format!("invalid geocode endpoint: {err}")))?;
        if config.google_api_key.is_none() {
            warn!(
                target: "geocode",
                "GOOGLE_API_KEY is not set; address lookups will fail"
            );
        }

        Ok(Self {
            http: builder.build()?,
            endpoint,
            api_key: config.google_api_key.clone(),
        })
    }

    async fn fetch(&self, key: &CanonicalKey) -> AppResult<GeocodeResponse> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| AppError::Config("missing Google API key".into()))?;

        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("address", key.as_str())
            .append_pair("key", api_key.expose_secret());

        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl GeocodeClient for GoogleGeocodeClient {
    async fn resolve(&self, key: &CanonicalKey) -> Result<Coordinates, ValidationError> {
        let response = self.fetch(key).await.map_err(|err| {
            warn!(target: "geocode", %key, error = %err, "geocode request failed");
            ValidationError::provider(err.to_string())
        })?;

        match response.status.as_str() {
            STATUS_OK => {
                let first = response.results.into_iter().next().ok_or_else(|| {
                    ValidationError::provider("geocode response contained no results")
                })?;
                debug!(target: "geocode", %key, "geocode resolved");
                Ok(Coordinates {
                    lat: first.geometry.location.lat,
                    lng: first.geometry.location.lng,
                })
            }
            STATUS_ZERO_RESULTS => {
                debug!(target: "geocode", %key, "geocode returned zero results");
                Err(ValidationError::provider(STATUS_ZERO_RESULTS))
            }
            other => {
                warn!(
                    target: "geocode",
                    %key,
                    status = other,
                    detail = response.error_message.as_deref().unwrap_or_default(),
                    "geocode provider rejected request"
                );
                Err(ValidationError::provider(other))
            }
        }
    }
}

#[derive(Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct GeocodeResult {
    geometry: GeocodeGeometry,
}

#[derive(Deserialize)]
struct GeocodeGeometry {
    location: Coordinates,
}
