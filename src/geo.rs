use std::time::Duration;

use reqwest::{Client, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};

const STATUS_OK: &str = "OK";
const STATUS_ZERO_RESULTS: &str = "ZERO_RESULTS";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoResult {
    pub latitude: f64,
    pub longitude: f64,
    pub formatted_address: String,
}

#[derive(Clone)]
pub struct GeocodingClient {
    http: Client,
    endpoint: Url,
    api_key: SecretString,
}

impl GeocodingClient {
    pub fn maybe_new(config: &AppConfig) -> AppResult<Option<Self>> {
        let Some(api_key) = config.google_api_key.clone() else {
            return Ok(None);
        };

        let endpoint = Url::parse(&config.google_geocode_endpoint)
            .map_err(|err| AppError::Config(format!("invalid geocoding endpoint: {err}")))?;
        let http = Client::builder()
            .user_agent("category-feed/0.1.0")
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;

        Ok(Some(Self {
            http,
            endpoint,
            api_key,
        }))
    }

    /// Looks up the address at the given coordinates. `Ok(None)` means the
    /// API answered but had no address for them.
    pub async fn reverse_geocode(&self, lat: f64, lng: f64) -> AppResult<Option<GeoResult>> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("latlng", &format!("{lat},{lng}"))
            .append_pair("key", self.api_key.expose_secret());

        // reqwest errors embed the request URL, which carries the key.
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| AppError::Http(err.without_url()))?;
        let body: GeocodeResponse = response
            .json()
            .await
            .map_err(|err| AppError::Http(err.without_url()))?;

        let status = body.status.as_deref().unwrap_or(STATUS_OK);
        match status {
            STATUS_OK => {}
            STATUS_ZERO_RESULTS => {
                debug!(lat, lng, "geocoding returned no results");
                return Ok(None);
            }
            other => {
                let message = body
                    .error_message
                    .unwrap_or_else(|| "no error message".to_string());
                warn!(status = other, %message, "geocoding request rejected");
                return Err(AppError::Geocoding {
                    status: other.to_string(),
                    message,
                });
            }
        }

        let Some(first) = body.results.into_iter().next() else {
            return Ok(None);
        };

        let location = first
            .geometry
            .and_then(|geometry| geometry.location)
            .ok_or_else(|| AppError::Geocoding {
                status: status.to_string(),
                message: "first result is missing a location".into(),
            })?;

        Ok(Some(GeoResult {
            latitude: location.lat,
            longitude: location.lng,
            formatted_address: first.formatted_address.unwrap_or_default(),
        }))
    }
}

#[derive(Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<GeocodeResult>,
    status: Option<String>,
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct GeocodeResult {
    formatted_address: Option<String>,
    geometry: Option<Geometry>,
}

#[derive(Deserialize)]
struct Geometry {
    location: Option<LatLng>,
}

#[derive(Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_api_key() {
        let config = AppConfig::default();
        assert!(GeocodingClient::maybe_new(&config).unwrap().is_none());

        let config = AppConfig {
            google_api_key: Some(SecretString::from("key".to_string())),
            ..AppConfig::default()
        };
        assert!(GeocodingClient::maybe_new(&config).unwrap().is_some());
    }

    #[test]
    fn rejects_invalid_endpoint() {
        let config = AppConfig {
            google_api_key: Some(SecretString::from("key".to_string())),
            google_geocode_endpoint: "::nope".into(),
            ..AppConfig::default()
        };
        assert!(matches!(
            GeocodingClient::maybe_new(&config),
            Err(AppError::Config(_))
        ));
    }
}
