use std::sync::Arc;

use async_trait::async_trait;
use contacts_core::{GeoCoordinate, WeatherSnapshot};
use contacts_storage::{FetchError, HttpFetcher, SimpleTokenBucket};
use serde::Deserialize;
use tracing::debug;

pub const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/search";
pub const OPEN_METEO_URL: &str = "https://api.open-meteo.com/v1/forecast";

/// One geocoder hit. Nominatim encodes coordinates as numeric strings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeocodeMatch {
    pub lat: String,
    pub lon: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl GeocodeMatch {
    pub fn coordinate(&self) -> Option<GeoCoordinate> {
        let latitude = self.lat.trim().parse::<f64>().ok()?;
        let longitude = self.lon.trim().parse::<f64>().ok()?;
        Some(GeoCoordinate {
            latitude,
            longitude,
        })
    }
}

#[async_trait]
pub trait GeocodingApi: Send + Sync {
    /// Looks up `city` (already trimmed) and returns at most one match.
    async fn search(&self, city: &str) -> Result<Vec<GeocodeMatch>, FetchError>;
}

#[async_trait]
pub trait WeatherApi: Send + Sync {
    async fn current(&self, at: GeoCoordinate) -> Result<ForecastResponse, FetchError>;
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ForecastResponse {
    #[serde(default)]
    pub current_weather: Option<CurrentWeather>,
    #[serde(default)]
    pub hourly: Option<HourlySeries>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CurrentWeather {
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub windspeed: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HourlySeries {
    #[serde(default)]
    pub relativehumidity_2m: Option<Vec<Option<f64>>>,
}

impl ForecastResponse {
    pub fn snapshot(&self) -> WeatherSnapshot {
        let current = self.current_weather.clone().unwrap_or_default();
        let relative_humidity = self
            .hourly
            .as_ref()
            .and_then(|h| h.relativehumidity_2m.as_ref())
            .and_then(|samples| samples.first().copied().flatten());
        WeatherSnapshot {
            temperature: current.temperature,
            wind_speed: current.windspeed,
            relative_humidity,
        }
    }
}

pub struct NominatimClient {
    fetcher: Arc<HttpFetcher>,
    base_url: String,
    throttle: Option<Arc<SimpleTokenBucket>>,
}

impl NominatimClient {
    pub fn new(fetcher: Arc<HttpFetcher>, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into(),
            throttle: None,
        }
    }

    pub fn with_throttle(mut self, bucket: Arc<SimpleTokenBucket>) -> Self {
        self.throttle = Some(bucket);
        self
    }
}

#[async_trait]
impl GeocodingApi for NominatimClient {
    async fn search(&self, city: &str) -> Result<Vec<GeocodeMatch>, FetchError> {
        if let Some(bucket) = &self.throttle {
            let waited = bucket.take().await;
            if !waited.is_zero() {
                debug!(waited_ms = waited.as_millis() as u64, "geocoder throttled");
            }
        }
        let query = [
            ("q", city.to_string()),
            ("format", "json".to_string()),
            ("limit", "1".to_string()),
        ];
        self.fetcher.get_json(&self.base_url, &query).await
    }
}

pub struct OpenMeteoClient {
    fetcher: Arc<HttpFetcher>,
    base_url: String,
}

impl OpenMeteoClient {
    pub fn new(fetcher: Arc<HttpFetcher>, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl WeatherApi for OpenMeteoClient {
    async fn current(&self, at: GeoCoordinate) -> Result<ForecastResponse, FetchError> {
        let query = [
            ("latitude", at.latitude.to_string()),
            ("longitude", at.longitude.to_string()),
            ("current_weather", "true".to_string()),
            ("hourly", "relativehumidity_2m".to_string()),
            ("forecast_days", "1".to_string()),
        ];
        self.fetcher.get_json(&self.base_url, &query).await
    }
}
