use std::sync::Arc;
use std::time::Duration;

use contacts_storage::{CacheStore, HttpClientConfig, HttpFetcher, SimpleTokenBucket};

use crate::geo::GeoResolver;
use crate::pass::EnrichmentPass;
use crate::services::{NominatimClient, OpenMeteoClient, NOMINATIM_URL, OPEN_METEO_URL};
use crate::weather::WeatherResolver;

#[derive(Debug, Clone)]
pub struct EnrichConfig {
    pub geocoder_url: String,
    pub weather_url: String,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub concurrency: usize,
    /// Geocoder requests per second; 0 disables throttling.
    pub geocoder_rps: u32,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            geocoder_url: NOMINATIM_URL.to_string(),
            weather_url: OPEN_METEO_URL.to_string(),
            user_agent: "contacts-directory/1.0".to_string(),
            http_timeout_secs: 10,
            concurrency: 4,
            geocoder_rps: 1,
        }
    }
}

impl EnrichConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            geocoder_url: std::env::var("CONTACTS_GEOCODER_URL").unwrap_or(defaults.geocoder_url),
            weather_url: std::env::var("CONTACTS_WEATHER_URL").unwrap_or(defaults.weather_url),
            user_agent: std::env::var("CONTACTS_USER_AGENT").unwrap_or(defaults.user_agent),
            http_timeout_secs: std::env::var("CONTACTS_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.http_timeout_secs),
            concurrency: std::env::var("CONTACTS_ENRICH_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.concurrency),
            geocoder_rps: std::env::var("CONTACTS_GEOCODER_RPS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.geocoder_rps),
        }
    }

    /// Wires the HTTP-backed resolvers over `cache`.
    pub fn weather_resolver(&self, cache: Arc<dyn CacheStore>) -> anyhow::Result<WeatherResolver> {
        let fetcher = Arc::new(HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
            global_concurrency: self.concurrency,
        })?);

        let mut geocoder = NominatimClient::new(Arc::clone(&fetcher), self.geocoder_url.clone());
        if self.geocoder_rps > 0 {
            geocoder = geocoder.with_throttle(Arc::new(SimpleTokenBucket::new(
                self.geocoder_rps,
                Duration::from_secs(1) / self.geocoder_rps,
            )));
        }
        let forecaster = OpenMeteoClient::new(fetcher, self.weather_url.clone());

        let geo = GeoResolver::new(Arc::new(geocoder), Arc::clone(&cache));
        Ok(WeatherResolver::new(geo, Arc::new(forecaster), cache))
    }

    pub fn enrichment_pass(&self, cache: Arc<dyn CacheStore>) -> anyhow::Result<EnrichmentPass> {
        let resolver = self.weather_resolver(cache)?;
        Ok(EnrichmentPass::new(Arc::new(resolver), self.concurrency))
    }
}
