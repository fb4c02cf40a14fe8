use std::sync::Arc;
use std::time::Duration;

use contacts_core::{city_key, WeatherSnapshot};
use contacts_storage::{get_typed, set_typed, CacheStore, Cached, TtlPolicy};
use tracing::{debug, info};

use crate::geo::GeoResolver;
use crate::services::WeatherApi;
use crate::ResolveError;

/// Weather goes stale quickly; both outcomes live for ten minutes.
pub const WEATHER_TTL: TtlPolicy = TtlPolicy::uniform(Duration::from_secs(10 * 60));

/// City name → current conditions, cached under `weather:<city>`. Resolves
/// coordinates through the [`GeoResolver`] first and stops there when the
/// city is unknown.
#[derive(Clone)]
pub struct WeatherResolver {
    geo: GeoResolver,
    api: Arc<dyn WeatherApi>,
    cache: Arc<dyn CacheStore>,
    ttl: TtlPolicy,
}

impl WeatherResolver {
    pub fn new(geo: GeoResolver, api: Arc<dyn WeatherApi>, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            geo,
            api,
            cache,
            ttl: WEATHER_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: TtlPolicy) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn geo(&self) -> &GeoResolver {
        &self.geo
    }

    pub fn cache_key(city: &str) -> String {
        format!("weather:{}", city_key(city))
    }

    pub async fn resolve_weather(
        &self,
        city: &str,
    ) -> Result<Option<WeatherSnapshot>, ResolveError> {
        let city = city.trim();
        if city.is_empty() {
            return Ok(None);
        }

        let key = Self::cache_key(city);
        if let Some(cached) = get_typed::<WeatherSnapshot>(self.cache.as_ref(), &key).await? {
            debug!(key, "weather cache hit");
            return Ok(cached.into_option());
        }

        let resolved = match self.geo.resolve_coordinates(city).await? {
            None => Cached::KnownAbsent,
            Some(coord) => {
                let forecast = self.api.current(coord).await?;
                let snapshot = forecast.snapshot();
                info!(
                    city,
                    temperature = ?snapshot.temperature,
                    wind_speed = ?snapshot.wind_speed,
                    "weather refreshed"
                );
                Cached::Present(snapshot)
            }
        };

        set_typed(self.cache.as_ref(), &key, &resolved, self.ttl.ttl_for(&resolved)).await?;
        Ok(resolved.into_option())
    }
}
