use std::sync::Arc;
use std::time::Duration;

use contacts_core::{city_key, GeoCoordinate};
use contacts_storage::{get_typed, set_typed, CacheStore, Cached, TtlPolicy};
use tracing::{debug, info};

use crate::services::GeocodingApi;
use crate::ResolveError;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Coordinates barely move: keep hits for 30 days, misses for a day.
pub const GEO_TTL: TtlPolicy = TtlPolicy::new(Duration::from_secs(30 * 24 * 60 * 60), DAY);

/// City name → coordinates, cached under `geo:<city>`.
#[derive(Clone)]
pub struct GeoResolver {
    api: Arc<dyn GeocodingApi>,
    cache: Arc<dyn CacheStore>,
    ttl: TtlPolicy,
}

impl GeoResolver {
    pub fn new(api: Arc<dyn GeocodingApi>, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            api,
            cache,
            ttl: GEO_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: TtlPolicy) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn cache_key(city: &str) -> String {
        format!("geo:{}", city_key(city))
    }

    pub async fn resolve_coordinates(
        &self,
        city: &str,
    ) -> Result<Option<GeoCoordinate>, ResolveError> {
        let city = city.trim();
        if city.is_empty() {
            return Ok(None);
        }

        let key = Self::cache_key(city);
        if let Some(cached) = get_typed::<GeoCoordinate>(self.cache.as_ref(), &key).await? {
            debug!(key, "geo cache hit");
            return Ok(cached.into_option());
        }

        let matches = self.api.search(city).await?;
        let resolved = match matches.first() {
            None => {
                info!(city, "geocoder has no match");
                Cached::KnownAbsent
            }
            Some(first) => {
                let coord = first.coordinate().ok_or_else(|| ResolveError::Payload {
                    city: city.to_string(),
                    lat: first.lat.clone(),
                    lon: first.lon.clone(),
                })?;
                Cached::Present(coord)
            }
        };

        set_typed(self.cache.as_ref(), &key, &resolved, self.ttl.ttl_for(&resolved)).await?;
        Ok(resolved.into_option())
    }
}
