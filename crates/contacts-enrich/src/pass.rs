use std::collections::BTreeMap;
use std::sync::Arc;

use contacts_core::{city_key, WeatherSnapshot};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info_span, warn, Instrument};

use crate::weather::WeatherResolver;

/// Weather for every city of a display pass, keyed by [`city_key`]. A city
/// whose resolution failed maps to `None` exactly like an unknown city, and
/// is also listed in `failed`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CityWeatherBoard {
    pub by_city: BTreeMap<String, Option<WeatherSnapshot>>,
    pub failed: Vec<String>,
}

impl CityWeatherBoard {
    pub fn weather_for(&self, city: &str) -> Option<&WeatherSnapshot> {
        self.by_city.get(&city_key(city)).and_then(Option::as_ref)
    }
}

/// Resolves distinct cities concurrently, at most `concurrency` at a time.
#[derive(Clone)]
pub struct EnrichmentPass {
    resolver: Arc<WeatherResolver>,
    concurrency: usize,
}

impl EnrichmentPass {
    pub fn new(resolver: Arc<WeatherResolver>, concurrency: usize) -> Self {
        Self {
            resolver,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn run<I, S>(&self, cities: I) -> CityWeatherBoard
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        // One lookup per cache key; the first spelling seen is kept for display.
        let mut unique: BTreeMap<String, String> = BTreeMap::new();
        for city in cities {
            let display = city.as_ref().trim();
            if !display.is_empty() {
                unique
                    .entry(city_key(display))
                    .or_insert_with(|| display.to_string());
            }
        }

        let limit = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        for (key, city) in unique {
            let resolver = Arc::clone(&self.resolver);
            let limit = Arc::clone(&limit);
            let span = info_span!("enrich_city", city = %city);
            tasks.spawn(
                async move {
                    let result = match limit.acquire_owned().await {
                        Ok(_permit) => resolver.resolve_weather(&city).await,
                        Err(_) => Ok(None),
                    };
                    (key, city, result)
                }
                .instrument(span),
            );
        }

        let mut board = CityWeatherBoard::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((key, _, Ok(weather))) => {
                    board.by_city.insert(key, weather);
                }
                Ok((key, city, Err(err))) => {
                    warn!(city, error = %err, "weather unavailable; rendering without it");
                    board.by_city.insert(key, None);
                    board.failed.push(city);
                }
                Err(join_err) => {
                    error!(error = %join_err, "enrichment task aborted");
                }
            }
        }
        board.failed.sort();
        board
    }
}
