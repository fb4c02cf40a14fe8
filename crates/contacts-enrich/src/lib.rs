//! City weather enrichment: geocoding and forecast adapters behind a layered
//! TTL cache, plus the concurrent per-city pass used when listing contacts.

pub mod config;
pub mod geo;
pub mod pass;
pub mod services;
pub mod weather;

use contacts_storage::{CacheError, FetchError};
use thiserror::Error;

pub use config::EnrichConfig;
pub use geo::{GeoResolver, GEO_TTL};
pub use pass::{CityWeatherBoard, EnrichmentPass};
pub use services::{
    CurrentWeather, ForecastResponse, GeocodeMatch, GeocodingApi, HourlySeries, NominatimClient,
    OpenMeteoClient, WeatherApi,
};
pub use weather::{WeatherResolver, WEATHER_TTL};

pub const CRATE_NAME: &str = "contacts-enrich";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("geocoder returned unparseable coordinates {lat:?}/{lon:?} for {city:?}")]
    Payload {
        city: String,
        lat: String,
        lon: String,
    },
}
