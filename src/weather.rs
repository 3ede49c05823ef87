//! Current-weather enrichment from the OpenWeatherMap HTTP API
//!
//! A non-200 answer is an expected outcome (quota, unknown city, outage) and
//! yields absent weather. Transport failures and undecodable bodies are
//! errors and reach the caller.

use crate::config::{
    optional_string_key, string_key, ConfigProvider, API_KEY_KEY, CITY_KEY, ENDPOINT_KEY,
};
use crate::error::WeatherError;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub type Result<T> = std::result::Result<T, WeatherError>;

pub const DEFAULT_ENDPOINT: &str = "https://api.openweathermap.org/data/2.5/weather";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Placeholder stored for any field the provider left out.
pub const MISSING: &str = "?";

/// Weather snapshot attached to a capture's metadata.
///
/// Field values are copied from the provider response as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReading {
    pub weather: Conditions,
    pub wind: Wind,
    pub clouds: Clouds,
    pub temperature: Temperature,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conditions {
    pub desc: Value,
    pub pressure: Value,
    pub humidity: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wind {
    pub speed_kmh: Value,
    pub direction_deg: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clouds {
    pub cloudiness_pct: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Temperature {
    pub temp: Value,
    pub temp_min: Value,
    pub temp_max: Value,
}

impl WeatherReading {
    /// Map an OpenWeatherMap `weather` response body.
    pub fn from_response(body: &Value) -> Self {
        let main = body.get("main");
        let wind = body.get("wind");
        let conditions = body.get("weather").and_then(|w| w.get(0));

        Self {
            weather: Conditions {
                desc: field(conditions, "main"),
                pressure: field(main, "pressure"),
                humidity: field(main, "humidity"),
            },
            wind: Wind {
                speed_kmh: field(wind, "speed"),
                direction_deg: field(wind, "deg"),
            },
            clouds: Clouds {
                cloudiness_pct: field(body.get("clouds"), "all"),
            },
            temperature: Temperature {
                temp: field(main, "temp"),
                temp_min: field(main, "temp_min"),
                temp_max: field(main, "temp_max"),
            },
        }
    }
}

fn field(section: Option<&Value>, key: &str) -> Value {
    section
        .and_then(|s| s.get(key))
        .cloned()
        .unwrap_or_else(|| Value::String(MISSING.to_string()))
}

/// Anything that can report the current weather at the sensor.
///
/// `Ok(None)` means the provider was reached but had no reading for us.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn current(&self) -> Result<Option<WeatherReading>>;
}

/// HTTP client for the provider.
///
/// Location, credential and endpoint are read from config on every fetch so
/// edits to the config file apply to the next capture.
pub struct WeatherClient {
    http: reqwest::Client,
    config: Arc<dyn ConfigProvider>,
}

impl WeatherClient {
    pub fn new(config: Arc<dyn ConfigProvider>) -> Result<Self> {
        Self::with_timeout(config, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(config: Arc<dyn ConfigProvider>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::from_http(http, config))
    }

    /// Use a preconfigured HTTP client.
    pub fn from_http(http: reqwest::Client, config: Arc<dyn ConfigProvider>) -> Self {
        Self { http, config }
    }

    /// One GET against `endpoint` for `location`.
    pub async fn fetch_weather(
        &self,
        endpoint: &str,
        location: &str,
        api_key: &str,
    ) -> Result<Option<WeatherReading>> {
        debug!("Requesting weather for {} from {}", location, endpoint);

        let response = self
            .http
            .get(endpoint)
            .query(&[("q", location), ("units", "metric"), ("APPID", api_key)])
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            info!(
                "could not get external weather data, status code: {}",
                status.as_u16()
            );
            return Ok(None);
        }

        let body = response.bytes().await?;
        let json: Value = serde_json::from_slice(&body)?;

        info!("successfully requested external weather data");
        Ok(Some(WeatherReading::from_response(&json)))
    }
}

#[async_trait]
impl WeatherSource for WeatherClient {
    async fn current(&self) -> Result<Option<WeatherReading>> {
        // one read per fetch keeps city, key and endpoint from the same revision
        let document = self.config.document()?;
        let location = string_key(&document, CITY_KEY)?;
        let api_key = string_key(&document, API_KEY_KEY)?;
        let endpoint = optional_string_key(&document, ENDPOINT_KEY)?
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        self.fetch_weather(&endpoint, &location, &api_key).await
    }
}
