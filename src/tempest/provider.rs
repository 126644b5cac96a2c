// Tempest - Weather metrics exporter for Prometheus
//
// Copyright 2023 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::counter::SharedCounter;
use async_trait::async_trait;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{self, Formatter};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// A city/country pair to poll weather for.
///
/// Sourced from configuration; duplicates are allowed and polled
/// independently.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Target {
    #[serde(rename = "City")]
    pub city: String,

    #[serde(rename = "Country")]
    pub country: String,
}

/// Weather readings for a single target from a successful API call.
#[derive(Debug, Clone)]
pub struct Measurement {
    /// Temperature in celsius, rounded to two decimals.
    pub temperature_celsius: f64,
    /// Wind speed in meters per second.
    pub wind_speed: f64,
    /// Atmospheric pressure in hectopascals.
    pub pressure: f64,
    /// Relative humidity (0-100).
    pub humidity: f64,
}

/// Error fetching weather for a single target.
///
/// Never fatal to the exporter: the target is skipped for the cycle and
/// polled again on the next one.
#[derive(Debug)]
pub enum FetchError {
    /// The call could not be completed or its payload could not be
    /// understood: connection failure, DNS failure, timeout, or a 2xx
    /// response missing the expected fields.
    Request(Box<dyn Error + Send + Sync>),
    /// The API answered with a non-2xx status.
    Status(u16),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Request(e) => write!(f, "request error: {}", e),
            FetchError::Status(code) => write!(f, "unexpected status code {}", code),
        }
    }
}

impl Error for FetchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FetchError::Request(ref e) => Some(e.as_ref()),
            FetchError::Status(_) => None,
        }
    }
}

/// Source of weather measurements for targets.
///
/// Abstraction over the OpenWeather client to allow for easier testing of
/// code built on top of it.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn fetch(&self, target: &Target) -> Result<Measurement, FetchError>;
}

/// `WeatherProvider` implementation backed by the OpenWeather current
/// weather API.
///
/// Every call, successful or not, advances the shared durable call counter
/// before the response is evaluated, so the counter reflects attempts.
/// Calls are made with a transport timeout but no retries: a failed target
/// simply waits for the next refresh cycle.
pub struct OpenWeatherClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    counter: SharedCounter,
}

impl OpenWeatherClient {
    pub fn new(api_key: String, counter: SharedCounter) -> Self {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .expect("unable to construct HTTP client");

        OpenWeatherClient {
            http,
            base_url: DEFAULT_BASE_URL.to_owned(),
            api_key,
            counter,
        }
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherClient {
    async fn fetch(&self, target: &Target) -> Result<Measurement, FetchError> {
        // Count the attempt before anything that can fail. The lock is
        // released before the request is issued.
        let calls = self.counter.lock().unwrap().increment();
        tracing::debug!(
            message = "calling weather api",
            city = %target.city,
            country = %target.country,
            calls,
        );

        let place = format!("{},{}", target.city, target.country);
        let res = self
            .http
            .get(&self.base_url)
            .query(&[("q", place.as_str()), ("appid", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| FetchError::Request(Box::new(e)))?;

        let status = res.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = res.text().await.map_err(|e| FetchError::Request(Box::new(e)))?;
        let payload: ApiPayload =
            serde_json::from_str(&body).map_err(|e| FetchError::Request(Box::new(e)))?;

        Ok(payload.into())
    }
}

// Subset of the OpenWeather response payload the exporter cares about.
// Anything else in the body is ignored; a payload missing these fields is
// treated as a request failure.

#[derive(Debug, Deserialize)]
struct ApiMain {
    temp: f64,
    pressure: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct ApiWind {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct ApiPayload {
    main: ApiMain,
    wind: ApiWind,
}

impl From<ApiPayload> for Measurement {
    fn from(payload: ApiPayload) -> Self {
        Measurement {
            // The API reports Kelvin when no units are requested
            temperature_celsius: kelvin_to_celsius(payload.main.temp),
            wind_speed: payload.wind.speed,
            pressure: payload.main.pressure,
            humidity: payload.main.humidity,
        }
    }
}

fn kelvin_to_celsius(kelvin: f64) -> f64 {
    ((kelvin - 273.15) * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::{
        kelvin_to_celsius, ApiPayload, FetchError, Measurement, OpenWeatherClient, Target, WeatherProvider,
    };
    use crate::counter::{CallCounter, CounterStore, SharedCounter, CALLS_COUNTER};
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Response, Server};
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    const PAYLOAD: &str = r#"{
        "coord": {"lon": -77.03, "lat": -12.04},
        "main": {"temp": 300.0, "feels_like": 299.5, "pressure": 1012, "humidity": 70},
        "wind": {"speed": 3.2, "deg": 180},
        "name": "Lima"
    }"#;

    fn target() -> Target {
        Target {
            city: "Lima".to_owned(),
            country: "PE".to_owned(),
        }
    }

    fn counter(dir: &TempDir) -> SharedCounter {
        let counter = CallCounter::load(CounterStore::new(dir.path()), CALLS_COUNTER).unwrap();
        Arc::new(Mutex::new(counter))
    }

    fn client(base_url: String, counter: SharedCounter) -> OpenWeatherClient {
        OpenWeatherClient {
            http: reqwest::Client::new(),
            base_url,
            api_key: "test-key".to_owned(),
            counter,
        }
    }

    /// Run a hyper server on an ephemeral local port answering every
    /// request with the given status and body.
    async fn fixture_server(status: u16, body: &'static str) -> SocketAddr {
        let make = make_service_fn(move |_| async move {
            Ok::<_, hyper::Error>(service_fn(move |_req| async move {
                Ok::<_, hyper::Error>(Response::builder().status(status).body(Body::from(body)).unwrap())
            }))
        });

        let server = Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(make);
        let addr = server.local_addr();
        tokio::spawn(server);
        addr
    }

    #[test]
    fn test_kelvin_to_celsius() {
        assert_eq!(26.85, kelvin_to_celsius(300.0));
        assert_eq!(0.0, kelvin_to_celsius(273.15));
        assert_eq!(-10.0, kelvin_to_celsius(263.15));
    }

    #[test]
    fn test_payload_into_measurement() {
        let payload: ApiPayload = serde_json::from_str(PAYLOAD).unwrap();
        let measurement = Measurement::from(payload);

        assert_eq!(26.85, measurement.temperature_celsius);
        assert_eq!(3.2, measurement.wind_speed);
        assert_eq!(1012.0, measurement.pressure);
        assert_eq!(70.0, measurement.humidity);
    }

    #[test]
    fn test_payload_missing_fields() {
        let res = serde_json::from_str::<ApiPayload>(r#"{"main": {"temp": 300.0}}"#);
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let dir = tempfile::tempdir().unwrap();
        let counter = counter(&dir);
        let addr = fixture_server(200, PAYLOAD).await;
        let client = client(format!("http://{}", addr), counter.clone());

        let measurement = client.fetch(&target()).await.unwrap();

        assert_eq!(26.85, measurement.temperature_celsius);
        assert_eq!(1, counter.lock().unwrap().value());
    }

    #[tokio::test]
    async fn test_fetch_bad_status() {
        let dir = tempfile::tempdir().unwrap();
        let counter = counter(&dir);
        let addr = fixture_server(404, r#"{"cod": "404", "message": "city not found"}"#).await;
        let client = client(format!("http://{}", addr), counter.clone());

        let res = client.fetch(&target()).await;

        assert!(matches!(res.unwrap_err(), FetchError::Status(404)));
        // Failed attempts count too
        assert_eq!(1, counter.lock().unwrap().value());
    }

    #[tokio::test]
    async fn test_fetch_malformed_payload() {
        let dir = tempfile::tempdir().unwrap();
        let counter = counter(&dir);
        let addr = fixture_server(200, "{}").await;
        let client = client(format!("http://{}", addr), counter.clone());

        let res = client.fetch(&target()).await;

        assert!(matches!(res.unwrap_err(), FetchError::Request(_)));
        assert_eq!(1, counter.lock().unwrap().value());
    }

    #[tokio::test]
    async fn test_fetch_counts_every_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let counter = counter(&dir);
        // Nothing listens here, every attempt is a transport failure
        let client = client("http://127.0.0.1:1".to_owned(), counter.clone());

        for expected in 1..=3 {
            let res = client.fetch(&target()).await;
            assert!(matches!(res.unwrap_err(), FetchError::Request(_)));
            assert_eq!(expected, counter.lock().unwrap().value());
        }
    }
}
