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
use crate::provider::{Target, WeatherProvider};
use arc_swap::ArcSwap;
use std::fmt::Write;
use std::sync::Arc;

/// The most recently built metrics document, shared between the refresh
/// loop (single writer) and HTTP handlers (any number of readers).
///
/// Documents are replaced wholesale: a reader observes either the complete
/// old document or the complete new one, never a mix. Before the first
/// refresh cycle completes the document is empty, which the exposition
/// route serves as-is.
#[derive(Debug)]
pub struct SnapshotHandle {
    current: ArcSwap<String>,
}

impl SnapshotHandle {
    pub fn new() -> Self {
        SnapshotHandle {
            current: ArcSwap::from_pointee(String::new()),
        }
    }

    /// Atomically replace the published document.
    pub fn publish(&self, document: String) {
        self.current.store(Arc::new(document));
    }

    /// The currently published document.
    pub fn current(&self) -> Arc<String> {
        self.current.load_full()
    }
}

impl Default for SnapshotHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// One gauge metric family being assembled: `HELP`/`TYPE` header plus a
/// sample line per successfully polled target.
struct GaugeFamily {
    name: &'static str,
    help: &'static str,
    samples: String,
}

impl GaugeFamily {
    fn new(name: &'static str, help: &'static str) -> Self {
        GaugeFamily {
            name,
            help,
            samples: String::new(),
        }
    }

    fn sample(&mut self, target: &Target, value: f64) {
        let _ = writeln!(
            self.samples,
            "{}{{city=\"{}\", country=\"{}\"}} {}",
            self.name, target.city, target.country, value
        );
    }

    fn render(&self, out: &mut String) {
        let _ = writeln!(out, "# HELP {} {}", self.name, self.help);
        let _ = writeln!(out, "# TYPE {} gauge", self.name);
        out.push_str(&self.samples);
    }
}

/// Build a metrics document in the Prometheus text exposition format by
/// polling the provider once for every target, in order.
///
/// Targets whose fetch fails are logged and skipped: they contribute no
/// sample lines this cycle. Family headers are always emitted, in a fixed
/// order (temperature, wind speed, pressure, humidity, call counter), with
/// the call counter's current value closing the document. No caching is
/// done here; every invocation performs one live API call per target.
pub async fn build_document(
    provider: &dyn WeatherProvider,
    counter: &SharedCounter,
    targets: &[Target],
) -> String {
    let mut temperature = GaugeFamily::new("city_temperature", "Temperature in celsius");
    let mut windspeed = GaugeFamily::new("city_windspeed", "Wind speed in meters per second");
    let mut pressure = GaugeFamily::new("city_pressure", "Atmospheric pressure in hectopascals");
    let mut humidity = GaugeFamily::new("city_humidity", "Relative humidity (0-100)");

    for target in targets {
        match provider.fetch(target).await {
            Ok(measurement) => {
                temperature.sample(target, measurement.temperature_celsius);
                windspeed.sample(target, measurement.wind_speed);
                pressure.sample(target, measurement.pressure);
                humidity.sample(target, measurement.humidity);
            }
            Err(e) => {
                tracing::error!(
                    message = "unable to fetch weather for target",
                    city = %target.city,
                    country = %target.country,
                    error = %e,
                );
            }
        }
    }

    let (name, calls) = {
        let counter = counter.lock().unwrap();
        (counter.name().to_owned(), counter.value())
    };

    let mut document = String::new();
    temperature.render(&mut document);
    windspeed.render(&mut document);
    pressure.render(&mut document);
    humidity.render(&mut document);

    let _ = writeln!(document, "# HELP {} Number of weather API calls attempted", name);
    let _ = writeln!(document, "# TYPE {} counter", name);
    let _ = writeln!(document, "{} {}", name, calls);

    document
}
