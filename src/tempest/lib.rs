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

//! Export current weather for configured cities as Prometheus metrics.
//!
//! ## Features
//!
//! Tempest polls the [OpenWeather API](https://openweathermap.org/current) for a
//! configured list of cities and exposes the results as Prometheus metrics. The
//! list of cities, the API credential, and the refresh period all come from a
//! YAML configuration file. Polling happens in the background on a fixed period,
//! *not* in response to Prometheus scrapes: each scrape is served from the most
//! recently built snapshot.
//!
//! The following metrics are exported, labeled with `city` and `country`:
//!
//! * `city_temperature` - Temperature in celsius.
//! * `city_windspeed` - Wind speed in meters per second.
//! * `city_pressure` - Atmospheric pressure in hectopascals.
//! * `city_humidity` - Relative humidity (0-100).
//! * `weather_n_calls` - Total number of API calls attempted, persisted across
//!   restarts as a file in the counter storage directory.
//!
//! Cities whose API call failed during the most recent refresh are absent from
//! the snapshot until a later refresh succeeds for them. Failures never take
//! down the exporter or the endpoint.
//!
//! ## Run
//!
//! Tempest takes three required options: the configuration file, a directory
//! for log files, and a directory for counter checkpoint files. Both
//! directories are created if they don't exist.
//!
//! ```text
//! ./tempest --config.file tempest.yml \
//!     --storage.log.path /var/log/tempest \
//!     --storage.counter.path /var/lib/tempest
//! ```
//!
//! ## Configuration
//!
//! ```yaml
//! Configuration:
//!   Logging:
//!     File_name: tempest.log
//!     Level: info
//!     Rotation: daily
//!   Web:
//!     APIKey: "0123456789abcdef"
//!     WRoute: /metrics
//!     Host: 0.0.0.0
//!     Port: 8080
//!     Period: 60
//! Temperature:
//!   - City: Lima
//!     Country: PE
//!   - City: Boston
//!     Country: US
//! ```
//!
//! ## Prometheus
//!
//! Metrics are exposed at the route configured by `WRoute`. Once `tempest` is
//! running, configure scrapes of it by your Prometheus server. Add the host
//! running `tempest` as a target under the Prometheus `scrape_configs` section
//! as described by the example below. Scrapes more frequent than the configured
//! `Period` don't have any benefit since the snapshot only changes once per
//! refresh.
//!
//! ```yaml
//! # Sample config for Prometheus.
//!
//! global:
//!   scrape_interval:     1m
//!   evaluation_interval: 1m
//!   external_labels:
//!       monitor: 'my_prom'
//!
//! scrape_configs:
//!   - job_name: tempest
//!     static_configs:
//!       - targets: ['example:8080']
//! ```
//!

pub mod config;
pub mod counter;
pub mod http;
pub mod metrics;
pub mod provider;
