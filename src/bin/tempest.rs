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

use clap::{crate_version, Parser};
use hyper::service::{make_service_fn, service_fn};
use hyper::Server;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use std::{fs, io, process};
use tempest::config;
use tempest::counter::{CallCounter, CounterStore, SharedCounter, CALLS_COUNTER};
use tempest::http::{http_route, RequestContext};
use tempest::metrics::{self, SnapshotHandle};
use tempest::provider::OpenWeatherClient;
use tokio::signal::unix::{self, SignalKind};
use tokio::task;

/// Expose current weather for configured cities as Prometheus metrics
///
/// Poll the OpenWeather API for every city listed in the configuration file,
/// on a fixed period, and serve the latest results in the Prometheus text
/// format. The total number of API calls ever attempted is persisted in the
/// counter storage directory so it survives restarts. Logs are written to a
/// rolling file in the log storage directory.
///
/// Both storage directories are created if they don't already exist.
#[derive(Debug, Parser)]
#[command(name = "tempest", version = crate_version!())]
struct TempestApplication {
    /// Path of the YAML configuration file
    #[arg(long = "config.file")]
    config_file: PathBuf,

    /// Directory where log files are written
    #[arg(long = "storage.log.path")]
    log_path: PathBuf,

    /// Directory where counter checkpoint files are kept
    #[arg(long = "storage.counter.path")]
    counter_path: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let opts = TempestApplication::parse();

    // Nothing below works without the storage directories, and logging isn't
    // up yet, so failures here go to stderr.
    for dir in [&opts.log_path, &opts.counter_path] {
        if let Err(e) = fs::create_dir_all(dir) {
            eprintln!("tempest: unable to create directory {}: {}", dir.display(), e);
            process::exit(1);
        }
    }

    let config = config::load(&opts.config_file).unwrap_or_else(|e| {
        eprintln!("tempest: {}", e);
        process::exit(1);
    });

    let level = config.configuration.logging.level().unwrap_or_else(|e| {
        eprintln!("tempest: {}", e);
        process::exit(1);
    });

    let (writer, _guard) = tracing_appender::non_blocking(config.configuration.logging.appender(&opts.log_path));
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(level)
            .with_writer(writer)
            .with_ansi(false)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    tracing::info!(
        message = "configuration loaded",
        config = %opts.config_file.display(),
        targets = config.targets.len(),
    );

    let counter = CallCounter::load(CounterStore::new(&opts.counter_path), CALLS_COUNTER).unwrap_or_else(|e| {
        tracing::error!(message = "unable to load call counter", error = %e);
        process::exit(1)
    });

    let counter: SharedCounter = Arc::new(Mutex::new(counter));
    let snapshot = Arc::new(SnapshotHandle::new());
    let provider = Arc::new(OpenWeatherClient::new(
        config.configuration.web.api_key.clone(),
        counter.clone(),
    ));

    // Periodically poll every target and publish a fresh snapshot. The first
    // cycle starts immediately; after that the loop sleeps for the configured
    // period between cycles.
    let period = Duration::from_secs(config.configuration.web.period_secs);
    let targets = Arc::new(config.targets.clone());
    let refresh_snapshot = snapshot.clone();

    task::spawn(async move {
        loop {
            let provider = provider.clone();
            let counter = counter.clone();
            let targets = targets.clone();

            // Each cycle runs as its own task so that a panic escaping the
            // builder is contained here instead of ending the loop.
            let cycle =
                task::spawn(async move { metrics::build_document(provider.as_ref(), &counter, &targets).await });

            match cycle.await {
                Ok(document) => {
                    refresh_snapshot.publish(document);
                    tracing::info!(message = "metrics updated");
                }
                Err(e) => {
                    tracing::error!(message = "refresh cycle failed, retrying next period", error = %e);
                }
            }

            tokio::time::sleep(period).await;
        }
    });

    let context = Arc::new(RequestContext::new(
        snapshot,
        config.configuration.web.metrics_route.clone(),
    ));
    let make_svc = make_service_fn(move |_| {
        let context = context.clone();
        async move { Ok::<_, hyper::Error>(service_fn(move |req| http_route(req, context.clone()))) }
    });

    let addr = config.configuration.web.bind_addr();
    let server = Server::try_bind(&addr)
        .map(|s| {
            s.serve(make_svc).with_graceful_shutdown(async {
                // Wait for either SIGTERM or SIGINT to shutdown
                tokio::select! {
                    _ = sigterm() => {}
                    _ = sigint() => {}
                }
            })
        })
        .unwrap_or_else(|e| {
            tracing::error!(message = "error starting server", address = %addr, err = %e);
            process::exit(1)
        });

    tracing::info!(message = "starting server", address = %addr);
    server.await.unwrap();

    tracing::info!("server shutdown");
    Ok(())
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    tokio::signal::ctrl_c().await
}
