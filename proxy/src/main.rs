#[cfg(feature = "mimalloc")]
use mimalloc::MiMalloc;

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use crate::context::AppContext;
use crate::monitoring::InfluxMetricsSink;
use actix_web::web::Data;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use helper::monitoring::{
    InfluxAddress, InfluxBucket, InfluxOrg, InfluxToken, InstanceName,
    MetricsExporter,
};
use helper::{env_load, env_var};
use std::env::var;
use std::sync::Arc;
use std::time::Duration;
use tracing::subscriber::set_global_default;
use tracing::{debug, info, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_forest::ForestLayer;
use tracing_log::LogTracer;
use tracing_subscriber::prelude::__tracing_subscriber_SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

mod context;
mod handler;
mod monitoring;
mod protocol;
mod service;

env_var!(SERVER_PORT);
env_var!(CHAIN_TIMEOUT_SEC);
env_var!(INFLUX_ADDRESS);
env_var!(INFLUX_TOKEN);
env_var!(INFLUX_ORG);
env_var!(INFLUX_BUCKET);
env_var!(INSTANCE_NAME);
env_var!(DEV);

/// Deadline for a whole chain when CHAIN_TIMEOUT_SEC is not set
const DEFAULT_CHAIN_TIMEOUT_SEC: u64 = 60;

/// Compose multiple layers into a `tracing`'s subscriber.
pub fn get_subscriber(
    _name: String,
    env_filter: String,
) -> (impl Subscriber + Send + Sync, WorkerGuard) {
    // Env variable LOG_CONFIG_PATH points at the path where
    // LOG_CONFIG_FILENAME is located
    let log_config_path =
        var("LOG_CONFIG_PATH").unwrap_or_else(|_| "./".to_string());
    // Env variable LOG_CONFIG_FILENAME names the log file
    let log_config_filename = var("LOG_CONFIG_FILENAME")
        .unwrap_or_else(|_| "proxy.log".to_string());

    let file_appender =
        tracing_appender::rolling::never(log_config_path, log_config_filename);
    let (non_blocking_file, guard) =
        tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or(EnvFilter::new(env_filter));

    let reg = Registry::default()
        .with(env_filter)
        .with(fmt::Layer::default().with_writer(non_blocking_file));

    (reg.with(ForestLayer::default()), guard)
}

/// Register a subscriber as global default to process span data.
///
/// It should only be called once!
pub fn init_subscriber(subscriber: impl Subscriber + Send + Sync) {
    LogTracer::init().expect("Failed to set logger");
    set_global_default(subscriber).expect("Failed to set subscriber");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dev = var(DEV)
        .map(|dev| dev.to_lowercase() == "true")
        .unwrap_or(false);
    let default_filter = if dev { "trace" } else { "info" };
    let (subscriber, _guard) =
        get_subscriber("proxy".into(), default_filter.into());
    init_subscriber(subscriber);

    debug!("Tracing initialized.");

    let my_port_http = var(SERVER_PORT)
        .context("Please specify SERVER_PORT env variable")?
        .parse::<u16>()
        .context("SERVER_PORT is not a valid port")?;
    let chain_timeout = Duration::from_secs(match var(CHAIN_TIMEOUT_SEC) {
        Ok(value) => value
            .parse::<u64>()
            .context("CHAIN_TIMEOUT_SEC is not a number of seconds")?,
        Err(_) => DEFAULT_CHAIN_TIMEOUT_SEC,
    });

    let exporter = MetricsExporter::new(
        env_load!(InfluxAddress, INFLUX_ADDRESS),
        env_load!(InfluxOrg, INFLUX_ORG),
        env_load!(InfluxToken, INFLUX_TOKEN),
        env_load!(InfluxBucket, INFLUX_BUCKET),
        env_load!(InstanceName, INSTANCE_NAME),
    )
    .await
    .context("Cannot build the InfluxDB2 database connection")?;

    let ctx = Data::new(AppContext::new(
        chain_timeout,
        Arc::new(InfluxMetricsSink::new(exporter)),
    ));

    info!("Starting HTTP server on 0.0.0.0:{}", my_port_http);

    // No compression middleware on purpose, relayed bodies must not be
    // re-encoded in transit
    HttpServer::new(move || {
        App::new()
            .app_data(Data::clone(&ctx))
            .default_service(web::to(handler::proxy))
    })
    .bind(("0.0.0.0", my_port_http))?
    .run()
    .await?;

    Ok(())
}
