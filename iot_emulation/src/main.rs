#[cfg(feature = "mimalloc")]
use mimalloc::MiMalloc;

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use crate::context::AppContext;
use crate::handler::{health, put_cron, wrong_method};
use crate::monitoring::InfluxMetricsSink;
use crate::repository::samples::SamplePool;
use actix_web::web::Data;
use actix_web::{middleware, web, App, HttpServer};
#[cfg(feature = "jaeger")]
use actix_web_opentelemetry::RequestTracing;
use anyhow::Context;
use helper::monitoring::{
    InfluxAddress, InfluxBucket, InfluxOrg, InfluxToken, InstanceName,
    MetricsExporter,
};
use helper::{env_load, env_var};
#[cfg(feature = "jaeger")]
use opentelemetry::global;
#[cfg(feature = "jaeger")]
use opentelemetry_sdk::propagation::TraceContextPropagator;
use std::env::var;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::subscriber::set_global_default;
use tracing::{debug, info, Subscriber};
#[cfg(feature = "jaeger")]
use tracing_actix_web::TracingLogger;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_forest::ForestLayer;
use tracing_log::LogTracer;
use tracing_subscriber::prelude::__tracing_subscriber_SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

mod context;
mod controller;
mod handler;
mod model;
mod monitoring;
mod repository;
mod service;

env_var!(SERVER_PORT);
env_var!(PROXY_PORT);
env_var!(PING_REQUEST_TIMEOUT_SEC);
env_var!(INFLUX_ADDRESS);
env_var!(INFLUX_TOKEN);
env_var!(INFLUX_ORG);
env_var!(INFLUX_BUCKET);
env_var!(INSTANCE_NAME);
env_var!(PATH_AUDIO);
env_var!(PATH_IMAGE);
env_var!(DEV);

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
        .unwrap_or_else(|_| "iot_emulation.log".to_string());

    let file_appender =
        tracing_appender::rolling::never(log_config_path, log_config_filename);
    let (non_blocking_file, guard) =
        tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or(EnvFilter::new(env_filter));

    #[cfg(feature = "jaeger")]
    let collector_ip = std::env::var("COLLECTOR_IP")
        .unwrap_or_else(|_| "localhost".to_string());
    #[cfg(feature = "jaeger")]
    let collector_port = std::env::var("COLLECTOR_PORT")
        .unwrap_or_else(|_| "14268".to_string());
    #[cfg(feature = "jaeger")]
    let tracing_layer = tracing_opentelemetry::OpenTelemetryLayer::new(
        opentelemetry_jaeger::new_collector_pipeline()
            .with_endpoint(format!(
                "http://{collector_ip}:{collector_port}/api/traces"
            ))
            .with_reqwest()
            .with_service_name(_name)
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .unwrap(),
    );

    let reg = Registry::default()
        .with(env_filter)
        .with(fmt::Layer::default().with_writer(non_blocking_file));

    #[cfg(feature = "jaeger")]
    let reg = reg.with(tracing_layer);

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
    #[cfg(feature = "jaeger")]
    global::set_text_map_propagator(TraceContextPropagator::new());

    let dev = var(DEV)
        .map(|dev| dev.to_lowercase() == "true")
        .unwrap_or(false);
    let default_filter = if dev { "trace" } else { "info" };
    let (subscriber, _guard) =
        get_subscriber("iot_emulation".into(), default_filter.into());
    init_subscriber(subscriber);

    debug!("Tracing initialized.");

    let my_port_http = var(SERVER_PORT)
        .context("Please specify SERVER_PORT env variable")?
        .parse::<u16>()
        .context("SERVER_PORT is not a valid port")?;
    let proxy_port = var(PROXY_PORT)
        .context("Please specify PROXY_PORT env variable")?
        .parse::<u16>()
        .context("PROXY_PORT is not a valid port")?;
    let request_timeout = Duration::from_secs(
        var(PING_REQUEST_TIMEOUT_SEC)
            .context("Please specify PING_REQUEST_TIMEOUT_SEC env variable")?
            .parse::<u64>()
            .context("PING_REQUEST_TIMEOUT_SEC is not a number of seconds")?,
    );

    let exporter = MetricsExporter::new(
        env_load!(InfluxAddress, INFLUX_ADDRESS),
        env_load!(InfluxOrg, INFLUX_ORG),
        env_load!(InfluxToken, INFLUX_TOKEN),
        env_load!(InfluxBucket, INFLUX_BUCKET),
        env_load!(InstanceName, INSTANCE_NAME),
    )
    .await
    .context("Cannot build the InfluxDB2 database connection")?;

    let path_audio =
        var(PATH_AUDIO).context("Please specify PATH_AUDIO env variable")?;
    let path_image =
        var(PATH_IMAGE).context("Please specify PATH_IMAGE env variable")?;
    let samples =
        SamplePool::load(Path::new(&path_audio), Path::new(&path_image))
            .context("Cannot load the sample pool")?;

    let ctx = Data::new(AppContext {
        samples,
        metrics: Arc::new(InfluxMetricsSink::new(exporter)),
        request_timeout,
        proxy_port,
    });

    info!("Starting HTTP server on 0.0.0.0:{}", my_port_http);

    HttpServer::new(move || {
        let app = App::new().wrap(middleware::Compress::default());

        #[cfg(feature = "jaeger")]
        let app =
            app.wrap(TracingLogger::default()).wrap(RequestTracing::new());

        app.app_data(Data::clone(&ctx)).service(
            web::scope("/api")
                .route("/cron", web::put().to(put_cron))
                .route("/cron", web::to(wrong_method))
                .route("/health", web::get().to(health)),
        )
    })
    .bind(("0.0.0.0", my_port_http))?
    .run()
    .await?;

    // Ensure all spans have been reported
    #[cfg(feature = "jaeger")]
    opentelemetry::global::shutdown_tracer_provider();

    Ok(())
}
