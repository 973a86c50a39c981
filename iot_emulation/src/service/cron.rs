use crate::context::AppContext;
use crate::model::CronConfig;
use crate::service::{dispatch, poisson};
use anyhow::{Context, Result};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
#[cfg(feature = "jaeger")]
use reqwest_tracing::TracingMiddleware;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info};

/// HTTP client routing every request of a job through the chaining proxy
/// sitting on the first fog node.
pub fn proxied_client(proxy_url: &str) -> Result<ClientWithMiddleware> {
    let proxy = reqwest::Proxy::all(proxy_url)
        .with_context(|| format!("Failed to configure proxy {proxy_url}"))?;
    let client = reqwest::Client::builder()
        .proxy(proxy)
        .build()
        .context("Failed to build the HTTP client")?;
    let builder = ClientBuilder::new(client);
    #[cfg(feature = "jaeger")]
    let builder = builder.with(TracingMiddleware::default());
    Ok(builder.build())
}

/// Drive one accepted job to completion: wait the initial delay, then
/// dispatch one concurrent send attempt per emission of the point process.
/// Dispatches run independently of the emission loop; their failures are
/// counted but never bubble up into the schedule.
pub async fn run_job(
    ctx: Arc<AppContext>,
    client: Arc<ClientWithMiddleware>,
    config: Arc<CronConfig>,
) {
    tokio::time::sleep(Duration::from_secs_f64(
        config.initial_wait_ms / 1000.0,
    ))
    .await;

    let (mut arrivals, producer) = match poisson::exponential_arrivals(
        Duration::from_secs_f64(config.interval_ms / 1000.0),
        Duration::from_secs_f64(config.duration_ms / 1000.0),
    ) {
        Ok(arrivals) => arrivals,
        Err(err) => {
            error!(
                "Failed to start the arrival process of function {}: {:?}",
                config.function_id, err
            );
            return;
        }
    };

    let mut dispatches = JoinSet::new();
    while arrivals.recv().await.is_some() {
        dispatches.spawn(dispatch::send_ping(
            ctx.clone(),
            config.clone(),
            client.clone(),
        ));
    }
    if let Err(err) = producer.await {
        error!(
            "The arrival process of function {} panicked: {:?}",
            config.function_id, err
        );
    }
    while let Some(joined) = dispatches.join_next().await {
        if let Err(err) = joined {
            error!(
                "A dispatch task of function {} panicked: {:?}",
                config.function_id, err
            );
        }
    }
    info!("Unregistered cron of function {}", config.function_id);
}
