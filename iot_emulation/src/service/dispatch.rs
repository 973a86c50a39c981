use crate::context::AppContext;
use crate::model::CronConfig;
use crate::service::content;
use anyhow::{bail, Context, Result};
use reqwest_middleware::ClientWithMiddleware;
use std::sync::Arc;
use tracing::{error, warn};

pub const HEADER_TAGS: &str = "GIRAFF-Tags";
pub const HEADER_SLA_ID: &str = "GIRAFF-Sla-Id";
pub const HEADER_TIMEOUT: &str = "X-Timeout";

/// Execute one timed send attempt. Failures are logged and counted, never
/// retried, and never stop the owning job.
pub async fn send_ping(
    ctx: Arc<AppContext>,
    config: Arc<CronConfig>,
    client: Arc<ClientWithMiddleware>,
) {
    if let Err(err) = try_send(&ctx, &config, &client).await {
        warn!("Ping of function {} failed: {:?}", config.function_id, err);
        ctx.metrics.observe_send_failure(&config.function_id).await;
    }
}

pub async fn try_send(
    ctx: &AppContext,
    config: &CronConfig,
    client: &ClientWithMiddleware,
) -> Result<()> {
    let request = content::build_request(client, ctx, config)
        .await
        .context("Failed to build the request")?;
    let response = request
        .header(HEADER_TAGS, &config.tags)
        .header(HEADER_SLA_ID, &config.function_id)
        .header(
            HEADER_TIMEOUT,
            format!("{}s", ctx.request_timeout.as_secs()),
        )
        .timeout(ctx.request_timeout)
        .send()
        .await
        .context("HTTP POST failed")?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        error!(
            "Errored request of function {} (status {}): {}",
            config.function_id, status, body
        );
        bail!("The first hop responded with status {status}");
    }
    Ok(())
}
