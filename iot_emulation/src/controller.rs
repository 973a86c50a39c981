use crate::context::AppContext;
use crate::handler::RegistrationError;
use crate::model::CronConfig;
use crate::service::cron;
use actix_web::web::Data;
use std::sync::Arc;
use tracing::info;

/// Validate a registration and schedule the job. Returns as soon as the job
/// is accepted; the traffic itself is generated by a detached task.
pub fn register_cron(
    config: CronConfig,
    ctx: &Data<AppContext>,
) -> Result<(), RegistrationError> {
    config.validate().map_err(RegistrationError::Validation)?;

    let proxy_url =
        format!("http://{}:{}", config.first_node_ip, ctx.proxy_port);
    let client = cron::proxied_client(&proxy_url)?;

    info!(
        "Registered cron of function {} (interval {} ms, duration {} ms, \
         first hop {})",
        config.function_id, config.interval_ms, config.duration_ms, proxy_url
    );

    tokio::spawn(cron::run_job(
        ctx.clone().into_inner(),
        Arc::new(client),
        Arc::new(config),
    ));
    Ok(())
}
