use crate::context::AppContext;
use crate::monitoring::ChainedRequest;
use crate::protocol::{
    header_str, HEADER_REQUEST_ID, HEADER_SLA_ID, HEADER_TAGS,
};
use crate::service::chain::{self, ProxiedRequest};
use actix_web::http::StatusCode;
use actix_web::web::{Bytes, Data};
use actix_web::{HttpRequest, HttpResponse};
use anyhow::{ensure, Context, Result};
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};
use std::time::Instant;
use tracing::error;
use uuid::Uuid;

/// Convert the inbound actix request into the client-side representation the
/// relay works with. Requests reach this process as a forward proxy, so the
/// request line carries the absolute URL of the first hop.
fn to_proxied(req: &HttpRequest, body: Bytes) -> Result<ProxiedRequest> {
    let method = Method::from_bytes(req.method().as_str().as_bytes())
        .context("Unsupported HTTP method")?;
    let target = Url::parse(&req.uri().to_string())
        .context("The request URI is not an absolute URL")?;
    ensure!(
        target.has_host(),
        "Not addressed as a proxy, the URI {} carries no host",
        req.uri()
    );

    let mut headers = HeaderMap::new();
    for (name, value) in req.headers() {
        let name = HeaderName::from_bytes(name.as_str().as_bytes())
            .context("Invalid header name")?;
        let value = HeaderValue::from_bytes(value.as_bytes())
            .context("Invalid header value")?;
        headers.append(name, value);
    }

    let request_id = header_str(&headers, HEADER_REQUEST_ID)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    Ok(ProxiedRequest { method, target, headers, body, request_id })
}

/// Entry point of every relayed request. Always answers the caller, and
/// always records exactly one measurement per inbound request, successful
/// chains and failed ones alike.
pub async fn proxy(
    req: HttpRequest,
    body: Bytes,
    ctx: Data<AppContext>,
) -> HttpResponse {
    let received_at = Instant::now();
    let inbound = match to_proxied(&req, body) {
        Ok(inbound) => inbound,
        Err(err) => {
            error!("Rejecting inbound request: {:?}", err);
            let inbound_header = |name: &str| {
                req.headers()
                    .get(name)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or_default()
                    .to_owned()
            };
            ctx.metrics
                .observe_chain(ChainedRequest {
                    latency_ms: received_at.elapsed().as_millis() as i64,
                    request_id: Uuid::new_v4().to_string(),
                    sla_id:     inbound_header("giraff-sla-id"),
                    tags:       inbound_header("giraff-tags"),
                    status:     "500".to_string(),
                    timestamp:  Utc::now(),
                })
                .await;
            return HttpResponse::InternalServerError()
                .body(format!("Error sending proxy request: {err:#}"));
        }
    };
    let request_id = inbound.request_id.clone();
    let sla_id =
        header_str(&inbound.headers, HEADER_SLA_ID).unwrap_or_default();
    let tags = header_str(&inbound.headers, HEADER_TAGS).unwrap_or_default();

    let (response, status) = match chain::follow_chain(&ctx, inbound).await {
        Ok(outcome) => {
            let mut builder = HttpResponse::build(
                StatusCode::from_u16(outcome.status.as_u16())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            );
            for (name, value) in outcome.headers.iter() {
                builder.append_header((name.as_str(), value.as_bytes()));
            }
            (builder.body(outcome.body), outcome.status.as_u16())
        }
        Err(err) => {
            error!("Relaying failed: {:?}", err);
            let response = HttpResponse::InternalServerError()
                .body(format!("Error sending proxy request: {err:#}"));
            (response, 500)
        }
    };

    ctx.metrics
        .observe_chain(ChainedRequest {
            latency_ms: received_at.elapsed().as_millis() as i64,
            request_id,
            sla_id,
            tags,
            status: status.to_string(),
            timestamp: Utc::now(),
        })
        .await;

    response
}
