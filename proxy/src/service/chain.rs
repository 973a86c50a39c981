use crate::context::AppContext;
use crate::protocol::{
    header_str, strip_protocol_headers, strip_transport_headers,
    HEADER_PROXY_TIMESTAMP, HEADER_REDIRECT, HEADER_REDIRECT_PROXY,
    HEADER_REQUEST_ID,
};
use anyhow::{ensure, Context, Result};
use bytes::Bytes;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use std::time::Instant;
use tracing::trace;

pub const MAX_HOPS: u32 = 16;

/// Inbound request already converted to the client-side types the relay
/// works with.
#[derive(Debug)]
pub struct ProxiedRequest {
    pub method:     Method,
    pub target:     Url,
    pub headers:    HeaderMap,
    pub body:       Bytes,
    /// Correlation id, taken from the inbound request or minted on entry
    pub request_id: String,
}

/// Terminal response of a chain, ready to go back to the caller.
#[derive(Debug)]
pub struct ChainOutcome {
    pub status:  StatusCode,
    pub headers: HeaderMap,
    pub body:    Bytes,
    pub hops:    u32,
}

/// Relay the request hop by hop until a response carries no redirection.
/// The response of each intermediate hop becomes the request of the next
/// one, its headers taking precedence over the accumulated ones. Only a 200
/// response continues the chain; anything else goes back to the caller as
/// is, redirection or not.
pub async fn follow_chain(
    ctx: &AppContext,
    inbound: ProxiedRequest,
) -> Result<ChainOutcome> {
    let deadline = Instant::now() + ctx.chain_timeout;
    let request_id = HeaderValue::from_str(&inbound.request_id)
        .context("The request id is not a valid header value")?;

    let mut target = inbound.target;
    let mut headers = inbound.headers;
    strip_transport_headers(&mut headers);
    let mut body = inbound.body;
    let mut forward_proxy: Option<Url> = None;
    let mut hops = 0;

    loop {
        hops += 1;
        ensure!(
            hops <= MAX_HOPS,
            "Still being redirected after {MAX_HOPS} hops, assuming a loop"
        );
        let remaining = deadline.saturating_duration_since(Instant::now());
        ensure!(
            !remaining.is_zero(),
            "Chain timed out after {} completed hops",
            hops - 1
        );

        headers.insert(HEADER_REQUEST_ID, request_id.clone());
        headers.insert(
            HEADER_PROXY_TIMESTAMP,
            HeaderValue::from_str(&Utc::now().timestamp_millis().to_string())
                .context("Cannot format the proxy timestamp")?,
        );

        trace!("Relaying hop {} to {}", hops, target);
        let response = ctx
            .hop_client(forward_proxy.as_ref())?
            .request(inbound.method.clone(), target.clone())
            .headers(headers.clone())
            .body(body.clone())
            .timeout(remaining)
            .send()
            .await
            .with_context(|| format!("Hop {hops} to {target} failed"))?;

        let status = response.status();
        let mut response_headers = response.headers().clone();
        let response_body = response.bytes().await.with_context(|| {
            format!("Reading the response of hop {hops} to {target} failed")
        })?;

        let redirect = if status == StatusCode::OK {
            header_str(&response_headers, HEADER_REDIRECT)
        } else {
            // a failed hop ends the chain, its response goes back verbatim
            None
        };
        let Some(redirect) = redirect else {
            strip_transport_headers(&mut response_headers);
            strip_protocol_headers(&mut response_headers);
            return Ok(ChainOutcome {
                status,
                headers: response_headers,
                body: response_body,
                hops,
            });
        };

        let next_target = Url::parse(&redirect).with_context(|| {
            format!("Hop {hops} redirected to the invalid URL {redirect}")
        })?;
        forward_proxy = header_str(&response_headers, HEADER_REDIRECT_PROXY)
            .map(|proxy| {
                Url::parse(&proxy).with_context(|| {
                    format!(
                        "Hop {hops} named the invalid forward proxy {proxy}"
                    )
                })
            })
            .transpose()?;

        strip_transport_headers(&mut response_headers);
        response_headers.remove(HEADER_REDIRECT);
        response_headers.remove(HEADER_REDIRECT_PROXY);
        for (name, value) in headers.iter() {
            if !response_headers.contains_key(name) {
                response_headers.insert(name.clone(), value.clone());
            }
        }
        headers = response_headers;
        body = response_body;
        target = next_target;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::{ChainedRequest, MetricsSink};
    use actix_web::http::StatusCode as ActixStatus;
    use actix_web::web::Data;
    use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct NullSink;

    #[async_trait]
    impl MetricsSink for NullSink {
        async fn observe_chain(&self, _point: ChainedRequest) {}
    }

    fn test_context(timeout: Duration) -> AppContext {
        AppContext::new(timeout, Arc::new(NullSink))
    }

    fn inbound(target: &str) -> ProxiedRequest {
        ProxiedRequest {
            method:     Method::POST,
            target:     Url::parse(target).unwrap(),
            headers:    HeaderMap::new(),
            body:       Bytes::from_static(b"hello"),
            request_id: "rid-test".into(),
        }
    }

    struct Reply {
        status:  u16,
        headers: Vec<(&'static str, String)>,
        body:    &'static str,
        delay:   Duration,
    }

    impl Default for Reply {
        fn default() -> Self {
            Self {
                status:  200,
                headers: vec![],
                body:    "",
                delay:   Duration::ZERO,
            }
        }
    }

    #[derive(Default)]
    struct Captured {
        hits:    usize,
        headers: Vec<(String, String)>,
        body:    Vec<u8>,
    }

    fn header<'a>(captured: &'a Captured, name: &str) -> Option<&'a str> {
        captured
            .headers
            .iter()
            .find(|(header, _)| header == name)
            .map(|(_, value)| value.as_str())
    }

    async fn hop(
        req: HttpRequest,
        body: web::Bytes,
        reply: Data<Mutex<Reply>>,
        captured: Data<Mutex<Captured>>,
    ) -> HttpResponse {
        {
            let mut captured = captured.lock().unwrap();
            captured.hits += 1;
            captured.headers = req
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_owned(),
                        String::from_utf8_lossy(value.as_bytes())
                            .into_owned(),
                    )
                })
                .collect();
            captured.body = body.to_vec();
        }
        let (status, reply_headers, reply_body, delay) = {
            let reply = reply.lock().unwrap();
            (reply.status, reply.headers.clone(), reply.body, reply.delay)
        };
        tokio::time::sleep(delay).await;
        let mut response =
            HttpResponse::build(ActixStatus::from_u16(status).unwrap());
        for (name, value) in &reply_headers {
            response.append_header((*name, value.as_str()));
        }
        response.body(reply_body)
    }

    async fn spawn_hop(
        reply: Reply,
    ) -> (String, Data<Mutex<Reply>>, Data<Mutex<Captured>>) {
        let reply = Data::new(Mutex::new(reply));
        let captured = Data::new(Mutex::new(Captured::default()));
        let reply_shared = reply.clone();
        let captured_shared = captured.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(reply_shared.clone())
                .app_data(captured_shared.clone())
                .default_service(web::to(hop))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
        let addr = server.addrs()[0];
        tokio::spawn(server.run());
        (format!("http://{addr}/"), reply, captured)
    }

    #[actix_web::test]
    async fn a_redirection_relays_the_hop_response_to_the_next_hop() {
        let (url_b, _, captured_b) = spawn_hop(Reply {
            headers: vec![
                ("x-from-b", "b".into()),
                ("giraff-tags", "tag-b".into()),
            ],
            body: "terminal",
            ..Reply::default()
        })
        .await;
        let (url_a, _, _) = spawn_hop(Reply {
            headers: vec![
                ("giraff-redirect", url_b.clone()),
                ("x-from-a", "a".into()),
            ],
            body: "intermediate",
            ..Reply::default()
        })
        .await;

        let ctx = test_context(Duration::from_secs(5));
        let mut request = inbound(&url_a);
        request.headers.insert("x-inbound", HeaderValue::from_static("1"));
        request
            .headers
            .insert("x-from-a", HeaderValue::from_static("inbound"));
        request.request_id = "rid-1".into();

        let outcome = follow_chain(&ctx, request).await.unwrap();

        assert_eq!(outcome.status, StatusCode::OK);
        assert_eq!(outcome.hops, 2);
        assert_eq!(outcome.body, Bytes::from_static(b"terminal"));
        assert_eq!(outcome.headers.get("x-from-b").unwrap(), "b");
        // chain instructions never reach the caller
        assert!(outcome.headers.get("giraff-tags").is_none());

        let captured_b = captured_b.lock().unwrap();
        assert_eq!(captured_b.body, b"intermediate");
        assert_eq!(header(&captured_b, "x-inbound"), Some("1"));
        // the hop response wins over the inbound value
        assert_eq!(header(&captured_b, "x-from-a"), Some("a"));
        assert_eq!(header(&captured_b, "giraff-request-id"), Some("rid-1"));
        assert!(header(&captured_b, "proxy-timestamp").is_some());
        assert!(header(&captured_b, "giraff-redirect").is_none());
    }

    #[actix_web::test]
    async fn a_failed_hop_ends_the_chain_and_passes_through() {
        let (url_b, _, captured_b) =
            spawn_hop(Reply { body: "unreachable", ..Reply::default() })
                .await;
        let (url_a, _, _) = spawn_hop(Reply {
            status: 404,
            headers: vec![("giraff-redirect", url_b)],
            body: "not found here",
            ..Reply::default()
        })
        .await;

        let ctx = test_context(Duration::from_secs(5));
        let outcome = follow_chain(&ctx, inbound(&url_a)).await.unwrap();

        assert_eq!(outcome.status, StatusCode::NOT_FOUND);
        assert_eq!(outcome.hops, 1);
        assert_eq!(outcome.body, Bytes::from_static(b"not found here"));
        // the redirection of a failed hop is ignored
        assert_eq!(captured_b.lock().unwrap().hits, 0);
    }

    #[actix_web::test]
    async fn a_redirection_loop_is_cut_at_the_hop_limit() {
        let (url, reply, captured) =
            spawn_hop(Reply { body: "looping", ..Reply::default() }).await;
        reply
            .lock()
            .unwrap()
            .headers
            .push(("giraff-redirect", url.clone()));

        let ctx = test_context(Duration::from_secs(10));
        let err = follow_chain(&ctx, inbound(&url)).await.unwrap_err();

        assert!(format!("{err:#}").contains("hops"));
        assert_eq!(captured.lock().unwrap().hits as u32, MAX_HOPS);
    }

    #[actix_web::test]
    async fn the_chain_deadline_caps_slow_hops() {
        let (url, _, _) = spawn_hop(Reply {
            delay: Duration::from_millis(500),
            ..Reply::default()
        })
        .await;

        let ctx = test_context(Duration::from_millis(100));
        let err = follow_chain(&ctx, inbound(&url)).await.unwrap_err();

        assert!(format!("{err:#}").contains("Hop 1"));
    }
}
