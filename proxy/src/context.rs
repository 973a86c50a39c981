use crate::monitoring::MetricsSink;
use anyhow::{Context, Result};
use reqwest::Url;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
pub struct AppContext {
    /// Client used for direct hops
    pub client:        ClientWithMiddleware,
    /// Deadline for the whole chain, all hops included
    pub chain_timeout: Duration,
    pub metrics:       Arc<dyn MetricsSink>,
}

impl AppContext {
    pub fn new(
        chain_timeout: Duration,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let client = ClientBuilder::new(reqwest::Client::new()).build();
        Self { client, chain_timeout, metrics }
    }

    /// The client for a single hop. A redirection may name a forward proxy
    /// through which the next hop must be reached; that needs a dedicated
    /// client since the proxy is a property of the whole client in reqwest.
    pub fn hop_client(
        &self,
        forward_proxy: Option<&Url>,
    ) -> Result<ClientWithMiddleware> {
        let Some(proxy_url) = forward_proxy else {
            return Ok(self.client.clone());
        };
        let proxy = reqwest::Proxy::all(proxy_url.clone()).with_context(
            || format!("Cannot use {proxy_url} as a forward proxy"),
        )?;
        let client = reqwest::Client::builder()
            .proxy(proxy)
            .build()
            .context("Cannot build the forwarding HTTP client")?;
        Ok(ClientBuilder::new(client).build())
    }
}
