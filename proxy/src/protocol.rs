use reqwest::header::{HeaderMap, HeaderName};

/// Correlation id minted at the first hop and carried unchanged through the
/// whole chain
pub const HEADER_REQUEST_ID: HeaderName =
    HeaderName::from_static("giraff-request-id");
/// Stamped on every forwarded request with the reception time (unix millis)
pub const HEADER_PROXY_TIMESTAMP: HeaderName =
    HeaderName::from_static("proxy-timestamp");
/// Next-hop target URL, read from upstream responses
pub const HEADER_REDIRECT: HeaderName =
    HeaderName::from_static("giraff-redirect");
/// Optional forward proxy to reach the next hop
pub const HEADER_REDIRECT_PROXY: HeaderName =
    HeaderName::from_static("giraff-redirect-proxy");
pub const HEADER_TAGS: HeaderName = HeaderName::from_static("giraff-tags");
pub const HEADER_SLA_ID: HeaderName = HeaderName::from_static("giraff-sla-id");

const HOP_BY_HOP: [HeaderName; 4] = [
    reqwest::header::HOST,
    reqwest::header::CONTENT_LENGTH,
    reqwest::header::TRANSFER_ENCODING,
    reqwest::header::CONNECTION,
];

/// Remove the headers the transport manages itself; they are recomputed for
/// each hop and for the final response.
pub fn strip_transport_headers(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Remove the chain-continuation instructions; they must never reach the
/// original caller.
pub fn strip_protocol_headers(headers: &mut HeaderMap) {
    headers.remove(HEADER_REDIRECT);
    headers.remove(HEADER_REDIRECT_PROXY);
    headers.remove(HEADER_TAGS);
    headers.remove(HEADER_SLA_ID);
}

pub fn header_str(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}
