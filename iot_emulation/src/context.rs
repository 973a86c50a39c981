use crate::monitoring::MetricsSink;
use crate::repository::samples::SamplePool;
use std::sync::Arc;
use std::time::Duration;

/// Everything a job needs at runtime, passed around explicitly instead of
/// living in package-level globals.
#[derive(Debug)]
pub struct AppContext {
    pub samples:         SamplePool,
    pub metrics:         Arc<dyn MetricsSink>,
    pub request_timeout: Duration,
    pub proxy_port:      u16,
}
