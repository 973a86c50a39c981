use async_trait::async_trait;
use chrono::{DateTime, Utc};
use helper::log_err;
use helper::monitoring::{convert_timestamp, InfluxData, MetricsExporter};
use influxdb2::models::WriteDataPoint;
use std::fmt::Debug;

/// One relayed request, measured at the entry proxy from reception of the
/// inbound request to the final response being ready.
#[derive(Debug, Clone)]
pub struct ChainedRequest {
    pub latency_ms: i64,
    pub request_id: String,
    pub sla_id:     String,
    pub tags:       String,
    pub status:     String,
    pub timestamp:  DateTime<Utc>,
}

#[derive(Debug, influxdb2_derive::WriteDataPoint)]
#[measurement = "chained_request"]
struct ChainedRequestExported {
    #[influxdb(field)]
    value:      i64,
    #[influxdb(tag)]
    request_id: String,
    #[influxdb(tag)]
    sla_id:     String,
    #[influxdb(tag)]
    tags:       String,
    #[influxdb(tag)]
    status:     String,
    #[influxdb(tag)]
    instance:   String,
    #[influxdb(timestamp)]
    timestamp:  i64,
}

impl InfluxData for ChainedRequest {
    fn export(
        self,
        instance: String,
    ) -> impl WriteDataPoint + Sync + Send + 'static {
        ChainedRequestExported {
            value: self.latency_ms,
            request_id: self.request_id,
            sla_id: self.sla_id,
            tags: self.tags,
            status: self.status,
            instance,
            timestamp: convert_timestamp(self.timestamp),
        }
    }
}

#[async_trait]
pub trait MetricsSink: Debug + Send + Sync {
    async fn observe_chain(&self, point: ChainedRequest);
}

#[derive(Debug)]
pub struct InfluxMetricsSink {
    exporter: MetricsExporter,
}

impl InfluxMetricsSink {
    pub fn new(exporter: MetricsExporter) -> Self { Self { exporter } }
}

#[async_trait]
impl MetricsSink for InfluxMetricsSink {
    async fn observe_chain(&self, point: ChainedRequest) {
        log_err!(self.exporter.observe(point).await);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exports_the_latency_as_the_value_field() {
        let point = ChainedRequest {
            latency_ms: 12,
            request_id: "rid-1".into(),
            sla_id:     "sla-1".into(),
            tags:       "echo".into(),
            status:     "200".into(),
            timestamp:  Utc::now(),
        };
        let mut line = Vec::new();
        point
            .export("proxy-1".into())
            .write_data_point_to(&mut line)
            .unwrap();
        let line = String::from_utf8(line).unwrap();
        assert!(line.starts_with("chained_request,"));
        assert!(line.contains("value=12i"));
        assert!(line.contains("request_id=rid-1"));
        assert!(line.contains("status=200"));
        assert!(line.contains("instance=proxy-1"));
    }
}
