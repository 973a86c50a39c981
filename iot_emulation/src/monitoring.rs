use async_trait::async_trait;
use chrono::{DateTime, Utc};
use helper::log_err;
use helper::monitoring::{convert_timestamp, InfluxData, MetricsExporter};
use influxdb2::models::WriteDataPoint;
use std::fmt::Debug;

/// One failed send attempt toward the first hop
pub struct ProxySend {
    pub value:     i64,
    pub sla_id:    String,
    pub timestamp: DateTime<Utc>,
}

#[derive(influxdb2_derive::WriteDataPoint)]
#[measurement = "proxy_send"]
pub struct ProxySendExported {
    #[influxdb(field)]
    pub value:     i64,
    #[influxdb(tag)]
    pub sla_id:    String,
    #[influxdb(tag)]
    pub instance:  String,
    #[influxdb(timestamp)]
    pub timestamp: i64,
}

impl InfluxData for ProxySend {
    fn export(
        self,
        instance: String,
    ) -> impl WriteDataPoint + Sync + Send + 'static {
        ProxySendExported {
            value: self.value,
            sla_id: self.sla_id,
            instance,
            timestamp: convert_timestamp(self.timestamp),
        }
    }
}

/// Write seam for dispatch telemetry, so the scheduling path does not need
/// a live database to be exercised.
#[async_trait]
pub trait MetricsSink: Debug + Send + Sync {
    async fn observe_send_failure(&self, sla_id: &str);
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
    async fn observe_send_failure(&self, sla_id: &str) {
        let point = ProxySend {
            value:     1,
            sla_id:    sla_id.to_owned(),
            timestamp: Utc::now(),
        };
        log_err!(self.exporter.observe(point).await);
    }
}
