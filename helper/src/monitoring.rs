use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::stream;
use influxdb2::models::WriteDataPoint;
use influxdb2::Client;
use nutype::nutype;
use std::time::Duration;
use tokio::time::timeout;

#[nutype(
    derive(Clone, Debug, Deserialize),
    validate(predicate = validate_host_port)
)]
pub struct InfluxAddress(String);

#[nutype(
    derive(Clone, Debug),
    validate(len_char_min = 3, len_char_max = 64, not_empty)
)]
pub struct InfluxBucket(String);

#[nutype(derive(Clone, Debug), validate(not_empty))]
pub struct InfluxToken(String);

#[nutype(
    derive(Clone, Debug),
    validate(len_char_min = 3, len_char_max = 64, not_empty)
)]
pub struct InfluxOrg(String);

#[nutype(
    derive(Clone, Debug, Deserialize),
    validate(len_char_min = 3, len_char_max = 64, not_empty)
)]
pub struct InstanceName(String);

fn validate_host_port(input: &str) -> bool {
    let collection = input.split(':').collect::<Vec<&str>>();
    if collection.len() != 2 {
        return false;
    }
    let Some(host) = collection.first() else {
        return false;
    };
    if host.is_empty() {
        return false;
    }
    match collection.get(1).map(|port| port.parse::<usize>()) {
        Some(Ok(port)) => port > 0 && port < 65536,
        _ => false,
    }
}

/// Single place deciding the time precision sent to the database, so each
/// metric definition does not have to repeat it
pub fn convert_timestamp(timestamp: DateTime<Utc>) -> i64 {
    timestamp.timestamp_millis()
}

/// A measurement that can be exported to the InfluxDB2 database, tagged with
/// the name of the instance that observed it
pub trait InfluxData {
    fn export(
        self,
        instance: String,
    ) -> impl WriteDataPoint + Sync + Send + 'static;
}

#[derive(Debug)]
pub struct MetricsExporter {
    database: Client,
    instance: InstanceName,
    bucket:   InfluxBucket,
}

impl MetricsExporter {
    pub async fn new(
        address: InfluxAddress,
        org: InfluxOrg,
        token: InfluxToken,
        bucket: InfluxBucket,
        instance: InstanceName,
    ) -> Result<Self> {
        let ret = Self {
            database: Client::new(
                format!("http://{}", address.into_inner()),
                org.into_inner(),
                token.into_inner(),
            ),
            instance,
            bucket,
        };
        timeout(Duration::from_secs(1), ret.database.health())
            .await
            .context("Database health request timed out")?
            .context("Database health request failed")?;
        timeout(Duration::from_secs(1), ret.database.ready())
            .await
            .context("Database timed out waiting to be ready")?
            .context("Database is not ready")?;
        Ok(ret)
    }

    /// Write a single point; the call completes only once the database
    /// acknowledged the write, so nothing stays buffered at shutdown
    pub async fn observe(&self, data: impl InfluxData) -> Result<()> {
        let points = vec![data.export(self.instance.clone().into_inner())];
        self.database
            .write_with_precision(
                &self.bucket.clone().into_inner(),
                stream::iter(points),
                influxdb2::api::write::TimestampPrecision::Milliseconds,
            )
            .await
            .context("Failed to write to influxdb2 database")?;
        Ok(())
    }
}
