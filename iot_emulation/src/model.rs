use anyhow::anyhow;
use helper::err::IndividualErrorList;
use serde::Deserialize;

/// Closed set of payload kinds a job can emit. Decoding an unknown tag
/// fails at registration time instead of silently defaulting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestContent {
    Ping,
    Audio,
    Image,
}

/// One traffic-generation job, immutable once registered.
///
/// Field names mirror the wire format of the registration API, including
/// the historical `intialWaitMs` spelling the orchestrator sends.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronConfig {
    pub function_id:   String,
    pub iot_url:       String,
    pub node_url:      String,
    pub tags:          String,
    #[serde(rename = "intialWaitMs", default)]
    pub initial_wait_ms: f64,
    pub interval_ms:   f64,
    pub duration_ms:   f64,
    pub first_node_ip: String,
    pub content:       RequestContent,
}

impl CronConfig {
    /// Field-level validation; all offending fields are reported at once.
    pub fn validate(&self) -> Result<(), IndividualErrorList> {
        let mut errors = IndividualErrorList::default();
        if self.interval_ms < 1.0 {
            errors.push(anyhow!(
                "intervalMs must be >= 1 (got {})",
                self.interval_ms
            ));
        }
        if self.duration_ms < 1.0 {
            errors.push(anyhow!(
                "durationMs must be >= 1 (got {})",
                self.duration_ms
            ));
        }
        if self.initial_wait_ms < 0.0 {
            errors.push(anyhow!(
                "intialWaitMs cannot be negative (got {})",
                self.initial_wait_ms
            ));
        }
        if self.function_id.is_empty() {
            errors.push(anyhow!("functionId cannot be empty"));
        }
        if self.iot_url.is_empty() {
            errors.push(anyhow!("iotUrl cannot be empty"));
        }
        if self.node_url.is_empty() {
            errors.push(anyhow!("nodeUrl cannot be empty"));
        }
        if self.first_node_ip.is_empty() {
            errors.push(anyhow!("firstNodeIp cannot be empty"));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
