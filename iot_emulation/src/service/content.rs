use crate::context::AppContext;
use crate::model::{CronConfig, RequestContent};
use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest_middleware::{ClientWithMiddleware, RequestBuilder};
use serde::Serialize;

/// Envelope sent by ping-flavored jobs
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PingPayload<'a> {
    tag:     &'a str,
    sent_at: i64,
    from:    &'a str,
    to:      &'a str,
}

/// Build the outbound request for one send attempt, dispatched on the
/// content variant of the job. Errors abort only this attempt, never the
/// owning job.
pub async fn build_request(
    client: &ClientWithMiddleware,
    ctx: &AppContext,
    config: &CronConfig,
) -> Result<RequestBuilder> {
    match config.content {
        RequestContent::Ping => {
            let payload = PingPayload {
                tag:     &config.tags,
                sent_at: Utc::now().timestamp_micros(),
                from:    "iot_emulation",
                to:      &config.node_url,
            };
            Ok(client
                .post(&config.node_url)
                .header(CONTENT_TYPE, "application/json")
                .json(&payload))
        }
        RequestContent::Audio => {
            let path = {
                let mut rng = rand::thread_rng();
                ctx.samples.pick_audio(&mut rng).to_path_buf()
            };
            let data = tokio::fs::read(&path).await.with_context(|| {
                format!("Failed to read the audio sample {}", path.display())
            })?;
            Ok(client
                .post(&config.node_url)
                .header(CONTENT_TYPE, "audio/wav")
                .body(data))
        }
        RequestContent::Image => {
            let path = {
                let mut rng = rand::thread_rng();
                ctx.samples.pick_image(&mut rng).to_path_buf()
            };
            let filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let data = tokio::fs::read(&path).await.with_context(|| {
                format!("Failed to read the image sample {}", path.display())
            })?;
            let form =
                Form::new().part("file", Part::bytes(data).file_name(filename));
            // the multipart form sets the content type with its boundary
            Ok(client.post(&config.node_url).multipart(form))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::MetricsSink;
    use crate::repository::samples::SamplePool;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug)]
    struct NullSink;

    #[async_trait]
    impl MetricsSink for NullSink {
        async fn observe_send_failure(&self, _sla_id: &str) {}
    }

    fn test_context(samples: SamplePool) -> AppContext {
        AppContext {
            samples,
            metrics: Arc::new(NullSink),
            request_timeout: Duration::from_secs(1),
            proxy_port: 3128,
        }
    }

    fn test_config(content: RequestContent) -> CronConfig {
        CronConfig {
            function_id: "fn-1".into(),
            iot_url: "http://iot:3003/".into(),
            node_url: "http://node:5000/".into(),
            tags: "echo".into(),
            initial_wait_ms: 0.0,
            interval_ms: 100.0,
            duration_ms: 300.0,
            first_node_ip: "10.0.0.1".into(),
            content,
        }
    }

    fn client() -> ClientWithMiddleware {
        reqwest_middleware::ClientBuilder::new(reqwest::Client::new()).build()
    }

    #[tokio::test]
    async fn ping_builds_a_json_envelope() {
        let ctx = test_context(SamplePool::from_files(vec![], vec![]));
        let request = build_request(
            &client(),
            &ctx,
            &test_config(RequestContent::Ping),
        )
        .await
        .unwrap()
        .build()
        .unwrap();
        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(
            request.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body = request.body().unwrap().as_bytes().unwrap();
        let json: serde_json::Value = serde_json::from_slice(body).unwrap();
        assert_eq!(json["tag"], "echo");
        assert_eq!(json["from"], "iot_emulation");
        assert_eq!(json["to"], "http://node:5000/");
        assert!(json["sentAt"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn audio_streams_the_sample_bytes() {
        let dir = std::env::temp_dir()
            .join(format!("content_audio_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let sample = dir.join("beep.wav");
        std::fs::write(&sample, b"RIFFdata").unwrap();

        let ctx =
            test_context(SamplePool::from_files(vec![sample.clone()], vec![]));
        let request = build_request(
            &client(),
            &ctx,
            &test_config(RequestContent::Audio),
        )
        .await
        .unwrap()
        .build()
        .unwrap();
        assert_eq!(
            request.headers().get(CONTENT_TYPE).unwrap(),
            "audio/wav"
        );
        let body = request.body().unwrap().as_bytes().unwrap();
        assert_eq!(body, b"RIFFdata");
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn image_wraps_the_sample_in_a_multipart_form() {
        let dir = std::env::temp_dir()
            .join(format!("content_image_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let sample = dir.join("cat.png");
        std::fs::write(&sample, b"PNGDATA").unwrap();

        let ctx =
            test_context(SamplePool::from_files(vec![], vec![sample.clone()]));
        let request = build_request(
            &client(),
            &ctx,
            &test_config(RequestContent::Image),
        )
        .await
        .unwrap()
        .build()
        .unwrap();
        let content_type = request
            .headers()
            .get(CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(content_type.starts_with("multipart/form-data; boundary="));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn unreadable_sample_aborts_only_the_attempt() {
        let missing = std::env::temp_dir().join("content_missing/nope.wav");
        let ctx = test_context(SamplePool::from_files(vec![missing], vec![]));
        let res = build_request(
            &client(),
            &ctx,
            &test_config(RequestContent::Audio),
        )
        .await;
        assert!(res.is_err());
    }
}
