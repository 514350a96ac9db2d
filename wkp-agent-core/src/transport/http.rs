//! HTTP transport using the CloudEvents binary content mode.
//!
//! The envelope's attributes travel as `ce-*` headers and the payload is the
//! request body, so the collector can route on headers without parsing the
//! body.

use crate::config::TransportConfig;
use crate::transport::{DeliveryOutcome, Transport, TransportError};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use time::format_description::well_known::Rfc3339;
use tracing::debug;
use url::Url;
use wkp_agent_sdk::EventEnvelope;

pub const HEADER_SPEC_VERSION: &str = "ce-specversion";
pub const HEADER_ID: &str = "ce-id";
pub const HEADER_SOURCE: &str = "ce-source";
pub const HEADER_TYPE: &str = "ce-type";
pub const HEADER_TIME: &str = "ce-time";

/// Posts every envelope to a single collector endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    url: Url,
    http_client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            url: config.url.clone(),
            http_client,
        })
    }

    async fn post(&self, envelope: &EventEnvelope) -> Result<DeliveryOutcome, TransportError> {
        let occurred_at = envelope.occurred_at().format(&Rfc3339)?;

        let response = self
            .http_client
            .post(self.url.clone())
            .header(HEADER_SPEC_VERSION, envelope.spec_version())
            .header(HEADER_ID, envelope.id().to_string())
            .header(HEADER_SOURCE, envelope.source())
            .header(HEADER_TYPE, envelope.event_type())
            .header(HEADER_TIME, occurred_at)
            .header(CONTENT_TYPE, envelope.content_type())
            .body(envelope.body().clone())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(id = %envelope.id(), status = %status, "Envelope accepted");
            Ok(DeliveryOutcome::Delivered)
        } else {
            let body = response.text().await.unwrap_or_default();
            Ok(DeliveryOutcome::Undelivered(format!(
                "status {}: {}",
                status.as_u16(),
                body
            )))
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, envelope: &EventEnvelope) -> DeliveryOutcome {
        self.post(envelope)
            .await
            .unwrap_or_else(DeliveryOutcome::TransportError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use bytes::Bytes;
    use serde::{Deserialize, Serialize};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use wkp_agent_sdk::EventPayload;

    #[derive(Debug, Serialize, Deserialize)]
    struct Ping {
        seq: u32,
    }

    impl EventPayload for Ping {
        const EVENT_TYPE: &'static str = "Ping";
    }

    type Captured = Arc<Mutex<Vec<(HeaderMap, Bytes)>>>;

    async fn collector(status: StatusCode) -> (Url, Captured) {
        let captured: Captured = Arc::default();
        let sink = Arc::clone(&captured);
        let app = Router::new().route(
            "/events",
            post(move |headers: HeaderMap, body: Bytes| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().unwrap().push((headers, body));
                    (status, "collector says no")
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let url = Url::parse(&format!("http://{addr}/events")).unwrap();
        (url, captured)
    }

    fn transport(url: Url) -> HttpTransport {
        HttpTransport::new(&TransportConfig {
            url,
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_posts_binary_mode_cloudevent() {
        let (url, captured) = collector(StatusCode::ACCEPTED).await;
        let envelope = EventEnvelope::new("wkp-agent", &Ping { seq: 3 }).unwrap();

        let outcome = transport(url).send(&envelope).await;
        assert!(outcome.is_delivered());

        let captured = captured.lock().unwrap();
        let (headers, body) = &captured[0];
        assert_eq!(headers[HEADER_SPEC_VERSION], "1.0");
        assert_eq!(headers[HEADER_ID], envelope.id().to_string().as_str());
        assert_eq!(headers[HEADER_SOURCE], "wkp-agent");
        assert_eq!(headers[HEADER_TYPE], "Ping");
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert!(headers.contains_key(HEADER_TIME));
        assert_eq!(body, envelope.body());
    }

    #[tokio::test]
    async fn test_rejection_is_undelivered() {
        let (url, _captured) = collector(StatusCode::INTERNAL_SERVER_ERROR).await;
        let envelope = EventEnvelope::new("wkp-agent", &Ping { seq: 3 }).unwrap();

        match transport(url).send(&envelope).await {
            DeliveryOutcome::Undelivered(reason) => {
                assert_eq!(reason, "status 500: collector says no");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_collector_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = Url::parse(&format!("http://{addr}/events")).unwrap();
        let envelope = EventEnvelope::new("wkp-agent", &Ping { seq: 3 }).unwrap();

        assert!(matches!(
            transport(url).send(&envelope).await,
            DeliveryOutcome::TransportError(TransportError::Request(_))
        ));
    }
}
