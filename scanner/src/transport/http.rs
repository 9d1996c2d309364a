use anyhow::Context;
use tokio::time::Duration;
use url::Url;

use crate::{error::DeliveryError, model::Observation};

use super::Transport;

/// POSTs each observation as JSON to the collector
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpTransport {
    pub fn new(base_url: &Url, endpoint_path: &str, request_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .use_rustls_tls()
            .timeout(request_timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Self::with_client(client, base_url, endpoint_path)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: &Url,
        endpoint_path: &str,
    ) -> anyhow::Result<Self> {
        let endpoint = base_url
            .join(endpoint_path)
            .with_context(|| format!("Invalid endpoint path {endpoint_path} for {base_url}"))?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl Transport for HttpTransport {
    async fn deliver(&self, observation: &Observation) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(observation)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            tracing::debug!("Collector responded {} for {}", status, observation);
            Err(DeliveryError::Rejected(status))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        net::SocketAddr,
        sync::{Arc, Mutex},
    };

    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use tokio::net::TcpListener;

    use crate::testing::common::observation;

    #[derive(Clone, Default)]
    struct Collector {
        received: Arc<Mutex<Vec<Observation>>>,
        reject_with: Arc<Mutex<Option<StatusCode>>>,
    }

    async fn record_rssi(
        State(collector): State<Collector>,
        Json(observation): Json<Observation>,
    ) -> StatusCode {
        if let Some(status) = *collector.reject_with.lock().unwrap() {
            return status;
        }
        collector.received.lock().unwrap().push(observation);
        StatusCode::CREATED
    }

    async fn spawn_collector(collector: Collector) -> SocketAddr {
        let router = Router::new()
            .route("/api/location/rssi", post(record_rssi))
            .with_state(collector);

        // Bind to port 0 to get a random available port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn transport(addr: SocketAddr) -> HttpTransport {
        let base_url = Url::parse(&format!("http://{addr}/api/")).unwrap();
        HttpTransport::new(&base_url, "location/rssi", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        let base_url = Url::parse("http://10.0.0.2:8080/").unwrap();
        let transport =
            HttpTransport::new(&base_url, "location/rssi", Duration::from_secs(1)).unwrap();
        assert_eq!(
            transport.endpoint().as_str(),
            "http://10.0.0.2:8080/location/rssi"
        );
    }

    #[tokio::test]
    async fn test_delivers_json_observation() {
        let collector = Collector::default();
        let addr = spawn_collector(collector.clone()).await;

        let sent = observation("RC_CAR_001", "Anchor1", 1_700_000_000_000);
        transport(addr).deliver(&sent).await.unwrap();

        let received = collector.received.lock().unwrap().clone();
        assert_eq!(received, vec![sent]);
    }

    #[tokio::test]
    async fn test_non_success_status_is_rejection() {
        let collector = Collector::default();
        *collector.reject_with.lock().unwrap() = Some(StatusCode::SERVICE_UNAVAILABLE);
        let addr = spawn_collector(collector.clone()).await;

        let result = transport(addr)
            .deliver(&observation("RC_CAR_001", "Anchor1", 1))
            .await;

        assert_eq!(
            result,
            Err(DeliveryError::Rejected(StatusCode::SERVICE_UNAVAILABLE))
        );
        assert!(collector.received.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_failure() {
        // Grab a free port, then close it again
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = transport(addr)
            .deliver(&observation("RC_CAR_001", "Anchor1", 1))
            .await;

        assert!(matches!(result, Err(DeliveryError::Transport(_))));
    }
}
