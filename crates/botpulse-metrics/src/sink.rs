//! Time-series sinks
//!
//! A sink accepts one point per call. [`HttpSink`] speaks the InfluxDB v2
//! write API; [`MemorySink`] keeps points in memory for dry runs and tests.

use async_trait::async_trait;
use botpulse_core::{BotpulseError, Precision, Result, Secret, SinkSettings};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::point::Point;

/// Destination for points
#[async_trait]
pub trait PointSink: Send + Sync {
    /// Write a single point, returning once the sink acknowledged it
    async fn write(&self, point: &Point) -> Result<()>;
}

/// Builds a sink from connection settings
pub type SinkConnector = Arc<dyn Fn(&SinkSettings) -> Result<Arc<dyn PointSink>> + Send + Sync>;

/// Connector producing [`HttpSink`]s
pub fn http_connector() -> SinkConnector {
    Arc::new(|settings: &SinkSettings| -> Result<Arc<dyn PointSink>> {
        Ok(Arc::new(HttpSink::connect(settings)?))
    })
}

/// Connector that hands out the same sink whatever the settings
pub fn fixed_connector(sink: Arc<dyn PointSink>) -> SinkConnector {
    Arc::new(move |_: &SinkSettings| -> Result<Arc<dyn PointSink>> { Ok(Arc::clone(&sink)) })
}

/// Write endpoint for `settings`: `{endpoint}/api/v2/write?org=..&bucket=..&precision=..`
pub fn write_url(settings: &SinkSettings) -> Result<Url> {
    let invalid = |reason: String| BotpulseError::InvalidEndpoint {
        endpoint: settings.endpoint.clone(),
        reason,
    };

    let mut url = Url::parse(&settings.endpoint).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }

    url.path_segments_mut()
        .map_err(|_| invalid("cannot be a base URL".to_string()))?
        .pop_if_empty()
        .extend(["api", "v2", "write"]);

    url.query_pairs_mut()
        .append_pair("org", &settings.organization)
        .append_pair("bucket", &settings.bucket)
        .append_pair("precision", settings.precision.as_str());

    Ok(url)
}

/// InfluxDB v2 HTTP writer
///
/// Every write is its own request: no buffering between calls.
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    write_url: Url,
    credential: Secret,
    precision: Precision,
}

impl HttpSink {
    pub fn connect(settings: &SinkSettings) -> Result<Self> {
        let write_url = write_url(settings)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| BotpulseError::Sink(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            write_url,
            credential: settings.credential.clone(),
            precision: settings.precision,
        })
    }
}

#[async_trait]
impl PointSink for HttpSink {
    async fn write(&self, point: &Point) -> Result<()> {
        let body = point.to_line_protocol(self.precision)?;

        let mut request = self
            .client
            .post(self.write_url.clone())
            .header(CONTENT_TYPE, "text/plain; charset=utf-8");
        if !self.credential.is_empty() {
            request = request.header(AUTHORIZATION, format!("Token {}", self.credential.expose()));
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| BotpulseError::Sink(format!("Failed to send point: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown".to_string());
            return Err(BotpulseError::SinkRejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!("Wrote point '{}' to {}", point.measurement, self.write_url);
        Ok(())
    }
}

/// Keeps every written point in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    points: Mutex<Vec<Point>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Points written so far, oldest first
    pub async fn points(&self) -> Vec<Point> {
        self.points.lock().await.clone()
    }

    /// Remove and return the points written so far
    pub async fn drain(&self) -> Vec<Point> {
        std::mem::take(&mut *self.points.lock().await)
    }

    pub async fn len(&self) -> usize {
        self.points.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.points.lock().await.is_empty()
    }
}

#[async_trait]
impl PointSink for MemorySink {
    async fn write(&self, point: &Point) -> Result<()> {
        self.points.lock().await.push(point.clone());
        Ok(())
    }
}
