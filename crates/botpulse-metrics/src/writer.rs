//! Point writer with a hot-swappable sink connection
//!
//! The connection is an immutable snapshot (settings plus the sink built from
//! them) held in an [`ArcSwap`]. A write loads the current snapshot once and
//! uses it until the sink answers; a reload builds a complete new snapshot
//! and installs it with read-copy-update. In-flight writes keep the snapshot
//! they started with.

use arc_swap::ArcSwap;
use botpulse_core::fail_open::fail_open;
use botpulse_core::{Result, Secret, SinkSettings};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use crate::point::{MetricRecord, Point};
use crate::sink::{http_connector, write_url, PointSink, SinkConnector};

/// Settings and the sink opened from them
pub struct SinkConnection {
    settings: SinkSettings,
    sink: Arc<dyn PointSink>,
}

impl SinkConnection {
    fn open(connector: &SinkConnector, settings: SinkSettings) -> Result<Self> {
        write_url(&settings)?;
        let sink = connector(&settings)?;
        Ok(Self { settings, sink })
    }

    pub fn settings(&self) -> &SinkSettings {
        &self.settings
    }
}

impl std::fmt::Debug for SinkConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkConnection")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Writes one point per record through the current sink connection
pub struct PointWriter {
    connection: ArcSwap<SinkConnection>,
    connector: SinkConnector,
}

impl PointWriter {
    /// Open the initial connection
    pub fn new(settings: SinkSettings, connector: SinkConnector) -> Result<Self> {
        let connection = SinkConnection::open(&connector, settings)?;
        info!(
            "Metrics sink ready at {} (bucket {})",
            connection.settings.endpoint, connection.settings.bucket
        );

        Ok(Self {
            connection: ArcSwap::from_pointee(connection),
            connector,
        })
    }

    /// Writer backed by the InfluxDB HTTP API
    pub fn http(settings: SinkSettings) -> Result<Self> {
        Self::new(settings, http_connector())
    }

    /// Current connection snapshot
    pub fn connection(&self) -> Arc<SinkConnection> {
        self.connection.load_full()
    }

    pub fn settings(&self) -> SinkSettings {
        self.connection.load().settings.clone()
    }

    /// Build a point from `record` and write it, propagating sink errors
    pub async fn try_write(&self, record: MetricRecord) -> Result<()> {
        let connection = self.connection.load_full();
        let point = Point::from_record(record, Utc::now());

        connection.sink.write(&point).await?;
        debug!(
            "Recorded '{}' ({} tags, {} fields)",
            point.measurement,
            point.tags.len(),
            point.fields.len()
        );
        Ok(())
    }

    /// Write `record`, logging and swallowing any failure
    ///
    /// Returns whether the point reached the sink.
    pub async fn write(&self, record: MetricRecord) -> bool {
        fail_open("metrics_writer", || self.try_write(record))
            .await
            .is_some()
    }

    /// Point future writes at a new endpoint
    ///
    /// An invalid endpoint is rejected and the current connection stays.
    pub fn set_endpoint(&self, endpoint: &str) -> Result<()> {
        self.reconfigure(|settings| settings.endpoint = endpoint.to_string())?;
        info!("Metrics sink endpoint changed to {}", endpoint);
        Ok(())
    }

    /// Authenticate future writes with a new credential
    pub fn set_credential(&self, credential: Secret) -> Result<()> {
        self.reconfigure(|settings| settings.credential = credential.clone())?;
        info!("Metrics sink credential changed");
        Ok(())
    }

    /// Replace the connection with one opened from modified settings
    pub fn reconfigure<F>(&self, change: F) -> Result<()>
    where
        F: Fn(&mut SinkSettings),
    {
        let mut failure = None;

        self.connection.rcu(|current| {
            failure = None;
            let mut settings = current.settings.clone();
            change(&mut settings);

            match SinkConnection::open(&self.connector, settings) {
                Ok(connection) => Arc::new(connection),
                Err(e) => {
                    failure = Some(e);
                    Arc::clone(current)
                }
            }
        });

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
