// Republishing of robot state to downstream consumers

use std::future::Future;

use serde::Serialize;
use tracing::info;
use zenoh::Session;
use zenoh::pubsub::Publisher;

use crate::config::Topics;
use crate::messages::{StateSample, Stamped};

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Failed to encode telemetry: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to publish on {topic}: {reason}")]
    Publish { topic: String, reason: String },
}

/// Consumer of the per-cycle state sample
pub trait TelemetrySink {
    fn publish(&mut self, sample: &StateSample) -> impl Future<Output = Result<(), TelemetryError>>;
}

/// Publishes each part of the sample as JSON on its own key expression
pub struct ZenohTelemetry {
    odom: Publisher<'static>,
    imu: Publisher<'static>,
    bms: Publisher<'static>,
    health: Publisher<'static>,
}

impl ZenohTelemetry {
    pub async fn declare(session: &Session, topics: &Topics) -> zenoh::Result<Self> {
        let telemetry = Self {
            odom: session.declare_publisher(topics.odom.clone()).await?,
            imu: session.declare_publisher(topics.imu.clone()).await?,
            bms: session.declare_publisher(topics.bms.clone()).await?,
            health: session.declare_publisher(topics.health.clone()).await?,
        };
        info!(
            "Publishing to: {}, {}, {}, {}",
            topics.odom, topics.imu, topics.bms, topics.health
        );
        Ok(telemetry)
    }
}

async fn put_json<T: Serialize>(publisher: &Publisher<'_>, value: &T) -> Result<(), TelemetryError> {
    let json = serde_json::to_string(value)?;
    publisher
        .put(json)
        .await
        .map_err(|e| TelemetryError::Publish {
            topic: publisher.key_expr().to_string(),
            reason: e.to_string(),
        })
}

impl TelemetrySink for ZenohTelemetry {
    async fn publish(&mut self, sample: &StateSample) -> Result<(), TelemetryError> {
        let stamp = sample.stamp;
        put_json(&self.odom, &Stamped { stamp, data: &sample.odometry }).await?;
        put_json(&self.imu, &Stamped { stamp, data: &sample.imu }).await?;
        put_json(&self.bms, &Stamped { stamp, data: &sample.battery }).await?;
        put_json(&self.health, &sample.health).await
    }
}
