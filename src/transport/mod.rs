//! Transport seam to the external MQTT client
//!
//! The configurator never talks to the network. It hands finished
//! [`ConnectionParams`] to a [`ClientFactory`], and callers drive the
//! resulting [`DeviceClient`]. The `rumqttc` adapter lives in [`mqtt`];
//! [`crate::testing`] provides an in-memory implementation.

use crate::device::Device;
use crate::options::{ConnectionParams, QualityOfService};

pub mod mqtt;

/// Builds a connectable client from assembled connection parameters
pub trait ClientFactory {
    type Client;
    type Error: std::error::Error + Send + Sync + 'static;

    fn create(&self, params: ConnectionParams) -> Result<Self::Client, Self::Error>;
}

/// The subset of MQTT client behaviour a device needs
#[async_trait::async_trait]
pub trait DeviceClient: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Connect and wait for the broker's CONNACK
    async fn connect(&mut self) -> Result<(), Self::Error>;

    async fn publish(
        &self,
        topic: &str,
        qos: QualityOfService,
        retain: bool,
        payload: Vec<u8>,
    ) -> Result<(), Self::Error>;

    async fn disconnect(&mut self) -> Result<(), Self::Error>;

    fn is_connected(&self) -> bool;
}

/// Publish `payload` to the device's telemetry topic with QoS 1
pub async fn publish_telemetry<C>(client: &C, device: &Device, payload: Vec<u8>) -> Result<(), C::Error>
where
    C: DeviceClient + ?Sized,
{
    let topic = device.telemetry_topic();
    tracing::debug!(topic = %topic, bytes = payload.len(), "Publishing telemetry");
    client
        .publish(&topic, QualityOfService::AtLeastOnce, false, payload)
        .await
}
