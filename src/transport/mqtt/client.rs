//! I/O side of the rumqttc adapter
//!
//! `connect` drives the event loop until the broker acknowledges the
//! connection, then hands the loop to a background task. There is no
//! reconnection: once the loop reports an error the client is disconnected.
//!
//! QoS 1 publishes are counted until the background loop sees their PUBACK;
//! [`RumqttcClient::wait_for_acks`] waits for that count to drain.

use super::connection::{configure_mqtt_options, to_qos, MqttError};
use crate::options::{ConnectionParams, QualityOfService};
use crate::transport::{ClientFactory, DeviceClient};
use async_trait::async_trait;
use rumqttc::v5::mqttbytes::v5::{Packet, PubAckReason};
use rumqttc::v5::{AsyncClient, Event, EventLoop};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long `connect` waits for CONNACK by default
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Grace period for the event loop to flush DISCONNECT
const DISCONNECT_GRACE: Duration = Duration::from_secs(5);

/// Builds [`RumqttcClient`]s
#[derive(Debug, Clone)]
pub struct RumqttcFactory {
    pub connect_timeout: Duration,
}

impl Default for RumqttcFactory {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl RumqttcFactory {
    pub fn with_connect_timeout(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl ClientFactory for RumqttcFactory {
    type Client = RumqttcClient;
    type Error = MqttError;

    fn create(&self, params: ConnectionParams) -> Result<RumqttcClient, MqttError> {
        let mqtt_options = configure_mqtt_options(&params)?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, params.channel_capacity);

        Ok(RumqttcClient {
            client_id: params.client_id,
            client,
            event_loop: Some(Mutex::new(event_loop)),
            connect_timeout: self.connect_timeout,
            connected: Arc::new(AtomicBool::new(false)),
            pending_acks: Arc::new(watch::channel(0usize).0),
            event_loop_handle: None,
        })
    }
}

/// MQTT v5 client for one device, backed by rumqttc
pub struct RumqttcClient {
    client_id: String,
    client: AsyncClient,
    event_loop: Option<Mutex<EventLoop>>,
    connect_timeout: Duration,
    connected: Arc<AtomicBool>,
    /// QoS 1 publishes still waiting for PUBACK
    pending_acks: Arc<watch::Sender<usize>>,
    event_loop_handle: Option<JoinHandle<()>>,
}

impl RumqttcClient {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Number of QoS 1 publishes the broker has not acknowledged yet
    pub fn pending_acks(&self) -> usize {
        *self.pending_acks.borrow()
    }

    /// Wait until every QoS 1 publish has been acknowledged
    ///
    /// Fails with `NotConnected` if the connection drops first.
    pub async fn wait_for_acks(&self, timeout: Duration) -> Result<(), MqttError> {
        let mut pending = self.pending_acks.subscribe();
        let connected = self.connected.clone();

        let drained = async move {
            loop {
                if *pending.borrow_and_update() == 0 {
                    return Ok(());
                }
                if !connected.load(Ordering::SeqCst) {
                    return Err(MqttError::NotConnected);
                }
                if pending.changed().await.is_err() {
                    return Err(MqttError::NotConnected);
                }
            }
        };

        tokio::time::timeout(timeout, drained)
            .await
            .map_err(|_| MqttError::AckTimeout(timeout))?
    }

    /// Poll until CONNACK; refusals surface as event loop errors
    async fn wait_for_connack(event_loop: &mut EventLoop) -> Result<(), MqttError> {
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
                Ok(event) => debug!(target: "mqtt_transport", "Event before CONNACK: {:?}", event),
                Err(e) => return Err(MqttError::ConnectionFailed(Box::new(e))),
            }
        }
    }

    fn spawn_event_loop(&mut self, mut event_loop: EventLoop) {
        let connected = self.connected.clone();
        let pending_acks = self.pending_acks.clone();
        let client_id = self.client_id.clone();

        let handle = tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::PubAck(ack))) => {
                        if ack.reason == PubAckReason::Success {
                            debug!(target: "mqtt_transport", pkid = ack.pkid, "PUBACK received");
                        } else {
                            warn!(client_id = %client_id, pkid = ack.pkid, reason = ?ack.reason, "Publish rejected by broker");
                        }
                        pending_acks.send_modify(|n| *n = n.saturating_sub(1));
                    }
                    Ok(event) => debug!(target: "mqtt_transport", "MQTT event: {:?}", event),
                    Err(e) => {
                        if connected.swap(false, Ordering::SeqCst) {
                            warn!(client_id = %client_id, error = %e, "MQTT connection lost");
                        }
                        // Wake anyone in wait_for_acks
                        pending_acks.send_modify(|_| {});
                        break;
                    }
                }
            }
            debug!(client_id = %client_id, "MQTT event loop stopped");
        });

        self.event_loop_handle = Some(handle);
    }
}

#[async_trait]
impl DeviceClient for RumqttcClient {
    type Error = MqttError;

    async fn connect(&mut self) -> Result<(), MqttError> {
        if self.is_connected() {
            return Err(MqttError::AlreadyConnected);
        }
        let mut event_loop = self
            .event_loop
            .take()
            .ok_or(MqttError::EventLoopConsumed)?
            .into_inner();

        info!(client_id = %self.client_id, "Connecting to MQTT broker");
        tokio::time::timeout(self.connect_timeout, Self::wait_for_connack(&mut event_loop))
            .await
            .map_err(|_| MqttError::ConnectTimeout(self.connect_timeout))??;

        self.connected.store(true, Ordering::SeqCst);
        self.spawn_event_loop(event_loop);
        info!(client_id = %self.client_id, "Connected to MQTT broker");
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        qos: QualityOfService,
        retain: bool,
        payload: Vec<u8>,
    ) -> Result<(), MqttError> {
        if !self.is_connected() {
            return Err(MqttError::NotConnected);
        }

        let acknowledged = qos == QualityOfService::AtLeastOnce;
        if acknowledged {
            self.pending_acks.send_modify(|n| *n += 1);
        }

        let result = self
            .client
            .publish(topic, to_qos(qos), retain, payload)
            .await;
        if let Err(e) = result {
            if acknowledged {
                self.pending_acks.send_modify(|n| *n = n.saturating_sub(1));
            }
            return Err(MqttError::PublishFailed(Box::new(e)));
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), MqttError> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Err(MqttError::NotConnected);
        }

        self.client
            .disconnect()
            .await
            .map_err(|e| MqttError::DisconnectFailed(Box::new(e)))?;

        if let Some(mut handle) = self.event_loop_handle.take() {
            if tokio::time::timeout(DISCONNECT_GRACE, &mut handle).await.is_err() {
                handle.abort();
            }
        }

        info!(client_id = %self.client_id, "Disconnected from MQTT broker");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for RumqttcClient {
    fn drop(&mut self) {
        if let Some(handle) = self.event_loop_handle.take() {
            handle.abort();
        }
    }
}
