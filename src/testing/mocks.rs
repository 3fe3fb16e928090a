//! Mock implementations for testing
//!
//! [`MockClientFactory`] records every set of connection parameters it is
//! given and hands out [`MockDeviceClient`]s that keep published messages in
//! memory.

use crate::options::{ConnectionParams, QualityOfService};
use crate::transport::{ClientFactory, DeviceClient};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

/// Topic, QoS, retain flag and payload of one publish
pub type PublishedMessage = (String, QualityOfService, bool, Vec<u8>);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MockError {
    #[error("Mock {0} failure")]
    Injected(&'static str),
    #[error("Not connected")]
    NotConnected,
}

/// Mock client factory for testing
#[derive(Debug, Default, Clone)]
pub struct MockClientFactory {
    pub created: Arc<std::sync::Mutex<Vec<ConnectionParams>>>,
    pub should_fail: bool,
    pub client_should_fail: bool,
}

impl MockClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory whose `create` always fails
    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    /// Factory that creates clients whose operations fail
    pub fn with_failing_clients() -> Self {
        Self {
            client_should_fail: true,
            ..Default::default()
        }
    }

    /// Connection parameters passed to `create`, oldest first
    pub fn created_params(&self) -> Vec<ConnectionParams> {
        match self.created.lock() {
            Ok(created) => created.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ClientFactory for MockClientFactory {
    type Client = MockDeviceClient;
    type Error = MockError;

    fn create(&self, params: ConnectionParams) -> Result<MockDeviceClient, MockError> {
        if self.should_fail {
            return Err(MockError::Injected("factory"));
        }

        let client = MockDeviceClient {
            client_id: params.client_id.clone(),
            should_fail: self.client_should_fail,
            ..Default::default()
        };
        match self.created.lock() {
            Ok(mut created) => created.push(params),
            Err(poisoned) => poisoned.into_inner().push(params),
        }
        Ok(client)
    }
}

/// Mock device client for testing
#[derive(Debug, Default)]
pub struct MockDeviceClient {
    pub client_id: String,
    pub published_messages: Arc<Mutex<Vec<PublishedMessage>>>,
    pub connected: AtomicBool,
    pub should_fail: bool,
}

impl MockDeviceClient {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            ..Default::default()
        }
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub async fn get_published_messages(&self) -> Vec<PublishedMessage> {
        self.published_messages.lock().await.clone()
    }

    pub async fn clear_history(&self) {
        self.published_messages.lock().await.clear();
    }
}

#[async_trait]
impl DeviceClient for MockDeviceClient {
    type Error = MockError;

    async fn connect(&mut self) -> Result<(), MockError> {
        if self.should_fail {
            return Err(MockError::Injected("connection"));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        qos: QualityOfService,
        retain: bool,
        payload: Vec<u8>,
    ) -> Result<(), MockError> {
        if self.should_fail {
            return Err(MockError::Injected("publish"));
        }
        if !self.is_connected() {
            return Err(MockError::NotConnected);
        }

        let mut messages = self.published_messages.lock().await;
        messages.push((topic.to_string(), qos, retain, payload));
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), MockError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::DeviceFiles;
    use crate::transport::publish_telemetry;

    #[tokio::test]
    async fn test_mock_client_publish() {
        let mut client = MockDeviceClient::new("dev-1");
        client.connect().await.unwrap();
        client
            .publish("a/b", QualityOfService::AtMostOnce, true, b"hi".to_vec())
            .await
            .unwrap();

        let messages = client.get_published_messages().await;
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0],
            ("a/b".to_string(), QualityOfService::AtMostOnce, true, b"hi".to_vec())
        );

        client.clear_history().await;
        assert!(client.get_published_messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_mock_client_requires_connect() {
        let client = MockDeviceClient::new("dev-1");
        let result = client
            .publish("a/b", QualityOfService::AtLeastOnce, false, vec![])
            .await;
        assert_eq!(result, Err(MockError::NotConnected));
    }

    #[tokio::test]
    async fn test_mock_client_failure() {
        let mut client = MockDeviceClient::with_failure();
        assert!(client.connect().await.is_err());
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_mock_factory_records_params() {
        let files = DeviceFiles::new("dev-1");
        let device = files.device("myendpoint");
        let factory = MockClientFactory::new();

        let mut client = device.new_client(&factory, &[]).unwrap();
        assert_eq!(client.client_id, "dev-1");

        let created = factory.created_params();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].broker_url, "mqtts://myendpoint:8883");

        client.connect().await.unwrap();
        publish_telemetry(&client, &device, b"{}".to_vec()).await.unwrap();
        let messages = client.get_published_messages().await;
        assert_eq!(messages[0].0, "things/dev-1/telemetry");
        assert_eq!(messages[0].1, QualityOfService::AtLeastOnce);
    }

    #[test]
    fn test_mock_factory_failure() {
        let files = DeviceFiles::new("dev-1");
        let device = files.device("myendpoint");

        let result = device.new_client(&MockClientFactory::with_failure(), &[]);
        assert!(result.is_err());
    }
}
