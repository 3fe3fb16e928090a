//! AWS IoT device descriptor
//!
//! A [`Device`] is a plain value: endpoint, identifier, optional telemetry
//! topic override and the paths to its PEM material. Topic and broker
//! derivations are pure and never touch the filesystem or network.

use crate::identity::{device_id_from_cert, IdentityError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// MQTT-over-TLS port used by AWS IoT Core
pub const AWS_IOT_MQTT_PORT: u16 = 8883;

/// URL scheme for MQTT over TLS
pub const MQTTS_SCHEME: &str = "mqtts";

/// Device descriptor validation errors
#[derive(Debug, Error, PartialEq)]
pub enum DeviceError {
    #[error("device field `{0}` must not be empty")]
    MissingField(&'static str),
}

/// An AWS IoT device: identity plus the paths to its credentials
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Device {
    /// Broker host, e.g. `abc123-ats.iot.us-west-2.amazonaws.com`
    pub endpoint: String,
    /// Left empty in configuration files to take the certificate's Common Name
    #[serde(default)]
    pub device_id: String,
    /// Replaces the default telemetry topic when non-empty
    #[serde(rename = "telemetry_topic", default, skip_serializing_if = "Option::is_none")]
    pub telemetry_topic_override: Option<String>,
    /// PEM bundle of Amazon's trusted root CA certificates
    pub ca_certs_path: PathBuf,
    pub cert_path: PathBuf,
    pub priv_key_path: PathBuf,
}

impl Device {
    /// Build a device whose ID is the Common Name of the certificate at `cert_path`
    pub fn from_cert(
        endpoint: impl Into<String>,
        ca_certs_path: impl Into<PathBuf>,
        cert_path: impl AsRef<Path>,
        priv_key_path: impl Into<PathBuf>,
    ) -> Result<Self, IdentityError> {
        let cert_path = cert_path.as_ref();
        let device_id = device_id_from_cert(cert_path)?;

        Ok(Self {
            endpoint: endpoint.into(),
            device_id,
            telemetry_topic_override: None,
            ca_certs_path: ca_certs_path.into(),
            cert_path: cert_path.to_path_buf(),
            priv_key_path: priv_key_path.into(),
        })
    }

    /// Set the telemetry topic override
    pub fn with_telemetry_topic(mut self, topic: impl Into<String>) -> Self {
        self.telemetry_topic_override = Some(topic.into());
        self
    }

    /// Check that the required identity fields are present
    pub fn validate(&self) -> Result<(), DeviceError> {
        if self.endpoint.is_empty() {
            return Err(DeviceError::MissingField("endpoint"));
        }
        if self.device_id.is_empty() {
            return Err(DeviceError::MissingField("device_id"));
        }
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.device_id
    }

    /// The broker this device connects to
    pub fn broker(&self) -> MqttBroker {
        MqttBroker {
            host: self.endpoint.clone(),
            port: AWS_IOT_MQTT_PORT,
        }
    }

    /// MQTT topic to which the device should publish telemetry events
    pub fn telemetry_topic(&self) -> String {
        match self.telemetry_topic_override.as_deref() {
            Some(topic) if !topic.is_empty() => topic.to_string(),
            _ => format!("things/{}/telemetry", self.device_id),
        }
    }
}

/// Network address of an MQTT broker
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MqttBroker {
    pub host: String,
    pub port: u16,
}

impl MqttBroker {
    /// Canonical broker URL, `mqtts://host:port`
    pub fn url(&self) -> String {
        format!("{MQTTS_SCHEME}://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for MqttBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
