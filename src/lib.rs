//! AWS IoT Core device identity and mTLS connection setup
//!
//! # Overview
//!
//! - [`identity`] - device ID from the Common Name of an X.509 certificate
//! - [`device`] - the [`Device`] descriptor, its broker and telemetry topic
//! - [`tls`] - trust store and client key pair loading
//! - [`options`] - [`ConnectionParams`] and ordered [`ClientOption`]s
//! - [`configurator`] - builds parameters and clients for a [`Device`]
//! - [`transport`] - the client factory seam and the rumqttc adapter
//! - [`config`] - TOML device configuration
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use awsiotcore::{options, Device};
//! use std::time::Duration;
//!
//! let device = Device::from_cert(
//!     "abc123-ats.iot.us-west-2.amazonaws.com",
//!     "certs/AmazonRootCA1.pem",
//!     "certs/my-device.x509",
//!     "certs/my-device.pem",
//! )?;
//! assert_eq!(device.telemetry_topic(), format!("things/{}/telemetry", device.id()));
//!
//! let params = device.connection_params(&[options::keep_alive(Duration::from_secs(30))])?;
//! assert_eq!(params.broker_url, "mqtts://abc123-ats.iot.us-west-2.amazonaws.com:8883");
//! # Ok::<(), awsiotcore::Error>(())
//! ```

pub mod config;
pub mod configurator;
pub mod device;
pub mod error;
pub mod identity;
pub mod observability;
pub mod options;
pub mod testing;
pub mod tls;
pub mod transport;

pub use config::{ConfigError, DeviceConfig};
pub use configurator::ClientError;
pub use device::{Device, DeviceError, MqttBroker, AWS_IOT_MQTT_PORT};
pub use error::{Error, ErrorKind, Result};
pub use identity::{device_id_from_cert, IdentityError};
pub use options::{ClientOption, ConnectionParams, OptionError, QualityOfService};
pub use tls::{TlsError, TlsSettings, TlsVersion, DEFAULT_MIN_TLS_VERSION};
pub use transport::{publish_telemetry, ClientFactory, DeviceClient};
