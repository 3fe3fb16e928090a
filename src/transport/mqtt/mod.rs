//! rumqttc adapter
//!
//! - [`connection`] - pure conversion of [`ConnectionParams`](crate::options::ConnectionParams)
//!   into `rumqttc` options
//! - [`client`] - the I/O side: event loop, connect, publish, disconnect
//!
//! # Usage
//!
//! ```rust,no_run
//! use awsiotcore::transport::{publish_telemetry, DeviceClient};
//! use awsiotcore::transport::mqtt::RumqttcFactory;
//! use awsiotcore::Device;
//!
//! # tokio_test_block_on(async {
//! let device = Device {
//!     endpoint: "my-endpoint-ats.iot.us-west-2.amazonaws.com".to_string(),
//!     device_id: "my-device".to_string(),
//!     telemetry_topic_override: None,
//!     ca_certs_path: "roots.pem".into(),
//!     cert_path: "my-device.x509".into(),
//!     priv_key_path: "my-device.pem".into(),
//! };
//!
//! let mut client = device.new_client(&RumqttcFactory::default(), &[])?;
//! client.connect().await?;
//! publish_telemetry(&client, &device, br#"{"temp": 18.0}"#.to_vec()).await?;
//! client.disconnect().await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Runtime::new().unwrap().block_on(f)
//! # }
//! ```

pub mod client;
pub mod connection;

pub use client::{RumqttcClient, RumqttcFactory, DEFAULT_CONNECT_TIMEOUT};
pub use connection::{configure_mqtt_options, MqttError};
