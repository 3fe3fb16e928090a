//! Connection parameters and client options
//!
//! [`ConnectionParams`] is the value the configurator assembles and hands to
//! a client factory. Callers customize it through [`ClientOption`]s: named,
//! fallible adjustments applied in the order given. A later option sees every
//! change made by the options before it.
//!
//! ```rust
//! use awsiotcore::options::{self, ClientOption, OptionError};
//! use std::time::Duration;
//!
//! let opts = vec![
//!     options::keep_alive(Duration::from_secs(30)),
//!     options::clean_start(false),
//!     ClientOption::new("require_custom_topic", |device, _params| {
//!         if device.telemetry_topic_override.is_none() {
//!             return Err(OptionError::invalid("a custom telemetry topic is required"));
//!         }
//!         Ok(())
//!     }),
//! ];
//! assert_eq!(opts[0].name(), "keep_alive");
//! ```

use crate::device::Device;
use crate::tls::{TlsSettings, TlsVersion};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Keep-alive applied when no option overrides it
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Lowest keep-alive the MQTT client accepts
pub const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);

/// Capacity of the client's outgoing request channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10;

/// Quality of service for published messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QualityOfService {
    AtMostOnce,
    #[default]
    AtLeastOnce,
}

impl TryFrom<u8> for QualityOfService {
    type Error = OptionError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QualityOfService::AtMostOnce),
            1 => Ok(QualityOfService::AtLeastOnce),
            // AWS IoT Core does not support QoS 2
            other => Err(OptionError::invalid(format!(
                "unsupported QoS level {other}, expected 0 or 1"
            ))),
        }
    }
}

/// Message published by the broker if the device disconnects ungracefully
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWill {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QualityOfService,
    pub retain: bool,
}

/// Username/password pair sent in CONNECT
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Everything a client factory needs to build a connectable MQTT client
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    /// `mqtts://host:port`
    pub broker_url: String,
    pub client_id: String,
    pub tls: TlsSettings,
    pub keep_alive: Duration,
    pub clean_start: bool,
    pub credentials: Option<Credentials>,
    /// Maximum MQTT packet size in bytes, `None` for the client default
    pub max_packet_size: Option<u32>,
    pub last_will: Option<LastWill>,
    pub channel_capacity: usize,
}

impl ConnectionParams {
    /// Base parameters with the minimal settings AWS IoT requires
    pub fn new(broker_url: impl Into<String>, client_id: impl Into<String>, tls: TlsSettings) -> Self {
        Self {
            broker_url: broker_url.into(),
            client_id: client_id.into(),
            tls,
            keep_alive: DEFAULT_KEEP_ALIVE,
            clean_start: true,
            credentials: None,
            max_packet_size: None,
            last_will: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Error returned by a [`ClientOption`]
#[derive(Debug, Error)]
pub enum OptionError {
    #[error("invalid option value: {0}")]
    InvalidValue(String),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl OptionError {
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::InvalidValue(message.into())
    }
}

type ApplyFn = dyn Fn(&Device, &mut ConnectionParams) -> Result<(), OptionError> + Send + Sync;

/// A named adjustment of [`ConnectionParams`]
#[derive(Clone)]
pub struct ClientOption {
    name: Cow<'static, str>,
    apply: Arc<ApplyFn>,
}

impl ClientOption {
    pub fn new<F>(name: impl Into<Cow<'static, str>>, apply: F) -> Self
    where
        F: Fn(&Device, &mut ConnectionParams) -> Result<(), OptionError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            apply: Arc::new(apply),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(&self, device: &Device, params: &mut ConnectionParams) -> Result<(), OptionError> {
        (self.apply)(device, params)
    }
}

impl fmt::Debug for ClientOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ClientOption").field(&self.name).finish()
    }
}

/// Keep-alive interval; must be at least [`MIN_KEEP_ALIVE`]
pub fn keep_alive(interval: Duration) -> ClientOption {
    ClientOption::new("keep_alive", move |_, params| {
        if interval < MIN_KEEP_ALIVE {
            return Err(OptionError::invalid(format!(
                "keep alive {interval:?} is below the minimum of {MIN_KEEP_ALIVE:?}"
            )));
        }
        params.keep_alive = interval;
        Ok(())
    })
}

pub fn clean_start(clean: bool) -> ClientOption {
    ClientOption::new("clean_start", move |_, params| {
        params.clean_start = clean;
        Ok(())
    })
}

/// Username/password authentication, e.g. for custom authorizers
pub fn credentials(username: impl Into<String>, password: impl Into<String>) -> ClientOption {
    let credentials = Credentials {
        username: username.into(),
        password: password.into(),
    };
    ClientOption::new("credentials", move |_, params| {
        params.credentials = Some(credentials.clone());
        Ok(())
    })
}

pub fn max_packet_size(bytes: u32) -> ClientOption {
    ClientOption::new("max_packet_size", move |_, params| {
        if bytes == 0 {
            return Err(OptionError::invalid("max packet size must be positive"));
        }
        params.max_packet_size = Some(bytes);
        Ok(())
    })
}

pub fn last_will(
    topic: impl Into<String>,
    payload: impl Into<Vec<u8>>,
    qos: QualityOfService,
    retain: bool,
) -> ClientOption {
    let will = LastWill {
        topic: topic.into(),
        payload: payload.into(),
        qos,
        retain,
    };
    ClientOption::new("last_will", move |_, params| {
        if will.topic.is_empty() {
            return Err(OptionError::invalid("last will topic must not be empty"));
        }
        params.last_will = Some(will.clone());
        Ok(())
    })
}

pub fn channel_capacity(capacity: usize) -> ClientOption {
    ClientOption::new("channel_capacity", move |_, params| {
        if capacity == 0 {
            return Err(OptionError::invalid("channel capacity must be positive"));
        }
        params.channel_capacity = capacity;
        Ok(())
    })
}

pub fn min_tls_version(version: TlsVersion) -> ClientOption {
    ClientOption::new("min_tls_version", move |_, params| {
        params.tls.min_version = version;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::DeviceFiles;

    fn base_params(files: &DeviceFiles) -> (Device, ConnectionParams) {
        let device = files.device("myendpoint");
        let tls = TlsSettings::load(&device).unwrap();
        let params = ConnectionParams::new(device.broker().url(), device.id(), tls);
        (device, params)
    }

    #[test]
    fn test_base_params_defaults() {
        let files = DeviceFiles::new("foo");
        let (_, params) = base_params(&files);

        assert_eq!(params.broker_url, "mqtts://myendpoint:8883");
        assert_eq!(params.client_id, "foo");
        assert_eq!(params.keep_alive, DEFAULT_KEEP_ALIVE);
        assert!(params.clean_start);
        assert!(params.credentials.is_none());
        assert_eq!(params.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
    }

    #[test]
    fn test_keep_alive_option() {
        let files = DeviceFiles::new("foo");
        let (device, mut params) = base_params(&files);

        keep_alive(Duration::from_secs(30))
            .apply(&device, &mut params)
            .unwrap();
        assert_eq!(params.keep_alive, Duration::from_secs(30));

        let err = keep_alive(Duration::from_secs(1))
            .apply(&device, &mut params)
            .unwrap_err();
        assert!(matches!(err, OptionError::InvalidValue(_)));
        assert_eq!(params.keep_alive, Duration::from_secs(30));
    }

    #[test]
    fn test_tls_options() {
        let files = DeviceFiles::new("foo");
        let (device, mut params) = base_params(&files);

        min_tls_version(TlsVersion::Tls13)
            .apply(&device, &mut params)
            .unwrap();

        assert_eq!(params.tls.min_version, TlsVersion::Tls13);
        assert_eq!(params.tls.server_name, "myendpoint");
    }

    #[test]
    fn test_value_options() {
        let files = DeviceFiles::new("foo");
        let (device, mut params) = base_params(&files);

        for option in [
            clean_start(false),
            credentials("user", "secret"),
            max_packet_size(128 * 1024),
            channel_capacity(32),
            last_will("things/foo/lwt", b"offline".to_vec(), QualityOfService::AtLeastOnce, false),
        ] {
            option.apply(&device, &mut params).unwrap();
        }

        assert!(!params.clean_start);
        assert_eq!(params.credentials.as_ref().unwrap().username, "user");
        assert_eq!(params.max_packet_size, Some(128 * 1024));
        assert_eq!(params.channel_capacity, 32);
        assert_eq!(params.last_will.as_ref().unwrap().payload, b"offline");

        assert!(channel_capacity(0).apply(&device, &mut params).is_err());
        assert!(max_packet_size(0).apply(&device, &mut params).is_err());
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials {
            username: "user".to_string(),
            password: "hunter2".to_string(),
        };
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("user"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_qos_from_level() {
        assert_eq!(QualityOfService::try_from(0).unwrap(), QualityOfService::AtMostOnce);
        assert_eq!(QualityOfService::try_from(1).unwrap(), QualityOfService::AtLeastOnce);
        assert!(QualityOfService::try_from(2).is_err());
    }

    #[test]
    fn test_option_debug_shows_name() {
        assert_eq!(format!("{:?}", clean_start(true)), "ClientOption(\"clean_start\")");
    }
}
