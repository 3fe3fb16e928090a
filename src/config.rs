//! Device configuration file
//!
//! A TOML file describing one device and how it connects:
//!
//! ```toml
//! [device]
//! endpoint = "abc123-ats.iot.us-west-2.amazonaws.com"
//! # device_id defaults to the certificate's Common Name
//! ca_certs_path = "certs/AmazonRootCA1.pem"
//! cert_path = "certs/my-device.x509"
//! priv_key_path = "certs/my-device.pem"
//!
//! [mqtt]
//! keep_alive_secs = 30
//! qos = 1
//!
//! [tls]
//! min_version = "1.3"
//! ```
//!
//! Relative paths in `[device]` are resolved against the directory holding
//! the configuration file.

use crate::device::{Device, DeviceError};
use crate::error::ErrorKind;
use crate::identity::{device_id_from_cert, IdentityError};
use crate::options::{self, ClientOption, QualityOfService};
use crate::tls::TlsVersion;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Top-level configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    pub device: Device,
    #[serde(default)]
    pub mqtt: MqttSection,
    #[serde(default)]
    pub tls: TlsSection,
}

/// MQTT session settings; every field is optional
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    pub keep_alive_secs: Option<u64>,
    pub clean_start: Option<bool>,
    pub max_packet_size: Option<u32>,
    /// QoS for telemetry publishes, 0 or 1
    pub qos: Option<u8>,
    /// Seconds to wait for CONNACK
    pub connect_timeout_secs: Option<u64>,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
}

/// SNI always follows the endpoint, so there is no server name key here
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TlsSection {
    /// "1.2" or "1.3"
    pub min_version: Option<String>,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to derive device ID: {0}")]
    Identity(#[from] IdentityError),
    #[error("Invalid device: {0}")]
    Device(#[from] DeviceError),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::FileRead(e) => ErrorKind::from_io(e),
            ConfigError::TomlParse(_) => ErrorKind::Decode,
            ConfigError::Identity(e) => e.kind(),
            ConfigError::Device(_)
            | ConfigError::InvalidConfig(_)
            | ConfigError::EnvVarNotFound(_) => ErrorKind::InvalidInput,
        }
    }
}

impl DeviceConfig {
    /// Load configuration from a TOML file
    ///
    /// An empty `device_id` is filled with the Common Name of the device
    /// certificate before the device is validated.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: DeviceConfig = toml::from_str(&content)?;

        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }

        if config.device.device_id.is_empty() {
            config.device.device_id = device_id_from_cert(&config.device.cert_path)?;
            debug!(device_id = %config.device.device_id, "Device ID taken from certificate");
        }

        config.device.validate()?;
        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.device.ca_certs_path);
        resolve(&mut self.device.cert_path);
        resolve(&mut self.device.priv_key_path);
    }

    /// Check values that serde accepts but the client would not
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.qos()?;
        self.min_tls_version()?;

        if self.mqtt.username_env.is_some() != self.mqtt.password_env.is_some() {
            return Err(ConfigError::InvalidConfig(
                "[mqtt] username_env and password_env must be set together".to_string(),
            ));
        }
        if self.mqtt.connect_timeout_secs == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "[mqtt] connect_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// QoS for telemetry publishes
    pub fn qos(&self) -> Result<QualityOfService, ConfigError> {
        match self.mqtt.qos {
            Some(level) => QualityOfService::try_from(level)
                .map_err(|e| ConfigError::InvalidConfig(format!("[mqtt] qos: {e}"))),
            None => Ok(QualityOfService::default()),
        }
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.mqtt.connect_timeout_secs.map(Duration::from_secs)
    }

    fn min_tls_version(&self) -> Result<Option<TlsVersion>, ConfigError> {
        self.tls
            .min_version
            .as_deref()
            .map(|v| {
                v.parse::<TlsVersion>()
                    .map_err(|e| ConfigError::InvalidConfig(format!("[tls] min_version: {e}")))
            })
            .transpose()
    }

    /// Translate the `[mqtt]` and `[tls]` sections into client options
    ///
    /// Credentials are resolved from the environment here, not at load time.
    pub fn client_options(&self) -> Result<Vec<ClientOption>, ConfigError> {
        let mut opts = Vec::new();

        if let Some(secs) = self.mqtt.keep_alive_secs {
            opts.push(options::keep_alive(Duration::from_secs(secs)));
        }
        if let Some(clean) = self.mqtt.clean_start {
            opts.push(options::clean_start(clean));
        }
        if let Some(bytes) = self.mqtt.max_packet_size {
            opts.push(options::max_packet_size(bytes));
        }
        if let (Some(username_env), Some(password_env)) =
            (&self.mqtt.username_env, &self.mqtt.password_env)
        {
            let username = get_env_var_required(username_env)?;
            let password = get_env_var_required(password_env)?;
            opts.push(options::credentials(username, password));
        }
        if let Some(version) = self.min_tls_version()? {
            opts.push(options::min_tls_version(version));
        }

        Ok(opts)
    }
}

fn get_env_var_required(env_var_name: &str) -> Result<String, ConfigError> {
    std::env::var(env_var_name).map_err(|_| ConfigError::EnvVarNotFound(env_var_name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::DeviceFiles;

    fn parse(toml_content: &str) -> DeviceConfig {
        toml::from_str(toml_content).unwrap()
    }

    #[test]
    fn test_minimal_config() {
        let config = parse(
            r#"
[device]
endpoint = "myendpoint"
ca_certs_path = "roots.pem"
cert_path = "device.x509"
priv_key_path = "device.pem"
"#,
        );

        assert_eq!(config.device.endpoint, "myendpoint");
        assert_eq!(config.device.device_id, "");
        assert_eq!(config.mqtt, MqttSection::default());
        assert_eq!(config.tls, TlsSection::default());
        assert!(config.client_options().unwrap().is_empty());
        assert_eq!(config.qos().unwrap(), QualityOfService::AtLeastOnce);
    }

    #[test]
    fn test_full_config() {
        let config = parse(
            r#"
[device]
endpoint = "myendpoint"
device_id = "my-device"
telemetry_topic = "custom/topic"
ca_certs_path = "roots.pem"
cert_path = "device.x509"
priv_key_path = "device.pem"

[mqtt]
keep_alive_secs = 30
clean_start = false
max_packet_size = 131072
qos = 0
connect_timeout_secs = 10

[tls]
min_version = "1.3"
"#,
        );

        assert_eq!(config.device.telemetry_topic(), "custom/topic");
        assert_eq!(config.qos().unwrap(), QualityOfService::AtMostOnce);
        assert_eq!(config.connect_timeout(), Some(Duration::from_secs(10)));

        let names: Vec<String> = config
            .client_options()
            .unwrap()
            .iter()
            .map(|o| o.name().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["keep_alive", "clean_start", "max_packet_size", "min_tls_version"]
        );
    }

    #[test]
    fn test_invalid_qos() {
        let config = parse(
            r#"
[device]
endpoint = "myendpoint"
device_id = "my-device"
ca_certs_path = "roots.pem"
cert_path = "device.x509"
priv_key_path = "device.pem"

[mqtt]
qos = 2
"#,
        );

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConfig(_)));
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_invalid_tls_version() {
        let config = parse(
            r#"
[device]
endpoint = "myendpoint"
device_id = "my-device"
ca_certs_path = "roots.pem"
cert_path = "device.x509"
priv_key_path = "device.pem"

[tls]
min_version = "1.1"
"#,
        );

        assert!(matches!(config.validate(), Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_unknown_tls_key_rejected() {
        let err = toml::from_str::<DeviceConfig>(
            r#"
[device]
endpoint = "myendpoint"
ca_certs_path = "roots.pem"
cert_path = "device.x509"
priv_key_path = "device.pem"

[tls]
server_name = "custom.example.com"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("server_name"));
    }

    #[test]
    fn test_missing_credential_env_var() {
        let config = parse(
            r#"
[device]
endpoint = "myendpoint"
device_id = "my-device"
ca_certs_path = "roots.pem"
cert_path = "device.x509"
priv_key_path = "device.pem"

[mqtt]
username_env = "AWSIOTCORE_TEST_UNSET_USERNAME"
password_env = "AWSIOTCORE_TEST_UNSET_PASSWORD"
"#,
        );

        let err = config.client_options().unwrap_err();
        assert!(
            matches!(err, ConfigError::EnvVarNotFound(ref name) if name == "AWSIOTCORE_TEST_UNSET_USERNAME")
        );
    }

    #[test]
    fn test_load_fills_device_id_from_cert() {
        let files = DeviceFiles::new("cert-derived-id");
        let config_path = files.ca_path().with_file_name("device.toml");
        std::fs::write(
            &config_path,
            r#"
[device]
endpoint = "myendpoint"
ca_certs_path = "roots.pem"
cert_path = "device.x509"
priv_key_path = "device.pem"
"#,
        )
        .unwrap();

        let config = DeviceConfig::load_from_file(&config_path).unwrap();
        assert_eq!(config.device.device_id, "cert-derived-id");
        assert_eq!(config.device.cert_path, files.cert_path());
    }

    #[test]
    fn test_load_missing_file() {
        let err = DeviceConfig::load_from_file(Path::new("/nonexistent/device.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead(_)));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
