//! Connection configurator
//!
//! Turns a [`Device`] into [`ConnectionParams`]: loads the TLS material,
//! fills in broker URL and client ID, then applies caller-supplied
//! [`ClientOption`]s in order. The first failing option aborts the build and
//! no later option runs.
//!
//! No network I/O happens here. Connecting is up to the client produced by
//! the [`ClientFactory`] the parameters are handed to.

use crate::device::{Device, DeviceError};
use crate::error::ErrorKind;
use crate::options::{ClientOption, ConnectionParams, OptionError};
use crate::tls::{TlsError, TlsSettings};
use crate::transport::ClientFactory;
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised while building connection parameters or a client
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid device: {0}")]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("client option `{name}` failed: {source}")]
    Option {
        name: String,
        #[source]
        source: OptionError,
    },

    #[error("failed to create MQTT client: {0}")]
    Factory(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Device(_) => ErrorKind::InvalidInput,
            ClientError::Tls(e) => e.kind(),
            ClientError::Option { .. } => ErrorKind::Adjustment,
            ClientError::Factory(_) => ErrorKind::Transport,
        }
    }
}

impl Device {
    /// Build connection parameters for this device
    ///
    /// By default the parameters carry the minimal settings needed to reach
    /// AWS IoT Core:
    ///
    /// - broker URL `mqtts://<endpoint>:8883`
    /// - client ID set to the device ID
    /// - TLS with the CA bundle as the only trust roots, the device
    ///   certificate as client identity, SNI set to the endpoint and a
    ///   TLS 1.2 floor
    ///
    /// `options` are then applied in the order given.
    pub fn connection_params(
        &self,
        options: &[ClientOption],
    ) -> Result<ConnectionParams, ClientError> {
        let _span = crate::device_span!(device_id = %self.device_id, endpoint = %self.endpoint).entered();

        self.validate()?;
        let tls = TlsSettings::load(self)?;

        let broker = self.broker();
        let mut params = ConnectionParams::new(broker.url(), self.device_id.clone(), tls);

        for option in options {
            debug!(option = option.name(), "Applying client option");
            option
                .apply(self, &mut params)
                .map_err(|source| ClientError::Option {
                    name: option.name().to_string(),
                    source,
                })?;
        }

        info!(broker = %broker, options = options.len(), "Connection parameters ready");
        Ok(params)
    }

    /// Build connection parameters and hand them to `factory`
    pub fn new_client<F>(&self, factory: &F, options: &[ClientOption]) -> Result<F::Client, ClientError>
    where
        F: ClientFactory,
    {
        let params = self.connection_params(options)?;
        factory
            .create(params)
            .map_err(|e| ClientError::Factory(Box::new(e)))
    }
}
