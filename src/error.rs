//! Error taxonomy for device identity and connection setup
//!
//! Each concern owns its own error enum (identity, device, TLS, options,
//! transport, configuration). All of them can be classified into a shared
//! [`ErrorKind`] so callers can branch on the kind of failure without
//! matching every variant.

use thiserror::Error;

/// Broad classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A required file does not exist
    NotFound,
    /// A file exists but could not be read
    Read,
    /// PEM or X.509 content is structurally invalid
    Decode,
    /// The CA bundle yielded zero usable certificates
    TrustStoreEmpty,
    /// The client certificate/key pair is malformed or does not correspond
    KeyPair,
    /// A caller-supplied client option reported an error
    Adjustment,
    /// A value supplied by the caller or configuration is invalid
    InvalidInput,
    /// The external MQTT client failed
    Transport,
}

impl ErrorKind {
    /// Classify an I/O error as not-found or generic read failure
    pub fn from_io(err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            _ => ErrorKind::Read,
        }
    }
}

/// Top-level error for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Identity(#[from] crate::identity::IdentityError),

    #[error(transparent)]
    Device(#[from] crate::device::DeviceError),

    #[error(transparent)]
    Tls(#[from] crate::tls::TlsError),

    #[error(transparent)]
    Client(#[from] crate::configurator::ClientError),

    #[error(transparent)]
    Mqtt(#[from] crate::transport::mqtt::MqttError),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Identity(e) => e.kind(),
            Error::Device(_) => ErrorKind::InvalidInput,
            Error::Tls(e) => e.kind(),
            Error::Client(e) => e.kind(),
            Error::Mqtt(_) => ErrorKind::Transport,
            Error::Config(e) => e.kind(),
        }
    }
}

/// Result type for crate operations
pub type Result<T> = std::result::Result<T, Error>;
