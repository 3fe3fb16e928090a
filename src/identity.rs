//! Device identity from X.509 certificates
//!
//! AWS IoT devices are identified by the subject Common Name of their client
//! certificate. This module reads a PEM file, checks that its first block is a
//! certificate and returns that Common Name.

use crate::error::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::{FromDer, X509Certificate};

const CERTIFICATE_LABEL: &str = "CERTIFICATE";

/// Errors raised while extracting an identity from a certificate
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("cert file does not exist: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read cert {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode PEM certificate")]
    MalformedPem,

    #[error("failed to parse X.509 certificate: {0}")]
    MalformedCertificate(String),

    #[error("certificate subject has no common name")]
    MissingCommonName,
}

impl IdentityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IdentityError::NotFound { .. } => ErrorKind::NotFound,
            IdentityError::Read { .. } => ErrorKind::Read,
            IdentityError::MalformedPem
            | IdentityError::MalformedCertificate(_)
            | IdentityError::MissingCommonName => ErrorKind::Decode,
        }
    }
}

/// Read the certificate at `cert_path` and return its subject Common Name,
/// which is used as the device ID.
pub fn device_id_from_cert(cert_path: impl AsRef<Path>) -> Result<String, IdentityError> {
    let path = cert_path.as_ref();
    let pem = std::fs::read(path).map_err(|source| match source.kind() {
        std::io::ErrorKind::NotFound => IdentityError::NotFound {
            path: path.to_path_buf(),
        },
        _ => IdentityError::Read {
            path: path.to_path_buf(),
            source,
        },
    })?;

    let common_name = common_name_from_pem(&pem)?;
    debug!(cert = %path.display(), device_id = %common_name, "Extracted device ID from certificate");
    Ok(common_name)
}

/// Decode the first PEM block of `pem` as a certificate and return the
/// subject Common Name
pub fn common_name_from_pem(pem: &[u8]) -> Result<String, IdentityError> {
    let (_, block) = parse_x509_pem(pem).map_err(|_| IdentityError::MalformedPem)?;
    if block.label != CERTIFICATE_LABEL {
        debug!(label = %block.label, "First PEM block is not a certificate");
        return Err(IdentityError::MalformedPem);
    }

    common_name_from_der(&block.contents)
}

/// Return the subject Common Name of a DER-encoded certificate
pub fn common_name_from_der(der: &[u8]) -> Result<String, IdentityError> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| IdentityError::MalformedCertificate(e.to_string()))?;

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .ok_or(IdentityError::MissingCommonName)?
        .as_str()
        .map_err(|e| IdentityError::MalformedCertificate(e.to_string()))?;

    if common_name.is_empty() {
        return Err(IdentityError::MissingCommonName);
    }

    Ok(common_name.to_string())
}
