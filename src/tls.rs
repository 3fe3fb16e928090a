//! TLS material for mutual-TLS connections to AWS IoT Core
//!
//! Loads the CA bundle into a trust store, loads the device certificate and
//! private key, checks that they belong together, and keeps everything in a
//! [`TlsSettings`] value that can be adjusted before it is turned into a
//! `rustls::ClientConfig`.
//!
//! # CA bundle policy
//!
//! A CA bundle is accepted as long as at least one certificate in it parses.
//! Entries that fail to decode are skipped and logged at `warn` level. A
//! bundle yielding no certificates at all is an error.

use crate::device::Device;
use crate::error::ErrorKind;
use ring::rand::SystemRandom;
use ring::signature::{
    EcdsaKeyPair, Ed25519KeyPair, KeyPair, RsaKeyPair, ECDSA_P256_SHA256_ASN1_SIGNING,
    ECDSA_P384_SHA384_ASN1_SIGNING,
};
use rumqttc::tokio_rustls::rustls::{
    self,
    pki_types::{CertificateDer, PrivateKeyDer},
    ClientConfig, RootCertStore, SupportedProtocolVersion,
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};
use x509_parser::prelude::{FromDer, X509Certificate};

/// Lowest TLS version AWS IoT Core accepts
pub const DEFAULT_MIN_TLS_VERSION: TlsVersion = TlsVersion::Tls12;

static TLS13_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS13];

/// Minimum negotiated TLS protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TlsVersion {
    Tls12,
    Tls13,
}

impl TlsVersion {
    /// Protocol versions at or above this floor
    pub fn protocol_versions(self) -> &'static [&'static SupportedProtocolVersion] {
        match self {
            TlsVersion::Tls12 => rustls::ALL_VERSIONS,
            TlsVersion::Tls13 => TLS13_ONLY,
        }
    }
}

impl Default for TlsVersion {
    fn default() -> Self {
        DEFAULT_MIN_TLS_VERSION
    }
}

impl FromStr for TlsVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().trim_start_matches("tls").trim_start_matches('v') {
            "1.2" | "12" => Ok(TlsVersion::Tls12),
            "1.3" | "13" => Ok(TlsVersion::Tls13),
            other => Err(format!("unsupported TLS version '{other}', expected 1.2 or 1.3")),
        }
    }
}

impl fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsVersion::Tls12 => f.write_str("TLS 1.2"),
            TlsVersion::Tls13 => f.write_str("TLS 1.3"),
        }
    }
}

/// TLS setup errors
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read CA certs {}: {source}", path.display())]
    CaRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certs were parsed from given CA certs {}", path.display())]
    NoValidCaCerts { path: PathBuf },

    #[error("failed to load x509 key pair: {0}")]
    KeyPair(#[from] KeyPairError),

    #[error("failed to build TLS client config: {0}")]
    ClientConfig(#[source] rustls::Error),
}

impl TlsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TlsError::CaRead { .. } => ErrorKind::Read,
            TlsError::NoValidCaCerts { .. } => ErrorKind::TrustStoreEmpty,
            TlsError::KeyPair(_) | TlsError::ClientConfig(_) => ErrorKind::KeyPair,
        }
    }
}

/// Reasons a client certificate/key pair could not be loaded
#[derive(Debug, Error)]
pub enum KeyPairError {
    #[error("failed to read cert {}: {source}", path.display())]
    ReadCert {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read private key {}: {source}", path.display())]
    ReadKey {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificate found in {}", path.display())]
    NoCertificate { path: PathBuf },

    #[error("no private key found in {}", path.display())]
    NoPrivateKey { path: PathBuf },

    #[error("malformed client certificate: {0}")]
    MalformedCertificate(String),

    #[error("unsupported private key: {0}")]
    UnsupportedKey(String),

    #[error("private key does not match public key in certificate")]
    Mismatch,
}

/// Trust store, client identity and handshake constraints for one device
pub struct TlsSettings {
    /// CA certificates trusted when verifying the broker
    pub root_store: RootCertStore,
    pub client_cert_chain: Vec<CertificateDer<'static>>,
    client_key: PrivateKeyDer<'static>,
    /// Server Name Indication value sent in the ClientHello
    pub server_name: String,
    pub min_version: TlsVersion,
}

impl TlsSettings {
    /// Load the CA bundle and client key pair named by `device`
    ///
    /// SNI defaults to the device endpoint, which AWS IoT requires for routing.
    pub fn load(device: &Device) -> Result<Self, TlsError> {
        let root_store = load_trust_store(&device.ca_certs_path)?;
        let (client_cert_chain, client_key) =
            load_key_pair(&device.cert_path, &device.priv_key_path)?;

        let settings = Self {
            root_store,
            client_cert_chain,
            client_key,
            server_name: device.endpoint.clone(),
            min_version: DEFAULT_MIN_TLS_VERSION,
        };

        // Surface keys rustls cannot sign with now rather than at handshake time
        settings.client_config()?;
        Ok(settings)
    }

    /// Build a rustls client config trusting only [`Self::root_store`]
    ///
    /// The config is always mutual TLS: the client certificate chain and key
    /// are presented on every handshake.
    pub fn client_config(&self) -> Result<ClientConfig, TlsError> {
        ClientConfig::builder_with_protocol_versions(self.min_version.protocol_versions())
            .with_root_certificates(self.root_store.clone())
            .with_client_auth_cert(self.client_cert_chain.clone(), self.client_key.clone_key())
            .map_err(TlsError::ClientConfig)
    }
}

impl Clone for TlsSettings {
    fn clone(&self) -> Self {
        Self {
            root_store: self.root_store.clone(),
            client_cert_chain: self.client_cert_chain.clone(),
            client_key: self.client_key.clone_key(),
            server_name: self.server_name.clone(),
            min_version: self.min_version,
        }
    }
}

impl fmt::Debug for TlsSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsSettings")
            .field("trust_anchors", &self.root_store.len())
            .field("client_cert_chain", &self.client_cert_chain.len())
            .field("server_name", &self.server_name)
            .field("min_version", &self.min_version)
            .finish_non_exhaustive()
    }
}

/// Parse every PEM certificate in the bundle at `path` into a trust store
pub fn load_trust_store(path: &Path) -> Result<RootCertStore, TlsError> {
    let pem = std::fs::read(path).map_err(|source| TlsError::CaRead {
        path: path.to_path_buf(),
        source,
    })?;

    let mut reader = pem.as_slice();
    let mut certs = Vec::new();
    for item in rustls_pemfile::certs(&mut reader) {
        match item {
            Ok(cert) => certs.push(cert),
            Err(e) => warn!(bundle = %path.display(), error = %e, "Skipping undecodable CA bundle entry"),
        }
    }

    let mut root_store = RootCertStore::empty();
    let (added, ignored) = root_store.add_parsable_certificates(certs);
    if ignored > 0 {
        warn!(
            bundle = %path.display(),
            ignored,
            "Skipping CA certificates that failed to parse"
        );
    }
    if added == 0 {
        return Err(TlsError::NoValidCaCerts {
            path: path.to_path_buf(),
        });
    }

    debug!(bundle = %path.display(), trust_anchors = added, "Loaded CA bundle");
    Ok(root_store)
}

/// Load a PEM certificate chain and its private key, checking they correspond
pub fn load_key_pair(
    cert_path: &Path,
    key_path: &Path,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), KeyPairError> {
    let cert_pem = std::fs::read(cert_path).map_err(|source| KeyPairError::ReadCert {
        path: cert_path.to_path_buf(),
        source,
    })?;
    let key_pem = std::fs::read(key_path).map_err(|source| KeyPairError::ReadKey {
        path: key_path.to_path_buf(),
        source,
    })?;

    let chain = rustls_pemfile::certs(&mut cert_pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| KeyPairError::MalformedCertificate(e.to_string()))?;
    if chain.is_empty() {
        return Err(KeyPairError::NoCertificate {
            path: cert_path.to_path_buf(),
        });
    }

    let key = rustls_pemfile::private_key(&mut key_pem.as_slice())
        .map_err(|e| KeyPairError::UnsupportedKey(e.to_string()))?
        .ok_or_else(|| KeyPairError::NoPrivateKey {
            path: key_path.to_path_buf(),
        })?;

    verify_key_matches_cert(&chain[0], &key)?;
    Ok((chain, key))
}

/// Check that `key` is the private half of the public key in `cert`
pub fn verify_key_matches_cert(
    cert: &CertificateDer<'_>,
    key: &PrivateKeyDer<'_>,
) -> Result<(), KeyPairError> {
    let (_, parsed) = X509Certificate::from_der(cert.as_ref())
        .map_err(|e| KeyPairError::MalformedCertificate(e.to_string()))?;
    let cert_public_key: &[u8] = &parsed.public_key().subject_public_key.data;

    if public_key_of(key)? == cert_public_key {
        Ok(())
    } else {
        Err(KeyPairError::Mismatch)
    }
}

/// Public key bytes in the same encoding as a certificate's subjectPublicKey
/// bit string
fn public_key_of(key: &PrivateKeyDer<'_>) -> Result<Vec<u8>, KeyPairError> {
    match key {
        PrivateKeyDer::Pkcs1(rsa) => RsaKeyPair::from_der(rsa.secret_pkcs1_der())
            .map(|pair| pair.public_key().as_ref().to_vec())
            .map_err(|e| KeyPairError::UnsupportedKey(format!("RSA key rejected: {e}"))),
        PrivateKeyDer::Pkcs8(pkcs8) => pkcs8_public_key(pkcs8.secret_pkcs8_der()),
        PrivateKeyDer::Sec1(sec1) => sec1_public_key(sec1.secret_sec1_der()),
        _ => Err(KeyPairError::UnsupportedKey(
            "unknown private key encoding".to_string(),
        )),
    }
}

// AlgorithmIdentifier OIDs (DER content octets)
const OID_EC_PUBLIC_KEY: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01];
const OID_PRIME256V1: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07];
const OID_SECP384R1: &[u8] = &[0x2b, 0x81, 0x04, 0x00, 0x22];

/// SEC1 `ECPrivateKey` keys are wrapped into PKCS#8 for each supported curve
/// until ring accepts one. ring requires the embedded publicKey field, so a
/// key without it is reported as unsupported.
fn sec1_public_key(der: &[u8]) -> Result<Vec<u8>, KeyPairError> {
    let rng = SystemRandom::new();
    for (curve, alg) in [
        (OID_PRIME256V1, &ECDSA_P256_SHA256_ASN1_SIGNING),
        (OID_SECP384R1, &ECDSA_P384_SHA384_ASN1_SIGNING),
    ] {
        let pkcs8 = sec1_to_pkcs8(curve, der);
        if let Ok(pair) = EcdsaKeyPair::from_pkcs8(alg, &pkcs8, &rng) {
            return Ok(pair.public_key().as_ref().to_vec());
        }
    }

    Err(KeyPairError::UnsupportedKey(
        "SEC1 key is not P-256/P-384 or lacks its public key".to_string(),
    ))
}

/// `PrivateKeyInfo { version 0, { id-ecPublicKey, curve }, OCTET STRING sec1 }`
fn sec1_to_pkcs8(curve_oid: &[u8], sec1: &[u8]) -> Vec<u8> {
    let mut algorithm = der_tlv(0x06, OID_EC_PUBLIC_KEY);
    algorithm.extend(der_tlv(0x06, curve_oid));

    let mut body = der_tlv(0x02, &[0x00]);
    body.extend(der_tlv(0x30, &algorithm));
    body.extend(der_tlv(0x04, sec1));
    der_tlv(0x30, &body)
}

fn der_tlv(tag: u8, value: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    let len = value.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
    out.extend_from_slice(value);
    out
}

fn pkcs8_public_key(der: &[u8]) -> Result<Vec<u8>, KeyPairError> {
    if let Ok(pair) = RsaKeyPair::from_pkcs8(der) {
        return Ok(pair.public_key().as_ref().to_vec());
    }

    let rng = SystemRandom::new();
    for alg in [
        &ECDSA_P256_SHA256_ASN1_SIGNING,
        &ECDSA_P384_SHA384_ASN1_SIGNING,
    ] {
        if let Ok(pair) = EcdsaKeyPair::from_pkcs8(alg, der, &rng) {
            return Ok(pair.public_key().as_ref().to_vec());
        }
    }

    if let Ok(pair) = Ed25519KeyPair::from_pkcs8_maybe_unchecked(der) {
        return Ok(pair.public_key().as_ref().to_vec());
    }

    Err(KeyPairError::UnsupportedKey(
        "PKCS#8 key is not RSA, ECDSA P-256/P-384 or Ed25519".to_string(),
    ))
}
