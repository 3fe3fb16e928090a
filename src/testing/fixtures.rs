//! On-disk certificate fixtures for unit tests
//!
//! Certificates and keys are generated with rcgen. Key encodings rcgen does
//! not write (RSA PKCS#1, SEC1) live as PEM files under `tests/fixtures/`.

use crate::device::Device;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, PKCS_ED25519};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};

/// A PEM certificate and its PKCS#8 private key
pub struct Identity {
    pub cert_pem: String,
    pub key_pem: String,
}

/// Self-signed certificate whose subject Common Name is `common_name`
pub fn self_signed(common_name: &str) -> Identity {
    let mut distinguished_name = DistinguishedName::new();
    distinguished_name.push(DnType::CommonName, common_name);
    generate(distinguished_name, KeyPair::generate().expect("key generation should succeed"))
}

/// Self-signed Ed25519 certificate
pub fn self_signed_ed25519(common_name: &str) -> Identity {
    let mut distinguished_name = DistinguishedName::new();
    distinguished_name.push(DnType::CommonName, common_name);
    let key_pair = KeyPair::generate_for(&PKCS_ED25519).expect("key generation should succeed");
    generate(distinguished_name, key_pair)
}

/// Self-signed certificate with an empty subject
pub fn self_signed_without_common_name() -> Identity {
    let mut distinguished_name = DistinguishedName::new();
    distinguished_name.push(DnType::OrganizationName, "No Common Name Inc");
    generate(distinguished_name, KeyPair::generate().expect("key generation should succeed"))
}

fn generate(distinguished_name: DistinguishedName, key_pair: KeyPair) -> Identity {
    let mut params = CertificateParams::default();
    params.distinguished_name = distinguished_name;

    let cert = params
        .self_signed(&key_pair)
        .expect("self-signing should succeed");

    Identity {
        cert_pem: cert.pem(),
        key_pem: key_pair.serialize_pem(),
    }
}

/// Path of a checked-in PEM file under `tests/fixtures/`
pub fn pem_fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

pub fn write_temp(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file should be created");
    file.write_all(contents.as_bytes())
        .expect("temp file should be writable");
    file
}

/// CA bundle, device certificate and device key written to a temp directory
pub struct DeviceFiles {
    dir: TempDir,
    pub device_id: String,
}

impl DeviceFiles {
    pub fn new(device_id: &str) -> Self {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let root = self_signed("Test Root CA");
        let identity = self_signed(device_id);

        std::fs::write(dir.path().join("roots.pem"), root.cert_pem).unwrap();
        std::fs::write(dir.path().join("device.x509"), identity.cert_pem).unwrap();
        std::fs::write(dir.path().join("device.pem"), identity.key_pem).unwrap();

        Self {
            dir,
            device_id: device_id.to_string(),
        }
    }

    pub fn ca_path(&self) -> PathBuf {
        self.dir.path().join("roots.pem")
    }

    pub fn cert_path(&self) -> PathBuf {
        self.dir.path().join("device.x509")
    }

    pub fn key_path(&self) -> PathBuf {
        self.dir.path().join("device.pem")
    }

    pub fn device(&self, endpoint: &str) -> Device {
        Device {
            endpoint: endpoint.to_string(),
            device_id: self.device_id.clone(),
            telemetry_topic_override: None,
            ca_certs_path: self.ca_path(),
            cert_path: self.cert_path(),
            priv_key_path: self.key_path(),
        }
    }
}
