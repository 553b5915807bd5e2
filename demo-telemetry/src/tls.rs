use std::fs;
use std::path::{Path, PathBuf};

use tonic::transport::{Certificate, ClientTlsConfig, Identity};

use crate::error::Error;

/// Filesystem locations of the mutual-TLS material for the collector
/// transport.
///
/// All three paths are required: the collector authenticates this process
/// with the client certificate/key pair, and this process verifies the
/// collector against the CA bundle.
#[derive(Debug, Clone)]
pub struct TlsSettings {
    /// PEM-encoded CA bundle used to verify the collector.
    pub ca_certificate: PathBuf,
    /// PEM-encoded client certificate presented to the collector.
    pub client_certificate: PathBuf,
    /// PEM-encoded private key for the client certificate.
    pub client_key: PathBuf,
    /// Overrides the domain name used for server certificate verification.
    pub domain_name: Option<String>,
}

impl TlsSettings {
    /// Reads the PEM material and assembles a tonic client TLS config.
    pub fn load(&self) -> Result<ClientTlsConfig, Error> {
        let ca = read(&self.ca_certificate)?;
        let cert = read(&self.client_certificate)?;
        let key = read(&self.client_key)?;

        let mut config = ClientTlsConfig::new()
            .ca_certificate(Certificate::from_pem(ca))
            .identity(Identity::from_pem(cert, key));
        if let Some(domain) = &self.domain_name {
            config = config.domain_name(domain.clone());
        }
        Ok(config)
    }
}

fn read(path: &Path) -> Result<Vec<u8>, Error> {
    fs::read(path).map_err(|source| Error::TlsRead {
        path: path.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // Syntactically valid PEM is enough here: tonic defers parsing until the
    // channel connects.
    const DUMMY_PEM: &[u8] = b"-----BEGIN CERTIFICATE-----\nZGVtbw==\n-----END CERTIFICATE-----\n";

    fn write_pem(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(DUMMY_PEM).unwrap();
        path
    }

    #[test]
    fn loads_mutual_tls_material() {
        let dir = tempfile::tempdir().unwrap();
        let settings = TlsSettings {
            ca_certificate: write_pem(dir.path(), "rootCA.crt"),
            client_certificate: write_pem(dir.path(), "client.crt"),
            client_key: write_pem(dir.path(), "client.key"),
            domain_name: Some("otel-collector".to_owned()),
        };

        assert!(settings.load().is_ok());
    }

    #[test]
    fn missing_file_reports_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.crt");
        let settings = TlsSettings {
            ca_certificate: missing.clone(),
            client_certificate: write_pem(dir.path(), "client.crt"),
            client_key: write_pem(dir.path(), "client.key"),
            domain_name: None,
        };

        match settings.load() {
            Err(Error::TlsRead { path, .. }) => assert_eq!(path, missing),
            other => panic!("expected TlsRead error, got {other:?}"),
        }
    }
}
