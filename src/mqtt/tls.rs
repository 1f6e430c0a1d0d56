//! rustls transport for the broker connection

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rumqttc::{TlsConfiguration, Transport};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tracing::{debug, info, warn};

use crate::config::TlsConfig;
use crate::error::MqttError;

/// Build the TLS transport for `host`
pub fn build_tls_transport(host: &str, config: &TlsConfig) -> Result<Transport, MqttError> {
    // rumqttc does SNI itself; reject names it would choke on up front
    ServerName::try_from(host.to_string())
        .map_err(|_| MqttError::ConnectionFailed(format!("invalid server name: {}", host)))?;

    let roots = root_store(config)?;
    let builder = ClientConfig::builder().with_root_certificates(roots);

    let mut tls_config = match (&config.cert_file, &config.key_file) {
        (Some(cert_file), Some(key_file)) => {
            info!("Using client certificate {}", cert_file.display());
            builder
                .with_client_auth_cert(load_certs(cert_file)?, load_private_key(key_file)?)
                .map_err(|e| tls_error("client certificate rejected", e))?
        }
        _ => builder.with_no_client_auth(),
    };

    if config.insecure {
        warn!("TLS certificate validation disabled (insecure mode)");
        let algorithms = tls_config
            .crypto_provider()
            .signature_verification_algorithms;
        tls_config
            .dangerous()
            .set_certificate_verifier(Arc::new(AcceptAnyServerCert { algorithms }));
    }

    Ok(Transport::tls_with_config(TlsConfiguration::Rustls(
        Arc::new(tls_config),
    )))
}

/// CA roots: explicit file, then directory, then the bundled webpki roots
fn root_store(config: &TlsConfig) -> Result<RootCertStore, MqttError> {
    let mut store = RootCertStore::empty();

    if let Some(ca_file) = &config.ca_file {
        for cert in load_certs(ca_file)? {
            store
                .add(cert)
                .map_err(|e| tls_error("failed to add CA certificate", e))?;
        }
    } else if let Some(ca_path) = &config.ca_path {
        let entries = std::fs::read_dir(ca_path)
            .map_err(|e| tls_error(&format!("cannot read {}", ca_path.display()), e))?;
        for path in entries.flatten().map(|entry| entry.path()) {
            if !path.extension().is_some_and(|ext| ext == "crt" || ext == "pem") {
                continue;
            }
            match load_certs(&path) {
                Ok(certs) => {
                    let (added, ignored) = store.add_parsable_certificates(certs);
                    debug!("{}: {} CA certs added, {} ignored", path.display(), added, ignored);
                }
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }
    } else {
        store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    Ok(store)
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, MqttError> {
    let mut reader = open(path)?;
    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| tls_error(&format!("bad certificate in {}", path.display()), e))
}

/// First PKCS#1, PKCS#8 or SEC1 key in the file
fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, MqttError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| tls_error(&format!("bad private key in {}", path.display()), e))?
        .ok_or_else(|| {
            MqttError::ConnectionFailed(format!("no private key found in {}", path.display()))
        })
}

fn open(path: &Path) -> Result<BufReader<File>, MqttError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| tls_error(&format!("cannot open {}", path.display()), e))
}

fn tls_error(context: &str, e: impl std::fmt::Display) -> MqttError {
    MqttError::ConnectionFailed(format!("{}: {}", context, e))
}

/// Accepts any server certificate but still checks handshake signatures
#[derive(Debug)]
struct AcceptAnyServerCert {
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tls(ca_file: Option<&str>, ca_path: Option<&str>) -> TlsConfig {
        TlsConfig {
            ca_file: ca_file.map(Into::into),
            ca_path: ca_path.map(Into::into),
            cert_file: None,
            key_file: None,
            insecure: false,
        }
    }

    #[test]
    fn test_default_roots_are_webpki() {
        let store = root_store(&tls(None, None)).unwrap();
        assert_eq!(store.len(), webpki_roots::TLS_SERVER_ROOTS.len());
    }

    #[test]
    fn test_missing_ca_file() {
        assert!(matches!(
            root_store(&tls(Some("/nonexistent/ca.pem"), None)),
            Err(MqttError::ConnectionFailed(_))
        ));
    }

    #[test]
    fn test_empty_ca_dir() {
        let dir = std::env::temp_dir().join(format!("medidor-nivel-{}-ca", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("notes.txt"), "not a cert").unwrap();

        let store = root_store(&tls(None, dir.to_str())).unwrap();
        assert!(store.is_empty());

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_key_file_without_key() {
        let path = std::env::temp_dir().join(format!("medidor-nivel-{}-key.pem", std::process::id()));
        std::fs::write(&path, "").unwrap();
        assert!(matches!(
            load_private_key(&path),
            Err(MqttError::ConnectionFailed(_))
        ));
        std::fs::remove_file(path).unwrap();
    }
}
