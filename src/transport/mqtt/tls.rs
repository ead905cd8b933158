//! rustls client configurations for mutual TLS and websocket connections

use super::connection::MqttError;
use rumqttc::tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rumqttc::tokio_rustls::rustls::{ClientConfig, RootCertStore};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

/// ALPN protocol that lets the broker accept client-certificate MQTT on 443
pub const AWS_IOT_ALPN: &[u8] = b"x-amzn-mqtt-ca";

pub fn needs_alpn(port: u16) -> bool {
    port == 443
}

/// Client configuration presenting `cert`/`key` to the broker
pub fn mutual_tls_config(
    ca_file: Option<&Path>,
    cert: &Path,
    key: &Path,
    alpn: bool,
) -> Result<ClientConfig, MqttError> {
    let roots = load_root_store(ca_file)?;
    let certs = load_certs(cert)?;
    let key = load_private_key(key)?;

    let mut config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_client_auth_cert(certs, key)
        .map_err(|e| MqttError::Tls(format!("invalid client certificate or key: {e}")))?;

    if alpn {
        config.alpn_protocols = vec![AWS_IOT_ALPN.to_vec()];
    }

    Ok(config)
}

/// Client configuration that only authenticates the server
pub fn server_auth_config(ca_file: Option<&Path>) -> Result<ClientConfig, MqttError> {
    Ok(ClientConfig::builder()
        .with_root_certificates(load_root_store(ca_file)?)
        .with_no_client_auth())
}

/// Trust anchors from `ca_file`, or the platform store when none is given
pub fn load_root_store(ca_file: Option<&Path>) -> Result<RootCertStore, MqttError> {
    let mut roots = RootCertStore::empty();

    match ca_file {
        Some(path) => {
            for cert in load_certs(path)? {
                roots.add(cert).map_err(|e| {
                    MqttError::Tls(format!("invalid CA certificate in {}: {e}", path.display()))
                })?;
            }
        }
        None => {
            let native = rustls_native_certs::load_native_certs()
                .map_err(|e| MqttError::Tls(format!("failed to load platform trust store: {e}")))?;
            let (added, ignored) = roots.add_parsable_certificates(native);
            debug!(added, ignored, "Loaded platform root certificates");
        }
    }

    if roots.is_empty() {
        return Err(MqttError::Tls("no trusted root certificates".to_string()));
    }

    Ok(roots)
}

/// Read every PEM certificate in `path`
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, MqttError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| MqttError::Tls(format!("failed to parse {}: {e}", path.display())))?;

    if certs.is_empty() {
        return Err(MqttError::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }

    Ok(certs)
}

/// Read the first PEM private key (PKCS#1, PKCS#8 or SEC1) in `path`
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, MqttError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| MqttError::Tls(format!("failed to parse {}: {e}", path.display())))?
        .ok_or_else(|| MqttError::Tls(format!("no private key found in {}", path.display())))
}

fn open(path: &Path) -> Result<BufReader<File>, MqttError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| MqttError::Tls(format!("failed to open {}: {e}", path.display())))
}
