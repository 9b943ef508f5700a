use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls_pemfile::{Item, certs, read_one};
use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
    sync::Arc,
};

use crate::signaling::relay_config::TlsSettings;

/// Builds the `wss://` server config from the configured PEM files.
///
/// Built once at startup and shared by every accepted connection.
pub fn build_relay_server_config(tls: &TlsSettings) -> io::Result<Arc<ServerConfig>> {
    let certs = load_certs(&tls.cert_path)?;
    let key = load_private_key(&tls.key_path)?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("TLS config error: {e}"))
        })?;

    Ok(Arc::new(config))
}

/// Loads a certificate chain from a PEM file.
pub fn load_certs(path: &Path) -> io::Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .map_err(|e| io::Error::new(e.kind(), format!("opening cert {}: {e}", path.display())))?;
    parse_certs(&mut BufReader::new(file))
}

/// Loads a private key from a PEM file (PKCS1, PKCS8 or SEC1).
pub fn load_private_key(path: &Path) -> io::Result<PrivateKeyDer<'static>> {
    let file = File::open(path)
        .map_err(|e| io::Error::new(e.kind(), format!("opening key {}: {e}", path.display())))?;
    parse_private_key(&mut BufReader::new(file))?.ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("no private key found in {}", path.display()),
        )
    })
}

fn parse_certs(reader: &mut dyn BufRead) -> io::Result<Vec<CertificateDer<'static>>> {
    let certs: Vec<CertificateDer<'static>> = certs(reader)
        .collect::<Result<_, _>>()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("invalid certs: {e}")))?;

    if certs.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "cert file did not contain any certificates",
        ));
    }
    Ok(certs)
}

/// Returns the first key item; certificates and other items are skipped.
fn parse_private_key(reader: &mut dyn BufRead) -> io::Result<Option<PrivateKeyDer<'static>>> {
    loop {
        match read_one(reader) {
            Ok(Some(Item::Pkcs1Key(key))) => return Ok(Some(key.into())),
            Ok(Some(Item::Pkcs8Key(key))) => return Ok(Some(key.into())),
            Ok(Some(Item::Sec1Key(key))) => return Ok(Some(key.into())),
            Ok(None) => return Ok(None),
            Ok(Some(_)) => {}
            Err(e) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("key parse error: {e}"),
                ));
            }
        }
    }
}
