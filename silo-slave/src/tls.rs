//! TLS configuration for the control and data channels
//!
//! The slave uses one certificate for every server-role handshake. It is
//! generated on first start and reused afterwards. Client-role handshakes
//! (the control connection to the master, and data channels in
//! client-handshake mode) do not validate certificate chains. Peers are
//! self-signed; when a fingerprint is configured it is pinned instead.

use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::crypto::{
    CryptoProvider, WebPkiSupportedAlgorithms, aws_lc_rs, verify_tls12_signature,
    verify_tls13_signature,
};
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use tokio_rustls::rustls::{
    self, ClientConfig, DigitallySignedStruct, ServerConfig, SignatureScheme,
    SupportedProtocolVersion,
};
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::config::{ConfigError, TlsSection, compile_pattern};
use crate::constants::{CERT_COMMON_NAME, CERT_FILE_NAME, KEY_FILE_NAME};

/// TLS setup failures
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to generate certificate: {0}")]
    Generate(#[from] rcgen::Error),

    #[error("no certificate found in {0}")]
    NoCertificate(PathBuf),

    #[error("no private key found in {0}")]
    NoKey(PathBuf),

    #[error("invalid PEM in {path}: {message}")]
    Pem { path: PathBuf, message: String },

    #[error("no cipher suite left after filtering")]
    NoCipherSuites,

    #[error("no protocol version left after filtering")]
    NoProtocols,

    #[error(transparent)]
    Pattern(#[from] ConfigError),

    #[error("invalid TLS configuration: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Ready-to-use TLS contexts for both handshake roles
#[derive(Clone)]
pub struct TlsContext {
    acceptor: TlsAcceptor,
    connector: TlsConnector,
    fingerprint: String,
}

impl std::fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsContext")
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

impl TlsContext {
    /// Load (or generate) the certificate in `cert_dir` and build both roles
    ///
    /// `pinned` is the expected fingerprint of peers this slave connects to.
    pub fn load(
        cert_dir: &Path,
        section: &TlsSection,
        pinned: Option<&str>,
    ) -> Result<Self, TlsError> {
        let cert_path = cert_dir.join(CERT_FILE_NAME);
        let key_path = cert_dir.join(KEY_FILE_NAME);

        if !cert_path.exists() || !key_path.exists() {
            tracing::info!(dir = %cert_dir.display(), "Generating self-signed certificate");
            generate_self_signed_cert(cert_dir, &cert_path, &key_path)?;
        }

        let certs = load_certs(&cert_path)?;
        let key = load_key(&key_path)?;
        let fingerprint = certificate_fingerprint(&certs[0]);
        tracing::info!(%fingerprint, "Certificate fingerprint");

        let provider = Arc::new(filtered_provider(section)?);
        let versions = filtered_versions(section)?;

        let server = ServerConfig::builder_with_provider(Arc::clone(&provider))
            .with_protocol_versions(&versions)?
            .with_no_client_auth()
            .with_single_cert(certs, key)?;

        let verifier = PinnedVerifier {
            fingerprint: pinned.map(normalize_fingerprint),
            algorithms: provider.signature_verification_algorithms,
        };
        let mut client = ClientConfig::builder_with_provider(provider)
            .with_protocol_versions(&versions)?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier))
            .with_no_client_auth();
        client.enable_sni = false;

        Ok(Self {
            acceptor: TlsAcceptor::from(Arc::new(server)),
            connector: TlsConnector::from(Arc::new(client)),
            fingerprint,
        })
    }

    /// Acceptor for server-role handshakes
    pub fn acceptor(&self) -> &TlsAcceptor {
        &self.acceptor
    }

    /// Connector for client-role handshakes
    pub fn connector(&self) -> &TlsConnector {
        &self.connector
    }

    /// SHA-256 fingerprint of this slave's certificate
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

/// Placeholder server name; SNI is disabled and chains are not validated
pub fn server_name() -> ServerName<'static> {
    ServerName::try_from("localhost").expect("'localhost' is a valid DNS name")
}

fn generate_self_signed_cert(
    cert_dir: &Path,
    cert_path: &Path,
    key_path: &Path,
) -> Result<(), TlsError> {
    use rcgen::{CertificateParams, DnType, KeyPair};

    fs::create_dir_all(cert_dir).map_err(|source| TlsError::Write {
        path: cert_dir.to_path_buf(),
        source,
    })?;

    let key_pair = KeyPair::generate()?;
    let mut params = CertificateParams::new(vec![])?;
    params
        .distinguished_name
        .push(DnType::CommonName, CERT_COMMON_NAME);
    let cert = params.self_signed(&key_pair)?;

    write_secure(cert_path, cert.pem().as_bytes())?;
    write_secure(key_path, key_pair.serialize_pem().as_bytes())?;
    Ok(())
}

/// Write a file readable only by its owner
fn write_secure(path: &Path, contents: &[u8]) -> Result<(), TlsError> {
    let write_err = |source| TlsError::Write {
        path: path.to_path_buf(),
        source,
    };
    fs::write(path, contents).map_err(write_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(write_err)?;
    }
    Ok(())
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let file = fs::File::open(path).map_err(|source| TlsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::Pem {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificate(path.to_path_buf()));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let file = fs::File::open(path).map_err(|source| TlsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| TlsError::Pem {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
        .ok_or_else(|| TlsError::NoKey(path.to_path_buf()))
}

/// Colon-separated uppercase SHA-256 of a DER certificate
pub fn certificate_fingerprint(cert: &[u8]) -> String {
    let digest = Sha256::digest(cert);
    hex::encode_upper(digest)
        .as_bytes()
        .chunks(2)
        .map(|chunk| std::str::from_utf8(chunk).expect("hex encoding produces valid ASCII"))
        .collect::<Vec<_>>()
        .join(":")
}

fn normalize_fingerprint(fingerprint: &str) -> String {
    let bare: String = fingerprint
        .chars()
        .filter(char::is_ascii_hexdigit)
        .map(|c| c.to_ascii_uppercase())
        .collect();
    bare.as_bytes()
        .chunks(2)
        .map(|chunk| std::str::from_utf8(chunk).expect("hex digits are ASCII"))
        .collect::<Vec<_>>()
        .join(":")
}

// =============================================================================
// Cipher and Protocol Filtering
// =============================================================================

/// Compile patterns so each must match a whole name
fn compile_all(patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|p| compile_pattern(&format!("^(?:{p})$")))
        .collect()
}

/// Keep names admitted by the allow list (empty admits all) and not denied
pub fn is_permitted(name: &str, allow: &[Regex], deny: &[Regex]) -> bool {
    let allowed = allow.is_empty() || allow.iter().any(|re| re.is_match(name));
    allowed && !deny.iter().any(|re| re.is_match(name))
}

/// Name used for a protocol version in filter patterns
pub fn protocol_name(version: &SupportedProtocolVersion) -> &'static str {
    match version.version {
        rustls::ProtocolVersion::TLSv1_2 => "TLSv1_2",
        rustls::ProtocolVersion::TLSv1_3 => "TLSv1_3",
        _ => "unknown",
    }
}

fn filtered_provider(section: &TlsSection) -> Result<CryptoProvider, TlsError> {
    let allow = compile_all(&section.cipher_allow)?;
    let deny = compile_all(&section.cipher_deny)?;

    let mut provider = aws_lc_rs::default_provider();
    provider.cipher_suites.retain(|suite| {
        let name = format!("{:?}", suite.suite());
        let keep = is_permitted(&name, &allow, &deny);
        if !keep {
            tracing::debug!(suite = %name, "Cipher suite disabled by configuration");
        }
        keep
    });

    if provider.cipher_suites.is_empty() {
        return Err(TlsError::NoCipherSuites);
    }
    Ok(provider)
}

fn filtered_versions(
    section: &TlsSection,
) -> Result<Vec<&'static SupportedProtocolVersion>, TlsError> {
    let allow = compile_all(&section.protocol_allow)?;
    let deny = compile_all(&section.protocol_deny)?;

    let versions: Vec<_> = rustls::ALL_VERSIONS
        .iter()
        .copied()
        .filter(|v| is_permitted(protocol_name(v), &allow, &deny))
        .collect();

    if versions.is_empty() {
        return Err(TlsError::NoProtocols);
    }
    Ok(versions)
}

// =============================================================================
// Certificate Verification
// =============================================================================

/// Accepts any certificate, or exactly one when a fingerprint is pinned
///
/// Handshake signatures are always checked so a pinned certificate cannot be
/// replayed without its key.
#[derive(Debug)]
struct PinnedVerifier {
    fingerprint: Option<String>,
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for PinnedVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if let Some(expected) = &self.fingerprint {
            let actual = certificate_fingerprint(end_entity);
            if &actual != expected {
                tracing::warn!(%expected, %actual, "Peer certificate fingerprint mismatch");
                return Err(rustls::Error::General(
                    "certificate fingerprint mismatch".to_string(),
                ));
            }
        }
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
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn patterns(list: &[&str]) -> Vec<Regex> {
        compile_all(&list.iter().map(|s| s.to_string()).collect::<Vec<_>>()).unwrap()
    }

    #[test]
    fn test_allow_then_deny() {
        let allow = patterns(&["TLS13_.*"]);
        let deny = patterns(&[".*CHACHA20.*"]);
        assert!(is_permitted("TLS13_AES_256_GCM_SHA384", &allow, &deny));
        assert!(!is_permitted("TLS13_CHACHA20_POLY1305_SHA256", &allow, &deny));
        assert!(!is_permitted(
            "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
            &allow,
            &deny
        ));
    }

    #[test]
    fn test_empty_allow_admits_all() {
        assert!(is_permitted("anything", &[], &[]));
        assert!(!is_permitted("anything", &[], &patterns(&["any.*"])));
    }

    #[test]
    fn test_patterns_match_whole_name() {
        let allow = patterns(&["TLSv1_2"]);
        assert!(is_permitted("TLSv1_2", &allow, &[]));
        assert!(!is_permitted("TLSv1_23", &allow, &[]));
    }

    #[test]
    fn test_deny_every_protocol() {
        let section = TlsSection {
            protocol_deny: vec!["TLSv1_.*".to_string()],
            ..TlsSection::default()
        };
        assert!(matches!(
            filtered_versions(&section),
            Err(TlsError::NoProtocols)
        ));
    }

    #[test]
    fn test_deny_every_cipher() {
        let section = TlsSection {
            cipher_allow: vec!["NOPE".to_string()],
            ..TlsSection::default()
        };
        assert!(matches!(
            filtered_provider(&section),
            Err(TlsError::NoCipherSuites)
        ));
    }

    #[test]
    fn test_normalize_fingerprint() {
        assert_eq!(normalize_fingerprint("ab:cd:0f"), "AB:CD:0F");
        assert_eq!(normalize_fingerprint("abcd0f"), "AB:CD:0F");
    }

    #[test]
    fn test_generates_and_reuses_certificate() {
        let temp = TempDir::new().unwrap();
        let first = TlsContext::load(temp.path(), &TlsSection::default(), None).unwrap();
        assert!(temp.path().join(CERT_FILE_NAME).exists());
        assert!(temp.path().join(KEY_FILE_NAME).exists());

        let second = TlsContext::load(temp.path(), &TlsSection::default(), None).unwrap();
        assert_eq!(first.fingerprint(), second.fingerprint());
        assert_eq!(first.fingerprint().len(), 32 * 3 - 1);
    }

    async fn handshake(server: TlsContext, client: TlsContext) -> bool {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server_task = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            match server.acceptor().accept(socket).await {
                Ok(mut tls) => {
                    let mut buf = [0u8; 4];
                    tls.read_exact(&mut buf).await.is_ok() && &buf == b"ping"
                }
                Err(_) => false,
            }
        });

        let socket = TcpStream::connect(addr).await.unwrap();
        if let Ok(mut tls) = client.connector().connect(server_name(), socket).await {
            let _ = tls.write_all(b"ping").await;
            let _ = tls.flush().await;
        }
        server_task.await.unwrap()
    }

    #[tokio::test]
    async fn test_handshake_with_pinned_fingerprint() {
        let (a, b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let server = TlsContext::load(a.path(), &TlsSection::default(), None).unwrap();
        let client = TlsContext::load(
            b.path(),
            &TlsSection::default(),
            Some(&server.fingerprint().to_lowercase()),
        )
        .unwrap();
        assert!(handshake(server, client).await);
    }

    #[tokio::test]
    async fn test_handshake_rejects_wrong_fingerprint() {
        let (a, b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let server = TlsContext::load(a.path(), &TlsSection::default(), None).unwrap();
        let client = TlsContext::load(
            b.path(),
            &TlsSection::default(),
            Some("00:11:22:33:44:55:66:77:88:99:AA:BB:CC:DD:EE:FF:00:11:22:33:44:55:66:77:88:99:AA:BB:CC:DD:EE:FF"),
        )
        .unwrap();
        assert!(!handshake(server, client).await);
    }
}
