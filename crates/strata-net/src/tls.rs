//! TLS configuration for secure WebSocket stacks
//!
//! The server side takes one PEM blob holding the certificate chain and the
//! private key. The client side verifies against the Mozilla root set unless
//! told otherwise.

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, ServerConfig, SignatureScheme};
use std::io;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::{TlsAcceptor, TlsConnector, TlsStream};

/// TLS configuration errors
#[derive(Debug, Error)]
pub enum TlsConfigError {
    #[error("failed to read PEM material: {0}")]
    Pem(#[from] io::Error),
    #[error("no certificate found in PEM material")]
    NoCertificate,
    #[error("no private key found in PEM material")]
    NoPrivateKey,
    #[error("TLS error: {0}")]
    Rustls(#[from] rustls::Error),
}

fn read_certs(pem: &str) -> Result<Vec<CertificateDer<'static>>, TlsConfigError> {
    let mut reader = pem.as_bytes();
    let certs = rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(TlsConfigError::NoCertificate);
    }
    Ok(certs)
}

/// Server-side TLS material shared by every accepted connection
#[derive(Clone)]
pub struct ServerTlsConfig {
    acceptor: TlsAcceptor,
}

impl ServerTlsConfig {
    /// Build from a PEM blob containing the certificate chain and private key.
    pub fn from_pem(pem: &str) -> Result<Self, TlsConfigError> {
        let certs = read_certs(pem)?;
        let mut reader = pem.as_bytes();
        let key = rustls_pemfile::private_key(&mut reader)?.ok_or(TlsConfigError::NoPrivateKey)?;

        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)?;
        Ok(Self {
            acceptor: TlsAcceptor::from(Arc::new(config)),
        })
    }

    /// Build from a PEM file
    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self, TlsConfigError> {
        let pem = std::fs::read_to_string(path)?;
        Self::from_pem(&pem)
    }

    pub(crate) async fn accept<S>(&self, stream: S) -> io::Result<TlsStream<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let stream = self.acceptor.accept(stream).await?;
        Ok(TlsStream::from(stream))
    }
}

impl std::fmt::Debug for ServerTlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerTlsConfig").finish_non_exhaustive()
    }
}

/// Client-side TLS settings
#[derive(Clone)]
pub struct ClientTlsConfig {
    connector: TlsConnector,
}

impl ClientTlsConfig {
    /// Verify servers against the Mozilla root set
    pub fn webpki() -> Self {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        Self::with_roots(roots)
    }

    /// Verify servers against the certificates in `pem` only
    pub fn from_trusted_pem(pem: &str) -> Result<Self, TlsConfigError> {
        let mut roots = RootCertStore::empty();
        for cert in read_certs(pem)? {
            roots.add(cert)?;
        }
        Ok(Self::with_roots(roots))
    }

    /// Complete the handshake with any server certificate.
    ///
    /// Handshake signatures are still checked; authenticating the server is
    /// left to the connection upgrader.
    pub fn accept_any_certificate() -> Self {
        let verifier = AcceptAnyServerCert {
            algorithms: rustls::crypto::ring::default_provider().signature_verification_algorithms,
        };
        let config = ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier))
            .with_no_client_auth();
        Self {
            connector: TlsConnector::from(Arc::new(config)),
        }
    }

    fn with_roots(roots: RootCertStore) -> Self {
        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        Self {
            connector: TlsConnector::from(Arc::new(config)),
        }
    }

    pub(crate) async fn connect<S>(&self, host: &str, stream: S) -> io::Result<TlsStream<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let server_name = ServerName::try_from(host.to_owned())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let stream = self.connector.connect(server_name, stream).await?;
        Ok(TlsStream::from(stream))
    }
}

impl Default for ClientTlsConfig {
    fn default() -> Self {
        Self::webpki()
    }
}

impl std::fmt::Debug for ClientTlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientTlsConfig").finish_non_exhaustive()
    }
}

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
