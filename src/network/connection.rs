//! TCP/TLS transport for one outbound connection (spec §5's Connecting
//! state: "TCP/TLS; cert verification if enabled"). PyLink only ever
//! originates outbound links — there is no inbound S2S listener, unlike the
//! teacher daemon this module is grounded in
//! (`sync::network::{upgrade_to_tls, connect_to_peer}`).

use crate::error::{PylinkError, Result};
use sha2::{Digest, Sha256};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_rustls::TlsConnector;
use tracing::{info, warn};

/// Either a plaintext or TLS-wrapped outbound stream.
pub enum NetworkStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for NetworkStream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for NetworkStream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_flush(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Accepts any certificate; only used when `verify_cert = false` in a
/// network's config, normally paired with `cert_fingerprint` pinning.
#[derive(Debug)]
struct DangerousNoVerifier;

impl ServerCertVerifier for DangerousNoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ED25519,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
        ]
    }
}

pub async fn connect_tcp(hostname: &str, port: u16) -> std::io::Result<TcpStream> {
    TcpStream::connect((hostname, port)).await
}

/// Upgrades a TCP stream to TLS, optionally pinning a certificate
/// fingerprint on top of (or instead of) chain verification.
pub async fn upgrade_to_tls(
    tcp_stream: TcpStream,
    hostname: &str,
    verify_cert: bool,
    cert_fingerprint: Option<&str>,
) -> Result<TlsStream<TcpStream>> {
    let root_store = if verify_cert {
        let mut roots = RootCertStore::empty();
        let certs = rustls_native_certs::load_native_certs();
        for cert in certs.certs {
            if let Err(e) = roots.add(cert) {
                warn!(error = %e, "failed to add root cert");
            }
        }
        for e in &certs.errors {
            warn!(error = %e, "error loading native certs");
        }
        roots
    } else {
        RootCertStore::empty()
    };

    let config = if verify_cert {
        ClientConfig::builder().with_root_certificates(root_store).with_no_client_auth()
    } else {
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(DangerousNoVerifier))
            .with_no_client_auth()
    };

    let connector = TlsConnector::from(Arc::new(config));
    let server_name = ServerName::try_from(hostname.to_string())
        .map_err(|e| PylinkError::Protocol(format!("invalid TLS server name {hostname}: {e}")))?;

    let tls_stream = connector
        .connect(server_name, tcp_stream)
        .await
        .map_err(|e| PylinkError::Protocol(format!("TLS handshake with {hostname} failed: {e}")))?;

    if let Some(expected_fp) = cert_fingerprint {
        let (_, conn) = tls_stream.get_ref();
        if let Some(cert) = conn.peer_certificates().and_then(<[_]>::first) {
            let mut hasher = Sha256::new();
            hasher.update(cert.as_ref());
            let actual_fp_hex = hasher.finalize().iter().map(|b| format!("{b:02X}")).collect::<Vec<_>>().join(":");
            let expected_normalized = expected_fp.to_uppercase().replace([' ', '-'], ":");
            if actual_fp_hex != expected_normalized {
                return Err(PylinkError::Protocol(format!("certificate fingerprint mismatch for {hostname}")));
            }
            info!(hostname, fingerprint = %actual_fp_hex, "certificate fingerprint verified");
        }
    }

    info!(hostname, verify = verify_cert, "TLS handshake completed");
    Ok(tls_stream)
}
