//! QUIC endpoint construction.
//!
//! The transport carries a self-signed certificate and the client side skips
//! certificate verification: transport TLS is plumbing here, peers are
//! authenticated end-to-end by the signature on every envelope.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use quinn::{ClientConfig, Endpoint, ServerConfig, TransportConfig};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

use crate::error::NetError;
use crate::node::MuxConfig;

/// Server name presented on outbound QUIC handshakes.
const SERVER_NAME: &str = "weft";

fn transport_config(mux: &MuxConfig) -> Result<Arc<TransportConfig>, NetError> {
    let mut transport = TransportConfig::default();
    transport.max_idle_timeout(Some(
        mux.idle_timeout
            .try_into()
            .map_err(|_| NetError::ConnectionFailed("idle timeout out of range".to_string()))?,
    ));
    transport.keep_alive_interval(Some(mux.keep_alive));
    Ok(Arc::new(transport))
}

fn generate_self_signed_cert(
) -> Result<(CertificateDer<'static>, PrivateKeyDer<'static>), NetError> {
    let cert = rcgen::generate_simple_self_signed(vec![SERVER_NAME.to_string()])
        .map_err(|e| NetError::ConnectionFailed(format!("certificate generation failed: {e}")))?;
    let key = PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());
    Ok((CertificateDer::from(cert.cert), key.into()))
}

/// Builds a listening endpoint bound to `addr`.
pub(crate) fn server_endpoint(addr: SocketAddr, mux: &MuxConfig) -> Result<Endpoint, NetError> {
    let (cert, key) = generate_self_signed_cert()?;
    let mut server_config = ServerConfig::with_single_cert(vec![cert], key)
        .map_err(|e| NetError::ConnectionFailed(format!("server config error: {e}")))?;
    server_config.transport_config(transport_config(mux)?);

    Endpoint::server(server_config, addr)
        .map_err(|e| NetError::ConnectionFailed(format!("failed to bind endpoint: {e}")))
}

fn client_config(mux: &MuxConfig) -> Result<ClientConfig, NetError> {
    let crypto = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(SkipServerVerification))
        .with_no_client_auth();

    let mut config = ClientConfig::new(Arc::new(
        quinn::crypto::rustls::QuicClientConfig::try_from(crypto)
            .map_err(|e| NetError::ConnectionFailed(format!("client crypto config error: {e}")))?,
    ));
    config.transport_config(transport_config(mux)?);
    Ok(config)
}

/// Shared handle to the node's endpoint.
///
/// The listener installs its endpoint here; dialing before `listen` lazily
/// creates a client-only endpoint on an ephemeral port.
pub(crate) struct EndpointHolder {
    mux: MuxConfig,
    inner: RwLock<Option<Endpoint>>,
}

impl EndpointHolder {
    pub(crate) fn new(mux: MuxConfig) -> Self {
        Self {
            mux,
            inner: RwLock::new(None),
        }
    }

    pub(crate) fn install(&self, endpoint: Endpoint) {
        *self.inner.write() = Some(endpoint);
    }

    fn get_or_create(&self) -> Result<Endpoint, NetError> {
        if let Some(endpoint) = self.inner.read().as_ref() {
            return Ok(endpoint.clone());
        }

        let mut guard = self.inner.write();
        if let Some(endpoint) = guard.as_ref() {
            return Ok(endpoint.clone());
        }
        let bind: SocketAddr = "0.0.0.0:0".parse().map_err(|_| {
            NetError::ConnectionFailed("failed to parse wildcard bind address".to_string())
        })?;
        let endpoint = Endpoint::client(bind)
            .map_err(|e| NetError::ConnectionFailed(format!("failed to bind endpoint: {e}")))?;
        *guard = Some(endpoint.clone());
        Ok(endpoint)
    }

    /// Dials `addr` and waits for the QUIC handshake to complete.
    pub(crate) async fn connect(&self, addr: SocketAddr) -> Result<quinn::Connection, NetError> {
        let endpoint = self.get_or_create()?;
        let connecting = endpoint
            .connect_with(client_config(&self.mux)?, addr, SERVER_NAME)
            .map_err(|e| NetError::ConnectionFailed(e.to_string()))?;
        connecting
            .await
            .map_err(|e| NetError::ConnectionFailed(e.to_string()))
    }

    /// Closes the endpoint, aborting the accept loop.
    pub(crate) fn close(&self) {
        if let Some(endpoint) = self.inner.read().as_ref() {
            endpoint.close(0u32.into(), b"shutdown");
        }
    }
}

/// Accept any server certificate; envelope signatures authenticate peers.
#[derive(Debug)]
struct SkipServerVerification;

impl rustls::client::danger::ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_self_signed_cert() {
        assert!(generate_self_signed_cert().is_ok());
    }

    #[tokio::test]
    async fn test_server_endpoint_binds_ephemeral_port() {
        let endpoint =
            server_endpoint("127.0.0.1:0".parse().unwrap(), &MuxConfig::default()).unwrap();
        assert!(endpoint.local_addr().unwrap().port() > 0);
    }
}
