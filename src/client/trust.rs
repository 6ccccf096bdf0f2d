//! Server certificate trust and client certificates.
//!
//! Gemini servers mostly use self-signed certificates, so there is no single right way to
//! decide whether to trust one. The TLS layer always checks that the server owns the key of
//! the certificate it presents; whether the certificate itself is acceptable is left to a
//! [`TrustPolicy`].

use crate::client::ClientError;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// The certificate a server presented during the handshake.
pub struct ServerCertificate<'a> {
    /// The name the client asked for.
    pub server_name: &'a ServerName<'a>,
    /// The server's own certificate.
    pub end_entity: &'a CertificateDer<'a>,
    /// Any intermediate certificates sent along with it.
    pub intermediates: &'a [CertificateDer<'a>],
    /// The time of the handshake.
    pub now: UnixTime,
}

impl ServerCertificate<'_> {
    /// The host name the certificate was presented for.
    pub fn host(&self) -> String {
        self.server_name.to_str().into_owned()
    }

    /// The SHA-256 fingerprint of the certificate, in lowercase hex.
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(self.end_entity.as_ref()))
    }
}

/// Decides whether a server certificate is trusted.
pub trait TrustPolicy: Send + Sync {
    /// Return an error to abort the handshake.
    fn verify(&self, certificate: &ServerCertificate<'_>) -> Result<(), rustls::Error>;
}

impl<F> TrustPolicy for F
where
    F: Fn(&ServerCertificate<'_>) -> Result<(), rustls::Error> + Send + Sync,
{
    fn verify(&self, certificate: &ServerCertificate<'_>) -> Result<(), rustls::Error> {
        self(certificate)
    }
}

/// Trusts every certificate. This is insecure and should be replaced by anything that talks to servers it does not control.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAnyCertificate;

impl TrustPolicy for AcceptAnyCertificate {
    fn verify(&self, _certificate: &ServerCertificate<'_>) -> Result<(), rustls::Error> {
        Ok(())
    }
}

/// Trusts certificates that chain up to the Mozilla root store, like a web browser would.
#[derive(Debug, Clone)]
pub struct WebPkiRoots {
    verifier: Arc<WebPkiServerVerifier>,
}

impl WebPkiRoots {
    /// Create a policy backed by the bundled root certificates.
    pub fn new() -> Result<Self, ClientError> {
        let roots = RootCertStore { roots: webpki_roots::TLS_SERVER_ROOTS.to_vec() };
        let verifier = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), crypto_provider())
            .build()
            .map_err(|e| ClientError::Verifier(e.to_string()))?;

        Ok(Self { verifier })
    }
}

impl TrustPolicy for WebPkiRoots {
    fn verify(&self, certificate: &ServerCertificate<'_>) -> Result<(), rustls::Error> {
        self.verifier
            .verify_server_cert(
                certificate.end_entity,
                certificate.intermediates,
                certificate.server_name,
                &[],
                certificate.now,
            )
            .map(|_| ())
    }
}

/// A certificate chain and private key presented to servers that ask for one.
#[derive(Debug)]
pub struct ClientIdentity {
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl Clone for ClientIdentity {
    fn clone(&self) -> Self {
        Self { chain: self.chain.clone(), key: self.key.clone_key() }
    }
}

impl ClientIdentity {
    /// Create an identity from DER certificates and a private key.
    pub fn new(chain: Vec<CertificateDer<'static>>, key: PrivateKeyDer<'static>) -> Self {
        Self { chain, key }
    }

    /// Load an identity from PEM encoded certificates and a PEM encoded private key.
    pub fn from_pem(certificates: &[u8], key: &[u8]) -> Result<Self, ClientError> {
        let chain = CertificateDer::pem_slice_iter(certificates)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ClientError::ClientIdentity(format!("{e:?}")))?;

        if chain.is_empty() {
            return Err(ClientError::ClientIdentity("no certificate found".to_string()));
        }

        let key = PrivateKeyDer::from_pem_slice(key).map_err(|e| ClientError::ClientIdentity(format!("{e:?}")))?;

        Ok(Self { chain, key })
    }
}

/// The process-wide crypto provider, or the bundled aws-lc-rs one if none was installed.
fn crypto_provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// A `ServerCertVerifier` that hands the trust decision to a [`TrustPolicy`].
struct PolicyVerifier {
    policy: Arc<dyn TrustPolicy>,
    provider: Arc<CryptoProvider>,
}

impl fmt::Debug for PolicyVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyVerifier").finish_non_exhaustive()
    }
}

impl ServerCertVerifier for PolicyVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let certificate = ServerCertificate { server_name, end_entity, intermediates, now };

        match self.policy.verify(&certificate) {
            Ok(()) => {
                tracing::debug!(host = %certificate.host(), fingerprint = %certificate.fingerprint(), "server certificate trusted");
                Ok(ServerCertVerified::assertion())
            }
            Err(e) => {
                tracing::warn!(host = %certificate.host(), fingerprint = %certificate.fingerprint(), error = %e, "server certificate rejected");
                Err(e)
            }
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

/// Build the TLS configuration for one connection.
pub(crate) fn client_config(
    policy: Arc<dyn TrustPolicy>,
    identity: Option<&ClientIdentity>,
) -> Result<ClientConfig, ClientError> {
    let provider = crypto_provider();
    let verifier = PolicyVerifier { policy, provider: Arc::clone(&provider) };

    let builder = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier));

    let config = match identity {
        Some(identity) => builder.with_client_auth_cert(identity.chain.clone(), identity.key.clone_key())?,
        None => builder.with_no_client_auth(),
    };

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_sha256_hex() {
        let der = CertificateDer::from(b"not really a certificate".to_vec());
        let name = ServerName::try_from("example.org").unwrap();
        let certificate = ServerCertificate { server_name: &name, end_entity: &der, intermediates: &[], now: UnixTime::now() };

        assert_eq!(certificate.host(), "example.org");
        assert_eq!(certificate.fingerprint().len(), 64);
        assert_eq!(certificate.fingerprint(), hex::encode(Sha256::digest(b"not really a certificate")));
    }

    fn only_example_org(certificate: &ServerCertificate<'_>) -> Result<(), rustls::Error> {
        if certificate.host() == "example.org" {
            Ok(())
        } else {
            Err(rustls::Error::InvalidCertificate(rustls::CertificateError::NotValidForName))
        }
    }

    #[test]
    fn functions_are_policies() {
        let der = CertificateDer::from(vec![1, 2, 3]);
        let name = ServerName::try_from("example.org").unwrap();
        let other = ServerName::try_from("example.com").unwrap();
        let trusted = ServerCertificate { server_name: &name, end_entity: &der, intermediates: &[], now: UnixTime::now() };
        let rejected = ServerCertificate { server_name: &other, end_entity: &der, intermediates: &[], now: UnixTime::now() };

        assert!(only_example_org.verify(&trusted).is_ok());
        assert!(only_example_org.verify(&rejected).is_err());
        assert!(AcceptAnyCertificate.verify(&rejected).is_ok());
    }

    #[test]
    fn webpki_rejects_garbage() {
        let der = CertificateDer::from(vec![1, 2, 3]);
        let name = ServerName::try_from("example.org").unwrap();
        let certificate = ServerCertificate { server_name: &name, end_entity: &der, intermediates: &[], now: UnixTime::now() };

        assert!(WebPkiRoots::new().unwrap().verify(&certificate).is_err());
    }

    #[test]
    fn config_without_identity() {
        assert!(client_config(Arc::new(AcceptAnyCertificate), None).is_ok());
    }

    #[test]
    fn identity_without_certificate() {
        let result = ClientIdentity::from_pem(b"", b"");
        assert!(matches!(result, Err(ClientError::ClientIdentity(_))));
    }
}
