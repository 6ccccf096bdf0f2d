//! Fetch configuration.

use crate::client::response::Response;
use crate::client::trust::{AcceptAnyCertificate, ClientIdentity, TrustPolicy};
use crate::client::ClientError;
use crate::url;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default connection deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);
/// Default number of attempts in a redirect chain, including the first request.
/// The default therefore follows at most 4 redirects.
pub const DEFAULT_MAX_REDIRECTS: u32 = 5;

/// Turns whatever the caller passed into the URI that is actually requested.
pub type NormalizeUri = Arc<dyn Fn(&str) -> String + Send + Sync>;
/// Decides what a failed attempt turns into. `None` ends the fetch without a response.
pub type OnFailure = Arc<dyn Fn(&ClientError) -> Option<Response> + Send + Sync>;

/// Options for [`fetch`](crate::fetch).
///
/// | option            | default                                             |
/// |-------------------|-----------------------------------------------------|
/// | `timeout`         | 10 seconds                                          |
/// | `max_redirects`   | 5                                                   |
/// | `client_identity` | none                                                |
/// | `normalize_uri`   | [`url::normalize_uri`], prefixing `gemini://`       |
/// | `trust_policy`    | [`AcceptAnyCertificate`] (insecure)                 |
/// | `on_failure`      | log the error and respond with `Response::Unknown`  |
#[derive(Clone)]
pub struct FetchOptions {
    /// How long connecting and the TLS handshake may take. Reads are not timed.
    pub timeout: Duration,
    /// How many attempts a redirect chain may use, counting the first request.
    pub max_redirects: u32,
    /// The certificate to present if the server asks for one.
    pub client_identity: Option<ClientIdentity>,
    /// Applied to the requested URI and to every redirect target.
    pub normalize_uri: NormalizeUri,
    /// Decides which server certificates are trusted.
    pub trust_policy: Arc<dyn TrustPolicy>,
    /// Called with any error raised during an attempt.
    pub on_failure: OnFailure,
}

/// Logs the error and turns it into an `Unknown` response.
pub fn report_failure(error: &ClientError) -> Option<Response> {
    tracing::error!(%error, "fetch failed");

    Some(Response::Unknown { status_code: None, message: error.to_string() })
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            client_identity: None,
            normalize_uri: Arc::new(url::normalize_uri),
            trust_policy: Arc::new(AcceptAnyCertificate),
            on_failure: Arc::new(report_failure),
        }
    }
}

impl fmt::Debug for FetchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchOptions")
            .field("timeout", &self.timeout)
            .field("max_redirects", &self.max_redirects)
            .field("client_identity", &self.client_identity.is_some())
            .finish_non_exhaustive()
    }
}

impl FetchOptions {
    /// Options with every default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the connection deadline.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets how many attempts a redirect chain may use.
    #[must_use]
    pub fn max_redirects(mut self, max_redirects: u32) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    /// Sets the client certificate.
    #[must_use]
    pub fn client_identity(mut self, identity: ClientIdentity) -> Self {
        self.client_identity = Some(identity);
        self
    }

    /// Sets the URI normalization.
    #[must_use]
    pub fn normalize_uri(mut self, normalize: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.normalize_uri = Arc::new(normalize);
        self
    }

    /// Sets the certificate trust policy.
    #[must_use]
    pub fn trust_policy(mut self, policy: impl TrustPolicy + 'static) -> Self {
        self.trust_policy = Arc::new(policy);
        self
    }

    /// Sets the failure handler.
    #[must_use]
    pub fn on_failure(mut self, on_failure: impl Fn(&ClientError) -> Option<Response> + Send + Sync + 'static) -> Self {
        self.on_failure = Arc::new(on_failure);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = FetchOptions::default();
        assert_eq!(options.timeout, Duration::from_secs(10));
        assert_eq!(options.max_redirects, 5);
        assert!(options.client_identity.is_none());
        assert_eq!((options.normalize_uri)("example.org"), "gemini://example.org");
    }

    #[test]
    fn default_failure_becomes_unknown() {
        let options = FetchOptions::default();
        let response = (options.on_failure)(&ClientError::MissingHeader);

        assert!(matches!(response, Some(Response::Unknown { status_code: None, .. })));
    }

    #[test]
    fn setters() {
        let options = FetchOptions::new()
            .timeout(Duration::from_secs(1))
            .max_redirects(2)
            .normalize_uri(|uri| uri.to_uppercase())
            .on_failure(|_| None);

        assert_eq!(options.timeout, Duration::from_secs(1));
        assert_eq!(options.max_redirects, 2);
        assert_eq!((options.normalize_uri)("abc"), "ABC");
        assert!((options.on_failure)(&ClientError::MissingHeader).is_none());
    }
}
