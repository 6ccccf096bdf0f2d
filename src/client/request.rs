use crate::client::ClientError;
use crate::url::URL;
use std::fmt;

/// The longest request URI a server is required to accept, in bytes.
pub const MAX_REQUEST_LENGTH: usize = 1024;

/// A request to a given URL.
#[derive(Debug, Clone, PartialEq)]
pub struct Request(URL);

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\r\n", self.0)
    }
}

impl Request {
    /// Create a request, checking that the URI fits in 1024 bytes.
    pub fn new(url: URL) -> Result<Self, ClientError> {
        let length = url.to_string().len();
        if length > MAX_REQUEST_LENGTH {
            return Err(ClientError::RequestTooLong(length));
        }

        Ok(Self(url))
    }

    /// The URL being requested.
    pub fn url(&self) -> &URL {
        &self.0
    }
}
