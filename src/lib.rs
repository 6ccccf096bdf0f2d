//! # gemfetch
//!
//! gemfetch is a client for the Gemini protocol, with a parser for Gemtext documents.
//!
//! It follows the client side of the protocol described at [gemini://geminiprotocol.net/docs/protocol-specification.gmi](gemini://geminiprotocol.net/docs/protocol-specification.gmi):
//! one TLS connection per request, a single request line, a status header, and a body streamed
//! until the server closes the connection.
//!
//! ```ignore
//! use futures::StreamExt;
//! use gemfetch::{fetch, gemtext, FetchOptions, Response};
//!
//! let mut responses = std::pin::pin!(fetch("geminiprotocol.net/", FetchOptions::default()));
//! if let Some(Response::Success { body, .. }) = responses.next().await {
//!     let nodes = gemtext::parse(body.complete().await);
//! }
//! ```

#![warn(missing_docs)]
#![warn(unused_imports)]
#![warn(unused_crate_dependencies)]

// only the binary sets up logging
use tracing_subscriber as _;

mod client;
pub mod gemtext;
mod url;

pub use client::{
    body_of,
    fetch,
    Client,
    ClientError,
    body::Body,
    options::{report_failure, FetchOptions, NormalizeUri, OnFailure, DEFAULT_MAX_REDIRECTS, DEFAULT_TIMEOUT},
    request::{Request, MAX_REQUEST_LENGTH},
    response::{status_description, Header, MediaType, Response, StatusBand},
    trust::{AcceptAnyCertificate, ClientIdentity, ServerCertificate, TrustPolicy, WebPkiRoots},
};
pub use gemtext::GemNode;
pub use url::{is_well_formed, normalize_uri, scheme_of, Host, InvalidUri, URL, DEFAULT_PORT};
