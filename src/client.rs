pub mod body;
pub mod options;
pub mod request;
pub mod response;
pub mod trust;

use crate::url::{InvalidUri, URL};
use body::{Body, BodyWriter};
use futures::{
    future,
    stream::{self, Stream, StreamExt},
};
use options::FetchOptions;
use request::Request;
use response::{Header, Response, StatusBand};
use rustls::pki_types::{InvalidDnsNameError, ServerName};
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpStream,
};
use tokio_rustls::{client::TlsStream, TlsConnector};

/// Longest header line accepted: a two digit status, a space, 1024 bytes of meta and CRLF.
const MAX_HEADER_LENGTH: u64 = 1029;

/// An error that can occur during a fetch attempt. These are handed to the failure handler.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request is too long (more than 1024 bytes).
    #[error("request is too long: {0} bytes")]
    RequestTooLong(usize),
    /// The URI could not be parsed.
    #[error(transparent)]
    InvalidUri(#[from] InvalidUri),
    /// The URI has no host to connect to.
    #[error("URI `{0}` has no host")]
    MissingHost(String),
    /// The host could not be resolved or did not accept the connection.
    #[error("failed to connect to {host}:{port}: {source}")]
    Connect {
        /// The host.
        host: String,
        /// The port.
        port: u16,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
    /// The TLS handshake failed.
    #[error("TLS handshake with {host} failed: {source}")]
    Handshake {
        /// The host.
        host: String,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
    /// Connecting took longer than the configured deadline.
    #[error("connecting to {host} timed out after {timeout:?}")]
    Timeout {
        /// The host.
        host: String,
        /// The deadline that was exceeded.
        timeout: Duration,
    },
    /// The TLS configuration could not be built.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),
    /// The host is not a valid server name.
    #[error("invalid server name: {0}")]
    InvalidServerName(#[from] InvalidDnsNameError),
    /// The client certificate or key could not be loaded.
    #[error("invalid client identity: {0}")]
    ClientIdentity(String),
    /// The certificate verifier could not be built.
    #[error("certificate verifier: {0}")]
    Verifier(String),
    /// Reading or writing failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The server closed the connection without sending a header.
    #[error("connection closed before a response header was received")]
    MissingHeader,
    /// The header line did not end within the length limit.
    #[error("response header is longer than {MAX_HEADER_LENGTH} bytes")]
    HeaderTooLong,
}

/// Opens the connection for one attempt.
pub(crate) trait Dial: Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn dial(&self, url: &URL) -> impl Future<Output = Result<Self::Stream, ClientError>> + Send;
}

/// Dials TLS connections configured from the fetch options.
struct TlsDialer<'a> {
    options: &'a FetchOptions,
}

impl Dial for TlsDialer<'_> {
    type Stream = TlsStream<TcpStream>;

    async fn dial(&self, url: &URL) -> Result<Self::Stream, ClientError> {
        let host = url.hostname().ok_or_else(|| ClientError::MissingHost(url.to_string()))?.to_string();
        let port = url.port();

        let config = trust::client_config(Arc::clone(&self.options.trust_policy), self.options.client_identity.as_ref())?;
        let connector = TlsConnector::from(Arc::new(config));

        // server name indication
        let domain = ServerName::try_from(host.clone())?;

        let connect = async {
            tracing::debug!(%host, port, "connecting");

            let tcp_stream = TcpStream::connect((host.as_str(), port))
                .await
                .map_err(|source| ClientError::Connect { host: host.clone(), port, source })?;

            connector.connect(domain, tcp_stream)
                .await
                .map_err(|source| ClientError::Handshake { host: host.clone(), source })
        };

        tokio::time::timeout(self.options.timeout, connect)
            .await
            .map_err(|_| ClientError::Timeout { host: host.clone(), timeout: self.options.timeout })?
    }
}

/// What one attempt ended with.
#[derive(Debug)]
enum Outcome {
    Response(Response),
    Redirect(String),
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);

    String::from_utf8_lossy(bytes).into_owned()
}

/// Read the body line by line into the writer until the data ends or every reader is gone.
fn spawn_body_reader<R>(mut reader: R, writer: BodyWriter)
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let failure = loop {
            let mut line = Vec::new();

            tokio::select! {
                () = writer.closed() => {
                    tracing::debug!("body dropped, closing connection");
                    break None;
                }
                read = reader.read_until(b'\n', &mut line) => match read {
                    Ok(0) => break None,
                    Ok(_) => writer.push(decode_line(&line)),
                    // servers often skip close_notify and just hang up
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                        if !line.is_empty() {
                            writer.push(decode_line(&line));
                        }
                        break None;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "body read failed");
                        break Some(e.to_string());
                    }
                },
            }
        };

        writer.finish(failure);
    });
}

/// Send the request over an open connection and read the header.
async fn exchange<S>(stream: S, request: &Request) -> Result<Outcome, ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut stream = BufReader::new(stream);

    stream.get_mut().write_all(request.to_string().as_bytes()).await?;
    stream.get_mut().flush().await?;

    let mut line = Vec::new();
    match (&mut stream).take(MAX_HEADER_LENGTH).read_until(b'\n', &mut line).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {}
        Err(e) => return Err(e.into()),
    }

    if line.is_empty() {
        return Err(ClientError::MissingHeader);
    }

    if line.len() as u64 == MAX_HEADER_LENGTH && !line.ends_with(b"\n") {
        return Err(ClientError::HeaderTooLong);
    }

    let header = Header::parse(&decode_line(&line));
    tracing::debug!(url = %request.url(), status = header.status_code, meta = %header.meta, "response header");

    let outcome = match StatusBand::of(header.status_code) {
        StatusBand::Success => {
            let (writer, body) = body::channel();
            spawn_body_reader(stream, writer);

            Outcome::Response(Response::Success { status_code: header.status_code, mime_type: header.meta, body })
        }
        StatusBand::Redirect => Outcome::Redirect(header.meta),
        _ => Outcome::Response(Response::from_header(header)),
    };

    Ok(outcome)
}

async fn attempt<D: Dial>(dialer: &D, uri: &str, options: &FetchOptions) -> Result<Outcome, ClientError> {
    let normalized = (options.normalize_uri)(uri);
    let request = Request::new(URL::parse(&normalized)?)?;
    let stream = dialer.dial(request.url()).await?;

    exchange(stream, &request).await
}

/// Fetch a URI, following redirects. Returns whatever the failure handler decided if an attempt fails.
pub(crate) async fn run<D: Dial>(dialer: &D, uri: &str, options: &FetchOptions) -> Option<Response> {
    let mut target = uri.to_string();
    let mut attempt_number = 1;

    loop {
        match attempt(dialer, &target, options).await {
            Ok(Outcome::Response(response)) => return Some(response),
            Ok(Outcome::Redirect(next)) if attempt_number < options.max_redirects => {
                tracing::debug!(from = %target, to = %next, attempt = attempt_number, "following redirect");
                target = next;
                attempt_number += 1;
            }
            Ok(Outcome::Redirect(next)) => {
                tracing::warn!(from = %target, to = %next, "too many redirects");
                return Some(Response::too_many_redirects());
            }
            Err(error) => return (options.on_failure)(&error),
        }
    }
}

/// Fetch a URI over TLS.
///
/// Nothing happens until the stream is polled. It yields at most one response: redirects are
/// followed internally, and a failed attempt yields whatever the failure handler returns.
/// A [`Response::Success`] is yielded as soon as its header arrives, while the body keeps
/// filling in the background.
pub fn fetch(uri: &str, options: FetchOptions) -> impl Stream<Item = Response> + Send + 'static {
    let uri = uri.to_string();

    stream::once(async move {
        let dialer = TlsDialer { options: &options };
        run(&dialer, &uri, &options).await
    })
    .filter_map(future::ready)
}

/// A client for the Gemini protocol.
#[derive(Debug, Clone, Default)]
pub struct Client {
    options: FetchOptions,
}

impl Client {
    /// Create a new client with the given options.
    pub fn new(options: FetchOptions) -> Self {
        Self { options }
    }

    /// The options every fetch uses.
    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Fetch a URI. See [`fetch`].
    pub fn fetch(&self, uri: &str) -> impl Stream<Item = Response> + Send + 'static {
        fetch(uri, self.options.clone())
    }

    /// Fetch a URI and wait for its response.
    pub async fn get(&self, uri: &str) -> Option<Response> {
        let mut responses = std::pin::pin!(self.fetch(uri));
        responses.next().await
    }
}

/// The body of a successful response, or `None` for other responses.
pub fn body_of(response: &Response) -> Option<&Body> {
    match response {
        Response::Success { body, .. } => Some(body),
        _ => None,
    }
}
