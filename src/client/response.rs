use crate::client::body::Body;
use nom::{
    bytes::complete::{tag, take_till, take_while},
    character::complete::{char, space0},
    combinator::{opt, rest},
    multi::many0,
    sequence::preceded,
    IResult,
    Parser,
};

/// The first line of a response: a status code and a meta string.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    /// The status code, or 0 if it could not be parsed.
    pub status_code: i32,
    /// Everything after the first space, untouched.
    pub meta: String,
}

fn header(input: &str) -> IResult<&str, (&str, Option<&str>)> {
    (take_till(|c: char| c == ' '), opt(preceded(char(' '), rest))).parse(input)
}

impl Header {
    /// Parse a header line. This never fails: a missing or unparsable code becomes 0 and a missing meta becomes empty.
    pub fn parse(line: &str) -> Self {
        let line = line.strip_suffix('\n').unwrap_or(line);
        let line = line.strip_suffix('\r').unwrap_or(line);

        let (status, meta) = match header(line) {
            Ok((_, (status, meta))) => (status, meta.unwrap_or_default()),
            Err(_) => ("", ""),
        };

        Self { status_code: status.parse().unwrap_or(0), meta: meta.to_string() }
    }
}

/// The group a status code falls in, which decides how the response is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusBand {
    /// 10 to 19.
    Input,
    /// 20 to 29.
    Success,
    /// 30 to 39.
    Redirect,
    /// 40 to 59.
    Failure,
    /// 60 to 69.
    CertificateRequired,
    /// Anything else.
    Unknown,
}

impl StatusBand {
    /// Classify a status code.
    pub fn of(status_code: i32) -> Self {
        match status_code {
            10..=19 => Self::Input,
            20..=29 => Self::Success,
            30..=39 => Self::Redirect,
            40..=59 => Self::Failure,
            60..=69 => Self::CertificateRequired,
            _ => Self::Unknown,
        }
    }
}

/// The standard meaning of a status code, for the codes the protocol defines.
/// See [gemini://geminiprotocol.net/docs/protocol-specification.gmi](gemini://geminiprotocol.net/docs/protocol-specification.gmi).
pub fn status_description(status_code: i32) -> Option<&'static str> {
    let description = match status_code {
        10 => "Input expected",
        11 => "Sensitive input expected",
        20 => "Success",
        30 => "Temporary redirect",
        31 => "Permanent redirect",
        40 => "Temporary failure",
        41 => "Server unavailable",
        42 => "CGI error",
        43 => "Proxy error",
        44 => "Slow down",
        50 => "Permanent failure",
        51 => "Not found",
        52 => "Gone",
        53 => "Proxy request refused",
        59 => "Bad request",
        60 => "Client certificate required",
        61 => "Certificate not authorized",
        62 => "Certificate not valid",
        _ => return None,
    };

    Some(description)
}

/// The outcome of a fetch. Redirects are followed by the client and never show up here.
#[derive(Debug, Clone)]
pub enum Response {
    /// The server wants a line of user input, to be sent back as the query of the same URL.
    Input {
        /// A status code from 10 to 19.
        status_code: i32,
        /// The prompt that should be displayed to the user.
        prompt: String,
        /// Whether the input should not be echoed (status 11).
        sensitive: bool,
    },
    /// A successful response.
    Success {
        /// A status code from 20 to 29.
        status_code: i32,
        /// The meta string of the header, naming the body's MIME type.
        mime_type: String,
        /// The body, still being read when the response is handed out.
        body: Body,
    },
    /// A temporary or permanent failure.
    Error {
        /// A status code from 40 to 59.
        status_code: i32,
        /// The meta string sent by the server.
        meta: String,
        /// The standard description of the status code, if it has one.
        message: Option<String>,
    },
    /// The server wants a client certificate.
    ClientCertificateRequired {
        /// A status code from 60 to 69.
        status_code: i32,
        /// The meta string sent by the server.
        meta: String,
    },
    /// Anything the client could not make sense of.
    Unknown {
        /// The status code sent by the server, or `None` if the response was produced by the client itself.
        status_code: Option<i32>,
        /// The meta string, or a description of what went wrong.
        message: String,
    },
}

impl Response {
    /// The response given when a redirect chain runs out of attempts.
    pub fn too_many_redirects() -> Self {
        Self::Unknown { status_code: None, message: "too many redirects".to_string() }
    }

    /// The response for a header whose status code is not a redirect.
    /// Success responses need a body, so they are built by the caller.
    pub(crate) fn from_header(header: Header) -> Self {
        let Header { status_code, meta } = header;

        match StatusBand::of(status_code) {
            StatusBand::Input => Self::Input { status_code, prompt: meta, sensitive: status_code == 11 },
            StatusBand::Failure => Self::Error {
                status_code,
                meta,
                message: status_description(status_code).map(str::to_string),
            },
            StatusBand::CertificateRequired => Self::ClientCertificateRequired { status_code, meta },
            StatusBand::Success | StatusBand::Redirect | StatusBand::Unknown => {
                Self::Unknown { status_code: Some(status_code), message: meta }
            }
        }
    }

    /// The status code, if the response came from a server.
    pub fn status_code(&self) -> Option<i32> {
        match self {
            Self::Input { status_code, .. }
            | Self::Success { status_code, .. }
            | Self::Error { status_code, .. }
            | Self::ClientCertificateRequired { status_code, .. } => Some(*status_code),
            Self::Unknown { status_code, .. } => *status_code,
        }
    }

    /// The parsed MIME type of a successful response.
    pub fn media_type(&self) -> Option<MediaType> {
        match self {
            Self::Success { mime_type, .. } => Some(MediaType::parse(mime_type)),
            _ => None,
        }
    }
}

/// A MIME type with its parameters, as found in the meta of a success header.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaType {
    /// The type and subtype, lowercased, e.g. `text/gemini`.
    pub essence: String,
    /// The `key=value` parameters, keys lowercased.
    pub parameters: Vec<(String, String)>,
}

fn parameter(input: &str) -> IResult<&str, (&str, &str)> {
    let (input, _) = (space0, char(';'), space0).parse(input)?;
    let (input, key) = take_till(|c: char| c == '=' || c == ';').parse(input)?;
    let (input, _) = tag("=").parse(input)?;
    let (input, value) = take_while(|c: char| c != ';').parse(input)?;

    Ok((input, (key.trim(), value.trim().trim_matches('"'))))
}

fn media_type(input: &str) -> IResult<&str, (&str, Vec<(&str, &str)>)> {
    (take_till(|c: char| c == ';'), many0(parameter)).parse(input)
}

impl MediaType {
    /// The type assumed when a success header has an empty meta.
    pub const DEFAULT: &'static str = "text/gemini; charset=utf-8";

    /// Parse a MIME type. Parameters that cannot be parsed are skipped.
    pub fn parse(meta: &str) -> Self {
        let meta = if meta.trim().is_empty() { Self::DEFAULT } else { meta };

        let (essence, parameters) = match media_type(meta) {
            Ok((_, (essence, parameters))) => (essence, parameters),
            Err(_) => (meta, Vec::new()),
        };

        Self {
            essence: essence.trim().to_ascii_lowercase(),
            parameters: parameters
                .into_iter()
                .map(|(key, value)| (key.to_ascii_lowercase(), value.to_string()))
                .collect(),
        }
    }

    /// The value of a parameter.
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    /// The `charset` parameter, defaulting to UTF-8.
    pub fn charset(&self) -> &str {
        self.parameter("charset").unwrap_or("utf-8")
    }

    /// The `lang` parameter.
    pub fn lang(&self) -> Option<&str> {
        self.parameter("lang")
    }

    /// Whether the body is a Gemtext document.
    pub fn is_gemtext(&self) -> bool {
        self.essence == "text/gemini"
    }
}
