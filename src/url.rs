use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{digit1, satisfy},
    combinator::{cut, map_res, opt, recognize, rest},
    sequence::{delimited, preceded},
    IResult,
    Parser,
};
use std::fmt;
use thiserror::Error;

/// The port used when a URI does not name one.
pub const DEFAULT_PORT: u16 = 1965;
const DEFAULT_SCHEME: &str = "gemini";

/// A string that could not be parsed as an absolute URI.
#[derive(Debug, Error, PartialEq)]
#[error("invalid URI `{0}`")]
pub struct InvalidUri(pub String);

/// The authority part of a URL.
#[derive(Debug, Clone, PartialEq)]
pub struct Host {
    /// The hostname, or an IP literal without its brackets.
    pub name: String,
    /// The port, if the URL names one.
    pub port: Option<u16>,
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.contains(':') {
            write!(f, "//[{}]", self.name)?;
        } else {
            write!(f, "//{}", self.name)?;
        }

        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }

        Ok(())
    }
}

/// An absolute URL, split into its components.
#[derive(Debug, Clone, PartialEq)]
pub struct URL {
    /// The scheme, without the trailing colon.
    pub scheme: String,
    /// The authority, if the URL has one.
    pub host: Option<Host>,
    /// The path, possibly empty.
    pub path: String,
    /// The query, without the leading `?`.
    pub query: Option<String>,
    /// The fragment, without the leading `#`.
    pub fragment: Option<String>,
}

impl fmt::Display for URL {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scheme)?;

        if let Some(host) = &self.host {
            write!(f, "{host}")?;
        }

        f.write_str(&self.path)?;

        if let Some(query) = &self.query {
            write!(f, "?{query}")?;
        }

        if let Some(fragment) = &self.fragment {
            write!(f, "#{fragment}")?;
        }

        Ok(())
    }
}

fn scheme(input: &str) -> IResult<&str, &str> {
    let (input, scheme) = recognize((
        satisfy(|c| c.is_ascii_alphabetic()),
        take_while(|c: char| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')),
    )).parse(input)?;
    let (input, _) = tag(":").parse(input)?;

    Ok((input, scheme))
}

fn host_name(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(tag("["), take_while1(|c: char| c != ']'), tag("]")),
        take_while1(|c: char| !matches!(c, ':' | '/' | '?' | '#')),
    )).parse(input)
}

fn port(input: &str) -> IResult<&str, u16> {
    preceded(tag(":"), cut(map_res(digit1, str::parse::<u16>))).parse(input)
}

fn authority(input: &str) -> IResult<&str, Host> {
    let (input, _) = tag("//").parse(input)?;
    let (input, name) = opt(host_name).parse(input)?;
    let (input, port) = opt(port).parse(input)?;

    Ok((input, Host { name: name.unwrap_or_default().to_string(), port }))
}

fn url(input: &str) -> IResult<&str, URL> {
    let (input, scheme) = scheme(input)?;
    let (input, host) = opt(authority).parse(input)?;
    let (input, path) = take_while(|c: char| c != '?' && c != '#').parse(input)?;
    let (input, query) = opt(preceded(tag("?"), take_while(|c: char| c != '#'))).parse(input)?;
    let (input, fragment) = opt(preceded(tag("#"), rest)).parse(input)?;

    let url = URL {
        scheme: scheme.to_string(),
        host,
        path: path.to_string(),
        query: query.map(str::to_string),
        fragment: fragment.map(str::to_string),
    };

    Ok((input, url))
}

impl URL {
    /// Parse an absolute URI.
    pub fn parse(input: &str) -> Result<Self, InvalidUri> {
        if !is_well_formed(input) {
            return Err(InvalidUri(input.to_string()));
        }

        match url(input) {
            Ok(("", url)) => Ok(url),
            _ => Err(InvalidUri(input.to_string())),
        }
    }

    /// The port to connect to: the explicit one, or 1965.
    pub fn port(&self) -> u16 {
        self.host.as_ref().and_then(|host| host.port).unwrap_or(DEFAULT_PORT)
    }

    /// The hostname, if there is a non-empty one.
    pub fn hostname(&self) -> Option<&str> {
        self.host.as_ref().map(|host| host.name.as_str()).filter(|name| !name.is_empty())
    }
}

/// Returns false for strings containing characters that can never appear in a URI.
pub fn is_well_formed(uri: &str) -> bool {
    !uri.chars().any(|c| {
        c.is_whitespace() || c.is_control() || matches!(c, '<' | '>' | '"' | '{' | '}' | '|' | '\\' | '^' | '`')
    })
}

/// The scheme of a URI reference, if it has one.
pub fn scheme_of(uri: &str) -> Option<&str> {
    scheme(uri).ok().map(|(_, scheme)| scheme)
}

// `localhost:1965/page` parses as scheme `localhost`; a run of digits after the colon means a port.
fn looks_like_host_and_port(uri: &str) -> bool {
    match uri.split_once(':') {
        Some((_, after)) => {
            let port = after.split(['/', '?', '#']).next().unwrap_or_default();
            !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

/// Turn a bare `host/path` into a full `gemini://` URI. URIs that already have a scheme are returned unchanged.
pub fn normalize_uri(uri: &str) -> String {
    if uri.starts_with("//") {
        format!("{DEFAULT_SCHEME}:{uri}")
    } else if scheme_of(uri).is_some() && !looks_like_host_and_port(uri) {
        uri.to_string()
    } else {
        format!("{DEFAULT_SCHEME}://{uri}")
    }
}
