//! Retrieval of documents by URI.
//!
//! Parsers never talk to the network directly: they go through a
//! [`Fetcher`], which streams the response body into a [`ResponseSink`].

use std::cell::OnceCell;
use std::io::Read;
use std::ops::ControlFlow;

use log::debug;
use url::Url;

/// Chunk size used when streaming bodies.
pub const BUFFER_SIZE: usize = 4096;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FetchRequest<'a> {
    pub uri: &'a str,
    pub user_agent: Option<&'a str>,
    pub accept: Option<&'a str>,
}

/// Receives a response body as it arrives.
pub trait ResponseSink {
    /// Called at most once, before any bytes, when the response carries a
    /// content type.
    fn content_type(&mut self, content_type: &str) {
        let _ = content_type;
    }

    /// Returning `Break` ends the transfer early; the fetch still
    /// completes successfully.
    fn write_bytes(&mut self, bytes: &[u8]) -> ControlFlow<String>;
}

impl ResponseSink for Vec<u8> {
    fn write_bytes(&mut self, bytes: &[u8]) -> ControlFlow<String> {
        self.extend_from_slice(bytes);
        ControlFlow::Continue(())
    }
}

pub trait Fetcher {
    fn fetch(&self, request: &FetchRequest<'_>, sink: &mut dyn ResponseSink) -> Result<(), FetchError>;
}

#[derive(derive_more::Error, derive_more::Display, Debug)]
pub enum FetchError {
    #[display("invalid URI `{uri}`")]
    InvalidUri { source: url::ParseError, uri: String },

    #[display("cannot fetch `{_0}`: unsupported URI scheme")]
    UnsupportedScheme(#[error(not(source))] String),

    #[display("cannot read `{path}`: {source}")]
    Io { source: std::io::Error, path: String },

    #[display("HTTP request for `{uri}` failed: {source}")]
    Http { source: reqwest::Error, uri: String },

    #[display("HTTP request for `{uri}` returned status {status}")]
    Status { uri: String, status: u16 },
}

/// Reads `file:` URIs from disk and `http(s):` URIs with a blocking
/// `reqwest` client, built on first use.
#[derive(Debug, Default)]
pub struct DefaultFetcher {
    client: OnceCell<reqwest::blocking::Client>,
}

impl DefaultFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn client(&self) -> Result<&reqwest::blocking::Client, reqwest::Error> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }

        let client = reqwest::blocking::Client::builder().build()?;
        Ok(self.client.get_or_init(|| client))
    }

    fn fetch_file(&self, url: &Url, sink: &mut dyn ResponseSink) -> Result<(), FetchError> {
        let path = url
            .to_file_path()
            .map_err(|()| FetchError::UnsupportedScheme(url.to_string()))?;
        let io_error = |source| FetchError::Io {
            source,
            path: path.display().to_string(),
        };

        let mut file = std::fs::File::open(&path).map_err(io_error)?;
        pump(&mut file, sink).map_err(io_error)
    }

    fn fetch_http(
        &self,
        url: Url,
        request: &FetchRequest<'_>,
        sink: &mut dyn ResponseSink,
    ) -> Result<(), FetchError> {
        let http_error = |source| FetchError::Http {
            source,
            uri: request.uri.to_owned(),
        };

        let mut builder = self.client().map_err(http_error)?.get(url);
        if let Some(user_agent) = request.user_agent {
            builder = builder.header(reqwest::header::USER_AGENT, user_agent);
        }
        if let Some(accept) = request.accept {
            builder = builder.header(reqwest::header::ACCEPT, accept);
        }

        let mut response = builder.send().map_err(http_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                uri: request.uri.to_owned(),
                status: status.as_u16(),
            });
        }

        if let Some(content_type) = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
        {
            sink.content_type(content_type);
        }

        pump(&mut response, sink).map_err(|source| FetchError::Io {
            source,
            path: request.uri.to_owned(),
        })
    }
}

impl Fetcher for DefaultFetcher {
    fn fetch(&self, request: &FetchRequest<'_>, sink: &mut dyn ResponseSink) -> Result<(), FetchError> {
        let url = Url::parse(request.uri).map_err(|source| FetchError::InvalidUri {
            source,
            uri: request.uri.to_owned(),
        })?;

        debug!("fetching {url}");
        match url.scheme() {
            "file" => self.fetch_file(&url, sink),
            "http" | "https" => self.fetch_http(url, request, sink),
            _ => Err(FetchError::UnsupportedScheme(request.uri.to_owned())),
        }
    }
}

/// Copies `reader` into `sink` in [`BUFFER_SIZE`] chunks until either side
/// stops.
pub fn pump(reader: &mut dyn Read, sink: &mut dyn ResponseSink) -> std::io::Result<()> {
    let mut buffer = [0u8; BUFFER_SIZE];
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => return Ok(()),
            Ok(read) => read,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        if let ControlFlow::Break(reason) = sink.write_bytes(&buffer[..read]) {
            debug!("transfer stopped early: {reason}");
            return Ok(());
        }
    }
}

/// Whether fetching `uri` needs network access.
pub(crate) fn is_network_uri(uri: &str) -> bool {
    !uri
        .get(..5)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("file:"))
}
