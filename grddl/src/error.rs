use std::fmt;

use crate::features::Feature;
use crate::www::FetchError;
use crate::xslt::XsltError;

/// Where in the input a diagnostic was raised.
///
/// Every field is optional: a syntax that cannot track columns simply
/// leaves them empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Locator {
    pub uri: Option<String>,
    pub file: Option<String>,
    pub line: Option<u64>,
    pub column: Option<u64>,
    pub byte: Option<u64>,
}

impl Locator {
    pub(crate) fn reset(&mut self, uri: Option<&str>) {
        *self = Locator {
            uri: uri.map(str::to_owned),
            ..Locator::default()
        };
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, &self.uri) {
            (Some(file), _) => write!(f, "file {file}")?,
            (None, Some(uri)) => write!(f, "URI {uri}")?,
            (None, None) => f.write_str("(unknown)")?,
        }

        if let Some(line) = self.line {
            write!(f, ":{line}")?;
            if let Some(column) = self.column {
                write!(f, " column {column}")?;
            }
        }

        Ok(())
    }
}

/// Severity of a reported diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
pub enum Level {
    #[display("warning")]
    Warning,
    #[display("error")]
    Error,
    #[display("fatal error")]
    Fatal,
}

#[derive(derive_more::Error, derive_more::Display, derive_more::From, Debug)]
pub enum Error {
    #[display("no syntax named `{_0}` is registered")]
    UnknownSyntax(#[error(not(source))] String),

    #[display("unknown feature `{_0}`")]
    UnknownFeature(#[error(not(source))] String),

    #[display("invalid value {value} for feature `{feature}`")]
    InvalidFeatureValue { feature: Feature, value: i64 },

    #[display("IRI parse error: `{iri}`")]
    IriParseError {
        source: oxiri::IriParseError,
        iri: String,
    },

    #[display("generated blank node id `{id}` is not a valid label")]
    InvalidBlankNodeId {
        source: oxrdf::BlankNodeIdParseError,
        id: String,
    },

    #[display("the `{_0}` syntax requires a base URI")]
    MissingBaseUri(#[error(not(source))] String),

    #[display("cannot read from a directory: `{_0}`")]
    IsDirectory(#[error(not(source))] String),

    #[display("I/O error")]
    #[from]
    Io(std::io::Error),

    #[display("{_0}")]
    #[from]
    Fetch(FetchError),

    #[display("network access denied for `{_0}`")]
    NetworkDenied(#[error(not(source))] String),

    #[display("`{uri}` is not UTF-8 encoded")]
    Encoding {
        source: std::str::Utf8Error,
        uri: String,
    },

    #[display("XML parsing failed for `{uri}`")]
    Xml {
        source: roxmltree::Error,
        uri: String,
    },

    #[display("{_0}")]
    #[from]
    Xslt(XsltError),

    #[display("no XSLT processor is configured")]
    NoXsltProcessor,

    #[display("{syntax} syntax error: {message}")]
    Syntax { syntax: String, message: String },

    #[display("parsing was aborted")]
    Aborted,
}
