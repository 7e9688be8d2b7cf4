//! XSLT processing, injected into the GRDDL engine as a service.

use std::borrow::Cow;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::debug;
use tempfile::NamedTempFile;

pub const XSLT_NS: &str = "http://www.w3.org/1999/XSL/Transform";
const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// The serialized result of applying a stylesheet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransformOutput {
    pub bytes: Vec<u8>,
    /// `xsl:output/@method`, when the stylesheet declares one.
    pub method: Option<String>,
    /// `xsl:output/@media-type`, when the stylesheet declares one.
    pub media_type: Option<String>,
    /// Whether the result tree is an HTML document.
    pub html_document: bool,
}

pub trait Stylesheet {
    /// Applies the stylesheet to `source`, a document whose URI is
    /// `base_uri`. Under `no_net` the processor must not reach the network.
    fn apply(&self, source: &[u8], base_uri: &str, no_net: bool) -> Result<TransformOutput, XsltError>;
}

pub trait XsltProcessor {
    fn compile(&self, stylesheet: &[u8], uri: &str) -> Result<Box<dyn Stylesheet>, XsltError>;
}

#[derive(derive_more::Error, derive_more::Display, Debug)]
pub enum XsltError {
    #[display("`{uri}` is not an XSLT stylesheet: {reason}")]
    NotAStylesheet { uri: String, reason: String },

    #[display("stylesheet `{uri}` is not well-formed: {source}")]
    Xml { source: roxmltree::Error, uri: String },

    #[display("cannot stage input for `{program}`: {source}")]
    Staging { source: std::io::Error, program: String },

    #[display("failed to run `{program}`: {source}")]
    Spawn { source: std::io::Error, program: String },

    #[display("`{program}` failed ({status}): {stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[display("{_0}")]
    Message(#[error(not(source))] String),
}

/// Runs stylesheets through the external `xsltproc` program.
#[derive(Clone, Debug)]
pub struct Xsltproc {
    program: PathBuf,
}

impl Default for Xsltproc {
    fn default() -> Self {
        Xsltproc {
            program: PathBuf::from("xsltproc"),
        }
    }
}

impl Xsltproc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Xsltproc {
            program: program.into(),
        }
    }
}

impl XsltProcessor for Xsltproc {
    fn compile(&self, stylesheet: &[u8], uri: &str) -> Result<Box<dyn Stylesheet>, XsltError> {
        let settings = OutputSettings::read(stylesheet, uri)?;
        debug!(
            "compiled {uri} (method {:?}, media type {:?})",
            settings.method, settings.media_type
        );

        Ok(Box::new(XsltprocStylesheet {
            program: self.program.clone(),
            uri: uri.to_owned(),
            stylesheet: stylesheet.to_vec(),
            settings,
        }))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct OutputSettings {
    method: Option<String>,
    media_type: Option<String>,
    /// A literal result element copies its attributes to the output.
    literal_result: bool,
}

impl OutputSettings {
    fn read(stylesheet: &[u8], uri: &str) -> Result<Self, XsltError> {
        let not_a_stylesheet = |reason: &str| XsltError::NotAStylesheet {
            uri: uri.to_owned(),
            reason: reason.to_owned(),
        };

        let text = std::str::from_utf8(stylesheet).map_err(|_| not_a_stylesheet("not UTF-8"))?;
        let mut options = roxmltree::ParsingOptions::default();
        options.allow_dtd = true;
        let document = roxmltree::Document::parse_with_options(text, options).map_err(|source| {
            XsltError::Xml {
                source,
                uri: uri.to_owned(),
            }
        })?;

        let root = document.root_element();
        let is_xslt_root = root.tag_name().namespace() == Some(XSLT_NS)
            && matches!(root.tag_name().name(), "stylesheet" | "transform");

        if is_xslt_root {
            let output = root.children().find(|node| {
                node.tag_name().namespace() == Some(XSLT_NS) && node.tag_name().name() == "output"
            });

            Ok(OutputSettings {
                method: output.and_then(|o| o.attribute("method")).map(str::to_owned),
                media_type: output
                    .and_then(|o| o.attribute("media-type"))
                    .map(str::to_owned),
                literal_result: false,
            })
        } else if root.attribute((XSLT_NS, "version")).is_some() {
            Ok(OutputSettings {
                literal_result: true,
                ..OutputSettings::default()
            })
        } else {
            Err(not_a_stylesheet("root element is not xsl:stylesheet"))
        }
    }
}

struct XsltprocStylesheet {
    program: PathBuf,
    uri: String,
    stylesheet: Vec<u8>,
    settings: OutputSettings,
}

impl XsltprocStylesheet {
    fn command(&self, sheet: &Path, source: &Path, no_net: bool) -> Command {
        let mut command = Command::new(&self.program);
        if no_net {
            command.arg("--nonet");
        }
        // entities are already expanded; the DTD is not needed again
        command.arg("--novalid").arg(sheet).arg(source);
        command
    }
}

impl Stylesheet for XsltprocStylesheet {
    fn apply(&self, source: &[u8], base_uri: &str, no_net: bool) -> Result<TransformOutput, XsltError> {
        let program = self.program.display().to_string();
        let staging_error = |source| XsltError::Staging {
            source,
            program: program.clone(),
        };

        // both files carry their real URI as xml:base, so relative
        // imports and document() calls resolve as they would in place
        let sheet = if self.settings.literal_result {
            stage(&self.stylesheet, ".xsl")
        } else {
            stage(&with_xml_base(&self.stylesheet, &self.uri), ".xsl")
        }
        .map_err(staging_error)?;
        let input = stage(&with_xml_base(source, base_uri), ".xml").map_err(staging_error)?;
        debug!("running {program} with {} on {base_uri}", self.uri);

        let output = self
            .command(sheet.path(), input.path(), no_net)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| XsltError::Spawn {
                source,
                program: program.clone(),
            })?;

        if !output.status.success() {
            return Err(XsltError::Failed {
                program,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_owned(),
            });
        }

        let html_document = match self.settings.method.as_deref() {
            Some(method) => method.eq_ignore_ascii_case("html"),
            None => looks_like_html(&output.stdout),
        };

        Ok(TransformOutput {
            bytes: output.stdout,
            method: self.settings.method.clone(),
            media_type: self.settings.media_type.clone(),
            html_document,
        })
    }
}

fn stage(contents: &[u8], suffix: &str) -> std::io::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("grddl-")
        .suffix(suffix)
        .tempfile()?;
    file.write_all(contents)?;
    file.flush()?;
    Ok(file)
}

/// Adds `xml:base` to the root element unless it already has one.
/// Anything that is not well-formed XML is passed through untouched.
fn with_xml_base<'a>(document: &'a [u8], base: &str) -> Cow<'a, [u8]> {
    let document = document.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(document);
    let Ok(text) = std::str::from_utf8(document) else {
        return Cow::Borrowed(document);
    };

    let mut options = roxmltree::ParsingOptions::default();
    options.allow_dtd = true;
    let Ok(parsed) = roxmltree::Document::parse_with_options(text, options) else {
        return Cow::Borrowed(document);
    };

    let root = parsed.root_element();
    if root.attribute((XML_NS, "base")).is_some() {
        return Cow::Borrowed(document);
    }

    let name_start = root.range().start + 1;
    let name_end = text[name_start..]
        .find(|c: char| c.is_ascii_whitespace() || c == '/' || c == '>')
        .map_or(text.len(), |offset| name_start + offset);

    let mut output = String::with_capacity(text.len() + base.len() + 12);
    output.push_str(&text[..name_end]);
    output.push_str(" xml:base=\"");
    for c in base.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '"' => output.push_str("&quot;"),
            c => output.push(c),
        }
    }
    output.push('"');
    output.push_str(&text[name_end..]);

    Cow::Owned(output.into_bytes())
}

// XSLT picks the html output method when the result root is an
// un-namespaced `html` element.
fn looks_like_html(output: &[u8]) -> bool {
    let Ok(text) = std::str::from_utf8(output) else {
        return false;
    };

    match roxmltree::Document::parse(text) {
        Ok(document) => {
            let root = document.root_element();
            root.tag_name().namespace().is_none() && root.tag_name().name().eq_ignore_ascii_case("html")
        }
        Err(_) => text
            .trim_start()
            .get(..5)
            .is_some_and(|start| start.eq_ignore_ascii_case("<html")),
    }
}
