use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::rc::Rc;

use grddl::parser::Parser;
use grddl::www::{FetchError, FetchRequest, Fetcher, ResponseSink};
use grddl::xslt::{Stylesheet, TransformOutput, XsltError, XsltProcessor};
use grddl::Registry;
use itertools::Itertools;
use oxiri::Iri;
use oxrdf::Triple;

pub const STYLESHEET: &str = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform"/>"#;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    pub uri: String,
    pub user_agent: Option<String>,
    pub accept: Option<String>,
}

/// Serves documents from memory, a few bytes at a time.
#[derive(Default)]
pub struct MapFetcher {
    documents: HashMap<String, (Option<String>, Vec<u8>)>,
    requests: RefCell<Vec<Request>>,
}

#[allow(unused)]
impl MapFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, uri: &str, content_type: Option<&str>, body: &str) -> Self {
        self.documents.insert(
            uri.to_owned(),
            (content_type.map(str::to_owned), body.as_bytes().to_vec()),
        );
        self
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.borrow().clone()
    }

    pub fn requested_uris(&self) -> Vec<String> {
        self.requests.borrow().iter().map(|r| r.uri.clone()).collect()
    }
}

impl Fetcher for MapFetcher {
    fn fetch(&self, request: &FetchRequest<'_>, sink: &mut dyn ResponseSink) -> Result<(), FetchError> {
        self.requests.borrow_mut().push(Request {
            uri: request.uri.to_owned(),
            user_agent: request.user_agent.map(str::to_owned),
            accept: request.accept.map(str::to_owned),
        });

        let Some((content_type, body)) = self.documents.get(request.uri) else {
            return Err(FetchError::Status {
                uri: request.uri.to_owned(),
                status: 404,
            });
        };

        if let Some(content_type) = content_type {
            sink.content_type(content_type);
        }
        for chunk in body.chunks(7) {
            if let ControlFlow::Break(_) = sink.write_bytes(chunk) {
                break;
            }
        }

        Ok(())
    }
}

/// One call to [`Stylesheet::apply`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Application {
    pub stylesheet: String,
    pub base: String,
    pub source: String,
    pub no_net: bool,
}

/// Hands back a fixed result per stylesheet URI, recording what it was
/// applied to.
#[derive(Default)]
pub struct CannedXslt {
    outputs: HashMap<String, TransformOutput>,
    applied: Rc<RefCell<Vec<Application>>>,
}

#[allow(unused)]
impl CannedXslt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, uri: &str, method: Option<&str>, output: &str) -> Self {
        self.outputs.insert(
            uri.to_owned(),
            TransformOutput {
                bytes: output.as_bytes().to_vec(),
                method: method.map(str::to_owned),
                ..TransformOutput::default()
            },
        );
        self
    }

    /// `(stylesheet, base URI)` pairs, in order.
    pub fn applied(&self) -> Vec<(String, String)> {
        self.applied
            .borrow()
            .iter()
            .map(|a| (a.stylesheet.clone(), a.base.clone()))
            .collect()
    }

    pub fn applications(&self) -> Vec<Application> {
        self.applied.borrow().clone()
    }
}

struct CannedStylesheet {
    uri: String,
    output: TransformOutput,
    applied: Rc<RefCell<Vec<Application>>>,
}

impl Stylesheet for CannedStylesheet {
    fn apply(&self, source: &[u8], base_uri: &str, no_net: bool) -> Result<TransformOutput, XsltError> {
        self.applied.borrow_mut().push(Application {
            stylesheet: self.uri.clone(),
            base: base_uri.to_owned(),
            source: String::from_utf8_lossy(source).into_owned(),
            no_net,
        });
        Ok(self.output.clone())
    }
}

impl XsltProcessor for CannedXslt {
    fn compile(&self, _stylesheet: &[u8], uri: &str) -> Result<Box<dyn Stylesheet>, XsltError> {
        let output = self
            .outputs
            .get(uri)
            .cloned()
            .ok_or_else(|| XsltError::Message(format!("no canned output for {uri}")))?;

        Ok(Box::new(CannedStylesheet {
            uri: uri.to_owned(),
            output,
            applied: Rc::clone(&self.applied),
        }))
    }
}

/// Everything a parser reported.
#[derive(Clone, Default)]
pub struct Collected {
    pub triples: Rc<RefCell<Vec<Triple>>>,
    pub errors: Rc<RefCell<Vec<String>>>,
    pub warnings: Rc<RefCell<Vec<String>>>,
}

#[allow(unused)]
impl Collected {
    pub fn ntriples(&self) -> String {
        ntriples(&self.triples.borrow())
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.borrow().clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.borrow().clone()
    }
}

/// A parser for `name` on the built-in registry, wired to the given
/// services and collecting everything it reports.
#[allow(unused)]
pub fn collecting_parser(
    name: &str,
    fetcher: Rc<MapFetcher>,
    xslt: Option<Rc<CannedXslt>>,
) -> (Parser, Collected) {
    let collected = Collected::default();

    let mut parser = Parser::new(&Registry::global(), name).unwrap();
    parser.set_fetcher(fetcher);
    if let Some(xslt) = xslt {
        parser.set_xslt_processor(xslt);
    }

    parser.set_statement_handler({
        let triples = Rc::clone(&collected.triples);
        move |triple| triples.borrow_mut().push(triple.clone())
    });
    parser.set_fatal_error_handler({
        let errors = Rc::clone(&collected.errors);
        move |_, message| errors.borrow_mut().push(format!("fatal: {message}"))
    });
    parser.set_error_handler({
        let errors = Rc::clone(&collected.errors);
        move |_, message| errors.borrow_mut().push(message.to_owned())
    });
    parser.set_warning_handler({
        let warnings = Rc::clone(&collected.warnings);
        move |_, message| warnings.borrow_mut().push(message.to_owned())
    });

    (parser, collected)
}

pub fn iri(value: &str) -> Iri<String> {
    Iri::parse(value.to_owned()).unwrap()
}

/// N-Triples, one statement per line, sorted so that output order does
/// not matter.
pub fn ntriples(triples: &[Triple]) -> String {
    let mut output = Vec::new();
    let mut writer = oxttl::NTriplesSerializer::new().for_writer(&mut output);
    for triple in triples {
        writer.serialize_triple(triple).unwrap();
    }
    writer.finish();

    String::from_utf8(output)
        .unwrap()
        .lines()
        .sorted()
        .join("\n")
}
