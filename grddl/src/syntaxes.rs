//! The plain RDF syntaxes: RDF/XML, N-Triples and Turtle.
//!
//! Each buffers its input and parses it in one go on the last chunk.

use std::any::Any;
use std::collections::HashMap;

use oxrdf::{BlankNode, Subject, Term, Triple};
use oxrdfxml::RdfXmlParser;
use oxttl::{NTriplesParser, TurtleParser};

use crate::Error;
use crate::parser::{GenIdKind, ParserState, SyntaxParser};
use crate::qname::Namespace;
use crate::registry::{ParserFactory, Registry, SniffInput};

pub const RDFXML: &str = "rdfxml";
pub const NTRIPLES: &str = "ntriples";
pub const TURTLE: &str = "turtle";

const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";

pub(crate) fn register(registry: &mut Registry) {
    registry.register(
        ParserFactory::new::<RdfXmlSyntax>(RDFXML, "RDF/XML")
            .with_mime_type("application/rdf+xml", 10)
            .with_uri("http://www.w3.org/TR/rdf-syntax-grammar")
            .with_recogniser(recognise_rdfxml)
            .needs_base_uri(),
    );
    registry.add_alias(RDFXML, "raptor");

    registry.register(
        ParserFactory::new::<NTriplesSyntax>(NTRIPLES, "N-Triples")
            .with_mime_type("application/n-triples", 10)
            .with_mime_type("text/plain", 1)
            .with_uri("http://www.w3.org/TR/rdf-testcases/#ntriples")
            .with_recogniser(recognise_ntriples),
    );

    registry.register(
        ParserFactory::new::<TurtleSyntax>(TURTLE, "Turtle Terse RDF Triple Language")
            .with_mime_type("text/turtle", 10)
            .with_mime_type("application/x-turtle", 10)
            .with_uri("http://www.dajobe.org/2004/01/turtle")
            .with_recogniser(recognise_turtle)
            .needs_base_uri(),
    );
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

fn recognise_rdfxml(input: &SniffInput<'_>) -> i32 {
    let mut score = match input.suffix {
        Some("rdf" | "rdfs" | "owl") => 9,
        Some("xml") => 5,
        _ => 0,
    };

    if let Some(buffer) = input.buffer {
        if contains(buffer, b"rdf:RDF") {
            score += 7;
        } else if contains(buffer, RDF_NS.as_bytes()) {
            score += 5;
        }
    }

    score
}

fn recognise_ntriples(input: &SniffInput<'_>) -> i32 {
    match input.suffix {
        Some("nt") => 8,
        _ => 0,
    }
}

fn recognise_turtle(input: &SniffInput<'_>) -> i32 {
    let mut score = match input.suffix {
        Some("ttl") => 8,
        Some("n3") => 3,
        _ => 0,
    };

    if input.buffer.is_some_and(|buffer| contains(buffer, b"@prefix")) {
        score += 2;
    }

    score
}

/// Maps the labels a document uses to labels from the handle's id
/// generator, so blank nodes from separate documents never collide.
#[derive(Default)]
struct BlankNodeLabels(HashMap<String, BlankNode>);

impl BlankNodeLabels {
    fn relabel(&mut self, state: &ParserState, triple: Triple) -> Result<Triple, Error> {
        let subject: Subject = match triple.subject {
            Subject::BlankNode(node) => self.label(state, node)?.into(),
            subject => subject,
        };
        let object: Term = match triple.object {
            Term::BlankNode(node) => self.label(state, node)?.into(),
            object => object,
        };

        Ok(Triple::new(subject, triple.predicate, object))
    }

    fn label(&mut self, state: &ParserState, node: BlankNode) -> Result<BlankNode, Error> {
        if let Some(label) = self.0.get(node.as_str()) {
            return Ok(label.clone());
        }

        let id = state.generate_id(GenIdKind::BnodeId, None);
        let label = BlankNode::new(id.as_str())
            .map_err(|source| Error::InvalidBlankNodeId { source, id })?;
        self.0.insert(node.into_string(), label.clone());
        Ok(label)
    }
}

fn syntax_error(state: &mut ParserState, syntax: &str, message: String) -> Error {
    state.error(&message);
    Error::Syntax {
        syntax: syntax.to_owned(),
        message,
    }
}

fn emit_all<E: std::fmt::Display>(
    state: &mut ParserState,
    syntax: &str,
    triples: impl Iterator<Item = Result<Triple, E>>,
    on_error: impl Fn(&E, &mut ParserState),
) -> Result<(), Error> {
    let mut labels = BlankNodeLabels::default();
    for result in triples {
        match result {
            Ok(triple) => {
                let triple = labels.relabel(state, triple).inspect_err(|error| {
                    state.error(&error.to_string());
                })?;
                state.emit_statement(&triple);
            }
            Err(error) => {
                on_error(&error, state);
                return Err(syntax_error(state, syntax, error.to_string()));
            }
        }

        if state.failed() {
            return Err(Error::Aborted);
        }
    }

    Ok(())
}

fn base_iri_error(state: &ParserState, source: oxiri::IriParseError) -> Error {
    Error::IriParseError {
        source,
        iri: state.base_uri().map(|b| b.to_string()).unwrap_or_default(),
    }
}

#[derive(Default)]
pub struct RdfXmlSyntax {
    buffer: Vec<u8>,
}

impl SyntaxParser for RdfXmlSyntax {
    fn start(&mut self, _state: &mut ParserState) -> Result<(), Error> {
        self.buffer.clear();
        Ok(())
    }

    fn chunk(&mut self, state: &mut ParserState, bytes: &[u8], is_end: bool) -> Result<(), Error> {
        self.buffer.extend_from_slice(bytes);
        if !is_end {
            return Ok(());
        }

        let buffer = std::mem::take(&mut self.buffer);
        let mut parser = RdfXmlParser::new();
        if let Some(base) = state.base_uri() {
            parser = parser
                .with_base_iri(base.as_str())
                .map_err(|e| base_iri_error(state, e))?;
        }

        emit_all(state, RDFXML, parser.for_slice(&buffer), |_, _| {})
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn locate(error: &oxttl::TurtleSyntaxError, state: &mut ParserState) {
    let start = error.location().start;
    let locator = state.locator_mut();
    locator.line = Some(start.line + 1);
    locator.column = Some(start.column + 1);
    locator.byte = Some(start.offset);
}

#[derive(Default)]
pub struct NTriplesSyntax {
    buffer: Vec<u8>,
}

impl SyntaxParser for NTriplesSyntax {
    fn start(&mut self, _state: &mut ParserState) -> Result<(), Error> {
        self.buffer.clear();
        Ok(())
    }

    fn chunk(&mut self, state: &mut ParserState, bytes: &[u8], is_end: bool) -> Result<(), Error> {
        self.buffer.extend_from_slice(bytes);
        if !is_end {
            return Ok(());
        }

        let buffer = std::mem::take(&mut self.buffer);
        emit_all(state, NTRIPLES, NTriplesParser::new().for_slice(&buffer), locate)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Default)]
pub struct TurtleSyntax {
    buffer: Vec<u8>,
}

impl SyntaxParser for TurtleSyntax {
    fn start(&mut self, _state: &mut ParserState) -> Result<(), Error> {
        self.buffer.clear();
        Ok(())
    }

    fn chunk(&mut self, state: &mut ParserState, bytes: &[u8], is_end: bool) -> Result<(), Error> {
        self.buffer.extend_from_slice(bytes);
        if !is_end {
            return Ok(());
        }

        let buffer = std::mem::take(&mut self.buffer);
        let mut parser = TurtleParser::new();
        if let Some(base) = state.base_uri() {
            parser = parser
                .with_base_iri(base.as_str())
                .map_err(|e| base_iri_error(state, e))?;
        }

        let mut triples = parser.for_slice(&buffer);
        emit_all(state, TURTLE, triples.by_ref(), locate)?;

        for (prefix, uri) in triples.prefixes() {
            match Namespace::new(Some(prefix), Some(uri), 0) {
                Ok(namespace) => state.start_namespace(&namespace),
                Err(error) => state.warning(&error.to_string()),
            }
        }

        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
