//! GRDDL: Gleaning Resource Descriptions from Dialects of Languages.
//!
//! An XML or XHTML document names the XSLT stylesheets that turn it into
//! RDF, either directly (`rel="transformation"` links, `data-view`
//! attributes) or through its root namespace and `head/@profile` URIs,
//! whose own documents can declare transformations for it.
//!
//! <https://www.w3.org/TR/grddl/>

mod entities;
mod rules;

use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use indexmap::IndexSet;
use log::{debug, trace};
use oxiri::Iri;
use oxrdf::{NamedNode, Subject, Term, Triple};

use crate::Error;
use crate::parser::{ChunkSink, Parser, ParserState, StatementHandler, SyntaxParser};
use crate::registry::{ParserFactory, Registry, SniffInput};
use crate::syntaxes::RDFXML;
use crate::www::FetchRequest;
use crate::xslt::TransformOutput;

use rules::{MatchRule, XPathContext};

pub const NAME: &str = "grddl";

/// Sent with every request the engine makes.
pub const USER_AGENT: &str = "grddl/0.1";

pub mod vocab {
    use oxrdf::NamedNodeRef;

    pub const DATA_VIEW_PROFILE: &str = "http://www.w3.org/2003/g/data-view";
    pub const DATA_VIEW_NS: &str = "http://www.w3.org/2003/g/data-view#";
    pub const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";
    pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";
    pub const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";

    pub static NAMESPACE_TRANSFORMATION: NamedNodeRef = NamedNodeRef::new_unchecked(
        "http://www.w3.org/2003/g/data-view#namespaceTransformation",
    );
    pub static PROFILE_TRANSFORMATION: NamedNodeRef = NamedNodeRef::new_unchecked(
        "http://www.w3.org/2003/g/data-view#profileTransformation",
    );
}

/// Root namespaces that never lead to transformations.
const IGNORED_NAMESPACES: [&str; 3] = [
    vocab::XHTML_NS,
    vocab::RDF_NS,
    "http://www.w3.org/2001/XMLSchema",
];

pub(crate) fn register(registry: &mut Registry) {
    registry.register(factory());
}

fn factory() -> ParserFactory {
    ParserFactory::new::<GrddlParser>(
        NAME,
        "Gleaning Resource Descriptions from Dialects of Languages",
    )
    .with_mime_type("text/html", 2)
    .with_mime_type("application/html+xml", 2)
    .with_recogniser(recognise_syntax)
    .needs_base_uri()
}

fn recognise_syntax(input: &SniffInput<'_>) -> i32 {
    let mut score = match input.suffix {
        Some("xhtml") => 7,
        Some("html") => 2,
        _ => 0,
    };

    if input.identifier.is_some_and(|id| id.contains("xhtml")) {
        score += 5;
    }

    score
}

/// Where an engine is in processing its current document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Stage {
    #[default]
    Fresh,
    Buffering,
    Analyzing,
    DrainingTransforms,
    Done,
    Failed,
}

/// State shared between an engine and the statement handler it installs
/// on its inner parser.
#[derive(Default)]
struct Relay {
    /// Index 0 is the root namespace (if any), then the `head/@profile`
    /// URIs in order.
    profile_uris: Vec<Option<NamedNode>>,
    transforms: VecDeque<NamedNode>,
    /// The handler statements are passed on to.
    saved_statement: Option<StatementHandler>,
}

impl Relay {
    // Watches for `<profile> dv:namespaceTransformation <xslt>` (index 0)
    // and `<profile> dv:profileTransformation <xslt>` (later indices).
    fn observe(&mut self, triple: &Triple) {
        let (Subject::NamedNode(subject), Term::NamedNode(object)) = (&triple.subject, &triple.object)
        else {
            return;
        };

        for (index, profile) in self.profile_uris.iter().enumerate() {
            let Some(profile) = profile else { continue };
            let predicate = if index == 0 {
                vocab::NAMESPACE_TRANSFORMATION
            } else {
                vocab::PROFILE_TRANSFORMATION
            };

            if profile == subject && triple.predicate.as_ref() == predicate {
                debug!("found {predicate} {object} for {profile}");
                self.transforms.push_back(object.clone());
            }
        }
    }
}

fn relay_statement(relay: &RefCell<Relay>, triple: &Triple) {
    let saved = {
        let mut relay = relay.borrow_mut();
        relay.observe(triple);
        relay.saved_statement.clone()
    };

    if let Some(handler) = saved {
        handler(triple);
    }
}

/// The GRDDL syntax.
///
/// Buffers the whole document, then:
///
/// 1. follows the root namespace and every `head/@profile` URI, running
///    GRDDL on each (once per URI across the whole run) so that their
///    transformation assertions are seen,
/// 2. collects the transformations the document names itself, and
/// 3. applies every transformation in turn, parsing each result with
///    whichever syntax its media type calls for.
///
/// Triples from inner parsers reach the statement handler unchanged.
pub struct GrddlParser {
    stage: Stage,
    document: Vec<u8>,
    inner: Option<Parser>,
    relay: Rc<RefCell<Relay>>,
    root_namespace: Option<NamedNode>,
    visited: Rc<RefCell<IndexSet<NamedNode>>>,
    depth: usize,
    applied: Vec<NamedNode>,
}

impl Default for GrddlParser {
    fn default() -> Self {
        GrddlParser {
            stage: Stage::Fresh,
            document: Vec::new(),
            inner: None,
            relay: Rc::default(),
            root_namespace: None,
            visited: Rc::default(),
            depth: 0,
            applied: Vec::new(),
        }
    }
}

impl GrddlParser {
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// 0 for the engine the user created; one more for each level of
    /// namespace or profile document.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Every document URI processed so far in this run, in order.
    pub fn visited_uris(&self) -> Vec<NamedNode> {
        self.visited.borrow().iter().cloned().collect()
    }

    pub fn root_namespace(&self) -> Option<&NamedNode> {
        self.root_namespace.as_ref()
    }

    pub fn profile_uris(&self) -> Vec<Option<NamedNode>> {
        self.relay.borrow().profile_uris.clone()
    }

    /// Transformations applied to the current document, in order.
    pub fn applied_transforms(&self) -> &[NamedNode] {
        &self.applied
    }

    fn adopt_parent(&mut self, visited: Rc<RefCell<IndexSet<NamedNode>>>, depth: usize) {
        self.visited = visited;
        self.depth = depth;
    }

    /// Gets the inner parser for `name`, creating or switching it as
    /// needed. In relay mode its statements pass through [`Relay::observe`]
    /// first.
    fn ensure_inner(&mut self, state: &ParserState, name: &str, relay: bool) -> Result<&mut Parser, Error> {
        let reusable = self
            .inner
            .as_ref()
            .is_some_and(|inner| inner.factory().answers_to(name));

        if !reusable {
            let created = match self.inner.take() {
                Some(mut inner) => inner.exec(name).map(|()| inner),
                None => Parser::new(state.registry(), name),
            };
            let mut inner = created.inspect_err(|_| {
                state.error(&format!("Failed to create {name} parser"));
            })?;

            inner.copy_user_state(state);
            self.relay.borrow_mut().saved_statement = state.handlers().statement.clone();
            self.inner = Some(inner);
        }

        let handler: Option<StatementHandler> = if relay {
            let shared = Rc::clone(&self.relay);
            Some(Rc::new(move |triple: &Triple| relay_statement(&shared, triple)))
        } else {
            self.relay.borrow().saved_statement.clone()
        };

        let inner = self
            .inner
            .as_mut()
            .ok_or_else(|| Error::UnknownSyntax(name.to_owned()))?;
        inner.handlers_mut().statement = handler;
        Ok(inner)
    }

    fn analyze(&mut self, state: &mut ParserState) -> Result<(), Error> {
        self.stage = Stage::Analyzing;

        let base = state
            .base_uri()
            .cloned()
            .ok_or_else(|| Error::MissingBaseUri(NAME.to_owned()))?;
        let base_node = NamedNode::new_unchecked(base.as_str());
        if self.visited.borrow_mut().insert(base_node) {
            trace!("visiting {base} at depth {}", self.depth);
        }

        let source = std::mem::take(&mut self.document);
        let text = decode(&source).map_err(|source| {
            state.error("XML Parsing failed");
            Error::Encoding {
                source,
                uri: base.to_string(),
            }
        })?;

        let text = entities::expand(text);
        let mut options = roxmltree::ParsingOptions::default();
        options.allow_dtd = true;
        let document = roxmltree::Document::parse_with_options(&text, options).map_err(|source| {
            state.error(&format!("XML Parsing failed: {source}"));
            Error::Xml {
                source,
                uri: base.to_string(),
            }
        })?;

        let root = document.root_element();
        if root.tag_name().namespace() == Some(vocab::RDF_NS) && root.tag_name().name() == "RDF" {
            debug!("{base} is RDF/XML; parsing it directly");
            if let Err(error) = self.parse_as_rdfxml(state, text.as_bytes(), &base) {
                debug!("RDF/XML parse of {base} failed: {error}");
            }
        }

        let root_namespace = root
            .tag_name()
            .namespace()
            .filter(|ns| !IGNORED_NAMESPACES.contains(ns))
            .and_then(|ns| match base.resolve(ns) {
                Ok(uri) => Some(NamedNode::new_unchecked(uri.into_inner())),
                Err(error) => {
                    state.error(&format!("Invalid root namespace '{ns}': {error}"));
                    None
                }
            });
        self.root_namespace = root_namespace.clone();

        // registered before following, so the namespace document's own
        // assertions are observed
        self.relay.borrow_mut().profile_uris.push(root_namespace.clone());
        if let Some(namespace) = root_namespace {
            debug!("root namespace {namespace}");
            if let Err(error) = self.run_recursive(state, &namespace) {
                debug!("GRDDL of namespace {namespace} failed: {error}");
            }
        }

        let context = XPathContext::new().map_err(|error| {
            state.error("Failed to create XPath context");
            Error::Syntax {
                syntax: NAME.to_owned(),
                message: error.to_string(),
            }
        })?;

        for profile in self.run_match(state, &context, &document, &base, &rules::HEAD_PROFILE) {
            self.relay.borrow_mut().profile_uris.push(Some(profile.clone()));
            if let Err(error) = self.run_recursive(state, &profile) {
                debug!("GRDDL of profile {profile} failed: {error}");
            }
        }

        for rule in &rules::MATCH_TABLE {
            let mut found = self.run_match(state, &context, &document, &base, rule);
            if let (Some(xslt_uri), Some(first)) = (rule.xslt_uri, found.first_mut()) {
                match base.resolve(xslt_uri) {
                    Ok(uri) => *first = NamedNode::new_unchecked(uri.into_inner()),
                    Err(error) => state.error(&format!("Invalid XSLT URI '{xslt_uri}': {error}")),
                }
            }

            self.relay.borrow_mut().transforms.extend(found);
            if state.failed() {
                break;
            }
        }

        self.stage = Stage::DrainingTransforms;
        while !state.failed() {
            let next = self.relay.borrow_mut().transforms.pop_front();
            let Some(xslt_uri) = next else { break };

            if let Err(error) = self.run_transform(state, &xslt_uri, text.as_bytes(), &base) {
                debug!("transformation {xslt_uri} failed: {error}");
            }
            self.applied.push(xslt_uri);
        }

        if state.failed() {
            return Err(Error::Aborted);
        }
        Ok(())
    }

    /// The URIs a rule selects, resolved against the `xml:base` in scope.
    fn run_match(
        &self,
        state: &ParserState,
        context: &XPathContext,
        document: &roxmltree::Document<'_>,
        base: &Iri<String>,
        rule: &MatchRule,
    ) -> Vec<NamedNode> {
        let matches = match context.select(document, rule.selector) {
            Ok(matches) => matches,
            Err(error) => {
                state.error(&format!("Unable to evaluate XPath expression \"{}\": {error}", rule.xpath));
                return Vec::new();
            }
        };

        let mut uris = Vec::new();
        for found in matches {
            let node_base = rules::xml_base(found.element, base);
            let values: Vec<&str> = if rule.flags.value_list {
                found.value.split(' ').filter(|v| !v.is_empty()).collect()
            } else {
                vec![found.value]
            };

            for value in values {
                let uri = match node_base.resolve(value) {
                    Ok(uri) => uri.into_inner(),
                    Err(error) => {
                        state.error(&format!("Invalid URI '{value}' in {}: {error}", rule.xpath));
                        continue;
                    }
                };

                if rule.flags.profile && uri == vocab::DATA_VIEW_PROFILE {
                    trace!("skipping the data-view profile itself");
                    continue;
                }

                debug!("{} matched {uri}", rule.xpath);
                uris.push(NamedNode::new_unchecked(uri));
            }
        }

        uris
    }

    fn parse_as_rdfxml(&mut self, state: &ParserState, source: &[u8], base: &Iri<String>) -> Result<(), Error> {
        let inner = self.ensure_inner(state, RDFXML, false)?;
        inner.start_parse(Some(base.clone()))?;
        inner.parse_chunk(source, true)
    }

    /// Runs GRDDL on the document at `uri` with a child engine sharing this
    /// run's visited set. Its statements come back through the relay.
    fn run_recursive(&mut self, state: &ParserState, uri: &NamedNode) -> Result<(), Error> {
        if self.visited.borrow().contains(uri) {
            debug!("already processed {uri}");
            return Ok(());
        }

        let base = Iri::parse(uri.as_str().to_owned()).map_err(|source| Error::IriParseError {
            source,
            iri: uri.as_str().to_owned(),
        })?;

        let visited = Rc::clone(&self.visited);
        let depth = self.depth + 1;
        let inner = self.ensure_inner(state, NAME, true)?;
        if let Some(child) = inner.syntax_mut::<GrddlParser>() {
            child.adopt_parent(visited, depth);
        }

        inner.start_parse(Some(base))?;
        fetch_into(state, uri.as_str(), &mut *inner)?;
        inner.parse_chunk(&[], true)
    }

    fn run_transform(
        &mut self,
        state: &ParserState,
        xslt_uri: &NamedNode,
        source: &[u8],
        base: &Iri<String>,
    ) -> Result<(), Error> {
        debug!("applying {xslt_uri} to {base}");

        let mut stylesheet = Vec::new();
        fetch_into(state, xslt_uri.as_str(), &mut stylesheet)?;

        let text = decode(&stylesheet).map_err(|source| {
            state.error("XML Parsing failed");
            Error::Encoding {
                source,
                uri: xslt_uri.to_string(),
            }
        })?;
        if let Err(source) = roxmltree::Document::parse(text) {
            state.error(&format!("XML Parsing failed: {source}"));
            return Err(Error::Xml {
                source,
                uri: xslt_uri.to_string(),
            });
        }

        let processor = state.xslt_processor().ok_or_else(|| {
            state.error("No XSLT processor is configured");
            Error::NoXsltProcessor
        })?;

        let compiled = processor
            .compile(&stylesheet, xslt_uri.as_str())
            .inspect_err(|error| {
                state.error(&format!("Failed to parse stylesheet in '{xslt_uri}': {error}"));
            })?;

        let no_net = state.features().no_net;
        let output = compiled.apply(source, base.as_str(), no_net).inspect_err(|error| {
            state.error(&format!("Failed to apply stylesheet in '{xslt_uri}': {error}"));
        })?;

        self.parse_output(state, output, base)
    }

    fn parse_output(&mut self, state: &ParserState, output: TransformOutput, base: &Iri<String>) -> Result<(), Error> {
        let method = if output.html_document {
            Some("html")
        } else {
            output.method.as_deref()
        };

        if output.bytes.is_empty() {
            state.warning("XSLT returned an empty document");
            return Ok(());
        }

        let media_type = output_media_type(method, output.media_type.as_deref());
        let name = state
            .registry()
            .guess(None, Some(media_type), Some(&output.bytes), None)
            .unwrap_or(RDFXML)
            .to_owned();
        debug!("parsing {media_type} output with {name}");

        if name == NAME {
            debug!("not recursing into {name} for transformation output");
            return Ok(());
        }

        let inner = self.ensure_inner(state, &name, true)?;
        inner.start_parse(Some(base.clone()))?;
        inner.parse_chunk(&output.bytes, true)
    }
}

impl SyntaxParser for GrddlParser {
    fn start(&mut self, state: &mut ParserState) -> Result<(), Error> {
        state.locator_mut().line = Some(1);

        self.stage = Stage::Fresh;
        self.document.clear();
        self.root_namespace = None;
        self.applied.clear();
        if self.depth == 0 {
            self.visited.borrow_mut().clear();
        }

        let mut relay = self.relay.borrow_mut();
        relay.profile_uris.clear();
        relay.transforms.clear();
        Ok(())
    }

    fn chunk(&mut self, state: &mut ParserState, bytes: &[u8], is_end: bool) -> Result<(), Error> {
        if self.stage == Stage::Fresh {
            self.stage = Stage::Buffering;
        }
        self.document.extend_from_slice(bytes);

        if !is_end {
            return Ok(());
        }

        match self.analyze(state) {
            Ok(()) => {
                self.stage = Stage::Done;
                Ok(())
            }
            Err(error) => {
                self.stage = Stage::Failed;
                state.set_failed();
                Err(error)
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Fetches `uri` on behalf of the engine, honouring `no-net`.
fn fetch_into(state: &ParserState, uri: &str, sink: impl IntoSink) -> Result<(), Error> {
    state.check_network_access(uri)?;

    let accept = state.registry().accept_header(NAME);
    let request = FetchRequest {
        uri,
        user_agent: Some(USER_AGENT),
        accept: accept.as_deref(),
    };

    sink.fetch(state, &request)
}

/// What fetched bytes can be written into: a buffer, or a parser fed
/// chunk by chunk.
trait IntoSink {
    fn fetch(self, state: &ParserState, request: &FetchRequest<'_>) -> Result<(), Error>;
}

impl IntoSink for &mut Vec<u8> {
    fn fetch(self, state: &ParserState, request: &FetchRequest<'_>) -> Result<(), Error> {
        state.fetcher().fetch(request, self).map_err(|error| {
            state.error(&error.to_string());
            Error::from(error)
        })
    }
}

impl IntoSink for &mut Parser {
    fn fetch(self, state: &ParserState, request: &FetchRequest<'_>) -> Result<(), Error> {
        let mut sink = ChunkSink::new(self);
        if let Err(error) = state.fetcher().fetch(request, &mut sink) {
            state.error(&error.to_string());
            return Err(error.into());
        }

        match sink.error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn decode(bytes: &[u8]) -> Result<&str, std::str::Utf8Error> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    std::str::from_utf8(bytes)
}

/// The media type a transformation's output is parsed as. Generic XML
/// output is taken to be RDF/XML.
fn output_media_type<'a>(method: Option<&'a str>, media_type: Option<&'a str>) -> &'a str {
    let media_type = media_type.or(match method {
        Some("text") => Some("text/plain"),
        Some("xml") => Some("application/xml"),
        Some("html") => Some("text/html"),
        _ => None,
    });

    match media_type {
        None | Some("") | Some("application/xml") => "application/rdf+xml",
        Some(media_type) => media_type,
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(None, None, "application/rdf+xml")]
    #[case(Some("xml"), None, "application/rdf+xml")]
    #[case(Some("text"), None, "text/plain")]
    #[case(Some("html"), None, "text/html")]
    #[case(Some("text"), Some("text/turtle"), "text/turtle")]
    #[case(Some("xml"), Some("application/xml"), "application/rdf+xml")]
    #[case(None, Some(""), "application/rdf+xml")]
    fn media_type_of_output(
        #[case] method: Option<&str>,
        #[case] media_type: Option<&str>,
        #[case] expected: &str,
    ) {
        assert_eq!(output_media_type(method, media_type), expected);
    }

    #[rstest]
    #[case(Some("page.xhtml"), Some("xhtml"), 10)]
    #[case(Some("page.html"), Some("html"), 2)]
    #[case(Some("http://example.org/xhtml/page"), None, 5)]
    #[case(Some("page.txt"), Some("txt"), 0)]
    #[case(None, None, 0)]
    fn recognising_documents(
        #[case] identifier: Option<&str>,
        #[case] suffix: Option<&str>,
        #[case] expected: i32,
    ) {
        let input = SniffInput {
            identifier,
            suffix,
            ..SniffInput::default()
        };
        // scores are capped by the registry, not here
        assert_eq!(recognise_syntax(&input).min(10), expected);
    }

    fn triple(s: &str, p: NamedNode, o: &str) -> Triple {
        Triple::new(NamedNode::new_unchecked(s), p, NamedNode::new_unchecked(o))
    }

    #[test]
    fn relay_matches_by_profile_position() {
        let namespace = "http://example.org/ns";
        let profile = "http://example.org/profile";
        let mut relay = Relay {
            profile_uris: vec![
                Some(NamedNode::new_unchecked(namespace)),
                Some(NamedNode::new_unchecked(profile)),
            ],
            ..Relay::default()
        };

        let ns_transform = vocab::NAMESPACE_TRANSFORMATION.into_owned();
        let profile_transform = vocab::PROFILE_TRANSFORMATION.into_owned();

        relay.observe(&triple(namespace, ns_transform.clone(), "http://example.org/a.xsl"));
        relay.observe(&triple(namespace, profile_transform.clone(), "http://example.org/no.xsl"));
        relay.observe(&triple(profile, profile_transform, "http://example.org/b.xsl"));
        relay.observe(&triple(profile, ns_transform, "http://example.org/no.xsl"));

        assert_eq!(
            relay.transforms.iter().map(NamedNode::as_str).collect::<Vec<_>>(),
            vec!["http://example.org/a.xsl", "http://example.org/b.xsl"]
        );
    }

    #[test]
    fn relay_skips_missing_root_namespace() {
        let mut relay = Relay {
            profile_uris: vec![None],
            ..Relay::default()
        };
        relay.observe(&triple(
            "http://example.org/ns",
            vocab::NAMESPACE_TRANSFORMATION.into_owned(),
            "http://example.org/a.xsl",
        ));
        assert!(relay.transforms.is_empty());
    }

    #[test]
    fn relay_passes_statements_on() {
        let seen = Rc::new(RefCell::new(0));
        let relay = RefCell::new(Relay {
            saved_statement: Some({
                let seen = Rc::clone(&seen);
                Rc::new(move |_: &Triple| *seen.borrow_mut() += 1)
            }),
            ..Relay::default()
        });

        let t = triple(
            "http://example.org/s",
            NamedNode::new_unchecked("http://example.org/p"),
            "http://example.org/o",
        );
        relay_statement(&relay, &t);
        relay_statement(&relay, &t);
        assert_eq!(*seen.borrow(), 2);
    }

    #[test]
    fn byte_order_mark_is_ignored() {
        assert_eq!(decode(b"\xEF\xBB\xBF<a/>").unwrap(), "<a/>");
        assert!(decode(b"\xFF<a/>").is_err());
    }
}
