//! Parser handles: one syntax, its callbacks, and the state of one parse.

use std::any::Any;
use std::cell::Cell;
use std::io::Read;
use std::ops::ControlFlow;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use log::{debug, trace};
use oxiri::Iri;
use oxrdf::Triple;

use crate::error::{Error, Level, Locator};
use crate::features::{Feature, Features};
use crate::qname::Namespace;
use crate::registry::{ParserFactory, Registry};
use crate::www::{self, DefaultFetcher, FetchRequest, Fetcher, ResponseSink};
use crate::xslt::XsltProcessor;

/// The syntax-specific half of a parser.
///
/// Dropping it is its teardown.
pub trait SyntaxParser: Any {
    /// Prepares for a new document. The base URI and locator in `state`
    /// are already set.
    fn start(&mut self, state: &mut ParserState) -> Result<(), Error> {
        let _ = state;
        Ok(())
    }

    /// Consumes the next piece of input. `is_end` marks the last one, which
    /// may be empty.
    fn chunk(&mut self, state: &mut ParserState, bytes: &[u8], is_end: bool) -> Result<(), Error>;

    /// The content type of the input, when it was fetched from somewhere
    /// that reported one.
    fn content_type(&mut self, state: &mut ParserState, content_type: &str) {
        let _ = (state, content_type);
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

pub type StatementHandler = Rc<dyn Fn(&Triple)>;
pub type MessageHandler = Rc<dyn Fn(&Locator, &str)>;
pub type GenerateIdHandler = Rc<dyn Fn(GenIdKind, Option<&str>) -> String>;
pub type NamespaceHandler = Rc<dyn Fn(&Namespace)>;

/// The callbacks of a handle. Cloning shares them.
#[derive(Clone, Default)]
pub struct Handlers {
    pub statement: Option<StatementHandler>,
    pub fatal_error: Option<MessageHandler>,
    pub error: Option<MessageHandler>,
    pub warning: Option<MessageHandler>,
    pub generate_id: Option<GenerateIdHandler>,
    pub namespace: Option<NamespaceHandler>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GenIdKind {
    BnodeId,
    BagId,
}

/// Produces `<prefix><n>` labels from a counter that handles sharing user
/// state also share.
#[derive(Clone, Debug)]
pub struct IdGenerator {
    prefix: Rc<str>,
    counter: Rc<Cell<u64>>,
}

impl Default for IdGenerator {
    fn default() -> Self {
        IdGenerator::new(None, 1)
    }
}

impl IdGenerator {
    /// The first generated id is `base` (at least 1); `prefix` defaults to
    /// `genid`.
    pub fn new(prefix: Option<&str>, base: i64) -> Self {
        let start = u64::try_from(base.saturating_sub(1)).unwrap_or(0);
        IdGenerator {
            prefix: Rc::from(prefix.unwrap_or("genid")),
            counter: Rc::new(Cell::new(start)),
        }
    }

    pub fn generate(&self, user_id: Option<&str>) -> String {
        if let Some(id) = user_id {
            return id.to_owned();
        }

        let id = self.counter.get() + 1;
        self.counter.set(id);
        format!("{}{id}", self.prefix)
    }
}

/// Sets the failed flag of a handle from outside it.
#[derive(Clone, Debug)]
pub struct AbortHandle(Rc<Cell<bool>>);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.set(true);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.get()
    }
}

/// Services a handle uses but does not own.
#[derive(Clone)]
pub struct Services {
    pub fetcher: Rc<dyn Fetcher>,
    pub xslt: Option<Rc<dyn XsltProcessor>>,
}

impl Default for Services {
    fn default() -> Self {
        Services {
            fetcher: Rc::new(DefaultFetcher::new()),
            xslt: None,
        }
    }
}

/// Everything about a handle except its syntax: this is what a
/// [`SyntaxParser`] sees while it runs.
pub struct ParserState {
    registry: Arc<Registry>,
    factory: Arc<ParserFactory>,
    base_uri: Option<Iri<String>>,
    locator: Locator,
    failed: Rc<Cell<bool>>,
    features: Features,
    handlers: Handlers,
    id_generator: IdGenerator,
    services: Services,
}

impl ParserState {
    fn new(registry: Arc<Registry>, factory: Arc<ParserFactory>) -> Self {
        ParserState {
            registry,
            factory,
            base_uri: None,
            locator: Locator::default(),
            failed: Rc::new(Cell::new(false)),
            features: Features::lax(),
            handlers: Handlers::default(),
            id_generator: IdGenerator::default(),
            services: Services::default(),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn factory(&self) -> &Arc<ParserFactory> {
        &self.factory
    }

    pub fn base_uri(&self) -> Option<&Iri<String>> {
        self.base_uri.as_ref()
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn locator_mut(&mut self) -> &mut Locator {
        &mut self.locator
    }

    pub fn features(&self) -> &Features {
        &self.features
    }

    pub fn handlers(&self) -> &Handlers {
        &self.handlers
    }

    pub fn failed(&self) -> bool {
        self.failed.get()
    }

    pub fn set_failed(&self) {
        self.failed.set(true);
    }

    pub fn fetcher(&self) -> Rc<dyn Fetcher> {
        Rc::clone(&self.services.fetcher)
    }

    pub fn xslt_processor(&self) -> Option<Rc<dyn XsltProcessor>> {
        self.services.xslt.clone()
    }

    pub fn emit_statement(&self, triple: &Triple) {
        if let Some(handler) = &self.handlers.statement {
            handler(triple);
        }
    }

    pub fn start_namespace(&self, namespace: &Namespace) {
        if let Some(handler) = &self.handlers.namespace {
            handler(namespace);
        }
    }

    pub fn generate_id(&self, kind: GenIdKind, user_id: Option<&str>) -> String {
        match &self.handlers.generate_id {
            Some(handler) => handler(kind, user_id),
            None => self.id_generator.generate(user_id),
        }
    }

    pub fn fatal(&self, message: &str) {
        self.report(Level::Fatal, message);
    }

    pub fn error(&self, message: &str) {
        self.report(Level::Error, message);
    }

    pub fn warning(&self, message: &str) {
        self.report(Level::Warning, message);
    }

    /// Sends a diagnostic to the matching handler, or to stderr when there
    /// is none. A fatal diagnostic marks the parse as failed, and with no
    /// handler to receive it ends the process.
    pub fn report(&self, level: Level, message: &str) {
        let message = message.trim_end_matches('\n');
        if level == Level::Fatal {
            self.set_failed();
        }

        let handler = match level {
            Level::Fatal => &self.handlers.fatal_error,
            Level::Error => &self.handlers.error,
            Level::Warning => &self.handlers.warning,
        };

        match handler {
            Some(handler) => handler(&self.locator, message),
            None => {
                eprintln!("{} {level} - {message}", self.locator);
                if level == Level::Fatal {
                    std::process::abort();
                }
            }
        }
    }

    /// Refuses, with an error diagnostic, to touch the network when the
    /// `no-net` feature is on.
    pub fn check_network_access(&self, uri: &str) -> Result<(), Error> {
        if self.features.no_net && www::is_network_uri(uri) {
            self.error(&format!("Network access denied for '{uri}'"));
            return Err(Error::NetworkDenied(uri.to_owned()));
        }
        Ok(())
    }

    pub(crate) fn copy_user_state_from(&mut self, other: &ParserState) {
        self.handlers = other.handlers.clone();
        self.id_generator = other.id_generator.clone();
        self.services = other.services.clone();
        self.features = other.features;
    }
}

/// A parser for one syntax.
///
/// A handle is reusable: every [`Parser::start_parse`] begins a new
/// document.
pub struct Parser {
    state: ParserState,
    syntax: Box<dyn SyntaxParser>,
}

impl Parser {
    pub fn new(registry: &Arc<Registry>, name: &str) -> Result<Self, Error> {
        let factory = registry
            .find(name)
            .cloned()
            .ok_or_else(|| Error::UnknownSyntax(name.to_owned()))?;

        let syntax = factory.instantiate();
        Ok(Parser {
            state: ParserState::new(Arc::clone(registry), factory),
            syntax,
        })
    }

    /// Builds a parser for whichever syntax [`Registry::guess`] picks.
    pub fn new_for_content(
        registry: &Arc<Registry>,
        uri: Option<&str>,
        mime_type: Option<&str>,
        buffer: Option<&[u8]>,
        identifier: Option<&str>,
    ) -> Result<Self, Error> {
        let name = registry
            .guess(uri, mime_type, buffer, identifier)
            .ok_or_else(|| Error::UnknownSyntax(identifier.unwrap_or_default().to_owned()))?
            .to_owned();

        Parser::new(registry, &name)
    }

    /// Switches the handle to another syntax, keeping its callbacks and
    /// configuration.
    pub fn exec(&mut self, name: &str) -> Result<(), Error> {
        let factory = self
            .state
            .registry
            .find(name)
            .cloned()
            .ok_or_else(|| Error::UnknownSyntax(name.to_owned()))?;

        debug!("switching parser from {} to {}", self.state.factory.name(), factory.name());
        self.syntax = factory.instantiate();
        self.state.factory = factory;
        Ok(())
    }

    pub fn name(&self) -> &str {
        self.state.factory.name()
    }

    pub fn label(&self) -> &str {
        self.state.factory.label()
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.state.factory.mime_type()
    }

    pub fn factory(&self) -> &Arc<ParserFactory> {
        &self.state.factory
    }

    pub fn state(&self) -> &ParserState {
        &self.state
    }

    pub fn locator(&self) -> &Locator {
        &self.state.locator
    }

    pub fn base_uri(&self) -> Option<&Iri<String>> {
        self.state.base_uri.as_ref()
    }

    pub fn failed(&self) -> bool {
        self.state.failed()
    }

    /// Stops the current parse; remaining input is refused.
    pub fn abort(&self) {
        self.state.set_failed();
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle(Rc::clone(&self.state.failed))
    }

    /// The syntax half of the handle, if it is a `T`.
    pub fn syntax<T: SyntaxParser>(&self) -> Option<&T> {
        self.syntax.as_any().downcast_ref()
    }

    pub fn syntax_mut<T: SyntaxParser>(&mut self) -> Option<&mut T> {
        self.syntax.as_any_mut().downcast_mut()
    }

    pub fn handlers(&self) -> &Handlers {
        &self.state.handlers
    }

    pub fn handlers_mut(&mut self) -> &mut Handlers {
        &mut self.state.handlers
    }

    pub fn set_statement_handler(&mut self, handler: impl Fn(&Triple) + 'static) {
        self.state.handlers.statement = Some(Rc::new(handler));
    }

    pub fn set_fatal_error_handler(&mut self, handler: impl Fn(&Locator, &str) + 'static) {
        self.state.handlers.fatal_error = Some(Rc::new(handler));
    }

    pub fn set_error_handler(&mut self, handler: impl Fn(&Locator, &str) + 'static) {
        self.state.handlers.error = Some(Rc::new(handler));
    }

    pub fn set_warning_handler(&mut self, handler: impl Fn(&Locator, &str) + 'static) {
        self.state.handlers.warning = Some(Rc::new(handler));
    }

    pub fn set_generate_id_handler(
        &mut self,
        handler: impl Fn(GenIdKind, Option<&str>) -> String + 'static,
    ) {
        self.state.handlers.generate_id = Some(Rc::new(handler));
    }

    pub fn set_namespace_handler(&mut self, handler: impl Fn(&Namespace) + 'static) {
        self.state.handlers.namespace = Some(Rc::new(handler));
    }

    pub fn set_fetcher(&mut self, fetcher: Rc<dyn Fetcher>) {
        self.state.services.fetcher = fetcher;
    }

    pub fn set_xslt_processor(&mut self, processor: Rc<dyn XsltProcessor>) {
        self.state.services.xslt = Some(processor);
    }

    pub fn features(&self) -> &Features {
        &self.state.features
    }

    pub fn feature(&self, feature: Feature) -> bool {
        self.state.features.get(feature)
    }

    pub fn set_feature(&mut self, feature: Feature, value: i64) -> Result<(), Error> {
        self.state.features.set(feature, value)
    }

    pub fn set_feature_str(&mut self, feature: Feature, value: &str) -> Result<(), Error> {
        self.state.features.set_from_str(feature, value)
    }

    /// Sets a feature by its name, as accepted by [`Feature::from_str`].
    ///
    /// [`Feature::from_str`]: std::str::FromStr::from_str
    pub fn set_feature_by_name(&mut self, name: &str, value: &str) -> Result<(), Error> {
        let feature = name.parse()?;
        self.set_feature_str(feature, value)
    }

    pub fn set_strict(&mut self, strict: bool) {
        self.state.features.apply_preset(strict);
    }

    pub fn set_default_generate_id_parameters(&mut self, prefix: Option<&str>, base: i64) {
        self.state.id_generator = IdGenerator::new(prefix, base);
    }

    pub fn generate_id(&self, kind: GenIdKind, user_id: Option<&str>) -> String {
        self.state.generate_id(kind, user_id)
    }

    pub fn start_namespace(&self, namespace: &Namespace) {
        self.state.start_namespace(namespace);
    }

    /// Takes callbacks, id generation, services and features from another
    /// handle, so that this one reports as if it were that one.
    pub fn copy_user_state(&mut self, from: &ParserState) {
        self.state.copy_user_state_from(from);
    }

    /// Begins a new document.
    pub fn start_parse(&mut self, base_uri: Option<Iri<String>>) -> Result<(), Error> {
        if base_uri.is_none() && self.state.factory.need_base_uri() {
            let name = self.name().to_owned();
            self.state.error(&format!("Missing base URI for {name} parser"));
            return Err(Error::MissingBaseUri(name));
        }

        self.state
            .locator
            .reset(base_uri.as_ref().map(|b| b.as_str()));
        self.state.base_uri = base_uri;
        self.state.failed.set(false);

        trace!("starting {} parse of {:?}", self.name(), self.state.locator.uri);
        self.syntax.start(&mut self.state)
    }

    pub fn parse_chunk(&mut self, bytes: &[u8], is_end: bool) -> Result<(), Error> {
        if self.state.failed() {
            return Err(Error::Aborted);
        }
        self.syntax.chunk(&mut self.state, bytes, is_end)
    }

    pub fn content_type(&mut self, content_type: &str) {
        self.syntax.content_type(&mut self.state, content_type);
    }

    /// Parses everything `reader` yields as one document.
    pub fn parse_stream(
        &mut self,
        reader: &mut dyn Read,
        file_name: Option<&str>,
        base_uri: Iri<String>,
    ) -> Result<(), Error> {
        self.start_parse(Some(base_uri))?;
        self.state.locator.file = file_name.map(str::to_owned);

        let mut sink = ChunkSink::new(self);
        www::pump(reader, &mut sink)?;
        if let Some(error) = sink.error {
            return Err(error);
        }

        self.parse_chunk(&[], true)
    }

    /// Parses a file, or standard input when `path` is `None`.
    ///
    /// The base URI defaults to the file's URI; standard input has none.
    pub fn parse_file(&mut self, path: Option<&Path>, base_uri: Option<Iri<String>>) -> Result<(), Error> {
        let Some(path) = path else {
            let base_uri = base_uri.ok_or_else(|| Error::MissingBaseUri(self.name().to_owned()))?;
            return self.parse_stream(&mut std::io::stdin().lock(), Some("<stdin>"), base_uri);
        };

        let display = path.display().to_string();
        if path.is_dir() {
            self.state.error(&format!("Cannot read from a directory '{display}'"));
            return Err(Error::IsDirectory(display));
        }

        let base_uri = match base_uri {
            Some(base_uri) => base_uri,
            None => file_uri(path)?,
        };

        let mut file = std::fs::File::open(path).map_err(|e| {
            self.state.error(&format!("file '{display}' open failed - {e}"));
            Error::Io(e)
        })?;

        self.parse_stream(&mut file, Some(&display), base_uri)
    }

    /// Fetches and parses a URI with the handle's fetcher, asking for this
    /// syntax's MIME types.
    pub fn parse_uri(&mut self, uri: &str, base_uri: Option<Iri<String>>) -> Result<(), Error> {
        let accept = self.state.registry.accept_header(self.name());
        let fetcher = self.state.fetcher();
        self.fetch_and_parse(uri, base_uri, &*fetcher, accept.as_deref())
    }

    /// Like [`Parser::parse_uri`], through a caller-provided connection;
    /// no `Accept` header is sent.
    pub fn parse_uri_with_fetcher(
        &mut self,
        uri: &str,
        base_uri: Option<Iri<String>>,
        fetcher: &dyn Fetcher,
    ) -> Result<(), Error> {
        self.fetch_and_parse(uri, base_uri, fetcher, None)
    }

    fn fetch_and_parse(
        &mut self,
        uri: &str,
        base_uri: Option<Iri<String>>,
        fetcher: &dyn Fetcher,
        accept: Option<&str>,
    ) -> Result<(), Error> {
        let base_uri = match base_uri {
            Some(base_uri) => base_uri,
            None => Iri::parse(uri.to_owned()).map_err(|source| Error::IriParseError {
                source,
                iri: uri.to_owned(),
            })?,
        };

        self.state.check_network_access(uri)?;
        self.start_parse(Some(base_uri))?;

        let request = FetchRequest {
            uri,
            user_agent: None,
            accept,
        };

        let mut sink = ChunkSink::new(self).with_content_type();
        if let Err(error) = fetcher.fetch(&request, &mut sink) {
            self.state.error(&error.to_string());
            return Err(error.into());
        }
        if let Some(error) = sink.error {
            return Err(error);
        }

        self.parse_chunk(&[], true)
    }
}

/// Turns a path into a `file:` IRI.
pub fn file_uri(path: &Path) -> Result<Iri<String>, Error> {
    let absolute = std::path::absolute(path)?;
    let url = url::Url::from_file_path(&absolute).map_err(|()| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("cannot make a file URI from '{}'", absolute.display()),
        )
    })?;

    Iri::parse(url.to_string()).map_err(|source| Error::IriParseError {
        source,
        iri: url.to_string(),
    })
}

/// Feeds fetched bytes into a parser, stopping the transfer at the first
/// failed chunk.
pub(crate) struct ChunkSink<'a> {
    parser: &'a mut Parser,
    forward_content_type: bool,
    pub(crate) error: Option<Error>,
}

impl<'a> ChunkSink<'a> {
    pub(crate) fn new(parser: &'a mut Parser) -> Self {
        ChunkSink {
            parser,
            forward_content_type: false,
            error: None,
        }
    }

    pub(crate) fn with_content_type(mut self) -> Self {
        self.forward_content_type = true;
        self
    }
}

impl ResponseSink for ChunkSink<'_> {
    fn content_type(&mut self, content_type: &str) {
        if self.forward_content_type {
            self.parser.content_type(content_type);
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> ControlFlow<String> {
        match self.parser.parse_chunk(bytes, false) {
            Ok(()) => ControlFlow::Continue(()),
            Err(error) => {
                self.error = Some(error);
                ControlFlow::Break("Parsing failed".to_owned())
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Default)]
    struct Recording {
        started: usize,
        input: Vec<u8>,
        ends: usize,
    }

    impl SyntaxParser for Recording {
        fn start(&mut self, _state: &mut ParserState) -> Result<(), Error> {
            self.started += 1;
            self.input.clear();
            Ok(())
        }

        fn chunk(&mut self, state: &mut ParserState, bytes: &[u8], is_end: bool) -> Result<(), Error> {
            self.input.extend_from_slice(bytes);
            if is_end {
                self.ends += 1;
            }
            if bytes.starts_with(b"boom") {
                state.fatal("boom");
                return Err(Error::Aborted);
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

    fn registry() -> Arc<Registry> {
        let mut registry = Registry::new();
        registry.register(ParserFactory::new::<Recording>("recording", "Recording"));
        registry.register(ParserFactory::new::<Recording>("based", "Based").needs_base_uri());
        Arc::new(registry)
    }

    fn base() -> Iri<String> {
        Iri::parse("http://example.org/doc".to_owned()).unwrap()
    }

    #[test]
    fn unknown_syntax_is_an_error() {
        assert!(matches!(
            Parser::new(&registry(), "nope"),
            Err(Error::UnknownSyntax(name)) if name == "nope"
        ));
    }

    #[test]
    fn chunks_reach_the_syntax() {
        let mut parser = Parser::new(&registry(), "recording").unwrap();
        parser.start_parse(None).unwrap();
        parser.parse_chunk(b"abc", false).unwrap();
        parser.parse_chunk(b"def", true).unwrap();

        let syntax = parser.syntax::<Recording>().unwrap();
        assert_eq!(syntax.started, 1);
        assert_eq!(syntax.input, b"abcdef");
        assert_eq!(syntax.ends, 1);
    }

    #[test]
    fn missing_base_uri_is_reported() {
        let errors = Rc::new(RefCell::new(Vec::new()));
        let mut parser = Parser::new(&registry(), "based").unwrap();
        parser.set_error_handler({
            let errors = Rc::clone(&errors);
            move |_, message| errors.borrow_mut().push(message.to_owned())
        });

        assert!(matches!(parser.start_parse(None), Err(Error::MissingBaseUri(_))));
        assert_eq!(*errors.borrow(), vec!["Missing base URI for based parser".to_owned()]);
        assert!(parser.start_parse(Some(base())).is_ok());
        assert_eq!(parser.locator().uri.as_deref(), Some("http://example.org/doc"));
    }

    #[test]
    fn fatal_errors_fail_the_parse() {
        let fatal = Rc::new(Cell::new(0));
        let mut parser = Parser::new(&registry(), "recording").unwrap();
        parser.set_fatal_error_handler({
            let fatal = Rc::clone(&fatal);
            move |_, _| fatal.set(fatal.get() + 1)
        });

        parser.start_parse(None).unwrap();
        assert!(parser.parse_chunk(b"boom", false).is_err());
        assert!(parser.failed());
        assert!(matches!(parser.parse_chunk(b"more", true), Err(Error::Aborted)));
        assert_eq!(fatal.get(), 1);

        // a new document starts afresh
        parser.start_parse(None).unwrap();
        assert!(!parser.failed());
    }

    #[test]
    fn abort_handle_stops_the_parse() {
        let mut parser = Parser::new(&registry(), "recording").unwrap();
        parser.start_parse(None).unwrap();
        let handle = parser.abort_handle();
        handle.abort();
        assert!(handle.is_aborted());
        assert!(matches!(parser.parse_chunk(b"x", true), Err(Error::Aborted)));
    }

    #[test]
    fn exec_keeps_callbacks() {
        let mut parser = Parser::new(&registry(), "recording").unwrap();
        parser.set_statement_handler(|_| {});
        parser.set_strict(true);
        parser.exec("based").unwrap();

        assert_eq!(parser.name(), "based");
        assert!(parser.handlers().statement.is_some());
        assert!(parser.feature(Feature::NonNfcFatal));
        assert!(parser.exec("nope").is_err());
        assert_eq!(parser.name(), "based");
    }

    #[test]
    fn generated_ids_count_from_base() {
        let mut parser = Parser::new(&registry(), "recording").unwrap();
        assert_eq!(parser.generate_id(GenIdKind::BnodeId, None), "genid1");
        assert_eq!(parser.generate_id(GenIdKind::BnodeId, None), "genid2");
        assert_eq!(parser.generate_id(GenIdKind::BnodeId, Some("mine")), "mine");

        parser.set_default_generate_id_parameters(Some("b"), 10);
        assert_eq!(parser.generate_id(GenIdKind::BagId, None), "b10");

        parser.set_default_generate_id_parameters(None, -5);
        assert_eq!(parser.generate_id(GenIdKind::BnodeId, None), "genid1");
    }

    #[test]
    fn generate_id_handler_overrides_the_default() {
        let mut parser = Parser::new(&registry(), "recording").unwrap();
        parser.set_generate_id_handler(|kind, _| format!("{kind:?}"));
        assert_eq!(parser.generate_id(GenIdKind::BagId, None), "BagId");
    }

    #[test]
    fn copied_user_state_shares_the_id_counter() {
        let registry = registry();
        let outer = Parser::new(&registry, "recording").unwrap();
        let mut inner = Parser::new(&registry, "recording").unwrap();
        inner.copy_user_state(outer.state());

        assert_eq!(outer.generate_id(GenIdKind::BnodeId, None), "genid1");
        assert_eq!(inner.generate_id(GenIdKind::BnodeId, None), "genid2");
    }

    #[test]
    fn feature_setters() {
        let mut parser = Parser::new(&registry(), "recording").unwrap();
        parser.set_feature_by_name("no-net", "1").unwrap();
        assert!(parser.feature(Feature::NoNet));
        assert!(parser.set_feature_by_name("bogus", "1").is_err());
        assert!(parser.set_feature(Feature::Scanning, -1).is_err());
    }

    #[test]
    fn parse_file_rejects_directories() {
        let mut parser = Parser::new(&registry(), "recording").unwrap();
        parser.set_error_handler(|_, _| {});
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            parser.parse_file(Some(dir.path()), None),
            Err(Error::IsDirectory(_))
        ));
    }

    #[test]
    fn parse_file_defaults_the_base_to_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[b'x'; 10_000]).unwrap();

        let mut parser = Parser::new(&registry(), "based").unwrap();
        parser.parse_file(Some(file.path()), None).unwrap();

        assert!(parser.base_uri().unwrap().as_str().starts_with("file:///"));
        let syntax = parser.syntax::<Recording>().unwrap();
        assert_eq!(syntax.input.len(), 10_000);
        assert_eq!(syntax.ends, 1);
    }
}
