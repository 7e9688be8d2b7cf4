//! The set of syntaxes parsers can be built for.

use std::sync::{Arc, OnceLock};

use itertools::Itertools;
use log::debug;

use crate::parser::SyntaxParser;

/// What a syntax can look at when scoring how likely it is to apply.
#[derive(Clone, Copy, Debug, Default)]
pub struct SniffInput<'a> {
    /// The first bytes of the content.
    pub buffer: Option<&'a [u8]>,
    /// A file name or URI.
    pub identifier: Option<&'a str>,
    /// Lowercased text after the last `.` in the identifier.
    pub suffix: Option<&'a str>,
    pub mime_type: Option<&'a str>,
}

pub type SyntaxConstructor = fn() -> Box<dyn SyntaxParser>;
pub type SyntaxRecogniser = fn(&SniffInput<'_>) -> i32;

/// A MIME type a syntax reads, with a quality between 0 and 10.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MimeType {
    pub mime_type: String,
    pub q: u8,
}

#[derive(Clone, Debug)]
pub struct ParserFactory {
    name: String,
    label: String,
    alias: Option<String>,
    mime_types: Vec<MimeType>,
    uri: Option<String>,
    need_base_uri: bool,
    constructor: SyntaxConstructor,
    recogniser: Option<SyntaxRecogniser>,
}

fn construct<T: SyntaxParser + Default>() -> Box<dyn SyntaxParser> {
    Box::new(T::default())
}

impl ParserFactory {
    pub fn new<T: SyntaxParser + Default>(name: &str, label: &str) -> Self {
        Self::with_constructor(name, label, construct::<T>)
    }

    pub fn with_constructor(name: &str, label: &str, constructor: SyntaxConstructor) -> Self {
        ParserFactory {
            name: name.to_owned(),
            label: label.to_owned(),
            alias: None,
            mime_types: Vec::new(),
            uri: None,
            need_base_uri: false,
            constructor,
            recogniser: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: &str, q: u8) -> Self {
        self.mime_types.push(MimeType {
            mime_type: mime_type.to_owned(),
            q: q.min(10),
        });
        self
    }

    pub fn with_uri(mut self, uri: &str) -> Self {
        self.uri = Some(uri.to_owned());
        self
    }

    pub fn with_recogniser(mut self, recogniser: SyntaxRecogniser) -> Self {
        self.recogniser = Some(recogniser);
        self
    }

    pub fn needs_base_uri(mut self) -> Self {
        self.need_base_uri = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// The primary MIME type.
    pub fn mime_type(&self) -> Option<&str> {
        self.mime_types.first().map(|m| m.mime_type.as_str())
    }

    pub fn mime_types(&self) -> &[MimeType] {
        &self.mime_types
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn need_base_uri(&self) -> bool {
        self.need_base_uri
    }

    /// Whether `name` is this syntax's name or alias.
    pub fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.alias.as_deref() == Some(name)
    }

    /// Scores the input; syntaxes without a recogniser never match.
    pub fn recognise_syntax(&self, input: &SniffInput<'_>) -> i32 {
        self.recogniser.map_or(-1, |recognise| recognise(input))
    }

    pub(crate) fn instantiate(&self) -> Box<dyn SyntaxParser> {
        (self.constructor)()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyntaxDescription<'a> {
    pub name: &'a str,
    pub label: &'a str,
    pub mime_type: Option<&'a str>,
    pub uri: Option<&'a str>,
}

/// Registered syntaxes, in registration order.
#[derive(Default)]
pub struct Registry {
    factories: Vec<Arc<ParserFactory>>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding `rdfxml` (alias `raptor`), `ntriples`, `turtle`
    /// and `grddl`.
    pub fn with_builtin_syntaxes() -> Self {
        let mut registry = Registry::new();
        crate::syntaxes::register(&mut registry);
        crate::grddl::register(&mut registry);
        registry
    }

    /// The process-wide registry of built-in syntaxes.
    pub fn global() -> Arc<Registry> {
        static GLOBAL: OnceLock<Arc<Registry>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Registry::with_builtin_syntaxes())))
    }

    /// Adds a syntax.
    ///
    /// # Panics
    ///
    /// If the name is already taken by another syntax's name or alias.
    pub fn register(&mut self, factory: ParserFactory) {
        if self.find(factory.name()).is_some() {
            panic!("duplicate parser name `{}`", factory.name());
        }
        debug!("registering syntax {}", factory.name());
        self.factories.push(Arc::new(factory));
    }

    /// # Panics
    ///
    /// If `name` is not registered, or `alias` is already taken.
    pub fn add_alias(&mut self, name: &str, alias: &str) {
        if self.find(alias).is_some() {
            panic!("duplicate parser alias `{alias}`");
        }

        match self.factories.iter_mut().find(|f| f.name == name) {
            Some(factory) => Arc::make_mut(factory).alias = Some(alias.to_owned()),
            None => panic!("cannot alias unknown parser `{name}`"),
        }
    }

    /// Looks a syntax up by name or alias.
    pub fn find(&self, name: &str) -> Option<&Arc<ParserFactory>> {
        self.factories.iter().find(|factory| factory.answers_to(name))
    }

    pub fn syntax_name_check(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn enumerate(&self, index: usize) -> Option<SyntaxDescription<'_>> {
        self.factories.get(index).map(|factory| SyntaxDescription {
            name: &factory.name,
            label: &factory.label,
            mime_type: factory.mime_type(),
            uri: factory.uri(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ParserFactory>> {
        self.factories.iter()
    }

    /// Picks the syntax most likely to read some content.
    ///
    /// A MIME type or syntax URI that a syntax declares wins outright.
    /// Otherwise every syntax scores the sniffed input (capped at 10) and
    /// the best non-negative score wins, earlier registrations breaking
    /// ties.
    pub fn guess(
        &self,
        uri: Option<&str>,
        mime_type: Option<&str>,
        buffer: Option<&[u8]>,
        identifier: Option<&str>,
    ) -> Option<&str> {
        let suffix = identifier
            .and_then(|id| id.rsplit_once('.'))
            .map(|(_, suffix)| suffix.to_ascii_lowercase());

        let input = SniffInput {
            buffer,
            identifier,
            suffix: suffix.as_deref(),
            mime_type,
        };

        let mut scores = Vec::with_capacity(self.factories.len());
        for factory in &self.factories {
            let mime_matches = mime_type.is_some_and(|mime| {
                factory.mime_types.iter().any(|m| m.mime_type == mime)
            });
            if mime_matches || (uri.is_some() && factory.uri() == uri) {
                debug!("guessed {} from an exact match", factory.name);
                return Some(&factory.name);
            }

            scores.push((factory.recognise_syntax(&input).min(10), factory));
        }

        scores.sort_by(|(a, _), (b, _)| b.cmp(a));
        for (score, factory) in &scores {
            debug!("score {score:2} for {}", factory.name);
        }

        match scores.first() {
            Some(&(score, factory)) if score >= 0 => Some(factory.name.as_str()),
            _ => None,
        }
    }

    /// An HTTP `Accept` value listing the syntax's MIME types, followed by
    /// a low-priority wildcard.
    pub fn accept_header(&self, name: &str) -> Option<String> {
        let factory = self.find(name)?;

        let mut accept = factory
            .mime_types
            .iter()
            .map(|m| match m.q {
                10 => m.mime_type.clone(),
                q => format!("{};q=0.{q}", m.mime_type),
            })
            .join(", ");

        if !accept.is_empty() {
            accept.push_str(", ");
        }
        accept.push_str("*/*;q=0.1");
        Some(accept)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::Error;
    use crate::parser::ParserState;

    #[derive(Default)]
    struct Inert;

    impl SyntaxParser for Inert {
        fn chunk(&mut self, _state: &mut ParserState, _bytes: &[u8], _is_end: bool) -> Result<(), Error> {
            Ok(())
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }

    fn always(_: &SniffInput<'_>) -> i32 {
        3
    }

    fn by_suffix(input: &SniffInput<'_>) -> i32 {
        match input.suffix {
            Some("abc") => 20,
            _ => 0,
        }
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.register(
            ParserFactory::new::<Inert>("first", "First")
                .with_mime_type("text/first", 10)
                .with_mime_type("application/first", 5)
                .with_uri("http://example.org/first")
                .with_recogniser(always),
        );
        registry.register(
            ParserFactory::new::<Inert>("second", "Second")
                .with_mime_type("text/second", 10)
                .with_recogniser(by_suffix),
        );
        registry.register(ParserFactory::new::<Inert>("third", "Third"));
        registry.add_alias("first", "uno");
        registry
    }

    #[test]
    fn find_by_name_or_alias() {
        let registry = registry();
        assert_eq!(registry.find("uno").unwrap().name(), "first");
        assert!(registry.syntax_name_check("third"));
        assert!(!registry.syntax_name_check("fourth"));
    }

    #[test]
    #[should_panic(expected = "duplicate parser name")]
    fn duplicate_names_panic() {
        let mut registry = registry();
        registry.register(ParserFactory::new::<Inert>("second", "Again"));
    }

    #[test]
    #[should_panic(expected = "duplicate parser name")]
    fn names_clash_with_aliases() {
        let mut registry = registry();
        registry.register(ParserFactory::new::<Inert>("uno", "Again"));
    }

    #[test]
    #[should_panic(expected = "duplicate parser alias")]
    fn duplicate_aliases_panic() {
        let mut registry = registry();
        registry.add_alias("second", "first");
    }

    #[test]
    fn enumerate_in_registration_order() {
        let registry = registry();
        assert_eq!(
            registry.enumerate(0),
            Some(SyntaxDescription {
                name: "first",
                label: "First",
                mime_type: Some("text/first"),
                uri: Some("http://example.org/first"),
            })
        );
        assert_eq!(registry.enumerate(2).map(|d| d.name), Some("third"));
        assert_eq!(registry.enumerate(3), None);
    }

    #[rstest]
    #[case(None, Some("application/first"), None, Some("first"))]
    #[case(None, Some("text/second"), Some("x.abc"), Some("second"))]
    #[case(Some("http://example.org/first"), None, Some("x.abc"), Some("first"))]
    #[case(None, None, Some("x.ABC"), Some("second"))]
    #[case(None, None, Some("x.def"), Some("first"))]
    #[case(None, Some("text/unknown"), None, Some("first"))]
    fn guessing(
        #[case] uri: Option<&str>,
        #[case] mime: Option<&str>,
        #[case] identifier: Option<&str>,
        #[case] expected: Option<&str>,
    ) {
        assert_eq!(registry().guess(uri, mime, None, identifier), expected);
    }

    #[test]
    fn scores_are_capped_so_ties_go_to_earlier_syntaxes() {
        let mut registry = Registry::new();
        registry.register(ParserFactory::new::<Inert>("ten", "Ten").with_recogniser(|_| 10));
        registry.register(ParserFactory::new::<Inert>("twenty", "Twenty").with_recogniser(|_| 20));
        assert_eq!(registry.guess(None, None, None, None), Some("ten"));
    }

    #[test]
    fn no_guess_without_a_non_negative_score() {
        let mut registry = Registry::new();
        registry.register(ParserFactory::new::<Inert>("never", "Never"));
        assert_eq!(registry.guess(None, None, None, Some("x.y")), None);
    }

    #[test]
    fn accept_header() {
        let registry = registry();
        assert_eq!(
            registry.accept_header("first").unwrap(),
            "text/first, application/first;q=0.5, */*;q=0.1"
        );
        assert_eq!(registry.accept_header("third").unwrap(), "*/*;q=0.1");
        assert_eq!(registry.accept_header("fourth"), None);
    }
}
