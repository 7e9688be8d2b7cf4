//! XML qualified names and the namespace declarations they resolve against.

use std::fmt;
use std::rc::Rc;

#[derive(derive_more::Error, derive_more::Display, Debug, PartialEq, Eq)]
pub enum QNameError {
    #[display("the namespace prefix in `{_0}` was not declared")]
    UndeclaredPrefix(#[error(not(source))] String),

    #[display("the namespace for `{_0}` has no URI")]
    NoNamespaceUri(#[error(not(source))] String),

    #[display("invalid namespace prefix `{_0}`")]
    InvalidPrefix(#[error(not(source))] String),
}

/// A single namespace declaration.
///
/// A missing prefix declares the default namespace; a missing URI
/// undeclares it (`xmlns=""`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Namespace {
    prefix: Option<String>,
    uri: Option<String>,
    depth: usize,
}

impl Namespace {
    pub fn new(prefix: Option<&str>, uri: Option<&str>, depth: usize) -> Result<Self, QNameError> {
        let prefix = prefix.filter(|p| !p.is_empty());
        if let Some(prefix) = prefix {
            rxml_validation::validate_ncname(prefix)
                .map_err(|_| QNameError::InvalidPrefix(prefix.to_owned()))?;
        }

        Ok(Namespace {
            prefix: prefix.map(str::to_owned),
            uri: uri.filter(|u| !u.is_empty()).map(str::to_owned),
            depth,
        })
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// Namespace declarations in scope, most recent last.
#[derive(Clone, Debug, Default)]
pub struct NamespaceStack {
    namespaces: Vec<Rc<Namespace>>,
}

impl NamespaceStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_namespace(
        &mut self,
        prefix: Option<&str>,
        uri: Option<&str>,
        depth: usize,
    ) -> Result<Rc<Namespace>, QNameError> {
        let namespace = Rc::new(Namespace::new(prefix, uri, depth)?);
        self.namespaces.push(Rc::clone(&namespace));
        Ok(namespace)
    }

    /// Drops every declaration made at `depth` or deeper.
    pub fn end_namespaces_for_depth(&mut self, depth: usize) {
        while self.namespaces.last().is_some_and(|ns| ns.depth >= depth) {
            self.namespaces.pop();
        }
    }

    pub fn find_namespace(&self, prefix: Option<&str>) -> Option<&Rc<Namespace>> {
        self.namespaces
            .iter()
            .rev()
            .find(|ns| ns.prefix.as_deref() == prefix)
    }

    pub fn default_namespace(&self) -> Option<&Rc<Namespace>> {
        self.find_namespace(None)
    }

    pub fn len(&self) -> usize {
        self.namespaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }
}

/// A resolved XML qualified name.
///
/// The expanded URI is present exactly when the namespace has a URI and
/// the local name is not empty.
#[derive(Clone, Debug)]
pub struct QName {
    local_name: String,
    value: Option<String>,
    namespace: Option<Rc<Namespace>>,
    uri: Option<String>,
}

impl QName {
    /// Parses `prefix:local` (or `local`) against the declarations in scope.
    ///
    /// Elements (no `value`) pick up the default namespace; attributes
    /// without a prefix have no namespace.
    pub fn new(stack: &NamespaceStack, name: &str, value: Option<&str>) -> Result<Self, QNameError> {
        let namespace = match name.split_once(':') {
            Some((prefix, local)) => {
                let namespace = stack
                    .find_namespace(Some(prefix).filter(|p| !p.is_empty()))
                    .ok_or_else(|| QNameError::UndeclaredPrefix(name.to_owned()))?;
                return Ok(Self::from_namespace_local_name(
                    Some(Rc::clone(namespace)),
                    local,
                    value,
                ));
            }
            None if value.is_none() => stack.default_namespace().cloned(),
            None => None,
        };

        Ok(Self::from_namespace_local_name(namespace, name, value))
    }

    pub fn from_namespace_local_name(
        namespace: Option<Rc<Namespace>>,
        local_name: &str,
        value: Option<&str>,
    ) -> Self {
        let uri = namespace
            .as_ref()
            .and_then(|ns| ns.uri())
            .filter(|_| !local_name.is_empty())
            .map(|ns_uri| format!("{ns_uri}{local_name}"));

        QName {
            local_name: local_name.to_owned(),
            value: value.map(str::to_owned),
            namespace,
            uri,
        }
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn namespace(&self) -> Option<&Rc<Namespace>> {
        self.namespace.as_ref()
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }
}

/// Same namespace declaration (by identity) and same local name.
impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        let same_namespace = match (&self.namespace, &other.namespace) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };

        same_namespace && self.local_name == other.local_name
    }
}

impl Eq for QName {}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = self.namespace.as_ref().and_then(|ns| ns.prefix()) {
            write!(f, "{prefix}:")?;
        }
        f.write_str(&self.local_name)
    }
}

/// Expands a prefixed name to a URI without building a [`QName`].
///
/// `None` or an empty name gives the default namespace URI; a name ending
/// in `:` gives the URI of that prefix's namespace.
pub fn qname_string_to_uri(stack: &NamespaceStack, name: Option<&str>) -> Result<String, QNameError> {
    let name = name.map(|n| n.strip_prefix(':').unwrap_or(n)).unwrap_or("");
    let described = || name.to_owned();

    let (namespace, local) = match name.split_once(':') {
        _ if name.is_empty() => (stack.default_namespace(), ""),
        Some((prefix, local)) => (stack.find_namespace(Some(prefix).filter(|p| !p.is_empty())), local),
        None => (stack.default_namespace(), name),
    };

    let namespace = namespace.ok_or_else(|| QNameError::UndeclaredPrefix(described()))?;
    let ns_uri = namespace
        .uri()
        .ok_or_else(|| QNameError::NoNamespaceUri(described()))?;

    Ok(format!("{ns_uri}{local}"))
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn stack() -> NamespaceStack {
        let mut stack = NamespaceStack::new();
        stack
            .start_namespace(None, Some("http://example.org/default#"), 0)
            .unwrap();
        stack
            .start_namespace(Some("ex"), Some("http://example.org/ns#"), 0)
            .unwrap();
        stack
    }

    #[test]
    fn prefixed_element_name() {
        let qname = QName::new(&stack(), "ex:thing", None).unwrap();
        assert_eq!(qname.local_name(), "thing");
        assert_eq!(qname.uri(), Some("http://example.org/ns#thing"));
        assert_eq!(qname.to_string(), "ex:thing");
    }

    #[test]
    fn unprefixed_element_uses_default_namespace() {
        let qname = QName::new(&stack(), "thing", None).unwrap();
        assert_eq!(qname.uri(), Some("http://example.org/default#thing"));
    }

    #[test]
    fn unprefixed_attribute_has_no_namespace() {
        let qname = QName::new(&stack(), "thing", Some("value")).unwrap();
        assert!(qname.namespace().is_none());
        assert_eq!(qname.uri(), None);
        assert_eq!(qname.value(), Some("value"));
    }

    #[test]
    fn undeclared_prefix_is_an_error() {
        assert_eq!(
            QName::new(&stack(), "nope:thing", None),
            Err(QNameError::UndeclaredPrefix("nope:thing".to_owned()))
        );
    }

    #[test]
    fn empty_local_name_has_no_uri() {
        let qname = QName::new(&stack(), "ex:", None).unwrap();
        assert_eq!(qname.uri(), None);
    }

    #[test]
    fn most_recent_declaration_wins() {
        let mut stack = stack();
        stack
            .start_namespace(Some("ex"), Some("http://example.org/inner#"), 1)
            .unwrap();
        assert_eq!(
            QName::new(&stack, "ex:a", None).unwrap().uri(),
            Some("http://example.org/inner#a")
        );

        stack.end_namespaces_for_depth(1);
        assert_eq!(
            QName::new(&stack, "ex:a", None).unwrap().uri(),
            Some("http://example.org/ns#a")
        );
    }

    #[test]
    fn equality_is_by_namespace_identity() {
        let stack = stack();
        let a = QName::new(&stack, "ex:a", None).unwrap();
        assert_eq!(a.clone(), a);

        // same URI, different declaration
        let other = Rc::new(Namespace::new(Some("ex"), Some("http://example.org/ns#"), 0).unwrap());
        let b = QName::from_namespace_local_name(Some(other), "a", None);
        assert_ne!(a, b);
    }

    #[test]
    fn invalid_prefix_is_rejected() {
        assert!(Namespace::new(Some("1x"), Some("http://example.org/"), 0).is_err());
    }

    #[rstest]
    #[case(None, "http://example.org/default#")]
    #[case(Some(""), "http://example.org/default#")]
    #[case(Some(":"), "http://example.org/default#")]
    #[case(Some("ex:"), "http://example.org/ns#")]
    #[case(Some("ex:a"), "http://example.org/ns#a")]
    #[case(Some(":a"), "http://example.org/default#a")]
    #[case(Some("a"), "http://example.org/default#a")]
    fn string_to_uri(#[case] name: Option<&str>, #[case] expected: &str) {
        assert_eq!(qname_string_to_uri(&stack(), name).unwrap(), expected);
    }

    #[test]
    fn string_to_uri_with_unknown_prefix() {
        assert!(qname_string_to_uri(&stack(), Some("nope:a")).is_err());
    }
}
