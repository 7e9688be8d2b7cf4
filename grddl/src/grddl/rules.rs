//! The document paths that point at GRDDL transformations and profiles.
//!
//! Each rule is written as the XPath expression it implements; evaluation
//! walks the `roxmltree` tree directly.

use oxiri::Iri;
use roxmltree::{Document, Node};

use super::vocab;
use crate::qname::{NamespaceStack, QName, QNameError};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(super) struct MatchFlags {
    /// The matched value is a space-separated list of URIs.
    pub value_list: bool,
    /// The matched value is a `head/@profile` list, which may mention the
    /// data-view profile itself.
    pub profile: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Selector {
    /// `@profile` of every `html:head` under the `html:html` root.
    HeadProfile,
    /// `html:link[@rel=REL]/@href` under a data-view `html:head`.
    HeadLink { rel: &'static str },
    /// Every `html:a[@rel=REL]/@href` in a document with a data-view
    /// `html:head`.
    Anchor { rel: &'static str },
    /// The named attribute on any element.
    Attribute { name: &'static str },
}

#[derive(Clone, Copy, Debug)]
pub(super) struct MatchRule {
    pub xpath: &'static str,
    pub selector: Selector,
    pub flags: MatchFlags,
    /// Applied instead of the matched value whenever the rule matches.
    pub xslt_uri: Option<&'static str>,
}

pub(super) const HEAD_PROFILE: MatchRule = MatchRule {
    xpath: "/html:html/html:head/@profile",
    selector: Selector::HeadProfile,
    flags: MatchFlags {
        value_list: true,
        profile: true,
    },
    xslt_uri: None,
};

pub(super) const MATCH_TABLE: [MatchRule; 3] = [
    MatchRule {
        xpath: "/html:html/html:head[contains(@profile,\"http://www.w3.org/2003/g/data-view\")]/html:link[@rel=\"transformation\"]/@href",
        selector: Selector::HeadLink {
            rel: "transformation",
        },
        flags: MatchFlags {
            value_list: false,
            profile: false,
        },
        xslt_uri: None,
    },
    MatchRule {
        xpath: "/html:html/html:head[contains(@profile,\"http://www.w3.org/2003/g/data-view\")]/../..//html:a[@rel=\"transformation\"]/@href",
        selector: Selector::Anchor {
            rel: "transformation",
        },
        flags: MatchFlags {
            value_list: false,
            profile: false,
        },
        xslt_uri: None,
    },
    MatchRule {
        xpath: "//@dataview:transformation",
        selector: Selector::Attribute {
            name: "dataview:transformation",
        },
        flags: MatchFlags {
            value_list: true,
            profile: false,
        },
        xslt_uri: None,
    },
];

/// A selected attribute value and the element carrying it.
#[derive(Clone, Copy, Debug)]
pub(super) struct Match<'a, 'input> {
    pub element: Node<'a, 'input>,
    pub value: &'a str,
}

/// An expanded name to test nodes against.
#[derive(Clone, Debug, PartialEq, Eq)]
struct NameTest {
    namespace: Option<String>,
    local_name: String,
}

impl NameTest {
    fn from_qname(qname: &QName) -> Self {
        NameTest {
            namespace: qname
                .namespace()
                .and_then(|ns| ns.uri())
                .map(str::to_owned),
            local_name: qname.local_name().to_owned(),
        }
    }

    fn is_element(&self, node: &Node<'_, '_>) -> bool {
        node.is_element()
            && node.tag_name().namespace() == self.namespace.as_deref()
            && node.tag_name().name() == self.local_name
    }

    fn attribute<'a>(&self, node: &Node<'a, '_>) -> Option<&'a str> {
        node.attributes()
            .find(|a| a.namespace() == self.namespace.as_deref() && a.name() == self.local_name)
            .map(|a| a.value())
    }
}

/// The prefix bindings XPath expressions are evaluated with.
pub(super) struct XPathContext {
    namespaces: NamespaceStack,
}

impl XPathContext {
    pub fn new() -> Result<Self, QNameError> {
        let mut namespaces = NamespaceStack::new();
        namespaces.start_namespace(Some("html"), Some(vocab::XHTML_NS), 0)?;
        namespaces.start_namespace(Some("dataview"), Some(vocab::DATA_VIEW_NS), 0)?;
        Ok(XPathContext { namespaces })
    }

    fn element(&self, name: &str) -> Result<NameTest, QNameError> {
        QName::new(&self.namespaces, name, None).map(|q| NameTest::from_qname(&q))
    }

    fn attribute(&self, name: &str) -> Result<NameTest, QNameError> {
        QName::new(&self.namespaces, name, Some("")).map(|q| NameTest::from_qname(&q))
    }

    /// Evaluates a selector, yielding matches in document order.
    pub fn select<'a, 'input>(
        &self,
        document: &'a Document<'input>,
        selector: Selector,
    ) -> Result<Vec<Match<'a, 'input>>, QNameError> {
        let html = self.element("html:html")?;
        let head = self.element("html:head")?;
        let profile = self.attribute("profile")?;

        let (html, head, profile) = (&html, &head, &profile);

        let heads = move || {
            let root = document.root_element();
            html.is_element(&root)
                .then(|| root.children().filter(move |n| head.is_element(n)))
                .into_iter()
                .flatten()
        };
        let has_data_view_head = move || {
            heads().any(|h| {
                profile
                    .attribute(&h)
                    .is_some_and(|p| p.contains(vocab::DATA_VIEW_PROFILE))
            })
        };

        let items = match selector {
            Selector::HeadProfile => heads()
                .filter_map(|element| {
                    profile
                        .attribute(&element)
                        .map(|value| Match { element, value })
                })
                .collect(),

            Selector::HeadLink { rel } => {
                let link = self.element("html:link")?;
                heads()
                    .filter(|h| {
                        profile
                            .attribute(h)
                            .is_some_and(|p| p.contains(vocab::DATA_VIEW_PROFILE))
                    })
                    .flat_map(|h| h.children())
                    .filter(|n| link.is_element(n) && n.attribute("rel") == Some(rel))
                    .filter_map(|element| {
                        element
                            .attribute("href")
                            .map(|value| Match { element, value })
                    })
                    .collect()
            }

            Selector::Anchor { rel } => {
                let anchor = self.element("html:a")?;
                if has_data_view_head() {
                    document
                        .descendants()
                        .filter(|n| anchor.is_element(n) && n.attribute("rel") == Some(rel))
                        .filter_map(|element| {
                            element
                                .attribute("href")
                                .map(|value| Match { element, value })
                        })
                        .collect()
                } else {
                    Vec::new()
                }
            }

            Selector::Attribute { name } => {
                let attribute = self.attribute(name)?;
                document
                    .descendants()
                    .filter(|n| n.is_element())
                    .filter_map(|element| {
                        attribute
                            .attribute(&element)
                            .map(|value| Match { element, value })
                    })
                    .collect()
            }
        };

        Ok(items)
    }
}

/// The base URI in effect at `node`: the document base with every
/// `xml:base` from the root down applied in turn.
pub(super) fn xml_base(node: Node<'_, '_>, document_base: &Iri<String>) -> Iri<String> {
    let mut bases: Vec<&str> = node
        .ancestors()
        .filter_map(|n| n.attribute((vocab::XML_NS, "base")))
        .collect();
    bases.reverse();

    bases
        .into_iter()
        .fold(document_base.clone(), |base, value| base.resolve(value).unwrap_or(base))
}
