//! Gleaning RDF from XML and XHTML documents with GRDDL, on top of a small
//! registry of RDF parsers.
//!
//! ```no_run
//! use grddl::{Parser, Registry};
//!
//! let mut parser = Parser::new(&Registry::global(), "grddl")?;
//! parser.set_xslt_processor(std::rc::Rc::new(grddl::xslt::Xsltproc::new()));
//! parser.set_statement_handler(|triple| println!("{triple} ."));
//! parser.parse_uri("http://www.w3.org/2003/g/data-view", None)?;
//! # Ok::<(), grddl::Error>(())
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use oxiri::Iri;
use oxrdf::Graph;

mod error;
pub mod features;
pub mod grddl;
pub mod name_check;
pub mod parser;
pub mod qname;
pub mod registry;
pub mod syntaxes;
pub mod www;
pub mod xslt;

pub use error::{Error, Level, Locator};
pub use features::{Feature, Features};
pub use grddl::{GrddlParser, Stage};
pub use name_check::{NameCheck, NameCheckError, prefixed_name_check};
pub use parser::{GenIdKind, Handlers, Parser, ParserState, SyntaxParser};
pub use qname::{Namespace, NamespaceStack, QName, QNameError};
pub use registry::{ParserFactory, Registry};

pub use oxrdf;

/// Runs GRDDL over an in-memory document, adding what it gleans to
/// `output_graph`. Diagnostics go to the log; the first failure is
/// returned.
pub fn glean(
    document: &[u8],
    base: Iri<String>,
    xslt: Rc<dyn xslt::XsltProcessor>,
    output_graph: &mut Graph,
) -> Result<(), Error> {
    let graph = Rc::new(RefCell::new(Graph::new()));

    let mut parser = Parser::new(&Registry::global(), grddl::NAME)?;
    parser.set_xslt_processor(xslt);
    parser.set_statement_handler({
        let graph = Rc::clone(&graph);
        move |triple| {
            graph.borrow_mut().insert(triple);
        }
    });
    parser.set_fatal_error_handler(|locator, message| log::error!("{locator}: {message}"));
    parser.set_error_handler(|locator, message| log::error!("{locator}: {message}"));
    parser.set_warning_handler(|locator, message| log::warn!("{locator}: {message}"));

    parser.start_parse(Some(base))?;
    let result = parser.parse_chunk(document, true);

    output_graph.extend(graph.take().iter());
    result
}
