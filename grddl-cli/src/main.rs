use std::cell::{Cell, RefCell};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use clap::Parser;
use grddl::xslt::Xsltproc;
use grddl::{Feature, GrddlParser, Level, Registry};
use log::{debug, info};
use oxiri::Iri;

#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// A URI, a file path, or `-` for standard input
    #[arg(value_name = "INPUT", required_unless_present = "list_syntaxes")]
    input: Option<String>,

    /// Base URI (defaults to the input's URI; required for standard input)
    #[arg(long, short)]
    base: Option<String>,

    /// Syntax to parse with, or `guess` to pick one from the input name
    #[arg(long, short, default_value = grddl::grddl::NAME)]
    syntax: String,

    /// Set a parser feature, e.g. `no-net=1`
    #[arg(long = "feature", short = 'f', value_name = "NAME=VALUE", value_parser = parse_feature)]
    features: Vec<(String, String)>,

    /// Use the strict feature preset
    #[arg(long)]
    strict: bool,

    /// Refuse to fetch anything that is not a `file:` URI
    #[arg(long)]
    no_net: bool,

    /// The `xsltproc` program to run stylesheets with
    #[arg(long, value_name = "PATH", default_value = "xsltproc")]
    xsltproc: PathBuf,

    /// Count triples instead of printing them
    #[arg(long, short)]
    count: bool,

    /// Do not print warnings
    #[arg(long, short)]
    quiet: bool,

    /// List the known syntaxes and exit
    #[arg(long)]
    list_syntaxes: bool,
}

fn parse_feature(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((name, value)) => Ok((name.to_owned(), value.to_owned())),
        None => Ok((value.to_owned(), "1".to_owned())),
    }
}

enum Input {
    Stdin,
    File(PathBuf),
    Uri(String),
}

impl Input {
    fn new(input: &str) -> Self {
        if input == "-" {
            return Input::Stdin;
        }

        // single-letter schemes are drive letters
        match url::Url::parse(input) {
            Ok(url) if url.scheme().len() > 1 => Input::Uri(input.to_owned()),
            _ => Input::File(PathBuf::from(input)),
        }
    }

    fn identifier(&self) -> Option<String> {
        match self {
            Input::Stdin => None,
            Input::File(path) => Some(path.display().to_string()),
            Input::Uri(uri) => Some(uri.clone()),
        }
    }
}

fn list_syntaxes(registry: &Registry) {
    for syntax in (0..).map_while(|index| registry.enumerate(index)) {
        println!(
            "{:<10} {}{}{}",
            syntax.name,
            syntax.label,
            syntax.mime_type.map(|m| format!(" ({m})")).unwrap_or_default(),
            syntax.uri.map(|u| format!(" <{u}>")).unwrap_or_default(),
        );
    }
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let registry = Registry::global();

    if args.list_syntaxes {
        list_syntaxes(&registry);
        return Ok(ExitCode::SUCCESS);
    }

    let input = Input::new(args.input.as_deref().ok_or("no input given")?);
    let base = args.base.map(Iri::parse).transpose()?;

    let syntax = if args.syntax == "guess" {
        let identifier = input.identifier();
        registry
            .guess(None, None, None, identifier.as_deref())
            .ok_or("could not guess a syntax for the input")?
            .to_owned()
    } else {
        args.syntax
    };
    debug!("parsing with {syntax}");

    let mut parser = grddl::Parser::new(&registry, &syntax)?;
    parser.set_strict(args.strict);
    for (name, value) in &args.features {
        parser.set_feature_by_name(name, value)?;
    }
    if args.no_net {
        parser.set_feature(Feature::NoNet, 1)?;
    }
    parser.set_xslt_processor(Rc::new(Xsltproc::with_program(args.xsltproc)));

    let triples = Rc::new(Cell::new(0usize));
    let errors = Rc::new(Cell::new(0usize));

    let writer = Rc::new(RefCell::new(
        oxttl::NTriplesSerializer::new().for_writer(std::io::stdout().lock()),
    ));

    parser.set_statement_handler({
        let triples = Rc::clone(&triples);
        let writer = Rc::clone(&writer);
        let count_only = args.count;
        move |triple| {
            triples.set(triples.get() + 1);
            if count_only {
                return;
            }
            if let Err(error) = writer.borrow_mut().serialize_triple(triple) {
                log::error!("cannot write {triple}: {error}");
            }
        }
    });

    let report = |level: Level, quiet: bool| {
        let errors = Rc::clone(&errors);
        move |locator: &grddl::Locator, message: &str| {
            if level != Level::Warning {
                errors.set(errors.get() + 1);
            } else if quiet {
                return;
            }
            eprintln!("grddl: {level} - {locator} - {message}");
        }
    };
    parser.set_fatal_error_handler(report(Level::Fatal, args.quiet));
    parser.set_error_handler(report(Level::Error, args.quiet));
    parser.set_warning_handler(report(Level::Warning, args.quiet));

    let result = match &input {
        Input::Stdin => parser.parse_file(None, base),
        Input::File(path) => parser.parse_file(Some(path), base),
        Input::Uri(uri) => parser.parse_uri(uri, base),
    };

    if let Some(engine) = parser.syntax::<GrddlParser>() {
        for uri in engine.visited_uris() {
            info!("visited {uri}");
        }
        for uri in engine.applied_transforms() {
            info!("applied {uri}");
        }
    }

    drop(parser);
    if let Ok(writer) = Rc::try_unwrap(writer) {
        writer.into_inner().finish().flush()?;
    }

    if let Err(error) = &result {
        eprintln!("grddl: {error}");
    }

    if args.count || !args.quiet {
        eprintln!("grddl: Parsing returned {} triples", triples.get());
    }

    if result.is_err() || errors.get() > 0 {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
