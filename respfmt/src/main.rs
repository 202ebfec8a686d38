//! # respfmt
//!
//! Render a query result set the way an HTTP endpoint would serve it.
//!
//! ## Overview
//!
//! respfmt reads a result set as JSON (the same shape the JSON writer
//! produces), negotiates an output format from an `Accept` value and a query
//! string, and writes the body to stdout. It is a thin front end over
//! respfmtlib, handy for checking what a client will receive.
//!
//! ## Usage
//!
//! ```bash
//! # JSON (the default)
//! respfmt results.json
//!
//! # CSV, negotiated like an HTTP request
//! respfmt results.json --accept text/csv
//!
//! # Indented JSON via the query string
//! respfmt results.json --query "db=telegraf&pretty=true"
//!
//! # MessagePack from stdin, one write per statement, headers on stderr
//! cat results.json | respfmt - --format msgpack --chunked --headers > out.mpk
//! ```

use std::io::{self, Write};
use std::process::ExitCode;

use clap::{Arg, ArgAction, ArgMatches, Command};
use console::style;
use respfmtlib::{Format, Negotiation};
use tracing_subscriber::EnvFilter;

mod render;

/// Environment variable holding a tracing filter directive
const LOG_ENV: &str = "RESPFMT_LOG";

/// Build the clap Command structure
fn build_command() -> Command {
    Command::new("respfmt")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Arthur Debert")
        .about("Render query result sets as JSON, CSV or MessagePack")
        .arg(
            Arg::new("input")
                .help("Result set as JSON (defaults to stdin)")
                .default_value("-"),
        )
        .arg(
            Arg::new("accept")
                .short('a')
                .long("accept")
                .help("Accept header value used for negotiation"),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_parser(["json", "csv", "msgpack"])
                .conflicts_with("accept")
                .help("Pick the output format directly instead of negotiating"),
        )
        .arg(
            Arg::new("query")
                .short('q')
                .long("query")
                .help("Request query string (e.g. \"pretty=true\")"),
        )
        .arg(
            Arg::new("pretty")
                .short('p')
                .long("pretty")
                .action(ArgAction::SetTrue)
                .help("Indent JSON output (same as pretty=true in the query)"),
        )
        .arg(
            Arg::new("time-column")
                .long("time-column")
                .default_value("time")
                .help("Column whose RFC 3339 strings are read as timestamps"),
        )
        .arg(
            Arg::new("chunked")
                .long("chunked")
                .action(ArgAction::SetTrue)
                .help("Write each statement result with its own call"),
        )
        .arg(
            Arg::new("headers")
                .long("headers")
                .action(ArgAction::SetTrue)
                .help("Print response headers and byte counts to stderr"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Increase log verbosity (-v debug, -vv trace)"),
        )
}

/// Install the stderr subscriber; `RESPFMT_LOG` wins over `-v`
fn init_logging(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Build the negotiation from matches
fn extract_negotiation(matches: &ArgMatches) -> anyhow::Result<Negotiation> {
    let query = matches.get_one::<String>("query").map(String::as_str);
    let accept = matches.get_one::<String>("accept").map(String::as_str);

    let mut negotiation = Negotiation::from_request(accept, query);
    if let Some(format) = matches.get_one::<String>("format") {
        negotiation = negotiation.format(format.parse::<Format>().map_err(anyhow::Error::msg)?);
    }
    if matches.get_flag("pretty") {
        negotiation = negotiation.pretty(true);
    }
    Ok(negotiation)
}

fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    let input = matches
        .get_one::<String>("input")
        .map(|s| s.as_str())
        .unwrap_or("-");
    let time_column = matches
        .get_one::<String>("time-column")
        .map(|s| s.as_str())
        .unwrap_or("time");

    let negotiation = extract_negotiation(matches)?;
    let resp = render::load_response(input, time_column)?;
    let rendered = render::render(&resp, &negotiation, matches.get_flag("chunked"))?;

    if matches.get_flag("headers") {
        eprint!("{}", render::format_headers(&rendered));
    }

    let mut stdout = io::stdout().lock();
    stdout.write_all(&rendered.body)?;
    stdout.flush()?;
    Ok(())
}

fn main() -> ExitCode {
    let matches = build_command().get_matches();
    init_logging(matches.get_count("verbose"));

    match run(&matches) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {:#}", style("error:").for_stderr().red().bold(), err);
            ExitCode::FAILURE
        }
    }
}
