//! Content negotiation: pick a writer from the request's `Accept` header.

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use tracing::debug;

use super::{csv, json, msgpack, CsvWriter, JsonWriter, MsgpackWriter, ResponseWriter};
use crate::model::Response;
use crate::sink::HttpResponse;
use crate::Result;

/// Wire format of a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    Csv,
    Msgpack,
    /// Used for `application/json` and for anything unrecognized
    #[default]
    Json,
}

impl Format {
    /// Map an `Accept` header value to a format.
    ///
    /// Matching is exact. Missing or unrecognized values fall back to JSON
    /// rather than failing the request.
    pub fn from_accept(accept: Option<&str>) -> Self {
        match accept {
            Some("application/csv" | "text/csv") => Format::Csv,
            Some("application/x-msgpack") => Format::Msgpack,
            Some("application/json") => Format::Json,
            _ => Format::Json,
        }
    }

    /// Value for the outbound `Content-Type` header.
    pub fn content_type(self) -> &'static str {
        match self {
            Format::Csv => csv::CONTENT_TYPE,
            Format::Msgpack => msgpack::CONTENT_TYPE,
            Format::Json => json::CONTENT_TYPE,
        }
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(Format::Csv),
            "msgpack" | "messagepack" => Ok(Format::Msgpack),
            "json" => Ok(Format::Json),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Format::Csv => "csv",
            Format::Msgpack => "msgpack",
            Format::Json => "json",
        })
    }
}

/// Outcome of content negotiation for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Negotiation {
    pub format: Format,
    /// Indent JSON output. Ignored by the other formats.
    pub pretty: bool,
}

impl Negotiation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Negotiate from an `Accept` header value and a raw query string.
    ///
    /// `pretty` is on only when the first `pretty` parameter is exactly
    /// `true`. A query string that does not parse counts as absent.
    pub fn from_request(accept: Option<&str>, query: Option<&str>) -> Self {
        Self {
            format: Format::from_accept(accept),
            pretty: query.is_some_and(pretty_param),
        }
    }

    /// Builder: set the format
    pub fn format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Builder: set pretty printing
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

fn pretty_param(query: &str) -> bool {
    let query = query.strip_prefix('?').unwrap_or(query);
    serde_urlencoded::from_str::<Vec<(String, String)>>(query)
        .ok()
        .and_then(|pairs| pairs.into_iter().find(|(k, _)| k == "pretty"))
        .is_some_and(|(_, v)| v == "true")
}

/// The writer chosen for a request.
#[derive(Debug)]
pub enum AnyWriter<W: Write> {
    Csv(CsvWriter<W>),
    Msgpack(MsgpackWriter<W>),
    Json(JsonWriter<W>),
}

impl<W: Write> AnyWriter<W> {
    pub fn format(&self) -> Format {
        match self {
            AnyWriter::Csv(_) => Format::Csv,
            AnyWriter::Msgpack(_) => Format::Msgpack,
            AnyWriter::Json(_) => Format::Json,
        }
    }

    /// Return the underlying response.
    pub fn into_inner(self) -> W {
        match self {
            AnyWriter::Csv(w) => w.into_inner(),
            AnyWriter::Msgpack(w) => w.into_inner(),
            AnyWriter::Json(w) => w.into_inner(),
        }
    }
}

impl<W: Write> ResponseWriter for AnyWriter<W> {
    fn write_response(&mut self, resp: &Response) -> Result<usize> {
        match self {
            AnyWriter::Csv(w) => w.write_response(resp),
            AnyWriter::Msgpack(w) => w.write_response(resp),
            AnyWriter::Json(w) => w.write_response(resp),
        }
    }

    fn flush(&mut self) -> Result<()> {
        match self {
            AnyWriter::Csv(w) => w.flush(),
            AnyWriter::Msgpack(w) => w.flush(),
            AnyWriter::Json(w) => w.flush(),
        }
    }

    fn content_type(&self) -> &'static str {
        self.format().content_type()
    }
}

/// Set the `Content-Type` header on `w` and wrap it in the negotiated writer.
pub fn new_response_writer<W: HttpResponse>(mut w: W, negotiation: &Negotiation) -> AnyWriter<W> {
    let format = negotiation.format;
    w.add_header("Content-Type", format.content_type());
    debug!(%format, pretty = negotiation.pretty, "negotiated response writer");

    match format {
        Format::Csv => AnyWriter::Csv(CsvWriter::new(w)),
        Format::Msgpack => AnyWriter::Msgpack(MsgpackWriter::new(w)),
        Format::Json => AnyWriter::Json(JsonWriter::new(w, negotiation.pretty)),
    }
}
