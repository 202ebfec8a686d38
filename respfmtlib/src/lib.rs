//! # respfmtlib
//!
//! Serialize query result sets for HTTP delivery, in the format the client
//! asked for.
//!
//! ## Overview
//!
//! A query layer produces a [`Response`]: statement results, each holding
//! named and tagged series of typed rows. This library turns that structure
//! into bytes. It does not run queries, route requests or own connections;
//! the surrounding HTTP layer hands over a response body and gets back a
//! byte count.
//!
//! - **JSON**: one document per call, optionally indented, newline framed
//! - **CSV**: statement-aware tables with a header row per statement
//! - **MessagePack**: compact binary with a nanosecond timestamp extension
//!
//! The format is picked from the `Accept` header; anything unrecognized gets
//! JSON.
//!
//! ## Example
//!
//! ```rust
//! use respfmtlib::{
//!     new_response_writer, BufferedResponse, Negotiation, Response, ResponseWriter, Series,
//!     StatementResult, Value,
//! };
//!
//! let resp = Response::new(vec![StatementResult::new(0).with_series(
//!     Series::new("cpu")
//!         .tag("host", "server01")
//!         .columns(["value"])
//!         .row(vec![Value::Float(0.5)]),
//! )]);
//!
//! let mut http = BufferedResponse::new();
//! let negotiation = Negotiation::from_request(Some("text/csv"), None);
//! let mut writer = new_response_writer(&mut http, &negotiation);
//! let n = writer.write_response(&resp).unwrap();
//! drop(writer);
//!
//! assert_eq!(http.header("Content-Type"), Some("text/csv"));
//! assert_eq!(http.body(), b"name,tags,value\ncpu,host=server01,0.5\n");
//! assert_eq!(n, http.body().len());
//! ```

pub mod error;
pub mod model;
pub mod sink;
pub mod writer;

pub use error::RespfmtError;
pub use model::{Response, Series, StatementResult, Tags, Timestamp, Value};
pub use sink::{BufferedResponse, CountingWriter, HttpResponse};
pub use writer::{
    new_response_writer, write_error, AnyWriter, CsvWriter, Format, JsonWriter, MsgpackWriter,
    Negotiation, ResponseWriter, TimeExt,
};

/// Result type for respfmtlib operations
pub type Result<T> = std::result::Result<T, RespfmtError>;
