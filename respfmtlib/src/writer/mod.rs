//! Response writers: serialize a [`Response`] into one wire format.
//!
//! Each request gets its own writer, chosen by [`new_response_writer`] from
//! the negotiated content type:
//!
//! | Accept                              | Writer           | Content-Type            |
//! |-------------------------------------|------------------|-------------------------|
//! | `application/csv`, `text/csv`       | [`CsvWriter`]    | `text/csv`              |
//! | `application/x-msgpack`             | [`MsgpackWriter`]| `application/x-msgpack` |
//! | `application/json`, anything else   | [`JsonWriter`]   | `application/json`      |
//!
//! `write_response` may be called once per partial result when streaming.
//! Writers are single-owner and not meant to be shared between threads.

use std::fmt;
use std::io::Write;

use crate::error::RespfmtError;
use crate::model::Response;
use crate::sink::CountingWriter;
use crate::Result;

pub mod csv;
pub mod dispatch;
pub mod json;
pub mod msgpack;

pub use self::csv::CsvWriter;
pub use dispatch::{new_response_writer, AnyWriter, Format, Negotiation};
pub use json::JsonWriter;
pub use msgpack::{MsgpackWriter, TimeExt};

/// A writer bound to one response body.
pub trait ResponseWriter {
    /// Serialize `resp` and return the number of bytes written for this call.
    fn write_response(&mut self, resp: &Response) -> Result<usize>;

    /// Push any buffered bytes through to the underlying stream.
    fn flush(&mut self) -> Result<()>;

    /// MIME type of the bytes this writer produces.
    fn content_type(&self) -> &'static str;
}

/// Write a response that carries only `err`.
pub fn write_error<R>(w: &mut R, err: impl fmt::Display) -> Result<usize>
where
    R: ResponseWriter + ?Sized,
{
    w.write_response(&Response::from_error(err.to_string()))
}

/// Write all of `buf`, keeping the accepted byte count on failure.
pub(crate) fn write_counted<W: Write>(inner: &mut W, buf: &[u8]) -> Result<usize> {
    let mut out = CountingWriter::new(inner);
    match out.write_all(buf) {
        Ok(()) => Ok(out.count()),
        Err(source) => Err(RespfmtError::Write {
            written: out.count(),
            source,
        }),
    }
}
