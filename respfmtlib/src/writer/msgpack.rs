//! MessagePack writer.
//!
//! One call encodes one complete message with the same map keys as the JSON
//! shape. Timestamps do not use the MessagePack timestamp type: they are
//! written as extension type [`TimeExt::TYPE_ID`] whose payload is itself a
//! MessagePack-encoded i64 of nanoseconds since the Unix epoch.

use std::io::Write;

use rmp::encode;
use tracing::trace;

use super::ResponseWriter;
use crate::error::RespfmtError;
use crate::model::{Response, Series, StatementResult, Value};
use crate::sink::CountingWriter;
use crate::Result;

pub const CONTENT_TYPE: &str = "application/x-msgpack";

/// Timestamp extension encoder.
///
/// Owns a scratch buffer that is reused for every timestamp, so each writer
/// needs its own instance.
#[derive(Debug, Default)]
pub struct TimeExt {
    buf: Vec<u8>,
}

impl TimeExt {
    pub const TYPE_ID: i8 = 1;

    pub fn new() -> Self {
        Self::default()
    }

    /// Encode the extension payload for `value` into the scratch buffer.
    ///
    /// # Panics
    ///
    /// If `value` is not a timestamp. Routing any other value here is a bug in
    /// the caller, not bad data.
    pub fn encode(&mut self, value: &Value) -> &[u8] {
        let Value::Timestamp(ts) = value else {
            panic!(
                "unsupported format for time conversion: expecting timestamp, got {}",
                value.kind()
            );
        };
        self.buf.clear();
        // Vec<u8> writes never fail.
        let _ = encode::write_sint(&mut self.buf, ts.unix_nanos());
        &self.buf
    }

    /// Write `value` as a complete extension object.
    pub fn write_ext<W: Write>(&mut self, wr: &mut W, value: &Value) -> Result<()> {
        let data = self.encode(value);
        encode::write_ext_meta(wr, len_u32(data.len())?, Self::TYPE_ID)?;
        wr.write_all(data)?;
        Ok(())
    }
}

/// MessagePack writer.
///
/// Each message is encoded into a reusable buffer and handed to the stream
/// in one piece, then flushed. A call that fails leaves nothing behind for
/// the next one.
#[derive(Debug)]
pub struct MsgpackWriter<W> {
    inner: W,
    buf: Vec<u8>,
    time_ext: TimeExt,
}

impl<W: Write> MsgpackWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            time_ext: TimeExt::new(),
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> ResponseWriter for MsgpackWriter<W> {
    fn write_response(&mut self, resp: &Response) -> Result<usize> {
        self.buf.clear();
        encode_response(&mut self.buf, &mut self.time_ext, resp)?;

        let mut out = CountingWriter::new(&mut self.inner);
        // The message must reach the stream before control goes back to the
        // HTTP layer.
        let res = out.write_all(&self.buf).and_then(|()| out.flush());
        let n = out.count();
        res.map_err(|source| RespfmtError::Write { written: n, source })?;

        trace!(bytes = n, "wrote msgpack response");
        Ok(n)
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    fn content_type(&self) -> &'static str {
        CONTENT_TYPE
    }
}

fn len_u32(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| RespfmtError::Encode(format!("length {len} exceeds u32")))
}

fn encode_response<W: Write>(wr: &mut W, ext: &mut TimeExt, resp: &Response) -> Result<()> {
    let fields = usize::from(!resp.results.is_empty()) + usize::from(resp.err.is_some());
    encode::write_map_len(wr, len_u32(fields)?)?;

    if !resp.results.is_empty() {
        encode::write_str(wr, "results")?;
        encode::write_array_len(wr, len_u32(resp.results.len())?)?;
        for result in &resp.results {
            write_result(wr, ext, result)?;
        }
    }
    if let Some(err) = &resp.err {
        encode::write_str(wr, "error")?;
        encode::write_str(wr, err)?;
    }
    Ok(())
}

fn write_result<W: Write>(wr: &mut W, ext: &mut TimeExt, result: &StatementResult) -> Result<()> {
    let fields = 1 + usize::from(!result.series.is_empty()) + usize::from(result.err.is_some());
    encode::write_map_len(wr, len_u32(fields)?)?;

    encode::write_str(wr, "statement_id")?;
    encode::write_sint(wr, result.statement_id)?;
    if !result.series.is_empty() {
        encode::write_str(wr, "series")?;
        encode::write_array_len(wr, len_u32(result.series.len())?)?;
        for series in &result.series {
            write_series(wr, ext, series)?;
        }
    }
    if let Some(err) = &result.err {
        encode::write_str(wr, "error")?;
        encode::write_str(wr, err)?;
    }
    Ok(())
}

fn write_series<W: Write>(wr: &mut W, ext: &mut TimeExt, series: &Series) -> Result<()> {
    let fields = 2 + usize::from(!series.tags.is_empty()) + usize::from(!series.values.is_empty());
    encode::write_map_len(wr, len_u32(fields)?)?;

    encode::write_str(wr, "name")?;
    encode::write_str(wr, &series.name)?;
    if !series.tags.is_empty() {
        encode::write_str(wr, "tags")?;
        encode::write_map_len(wr, len_u32(series.tags.len())?)?;
        for (k, v) in series.tags.iter() {
            encode::write_str(wr, k)?;
            encode::write_str(wr, v)?;
        }
    }
    encode::write_str(wr, "columns")?;
    encode::write_array_len(wr, len_u32(series.columns.len())?)?;
    for column in &series.columns {
        encode::write_str(wr, column)?;
    }
    if !series.values.is_empty() {
        encode::write_str(wr, "values")?;
        encode::write_array_len(wr, len_u32(series.values.len())?)?;
        for row in &series.values {
            encode::write_array_len(wr, len_u32(row.len())?)?;
            for value in row {
                write_value(wr, ext, value)?;
            }
        }
    }
    Ok(())
}

fn write_value<W: Write>(wr: &mut W, ext: &mut TimeExt, value: &Value) -> Result<()> {
    match value {
        Value::Float(v) => encode::write_f64(wr, *v)?,
        Value::Integer(v) => {
            encode::write_sint(wr, *v)?;
        }
        Value::String(v) => encode::write_str(wr, v)?,
        Value::Boolean(v) => encode::write_bool(wr, *v)?,
        Value::Timestamp(_) => ext.write_ext(wr, value)?,
    }
    Ok(())
}
