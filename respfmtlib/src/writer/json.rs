//! JSON writer.
//!
//! Every call emits one complete document followed by `\n`, so a streamed
//! response reads as JSON Lines.

use std::io::Write;

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use tracing::{trace, warn};

use super::{write_counted, ResponseWriter};
use crate::error::RespfmtError;
use crate::model::Response;
use crate::Result;

pub const CONTENT_TYPE: &str = "application/json";

/// Stateless JSON writer, compact or four-space indented.
#[derive(Debug)]
pub struct JsonWriter<W> {
    inner: W,
    pretty: bool,
}

impl<W: Write> JsonWriter<W> {
    pub fn new(inner: W, pretty: bool) -> Self {
        Self { inner, pretty }
    }

    pub fn is_pretty(&self) -> bool {
        self.pretty
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    fn marshal(&self, resp: &Response) -> serde_json::Result<Vec<u8>> {
        if !self.pretty {
            return serde_json::to_vec(resp);
        }
        let mut buf = Vec::new();
        let mut ser =
            serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
        resp.serialize(&mut ser)?;
        Ok(buf)
    }
}

impl<W: Write> ResponseWriter for JsonWriter<W> {
    /// On a marshal failure the error text becomes the body and
    /// [`RespfmtError::Marshal`] is returned; a failed write wins over both.
    fn write_response(&mut self, resp: &Response) -> Result<usize> {
        match self.marshal(resp) {
            Ok(mut body) => {
                body.push(b'\n');
                let n = write_counted(&mut self.inner, &body)?;
                trace!(bytes = n, "wrote json response");
                Ok(n)
            }
            Err(source) => {
                warn!(error = %source, "json marshal failed, writing error text as body");
                let written = write_counted(&mut self.inner, format!("{source}\n").as_bytes())?;
                Err(RespfmtError::Marshal { written, source })
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    fn content_type(&self) -> &'static str {
        CONTENT_TYPE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Series, StatementResult, Timestamp, Value};
    use crate::sink::testing::{FailingSink, RecordingSink};

    fn sample() -> Response {
        Response::new(vec![StatementResult::new(0).with_series(
            Series::new("cpu")
                .tag("host", "server01")
                .columns(["time", "value"])
                .row(vec![Timestamp::from_unix_nanos(0).into(), Value::Float(1.5)]),
        )])
    }

    #[test]
    fn test_compact_output() {
        let mut w = JsonWriter::new(Vec::new(), false);
        let n = w.write_response(&sample()).unwrap();

        let out = w.into_inner();
        assert_eq!(
            String::from_utf8(out.clone()).unwrap(),
            concat!(
                r#"{"results":[{"statement_id":0,"series":[{"name":"cpu","tags":{"host":"server01"},"#,
                r#""columns":["time","value"],"values":[["1970-01-01T00:00:00Z",1.5]]}]}]}"#,
                "\n"
            )
        );
        assert_eq!(n, out.len());
    }

    #[test]
    fn test_pretty_output_uses_four_spaces() {
        let mut w = JsonWriter::new(Vec::new(), true);
        w.write_response(&Response::new(vec![StatementResult::new(3)]))
            .unwrap();

        let text = String::from_utf8(w.into_inner()).unwrap();
        assert_eq!(
            text,
            "{\n    \"results\": [\n        {\n            \"statement_id\": 3\n        }\n    ]\n}\n"
        );
    }

    #[test]
    fn test_deterministic() {
        for pretty in [false, true] {
            let mut a = JsonWriter::new(Vec::new(), pretty);
            let mut b = JsonWriter::new(Vec::new(), pretty);
            a.write_response(&sample()).unwrap();
            b.write_response(&sample()).unwrap();
            assert_eq!(a.into_inner(), b.into_inner());
        }
    }

    #[test]
    fn test_each_call_is_its_own_line() {
        let mut w = JsonWriter::new(Vec::new(), false);
        let first = w.write_response(&sample()).unwrap();
        let second = w
            .write_response(&Response::new(vec![StatementResult::new(1)]))
            .unwrap();

        let out = w.into_inner();
        assert_eq!(first + second, out.len());
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], r#"{"results":[{"statement_id":1}]}"#);
        for line in lines {
            serde_json::from_str::<serde_json::Value>(line).unwrap();
        }
    }

    #[test]
    fn test_marshal_failure_writes_error_text() {
        let resp = Response::new(vec![StatementResult::new(0).with_series(
            Series::new("m")
                .columns(["value"])
                .row(vec![Value::Float(f64::NAN)]),
        )]);
        let mut w = JsonWriter::new(RecordingSink::default(), false);
        let err = w.write_response(&resp).unwrap_err();

        let RespfmtError::Marshal { written, source } = err else {
            panic!("expected marshal error, got {err:?}");
        };
        let body = String::from_utf8(w.get_ref().bytes()).unwrap();
        assert!(body.contains("unsupported value: NaN"));
        assert!(body.ends_with('\n'));
        assert_eq!(body, format!("{}\n", source));
        assert_eq!(written, w.get_ref().observed());
    }

    #[test]
    fn test_count_matches_observed_bytes() {
        let mut w = JsonWriter::new(RecordingSink::with_max_chunk(7), true);
        let n = w.write_response(&sample()).unwrap();
        assert_eq!(n, w.get_ref().observed());
    }

    #[test]
    fn test_write_failure_reports_partial_count() {
        let mut w = JsonWriter::new(FailingSink::new(4), false);
        let err = w.write_response(&sample()).unwrap_err();

        assert!(matches!(err, RespfmtError::Write { ref source, .. }
            if source.kind() == std::io::ErrorKind::BrokenPipe));
        assert_eq!(err.written(), Some(4));
        assert_eq!(w.get_ref().written, b"{\"re");
    }

    #[test]
    fn test_failed_fallback_write_reports_partial_count() {
        let resp = Response::new(vec![StatementResult::new(0).with_series(
            Series::new("m")
                .columns(["value"])
                .row(vec![Value::Float(f64::INFINITY)]),
        )]);
        let mut w = JsonWriter::new(FailingSink::new(3), false);
        let err = w.write_response(&resp).unwrap_err();

        assert!(matches!(err, RespfmtError::Write { written: 3, .. }));
        assert_eq!(w.get_ref().written.len(), 3);
    }
}
