//! CSV writer.
//!
//! Rows are grouped by statement. Each group starts with a header row built
//! from its first series, `name,tags,<columns...>`, and groups are separated
//! by a blank line:
//!
//! ```text
//! name,tags,time,value
//! cpu,host=a,0,1.5
//! cpu,host=b,0,2
//!
//! name,tags,time,count
//! mem,,0,7
//! ```
//!
//! The writer remembers the current statement across calls, so a statement
//! split over several streamed chunks still gets a single header.

use std::io::{self, Write};

use ::csv::{Terminator, Writer as RecordWriter, WriterBuilder};
use tracing::trace;

use super::ResponseWriter;
use crate::error::RespfmtError;
use crate::model::{float_text, Response, Series, Value};
use crate::sink::CountingWriter;
use crate::Result;

pub const CONTENT_TYPE: &str = "text/csv";

/// Statement-aware CSV writer.
#[derive(Debug)]
pub struct CsvWriter<W> {
    inner: W,
    /// Statement currently being emitted; `None` until the first header
    statement_id: Option<i64>,
    /// Header of the current group, overwritten in place for each data row
    row: Vec<String>,
}

impl<W: Write> CsvWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            statement_id: None,
            row: Vec::new(),
        }
    }

    /// Statement of the group currently open, if any.
    pub fn statement_id(&self) -> Option<i64> {
        self.statement_id
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

fn record_writer(buf: Vec<u8>) -> RecordWriter<Vec<u8>> {
    WriterBuilder::new()
        .terminator(Terminator::Any(b'\n'))
        .from_writer(buf)
}

/// Take the records encoded so far.
fn finish(csv: RecordWriter<Vec<u8>>) -> Result<Vec<u8>> {
    csv.into_inner()
        .map_err(|err| RespfmtError::Io(io::Error::new(err.error().kind(), err.to_string())))
}

impl<W: Write> ResponseWriter for CsvWriter<W> {
    fn write_response(&mut self, resp: &Response) -> Result<usize> {
        let Self {
            inner,
            statement_id,
            row,
        } = self;
        let mut out = CountingWriter::new(inner);
        let res = write_groups(&mut out, statement_id, row, resp);

        let written = out.count();
        res.map_err(|err| err.with_written(written))?;
        trace!(bytes = written, "wrote csv response");
        Ok(written)
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    fn content_type(&self) -> &'static str {
        CONTENT_TYPE
    }
}

/// Records of the open group are handed to `out` when the statement changes
/// and at the end of the call. A failed hand-off stops the call.
fn write_groups<W: Write>(
    out: &mut W,
    statement_id: &mut Option<i64>,
    row: &mut Vec<String>,
    resp: &Response,
) -> Result<()> {
    let mut csv = record_writer(Vec::new());

    for result in &resp.results {
        if *statement_id != Some(result.statement_id) {
            // A statement with no series produces nothing, not even a separator.
            let Some(first) = result.series.first() else {
                continue;
            };

            if statement_id.is_some() {
                let mut records = finish(csv)?;
                out.write_all(&records)?;
                out.write_all(b"\n")?;
                records.clear();
                csv = record_writer(records);
            }
            *statement_id = Some(result.statement_id);

            row.clear();
            row.push("name".to_string());
            row.push("tags".to_string());
            row.extend(first.columns.iter().cloned());
            csv.write_record(&*row)?;
        }

        for series in &result.series {
            write_series(&mut csv, row, series)?;
        }
    }

    out.write_all(&finish(csv)?)?;
    Ok(())
}

fn write_series(
    csv: &mut RecordWriter<Vec<u8>>,
    row: &mut [String],
    series: &Series,
) -> Result<()> {
    row[0].clear();
    row[0].push_str(&series.name);
    row[1].clear();
    if !series.tags.is_empty() {
        let key = series.tags.hash_key();
        row[1].push_str(key.strip_prefix(',').unwrap_or(&key));
    }

    for values in &series.values {
        // Cells past the end of a short row stay empty; values past the
        // header width are dropped.
        for (i, cell) in row[2..].iter_mut().enumerate() {
            cell.clear();
            if let Some(value) = values.get(i) {
                cell.push_str(&format_value(value));
            }
        }
        csv.write_record(&*row)?;
    }
    Ok(())
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Float(v) => float_text(*v),
        Value::Integer(v) => v.to_string(),
        Value::String(v) => v.clone(),
        Value::Boolean(true) => "true".to_string(),
        Value::Boolean(false) => "false".to_string(),
        Value::Timestamp(ts) => ts.unix_nanos().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{StatementResult, Timestamp};
    use crate::sink::testing::{FailingSink, RecordingSink};

    fn cpu(host: &str, value: f64) -> Series {
        Series::new("cpu")
            .tag("host", host)
            .columns(["time", "value"])
            .row(vec![Timestamp::from_unix_nanos(0).into(), value.into()])
    }

    fn render(responses: &[Response]) -> String {
        let mut w = CsvWriter::new(Vec::new());
        for resp in responses {
            w.write_response(resp).unwrap();
        }
        String::from_utf8(w.into_inner()).unwrap()
    }

    #[test]
    fn test_single_series() {
        let series = Series::new("cpu")
            .columns(["time", "value"])
            .row(vec![Timestamp::from_unix_nanos(10).into(), 1.5.into()])
            .row(vec![Timestamp::from_unix_nanos(20).into(), 2.0.into()])
            .row(vec![Timestamp::from_unix_nanos(30).into(), 2.25.into()]);
        let out = render(&[Response::new(vec![
            StatementResult::new(0).with_series(series)
        ])]);

        assert_eq!(
            out,
            "name,tags,time,value\ncpu,,10,1.5\ncpu,,20,2\ncpu,,30,2.25\n"
        );
    }

    #[test]
    fn test_tags_render_without_leading_comma() {
        let series = cpu("server01", 1.0).tag("region", "us-west");
        let out = render(&[Response::new(vec![
            StatementResult::new(0).with_series(series)
        ])]);

        assert_eq!(
            out,
            "name,tags,time,value\ncpu,\"host=server01,region=us-west\",0,1\n"
        );
    }

    #[test]
    fn test_same_statement_shares_header() {
        let out = render(&[Response::new(vec![
            StatementResult::new(0).with_series(cpu("a", 1.0)),
            StatementResult::new(0).with_series(cpu("b", 2.0)),
        ])]);

        assert_eq!(out, "name,tags,time,value\ncpu,host=a,0,1\ncpu,host=b,0,2\n");
    }

    #[test]
    fn test_statements_separated_by_blank_line() {
        let mem = Series::new("mem")
            .columns(["time", "used", "ok"])
            .row(vec![Timestamp::from_unix_nanos(5).into(), 7i64.into(), true.into()]);
        let out = render(&[Response::new(vec![
            StatementResult::new(0).with_series(cpu("a", 1.0)),
            StatementResult::new(1).with_series(mem),
        ])]);

        assert_eq!(
            out,
            "name,tags,time,value\ncpu,host=a,0,1\n\nname,tags,time,used,ok\nmem,,5,7,true\n"
        );
        assert_eq!(out.matches("\n\n").count(), 1);
    }

    #[test]
    fn test_every_series_of_a_result_is_written() {
        let out = render(&[Response::new(vec![StatementResult::new(0)
            .with_series(cpu("a", 1.0))
            .with_series(cpu("b", 2.0))])]);

        assert_eq!(out, "name,tags,time,value\ncpu,host=a,0,1\ncpu,host=b,0,2\n");
    }

    #[test]
    fn test_empty_result_is_skipped() {
        let out = render(&[Response::new(vec![
            StatementResult::new(0),
            StatementResult::new(1).with_series(cpu("a", 1.0)),
        ])]);

        assert_eq!(out, "name,tags,time,value\ncpu,host=a,0,1\n");
    }

    #[test]
    fn test_only_empty_results_write_nothing() {
        let mut w = CsvWriter::new(Vec::new());
        let n = w
            .write_response(&Response::new(vec![
                StatementResult::new(0),
                StatementResult::new(1).with_error("not found"),
            ]))
            .unwrap();

        assert_eq!(n, 0);
        assert_eq!(w.statement_id(), None);

        // The next chunk with data is still the first group: no separator.
        w.write_response(&Response::new(vec![
            StatementResult::new(2).with_series(cpu("a", 1.0))
        ]))
        .unwrap();
        assert_eq!(
            String::from_utf8(w.into_inner()).unwrap(),
            "name,tags,time,value\ncpu,host=a,0,1\n"
        );
    }

    #[test]
    fn test_statement_continues_across_calls() {
        let out = render(&[
            Response::new(vec![StatementResult::new(0).with_series(cpu("a", 1.0))]),
            Response::new(vec![StatementResult::new(0).with_series(cpu("b", 2.0))]),
            Response::new(vec![StatementResult::new(1).with_series(cpu("c", 3.0))]),
        ]);

        assert_eq!(
            out,
            "name,tags,time,value\ncpu,host=a,0,1\ncpu,host=b,0,2\n\nname,tags,time,value\ncpu,host=c,0,3\n"
        );
    }

    #[test]
    fn test_value_formatting() {
        assert_eq!(format_value(&Value::Float(1.5)), "1.5");
        assert_eq!(format_value(&Value::Float(2.0)), "2");
        assert_eq!(format_value(&Value::Float(0.000001)), "0.000001");
        assert_eq!(format_value(&Value::Integer(-42)), "-42");
        assert_eq!(format_value(&Value::from("a b")), "a b");
        assert_eq!(format_value(&Value::Boolean(true)), "true");
        assert_eq!(format_value(&Value::Boolean(false)), "false");
        assert_eq!(
            format_value(&Value::Timestamp(Timestamp::from_unix_nanos(
                1_257_894_000_000_000_000
            ))),
            "1257894000000000000"
        );
    }

    #[test]
    fn test_short_row_leaves_empty_fields() {
        let series = Series::new("m")
            .columns(["a", "b", "c"])
            .row(vec![1i64.into(), 2i64.into(), 3i64.into()])
            .row(vec![4i64.into()]);
        let out = render(&[Response::new(vec![
            StatementResult::new(0).with_series(series)
        ])]);

        assert_eq!(out, "name,tags,a,b,c\nm,,1,2,3\nm,,4,,\n");
    }

    #[test]
    fn test_wide_row_is_truncated_to_header() {
        let narrow = Series::new("m").columns(["a"]).row(vec![1i64.into()]);
        let wide = Series::new("n")
            .columns(["a", "b"])
            .row(vec![2i64.into(), 3i64.into()]);
        let out = render(&[Response::new(vec![StatementResult::new(0)
            .with_series(narrow)
            .with_series(wide)])]);

        assert_eq!(out, "name,tags,a\nm,,1\nn,,2\n");
    }

    #[test]
    fn test_count_matches_observed_bytes() {
        let mut w = CsvWriter::new(RecordingSink::with_max_chunk(5));
        let n = w
            .write_response(&Response::new(vec![
                StatementResult::new(0).with_series(cpu("a", 1.0)),
                StatementResult::new(1).with_series(cpu("b", 2.0)),
            ]))
            .unwrap();

        assert_eq!(n, w.get_ref().observed());
        assert_eq!(n, w.get_ref().bytes().len());
    }

    #[test]
    fn test_write_failure_reports_partial_count() {
        let mut w = CsvWriter::new(FailingSink::new(10));
        let err = w
            .write_response(&Response::new(vec![
                StatementResult::new(0).with_series(cpu("a", 1.0))
            ]))
            .unwrap_err();

        assert!(matches!(err, RespfmtError::Write { ref source, .. }
            if source.kind() == io::ErrorKind::BrokenPipe));
        assert_eq!(err.written(), Some(10));
        assert_eq!(w.get_ref().written, b"name,tags,");
    }

    #[test]
    fn test_failed_separator_stops_the_call() {
        let first = "name,tags,time,value\ncpu,host=a,0,1\n";
        let mut w = CsvWriter::new(FailingSink::new(first.len()));
        let err = w
            .write_response(&Response::new(vec![
                StatementResult::new(0).with_series(cpu("a", 1.0)),
                StatementResult::new(1).with_series(cpu("b", 2.0)),
            ]))
            .unwrap_err();

        assert_eq!(err.written(), Some(first.len()));
        assert_eq!(w.get_ref().written, first.as_bytes());
    }

    #[test]
    fn test_leading_space_is_not_quoted() {
        let series = Series::new("m")
            .columns(["a", "b"])
            .row(vec![" a".into(), "x,y".into()]);
        let out = render(&[Response::new(vec![
            StatementResult::new(0).with_series(series)
        ])]);

        assert_eq!(out, "name,tags,a,b\nm,, a,\"x,y\"\n");
    }
}
