//! Loading result sets and rendering them through a negotiated writer

use std::fs;
use std::io::{self, Read};

use anyhow::Context;
use console::Style;
use respfmtlib::{
    new_response_writer, write_error, BufferedResponse, Negotiation, Response, ResponseWriter,
};
use tracing::debug;

/// What a client would have received.
#[derive(Debug)]
pub struct Rendered {
    /// Response headers in the order they were set
    pub headers: Vec<(String, String)>,
    /// Body bytes
    pub body: Vec<u8>,
    /// Bytes reported by each `write_response` call
    pub calls: Vec<usize>,
}

impl Rendered {
    pub fn total(&self) -> usize {
        self.calls.iter().sum()
    }
}

/// Read a JSON result set from `path` (`-` for stdin).
///
/// String cells in `time_column` are parsed as RFC 3339 timestamps so that
/// CSV and MessagePack output carry real time values.
pub fn load_response(path: &str, time_column: &str) -> anyhow::Result<Response> {
    let text = if path == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        buf
    } else {
        fs::read_to_string(path).with_context(|| format!("failed to read file '{}'", path))?
    };

    let mut resp: Response =
        serde_json::from_str(&text).with_context(|| format!("invalid result set in '{}'", path))?;
    for series in resp.results.iter_mut().flat_map(|r| r.series.iter_mut()) {
        series.parse_time_column(time_column)?;
    }
    debug!(results = resp.results.len(), path, "loaded result set");
    Ok(resp)
}

/// Run `resp` through the writer chosen by `negotiation`.
///
/// With `chunked`, every statement result is written by its own call, the
/// way a streaming endpoint emits partial results.
pub fn render(
    resp: &Response,
    negotiation: &Negotiation,
    chunked: bool,
) -> respfmtlib::Result<Rendered> {
    let mut http = BufferedResponse::new();
    let mut calls = Vec::new();
    {
        let mut writer = new_response_writer(&mut http, negotiation);
        if chunked {
            for result in &resp.results {
                calls.push(writer.write_response(&Response::new(vec![result.clone()]))?);
            }
            if let Some(err) = &resp.err {
                calls.push(write_error(&mut writer, err)?);
            }
        } else {
            calls.push(writer.write_response(resp)?);
        }
        writer.flush()?;
    }

    Ok(Rendered {
        headers: http.headers().to_vec(),
        body: http.into_body(),
        calls,
    })
}

/// Header block in `curl -i` style, for stderr.
pub fn format_headers(rendered: &Rendered) -> String {
    let name = Style::new().bold().for_stderr();
    let dim = Style::new().dim().for_stderr();

    let mut out = String::new();
    for (k, v) in &rendered.headers {
        out.push_str(&format!("{}: {}\n", name.apply_to(k), v));
    }
    let calls: Vec<String> = rendered.calls.iter().map(|n| n.to_string()).collect();
    out.push_str(&format!(
        "{}\n",
        dim.apply_to(format!(
            "{} bytes in {} call(s) [{}]",
            rendered.total(),
            rendered.calls.len(),
            calls.join(", ")
        ))
    ));
    out
}
