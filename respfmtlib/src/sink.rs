//! Output plumbing shared by every writer.
//!
//! - [`CountingWriter`] tallies the bytes the inner stream accepts
//! - [`HttpResponse`] is the slice of an HTTP response a writer needs: a body
//!   stream plus a way to set headers
//! - [`BufferedResponse`] keeps both in memory

use std::io::{self, Write};

/// Pass-through writer that counts bytes actually written.
///
/// Short writes are counted as reported by the inner writer; nothing is
/// retried here.
#[derive(Debug)]
pub struct CountingWriter<W> {
    inner: W,
    count: usize,
}

impl<W: Write> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }

    /// Bytes accepted since creation.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Body stream of an HTTP response plus its header map.
pub trait HttpResponse: Write {
    /// Append a header value. Headers must be set before the first body write.
    fn add_header(&mut self, name: &str, value: &str);
}

impl<T: HttpResponse + ?Sized> HttpResponse for &mut T {
    fn add_header(&mut self, name: &str, value: &str) {
        (**self).add_header(name, value);
    }
}

/// In-memory response: collected headers and body bytes.
#[derive(Debug, Clone, Default)]
pub struct BufferedResponse {
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    flushes: usize,
}

impl BufferedResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Number of times the body was flushed.
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}

impl Write for BufferedResponse {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushes += 1;
        Ok(())
    }
}

impl HttpResponse for BufferedResponse {
    fn add_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }
}
