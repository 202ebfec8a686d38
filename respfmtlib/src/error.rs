//! Error types for respfmtlib

use thiserror::Error;

/// Errors that can occur while serializing a response
#[derive(Error, Debug)]
pub enum RespfmtError {
    /// The underlying stream rejected a write or flush
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream failed part way through a response.
    ///
    /// `written` is how many bytes of the failed call the stream accepted
    /// before the error.
    #[error("write failed after {written} bytes: {source}")]
    Write {
        written: usize,
        source: std::io::Error,
    },

    /// CSV record could not be written
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The response could not be marshaled to JSON.
    ///
    /// The error text was written as the body instead; `written` counts those
    /// bytes plus the trailing newline.
    #[error("json: {source}")]
    Marshal {
        written: usize,
        source: serde_json::Error,
    },

    /// MessagePack value could not be encoded
    #[error("msgpack encode error: {0}")]
    Encode(String),

    /// Timestamp text could not be parsed
    #[error("invalid timestamp '{value}': {message}")]
    InvalidTimestamp { value: String, message: String },
}

impl RespfmtError {
    /// Bytes of the failed call that reached the stream, when known.
    pub fn written(&self) -> Option<usize> {
        match self {
            RespfmtError::Write { written, .. } | RespfmtError::Marshal { written, .. } => {
                Some(*written)
            }
            _ => None,
        }
    }

    /// Attach the call's byte count to a stream error.
    pub(crate) fn with_written(self, written: usize) -> Self {
        match self {
            RespfmtError::Io(source) => RespfmtError::Write { written, source },
            other => other,
        }
    }
}

impl From<rmp::encode::ValueWriteError> for RespfmtError {
    fn from(err: rmp::encode::ValueWriteError) -> Self {
        match err {
            rmp::encode::ValueWriteError::InvalidMarkerWrite(e)
            | rmp::encode::ValueWriteError::InvalidDataWrite(e) => RespfmtError::Io(e),
        }
    }
}
