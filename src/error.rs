use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the billvision library.
///
/// Every variant is terminal for the command that hit it; nothing in the
/// crate retries.
#[derive(Debug, Error)]
pub enum Error {
    /// A required file, credential or setting is missing or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A label-map stanza does not have the expected shape.
    #[error("malformed label map stanza {stanza} (line {line}): {reason}")]
    Format {
        stanza: usize,
        line: usize,
        reason: String,
    },

    #[error("failed to read or write '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image error for '{}': {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Loading or running an ONNX model failed.
    #[error("model error: {0}")]
    Model(String),

    /// A TFRecord frame or the Example inside it could not be decoded.
    #[error("bad record at byte {offset}: {reason}")]
    Record { offset: u64, reason: String },

    #[error("model bundle error: {0}")]
    Bundle(String),

    #[error("http error: {0}")]
    Http(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(stanza: usize, line: usize, reason: impl Into<String>) -> Self {
        Error::Format {
            stanza,
            line,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
