//! Error types for rendering operations.

use thiserror::Error;

/// Errors that abort the render of a document.
#[derive(Error, Debug)]
pub enum Error {
    /// The render tree was asked to do something that breaks its shape:
    /// a span given block content, or a close with nothing open.
    #[error("structural violation: {0}")]
    StructuralViolation(String),

    /// A table column alignment outside of unset, center (0) and right (1).
    #[error("unrecognized table alignment: {0}")]
    UnrecognizedAlignment(i64),

    /// An image reference whose URL has no file extension.
    #[error("no extension at the end of {0}")]
    MissingExtension(String),

    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
