//! Error types produced while reading or writing MOBI containers.

use thiserror::Error;

/// Errors that can occur while parsing or emitting a MOBI file.
#[derive(Error, Debug)]
pub enum MobiError {
    #[error("expected magic {expected:?} at {location}, found {seen:?}")]
    UnsupportedMagic {
        location: &'static str,
        expected: &'static [u8],
        seen: Vec<u8>,
    },

    #[error("unsupported compression type {0} (only \"no compression\" is supported)")]
    UnsupportedCompression(u16),

    #[error("unsupported encryption type {0} (only \"no encryption\" is supported)")]
    UnsupportedEncryption(u16),

    #[error("unsupported text encoding {0} (only UTF-8/65001 is supported)")]
    UnsupportedTextEncoding(u32),

    #[error("malformed container: {0}")]
    MalformedContainer(String),

    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    #[error("corrupt font record: {0}")]
    CorruptFont(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MobiError>;
