use thiserror::Error;

use crate::index::PackageIndex;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid package tag {found:#010x}")]
    InvalidTag { found: u32 },

    #[error("unexpected end of data at offset {offset:#x} (need {need} bytes, have {have})")]
    UnexpectedEof {
        offset: usize,
        need: usize,
        have: usize,
    },

    #[error("{context}: {message}")]
    Format {
        context: &'static str,
        message: String,
    },

    #[error("unsupported package version {version}/{licensee}: {reason}")]
    UnsupportedVersion {
        version: i32,
        licensee: i32,
        reason: &'static str,
    },

    #[error("package index {index} is out of range ({exports} exports, {imports} imports)")]
    UnresolvedReference {
        index: PackageIndex,
        exports: usize,
        imports: usize,
    },

    #[error("name index {index} is out of range ({count} names)")]
    NameOutOfRange { index: i32, count: usize },

    #[error("class {0:?} is not registered")]
    UnknownClass(String),

    #[error("token {opcode:#04x} at {position:#06x}: {message}")]
    TokenDecode {
        opcode: u8,
        position: u32,
        message: String,
    },

    #[error("nest mismatch at {position:#06x}: expected {expected}, found {found}")]
    NestConsistency {
        position: u32,
        expected: &'static str,
        found: &'static str,
    },

    #[error("decompression failed: {0}")]
    Decompression(String),

    #[error("package is compressed and no decompressor was supplied")]
    CompressedPackage,

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn format(context: &'static str, message: impl Into<String>) -> Self {
        Error::Format {
            context,
            message: message.into(),
        }
    }

    /// Whether the error only affects the object or token that raised it.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::UnknownClass(_) | Error::TokenDecode { .. } | Error::NestConsistency { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
