#![forbid(unsafe_code)]

//! Identifiers, status codes and the crate-wide error type.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

pub mod status;

pub use status::{NtStatus, WinError};

/// Tree identifier assigned by the server on TREE_CONNECT.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TreeId(pub u32);

/// Server-side search handle returned by TRANS2_FIND_FIRST2.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchId(pub u16);

/// Open file identifier; its width depends on the dialect.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileId {
    /// 16-bit FID used by the legacy dialect.
    Legacy(u16),
    /// Persistent + volatile 128-bit file id used by SMB2 and later.
    Modern([u8; 16]),
}

/// Wire protocol generation spoken on a connection.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Transaction-based legacy dialect.
    Smb1,
    /// Request/response dialect with compounding.
    Smb2,
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SearchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileId::Legacy(fid) => write!(f, "{fid:#06x}"),
            FileId::Modern(bytes) => {
                for b in bytes {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// Errors surfaced by handle management and remote enumeration.
#[derive(thiserror::Error, Debug)]
pub enum SmbError {
    /// Transport-level failure.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// Server answered with a non-success NT status.
    #[error("server returned {0}")]
    Status(NtStatus),
    /// Server answered a RAP transaction with a non-success status.
    #[error("server returned {0}")]
    Rap(WinError),
    /// Server lacks a capability the operation needs.
    #[error("operation not supported by server: {0}")]
    Unsupported(&'static str),
    /// Handle is closed, stale or its connection is gone.
    #[error("handle no longer valid: {0}")]
    InvalidHandle(&'static str),
    /// Caller supplied an unusable argument.
    #[error("invalid argument: {0}")]
    Invalid(String),
    /// Response did not match the request that was sent.
    #[error("protocol violation: {0}")]
    Protocol(&'static str),
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SmbError {
    /// The NT status carried by this error, if any.
    pub fn status(&self) -> Option<NtStatus> {
        match self {
            SmbError::Status(status) => Some(*status),
            _ => None,
        }
    }

    /// True when the error is an ordinary end-of-listing signal.
    pub fn ends_listing(&self) -> bool {
        self.status().is_some_and(NtStatus::ends_listing)
    }
}

impl From<NtStatus> for SmbError {
    fn from(status: NtStatus) -> Self {
        SmbError::Status(status)
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, SmbError>;
