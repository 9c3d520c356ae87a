//! Client-side SMB handle lifecycle and paginated remote enumeration.
//!
//! A [`tree::TreeConnection`] hands out shared tree handles; listings opened
//! with [`listing::list`] drive one of the protocol bindings through a lazy
//! [`listing::Cursor`] and release everything they hold exactly once.

#![warn(missing_docs)]

pub mod config;
pub mod listing;
pub mod logging;
pub mod primitives;
pub mod protocol;
pub mod replay;
pub mod tree;
pub mod types;

pub use config::ClientConfig;
pub use listing::{list, list_resources, ListOptions, ResourceLocator};
pub use tree::{SmbContext, TreeConnection};
pub use types::{Result, SmbError};
