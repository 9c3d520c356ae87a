//! Low-level primitives shared by the tree and listing layers.
//!
//! Includes the transport buffer pool and the reference-counted handle
//! wrapper used for trees and open files.

/// Pooled transport buffers.
///
/// Fixed-size, zero-on-release byte buffers reused across exchanges.
pub mod buffer;

/// Reference-counted handles to connection-scoped server state.
///
/// Acquire/release counting, generation-based validity and leak reports.
pub mod handle;
