#![forbid(unsafe_code)]

//! Reference-counted ownership of connection-scoped server resources.
//!
//! A [`HandleRef`] wraps a resource (a tree connection, an open file) whose
//! server-side state must be torn down exactly once. Consumers share the
//! handle through [`HandleRef::acquire`] and give it back with
//! [`HandleRef::release`]; the release that brings the count to zero runs
//! [`HandleResource::close`] and leaves the handle permanently invalid.
//!
//! Handles bound to a parent connection snapshot the parent's generation at
//! creation and stop being valid once the parent reconnects or disconnects,
//! even while references are still outstanding.

use std::backtrace::Backtrace;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::types::{Result, SmbError};

/// Server-side state guarded by a [`HandleRef`].
pub trait HandleResource: Send + Sync {
    /// Performs the protocol-level close or disconnect.
    fn close(&self) -> Result<()>;

    /// Short description used in logs.
    fn describe(&self) -> String;
}

/// View of a connection that handles are bound to.
pub trait ConnectionState: Send + Sync {
    /// Changes every time the connection is torn down and re-established.
    fn generation(&self) -> u64;

    /// Whether the underlying connection is currently usable.
    fn is_connected(&self) -> bool;
}

struct ParentBinding {
    parent: Weak<dyn ConnectionState>,
    generation: u64,
}

#[derive(Debug, Default)]
struct RefState {
    refs: usize,
    closed: bool,
}

/// Shared, reference-counted handle to a [`HandleResource`].
pub struct HandleRef<R: HandleResource> {
    resource: R,
    state: Mutex<RefState>,
    parent: Option<ParentBinding>,
    origin: Option<Backtrace>,
}

impl<R: HandleResource> HandleRef<R> {
    /// Wraps `resource` with a reference count of one.
    ///
    /// When `parent` is given the handle captures its current generation.
    /// `trace` records the allocation backtrace for leak reports.
    pub fn new(resource: R, parent: Option<&Arc<dyn ConnectionState>>, trace: bool) -> Arc<Self> {
        let parent = parent.map(|parent| ParentBinding {
            generation: parent.generation(),
            parent: Arc::downgrade(parent),
        });
        Arc::new(Self {
            resource,
            state: Mutex::new(RefState {
                refs: 1,
                closed: false,
            }),
            parent,
            origin: trace.then(Backtrace::force_capture),
        })
    }

    /// Takes an additional reference.
    ///
    /// Fails once the handle has been closed; a closed handle never reopens.
    pub fn acquire(self: &Arc<Self>) -> Result<Arc<Self>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(SmbError::InvalidHandle("handle already closed"));
        }
        state.refs += 1;
        Ok(Arc::clone(self))
    }

    /// Drops one reference, closing the resource when none remain.
    ///
    /// Releasing more often than acquiring is reported and otherwise
    /// ignored; the close never runs twice.
    pub fn release(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if state.refs == 0 {
                error!(
                    resource = %self.resource.describe(),
                    closed = state.closed,
                    "handle.release.underflow"
                );
                return Ok(());
            }
            state.refs -= 1;
            if state.refs > 0 {
                return Ok(());
            }
            state.closed = true;
        }
        debug!(resource = %self.resource.describe(), "handle.release.close");
        self.resource.close()
    }

    /// True while referenced, not closed, and the parent connection is the
    /// same one the handle was created on.
    pub fn is_valid(&self) -> bool {
        {
            let state = self.state.lock();
            if state.closed || state.refs == 0 {
                return false;
            }
        }
        match &self.parent {
            None => true,
            Some(binding) => match binding.parent.upgrade() {
                Some(parent) => {
                    parent.generation() == binding.generation && parent.is_connected()
                }
                None => false,
            },
        }
    }

    /// Returns an error unless [`is_valid`](Self::is_valid) holds.
    pub fn ensure_valid(&self) -> Result<()> {
        if self.is_closed() {
            return Err(SmbError::InvalidHandle("handle already closed"));
        }
        if !self.is_valid() {
            return Err(SmbError::InvalidHandle("connection was reset"));
        }
        Ok(())
    }

    /// Current number of outstanding references.
    pub fn ref_count(&self) -> usize {
        self.state.lock().refs
    }

    /// Whether the close has already run.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Generation of the parent captured at creation, if bound.
    pub fn generation(&self) -> Option<u64> {
        self.parent.as_ref().map(|binding| binding.generation)
    }

    /// The wrapped resource.
    pub fn resource(&self) -> &R {
        &self.resource
    }

    /// Allocation backtrace, captured only when resource tracing is on.
    pub fn origin(&self) -> Option<&Backtrace> {
        self.origin.as_ref()
    }
}

impl<R: HandleResource> Drop for HandleRef<R> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.closed || state.refs == 0 {
            return;
        }
        match &self.origin {
            Some(origin) => warn!(
                resource = %self.resource.describe(),
                refs = state.refs,
                origin = %origin,
                "handle.leaked"
            ),
            None => debug!(
                resource = %self.resource.describe(),
                refs = state.refs,
                "handle.leaked"
            ),
        }
    }
}
