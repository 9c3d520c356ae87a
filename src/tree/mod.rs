//! Tree connections and the handles that hang off them.
//!
//! A [`TreeConnection`] owns the transport and tracks the connection
//! generation. Consumers never talk to it directly; they acquire a shared
//! [`TreeHandle`], which connects on first acquisition and disconnects when
//! the last reference is released. Open files are [`FileHandle`]s bound to
//! the generation they were opened on.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::primitives::buffer::BufferPool;
use crate::primitives::handle::{ConnectionState, HandleRef, HandleResource};
use crate::protocol::{access, CreateRequest, Request, Response, SendFlags, Transport};
use crate::types::{Dialect, FileId, Result, SmbError, TreeId};

/// Shared client state: configuration and the transport buffer pool.
#[derive(Clone)]
pub struct SmbContext {
    config: Arc<ClientConfig>,
    buffers: Arc<BufferPool>,
}

impl SmbContext {
    /// Builds a context, sizing the buffer pool from `config`.
    pub fn new(config: ClientConfig) -> Self {
        let buffers = Arc::new(BufferPool::from_config(&config));
        Self {
            config: Arc::new(config),
            buffers,
        }
    }

    /// Client tunables.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Buffer pool shared by every exchange on this context.
    pub fn buffers(&self) -> &BufferPool {
        &self.buffers
    }
}

impl Default for SmbContext {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

/// Shared handle on a connected tree.
pub type TreeHandle = Arc<HandleRef<TreeSession>>;

/// Shared handle on an open file or directory.
pub type FileHandle = Arc<HandleRef<OpenFile>>;

struct TreeState {
    handle: Weak<HandleRef<TreeSession>>,
}

/// Connection to one share over one transport.
pub struct TreeConnection {
    ctx: SmbContext,
    transport: Arc<dyn Transport>,
    share_path: String,
    oem_domain: String,
    generation: AtomicU64,
    resets: AtomicU64,
    connected: AtomicBool,
    state: Mutex<TreeState>,
}

impl TreeConnection {
    /// Creates an unconnected tree for `share_path` (`\\host\share`).
    ///
    /// `oem_domain` is the domain the server reported at session setup; it
    /// is used as the target of domain enumeration.
    pub fn new(
        ctx: SmbContext,
        transport: Arc<dyn Transport>,
        share_path: impl Into<String>,
        oem_domain: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            transport,
            share_path: share_path.into(),
            oem_domain: oem_domain.into(),
            generation: AtomicU64::new(0),
            resets: AtomicU64::new(0),
            connected: AtomicBool::new(false),
            state: Mutex::new(TreeState {
                handle: Weak::new(),
            }),
        })
    }

    /// Returns a reference to the live tree handle, connecting if needed.
    ///
    /// The state lock is held across TREE_CONNECT so concurrent first
    /// acquisitions share one tree. A tree whose last reference is being
    /// released finishes its TREE_DISCONNECT before the next connect.
    pub fn acquire(self: &Arc<Self>) -> Result<TreeHandle> {
        let mut state = self.state.lock();
        if let Some(existing) = state.handle.upgrade() {
            // A release to zero may land between the check and the acquire.
            if existing.is_valid() {
                if let Ok(handle) = existing.acquire() {
                    return Ok(handle);
                }
            }
        }
        let response = self.exchange(
            None,
            &Request::TreeConnect {
                path: self.share_path.clone(),
            },
            SendFlags::NONE,
        )?;
        let Response::TreeConnect { tid } = response else {
            return Err(SmbError::Protocol("unexpected reply to TREE_CONNECT"));
        };
        let generation = self.generation.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        self.connected.store(true, AtomicOrdering::SeqCst);
        info!(share = %self.share_path, tid = tid.0, generation, "tree.connect");

        let parent: Arc<dyn ConnectionState> = self.clone();
        let handle = HandleRef::new(
            TreeSession {
                connection: Arc::clone(self),
                tid,
                generation,
                epoch: self.resets.load(AtomicOrdering::SeqCst),
            },
            Some(&parent),
            self.ctx.config.trace_resource_usage,
        );
        state.handle = Arc::downgrade(&handle);
        Ok(handle)
    }

    /// Marks the connection as lost; every bound handle becomes invalid.
    pub fn invalidate(&self) {
        self.resets.fetch_add(1, AtomicOrdering::SeqCst);
        if self.connected.swap(false, AtomicOrdering::SeqCst) {
            warn!(share = %self.share_path, "tree.invalidate");
        }
    }

    /// The live tree handle, if one is currently referenced.
    pub fn active_handle(&self) -> Option<TreeHandle> {
        self.state
            .lock()
            .handle
            .upgrade()
            .filter(|handle| !handle.is_closed())
    }

    /// `\\host\share` this tree connects to.
    pub fn share_path(&self) -> &str {
        &self.share_path
    }

    /// Domain reported by the server.
    pub fn oem_domain(&self) -> &str {
        &self.oem_domain
    }

    /// Client context.
    pub fn context(&self) -> &SmbContext {
        &self.ctx
    }

    /// Dialect spoken by the transport.
    pub fn dialect(&self) -> Dialect {
        self.transport.dialect()
    }

    fn exchange(&self, tid: Option<TreeId>, request: &Request, flags: SendFlags) -> Result<Response> {
        let mut scratch = self.ctx.buffers.lease();
        let result = self.transport.exchange(tid, request, flags, &mut scratch);
        match &result {
            Err(SmbError::Io(err)) => {
                warn!(request = request.kind(), error = %err, "tree.exchange.io_failed");
                self.invalidate();
            }
            Err(SmbError::Status(status)) if status.drops_connection() => {
                warn!(request = request.kind(), status = %status, "tree.exchange.connection_lost");
                self.invalidate();
            }
            _ => {}
        }
        result
    }

    /// Takes `state` so the generation check cannot race a reconnect.
    fn detach(&self, state: &mut TreeState, generation: u64) {
        if self.generation.load(AtomicOrdering::SeqCst) != generation {
            return;
        }
        state.handle = Weak::new();
        self.connected.store(false, AtomicOrdering::SeqCst);
    }
}

impl ConnectionState for TreeConnection {
    fn generation(&self) -> u64 {
        self.generation.load(AtomicOrdering::SeqCst)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(AtomicOrdering::SeqCst)
    }
}

/// Server-side tree connect owned by a [`TreeHandle`].
pub struct TreeSession {
    connection: Arc<TreeConnection>,
    tid: TreeId,
    generation: u64,
    epoch: u64,
}

impl TreeSession {
    /// Tree id assigned by the server.
    pub fn tid(&self) -> TreeId {
        self.tid
    }

    /// Owning connection.
    pub fn connection(&self) -> &Arc<TreeConnection> {
        &self.connection
    }
}

impl HandleResource for TreeSession {
    fn close(&self) -> Result<()> {
        let conn = &self.connection;
        let mut state = conn.state.lock();
        // The tid outlives a newer tree connect, not a lost transport.
        let live = conn.resets.load(AtomicOrdering::SeqCst) == self.epoch;
        let result = if live {
            conn.exchange(Some(self.tid), &Request::TreeDisconnect, SendFlags::NO_RETRY)
                .map(|_| ())
        } else {
            debug!(tid = self.tid.0, "tree.disconnect.stale");
            Ok(())
        };
        conn.detach(&mut state, self.generation);
        info!(share = %conn.share_path, tid = self.tid.0, "tree.disconnect");
        result
    }

    fn describe(&self) -> String {
        format!("tree {} tid={}", self.connection.share_path, self.tid)
    }
}

impl HandleRef<TreeSession> {
    /// Sends `request` on this tree after checking the handle is still valid.
    pub fn send(&self, request: &Request, flags: SendFlags) -> Result<Response> {
        self.ensure_valid()?;
        let session = self.resource();
        session
            .connection
            .exchange(Some(session.tid), request, flags)
    }

    /// Client tunables of the owning context.
    pub fn config(&self) -> &ClientConfig {
        self.resource().connection.ctx.config()
    }

    /// Dialect of the owning transport.
    pub fn dialect(&self) -> Dialect {
        self.resource().connection.dialect()
    }

    /// Opens `path` (share-relative) and returns its handle.
    pub fn open_file(self: &Arc<Self>, path: &str, params: OpenParams) -> Result<FileHandle> {
        let request = Request::Create(params.to_request(path));
        match self.send(&request, SendFlags::NONE)? {
            Response::Create(created) => self.adopt_file(created.fid, path, params),
            _ => Err(SmbError::Protocol("unexpected reply to CREATE")),
        }
    }

    /// Wraps a file id the server already opened (e.g. inside a compound).
    pub fn adopt_file(self: &Arc<Self>, fid: FileId, path: &str, params: OpenParams) -> Result<FileHandle> {
        let tree = self.acquire()?;
        let parent: Arc<dyn ConnectionState> = self.resource().connection.clone();
        debug!(path, fid = %fid, "file.open");
        Ok(HandleRef::new(
            OpenFile {
                tree,
                fid,
                path: path.to_string(),
                params,
            },
            Some(&parent),
            self.config().trace_resource_usage,
        ))
    }
}

/// Open parameters remembered with a file handle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OpenParams {
    /// Desired access mask.
    pub access: u32,
    /// File attributes.
    pub attributes: u32,
    /// Create options.
    pub create_options: u32,
    /// Share access.
    pub share_access: u32,
}

impl OpenParams {
    /// Parameters for listing a directory.
    pub fn directory() -> Self {
        Self {
            access: access::FILE_READ_DATA | access::FILE_READ_ATTRIBUTES,
            attributes: 0,
            create_options: access::FILE_DIRECTORY_FILE,
            share_access: access::FILE_SHARE_READ
                | access::FILE_SHARE_WRITE
                | access::FILE_SHARE_DELETE,
        }
    }

    /// CREATE request opening `path` with these parameters.
    pub fn to_request(&self, path: &str) -> CreateRequest {
        CreateRequest {
            path: path.to_string(),
            desired_access: self.access,
            file_attributes: self.attributes,
            share_access: self.share_access,
            create_disposition: access::FILE_OPEN,
            create_options: self.create_options,
        }
    }
}

/// Server-side open file owned by a [`FileHandle`].
pub struct OpenFile {
    tree: TreeHandle,
    fid: FileId,
    path: String,
    params: OpenParams,
}

impl OpenFile {
    /// Server file id.
    pub fn fid(&self) -> &FileId {
        &self.fid
    }

    /// Share-relative path the file was opened with.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Parameters the file was opened with.
    pub fn params(&self) -> OpenParams {
        self.params
    }

    /// Tree the file was opened on.
    pub fn tree(&self) -> &TreeHandle {
        &self.tree
    }
}

impl HandleResource for OpenFile {
    fn close(&self) -> Result<()> {
        let result = if self.tree.is_valid() {
            self.tree
                .send(
                    &Request::Close {
                        fid: self.fid.clone(),
                    },
                    SendFlags::NO_RETRY,
                )
                .map(|_| ())
        } else {
            debug!(path = %self.path, fid = %self.fid, "file.close.connection_gone");
            Ok(())
        };
        let released = self.tree.release();
        result.and(released)
    }

    fn describe(&self) -> String {
        format!("file {} fid={}", self.path, self.fid)
    }
}
