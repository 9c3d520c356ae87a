use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::protocol::FileEntry;
use crate::tree::{TreeConnection, TreeHandle};
use crate::types::{Result, SmbError};

/// Caller-supplied predicate over entry names.
///
/// An `Err` from the filter is logged and the entry is skipped.
pub type NameFilter = Box<dyn Fn(&str) -> Result<bool> + Send + Sync>;

/// Protocol binding driven by [`Cursor`].
///
/// A binding owns its current page and continuation token; the cursor owns
/// the read position, filtering and the close discipline.
pub trait PagedListing: Send {
    /// Issues the initiating request(s) and buffers the first page.
    ///
    /// Returns `Ok(false)` when the server reported that nothing matches.
    fn open(&mut self, tree: &TreeHandle) -> Result<bool>;

    /// Entries of the buffered page that may be handed out.
    fn results(&self) -> &[FileEntry];

    /// True when the current response already signalled end of listing.
    fn is_done(&self) -> bool;

    /// Replaces the page with the next one.
    ///
    /// Returns `Ok(false)` when the server has no more entries.
    fn fetch_more(&mut self, tree: &TreeHandle) -> Result<bool>;

    /// Releases server-side listing state.
    fn close_internal(&mut self, tree: &TreeHandle) -> Result<()>;

    /// Short name used in logs.
    fn label(&self) -> &'static str;
}

/// Lifecycle of a [`Cursor`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CursorState {
    /// Initial request in flight.
    Opening,
    /// A page is buffered.
    HasResult,
    /// A continuation request is in flight.
    Fetching,
    /// The server signalled the end of the listing.
    Exhausted,
    /// Cleanup ran; terminal.
    Closed,
}

struct CursorCore<L: PagedListing> {
    listing: L,
    tree: Option<TreeHandle>,
    filter: Option<NameFilter>,
    index: usize,
    next: Option<FileEntry>,
    deferred: Option<SmbError>,
    state: CursorState,
}

impl<L: PagedListing> CursorCore<L> {
    fn start(&mut self) -> Result<()> {
        let opened = match self.tree.as_ref() {
            Some(tree) => self.listing.open(tree)?,
            None => return Err(SmbError::InvalidHandle("cursor has no tree")),
        };
        if !opened {
            debug!(listing = self.listing.label(), "cursor.open.empty");
            self.close();
            return Ok(());
        }
        self.state = CursorState::HasResult;
        self.next = self.advance()?;
        if self.next.is_none() {
            self.close();
        }
        Ok(())
    }

    /// Scans forward from the read index, fetching further pages as needed.
    fn advance(&mut self) -> Result<Option<FileEntry>> {
        loop {
            let results = self.listing.results();
            while self.index < results.len() {
                let entry = &results[self.index];
                self.index += 1;
                if accepts(self.filter.as_ref(), entry) {
                    return Ok(Some(entry.clone()));
                }
            }
            if self.listing.is_done() {
                self.state = CursorState::Exhausted;
                return Ok(None);
            }
            let Some(tree) = self.tree.as_ref() else {
                return Ok(None);
            };
            self.state = CursorState::Fetching;
            if !self.listing.fetch_more(tree)? {
                self.state = CursorState::Exhausted;
                return Ok(None);
            }
            self.index = 0;
            self.state = CursorState::HasResult;
        }
    }

    fn pull(&mut self) -> Result<Option<FileEntry>> {
        if let Some(err) = self.deferred.take() {
            return Err(err);
        }
        if self.state == CursorState::Closed {
            return Ok(None);
        }
        let current = self.next.take();
        match self.advance() {
            Ok(Some(entry)) => self.next = Some(entry),
            Ok(None) => self.close(),
            Err(err) => {
                warn!(listing = self.listing.label(), error = %err, "cursor.advance.failed");
                self.close();
                if current.is_none() {
                    return Err(err);
                }
                self.deferred = Some(err);
            }
        }
        Ok(current)
    }

    fn close(&mut self) {
        if self.state == CursorState::Closed {
            return;
        }
        self.state = CursorState::Closed;
        self.next = None;
        let Some(tree) = self.tree.take() else {
            return;
        };
        if let Err(err) = self.listing.close_internal(&tree) {
            warn!(listing = self.listing.label(), error = %err, "cursor.close.internal_failed");
        }
        if let Err(err) = tree.release() {
            warn!(listing = self.listing.label(), error = %err, "cursor.close.release_failed");
        }
        debug!(listing = self.listing.label(), "cursor.close");
    }
}

fn accepts(filter: Option<&NameFilter>, entry: &FileEntry) -> bool {
    let name = entry.name.as_str();
    if name == "." || name == ".." {
        return false;
    }
    let Some(filter) = filter else {
        return true;
    };
    match filter(name) {
        Ok(accepted) => accepted,
        Err(err) => {
            error!(name, error = %err, "cursor.filter.failed");
            false
        }
    }
}

/// Lazy, single-pass, closeable sequence of listing entries.
///
/// Opening buffers one page and computes one entry ahead; later pages are
/// fetched as the caller pulls. The cursor holds one reference on the tree
/// handle and releases it exactly once, on exhaustion, explicit close,
/// drop, or when opening fails. A closed cursor never issues requests.
pub struct Cursor<L: PagedListing> {
    core: Arc<Mutex<CursorCore<L>>>,
}

impl<L: PagedListing> std::fmt::Debug for Cursor<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor").finish_non_exhaustive()
    }
}

impl<L: PagedListing> Cursor<L> {
    /// Acquires the tree from `connection` and opens `listing` on it.
    pub fn open(
        connection: &Arc<TreeConnection>,
        listing: L,
        filter: Option<NameFilter>,
    ) -> Result<Self> {
        let tree = connection.acquire()?;
        let mut core = CursorCore {
            listing,
            tree: Some(tree),
            filter,
            index: 0,
            next: None,
            deferred: None,
            state: CursorState::Opening,
        };
        if let Err(err) = core.start() {
            debug!(listing = core.listing.label(), error = %err, "cursor.open.failed");
            core.close();
            return Err(err);
        }
        Ok(Self {
            core: Arc::new(Mutex::new(core)),
        })
    }

    /// Returns the next entry, `Ok(None)` once the listing is finished.
    pub fn next_entry(&mut self) -> Result<Option<FileEntry>> {
        self.core.lock().pull()
    }

    /// Releases server state and the tree reference; idempotent.
    pub fn close(&self) {
        self.core.lock().close();
    }

    /// Handle that can close this cursor from another thread.
    pub fn closer(&self) -> CursorCloser
    where
        L: 'static,
    {
        CursorCloser {
            core: self.core.clone(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CursorState {
        self.core.lock().state
    }

    /// Whether cleanup already ran.
    pub fn is_closed(&self) -> bool {
        self.state() == CursorState::Closed
    }
}

impl<L: PagedListing> Iterator for Cursor<L> {
    type Item = Result<FileEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

impl<L: PagedListing> Drop for Cursor<L> {
    fn drop(&mut self) {
        self.core.lock().close();
    }
}

trait Closeable: Send {
    fn close(&mut self);
}

impl<L: PagedListing> Closeable for CursorCore<L> {
    fn close(&mut self) {
        CursorCore::close(self);
    }
}

/// Cloneable close capability detached from a [`Cursor`].
///
/// Closing through either side runs cleanup once.
#[derive(Clone)]
pub struct CursorCloser {
    core: Arc<Mutex<dyn Closeable>>,
}

impl CursorCloser {
    /// Closes the cursor; later pulls return `Ok(None)`.
    pub fn close(&self) {
        self.core.lock().close();
    }
}
