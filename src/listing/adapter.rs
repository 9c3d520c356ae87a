use tracing::{error, warn};

use super::cursor::{Cursor, PagedListing};
use super::{LocatorKind, ResourceLocator};
use crate::protocol::{attrs, EntryKind, FileEntry};
use crate::tree::TreeHandle;
use crate::types::Result;

/// Closeable stream of raw listing entries.
pub trait EntrySource: Iterator<Item = Result<FileEntry>> {
    /// Stops the stream and releases whatever it holds.
    fn close(&self);
}

impl<L: PagedListing> EntrySource for Cursor<L> {
    fn close(&self) {
        Cursor::close(self);
    }
}

/// Turns a raw entry into a resource.
pub type ResourceAdapter<R> = Box<dyn FnMut(FileEntry) -> Result<R> + Send>;

/// Predicate evaluated on each adapted resource.
pub type ResourceFilter<R> = Box<dyn Fn(&R) -> Result<bool> + Send + Sync>;

/// Lazily adapts and filters the entries of an [`EntrySource`].
///
/// Entries that fail to adapt, or whose resource the filter rejects or
/// fails on, are skipped; rejected resources are dropped before the next
/// entry is pulled. Errors of the source itself are passed through.
pub struct ResourceCursor<S: EntrySource, R> {
    source: S,
    adapt: ResourceAdapter<R>,
    filter: Option<ResourceFilter<R>>,
    tree: Option<TreeHandle>,
}

impl<S: EntrySource, R> ResourceCursor<S, R> {
    /// Wraps `source`.
    pub fn new(source: S, adapt: ResourceAdapter<R>, filter: Option<ResourceFilter<R>>) -> Self {
        Self {
            source,
            adapt,
            filter,
            tree: None,
        }
    }

    /// Keeps a reference on `tree` until this cursor is closed, so that
    /// resources adapted after the source ran dry can still bind to it.
    pub fn holding(mut self, tree: TreeHandle) -> Self {
        self.tree = Some(tree);
        self
    }

    /// The wrapped entry source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Closes the source and drops the held tree reference; idempotent.
    pub fn close(&mut self) {
        self.source.close();
        if let Some(tree) = self.tree.take() {
            if let Err(err) = tree.release() {
                warn!(error = %err, "resources.close.release_failed");
            }
        }
    }
}

impl<S: EntrySource, R> Iterator for ResourceCursor<S, R> {
    type Item = Result<R>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.source.next()? {
                Ok(entry) => entry,
                Err(err) => return Some(Err(err)),
            };
            if entry.name == "." || entry.name == ".." {
                continue;
            }
            let name = entry.name.clone();
            let resource = match (self.adapt)(entry) {
                Ok(resource) => resource,
                Err(err) => {
                    error!(name, error = %err, "resources.adapt.failed");
                    continue;
                }
            };
            let Some(filter) = &self.filter else {
                return Some(Ok(resource));
            };
            match filter(&resource) {
                Ok(true) => return Some(Ok(resource)),
                Ok(false) => {}
                Err(err) => error!(name, error = %err, "resources.filter.failed"),
            }
        }
    }
}

impl<S: EntrySource, R> Drop for ResourceCursor<S, R> {
    fn drop(&mut self) {
        self.close();
    }
}

/// A listed remote file, directory, share, server or workgroup.
///
/// Holds a reference on the tree it was listed through until dropped.
pub struct RemoteResource {
    locator: ResourceLocator,
    entry: FileEntry,
    tree: Option<TreeHandle>,
}

impl RemoteResource {
    /// Builds the child of `parent` described by `entry`.
    ///
    /// Fails when the name cannot be part of a path or `tree` is closed.
    pub fn child_of(parent: &ResourceLocator, tree: &TreeHandle, entry: FileEntry) -> Result<Self> {
        let locator = parent.child(&entry)?;
        let tree = tree.acquire()?;
        Ok(Self {
            locator,
            entry,
            tree: Some(tree),
        })
    }

    /// Address of the resource.
    pub fn locator(&self) -> &ResourceLocator {
        &self.locator
    }

    /// `smb://` URL; directories end with `/`.
    pub fn url(&self) -> &str {
        self.locator.url()
    }

    /// Entry name as returned by the server.
    pub fn name(&self) -> &str {
        &self.entry.name
    }

    /// Listing entry the resource was built from.
    pub fn entry(&self) -> &FileEntry {
        &self.entry
    }

    /// Kind reported by the listing.
    pub fn kind(&self) -> EntryKind {
        self.entry.kind
    }

    /// Whether the resource can itself be listed.
    pub fn is_container(&self) -> bool {
        !matches!(self.locator.kind(), LocatorKind::File)
    }

    /// Whether the hidden attribute is set.
    pub fn is_hidden(&self) -> bool {
        self.entry.attributes & attrs::HIDDEN != 0
    }

    /// Tree reference held by this resource.
    pub fn tree(&self) -> Option<&TreeHandle> {
        self.tree.as_ref()
    }
}

impl Drop for RemoteResource {
    fn drop(&mut self) {
        if let Some(tree) = self.tree.take() {
            if let Err(err) = tree.release() {
                warn!(url = %self.locator, error = %err, "resource.release_failed");
            }
        }
    }
}
