//! Lazy remote enumeration.
//!
//! Every listing is a [`Cursor`] driving one protocol binding through the
//! [`PagedListing`] hooks. [`list`] picks the binding for a
//! [`ResourceLocator`]:
//!
//! | locator | binding |
//! |---|---|
//! | root (`smb://`) | [`ServerListing`] over domains |
//! | workgroup | [`ServerListing`] over its servers |
//! | server | [`ShareListing`] |
//! | share or directory | [`LegacyListing`] or [`ModernListing`] by dialect |
//!
//! [`list_resources`] layers a [`ResourceCursor`] on top that turns entries
//! into [`RemoteResource`]s.

use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::protocol::{attrs, EntryKind, FileEntry};
use crate::tree::{TreeConnection, TreeHandle};
use crate::types::{Dialect, Result, SmbError};

mod adapter;
mod cursor;
mod legacy;
mod modern;
mod servers;
mod shares;

pub use adapter::{EntrySource, RemoteResource, ResourceAdapter, ResourceCursor, ResourceFilter};
pub use cursor::{Cursor, CursorCloser, CursorState, NameFilter, PagedListing};
pub use legacy::LegacyListing;
pub use modern::ModernListing;
pub use servers::ServerListing;
pub use shares::ShareListing;

/// What a [`ResourceLocator`] points at.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum LocatorKind {
    /// `smb://`: the domains visible on the network.
    Root,
    /// A workgroup or domain.
    Workgroup,
    /// A server.
    Server,
    /// The root of a share.
    Share,
    /// A directory inside a share.
    Directory,
    /// A file inside a share.
    File,
}

/// Address of a remote resource in both notations.
///
/// `unc_path` is share-relative and uses `\` (`\dir\sub\`); `url` is the
/// full `smb://` form and uses `/`.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ResourceLocator {
    kind: LocatorKind,
    host: String,
    share: Option<String>,
    unc_path: String,
    url: String,
}

impl ResourceLocator {
    /// `smb://`.
    pub fn root() -> Self {
        Self::with_paths(LocatorKind::Root, "", None, "\\", "smb://")
    }

    /// `smb://<name>/` naming a workgroup.
    pub fn workgroup(name: &str) -> Self {
        Self::with_paths(LocatorKind::Workgroup, name, None, "\\", &format!("smb://{name}/"))
    }

    /// `smb://<host>/`.
    pub fn server(host: &str) -> Self {
        Self::with_paths(LocatorKind::Server, host, None, "\\", &format!("smb://{host}/"))
    }

    /// `smb://<host>/<share>/`.
    pub fn share(host: &str, share: &str) -> Self {
        Self::with_paths(
            LocatorKind::Share,
            host,
            Some(share),
            "\\",
            &format!("smb://{host}/{share}/"),
        )
    }

    /// Resource at `path` inside a share; a trailing `/` marks a directory.
    pub fn path(host: &str, share: &str, path: &str) -> Self {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Self::share(host, share);
        }
        let directory = path.ends_with('/');
        let mut unc = format!("\\{}", trimmed.replace('/', "\\"));
        let mut url = format!("smb://{host}/{share}/{trimmed}");
        if directory {
            unc.push('\\');
            url.push('/');
        }
        let kind = if directory {
            LocatorKind::Directory
        } else {
            LocatorKind::File
        };
        Self::with_paths(kind, host, Some(share), &unc, &url)
    }

    /// Locator from explicit parts; no normalisation is applied.
    pub fn with_paths(
        kind: LocatorKind,
        host: &str,
        share: Option<&str>,
        unc_path: &str,
        url: &str,
    ) -> Self {
        Self {
            kind,
            host: host.to_string(),
            share: share.map(str::to_string),
            unc_path: unc_path.to_string(),
            url: url.to_string(),
        }
    }

    /// What the locator points at.
    pub fn kind(&self) -> LocatorKind {
        self.kind
    }

    /// Server, workgroup or empty for the root.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Share name, for locators inside a share.
    pub fn share_name(&self) -> Option<&str> {
        self.share.as_deref()
    }

    /// Share-relative path in `\` notation.
    pub fn unc_path(&self) -> &str {
        &self.unc_path
    }

    /// `smb://` URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fails unless both notations carry their trailing separator.
    pub fn check_directory_separators(&self) -> Result<()> {
        if !self.unc_path.ends_with('\\') {
            return Err(SmbError::Invalid(format!(
                "UNC path of a listed directory must end with '\\': {}",
                self.unc_path
            )));
        }
        if !self.url.ends_with('/') {
            return Err(SmbError::Invalid(format!(
                "URL of a listed directory must end with '/': {}",
                self.url
            )));
        }
        Ok(())
    }

    /// Locator of `entry` as found by listing `self`.
    pub fn child(&self, entry: &FileEntry) -> Result<Self> {
        let name = entry.name.as_str();
        if name.is_empty() || name.contains(['/', '\\', '\0']) {
            return Err(SmbError::Invalid(format!("unusable entry name {name:?}")));
        }
        let child = match (self.kind, entry.kind) {
            (LocatorKind::Root | LocatorKind::Workgroup, EntryKind::Workgroup) => {
                Self::workgroup(name)
            }
            (LocatorKind::Root | LocatorKind::Workgroup, _) => Self::server(name),
            (LocatorKind::Server, _) => Self::share(&self.host, name),
            (LocatorKind::Share | LocatorKind::Directory, _) => {
                let (kind, unc_sep, url_sep) = if entry.is_directory() {
                    (LocatorKind::Directory, "\\", "/")
                } else {
                    (LocatorKind::File, "", "")
                };
                Self::with_paths(
                    kind,
                    &self.host,
                    self.share.as_deref(),
                    &format!("{}{name}{unc_sep}", self.unc_path),
                    &format!("{}{name}{url_sep}", self.url),
                )
            }
            (LocatorKind::File, _) => {
                return Err(SmbError::Invalid(format!("{} is not a directory", self.url)))
            }
        };
        Ok(child)
    }
}

impl fmt::Display for ResourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// Parameters of a listing.
pub struct ListOptions {
    /// Wildcard the server matches names against.
    pub pattern: String,
    /// `attrs` mask of directory entries to include.
    pub search_attributes: u16,
    /// Client-side name filter applied after `.`/`..` are skipped.
    pub name_filter: Option<NameFilter>,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            pattern: "*".to_string(),
            search_attributes: attrs::DEFAULT_SEARCH,
            name_filter: None,
        }
    }
}

impl ListOptions {
    /// Replaces the server-side wildcard.
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    /// Installs a client-side name filter.
    pub fn with_name_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&str) -> Result<bool> + Send + Sync + 'static,
    {
        self.name_filter = Some(Box::new(filter));
        self
    }
}

/// Binding selected by [`list`].
pub enum Listing {
    /// Legacy directory listing.
    Legacy(LegacyListing),
    /// Modern directory listing.
    Modern(ModernListing),
    /// Server or domain listing.
    Servers(ServerListing),
    /// Share listing.
    Shares(ShareListing),
}

impl Listing {
    fn binding(&self) -> &dyn PagedListing {
        match self {
            Listing::Legacy(listing) => listing,
            Listing::Modern(listing) => listing,
            Listing::Servers(listing) => listing,
            Listing::Shares(listing) => listing,
        }
    }

    fn binding_mut(&mut self) -> &mut dyn PagedListing {
        match self {
            Listing::Legacy(listing) => listing,
            Listing::Modern(listing) => listing,
            Listing::Servers(listing) => listing,
            Listing::Shares(listing) => listing,
        }
    }
}

impl PagedListing for Listing {
    fn open(&mut self, tree: &TreeHandle) -> Result<bool> {
        self.binding_mut().open(tree)
    }

    fn results(&self) -> &[FileEntry] {
        self.binding().results()
    }

    fn is_done(&self) -> bool {
        self.binding().is_done()
    }

    fn fetch_more(&mut self, tree: &TreeHandle) -> Result<bool> {
        self.binding_mut().fetch_more(tree)
    }

    fn close_internal(&mut self, tree: &TreeHandle) -> Result<()> {
        self.binding_mut().close_internal(tree)
    }

    fn label(&self) -> &'static str {
        self.binding().label()
    }
}

/// Cursor over raw entries of any listing.
pub type EntryCursor = Cursor<Listing>;

/// Opens a listing of `locator` on `connection`.
///
/// Directory locators are validated before anything is sent. An empty
/// listing yields a cursor that is already closed.
pub fn list(
    connection: &Arc<TreeConnection>,
    locator: &ResourceLocator,
    options: ListOptions,
) -> Result<EntryCursor> {
    let config = connection.context().config();
    let ListOptions {
        pattern,
        search_attributes,
        name_filter,
    } = options;
    let listing = match locator.kind() {
        LocatorKind::Root => {
            Listing::Servers(ServerListing::domains(connection.oem_domain(), config))
        }
        LocatorKind::Workgroup => {
            Listing::Servers(ServerListing::workgroup(locator.host(), config))
        }
        LocatorKind::Server => Listing::Shares(ShareListing::new()),
        LocatorKind::Share | LocatorKind::Directory => match connection.dialect() {
            Dialect::Smb1 => Listing::Legacy(LegacyListing::new(
                locator,
                &pattern,
                search_attributes,
                config,
            )?),
            Dialect::Smb2 => Listing::Modern(ModernListing::new(locator, &pattern, config)?),
        },
        LocatorKind::File => {
            return Err(SmbError::Invalid(format!("{locator} is not a directory")))
        }
    };
    Cursor::open(connection, listing, name_filter)
}

/// Opens a listing of `locator` yielding [`RemoteResource`]s.
///
/// `filter` sees each adapted resource; rejected ones are dropped at once.
pub fn list_resources(
    connection: &Arc<TreeConnection>,
    locator: &ResourceLocator,
    options: ListOptions,
    filter: Option<ResourceFilter<RemoteResource>>,
) -> Result<ResourceCursor<EntryCursor, RemoteResource>> {
    let tree = connection.acquire()?;
    let entries = match list(connection, locator, options) {
        Ok(entries) => entries,
        Err(err) => {
            if let Err(release_err) = tree.release() {
                warn!(error = %release_err, "resources.open.release_failed");
            }
            return Err(err);
        }
    };
    let parent = locator.clone();
    let bound = Arc::clone(&tree);
    let adapt: ResourceAdapter<RemoteResource> =
        Box::new(move |entry| RemoteResource::child_of(&parent, &bound, entry));
    Ok(ResourceCursor::new(entries, adapt, filter).holding(tree))
}
