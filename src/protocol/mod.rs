//! Typed request/response model exchanged with a [`Transport`].
//!
//! Byte-level marshalling lives behind the transport; this layer only sees
//! the fields the handle and enumeration machinery reads or writes.

use serde::{Deserialize, Serialize};

use crate::types::{Dialect, FileId, NtStatus, Result, SearchId, TreeId, WinError};

/// File attribute bits (`FILE_ATTRIBUTE_*` / `SMB_FILE_ATTRIBUTE_*`).
pub mod attrs {
    /// Read-only.
    pub const READONLY: u32 = 0x01;
    /// Hidden.
    pub const HIDDEN: u32 = 0x02;
    /// System.
    pub const SYSTEM: u32 = 0x04;
    /// Volume label.
    pub const VOLUME: u32 = 0x08;
    /// Directory.
    pub const DIRECTORY: u32 = 0x10;
    /// Archive.
    pub const ARCHIVE: u32 = 0x20;
    /// Normal file with no other attributes.
    pub const NORMAL: u32 = 0x80;

    /// Default search attributes for directory listings.
    pub const DEFAULT_SEARCH: u16 = (DIRECTORY | HIDDEN | SYSTEM) as u16;
}

/// SMB2 QUERY_DIRECTORY flags.
pub mod query_flags {
    /// Restart the enumeration from the beginning.
    pub const RESTART_SCANS: u8 = 0x01;
    /// Return only a single entry.
    pub const RETURN_SINGLE_ENTRY: u8 = 0x02;
    /// Resume after the entry carrying the supplied file index.
    pub const INDEX_SPECIFIED: u8 = 0x04;
    /// Reopen the enumeration with a new pattern.
    pub const REOPEN: u8 = 0x10;
}

/// Access mask, share and create-option bits used when opening.
pub mod access {
    /// Read data / list directory.
    pub const FILE_READ_DATA: u32 = 0x0000_0001;
    /// Read attributes.
    pub const FILE_READ_ATTRIBUTES: u32 = 0x0000_0080;
    /// Share read.
    pub const FILE_SHARE_READ: u32 = 0x01;
    /// Share write.
    pub const FILE_SHARE_WRITE: u32 = 0x02;
    /// Share delete.
    pub const FILE_SHARE_DELETE: u32 = 0x04;
    /// Open only if the target exists.
    pub const FILE_OPEN: u32 = 0x01;
    /// Target must be a directory.
    pub const FILE_DIRECTORY_FILE: u32 = 0x0000_0001;
    /// Target must not be a directory.
    pub const FILE_NON_DIRECTORY_FILE: u32 = 0x0000_0040;
}

/// Server type bits for NetServerEnum.
pub mod server_types {
    /// All servers.
    pub const SV_TYPE_ALL: u32 = 0xFFFF_FFFF;
    /// Primary domains (workgroups).
    pub const SV_TYPE_DOMAIN_ENUM: u32 = 0x8000_0000;
}

/// Delivery markers accompanying a request.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SendFlags {
    /// Do not replay the request after a reconnect.
    pub no_retry: bool,
    /// Wait without the response timeout.
    pub no_timeout: bool,
}

impl SendFlags {
    /// Ordinary request.
    pub const NONE: SendFlags = SendFlags {
        no_retry: false,
        no_timeout: false,
    };
    /// Cleanup requests that must not be replayed on a fresh connection.
    pub const NO_RETRY: SendFlags = SendFlags {
        no_retry: true,
        no_timeout: false,
    };
}

/// Kind of resource a listing entry describes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// File or directory on a share.
    Filesystem,
    /// Workgroup or domain.
    Workgroup,
    /// Server.
    Server,
    /// Disk share.
    Share,
    /// Named pipe (IPC) share.
    NamedPipe,
    /// Printer share.
    Printer,
    /// Communication device share.
    Comm,
}

/// One entry of a listing page.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Entry name without any path component.
    pub name: String,
    /// What the entry refers to.
    pub kind: EntryKind,
    /// `attrs` bits.
    #[serde(default)]
    pub attributes: u32,
    /// Creation time, milliseconds since the Unix epoch.
    #[serde(default)]
    pub created: u64,
    /// Last write time, milliseconds since the Unix epoch.
    #[serde(default)]
    pub last_modified: u64,
    /// Last access time, milliseconds since the Unix epoch.
    #[serde(default)]
    pub last_access: u64,
    /// End-of-file size in bytes.
    #[serde(default)]
    pub size: u64,
    /// Server-assigned position used to resume SMB2 listings.
    #[serde(default)]
    pub file_index: u32,
}

impl FileEntry {
    /// Filesystem entry with the given name and attributes.
    pub fn file(name: impl Into<String>, attributes: u32) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Filesystem,
            attributes,
            created: 0,
            last_modified: 0,
            last_access: 0,
            size: 0,
            file_index: 0,
        }
    }

    /// Sets the resume index.
    pub fn with_index(mut self, file_index: u32) -> Self {
        self.file_index = file_index;
        self
    }

    /// Whether the directory attribute is set.
    pub fn is_directory(&self) -> bool {
        self.attributes & attrs::DIRECTORY != 0
    }
}

/// `TRANS2_FIND_FIRST2` parameters.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FindFirst2 {
    /// Directory UNC path, `\`-terminated.
    pub path: String,
    /// Wildcard pattern.
    pub pattern: String,
    /// Attribute mask of entries to include.
    pub search_attributes: u16,
    /// Maximum entries per response.
    pub max_items: u16,
    /// Maximum response data size.
    pub max_buffer: u32,
}

/// `TRANS2_FIND_NEXT2` parameters.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FindNext2 {
    /// Search handle from `FIND_FIRST2`.
    pub sid: SearchId,
    /// Resume key of the last entry seen.
    pub resume_key: u32,
    /// Name of the last entry seen.
    pub last_name: String,
    /// Maximum entries per response.
    pub max_items: u16,
    /// Maximum response data size.
    pub max_buffer: u32,
}

/// Reply to `FIND_FIRST2` / `FIND_NEXT2`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FindResponse {
    /// Status reported alongside the data.
    #[serde(default)]
    pub status: NtStatus,
    /// Search handle (only meaningful for `FIND_FIRST2`).
    #[serde(default = "default_sid")]
    pub sid: SearchId,
    /// Server closed the search after this page.
    #[serde(default)]
    pub end_of_search: bool,
    /// Resume key to continue after the last entry.
    #[serde(default)]
    pub resume_key: u32,
    /// Name of the last entry, used as resume point.
    #[serde(default)]
    pub last_name: String,
    /// Entries of this page.
    #[serde(default)]
    pub entries: Vec<FileEntry>,
}

fn default_sid() -> SearchId {
    SearchId(0)
}

/// SMB2 CREATE parameters.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CreateRequest {
    /// Share-relative path without leading or trailing `\`.
    pub path: String,
    /// Desired access mask.
    pub desired_access: u32,
    /// File attributes.
    pub file_attributes: u32,
    /// Share access.
    pub share_access: u32,
    /// Create disposition.
    pub create_disposition: u32,
    /// Create options.
    pub create_options: u32,
}

/// Reply to CREATE.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CreateResponse {
    /// Identifier of the opened file.
    pub fid: FileId,
    /// Attributes of the opened file.
    #[serde(default)]
    pub attributes: u32,
}

/// SMB2 QUERY_DIRECTORY parameters.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct QueryDirectoryRequest {
    /// Directory handle; `None` refers to the CREATE earlier in the chain.
    pub fid: Option<FileId>,
    /// Wildcard pattern.
    pub pattern: String,
    /// `query_flags` bits.
    pub flags: u8,
    /// Resume index, honoured with `INDEX_SPECIFIED`.
    pub file_index: u32,
    /// Maximum response size.
    pub output_buffer_length: u32,
}

/// Reply to QUERY_DIRECTORY.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct QueryDirectoryResponse {
    /// Status reported alongside the data.
    #[serde(default)]
    pub status: NtStatus,
    /// Entries of this page.
    #[serde(default)]
    pub entries: Vec<FileEntry>,
}

/// RAP sub-command used for server enumeration.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerEnumCommand {
    /// `NetServerEnum2`: first page.
    NetServerEnum2,
    /// `NetServerEnum3`: continuation from a resume name.
    NetServerEnum3,
}

/// `NetServerEnum2` / `NetServerEnum3` parameters.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NetServerEnum {
    /// Sub-command.
    pub command: ServerEnumCommand,
    /// Domain to enumerate.
    pub domain: String,
    /// `server_types` mask.
    pub server_types: u32,
    /// Name to resume after (`NetServerEnum3` only).
    pub last_name: Option<String>,
    /// Maximum response data size.
    pub max_buffer: u32,
}

/// Server record returned by NetServerEnum.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server or domain name.
    pub name: String,
    /// `server_types` bits describing the entry.
    #[serde(default)]
    pub server_type: u32,
    /// Free-form comment.
    #[serde(default)]
    pub comment: String,
}

impl ServerInfo {
    /// Converts the record into a listing entry.
    pub fn to_entry(&self) -> FileEntry {
        let kind = if self.server_type & server_types::SV_TYPE_DOMAIN_ENUM != 0 {
            EntryKind::Workgroup
        } else {
            EntryKind::Server
        };
        FileEntry {
            kind,
            ..FileEntry::file(self.name.clone(), attrs::READONLY | attrs::DIRECTORY)
        }
    }
}

/// Reply to NetServerEnum.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ServerListResponse {
    /// RAP status; `MORE_DATA` marks a partial page.
    #[serde(default)]
    pub status: WinError,
    /// Records of this page.
    #[serde(default)]
    pub entries: Vec<ServerInfo>,
}

/// Share record returned by NetShareEnum.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ShareInfo {
    /// Share name.
    pub name: String,
    /// `STYPE_*` value.
    #[serde(default)]
    pub share_type: u32,
    /// Free-form remark.
    #[serde(default)]
    pub remark: String,
}

impl ShareInfo {
    /// Converts the record into a listing entry.
    pub fn to_entry(&self) -> FileEntry {
        let kind = match self.share_type & 0xFFFF {
            1 => EntryKind::Printer,
            2 => EntryKind::Comm,
            3 => EntryKind::NamedPipe,
            _ => EntryKind::Share,
        };
        let mut attributes = attrs::READONLY | attrs::DIRECTORY;
        if self.name.ends_with('$') {
            attributes |= attrs::HIDDEN;
        }
        FileEntry {
            kind,
            ..FileEntry::file(self.name.clone(), attributes)
        }
    }
}

/// Reply to NetShareEnum.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ShareListResponse {
    /// RAP status.
    #[serde(default)]
    pub status: WinError,
    /// Records returned.
    #[serde(default)]
    pub entries: Vec<ShareInfo>,
}

/// Request handed to [`Transport::exchange`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Request {
    /// Connect to a share.
    TreeConnect {
        /// `\\host\share` path.
        path: String,
    },
    /// Disconnect the current tree.
    TreeDisconnect,
    /// Legacy first listing page.
    FindFirst2(FindFirst2),
    /// Legacy continuation page.
    FindNext2(FindNext2),
    /// Legacy search handle close.
    FindClose2 {
        /// Search handle to close.
        sid: SearchId,
    },
    /// Open a file or directory.
    Create(CreateRequest),
    /// Modern listing page.
    QueryDirectory(QueryDirectoryRequest),
    /// Close an open file.
    Close {
        /// File to close.
        fid: FileId,
    },
    /// Related requests sent as one compound exchange.
    Chain {
        /// Requests in send order.
        requests: Vec<Request>,
    },
    /// Server or domain enumeration.
    NetServerEnum(NetServerEnum),
    /// Share enumeration.
    NetShareEnum,
}

impl Request {
    /// Stable name of the request kind, used in logs and transcripts.
    pub fn kind(&self) -> &'static str {
        match self {
            Request::TreeConnect { .. } => "tree_connect",
            Request::TreeDisconnect => "tree_disconnect",
            Request::FindFirst2(_) => "find_first2",
            Request::FindNext2(_) => "find_next2",
            Request::FindClose2 { .. } => "find_close2",
            Request::Create(_) => "create",
            Request::QueryDirectory(_) => "query_directory",
            Request::Close { .. } => "close",
            Request::Chain { .. } => "chain",
            Request::NetServerEnum(_) => "net_server_enum",
            Request::NetShareEnum => "net_share_enum",
        }
    }
}

/// Per-request outcome inside a compound reply.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChainedReply {
    /// Status of this element.
    pub status: NtStatus,
    /// Body, present when the element succeeded.
    #[serde(default)]
    pub response: Option<Response>,
}

/// Reply produced by [`Transport::exchange`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Response {
    /// Tree connected.
    TreeConnect {
        /// Assigned tree id.
        tid: TreeId,
    },
    /// Reply without a body.
    Empty,
    /// Legacy listing page.
    Find(FindResponse),
    /// File opened.
    Create(CreateResponse),
    /// Modern listing page.
    QueryDirectory(QueryDirectoryResponse),
    /// Replies to a compound request, one per element.
    Chain {
        /// Outcomes in request order.
        replies: Vec<ChainedReply>,
    },
    /// Server enumeration page.
    ServerList(ServerListResponse),
    /// Share enumeration result.
    ShareList(ShareListResponse),
}

/// The `Send` capability: one synchronous protocol exchange.
///
/// Implementations fail with [`SmbError::Status`](crate::types::SmbError)
/// for non-success statuses and with `Io` for transport failures. A
/// compound request succeeds as a whole and reports per-element status in
/// [`Response::Chain`].
pub trait Transport: Send + Sync {
    /// Dialect negotiated on this transport.
    fn dialect(&self) -> Dialect;

    /// Sends `request` on tree `tid` and waits for the reply.
    ///
    /// `scratch` is a pooled buffer the transport may encode into.
    fn exchange(
        &self,
        tid: Option<TreeId>,
        request: &Request,
        flags: SendFlags,
        scratch: &mut [u8],
    ) -> Result<Response>;
}
