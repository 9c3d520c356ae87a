//! NT status and RAP (Win32) status codes.
//!
//! Both are thin newtypes over the raw wire value so that codes the client
//! has no name for still round-trip intact into errors and logs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 32-bit NTSTATUS value returned in every SMB response header.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NtStatus(pub u32);

impl NtStatus {
    /// Success.
    pub const SUCCESS: NtStatus = NtStatus(0x0000_0000);
    /// Pending.
    pub const PENDING: NtStatus = NtStatus(0x0000_0103);
    /// Buffer overflow (warning, partial data returned).
    pub const BUFFER_OVERFLOW: NtStatus = NtStatus(0x8000_0005);
    /// No more files matched the search.
    pub const NO_MORE_FILES: NtStatus = NtStatus(0x8000_0006);
    /// Invalid handle.
    pub const INVALID_HANDLE: NtStatus = NtStatus(0xC000_0008);
    /// Invalid parameter.
    pub const INVALID_PARAMETER: NtStatus = NtStatus(0xC000_000D);
    /// No file matched the search pattern.
    pub const NO_SUCH_FILE: NtStatus = NtStatus(0xC000_000F);
    /// Access denied.
    pub const ACCESS_DENIED: NtStatus = NtStatus(0xC000_0022);
    /// Object name invalid.
    pub const OBJECT_NAME_INVALID: NtStatus = NtStatus(0xC000_0033);
    /// Object name not found.
    pub const OBJECT_NAME_NOT_FOUND: NtStatus = NtStatus(0xC000_0034);
    /// Object path not found.
    pub const OBJECT_PATH_NOT_FOUND: NtStatus = NtStatus(0xC000_003A);
    /// Sharing violation.
    pub const SHARING_VIOLATION: NtStatus = NtStatus(0xC000_0043);
    /// Request not supported.
    pub const NOT_SUPPORTED: NtStatus = NtStatus(0xC000_00BB);
    /// Network name deleted (tree connect gone).
    pub const NETWORK_NAME_DELETED: NtStatus = NtStatus(0xC000_00C9);
    /// Bad network name (share not found).
    pub const BAD_NETWORK_NAME: NtStatus = NtStatus(0xC000_00CC);
    /// Not a directory.
    pub const NOT_A_DIRECTORY: NtStatus = NtStatus(0xC000_0103);
    /// File closed.
    pub const FILE_CLOSED: NtStatus = NtStatus(0xC000_0128);
    /// User session deleted.
    pub const USER_SESSION_DELETED: NtStatus = NtStatus(0xC000_0203);
    /// Transport connection disconnected.
    pub const CONNECTION_DISCONNECTED: NtStatus = NtStatus(0xC000_020C);
    /// Network session expired.
    pub const NETWORK_SESSION_EXPIRED: NtStatus = NtStatus(0xC000_035C);

    /// Returns true for success and informational codes.
    pub fn is_success(self) -> bool {
        self.0 < 0x4000_0000
    }

    /// Returns true for warning-class codes (`0x8xxxxxxx`).
    pub fn is_warning(self) -> bool {
        (0x8000_0000..0xC000_0000).contains(&self.0)
    }

    /// Returns true for error-class codes (`0xCxxxxxxx`).
    pub fn is_error(self) -> bool {
        self.0 >= 0xC000_0000
    }

    /// Statuses that terminate a directory listing without being a fault.
    pub fn ends_listing(self) -> bool {
        self == Self::NO_MORE_FILES || self == Self::NO_SUCH_FILE
    }

    /// Statuses after which the tree connection can no longer be used.
    pub fn drops_connection(self) -> bool {
        matches!(
            self,
            Self::NETWORK_NAME_DELETED
                | Self::USER_SESSION_DELETED
                | Self::CONNECTION_DISCONNECTED
                | Self::NETWORK_SESSION_EXPIRED
        )
    }

    /// Symbolic name, if the code is known.
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::SUCCESS => "STATUS_SUCCESS",
            Self::PENDING => "STATUS_PENDING",
            Self::BUFFER_OVERFLOW => "STATUS_BUFFER_OVERFLOW",
            Self::NO_MORE_FILES => "STATUS_NO_MORE_FILES",
            Self::INVALID_HANDLE => "STATUS_INVALID_HANDLE",
            Self::INVALID_PARAMETER => "STATUS_INVALID_PARAMETER",
            Self::NO_SUCH_FILE => "STATUS_NO_SUCH_FILE",
            Self::ACCESS_DENIED => "STATUS_ACCESS_DENIED",
            Self::OBJECT_NAME_INVALID => "STATUS_OBJECT_NAME_INVALID",
            Self::OBJECT_NAME_NOT_FOUND => "STATUS_OBJECT_NAME_NOT_FOUND",
            Self::OBJECT_PATH_NOT_FOUND => "STATUS_OBJECT_PATH_NOT_FOUND",
            Self::SHARING_VIOLATION => "STATUS_SHARING_VIOLATION",
            Self::NOT_SUPPORTED => "STATUS_NOT_SUPPORTED",
            Self::NETWORK_NAME_DELETED => "STATUS_NETWORK_NAME_DELETED",
            Self::BAD_NETWORK_NAME => "STATUS_BAD_NETWORK_NAME",
            Self::NOT_A_DIRECTORY => "STATUS_NOT_A_DIRECTORY",
            Self::FILE_CLOSED => "STATUS_FILE_CLOSED",
            Self::USER_SESSION_DELETED => "STATUS_USER_SESSION_DELETED",
            Self::CONNECTION_DISCONNECTED => "STATUS_CONNECTION_DISCONNECTED",
            Self::NETWORK_SESSION_EXPIRED => "STATUS_NETWORK_SESSION_EXPIRED",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} (0x{:08X})", self.0),
            None => write!(f, "0x{:08X}", self.0),
        }
    }
}

impl fmt::Debug for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Win32 status carried by RAP transactions (server and share enumeration).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WinError(pub u32);

impl WinError {
    /// Success.
    pub const SUCCESS: WinError = WinError(0);
    /// Access denied.
    pub const ACCESS_DENIED: WinError = WinError(5);
    /// Request not accepted.
    pub const REQ_NOT_ACCEP: WinError = WinError(71);
    /// Partial result; more entries are available.
    pub const MORE_DATA: WinError = WinError(234);
    /// The browser service is not installed on the server.
    pub const SERVICE_NOT_INSTALLED: WinError = WinError(2184);
    /// No browser servers found.
    pub const NO_BROWSER_SERVERS_FOUND: WinError = WinError(6118);

    /// Symbolic name, if the code is known.
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::SUCCESS => "ERROR_SUCCESS",
            Self::ACCESS_DENIED => "ERROR_ACCESS_DENIED",
            Self::REQ_NOT_ACCEP => "ERROR_REQ_NOT_ACCEP",
            Self::MORE_DATA => "ERROR_MORE_DATA",
            Self::SERVICE_NOT_INSTALLED => "ERROR_SERVICE_NOT_INSTALLED",
            Self::NO_BROWSER_SERVERS_FOUND => "ERROR_NO_BROWSER_SERVERS_FOUND",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for WinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} ({})", self.0),
            None => write!(f, "win32 error {}", self.0),
        }
    }
}

impl fmt::Debug for WinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
