use std::collections::HashSet;

use super::cursor::PagedListing;
use crate::protocol::{FileEntry, Request, Response, SendFlags, ShareListResponse};
use crate::tree::TreeHandle;
use crate::types::{Result, SmbError, WinError};

/// Share discovery on one server through RAP `NetShareEnum`.
///
/// The server answers in a single page.
#[derive(Default)]
pub struct ShareListing {
    page: Vec<FileEntry>,
}

impl ShareListing {
    /// Prepares a share listing; nothing is sent yet.
    pub fn new() -> Self {
        Self::default()
    }
}

impl PagedListing for ShareListing {
    fn open(&mut self, tree: &TreeHandle) -> Result<bool> {
        let ShareListResponse { status, entries } =
            match tree.send(&Request::NetShareEnum, SendFlags::NONE)? {
                Response::ShareList(list) => list,
                _ => return Err(SmbError::Protocol("unexpected reply to NetShareEnum")),
            };
        match status {
            WinError::SUCCESS => {}
            WinError::SERVICE_NOT_INSTALLED => {
                return Err(SmbError::Unsupported("share enumeration not available"))
            }
            other => return Err(SmbError::Rap(other)),
        }
        let mut seen = HashSet::new();
        self.page = entries
            .iter()
            .filter(|info| seen.insert(info.name.clone()))
            .map(|info| info.to_entry())
            .collect();
        Ok(!self.page.is_empty())
    }

    fn results(&self) -> &[FileEntry] {
        &self.page
    }

    fn is_done(&self) -> bool {
        true
    }

    fn fetch_more(&mut self, _tree: &TreeHandle) -> Result<bool> {
        Ok(false)
    }

    fn close_internal(&mut self, _tree: &TreeHandle) -> Result<()> {
        Ok(())
    }

    fn label(&self) -> &'static str {
        "shares"
    }
}
