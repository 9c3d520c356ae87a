use tracing::{debug, warn};

use super::cursor::PagedListing;
use super::ResourceLocator;
use crate::config::ClientConfig;
use crate::protocol::{
    query_flags, ChainedReply, FileEntry, QueryDirectoryRequest, QueryDirectoryResponse, Request,
    Response, SendFlags,
};
use crate::tree::{FileHandle, OpenParams, TreeHandle};
use crate::types::{NtStatus, Result, SmbError};

/// Directory listing over an open directory handle.
///
/// The first page comes from a compound CREATE + QUERY_DIRECTORY; later
/// pages resume after the file index of the last entry received. The
/// server only reports the end when a further query comes back empty.
pub struct ModernListing {
    path: String,
    pattern: String,
    output_buffer_length: u32,
    dir: Option<FileHandle>,
    page: Vec<FileEntry>,
}

impl ModernListing {
    /// Prepares a listing of `locator`; nothing is sent yet.
    pub fn new(locator: &ResourceLocator, pattern: &str, config: &ClientConfig) -> Result<Self> {
        locator.check_directory_separators()?;
        let buffer = u32::try_from(config.max_buffer_size).unwrap_or(u32::MAX);
        Ok(Self {
            path: locator.unc_path().trim_matches('\\').to_string(),
            pattern: pattern.to_string(),
            output_buffer_length: config.list_size.min(buffer),
            dir: None,
            page: Vec::new(),
        })
    }

    /// Directory handle, while the listing is open.
    pub fn directory(&self) -> Option<&FileHandle> {
        self.dir.as_ref()
    }

    fn query(&self, file_index: u32, flags: u8) -> QueryDirectoryRequest {
        QueryDirectoryRequest {
            fid: self.dir.as_ref().map(|dir| dir.resource().fid().clone()),
            pattern: self.pattern.clone(),
            flags,
            file_index,
            output_buffer_length: self.output_buffer_length,
        }
    }

    fn first_page(&mut self, query: Option<ChainedReply>) -> Result<bool> {
        let Some(query) = query else {
            return Err(SmbError::Protocol("compound reply is missing elements"));
        };
        if query.status.ends_listing() {
            debug!(path = %self.path, "query_directory.no_match");
            return Ok(false);
        }
        if query.status.is_error() {
            return Err(SmbError::Status(query.status));
        }
        let page = query_page(query.response)?;
        if page.status.ends_listing() {
            return Ok(false);
        }
        self.page = page.entries;
        Ok(!self.page.is_empty())
    }

    fn release_dir(&mut self) -> Result<()> {
        match self.dir.take() {
            Some(dir) => dir.release(),
            None => Ok(()),
        }
    }
}

fn query_page(reply: Option<Response>) -> Result<QueryDirectoryResponse> {
    match reply {
        Some(Response::QueryDirectory(page)) => Ok(page),
        _ => Err(SmbError::Protocol("unexpected reply to QUERY_DIRECTORY")),
    }
}

impl PagedListing for ModernListing {
    fn open(&mut self, tree: &TreeHandle) -> Result<bool> {
        let params = OpenParams::directory();
        let request = Request::Chain {
            requests: vec![
                Request::Create(params.to_request(&self.path)),
                Request::QueryDirectory(self.query(0, 0)),
            ],
        };
        let Response::Chain { replies } = tree.send(&request, SendFlags::NONE)? else {
            return Err(SmbError::Protocol("unexpected reply to compound CREATE"));
        };
        let mut replies = replies.into_iter();
        let Some(create) = replies.next() else {
            return Err(SmbError::Protocol("compound reply is missing elements"));
        };
        if !create.status.is_success() {
            return Err(SmbError::Status(create.status));
        }
        let fid = match create.response {
            Some(Response::Create(created)) => created.fid,
            _ => return Err(SmbError::Protocol("unexpected reply to CREATE")),
        };
        self.dir = Some(tree.adopt_file(fid, &self.path, params)?);

        // From here on the server holds an open handle.
        let first = self.first_page(replies.next());
        if first.is_err() {
            if let Err(close_err) = self.release_dir() {
                warn!(path = %self.path, error = %close_err, "query_directory.orphan_close_failed");
            }
        }
        first
    }

    fn results(&self) -> &[FileEntry] {
        &self.page
    }

    fn is_done(&self) -> bool {
        false
    }

    fn fetch_more(&mut self, tree: &TreeHandle) -> Result<bool> {
        if self.dir.is_none() {
            return Ok(false);
        }
        let Some(last) = self.page.last() else {
            return Ok(false);
        };
        let request =
            Request::QueryDirectory(self.query(last.file_index, query_flags::INDEX_SPECIFIED));
        let page = match tree.send(&request, SendFlags::NONE) {
            Ok(Response::QueryDirectory(page)) => page,
            Ok(_) => return Err(SmbError::Protocol("unexpected reply to QUERY_DIRECTORY")),
            Err(err) if err.status() == Some(NtStatus::NO_MORE_FILES) => return Ok(false),
            Err(err) => return Err(err),
        };
        if page.status == NtStatus::NO_MORE_FILES {
            return Ok(false);
        }
        self.page = page.entries;
        Ok(!self.page.is_empty())
    }

    fn close_internal(&mut self, _tree: &TreeHandle) -> Result<()> {
        self.release_dir()
    }

    fn label(&self) -> &'static str {
        "modern"
    }
}
