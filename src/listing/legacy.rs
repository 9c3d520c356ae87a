use tracing::debug;

use super::cursor::PagedListing;
use super::ResourceLocator;
use crate::config::ClientConfig;
use crate::protocol::{FileEntry, FindFirst2, FindNext2, FindResponse, Request, Response, SendFlags};
use crate::tree::TreeHandle;
use crate::types::{NtStatus, Result, SearchId, SmbError};

/// Directory listing over a server-side search handle.
///
/// `FIND_FIRST2` opens the search, `FIND_NEXT2` continues from the resume
/// key and last name of the previous page, `FIND_CLOSE2` drops the search.
pub struct LegacyListing {
    path: String,
    pattern: String,
    search_attributes: u16,
    max_items: u16,
    max_buffer: u32,
    sid: Option<SearchId>,
    resume_key: u32,
    last_name: String,
    end_of_search: bool,
    page: Vec<FileEntry>,
}

impl LegacyListing {
    /// Prepares a listing of `locator`; nothing is sent yet.
    pub fn new(
        locator: &ResourceLocator,
        pattern: &str,
        search_attributes: u16,
        config: &ClientConfig,
    ) -> Result<Self> {
        locator.check_directory_separators()?;
        Ok(Self {
            path: locator.unc_path().to_string(),
            pattern: pattern.to_string(),
            search_attributes,
            max_items: config.list_count,
            max_buffer: config.list_size,
            sid: None,
            resume_key: 0,
            last_name: String::new(),
            end_of_search: false,
            page: Vec::new(),
        })
    }

    /// Search handle, once the first page was received.
    pub fn sid(&self) -> Option<SearchId> {
        self.sid
    }

    fn accept_page(&mut self, response: FindResponse) {
        self.resume_key = response.resume_key;
        self.last_name = response.last_name;
        self.end_of_search = response.end_of_search;
        self.page = response.entries;
    }
}

fn find_response(response: Response) -> Result<FindResponse> {
    match response {
        Response::Find(find) => Ok(find),
        _ => Err(SmbError::Protocol("unexpected reply to TRANS2_FIND")),
    }
}

impl PagedListing for LegacyListing {
    fn open(&mut self, tree: &TreeHandle) -> Result<bool> {
        let request = Request::FindFirst2(FindFirst2 {
            path: self.path.clone(),
            pattern: self.pattern.clone(),
            search_attributes: self.search_attributes,
            max_items: self.max_items,
            max_buffer: self.max_buffer,
        });
        let response = match tree.send(&request, SendFlags::NONE) {
            Ok(response) => find_response(response)?,
            Err(err) if err.ends_listing() => {
                debug!(path = %self.path, "find_first2.no_match");
                return Ok(false);
            }
            Err(err) => return Err(err),
        };
        if response.status.ends_listing() {
            return Ok(false);
        }
        self.sid = Some(response.sid);
        self.accept_page(response);
        Ok(!self.page.is_empty())
    }

    fn results(&self) -> &[FileEntry] {
        &self.page
    }

    fn is_done(&self) -> bool {
        self.end_of_search
    }

    fn fetch_more(&mut self, tree: &TreeHandle) -> Result<bool> {
        let Some(sid) = self.sid else {
            return Ok(false);
        };
        let request = Request::FindNext2(FindNext2 {
            sid,
            resume_key: self.resume_key,
            last_name: self.last_name.clone(),
            max_items: self.max_items,
            max_buffer: self.max_buffer,
        });
        let response = match tree.send(&request, SendFlags::NONE) {
            Ok(response) => find_response(response)?,
            Err(err) if err.status() == Some(NtStatus::NO_MORE_FILES) => return Ok(false),
            Err(err) => return Err(err),
        };
        if response.status == NtStatus::NO_MORE_FILES {
            return Ok(false);
        }
        self.accept_page(response);
        Ok(!self.page.is_empty())
    }

    fn close_internal(&mut self, tree: &TreeHandle) -> Result<()> {
        let Some(sid) = self.sid.take() else {
            return Ok(());
        };
        if let Err(err) = tree.send(&Request::FindClose2 { sid }, SendFlags::NO_RETRY) {
            debug!(sid = sid.0, error = %err, "find_close2.failed");
        }
        Ok(())
    }

    fn label(&self) -> &'static str {
        "legacy"
    }
}
