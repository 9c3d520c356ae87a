use tracing::debug;

use super::cursor::PagedListing;
use crate::config::ClientConfig;
use crate::protocol::{
    server_types, FileEntry, NetServerEnum, Request, Response, SendFlags, ServerEnumCommand,
    ServerListResponse,
};
use crate::tree::TreeHandle;
use crate::types::{Result, SmbError, WinError};

/// Server or domain discovery through the RAP `NetServerEnum` family.
///
/// A partial page (`ERROR_MORE_DATA`) holds one record more than can be
/// handed out: its last record is the resume point. Workgroup-scoped
/// listings continue with `NetServerEnum3` from that name.
pub struct ServerListing {
    request: NetServerEnum,
    workgroup: bool,
    status: WinError,
    page: Vec<FileEntry>,
}

impl ServerListing {
    /// Lists the domains visible from `oem_domain`.
    pub fn domains(oem_domain: &str, config: &ClientConfig) -> Self {
        Self::new(oem_domain, server_types::SV_TYPE_DOMAIN_ENUM, true, config)
    }

    /// Lists every server of `workgroup`.
    pub fn workgroup(workgroup: &str, config: &ClientConfig) -> Self {
        Self::new(workgroup, server_types::SV_TYPE_ALL, true, config)
    }

    /// Lists servers of `domain` matching the `types` mask.
    ///
    /// Only workgroup-scoped listings may be continued past a partial page.
    pub fn new(domain: &str, types: u32, workgroup: bool, config: &ClientConfig) -> Self {
        Self {
            request: NetServerEnum {
                command: ServerEnumCommand::NetServerEnum2,
                domain: domain.to_string(),
                server_types: types,
                last_name: None,
                max_buffer: config.list_size,
            },
            workgroup,
            status: WinError::SUCCESS,
            page: Vec::new(),
        }
    }

    fn exchange(&mut self, tree: &TreeHandle) -> Result<()> {
        let request = Request::NetServerEnum(self.request.clone());
        let response = match tree.send(&request, SendFlags::NONE)? {
            Response::ServerList(list) => list,
            _ => return Err(SmbError::Protocol("unexpected reply to NetServerEnum")),
        };
        let ServerListResponse { status, entries } = response;
        match status {
            WinError::SERVICE_NOT_INSTALLED => {
                return Err(SmbError::Unsupported("server browsing service not installed"))
            }
            WinError::SUCCESS | WinError::MORE_DATA => {}
            other => return Err(SmbError::Rap(other)),
        }
        debug!(
            command = ?self.request.command,
            domain = %self.request.domain,
            records = entries.len(),
            status = %status,
            "server_enum.page"
        );
        self.status = status;
        self.page = entries.iter().map(|info| info.to_entry()).collect();
        Ok(())
    }

    fn more_data(&self) -> bool {
        self.status == WinError::MORE_DATA
    }
}

impl PagedListing for ServerListing {
    fn open(&mut self, tree: &TreeHandle) -> Result<bool> {
        self.exchange(tree)?;
        Ok(!self.page.is_empty())
    }

    fn results(&self) -> &[FileEntry] {
        if self.more_data() {
            let usable = self.page.len().saturating_sub(1);
            &self.page[..usable]
        } else {
            &self.page
        }
    }

    fn is_done(&self) -> bool {
        !self.more_data()
    }

    fn fetch_more(&mut self, tree: &TreeHandle) -> Result<bool> {
        if !self.workgroup {
            return Err(SmbError::Invalid(
                "server listing continuation requires a workgroup".into(),
            ));
        }
        let Some(resume) = self.page.last().map(|last| last.name.clone()) else {
            return Err(SmbError::Protocol("partial server list without a resume name"));
        };
        self.request.command = ServerEnumCommand::NetServerEnum3;
        self.request.last_name = Some(resume.clone());
        self.exchange(tree)?;
        let stalled = self.page.last().map(|last| last.name.as_str()) == Some(resume.as_str());
        if self.more_data() && stalled {
            return Err(SmbError::Protocol("server list continuation made no progress"));
        }
        Ok(true)
    }

    fn close_internal(&mut self, _tree: &TreeHandle) -> Result<()> {
        Ok(())
    }

    fn label(&self) -> &'static str {
        "servers"
    }
}
