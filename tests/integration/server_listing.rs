#![allow(missing_docs)]

mod support;

use smbwalk::config::ClientConfig;
use smbwalk::listing::{list, Cursor, ListOptions, ResourceLocator, ServerListing};
use smbwalk::protocol::{
    server_types, EntryKind, NetServerEnum, Request, Response, ServerEnumCommand, ShareInfo,
    ShareListResponse,
};
use smbwalk::types::{Dialect, Result, SmbError, WinError};

use support::*;

fn server_requests(sent: &[smbwalk::replay::SentRequest]) -> Vec<NetServerEnum> {
    sent.iter()
        .filter_map(|sent| match &sent.request {
            Request::NetServerEnum(request) => Some(request.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn partial_workgroup_page_escalates_to_enum3_from_last_name() -> Result<()> {
    let (transport, connection) = connect(Dialect::Smb1, ClientConfig::default());
    transport
        .reply(
            "net_server_enum",
            servers(WinError::MORE_DATA, &["ALPHA", "BRAVO", "CHARLIE", "X"], 0x3),
        )
        .reply("net_server_enum", servers(WinError::SUCCESS, &["X", "YANKEE"], 0x3));

    let cursor = list(&connection, &ResourceLocator::workgroup("HOME"), ListOptions::default())?;
    assert_eq!(
        names(cursor)?,
        vec!["ALPHA", "BRAVO", "CHARLIE", "X", "YANKEE"]
    );

    let requests = server_requests(&transport.sent());
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].command, ServerEnumCommand::NetServerEnum2);
    assert_eq!(requests[0].domain, "HOME");
    assert_eq!(requests[0].server_types, server_types::SV_TYPE_ALL);
    assert_eq!(requests[0].last_name, None);
    assert_eq!(requests[1].command, ServerEnumCommand::NetServerEnum3);
    assert_eq!(requests[1].last_name.as_deref(), Some("X"));
    assert_eq!(transport.count("tree_disconnect"), 1);
    Ok(())
}

#[test]
fn continuation_that_repeats_the_resume_name_fails() -> Result<()> {
    let (transport, connection) = connect(Dialect::Smb1, ClientConfig::default());
    transport
        .reply("net_server_enum", servers(WinError::MORE_DATA, &["ALPHA", "X"], 0x3))
        .reply("net_server_enum", servers(WinError::MORE_DATA, &["X"], 0x3))
        .reply("net_server_enum", servers(WinError::MORE_DATA, &["X"], 0x3));

    let mut cursor = list(&connection, &ResourceLocator::workgroup("HOME"), ListOptions::default())?;
    assert_eq!(cursor.next_entry()?.map(|e| e.name), Some("ALPHA".to_string()));
    assert!(matches!(cursor.next_entry(), Err(SmbError::Protocol(_))));
    assert!(cursor.next_entry()?.is_none());

    assert_eq!(transport.count("net_server_enum"), 2);
    assert_eq!(transport.remaining(), 1);
    assert_eq!(transport.count("tree_disconnect"), 1);
    Ok(())
}

#[test]
fn root_listing_enumerates_domains_of_the_oem_domain() -> Result<()> {
    let (transport, connection) = connect(Dialect::Smb1, ClientConfig::default());
    transport.reply(
        "net_server_enum",
        servers(
            WinError::SUCCESS,
            &["WORKGROUP", "LAB"],
            server_types::SV_TYPE_DOMAIN_ENUM,
        ),
    );

    let entries: Vec<_> =
        list(&connection, &ResourceLocator::root(), ListOptions::default())?.collect::<Result<_>>()?;
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.kind == EntryKind::Workgroup));

    let requests = server_requests(&transport.sent());
    assert_eq!(requests[0].domain, "WORKGROUP");
    assert_eq!(requests[0].server_types, server_types::SV_TYPE_DOMAIN_ENUM);
    Ok(())
}

#[test]
fn missing_browser_service_is_unsupported() {
    let (transport, connection) = connect(Dialect::Smb1, ClientConfig::default());
    transport.reply(
        "net_server_enum",
        servers(WinError::SERVICE_NOT_INSTALLED, &[], 0),
    );

    let err = list(&connection, &ResourceLocator::workgroup("HOME"), ListOptions::default())
        .unwrap_err();
    assert!(matches!(err, SmbError::Unsupported(_)));
    assert_eq!(transport.count("tree_disconnect"), 1);
    assert!(connection.active_handle().is_none());
}

#[test]
fn other_rap_failures_carry_their_code() {
    let (transport, connection) = connect(Dialect::Smb1, ClientConfig::default());
    transport.reply("net_server_enum", servers(WinError::ACCESS_DENIED, &[], 0));

    let err = list(&connection, &ResourceLocator::workgroup("HOME"), ListOptions::default())
        .unwrap_err();
    assert!(matches!(err, SmbError::Rap(WinError::ACCESS_DENIED)));
}

#[test]
fn partial_page_outside_a_workgroup_is_a_usage_error() -> Result<()> {
    let (transport, connection) = connect(Dialect::Smb1, ClientConfig::default());
    transport.reply(
        "net_server_enum",
        servers(WinError::MORE_DATA, &["ONLY", "RESUME"], 0x3),
    );

    let listing = ServerListing::new("SRV", server_types::SV_TYPE_ALL, false, &ClientConfig::default());
    let mut cursor = Cursor::open(&connection, listing, None)?;
    assert_eq!(cursor.next_entry()?.map(|e| e.name), Some("ONLY".to_string()));
    assert!(matches!(cursor.next_entry(), Err(SmbError::Invalid(_))));
    assert!(cursor.next_entry()?.is_none());
    assert_eq!(transport.count("net_server_enum"), 1);
    Ok(())
}

#[test]
fn share_listing_dedupes_and_maps_types() -> Result<()> {
    let (transport, connection) = connect(Dialect::Smb2, ClientConfig::default());
    let share = |name: &str, share_type: u32| ShareInfo {
        name: name.to_string(),
        share_type,
        remark: String::new(),
    };
    transport.reply(
        "net_share_enum",
        Response::ShareList(ShareListResponse {
            status: WinError::SUCCESS,
            entries: vec![
                share("public", 0),
                share("IPC$", 3),
                share("public", 0),
                share("laser", 1),
            ],
        }),
    );

    let entries: Vec<_> = list(&connection, &ResourceLocator::server("srv"), ListOptions::default())?
        .collect::<Result<_>>()?;
    let summary: Vec<_> = entries.iter().map(|e| (e.name.as_str(), e.kind)).collect();
    assert_eq!(
        summary,
        vec![
            ("public", EntryKind::Share),
            ("IPC$", EntryKind::NamedPipe),
            ("laser", EntryKind::Printer),
        ]
    );
    assert_eq!(transport.count("net_share_enum"), 1);
    Ok(())
}

#[test]
fn share_listing_without_service_is_unsupported() {
    let (transport, connection) = connect(Dialect::Smb2, ClientConfig::default());
    transport.reply(
        "net_share_enum",
        Response::ShareList(ShareListResponse {
            status: WinError::SERVICE_NOT_INSTALLED,
            entries: Vec::new(),
        }),
    );
    let err = list(&connection, &ResourceLocator::server("srv"), ListOptions::default())
        .unwrap_err();
    assert!(matches!(err, SmbError::Unsupported(_)));
}
