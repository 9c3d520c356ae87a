#![allow(missing_docs)]

mod support;

use std::thread;

use smbwalk::config::ClientConfig;
use smbwalk::listing::{list, CursorState, ListOptions, LocatorKind, ResourceLocator};
use smbwalk::protocol::{query_flags, Request, Response};
use smbwalk::types::{Dialect, NtStatus, Result, SearchId, SmbError};

use support::*;

fn docs() -> ResourceLocator {
    ResourceLocator::path("srv", "data", "docs/")
}

#[test]
fn legacy_listing_spans_pages_with_one_continuation_and_one_close() -> Result<()> {
    let (transport, connection) = connect(Dialect::Smb1, paged(2));
    transport
        .reply("find_first2", find_page(7, files(&["A", "B"]), false))
        .reply("find_next2", find_page(7, files(&["C", "D", "E"]), true))
        .reply("find_close2", Response::Empty);

    let cursor = list(&connection, &docs(), ListOptions::default())?;
    assert_eq!(names(cursor)?, vec!["A", "B", "C", "D", "E"]);

    assert_eq!(
        transport.sent_kinds(),
        vec!["tree_connect", "find_first2", "find_next2", "find_close2", "tree_disconnect"]
    );
    let sent = transport.sent();
    match &sent[1].request {
        Request::FindFirst2(first) => {
            assert_eq!(first.path, "\\docs\\");
            assert_eq!(first.pattern, "*");
            assert_eq!(first.max_items, 2);
        }
        other => panic!("unexpected request {other:?}"),
    }
    match &sent[2].request {
        Request::FindNext2(next) => {
            assert_eq!(next.sid, SearchId(7));
            assert_eq!(next.resume_key, 2);
            assert_eq!(next.last_name, "B");
        }
        other => panic!("unexpected request {other:?}"),
    }
    assert!(sent[3].flags.no_retry);
    assert!(connection.active_handle().is_none());
    assert_eq!(transport.remaining(), 0);
    Ok(())
}

#[test]
fn legacy_no_such_file_yields_nothing_and_releases_tree() -> Result<()> {
    let (transport, connection) = connect(Dialect::Smb1, ClientConfig::default());
    transport.fail("find_first2", NtStatus::NO_SUCH_FILE);

    let mut cursor = list(&connection, &docs(), ListOptions::default())?;
    assert!(cursor.is_closed());
    assert!(cursor.next().is_none());
    assert_eq!(
        transport.sent_kinds(),
        vec!["tree_connect", "find_first2", "tree_disconnect"]
    );
    assert!(connection.active_handle().is_none());
    Ok(())
}

#[test]
fn legacy_no_more_files_in_reply_status_is_an_empty_listing() -> Result<()> {
    let (transport, connection) = connect(Dialect::Smb1, ClientConfig::default());
    let mut reply = find_page(3, Vec::new(), true);
    if let Response::Find(find) = &mut reply {
        find.status = NtStatus::NO_MORE_FILES;
    }
    transport.reply("find_first2", reply);

    let cursor = list(&connection, &docs(), ListOptions::default())?;
    assert!(names(cursor)?.is_empty());
    assert_eq!(transport.count("find_close2"), 0);
    assert_eq!(transport.count("tree_disconnect"), 1);
    Ok(())
}

#[test]
fn legacy_no_more_files_on_find_next_ends_gracefully() -> Result<()> {
    let (transport, connection) = connect(Dialect::Smb1, paged(2));
    transport
        .reply("find_first2", find_page(9, files(&["A", "B"]), false))
        .fail("find_next2", NtStatus::NO_MORE_FILES)
        .reply("find_close2", Response::Empty);

    let cursor = list(&connection, &docs(), ListOptions::default())?;
    assert_eq!(names(cursor)?, vec!["A", "B"]);
    assert_eq!(transport.count("find_close2"), 1);
    Ok(())
}

#[test]
fn dot_entries_are_skipped_before_the_name_filter() -> Result<()> {
    let (transport, connection) = connect(Dialect::Smb1, ClientConfig::default());
    transport
        .reply(
            "find_first2",
            find_page(1, files(&[".", "..", "a.txt", "b.tmp", "c.txt"]), true),
        )
        .reply("find_close2", Response::Empty);

    let options = ListOptions::default().with_name_filter(|name| {
        assert!(name != "." && name != "..");
        Ok(name.ends_with(".txt"))
    });
    let cursor = list(&connection, &docs(), options)?;
    assert_eq!(names(cursor)?, vec!["a.txt", "c.txt"]);
    Ok(())
}

#[test]
fn fully_filtered_page_does_not_truncate_the_listing() -> Result<()> {
    let (transport, connection) = connect(Dialect::Smb1, paged(2));
    transport
        .reply("find_first2", find_page(1, files(&["keep-1", "drop-1"]), false))
        .reply("find_next2", find_page(1, files(&["drop-2", "drop-3"]), false))
        .reply("find_next2", find_page(1, files(&["keep-2"]), true))
        .reply("find_close2", Response::Empty);

    let options = ListOptions::default().with_name_filter(|name| Ok(name.starts_with("keep")));
    let cursor = list(&connection, &docs(), options)?;
    assert_eq!(names(cursor)?, vec!["keep-1", "keep-2"]);
    assert_eq!(transport.count("find_next2"), 2);
    Ok(())
}

#[test]
fn missing_separator_fails_before_any_request() {
    let (transport, connection) = connect(Dialect::Smb1, ClientConfig::default());
    let bad = ResourceLocator::with_paths(
        LocatorKind::Directory,
        "srv",
        Some("data"),
        "\\docs\\",
        "smb://srv/data/docs",
    );
    let err = list(&connection, &bad, ListOptions::default()).unwrap_err();
    assert!(matches!(err, SmbError::Invalid(_)));
    assert!(transport.sent().is_empty());

    let (transport, connection) = connect(Dialect::Smb2, ClientConfig::default());
    let bad = ResourceLocator::with_paths(
        LocatorKind::Directory,
        "srv",
        Some("data"),
        "\\docs",
        "smb://srv/data/docs/",
    );
    assert!(list(&connection, &bad, ListOptions::default()).is_err());
    assert!(transport.sent().is_empty());
}

#[test]
fn continuation_failure_is_reported_after_the_fetched_entry() -> Result<()> {
    let (transport, connection) = connect(Dialect::Smb1, paged(2));
    transport
        .reply("find_first2", find_page(4, files(&["A", "B"]), false))
        .fail("find_next2", NtStatus::ACCESS_DENIED)
        .reply("find_close2", Response::Empty);

    let mut cursor = list(&connection, &docs(), ListOptions::default())?;
    assert_eq!(cursor.next_entry()?.map(|e| e.name), Some("A".to_string()));
    assert_eq!(cursor.next_entry()?.map(|e| e.name), Some("B".to_string()));
    assert!(cursor.is_closed());
    let err = cursor.next_entry().unwrap_err();
    assert_eq!(err.status(), Some(NtStatus::ACCESS_DENIED));
    assert!(cursor.next_entry()?.is_none());
    assert_eq!(transport.count("find_close2"), 1);
    assert_eq!(transport.count("tree_disconnect"), 1);
    Ok(())
}

#[test]
fn explicit_close_is_idempotent_and_stops_traffic() -> Result<()> {
    let (transport, connection) = connect(Dialect::Smb1, paged(2));
    transport
        .reply("find_first2", find_page(5, files(&["A", "B"]), false))
        .reply("find_close2", Response::Empty);

    let mut cursor = list(&connection, &docs(), ListOptions::default())?;
    assert_eq!(cursor.state(), CursorState::HasResult);
    assert_eq!(cursor.next_entry()?.map(|e| e.name), Some("A".to_string()));
    cursor.close();
    cursor.close();
    assert!(cursor.next_entry()?.is_none());
    drop(cursor);

    assert_eq!(transport.count("find_close2"), 1);
    assert_eq!(transport.count("find_next2"), 0);
    assert_eq!(transport.count("tree_disconnect"), 1);
    Ok(())
}

#[test]
fn closer_on_another_thread_collapses_with_drop() -> Result<()> {
    let (transport, connection) = connect(Dialect::Smb1, paged(2));
    transport
        .reply("find_first2", find_page(5, files(&["A", "B"]), false))
        .reply("find_close2", Response::Empty);

    let mut cursor = list(&connection, &docs(), ListOptions::default())?;
    let closers: Vec<_> = (0..4).map(|_| cursor.closer()).collect();
    let workers: Vec<_> = closers
        .into_iter()
        .map(|closer| thread::spawn(move || closer.close()))
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    assert!(cursor.next().is_none());
    drop(cursor);
    assert_eq!(transport.count("find_close2"), 1);
    assert_eq!(transport.count("tree_disconnect"), 1);
    Ok(())
}

#[test]
fn dropping_an_open_cursor_closes_it() -> Result<()> {
    let (transport, connection) = connect(Dialect::Smb2, ClientConfig::default());
    transport
        .reply("chain", opened_with(modern_fid(1), files(&["A", "B"])))
        .reply("close", Response::Empty);

    let mut cursor = list(&connection, &docs(), ListOptions::default())?;
    assert!(cursor.next().is_some());
    drop(cursor);
    assert_eq!(transport.count("close"), 1);
    assert_eq!(transport.count("query_directory"), 0);
    assert!(connection.active_handle().is_none());
    Ok(())
}

#[test]
fn modern_listing_resumes_by_index_until_no_more_files() -> Result<()> {
    let (transport, connection) = connect(Dialect::Smb2, ClientConfig::default());
    let fid = modern_fid(0x42);
    let mut second = files(&["C", "D", "E"]);
    for (i, entry) in second.iter_mut().enumerate() {
        entry.file_index = 10 + i as u32;
    }
    transport
        .reply("chain", opened_with(fid.clone(), files(&["A", "B"])))
        .reply("query_directory", query_page(second))
        .fail("query_directory", NtStatus::NO_MORE_FILES)
        .reply("close", Response::Empty);

    let cursor = list(&connection, &docs(), ListOptions::default())?;
    assert_eq!(names(cursor)?, vec!["A", "B", "C", "D", "E"]);
    assert_eq!(transport.count("query_directory"), 2);
    assert_eq!(transport.count("close"), 1);

    let sent = transport.sent();
    match &sent[1].request {
        Request::Chain { requests } => {
            assert!(matches!(&requests[0], Request::Create(create) if create.path == "docs"));
            assert!(matches!(&requests[1], Request::QueryDirectory(q) if q.fid.is_none()));
        }
        other => panic!("unexpected request {other:?}"),
    }
    let queries: Vec<_> = sent
        .iter()
        .filter_map(|sent| match &sent.request {
            Request::QueryDirectory(query) => Some(query.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(queries[0].fid, Some(fid.clone()));
    assert_eq!(queries[0].flags, query_flags::INDEX_SPECIFIED);
    assert_eq!(queries[0].file_index, 2);
    assert_eq!(queries[1].file_index, 12);
    let close = sent.iter().find(|s| s.request.kind() == "close").unwrap();
    assert_eq!(close.request, Request::Close { fid });
    assert!(close.flags.no_retry);
    Ok(())
}

#[test]
fn modern_empty_directory_still_closes_the_handle() -> Result<()> {
    let (transport, connection) = connect(Dialect::Smb2, ClientConfig::default());
    transport
        .reply("chain", opened_then_failed(modern_fid(2), NtStatus::NO_SUCH_FILE))
        .reply("close", Response::Empty);

    let cursor = list(&connection, &docs(), ListOptions::default())?;
    assert!(cursor.is_closed());
    assert!(names(cursor)?.is_empty());
    assert_eq!(transport.count("close"), 1);
    assert_eq!(transport.count("tree_disconnect"), 1);
    Ok(())
}

#[test]
fn modern_failed_create_propagates_without_close() {
    let (transport, connection) = connect(Dialect::Smb2, ClientConfig::default());
    transport.reply(
        "chain",
        Response::Chain {
            replies: vec![
                smbwalk::protocol::ChainedReply {
                    status: NtStatus::OBJECT_NAME_NOT_FOUND,
                    response: None,
                },
                smbwalk::protocol::ChainedReply {
                    status: NtStatus::OBJECT_NAME_NOT_FOUND,
                    response: None,
                },
            ],
        },
    );

    let err = list(&connection, &docs(), ListOptions::default()).unwrap_err();
    assert_eq!(err.status(), Some(NtStatus::OBJECT_NAME_NOT_FOUND));
    assert_eq!(transport.count("close"), 0);
    assert_eq!(transport.count("tree_disconnect"), 1);
}

#[test]
fn modern_failed_query_closes_orphaned_handle_then_propagates() {
    let (transport, connection) = connect(Dialect::Smb2, ClientConfig::default());
    transport
        .reply("chain", opened_then_failed(modern_fid(3), NtStatus::ACCESS_DENIED))
        .reply("close", Response::Empty);

    let err = list(&connection, &docs(), ListOptions::default()).unwrap_err();
    assert_eq!(err.status(), Some(NtStatus::ACCESS_DENIED));
    assert_eq!(
        transport.sent_kinds(),
        vec!["tree_connect", "chain", "close", "tree_disconnect"]
    );
}

#[test]
fn truncated_compound_reply_still_closes_the_opened_directory() {
    let (transport, connection) = connect(Dialect::Smb2, ClientConfig::default());
    let opened = match opened_with(modern_fid(5), Vec::new()) {
        Response::Chain { mut replies } => {
            replies.truncate(1);
            Response::Chain { replies }
        }
        other => other,
    };
    transport
        .reply("chain", opened)
        .reply("close", Response::Empty);

    let err = list(&connection, &docs(), ListOptions::default()).unwrap_err();
    assert!(matches!(err, SmbError::Protocol(_)));
    let close = transport
        .sent()
        .into_iter()
        .find(|sent| sent.request.kind() == "close")
        .unwrap();
    assert_eq!(close.request, Request::Close { fid: modern_fid(5) });
    assert_eq!(
        transport.sent_kinds(),
        vec!["tree_connect", "chain", "close", "tree_disconnect"]
    );
}

#[test]
fn lost_connection_skips_server_cleanup_and_reports_io() -> Result<()> {
    let (transport, connection) = connect(Dialect::Smb2, ClientConfig::default());
    transport
        .reply("chain", opened_with(modern_fid(4), files(&["A", "B"])))
        .expect("query_directory", smbwalk::replay::Reply::Io("reset by peer".into()));

    let mut cursor = list(&connection, &docs(), ListOptions::default())?;
    assert_eq!(cursor.next_entry()?.map(|e| e.name), Some("A".to_string()));
    assert_eq!(cursor.next_entry()?.map(|e| e.name), Some("B".to_string()));
    assert!(matches!(cursor.next_entry(), Err(SmbError::Io(_))));
    assert!(cursor.next_entry()?.is_none());

    assert_eq!(transport.count("close"), 0);
    assert_eq!(transport.count("tree_disconnect"), 0);
    assert!(connection.active_handle().is_none());
    Ok(())
}
