#![allow(missing_docs)]

mod support;

use proptest::prelude::*;
use smbwalk::listing::{list, ListOptions, ResourceLocator};
use smbwalk::protocol::{FileEntry, Response};
use smbwalk::types::{Dialect, NtStatus, Result};

use support::*;

struct Outcome {
    names: Vec<String>,
    continuations: usize,
    closes: usize,
    disconnects: usize,
    unused: usize,
}

fn legacy_listing(page: usize, entries: Vec<FileEntry>) -> Result<Outcome> {
    let (transport, connection) = connect(Dialect::Smb1, paged(page as u16));
    let pages: Vec<Vec<FileEntry>> = entries.chunks(page).map(<[FileEntry]>::to_vec).collect();
    let opened = !pages.is_empty();
    if !opened {
        transport.fail("find_first2", NtStatus::NO_SUCH_FILE);
    }
    let last = pages.len().saturating_sub(1);
    for (i, chunk) in pages.into_iter().enumerate() {
        let kind = if i == 0 { "find_first2" } else { "find_next2" };
        transport.reply(kind, find_page(11, chunk, i == last));
    }
    if opened {
        transport.reply("find_close2", Response::Empty);
    }

    let cursor = list(
        &connection,
        &ResourceLocator::path("srv", "data", "dir/"),
        ListOptions::default(),
    )?;
    let names = names(cursor)?;
    Ok(Outcome {
        names,
        continuations: transport.count("find_next2"),
        closes: transport.count("find_close2"),
        disconnects: transport.count("tree_disconnect"),
        unused: transport.remaining(),
    })
}

fn modern_listing(page: usize, entries: Vec<FileEntry>) -> Result<Outcome> {
    let (transport, connection) = connect(Dialect::Smb2, paged(page as u16));
    let fid = modern_fid(7);
    let mut pages = entries.chunks(page).map(<[FileEntry]>::to_vec);
    match pages.next() {
        None => {
            transport.reply("chain", opened_then_failed(fid, NtStatus::NO_SUCH_FILE));
        }
        Some(first) => {
            transport.reply("chain", opened_with(fid, first));
            for chunk in pages {
                transport.reply("query_directory", query_page(chunk));
            }
            transport.fail("query_directory", NtStatus::NO_MORE_FILES);
        }
    }
    transport.reply("close", Response::Empty);

    let cursor = list(
        &connection,
        &ResourceLocator::path("srv", "data", "dir/"),
        ListOptions::default(),
    )?;
    let names = names(cursor)?;
    Ok(Outcome {
        names,
        continuations: transport.count("query_directory"),
        closes: transport.count("close"),
        disconnects: transport.count("tree_disconnect"),
        unused: transport.remaining(),
    })
}

fn expected(entries: &[FileEntry]) -> Vec<String> {
    entries.iter().map(|e| e.name.clone()).collect()
}

fn pages_for(page: usize, count: usize) -> usize {
    count.div_ceil(page)
}

#[test]
fn legacy_counts_around_the_page_size() -> Result<()> {
    let page = 4;
    for count in [1, 3, 4, 5, 13] {
        let entries = numbered(count);
        let outcome = legacy_listing(page, entries.clone())?;
        assert_eq!(outcome.names, expected(&entries), "count {count}");
        assert_eq!(outcome.continuations, pages_for(page, count) - 1, "count {count}");
        assert_eq!(outcome.closes, 1, "count {count}");
        assert_eq!(outcome.disconnects, 1, "count {count}");
        assert_eq!(outcome.unused, 0, "count {count}");
    }
    Ok(())
}

#[test]
fn modern_counts_around_the_page_size() -> Result<()> {
    let page = 4;
    for count in [0, 3, 4, 13] {
        let entries = numbered(count);
        let outcome = modern_listing(page, entries.clone())?;
        assert_eq!(outcome.names, expected(&entries), "count {count}");
        let extra_query = usize::from(count > 0);
        assert_eq!(
            outcome.continuations,
            pages_for(page, count).saturating_sub(1) + extra_query,
            "count {count}"
        );
        assert_eq!(outcome.closes, 1, "count {count}");
        assert_eq!(outcome.disconnects, 1, "count {count}");
        assert_eq!(outcome.unused, 0, "count {count}");
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_legacy_yields_every_entry_in_order(page in 1usize..=8, count in 0usize..=40) {
        let entries = numbered(count);
        let outcome = legacy_listing(page, entries.clone()).unwrap();
        prop_assert_eq!(outcome.names, expected(&entries));
        prop_assert_eq!(outcome.disconnects, 1);
        prop_assert_eq!(outcome.unused, 0);
    }

    #[test]
    fn prop_modern_yields_every_entry_in_order(page in 1usize..=8, count in 0usize..=40) {
        let entries = numbered(count);
        let outcome = modern_listing(page, entries.clone()).unwrap();
        prop_assert_eq!(outcome.names, expected(&entries));
        prop_assert_eq!(outcome.closes, 1);
        prop_assert_eq!(outcome.unused, 0);
    }
}
