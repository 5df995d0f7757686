//! Action fixtures and polling helpers.

use std::thread;
use std::time::{Duration, Instant};

use strata_hsm_core::{ActionBatch, ActionItem, ActionKind, Extent, Fid};

const FIXTURE_SEQUENCE: u64 = 0x2_0000_0401;
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// FID in the fixture sequence with object id `oid`.
#[must_use]
pub const fn fid(oid: u32) -> Fid {
    Fid::new(FIXTURE_SEQUENCE, oid, 0)
}

/// Action item for `cookie` covering the first 4 KiB of its file.
///
/// The data FID differs from the target FID so tests can tell them apart.
#[must_use]
pub fn action_item(kind: ActionKind, cookie: u64) -> ActionItem {
    let oid = u32::try_from(cookie % u64::from(u32::MAX)).unwrap_or_default();
    ActionItem {
        kind,
        fid: fid(oid),
        data_fid: Fid::new(FIXTURE_SEQUENCE + 1, oid, 0),
        extent: Extent::new(0, 4096),
        cookie,
        gid: 0,
        data: Vec::new(),
    }
}

/// Batch addressed to `archive_id`.
#[must_use]
pub const fn batch(archive_id: u32, items: Vec<ActionItem>) -> ActionBatch {
    ActionBatch {
        flags: 0,
        archive_id,
        items,
    }
}

/// Poll `predicate` until it holds or `timeout` elapses. Returns the final result.
pub fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_item_uses_distinct_data_fid() {
        let item = action_item(ActionKind::Restore, 7);
        assert_eq!(item.fid, fid(7));
        assert_ne!(item.fid, item.data_fid);
        assert_eq!(item.cookie, 7);
    }

    #[test]
    fn wait_until_reports_timeout() {
        assert!(!wait_until(Duration::from_millis(20), || false));
        let mut calls = 0;
        assert!(wait_until(Duration::from_millis(20), || {
            calls += 1;
            calls > 2
        }));
    }
}
