//! Translation between bridge structs and domain types.

use nix::errno::Errno;
use strata_hsm_core::{ActionBatch, ActionItem, ActionKind, Extent, Fid, HsmError, HsmResult, Polled};
use tracing::warn;

use crate::ffi::ffi;

pub(crate) fn batch_from_native(batch: ffi::NativeBatch) -> HsmResult<Polled> {
    if batch.status == -(Errno::EAGAIN as i32) {
        return Ok(Polled::WouldBlock);
    }
    if batch.status < 0 {
        return Err(HsmError::Receive {
            source: std::io::Error::from_raw_os_error(-batch.status),
        });
    }
    let items = batch.items.into_iter().map(item_from_native).collect();
    Ok(Polled::Batch(ActionBatch {
        flags: batch.flags,
        archive_id: batch.archive_id,
        items,
    }))
}

fn item_from_native(item: ffi::NativeActionItem) -> ActionItem {
    let kind = ActionKind::from_raw(item.action).unwrap_or_else(|| {
        warn!(code = item.action, cookie = item.cookie, "unknown HSM action code");
        ActionKind::None
    });
    ActionItem {
        kind,
        fid: fid_from_native(&item.fid),
        data_fid: fid_from_native(&item.data_fid),
        extent: Extent::new(item.offset, item.length),
        cookie: item.cookie,
        gid: item.gid,
        data: item.data,
    }
}

pub(crate) fn item_to_native(item: &ActionItem) -> ffi::NativeActionItem {
    ffi::NativeActionItem {
        action: item.kind.as_raw(),
        fid: fid_to_native(item.fid),
        data_fid: fid_to_native(item.data_fid),
        offset: item.extent.offset,
        length: item.extent.length,
        cookie: item.cookie,
        gid: item.gid,
        data: item.data.clone(),
    }
}

pub(crate) const fn fid_from_native(fid: &ffi::NativeFid) -> Fid {
    Fid::new(fid.seq, fid.oid, fid.ver)
}

const fn fid_to_native(fid: Fid) -> ffi::NativeFid {
    ffi::NativeFid {
        seq: fid.seq,
        oid: fid.oid,
        ver: fid.ver,
    }
}
