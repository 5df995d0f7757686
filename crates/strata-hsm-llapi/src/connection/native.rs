#![allow(unsafe_code)]

use std::os::fd::{BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::{AtomicBool, Ordering};

use cxx::UniquePtr;
use strata_hsm_core::{
    ActionContext, ActionFlags, ActionItem, BeginOptions, ConnectOptions, Connector,
    CoordinatorConnection, Extent, Fid, HsmError, HsmResult, Polled,
};
use tracing::warn;

use crate::convert::{batch_from_native, fid_from_native, item_to_native};
use crate::ffi::ffi;

/// Connector that registers through liblustreapi.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeConnector;

impl Connector for NativeConnector {
    fn connect(&self, options: &ConnectOptions) -> HsmResult<Box<dyn CoordinatorConnection>> {
        let register = ffi::RegisterOptions {
            mount_path: options.root.as_os_str().as_bytes().to_vec(),
            archive_ids: options.archive_ids.clone(),
        };
        let mut status = 0;
        let copytool = ffi::register_copytool(&register, &mut status);
        if status != 0 || copytool.is_null() {
            return Err(HsmError::registration(&options.root, status.abs()));
        }
        let fd = copytool.readiness_fd();
        if fd < 0 {
            return Err(HsmError::registration(&options.root, fd.abs()));
        }
        Ok(Box::new(NativeConnection {
            copytool: Mutex::new(copytool),
            fd,
            closed: AtomicBool::new(false),
        }))
    }
}

struct NativeConnection {
    copytool: Mutex<UniquePtr<ffi::Copytool>>,
    fd: RawFd,
    closed: AtomicBool,
}

impl NativeConnection {
    fn with_copytool<T>(&self, f: impl FnOnce(&ffi::Copytool) -> T) -> Option<T> {
        let guard = self.copytool.lock().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().map(f)
    }
}

impl CoordinatorConnection for NativeConnection {
    fn readiness_fd(&self) -> BorrowedFd<'_> {
        // SAFETY: the descriptor belongs to the registered copytool, which is only
        // unregistered when this connection is dropped.
        unsafe { BorrowedFd::borrow_raw(self.fd) }
    }

    fn receive(&self) -> HsmResult<Polled> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(HsmError::ConnectionClosed {
                operation: "receive",
            });
        }
        let batch = self
            .with_copytool(ffi::Copytool::receive)
            .ok_or(HsmError::ConnectionClosed {
                operation: "receive",
            })?;
        batch_from_native(batch)
    }

    fn begin(&self, item: &ActionItem, options: BeginOptions) -> HsmResult<Box<dyn ActionContext>> {
        let native_item = item_to_native(item);
        let mut status = 0;
        let action = self
            .with_copytool(|copytool| {
                copytool.begin_action(
                    &native_item,
                    options.mdt_index,
                    options.open_flags,
                    options.is_error,
                    &mut status,
                )
            })
            .ok_or(HsmError::ConnectionClosed { operation: "begin" })?;
        if status != 0 || action.is_null() {
            return Err(HsmError::action("begin", item.cookie, status.abs()));
        }
        Ok(Box::new(NativeAction {
            inner: action,
            cookie: item.cookie,
        }))
    }

    fn close(&self) -> HsmResult<()> {
        // Unregistration waits for drop: begun actions still point into the
        // copytool state.
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for NativeConnection {
    fn drop(&mut self) {
        let mut guard = self.copytool.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(copytool) = guard.as_mut() {
            let rc = copytool.unregister();
            if rc != 0 {
                warn!(errno = rc.abs(), "copytool unregister failed");
            }
        }
    }
}

struct NativeAction {
    inner: UniquePtr<ffi::CopyAction>,
    cookie: u64,
}

impl NativeAction {
    fn check(&self, operation: &'static str, rc: i32) -> HsmResult<()> {
        if rc == 0 {
            Ok(())
        } else {
            Err(HsmError::action(operation, self.cookie, rc.abs()))
        }
    }
}

impl ActionContext for NativeAction {
    fn progress(&mut self, extent: Extent, total_length: u64, flags: ActionFlags) -> HsmResult<()> {
        let rc = self.inner.as_mut().map_or(-ebadf(), |action| {
            action.progress(extent.offset, extent.length, total_length, flags.bits())
        });
        self.check("progress", rc)
    }

    fn end(&mut self, extent: Extent, flags: ActionFlags, errval: i32) -> HsmResult<()> {
        let rc = self.inner.as_mut().map_or(-ebadf(), |action| {
            action.end(extent.offset, extent.length, flags.bits(), errval)
        });
        self.check("end", rc)
    }

    fn data_fid(&self) -> HsmResult<Fid> {
        let mut fid = ffi::NativeFid {
            seq: 0,
            oid: 0,
            ver: 0,
        };
        let rc = self
            .inner
            .as_ref()
            .map_or(-ebadf(), |action| action.data_fid(&mut fid));
        self.check("data_fid", rc)?;
        Ok(fid_from_native(&fid))
    }

    fn data_fd(&self) -> HsmResult<OwnedFd> {
        let fd = self
            .inner
            .as_ref()
            .map_or(-ebadf(), ffi::CopyAction::data_fd);
        if fd < 0 {
            return Err(HsmError::action("data_fd", self.cookie, fd.abs()));
        }
        // SAFETY: llapi hands out a freshly opened descriptor owned by the caller.
        Ok(unsafe { OwnedFd::from_raw_fd(fd) })
    }
}

const fn ebadf() -> i32 {
    nix::errno::Errno::EBADF as i32
}
