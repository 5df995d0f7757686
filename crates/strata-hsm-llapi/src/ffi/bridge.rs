#![allow(unreachable_pub, missing_docs)]

#[cxx::bridge(namespace = "strata")]
/// Native bridge types and functions exposed to Rust.
pub mod ffi {
    /// Parameters for `llapi_hsm_copytool_register`.
    #[derive(Debug)]
    struct RegisterOptions {
        /// Lustre mount point, raw path bytes.
        mount_path: Vec<u8>,
        /// Archive ids to serve; empty serves all.
        archive_ids: Vec<u32>,
    }

    /// Mirror of `struct lu_fid`.
    #[derive(Debug, Clone, Copy)]
    struct NativeFid {
        seq: u64,
        oid: u32,
        ver: u32,
    }

    /// One `hsm_action_item` copied out of the receive buffer.
    #[derive(Debug)]
    struct NativeActionItem {
        action: u32,
        fid: NativeFid,
        data_fid: NativeFid,
        offset: u64,
        length: u64,
        cookie: u64,
        gid: u64,
        data: Vec<u8>,
    }

    /// One `hsm_action_list`, or a status when nothing was received.
    #[derive(Debug)]
    struct NativeBatch {
        /// Zero on success, `-EAGAIN` when drained, another negative errno on failure.
        status: i32,
        flags: u64,
        archive_id: u32,
        items: Vec<NativeActionItem>,
    }

    /// Mirror of `struct hsm_current_action`.
    #[derive(Debug)]
    struct NativeCurrentAction {
        /// Return code of `llapi_hsm_current_action`.
        status: i32,
        action: u32,
        state: u32,
        offset: u64,
        length: u64,
    }

    unsafe extern "C++" {
        include!("strata/copytool.hpp");

        /// Registered copytool (`hsm_copytool_private`).
        type Copytool;
        /// Begun action (`hsm_copyaction_private`).
        type CopyAction;

        /// Register a non-blocking copytool; `status` receives a negative errno on failure.
        fn register_copytool(options: &RegisterOptions, status: &mut i32) -> UniquePtr<Copytool>;
        /// Descriptor to poll for pending actions.
        fn readiness_fd(self: &Copytool) -> i32;
        /// Receive the next action list without blocking.
        fn receive(self: &Copytool) -> NativeBatch;
        /// Begin an action.
        fn begin_action(
            self: &Copytool,
            item: &NativeActionItem,
            mdt_index: i32,
            open_flags: i32,
            is_error: bool,
            status: &mut i32,
        ) -> UniquePtr<CopyAction>;
        /// Unregister the copytool.
        fn unregister(self: Pin<&mut Copytool>) -> i32;

        /// Report progress.
        fn progress(
            self: Pin<&mut CopyAction>,
            offset: u64,
            length: u64,
            total_length: u64,
            flags: i32,
        ) -> i32;
        /// End the action.
        fn end(self: Pin<&mut CopyAction>, offset: u64, length: u64, flags: i32, errval: i32)
        -> i32;
        /// Resolve the data FID.
        fn data_fid(self: &CopyAction, fid: &mut NativeFid) -> i32;
        /// Open the data file.
        fn data_fd(self: &CopyAction) -> i32;

        /// Query the current HSM action for a path.
        fn current_action(path: &[u8]) -> NativeCurrentAction;
    }
}
