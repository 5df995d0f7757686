//! CXX bridge to the liblustreapi copytool shim.

/// Raw bindings generated by CXX.
pub(crate) mod bridge;

#[allow(clippy::non_send_fields_in_send_ty)]
// SAFETY: the copytool handle is only reached through the connection's mutex, so
// llapi never sees concurrent calls on it.
unsafe impl Send for bridge::ffi::Copytool {}

#[allow(clippy::non_send_fields_in_send_ty)]
// SAFETY: an action context is owned by exactly one handle and only touched
// through `&mut` or `&` borrows of that handle.
unsafe impl Send for bridge::ffi::CopyAction {}

pub(crate) use bridge::ffi;
