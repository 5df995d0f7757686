use std::path::Path;

use strata_hsm_core::{CurrentActionStatus, Extent, HsmError, HsmResult, ProgressState, UserAction};

/// Query the HSM action currently in progress for `path`.
///
/// # Errors
///
/// Returns [`HsmError::NotFound`] when nothing is in progress, [`HsmError::Query`]
/// when the lookup fails, and [`HsmError::Unsupported`] without the `lustre` feature.
#[cfg(feature = "lustre")]
pub fn query_current_action(path: &Path) -> HsmResult<CurrentActionStatus> {
    use std::os::unix::ffi::OsStrExt;

    let raw = crate::ffi::ffi::current_action(path.as_os_str().as_bytes());
    if raw.status != 0 {
        return Err(HsmError::Query {
            path: path.to_path_buf(),
            source: std::io::Error::from_raw_os_error(raw.status.abs()),
        });
    }
    status_from_raw(path, raw.action, raw.state, raw.offset, raw.length)
}

/// Query the HSM action currently in progress for `path`.
///
/// # Errors
///
/// Always returns [`HsmError::Unsupported`]: this build has no liblustreapi.
#[cfg(not(feature = "lustre"))]
pub fn query_current_action(path: &Path) -> HsmResult<CurrentActionStatus> {
    let _ = path;
    Err(HsmError::Unsupported {
        operation: "current_action",
    })
}

/// Decode the raw fields of `struct hsm_current_action`.
///
/// # Errors
///
/// Returns [`HsmError::NotFound`] for the no-op user action and [`HsmError::Query`]
/// for codes this build does not recognise.
pub fn status_from_raw(
    path: &Path,
    action: u32,
    state: u32,
    offset: u64,
    length: u64,
) -> HsmResult<CurrentActionStatus> {
    let invalid = || HsmError::Query {
        path: path.to_path_buf(),
        source: std::io::Error::from_raw_os_error(nix::errno::Errno::EPROTO as i32),
    };
    let action = UserAction::from_raw(action).ok_or_else(invalid)?;
    if action == UserAction::None {
        return Err(HsmError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let state = ProgressState::from_raw(state).ok_or_else(invalid)?;
    Ok(CurrentActionStatus {
        action,
        state,
        location: Extent::new(offset, length),
    })
}
