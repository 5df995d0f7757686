use std::sync::Arc;

use strata_hsm_core::{Connector, HsmResult};

#[cfg(feature = "lustre")]
mod native;
mod stub;

#[cfg(feature = "lustre")]
pub use native::NativeConnector;
pub use stub::{StubCall, StubCoordinator};

/// Build the connector for the compiled-in backend.
///
/// With the `lustre` feature this registers through liblustreapi; otherwise it
/// falls back to the in-memory coordinator, which never produces work on its own.
///
/// # Errors
///
/// Returns an error when the in-memory coordinator cannot allocate its eventfd.
#[cfg(feature = "lustre")]
pub fn default_connector() -> HsmResult<Arc<dyn Connector>> {
    Ok(Arc::new(NativeConnector))
}

/// Build the connector for the compiled-in backend.
///
/// With the `lustre` feature this registers through liblustreapi; otherwise it
/// falls back to the in-memory coordinator, which never produces work on its own.
///
/// # Errors
///
/// Returns an error when the in-memory coordinator cannot allocate its eventfd.
#[cfg(not(feature = "lustre"))]
pub fn default_connector() -> HsmResult<Arc<dyn Connector>> {
    tracing::warn!("built without the lustre feature; using the in-memory coordinator");
    Ok(Arc::new(StubCoordinator::new()?))
}
