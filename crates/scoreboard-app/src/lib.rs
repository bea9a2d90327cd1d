// Library root: the reconciliation/polling core plus the glue that connects
// it to the overlay shim. Re-exported so integration tests can drive it.

pub mod app;
pub mod catalog;
pub mod events;
pub mod host;
pub mod live_client;
pub mod poller;
pub mod reconciler;
