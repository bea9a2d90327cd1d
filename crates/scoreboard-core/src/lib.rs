// Library root for the scoreboard core: canonical model, normalization,
// change detection, the host/bridge wire protocol, configuration and the
// local WebSocket listener the overlay shim connects to.

pub mod config;
pub mod diff;
pub mod model;
pub mod normalize;
pub mod protocol;
pub mod ws_server;
