//! WebSocket Session Host
//!
//! A live view of the single conversation session:
//!
//! - `protocol`: the JSON message format exchanged with the browser.
//! - `session`: connection lifecycle, turn dispatch and mock-state push.

pub mod protocol;
pub mod session;

pub use session::ws_handler;
