//! WebSocket plumbing for live calls.
//!
//! - `session`: the telephony socket lifecycle, from upgrade to teardown,
//!   driving the core state machine's effects.
//! - `agent`: the outbound link to the voice-agent provider, including the
//!   keepalive timer.

pub mod agent;
pub mod session;

pub use session::ws_handler;
