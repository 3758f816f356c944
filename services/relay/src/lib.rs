//! Callbridge Relay Library Crate
//!
//! This library contains all the logic for the call-relay web service: the
//! application state, the REST endpoints that initiate outbound calls, the
//! WebSocket bridge between the telephony media stream and the voice-agent
//! provider, and the routing. The `relay` binary is a thin wrapper around it.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod twilio;
pub mod ws;
