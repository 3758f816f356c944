//! Callbridge Core Library
//!
//! Socket-free heart of the call relay. Everything here is pure with respect
//! to I/O: the wire formats for both sides of the bridge and the per-call
//! state machine that maps inbound events to outbound side effects. The
//! `callbridge-relay` service wraps these types in real sockets and timers.

pub mod agent;
pub mod session;
pub mod telephony;
