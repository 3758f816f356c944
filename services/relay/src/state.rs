//! Shared Application State
//!
//! This module defines the `AppState` struct: the immutable process-wide
//! configuration plus the injected call-issuer client. Built once at startup
//! and passed by `Arc` into every handler and session; never mutated after
//! initialization.

use crate::{config::Config, twilio::CallIssuer};
use std::sync::Arc;

/// The shared application state, created once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub issuer: Arc<dyn CallIssuer>,
}
