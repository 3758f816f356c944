//! API Models
//!
//! Request and response bodies for the call-control endpoints, annotated for
//! OpenAPI documentation with `utoipa`.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Body of `POST /outbound-call`.
#[derive(Deserialize, ToSchema, Debug)]
pub struct OutboundCallPayload {
    /// Destination phone number in E.164 format. Required.
    pub number: Option<String>,
    /// Instructions for the voice agent; a default is used when absent.
    pub prompt: Option<String>,
    /// Opening line the agent speaks when the call connects.
    pub first_message: Option<String>,
}

/// Successful call-initiation response.
#[derive(Serialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OutboundCallResponse {
    pub success: bool,
    pub message: String,
    pub call_sid: String,
}

/// Client-error body (4xx).
#[derive(Serialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

/// Issuer-failure body (5xx).
#[derive(Serialize, ToSchema, Debug)]
pub struct IssuerErrorResponse {
    pub success: bool,
    pub error: String,
}

/// Query parameters Twilio echoes back when fetching the control document.
#[derive(Deserialize, IntoParams, Debug)]
pub struct TwimlQuery {
    pub prompt: Option<String>,
    pub first_message: Option<String>,
}
