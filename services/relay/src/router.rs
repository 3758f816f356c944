//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the relay: the
//! call-control REST endpoints, the media-stream WebSocket endpoint, and the
//! OpenAPI documentation.

use crate::{
    handlers,
    models::{ErrorResponse, IssuerErrorResponse, OutboundCallPayload, OutboundCallResponse},
    state::AppState,
    ws::ws_handler,
};

use axum::{
    Router,
    routing::{any, get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(handlers::outbound_call, handlers::outbound_call_twiml),
    components(
        schemas(OutboundCallPayload, OutboundCallResponse, ErrorResponse, IssuerErrorResponse)
    ),
    tags(
        (name = "Callbridge Relay", description = "Outbound calls bridged to a conversational voice agent")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route("/outbound-call", post(handlers::outbound_call))
        // Twilio may fetch the control document with GET or POST.
        .route("/outbound-call-twiml", any(handlers::outbound_call_twiml))
        .route("/outbound-media-stream", get(ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
