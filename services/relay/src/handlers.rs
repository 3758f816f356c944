//! Axum Handlers for the Call-Control Endpoints
//!
//! `POST /outbound-call` asks the telephony provider to place a call;
//! `/outbound-call-twiml` serves the control document the provider fetches
//! once the call is answered. Both endpoints carry `utoipa` doc comments for
//! OpenAPI generation.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::{error, info};

use crate::{
    models::{
        ErrorResponse, IssuerErrorResponse, OutboundCallPayload, OutboundCallResponse, TwimlQuery,
    },
    state::AppState,
    twilio,
};

pub enum ApiError {
    BadRequest(String),
    Issuer(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(error) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { error })).into_response()
            }
            ApiError::Issuer(err) => {
                error!("Call initiation failed: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(IssuerErrorResponse {
                        success: false,
                        error: "Failed to initiate call".to_string(),
                    }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Issuer(err.into())
    }
}

/// The public host this request arrived on, used to build callback URLs the
/// telephony provider can reach.
fn request_host(headers: &HeaderMap) -> String {
    headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost")
        .to_string()
}

/// Initiate an outbound call bridged to the voice agent.
#[utoipa::path(
    post,
    path = "/outbound-call",
    request_body = OutboundCallPayload,
    responses(
        (status = 200, description = "Call initiated", body = OutboundCallResponse),
        (status = 400, description = "Missing destination number", body = ErrorResponse),
        (status = 500, description = "Call initiation failed", body = IssuerErrorResponse)
    )
)]
pub async fn outbound_call(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<OutboundCallPayload>,
) -> Result<Json<OutboundCallResponse>, ApiError> {
    let number = payload
        .number
        .as_deref()
        .map(str::trim)
        .filter(|number| !number.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Phone number is required".to_string()))?;

    let host = request_host(&headers);
    let callback_url = twilio::callback_url(
        &host,
        payload.prompt.as_deref(),
        payload.first_message.as_deref(),
    );

    let call_sid = state
        .issuer
        .initiate_call(number, &callback_url)
        .await
        .map_err(ApiError::Issuer)?;

    info!(%call_sid, "Outbound call initiated.");
    Ok(Json(OutboundCallResponse {
        success: true,
        message: "Call initiated".to_string(),
        call_sid,
    }))
}

/// Serve the control document that routes the call's media stream here.
#[utoipa::path(
    get,
    path = "/outbound-call-twiml",
    params(TwimlQuery),
    responses(
        (status = 200, description = "TwiML control document", body = String, content_type = "text/xml")
    )
)]
pub async fn outbound_call_twiml(
    headers: HeaderMap,
    Query(query): Query<TwimlQuery>,
) -> impl IntoResponse {
    let host = request_host(&headers);
    let xml = twilio::stream_twiml(&host, query.prompt.as_deref(), query.first_message.as_deref());
    ([(header::CONTENT_TYPE, "text/xml")], xml)
}
