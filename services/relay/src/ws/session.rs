//! Manages the telephony WebSocket lifecycle for one phone call.
//!
//! The driver loop here owns both ends of the bridge: it reads frames from
//! the telephony socket and updates from the agent link, feeds them to the
//! core state machine, and carries out the effects the machine emits. All
//! mutation happens on this single task.

use super::agent::{AgentLink, LinkUpdate};
use crate::state::AppState;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use callbridge_core::{
    session::{CallSession, CloseReason, Effect},
    telephony::TelephonyEvent,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};

/// Axum handler to upgrade the media-stream endpoint to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Entry point for one accepted telephony connection.
#[instrument(name = "call_session", skip_all, fields(connection_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id: u32 = rand::random();
    tracing::Span::current().record("connection_id", connection_id);
    info!("Telephony stream connected. Awaiting start event...");

    if let Err(e) = run_call(socket, state).await {
        error!(error = ?e, "Call session terminated with error.");
    }
    info!("Call session finished.");
}

/// The main event loop for one call: telephony frames and agent updates
/// interleave here, each direction preserving its own arrival order.
async fn run_call(socket: WebSocket, state: Arc<AppState>) -> anyhow::Result<()> {
    let (mut telephony_tx, mut telephony_rx) = socket.split();
    let (updates_tx, mut updates_rx) = mpsc::channel::<LinkUpdate>(64);

    let mut session = CallSession::new();
    let mut agent_link: Option<AgentLink> = None;

    loop {
        tokio::select! {
            maybe_msg = telephony_rx.next() => {
                match maybe_msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<TelephonyEvent>(&text) {
                            Ok(event) => {
                                let effects = session.on_telephony(event);
                                if apply_effects(effects, &state, &mut telephony_tx, &mut agent_link, &updates_tx).await? {
                                    break;
                                }
                            }
                            // One corrupt frame must not end the call.
                            Err(e) => warn!(error = %e, "Dropping unparseable telephony frame."),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        let effects = session.close(CloseReason::TelephonyClosed);
                        apply_effects(effects, &state, &mut telephony_tx, &mut agent_link, &updates_tx).await?;
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "Telephony socket error.");
                        let effects = session.close(CloseReason::TelephonyError);
                        apply_effects(effects, &state, &mut telephony_tx, &mut agent_link, &updates_tx).await?;
                        break;
                    }
                }
            }
            Some(update) = updates_rx.recv() => {
                match update {
                    LinkUpdate::Event(event) => {
                        let effects = session.on_agent(event);
                        if apply_effects(effects, &state, &mut telephony_tx, &mut agent_link, &updates_tx).await? {
                            break;
                        }
                    }
                    LinkUpdate::Closed { error } => {
                        let reason = match error {
                            Some(message) => CloseReason::AgentError(message),
                            None => CloseReason::AgentClosed,
                        };
                        let effects = session.close(reason);
                        apply_effects(effects, &state, &mut telephony_tx, &mut agent_link, &updates_tx).await?;
                        break;
                    }
                }
            }
            else => break,
        }
    }

    // Backstop for exits that bypassed a Teardown effect (e.g. both
    // channels draining); closing twice is a no-op.
    if let Some(link) = agent_link.take() {
        link.close();
    }
    Ok(())
}

/// Carries out the state machine's effects in order. Returns `true` once a
/// teardown has run and the loop should stop.
async fn apply_effects(
    effects: Vec<Effect>,
    state: &Arc<AppState>,
    telephony_tx: &mut SplitSink<WebSocket, Message>,
    agent_link: &mut Option<AgentLink>,
    updates_tx: &mpsc::Sender<LinkUpdate>,
) -> anyhow::Result<bool> {
    let mut closing = false;
    for effect in effects {
        match effect {
            Effect::ConnectAgent(params) => {
                if agent_link.is_some() {
                    warn!("Agent link already exists; ignoring reconnect.");
                    continue;
                }
                *agent_link = Some(AgentLink::spawn(
                    state.config.clone(),
                    params,
                    updates_tx.clone(),
                ));
            }
            Effect::ForwardAudio(payload) => {
                if let Some(link) = agent_link {
                    link.send_audio(payload);
                }
            }
            Effect::SendFrame(frame) => {
                let serialized = serde_json::to_string(&frame)?;
                if telephony_tx.send(Message::Text(serialized.into())).await.is_err() {
                    warn!("Failed to send frame to the telephony socket.");
                }
            }
            Effect::Teardown(reason) => {
                if let Some(link) = agent_link.take() {
                    link.close();
                }
                if !reason.telephony_originated() {
                    let _ = telephony_tx.send(Message::Close(None)).await;
                }
                closing = true;
            }
        }
    }
    Ok(closing)
}
