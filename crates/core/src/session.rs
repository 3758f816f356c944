//! The per-call state machine.
//!
//! One [`CallSession`] coordinates one telephony stream with one agent link.
//! Every inbound event, from either socket, is a discrete input producing a
//! deterministic next state plus a list of [`Effect`]s for the driver to
//! carry out. Keeping the transitions pure lets the whole relay core be
//! exercised by feeding event sequences, with no sockets or timers involved.

use crate::agent::{AgentEvent, SessionParams};
use crate::telephony::{MediaPayload, OutboundFrame, TelephonyEvent};
use tracing::{debug, info, warn};

/// Lifecycle phase of a call session. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Socket accepted, no `start` event yet.
    Idle,
    /// Stream identified; media is being exchanged.
    Active,
    /// Torn down; all further events are ignored.
    Closed,
}

/// Why a session was torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The telephony side sent an explicit `stop` event.
    StopEvent,
    /// The telephony socket closed.
    TelephonyClosed,
    /// The telephony socket errored.
    TelephonyError,
    /// The agent socket closed or could not be reached.
    AgentClosed,
    /// The agent reported a fatal protocol error.
    AgentError(String),
}

impl CloseReason {
    /// Whether the telephony socket itself triggered the teardown, in which
    /// case it must not be closed a second time.
    pub fn telephony_originated(&self) -> bool {
        matches!(self, CloseReason::TelephonyClosed | CloseReason::TelephonyError)
    }
}

/// A side effect the driver must carry out, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Open the agent link with the captured call parameters.
    ConnectAgent(SessionParams),
    /// Forward one base64 audio payload to the agent link. The link drops
    /// it if it is not open yet; it is never queued.
    ForwardAudio(String),
    /// Send one frame back down the telephony socket.
    SendFrame(OutboundFrame),
    /// Release the agent link, its keepalive timer, and (unless it was the
    /// trigger) the telephony socket.
    Teardown(CloseReason),
}

/// State for one phone call: the stream identifier, the caller parameters,
/// and the lifecycle phase. Created per accepted telephony connection.
#[derive(Debug)]
pub struct CallSession {
    phase: Phase,
    stream_sid: Option<String>,
    params: SessionParams,
}

impl Default for CallSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CallSession {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            stream_sid: None,
            params: SessionParams::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn stream_sid(&self) -> Option<&str> {
        self.stream_sid.as_deref()
    }

    pub fn params(&self) -> &SessionParams {
        &self.params
    }

    /// Applies one frame from the telephony socket.
    pub fn on_telephony(&mut self, event: TelephonyEvent) -> Vec<Effect> {
        match (self.phase, event) {
            (Phase::Idle, TelephonyEvent::Start { start }) => {
                let params = SessionParams::from_custom_parameters(&start.custom_parameters);
                info!(stream_sid = %start.stream_sid, "Media stream started.");
                self.stream_sid = Some(start.stream_sid);
                self.params = params.clone();
                self.phase = Phase::Active;
                vec![Effect::ConnectAgent(params)]
            }
            (Phase::Idle, TelephonyEvent::Media { .. }) => {
                debug!("Dropping media received before the start event.");
                vec![]
            }
            (Phase::Active, TelephonyEvent::Media { media }) => {
                vec![Effect::ForwardAudio(media.payload)]
            }
            (Phase::Active, TelephonyEvent::Start { .. }) => {
                warn!("Ignoring duplicate start event.");
                vec![]
            }
            (Phase::Active, TelephonyEvent::Stop) => self.close(CloseReason::StopEvent),
            (Phase::Closed, _) => vec![],
            (_, TelephonyEvent::Stop) => {
                debug!("Stop event before the stream started; nothing to release.");
                vec![]
            }
            (_, TelephonyEvent::Other) => vec![],
        }
    }

    /// Applies one normalized event from the agent link.
    pub fn on_agent(&mut self, event: AgentEvent) -> Vec<Effect> {
        if self.phase == Phase::Closed {
            return vec![];
        }
        match event {
            AgentEvent::Audio(payload) => match &self.stream_sid {
                Some(stream_sid) => vec![Effect::SendFrame(OutboundFrame::Media {
                    stream_sid: stream_sid.clone(),
                    media: MediaPayload { payload },
                })],
                None => {
                    debug!("Dropping agent audio: stream id not known yet.");
                    vec![]
                }
            },
            AgentEvent::Error(message) => {
                warn!(%message, "Agent reported a fatal error.");
                self.close(CloseReason::AgentError(message))
            }
            AgentEvent::Ack => {
                debug!("Agent acknowledged the session configuration.");
                vec![]
            }
            AgentEvent::Text { role, content } => {
                info!(%role, %content, "Conversation update.");
                vec![]
            }
            AgentEvent::Thinking(content) => {
                debug!(%content, "Agent thinking.");
                vec![]
            }
            AgentEvent::Unknown(tag) => {
                debug!(%tag, "Ignoring unrecognized agent event.");
                vec![]
            }
        }
    }

    /// Moves the session to `Closed`. Idempotent: a second invocation, from
    /// any trigger, releases nothing twice.
    pub fn close(&mut self, reason: CloseReason) -> Vec<Effect> {
        if self.phase == Phase::Closed {
            return vec![];
        }
        self.phase = Phase::Closed;
        info!(?reason, "Session closed.");
        vec![Effect::Teardown(reason)]
    }
}
