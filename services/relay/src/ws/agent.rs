//! The outbound link to the voice-agent provider.
//!
//! One `AgentLink` exists per active call session. `spawn` returns
//! immediately; a background task performs the connect, sends the one-time
//! `Settings` command (plus the optional opening utterance), then proxies
//! audio outward and events inward while keeping the connection alive with
//! a periodic liveness command.

use crate::config::Config;
use anyhow::{Context, Result};
use callbridge_core::agent::{AgentDialect, AgentEvent, SessionParams};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant};
use tokio_tungstenite::tungstenite::{client::IntoClientRequest, protocol::Message as WsMessage};
use tracing::{debug, error, info, warn};

/// Cadence of the liveness command while the link is open.
const KEEPALIVE_PERIOD: Duration = Duration::from_secs(20);

/// Bounded queue toward the provider. Audio past this is dropped, never
/// buffered: a slow upstream must not grow memory without bound.
const OUTBOUND_BUFFER: usize = 128;

/// A message from the link task back to the owning session.
#[derive(Debug)]
pub enum LinkUpdate {
    /// A recognized event from the provider.
    Event(AgentEvent),
    /// The provider socket is gone: closed cleanly, errored, or the
    /// connect attempt failed.
    Closed { error: Option<String> },
}

/// Handle owned by the session for one outbound agent connection.
pub struct AgentLink {
    audio_tx: mpsc::Sender<String>,
    open: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl AgentLink {
    /// Spawns the link task. The session does not block on the connection;
    /// the link reports readiness through its open flag and failures
    /// through `updates`.
    pub fn spawn(
        config: Arc<Config>,
        params: SessionParams,
        updates: mpsc::Sender<LinkUpdate>,
    ) -> Self {
        let (audio_tx, audio_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let open = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(run_link(config, params, audio_rx, updates, open.clone()));
        Self {
            audio_tx,
            open,
            task,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Forwards one audio payload if the link is open. Otherwise the frame
    /// is silently dropped; audio arriving during connect is lost rather
    /// than queued.
    pub fn send_audio(&self, payload: String) {
        if !self.is_open() {
            debug!("Agent link not open; dropping audio frame.");
            return;
        }
        if self.audio_tx.try_send(payload).is_err() {
            warn!("Agent link backlog full; dropping audio frame.");
        }
    }

    /// Closes the link: clears the open flag, then aborts the task, which
    /// drops the keepalive timer together with the connection handle. Safe
    /// to call on an already-closed link.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            info!("Closing agent link.");
        }
        self.task.abort();
    }
}

async fn run_link(
    config: Arc<Config>,
    params: SessionParams,
    mut audio_rx: mpsc::Receiver<String>,
    updates: mpsc::Sender<LinkUpdate>,
    open: Arc<AtomicBool>,
) {
    let dialect = config.agent_schema.dialect();
    let result = drive_link(&config, dialect, &params, &mut audio_rx, &updates, &open).await;
    open.store(false, Ordering::SeqCst);
    match result {
        Ok(()) => {
            let _ = updates.send(LinkUpdate::Closed { error: None }).await;
        }
        Err(e) => {
            error!(error = ?e, "Agent link failed.");
            let _ = updates
                .send(LinkUpdate::Closed {
                    error: Some(e.to_string()),
                })
                .await;
        }
    }
}

/// Connects, configures, and runs the agent socket until either side ends.
async fn drive_link(
    config: &Config,
    dialect: &dyn AgentDialect,
    params: &SessionParams,
    audio_rx: &mut mpsc::Receiver<String>,
    updates: &mpsc::Sender<LinkUpdate>,
    open: &AtomicBool,
) -> Result<()> {
    let mut request = dialect.endpoint().into_client_request()?;
    request.headers_mut().insert(
        "Authorization",
        format!("Token {}", config.deepgram_api_key).parse()?,
    );

    let (ws_stream, _) = tokio_tungstenite::connect_async(request)
        .await
        .context("Failed to connect to the voice-agent provider")?;
    info!("Connected to the voice-agent provider.");
    let (mut agent_tx, mut agent_rx) = ws_stream.split();

    agent_tx
        .send(WsMessage::Text(dialect.settings(params).to_string().into()))
        .await?;
    if let Some(line) = params.opening_line() {
        agent_tx
            .send(WsMessage::Text(dialect.opening_line(line).to_string().into()))
            .await?;
    }
    open.store(true, Ordering::SeqCst);

    // First tick is one full period out; the Settings command above already
    // proved the connection live.
    let mut keepalive = time::interval_at(Instant::now() + KEEPALIVE_PERIOD, KEEPALIVE_PERIOD);

    loop {
        tokio::select! {
            _ = keepalive.tick() => {
                agent_tx
                    .send(WsMessage::Text(dialect.keepalive().to_string().into()))
                    .await?;
            }
            maybe_audio = audio_rx.recv() => {
                match maybe_audio {
                    Some(payload) => {
                        agent_tx
                            .send(WsMessage::Text(dialect.audio_input(&payload).to_string().into()))
                            .await?;
                    }
                    // The session dropped its handle; nothing left to relay.
                    None => break,
                }
            }
            maybe_msg = agent_rx.next() => {
                match maybe_msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        match dialect.parse_event(&text) {
                            Ok(event) => {
                                if updates.send(LinkUpdate::Event(event)).await.is_err() {
                                    break;
                                }
                            }
                            // One corrupt frame must not end the call.
                            Err(e) => warn!(error = %e, "Dropping unparseable agent frame."),
                        }
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        info!(?frame, "Agent closed the connection.");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e).context("Agent socket error"),
                    None => break,
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_link(open: bool) -> (AgentLink, mpsc::Receiver<String>) {
        let (audio_tx, audio_rx) = mpsc::channel(4);
        let link = AgentLink {
            audio_tx,
            open: Arc::new(AtomicBool::new(open)),
            task: tokio::spawn(async {}),
        };
        (link, audio_rx)
    }

    #[tokio::test]
    async fn audio_is_dropped_until_the_link_is_open() {
        let (link, mut audio_rx) = test_link(false);

        link.send_audio("dGVzdA==".to_string());
        assert!(audio_rx.try_recv().is_err());

        link.open.store(true, Ordering::SeqCst);
        link.send_audio("dGVzdA==".to_string());
        assert_eq!(audio_rx.try_recv().unwrap(), "dGVzdA==");
    }

    #[tokio::test]
    async fn close_is_idempotent_and_halts_sends() {
        let (link, mut audio_rx) = test_link(true);

        link.close();
        link.close();
        assert!(!link.is_open());

        link.send_audio("dGVzdA==".to_string());
        assert!(audio_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn backlog_overflow_drops_instead_of_blocking() {
        let (link, mut audio_rx) = test_link(true);

        // Channel capacity is 4 in the test fixture; the rest must be shed.
        for _ in 0..8 {
            link.send_audio("x".to_string());
        }
        let mut received = 0;
        while audio_rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 4);
    }
}
