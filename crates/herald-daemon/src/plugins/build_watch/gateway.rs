//! Discord gateway session that publishes the bot's presence
//!
//! The REST API has no presence endpoint; presence belongs to a gateway
//! session. The session runs on its own task, reconnects with a capped
//! backoff, and sends the latest presence with every identify.

use crate::plugin::PluginError;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tracing::{debug, info, warn};

const OP_HEARTBEAT: u8 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_PRESENCE_UPDATE: u8 = 3;
const OP_RECONNECT: u8 = 7;
const OP_INVALID_SESSION: u8 = 9;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

/// Custom status: the text is shown as-is
const ACTIVITY_CUSTOM: u8 = 4;

const RECONNECT_INITIAL: Duration = Duration::from_secs(1);
const RECONNECT_MAX: Duration = Duration::from_secs(60);

/// Close codes after which reconnecting cannot succeed (bad token, intents, shard)
const FATAL_CLOSE_CODES: [u16; 6] = [4004, 4010, 4011, 4012, 4013, 4014];

#[derive(Debug, Deserialize)]
struct Payload {
    op: u8,
    #[serde(default)]
    d: Value,
    #[serde(default)]
    s: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
enum GatewayError {
    #[error("websocket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("malformed gateway payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("gateway did not send a hello")]
    NoHello,

    #[error("gateway rejected the session (close code {0})")]
    Rejected(u16),
}

enum SessionEnd {
    /// Every handle was dropped
    Stopped,
    /// The gateway asked for a new session or went away
    Reconnect,
}

/// Handle to a background gateway session.
///
/// Clones share one session. The session closes once every handle is dropped.
#[derive(Debug, Clone)]
pub struct PresenceGateway {
    presence: Arc<watch::Sender<Option<String>>>,
}

impl PresenceGateway {
    /// Start a session on the current tokio runtime
    pub fn spawn(url: impl Into<String>, token: impl Into<String>) -> Self {
        let (tx, rx) = watch::channel(None);
        tokio::spawn(run(url.into(), token.into(), rx));
        Self {
            presence: Arc::new(tx),
        }
    }

    /// Publish `text` as the bot's status, or clear it.
    ///
    /// The value is sent on the live session, or with the next identify if
    /// the session is reconnecting.
    ///
    /// # Errors
    ///
    /// Returns `PluginError::Provider` once the session has given up, e.g.
    /// after the gateway rejected the token.
    pub fn set(&self, text: Option<&str>) -> Result<(), PluginError> {
        if self.presence.is_closed() {
            return Err(PluginError::provider("Discord gateway session has ended"));
        }
        self.presence.send_replace(text.map(str::to_string));
        Ok(())
    }

    /// The most recently requested presence
    pub fn current(&self) -> Option<String> {
        self.presence.borrow().clone()
    }
}

fn identify(token: &str, presence: Option<&str>) -> Value {
    json!({
        "op": OP_IDENTIFY,
        "d": {
            "token": token,
            "intents": 0,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "ci-herald",
                "device": "ci-herald",
            },
            "presence": presence_body(presence),
        }
    })
}

fn presence_body(text: Option<&str>) -> Value {
    let activities = match text {
        Some(text) => json!([{ "name": "Custom Status", "type": ACTIVITY_CUSTOM, "state": text }]),
        None => json!([]),
    };
    json!({
        "since": null,
        "activities": activities,
        "status": "online",
        "afk": false,
    })
}

fn presence_update(text: Option<&str>) -> Value {
    json!({ "op": OP_PRESENCE_UPDATE, "d": presence_body(text) })
}

fn heartbeat(sequence: Option<u64>) -> Value {
    json!({ "op": OP_HEARTBEAT, "d": sequence })
}

fn text_frame(payload: &Value) -> Message {
    Message::text(payload.to_string())
}

fn close_code(frame: Option<&CloseFrame>) -> Option<u16> {
    frame.map(|f| u16::from(f.code))
}

async fn run(url: String, token: String, mut presence: watch::Receiver<Option<String>>) {
    let mut backoff = RECONNECT_INITIAL;
    loop {
        match session(&url, &token, &mut presence).await {
            Ok(SessionEnd::Stopped) => {
                debug!("Discord gateway session closed");
                return;
            }
            Ok(SessionEnd::Reconnect) => {
                debug!("Discord gateway asked for a new session");
                backoff = RECONNECT_INITIAL;
            }
            Err(GatewayError::Rejected(code)) => {
                warn!("Discord gateway rejected the session (close code {code}); presence is disabled");
                return;
            }
            Err(e) => warn!("Discord gateway session failed: {e}; reconnecting in {backoff:?}"),
        }

        let wait = tokio::time::sleep(backoff);
        tokio::pin!(wait);
        loop {
            tokio::select! {
                _ = &mut wait => break,
                changed = presence.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
        backoff = (backoff * 2).min(RECONNECT_MAX);
    }
}

async fn session(
    url: &str,
    token: &str,
    presence: &mut watch::Receiver<Option<String>>,
) -> Result<SessionEnd, GatewayError> {
    let (socket, _) = tokio_tungstenite::connect_async(url).await?;
    let (mut sink, mut stream) = socket.split();

    let heartbeat_every = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                let payload: Payload = serde_json::from_str(text.as_str())?;
                if payload.op == OP_HELLO {
                    let millis = payload.d["heartbeat_interval"]
                        .as_u64()
                        .ok_or(GatewayError::NoHello)?;
                    break Duration::from_millis(millis);
                }
            }
            Some(Ok(Message::Close(frame))) => {
                return match close_code(frame.as_ref()) {
                    Some(code) if FATAL_CLOSE_CODES.contains(&code) => {
                        Err(GatewayError::Rejected(code))
                    }
                    _ => Err(GatewayError::NoHello),
                };
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
            None => return Err(GatewayError::NoHello),
        }
    };

    let current = presence.borrow_and_update().clone();
    sink.send(text_frame(&identify(token, current.as_deref())))
        .await?;
    info!("Connected to Discord gateway");

    let mut ticker = interval_at(Instant::now() + heartbeat_every, heartbeat_every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sequence: Option<u64> = None;
    let mut acked = true;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !acked {
                    debug!("Discord heartbeat was not acknowledged");
                    return Ok(SessionEnd::Reconnect);
                }
                acked = false;
                sink.send(text_frame(&heartbeat(sequence))).await?;
            }
            changed = presence.changed() => {
                if changed.is_err() {
                    if let Err(e) = sink.close().await {
                        debug!("Closing Discord gateway: {e}");
                    }
                    return Ok(SessionEnd::Stopped);
                }
                let text = presence.borrow_and_update().clone();
                sink.send(text_frame(&presence_update(text.as_deref()))).await?;
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let payload: Payload = serde_json::from_str(text.as_str())?;
                    if payload.s.is_some() {
                        sequence = payload.s;
                    }
                    match payload.op {
                        OP_HEARTBEAT => sink.send(text_frame(&heartbeat(sequence))).await?,
                        OP_HEARTBEAT_ACK => acked = true,
                        OP_RECONNECT | OP_INVALID_SESSION => return Ok(SessionEnd::Reconnect),
                        _ => {}
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    return match close_code(frame.as_ref()) {
                        Some(code) if FATAL_CLOSE_CODES.contains(&code) => {
                            Err(GatewayError::Rejected(code))
                        }
                        _ => Ok(SessionEnd::Reconnect),
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(SessionEnd::Reconnect),
            }
        }
    }
}
