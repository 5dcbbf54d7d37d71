//! Discord gateway websocket listener.
//! Handles: hello, identify, heartbeat, dispatch, reconnect.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use moogly_core::error::{MooglyError, Result};
use moogly_core::types::{IncomingCommand, Interaction, InteractionKind, RoleId};
use rand::Rng;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;

use super::snowflake;

/// GUILDS | GUILD_MEMBERS | GUILD_MESSAGES | MESSAGE_CONTENT
pub const INTENTS: u64 = 1 | (1 << 1) | (1 << 9) | (1 << 15);

const OP_DISPATCH: u64 = 0;
const OP_HEARTBEAT: u64 = 1;
const OP_IDENTIFY: u64 = 2;
const OP_RECONNECT: u64 = 7;
const OP_INVALID_SESSION: u64 = 9;
const OP_HELLO: u64 = 10;
const OP_HEARTBEAT_ACK: u64 = 11;

const INTERACTION_COMPONENT: u64 = 3;
const INTERACTION_MODAL_SUBMIT: u64 = 5;

/// Close codes after which reconnecting cannot help (bad token, intents).
const FATAL_CLOSE_CODES: &[u16] = &[4004, 4010, 4011, 4012, 4013, 4014];

const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Something the router has to handle.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    Command(IncomingCommand),
    Interaction(Interaction),
}

/// How a session ended.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    Cancelled,
    /// Reconnect; `true` when the session got as far as READY.
    Reconnect(bool),
}

pub struct GatewayListener {
    token: String,
    url: String,
    intents: u64,
}

impl GatewayListener {
    pub fn new(token: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            url: url.into(),
            intents: INTENTS,
        }
    }

    /// Keep a session open until `cancel` fires, reconnecting with backoff.
    /// Returns an error only for fatal close codes.
    pub async fn run(&self, tx: mpsc::Sender<GatewayEvent>, cancel: CancellationToken) -> Result<()> {
        let mut backoff = Duration::from_secs(1);
        loop {
            match self.session(&tx, &cancel).await {
                Ok(SessionEnd::Cancelled) => {
                    tracing::info!("🔌 Discord gateway closed");
                    return Ok(());
                }
                Ok(SessionEnd::Reconnect(ready)) => {
                    if ready {
                        backoff = Duration::from_secs(1);
                    }
                    tracing::info!("🔄 Discord gateway reconnecting");
                }
                Err(e @ MooglyError::Gateway(_)) => return Err(e),
                Err(e) => tracing::warn!("⚠️ Discord gateway session failed: {e}"),
            }

            let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..1000));
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(backoff + jitter) => {}
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    async fn session(
        &self,
        tx: &mpsc::Sender<GatewayEvent>,
        cancel: &CancellationToken,
    ) -> Result<SessionEnd> {
        let url = format!("{}/?v=10&encoding=json", self.url.trim_end_matches('/'));
        let (ws, _response) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| MooglyError::Channel(format!("WebSocket connect failed: {e}")))?;
        let (mut write, mut read) = ws.split();
        tracing::debug!("Discord gateway connected: {url}");

        // Hello carries the heartbeat interval.
        let hello = match read.next().await {
            Some(Ok(WsMessage::Text(text))) => serde_json::from_str::<Value>(&text)?,
            other => {
                return Err(MooglyError::Channel(format!(
                    "Expected hello from gateway, got {other:?}"
                )));
            }
        };
        if hello["op"].as_u64() != Some(OP_HELLO) {
            return Err(MooglyError::Channel(format!("Expected hello, got {hello}")));
        }
        let interval = Duration::from_millis(hello["d"]["heartbeat_interval"].as_u64().unwrap_or(41_250));

        send(&mut write, &self.identify()).await?;

        let first_beat = interval.mul_f64(rand::thread_rng().gen_range(0.0..1.0));
        let mut heartbeat = tokio::time::interval_at(Instant::now() + first_beat, interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut seq: Option<u64> = None;
        let mut acked = true;
        let mut ready = false;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    write.send(WsMessage::Close(None)).await.ok();
                    return Ok(SessionEnd::Cancelled);
                }
                _ = heartbeat.tick() => {
                    if !acked {
                        tracing::warn!("⚠️ Discord heartbeat not acknowledged, reconnecting");
                        return Ok(SessionEnd::Reconnect(ready));
                    }
                    acked = false;
                    send(&mut write, &json!({ "op": OP_HEARTBEAT, "d": seq })).await?;
                }
                frame = read.next() => {
                    let text = match frame {
                        Some(Ok(WsMessage::Text(text))) => text,
                        Some(Ok(WsMessage::Close(frame))) => {
                            let code = frame.as_ref().map(|f| u16::from(f.code)).unwrap_or(1000);
                            if FATAL_CLOSE_CODES.contains(&code) {
                                return Err(MooglyError::Gateway(format!(
                                    "Discord closed the gateway with code {code}"
                                )));
                            }
                            tracing::info!("Discord gateway closed with code {code}");
                            return Ok(SessionEnd::Reconnect(ready));
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            tracing::warn!("⚠️ Discord gateway read error: {e}");
                            return Ok(SessionEnd::Reconnect(ready));
                        }
                        None => return Ok(SessionEnd::Reconnect(ready)),
                    };

                    let payload: Value = match serde_json::from_str(&text) {
                        Ok(v) => v,
                        Err(e) => {
                            tracing::warn!("⚠️ Unparseable gateway payload: {e}");
                            continue;
                        }
                    };
                    if let Some(s) = payload["s"].as_u64() {
                        seq = Some(s);
                    }

                    match payload["op"].as_u64().unwrap_or(u64::MAX) {
                        OP_DISPATCH => {
                            let kind = payload["t"].as_str().unwrap_or_default();
                            if kind == "READY" {
                                ready = true;
                                let name = payload["d"]["user"]["username"].as_str().unwrap_or("?");
                                tracing::info!("🤖 Discord gateway ready as {name}");
                            }
                            if let Some(event) = parse_dispatch(kind, &payload["d"]) {
                                if tx.send(event).await.is_err() {
                                    tracing::info!("Gateway receiver dropped, closing");
                                    return Ok(SessionEnd::Cancelled);
                                }
                            }
                        }
                        OP_HEARTBEAT => {
                            send(&mut write, &json!({ "op": OP_HEARTBEAT, "d": seq })).await?;
                        }
                        OP_HEARTBEAT_ACK => acked = true,
                        OP_RECONNECT => return Ok(SessionEnd::Reconnect(ready)),
                        OP_INVALID_SESSION => {
                            tracing::warn!("⚠️ Discord invalidated the gateway session");
                            return Ok(SessionEnd::Reconnect(false));
                        }
                        op => tracing::trace!("Ignoring gateway op {op}"),
                    }
                }
            }
        }
    }

    fn identify(&self) -> Value {
        json!({
            "op": OP_IDENTIFY,
            "d": {
                "token": self.token,
                "intents": self.intents,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": "moogly",
                    "device": "moogly",
                },
            },
        })
    }
}

async fn send<S>(write: &mut S, payload: &Value) -> Result<()>
where
    S: futures::Sink<WsMessage> + Unpin,
    S::Error: std::fmt::Display,
{
    write
        .send(WsMessage::Text(payload.to_string()))
        .await
        .map_err(|e| MooglyError::Channel(format!("Gateway send failed: {e}")))
}

/// Turn a dispatch payload into an event, if it is one the bot handles.
pub fn parse_dispatch(kind: &str, d: &Value) -> Option<GatewayEvent> {
    match kind {
        "MESSAGE_CREATE" => parse_message_create(d).map(GatewayEvent::Command),
        "INTERACTION_CREATE" => parse_interaction(d).map(GatewayEvent::Interaction),
        _ => None,
    }
}

/// Guild messages from humans only.
pub fn parse_message_create(d: &Value) -> Option<IncomingCommand> {
    if d["author"]["bot"].as_bool().unwrap_or(false) || d["guild_id"].is_null() {
        return None;
    }
    Some(IncomingCommand {
        channel_id: snowflake(&d["channel_id"])?,
        message_id: snowflake(&d["id"])?,
        author_id: snowflake(&d["author"]["id"])?,
        author_roles: roles(&d["member"]["roles"]),
        content: d["content"].as_str().unwrap_or_default().to_string(),
    })
}

/// Button clicks and modal submits; other interaction types are ignored.
pub fn parse_interaction(d: &Value) -> Option<Interaction> {
    let data = &d["data"];
    let kind = match d["type"].as_u64()? {
        INTERACTION_COMPONENT => InteractionKind::Button {
            custom_id: data["custom_id"].as_str()?.to_string(),
        },
        INTERACTION_MODAL_SUBMIT => {
            let fields = data["components"]
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|row| row["components"].as_array())
                .flatten()
                .filter_map(|input| {
                    Some((
                        input["custom_id"].as_str()?.to_string(),
                        input["value"].as_str().unwrap_or_default().to_string(),
                    ))
                })
                .collect();
            InteractionKind::ModalSubmit {
                custom_id: data["custom_id"].as_str()?.to_string(),
                fields,
            }
        }
        _ => return None,
    };

    let user = if d["member"]["user"].is_object() {
        &d["member"]["user"]
    } else {
        &d["user"]
    };

    Some(Interaction {
        id: d["id"].as_str()?.to_string(),
        token: d["token"].as_str()?.to_string(),
        kind,
        user_id: snowflake(&user["id"])?,
        member_roles: roles(&d["member"]["roles"]),
        channel_id: snowflake(&d["channel_id"])?,
        message_id: snowflake(&d["message"]["id"]),
    })
}

fn roles(value: &Value) -> Vec<RoleId> {
    value
        .as_array()
        .map(|ids| ids.iter().filter_map(snowflake).collect())
        .unwrap_or_default()
}
