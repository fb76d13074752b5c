//! Realtime change streams over the Phoenix channel protocol
//!
//! Each subscription opens its own websocket, joins `realtime:<table>` asking for
//! `postgres_changes` on that table, waits for the join to be accepted, and keeps
//! the socket alive with heartbeats.
//! Releasing the subscription sends `phx_leave` and closes the socket.

use futures::{SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use barkeep_api::streaming::EventStream;
use barkeep_api::{ApiError, ChangeEvent, ChangeKind, Row, Subscription};

use crate::config::SupabaseConfig;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// How long the server has to answer `phx_join`
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

const JOIN_REF: &str = "1";

/// A frame of the Phoenix channel protocol (serializer version 1.0.0)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
}

impl PhoenixMessage {
    fn new(topic: &str, event: &str, payload: Value, msg_ref: u64) -> Self {
        Self {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            msg_ref: Some(msg_ref.to_string()),
        }
    }

    fn into_frame(self) -> Result<Message, ApiError> {
        serde_json::to_string(&self)
            .map(Message::Text)
            .map_err(|e| ApiError::SubscriptionError {
                message: format!("cannot encode {} message: {}", self.event, e),
            })
    }
}

pub fn topic(table: &str) -> String {
    format!("realtime:{}", table)
}

/// `phx_join` asking for the given kinds of row changes on `table`.
pub fn join_message(config: &SupabaseConfig, table: &str, kinds: &[ChangeKind]) -> PhoenixMessage {
    let events: Vec<&str> = if ChangeKind::ALL.iter().all(|k| kinds.contains(k)) {
        vec!["*"]
    } else {
        kinds.iter().map(ChangeKind::as_str).collect()
    };
    let postgres_changes: Vec<Value> = events
        .into_iter()
        .map(|event| json!({"event": event, "schema": config.schema, "table": table}))
        .collect();

    PhoenixMessage {
        topic: topic(table),
        event: "phx_join".to_string(),
        payload: json!({
            "config": {
                "broadcast": {"ack": false, "self": false},
                "presence": {"key": ""},
                "postgres_changes": postgres_changes,
            },
            "access_token": config.anon_key,
        }),
        msg_ref: Some(JOIN_REF.to_string()),
    }
}

pub fn heartbeat_message(msg_ref: u64) -> PhoenixMessage {
    PhoenixMessage::new("phoenix", "heartbeat", json!({}), msg_ref)
}

pub fn leave_message(table: &str, msg_ref: u64) -> PhoenixMessage {
    PhoenixMessage::new(&topic(table), "phx_leave", json!({}), msg_ref)
}

/// What an incoming frame means for the subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Change(ChangeEvent),
    Failure(ApiError),
    Closed,
    Ignored,
}

fn object(value: &Value) -> Option<Row> {
    value.as_object().filter(|row| !row.is_empty()).cloned()
}

/// Interpret one text frame received on the socket.
pub fn decode(text: &str) -> Incoming {
    let message: PhoenixMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            return Incoming::Failure(ApiError::SubscriptionError {
                message: format!("undecodable realtime frame: {}", e),
            });
        }
    };
    let status = message.payload.get("status").and_then(Value::as_str);

    match message.event.as_str() {
        "postgres_changes" => {
            let data = &message.payload["data"];
            let table = data["table"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| message.topic.trim_start_matches("realtime:").to_string());
            match serde_json::from_value::<ChangeKind>(data["type"].clone()) {
                Ok(kind) => Incoming::Change(ChangeEvent {
                    kind,
                    table,
                    new: object(&data["record"]),
                    old: object(&data["old_record"]),
                }),
                Err(e) => Incoming::Failure(ApiError::MalformedEvent {
                    table,
                    message: format!("unknown change type {}: {}", data["type"], e),
                }),
            }
        }
        "phx_reply" | "system" if status == Some("error") => {
            Incoming::Failure(ApiError::SubscriptionError {
                message: format!("{} rejected: {}", message.topic, message.payload),
            })
        }
        "phx_error" => Incoming::Failure(ApiError::SubscriptionError {
            message: format!("channel {} crashed", message.topic),
        }),
        "phx_close" => Incoming::Closed,
        _ => Incoming::Ignored,
    }
}

/// The server's answer to our `phx_join`, if `text` is it.
pub fn join_reply(text: &str) -> Option<Result<(), ApiError>> {
    let message: PhoenixMessage = serde_json::from_str(text).ok()?;
    if message.event != "phx_reply" || message.msg_ref.as_deref() != Some(JOIN_REF) {
        return None;
    }
    match message.payload.get("status").and_then(Value::as_str) {
        Some("ok") => Some(Ok(())),
        _ => Some(Err(ApiError::SubscriptionError {
            message: format!("joining {} rejected: {}", message.topic, message.payload),
        })),
    }
}

/// Read frames until the join is answered, the socket closes or `limit` passes.
pub async fn await_join<S>(frames: &mut S, table: &str, limit: Duration) -> Result<(), ApiError>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let reply = async {
        while let Some(frame) = frames.next().await {
            match frame.map_err(socket_error)? {
                Message::Text(text) => match join_reply(&text) {
                    Some(reply) => return reply,
                    None => debug!("[Realtime] frame before join reply on {}: {}", table, text),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
        Err(ApiError::SubscriptionError {
            message: format!("socket closed before {} was joined", topic(table)),
        })
    };
    tokio::time::timeout(limit, reply)
        .await
        .map_err(|_| ApiError::SubscriptionError {
            message: format!("no reply to joining {} within {:?}", topic(table), limit),
        })?
}

fn socket_error(e: impl std::fmt::Display) -> ApiError {
    ApiError::SubscriptionError {
        message: format!("realtime socket: {}", e),
    }
}

/// Open a socket, join the table's channel and stream its change events.
pub async fn subscribe(
    config: &SupabaseConfig,
    table: &str,
    kinds: &[ChangeKind],
) -> Result<Subscription, ApiError> {
    let url = config.realtime_url()?;
    let (socket, _) = connect_async(url.as_str()).await.map_err(socket_error)?;
    let (mut sink, mut frames) = socket.split();

    sink.send(join_message(config, table, kinds).into_frame()?)
        .await
        .map_err(socket_error)?;
    await_join(&mut frames, table, JOIN_TIMEOUT).await?;
    info!("[Realtime] joined {}", topic(table));

    let (event_tx, event_rx) = mpsc::channel(256);
    let (leave_tx, mut leave_rx) = oneshot::channel::<()>();
    let channel_table = table.to_string();

    tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        // The first tick completes immediately
        heartbeat.tick().await;
        let mut next_ref: u64 = 2;

        loop {
            tokio::select! {
                _ = &mut leave_rx => {
                    if let Ok(frame) = leave_message(&channel_table, next_ref).into_frame() {
                        let _ = sink.send(frame).await;
                    }
                    let _ = sink.close().await;
                    info!("[Realtime] left {}", topic(&channel_table));
                    break;
                }
                _ = heartbeat.tick() => {
                    let sent = match heartbeat_message(next_ref).into_frame() {
                        Ok(frame) => sink.send(frame).await.map_err(socket_error),
                        Err(e) => Err(e),
                    };
                    next_ref += 1;
                    if let Err(e) = sent {
                        let _ = event_tx.send(Err(e)).await;
                        break;
                    }
                }
                frame = frames.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let forwarded = match decode(&text) {
                            Incoming::Change(event) => event_tx.send(Ok(event)).await,
                            Incoming::Failure(e) => event_tx.send(Err(e)).await,
                            Incoming::Closed => break,
                            Incoming::Ignored => {
                                debug!("[Realtime] ignoring frame on {}: {}", channel_table, text);
                                Ok(())
                            }
                        };
                        if forwarded.is_err() {
                            // Subscriber is gone
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        warn!("[Realtime] socket for {} closed by server", channel_table);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let _ = event_tx.send(Err(socket_error(e))).await;
                        break;
                    }
                }
            }
        }
    });

    let events: EventStream = Box::pin(ReceiverStream::new(event_rx));
    Ok(Subscription::new(table, events).on_release(move || {
        // The socket task may already be gone
        let _ = leave_tx.send(());
    }))
}
