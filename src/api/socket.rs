//! One WebSocket connection carries one call
//!
//! The reader half decodes frames and feeds the call runtime; a writer task
//! drains encoded messages onto the socket in the order the runtime emits
//! them.

use super::protocol::{self, Decoded};
use crate::config::Config;
use crate::hooks;
use crate::runtime::{start_call, CallHandle, CommandSink, Inbound, Outbound, SinkError};
use crate::state_machine::Event;
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

const OUTBOUND_QUEUE_DEPTH: usize = 64;

/// Sink that frames messages for the socket writer
struct SocketSink {
    tx: mpsc::Sender<String>,
}

#[async_trait]
impl CommandSink for SocketSink {
    async fn deliver(&self, message: Outbound) -> Result<(), SinkError> {
        let text = protocol::encode(&message)?;
        self.tx.send(text).await.map_err(|_| SinkError::Closed)
    }
}

pub(super) async fn handle_socket(socket: WebSocket, config: Arc<Config>) {
    let connection_id = Uuid::new_v4();
    tracing::info!(%connection_id, "Telephony socket connected");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE_DEPTH);

    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if let Err(e) = ws_tx.send(Message::Text(text)).await {
                tracing::warn!(%connection_id, error = %e, "Socket write failed");
                return;
            }
        }
        let _ = ws_tx.close().await;
    });

    let sink = Arc::new(SocketSink { tx: out_tx });
    let mut call: Option<CallHandle> = None;

    let final_event = loop {
        let frame = match ws_rx.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                break Event::TransportError {
                    message: e.to_string(),
                }
            }
            None => {
                break Event::Close {
                    code: None,
                    reason: "connection dropped".to_string(),
                }
            }
        };

        let text = match frame {
            Message::Text(text) => text,
            Message::Close(frame) => {
                break Event::Close {
                    code: frame.as_ref().map(|f| f.code),
                    reason: frame.map(|f| f.reason.into_owned()).unwrap_or_default(),
                }
            }
            // Pings are answered by axum; no binary frames on this protocol
            _ => continue,
        };

        let decoded = match protocol::decode(&text) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(%connection_id, error = %e, "Undecodable frame");
                continue;
            }
        };

        match decoded {
            Decoded::SessionNew { msgid, call_sid } => {
                let handle = call.get_or_insert_with(|| {
                    tracing::info!(%connection_id, %call_sid, "New call session");
                    start_call(config.call_context(call_sid.clone()), sink.clone())
                });
                handle
                    .send(Inbound::hook(msgid, Event::SessionNew { call_sid }))
                    .await;
            }

            Decoded::Hook { msgid, hook, data } => {
                let Some(handle) = call.as_ref() else {
                    tracing::warn!(%connection_id, %hook, "Hook before session:new");
                    if let Some(msgid) = msgid {
                        let _ = sink.deliver(Outbound::Ack { msgid, verbs: vec![] }).await;
                    }
                    continue;
                };

                match hooks::route(&hook, data) {
                    Ok(event) => {
                        tracing::debug!(%connection_id, %hook, event = event.name(), "Hook received");
                        let inbound = match msgid {
                            Some(msgid) => Inbound::hook(msgid, event),
                            None => Inbound::notification(event),
                        };
                        handle.send(inbound).await;
                    }
                    Err(e) => {
                        tracing::warn!(%connection_id, %hook, error = %e, "Unroutable hook");
                        // The runtime only stops once the call is closed
                        if let (Some(msgid), false) = (msgid, handle.event_tx.is_closed()) {
                            let _ = sink.deliver(Outbound::Ack { msgid, verbs: vec![] }).await;
                        }
                    }
                }
            }

            Decoded::CallStatus { status, terminal } => {
                tracing::info!(%connection_id, %status, "Call status");
                if let (true, Some(handle)) = (terminal, call.as_ref()) {
                    handle
                        .send(Inbound::notification(Event::Close {
                            code: None,
                            reason: format!("call {status}"),
                        }))
                        .await;
                }
            }

            Decoded::Error { message } => {
                tracing::error!(%connection_id, %message, "Telephony platform error");
                if let Some(handle) = call.as_ref() {
                    handle
                        .send(Inbound::notification(Event::TransportError { message }))
                        .await;
                }
            }

            Decoded::Ignored { kind } => {
                tracing::debug!(%connection_id, kind, "Ignoring message");
            }
        }
    };

    match call {
        Some(handle) => {
            // Rejected if the call already closed itself
            handle.send(Inbound::notification(final_event)).await;

            let CallHandle { event_tx, task, .. } = handle;
            drop(event_tx);
            match task.await {
                Ok(session) => tracing::info!(
                    %connection_id,
                    call_sid = %session.id,
                    state = ?session.state,
                    close_reason = ?session.close_reason,
                    "Call finished"
                ),
                Err(e) => tracing::error!(%connection_id, error = %e, "Call runtime failed"),
            }
        }
        None => tracing::info!(%connection_id, event = final_event.name(), "Socket closed before any call"),
    }

    // Last sender gone; the writer flushes and closes the socket
    drop(sink);
    let _ = writer.await;
    tracing::info!(%connection_id, "Telephony socket closed");
}
