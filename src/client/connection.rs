//! Transport actor (C11): one task owns the socket, reconnect loop, and the
//! application-level heartbeat.
//!
//! Grounded on this codebase's `PolymarketMarketWsCache::run`/`connect_and_stream`
//! pair: a `tokio_tungstenite` connection driven by `tokio::select!` over a
//! ping tick, an outbound command channel, and the inbound stream, with
//! exponential backoff on disconnect. The heartbeat here is application-level
//! (`PING`/`PONG` JSON frames, §6.4) rather than WS control frames, since two
//! consecutive missed `PONG`s is the signal this protocol defines for a dead
//! connection.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval, sleep};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{info, warn};

use crate::protocol::{self, ClientMessage, ServerMessage};

use super::state::{ClientState, ConnectionState};

pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;
pub const MAX_MISSED_PONGS: u32 = 2;

/// Handle the public API sends outbound frames through.
pub struct ConnectionHandle {
    pub outbound: mpsc::Sender<ClientMessage>,
}

/// Spawn the connection actor. `token` is resent as a fresh `LOGIN` on every
/// (re)connect — the session on the other end does not survive a transport
/// drop, so neither does authentication.
pub fn spawn(
    url: String,
    token: String,
    state: Arc<ClientState>,
    inbound_tx: mpsc::UnboundedSender<ServerMessage>,
    heartbeat_interval_secs: u64,
) -> ConnectionHandle {
    let (outbound_tx, outbound_rx) = mpsc::channel::<ClientMessage>(256);
    tokio::spawn(run(url, token, state, inbound_tx, outbound_rx, heartbeat_interval_secs));
    ConnectionHandle { outbound: outbound_tx }
}

async fn run(
    url: String,
    token: String,
    state: Arc<ClientState>,
    inbound_tx: mpsc::UnboundedSender<ServerMessage>,
    mut outbound_rx: mpsc::Receiver<ClientMessage>,
    heartbeat_interval_secs: u64,
) {
    let mut reconnect_delay = Duration::from_secs(1);
    let max_reconnect_delay = Duration::from_secs(30);

    loop {
        state.set(ConnectionState::Connecting);
        match connect_and_stream(&url, &token, &state, &inbound_tx, &mut outbound_rx, heartbeat_interval_secs).await {
            Ok(()) => {
                state.set(ConnectionState::Closed);
                return;
            }
            Err(e) => {
                warn!(error = %e, "client connection lost, reconnecting");
                state.set(ConnectionState::Reconnecting);
                sleep(reconnect_delay).await;
                reconnect_delay = (reconnect_delay * 2).min(max_reconnect_delay);
            }
        }
    }
}

async fn connect_and_stream(
    url: &str,
    token: &str,
    state: &Arc<ClientState>,
    inbound_tx: &mpsc::UnboundedSender<ServerMessage>,
    outbound_rx: &mut mpsc::Receiver<ClientMessage>,
    heartbeat_interval_secs: u64,
) -> anyhow::Result<()> {
    info!("connecting to market engine at {url}");
    let (ws_stream, _resp) = connect_async(url).await.context("connect_async market engine")?;
    state.set(ConnectionState::Connected);
    let (mut write, mut read) = ws_stream.split();

    let login = ClientMessage::Login {
        token: token.to_string(),
        tz: None,
    };
    write
        .send(WsMessage::Text(protocol::encode_client_message(&login)))
        .await
        .context("send LOGIN")?;

    let mut ping = interval(Duration::from_secs(heartbeat_interval_secs.max(1)));
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut missed_pongs: u32 = 0;

    loop {
        tokio::select! {
            _ = ping.tick() => {
                if missed_pongs >= MAX_MISSED_PONGS {
                    return Err(anyhow::anyhow!("heartbeat: {missed_pongs} consecutive PONGs missed"));
                }
                missed_pongs += 1;
                let _ = write.send(WsMessage::Text(protocol::encode_client_message(&ClientMessage::Ping {}))).await;
            }
            outbound = outbound_rx.recv() => {
                let Some(msg) = outbound else {
                    return Ok(()); // caller dropped the handle: shut down cleanly, no reconnect.
                };
                if write.send(WsMessage::Text(protocol::encode_client_message(&msg))).await.is_err() {
                    return Err(anyhow::anyhow!("write failed"));
                }
            }
            ws_msg = read.next() => {
                let Some(ws_msg) = ws_msg else {
                    return Err(anyhow::anyhow!("server closed the stream"));
                };
                match ws_msg {
                    Ok(WsMessage::Text(text)) => {
                        let Ok(server_msg) = protocol::decode_server_message(&text) else {
                            continue;
                        };
                        if matches!(server_msg, ServerMessage::Pong {}) {
                            missed_pongs = 0;
                            continue;
                        }
                        match &server_msg {
                            ServerMessage::LoginOk { .. } => {
                                state.set(ConnectionState::Authenticated);
                                state.resolve_login(Ok(server_msg.clone()));
                                // Reconnect resync: if this isn't the very first login, the
                                // server has no memory of what we've already seen, so replay
                                // anything missed since our last observed event (§4.11).
                                if let Some(last_sync) = state.last_known_event_time() {
                                    let resync = ClientMessage::Resync { last_sync };
                                    let _ = write.send(WsMessage::Text(protocol::encode_client_message(&resync))).await;
                                }
                            }
                            ServerMessage::Error { .. } if state.get() != ConnectionState::Authenticated => {
                                state.resolve_login(Err(server_msg.clone()));
                            }
                            ServerMessage::Fill { server_time, .. } => state.note_event_time(*server_time),
                            ServerMessage::EventDelta { events, .. } => {
                                for event in events {
                                    if let ServerMessage::Fill { server_time, .. } = event {
                                        state.note_event_time(*server_time);
                                    }
                                }
                            }
                            _ => {}
                        }
                        let _ = inbound_tx.send(server_msg);
                    }
                    Ok(WsMessage::Ping(payload)) => {
                        let _ = write.send(WsMessage::Pong(payload)).await;
                    }
                    Ok(WsMessage::Close(frame)) => {
                        return Err(anyhow::anyhow!("server sent close frame: {frame:?}"));
                    }
                    Ok(_) => {}
                    Err(e) => return Err(anyhow::anyhow!("ws read error: {e}")),
                }
            }
        }
    }
}
