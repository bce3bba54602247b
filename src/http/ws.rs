//! Connection manager.
//!
//! Follows the `dashboard::handlers::event_stream` SSE loop this crate is
//! built from — same idea of "wake on store change, push a frame" —
//! generalized from a single one-way stream to a registered set of
//! WebSocket peers. No per-peer queue: a peer that can't keep up gets
//! dropped rather than buffered, so one slow client never backs up
//! broadcasts for the rest.

use axum::extract::ws::{Message, WebSocket};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

#[derive(Serialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum Frame<'a> {
    Init {
        agents: &'a [crate::models::AgentProcess],
        repos: &'a [super::dto::RepoDto],
        ports: &'a [crate::models::ListeningPort],
        sessions: &'a [super::dto::SessionDto],
    },
    Agents {
        agents: &'a [crate::models::AgentProcess],
    },
    Repos {
        repos: &'a [super::dto::RepoDto],
    },
    Ports {
        ports: &'a [crate::models::ListeningPort],
    },
    Session {
        session: &'a super::dto::SessionDto,
    },
}

/// A registered WebSocket peer. Holds an mpsc sender so the broadcaster
/// doesn't need to await each peer's socket write directly.
struct Peer {
    tx: mpsc::UnboundedSender<Message>,
}

#[derive(Default)]
pub struct ConnectionManager {
    peers: Mutex<HashMap<u64, Peer>>,
    next_id: AtomicU64,
}

impl ConnectionManager {
    pub fn new() -> Self {
        ConnectionManager { peers: Mutex::new(HashMap::new()), next_id: AtomicU64::new(1) }
    }

    fn register(&self) -> (u64, mpsc::UnboundedReceiver<Message>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.peers.lock().unwrap().insert(id, Peer { tx });
        (id, rx)
    }

    fn unregister(&self, id: u64) {
        self.peers.lock().unwrap().remove(&id);
    }

    /// Pre-serialize once, send to every peer; any send error removes that
    /// peer immediately.
    pub fn broadcast<T: Serialize>(&self, frame: &T) {
        let Ok(text) = serde_json::to_string(frame) else { return };
        let mut peers = self.peers.lock().unwrap();
        peers.retain(|_, peer| peer.tx.send(Message::Text(text.clone())).is_ok());
    }

    pub fn peer_count(&self) -> usize {
        self.peers.lock().unwrap().len()
    }
}

/// Drive one accepted WebSocket connection: send the init frame, then
/// forward broadcast frames and respond to pings until the peer closes or a
/// send fails.
pub async fn handle_socket(mut socket: WebSocket, state: super::AppState, init: Frame<'_>) {
    let Ok(init_text) = serde_json::to_string(&init) else { return };
    if socket.send(Message::Text(init_text)).await.is_err() {
        return;
    }

    let (id, mut rx) = state.connections.register();

    loop {
        tokio::select! {
            outgoing = rx.recv() => {
                match outgoing {
                    Some(message) => {
                        if socket.send(message).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(payload))) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    state.connections.unregister(id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_to_no_peers_is_a_noop() {
        let manager = ConnectionManager::new();
        manager.broadcast(&serde_json::json!({"type": "ping"}));
        assert_eq!(manager.peer_count(), 0);
    }

    #[test]
    fn dropped_receiver_is_pruned_on_next_broadcast() {
        let manager = ConnectionManager::new();
        let (id, rx) = manager.register();
        drop(rx);
        manager.broadcast(&serde_json::json!({"type": "ping"}));
        assert_eq!(manager.peer_count(), 0);
        let _ = id;
    }
}
