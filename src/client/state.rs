//! Client connection state (C13): lifecycle, login gate, listener fan-out.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{oneshot, Notify};

use crate::protocol::ServerMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Authenticated,
    Reconnecting,
    Closed,
}

pub type Listener = Arc<dyn Fn(&ServerMessage) + Send + Sync>;

/// Copy-on-write listener set. `snapshot()` clones the current `Arc<Vec<_>>`
/// under a short read lock; dispatch then iterates the snapshot without
/// holding any lock, so a listener that calls back into `add` doesn't
/// deadlock and a slow listener doesn't block registration.
#[derive(Default)]
pub struct ListenerSet {
    inner: RwLock<Arc<Vec<Listener>>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Arc::new(Vec::new())),
        }
    }

    pub fn add(&self, listener: Listener) {
        let mut guard = self.inner.write();
        let mut next = (**guard).clone();
        next.push(listener);
        *guard = Arc::new(next);
    }

    pub fn snapshot(&self) -> Arc<Vec<Listener>> {
        self.inner.read().clone()
    }
}

/// `Ok` carries the `LOGIN_OK` frame; `Err` carries the server's `ERROR` frame.
type LoginResult = Result<ServerMessage, ServerMessage>;

/// Shared state a connection's reader task updates and the public API reads.
pub struct ClientState {
    state: RwLock<ConnectionState>,
    pending_login: Mutex<Option<oneshot::Sender<LoginResult>>>,
    state_changed: Notify,
    pub listeners: ListenerSet,
    /// The `executed_at` of the most recent FILL this client has observed, used
    /// to drive the automatic post-reconnect RESYNC (§3, §4.11).
    last_known_event_time: Mutex<Option<DateTime<Utc>>>,
}

impl Default for ClientState {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientState {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ConnectionState::Disconnected),
            pending_login: Mutex::new(None),
            state_changed: Notify::new(),
            listeners: ListenerSet::new(),
            last_known_event_time: Mutex::new(None),
        }
    }

    pub fn last_known_event_time(&self) -> Option<DateTime<Utc>> {
        *self.last_known_event_time.lock()
    }

    /// Advance the high-water mark if `at` is newer than what's recorded.
    pub fn note_event_time(&self, at: DateTime<Utc>) {
        let mut guard = self.last_known_event_time.lock();
        if guard.map(|prev| at > prev).unwrap_or(true) {
            *guard = Some(at);
        }
    }

    pub fn get(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn set(&self, next: ConnectionState) {
        *self.state.write() = next;
        self.state_changed.notify_waiters();
    }

    /// Wait until the state is `Authenticated` (§6.5: nothing may be sent
    /// before the login handshake completes, including across a reconnect).
    pub async fn wait_authenticated(&self) {
        loop {
            if self.get() == ConnectionState::Authenticated {
                return;
            }
            let notified = self.state_changed.notified();
            if self.get() == ConnectionState::Authenticated {
                return;
            }
            notified.await;
        }
    }

    /// Arm a fresh one-shot login gate, replacing (and dropping) any prior
    /// one. Returns the receiving half the caller awaits.
    pub fn arm_login_gate(&self) -> oneshot::Receiver<LoginResult> {
        let (tx, rx) = oneshot::channel();
        *self.pending_login.lock() = Some(tx);
        rx
    }

    /// Resolve the armed login gate, if any. A no-op if nothing is waiting
    /// (e.g. a duplicate LOGIN_OK arrived after the first already resolved).
    pub fn resolve_login(&self, result: LoginResult) {
        if let Some(tx) = self.pending_login.lock().take() {
            let _ = tx.send(result);
        }
    }
}
