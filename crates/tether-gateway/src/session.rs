//! Session supervision.
//!
//! A [`Session`] owns at most one live [`Connection`]. When that connection
//! ends, [`Session::on_terminate`] classifies the cause and either swaps in
//! a fresh connection or pushes a single [`FatalSignal`] and stops.
//!
//! # States
//!
//! ```text
//! Closed -> Connecting -> Open -> Closed
//!                      \       \-> Connecting (reconnect)
//!                       \-> Fatal (terminal)
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::classify::{Verdict, classify};
use crate::connection::{Connection, Connector, GatewaySettings};
use crate::credential::Credential;
use crate::error::GatewayError;
use crate::identity::IdentityMaterial;

// ── Profile ──────────────────────────────────────────────────

/// Everything a connector needs to open a connection for one account.
#[derive(Debug, Clone)]
pub struct SessionProfile {
    /// The account credential.
    pub credential: Credential,
    /// Proxy for ordinary requests.
    pub proxy: Option<String>,
    /// Proxy for the gateway socket, set independently of `proxy`.
    pub socket_proxy: Option<String>,
    /// Per-run client identification, shared by all sessions.
    pub identity: Arc<IdentityMaterial>,
    /// Gateway settings, shared by all sessions.
    pub settings: Arc<GatewaySettings>,
    /// Messages handed to this session. Stored, never interpreted.
    pub messages: Vec<serde_json::Value>,
}

impl SessionProfile {
    /// A profile with no proxies and no messages.
    #[must_use]
    pub fn new(
        credential: Credential,
        identity: Arc<IdentityMaterial>,
        settings: Arc<GatewaySettings>,
    ) -> Self {
        Self {
            credential,
            proxy: None,
            socket_proxy: None,
            identity,
            settings,
            messages: Vec::new(),
        }
    }

    /// The credential as it should appear in logs.
    #[must_use]
    pub fn display_token(&self) -> String {
        self.credential.display_token(self.settings.censor_credentials)
    }
}

// ── State ────────────────────────────────────────────────────

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection and none being opened.
    Closed,
    /// A connection is being opened.
    Connecting,
    /// A connection is live.
    Open,
    /// A fatal signal was pushed. Terminal.
    Fatal,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Open => write!(f, "OPEN"),
            Self::Fatal => write!(f, "FATAL"),
        }
    }
}

/// The one fatal value a session may emit.
#[derive(Debug)]
pub struct FatalSignal {
    /// The session that stopped.
    pub session_id: Uuid,
    /// Why it stopped.
    pub error: GatewayError,
}

/// Per-run activity bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Activity {
    /// Display name changed during this run.
    pub name_changed: bool,
    /// Avatar changed during this run.
    pub avatar_changed: bool,
    /// Last search query issued.
    pub last_query: Option<String>,
    /// Result count of the last query.
    pub last_count: u64,
    /// Index of the next message to send.
    pub message_number: u64,
    /// Identifier of the last message seen.
    pub last_message_id: Option<String>,
}

// ── Termination ──────────────────────────────────────────────

/// The termination callback handed to each connection.
///
/// Carries the owning session and the generation it was issued for, so a
/// late callback from a replaced connection is recognised and ignored.
#[derive(Debug, Clone)]
pub struct Termination {
    session: Session,
    generation: u64,
}

impl Termination {
    /// The generation this callback belongs to.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The session that will be notified.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Report the end of the connection.
    pub async fn fire(self, cause: Option<GatewayError>) {
        self.session.on_terminate(self.generation, cause).await;
    }
}

// ── Session ──────────────────────────────────────────────────

struct SessionInner {
    id: Uuid,
    profile: SessionProfile,
    connector: Arc<dyn Connector>,
    fatal_tx: mpsc::Sender<FatalSignal>,
    fatal_sent: AtomicBool,
    retired: AtomicBool,
    receiving: AtomicBool,
    generation: AtomicU64,
    state: watch::Sender<SessionState>,
    connection: Mutex<Option<Connection>>,
    activity: Mutex<Activity>,
}

impl std::fmt::Debug for SessionInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("credential", &self.profile.credential)
            .field("state", &*self.state.borrow())
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Supervisor for one account's gateway connection.
///
/// Cheap to clone; all clones refer to the same session.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Create a session in the `Closed` state. Nothing connects until
    /// [`Session::start`].
    #[must_use]
    pub fn new(
        profile: SessionProfile,
        connector: Arc<dyn Connector>,
        fatal_tx: mpsc::Sender<FatalSignal>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Closed);
        Self {
            inner: Arc::new(SessionInner {
                id: Uuid::new_v4(),
                profile,
                connector,
                fatal_tx,
                fatal_sent: AtomicBool::new(false),
                retired: AtomicBool::new(false),
                receiving: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                state,
                connection: Mutex::new(None),
                activity: Mutex::new(Activity::default()),
            }),
        }
    }

    /// Stable identifier of this session.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// The profile this session connects with.
    #[must_use]
    pub fn profile(&self) -> &SessionProfile {
        &self.inner.profile
    }

    /// Messages assigned to this session.
    #[must_use]
    pub fn messages(&self) -> &[serde_json::Value] {
        &self.inner.profile.messages
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    /// Watch state transitions.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Whether a live connection is installed.
    #[must_use]
    pub fn is_receiving(&self) -> bool {
        self.inner.receiving.load(Ordering::SeqCst)
    }

    /// Generation of the most recent connection attempt.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Snapshot of the activity bookkeeping.
    pub async fn activity(&self) -> Activity {
        self.inner.activity.lock().await.clone()
    }

    /// Update the activity bookkeeping.
    pub async fn record_activity(&self, update: impl FnOnce(&mut Activity)) {
        update(&mut *self.inner.activity.lock().await);
    }

    /// Open the first connection.
    ///
    /// # Errors
    ///
    /// Returns the connector's error if the handshake fails. The session is
    /// left `Closed` and no fatal signal is pushed.
    pub async fn start(&self) -> Result<(), GatewayError> {
        let token = self.inner.profile.display_token();
        self.set_state(SessionState::Connecting);

        let generation = self.generation();
        match self.open_generation(generation).await {
            Ok(connection) => {
                self.install(connection).await;
                info!(session = %self.id(), credential = %token, "session online");
                Ok(())
            },
            Err(e) => {
                warn!(
                    session = %self.id(),
                    credential = %token,
                    error = %e,
                    "failed to open initial connection"
                );
                self.set_state(SessionState::Closed);
                Err(e)
            },
        }
    }

    /// Termination handler shared by every connection of this session.
    ///
    /// Reached through [`Termination::fire`]. Callbacks from a superseded
    /// generation are ignored, as is everything after a fatal signal or a
    /// [`Session::close`].
    pub async fn on_terminate(&self, generation: u64, cause: Option<GatewayError>) {
        let inner = &self.inner;
        if generation != self.generation() {
            debug!(
                session = %inner.id,
                generation,
                current = self.generation(),
                "ignoring termination from a superseded connection"
            );
            return;
        }
        if inner.retired.load(Ordering::SeqCst) || self.state() == SessionState::Fatal {
            return;
        }

        drop(inner.connection.lock().await.take());
        inner.receiving.store(false, Ordering::SeqCst);
        let token = inner.profile.display_token();

        match classify(cause.as_ref()) {
            Verdict::Fatal => {
                error!(
                    session = %inner.id,
                    credential = %token,
                    "gateway rejected the credential"
                );
                self.push_fatal(GatewayError::AuthenticationRejected).await;
            },
            Verdict::SuspectedAuthRejection => {
                // Neither fatal nor retried.
                error!(
                    session = %inner.id,
                    credential = %token,
                    error = ?cause,
                    "connection failed with a suspected authentication rejection"
                );
                self.set_state(SessionState::Closed);
            },
            Verdict::Reconnect => {
                match &cause {
                    Some(e) => warn!(
                        session = %inner.id,
                        credential = %token,
                        error = %e,
                        "connection lost, reconnecting"
                    ),
                    None => info!(
                        session = %inner.id,
                        credential = %token,
                        "connection closed, reconnecting"
                    ),
                }
                self.reconnect(generation).await;
            },
        }
    }

    async fn reconnect(&self, previous: u64) {
        let next = previous.saturating_add(1);
        self.inner.generation.store(next, Ordering::SeqCst);
        self.set_state(SessionState::Connecting);

        match self.open_generation(next).await {
            Ok(connection) => {
                self.install(connection).await;
                info!(
                    session = %self.id(),
                    credential = %self.inner.profile.display_token(),
                    generation = next,
                    "reconnected"
                );
            },
            Err(e) => {
                error!(
                    session = %self.id(),
                    credential = %self.inner.profile.display_token(),
                    error = %e,
                    "reconnect failed"
                );
                self.push_fatal(GatewayError::ReconnectFailed {
                    source: Box::new(e),
                })
                .await;
            },
        }
    }

    /// Close the live connection and stop reacting to terminations.
    pub async fn close(&self) {
        self.inner.retired.store(true, Ordering::SeqCst);
        if let Some(connection) = self.inner.connection.lock().await.take() {
            connection.close();
        }
        self.inner.receiving.store(false, Ordering::SeqCst);
        if self.state() != SessionState::Fatal {
            self.set_state(SessionState::Closed);
        }
        debug!(session = %self.id(), "session closed");
    }

    async fn open_generation(&self, generation: u64) -> Result<Connection, GatewayError> {
        let termination = Termination {
            session: self.clone(),
            generation,
        };
        self.inner
            .connector
            .open(&self.inner.profile, termination)
            .await
    }

    /// Store a freshly opened connection and let its callback run.
    async fn install(&self, mut connection: Connection) {
        let mut slot = self.inner.connection.lock().await;
        if self.inner.retired.load(Ordering::SeqCst) {
            drop(slot);
            connection.close();
            return;
        }
        connection.arm();
        *slot = Some(connection);
        self.inner.receiving.store(true, Ordering::SeqCst);
        self.set_state(SessionState::Open);
    }

    /// Push the fatal signal. Only the first call has any effect.
    async fn push_fatal(&self, error: GatewayError) {
        if self.inner.fatal_sent.swap(true, Ordering::SeqCst) {
            debug!(session = %self.id(), error = %error, "fatal signal already sent");
            return;
        }
        self.set_state(SessionState::Fatal);
        let signal = FatalSignal {
            session_id: self.id(),
            error,
        };
        if self.inner.fatal_tx.send(signal).await.is_err() {
            debug!(session = %self.id(), "fatal channel closed");
        }
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.inner.state.send_replace(state);
        if previous != state {
            debug!(session = %self.id(), from = %previous, to = %state, "state transition");
        }
    }
}
