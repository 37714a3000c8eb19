//! Process-level supervision of every session.
//!
//! The fleet holds the only receiver of the fatal channel. Each fatal
//! signal retires its session; the fleet returns once nothing is left to
//! supervise or a shutdown is requested.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::connection::Connector;
use crate::credential::write_credential;
use crate::session::{FatalSignal, Session, SessionProfile};

/// Capacity of the fatal channel.
const FATAL_CHANNEL_CAPACITY: usize = 64;

/// Outcome of [`Fleet::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FleetReport {
    /// Sessions whose first connection opened.
    pub started: usize,
    /// Sessions dropped because their first connection failed.
    pub failed_to_start: usize,
    /// Sessions retired by a fatal signal.
    pub retired: usize,
    /// Sessions still live when shutdown was requested.
    pub closed_on_shutdown: usize,
}

/// All running sessions of a process.
#[derive(Debug)]
pub struct Fleet {
    sessions: HashMap<Uuid, Session>,
    fatal_rx: mpsc::Receiver<FatalSignal>,
    retired_file: Option<PathBuf>,
    report: FleetReport,
}

impl Fleet {
    /// Start a session for every profile.
    ///
    /// First connections are opened concurrently. Sessions whose first
    /// connection fails are logged and dropped.
    pub async fn start(profiles: Vec<SessionProfile>, connector: Arc<dyn Connector>) -> Self {
        let (fatal_tx, fatal_rx) = mpsc::channel(FATAL_CHANNEL_CAPACITY);
        let mut sessions = HashMap::with_capacity(profiles.len());
        let mut report = FleetReport::default();

        let candidates: Vec<Session> = profiles
            .into_iter()
            .map(|profile| Session::new(profile, Arc::clone(&connector), fatal_tx.clone()))
            .collect();
        let outcomes = join_all(candidates.iter().map(Session::start)).await;

        for (session, outcome) in candidates.into_iter().zip(outcomes) {
            match outcome {
                Ok(()) => {
                    report.started = report.started.saturating_add(1);
                    sessions.insert(session.id(), session);
                },
                Err(e) => {
                    report.failed_to_start = report.failed_to_start.saturating_add(1);
                    warn!(
                        credential = %session.profile().display_token(),
                        error = %e,
                        "dropping session that failed to start"
                    );
                },
            }
        }

        info!(
            started = report.started,
            failed = report.failed_to_start,
            "fleet started"
        );
        Self {
            sessions,
            fatal_rx,
            retired_file: None,
            report,
        }
    }

    /// Append the credential line of every retired session to `path`.
    #[must_use]
    pub fn with_retired_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.retired_file = Some(path.into());
        self
    }

    /// Sessions currently supervised.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are left.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Supervised sessions, in no particular order.
    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// Retire sessions as their fatal signals arrive.
    ///
    /// Returns when every session is retired or `shutdown` resolves; in the
    /// latter case the remaining sessions are closed.
    pub async fn run<F>(mut self, shutdown: F) -> FleetReport
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        while !self.sessions.is_empty() {
            tokio::select! {
                biased;

                () = &mut shutdown => {
                    info!(remaining = self.sessions.len(), "shutdown requested");
                    break;
                }

                signal = self.fatal_rx.recv() => match signal {
                    Some(signal) => self.retire(signal).await,
                    None => break,
                },
            }
        }

        for (_, session) in self.sessions.drain() {
            session.close().await;
            self.report.closed_on_shutdown = self.report.closed_on_shutdown.saturating_add(1);
        }

        info!(
            retired = self.report.retired,
            closed = self.report.closed_on_shutdown,
            "fleet stopped"
        );
        self.report
    }

    async fn retire(&mut self, signal: FatalSignal) {
        let Some(session) = self.sessions.remove(&signal.session_id) else {
            debug!(session = %signal.session_id, "fatal signal for unknown session");
            return;
        };
        session.close().await;
        self.report.retired = self.report.retired.saturating_add(1);

        let profile = session.profile();
        error!(
            session = %signal.session_id,
            credential = %profile.display_token(),
            error = %signal.error,
            remaining = self.sessions.len(),
            "session retired"
        );

        if let Some(path) = &self.retired_file
            && let Err(e) = write_credential(path, &profile.credential)
        {
            error!(path = %path.display(), error = %e, "failed to record retired credential");
        }
    }
}
