//! Heartbeat task and zombie detection.
//!
//! Runs beside the connection's read loop. A heartbeat whose ACK has not
//! arrived by the time the next one is due marks the connection a zombie.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::protocol::{self, GatewayPayload};

/// ACK bookkeeping shared between the heartbeat task and the read loop.
#[derive(Debug)]
pub(crate) struct HeartbeatState {
    awaiting_ack: bool,
    sent: u64,
}

impl HeartbeatState {
    pub(crate) fn new() -> Self {
        Self {
            awaiting_ack: false,
            sent: 0,
        }
    }

    pub(crate) fn ack_received(&mut self) {
        self.awaiting_ack = false;
        trace!(sent = self.sent, "heartbeat ACK received");
    }

    /// Mark a heartbeat as sent. Returns `false` if the previous one is
    /// still unacknowledged.
    fn begin_beat(&mut self) -> bool {
        if self.awaiting_ack {
            return false;
        }
        self.awaiting_ack = true;
        self.sent = self.sent.saturating_add(1);
        true
    }
}

/// Delay before the first beat: a uniform fraction of the interval.
fn first_delay(interval_ms: u64) -> Duration {
    let per_mille = u64::from(fastrand::u32(0..1000));
    Duration::from_millis(interval_ms.saturating_mul(per_mille) / 1000)
}

/// Send heartbeats every `interval_ms` until the writer goes away or an
/// ACK is missed.
///
/// On a missed ACK `zombie_tx` fires and the task exits. The task has no
/// shutdown signal of its own; the owning connection aborts it.
pub(crate) async fn run_heartbeat(
    interval_ms: u64,
    sequence: Arc<Mutex<Option<u64>>>,
    state: Arc<Mutex<HeartbeatState>>,
    outbound: mpsc::Sender<GatewayPayload>,
    zombie_tx: oneshot::Sender<()>,
) {
    let delay = first_delay(interval_ms);
    debug!(
        interval_ms,
        first_delay = ?delay,
        "heartbeat task started"
    );
    tokio::time::sleep(delay).await;

    let interval = Duration::from_millis(interval_ms);
    loop {
        match beat(&sequence, &state, &outbound).await {
            Beat::Sent => {},
            Beat::Zombie => {
                warn!("heartbeat ACK missed, connection is a zombie");
                let _ = zombie_tx.send(());
                return;
            },
            Beat::WriterGone => {
                debug!("writer closed, heartbeat task exiting");
                return;
            },
        }
        tokio::time::sleep(interval).await;
    }
}

enum Beat {
    Sent,
    Zombie,
    WriterGone,
}

async fn beat(
    sequence: &Mutex<Option<u64>>,
    state: &Mutex<HeartbeatState>,
    outbound: &mpsc::Sender<GatewayPayload>,
) -> Beat {
    if !state.lock().await.begin_beat() {
        return Beat::Zombie;
    }

    let seq = *sequence.lock().await;
    debug!(seq = ?seq, "sending heartbeat");
    if outbound.send(protocol::build_heartbeat(seq)).await.is_err() {
        return Beat::WriterGone;
    }
    Beat::Sent
}
