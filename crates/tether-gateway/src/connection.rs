//! Gateway connections.
//!
//! A [`Connection`] is one socket's lifetime. Its read path runs in its own
//! task from the moment [`Connector::open`] returns. When the read path ends
//! the connection hands the cause to its [`Termination`], but only after the
//! owning session has armed it, so the callback can never run re-entrantly
//! from inside `open()`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::USER_AGENT;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, client_async_tls};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::GatewayError;
use crate::heartbeat::{self, HeartbeatState};
use crate::protocol::{self, GatewayPayload, HelloPayload, close_code, opcode};
use crate::proxy::{self, ProxyEndpoint};
use crate::session::{SessionProfile, Termination};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

/// Gateway settings shared by every session of a run.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// `ws://` or `wss://` gateway URL.
    pub url: String,
    /// How long to wait for Hello after the upgrade.
    pub hello_timeout: Duration,
    /// Intents bitmask sent in Identify.
    pub intents: u32,
    /// Mask credentials in log lines.
    pub censor_credentials: bool,
}

impl GatewaySettings {
    /// Settings for `url` with a 30 second hello timeout.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            hello_timeout: Duration::from_secs(30),
            intents: 513,
            censor_credentials: true,
        }
    }
}

// ── Connector ────────────────────────────────────────────────

/// Opens connections for sessions.
///
/// Implementations establish the socket and start the read path before
/// returning. A failed handshake is reported as an error and never reaches
/// the termination callback.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a connection for `profile` that reports its end to `termination`.
    async fn open(
        &self,
        profile: &SessionProfile,
        termination: Termination,
    ) -> Result<Connection, GatewayError>;
}

// ── Connection ───────────────────────────────────────────────

/// A live connection owned by exactly one session.
///
/// Offers no operation besides closing. Dropping an unarmed connection
/// aborts its task without firing the termination callback.
#[derive(Debug)]
pub struct Connection {
    generation: u64,
    armed: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Connection {
    /// Spawn the task that drives `run` and then reports its result.
    ///
    /// `run` resolves to the terminating error, or `None` for a clean close.
    /// The result reaches `termination` only once the connection is armed.
    pub fn spawn<F>(run: F, termination: Termination) -> Self
    where
        F: Future<Output = Option<GatewayError>> + Send + 'static,
    {
        let generation = termination.generation();
        let (armed_tx, armed_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let cause = run.await;
            if armed_rx.await.is_err() {
                debug!(generation, "connection discarded before it was armed");
                return;
            }
            termination.fire(cause).await;
        });

        Self {
            generation,
            armed: Some(armed_tx),
            task,
        }
    }

    /// Allow the termination callback to run.
    pub(crate) fn arm(&mut self) {
        if let Some(tx) = self.armed.take() {
            let _ = tx.send(());
        }
    }

    /// The generation this connection was opened for.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Stop the connection without invoking its termination callback.
    pub fn close(self) {
        self.task.abort();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // Once armed the task owns the termination path and may be the one
        // dropping this handle, so only unarmed connections are aborted.
        if self.armed.is_some() {
            self.task.abort();
        }
    }
}

// ── WebSocket connector ──────────────────────────────────────

/// [`Connector`] for the JSON gateway over `WebSocket`.
#[derive(Debug, Default, Clone, Copy)]
pub struct GatewayConnector;

impl GatewayConnector {
    /// Create a connector.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for GatewayConnector {
    async fn open(
        &self,
        profile: &SessionProfile,
        termination: Termination,
    ) -> Result<Connection, GatewayError> {
        let settings = &profile.settings;
        let generation = termination.generation();
        info!(
            credential = %profile.display_token(),
            generation,
            url = %settings.url,
            via_proxy = profile.socket_proxy.is_some(),
            "connecting to gateway"
        );

        let ws = connect(profile).await?;
        let (ws_writer, mut ws_reader) = ws.split();

        let hello = wait_for_hello(&mut ws_reader, settings.hello_timeout).await?;

        let sequence = Arc::new(Mutex::new(None));
        let hb_state = Arc::new(Mutex::new(HeartbeatState::new()));
        let (outbound_tx, outbound_rx) = mpsc::channel::<GatewayPayload>(64);
        let (zombie_tx, zombie_rx) = oneshot::channel();

        let writer = TaskGuard(tokio::spawn(run_writer(ws_writer, outbound_rx)));
        let heartbeat = TaskGuard(tokio::spawn(heartbeat::run_heartbeat(
            hello.heartbeat_interval,
            Arc::clone(&sequence),
            Arc::clone(&hb_state),
            outbound_tx.clone(),
            zombie_tx,
        )));

        let identify = protocol::build_identify(
            profile.credential.token(),
            settings.intents,
            &profile.identity,
        );
        outbound_tx
            .send(identify)
            .await
            .map_err(|_| GatewayError::Protocol("writer closed before Identify".into()))?;

        let read_loop = ReadLoop {
            reader: ws_reader,
            outbound: outbound_tx,
            sequence,
            hb_state,
            zombie_rx,
        };
        let run = async move {
            let cause = read_loop.run().await;
            drop(heartbeat);
            drop(writer);
            cause
        };

        debug!(generation, "gateway handshake complete");
        Ok(Connection::spawn(run, termination))
    }
}

/// Aborts the wrapped task when dropped.
struct TaskGuard(JoinHandle<()>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Establish the `WebSocket`, through the socket proxy when one is set.
async fn connect(profile: &SessionProfile) -> Result<WsStream, GatewayError> {
    let url_str = &profile.settings.url;
    let url = Url::parse(url_str).map_err(|e| GatewayError::InvalidUrl {
        url: url_str.clone(),
        message: e.to_string(),
    })?;
    let host = proxy::dial_host(&url).ok_or_else(|| GatewayError::InvalidUrl {
        url: url_str.clone(),
        message: "missing host".into(),
    })?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| GatewayError::InvalidUrl {
            url: url_str.clone(),
            message: "missing port".into(),
        })?;

    let mut request = url_str.as_str().into_client_request()?;
    let user_agent = HeaderValue::from_str(profile.identity.user_agent())
        .map_err(|e| GatewayError::Protocol(format!("invalid user agent: {e}")))?;
    request.headers_mut().insert(USER_AGENT, user_agent);

    let stream = match &profile.socket_proxy {
        Some(raw) => {
            let endpoint = ProxyEndpoint::parse(raw)?;
            // The CONNECT authority keeps IPv6 brackets.
            let authority = url.host_str().unwrap_or(host.as_str());
            proxy::tunnel(&endpoint, authority, port).await?
        },
        None => TcpStream::connect((host.as_str(), port)).await?,
    };

    let (ws, _response) = client_async_tls(request, stream).await?;
    Ok(ws)
}

/// Wait for the Hello payload after the upgrade.
async fn wait_for_hello(
    reader: &mut WsReader,
    timeout: Duration,
) -> Result<HelloPayload, GatewayError> {
    tokio::time::timeout(timeout, read_hello(reader))
        .await
        .map_err(|_| GatewayError::HelloTimeout)?
}

async fn read_hello(reader: &mut WsReader) -> Result<HelloPayload, GatewayError> {
    loop {
        match reader.next().await {
            Some(Ok(Message::Text(text))) => {
                let payload: GatewayPayload = serde_json::from_str(&text)?;
                if payload.op == opcode::HELLO {
                    let data = payload
                        .d
                        .ok_or_else(|| GatewayError::Protocol("Hello missing data".into()))?;
                    return Ok(serde_json::from_value(data)?);
                }
            },
            Some(Ok(Message::Close(frame))) => return Err(closed(frame.as_ref())),
            Some(Ok(_)) => {},
            Some(Err(e)) => return Err(e.into()),
            None => {
                return Err(GatewayError::Protocol(
                    "connection closed before Hello".into(),
                ));
            },
        }
    }
}

fn closed(frame: Option<&tokio_tungstenite::tungstenite::protocol::CloseFrame>) -> GatewayError {
    match frame {
        Some(frame) => GatewayError::Closed {
            code: frame.code.into(),
            reason: frame.reason.as_str().to_owned(),
        },
        None => GatewayError::Closed {
            code: close_code::NORMAL,
            reason: String::new(),
        },
    }
}

async fn run_writer(mut writer: WsWriter, mut outbound: mpsc::Receiver<GatewayPayload>) {
    while let Some(payload) = outbound.recv().await {
        let json = match serde_json::to_string(&payload) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "failed to serialize gateway payload");
                continue;
            },
        };
        if let Err(e) = writer.send(Message::Text(json.into())).await {
            debug!(error = %e, "writer task: send failed");
            break;
        }
    }
}

// ── Read loop ────────────────────────────────────────────────

struct ReadLoop {
    reader: WsReader,
    outbound: mpsc::Sender<GatewayPayload>,
    sequence: Arc<Mutex<Option<u64>>>,
    hb_state: Arc<Mutex<HeartbeatState>>,
    zombie_rx: oneshot::Receiver<()>,
}

impl ReadLoop {
    /// Consume inbound frames until the connection ends.
    async fn run(mut self) -> Option<GatewayError> {
        loop {
            tokio::select! {
                biased;

                zombie = &mut self.zombie_rx => {
                    // The heartbeat only stops without a verdict when the
                    // writer is gone, so the socket is unusable either way.
                    return Some(match zombie {
                        Ok(()) => GatewayError::ZombieConnection,
                        Err(_) => GatewayError::Protocol("outbound writer stopped".into()),
                    });
                }

                msg = self.reader.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        let payload: GatewayPayload = match serde_json::from_str(&text) {
                            Ok(p) => p,
                            Err(e) => {
                                warn!(error = %e, "failed to parse gateway payload");
                                continue;
                            },
                        };
                        if let Some(cause) = self.handle_payload(payload).await {
                            return Some(cause);
                        }
                    },
                    Some(Ok(Message::Close(frame))) => return Some(closed(frame.as_ref())),
                    Some(Ok(_)) => {},
                    Some(Err(e)) => return Some(e.into()),
                    None => return None,
                },
            }
        }
    }

    /// Returns the terminating error if the payload ends the connection.
    async fn handle_payload(&mut self, payload: GatewayPayload) -> Option<GatewayError> {
        match payload.op {
            opcode::DISPATCH => {
                if let Some(seq) = payload.s {
                    *self.sequence.lock().await = Some(seq);
                }
                trace!(event = ?payload.t, seq = ?payload.s, "dispatch");
                None
            },
            opcode::HEARTBEAT => {
                let seq = *self.sequence.lock().await;
                let _ = self.outbound.send(protocol::build_heartbeat(seq)).await;
                None
            },
            opcode::HEARTBEAT_ACK => {
                self.hb_state.lock().await.ack_received();
                None
            },
            opcode::RECONNECT => Some(GatewayError::ReconnectRequested),
            opcode::INVALID_SESSION => Some(GatewayError::InvalidSession),
            opcode::HELLO => {
                warn!("unexpected Hello mid-session");
                None
            },
            op => {
                debug!(op, "unknown gateway opcode");
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    #[test]
    fn closed_without_frame_is_normal() {
        let err = closed(None);
        assert_eq!(err.close_code(), Some(close_code::NORMAL));
    }

    #[test]
    fn closed_keeps_code_and_reason() {
        let frame = CloseFrame {
            code: CloseCode::from(4004),
            reason: "Authentication failed.".into(),
        };
        let err = closed(Some(&frame));
        assert_eq!(err.close_code(), Some(4004));
        assert!(err.to_string().contains("Authentication failed."));
    }

    #[test]
    fn settings_defaults() {
        let settings = GatewaySettings::new("wss://gateway.example.com");
        assert_eq!(settings.hello_timeout, Duration::from_secs(30));
        assert!(settings.censor_credentials);
    }
}
