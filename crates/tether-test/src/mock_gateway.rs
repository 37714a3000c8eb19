//! Scriptable in-process gateway.
//!
//! Each accepted connection runs the next script in the queue. Once the
//! queue is empty, connections get a Hello and are held open, answering
//! heartbeats.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{WebSocketStream, accept_async};
use tracing::debug;

type ServerWriter = SplitSink<WebSocketStream<TcpStream>, Message>;
type ServerReader = SplitStream<WebSocketStream<TcpStream>>;

/// Heartbeat interval used by [`Step::hello`].
pub const DEFAULT_HEARTBEAT_MS: u64 = 45_000;

/// One scripted action on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Send Hello with the given heartbeat interval.
    Hello {
        /// Interval in milliseconds.
        interval_ms: u64,
    },
    /// Read frames until the client's Identify arrives.
    AwaitIdentify,
    /// Send a close frame and drop the socket.
    Close {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
    /// Send an arbitrary JSON payload.
    Send(serde_json::Value),
    /// Pause before the next step.
    Sleep(Duration),
    /// Drop the socket without a close frame.
    Disconnect,
    /// Keep the connection open, acknowledging heartbeats, until the client
    /// goes away.
    Hold,
}

impl Step {
    /// Hello with [`DEFAULT_HEARTBEAT_MS`].
    #[must_use]
    pub fn hello() -> Self {
        Self::Hello {
            interval_ms: DEFAULT_HEARTBEAT_MS,
        }
    }

    /// Close with `code` and `reason`.
    #[must_use]
    pub fn close(code: u16, reason: &str) -> Self {
        Self::Close {
            code,
            reason: reason.to_owned(),
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    scripts: Mutex<VecDeque<Vec<Step>>>,
    received: Mutex<Vec<serde_json::Value>>,
    connections: AtomicUsize,
}

/// A gateway listening on an ephemeral localhost port.
///
/// The accept loop stops when the value is dropped.
#[derive(Debug)]
pub struct MockGateway {
    addr: SocketAddr,
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl MockGateway {
    /// Bind and start accepting. `scripts[i]` drives the `i`-th connection.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the listener cannot be bound.
    pub async fn start(scripts: Vec<Vec<Step>>) -> std::io::Result<Self> {
        Self::bind("127.0.0.1:0", scripts).await
    }

    /// Like [`MockGateway::start`], listening on `addr` (e.g. `"[::1]:0"`).
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the listener cannot be bound.
    pub async fn bind(addr: &str, scripts: Vec<Vec<Step>>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let shared = Arc::new(Shared {
            scripts: Mutex::new(scripts.into()),
            ..Shared::default()
        });

        let accept_shared = Arc::clone(&shared);
        let task = tokio::spawn(async move {
            while let Ok((stream, peer)) = listener.accept().await {
                let shared = Arc::clone(&accept_shared);
                tokio::spawn(async move {
                    if let Err(e) = serve(stream, &shared).await {
                        debug!(%peer, error = %e, "mock gateway connection ended with error");
                    }
                });
            }
        });

        Ok(Self { addr, shared, task })
    }

    /// `ws://` URL of the gateway.
    #[must_use]
    pub fn url(&self) -> String {
        format!("ws://{}/?v=9&encoding=json", self.addr)
    }

    /// The bound listener address.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Number of `WebSocket` connections accepted so far.
    #[must_use]
    pub fn connections(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    /// Every JSON payload received from clients, in arrival order.
    pub async fn received(&self) -> Vec<serde_json::Value> {
        self.shared.received.lock().await.clone()
    }

    /// Payloads received with opcode `op`.
    pub async fn received_op(&self, op: u64) -> Vec<serde_json::Value> {
        self.received()
            .await
            .into_iter()
            .filter(|p| p["op"].as_u64() == Some(op))
            .collect()
    }

    /// Wait until at least `n` connections were accepted.
    ///
    /// Returns `false` on timeout.
    pub async fn wait_for_connections(&self, n: usize, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            while self.connections() < n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .is_ok()
    }
}

impl Drop for MockGateway {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    stream: TcpStream,
    shared: &Shared,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let ws = accept_async(stream).await?;
    let index = shared.connections.fetch_add(1, Ordering::SeqCst);
    let script = shared
        .scripts
        .lock()
        .await
        .pop_front()
        .unwrap_or_else(|| vec![Step::hello(), Step::Hold]);
    debug!(index, steps = script.len(), "mock gateway connection accepted");

    let (mut writer, mut reader) = ws.split();
    for step in script {
        match step {
            Step::Hello { interval_ms } => {
                let hello = serde_json::json!({
                    "op": 10,
                    "d": { "heartbeat_interval": interval_ms },
                });
                writer.send(Message::Text(hello.to_string().into())).await?;
            },
            Step::AwaitIdentify => {
                while let Some(payload) = next_payload(&mut reader, shared).await? {
                    if payload["op"] == 2 {
                        break;
                    }
                }
            },
            Step::Close { code, reason } => {
                let frame = CloseFrame {
                    code: CloseCode::from(code),
                    reason: reason.into(),
                };
                writer.send(Message::Close(Some(frame))).await?;
                return Ok(());
            },
            Step::Send(payload) => {
                writer
                    .send(Message::Text(payload.to_string().into()))
                    .await?;
            },
            Step::Sleep(duration) => tokio::time::sleep(duration).await,
            Step::Disconnect => return Ok(()),
            Step::Hold => return hold(&mut writer, &mut reader, shared).await,
        }
    }
    Ok(())
}

/// Next text payload from the client, recorded in `shared`. `None` once the
/// client has gone.
async fn next_payload(
    reader: &mut ServerReader,
    shared: &Shared,
) -> Result<Option<serde_json::Value>, tokio_tungstenite::tungstenite::Error> {
    while let Some(msg) = reader.next().await {
        match msg? {
            Message::Text(text) => {
                let Ok(payload) = serde_json::from_str::<serde_json::Value>(&text) else {
                    continue;
                };
                shared.received.lock().await.push(payload.clone());
                return Ok(Some(payload));
            },
            Message::Close(_) => return Ok(None),
            _ => {},
        }
    }
    Ok(None)
}

async fn hold(
    writer: &mut ServerWriter,
    reader: &mut ServerReader,
    shared: &Shared,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    while let Some(payload) = next_payload(reader, shared).await? {
        if payload["op"] == 1 {
            let ack = serde_json::json!({ "op": 11 });
            writer.send(Message::Text(ack.to_string().into())).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::connect_async;

    #[tokio::test]
    async fn default_script_sends_hello_and_acks() {
        let gateway = MockGateway::start(Vec::new()).await.unwrap();
        let (mut ws, _) = connect_async(gateway.url()).await.unwrap();

        let Some(Ok(Message::Text(hello))) = ws.next().await else {
            panic!("expected Hello");
        };
        let hello: serde_json::Value = serde_json::from_str(&hello).unwrap();
        assert_eq!(hello["op"], 10);
        assert_eq!(hello["d"]["heartbeat_interval"], DEFAULT_HEARTBEAT_MS);

        ws.send(Message::Text(r#"{"op":1,"d":null}"#.into()))
            .await
            .unwrap();
        let Some(Ok(Message::Text(ack))) = ws.next().await else {
            panic!("expected ACK");
        };
        assert!(ack.contains("11"));
        assert_eq!(gateway.connections(), 1);
        assert_eq!(gateway.received_op(1).await.len(), 1);
    }

    #[tokio::test]
    async fn scripted_close_carries_code() {
        let gateway = MockGateway::start(vec![vec![Step::close(4004, "nope")]])
            .await
            .unwrap();
        let (mut ws, _) = connect_async(gateway.url()).await.unwrap();

        let Some(Ok(Message::Close(Some(frame)))) = ws.next().await else {
            panic!("expected close frame");
        };
        assert_eq!(u16::from(frame.code), 4004);
        assert_eq!(frame.reason.as_str(), "nope");
    }
}
