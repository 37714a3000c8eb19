//! Forwarding HTTP `CONNECT` proxy for tunnelled-socket tests.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

/// A proxy on an ephemeral localhost port that answers `CONNECT` with 200
/// and then relays bytes both ways.
///
/// The accept loop stops when the value is dropped.
#[derive(Debug)]
pub struct ConnectProxy {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl ConnectProxy {
    /// Bind and start accepting.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the listener cannot be bound.
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let requests = Arc::new(Mutex::new(Vec::new()));

        let accept_requests = Arc::clone(&requests);
        let task = tokio::spawn(async move {
            while let Ok((stream, peer)) = listener.accept().await {
                let requests = Arc::clone(&accept_requests);
                tokio::spawn(async move {
                    if let Err(e) = relay(stream, &requests).await {
                        debug!(%peer, error = %e, "connect proxy relay ended with error");
                    }
                });
            }
        });

        Ok(Self {
            addr,
            requests,
            task,
        })
    }

    /// Address in `host:port` form, as found in proxy lists.
    #[must_use]
    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    /// Request heads received so far, in arrival order.
    pub async fn requests(&self) -> Vec<String> {
        self.requests.lock().await.clone()
    }
}

impl Drop for ConnectProxy {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn relay(mut client: TcpStream, requests: &Mutex<Vec<String>>) -> std::io::Result<()> {
    let mut head = Vec::new();
    let mut byte = [0_u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if client.read(&mut byte).await? == 0 {
            return Ok(());
        }
        head.push(byte[0]);
    }
    let head = String::from_utf8_lossy(&head).into_owned();
    requests.lock().await.push(head.clone());

    let target = head
        .lines()
        .next()
        .and_then(|line| line.strip_prefix("CONNECT "))
        .and_then(|rest| rest.split_whitespace().next())
        .map(str::to_owned);
    let Some(target) = target else {
        client
            .write_all(b"HTTP/1.1 405 Method Not Allowed\r\n\r\n")
            .await?;
        return Ok(());
    };

    let mut upstream = match TcpStream::connect(target.as_str()).await {
        Ok(upstream) => upstream,
        Err(e) => {
            client.write_all(b"HTTP/1.1 502 Bad Gateway\r\n\r\n").await?;
            return Err(e);
        },
    };
    client
        .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
        .await?;
    tokio::io::copy_bidirectional(&mut client, &mut upstream).await?;
    Ok(())
}
