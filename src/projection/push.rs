//! Push channel client.
//!
//! Connects to `/ws?userId=`, waits for the welcome, then forwards every
//! server message into a running driver. The socket lives on its own task;
//! [`PushChannel`] can ask the server for a snapshot and wait until the
//! driver has it.

use anyhow::{bail, Context, Result};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use super::driver::DriverHandle;
use crate::protocol::{ClientMessage, PushMessage};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct PushChannel {
    requests: mpsc::UnboundedSender<ClientMessage>,
    /// Count of snapshots handed to the driver.
    syncs: watch::Receiver<u64>,
    task: JoinHandle<()>,
}

impl PushChannel {
    /// Open the channel and start forwarding. Fails unless the server
    /// answers with the welcome message.
    pub async fn connect(url: &str, driver: DriverHandle) -> Result<Self> {
        let (mut socket, _) = connect_async(url)
            .await
            .with_context(|| format!("connecting to {url}"))?;
        match next_message(&mut socket).await? {
            Some(PushMessage::Connection { message }) => debug!(%message, "push channel open"),
            Some(other) => bail!("expected the welcome message, got {other:?}"),
            None => bail!("push channel closed before the welcome message"),
        }

        let (requests, outbound) = mpsc::unbounded_channel();
        let (synced, syncs) = watch::channel(0);
        let task = tokio::spawn(pump(socket, outbound, driver, synced));
        Ok(PushChannel {
            requests,
            syncs,
            task,
        })
    }

    /// Returns false once the socket has closed.
    pub fn request_sync(&self) -> bool {
        self.requests.send(ClientMessage::Sync).is_ok()
    }

    /// Request a snapshot and wait until the driver has received it.
    pub async fn resync(&mut self, timeout: Duration) -> Result<()> {
        self.syncs.mark_unchanged();
        if !self.request_sync() {
            bail!("push channel is closed");
        }
        tokio::time::timeout(timeout, self.syncs.changed())
            .await
            .context("timed out waiting for a snapshot")?
            .context("push channel closed before the snapshot")?;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.task.is_finished()
    }

    /// Send a close frame and wait for the socket task.
    pub async fn close(self) {
        drop(self.requests);
        let _ = self.task.await;
    }
}

/// Next decodable push message, skipping control frames and unknown text.
/// `None` when the server closes the socket.
async fn next_message(socket: &mut Socket) -> Result<Option<PushMessage>> {
    while let Some(frame) = socket.next().await {
        match frame? {
            Message::Text(text) => match serde_json::from_str::<PushMessage>(text.as_str()) {
                Ok(message) => return Ok(Some(message)),
                Err(e) => debug!(error = %e, "ignoring unrecognized push frame"),
            },
            Message::Close(_) => return Ok(None),
            _ => {}
        }
    }
    Ok(None)
}

async fn pump(
    mut socket: Socket,
    mut outbound: mpsc::UnboundedReceiver<ClientMessage>,
    driver: DriverHandle,
    synced: watch::Sender<u64>,
) {
    loop {
        tokio::select! {
            request = outbound.recv() => match request {
                Some(request) => {
                    let Ok(text) = serde_json::to_string(&request) else {
                        continue;
                    };
                    if let Err(e) = socket.send(Message::text(text)).await {
                        warn!(error = %e, "push channel send failed");
                        break;
                    }
                }
                None => {
                    let _ = socket.close(None).await;
                    break;
                }
            },
            message = next_message(&mut socket) => match message {
                Ok(Some(message)) => {
                    let is_sync = matches!(message, PushMessage::Sync(_));
                    if !driver.push(message) {
                        break;
                    }
                    if is_sync {
                        synced.send_modify(|n| *n += 1);
                    }
                }
                Ok(None) => {
                    debug!("push channel closed by server");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "push channel failed");
                    break;
                }
            },
        }
    }
}
