//! Persistent ledger endpoint connection
//!
//! Maintains one WebSocket to the ledger RPC endpoint. Requests are JSON
//! frames correlated by id; a connection task owns the socket and the
//! pending-response map, reconnecting with exponential backoff when the
//! endpoint drops. Requests in flight when a session dies fail with a
//! transport error rather than hanging.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};

use crate::error::LedgerError;

/// One queued request: frame to send plus the reply slot for its response
struct Command {
    id: u64,
    frame: String,
    reply: oneshot::Sender<Result<Value, LedgerError>>,
}

/// Shared handle to the connection task
pub struct LedgerConnection {
    tx: mpsc::Sender<Command>,
    connected: Arc<RwLock<bool>>,
    next_id: AtomicU64,
}

impl LedgerConnection {
    /// Connect to the ledger endpoint, waiting for the initial session
    pub async fn connect(url: &str) -> Result<Self, LedgerError> {
        let (tx, rx) = mpsc::channel::<Command>(1000);
        let connected = Arc::new(RwLock::new(false));

        let loop_url = url.to_string();
        let connected_flag = Arc::clone(&connected);
        tokio::spawn(async move {
            connection_loop(loop_url, rx, connected_flag).await;
        });

        let conn = Self {
            tx,
            connected,
            next_id: AtomicU64::new(1),
        };

        // Wait for initial connection
        for _ in 0..50 {
            if *conn.connected.read().await {
                return Ok(conn);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        Err(LedgerError::Transport(
            "timeout waiting for ledger connection".into(),
        ))
    }

    /// Issue one request and wait for its correlated response.
    ///
    /// `timeout` of `None` waits indefinitely; used for confirmation waits,
    /// which must not be bounded client-side.
    pub async fn request(
        &self,
        method: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = encode_request(id, method, &params);

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command {
                id,
                frame,
                reply: reply_tx,
            })
            .await
            .map_err(|_| LedgerError::Transport("ledger connection closed".into()))?;

        let wait = async {
            match reply_rx.await {
                Ok(result) => result,
                Err(_) => Err(LedgerError::Transport("connection lost".into())),
            }
        };

        match timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| LedgerError::Transport(format!("{method} timed out")))?,
            None => wait.await,
        }
    }

    /// Check if the session is currently up
    pub async fn is_connected(&self) -> bool {
        *self.connected.read().await
    }
}

/// Build a request frame
fn encode_request(id: u64, method: &str, params: &Value) -> String {
    json!({ "id": id, "method": method, "params": params }).to_string()
}

/// Parse a response frame into (id, result-or-declined)
fn decode_response(text: &str) -> Result<(u64, Result<Value, LedgerError>), LedgerError> {
    let frame: Value = serde_json::from_str(text)
        .map_err(|e| LedgerError::Protocol(format!("malformed frame: {e}")))?;

    let id = frame
        .get("id")
        .and_then(Value::as_u64)
        .ok_or_else(|| LedgerError::Protocol("frame missing id".into()))?;

    if let Some(err) = frame.get("error") {
        let reason = err.as_str().map(str::to_string).unwrap_or_else(|| err.to_string());
        return Ok((id, Err(LedgerError::Declined(reason))));
    }

    let result = frame
        .get("result")
        .cloned()
        .ok_or_else(|| LedgerError::Protocol("frame missing result".into()))?;
    Ok((id, Ok(result)))
}

/// Main connection loop with reconnection logic
async fn connection_loop(
    url: String,
    mut rx: mpsc::Receiver<Command>,
    connected: Arc<RwLock<bool>>,
) {
    let mut reconnect_delay = Duration::from_millis(100);
    let max_reconnect_delay = Duration::from_secs(30);

    loop {
        info!("connecting to ledger at {}", url);

        match connect_async(&url).await {
            Ok((ws, _)) => {
                *connected.write().await = true;
                reconnect_delay = Duration::from_millis(100);
                info!("connected to ledger");

                let shutdown = handle_session(ws, &mut rx).await;
                *connected.write().await = false;

                if shutdown {
                    debug!("ledger connection handle dropped, stopping");
                    return;
                }
            }
            Err(e) => {
                error!("failed to connect to ledger: {}", e);
            }
        }

        warn!("reconnecting to ledger in {:?}...", reconnect_delay);
        tokio::time::sleep(reconnect_delay).await;
        reconnect_delay = (reconnect_delay * 2).min(max_reconnect_delay);
    }
}

/// Run one WebSocket session until it ends.
///
/// Returns true when the command channel closed (owner dropped) and the
/// connection loop should stop rather than reconnect.
async fn handle_session(
    ws: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    rx: &mut mpsc::Receiver<Command>,
) -> bool {
    let (mut sink, mut stream) = ws.split();

    // Pending responses indexed by request id
    let mut pending: HashMap<u64, oneshot::Sender<Result<Value, LedgerError>>> = HashMap::new();
    let mut shutdown = false;

    loop {
        tokio::select! {
            cmd = rx.recv() => {
                match cmd {
                    Some(cmd) => {
                        let frame = cmd.frame;
                        pending.insert(cmd.id, cmd.reply);
                        if let Err(e) = sink.send(Message::Text(frame)).await {
                            error!("failed to send to ledger: {}", e);
                            break;
                        }
                    }
                    None => {
                        shutdown = true;
                        break;
                    }
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match decode_response(&text) {
                            Ok((id, result)) => {
                                if let Some(reply) = pending.remove(&id) {
                                    let _ = reply.send(result);
                                } else {
                                    warn!("response for unknown request id {}", id);
                                }
                            }
                            Err(e) => warn!("undecodable ledger frame: {}", e),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!("ledger closed connection: {:?}", frame);
                        break;
                    }
                    Some(Err(e)) => {
                        error!("ledger WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                    _ => {}
                }
            }
        }
    }

    // Fail everything still waiting on this session
    for (_, reply) in pending.drain() {
        let _ = reply.send(Err(LedgerError::Transport("connection lost".into())));
    }

    shutdown
}
