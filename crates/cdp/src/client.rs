//! The connection: request/response correlation over one WebSocket.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use url::Url;

use webpilot_core::{Error, Result};
use webpilot_task::{race_with_timeout, TimeoutOptions};

use crate::wire::{InboundFrame, OutboundCall};

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>>;
type Subscriber = Box<dyn Fn(&Value) -> Result<()> + Send + Sync>;
type SubscriberMap = Arc<Mutex<HashMap<String, Vec<Subscriber>>>>;

/// Options for [`CdpClient::connect`].
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Budget for the WebSocket handshake, in milliseconds.
    pub open_timeout_ms: u64,
    /// Per-command deadline used when a send does not set its own.
    pub default_call_timeout_ms: u64,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            open_timeout_ms: 15_000,
            default_call_timeout_ms: 30_000,
        }
    }
}

/// Per-command deadline policy.
#[derive(Debug, Clone, Copy, Default)]
pub enum CallTimeout {
    /// Use the connection-level default.
    #[default]
    Default,
    /// No deadline timer at all; the caller explicitly opts into unbounded
    /// waiting and owns the consequences of a response that never comes.
    Unbounded,
    /// Deadline in milliseconds. Zero behaves as [`CallTimeout::Unbounded`].
    Millis(u64),
}

/// Options for [`CdpClient::send`].
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Opaque routing tag addressing one logical target on the connection.
    pub session_id: Option<String>,
    pub timeout: CallTimeout,
    /// Optional caller-controlled cancellation for this one call.
    pub cancel: Option<CancellationToken>,
}

/// A CDP connection that multiplexes concurrent commands and fans out
/// event notifications. All dispatch state is owned by the instance, so
/// independent connections coexist safely.
pub struct CdpClient {
    ws_tx: mpsc::Sender<String>,
    pending: PendingMap,
    subscribers: SubscriberMap,
    next_id: AtomicU64,
    default_call_timeout_ms: u64,
    shutdown: CancellationToken,
    _reader_handle: JoinHandle<()>,
    _writer_handle: JoinHandle<()>,
}

impl CdpClient {
    /// Connect to a CDP WebSocket endpoint.
    ///
    /// Fails with [`Error::ConnectTimeout`] if the handshake does not
    /// complete within the open budget, or [`Error::ConnectFailed`] if the
    /// transport reports an error first. No reconnection is attempted here;
    /// compose `retry` around this call if that is wanted.
    pub async fn connect(address: &str, opts: ConnectOptions) -> Result<Self> {
        let url = Url::parse(address)
            .map_err(|e| Error::ConnectFailed(format!("invalid address '{}': {}", address, e)))?;

        let handshake = async {
            connect_async(url.as_str())
                .await
                .map_err(|e| Error::ConnectFailed(format!("{}: {}", address, e)))
        };
        let (ws_stream, _) = match race_with_timeout(
            handshake,
            TimeoutOptions {
                timeout_ms: opts.open_timeout_ms,
                cancel: None,
            },
        )
        .await
        {
            Ok(stream) => stream,
            Err(Error::Timeout { timeout_ms }) => {
                return Err(Error::ConnectTimeout { timeout_ms });
            }
            Err(e) => return Err(e),
        };
        debug!(address, "CDP connection established");

        let (mut ws_sink, mut ws_read) = ws_stream.split();

        // Outgoing frames funnel through one writer task that owns the sink.
        let (ws_tx, mut ws_rx) = mpsc::channel::<String>(256);

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let subscribers: SubscriberMap = Arc::new(Mutex::new(HashMap::new()));
        let shutdown = CancellationToken::new();

        let writer_shutdown = shutdown.clone();
        let writer_handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = writer_shutdown.cancelled() => {
                        let _ = ws_sink.send(Message::Close(None)).await;
                        break;
                    }
                    frame = ws_rx.recv() => match frame {
                        Some(text) => {
                            if let Err(e) = ws_sink.send(Message::Text(text)).await {
                                error!("WebSocket write error: {}", e);
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
        });

        let reader_shutdown = shutdown.clone();
        let reader_pending = pending.clone();
        let reader_subscribers = subscribers.clone();
        let reader_handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = reader_shutdown.cancelled() => break,
                    frame = ws_read.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            dispatch(&text, &reader_pending, &reader_subscribers).await;
                        }
                        Some(Ok(Message::Close(_))) => {
                            debug!("connection closed by remote");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("WebSocket read error: {}", e);
                            break;
                        }
                        None => break,
                    },
                }
            }
            // Any exit path counts as closure: stop the writer and fail
            // every call still waiting, leaving no timer behind.
            reader_shutdown.cancel();
            fail_all_pending(&reader_pending).await;
        });

        Ok(Self {
            ws_tx,
            pending,
            subscribers,
            next_id: AtomicU64::new(1),
            default_call_timeout_ms: opts.default_call_timeout_ms,
            shutdown,
            _reader_handle: reader_handle,
            _writer_handle: writer_handle,
        })
    }

    /// Send a command and wait for its correlated response.
    ///
    /// The call settles exactly once, via whichever comes first: the
    /// response carrying this call's identifier (result, or
    /// [`Error::Remote`] from its error field), the per-call deadline
    /// ([`Error::CallTimeout`] naming the method), connection closure
    /// ([`Error::ConnectionClosed`]), or the caller's token
    /// ([`Error::Cancelled`]). Identifiers come from a per-connection
    /// monotonic counter and are never reused.
    pub async fn send(
        &self,
        method: &str,
        params: Option<Value>,
        opts: SendOptions,
    ) -> Result<Value> {
        if self.shutdown.is_cancelled() {
            return Err(Error::ConnectionClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let frame = serde_json::to_string(&OutboundCall {
            id,
            method,
            params: params.as_ref(),
            session_id: opts.session_id.as_deref(),
        })?;

        // Register before writing so a fast response cannot slip past.
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if self.ws_tx.send(frame).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(Error::ConnectionClosed);
        }
        debug!(id, method, session = opts.session_id.as_deref(), "command sent");

        // Racing shutdown here covers a close() that slips in between the
        // check above and the registration, which would otherwise leave an
        // unbounded call waiting forever. A reply that is already in hand
        // still wins.
        let shutdown = self.shutdown.clone();
        let settle = async move {
            tokio::select! {
                biased;
                reply = rx => match reply {
                    Ok(reply) => reply,
                    // Sender dropped without a reply: the connection went away.
                    Err(_) => Err(Error::ConnectionClosed),
                },
                _ = shutdown.cancelled() => Err(Error::ConnectionClosed),
            }
        };

        let timeout_ms = match opts.timeout {
            CallTimeout::Default => Some(self.default_call_timeout_ms),
            CallTimeout::Millis(0) | CallTimeout::Unbounded => None,
            CallTimeout::Millis(ms) => Some(ms),
        };

        let outcome = match timeout_ms {
            Some(ms) => {
                race_with_timeout(
                    settle,
                    TimeoutOptions {
                        timeout_ms: ms,
                        cancel: opts.cancel.clone(),
                    },
                )
                .await
            }
            None => match &opts.cancel {
                Some(token) => {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => Err(Error::Cancelled),
                        reply = settle => reply,
                    }
                }
                None => settle.await,
            },
        };

        match outcome {
            Err(Error::Timeout { timeout_ms }) => {
                self.pending.lock().await.remove(&id);
                Err(Error::CallTimeout {
                    method: method.to_string(),
                    timeout_ms,
                })
            }
            Err(Error::Cancelled) => {
                self.pending.lock().await.remove(&id);
                Err(Error::Cancelled)
            }
            // A closure observed via the shutdown token may have raced this
            // registration; make sure the entry is gone either way.
            Err(Error::ConnectionClosed) => {
                self.pending.lock().await.remove(&id);
                Err(Error::ConnectionClosed)
            }
            other => other,
        }
    }

    /// Register a subscriber for an event notification.
    ///
    /// Subscribers for one event run in registration order. A subscriber
    /// error is logged and isolated: later subscribers still run and the
    /// transport is unaffected. Subscriptions live for the connection's
    /// lifetime; there is no unsubscribe.
    pub async fn on<F>(&self, event: &str, subscriber: F)
    where
        F: Fn(&Value) -> Result<()> + Send + Sync + 'static,
    {
        let mut subscribers = self.subscribers.lock().await;
        subscribers
            .entry(event.to_string())
            .or_default()
            .push(Box::new(subscriber));
    }

    /// Close the connection. Idempotent; every still-outstanding call fails
    /// with [`Error::ConnectionClosed`] and its deadline timer is dropped.
    pub async fn close(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        debug!("closing CDP connection");
        self.shutdown.cancel();
        fail_all_pending(&self.pending).await;
    }
}

impl std::fmt::Debug for CdpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Subscribers are boxed closures, so only the plain fields show.
        f.debug_struct("CdpClient")
            .field("default_call_timeout_ms", &self.default_call_timeout_ms)
            .field("closed", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self._reader_handle.abort();
        self._writer_handle.abort();
    }
}

/// Route one inbound frame: response to its pending call, notification to
/// its subscribers. Frames that fit neither shape are logged and dropped.
async fn dispatch(text: &str, pending: &PendingMap, subscribers: &SubscriberMap) {
    let frame: InboundFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("dropping unparseable frame: {}", e);
            return;
        }
    };

    match (frame.id, frame.method) {
        (Some(id), _) => {
            let tx = pending.lock().await.remove(&id);
            match tx {
                Some(tx) => {
                    let reply = match frame.error {
                        Some(err) => Err(Error::Remote {
                            message: err.into_message(),
                        }),
                        None => Ok(frame.result.unwrap_or(Value::Null)),
                    };
                    let _ = tx.send(reply);
                }
                // Already settled by timeout/cancel, or never ours.
                None => debug!(id, "response for unknown or settled call"),
            }
        }
        (None, Some(method)) => {
            let params = frame.params.unwrap_or(Value::Null);
            let subscribers = subscribers.lock().await;
            if let Some(list) = subscribers.get(&method) {
                for subscriber in list {
                    if let Err(e) = subscriber(&params) {
                        warn!(event = %method, "event subscriber failed: {}", e);
                    }
                }
            }
        }
        (None, None) => debug!("frame with neither id nor method ignored"),
    }
}

async fn fail_all_pending(pending: &PendingMap) {
    let mut map = pending.lock().await;
    if map.is_empty() {
        return;
    }
    debug!(count = map.len(), "failing outstanding calls on closure");
    for (_, tx) in map.drain() {
        let _ = tx.send(Err(Error::ConnectionClosed));
    }
}
