//! Control-socket transport for the streaming encoder.
//!
//! The encoder speaks a small JSON request/response protocol over a
//! websocket: a `hello` on connect, an `identify` handshake (optionally
//! password-protected), then `request`/`response` pairs correlated by id,
//! with unsolicited `event` frames interleaved. The trait keeps the
//! manager testable with a scripted double.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use futures_util::{SinkExt, Stream, StreamExt};
use serde_json::{Value, json};
use tokio::sync::{Mutex, broadcast, mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

use super::{EncoderError, EncoderResult};

/// Capacity of the push-event channel; events are tiny and losing old ones
/// when nobody listens is acceptable.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Out-of-band notification pushed by the control socket.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The encoder closed the connection.
    Closed,
    /// The connection failed with a transport error.
    Error(String),
}

/// Abstraction over the encoder control socket.
pub trait EncoderTransport: Send + Sync {
    /// Open the control socket and run the identify handshake.
    fn connect(
        &self,
        url: String,
        password: Option<String>,
    ) -> BoxFuture<'static, EncoderResult<()>>;
    /// Close the control socket if it is open.
    fn disconnect(&self) -> BoxFuture<'static, EncoderResult<()>>;
    /// Whether the stream output is currently active.
    fn get_stream_status(&self) -> BoxFuture<'static, EncoderResult<bool>>;
    /// Name of the scene currently on air.
    fn get_current_scene(&self) -> BoxFuture<'static, EncoderResult<String>>;
    /// Switch the encoder to the named scene.
    fn set_current_scene(&self, name: String) -> BoxFuture<'static, EncoderResult<()>>;
    /// Start the stream output.
    fn start_stream(&self) -> BoxFuture<'static, EncoderResult<()>>;
    /// Stop the stream output.
    fn stop_stream(&self) -> BoxFuture<'static, EncoderResult<()>>;
    /// Push the ingest destination configuration.
    fn set_stream_service_settings(
        &self,
        server: String,
        key: String,
        service_type: String,
    ) -> BoxFuture<'static, EncoderResult<()>>;
    /// Subscribe to out-of-band connection events.
    fn subscribe_events(&self) -> broadcast::Receiver<TransportEvent>;
}

/// Writer half of an established connection plus its reader task.
struct Connection {
    outgoing: mpsc::UnboundedSender<Message>,
    reader: tokio::task::JoinHandle<()>,
}

struct Inner {
    connection: Mutex<Option<Connection>>,
    pending: Arc<DashMap<u64, oneshot::Sender<Result<Value, String>>>>,
    next_request_id: AtomicU64,
    events: broadcast::Sender<TransportEvent>,
}

/// Production [`EncoderTransport`] over `tokio-tungstenite`.
///
/// Clones share one underlying connection.
#[derive(Clone)]
pub struct WsEncoderTransport {
    inner: Arc<Inner>,
}

impl Default for WsEncoderTransport {
    fn default() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                connection: Mutex::new(None),
                pending: Arc::new(DashMap::new()),
                next_request_id: AtomicU64::new(1),
                events,
            }),
        }
    }
}

impl WsEncoderTransport {
    /// Create a transport with no connection established yet.
    pub fn new() -> Self {
        Self::default()
    }
}

async fn request(inner: Arc<Inner>, kind: &str, data: Value) -> EncoderResult<Value> {
    let outgoing = {
        let guard = inner.connection.lock().await;
        let Some(connection) = guard.as_ref() else {
            return Err(EncoderError::NotConnected);
        };
        connection.outgoing.clone()
    };

    let id = inner.next_request_id.fetch_add(1, Ordering::Relaxed);
    let (tx, rx) = oneshot::channel();
    inner.pending.insert(id, tx);

    let frame = json!({
        "op": "request",
        "id": id,
        "type": kind,
        "data": data,
    });

    if outgoing.send(Message::Text(frame.to_string())).is_err() {
        inner.pending.remove(&id);
        return Err(EncoderError::NotConnected);
    }

    match rx.await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(message)) => Err(EncoderError::Request {
            op: kind.to_string(),
            message,
        }),
        // Reader cleared the pending map: the socket went away mid-call.
        Err(_) => Err(EncoderError::Closed),
    }
}

/// Read the next JSON text frame, skipping ping/pong noise.
async fn next_json<S>(stream: &mut S) -> EncoderResult<Value>
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                return serde_json::from_str(&text).map_err(|err| {
                    EncoderError::Transport(format!("malformed control frame: {err}"))
                });
            }
            Some(Ok(Message::Close(_))) | None => return Err(EncoderError::Closed),
            Some(Ok(_)) => continue,
            Some(Err(err)) => return Err(EncoderError::Transport(err.to_string())),
        }
    }
}

impl EncoderTransport for WsEncoderTransport {
    fn connect(
        &self,
        url: String,
        password: Option<String>,
    ) -> BoxFuture<'static, EncoderResult<()>> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            let (stream, _) = connect_async(url.as_str())
                .await
                .map_err(|err| EncoderError::Transport(err.to_string()))?;
            let (mut sink, mut source) = stream.split();

            // The encoder greets first; a rejected identify is the one
            // failure class worth retrying (fresh boot still wiring auth).
            let hello = next_json(&mut source).await?;
            if hello.get("op").and_then(Value::as_str) != Some("hello") {
                return Err(EncoderError::Transport(
                    "control socket did not greet with hello".into(),
                ));
            }

            let identify = json!({
                "op": "identify",
                "password": password,
            });
            sink.send(Message::Text(identify.to_string()))
                .await
                .map_err(|err| EncoderError::Transport(err.to_string()))?;

            let identified = next_json(&mut source).await?;
            match identified.get("op").and_then(Value::as_str) {
                Some("identified") => {}
                Some("error") => {
                    let message = identified
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("identification rejected");
                    return Err(EncoderError::Auth(message.to_string()));
                }
                _ => {
                    return Err(EncoderError::Transport(
                        "unexpected frame during identification".into(),
                    ));
                }
            }

            // Writer task: the single owner of the sink.
            let (outgoing, mut outbox) = mpsc::unbounded_channel::<Message>();
            tokio::spawn(async move {
                while let Some(frame) = outbox.recv().await {
                    if sink.send(frame).await.is_err() {
                        break;
                    }
                }
            });

            // Reader task: correlate responses, surface push events.
            let pending = Arc::clone(&inner.pending);
            let events = inner.events.clone();
            let reader = tokio::spawn(async move {
                loop {
                    match next_json(&mut source).await {
                        Ok(frame) => dispatch_frame(&pending, frame),
                        Err(EncoderError::Closed) => {
                            pending.clear();
                            let _ = events.send(TransportEvent::Closed);
                            break;
                        }
                        Err(err) => {
                            pending.clear();
                            let _ = events.send(TransportEvent::Error(err.to_string()));
                            break;
                        }
                    }
                }
            });

            let mut guard = inner.connection.lock().await;
            if let Some(previous) = guard.replace(Connection { outgoing, reader }) {
                previous.reader.abort();
            }

            debug!(%url, "encoder control socket identified");
            Ok(())
        })
    }

    fn disconnect(&self) -> BoxFuture<'static, EncoderResult<()>> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            let mut guard = inner.connection.lock().await;
            if let Some(connection) = guard.take() {
                let _ = connection.outgoing.send(Message::Close(None));
                connection.reader.abort();
            }
            inner.pending.clear();
            Ok(())
        })
    }

    fn get_stream_status(&self) -> BoxFuture<'static, EncoderResult<bool>> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            let data = request(inner, "GetStreamStatus", json!({})).await?;
            Ok(data
                .get("outputActive")
                .and_then(Value::as_bool)
                .unwrap_or(false))
        })
    }

    fn get_current_scene(&self) -> BoxFuture<'static, EncoderResult<String>> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            let data = request(inner, "GetCurrentScene", json!({})).await?;
            data.get("sceneName")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| EncoderError::Transport("scene response missing sceneName".into()))
        })
    }

    fn set_current_scene(&self, name: String) -> BoxFuture<'static, EncoderResult<()>> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            request(inner, "SetCurrentScene", json!({ "sceneName": name }))
                .await
                .map(|_| ())
        })
    }

    fn start_stream(&self) -> BoxFuture<'static, EncoderResult<()>> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move { request(inner, "StartStream", json!({})).await.map(|_| ()) })
    }

    fn stop_stream(&self) -> BoxFuture<'static, EncoderResult<()>> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move { request(inner, "StopStream", json!({})).await.map(|_| ()) })
    }

    fn set_stream_service_settings(
        &self,
        server: String,
        key: String,
        service_type: String,
    ) -> BoxFuture<'static, EncoderResult<()>> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            request(
                inner,
                "SetStreamServiceSettings",
                json!({
                    "server": server,
                    "key": key,
                    "serviceType": service_type,
                }),
            )
            .await
            .map(|_| ())
        })
    }

    fn subscribe_events(&self) -> broadcast::Receiver<TransportEvent> {
        self.inner.events.subscribe()
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    //! Inert transport for tests that need a manager but no encoder.

    use super::*;

    /// Transport double that is never connected and never emits events.
    pub struct NullTransport {
        events: broadcast::Sender<TransportEvent>,
    }

    impl Default for NullTransport {
        fn default() -> Self {
            let (events, _) = broadcast::channel(1);
            Self { events }
        }
    }

    impl EncoderTransport for NullTransport {
        fn connect(
            &self,
            _url: String,
            _password: Option<String>,
        ) -> BoxFuture<'static, EncoderResult<()>> {
            Box::pin(async { Err(EncoderError::NotConnected) })
        }

        fn disconnect(&self) -> BoxFuture<'static, EncoderResult<()>> {
            Box::pin(async { Ok(()) })
        }

        fn get_stream_status(&self) -> BoxFuture<'static, EncoderResult<bool>> {
            Box::pin(async { Err(EncoderError::NotConnected) })
        }

        fn get_current_scene(&self) -> BoxFuture<'static, EncoderResult<String>> {
            Box::pin(async { Err(EncoderError::NotConnected) })
        }

        fn set_current_scene(&self, _name: String) -> BoxFuture<'static, EncoderResult<()>> {
            Box::pin(async { Err(EncoderError::NotConnected) })
        }

        fn start_stream(&self) -> BoxFuture<'static, EncoderResult<()>> {
            Box::pin(async { Err(EncoderError::NotConnected) })
        }

        fn stop_stream(&self) -> BoxFuture<'static, EncoderResult<()>> {
            Box::pin(async { Err(EncoderError::NotConnected) })
        }

        fn set_stream_service_settings(
            &self,
            _server: String,
            _key: String,
            _service_type: String,
        ) -> BoxFuture<'static, EncoderResult<()>> {
            Box::pin(async { Err(EncoderError::NotConnected) })
        }

        fn subscribe_events(&self) -> broadcast::Receiver<TransportEvent> {
            self.events.subscribe()
        }
    }
}

/// Route one incoming frame to its pending request, if any.
fn dispatch_frame(pending: &DashMap<u64, oneshot::Sender<Result<Value, String>>>, frame: Value) {
    match frame.get("op").and_then(Value::as_str) {
        Some("response") => {
            let Some(id) = frame.get("id").and_then(Value::as_u64) else {
                warn!("encoder response without id");
                return;
            };
            let Some((_, tx)) = pending.remove(&id) else {
                return;
            };

            let outcome = if frame.get("status").and_then(Value::as_str) == Some("ok") {
                Ok(frame.get("data").cloned().unwrap_or(Value::Null))
            } else {
                Err(frame
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("request failed")
                    .to_string())
            };
            let _ = tx.send(outcome);
        }
        // Unsolicited encoder events (scene switched by an operator, etc.)
        // are informational only; the manager re-reads state on demand.
        Some("event") => {}
        other => debug!(op = ?other, "ignoring unrecognized control frame"),
    }
}
