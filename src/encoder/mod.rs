//! Connection manager for the on-premises streaming encoder.
//!
//! One manager instance exists per kiosk process. Every operation is safe
//! to call redundantly: concurrent connects share a single attempt, scene
//! switches short-circuit on the cached current scene, and stream toggles
//! treat "already in that state" rejections as success. Encoder failures
//! are advisory: sessions progress on their own timers regardless.

pub mod config;
pub mod transport;

use std::sync::{Arc, Weak};

use thiserror::Error;
use tokio::sync::{Mutex, broadcast};
use tokio::time::sleep;
use tracing::{debug, info, warn};

pub use config::{EncoderConfig, SceneNames, StreamSettings};
pub use transport::{EncoderTransport, TransportEvent, WsEncoderTransport};

/// Result alias for encoder control operations.
pub type EncoderResult<T> = Result<T, EncoderError>;

/// Failures surfaced by the encoder connection manager and its transport.
#[derive(Debug, Error)]
pub enum EncoderError {
    /// No encoder URL is configured for this deployment.
    #[error("no encoder configured for this deployment")]
    NotConfigured,
    /// Stream settings or other configuration is invalid.
    #[error("encoder configuration invalid: {0}")]
    Config(String),
    /// The control socket is not currently connected.
    #[error("encoder control socket is not connected")]
    NotConnected,
    /// The identify handshake was rejected.
    #[error("encoder identification failed: {0}")]
    Auth(String),
    /// The websocket transport failed.
    #[error("encoder transport error: {0}")]
    Transport(String),
    /// The encoder rejected a control request.
    #[error("encoder rejected {op}: {message}")]
    Request {
        /// Request type that failed.
        op: String,
        /// Error message from the encoder.
        message: String,
    },
    /// The connection closed while a request was in flight.
    #[error("encoder connection closed")]
    Closed,
}

/// Connection lifecycle of the encoder control link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    /// No encoder configured; terminal for the process lifetime.
    Disabled,
    /// Not connected; a connect may be attempted.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// Control socket established, stream output idle.
    Connected,
    /// Control socket established and the stream output is active.
    Streaming,
    /// The last operation or the connection itself failed.
    Error,
}

struct ManagerInner {
    state: EncoderState,
    /// Last scene the encoder is known to be on; `None` after a
    /// disconnect so the next switch is never skipped incorrectly.
    current_scene: Option<String>,
}

/// Process-singleton managing the single logical encoder connection.
pub struct EncoderManager {
    transport: Arc<dyn EncoderTransport>,
    config: EncoderConfig,
    inner: Mutex<ManagerInner>,
    connect_gate: Mutex<()>,
}

impl EncoderManager {
    /// Build the manager and start listening for out-of-band connection
    /// events. Must be called from within a tokio runtime.
    pub fn new(transport: Arc<dyn EncoderTransport>, config: EncoderConfig) -> Arc<Self> {
        let state = if config.url.is_none() {
            EncoderState::Disabled
        } else {
            EncoderState::Disconnected
        };

        let manager = Arc::new(Self {
            transport,
            config,
            inner: Mutex::new(ManagerInner {
                state,
                current_scene: None,
            }),
            connect_gate: Mutex::new(()),
        });

        let events = manager.transport.subscribe_events();
        tokio::spawn(Self::watch_events(Arc::downgrade(&manager), events));

        manager
    }

    /// Whether an encoder is configured at all.
    pub fn is_enabled(&self) -> bool {
        self.config.url.is_some()
    }

    /// Scene names used by the display's stage mapping.
    pub fn scenes(&self) -> &SceneNames {
        &self.config.scenes
    }

    /// Current connection state.
    pub async fn state(&self) -> EncoderState {
        self.inner.lock().await.state
    }

    /// Cached current scene, if the connection is warm.
    pub async fn current_scene(&self) -> Option<String> {
        self.inner.lock().await.current_scene.clone()
    }

    /// Establish the control connection if it is not already up.
    ///
    /// Idempotent: callers arriving while another connect is in flight wait
    /// on the gate and then observe the established connection instead of
    /// opening a second socket. Only identification failures are retried
    /// (the encoder may still be booting its auth layer), and only a bounded
    /// number of times with a fixed delay; everything else surfaces
    /// immediately.
    pub async fn connect(&self) -> EncoderResult<()> {
        let Some(url) = self.config.url.clone() else {
            return Err(EncoderError::NotConfigured);
        };

        let _gate = self.connect_gate.lock().await;

        if matches!(
            self.state().await,
            EncoderState::Connected | EncoderState::Streaming
        ) {
            return Ok(());
        }

        self.set_state(EncoderState::Connecting).await;

        let mut attempt = 1;
        loop {
            match self
                .transport
                .connect(url.clone(), self.config.password.clone())
                .await
            {
                Ok(()) => break,
                Err(EncoderError::Auth(message)) if attempt < self.config.connect_attempts => {
                    warn!(attempt, %message, "encoder identification failed; retrying");
                    attempt += 1;
                    sleep(self.config.connect_retry_delay).await;
                }
                Err(err) => {
                    self.set_state(EncoderState::Error).await;
                    return Err(err);
                }
            }
        }

        match self.seed_from_encoder().await {
            Ok(()) => {}
            Err(err) => {
                self.set_state(EncoderState::Error).await;
                return Err(err);
            }
        }

        if let Some(default_scene) = self.config.default_scene.clone() {
            self.set_scene(&default_scene).await?;
        }

        info!("encoder connected");
        Ok(())
    }

    /// Tear the control connection down.
    pub async fn disconnect(&self) -> EncoderResult<()> {
        if !self.is_enabled() {
            return Err(EncoderError::NotConfigured);
        }

        self.transport.disconnect().await?;
        let mut inner = self.inner.lock().await;
        inner.state = EncoderState::Disconnected;
        inner.current_scene = None;
        Ok(())
    }

    /// Switch the encoder to `name`, skipping the call when the cached
    /// current scene already matches: rapid polling re-requests the same
    /// scene constantly and must not hammer the socket.
    pub async fn set_scene(&self, name: &str) -> EncoderResult<()> {
        {
            let inner = self.inner.lock().await;
            Self::ensure_ready(inner.state)?;
            if inner.current_scene.as_deref() == Some(name) {
                return Ok(());
            }
        }

        self.transport.set_current_scene(name.to_string()).await?;

        let mut inner = self.inner.lock().await;
        inner.current_scene = Some(name.to_string());
        debug!(scene = %name, "encoder scene switched");
        Ok(())
    }

    /// Start the stream output.
    ///
    /// A rejection saying the output is already active means another call
    /// won the race; that is success, not an error.
    pub async fn start_stream(&self) -> EncoderResult<()> {
        Self::ensure_ready(self.state().await)?;

        match self.transport.start_stream().await {
            Ok(()) => {}
            Err(EncoderError::Request { ref message, .. }) if mentions_already_active(message) => {
                debug!("stream output already active; treating start as success");
            }
            Err(err) => return Err(err),
        }

        self.set_state(EncoderState::Streaming).await;
        Ok(())
    }

    /// Stop the stream output; symmetric with [`Self::start_stream`].
    pub async fn stop_stream(&self) -> EncoderResult<()> {
        Self::ensure_ready(self.state().await)?;

        match self.transport.stop_stream().await {
            Ok(()) => {}
            Err(EncoderError::Request { ref message, .. }) if mentions_not_active(message) => {
                debug!("stream output already stopped; treating stop as success");
            }
            Err(err) => return Err(err),
        }

        self.set_state(EncoderState::Connected).await;
        Ok(())
    }

    /// Push an ingest destination to the encoder.
    pub async fn apply_stream_settings(
        &self,
        server: &str,
        key: &str,
        service_type: &str,
    ) -> EncoderResult<()> {
        if server.trim().is_empty() || key.trim().is_empty() {
            return Err(EncoderError::Config(
                "stream server and key must both be non-empty".into(),
            ));
        }

        Self::ensure_ready(self.state().await)?;
        self.transport
            .set_stream_service_settings(
                server.to_string(),
                key.to_string(),
                service_type.to_string(),
            )
            .await
    }

    /// Apply the ingest settings from configuration, if any were provided.
    pub async fn apply_configured_stream_settings(&self) -> EncoderResult<()> {
        let Some(stream) = self.config.stream.clone() else {
            return Ok(());
        };
        self.apply_stream_settings(&stream.server, &stream.key, &stream.service_type)
            .await
    }

    fn ensure_ready(state: EncoderState) -> EncoderResult<()> {
        match state {
            EncoderState::Disabled => Err(EncoderError::NotConfigured),
            EncoderState::Connected | EncoderState::Streaming => Ok(()),
            _ => Err(EncoderError::NotConnected),
        }
    }

    /// Query stream status and current scene right after connecting so the
    /// cache starts from the encoder's actual state, not assumptions.
    async fn seed_from_encoder(&self) -> EncoderResult<()> {
        let streaming = self.transport.get_stream_status().await?;
        let scene = self.transport.get_current_scene().await?;

        let mut inner = self.inner.lock().await;
        inner.current_scene = Some(scene);
        inner.state = if streaming {
            EncoderState::Streaming
        } else {
            EncoderState::Connected
        };
        Ok(())
    }

    async fn set_state(&self, state: EncoderState) {
        self.inner.lock().await.state = state;
    }

    /// React to out-of-band connection-loss notifications from the
    /// transport, resetting state and dropping the scene cache.
    async fn watch_events(
        manager: Weak<Self>,
        mut events: broadcast::Receiver<TransportEvent>,
    ) {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            };

            let Some(manager) = manager.upgrade() else {
                break;
            };

            let mut inner = manager.inner.lock().await;
            if inner.state == EncoderState::Disabled {
                continue;
            }

            inner.current_scene = None;
            inner.state = match event {
                TransportEvent::Closed => {
                    warn!("encoder closed the control connection");
                    EncoderState::Disconnected
                }
                TransportEvent::Error(message) => {
                    warn!(%message, "encoder control connection errored");
                    EncoderState::Error
                }
            };
        }
    }
}

fn mentions_already_active(message: &str) -> bool {
    message.to_ascii_lowercase().contains("already active")
}

fn mentions_not_active(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("not active") || lower.contains("inactive")
}
