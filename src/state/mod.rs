/// Runtime session record and location types.
pub mod session;
/// Session lifecycle state machine.
pub mod session_machine;

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, watch};

use crate::{config::AppConfig, dao::session_store::SessionStore, error::ServiceError};

/// Cheaply cloneable handle to the shared application state.
pub type SharedState = Arc<AppState>;

/// Central application state storing the storage handle and configuration.
pub struct AppState {
    config: AppConfig,
    session_store: RwLock<Option<Arc<dyn SessionStore>>>,
    degraded: watch::Sender<bool>,
    transition_gate: Mutex<()>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            config,
            session_store: RwLock::new(None),
            degraded: degraded_tx,
            transition_gate: Mutex::new(()),
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current session store, if one is installed.
    pub async fn session_store(&self) -> Option<Arc<dyn SessionStore>> {
        let guard = self.session_store.read().await;
        guard.as_ref().cloned()
    }

    /// Obtain the session store or fail with the degraded-mode service error.
    pub async fn require_session_store(&self) -> Result<Arc<dyn SessionStore>, ServiceError> {
        self.session_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new session store implementation and leave degraded mode.
    pub async fn install_session_store(&self, store: Arc<dyn SessionStore>) {
        {
            let mut guard = self.session_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the current session store and enter degraded mode.
    pub async fn clear_session_store(&self) {
        {
            let mut guard = self.session_store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.session_store.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Gate serializing every session read-modify-write, so the sweeper and
    /// concurrent HTTP mutations cannot interleave (this is also what makes
    /// two same-second create calls for one pack resolve to a single winner).
    pub fn transition_gate(&self) -> &Mutex<()> {
        &self.transition_gate
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        let _ = self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }
}
