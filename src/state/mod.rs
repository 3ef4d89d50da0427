mod sse;

use std::sync::Arc;

use tokio::sync::{RwLock, mpsc, watch};

use crate::{
    config::AppConfig, dao::store::PlatformStore, error::ServiceError,
    services::notifier::MentionNotification,
};

pub use self::sse::SseHub;

pub type SharedState = Arc<AppState>;

const SSE_CAPACITY: usize = 64;

/// Central application state holding the storage handle and the notification plumbing.
pub struct AppState {
    store: RwLock<Option<Arc<dyn PlatformStore>>>,
    config: AppConfig,
    notifications: mpsc::Sender<MentionNotification>,
    sse: SseHub,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// Also returns the receiving end of the notification channel, which the notifier task
    /// drains. The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> (SharedState, mpsc::Receiver<MentionNotification>) {
        let (degraded_tx, _rx) = watch::channel(true);
        let (notify_tx, notify_rx) = mpsc::channel(config.mentions.notification_buffer.max(1));
        let state = Arc::new(Self {
            store: RwLock::new(None),
            config,
            notifications: notify_tx,
            sse: SseHub::new(SSE_CAPACITY),
            degraded: degraded_tx,
        });
        (state, notify_rx)
    }

    /// Build a state with `store` already installed, as used by tests and the in-memory backend.
    pub async fn with_store(
        config: AppConfig,
        store: Arc<dyn PlatformStore>,
    ) -> (SharedState, mpsc::Receiver<MentionNotification>) {
        let (state, rx) = Self::new(config);
        state.install_store(store).await;
        (state, rx)
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current store, if one is installed.
    pub async fn store(&self) -> Option<Arc<dyn PlatformStore>> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// Current store, or [`ServiceError::Degraded`] while storage is unavailable.
    pub async fn require_store(&self) -> Result<Arc<dyn PlatformStore>, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        self.store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new store implementation and leave degraded mode.
    pub async fn install_store(&self, store: Arc<dyn PlatformStore>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear_store(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Sending half of the resolver-to-notifier channel.
    pub fn notifications(&self) -> &mpsc::Sender<MentionNotification> {
        &self.notifications
    }

    /// Broadcast hub feeding `/sse/mentions`.
    pub fn mention_sse(&self) -> &SseHub {
        &self.sse
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::store::memory::MemoryStore;

    #[tokio::test]
    async fn degraded_until_a_store_is_installed() {
        let (state, _rx) = AppState::new(AppConfig::default());
        assert!(state.is_degraded());
        assert!(matches!(
            state.require_store().await,
            Err(ServiceError::Degraded)
        ));

        let mut watcher = state.degraded_watcher();
        state.install_store(Arc::new(MemoryStore::new())).await;
        assert!(watcher.has_changed().unwrap());
        assert!(!*watcher.borrow_and_update());
        assert!(state.require_store().await.is_ok());

        state.update_degraded(true);
        assert!(state.require_store().await.is_err());
        state.clear_store().await;
        assert!(state.store().await.is_none());
    }
}
