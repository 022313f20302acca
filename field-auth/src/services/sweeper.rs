use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{metrics, verification::VerificationCodeStore};

/// Periodically deletes expired verification codes.
///
/// Reads never trigger a sweep; they only evict the single record they touch.
pub struct CodeSweeper {
    store: VerificationCodeStore,
    interval: Duration,
    running: Mutex<Option<(JoinHandle<()>, CancellationToken)>>,
}

impl CodeSweeper {
    pub fn new(store: VerificationCodeStore, interval: Duration) -> Self {
        Self {
            store,
            interval,
            running: Mutex::new(None),
        }
    }

    /// Spawns the sweep loop. The first sweep runs immediately. Calling it
    /// again while running is a no-op; after `stop` it starts a new loop.
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return;
        }

        let store = self.store.clone();
        let token = CancellationToken::new();
        let shutdown = token.clone();
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => Self::sweep_once(&store).await,
                }
            }
            tracing::info!("Verification code sweeper stopped");
        });
        *running = Some((handle, token));

        tracing::info!(interval_seconds = period.as_secs(), "Verification code sweeper started");
    }

    /// Cancels the loop and waits for the task to finish.
    pub async fn stop(&self) {
        if let Some((handle, token)) = self.running.lock().await.take() {
            token.cancel();
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Verification code sweeper task failed");
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|(h, _)| !h.is_finished())
    }

    async fn sweep_once(store: &VerificationCodeStore) {
        match store.sweep_expired().await {
            Ok(removed) => metrics::record_swept(removed),
            Err(e) => tracing::error!(error = %e, "Verification code sweep failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VerificationConfig;
    use crate::services::{clock::MockClock, code_storage::MemoryCodeStorage};
    use crate::services::code_storage::CodeStorage;
    use chrono::Duration as ChronoDuration;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_sweeper_removes_expired_and_stops() {
        let clock = MockClock::default();
        let storage = MemoryCodeStorage::new();
        let store = VerificationCodeStore::new(
            Arc::new(storage.clone()),
            Arc::new(clock.clone()),
            &VerificationConfig::default(),
        );
        store.store_code("+15551234567", "123456").await.unwrap();
        clock.advance(ChronoDuration::minutes(11));

        let sweeper = CodeSweeper::new(store, Duration::from_secs(3600));
        sweeper.start().await;
        assert!(sweeper.is_running().await);

        for _ in 0..100 {
            if storage.len().await.unwrap() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(storage.len().await.unwrap(), 0);

        sweeper.stop().await;
        assert!(!sweeper.is_running().await);
    }

    #[tokio::test]
    async fn test_sweeper_can_restart_after_stop() {
        // Arrange
        let clock = MockClock::default();
        let storage = MemoryCodeStorage::new();
        let store = VerificationCodeStore::new(
            Arc::new(storage.clone()),
            Arc::new(clock.clone()),
            &VerificationConfig::default(),
        );
        let sweeper = CodeSweeper::new(store.clone(), Duration::from_secs(3600));
        sweeper.start().await;
        sweeper.stop().await;
        assert!(!sweeper.is_running().await);

        store.store_code("+15551234567", "123456").await.unwrap();
        clock.advance(ChronoDuration::minutes(11));

        // Act
        sweeper.start().await;
        for _ in 0..100 {
            if storage.len().await.unwrap() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }

        // Assert
        assert_eq!(storage.len().await.unwrap(), 0);
        assert!(sweeper.is_running().await);

        sweeper.stop().await;
        assert!(!sweeper.is_running().await);
    }
}
