//! Background auto-sync scheduler
//!
//! Two triggers funnel into one merge-sync: local writes (debounced) and a
//! periodic pull tick. Only one sync may be in flight at a time; a trigger
//! arriving mid-sync coalesces into the next debounce cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex as TokioMutex};
use tokio::task::JoinHandle;

use crate::db::Database;
use crate::sync::client::{SyncClient, SyncMode};
use crate::sync::wire::ConflictItem;

/// Wait after the last local write before pushing.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);
/// Poll for remote changes this often.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

type PullCallback = Box<dyn Fn() + Send + Sync>;
type ConflictCallback = Box<dyn Fn(&[ConflictItem]) + Send + Sync>;

struct Shared {
    client: Arc<SyncClient>,
    db: Arc<StdMutex<Database>>,
    /// A debounce cycle is queued; coalesces repeated triggers
    pending: AtomicBool,
    /// Single-flight guard: held for the whole merge-sync
    syncing: TokioMutex<()>,
    last_error: StdMutex<Option<String>>,
    on_pull: StdMutex<Option<PullCallback>>,
    on_conflict: StdMutex<Option<ConflictCallback>>,
}

impl Shared {
    async fn do_sync(&self) {
        let Ok(_guard) = self.syncing.try_lock() else {
            tracing::debug!("sync already in progress, skipping");
            return;
        };

        match self.client.sync(&self.db, SyncMode::Merge).await {
            Ok(report) => {
                *self.last_error.lock().expect("last_error mutex poisoned") = None;
                if report.pulled > 0 {
                    if let Some(callback) =
                        &*self.on_pull.lock().expect("on_pull mutex poisoned")
                    {
                        callback();
                    }
                }
                if !report.conflicts.is_empty() {
                    tracing::info!(count = report.conflicts.len(), "sync conflicts detected");
                    if let Some(callback) =
                        &*self.on_conflict.lock().expect("on_conflict mutex poisoned")
                    {
                        callback(&report.conflicts);
                    }
                }
            }
            Err(error) => {
                tracing::warn!(%error, "auto-sync failed");
                *self.last_error.lock().expect("last_error mutex poisoned") =
                    Some(error.to_string());
            }
        }
    }
}

/// Background sync scheduler for one replica
pub struct AutoSync {
    shared: Arc<Shared>,
    trigger_tx: mpsc::Sender<()>,
    stop_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl AutoSync {
    /// Start the scheduler with the default debounce and poll timings.
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(client: Arc<SyncClient>, db: Arc<StdMutex<Database>>) -> Self {
        Self::with_timings(client, db, DEFAULT_DEBOUNCE, DEFAULT_POLL_INTERVAL)
    }

    /// Start the scheduler with explicit timings (tests shrink them).
    #[must_use]
    pub fn with_timings(
        client: Arc<SyncClient>,
        db: Arc<StdMutex<Database>>,
        debounce: Duration,
        poll_interval: Duration,
    ) -> Self {
        tracing::info!(?debounce, ?poll_interval, "starting auto-sync");

        let (trigger_tx, mut trigger_rx) = mpsc::channel::<()>(1);
        let (stop_tx, stop_rx) = watch::channel(false);
        let shared = Arc::new(Shared {
            client,
            db,
            pending: AtomicBool::new(false),
            syncing: TokioMutex::new(()),
            last_error: StdMutex::new(None),
            on_pull: StdMutex::new(None),
            on_conflict: StdMutex::new(None),
        });

        let mut handles = Vec::with_capacity(2);

        // Debounced push cycle: wait out the quiet period, then sync.
        {
            let shared = Arc::clone(&shared);
            let mut stop = stop_rx.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = stop.changed() => break,
                        received = trigger_rx.recv() => {
                            if received.is_none() {
                                break;
                            }
                            tokio::select! {
                                _ = stop.changed() => break,
                                () = tokio::time::sleep(debounce) => {
                                    shared.pending.store(false, Ordering::SeqCst);
                                    shared.do_sync().await;
                                }
                            }
                        }
                    }
                }
                tracing::debug!("auto-sync debounce loop stopped");
            }));
        }

        // Periodic pull tick. interval_at so the first tick waits a full
        // period instead of firing at startup.
        {
            let shared = Arc::clone(&shared);
            let mut stop = stop_rx;
            handles.push(tokio::spawn(async move {
                let start = tokio::time::Instant::now() + poll_interval;
                let mut ticker = tokio::time::interval_at(start, poll_interval);
                loop {
                    tokio::select! {
                        _ = stop.changed() => break,
                        _ = ticker.tick() => {
                            if shared.client.can_auto_sync() {
                                shared.do_sync().await;
                            } else {
                                tracing::debug!("auto-sync not available, skipping poll");
                            }
                        }
                    }
                }
                tracing::debug!("auto-sync poll loop stopped");
            }));
        }

        Self {
            shared,
            trigger_tx,
            stop_tx,
            handles,
        }
    }

    /// Called by local writers after a durable write.
    ///
    /// No-op unless auto-sync is permitted. Triggers while a cycle is
    /// already pending are coalesced.
    pub fn trigger(&self) {
        if !self.shared.client.can_auto_sync() {
            tracing::debug!("auto-sync not available, ignoring trigger");
            return;
        }
        if !self.shared.pending.swap(true, Ordering::SeqCst) {
            // Capacity-1 channel: a full buffer already means a queued cycle.
            let _ = self.trigger_tx.try_send(());
        }
    }

    /// Run a merge-sync immediately, through the single-flight guard.
    pub async fn sync_now(&self) {
        self.shared.pending.store(false, Ordering::SeqCst);
        self.shared.do_sync().await;
    }

    /// A debounce cycle is queued.
    pub fn is_pending(&self) -> bool {
        self.shared.pending.load(Ordering::SeqCst)
    }

    /// Error of the most recent sync attempt, if it failed.
    pub fn last_error(&self) -> Option<String> {
        self.shared
            .last_error
            .lock()
            .expect("last_error mutex poisoned")
            .clone()
    }

    /// Invoked after a sync that pulled at least one row, so the UI refreshes.
    pub fn set_on_pull(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self.shared.on_pull.lock().expect("on_pull mutex poisoned") = Some(Box::new(callback));
    }

    /// Invoked with the conflicts of a sync that detected any.
    pub fn set_on_conflict(&self, callback: impl Fn(&[ConflictItem]) + Send + Sync + 'static) {
        *self
            .shared
            .on_conflict
            .lock()
            .expect("on_conflict mutex poisoned") = Some(Box::new(callback));
    }

    /// Signal both timers and wait for them to exit.
    ///
    /// An in-flight HTTP call is allowed to finish; no hard cancel.
    pub async fn stop(mut self) {
        tracing::info!("stopping auto-sync");
        let _ = self.stop_tx.send(true);
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::settings::SyncSettings;
    use std::sync::atomic::AtomicUsize;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Minimal TCP server that counts connections and answers every request
    /// with a 500 after `delay`.
    async fn spawn_counting_server(delay: Duration) -> (String, Arc<AtomicUsize>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let mut buffer = [0u8; 2048];
                    let _ = socket.read(&mut buffer).await;
                    tokio::time::sleep(delay).await;
                    let _ = socket
                        .write_all(
                            b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                        )
                        .await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        (format!("http://{addr}"), count)
    }

    fn logged_in_client(dir: &tempfile::TempDir, server_url: &str) -> Arc<SyncClient> {
        let path = dir.path().join("sync.json");
        SyncSettings {
            server_url: server_url.to_string(),
            token: "session-token".to_string(),
            user_id: "user-1".to_string(),
            has_synced_once: true,
            ..SyncSettings::default()
        }
        .save(&path)
        .unwrap();
        Arc::new(SyncClient::new(path).unwrap())
    }

    fn shared_db() -> Arc<StdMutex<Database>> {
        Arc::new(StdMutex::new(Database::open_in_memory().unwrap()))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn trigger_is_noop_before_initial_sync() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.json");
        SyncSettings {
            server_url: "http://127.0.0.1:1".to_string(),
            token: "session-token".to_string(),
            has_synced_once: false,
            ..SyncSettings::default()
        }
        .save(&path)
        .unwrap();

        let auto = AutoSync::with_timings(
            Arc::new(SyncClient::new(path).unwrap()),
            shared_db(),
            Duration::from_millis(10),
            Duration::from_secs(60),
        );

        auto.trigger();
        assert!(!auto.is_pending());
        auto.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rapid_triggers_coalesce_into_one_sync() {
        let (server_url, count) = spawn_counting_server(Duration::ZERO).await;
        let dir = tempfile::tempdir().unwrap();
        let auto = AutoSync::with_timings(
            logged_in_client(&dir, &server_url),
            shared_db(),
            Duration::from_millis(50),
            Duration::from_secs(60),
        );

        for _ in 0..5 {
            auto.trigger();
        }
        assert!(auto.is_pending());

        tokio::time::sleep(Duration::from_millis(400)).await;
        // Empty store means no push; the lone request is the pull.
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!auto.is_pending());
        assert!(auto.last_error().is_some());
        auto.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_syncs_are_single_flight() {
        let (server_url, count) = spawn_counting_server(Duration::from_millis(200)).await;
        let dir = tempfile::tempdir().unwrap();
        let auto = AutoSync::with_timings(
            logged_in_client(&dir, &server_url),
            shared_db(),
            Duration::from_secs(60),
            Duration::from_secs(60),
        );

        tokio::join!(auto.sync_now(), auto.sync_now());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        auto.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_interrupts_a_queued_debounce() {
        let (server_url, count) = spawn_counting_server(Duration::ZERO).await;
        let dir = tempfile::tempdir().unwrap();
        let auto = AutoSync::with_timings(
            logged_in_client(&dir, &server_url),
            shared_db(),
            Duration::from_secs(30),
            Duration::from_secs(60),
        );

        auto.trigger();
        tokio::time::timeout(Duration::from_secs(1), auto.stop())
            .await
            .expect("stop should be prompt");
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
