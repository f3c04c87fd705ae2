//! Single consumer of the transfer queue.
//!
//! The worker takes artifacts one at a time and delivers each over a fresh
//! outbound connection, so at most one connection to the collection server is
//! open at any moment regardless of how many interfaces are captured.
//!
//! Each artifact gets a bounded number of attempts with a fixed delay after
//! every failed one. An artifact that exhausts its attempts is dropped with an
//! error log line; its files stay on disk until the retention sweeper removes
//! them. Delivered files are never deleted here either.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::configuration::types::TransferConfig;
use crate::data_capture::types::CaptureArtifact;
use crate::error_handling::types::TransferError;
use crate::identity::IdentityContext;

use super::transfer_queue::ArtifactReceiver;
use super::transport::{Destination, Transport};

/// Result of delivering one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Delivered { attempts: u32 },
    Dropped { attempts: u32 },
    /// Shutdown was requested during an attempt or between two attempts.
    Cancelled { attempts: u32 },
}

/// Counters reported when the worker stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub delivered: u64,
    pub dropped: u64,
}

pub struct TransferWorker {
    identity: Arc<IdentityContext>,
    transfer: TransferConfig,
    transport: Arc<dyn Transport>,
    shutdown: CancellationToken,
}

impl TransferWorker {
    pub fn new(
        identity: Arc<IdentityContext>,
        transfer: &TransferConfig,
        transport: Arc<dyn Transport>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            identity,
            transfer: transfer.clone(),
            transport,
            shutdown,
        }
    }

    /// Dequeues and transfers artifacts until shutdown or until every
    /// producer is gone and the queue is empty.
    pub async fn run(&self, mut queue: ArtifactReceiver) -> TransferStats {
        info!("[transfer] Transfer worker started");
        let mut stats = TransferStats::default();

        loop {
            let artifact = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                next = queue.dequeue() => match next {
                    Some(artifact) => artifact,
                    None => {
                        debug!("[transfer] All producers gone, queue drained");
                        break;
                    }
                },
            };

            match self.transfer(&artifact).await {
                TransferOutcome::Delivered { .. } => stats.delivered += 1,
                TransferOutcome::Dropped { .. } => stats.dropped += 1,
                TransferOutcome::Cancelled { .. } => break,
            }
        }

        if !queue.is_empty() {
            warn!(
                "[transfer] Stopping with {} artifact(s) still queued",
                queue.len()
            );
        }
        info!(
            "[transfer] Transfer worker stopped: {} delivered, {} dropped",
            stats.delivered, stats.dropped
        );
        stats
    }

    /// Delivers one artifact, retrying up to `max_attempts` times.
    pub async fn transfer(&self, artifact: &CaptureArtifact) -> TransferOutcome {
        let destination = Destination::for_artifact(&self.identity, &self.transfer, artifact);
        let max_attempts = self.transfer.max_attempts;
        let delay = self.transfer.retry_delay();
        debug!("[transfer] Server URL: {}", destination.url());

        for attempt in 1..=max_attempts {
            let result = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!(
                        "[transfer] Shutdown requested during attempt {}/{}, abandoning {}",
                        attempt,
                        max_attempts,
                        artifact.path.display()
                    );
                    return TransferOutcome::Cancelled { attempts: attempt };
                }
                res = self.attempt(&destination, artifact) => res,
            };

            match result {
                Ok(bytes) => {
                    info!(
                        "[transfer] {} sent to server ({} bytes, attempt {}/{})",
                        artifact.path.display(),
                        bytes,
                        attempt,
                        max_attempts
                    );
                    return TransferOutcome::Delivered { attempts: attempt };
                }
                Err(e) if e.is_missing_file() => {
                    warn!(
                        "[transfer] {} disappeared before it could be sent (attempt {}/{}): {}",
                        artifact.path.display(),
                        attempt,
                        max_attempts,
                        e
                    );
                }
                Err(e) => {
                    warn!(
                        "[transfer] Error sending {} (attempt {}/{}): {}",
                        artifact.path.display(),
                        attempt,
                        max_attempts,
                        e
                    );
                }
            }

            if !self.backoff(delay).await {
                info!(
                    "[transfer] Shutdown requested, abandoning {}",
                    artifact.path.display()
                );
                return TransferOutcome::Cancelled { attempts: attempt };
            }
        }

        error!(
            "[transfer] Failed to send {} after {} attempts",
            artifact.path.display(),
            max_attempts
        );
        TransferOutcome::Dropped {
            attempts: max_attempts,
        }
    }

    /// One connect, read, send, close round. Returns the payload size.
    async fn attempt(
        &self,
        destination: &Destination,
        artifact: &CaptureArtifact,
    ) -> Result<usize, TransferError> {
        let mut connection = self.transport.connect(destination).await?;

        let payload = match tokio::fs::read(&artifact.path).await {
            Ok(payload) => payload,
            Err(e) => {
                let _ = connection.close().await;
                return Err(TransferError::ReadFailed(e));
            }
        };
        let bytes = payload.len();

        if let Err(e) = connection.send(payload).await {
            let _ = connection.close().await;
            return Err(e);
        }

        if let Err(e) = connection.close().await {
            debug!("[transfer] Close after successful send failed: {}", e);
        }
        Ok(bytes)
    }

    /// Sleeps between attempts. False when shutdown interrupted the wait.
    async fn backoff(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::transfer_queue;
    use crate::transfer::transport::Connection;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio::time::Instant;

    #[derive(Default)]
    struct TransportState {
        connects: AtomicU32,
        failures_left: AtomicU32,
        open: AtomicUsize,
        max_open: AtomicUsize,
        delivered: Mutex<Vec<(Destination, Vec<u8>)>>,
        /// Removed right after the connection opens, like a sweep racing the read.
        delete_on_connect: Mutex<Option<PathBuf>>,
        send_delay: Option<Duration>,
    }

    /// Refuses the first `failures` connections, then accepts everything.
    struct ScriptedTransport {
        state: Arc<TransportState>,
    }

    impl ScriptedTransport {
        fn new(failures: u32) -> (Arc<Self>, Arc<TransportState>) {
            Self::with_state(TransportState {
                failures_left: AtomicU32::new(failures),
                ..TransportState::default()
            })
        }

        fn with_state(state: TransportState) -> (Arc<Self>, Arc<TransportState>) {
            let state = Arc::new(state);
            (
                Arc::new(Self {
                    state: Arc::clone(&state),
                }),
                state,
            )
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn connect(
            &self,
            destination: &Destination,
        ) -> Result<Box<dyn Connection>, TransferError> {
            self.state.connects.fetch_add(1, Ordering::SeqCst);
            let refused = self
                .state
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if refused {
                return Err(TransferError::ConnectionFailed(String::from(
                    "connection refused",
                )));
            }

            let open = self.state.open.fetch_add(1, Ordering::SeqCst) + 1;
            self.state.max_open.fetch_max(open, Ordering::SeqCst);

            if let Some(path) = self.state.delete_on_connect.lock().unwrap().take() {
                std::fs::remove_file(path).unwrap();
            }

            Ok(Box::new(ScriptedConnection {
                state: Arc::clone(&self.state),
                destination: destination.clone(),
            }))
        }
    }

    struct ScriptedConnection {
        state: Arc<TransportState>,
        destination: Destination,
    }

    #[async_trait]
    impl Connection for ScriptedConnection {
        async fn send(&mut self, payload: Vec<u8>) -> Result<(), TransferError> {
            if let Some(delay) = self.state.send_delay {
                tokio::time::sleep(delay).await;
            }
            self.state
                .delivered
                .lock()
                .unwrap()
                .push((self.destination.clone(), payload));
            Ok(())
        }

        async fn close(self: Box<Self>) -> Result<(), TransferError> {
            self.state.open.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn identity() -> Arc<IdentityContext> {
        Arc::new(IdentityContext {
            server_host: String::from("collector.local"),
            server_port: 8002,
            token: String::from("t"),
            user_id: 42,
            sensor_id: String::from("SHSIDbeef"),
        })
    }

    fn artifact_in(dir: &Path, interface: &str, sequence: u64) -> CaptureArtifact {
        let path = dir.join(format!("{}-{}.pcap", interface, sequence));
        std::fs::write(&path, format!("payload {} {}", interface, sequence)).unwrap();
        CaptureArtifact {
            user_id: 42,
            sensor_id: String::from("SHSIDbeef"),
            interface: interface.to_string(),
            created_at: Utc::now(),
            sequence,
            backup_path: path.clone(),
            path,
        }
    }

    fn worker(transport: Arc<ScriptedTransport>, shutdown: CancellationToken) -> TransferWorker {
        TransferWorker::new(identity(), &TransferConfig::default(), transport, shutdown)
    }

    fn tempdir() -> TempDir {
        tempfile::tempdir().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_four_failures_then_success() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempdir();
        let artifact = artifact_in(dir.path(), "enp0s8", 1);
        let (transport, state) = ScriptedTransport::new(4);
        let worker = worker(transport, CancellationToken::new());

        let start = Instant::now();
        let outcome = worker.transfer(&artifact).await;
        let elapsed = start.elapsed();

        assert_eq!(outcome, TransferOutcome::Delivered { attempts: 5 });
        assert_eq!(state.connects.load(Ordering::SeqCst), 5);
        assert!(elapsed >= Duration::from_secs(20), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(21), "elapsed {:?}", elapsed);

        let delivered = state.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0.interface, "enp0s8");
        assert_eq!(delivered[0].0.capture_number, 1);
        assert_eq!(delivered[0].1, b"payload enp0s8 1".to_vec());
        // Delivered files are left for the retention sweeper.
        assert!(artifact.path.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_success_does_not_sleep() {
        let dir = tempdir();
        let artifact = artifact_in(dir.path(), "enp0s8", 1);
        let (transport, state) = ScriptedTransport::new(0);
        let worker = worker(transport, CancellationToken::new());

        let start = Instant::now();
        let outcome = worker.transfer(&artifact).await;

        assert_eq!(outcome, TransferOutcome::Delivered { attempts: 1 });
        assert_eq!(state.connects.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_attempts_drop_artifact() {
        let dir = tempdir();
        let artifact = artifact_in(dir.path(), "enp0s9", 1);
        let (transport, state) = ScriptedTransport::new(u32::MAX);
        let worker = worker(transport, CancellationToken::new());

        let start = Instant::now();
        let outcome = worker.transfer(&artifact).await;

        assert_eq!(outcome, TransferOutcome::Dropped { attempts: 5 });
        assert_eq!(state.connects.load(Ordering::SeqCst), 5);
        // A delay follows every failed attempt, the fifth included.
        assert!(start.elapsed() >= Duration::from_secs(25));
        assert!(artifact.path.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_artifact_is_not_requeued() {
        let dir = tempdir();
        let (tx, rx) = transfer_queue::channel(None);
        tx.enqueue(artifact_in(dir.path(), "enp0s8", 1)).await.unwrap();
        tx.enqueue(artifact_in(dir.path(), "enp0s8", 2)).await.unwrap();
        drop(tx);

        // First artifact burns all five attempts, second goes through.
        let (transport, state) = ScriptedTransport::new(5);
        let stats = worker(transport, CancellationToken::new()).run(rx).await;

        assert_eq!(
            stats,
            TransferStats {
                delivered: 1,
                dropped: 1
            }
        );
        assert_eq!(state.connects.load(Ordering::SeqCst), 6);
        let delivered = state.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0.capture_number, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_more_than_one_open_connection() {
        let dir = tempdir();
        let (tx, rx) = transfer_queue::channel(None);
        let (transport, state) = ScriptedTransport::with_state(TransportState {
            send_delay: Some(Duration::from_millis(50)),
            ..TransportState::default()
        });

        let mut producers = Vec::new();
        for iface in ["enp0s8", "enp0s9", "enp0s10"] {
            let tx = tx.clone();
            let dir = dir.path().to_path_buf();
            producers.push(tokio::spawn(async move {
                for seq in 1..=10 {
                    tx.enqueue(artifact_in(&dir, iface, seq)).await.unwrap();
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            }));
        }
        drop(tx);

        let stats = worker(transport, CancellationToken::new()).run(rx).await;
        for p in producers {
            p.await.unwrap();
        }

        assert_eq!(stats.delivered, 30);
        assert_eq!(state.max_open.load(Ordering::SeqCst), 1);
        assert_eq!(state.open.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_file_deleted_before_read_is_contained() {
        let dir = tempdir();
        let doomed = artifact_in(dir.path(), "enp0s8", 1);
        let survivor = artifact_in(dir.path(), "enp0s8", 2);

        let (transport, state) = ScriptedTransport::with_state(TransportState {
            delete_on_connect: Mutex::new(Some(doomed.path.clone())),
            ..TransportState::default()
        });

        let (tx, rx) = transfer_queue::channel(None);
        tx.enqueue(doomed).await.unwrap();
        tx.enqueue(survivor).await.unwrap();
        drop(tx);

        let stats = worker(transport, CancellationToken::new()).run(rx).await;

        assert_eq!(
            stats,
            TransferStats {
                delivered: 1,
                dropped: 1
            }
        );
        // Every failed read still closed its connection.
        assert_eq!(state.open.load(Ordering::SeqCst), 0);
        assert_eq!(state.delivered.lock().unwrap()[0].0.capture_number, 2);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_stalled_handshake() {
        use crate::transfer::transport::WebSocketTransport;
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let holder = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((sock, _)) = listener.accept().await {
                held.push(sock);
            }
        });

        let dir = tempdir();
        let (tx, rx) = transfer_queue::channel(None);
        tx.enqueue(artifact_in(dir.path(), "enp0s8", 1)).await.unwrap();

        let identity = Arc::new(IdentityContext {
            server_host: String::from("127.0.0.1"),
            server_port: port,
            ..(*identity()).clone()
        });
        // Handshake bound far beyond the test, so only shutdown can end it.
        let transport = Arc::new(WebSocketTransport::new(
            identity.bearer(),
            Duration::from_secs(600),
        ));
        let shutdown = CancellationToken::new();
        let worker =
            TransferWorker::new(identity, &TransferConfig::default(), transport, shutdown.clone());

        let handle = tokio::spawn(async move { worker.run(rx).await });
        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown.cancel();

        let stats = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker did not stop after shutdown")
            .unwrap();
        assert_eq!(stats, TransferStats::default());
        holder.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_attempt_reports_cancelled() {
        let dir = tempdir();
        let artifact = artifact_in(dir.path(), "enp0s8", 1);
        let (transport, _state) = ScriptedTransport::with_state(TransportState {
            send_delay: Some(Duration::from_secs(60)),
            ..TransportState::default()
        });
        let shutdown = CancellationToken::new();
        let worker = worker(transport, shutdown.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            shutdown.cancel();
        });
        let outcome = worker.transfer(&artifact).await;
        canceller.await.unwrap();

        assert_eq!(outcome, TransferOutcome::Cancelled { attempts: 1 });
    }

    #[tokio::test]
    async fn test_missing_file_error_is_recognised() {
        let err = tokio::fs::read("/nonexistent/sniffhawk.pcap").await.unwrap_err();
        assert!(TransferError::ReadFailed(err).is_missing_file());
        assert!(!TransferError::ConnectionFailed(String::from("x")).is_missing_file());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_backoff() {
        let dir = tempdir();
        let (tx, rx) = transfer_queue::channel(None);
        tx.enqueue(artifact_in(dir.path(), "enp0s8", 1)).await.unwrap();
        tx.enqueue(artifact_in(dir.path(), "enp0s8", 2)).await.unwrap();

        let (transport, state) = ScriptedTransport::new(u32::MAX);
        let shutdown = CancellationToken::new();
        let worker = worker(transport, shutdown.clone());

        let handle = tokio::spawn(async move { worker.run(rx).await });
        tokio::time::sleep(Duration::from_secs(7)).await;
        shutdown.cancel();

        let stats = handle.await.unwrap();
        assert_eq!(stats, TransferStats::default());
        assert_eq!(state.connects.load(Ordering::SeqCst), 2);
        assert_eq!(tx.len(), 1);
    }
}
