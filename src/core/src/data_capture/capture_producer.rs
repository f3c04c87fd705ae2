//! Per-interface capture loop.
//!
//! A `CaptureProducer` owns one monitored interface. Every cycle it runs the
//! blocking capture on the runtime's blocking pool, mirrors the finished file
//! into the backup directory and only then hands the artifact to the transfer
//! queue, so the queue never references a file that is not fully on disk in
//! both places.
//!
//! By default a failed cycle ends the producer for good; the other
//! interfaces, the transfer worker and the sweepers keep running. A restart
//! backoff can be configured instead.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::configuration::config::Config;
use crate::configuration::types::RestartPolicy;
use crate::error_handling::types::CaptureError;
use crate::identity::IdentityContext;
use crate::transfer::transfer_queue::ArtifactSender;

use super::artifact_name::ArtifactName;
use super::capture_backend::PacketCapturer;
use super::types::CaptureArtifact;

pub struct CaptureProducer {
    interface: String,
    identity: Arc<IdentityContext>,
    capture_dir: PathBuf,
    backup_dir: PathBuf,
    packet_count: u32,
    restart_policy: RestartPolicy,
    capturer: Arc<dyn PacketCapturer>,
    queue: ArtifactSender,
    /// Sequence number of the next capture file, starting at 1.
    next_sequence: u64,
}

impl CaptureProducer {
    pub fn new(
        interface: &str,
        identity: Arc<IdentityContext>,
        config: &Config,
        capturer: Arc<dyn PacketCapturer>,
        queue: ArtifactSender,
    ) -> Self {
        Self {
            interface: interface.to_string(),
            identity,
            capture_dir: config.storage.capture_dir.clone(),
            backup_dir: config.storage.backup_dir.clone(),
            packet_count: config.capture.packet_count,
            restart_policy: config.capture.restart_policy(),
            capturer,
            queue,
            next_sequence: 1,
        }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Captures until the token is cancelled or a cycle fails under the
    /// `Terminate` policy.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("[{}] Starting packet capture", self.interface);

        loop {
            let cycle = tokio::select! {
                _ = shutdown.cancelled() => break,
                res = self.capture_cycle() => res,
            };

            match cycle {
                Ok(artifact) => {
                    debug!(
                        "[{}] Capture #{} queued for transfer",
                        self.interface, artifact.sequence
                    );
                }
                Err(CaptureError::QueueClosed) => {
                    warn!("[{}] Transfer queue closed, stopping capture", self.interface);
                    break;
                }
                Err(e) => match self.restart_policy {
                    RestartPolicy::Terminate => {
                        error!("[{}] Capture failed, producer stopping: {}", self.interface, e);
                        break;
                    }
                    RestartPolicy::Restart { backoff } => {
                        warn!(
                            "[{}] Capture failed, retrying in {:?}: {}",
                            self.interface, backoff, e
                        );
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = tokio::time::sleep(backoff) => {}
                        }
                    }
                },
            }
        }

        info!(
            "[{}] Capture producer stopped after {} file(s)",
            self.interface,
            self.next_sequence - 1
        );
    }

    /// Runs one capture cycle: capture, back up, enqueue.
    ///
    /// The sequence number only advances once the artifact is queued, so a
    /// failed cycle is retried under the same number.
    pub async fn capture_cycle(&mut self) -> Result<CaptureArtifact, CaptureError> {
        let name = ArtifactName::new(
            self.identity.user_id,
            &self.identity.sensor_id,
            &self.interface,
            Utc::now(),
            self.next_sequence,
        );
        let file_name = name.file_name();
        let path = self.capture_dir.join(&file_name);

        info!(
            "[{}] Capturing {} packets into {}",
            self.interface,
            self.packet_count,
            path.display()
        );

        let capturer = Arc::clone(&self.capturer);
        let interface = self.interface.clone();
        let output = path.clone();
        let packet_count = self.packet_count;
        tokio::task::spawn_blocking(move || capturer.capture(&interface, packet_count, &output))
            .await
            .map_err(|e| CaptureError::WorkerPanicked(e.to_string()))??;

        let backup_path = self.backup_dir.join(&file_name);
        tokio::fs::copy(&path, &backup_path)
            .await
            .map_err(CaptureError::BackupFailed)?;
        debug!("[{}] Backed up to {}", self.interface, backup_path.display());

        let artifact = CaptureArtifact {
            user_id: name.user_id,
            sensor_id: name.sensor_id,
            interface: name.interface,
            created_at: name.created_at,
            sequence: name.sequence,
            path,
            backup_path,
        };

        self.queue.enqueue(artifact.clone()).await?;
        self.next_sequence += 1;
        Ok(artifact)
    }
}
