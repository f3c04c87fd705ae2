//! Wires the agent together: directories, producers, transfer worker,
//! retention sweepers and shutdown.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::configuration::config::Config;
use crate::data_capture::capture_backend::{PacketCapturer, TsharkCapturer};
use crate::data_capture::capture_producer::CaptureProducer;
use crate::error_handling::types::ControllerError;
use crate::identity::IdentityContext;
use crate::retention::RetentionSweeper;
use crate::transfer::transfer_queue;
use crate::transfer::transfer_worker::{TransferStats, TransferWorker};
use crate::transfer::transport::{Transport, WebSocketTransport};

pub struct Controller {
    pub config: Config,
    identity: Arc<IdentityContext>,
    capturer: Arc<dyn PacketCapturer>,
    transport: Arc<dyn Transport>,
}

impl Controller {
    /// Controller backed by `tshark` and the WebSocket transport.
    pub fn new(config: Config, identity: IdentityContext) -> Result<Self, ControllerError> {
        let capturer = Arc::new(TsharkCapturer::new(config.capture.tool.clone()));
        let transport = Arc::new(WebSocketTransport::new(
            identity.bearer(),
            config.transfer.connect_timeout(),
        ));
        Self::with_backends(config, identity, capturer, transport)
    }

    pub fn with_backends(
        config: Config,
        identity: IdentityContext,
        capturer: Arc<dyn PacketCapturer>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ControllerError> {
        config.validate()?;
        Ok(Self {
            config,
            identity: Arc::new(identity),
            capturer,
            transport,
        })
    }

    /// Runs until SIGINT or SIGTERM.
    pub async fn run(&self) -> Result<TransferStats, ControllerError> {
        let shutdown = CancellationToken::new();
        let signals = spawn_signal_listener(shutdown.clone())?;

        let result = self.run_until(shutdown).await;
        signals.abort();
        result
    }

    /// Runs every component until `shutdown` is cancelled, then waits for
    /// them to stop.
    pub async fn run_until(
        &self,
        shutdown: CancellationToken,
    ) -> Result<TransferStats, ControllerError> {
        self.prepare_directories()?;

        let (queue_tx, queue_rx) = transfer_queue::channel(self.config.transfer.queue_capacity);

        let worker = TransferWorker::new(
            Arc::clone(&self.identity),
            &self.config.transfer,
            Arc::clone(&self.transport),
            shutdown.clone(),
        );
        let worker_handle = tokio::spawn(async move { worker.run(queue_rx).await });

        let mut handles: Vec<(String, JoinHandle<()>)> = Vec::new();
        for interface in &self.config.interfaces {
            let producer = CaptureProducer::new(
                interface,
                Arc::clone(&self.identity),
                &self.config,
                Arc::clone(&self.capturer),
                queue_tx.clone(),
            );
            info!("[{}] Starting capture", interface);
            handles.push((interface.clone(), tokio::spawn(producer.run(shutdown.clone()))));
        }
        // The worker sees the end of the queue once every producer is gone.
        drop(queue_tx);

        for rule in self.config.retention_rules() {
            let label = format!("retention:{}", rule.directory.display());
            let sweeper = RetentionSweeper::new(
                rule,
                &self.config.retention.extension,
                self.config.retention.sweep_interval(),
            );
            handles.push((label, tokio::spawn(sweeper.run(shutdown.clone()))));
        }

        info!(
            "Sensor {} running on {} interface(s)",
            self.identity.sensor_id,
            self.config.interfaces.len()
        );

        shutdown.cancelled().await;
        info!("Shutdown requested, stopping components");

        for (name, handle) in handles {
            if let Err(e) = handle.await {
                error!("[{}] Task ended abnormally: {}", name, e);
            }
        }
        let stats = worker_handle
            .await
            .map_err(|e| ControllerError::InitializationFailed(e.to_string()))?;

        info!("All components stopped");
        Ok(stats)
    }

    /// Creates the capture and backup directories with the configured mode.
    pub fn prepare_directories(&self) -> Result<(), ControllerError> {
        let storage = &self.config.storage;
        for dir in [&storage.capture_dir, &storage.backup_dir] {
            prepare_directory(dir, storage.directory_mode)?;
        }
        Ok(())
    }
}

fn prepare_directory(dir: &Path, mode: u32) -> Result<(), ControllerError> {
    fs::create_dir_all(dir).map_err(|e| ControllerError::DirectorySetupFailed(dir.into(), e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(mode))
            .map_err(|e| ControllerError::DirectorySetupFailed(dir.into(), e))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    debug!("Directory {} ready", dir.display());
    Ok(())
}

/// Cancels `shutdown` on the first SIGINT or SIGTERM.
fn spawn_signal_listener(shutdown: CancellationToken) -> Result<JoinHandle<()>, ControllerError> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate =
            signal(SignalKind::terminate()).map_err(ControllerError::SignalSetupFailed)?;

        Ok(tokio::spawn(async move {
            tokio::select! {
                res = tokio::signal::ctrl_c() => {
                    if let Err(e) = res {
                        warn!("Unable to listen for SIGINT: {}", e);
                    }
                    info!("SIGINT received");
                }
                _ = terminate.recv() => info!("SIGTERM received"),
            }
            shutdown.cancel();
        }))
    }

    #[cfg(not(unix))]
    {
        Ok(tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received");
            }
            shutdown.cancel();
        }))
    }
}
