//! Hand-off queue between the capture producers and the transfer worker.
//!
//! A thin wrapper around `tokio::sync::mpsc`: many producers hold a cloned
//! [`ArtifactSender`], the single transfer worker owns the [`ArtifactReceiver`].
//! Artifacts sent by one producer come out in the order they went in; there is
//! no ordering across producers.
//!
//! The queue is unbounded by default. A capacity can be configured, in which
//! case `enqueue` waits for room instead of growing the backlog.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::trace;
use tokio::sync::mpsc;

use crate::data_capture::types::CaptureArtifact;
use crate::error_handling::types::QueueError;

#[derive(Debug, Clone)]
enum SenderInner {
    Unbounded(mpsc::UnboundedSender<CaptureArtifact>),
    Bounded(mpsc::Sender<CaptureArtifact>),
}

#[derive(Debug)]
enum ReceiverInner {
    Unbounded(mpsc::UnboundedReceiver<CaptureArtifact>),
    Bounded(mpsc::Receiver<CaptureArtifact>),
}

/// Producer side of the transfer queue. Cheap to clone, one per interface.
#[derive(Debug, Clone)]
pub struct ArtifactSender {
    inner: SenderInner,
    depth: Arc<AtomicUsize>,
}

/// Consumer side of the transfer queue. Exactly one exists per queue.
#[derive(Debug)]
pub struct ArtifactReceiver {
    inner: ReceiverInner,
    depth: Arc<AtomicUsize>,
}

/// Creates a transfer queue. `None` means unbounded.
pub fn channel(capacity: Option<usize>) -> (ArtifactSender, ArtifactReceiver) {
    let depth = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = match capacity {
        Some(cap) => {
            let (tx, rx) = mpsc::channel(cap);
            (SenderInner::Bounded(tx), ReceiverInner::Bounded(rx))
        }
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            (SenderInner::Unbounded(tx), ReceiverInner::Unbounded(rx))
        }
    };

    (
        ArtifactSender {
            inner: tx,
            depth: Arc::clone(&depth),
        },
        ArtifactReceiver { inner: rx, depth },
    )
}

impl ArtifactSender {
    /// Appends an artifact. Returns immediately on an unbounded queue; waits
    /// for a free slot on a bounded one.
    pub async fn enqueue(&self, artifact: CaptureArtifact) -> Result<(), QueueError> {
        self.depth.fetch_add(1, Ordering::SeqCst);
        let sent = match &self.inner {
            SenderInner::Unbounded(tx) => tx.send(artifact).map_err(|_| QueueError::Closed),
            SenderInner::Bounded(tx) => tx.send(artifact).await.map_err(|_| QueueError::Closed),
        };

        if sent.is_err() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
        } else {
            trace!("Artifact queued, depth {}", self.len());
        }
        sent
    }

    /// Number of artifacts waiting for the worker.
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ArtifactReceiver {
    /// Waits for the next artifact. `None` once every sender is gone and the
    /// queue is drained.
    pub async fn dequeue(&mut self) -> Option<CaptureArtifact> {
        let next = match &mut self.inner {
            ReceiverInner::Unbounded(rx) => rx.recv().await,
            ReceiverInner::Bounded(rx) => rx.recv().await,
        };
        if next.is_some() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
        }
        next
    }

    pub fn len(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
