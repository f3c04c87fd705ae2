//! Everything between a finished capture file and the collection server.

pub mod transfer_queue;
pub mod transfer_worker;
pub mod transport;

pub use transfer_queue::{channel, ArtifactReceiver, ArtifactSender};
pub use transfer_worker::{TransferOutcome, TransferStats, TransferWorker};
pub use transport::{Connection, Destination, Transport, WebSocketTransport};
