//! Error types shared by every component of the sensor pipeline.

pub mod types;

pub use types::{
    ArtifactNameError, CaptureError, ConfigError, ControllerError, IdentityError, QueueError,
    RetentionError, TransferError,
};
