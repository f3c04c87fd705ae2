pub mod artifact_name;
pub mod capture_backend;
pub mod capture_producer;
pub mod types;

pub use artifact_name::ArtifactName;
pub use capture_backend::{PacketCapturer, TsharkCapturer};
pub use capture_producer::CaptureProducer;
pub use types::CaptureArtifact;
