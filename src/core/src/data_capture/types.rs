//! Common data types used across the data_capture subsystem.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use super::artifact_name::ArtifactName;

/// A completed capture file, written to the primary directory and mirrored
/// to the backup directory.
///
/// This descriptor travels through the transfer queue as-is, so the transfer
/// side never has to recover the interface or sequence number from the file
/// name.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureArtifact {
    /// Owner of the sensor
    pub user_id: u64,
    /// Stable identifier of this sensor
    pub sensor_id: String,
    /// Interface the packets were captured on
    pub interface: String,
    /// Start of the capture cycle, truncated to whole seconds
    pub created_at: DateTime<Utc>,
    /// Per-interface counter, starting at 1 on every process start
    pub sequence: u64,
    /// File in the primary capture directory
    pub path: PathBuf,
    /// Verbatim copy in the backup directory
    pub backup_path: PathBuf,
}

impl CaptureArtifact {
    pub fn name(&self) -> ArtifactName {
        ArtifactName {
            user_id: self.user_id,
            sensor_id: self.sensor_id.clone(),
            interface: self.interface.clone(),
            created_at: self.created_at,
            sequence: self.sequence,
        }
    }
}
