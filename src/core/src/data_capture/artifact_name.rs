use std::path::Path;

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};

use crate::error_handling::types::ArtifactNameError;

/// Separator between the fields of a capture file name.
pub const FIELD_DELIMITER: &str = "_|_";
pub const CAPTURE_EXTENSION: &str = "pcap";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Identity fields encoded in a capture file name:
/// `<userId>_|_<sensorId>_|_<interface>_|_<UTC timestamp>_|_<sequence>.pcap`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    pub user_id: u64,
    pub sensor_id: String,
    pub interface: String,
    pub created_at: DateTime<Utc>,
    pub sequence: u64,
}

impl ArtifactName {
    /// Builds a name, dropping sub-second precision so that the name always
    /// decodes back to an equal value.
    pub fn new(
        user_id: u64,
        sensor_id: &str,
        interface: &str,
        created_at: DateTime<Utc>,
        sequence: u64,
    ) -> Self {
        Self {
            user_id,
            sensor_id: sensor_id.to_string(),
            interface: interface.to_string(),
            created_at: created_at.trunc_subsecs(0),
            sequence,
        }
    }

    pub fn file_name(&self) -> String {
        format!(
            "{user}{d}{sensor}{d}{iface}{d}{ts}{d}{seq}.{ext}",
            user = self.user_id,
            sensor = self.sensor_id,
            iface = self.interface,
            ts = self.created_at.format(TIMESTAMP_FORMAT),
            seq = self.sequence,
            d = FIELD_DELIMITER,
            ext = CAPTURE_EXTENSION,
        )
    }

    pub fn parse(file_name: &str) -> Result<Self, ArtifactNameError> {
        let stem = file_name
            .strip_suffix(CAPTURE_EXTENSION)
            .and_then(|s| s.strip_suffix('.'))
            .ok_or_else(|| ArtifactNameError::WrongExtension(file_name.to_string()))?;

        let fields: Vec<&str> = stem.split(FIELD_DELIMITER).collect();
        let [user, sensor, iface, ts, seq] = fields.as_slice() else {
            return Err(ArtifactNameError::WrongFieldCount(fields.len()));
        };

        let user_id = user
            .parse::<u64>()
            .map_err(|e| ArtifactNameError::InvalidField("userId", e.to_string()))?;
        if sensor.is_empty() {
            return Err(ArtifactNameError::InvalidField(
                "sensorId",
                String::from("empty"),
            ));
        }
        if iface.is_empty() {
            return Err(ArtifactNameError::InvalidField(
                "interface",
                String::from("empty"),
            ));
        }
        let created_at = NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT)
            .map_err(|e| ArtifactNameError::InvalidField("timestamp", e.to_string()))?
            .and_utc();
        let sequence = seq
            .parse::<u64>()
            .map_err(|e| ArtifactNameError::InvalidField("sequence", e.to_string()))?;

        Ok(Self {
            user_id,
            sensor_id: sensor.to_string(),
            interface: iface.to_string(),
            created_at,
            sequence,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, ArtifactNameError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ArtifactNameError::WrongExtension(path.display().to_string()))?;
        Self::parse(file_name)
    }
}
