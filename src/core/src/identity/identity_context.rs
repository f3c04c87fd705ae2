use std::fmt;
use std::fs;
use std::path::Path;

use log::{debug, info};
use serde::Deserialize;
use serde_json::Value;

use crate::error_handling::types::IdentityError;

/// Decrypted credential bundle as written by the credential manager.
///
/// Keys follow the bundle's own naming; anything not listed here
/// (username, password, email, organization) is ignored.
#[derive(Debug, Default, Deserialize)]
struct RawIdentity {
    #[serde(alias = "server_ip")]
    server_host: Option<String>,
    server_port: Option<Value>,
    token: Option<String>,
    #[serde(rename = "userId", alias = "user_id")]
    user_id: Option<Value>,
    #[serde(rename = "sensorId", alias = "sensor_id")]
    sensor_id: Option<String>,
}

/// Read-only identity of this sensor, loaded once at startup.
///
/// Every field is required: a bundle missing any of them is rejected so the
/// agent never starts capturing without knowing where to ship the files.
#[derive(Clone, PartialEq)]
pub struct IdentityContext {
    pub server_host: String,
    pub server_port: u16,
    pub token: String,
    pub user_id: u64,
    pub sensor_id: String,
}

impl IdentityContext {
    pub fn from_file(path: &Path) -> Result<Self, IdentityError> {
        debug!("Loading identity bundle from {}", path.display());
        let content = fs::read_to_string(path)?;
        let identity = Self::from_json(&content)?;
        info!(
            "Identity loaded: user {} sensor {} server {}:{}",
            identity.user_id, identity.sensor_id, identity.server_host, identity.server_port
        );
        Ok(identity)
    }

    pub fn from_json(content: &str) -> Result<Self, IdentityError> {
        let raw: RawIdentity = serde_json::from_str(content)?;

        let server_host = required_string(raw.server_host, "server_host")?;
        let server_port = required_number(raw.server_port, "server_port")?;
        let server_port = u16::try_from(server_port).map_err(|_| {
            IdentityError::InvalidField("server_port", format!("{} is not a port", server_port))
        })?;
        if server_port == 0 {
            return Err(IdentityError::InvalidField(
                "server_port",
                String::from("port 0 is not routable"),
            ));
        }
        let token = required_string(raw.token, "token")?;
        let user_id = required_number(raw.user_id, "userId")?;
        let sensor_id = required_string(raw.sensor_id, "sensorId")?;

        Ok(Self {
            server_host,
            server_port,
            token,
            user_id,
            sensor_id,
        })
    }

    /// Value of the `Authorization` header sent with every transfer.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl fmt::Debug for IdentityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityContext")
            .field("server_host", &self.server_host)
            .field("server_port", &self.server_port)
            .field("token", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("sensor_id", &self.sensor_id)
            .finish()
    }
}

fn required_string(value: Option<String>, name: &'static str) -> Result<String, IdentityError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(IdentityError::MissingField(name)),
    }
}

// The bundle stores numbers either as JSON numbers or as strings.
fn required_number(value: Option<Value>, name: &'static str) -> Result<u64, IdentityError> {
    match value {
        None | Some(Value::Null) => Err(IdentityError::MissingField(name)),
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| IdentityError::InvalidField(name, n.to_string())),
        Some(Value::String(s)) if s.trim().is_empty() => Err(IdentityError::MissingField(name)),
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map_err(|e| IdentityError::InvalidField(name, e.to_string())),
        Some(other) => Err(IdentityError::InvalidField(name, other.to_string())),
    }
}
