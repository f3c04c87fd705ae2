use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    InterfacesEmpty(String),
    DuplicateInterface(String),
    DirectoryConflict(String),
    NotInRange(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::InterfacesEmpty(e) => write!(f, "Interfaces configuration error: {}", e),
            ConfigError::DuplicateInterface(e) => write!(f, "Duplicate interface: {}", e),
            ConfigError::DirectoryConflict(e) => write!(f, "Directory error: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::TomlError(err.to_string())
    }
}

#[derive(Debug)]
pub enum IdentityError {
    IoError(std::io::Error),
    JsonError(String),
    MissingField(&'static str),
    InvalidField(&'static str, String),
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityError::IoError(e) => write!(f, "Identity bundle IO error: {}", e),
            IdentityError::JsonError(e) => write!(f, "Identity bundle parsing error: {}", e),
            IdentityError::MissingField(name) => {
                write!(f, "Identity bundle is missing required field `{}`", name)
            }
            IdentityError::InvalidField(name, e) => {
                write!(f, "Identity bundle field `{}` is invalid: {}", name, e)
            }
        }
    }
}

impl std::error::Error for IdentityError {}

impl From<std::io::Error> for IdentityError {
    fn from(err: std::io::Error) -> Self {
        IdentityError::IoError(err)
    }
}

impl From<serde_json::Error> for IdentityError {
    fn from(err: serde_json::Error) -> Self {
        IdentityError::JsonError(err.to_string())
    }
}

#[derive(Debug)]
pub enum CaptureError {
    SpawnFailed(std::io::Error),
    ToolFailed { status: String, stderr: String },
    OutputMissing(PathBuf),
    BackupFailed(std::io::Error),
    WorkerPanicked(String),
    QueueClosed,
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::SpawnFailed(e) => write!(f, "Unable to start capture tool: {}", e),
            CaptureError::ToolFailed { status, stderr } => {
                write!(f, "Capture tool exited with {}: {}", status, stderr)
            }
            CaptureError::OutputMissing(p) => {
                write!(f, "Capture produced no output file at {}", p.display())
            }
            CaptureError::BackupFailed(e) => write!(f, "Backup copy failed: {}", e),
            CaptureError::WorkerPanicked(e) => write!(f, "Capture worker panicked: {}", e),
            CaptureError::QueueClosed => write!(f, "Transfer queue is closed"),
        }
    }
}

impl std::error::Error for CaptureError {}

impl From<QueueError> for CaptureError {
    fn from(_: QueueError) -> Self {
        CaptureError::QueueClosed
    }
}

#[derive(Debug, PartialEq)]
pub enum ArtifactNameError {
    WrongExtension(String),
    WrongFieldCount(usize),
    InvalidField(&'static str, String),
}

impl fmt::Display for ArtifactNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactNameError::WrongExtension(name) => {
                write!(f, "{} is not a capture file name", name)
            }
            ArtifactNameError::WrongFieldCount(n) => {
                write!(f, "Expected 5 delimited fields, found {}", n)
            }
            ArtifactNameError::InvalidField(name, e) => {
                write!(f, "Invalid `{}` field in file name: {}", name, e)
            }
        }
    }
}

impl std::error::Error for ArtifactNameError {}

#[derive(Debug, PartialEq)]
pub enum QueueError {
    Closed,
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::Closed => write!(f, "Transfer queue receiver has been dropped"),
        }
    }
}

impl std::error::Error for QueueError {}

#[derive(Debug)]
pub enum TransferError {
    ConnectionFailed(String),
    ReadFailed(std::io::Error),
    SendFailed(String),
    ConnectionClosed(String),
    InvalidRequest(String),
}

impl TransferError {
    /// True when the artifact file disappeared before it could be read,
    /// typically because the retention sweeper got to it first.
    pub fn is_missing_file(&self) -> bool {
        matches!(self, TransferError::ReadFailed(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::ConnectionFailed(e) => write!(f, "WebSocket connection failed: {}", e),
            TransferError::ReadFailed(e) => write!(f, "Unable to read artifact: {}", e),
            TransferError::SendFailed(e) => write!(f, "Unable to send artifact: {}", e),
            TransferError::ConnectionClosed(e) => write!(f, "WebSocket connection closed: {}", e),
            TransferError::InvalidRequest(e) => write!(f, "Invalid transfer request: {}", e),
        }
    }
}

impl std::error::Error for TransferError {}

#[derive(Debug)]
pub enum RetentionError {
    ScanFailed(PathBuf, std::io::Error),
    MetadataFailed(PathBuf, std::io::Error),
    DeleteFailed(PathBuf, std::io::Error),
}

impl fmt::Display for RetentionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetentionError::ScanFailed(p, e) => {
                write!(f, "Unable to scan directory {}: {}", p.display(), e)
            }
            RetentionError::MetadataFailed(p, e) => {
                write!(f, "Unable to stat {}: {}", p.display(), e)
            }
            RetentionError::DeleteFailed(p, e) => {
                write!(f, "Unable to delete {}: {}", p.display(), e)
            }
        }
    }
}

impl std::error::Error for RetentionError {}

#[derive(Debug)]
pub enum ControllerError {
    ConfigurationError(ConfigError),
    DirectorySetupFailed(PathBuf, std::io::Error),
    SignalSetupFailed(std::io::Error),
    InitializationFailed(String),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::ConfigurationError(e) => write!(f, "Configuration error: {}", e),
            ControllerError::DirectorySetupFailed(p, e) => {
                write!(f, "Unable to prepare directory {}: {}", p.display(), e)
            }
            ControllerError::SignalSetupFailed(e) => {
                write!(f, "Unable to install signal handlers: {}", e)
            }
            ControllerError::InitializationFailed(e) => write!(f, "Initialization failed: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<ConfigError> for ControllerError {
    fn from(err: ConfigError) -> Self {
        ControllerError::ConfigurationError(err)
    }
}

