use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub capture_dir: PathBuf,
    pub backup_dir: PathBuf,
    /// Unix permission bits applied to both directories at startup.
    pub directory_mode: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            capture_dir: PathBuf::from("/home/Pcaps"),
            backup_dir: PathBuf::from("/home/Pcap_Backup"),
            directory_mode: 0o750,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Packets collected per capture file.
    pub packet_count: u32,
    /// Capture binary, resolved through `PATH` when relative.
    pub tool: PathBuf,
    /// Upper bound of the blocking pool running the capture calls.
    pub blocking_threads: usize,
    /// When set, a failed capture cycle is retried after this many seconds
    /// instead of terminating the producer.
    pub restart_backoff_secs: Option<u64>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            packet_count: 10,
            tool: PathBuf::from("tshark"),
            blocking_threads: 4,
            restart_backoff_secs: None,
        }
    }
}

impl CaptureConfig {
    pub fn restart_policy(&self) -> RestartPolicy {
        match self.restart_backoff_secs {
            Some(secs) => RestartPolicy::Restart {
                backoff: Duration::from_secs(secs),
            },
            None => RestartPolicy::Terminate,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
    /// Use `wss://` instead of `ws://`.
    pub secure: bool,
    pub path: String,
    /// Upper bound on the WebSocket handshake and on a single send.
    pub connect_timeout_secs: u64,
    /// Bounded queue capacity. Producers wait when the queue is full.
    /// Unbounded when absent.
    pub queue_capacity: Option<usize>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_delay_secs: 5,
            secure: false,
            path: String::from("/ws/pps"),
            connect_timeout_secs: 10,
            queue_capacity: None,
        }
    }
}

impl TransferConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub sweep_interval_secs: u64,
    pub capture_max_age_minutes: u64,
    pub backup_max_age_minutes: u64,
    /// File extension (without the dot) of the files eligible for deletion.
    pub extension: String,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
            capture_max_age_minutes: 15,
            backup_max_age_minutes: 30,
            extension: String::from("pcap"),
        }
    }
}

impl RetentionConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Age threshold applied to the files of one directory.
#[derive(Debug, PartialEq, Clone)]
pub struct RetentionRule {
    pub directory: PathBuf,
    pub max_age: Duration,
}

impl RetentionRule {
    pub fn from_minutes(directory: PathBuf, minutes: u64) -> Self {
        Self {
            directory,
            max_age: Duration::from_secs(minutes * 60),
        }
    }
}

/// What a capture producer does after a failed cycle.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum RestartPolicy {
    Terminate,
    Restart { backoff: Duration },
}
