use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, trace};

use crate::error_handling::types::CaptureError;

/// A blocking packet capture engine.
///
/// `capture` returns once `packet_count` packets have been written to
/// `output`. Implementations block the calling thread, so callers on the
/// async runtime must go through `spawn_blocking`.
pub trait PacketCapturer: Send + Sync {
    fn capture(&self, interface: &str, packet_count: u32, output: &Path)
        -> Result<(), CaptureError>;
}

/// Captures through the `tshark` command line tool, writing classic pcap.
#[derive(Debug, Clone)]
pub struct TsharkCapturer {
    tool: PathBuf,
}

impl TsharkCapturer {
    pub fn new<P: Into<PathBuf>>(tool: P) -> Self {
        Self { tool: tool.into() }
    }

    fn command(&self, interface: &str, packet_count: u32, output: &Path) -> Command {
        let mut cmd = Command::new(&self.tool);
        cmd.arg("-i")
            .arg(interface)
            .arg("-c")
            .arg(packet_count.to_string())
            .arg("-F")
            .arg("pcap")
            .arg("-w")
            .arg(output)
            .arg("-q");
        cmd
    }
}

impl PacketCapturer for TsharkCapturer {
    fn capture(
        &self,
        interface: &str,
        packet_count: u32,
        output: &Path,
    ) -> Result<(), CaptureError> {
        let mut cmd = self.command(interface, packet_count, output);
        debug!("[{}] Running {:?}", interface, cmd);

        let result = cmd.output().map_err(CaptureError::SpawnFailed)?;
        if !result.status.success() {
            return Err(CaptureError::ToolFailed {
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        if !output.is_file() {
            return Err(CaptureError::OutputMissing(output.to_path_buf()));
        }

        trace!("[{}] Capture written to {}", interface, output.display());
        Ok(())
    }
}
