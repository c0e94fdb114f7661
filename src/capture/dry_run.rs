//! Rehearsal backend
//!
//! Stands in for every device with a loop that only reports where it would
//! write. Useful for checking a dispatch end to end without hardware.

use super::traits::{CaptureBackend, CaptureError, CaptureTarget};
use crate::process::{shell_quote, CommandSpec};
use async_trait::async_trait;

#[derive(Debug, Clone, Default)]
pub struct DryRunBackend;

#[async_trait]
impl CaptureBackend for DryRunBackend {
    fn id(&self) -> &str {
        "dry-run"
    }

    fn command(&self, target: &CaptureTarget) -> Result<CommandSpec, CaptureError> {
        let file = target.output_file.to_string_lossy();
        Ok(CommandSpec::shell(format!(
            "while true; do echo save to {}; sleep 1; done",
            shell_quote(&file)
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Device;
    use crate::config::LidarIndex;
    use std::path::PathBuf;

    #[test]
    fn test_placeholder_loop() {
        let target = CaptureTarget {
            device: Device::Lidar(LidarIndex::Lidar1),
            device_path: None,
            output_file: PathBuf::from("/data/pcd/lidar1.pcap"),
            sidecar: None,
        };
        let cmd = DryRunBackend.command(&target).unwrap();
        assert_eq!(
            cmd.args,
            vec![
                "-c",
                "while true; do echo save to /data/pcd/lidar1.pcap; sleep 1; done"
            ]
        );
    }
}
