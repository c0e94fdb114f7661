//! Device process supervisor
//!
//! Starts one capture process per requested device and owns them as a
//! single unit until teardown. A device that dies early is reported, never
//! allowed to take its siblings down.

use super::layout::OutputLayout;
use super::state::{DeviceReport, RecordingEvent};
use super::{RecordError, RecordResult};
use crate::capture::{CaptureBackend, CaptureTarget, Device};
use crate::config::{CameraDevices, ConfigError, DeviceSelection};
use crate::process::{CommandSpec, ProcessGroup, ProcessReport, WaitOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// How often children are checked for early exits while capturing
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

struct Started {
    device: Device,
    command: CommandSpec,
}

/// Owns the capture processes of one session
pub struct DeviceSupervisor {
    backend: Arc<dyn CaptureBackend>,
    group: ProcessGroup,
    started: Vec<Started>,
    reports: Vec<DeviceReport>,
    event_tx: Option<broadcast::Sender<RecordingEvent>>,
    poll_interval: Duration,
}

impl DeviceSupervisor {
    pub fn new(backend: Arc<dyn CaptureBackend>, grace: Duration) -> Self {
        Self {
            backend,
            group: ProcessGroup::with_grace(grace),
            started: Vec::new(),
            reports: Vec::new(),
            event_tx: None,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Forward device events to a session's broadcast channel
    pub fn with_events(mut self, event_tx: broadcast::Sender<RecordingEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    fn emit(&self, event: RecordingEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }

    /// Capture targets for `selection`, cameras first
    ///
    /// Pure: nothing is created or spawned.
    pub fn plan(
        selection: &DeviceSelection,
        layout: &OutputLayout,
        cameras: Option<&CameraDevices>,
    ) -> RecordResult<Vec<CaptureTarget>> {
        if selection.is_empty() {
            return Err(RecordError::EmptySelection);
        }

        let mut targets = Vec::with_capacity(selection.len());
        for &camera in &selection.cameras {
            let path = cameras
                .and_then(|devices| devices.path(camera))
                .ok_or_else(|| {
                    ConfigError::Invalid(format!("no camera mapping entry for camera{}", camera))
                })?;
            targets.push(layout.target(Device::Camera(camera), Some(path.to_path_buf())));
        }
        for &lidar in &selection.lidars {
            targets.push(layout.target(Device::Lidar(lidar), None));
        }
        Ok(targets)
    }

    /// Launch one capture process per requested device
    ///
    /// Every check runs before the first directory is created. If a spawn
    /// fails, the devices already started are torn down before returning.
    pub async fn start(
        &mut self,
        selection: &DeviceSelection,
        layout: &OutputLayout,
        cameras: Option<&CameraDevices>,
    ) -> RecordResult<()> {
        let targets = Self::plan(selection, layout, cameras)?;
        let commands = targets
            .iter()
            .map(|target| self.backend.command(target))
            .collect::<Result<Vec<_>, _>>()?;

        layout.create_dirs(selection)?;

        for (target, command) in targets.iter().zip(commands) {
            self.backend.prepare(target).await;

            match self.group.spawn(target.device.name(), &command) {
                Ok(pid) => {
                    tracing::info!("Started {} (pid {:?}): {}", target.device, pid, command);
                    self.emit(RecordingEvent::DeviceStarted {
                        device: target.device,
                        pid,
                    });
                    self.started.push(Started {
                        device: target.device,
                        command,
                    });
                }
                Err(source) => {
                    tracing::error!("Failed to start {}: {}", target.device, source);
                    self.emit(RecordingEvent::Error(format!(
                        "failed to start {}: {}",
                        target.device, source
                    )));
                    self.teardown().await;
                    return Err(RecordError::Spawn {
                        device: target.device,
                        source,
                    });
                }
            }
        }

        tracing::info!(
            "Capturing {} devices with backend '{}'",
            self.started.len(),
            self.backend.id()
        );
        Ok(())
    }

    /// Number of capture processes still alive
    pub fn live_count(&mut self) -> usize {
        self.group.live_count()
    }

    /// Let the capture run for `duration` unless `cancel` fires first
    pub async fn run_for(&mut self, duration: Duration, cancel: &CancellationToken) -> WaitOutcome {
        let deadline = Instant::now() + duration;
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::warn!("Interrupted while capturing");
                    self.check_children();
                    return WaitOutcome::Interrupted;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::info!("Recording window of {}s elapsed", duration.as_secs());
                    self.check_children();
                    return WaitOutcome::Completed;
                }
                _ = ticker.tick() => self.check_children(),
            }
        }
    }

    fn check_children(&mut self) {
        for report in self.group.poll_exits() {
            let Some(device) = self.device_named(&report.name) else {
                continue;
            };
            tracing::warn!(
                "{} exited before teardown with {}; other devices keep recording",
                device,
                report.exit
            );
            self.emit(RecordingEvent::DeviceExited {
                device,
                exit: report.exit,
            });
        }
    }

    fn device_named(&self, name: &str) -> Option<Device> {
        self.started
            .iter()
            .find(|s| s.device.name() == name)
            .map(|s| s.device)
    }

    fn to_device_report(&self, report: ProcessReport) -> Option<DeviceReport> {
        let started = self.started.iter().find(|s| s.device.name() == report.name)?;
        Some(DeviceReport {
            device: started.device,
            command: started.command.command_line(),
            pid: report.pid,
            exit: report.exit,
            exited_early: report.exited_early,
        })
    }

    /// Stop every capture process
    ///
    /// Safe to call repeatedly, with nothing started, or after the
    /// processes already exited.
    pub async fn teardown(&mut self) {
        let reports = self.group.teardown().await;
        if reports.is_empty() {
            return;
        }
        tracing::info!("Tore down {} capture processes", reports.len());

        let reports: Vec<_> = reports
            .into_iter()
            .filter_map(|report| self.to_device_report(report))
            .collect();
        self.reports.extend(reports);
    }

    /// Reports of every torn-down device, in start order
    pub fn reports(&self) -> &[DeviceReport] {
        &self.reports
    }

    pub fn into_reports(self) -> Vec<DeviceReport> {
        self.reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureError, DeviceKind, DryRunBackend};
    use crate::config::{CameraIndex, LidarIndex, WaysideIndex};
    use crate::process::ExitSummary;
    use async_trait::async_trait;
    use chrono::Local;
    use std::path::PathBuf;
    use tempfile::tempdir;

    /// Cameras run until stopped, lidars run `lidar_script`
    struct ScriptBackend {
        lidar: CommandSpec,
    }

    #[async_trait]
    impl CaptureBackend for ScriptBackend {
        fn id(&self) -> &str {
            "script"
        }

        fn command(&self, target: &CaptureTarget) -> Result<CommandSpec, CaptureError> {
            Ok(match target.device {
                Device::Camera(_) => CommandSpec::new("sleep").arg("30"),
                Device::Lidar(_) => self.lidar.clone(),
            })
        }
    }

    fn layout(root: &std::path::Path) -> OutputLayout {
        OutputLayout::new(root, "run", Local::now().naive_local(), WaysideIndex::Wayside1)
    }

    fn cameras() -> CameraDevices {
        CameraDevices::new(vec![
            PathBuf::from("/dev/video0"),
            PathBuf::from("/dev/video2"),
            PathBuf::from("/dev/video4"),
        ])
    }

    fn supervisor(backend: impl CaptureBackend + 'static) -> DeviceSupervisor {
        DeviceSupervisor::new(Arc::new(backend), Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_empty_selection_creates_nothing() {
        let dir = tempdir().unwrap();
        let layout = layout(dir.path());
        let mut sup = supervisor(DryRunBackend);

        let result = sup.start(&DeviceSelection::default(), &layout, None).await;
        assert!(matches!(result, Err(RecordError::EmptySelection)));
        assert!(!layout.wayside_dir().exists());
    }

    #[tokio::test]
    async fn test_camera_without_mapping_creates_nothing() {
        let dir = tempdir().unwrap();
        let layout = layout(dir.path());
        let mut sup = supervisor(DryRunBackend);
        let selection = DeviceSelection::new([CameraIndex::Camera1], [LidarIndex::Lidar1]);

        let result = sup.start(&selection, &layout, None).await;
        assert!(matches!(result, Err(RecordError::Config(_))));
        assert!(!layout.wayside_dir().exists());
        assert_eq!(sup.live_count(), 0);
    }

    #[tokio::test]
    async fn test_lidar_only_creates_pcd_dir_only() {
        let dir = tempdir().unwrap();
        let layout = layout(dir.path());
        let mut sup = supervisor(DryRunBackend);
        let selection = DeviceSelection::new(Vec::<CameraIndex>::new(), [LidarIndex::Lidar1]);

        sup.start(&selection, &layout, None).await.unwrap();
        assert!(layout.dir_for(DeviceKind::Lidar).is_dir());
        assert!(!layout.dir_for(DeviceKind::Camera).exists());
        assert_eq!(sup.live_count(), 1);

        sup.teardown().await;
        sup.teardown().await;
        assert_eq!(sup.live_count(), 0);
        assert_eq!(sup.reports().len(), 1);
        assert_eq!(sup.reports()[0].device, Device::Lidar(LidarIndex::Lidar1));
    }

    #[tokio::test]
    async fn test_early_exit_does_not_stop_siblings() {
        let dir = tempdir().unwrap();
        let layout = layout(dir.path());
        let (tx, mut rx) = broadcast::channel(16);
        let mut sup = supervisor(ScriptBackend {
            lidar: CommandSpec::shell("exit 4"),
        })
        .with_events(tx);
        let selection = DeviceSelection::new([CameraIndex::Camera2], [LidarIndex::Lidar1]);

        sup.start(&selection, &layout, Some(&cameras())).await.unwrap();
        let outcome = sup
            .run_for(Duration::from_millis(800), &CancellationToken::new())
            .await;
        assert_eq!(outcome, WaitOutcome::Completed);
        assert_eq!(sup.live_count(), 1);

        let mut saw_exit = false;
        while let Ok(event) = rx.try_recv() {
            if let RecordingEvent::DeviceExited { device, exit } = event {
                assert_eq!(device, Device::Lidar(LidarIndex::Lidar1));
                assert_eq!(exit, ExitSummary::Exited { code: 4 });
                saw_exit = true;
            }
        }
        assert!(saw_exit);

        sup.teardown().await;
        let reports = sup.into_reports();
        let camera = reports
            .iter()
            .find(|r| r.device == Device::Camera(CameraIndex::Camera2))
            .unwrap();
        assert!(!camera.exited_early);
        assert!(!camera.exit.success());
        let lidar = reports
            .iter()
            .find(|r| r.device == Device::Lidar(LidarIndex::Lidar1))
            .unwrap();
        assert!(lidar.exited_early);
    }

    #[tokio::test]
    async fn test_exit_just_before_deadline_is_reported() {
        let dir = tempdir().unwrap();
        let layout = layout(dir.path());
        let (tx, mut rx) = broadcast::channel(16);
        let mut sup = supervisor(ScriptBackend {
            lidar: CommandSpec::shell("sleep 0.6; exit 4"),
        })
        .with_events(tx);
        // slower polling than the window, so only the final check can see the exit
        sup.poll_interval = Duration::from_secs(10);
        let selection = DeviceSelection::new(Vec::<CameraIndex>::new(), [LidarIndex::Lidar1]);

        sup.start(&selection, &layout, None).await.unwrap();
        let outcome = sup
            .run_for(Duration::from_millis(900), &CancellationToken::new())
            .await;
        assert_eq!(outcome, WaitOutcome::Completed);

        let mut exits = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let RecordingEvent::DeviceExited { device, exit } = event {
                exits.push((device, exit));
            }
        }
        assert_eq!(
            exits,
            vec![(Device::Lidar(LidarIndex::Lidar1), ExitSummary::Exited { code: 4 })]
        );

        sup.teardown().await;
        assert!(sup.reports()[0].exited_early);
        assert_eq!(sup.reports()[0].exit, ExitSummary::Exited { code: 4 });
    }

    #[tokio::test]
    async fn test_spawn_failure_tears_down_started_devices() {
        let dir = tempdir().unwrap();
        let layout = layout(dir.path());
        let mut sup = supervisor(ScriptBackend {
            lidar: CommandSpec::new("/nonexistent/capture-tool"),
        });
        let selection = DeviceSelection::new([CameraIndex::Camera1], [LidarIndex::Lidar1]);

        let result = sup.start(&selection, &layout, Some(&cameras())).await;
        assert!(matches!(
            result,
            Err(RecordError::Spawn {
                device: Device::Lidar(LidarIndex::Lidar1),
                ..
            })
        ));
        assert_eq!(sup.live_count(), 0);
        assert_eq!(sup.reports().len(), 1);
        assert_eq!(sup.reports()[0].device, Device::Camera(CameraIndex::Camera1));
    }

    #[tokio::test]
    async fn test_run_for_interrupted() {
        let dir = tempdir().unwrap();
        let layout = layout(dir.path());
        let mut sup = supervisor(DryRunBackend);
        let selection = DeviceSelection::new(Vec::<CameraIndex>::new(), [LidarIndex::Lidar1]);
        sup.start(&selection, &layout, None).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = sup.run_for(Duration::from_secs(30), &cancel).await;
        assert_eq!(outcome, WaitOutcome::Interrupted);
        sup.teardown().await;
        assert_eq!(sup.live_count(), 0);
    }
}
