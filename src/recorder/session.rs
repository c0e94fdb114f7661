//! Recording session state machine
//!
//! Drives one wayside through `Idle -> [WaitingForStart] -> Capturing ->
//! TearingDown -> Done`. Every input is validated before anything touches
//! the disk or spawns a process.

use super::layout::OutputLayout;
use super::state::{RecordingEvent, RecordingState, SessionOutcome, SessionReport};
use super::supervisor::DeviceSupervisor;
use super::{RecordError, RecordResult};
use crate::capture::CaptureBackend;
use crate::config::{
    require_absolute, CameraDevices, CameraMapping, ConfigError, DeviceSelection, Since,
    WaysideIndex,
};
use crate::process::{WaitOutcome, DEFAULT_GRACE};
use chrono::{DateTime, Local, NaiveDateTime};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Everything one recording run needs
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Recipe name, first path component under the output directory
    pub name: String,

    /// Which wayside this host is
    pub wayside: WaysideIndex,

    pub selection: DeviceSelection,

    /// How long to capture
    pub duration: Duration,

    /// Optional time of day to start at
    pub since: Option<Since>,

    /// Absolute artifact root
    pub output_dir: PathBuf,

    /// Camera mapping, required when cameras are selected
    pub mapping: Option<CameraMapping>,

    /// Grace period between graceful stop and kill
    pub grace: Duration,
}

impl SessionConfig {
    pub fn new(name: impl Into<String>, wayside: WaysideIndex, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            wayside,
            selection: DeviceSelection::default(),
            duration: Duration::from_secs(30),
            since: None,
            output_dir: output_dir.into(),
            mapping: None,
            grace: DEFAULT_GRACE,
        }
    }
}

/// How long to wait before capturing, if at all
///
/// `since` is a time of day on `now`'s date. A time that is not strictly in
/// the future is rejected: there is no late start and no next-day wait.
pub fn resolve_start(since: Option<Since>, now: NaiveDateTime) -> RecordResult<Option<Duration>> {
    let Some(since) = since else {
        return Ok(None);
    };

    let start = now.date().and_time(since.time());
    if start <= now {
        return Err(RecordError::Schedule {
            since,
            now: now.time(),
        });
    }
    Ok(Some((start - now).to_std().unwrap_or(Duration::ZERO)))
}

/// One wayside's recording run
pub struct RecordingSession {
    id: Uuid,
    config: SessionConfig,
    backend: Arc<dyn CaptureBackend>,

    /// Current state
    state: Arc<RwLock<RecordingState>>,

    /// Event broadcaster
    event_tx: broadcast::Sender<RecordingEvent>,
}

impl RecordingSession {
    pub fn new(config: SessionConfig, backend: Arc<dyn CaptureBackend>) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            id: Uuid::new_v4(),
            config,
            backend,
            state: Arc::new(RwLock::new(RecordingState::Idle)),
            event_tx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Get the current state
    pub fn state(&self) -> RecordingState {
        *self.state.read()
    }

    /// Shared handle for observers outside the session task
    pub fn state_handle(&self) -> Arc<RwLock<RecordingState>> {
        Arc::clone(&self.state)
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.event_tx.subscribe()
    }

    fn set_state(&self, state: RecordingState) {
        *self.state.write() = state;
        self.announce(state);
    }

    fn announce(&self, state: RecordingState) {
        tracing::debug!("Session {} -> {:?}", self.id, state);
        let _ = self.event_tx.send(RecordingEvent::StateChanged(state));
    }

    /// Validate and leave `Idle` under one lock, so only one `run` gets past
    fn claim(&self) -> RecordResult<(Option<CameraDevices>, Option<Duration>)> {
        let mut state = self.state.write();
        if *state != RecordingState::Idle {
            return Err(RecordError::InvalidState(*state));
        }

        let cameras = self.validate()?;
        let wait = resolve_start(self.config.since, Local::now().naive_local())?;
        *state = if wait.is_some() {
            RecordingState::WaitingForStart
        } else {
            RecordingState::Capturing
        };
        Ok((cameras, wait))
    }

    /// Check the inputs that need no clock: selection, output directory, mapping
    pub fn validate(&self) -> RecordResult<Option<CameraDevices>> {
        let config = &self.config;
        if config.selection.is_empty() {
            return Err(RecordError::EmptySelection);
        }
        require_absolute(&config.output_dir)?;

        if config.selection.cameras.is_empty() {
            return Ok(None);
        }
        let mapping = config.mapping.as_ref().ok_or_else(|| {
            ConfigError::Invalid("cameras requested without a camera mapping".to_string())
        })?;
        Ok(Some(mapping.devices_for(config.wayside)?))
    }

    fn report(
        &self,
        outcome: SessionOutcome,
        layout: Option<&OutputLayout>,
        started_at: Option<DateTime<Local>>,
        supervisor: Option<DeviceSupervisor>,
    ) -> SessionReport {
        SessionReport {
            id: self.id,
            name: self.config.name.clone(),
            wayside: self.config.wayside,
            backend: self.backend.id().to_string(),
            wayside_dir: layout.map(|l| l.wayside_dir().to_path_buf()),
            started_at,
            ended_at: Local::now(),
            outcome,
            devices: supervisor.map(DeviceSupervisor::into_reports).unwrap_or_default(),
        }
    }

    /// Run the session to completion
    ///
    /// Returns `Interrupted` rather than an error when `cancel` fires; all
    /// capture processes have been reaped by the time this returns.
    pub async fn run(&self, cancel: &CancellationToken) -> RecordResult<SessionReport> {
        let (cameras, wait) = self.claim()?;

        if let Some(wait) = wait {
            self.announce(RecordingState::WaitingForStart);
            tracing::info!(
                "The recording will begin at {} (in {}s)",
                self.config.since.map(|s| s.to_string()).unwrap_or_default(),
                wait.as_secs()
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::warn!("Interrupted before the recording began");
                    self.set_state(RecordingState::TearingDown);
                    self.set_state(RecordingState::Done);
                    return Ok(self.report(SessionOutcome::Interrupted, None, None, None));
                }
                _ = tokio::time::sleep(wait) => {}
            }
            self.set_state(RecordingState::Capturing);
        } else {
            self.announce(RecordingState::Capturing);
        }

        // Stamp the directory once capture actually begins
        let started_at = Local::now();
        let layout = OutputLayout::new(
            &self.config.output_dir,
            &self.config.name,
            started_at.naive_local(),
            self.config.wayside,
        );
        tracing::info!(
            "Recording '{}' on {} into {:?}",
            self.config.name,
            self.config.wayside.key(),
            layout.wayside_dir()
        );

        let mut supervisor = DeviceSupervisor::new(Arc::clone(&self.backend), self.config.grace)
            .with_events(self.event_tx.clone());

        if let Err(e) = supervisor.start(&self.config.selection, &layout, cameras.as_ref()).await {
            self.set_state(RecordingState::TearingDown);
            supervisor.teardown().await;
            self.set_state(RecordingState::Done);
            return Err(e);
        }

        let outcome = match supervisor.run_for(self.config.duration, cancel).await {
            WaitOutcome::Completed => SessionOutcome::Completed,
            WaitOutcome::Interrupted => SessionOutcome::Interrupted,
        };

        self.set_state(RecordingState::TearingDown);
        supervisor.teardown().await;

        let report = self.report(outcome, Some(&layout), Some(started_at), Some(supervisor));
        if layout.wayside_dir().is_dir() {
            let path = layout.manifest_path();
            match report.save(&path) {
                Ok(()) => tracing::debug!("Wrote manifest {:?}", path),
                Err(e) => tracing::warn!("Failed to write manifest {:?}: {}", path, e),
            }
        }
        for device in report.early_exits() {
            tracing::warn!("{} stopped early with {}", device.device, device.exit);
        }

        self.set_state(RecordingState::Done);
        tracing::info!("Recording {:?} on {}", outcome, self.config.wayside.key());
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::DryRunBackend;
    use crate::config::{CameraIndex, LidarIndex};
    use chrono::{NaiveDate, NaiveTime, Timelike};
    use tempfile::tempdir;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn since(h: u32, m: u32, s: u32) -> Since {
        Since::new(NaiveTime::from_hms_opt(h, m, s).unwrap())
    }

    fn lidar_config(root: &std::path::Path) -> SessionConfig {
        let mut config = SessionConfig::new("run", WaysideIndex::Wayside1, root);
        config.selection = DeviceSelection::new(Vec::<CameraIndex>::new(), [LidarIndex::Lidar1]);
        config.duration = Duration::from_millis(500);
        config.grace = Duration::from_millis(200);
        config
    }

    #[test]
    fn test_resolve_start() {
        assert_eq!(resolve_start(None, at(10, 0, 0)).unwrap(), None);
        assert_eq!(
            resolve_start(Some(since(10, 0, 30)), at(10, 0, 0)).unwrap(),
            Some(Duration::from_secs(30))
        );
        assert!(matches!(
            resolve_start(Some(since(9, 59, 59)), at(10, 0, 0)),
            Err(RecordError::Schedule { .. })
        ));
        assert!(matches!(
            resolve_start(Some(since(10, 0, 0)), at(10, 0, 0)),
            Err(RecordError::Schedule { .. })
        ));
    }

    #[tokio::test]
    async fn test_validation_order() {
        let dir = tempdir().unwrap();

        let mut config = lidar_config(std::path::Path::new("relative/out"));
        config.selection = DeviceSelection::default();
        let session = RecordingSession::new(config, Arc::new(DryRunBackend));
        assert!(matches!(
            session.run(&CancellationToken::new()).await,
            Err(RecordError::EmptySelection)
        ));

        let session = RecordingSession::new(
            lidar_config(std::path::Path::new("relative/out")),
            Arc::new(DryRunBackend),
        );
        assert!(matches!(
            session.run(&CancellationToken::new()).await,
            Err(RecordError::Config(ConfigError::RelativePath(_)))
        ));

        let mut config = lidar_config(dir.path());
        config.selection = DeviceSelection::new([CameraIndex::Camera1], [LidarIndex::Lidar1]);
        config.mapping = Some(CameraMapping::default());
        let session = RecordingSession::new(config, Arc::new(DryRunBackend));
        assert!(matches!(
            session.run(&CancellationToken::new()).await,
            Err(RecordError::Config(ConfigError::MissingMapping(_)))
        ));

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_elapsed_since_fails_without_side_effects() {
        let dir = tempdir().unwrap();
        let now = Local::now().time();
        // midnight has no earlier second today
        if now.num_seconds_from_midnight() < 2 {
            return;
        }
        let mut config = lidar_config(dir.path());
        config.since = Some(Since::new(now - chrono::Duration::seconds(1)));

        let session = RecordingSession::new(config, Arc::new(DryRunBackend));
        assert!(matches!(
            session.run(&CancellationToken::new()).await,
            Err(RecordError::Schedule { .. })
        ));
        assert_eq!(session.state(), RecordingState::Idle);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_completed_run_transitions_and_manifest() {
        let dir = tempdir().unwrap();
        let session = RecordingSession::new(lidar_config(dir.path()), Arc::new(DryRunBackend));
        let mut events = session.subscribe();

        let report = session.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.outcome, SessionOutcome::Completed);
        assert_eq!(session.state(), RecordingState::Done);
        assert_eq!(report.devices.len(), 1);

        let mut states = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let RecordingEvent::StateChanged(state) = event {
                states.push(state);
            }
        }
        assert_eq!(
            states,
            vec![
                RecordingState::Capturing,
                RecordingState::TearingDown,
                RecordingState::Done
            ]
        );

        let manifest = report.wayside_dir.unwrap().join(crate::recorder::MANIFEST_FILE);
        let saved = SessionReport::load(&manifest).unwrap();
        assert_eq!(saved.id, session.id());
        assert_eq!(saved.outcome, SessionOutcome::Completed);
    }

    #[tokio::test]
    async fn test_session_runs_once() {
        let dir = tempdir().unwrap();
        let session = RecordingSession::new(lidar_config(dir.path()), Arc::new(DryRunBackend));
        session.run(&CancellationToken::new()).await.unwrap();
        assert!(matches!(
            session.run(&CancellationToken::new()).await,
            Err(RecordError::InvalidState(RecordingState::Done))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_runs_start_once() {
        let dir = tempdir().unwrap();
        let session = RecordingSession::new(lidar_config(dir.path()), Arc::new(DryRunBackend));
        let cancel = CancellationToken::new();

        let (first, second) = tokio::join!(session.run(&cancel), session.run(&cancel));
        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(RecordError::InvalidState(RecordingState::Capturing)))));
        assert_eq!(session.state(), RecordingState::Done);
    }

    #[tokio::test]
    async fn test_interrupt_while_waiting() {
        let dir = tempdir().unwrap();
        let now = Local::now().time();
        // the wait must stay on today's date
        if now.num_seconds_from_midnight() > 86_400 - 120 {
            return;
        }
        let mut config = lidar_config(dir.path());
        config.since = Some(Since::new(now + chrono::Duration::seconds(60)));
        let session = RecordingSession::new(config, Arc::new(DryRunBackend));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let state = session.state_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            assert_eq!(*state.read(), RecordingState::WaitingForStart);
            trigger.cancel();
        });

        let report = session.run(&cancel).await.unwrap();
        assert_eq!(report.outcome, SessionOutcome::Interrupted);
        assert!(report.devices.is_empty());
        assert_eq!(session.state(), RecordingState::Done);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
