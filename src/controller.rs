// Top-level orchestration: device selection, session lifecycle, mute
// toggles, and event fan-out.
//
// The controller is the only component that knows about all the moving
// parts. Each `start()` wires up a fresh mixer, recorder, capture streams,
// and chunk pipeline; `stop()` tears them down in the reverse order,
// giving the writer loop a bounded grace period to quiesce.

use crate::audio::capture::{spawn_capture, CaptureStreamHandle, ChainParams, StreamSide};
use crate::audio::device::{DeviceCatalog, DeviceDirection};
use crate::audio::meter::LevelMeter;
use crate::audio::mixer::Mixer;
use crate::config::Config;
use crate::error::CaptureError;
use crate::events::{CaptureEvent, EventSender};
use crate::pipeline::{ChunkPipeline, PipelineNotice};
use crate::recorder::{ChunkRecorder, RecorderConfig};
use crate::transcribe::Transcriber;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Delay before a device re-selection triggers re-initialization; rapid
/// repeated selections restart the timer instead of stacking re-inits.
const REINIT_DEBOUNCE: Duration = Duration::from_millis(350);

/// How long `stop()` waits for the writer loop before proceeding anyway.
const WRITER_GRACE: Duration = Duration::from_secs(1);

/// After this many "audio too short" reports the session is stopped to
/// avoid an unbounded failure loop.
const MAX_SHORT_AUDIO_WARNINGS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Uninitialized,
    Ready,
    Reinitializing,
    Recording,
    Stopping,
}

struct ActiveSession {
    stop_flag: Arc<AtomicBool>,
    writer_task: JoinHandle<()>,
    microphone_stream: CaptureStreamHandle,
    system_stream: CaptureStreamHandle,
    _pipeline_task: JoinHandle<()>,
    started_at: DateTime<Utc>,
}

pub struct CaptureController {
    config: Config,
    transcriber: Arc<dyn Transcriber>,
    events: EventSender,
    selected_system: StdMutex<Option<String>>,
    selected_microphone: StdMutex<Option<String>>,
    microphone_muted: Arc<AtomicBool>,
    system_muted: Arc<AtomicBool>,
    microphone_level: Arc<LevelMeter>,
    system_level: Arc<LevelMeter>,
    state: StdMutex<ControllerState>,
    active: Mutex<Option<ActiveSession>>,
    reinit_task: StdMutex<Option<JoinHandle<()>>>,
    short_audio_warnings: AtomicU32,
}

impl CaptureController {
    pub fn new(config: Config, transcriber: Arc<dyn Transcriber>) -> Arc<Self> {
        info!("capture controller initializing");
        Arc::new(Self {
            config,
            transcriber,
            events: EventSender::new(256),
            selected_system: StdMutex::new(None),
            selected_microphone: StdMutex::new(None),
            microphone_muted: Arc::new(AtomicBool::new(false)),
            system_muted: Arc::new(AtomicBool::new(false)),
            microphone_level: Arc::new(LevelMeter::new()),
            system_level: Arc::new(LevelMeter::new()),
            state: StdMutex::new(ControllerState::Uninitialized),
            active: Mutex::new(None),
            reinit_task: StdMutex::new(None),
            short_audio_warnings: AtomicU32::new(0),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> ControllerState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, state: ControllerState) {
        *self.state.lock().unwrap() = state;
    }

    pub async fn is_recording(&self) -> bool {
        self.active.lock().await.is_some()
    }

    pub fn microphone_level(&self) -> f32 {
        self.microphone_level.level()
    }

    pub fn system_level(&self) -> f32 {
        self.system_level.level()
    }

    /// Mute toggles take effect on the next mixed block; they never block.
    pub fn set_microphone_muted(&self, muted: bool) {
        self.microphone_muted.store(muted, Ordering::Relaxed);
        info!(muted, "microphone mute toggled");
    }

    pub fn set_system_muted(&self, muted: bool) {
        self.system_muted.store(muted, Ordering::Relaxed);
        info!(muted, "system audio mute toggled");
    }

    /// Persist a device selection. While not recording, re-initialization
    /// is scheduled after a debounce delay; each new selection cancels the
    /// previous pending one.
    pub fn select_device(self: &Arc<Self>, direction: DeviceDirection, id: impl Into<String>) {
        let id = id.into();
        match direction {
            DeviceDirection::Output => {
                *self.selected_system.lock().unwrap() = Some(id.clone());
            }
            DeviceDirection::Input => {
                *self.selected_microphone.lock().unwrap() = Some(id.clone());
            }
        }
        info!(%direction, %id, "device selected");
        self.schedule_reinit();
    }

    fn schedule_reinit(self: &Arc<Self>) {
        let mut slot = self.reinit_task.lock().unwrap();
        if let Some(previous) = slot.take() {
            previous.abort();
        }

        let controller = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(REINIT_DEBOUNCE).await;
            if controller.is_recording().await {
                return;
            }
            controller.reinitialize();
        }));
    }

    fn reinitialize(&self) {
        self.set_state(ControllerState::Reinitializing);

        let system = self.selected_system.lock().unwrap().clone();
        let microphone = self.selected_microphone.lock().unwrap().clone();
        let (Some(system), Some(microphone)) = (system, microphone) else {
            self.events.emit(CaptureEvent::Status(
                "Select a system audio and a microphone device.".to_string(),
            ));
            self.set_state(ControllerState::Uninitialized);
            return;
        };

        let system_present = DeviceCatalog::contains(DeviceDirection::Output, &system);
        let microphone_present = DeviceCatalog::contains(DeviceDirection::Input, &microphone);
        match (system_present, microphone_present) {
            (Ok(true), Ok(true)) => {
                self.set_state(ControllerState::Ready);
                self.events.emit(CaptureEvent::Status(format!(
                    "Ready. System: {system}, Mic: {microphone}"
                )));
            }
            (Ok(_), Ok(_)) => {
                self.set_state(ControllerState::Uninitialized);
                self.events.emit(CaptureEvent::Error(
                    "a selected audio device is no longer present".to_string(),
                ));
            }
            (Err(e), _) | (_, Err(e)) => {
                self.set_state(ControllerState::Uninitialized);
                self.events
                    .emit(CaptureEvent::Error(format!("device enumeration failed: {e}")));
            }
        }
    }

    /// Start a recording session.
    ///
    /// Requires both a system and a microphone device to be selected. Any
    /// failure after the first chunk file is created rolls back cleanly:
    /// partially-started captures are torn down and the file is removed.
    pub async fn start(self: &Arc<Self>) -> Result<(), CaptureError> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            warn!("start requested while already recording");
            return Ok(());
        }

        let system_id = self
            .selected_system
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| {
                CaptureError::Configuration("no system audio device selected".to_string())
            })?;
        let microphone_id = self
            .selected_microphone
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| {
                CaptureError::Configuration("no microphone device selected".to_string())
            })?;

        // Reset per-session state.
        self.short_audio_warnings.store(0, Ordering::SeqCst);
        self.microphone_muted.store(false, Ordering::Relaxed);
        self.system_muted.store(false, Ordering::Relaxed);
        self.microphone_level.reset();
        self.system_level.reset();
        self.events.emit(CaptureEvent::MicrophoneLevel(0.0));
        self.events.emit(CaptureEvent::SystemLevel(0.0));

        let sample_rate = self.config.audio.sample_rate;
        let chunk_duration = self.config.session.clamped_chunk_duration();
        let session_id = format!("session-{}", uuid::Uuid::new_v4());
        info!(%session_id, chunk_secs = chunk_duration.as_secs(), "starting recording session");

        let mixer = Arc::new(Mixer::new(
            sample_rate,
            Arc::clone(&self.microphone_muted),
            Arc::clone(&self.system_muted),
        ));

        let (handoff_tx, handoff_rx) = mpsc::unbounded_channel();
        let recorder = ChunkRecorder::create(
            RecorderConfig {
                output_dir: self.config.audio.output_dir.clone(),
                session_id,
                chunk_duration,
                sample_rate,
            },
            Arc::clone(&mixer),
            self.events.clone(),
            handoff_tx,
        )
        .map_err(|e| {
            self.events.emit(CaptureEvent::Error(e.to_string()));
            e
        })?;

        let (fault_tx, mut fault_rx) = mpsc::unbounded_channel();
        let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();

        // Start both captures; roll back on any failure.
        let microphone_stream = match spawn_capture(
            &microphone_id,
            ChainParams {
                side: StreamSide::Microphone,
                meter: Arc::clone(&self.microphone_level),
                buffer: mixer.microphone_buffer(),
                downmix: self.config.audio.downmix_mode,
                target_rate: sample_rate,
                events: self.events.clone(),
            },
            fault_tx.clone(),
        ) {
            Ok((handle, _format)) => handle,
            Err(e) => {
                recorder.discard();
                self.events.emit(CaptureEvent::Error(e.to_string()));
                return Err(e);
            }
        };

        let system_stream = match spawn_capture(
            &system_id,
            ChainParams {
                side: StreamSide::System,
                meter: Arc::clone(&self.system_level),
                buffer: mixer.system_buffer(),
                downmix: self.config.audio.downmix_mode,
                target_rate: sample_rate,
                events: self.events.clone(),
            },
            fault_tx.clone(),
        ) {
            Ok((handle, _format)) => handle,
            Err(e) => {
                microphone_stream.stop();
                recorder.discard();
                self.events.emit(CaptureEvent::Error(e.to_string()));
                return Err(e);
            }
        };

        let stop_flag = Arc::new(AtomicBool::new(false));
        let session_start = Instant::now();

        let writer_task = tokio::spawn({
            let stop_flag = Arc::clone(&stop_flag);
            let fault_tx = fault_tx.clone();
            async move {
                if let Err(e) = recorder.run(stop_flag, session_start).await {
                    let _ = fault_tx.send(format!("writer loop failed: {e}"));
                }
            }
        });

        let pipeline_task = ChunkPipeline::new(
            Arc::clone(&self.transcriber),
            self.events.clone(),
            notice_tx,
        )
        .spawn(handoff_rx);

        // Fault watcher: any capture-level fault triggers the same stop
        // sequence as an explicit stop(). Exits when all fault senders drop.
        tokio::spawn({
            let controller = Arc::clone(self);
            async move {
                while let Some(message) = fault_rx.recv().await {
                    error!("capture fault: {message}");
                    controller.events.emit(CaptureEvent::Error(message));
                    if let Err(e) = controller.stop().await {
                        error!("stop after capture fault failed: {e}");
                    }
                }
            }
        });

        // Short-audio watcher: exits when the pipeline drops its sender.
        tokio::spawn({
            let controller = Arc::clone(self);
            async move {
                while let Some(PipelineNotice::ShortAudio) = notice_rx.recv().await {
                    controller.note_short_audio_warning().await;
                }
            }
        });

        *active = Some(ActiveSession {
            stop_flag,
            writer_task,
            microphone_stream,
            system_stream,
            _pipeline_task: pipeline_task,
            started_at: Utc::now(),
        });
        self.set_state(ControllerState::Recording);
        self.events.emit(CaptureEvent::Status(
            "Recording (system + microphone)...".to_string(),
        ));
        info!("recording session started");
        Ok(())
    }

    /// Stop the current session. Calling this while not recording is a
    /// no-op.
    pub async fn stop(&self) -> Result<(), CaptureError> {
        let mut active = self.active.lock().await;
        let Some(mut session) = active.take() else {
            info!("stop requested while not recording");
            return Ok(());
        };

        self.set_state(ControllerState::Stopping);
        self.events
            .emit(CaptureEvent::Status("Stopping...".to_string()));
        session.stop_flag.store(true, Ordering::SeqCst);

        match tokio::time::timeout(WRITER_GRACE, &mut session.writer_task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("writer task panicked: {e}"),
            Err(_) => {
                warn!("writer loop did not quiesce within grace period, proceeding");
            }
        }

        session.microphone_stream.stop();
        session.system_stream.stop();

        self.microphone_level.reset();
        self.system_level.reset();
        self.events.emit(CaptureEvent::MicrophoneLevel(0.0));
        self.events.emit(CaptureEvent::SystemLevel(0.0));

        let duration = Utc::now().signed_duration_since(session.started_at);
        info!(
            duration_secs = duration.num_milliseconds() as f64 / 1000.0,
            "recording session stopped"
        );

        self.set_state(ControllerState::Ready);
        self.events
            .emit(CaptureEvent::Status("Stopped.".to_string()));
        Ok(())
    }

    /// Track a "too short/silent" report from the pipeline; repeated
    /// reports stop the session.
    pub(crate) async fn note_short_audio_warning(&self) {
        let count = self.short_audio_warnings.fetch_add(1, Ordering::SeqCst) + 1;
        self.events.emit(CaptureEvent::Error(format!(
            "Warning ({count}/{MAX_SHORT_AUDIO_WARNINGS}): audio too short or silent; \
             check the selected devices"
        )));

        if count >= MAX_SHORT_AUDIO_WARNINGS {
            warn!("stopping session after repeated short-audio warnings");
            self.events.emit(CaptureEvent::Status(
                "Stopping after repeated short-audio warnings.".to_string(),
            ));
            if let Err(e) = self.stop().await {
                error!("auto-stop failed: {e}");
            }
        }
    }
}
