// Chunked writer for the mixed stream.
//
// The recorder owns the currently-open WAV file and is the only writer to
// it. A single long-lived loop pulls 100 ms blocks from the mixer, writes
// them, and rotates the file once the configured chunk duration has
// elapsed. Rotation is single-flight: an atomic test-and-set gate ensures
// at most one rotation is in progress, and the loop pauses in short
// increments rather than writing into a file that is being closed. At the
// moment a rotation completes, ownership of the previous file transfers
// exactly once to the chunk pipeline through the hand-off channel; the
// recorder never touches that path again.

use crate::audio::format::AudioFormat;
use crate::audio::mixer::Mixer;
use crate::error::CaptureError;
use crate::events::{CaptureEvent, EventSender};
use chrono::{DateTime, Utc};
use hound::WavWriter;
use std::fs;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

/// How much audio one writer-loop iteration pulls from the mixer.
pub const BLOCK_LATENCY: Duration = Duration::from_millis(100);

const ROTATION_PAUSE: Duration = Duration::from_millis(10);
const IDLE_SLEEP: Duration = Duration::from_millis(20);
const ELAPSED_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub output_dir: PathBuf,
    pub session_id: String,
    pub chunk_duration: Duration,
    pub sample_rate: u32,
}

/// A completed (or in-progress) chunk file. Ownership transfers from the
/// recorder to the pipeline exactly once, at rotation.
#[derive(Debug, Clone)]
pub struct ChunkFile {
    pub path: PathBuf,
    pub started_at: DateTime<Utc>,
}

pub struct ChunkRecorder {
    config: RecorderConfig,
    mixer: Arc<Mixer>,
    writer: Option<WavWriter<BufWriter<File>>>,
    current: Option<ChunkFile>,
    chunk_index: usize,
    chunk_started: Instant,
    rotation_pending: Arc<AtomicBool>,
    handoff: UnboundedSender<ChunkFile>,
    events: EventSender,
}

impl ChunkRecorder {
    /// Create the recorder and open the first chunk file. Failure here
    /// leaves nothing on disk, so `start()` can roll back cleanly.
    pub fn create(
        config: RecorderConfig,
        mixer: Arc<Mixer>,
        events: EventSender,
        handoff: UnboundedSender<ChunkFile>,
    ) -> Result<Self, CaptureError> {
        fs::create_dir_all(&config.output_dir).map_err(|e| {
            CaptureError::Storage(format!(
                "failed to create output directory {:?}: {e}",
                config.output_dir
            ))
        })?;

        info!(
            session_id = %config.session_id,
            chunk_secs = config.chunk_duration.as_secs(),
            "chunk recorder initialized"
        );

        let mut recorder = Self {
            config,
            mixer,
            writer: None,
            current: None,
            chunk_index: 0,
            chunk_started: Instant::now(),
            rotation_pending: Arc::new(AtomicBool::new(false)),
            handoff,
            events,
        };
        recorder.open_chunk()?;
        Ok(recorder)
    }

    fn open_chunk(&mut self) -> Result<(), CaptureError> {
        let path = self.config.output_dir.join(format!(
            "{}-chunk-{:03}.wav",
            self.config.session_id, self.chunk_index
        ));

        let spec = AudioFormat::mixer(self.config.sample_rate).wav_spec();
        let writer = WavWriter::create(&path, spec)
            .map_err(|e| CaptureError::Storage(format!("failed to create chunk file {path:?}: {e}")))?;

        info!(?path, "opened chunk file");
        self.writer = Some(writer);
        self.current = Some(ChunkFile {
            path,
            started_at: Utc::now(),
        });
        self.chunk_index += 1;
        self.chunk_started = Instant::now();
        Ok(())
    }

    fn write_block(&mut self) -> Result<(), CaptureError> {
        let frames = AudioFormat::mixer(self.config.sample_rate).frames_in(BLOCK_LATENCY);
        let block = self.mixer.read_block(frames);

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| CaptureError::Storage("no chunk file open for writing".to_string()))?;
        for sample in block {
            writer
                .write_sample(sample)
                .map_err(|e| CaptureError::Storage(format!("failed to write mixed block: {e}")))?;
        }
        Ok(())
    }

    /// Close the current file. Returns its hand-off token, if any.
    fn close_current(&mut self) -> Result<Option<ChunkFile>, CaptureError> {
        if let Some(writer) = self.writer.take() {
            writer
                .finalize()
                .map_err(|e| CaptureError::Storage(format!("failed to finalize chunk: {e}")))?;
        }
        Ok(self.current.take())
    }

    /// Close the current file, open the next one, then hand the previous
    /// file off for processing. The gate is cleared between open and
    /// hand-off so the writer resumes as soon as a file is available.
    fn rotate(&mut self) -> Result<(), CaptureError> {
        let previous = self.close_current()?;
        self.open_chunk()?;
        self.rotation_pending.store(false, Ordering::Release);

        if let Some(chunk) = previous {
            debug!(path = ?chunk.path, "chunk handed off for processing");
            if self.handoff.send(chunk).is_err() {
                warn!("chunk pipeline is gone, completed chunk will not be transcribed");
            }
        }
        Ok(())
    }

    /// The writer loop. Runs until `stop` is set, then flushes the final
    /// (possibly partial) chunk through the same hand-off used mid-session.
    pub async fn run(mut self, stop: Arc<AtomicBool>, session_start: Instant) -> Result<(), CaptureError> {
        info!(
            block_ms = BLOCK_LATENCY.as_millis() as u64,
            "writer loop started"
        );
        let mut last_elapsed = Instant::now();

        while !stop.load(Ordering::Acquire) {
            if self.rotation_pending.load(Ordering::Acquire) {
                // A rotation is in flight; pause instead of writing into a
                // file that is being closed. Frames stay buffered.
                tokio::time::sleep(ROTATION_PAUSE).await;
                continue;
            }

            if self.mixer.has_buffered() {
                self.write_block()?;

                if self.chunk_started.elapsed() >= self.config.chunk_duration
                    && self
                        .rotation_pending
                        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                {
                    self.rotate()?;
                }
            } else {
                tokio::time::sleep(IDLE_SLEEP).await;
            }

            if last_elapsed.elapsed() >= ELAPSED_INTERVAL {
                self.events
                    .emit(CaptureEvent::Elapsed(session_start.elapsed()));
                last_elapsed = Instant::now();
            }
        }

        // Final flush: exactly one partial chunk per session.
        if let Some(chunk) = self.close_current()? {
            info!(path = ?chunk.path, "final chunk flushed");
            if self.handoff.send(chunk).is_err() {
                warn!("chunk pipeline is gone, final chunk will not be transcribed");
            }
        }
        info!("writer loop exited");
        Ok(())
    }

    /// Roll back the just-created first chunk when session startup fails
    /// partway through.
    pub fn discard(mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("failed to finalize discarded chunk: {e}");
            }
        }
        if let Some(chunk) = self.current.take() {
            if let Err(e) = fs::remove_file(&chunk.path) {
                warn!(path = ?chunk.path, "failed to remove discarded chunk: {e}");
            }
        }
    }
}

impl Drop for ChunkRecorder {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                error!("failed to finalize chunk file on drop: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::mixer::Mixer;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    fn make_recorder(
        dir: &TempDir,
        chunk_duration: Duration,
    ) -> (
        ChunkRecorder,
        Arc<Mixer>,
        mpsc::UnboundedReceiver<ChunkFile>,
    ) {
        let mixer = Arc::new(Mixer::new(
            48_000,
            Arc::new(AtomicBool::new(false)),
            Arc::new(AtomicBool::new(false)),
        ));
        let (tx, rx) = mpsc::unbounded_channel();
        let recorder = ChunkRecorder::create(
            RecorderConfig {
                output_dir: dir.path().to_path_buf(),
                session_id: "test".to_string(),
                chunk_duration,
                sample_rate: 48_000,
            },
            Arc::clone(&mixer),
            EventSender::new(16),
            tx,
        )
        .unwrap();
        (recorder, mixer, rx)
    }

    #[test]
    fn create_opens_first_chunk_file() {
        let dir = TempDir::new().unwrap();
        let (recorder, _mixer, _rx) = make_recorder(&dir, Duration::from_secs(5));

        let current = recorder.current.as_ref().unwrap();
        assert!(current.path.exists());
        assert!(current
            .path
            .to_string_lossy()
            .contains("test-chunk-000.wav"));
    }

    #[test]
    fn rotation_hands_off_exactly_once_and_never_writes_after() {
        let dir = TempDir::new().unwrap();
        let (mut recorder, mixer, mut rx) = make_recorder(&dir, Duration::from_secs(5));

        mixer.microphone_buffer().push(&vec![0.5f32; 4_800]);
        mixer.system_buffer().push(&vec![0.5f32; 4_800]);
        recorder.write_block().unwrap();
        recorder.rotate().unwrap();

        let handed = rx.try_recv().unwrap();
        assert!(rx.try_recv().is_err(), "hand-off must happen exactly once");
        assert!(handed.path.to_string_lossy().contains("chunk-000"));

        // Handed-off file is finalized and readable.
        let reader = hound::WavReader::open(&handed.path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.len(), 4_800 * 2);
        let size_after_handoff = fs::metadata(&handed.path).unwrap().len();

        // Further writes land in the new chunk, not the handed-off file.
        mixer.microphone_buffer().push(&vec![0.25f32; 4_800]);
        recorder.write_block().unwrap();
        drop(recorder);

        assert_eq!(fs::metadata(&handed.path).unwrap().len(), size_after_handoff);
        assert!(dir.path().join("test-chunk-001.wav").exists());
    }

    #[test]
    fn discard_removes_the_open_file() {
        let dir = TempDir::new().unwrap();
        let (recorder, _mixer, _rx) = make_recorder(&dir, Duration::from_secs(5));
        let path = recorder.current.as_ref().unwrap().path.clone();

        recorder.discard();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn run_flushes_final_chunk_on_stop() {
        let dir = TempDir::new().unwrap();
        let (recorder, mixer, mut rx) = make_recorder(&dir, Duration::from_secs(5));

        mixer.microphone_buffer().push(&vec![0.1f32; 9_600]);
        let stop = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(recorder.run(Arc::clone(&stop), Instant::now()));

        tokio::time::sleep(Duration::from_millis(150)).await;
        stop.store(true, Ordering::Release);
        task.await.unwrap().unwrap();

        let final_chunk = rx.recv().await.unwrap();
        assert!(final_chunk.path.exists());
        assert!(rx.try_recv().is_err(), "exactly one final chunk per session");
    }

    #[tokio::test]
    async fn run_rotates_once_duration_elapses() {
        let dir = TempDir::new().unwrap();
        let (recorder, mixer, mut rx) = make_recorder(&dir, Duration::from_millis(200));

        let stop = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(recorder.run(Arc::clone(&stop), Instant::now()));

        // Keep both sources fed for ~700 ms.
        for _ in 0..14 {
            mixer.microphone_buffer().push(&vec![0.2f32; 2_400]);
            mixer.system_buffer().push(&vec![0.2f32; 2_400]);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        stop.store(true, Ordering::Release);
        task.await.unwrap().unwrap();

        let mut chunks = Vec::new();
        while let Ok(chunk) = rx.try_recv() {
            chunks.push(chunk);
        }
        // At least two mid-session rotations plus the final flush.
        assert!(
            chunks.len() >= 3,
            "expected >= 3 chunks, got {}",
            chunks.len()
        );
        for chunk in &chunks {
            assert!(chunk.path.exists());
            hound::WavReader::open(&chunk.path).unwrap();
        }
    }
}
