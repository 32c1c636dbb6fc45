// End-to-end recording tests: samples pushed into the mixer come out the
// other side as rotated WAV chunks, each handed to the transcription
// pipeline exactly once, without touching real audio hardware.

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tandem_scribe::audio::mixer::Mixer;
use tandem_scribe::events::{CaptureEvent, EventSender};
use tandem_scribe::pipeline::ChunkPipeline;
use tandem_scribe::recorder::{ChunkRecorder, RecorderConfig};
use tandem_scribe::transcribe::{TranscribeError, Transcriber};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::timeout;

const SAMPLE_RATE: u32 = 48_000;
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

struct CountingTranscriber {
    inputs: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl Transcriber for CountingTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> Result<String, TranscribeError> {
        self.inputs.lock().unwrap().push(audio_path.to_path_buf());
        std::fs::remove_file(audio_path)?;
        Ok("ok".to_string())
    }
}

fn test_mixer() -> Arc<Mixer> {
    Arc::new(Mixer::new(
        SAMPLE_RATE,
        Arc::new(AtomicBool::new(false)),
        Arc::new(AtomicBool::new(false)),
    ))
}

#[tokio::test]
async fn test_session_produces_chunks_and_transcripts() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mixer = test_mixer();
    let events = EventSender::new(256);
    let mut event_rx = events.subscribe();

    let (handoff_tx, handoff_rx) = mpsc::unbounded_channel();
    let recorder = ChunkRecorder::create(
        RecorderConfig {
            output_dir: temp_dir.path().to_path_buf(),
            session_id: "test-session".to_string(),
            chunk_duration: Duration::from_millis(250),
            sample_rate: SAMPLE_RATE,
        },
        Arc::clone(&mixer),
        events.clone(),
        handoff_tx,
    )?;

    let transcriber = Arc::new(CountingTranscriber {
        inputs: Mutex::new(Vec::new()),
    });
    let (notice_tx, _notice_rx) = mpsc::unbounded_channel();
    let dispatcher = ChunkPipeline::new(transcriber.clone(), events.clone(), notice_tx)
        .spawn(handoff_rx);

    let stop = Arc::new(AtomicBool::new(false));
    let writer = tokio::spawn({
        let stop = Arc::clone(&stop);
        async move { recorder.run(stop, Instant::now()).await }
    });

    // Feed both sources for ~700 ms of wall time in 50 ms slices.
    let slice = (SAMPLE_RATE / 20) as usize;
    let mic_slice = vec![0.5_f32; slice];
    let sys_slice = vec![-0.5_f32; slice];
    for _ in 0..14 {
        mixer.microphone_buffer().push(&mic_slice);
        mixer.system_buffer().push(&sys_slice);
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    stop.store(true, Ordering::SeqCst);
    timeout(RECV_TIMEOUT, writer).await???;
    timeout(RECV_TIMEOUT, dispatcher).await??;

    // Per-chunk tasks outlive the dispatcher; they are done once every
    // file in the output directory has been cleaned up.
    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    while tokio::time::Instant::now() < deadline
        && std::fs::read_dir(temp_dir.path())?.count() > 0
    {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(std::fs::read_dir(temp_dir.path())?.count(), 0);

    // ~700 ms of audio at 250 ms per chunk: at least two rotations plus a
    // final partial flush, each transcribed exactly once.
    let inputs = transcriber.inputs.lock().unwrap();
    assert!(
        inputs.len() >= 3,
        "expected at least 3 chunks, got {}",
        inputs.len()
    );
    let unique: std::collections::HashSet<_> = inputs.iter().collect();
    assert_eq!(unique.len(), inputs.len(), "no chunk may be handed off twice");

    // Transcript events surfaced for every chunk and elapsed time ticked.
    let mut transcripts = 0;
    let mut saw_elapsed = false;
    while let Ok(event) = event_rx.try_recv() {
        match event {
            CaptureEvent::Transcript(_) => transcripts += 1,
            CaptureEvent::Elapsed(_) => saw_elapsed = true,
            _ => {}
        }
    }
    assert_eq!(transcripts, inputs.len());
    assert!(saw_elapsed, "elapsed events should be emitted during recording");

    Ok(())
}

#[tokio::test]
async fn test_idle_session_still_flushes_a_final_chunk() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mixer = test_mixer();
    let events = EventSender::new(64);

    let (handoff_tx, mut handoff_rx) = mpsc::unbounded_channel();
    let recorder = ChunkRecorder::create(
        RecorderConfig {
            output_dir: temp_dir.path().to_path_buf(),
            session_id: "idle-session".to_string(),
            chunk_duration: Duration::from_secs(10),
            sample_rate: SAMPLE_RATE,
        },
        Arc::clone(&mixer),
        events,
        handoff_tx,
    )?;

    let stop = Arc::new(AtomicBool::new(false));
    let writer = tokio::spawn({
        let stop = Arc::clone(&stop);
        async move { recorder.run(stop, Instant::now()).await }
    });

    // No samples at all; the writer just idles until stopped.
    tokio::time::sleep(Duration::from_millis(100)).await;
    stop.store(true, Ordering::SeqCst);
    timeout(RECV_TIMEOUT, writer).await???;

    // The open chunk is finalized and handed off on shutdown, exactly once.
    let first = timeout(RECV_TIMEOUT, handoff_rx.recv()).await?;
    let chunk = first.ok_or_else(|| anyhow::anyhow!("expected the final chunk"))?;
    assert!(chunk.path.exists());
    assert!(handoff_rx.recv().await.is_none());

    let reader = hound::WavReader::open(&chunk.path)?;
    assert_eq!(reader.spec().channels, 2);
    assert_eq!(reader.spec().sample_rate, SAMPLE_RATE);

    Ok(())
}
