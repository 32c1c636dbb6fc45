// Per-chunk post-processing.
//
// Once a chunk file is handed off it belongs to the pipeline: downsample
// to the transcription format, submit to the collaborator, emit the text,
// and clean up. Failures are isolated to the one chunk; the recording
// session never notices. The original chunk file is deleted in every
// outcome; the downsampled file is deleted by the transcriber on success
// and by the downsampler on write failure.

use crate::audio::format::{AudioFormat, TRANSCRIPTION_SAMPLE_RATE};
use crate::audio::normalize::{downmix, resample, DownmixMode};
use crate::error::CaptureError;
use crate::events::{CaptureEvent, EventSender};
use crate::recorder::ChunkFile;
use crate::transcribe::{TranscribeError, Transcriber};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Signals the pipeline sends back to the controller.
#[derive(Debug)]
pub enum PipelineNotice {
    /// The collaborator flagged the chunk as too short or silent.
    ShortAudio,
}

pub struct ChunkPipeline {
    transcriber: Arc<dyn Transcriber>,
    events: EventSender,
    notices: UnboundedSender<PipelineNotice>,
}

impl ChunkPipeline {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        events: EventSender,
        notices: UnboundedSender<PipelineNotice>,
    ) -> Self {
        Self {
            transcriber,
            events,
            notices,
        }
    }

    /// Dispatch loop: one independent task per handed-off chunk. Ends when
    /// the recorder drops its sender.
    pub fn spawn(self, mut chunks: UnboundedReceiver<ChunkFile>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let pipeline = Arc::new(self);
            while let Some(chunk) = chunks.recv().await {
                let pipeline = Arc::clone(&pipeline);
                tokio::spawn(async move {
                    pipeline.process(chunk).await;
                });
            }
            info!("chunk pipeline dispatcher exited");
        })
    }

    /// Process one completed chunk end to end.
    pub async fn process(&self, chunk: ChunkFile) {
        let original = chunk.path.clone();
        info!(path = ?original, "processing completed chunk");

        let downsampled = {
            let source = original.clone();
            tokio::task::spawn_blocking(move || downsample_chunk(&source))
                .await
                .unwrap_or_else(|e| {
                    Err(CaptureError::Pipeline(format!(
                        "downsample task panicked: {e}"
                    )))
                })
        };

        match downsampled {
            Err(e) => {
                error!(path = ?original, "downsampling failed: {e}");
                self.events
                    .emit(CaptureEvent::Error(format!("downsampling failed: {e}")));
            }
            Ok(transcription_input) => {
                self.events.emit(CaptureEvent::Status(format!(
                    "Transcribing chunk {}...",
                    transcription_input
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default()
                )));

                match self.transcriber.transcribe(&transcription_input).await {
                    Ok(text) => {
                        info!(chars = text.len(), "chunk transcribed");
                        self.events.emit(CaptureEvent::Transcript(text));
                    }
                    Err(TranscribeError::AudioTooShort) => {
                        warn!(path = ?original, "chunk flagged as too short or silent");
                        self.events.emit(CaptureEvent::Error(
                            "audio too short or silent".to_string(),
                        ));
                        let _ = self.notices.send(PipelineNotice::ShortAudio);
                    }
                    Err(e) => {
                        error!(path = ?original, "transcription failed: {e}");
                        self.events
                            .emit(CaptureEvent::Error(format!("transcription failed: {e}")));
                    }
                }
            }
        }

        // The original chunk is deleted in every outcome; failure to delete
        // is the one error that is logged rather than reported.
        if original.exists() {
            if let Err(e) = std::fs::remove_file(&original) {
                warn!(path = ?original, "failed to delete chunk file: {e}");
            }
        }
    }
}

/// Convert a recorded chunk (stereo float at the mixer rate) into the
/// transcription-ready format: mono, 16-bit PCM, 16 kHz. Returns the path
/// of the new sibling file.
pub fn downsample_chunk(path: &Path) -> Result<PathBuf, CaptureError> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| CaptureError::Pipeline(format!("failed to open chunk {path:?}: {e}")))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| CaptureError::Pipeline(format!("failed to read chunk samples: {e}")))?,
        hound::SampleFormat::Int => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32_768.0))
            .collect::<Result<_, _>>()
            .map_err(|e| CaptureError::Pipeline(format!("failed to read chunk samples: {e}")))?,
    };

    let mono = match spec.channels {
        1 => samples,
        2 => downmix(samples, 2, DownmixMode::Average),
        n => {
            return Err(CaptureError::Pipeline(format!(
                "unsupported channel count {n} in chunk {path:?}"
            )))
        }
    };

    let resampled = resample(mono, spec.sample_rate, TRANSCRIPTION_SAMPLE_RATE);

    let output_path = downsampled_path(path);
    let result = write_pcm16(&output_path, &resampled);
    if let Err(e) = result {
        // Do not leave a partial file behind.
        if output_path.exists() {
            if let Err(del) = std::fs::remove_file(&output_path) {
                warn!(path = ?output_path, "failed to delete partial downsampled file: {del}");
            }
        }
        return Err(e);
    }

    info!(path = ?output_path, samples = resampled.len(), "chunk downsampled for transcription");
    Ok(output_path)
}

fn downsampled_path(original: &Path) -> PathBuf {
    let stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "chunk".to_string());
    original.with_file_name(format!("{stem}_downsampled.wav"))
}

fn write_pcm16(path: &Path, samples: &[f32]) -> Result<(), CaptureError> {
    let spec = AudioFormat::transcription().wav_spec();
    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| CaptureError::Pipeline(format!("failed to create {path:?}: {e}")))?;

    for &sample in samples {
        let clamped = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(clamped)
            .map_err(|e| CaptureError::Pipeline(format!("failed to write {path:?}: {e}")))?;
    }

    writer
        .finalize()
        .map_err(|e| CaptureError::Pipeline(format!("failed to finalize {path:?}: {e}")))
}
