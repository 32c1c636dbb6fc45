// Collaborator seams for remote transcription and chat completion.
//
// The concrete HTTP clients live outside this crate; here we pin down the
// contract they must honor.

use async_trait::async_trait;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Errors a collaborator can report. `RateLimited` and `Server` are
/// transient and worth retrying; `Client` and `AudioTooShort` are not.
#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("rate limited by remote service")]
    RateLimited,

    #[error("server error: {0}")]
    Server(String),

    #[error("client error: {0}")]
    Client(String),

    #[error("audio too short or silent")]
    AudioTooShort,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TranscribeError {
    pub fn is_transient(&self) -> bool {
        matches!(self, TranscribeError::RateLimited | TranscribeError::Server(_))
    }
}

/// Remote speech-to-text collaborator.
///
/// Contract: the input file is mono 16-bit PCM at 16 kHz. Implementations
/// retry transient failures with bounded exponential backoff (see
/// [`retry_with_backoff`]) and delete the input file once the call
/// completes, successfully or not. Silent or near-empty audio is reported
/// as [`TranscribeError::AudioTooShort`] so the controller can track it.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> Result<String, TranscribeError>;
}

/// Remote chat-completion collaborator. Not used by the capture core
/// itself; transcript cleanup and summarization features sit on top of it.
#[async_trait]
pub trait ChatCompleter: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        model: &str,
    ) -> Result<String, TranscribeError>;
}

/// Retry `op` with exponential backoff, up to `max_attempts` total calls.
/// Only transient errors are retried; anything else fails immediately.
pub async fn retry_with_backoff<T, F, Fut>(
    max_attempts: u32,
    initial_delay: Duration,
    mut op: F,
) -> Result<T, TranscribeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TranscribeError>>,
{
    let mut delay = initial_delay;
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts && e.is_transient() => {
                warn!(attempt, max_attempts, "transient error, retrying in {delay:?}: {e}");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Stand-in collaborator used by the CLI when no remote service is wired
/// up: accepts the audio, deletes it per contract, returns empty text.
pub struct DryRunTranscriber;

#[async_trait]
impl Transcriber for DryRunTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> Result<String, TranscribeError> {
        info!(?audio_path, "dry-run transcriber consuming chunk");
        tokio::fs::remove_file(audio_path).await?;
        Ok(String::new())
    }
}
