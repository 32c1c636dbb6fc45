// Live capture streams.
//
// Each source runs on its own dedicated thread because cpal streams are not
// Send. The thread builds the stream, reports the negotiated format back to
// the caller, then parks until told to stop. The data callback does only
// three things: update the level meter, normalize the buffer (downmix +
// resample), and push into the source FIFO: no I/O, no locks beyond the
// FIFO insertion.

use crate::audio::format::{AudioFormat, SampleEncoding};
use crate::audio::meter::LevelMeter;
use crate::audio::mixer::SourceBuffer;
use crate::audio::normalize::{downmix, resample, DownmixMode};
use crate::error::CaptureError;
use crate::events::{CaptureEvent, EventSender};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

/// Which of the two fixed sources a stream feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSide {
    Microphone,
    System,
}

impl StreamSide {
    pub fn label(&self) -> &'static str {
        match self {
            StreamSide::Microphone => "microphone",
            StreamSide::System => "system",
        }
    }
}

/// Everything a capture thread needs besides the device format, which is
/// only known once the stream is negotiated.
pub struct ChainParams {
    pub side: StreamSide,
    pub meter: Arc<LevelMeter>,
    pub buffer: Arc<SourceBuffer>,
    pub downmix: DownmixMode,
    pub target_rate: u32,
    pub events: EventSender,
}

/// Per-source transform chain executed inside the capture callback.
struct SourceChain {
    params: ChainParams,
    source_format: AudioFormat,
}

impl SourceChain {
    fn new(params: ChainParams, source_format: AudioFormat) -> Self {
        Self {
            params,
            source_format,
        }
    }

    fn emit_level(&self, level: f32) {
        let event = match self.params.side {
            StreamSide::Microphone => CaptureEvent::MicrophoneLevel(level),
            StreamSide::System => CaptureEvent::SystemLevel(level),
        };
        self.params.events.emit(event);
    }

    fn ingest_f32(&self, data: &[f32]) {
        // Level is computed from the raw buffer, independent of mute state.
        let level = self.params.meter.update_f32(data);
        self.emit_level(level);
        self.normalize_and_push(data.to_vec());
    }

    fn ingest_i16(&self, data: &[i16]) {
        let level = self.params.meter.update_i16(data);
        self.emit_level(level);
        let converted: Vec<f32> = data.iter().map(|&s| s as f32 / 32_768.0).collect();
        self.normalize_and_push(converted);
    }

    fn ingest_u16(&self, data: &[u16]) {
        let converted: Vec<f32> = data
            .iter()
            .map(|&s| (s as f32 - 32_768.0) / 32_768.0)
            .collect();
        let level = self.params.meter.update_f32(&converted);
        self.emit_level(level);
        self.normalize_and_push(converted);
    }

    fn normalize_and_push(&self, samples: Vec<f32>) {
        let mono = downmix(samples, self.source_format.channels, self.params.downmix);
        let resampled = resample(mono, self.source_format.sample_rate, self.params.target_rate);
        self.params.buffer.push(&resampled);
    }
}

/// Handle to a running capture stream. Stopping joins the owning thread,
/// which drops the stream.
pub struct CaptureStreamHandle {
    stop_tx: mpsc::Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl CaptureStreamHandle {
    pub fn stop(mut self) {
        let _ = self.stop_tx.send(());
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                warn!("capture thread panicked during shutdown");
            }
        }
    }
}

impl Drop for CaptureStreamHandle {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Spawn a capture stream for `device_id` on a dedicated thread.
///
/// Returns once the stream is playing, together with the format the device
/// negotiated. Stream faults are forwarded through `fault_tx` and must be
/// handled by the controller.
pub fn spawn_capture(
    device_id: &str,
    params: ChainParams,
    fault_tx: UnboundedSender<String>,
) -> Result<(CaptureStreamHandle, AudioFormat), CaptureError> {
    let side = params.side;
    let (setup_tx, setup_rx) = mpsc::channel();
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    let device_id = device_id.to_string();

    let join = std::thread::Builder::new()
        .name(format!("capture-{}", side.label()))
        .spawn(move || match build_and_play(&device_id, params, fault_tx) {
            Ok((stream, format)) => {
                let _ = setup_tx.send(Ok(format));
                // Park until the controller signals stop or drops the handle.
                let _ = stop_rx.recv();
                drop(stream);
            }
            Err(e) => {
                let _ = setup_tx.send(Err(e));
            }
        })
        .map_err(|e| CaptureError::Device(format!("failed to spawn capture thread: {e}")))?;

    match setup_rx.recv() {
        Ok(Ok(format)) => {
            info!(side = side.label(), %format, "capture stream started");
            Ok((
                CaptureStreamHandle {
                    stop_tx,
                    join: Some(join),
                },
                format,
            ))
        }
        Ok(Err(e)) => {
            let _ = join.join();
            Err(e)
        }
        Err(_) => {
            let _ = join.join();
            Err(CaptureError::Device(format!(
                "{} capture thread exited during setup",
                side.label()
            )))
        }
    }
}

fn build_and_play(
    device_id: &str,
    params: ChainParams,
    fault_tx: UnboundedSender<String>,
) -> Result<(cpal::Stream, AudioFormat), CaptureError> {
    let side = params.side;
    let host = cpal::default_host();
    let device = find_device(&host, side, device_id)?;

    // For the system source the stream is opened against the render device
    // (loopback); its default output config describes the captured format.
    let supported = match side {
        StreamSide::Microphone => device.default_input_config(),
        StreamSide::System => device.default_output_config(),
    }
    .map_err(|e| {
        CaptureError::Device(format!(
            "no default config for {} device '{device_id}': {e}",
            side.label()
        ))
    })?;

    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let (bits_per_sample, encoding) = match sample_format {
        cpal::SampleFormat::F32 => (32, SampleEncoding::Float),
        cpal::SampleFormat::I16 | cpal::SampleFormat::U16 => (16, SampleEncoding::Int),
        other => {
            return Err(CaptureError::Device(format!(
                "unsupported sample format {other:?} on {} device '{device_id}'",
                side.label()
            )))
        }
    };
    let format = AudioFormat {
        sample_rate: config.sample_rate.0,
        channels: config.channels,
        bits_per_sample,
        encoding,
    };
    let chain = SourceChain::new(params, format);

    let stream = match sample_format {
        cpal::SampleFormat::F32 => {
            let err_cb = make_fault_callback(side, fault_tx);
            device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| chain.ingest_f32(data),
                err_cb,
                None,
            )
        }
        cpal::SampleFormat::I16 => {
            let err_cb = make_fault_callback(side, fault_tx);
            device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| chain.ingest_i16(data),
                err_cb,
                None,
            )
        }
        cpal::SampleFormat::U16 => {
            let err_cb = make_fault_callback(side, fault_tx);
            device.build_input_stream(
                &config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| chain.ingest_u16(data),
                err_cb,
                None,
            )
        }
        other => {
            return Err(CaptureError::Device(format!(
                "unsupported sample format {other:?} on {} device '{device_id}'",
                side.label()
            )))
        }
    }
    .map_err(|e| {
        CaptureError::Device(format!(
            "failed to open {} stream on '{device_id}': {e}",
            side.label()
        ))
    })?;

    stream.play().map_err(|e| {
        CaptureError::Device(format!(
            "failed to start {} stream on '{device_id}': {e}",
            side.label()
        ))
    })?;

    Ok((stream, format))
}

fn make_fault_callback(
    side: StreamSide,
    fault_tx: UnboundedSender<String>,
) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |err| {
        let _ = fault_tx.send(format!("{} capture stream failed: {err}", side.label()));
    }
}

fn find_device(
    host: &cpal::Host,
    side: StreamSide,
    device_id: &str,
) -> Result<cpal::Device, CaptureError> {
    let devices = match side {
        StreamSide::Microphone => host.input_devices(),
        StreamSide::System => host.output_devices(),
    }
    .map_err(|e| CaptureError::Device(format!("failed to enumerate devices: {e}")))?;

    for device in devices {
        if device.name().map(|n| n == device_id).unwrap_or(false) {
            return Ok(device);
        }
    }

    Err(CaptureError::Device(format!(
        "{} device '{device_id}' not found",
        side.label()
    )))
}
