pub mod capture;
pub mod device;
pub mod format;
pub mod meter;
pub mod mixer;
pub mod normalize;

pub use capture::{spawn_capture, CaptureStreamHandle, ChainParams, StreamSide};
pub use device::{AudioDeviceDescriptor, DeviceCatalog, DeviceDirection};
pub use format::{AudioFormat, SampleEncoding, MIXER_SAMPLE_RATE, TRANSCRIPTION_SAMPLE_RATE};
pub use meter::LevelMeter;
pub use mixer::{Mixer, SourceBuffer};
pub use normalize::{downmix, resample, DownmixMode};
