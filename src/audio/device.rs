use crate::error::CaptureError;
use cpal::traits::{DeviceTrait, HostTrait};
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

/// Which way audio flows for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceDirection {
    /// Capture device (microphone).
    Input,
    /// Render device; captured via loopback as the system-audio source.
    Output,
}

impl fmt::Display for DeviceDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceDirection::Input => write!(f, "input"),
            DeviceDirection::Output => write!(f, "output"),
        }
    }
}

/// Immutable snapshot of one platform audio device.
#[derive(Debug, Clone, Serialize)]
pub struct AudioDeviceDescriptor {
    pub id: String,
    pub name: String,
    pub direction: DeviceDirection,
}

/// Stateless query over the platform audio subsystem.
pub struct DeviceCatalog;

impl DeviceCatalog {
    /// List active output (loopback candidates) and input (microphone)
    /// devices. Devices whose name cannot be read are skipped.
    pub fn enumerate() -> Result<Vec<AudioDeviceDescriptor>, CaptureError> {
        let host = cpal::default_host();
        let mut devices = Vec::new();

        let outputs = host
            .output_devices()
            .map_err(|e| CaptureError::Device(format!("failed to enumerate output devices: {e}")))?;
        for device in outputs {
            match device.name() {
                Ok(name) => devices.push(AudioDeviceDescriptor {
                    id: name.clone(),
                    name,
                    direction: DeviceDirection::Output,
                }),
                Err(e) => warn!("skipping unnamed output device: {e}"),
            }
        }

        let inputs = host
            .input_devices()
            .map_err(|e| CaptureError::Device(format!("failed to enumerate input devices: {e}")))?;
        for device in inputs {
            match device.name() {
                Ok(name) => devices.push(AudioDeviceDescriptor {
                    id: name.clone(),
                    name,
                    direction: DeviceDirection::Input,
                }),
                Err(e) => warn!("skipping unnamed input device: {e}"),
            }
        }

        info!(count = devices.len(), "enumerated active audio devices");
        Ok(devices)
    }

    /// Whether a device with the given id exists in the given direction.
    pub fn contains(direction: DeviceDirection, id: &str) -> Result<bool, CaptureError> {
        let devices = Self::enumerate()?;
        Ok(devices
            .iter()
            .any(|d| d.direction == direction && d.id == id))
    }
}
