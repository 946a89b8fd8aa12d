//! Audio device data models.
//!
//! Defines the playback device snapshot, device-change events, the volume
//! level conversions and the audio error type.

use thiserror::Error;

/// Name used for the placeholder descriptor returned when enumeration fails.
pub const SYNTHETIC_DEFAULT_NAME: &str = "Default device";

/// Id of the placeholder descriptor returned when enumeration fails.
pub const SYNTHETIC_DEFAULT_ID: &str = "default";

/// A playback device as seen at enumeration time.
///
/// Snapshots are never cached; every `list_devices` call enumerates again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Unique Windows device ID (opaque string from IMMDevice::GetId)
    pub id: String,

    /// Human-readable device name (from device properties)
    pub name: String,

    /// Whether this is the current default render device (Console role)
    pub is_default: bool,
}

impl DeviceDescriptor {
    /// Create a non-default descriptor.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_default: false,
        }
    }

    /// The descriptor reported in place of a failed enumeration.
    pub fn synthetic_default() -> Self {
        Self {
            id: SYNTHETIC_DEFAULT_ID.to_string(),
            name: SYNTHETIC_DEFAULT_NAME.to_string(),
            is_default: true,
        }
    }
}

/// Windows device state flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Device is active and available for use
    Active,

    /// Device is disabled in Windows Sound settings
    Disabled,

    /// Device is not present (driver issue)
    NotPresent,

    /// Device is unplugged (for pluggable devices)
    Unplugged,
}

/// Events from the audio system, posted by the platform notification client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// The default render device changed. `None` when no device remains.
    DefaultDeviceChanged { device_id: Option<String> },

    /// A new audio device was connected
    DeviceAdded { device_id: String },

    /// An audio device was disconnected
    DeviceRemoved { device_id: String },

    /// Device state changed (active, disabled, not present, unplugged)
    DeviceStateChanged {
        device_id: String,
        new_state: DeviceState,
    },
}

/// Clamp an arbitrary requested level to the 0..=100 percent range.
pub fn clamp_percent(level: i32) -> u8 {
    level.clamp(0, 100) as u8
}

/// Convert a platform scalar (0.0 to 1.0) to a rounded percentage.
pub fn scalar_to_percent(scalar: f32) -> u8 {
    if !scalar.is_finite() {
        return 0;
    }
    (scalar.clamp(0.0, 1.0) * 100.0).round() as u8
}

/// Convert a percentage to the platform scalar.
pub fn percent_to_scalar(percent: u8) -> f32 {
    f32::from(percent.min(100)) / 100.0
}

/// Audio service error types.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Device not found: {device_id}")]
    DeviceNotFound { device_id: String },

    #[error("No default device available")]
    NoDefaultDevice,

    #[error("Volume control not available for device")]
    VolumeNotAvailable,

    #[cfg(windows)]
    #[error("COM initialization failed: {0}")]
    ComInitFailed(#[source] windows::core::Error),

    #[cfg(windows)]
    #[error("Failed to enumerate devices: {0}")]
    EnumerationFailed(#[source] windows::core::Error),

    #[cfg(windows)]
    #[error("Failed to register for device notifications: {0}")]
    NotificationFailed(#[source] windows::core::Error),

    #[cfg(windows)]
    #[error("Windows API error: {0}")]
    WindowsError(#[source] windows::core::Error),

    #[error("String conversion error: {0}")]
    StringConversion(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_percent_bounds() {
        assert_eq!(clamp_percent(-5), 0);
        assert_eq!(clamp_percent(0), 0);
        assert_eq!(clamp_percent(57), 57);
        assert_eq!(clamp_percent(100), 100);
        assert_eq!(clamp_percent(101), 100);
        assert_eq!(clamp_percent(i32::MAX), 100);
    }

    #[test]
    fn scalar_rounds_to_nearest_percent() {
        assert_eq!(scalar_to_percent(0.0), 0);
        assert_eq!(scalar_to_percent(0.504), 50);
        assert_eq!(scalar_to_percent(0.515), 52);
        assert_eq!(scalar_to_percent(1.0), 100);
    }

    #[test]
    fn out_of_range_scalar_is_clamped() {
        assert_eq!(scalar_to_percent(1.7), 100);
        assert_eq!(scalar_to_percent(-0.2), 0);
        assert_eq!(scalar_to_percent(f32::NAN), 0);
    }

    #[test]
    fn synthetic_default_is_marked_default() {
        let device = DeviceDescriptor::synthetic_default();
        assert!(device.is_default);
        assert_eq!(device.id, SYNTHETIC_DEFAULT_ID);
        assert!(!DeviceDescriptor::new("id", "Speakers").is_default);
    }
}
