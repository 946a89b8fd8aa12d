//! Volume control using IAudioEndpointVolume.
//!
//! Wraps the master volume and mute of one render endpoint.

use super::backend::EndpointVolume;
use super::device::AudioError;
use windows::Win32::Media::Audio::{Endpoints::IAudioEndpointVolume, IMMDevice};
use windows::Win32::System::Com::CLSCTX_ALL;

/// Volume interface of a bound playback endpoint.
pub struct WindowsEndpoint {
    endpoint_volume: IAudioEndpointVolume,
}

// SAFETY: IAudioEndpointVolume is free-threaded. Every thread that touches it
// holds a ComGuard: the main thread, the device watcher during rebinds and the
// hotkey hook thread. The controller serializes calls.
unsafe impl Send for WindowsEndpoint {}

impl WindowsEndpoint {
    /// Activate the endpoint volume interface of `device`.
    pub fn activate(device: &IMMDevice) -> Result<Self, AudioError> {
        unsafe {
            let endpoint_volume: IAudioEndpointVolume = device
                .Activate(CLSCTX_ALL, None)
                .map_err(|_| AudioError::VolumeNotAvailable)?;

            Ok(Self { endpoint_volume })
        }
    }
}

impl EndpointVolume for WindowsEndpoint {
    fn volume_scalar(&self) -> Result<f32, AudioError> {
        unsafe {
            self.endpoint_volume
                .GetMasterVolumeLevelScalar()
                .map_err(AudioError::WindowsError)
        }
    }

    fn set_volume_scalar(&self, level: f32) -> Result<(), AudioError> {
        let level = level.clamp(0.0, 1.0);
        unsafe {
            self.endpoint_volume
                .SetMasterVolumeLevelScalar(level, std::ptr::null())
                .map_err(AudioError::WindowsError)
        }
    }

    fn mute(&self) -> Result<bool, AudioError> {
        unsafe {
            let muted = self
                .endpoint_volume
                .GetMute()
                .map_err(AudioError::WindowsError)?;
            Ok(muted.as_bool())
        }
    }

    fn set_mute(&self, muted: bool) -> Result<(), AudioError> {
        unsafe {
            self.endpoint_volume
                .SetMute(muted, std::ptr::null())
                .map_err(AudioError::WindowsError)
        }
    }
}
