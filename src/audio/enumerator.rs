//! Device enumeration using Windows MMDevice API.
//!
//! Provides COM initialization and the Windows implementation of
//! [`AudioBackend`].

use super::backend::AudioBackend;
use super::device::{AudioError, DeviceDescriptor, DeviceEvent};
use super::notifications::{DeviceNotificationClient, NotificationRegistration};
use super::volume::WindowsEndpoint;
use std::sync::mpsc::Sender;
use windows::core::{PCWSTR, PWSTR};
use windows::Win32::Devices::Properties::DEVPKEY_Device_FriendlyName;
use windows::Win32::Foundation::RPC_E_CHANGED_MODE;
use windows::Win32::Media::Audio::{
    eConsole, eRender, IMMDevice, IMMDeviceEnumerator, MMDeviceEnumerator, DEVICE_STATE_ACTIVE,
};
use windows::Win32::System::Com::{
    CoCreateInstance, CoInitializeEx, CoTaskMemFree, CoUninitialize, CLSCTX_ALL,
    COINIT_MULTITHREADED, STGM,
};
use windows::Win32::UI::Shell::PropertiesSystem::{IPropertyStore, PROPERTYKEY};

/// COM initialization guard that uninitializes COM on drop.
pub struct ComGuard {
    initialized: bool,
}

impl ComGuard {
    /// Join the multithreaded apartment on the current thread.
    ///
    /// A thread already in a single-threaded apartment keeps it; the guard
    /// then does nothing on drop.
    pub fn new() -> Result<Self, AudioError> {
        let hr = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) };
        if hr == RPC_E_CHANGED_MODE {
            return Ok(Self { initialized: false });
        }
        hr.ok().map_err(AudioError::ComInitFailed)?;
        Ok(Self { initialized: true })
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        if self.initialized {
            unsafe {
                CoUninitialize();
            }
        }
    }
}

/// Render-device access through the MMDevice API.
///
/// Holds no COM objects itself; each call creates its enumerator on the
/// calling thread, which must have entered COM via [`AudioBackend::enter_thread`].
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsAudioBackend;

impl WindowsAudioBackend {
    pub fn new() -> Self {
        Self
    }

    fn enumerator(&self) -> Result<IMMDeviceEnumerator, AudioError> {
        unsafe {
            CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                .map_err(AudioError::EnumerationFailed)
        }
    }

    fn device(
        &self,
        enumerator: &IMMDeviceEnumerator,
        device_id: &str,
    ) -> Result<IMMDevice, AudioError> {
        let not_found = || AudioError::DeviceNotFound {
            device_id: device_id.to_string(),
        };
        let device_id_wide: Vec<u16> = device_id.encode_utf16().chain(std::iter::once(0)).collect();

        unsafe {
            let device = enumerator
                .GetDevice(PCWSTR::from_raw(device_id_wide.as_ptr()))
                .map_err(|_| not_found())?;

            // GetDevice also resolves disabled and unplugged endpoints
            let state = device.GetState().map_err(AudioError::WindowsError)?;
            if state != DEVICE_STATE_ACTIVE {
                return Err(not_found());
            }
            Ok(device)
        }
    }

    fn default_device(
        &self,
        enumerator: &IMMDeviceEnumerator,
    ) -> Result<Option<IMMDevice>, AudioError> {
        unsafe {
            match enumerator.GetDefaultAudioEndpoint(eRender, eConsole) {
                Ok(device) => Ok(Some(device)),
                Err(_) => Ok(None),
            }
        }
    }
}

impl AudioBackend for WindowsAudioBackend {
    type Endpoint = WindowsEndpoint;
    type Subscription = NotificationRegistration;
    type ThreadContext = ComGuard;

    fn enter_thread(&self) -> Result<ComGuard, AudioError> {
        ComGuard::new()
    }

    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, AudioError> {
        let enumerator = self.enumerator()?;
        unsafe {
            let collection = enumerator
                .EnumAudioEndpoints(eRender, DEVICE_STATE_ACTIVE)
                .map_err(AudioError::EnumerationFailed)?;

            let count = collection
                .GetCount()
                .map_err(AudioError::EnumerationFailed)?;

            let mut devices = Vec::with_capacity(count as usize);
            for i in 0..count {
                let device = collection.Item(i).map_err(AudioError::EnumerationFailed)?;
                let id = device_id(&device)?;
                let name = device_name(&device).unwrap_or_else(|| "Unknown".to_string());
                devices.push(DeviceDescriptor::new(id, name));
            }

            Ok(devices)
        }
    }

    fn default_device_id(&self) -> Result<Option<String>, AudioError> {
        let enumerator = self.enumerator()?;
        self.default_device(&enumerator)?
            .map(|device| device_id(&device))
            .transpose()
    }

    fn activate(&self, device_id: &str) -> Result<WindowsEndpoint, AudioError> {
        let enumerator = self.enumerator()?;
        let device = self.device(&enumerator, device_id)?;
        WindowsEndpoint::activate(&device)
    }

    fn activate_default(&self) -> Result<(String, WindowsEndpoint), AudioError> {
        let enumerator = self.enumerator()?;
        let device = self
            .default_device(&enumerator)?
            .ok_or(AudioError::NoDefaultDevice)?;
        let id = device_id(&device)?;
        let endpoint = WindowsEndpoint::activate(&device)?;
        Ok((id, endpoint))
    }

    fn subscribe(&self, events: Sender<DeviceEvent>) -> Result<NotificationRegistration, AudioError> {
        let enumerator = self.enumerator()?;
        DeviceNotificationClient::new(events).register(enumerator)
    }
}

/// Read a device's id, releasing the COM-allocated string.
fn device_id(device: &IMMDevice) -> Result<String, AudioError> {
    unsafe {
        let raw: PWSTR = device.GetId().map_err(AudioError::EnumerationFailed)?;
        let id = raw
            .to_string()
            .map_err(|e| AudioError::StringConversion(e.to_string()));
        CoTaskMemFree(Some(raw.0 as *const _));
        id
    }
}

/// Get the friendly name of a device from its property store.
fn device_name(device: &IMMDevice) -> Option<String> {
    unsafe {
        let props: IPropertyStore = device.OpenPropertyStore(STGM(0)).ok()?;

        let key = PROPERTYKEY {
            fmtid: DEVPKEY_Device_FriendlyName.fmtid,
            pid: DEVPKEY_Device_FriendlyName.pid,
        };
        let value = props.GetValue(&key).ok()?;

        let name = value.to_string();
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }
}
