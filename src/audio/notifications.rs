//! Device change notifications using IMMNotificationClient.
//!
//! The callback runs on a thread owned by the audio service. It does nothing
//! but translate the notification and post it to the controller's channel.

use super::device::{AudioError, DeviceEvent, DeviceState};
use std::sync::mpsc::Sender;
use tracing::warn;
use windows::core::{implement, PCWSTR};
use windows::Win32::Media::Audio::{
    eConsole, eRender, EDataFlow, ERole, IMMDeviceEnumerator, IMMNotificationClient,
    IMMNotificationClient_Impl, DEVICE_STATE, DEVICE_STATE_ACTIVE, DEVICE_STATE_DISABLED,
    DEVICE_STATE_NOTPRESENT, DEVICE_STATE_UNPLUGGED,
};
use windows::Win32::UI::Shell::PropertiesSystem::PROPERTYKEY;
// The implement macro expands to paths under windows_core
#[allow(unused_imports)]
use windows_core;

/// Notification client that forwards render-device events to a channel.
#[implement(IMMNotificationClient)]
pub struct DeviceNotificationClient {
    sender: Sender<DeviceEvent>,
}

impl DeviceNotificationClient {
    pub fn new(sender: Sender<DeviceEvent>) -> Self {
        Self { sender }
    }

    /// Register with `enumerator`. Events flow until the returned
    /// registration is dropped.
    pub fn register(
        self,
        enumerator: IMMDeviceEnumerator,
    ) -> Result<NotificationRegistration, AudioError> {
        unsafe {
            let client: IMMNotificationClient = self.into();
            enumerator
                .RegisterEndpointNotificationCallback(&client)
                .map_err(AudioError::NotificationFailed)?;
            Ok(NotificationRegistration { enumerator, client })
        }
    }

    fn send(&self, event: DeviceEvent) {
        // The controller is gone once the receiver hangs up
        let _ = self.sender.send(event);
    }

    fn convert_state(state: DEVICE_STATE) -> DeviceState {
        match state {
            DEVICE_STATE_ACTIVE => DeviceState::Active,
            DEVICE_STATE_DISABLED => DeviceState::Disabled,
            DEVICE_STATE_UNPLUGGED => DeviceState::Unplugged,
            DEVICE_STATE_NOTPRESENT => DeviceState::NotPresent,
            _ => DeviceState::NotPresent,
        }
    }
}

impl IMMNotificationClient_Impl for DeviceNotificationClient_Impl {
    fn OnDeviceStateChanged(
        &self,
        pwstrdeviceid: &PCWSTR,
        dwnewstate: DEVICE_STATE,
    ) -> windows::core::Result<()> {
        unsafe {
            if let Ok(id) = pwstrdeviceid.to_string() {
                self.send(DeviceEvent::DeviceStateChanged {
                    device_id: id,
                    new_state: DeviceNotificationClient::convert_state(dwnewstate),
                });
            }
        }
        Ok(())
    }

    fn OnDeviceAdded(&self, pwstrdeviceid: &PCWSTR) -> windows::core::Result<()> {
        unsafe {
            if let Ok(id) = pwstrdeviceid.to_string() {
                self.send(DeviceEvent::DeviceAdded { device_id: id });
            }
        }
        Ok(())
    }

    fn OnDeviceRemoved(&self, pwstrdeviceid: &PCWSTR) -> windows::core::Result<()> {
        unsafe {
            if let Ok(id) = pwstrdeviceid.to_string() {
                self.send(DeviceEvent::DeviceRemoved { device_id: id });
            }
        }
        Ok(())
    }

    fn OnDefaultDeviceChanged(
        &self,
        flow: EDataFlow,
        role: ERole,
        pwstrdefaultdeviceid: &PCWSTR,
    ) -> windows::core::Result<()> {
        // Only the console role of the render flow drives the binding
        if flow != eRender || role != eConsole {
            return Ok(());
        }

        unsafe {
            let device_id = if pwstrdefaultdeviceid.is_null() {
                None
            } else {
                pwstrdefaultdeviceid.to_string().ok()
            };
            self.send(DeviceEvent::DefaultDeviceChanged { device_id });
        }
        Ok(())
    }

    fn OnPropertyValueChanged(
        &self,
        _pwstrdeviceid: &PCWSTR,
        _key: &PROPERTYKEY,
    ) -> windows::core::Result<()> {
        Ok(())
    }
}

/// Live notification registration. Unregisters on drop.
pub struct NotificationRegistration {
    enumerator: IMMDeviceEnumerator,
    client: IMMNotificationClient,
}

// SAFETY: the MMDevice enumerator and our client are free-threaded; the
// registration is only dropped from threads inside the multithreaded apartment.
unsafe impl Send for NotificationRegistration {}

impl Drop for NotificationRegistration {
    fn drop(&mut self) {
        unsafe {
            if let Err(err) = self
                .enumerator
                .UnregisterEndpointNotificationCallback(&self.client)
            {
                warn!(%err, "failed to unregister device notifications");
            }
        }
    }
}
