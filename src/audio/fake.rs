//! In-memory audio backend for tests.

use std::collections::BTreeMap;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use super::backend::{AudioBackend, EndpointVolume};
use super::device::{AudioError, DeviceDescriptor, DeviceEvent};

#[derive(Debug, Clone)]
struct FakeDevice {
    name: String,
    scalar: f32,
    muted: bool,
}

#[derive(Default)]
struct State {
    devices: BTreeMap<String, FakeDevice>,
    default_id: Option<String>,
    events: Option<Sender<DeviceEvent>>,
    fail_endpoint_calls: bool,
    fail_enumeration: bool,
    fail_subscribe: bool,
    fail_default_activation: bool,
    call_delay: Duration,
}

/// Shared fake. Clones observe and control the same simulated system.
#[derive(Clone, Default)]
pub(crate) struct FakeBackend {
    state: Arc<Mutex<State>>,
}

impl FakeBackend {
    pub(crate) fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn with_devices(devices: &[(&str, &str)], default_id: &str) -> Self {
        let backend = Self::default();
        {
            let mut state = backend.state();
            for (id, name) in devices {
                state.devices.insert(
                    (*id).to_string(),
                    FakeDevice {
                        name: (*name).to_string(),
                        scalar: 0.5,
                        muted: false,
                    },
                );
            }
            state.default_id = Some(default_id.to_string());
        }
        backend
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub(crate) fn set_device_scalar(&self, device_id: &str, scalar: f32) {
        if let Some(device) = self.state().devices.get_mut(device_id) {
            device.scalar = scalar;
        }
    }

    pub(crate) fn device_scalar(&self, device_id: &str) -> Option<f32> {
        self.state().devices.get(device_id).map(|d| d.scalar)
    }

    pub(crate) fn fail_endpoint_calls(&self, fail: bool) {
        self.state().fail_endpoint_calls = fail;
    }

    pub(crate) fn fail_enumeration(&self, fail: bool) {
        self.state().fail_enumeration = fail;
    }

    pub(crate) fn fail_subscribe(&self, fail: bool) {
        self.state().fail_subscribe = fail;
    }

    /// Make activation of the default device fail, as when the system
    /// reports no usable default.
    pub(crate) fn fail_default_activation(&self, fail: bool) {
        self.state().fail_default_activation = fail;
    }

    pub(crate) fn set_call_delay(&self, delay: Duration) {
        self.state().call_delay = delay;
    }

    pub(crate) fn has_live_subscription(&self) -> bool {
        self.state().events.is_some()
    }

    /// Make `device_id` the default and notify the subscriber.
    pub(crate) fn change_default(&self, device_id: &str) {
        let mut state = self.state();
        state.default_id = Some(device_id.to_string());
        if let Some(events) = &state.events {
            let _ = events.send(DeviceEvent::DefaultDeviceChanged {
                device_id: Some(device_id.to_string()),
            });
        }
    }

    /// Report that no default playback device exists.
    pub(crate) fn clear_default(&self) {
        let mut state = self.state();
        state.default_id = None;
        if let Some(events) = &state.events {
            let _ = events.send(DeviceEvent::DefaultDeviceChanged { device_id: None });
        }
    }

    /// Unplug a device and notify the subscriber.
    pub(crate) fn remove_device(&self, device_id: &str) {
        let mut state = self.state();
        state.devices.remove(device_id);
        if state.default_id.as_deref() == Some(device_id) {
            state.default_id = state.devices.keys().next().cloned();
        }
        if let Some(events) = &state.events {
            let _ = events.send(DeviceEvent::DeviceRemoved {
                device_id: device_id.to_string(),
            });
        }
    }
}

pub(crate) struct FakeContext;

pub(crate) struct FakeSubscription {
    state: Arc<Mutex<State>>,
}

impl Drop for FakeSubscription {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.events = None;
        }
    }
}

pub(crate) struct FakeEndpoint {
    device_id: String,
    state: Arc<Mutex<State>>,
}

impl FakeEndpoint {
    fn with_device<T>(&self, f: impl FnOnce(&mut FakeDevice) -> T) -> Result<T, AudioError> {
        let delay = self.state.lock().unwrap().call_delay;
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        let mut state = self.state.lock().unwrap();
        if state.fail_endpoint_calls {
            return Err(AudioError::VolumeNotAvailable);
        }
        state
            .devices
            .get_mut(&self.device_id)
            .map(f)
            .ok_or_else(|| AudioError::DeviceNotFound {
                device_id: self.device_id.clone(),
            })
    }
}

impl EndpointVolume for FakeEndpoint {
    fn volume_scalar(&self) -> Result<f32, AudioError> {
        self.with_device(|device| device.scalar)
    }

    fn set_volume_scalar(&self, level: f32) -> Result<(), AudioError> {
        self.with_device(|device| device.scalar = level)
    }

    fn mute(&self) -> Result<bool, AudioError> {
        self.with_device(|device| device.muted)
    }

    fn set_mute(&self, muted: bool) -> Result<(), AudioError> {
        self.with_device(|device| device.muted = muted)
    }
}

impl AudioBackend for FakeBackend {
    type Endpoint = FakeEndpoint;
    type Subscription = FakeSubscription;
    type ThreadContext = FakeContext;

    fn enter_thread(&self) -> Result<FakeContext, AudioError> {
        Ok(FakeContext)
    }

    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, AudioError> {
        let state = self.state();
        if state.fail_enumeration {
            return Err(AudioError::NoDefaultDevice);
        }
        Ok(state
            .devices
            .iter()
            .map(|(id, device)| DeviceDescriptor::new(id.clone(), device.name.clone()))
            .collect())
    }

    fn default_device_id(&self) -> Result<Option<String>, AudioError> {
        Ok(self.state().default_id.clone())
    }

    fn activate(&self, device_id: &str) -> Result<FakeEndpoint, AudioError> {
        if !self.state().devices.contains_key(device_id) {
            return Err(AudioError::DeviceNotFound {
                device_id: device_id.to_string(),
            });
        }
        Ok(FakeEndpoint {
            device_id: device_id.to_string(),
            state: Arc::clone(&self.state),
        })
    }

    fn activate_default(&self) -> Result<(String, FakeEndpoint), AudioError> {
        let default_id = {
            let state = self.state();
            if state.fail_default_activation {
                return Err(AudioError::NoDefaultDevice);
            }
            state.default_id.clone().ok_or(AudioError::NoDefaultDevice)?
        };
        let endpoint = self.activate(&default_id)?;
        Ok((default_id, endpoint))
    }

    fn subscribe(&self, events: Sender<DeviceEvent>) -> Result<FakeSubscription, AudioError> {
        let mut state = self.state();
        if state.fail_subscribe {
            return Err(AudioError::NoDefaultDevice);
        }
        state.events = Some(events);
        Ok(FakeSubscription {
            state: Arc::clone(&self.state),
        })
    }
}
