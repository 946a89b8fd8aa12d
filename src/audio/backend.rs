//! Platform seams for the volume controller.
//!
//! The controller only talks to the operating system through these traits.
//! The Windows implementation lives in `enumerator`, `volume` and
//! `notifications`.

use std::sync::mpsc::Sender;

use super::device::{AudioError, DeviceDescriptor, DeviceEvent};

/// Volume control interface of one bound playback endpoint.
pub trait EndpointVolume: Send {
    /// Master volume as a scalar (0.0 to 1.0).
    fn volume_scalar(&self) -> Result<f32, AudioError>;

    /// Set the master volume scalar (0.0 to 1.0).
    fn set_volume_scalar(&self, level: f32) -> Result<(), AudioError>;

    /// Current mute state.
    fn mute(&self) -> Result<bool, AudioError>;

    /// Set the mute state.
    fn set_mute(&self, muted: bool) -> Result<(), AudioError>;
}

/// Access to the system's render endpoints.
pub trait AudioBackend: Send + Sync + 'static {
    /// Bound volume interface handed to the controller.
    type Endpoint: EndpointVolume;

    /// Keeps a device-change registration alive; dropping it unregisters.
    type Subscription: Send;

    /// Per-thread platform context (COM apartment on Windows).
    type ThreadContext;

    /// Prepare the calling thread for platform calls. The context is released
    /// when the returned value is dropped.
    fn enter_thread(&self) -> Result<Self::ThreadContext, AudioError>;

    /// Active render devices, in platform order. `is_default` is left unset.
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, AudioError>;

    /// Id of the current default render device, if there is one.
    fn default_device_id(&self) -> Result<Option<String>, AudioError>;

    /// Activate the volume interface of a specific device.
    fn activate(&self, device_id: &str) -> Result<Self::Endpoint, AudioError>;

    /// Activate the default render device, returning its id with the interface.
    fn activate_default(&self) -> Result<(String, Self::Endpoint), AudioError>;

    /// Start posting device-change events to `events`.
    fn subscribe(&self, events: Sender<DeviceEvent>) -> Result<Self::Subscription, AudioError>;
}
