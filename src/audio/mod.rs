//! Audio module for master volume control.
//!
//! The controller and data models are platform independent; the Windows
//! Core Audio backend plugs in through the traits in [`backend`].

pub mod backend;
pub mod controller;
pub mod device;
#[cfg(windows)]
pub mod enumerator;
#[cfg(windows)]
pub mod notifications;
#[cfg(windows)]
pub mod volume;

#[cfg(test)]
pub(crate) mod fake;

pub use backend::{AudioBackend, EndpointVolume};
pub use controller::VolumeController;
pub use device::{
    AudioError, DeviceDescriptor, DeviceEvent, DeviceState, SYNTHETIC_DEFAULT_ID,
    SYNTHETIC_DEFAULT_NAME,
};
#[cfg(windows)]
pub use enumerator::{ComGuard, WindowsAudioBackend};
