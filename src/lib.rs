//! SoundMaster - Library
//!
//! A system tray utility for controlling the Windows master volume with
//! global hotkeys.
//!
//! ## Features
//!
//! - F23/F24 lower and raise the master volume by a configurable step
//! - Transient on-screen overlay showing the new level
//! - Follows default playback device changes and device removal
//! - Tray menu for output device, volume step and overlay duration
//! - Settings persisted as JSON

pub mod app;
pub mod audio;
pub mod config;
pub mod hotkey;
pub mod platform;
pub mod ui;

pub use app::{App, CommandOutcome, VolumeDirection};
pub use audio::{AudioBackend, AudioError, DeviceDescriptor, DeviceEvent, VolumeController};
pub use config::{Config, ConfigError, ConfigStore};
pub use hotkey::{HotkeyError, HotkeyKey, HotkeyListener};
pub use ui::{Overlay, OverlayError, TrayCommand};
