//! Application wiring and lifecycle.
//!
//! Connects hotkeys to volume changes, volume changes to the overlay, and
//! tray commands to the controller and settings.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::audio::{AudioBackend, VolumeController, SYNTHETIC_DEFAULT_ID};
use crate::config::ConfigStore;
use crate::hotkey::{HotkeyError, HotkeyKey, HotkeyListener, KeyEventSource};
use crate::ui::{MenuModel, Overlay, TrayCommand};

/// Which way a hotkey moves the volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeDirection {
    Up,
    Down,
}

/// What the event loop should do after a tray command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Continue,
    Exit,
}

/// The pieces a volume hotkey needs, shareable with the listener thread.
struct VolumeKeys<B: AudioBackend> {
    controller: Arc<VolumeController<B>>,
    overlay: Arc<Overlay>,
    config: Arc<ConfigStore>,
}

impl<B: AudioBackend> Clone for VolumeKeys<B> {
    fn clone(&self) -> Self {
        Self {
            controller: Arc::clone(&self.controller),
            overlay: Arc::clone(&self.overlay),
            config: Arc::clone(&self.config),
        }
    }
}

impl<B: AudioBackend> VolumeKeys<B> {
    fn adjust(&self, direction: VolumeDirection) -> u8 {
        let step = self.config.volume_step();
        match direction {
            VolumeDirection::Up => self.controller.volume_up(step),
            VolumeDirection::Down => self.controller.volume_down(step),
        };
        let level = self.controller.get_volume();
        debug!(?direction, step, level, "volume adjusted");
        self.overlay.show_volume_notification(u32::from(level));
        level
    }
}

/// Running application.
pub struct App<B: AudioBackend> {
    keys: VolumeKeys<B>,
    hotkeys: HotkeyListener,
    shut_down: AtomicBool,
}

impl<B: AudioBackend> App<B> {
    pub fn new(
        controller: Arc<VolumeController<B>>,
        overlay: Arc<Overlay>,
        config: Arc<ConfigStore>,
    ) -> Self {
        Self {
            keys: VolumeKeys {
                controller,
                overlay,
                config,
            },
            hotkeys: HotkeyListener::new(),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn controller(&self) -> &VolumeController<B> {
        &self.keys.controller
    }

    pub fn config(&self) -> &ConfigStore {
        &self.keys.config
    }

    /// Step the volume, show the resulting level and return it.
    pub fn adjust_volume(&self, direction: VolumeDirection) -> u8 {
        self.keys.adjust(direction)
    }

    /// Bind F23 to volume down and F24 to volume up.
    pub fn bind_hotkeys(&self) {
        for (key, direction) in [
            (HotkeyKey::F23, VolumeDirection::Down),
            (HotkeyKey::F24, VolumeDirection::Up),
        ] {
            let keys = self.keys.clone();
            self.hotkeys.register(key, move || {
                keys.adjust(direction);
            });
        }
        info!("volume hotkeys bound: F23 down, F24 up");
    }

    /// Start listening for hotkeys from `source`.
    pub fn start_hotkeys<S: KeyEventSource>(&self, source: S) -> Result<(), HotkeyError> {
        self.hotkeys.start(source)
    }

    /// Apply a tray menu command.
    pub fn handle_command(&self, command: TrayCommand) -> CommandOutcome {
        debug!(?command, "tray command");
        match command {
            TrayCommand::SelectDevice(device_id) => {
                if self.keys.controller.select_device(&device_id) {
                    let selected = if device_id == SYNTHETIC_DEFAULT_ID {
                        Value::Null
                    } else {
                        json!(device_id)
                    };
                    self.persist("selected_device_id", selected);
                }
            }
            TrayCommand::SetVolumeStep(step) => {
                self.persist("volume_step", json!(step));
            }
            TrayCommand::SetNotificationDuration(ms) => {
                if self.persist("notification_duration", json!(ms)) {
                    self.keys.overlay.set_duration(Duration::from_millis(ms));
                }
            }
            TrayCommand::ToggleMute => {
                self.keys.controller.toggle_mute();
            }
            TrayCommand::Exit => {
                info!("exit requested from tray");
                return CommandOutcome::Exit;
            }
        }
        CommandOutcome::Continue
    }

    /// Current tray menu contents.
    pub fn menu_model(&self) -> MenuModel {
        let devices = self.keys.controller.list_devices();
        let bound = self.keys.controller.bound_device_id();
        let config = self.keys.config.snapshot();
        MenuModel::build(
            &devices,
            bound.as_deref(),
            config.volume_step,
            config.notification_duration,
        )
    }

    /// Current level and mute state, for the tray tooltip.
    pub fn status(&self) -> (u8, bool) {
        (
            self.keys.controller.get_volume(),
            self.keys.controller.is_muted(),
        )
    }

    /// Stop hotkeys and the overlay. Safe to call more than once.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("shutting down");
        self.hotkeys.stop();
        self.keys.overlay.shutdown();
    }

    /// Set and save one setting. Returns whether the value was accepted.
    fn persist(&self, key: &str, value: Value) -> bool {
        if let Err(err) = self.keys.config.set(key, value) {
            warn!(key, %err, "rejected setting");
            return false;
        }
        if let Err(err) = self.keys.config.save() {
            warn!(key, %err, "failed to save settings");
        }
        true
    }
}

impl<B: AudioBackend> Drop for App<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
