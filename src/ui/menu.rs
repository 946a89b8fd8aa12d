//! Tray menu model.
//!
//! Describes what the tray menu shows and what its items do, without any
//! dependency on the tray toolkit. Item ids are plain strings so the Windows
//! tray can hand them back verbatim.

use crate::audio::DeviceDescriptor;

/// Volume steps offered in the menu, in percent.
pub const VOLUME_STEP_CHOICES: [u32; 4] = [1, 2, 5, 10];

/// Notification durations offered in the menu, in milliseconds.
pub const DURATION_CHOICES_MS: [u64; 5] = [500, 700, 1000, 1500, 2000];

const DEVICE_PREFIX: &str = "device:";
const STEP_PREFIX: &str = "step:";
const DURATION_PREFIX: &str = "duration:";
const TOGGLE_MUTE_ID: &str = "toggle-mute";
const EXIT_ID: &str = "exit";

/// Action requested from the tray.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrayCommand {
    SelectDevice(String),
    SetVolumeStep(u32),
    SetNotificationDuration(u64),
    ToggleMute,
    Exit,
}

impl TrayCommand {
    /// Stable menu item id for this command.
    pub fn menu_id(&self) -> String {
        match self {
            TrayCommand::SelectDevice(id) => format!("{DEVICE_PREFIX}{id}"),
            TrayCommand::SetVolumeStep(step) => format!("{STEP_PREFIX}{step}"),
            TrayCommand::SetNotificationDuration(ms) => format!("{DURATION_PREFIX}{ms}"),
            TrayCommand::ToggleMute => TOGGLE_MUTE_ID.to_string(),
            TrayCommand::Exit => EXIT_ID.to_string(),
        }
    }

    /// Decode a menu item id. Unknown ids yield `None`.
    pub fn from_menu_id(id: &str) -> Option<Self> {
        if let Some(device_id) = id.strip_prefix(DEVICE_PREFIX) {
            return Some(TrayCommand::SelectDevice(device_id.to_string()));
        }
        if let Some(step) = id.strip_prefix(STEP_PREFIX) {
            return step.parse().ok().map(TrayCommand::SetVolumeStep);
        }
        if let Some(ms) = id.strip_prefix(DURATION_PREFIX) {
            return ms.parse().ok().map(TrayCommand::SetNotificationDuration);
        }
        match id {
            TOGGLE_MUTE_ID => Some(TrayCommand::ToggleMute),
            EXIT_ID => Some(TrayCommand::Exit),
            _ => None,
        }
    }
}

/// One checkable menu entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuChoice {
    pub label: String,
    pub command: TrayCommand,
    pub checked: bool,
}

/// Everything the tray needs to render its menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuModel {
    pub devices: Vec<MenuChoice>,
    pub volume_steps: Vec<MenuChoice>,
    pub durations: Vec<MenuChoice>,
}

impl MenuModel {
    /// Build the menu for the given device list and settings. The bound device
    /// is checked; without one, the default device is.
    pub fn build(
        devices: &[DeviceDescriptor],
        bound_device_id: Option<&str>,
        volume_step: u32,
        duration_ms: u64,
    ) -> Self {
        let bound_listed = bound_device_id
            .is_some_and(|bound| devices.iter().any(|device| device.id == bound));

        let devices = devices
            .iter()
            .map(|device| {
                let checked = if bound_listed {
                    bound_device_id == Some(device.id.as_str())
                } else {
                    device.is_default
                };
                let label = if device.is_default {
                    format!("{} (default)", device.name)
                } else {
                    device.name.clone()
                };
                MenuChoice {
                    label,
                    command: TrayCommand::SelectDevice(device.id.clone()),
                    checked,
                }
            })
            .collect();

        let volume_steps = VOLUME_STEP_CHOICES
            .iter()
            .map(|&step| MenuChoice {
                label: format!("{step}%"),
                command: TrayCommand::SetVolumeStep(step),
                checked: step == volume_step,
            })
            .collect();

        let durations = DURATION_CHOICES_MS
            .iter()
            .map(|&ms| MenuChoice {
                label: format_duration(ms),
                command: TrayCommand::SetNotificationDuration(ms),
                checked: ms == duration_ms,
            })
            .collect();

        Self {
            devices,
            volume_steps,
            durations,
        }
    }
}

fn format_duration(ms: u64) -> String {
    if ms % 1000 == 0 {
        format!("{} s", ms / 1000)
    } else if ms > 1000 {
        format!("{:.1} s", ms as f64 / 1000.0)
    } else {
        format!("{ms} ms")
    }
}

/// Tooltip text for the tray icon.
pub fn tooltip(level: u8, muted: bool) -> String {
    if muted {
        format!("SoundMaster: {level}% (muted)")
    } else {
        format!("SoundMaster: {level}%")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn devices() -> Vec<DeviceDescriptor> {
        let mut speakers = DeviceDescriptor::new("{spk}", "Speakers");
        speakers.is_default = true;
        vec![speakers, DeviceDescriptor::new("{hp}", "Headphones")]
    }

    #[test]
    fn menu_ids_decode_to_commands() {
        for command in [
            TrayCommand::SelectDevice("{0.0.0.00000000}.{abc:def}".to_string()),
            TrayCommand::SetVolumeStep(5),
            TrayCommand::SetNotificationDuration(1500),
            TrayCommand::ToggleMute,
            TrayCommand::Exit,
        ] {
            assert_eq!(TrayCommand::from_menu_id(&command.menu_id()), Some(command));
        }
    }

    #[test]
    fn malformed_ids_are_rejected() {
        assert_eq!(TrayCommand::from_menu_id("step:lots"), None);
        assert_eq!(TrayCommand::from_menu_id("duration:"), None);
        assert_eq!(TrayCommand::from_menu_id("something-else"), None);
    }

    #[test]
    fn bound_device_is_checked() {
        let model = MenuModel::build(&devices(), Some("{hp}"), 2, 700);
        let checked: Vec<_> = model.devices.iter().filter(|c| c.checked).collect();
        assert_eq!(checked.len(), 1);
        assert_eq!(checked[0].command, TrayCommand::SelectDevice("{hp}".to_string()));
        assert_eq!(model.devices[0].label, "Speakers (default)");
    }

    #[test]
    fn default_is_checked_when_bound_device_is_not_listed() {
        let model = MenuModel::build(&devices(), Some("{gone}"), 2, 700);
        assert!(model.devices[0].checked);
        assert!(!model.devices[1].checked);
    }

    #[test]
    fn current_settings_are_checked() {
        let model = MenuModel::build(&devices(), None, 5, 1500);
        let step: Vec<_> = model.volume_steps.iter().filter(|c| c.checked).collect();
        assert_eq!(step.len(), 1);
        assert_eq!(step[0].command, TrayCommand::SetVolumeStep(5));

        let duration: Vec<_> = model.durations.iter().filter(|c| c.checked).collect();
        assert_eq!(duration.len(), 1);
        assert_eq!(duration[0].label, "1.5 s");
    }

    #[test]
    fn unlisted_setting_checks_nothing() {
        let model = MenuModel::build(&devices(), None, 3, 900);
        assert!(model.volume_steps.iter().all(|c| !c.checked));
        assert!(model.durations.iter().all(|c| !c.checked));
    }

    #[test]
    fn tooltip_mentions_mute() {
        assert_eq!(tooltip(42, false), "SoundMaster: 42%");
        assert_eq!(tooltip(0, true), "SoundMaster: 0% (muted)");
    }
}
