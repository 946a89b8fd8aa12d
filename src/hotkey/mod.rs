//! Global hotkeys.
//!
//! A background listener maps fixed function keys to callbacks. Key events
//! come from a [`KeyEventSource`]; on Windows that is a low-level keyboard
//! hook.

#[cfg(windows)]
pub mod hook;
pub mod listener;

use std::fmt;
use thiserror::Error;

#[cfg(windows)]
pub use hook::LowLevelKeyboardHook;
pub use listener::{HotkeyListener, KeyEventSource, KeyEventStopper};

/// Virtual-key code of F23.
pub const VK_F23: u32 = 0x86;
/// Virtual-key code of F24.
pub const VK_F24: u32 = 0x87;

/// Keys the listener can bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HotkeyKey {
    F23,
    F24,
}

impl HotkeyKey {
    pub const ALL: [HotkeyKey; 2] = [HotkeyKey::F23, HotkeyKey::F24];

    pub const fn vk_code(self) -> u32 {
        match self {
            HotkeyKey::F23 => VK_F23,
            HotkeyKey::F24 => VK_F24,
        }
    }

    pub fn from_vk_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.vk_code() == code)
    }
}

impl fmt::Display for HotkeyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HotkeyKey::F23 => f.write_str("F23"),
            HotkeyKey::F24 => f.write_str("F24"),
        }
    }
}

/// Hotkey listener error types.
#[derive(Debug, Error)]
pub enum HotkeyError {
    #[error("Failed to spawn hotkey thread: {0}")]
    SpawnFailed(#[from] std::io::Error),

    #[cfg(windows)]
    #[error("Failed to install keyboard hook: {0}")]
    HookInstallFailed(#[source] windows::core::Error),

    #[cfg(windows)]
    #[error("Failed to enter COM on the hotkey thread: {0}")]
    ComInitFailed(#[source] crate::audio::AudioError),

    #[error("Key event loop failed: {0}")]
    EventLoop(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_map_to_function_key_codes() {
        assert_eq!(HotkeyKey::F23.vk_code(), 0x86);
        assert_eq!(HotkeyKey::F24.vk_code(), 0x87);
        assert_eq!(HotkeyKey::from_vk_code(0x87), Some(HotkeyKey::F24));
        assert_eq!(HotkeyKey::from_vk_code(0x41), None);
    }

    #[test]
    fn keys_display_as_names() {
        assert_eq!(HotkeyKey::F23.to_string(), "F23");
        assert_eq!(HotkeyKey::F24.to_string(), "F24");
    }
}
