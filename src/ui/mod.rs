//! UI module for the tray icon and the volume overlay.

pub mod menu;
pub mod overlay;
#[cfg(windows)]
pub mod overlay_window;
#[cfg(windows)]
pub mod tray;

pub use menu::{MenuChoice, MenuModel, TrayCommand};
pub use overlay::{Indicator, IndicatorState, Overlay, OverlayError, OverlaySurface};
#[cfg(windows)]
pub use overlay_window::Win32OverlaySurface;
#[cfg(windows)]
pub use tray::{TrayError, TrayManager};
