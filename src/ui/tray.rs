//! System tray icon management.
//!
//! Renders a [`MenuModel`] into the tray menu and translates menu clicks
//! back into [`TrayCommand`]s.

use thiserror::Error;
use tray_icon::{
    menu::{CheckMenuItem, Menu, MenuEvent, MenuId, MenuItem, PredefinedMenuItem, Submenu},
    Icon, TrayIcon, TrayIconBuilder,
};

use super::menu::{MenuChoice, MenuModel, TrayCommand};
use crate::platform::icons::{speaker_rgba, ICON_SIZE};

/// Tray service error types.
#[derive(Debug, Error)]
pub enum TrayError {
    #[error("Failed to create tray icon: {0}")]
    CreateFailed(String),

    #[error("Failed to update tray icon: {0}")]
    UpdateFailed(String),

    #[error("Failed to load icon resource")]
    IconLoadFailed,

    #[error("Tray icon not initialized")]
    NotInitialized,

    #[error("Failed to create menu: {0}")]
    MenuFailed(String),
}

/// System tray manager.
#[derive(Default)]
pub struct TrayManager {
    tray_icon: Option<TrayIcon>,
    model: Option<MenuModel>,
    muted: bool,
}

impl TrayManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and show the tray icon.
    pub fn create(&mut self, model: MenuModel, tooltip: &str, muted: bool) -> Result<(), TrayError> {
        let icon = create_icon(muted)?;
        let menu = build_menu(&model)?;

        let tray_icon = TrayIconBuilder::new()
            .with_icon(icon)
            .with_tooltip(tooltip)
            .with_menu(Box::new(menu))
            .build()
            .map_err(|e| TrayError::CreateFailed(e.to_string()))?;

        self.tray_icon = Some(tray_icon);
        self.model = Some(model);
        self.muted = muted;
        Ok(())
    }

    /// Next menu command, if one is pending. Call this from the event loop.
    pub fn poll_command(&self) -> Option<TrayCommand> {
        let event = MenuEvent::receiver().try_recv().ok()?;
        TrayCommand::from_menu_id(&event.id.0)
    }

    /// Rebuild the menu when `model` differs from what is shown.
    pub fn set_menu(&mut self, model: MenuModel) -> Result<(), TrayError> {
        if self.model.as_ref() == Some(&model) {
            return Ok(());
        }
        let menu = build_menu(&model)?;
        let tray = self.tray_icon.as_mut().ok_or(TrayError::NotInitialized)?;
        tray.set_menu(Some(Box::new(menu)));
        self.model = Some(model);
        Ok(())
    }

    /// Update the tooltip, and the icon when the mute state changed.
    pub fn set_status(&mut self, tooltip: &str, muted: bool) -> Result<(), TrayError> {
        let icon = (muted != self.muted).then(|| create_icon(muted)).transpose()?;
        let tray = self.tray_icon.as_mut().ok_or(TrayError::NotInitialized)?;
        tray.set_tooltip(Some(tooltip))
            .map_err(|e| TrayError::UpdateFailed(e.to_string()))?;
        if let Some(icon) = icon {
            tray.set_icon(Some(icon))
                .map_err(|e| TrayError::UpdateFailed(e.to_string()))?;
            self.muted = muted;
        }
        Ok(())
    }

    /// Remove the tray icon.
    pub fn destroy(&mut self) {
        self.tray_icon = None;
        self.model = None;
    }
}

fn create_icon(muted: bool) -> Result<Icon, TrayError> {
    Icon::from_rgba(speaker_rgba(muted), ICON_SIZE, ICON_SIZE).map_err(|_| TrayError::IconLoadFailed)
}

fn build_menu(model: &MenuModel) -> Result<Menu, TrayError> {
    let menu = Menu::new();

    let devices = submenu("Output device", &model.devices)?;
    let steps = submenu("Volume step", &model.volume_steps)?;
    let durations = submenu("Notification duration", &model.durations)?;
    let mute = MenuItem::with_id(MenuId::new(TrayCommand::ToggleMute.menu_id()), "Toggle mute", true, None);
    let exit = MenuItem::with_id(MenuId::new(TrayCommand::Exit.menu_id()), "Exit", true, None);

    menu.append_items(&[
        &devices,
        &steps,
        &durations,
        &PredefinedMenuItem::separator(),
        &mute,
        &PredefinedMenuItem::separator(),
        &exit,
    ])
    .map_err(|e| TrayError::MenuFailed(e.to_string()))?;

    Ok(menu)
}

fn submenu(title: &str, choices: &[MenuChoice]) -> Result<Submenu, TrayError> {
    let submenu = Submenu::new(title, !choices.is_empty());
    for choice in choices {
        let item = CheckMenuItem::with_id(
            MenuId::new(choice.command.menu_id()),
            &choice.label,
            true,
            choice.checked,
            None,
        );
        submenu
            .append(&item)
            .map_err(|e| TrayError::MenuFailed(e.to_string()))?;
    }
    Ok(submenu)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_update_before_create_is_rejected() {
        let mut tray = TrayManager::new();
        assert!(matches!(
            tray.set_status("Volume: 50%", true),
            Err(TrayError::NotInitialized)
        ));
    }

    #[test]
    fn update_failures_are_not_reported_as_creation() {
        let err = TrayError::UpdateFailed("tooltip rejected".to_string());
        assert_eq!(err.to_string(), "Failed to update tray icon: tooltip rejected");
    }
}
