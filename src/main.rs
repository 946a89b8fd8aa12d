//! SoundMaster entry point.

#![cfg_attr(all(windows, not(debug_assertions)), windows_subsystem = "windows")]

use tracing_subscriber::EnvFilter;

fn main() {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting SoundMaster");

    if let Err(err) = run() {
        tracing::error!("{err:#}");
        std::process::exit(1);
    }

    tracing::info!("SoundMaster shut down cleanly");
}

#[cfg(windows)]
fn run() -> anyhow::Result<()> {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use anyhow::Context;
    use soundmaster_rs::app::{App, CommandOutcome};
    use soundmaster_rs::audio::{ComGuard, VolumeController, WindowsAudioBackend};
    use soundmaster_rs::config::{default_config_path, ConfigStore};
    use soundmaster_rs::hotkey::LowLevelKeyboardHook;
    use soundmaster_rs::platform::signals;
    use soundmaster_rs::ui::{menu, Overlay, TrayManager, Win32OverlaySurface};
    use windows::Win32::UI::WindowsAndMessaging::{
        DispatchMessageW, PeekMessageW, TranslateMessage, MSG, PM_REMOVE, WM_QUIT,
    };

    const LOOP_INTERVAL: Duration = Duration::from_millis(50);
    const STATUS_REFRESH: Duration = Duration::from_millis(500);
    const MENU_REFRESH: Duration = Duration::from_secs(3);

    // Keeps this thread, and the process, in the multithreaded apartment.
    let _com = ComGuard::new().context("COM initialization failed")?;

    let config = Arc::new(ConfigStore::load(default_config_path()));
    let controller = VolumeController::new(
        WindowsAudioBackend::new(),
        config.selected_device_id().as_deref(),
    )
    .context("no playback device available")?;
    let overlay = Overlay::spawn(Win32OverlaySurface::new, config.notification_duration())
        .context("failed to start overlay")?;

    let app = App::new(Arc::new(controller), Arc::new(overlay), config);
    app.bind_hotkeys();
    if let Err(err) = app.start_hotkeys(LowLevelKeyboardHook::new()) {
        tracing::error!(%err, "hotkeys unavailable");
    }
    if let Err(err) = signals::install_console_handler() {
        tracing::warn!(%err, "failed to install console handler");
    }
    if let Err(err) = signals::spawn_session_watcher() {
        tracing::warn!(%err, "failed to watch for session end");
    }

    let mut tray = TrayManager::new();
    let (level, muted) = app.status();
    tray.create(app.menu_model(), &menu::tooltip(level, muted), muted)
        .context("failed to create tray icon")?;

    let mut last_status = Instant::now();
    let mut last_menu = Instant::now();
    while !signals::shutdown_requested() {
        unsafe {
            let mut msg = MSG::default();
            while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
                if msg.message == WM_QUIT {
                    signals::request_shutdown();
                }
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }

        let mut changed = false;
        while let Some(command) = tray.poll_command() {
            if app.handle_command(command) == CommandOutcome::Exit {
                signals::request_shutdown();
            }
            changed = true;
        }

        if changed || last_status.elapsed() >= STATUS_REFRESH {
            let (level, muted) = app.status();
            if let Err(err) = tray.set_status(&menu::tooltip(level, muted), muted) {
                tracing::warn!(%err, "failed to update tray status");
            }
            last_status = Instant::now();
        }
        if changed || last_menu.elapsed() >= MENU_REFRESH {
            if let Err(err) = tray.set_menu(app.menu_model()) {
                tracing::warn!(%err, "failed to update tray menu");
            }
            last_menu = Instant::now();
        }

        thread::sleep(LOOP_INTERVAL);
    }

    app.shutdown();
    tray.destroy();
    signals::mark_shutdown_complete();
    Ok(())
}

#[cfg(not(windows))]
fn run() -> anyhow::Result<()> {
    anyhow::bail!("SoundMaster requires Windows Core Audio and only runs on Windows")
}
