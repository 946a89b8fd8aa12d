//! Shutdown signalling.
//!
//! Console control events (Ctrl+C, console close, logoff, system shutdown)
//! arrive on a thread the OS creates. Release builds have no console, so
//! logoff and system shutdown are also caught by a hidden window on its own
//! thread. Both handlers only raise a flag and wait; the main loop polls the
//! flag and performs the actual shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// How long a session end may hold the process open while the main loop
/// cleans up. Windows terminates the process once the handler returns.
#[cfg(windows)]
const CLEANUP_GRACE: Duration = Duration::from_secs(2);

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);
static SHUTDOWN_COMPLETE: AtomicBool = AtomicBool::new(false);

/// Ask the main loop to exit.
pub fn request_shutdown() {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

/// Called by the main loop once cleanup has finished.
pub fn mark_shutdown_complete() {
    SHUTDOWN_COMPLETE.store(true, Ordering::SeqCst);
}

pub fn shutdown_complete() -> bool {
    SHUTDOWN_COMPLETE.load(Ordering::SeqCst)
}

/// Block until the main loop reports cleanup done or `grace` has passed.
/// Returns whether cleanup finished.
pub fn wait_for_cleanup(grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    while !shutdown_complete() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(20));
    }
    true
}

#[cfg(windows)]
mod console {
    use tracing::info;
    use windows::Win32::Foundation::BOOL;
    use windows::Win32::System::Console::{
        SetConsoleCtrlHandler, CTRL_BREAK_EVENT, CTRL_CLOSE_EVENT, CTRL_C_EVENT,
        CTRL_LOGOFF_EVENT, CTRL_SHUTDOWN_EVENT,
    };

    unsafe extern "system" fn handler(ctrl_type: u32) -> BOOL {
        match ctrl_type {
            CTRL_C_EVENT | CTRL_BREAK_EVENT => {
                info!(ctrl_type, "console interrupt, shutting down");
                super::request_shutdown();
                BOOL(1)
            }
            CTRL_CLOSE_EVENT | CTRL_LOGOFF_EVENT | CTRL_SHUTDOWN_EVENT => {
                info!(ctrl_type, "console closing, shutting down");
                super::request_shutdown();
                super::wait_for_cleanup(super::CLEANUP_GRACE);
                BOOL(1)
            }
            _ => BOOL(0),
        }
    }

    /// Route console control events to [`request_shutdown`](super::request_shutdown).
    pub fn install_console_handler() -> windows::core::Result<()> {
        unsafe { SetConsoleCtrlHandler(Some(handler), true) }
    }
}

#[cfg(windows)]
mod session {
    use std::thread;

    use tracing::{debug, info, warn};
    use windows::core::{w, PCWSTR};
    use windows::Win32::Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, WPARAM};
    use windows::Win32::System::LibraryLoader::GetModuleHandleW;
    use windows::Win32::UI::WindowsAndMessaging::{
        CreateWindowExW, DefWindowProcW, DispatchMessageW, GetMessageW, RegisterClassW,
        TranslateMessage, MSG, WINDOW_EX_STYLE, WM_ENDSESSION, WM_QUERYENDSESSION, WNDCLASSW,
        WS_OVERLAPPED,
    };

    const CLASS_NAME: PCWSTR = w!("SoundMasterSession");

    unsafe extern "system" fn session_wndproc(
        hwnd: HWND,
        msg: u32,
        wparam: WPARAM,
        lparam: LPARAM,
    ) -> LRESULT {
        match msg {
            WM_QUERYENDSESSION => LRESULT(1),
            WM_ENDSESSION => {
                if wparam.0 != 0 {
                    info!("session ending, shutting down");
                    super::request_shutdown();
                    super::wait_for_cleanup(super::CLEANUP_GRACE);
                }
                LRESULT(0)
            }
            _ => DefWindowProcW(hwnd, msg, wparam, lparam),
        }
    }

    /// Start a thread owning a hidden top-level window that turns logoff and
    /// system shutdown into a shutdown request.
    pub fn spawn_session_watcher() -> std::io::Result<()> {
        thread::Builder::new()
            .name("session-watch".to_string())
            .spawn(|| {
                if let Err(err) = run() {
                    warn!(%err, "session end notifications unavailable");
                }
            })?;
        Ok(())
    }

    fn run() -> windows::core::Result<()> {
        unsafe {
            let instance = HINSTANCE::from(GetModuleHandleW(None)?);
            let wc = WNDCLASSW {
                hInstance: instance,
                lpszClassName: CLASS_NAME,
                lpfnWndProc: Some(session_wndproc),
                ..Default::default()
            };
            if RegisterClassW(&wc) == 0 {
                return Err(windows::core::Error::from_win32());
            }

            // Never shown; hidden top-level windows still receive session messages
            let _hwnd = CreateWindowExW(
                WINDOW_EX_STYLE(0),
                CLASS_NAME,
                PCWSTR::null(),
                WS_OVERLAPPED,
                0,
                0,
                0,
                0,
                None,
                None,
                instance,
                None,
            )?;
            debug!("session watcher started");

            let mut msg = MSG::default();
            while GetMessageW(&mut msg, None, 0, 0).0 > 0 {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
        Ok(())
    }
}

#[cfg(windows)]
pub use console::install_console_handler;
#[cfg(windows)]
pub use session::spawn_session_watcher;
