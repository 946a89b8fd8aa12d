//! Low-level keyboard hook key source.
//!
//! The hook procedure runs on the thread that installed it, inside its
//! message loop. It only reposts bound key presses to that same thread, so
//! callbacks run after the hook has returned. The thread joins the
//! multithreaded apartment for as long as the loop runs.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};
use windows::Win32::Foundation::{HINSTANCE, LPARAM, LRESULT, WPARAM};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, DispatchMessageW, GetMessageW, PeekMessageW, PostThreadMessageW,
    SetWindowsHookExW, UnhookWindowsHookEx, HC_ACTION, HHOOK, KBDLLHOOKSTRUCT, MSG, PM_NOREMOVE,
    WH_KEYBOARD_LL, WM_APP, WM_KEYDOWN, WM_QUIT, WM_SYSKEYDOWN, WM_USER,
};

use super::listener::{KeyEventSource, KeyEventStopper};
use super::{HotkeyError, HotkeyKey};
use crate::audio::ComGuard;

/// Thread message carrying a pressed virtual-key code in `wParam`.
const WM_HOTKEY_PRESSED: u32 = WM_APP + 1;

#[derive(Default)]
struct HookState {
    thread_id: AtomicU32,
    stopped: AtomicBool,
}

/// `WH_KEYBOARD_LL` hook with its own message loop.
#[derive(Default)]
pub struct LowLevelKeyboardHook {
    state: Arc<HookState>,
}

impl LowLevelKeyboardHook {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct HookStopper {
    state: Arc<HookState>,
}

impl KeyEventStopper for HookStopper {
    fn stop(&self) {
        self.state.stopped.store(true, Ordering::SeqCst);
        let thread_id = self.state.thread_id.load(Ordering::SeqCst);
        if thread_id != 0 {
            unsafe {
                if let Err(err) = PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) {
                    warn!(%err, "failed to wake hotkey thread");
                }
            }
        }
    }
}

struct InstalledHook(HHOOK);

impl Drop for InstalledHook {
    fn drop(&mut self) {
        unsafe {
            if let Err(err) = UnhookWindowsHookEx(self.0) {
                warn!(%err, "failed to remove keyboard hook");
            }
        }
    }
}

impl KeyEventSource for LowLevelKeyboardHook {
    type Stopper = HookStopper;

    fn stopper(&self) -> HookStopper {
        HookStopper {
            state: Arc::clone(&self.state),
        }
    }

    fn run(self, on_key: &mut dyn FnMut(u32)) -> Result<(), HotkeyError> {
        // Callbacks adjust the endpoint volume from this thread
        let _com = ComGuard::new().map_err(HotkeyError::ComInitFailed)?;

        unsafe {
            let mut msg = MSG::default();

            // Create the message queue before the stopper can post to it
            let _ = PeekMessageW(&mut msg, None, WM_USER, WM_USER, PM_NOREMOVE);
            self.state
                .thread_id
                .store(GetCurrentThreadId(), Ordering::SeqCst);
            if self.state.stopped.load(Ordering::SeqCst) {
                return Ok(());
            }

            let module = GetModuleHandleW(None).map_err(HotkeyError::HookInstallFailed)?;
            let hook = SetWindowsHookExW(
                WH_KEYBOARD_LL,
                Some(keyboard_proc),
                HINSTANCE::from(module),
                0,
            )
            .map_err(HotkeyError::HookInstallFailed)?;
            let _installed = InstalledHook(hook);
            debug!("keyboard hook installed");

            loop {
                match GetMessageW(&mut msg, None, 0, 0).0 {
                    0 => return Ok(()),
                    -1 => return Err(HotkeyError::EventLoop("GetMessageW failed".to_string())),
                    _ => {}
                }
                if msg.message == WM_HOTKEY_PRESSED {
                    on_key(msg.wParam.0 as u32);
                } else {
                    DispatchMessageW(&msg);
                }
            }
        }
    }
}

unsafe extern "system" fn keyboard_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code == HC_ACTION as i32 {
        let message = wparam.0 as u32;
        if message == WM_KEYDOWN || message == WM_SYSKEYDOWN {
            let info = &*(lparam.0 as *const KBDLLHOOKSTRUCT);
            if HotkeyKey::from_vk_code(info.vkCode).is_some() {
                let _ = PostThreadMessageW(
                    GetCurrentThreadId(),
                    WM_HOTKEY_PRESSED,
                    WPARAM(info.vkCode as usize),
                    LPARAM(0),
                );
            }
        }
    }
    CallNextHookEx(None, code, wparam, lparam)
}
