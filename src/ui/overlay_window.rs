//! Win32 overlay surface.
//!
//! A borderless, topmost, semi-transparent popup centered on the primary
//! screen that paints the volume percentage. The window is created on the
//! first update and destroyed on dismissal.

use std::sync::Once;

use tracing::{debug, warn};
use windows::core::{w, PCWSTR};
use windows::Win32::Foundation::{COLORREF, HINSTANCE, HWND, LPARAM, LRESULT, RECT, WPARAM};
use windows::Win32::Graphics::Gdi::{
    BeginPaint, CreateFontIndirectW, CreateSolidBrush, DeleteObject, DrawTextW, EndPaint,
    FillRect, InvalidateRect, SelectObject, SetBkMode, SetTextColor, DT_CENTER, DT_SINGLELINE,
    DT_VCENTER, LOGFONTW, PAINTSTRUCT, TRANSPARENT,
};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, GetClientRect,
    GetSystemMetrics, GetWindowLongPtrW, PeekMessageW, RegisterClassW, SetLayeredWindowAttributes,
    SetWindowLongPtrW, ShowWindow, TranslateMessage, GWLP_USERDATA, LWA_ALPHA, MSG, PM_REMOVE,
    SM_CXSCREEN, SM_CYSCREEN, SW_SHOWNOACTIVATE, WINDOW_EX_STYLE, WM_ERASEBKGND, WM_PAINT,
    WNDCLASSW, WS_EX_LAYERED, WS_EX_NOACTIVATE, WS_EX_TOOLWINDOW, WS_EX_TOPMOST, WS_POPUP,
};

use super::overlay::{OverlayError, OverlaySurface};

const CLASS_NAME: PCWSTR = w!("SoundMasterOverlay");
const WIDTH: i32 = 220;
const HEIGHT: i32 = 110;
/// About 97% opaque.
const ALPHA: u8 = 247;
const FONT_HEIGHT: i32 = 48;
const FONT_FACE: &str = "Segoe UI";

/// #232323
const BACKGROUND: COLORREF = COLORREF(0x0023_2323);
/// #4cd964, stored as 0x00BBGGRR
const FOREGROUND: COLORREF = COLORREF(0x0064_d94c);

fn window_ex_style() -> WINDOW_EX_STYLE {
    WS_EX_LAYERED | WS_EX_TOPMOST | WS_EX_TOOLWINDOW | WS_EX_NOACTIVATE
}

/// Overlay window bound to the thread that created it.
pub struct Win32OverlaySurface {
    instance: HINSTANCE,
    hwnd: Option<HWND>,
}

impl Win32OverlaySurface {
    /// Register the window class. The window itself is created lazily.
    pub fn new() -> Result<Self, OverlayError> {
        static REGISTER_CLASS: Once = Once::new();

        let module = unsafe { GetModuleHandleW(None) }.map_err(OverlayError::Window)?;
        let instance = HINSTANCE::from(module);

        REGISTER_CLASS.call_once(|| unsafe {
            let wc = WNDCLASSW {
                hInstance: instance,
                lpszClassName: CLASS_NAME,
                lpfnWndProc: Some(overlay_wndproc),
                ..Default::default()
            };
            if RegisterClassW(&wc) == 0 {
                warn!("overlay window class registration failed");
            }
        });

        Ok(Self {
            instance,
            hwnd: None,
        })
    }

    fn create_window(&self) -> Result<HWND, OverlayError> {
        unsafe {
            let x = (GetSystemMetrics(SM_CXSCREEN) - WIDTH) / 2;
            let y = (GetSystemMetrics(SM_CYSCREEN) - HEIGHT) / 2;

            let hwnd = CreateWindowExW(
                window_ex_style(),
                CLASS_NAME,
                PCWSTR::null(),
                WS_POPUP,
                x,
                y,
                WIDTH,
                HEIGHT,
                None,
                None,
                self.instance,
                None,
            )
            .map_err(OverlayError::Window)?;

            if let Err(err) = SetLayeredWindowAttributes(hwnd, COLORREF(0), ALPHA, LWA_ALPHA) {
                let _ = DestroyWindow(hwnd);
                return Err(OverlayError::Window(err));
            }

            debug!("overlay window created");
            Ok(hwnd)
        }
    }
}

impl OverlaySurface for Win32OverlaySurface {
    fn show(&mut self, level: u8) -> Result<(), OverlayError> {
        let hwnd = match self.hwnd {
            Some(hwnd) => hwnd,
            None => {
                let hwnd = self.create_window()?;
                self.hwnd = Some(hwnd);
                hwnd
            }
        };

        unsafe {
            SetWindowLongPtrW(hwnd, GWLP_USERDATA, isize::from(level));
            let _ = InvalidateRect(hwnd, None, true);
            let _ = ShowWindow(hwnd, SW_SHOWNOACTIVATE);
        }
        Ok(())
    }

    fn hide(&mut self) {
        if let Some(hwnd) = self.hwnd.take() {
            unsafe {
                if let Err(err) = DestroyWindow(hwnd) {
                    warn!(%err, "failed to destroy overlay window");
                }
            }
            debug!("overlay window destroyed");
        }
    }

    fn pump(&mut self) {
        unsafe {
            let mut msg = MSG::default();
            while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
    }
}

impl Drop for Win32OverlaySurface {
    fn drop(&mut self) {
        self.hide();
    }
}

unsafe extern "system" fn overlay_wndproc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match msg {
        WM_ERASEBKGND => LRESULT(1),
        WM_PAINT => {
            paint(hwnd);
            LRESULT(0)
        }
        _ => DefWindowProcW(hwnd, msg, wparam, lparam),
    }
}

unsafe fn paint(hwnd: HWND) {
    let mut ps = PAINTSTRUCT::default();
    let hdc = BeginPaint(hwnd, &mut ps);
    if hdc.0.is_null() {
        return;
    }

    let mut rect = RECT::default();
    if GetClientRect(hwnd, &mut rect).is_ok() {
        let brush = CreateSolidBrush(BACKGROUND);
        FillRect(hdc, &rect, brush);
        let _ = DeleteObject(brush);

        let mut font_desc = LOGFONTW {
            lfHeight: -FONT_HEIGHT,
            lfWeight: 700,
            ..Default::default()
        };
        for (slot, unit) in font_desc.lfFaceName.iter_mut().zip(FONT_FACE.encode_utf16()) {
            *slot = unit;
        }
        let font = CreateFontIndirectW(&font_desc);
        let previous = SelectObject(hdc, font);

        SetBkMode(hdc, TRANSPARENT);
        SetTextColor(hdc, FOREGROUND);

        let level = GetWindowLongPtrW(hwnd, GWLP_USERDATA);
        let mut text: Vec<u16> = format!("{level}%").encode_utf16().collect();
        DrawTextW(hdc, &mut text, &mut rect, DT_CENTER | DT_VCENTER | DT_SINGLELINE);

        SelectObject(hdc, previous);
        let _ = DeleteObject(font);
    }

    let _ = EndPaint(hwnd, &ps);
}
