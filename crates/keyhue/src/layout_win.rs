//! Active keyboard layout detection via Win32.
//!
//! The layout of the foreground window's thread is the one the user is
//! typing with; the low word of its HKL is the language id, which
//! `LCIDToLocaleName` turns into a BCP-47 tag like "en-US".

use keyhue_lib::watcher::LayoutSource;
use windows::Win32::Globalization::LCIDToLocaleName;
use windows::Win32::UI::Input::KeyboardAndMouse::GetKeyboardLayout;
use windows::Win32::UI::WindowsAndMessaging::{GetForegroundWindow, GetWindowThreadProcessId};

/// LOCALE_NAME_MAX_LENGTH
const LOCALE_BUF: usize = 85;

pub struct WinLayoutSource;

impl LayoutSource for WinLayoutSource {
    fn current_layout(&self) -> Option<String> {
        unsafe {
            let hwnd = GetForegroundWindow();
            if hwnd.0.is_null() {
                return None;
            }
            let thread = GetWindowThreadProcessId(hwnd, None);
            let hkl = GetKeyboardLayout(thread);
            let lang_id = (hkl.0 as usize & 0xFFFF) as u32;

            let mut buf = [0u16; LOCALE_BUF];
            let len = LCIDToLocaleName(lang_id, Some(&mut buf), 0);
            if len <= 1 {
                return None;
            }
            // len includes the trailing NUL.
            Some(String::from_utf16_lossy(&buf[..(len as usize - 1)]))
        }
    }
}
