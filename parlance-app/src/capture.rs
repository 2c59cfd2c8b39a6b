//! Best-effort capture of the system-wide text selection.
//!
//! Simulates the copy chord in the foreground app, then reads the clipboard.
//! The previous clipboard content is saved first and restored on every exit
//! path, whether or not anything was selected. The clipboard sequence number
//! tells selection-present apart from selection-absent: if it did not move,
//! the copy produced nothing.

#[cfg(target_os = "windows")]
pub fn get_selection() -> Option<String> {
    use std::{thread, time::Duration};

    let previous = read_clipboard_text();
    let sequence_before = clipboard_sequence_number();

    if let Err(e) = send_copy_chord() {
        tracing::debug!(error = %e, "copy chord failed");
        return None;
    }
    // Give the foreground app time to service the copy.
    thread::sleep(Duration::from_millis(50));

    let selection = if clipboard_sequence_number() != sequence_before {
        read_clipboard_text().filter(|text| !text.is_empty())
    } else {
        None
    };

    if let Some(prev) = previous {
        if let Err(e) = write_clipboard_text(&prev) {
            tracing::debug!(error = %e, "clipboard restore failed");
        }
    }

    selection
}

#[cfg(not(target_os = "windows"))]
pub fn get_selection() -> Option<String> {
    None
}

#[cfg(target_os = "windows")]
fn clipboard_sequence_number() -> u32 {
    use windows_sys::Win32::System::DataExchange::GetClipboardSequenceNumber;
    // SAFETY: reads a global counter, no preconditions.
    unsafe { GetClipboardSequenceNumber() }
}

#[cfg(target_os = "windows")]
fn open_clipboard_with_retry() -> bool {
    use std::{thread, time::Duration};
    use windows_sys::Win32::System::DataExchange::OpenClipboard;
    for _ in 0..8 {
        let opened = unsafe { OpenClipboard(std::ptr::null_mut()) != 0 };
        if opened {
            return true;
        }
        thread::sleep(Duration::from_millis(8));
    }
    false
}

#[cfg(target_os = "windows")]
fn read_clipboard_text() -> Option<String> {
    use std::ffi::OsString;
    use std::os::windows::ffi::OsStringExt;
    use windows_sys::Win32::System::DataExchange::{
        CloseClipboard, GetClipboardData, IsClipboardFormatAvailable,
    };
    use windows_sys::Win32::System::Memory::{GlobalLock, GlobalUnlock};

    const CF_UNICODETEXT: u32 = 13;
    if !open_clipboard_with_retry() {
        return None;
    }

    let result = unsafe {
        if IsClipboardFormatAvailable(CF_UNICODETEXT) == 0 {
            None
        } else {
            let h = GetClipboardData(CF_UNICODETEXT);
            if h.is_null() {
                None
            } else {
                let ptr = GlobalLock(h as _) as *const u16;
                if ptr.is_null() {
                    None
                } else {
                    let mut len = 0usize;
                    while *ptr.add(len) != 0 {
                        len += 1;
                    }
                    let slice = std::slice::from_raw_parts(ptr, len);
                    let out = OsString::from_wide(slice).to_string_lossy().to_string();
                    let _ = GlobalUnlock(h as _);
                    Some(out)
                }
            }
        }
    };

    unsafe {
        CloseClipboard();
    }
    result
}

#[cfg(target_os = "windows")]
fn write_clipboard_text(text: &str) -> Result<(), String> {
    use windows_sys::Win32::System::DataExchange::{
        CloseClipboard, EmptyClipboard, SetClipboardData,
    };
    use windows_sys::Win32::System::Memory::{
        GlobalAlloc, GlobalLock, GlobalUnlock, GMEM_MOVEABLE,
    };

    const CF_UNICODETEXT: u32 = 13;
    let mut utf16: Vec<u16> = text.encode_utf16().collect();
    utf16.push(0);
    let bytes = utf16.len() * std::mem::size_of::<u16>();

    if !open_clipboard_with_retry() {
        return Err("OpenClipboard failed".into());
    }

    let result = unsafe {
        if EmptyClipboard() == 0 {
            Err("EmptyClipboard failed".to_string())
        } else {
            let hmem = GlobalAlloc(GMEM_MOVEABLE, bytes);
            if hmem.is_null() {
                Err("GlobalAlloc failed for clipboard text".to_string())
            } else {
                let dst = GlobalLock(hmem) as *mut u16;
                if dst.is_null() {
                    Err("GlobalLock failed for clipboard text".to_string())
                } else {
                    std::ptr::copy_nonoverlapping(utf16.as_ptr(), dst, utf16.len());
                    let _ = GlobalUnlock(hmem);
                    let set = SetClipboardData(CF_UNICODETEXT, hmem as *mut _);
                    if set.is_null() {
                        Err("SetClipboardData(CF_UNICODETEXT) failed".to_string())
                    } else {
                        Ok(())
                    }
                }
            }
        }
    };

    unsafe {
        CloseClipboard();
    }
    result
}

#[cfg(target_os = "windows")]
fn send_copy_chord() -> Result<(), String> {
    use std::mem::size_of;
    use windows_sys::Win32::UI::Input::KeyboardAndMouse::{
        SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT, KEYEVENTF_KEYUP, VK_C, VK_CONTROL,
    };

    fn key_event(vk: u16, flags: u32) -> INPUT {
        INPUT {
            r#type: INPUT_KEYBOARD,
            Anonymous: INPUT_0 {
                ki: KEYBDINPUT {
                    wVk: vk,
                    wScan: 0,
                    dwFlags: flags,
                    time: 0,
                    dwExtraInfo: 0,
                },
            },
        }
    }

    let inputs = [
        key_event(VK_CONTROL, 0),
        key_event(VK_C, 0),
        key_event(VK_C, KEYEVENTF_KEYUP),
        key_event(VK_CONTROL, KEYEVENTF_KEYUP),
    ];

    // SAFETY: `inputs` points to initialized `INPUT` structs and lives for
    // the duration of the call.
    let sent = unsafe {
        SendInput(
            inputs.len() as u32,
            inputs.as_ptr(),
            size_of::<INPUT>() as i32,
        )
    };
    if sent != inputs.len() as u32 {
        let win_err = std::io::Error::last_os_error();
        return Err(format!(
            "SendInput sent {sent}/{} keyboard events (os_error={win_err})",
            inputs.len()
        ));
    }
    Ok(())
}
