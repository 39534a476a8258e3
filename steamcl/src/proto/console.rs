//! Console input/output protocols

use alloc::vec::Vec;
use core::{ffi::c_void, fmt, ptr::null_mut};

use steamcl_core::{
    base::{Event, Status},
    error::{Error, Result},
    proto::{
        KeyNotifyFn,
        RawInputKey,
        RawKeyData,
        RawSimpleTextInput,
        RawSimpleTextInputEx,
        RawSimpleTextOutput,
        SIMPLE_TEXT_INPUT_EX_GUID,
    },
};

use crate::util::{interface, protocol};

interface!(
    /// Text output to the active console
    SimpleTextOutput(RawSimpleTextOutput),
    /// Basic console key input
    SimpleTextInput(RawSimpleTextInput),
    /// Extended console input: modifier state and key-notify hooks
    SimpleTextInputEx(RawSimpleTextInputEx),
);

protocol!(SimpleTextInputEx(RawSimpleTextInputEx), SIMPLE_TEXT_INPUT_EX_GUID);

impl<'table> SimpleTextOutput<'table> {
    /// Write a string, translating `\n` to `\r\n` on the way out.
    pub fn output_string(&self, s: &str) -> Result<()> {
        let os = self
            .interface()
            .output_string
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        let mut buf: Vec<u16> = Vec::with_capacity(s.len() + 2);
        for c in s.chars() {
            if c == '\n' {
                buf.push(b'\r' as u16);
            }
            let mut units = [0u16; 2];
            buf.extend_from_slice(c.encode_utf16(&mut units));
        }
        buf.push(0);
        // Safety: `buf` is nul-terminated and outlives the call
        unsafe { (os)(self.interface, buf.as_ptr()) }.into()
    }

    pub fn clear(&self) -> Result<()> {
        let cs = self
            .interface()
            .clear_screen
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        // Safety: statically correct arguments
        unsafe { (cs)(self.interface) }.into()
    }

    pub fn set_attribute(&self, attr: usize) -> Result<()> {
        let sa = self
            .interface()
            .set_attribute
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        // Safety: statically correct arguments
        unsafe { (sa)(self.interface, attr) }.into()
    }

    pub fn set_cursor_position(&self, col: usize, row: usize) -> Result<()> {
        let sc = self
            .interface()
            .set_cursor_position
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        // Safety: statically correct arguments
        unsafe { (sc)(self.interface, col, row) }.into()
    }

    pub fn enable_cursor(&self, visible: bool) -> Result<()> {
        let ec = self
            .interface()
            .enable_cursor
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        // Safety: statically correct arguments
        unsafe { (ec)(self.interface, visible.into()) }.into()
    }

    /// Columns and rows of text mode `mode`.
    pub fn query_mode(&self, mode: usize) -> Result<(usize, usize)> {
        let qm = self
            .interface()
            .query_mode
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        let mut cols = 0usize;
        let mut rows = 0usize;
        // Safety: statically correct arguments
        let ret = unsafe { (qm)(self.interface, mode, &mut cols, &mut rows) };
        if ret.is_success() {
            Ok((cols, rows))
        } else {
            Err(ret.into())
        }
    }

    pub fn set_mode(&self, mode: usize) -> Result<()> {
        let sm = self
            .interface()
            .set_mode
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        // Safety: statically correct arguments
        unsafe { (sm)(self.interface, mode) }.into()
    }

    /// Highest mode number the console supports, 0 when unknown.
    pub fn max_mode(&self) -> i32 {
        let mode = self.interface().mode;
        if mode.is_null() {
            return 0;
        }
        // Safety: non-null mode pointers are valid per spec
        unsafe { (*mode).max_mode }
    }

    /// Currently active mode number.
    pub fn current_mode(&self) -> Option<i32> {
        let mode = self.interface().mode;
        if mode.is_null() {
            return None;
        }
        // Safety: non-null mode pointers are valid per spec
        Some(unsafe { (*mode).mode })
    }
}

/// Best-effort text sink for logging and panic output.
impl<'table> fmt::Write for SimpleTextOutput<'table> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.output_string(s).map_err(|_| fmt::Error)
    }
}

impl<'table> SimpleTextInput<'table> {
    /// Drain buffered keys and reset the device.
    pub fn reset(&self) -> Result<()> {
        let r = self
            .interface()
            .reset
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        // Safety: statically correct arguments
        unsafe { (r)(self.interface, false.into()) }.into()
    }

    /// The next buffered keystroke; [`Status::NOT_READY`] when none.
    pub fn read_key(&self) -> Result<RawInputKey> {
        let rk = self
            .interface()
            .read_key_stroke
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        let mut key = RawInputKey::default();
        // Safety: statically correct arguments
        let ret = unsafe { (rk)(self.interface, &mut key) };
        if ret.is_success() {
            Ok(key)
        } else {
            Err(ret.into())
        }
    }

    /// Event that signals when a key is waiting.
    pub fn wait_for_key_event(&self) -> Event {
        self.interface().wait_for_key
    }
}

impl<'table> SimpleTextInputEx<'table> {
    pub fn reset(&self) -> Result<()> {
        let r = self
            .interface()
            .reset
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        // Safety: statically correct arguments
        unsafe { (r)(self.interface, false.into()) }.into()
    }

    /// Ask for partial (key-state) reporting. Not all firmware supports
    /// this; failure is harmless.
    pub fn set_state(&self, state: u8) -> Result<()> {
        let ss = self
            .interface()
            .set_state
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        // Safety: statically correct arguments
        unsafe { (ss)(self.interface, &state) }.into()
    }

    /// Have firmware call `notify` whenever `key` is pressed. Returns the
    /// binding handle for [`Self::unregister_key_notify`].
    ///
    /// The callback runs at raised task priority; it must only flip
    /// flags.
    pub fn register_key_notify(
        &self,
        key: RawKeyData,
        notify: KeyNotifyFn,
    ) -> Result<*mut c_void> {
        let rk = self
            .interface()
            .register_key_notify
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        let mut binding: *mut c_void = null_mut();
        // Safety: statically correct arguments; `key` is copied by
        // firmware before return
        let ret = unsafe { (rk)(self.interface, &key, Some(notify), &mut binding) };
        if ret.is_success() {
            Ok(binding)
        } else {
            Err(ret.into())
        }
    }

    pub fn unregister_key_notify(&self, binding: *mut c_void) -> Result<()> {
        let uk = self
            .interface()
            .unregister_key_notify
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        // Safety: statically correct arguments
        unsafe { (uk)(self.interface, binding) }.into()
    }
}
