//! Safe wrappers over the UEFI service tables

use alloc::{string::String, vec, vec::Vec};
use core::{ffi::c_void, mem::size_of, ptr::null_mut, time::Duration};

use steamcl_core::{
    base::{Event, Guid, Handle, Status},
    error::{Error, Result},
    table::{
        LocateSearch,
        MemoryType,
        RawBootServices,
        RawRuntimeServices,
        RawSystemTable,
        RawTime,
        ResetType,
        Revision,
        TimerMode,
        EVT_TIMER,
    },
};

use crate::{
    proto::{
        console::{SimpleTextInput, SimpleTextOutput},
        Protocol,
    },
    string,
    util::interface,
};

interface!(
    /// The UEFI System Table
    SystemTable(RawSystemTable),
    /// The UEFI Boot Services
    BootServices(RawBootServices),
    /// The UEFI Runtime Services
    RuntimeServices(RawRuntimeServices),
);

impl<'table> SystemTable<'table> {
    pub fn boot(&self) -> BootServices<'table> {
        let ptr = self.interface().boot_services;
        assert!(!ptr.is_null(), "boot services were null");
        // Safety: valid by table validation at entry
        unsafe { BootServices::new(ptr) }
    }

    pub fn runtime(&self) -> RuntimeServices<'table> {
        let ptr = self.interface().runtime_services;
        assert!(!ptr.is_null(), "runtime services were null");
        // Safety: valid by table validation at entry
        unsafe { RuntimeServices::new(ptr) }
    }

    pub fn stdout(&self) -> SimpleTextOutput<'table> {
        let ptr = self.interface().con_out;
        assert!(!ptr.is_null(), "con_out was null");
        // Safety: valid by table validation at entry
        unsafe { SimpleTextOutput::new(ptr) }
    }

    pub fn stdin(&self) -> SimpleTextInput<'table> {
        let ptr = self.interface().con_in;
        assert!(!ptr.is_null(), "con_in was null");
        // Safety: valid by table validation at entry
        unsafe { SimpleTextInput::new(ptr) }
    }

    /// Handle carrying the console input protocols
    pub fn stdin_handle(&self) -> Handle {
        self.interface().console_in_handle
    }

    /// Firmware vendor string
    pub fn firmware_vendor(&self) -> String {
        let ptr = self.interface().firmware_vendor;
        if ptr.is_null() {
            return String::new();
        }
        // Safety: non-null vendor strings are nul-terminated UCS-2
        unsafe { string::decode_utf16_ptr(ptr) }
    }

    /// Firmware vendor specific revision
    pub fn firmware_revision(&self) -> u32 {
        self.interface().firmware_revision
    }

    /// UEFI revision the firmware claims to implement
    pub fn uefi_revision(&self) -> Revision {
        self.interface().header.revision
    }
}

impl<'table> BootServices<'table> {
    /// Every handle supporting the [`Protocol`] `P`.
    ///
    /// [`Status::NOT_FOUND`] is treated as an empty list.
    pub fn handles_for_protocol<P: Protocol<'table>>(&self) -> Result<Vec<Handle>> {
        let lh = self
            .interface()
            .locate_handle
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        let guid = P::GUID;
        // Size in bytes, not handles.
        let mut size = 0usize;

        // Safety: statically correct arguments; the first call only sizes
        let ret = unsafe {
            (lh)(
                LocateSearch::BY_PROTOCOL,
                &guid,
                null_mut(),
                &mut size,
                null_mut(),
            )
        };
        if ret == Status::NOT_FOUND {
            return Ok(Vec::new());
        }
        if ret != Status::BUFFER_TOO_SMALL {
            return Err(Error::new(Status::INVALID_PARAMETER));
        }

        let mut out = vec![Handle::null(); size / size_of::<Handle>()];
        // Safety: `out` is exactly `size` bytes
        let ret = unsafe {
            (lh)(
                LocateSearch::BY_PROTOCOL,
                &guid,
                null_mut(),
                &mut size,
                out.as_mut_ptr(),
            )
        };
        if ret.is_success() {
            Ok(out)
        } else if ret == Status::NOT_FOUND {
            Ok(Vec::new())
        } else {
            Err(ret.into())
        }
    }

    /// The instance of [`Protocol`] `P` on `handle`.
    ///
    /// Firmware is not told we hold this, so it is only valid while boot
    /// services are; the chainloader never outlives them.
    pub fn handle_protocol<P: Protocol<'table>>(&self, handle: Handle) -> Result<P> {
        let hp = self
            .interface()
            .handle_protocol
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        let guid = P::GUID;
        let mut out: *mut c_void = null_mut();

        // Safety: statically correct arguments
        let ret = unsafe { (hp)(handle, &guid, &mut out) };
        if ret.is_success() {
            if out.is_null() {
                return Err(Error::new(Status::NOT_FOUND));
            }
            // Safety: success means `out` is a valid P::Raw
            Ok(unsafe { P::from_raw(out as *mut P::Raw) })
        } else {
            Err(ret.into())
        }
    }

    /// Load the image at `path`, returning its handle.
    pub fn load_image(&self, parent: Handle, path: &[u8]) -> Result<Handle> {
        let li = self
            .interface()
            .load_image
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        let mut out = Handle::null();

        // Safety: `path` is a terminated device path; boot-policy false
        // means exact-path semantics
        let ret = unsafe { (li)(false.into(), parent, path.as_ptr(), null_mut(), 0, &mut out) };
        if ret.is_success() && !out.is_null() {
            Ok(out)
        } else if ret.is_success() {
            Err(Error::new(Status::LOAD_ERROR))
        } else {
            Err(ret.into())
        }
    }

    /// Transfer control to a loaded image. Returns when (if) the image
    /// exits; the exit status is surfaced, any exit data is discarded.
    ///
    /// # Safety
    ///
    /// `handle` must be a loaded, not-yet-started image, trusted as much
    /// as any FFI call.
    pub unsafe fn start_image(&self, handle: Handle) -> Result<()> {
        let si = self
            .interface()
            .start_image
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        let mut exit_size = 0usize;
        let mut exit_data = null_mut();
        (si)(handle, &mut exit_size, &mut exit_data).into()
    }

    /// Unload an image that either was never started or has returned.
    pub fn unload_image(&self, handle: Handle) -> Result<()> {
        let ui = self
            .interface()
            .unload_image
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        // Safety: statically correct arguments
        unsafe { (ui)(handle) }.into()
    }

    /// Block for `dur`, rounded down to microseconds.
    pub fn stall(&self, dur: Duration) -> Result<()> {
        let s = self
            .interface()
            .stall
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        let micros = dur
            .as_micros()
            .try_into()
            .map_err(|_| Error::new(Status::INVALID_PARAMETER))?;
        // Safety: statically correct arguments
        unsafe { (s)(micros) }.into()
    }

    /// Create a bare timer event, fired by [`Self::set_timer_relative`]
    /// or [`Self::set_timer_periodic`]. No callback; pend on it with
    /// [`Self::wait_for_event`].
    pub fn create_timer_event(&self) -> Result<Event> {
        let ce = self
            .interface()
            .create_event
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        let mut out = Event::null();
        // Safety: EVT_TIMER events take no callback
        let ret = unsafe { (ce)(EVT_TIMER, 0, None, null_mut(), &mut out) };
        if ret.is_success() && !out.is_null() {
            Ok(out)
        } else if ret.is_success() {
            Err(Error::new(Status::DEVICE_ERROR))
        } else {
            Err(ret.into())
        }
    }

    /// Arm `event` to fire once, `millis` from now. Timers are measured
    /// in 100 ns units. A zero delay would fire on every clock tick and
    /// wedge the loader, so it cancels instead.
    pub fn set_timer_relative(&self, event: Event, millis: u64) -> Result<()> {
        let st = self
            .interface()
            .set_timer
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        if millis == 0 {
            // Safety: statically correct arguments
            return unsafe { (st)(event, TimerMode::CANCEL, 0) }.into();
        }
        // Safety: statically correct arguments
        unsafe { (st)(event, TimerMode::RELATIVE, millis * 10_000) }.into()
    }

    /// Arm `event` to fire every `millis`.
    pub fn set_timer_periodic(&self, event: Event, millis: u64) -> Result<()> {
        let st = self
            .interface()
            .set_timer
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        if millis == 0 {
            // Safety: statically correct arguments
            return unsafe { (st)(event, TimerMode::CANCEL, 0) }.into();
        }
        // Safety: statically correct arguments
        unsafe { (st)(event, TimerMode::PERIODIC, millis * 10_000) }.into()
    }

    /// Suspend until one of `events` signals; returns its index.
    pub fn wait_for_event(&self, events: &mut [Event]) -> Result<usize> {
        let wf = self
            .interface()
            .wait_for_event
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        let mut index = events.len();
        // Safety: `events` length matches the count passed
        let ret = unsafe { (wf)(events.len(), events.as_mut_ptr(), &mut index) };
        if ret.is_success() && index < events.len() {
            Ok(index)
        } else if ret.is_success() {
            Err(Error::new(Status::DEVICE_ERROR))
        } else {
            Err(ret.into())
        }
    }

    pub fn close_event(&self, event: Event) -> Result<()> {
        let ce = self
            .interface()
            .close_event
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        // Safety: statically correct arguments
        unsafe { (ce)(event) }.into()
    }

    /// Allocate `size` bytes of LOADER_DATA pool. 8-byte aligned.
    pub fn allocate_pool(&self, size: usize) -> Result<*mut u8> {
        let ap = self
            .interface()
            .allocate_pool
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        let mut out: *mut u8 = null_mut();
        // Safety: statically correct arguments
        let ret = unsafe { (ap)(MemoryType::LOADER_DATA, size, &mut out) };
        if ret.is_success() && !out.is_null() {
            Ok(out)
        } else if ret.is_success() {
            Err(Error::new(Status::OUT_OF_RESOURCES))
        } else {
            Err(ret.into())
        }
    }

    /// Free memory from [`Self::allocate_pool`].
    ///
    /// # Safety
    ///
    /// `mem` must come from `allocate_pool` and not be freed twice.
    pub unsafe fn free_pool(&self, mem: *mut u8) -> Result<()> {
        let fp = self
            .interface()
            .free_pool
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        (fp)(mem).into()
    }
}

impl<'table> RuntimeServices<'table> {
    /// Read a firmware variable, whole.
    pub fn get_variable(&self, name: &str, vendor: &Guid) -> Result<Vec<u8>> {
        let gv = self
            .interface()
            .get_variable
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        let name16 = string::to_utf16(name);
        let mut size = 0usize;

        // Safety: sizing call, null data is allowed with size 0
        let ret = unsafe { (gv)(name16.as_ptr(), vendor, null_mut(), &mut size, null_mut()) };
        if ret.is_success() {
            // zero-length variable
            return Ok(Vec::new());
        }
        if ret != Status::BUFFER_TOO_SMALL {
            return Err(ret.into());
        }

        let mut buf = vec![0u8; size];
        // Safety: `buf` is `size` bytes
        let ret = unsafe {
            (gv)(
                name16.as_ptr(),
                vendor,
                null_mut(),
                &mut size,
                buf.as_mut_ptr() as *mut c_void,
            )
        };
        if ret.is_success() {
            buf.truncate(size);
            Ok(buf)
        } else {
            Err(ret.into())
        }
    }

    /// Write (or with empty `data`, delete) a firmware variable.
    pub fn set_variable(&self, name: &str, vendor: &Guid, attrs: u32, data: &[u8]) -> Result<()> {
        let sv = self
            .interface()
            .set_variable
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        let name16 = string::to_utf16(name);
        // Safety: data pointer and length match
        unsafe {
            (sv)(
                name16.as_ptr(),
                vendor,
                attrs,
                data.len(),
                data.as_ptr() as *const c_void,
            )
        }
        .into()
    }

    /// Current RTC time.
    pub fn get_time(&self) -> Result<RawTime> {
        let gt = self
            .interface()
            .get_time
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        let mut time = RawTime::default();
        // Safety: statically correct arguments, caps unused
        let ret = unsafe { (gt)(&mut time, null_mut()) };
        if ret.is_success() {
            Ok(time)
        } else {
            Err(ret.into())
        }
    }

    /// Reset the system. Does not return on real firmware; if it does
    /// (mocks, broken firmware), the caller sees the error.
    pub fn reset(&self, ty: ResetType, status: Status) -> Result<()> {
        let rs = self
            .interface()
            .reset_system
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        // Safety: statically correct arguments
        unsafe { (rs)(ty, status, 0, null_mut()) };
        Err(Error::new(Status::DEVICE_ERROR))
    }
}
