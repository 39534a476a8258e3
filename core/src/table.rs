//! Raw UEFI service table layouts
//!
//! Only the slots the chainloader actually calls carry typed function
//! pointers; everything else is a reserved pointer so the layout stays
//! exactly as UEFI lays it out without dragging in surface we never
//! touch.

use core::{ffi::c_void, mem::size_of};

use crate::{
    base::{Boolean, Char16, Event, Guid, Handle, Status},
    error::{Error, Result},
    proto::{RawSimpleTextInput, RawSimpleTextOutput},
};

/// CRC-32 used by table headers (ISO-HDLC, the "classic" zlib polynomial).
pub static CRC: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);

/// UEFI header revision, a binary coded decimal of `major.minor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Revision(pub u32);

impl Revision {
    pub const fn new(major: u16, minor: u16) -> Self {
        Revision(((major as u32) << 16) | minor as u32)
    }

    pub const fn major(self) -> u32 {
        self.0 >> 16
    }

    pub const fn minor(self) -> u32 {
        self.0 as u16 as u32
    }
}

/// Common header of the system, boot and runtime tables.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct Header {
    /// Unique signature identifying the table
    pub signature: u64,

    /// UEFI Revision
    pub revision: Revision,

    /// Size of the entire table, including this header
    pub size: u32,

    /// CRC over `size` bytes of the table, this field zeroed.
    pub crc32: u32,

    /// Reserved. 0.
    pub reserved: u32,
}

impl Header {
    /// Offset of the `crc32` field inside the header.
    const CRC_OFFSET: usize = 16;

    /// Validate signature, revision and checksum of the table at `table`.
    ///
    /// # Safety
    ///
    /// `table` must point at a table whose header `size` is truthful;
    /// the check reads that many bytes.
    pub unsafe fn validate(table: *const u8, sig: u64) -> Result<()> {
        if table.is_null() {
            return Err(Error::new(Status::INVALID_PARAMETER));
        }
        let header = &*(table as *const Self);
        if header.signature != sig {
            return Err(Error::new(Status::INVALID_PARAMETER));
        }
        if header.revision.major() < 2 {
            return Err(Error::new(Status::UNSUPPORTED));
        }
        let size = header.size as usize;
        if size < size_of::<Header>() {
            return Err(Error::new(Status::INVALID_PARAMETER));
        }
        let bytes = core::slice::from_raw_parts(table, size);
        let mut digest = CRC.digest();
        digest.update(&bytes[..Self::CRC_OFFSET]);
        digest.update(&[0u8; 4]);
        digest.update(&bytes[Self::CRC_OFFSET + 4..]);
        if digest.finalize() != header.crc32 {
            return Err(Error::new(Status::CRC_ERROR));
        }
        Ok(())
    }
}

/// Firmware RTC time, as returned by GetTime.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct RawTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub pad1: u8,
    pub nanosecond: u32,
    pub time_zone: i16,
    pub daylight: u8,
    pub pad2: u8,
}

/// Memory type for pool allocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct MemoryType(pub u32);

impl MemoryType {
    pub const RESERVED: Self = Self(0);
    pub const LOADER_CODE: Self = Self(1);
    pub const LOADER_DATA: Self = Self(2);
}

/// Search type for LocateHandle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct LocateSearch(pub u32);

impl LocateSearch {
    pub const ALL_HANDLES: Self = Self(0);
    pub const BY_REGISTER_NOTIFY: Self = Self(1);
    pub const BY_PROTOCOL: Self = Self(2);
}

/// Timer arming mode for SetTimer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct TimerMode(pub u32);

impl TimerMode {
    pub const CANCEL: Self = Self(0);
    pub const PERIODIC: Self = Self(1);
    pub const RELATIVE: Self = Self(2);
}

/// Reset type for ResetSystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct ResetType(pub u32);

impl ResetType {
    pub const COLD: Self = Self(0);
    pub const WARM: Self = Self(1);
    pub const SHUTDOWN: Self = Self(2);
}

/// Event type bits for CreateEvent.
pub const EVT_TIMER: u32 = 0x8000_0000;
pub const EVT_NOTIFY_SIGNAL: u32 = 0x0000_0200;

/// Notify task priority for callback events.
pub const TPL_CALLBACK: usize = 8;

/// Firmware event callback.
pub type EventNotifyFn = unsafe extern "efiapi" fn(event: Event, context: *mut c_void);

/// The EFI system table.
#[derive(Debug)]
#[repr(C)]
pub struct RawSystemTable {
    /// Table header, always valid
    pub header: Header,

    /// Null terminated UCS-2 firmware vendor string
    pub firmware_vendor: *const Char16,

    /// Firmware vendor specific version value
    pub firmware_revision: u32,

    pub console_in_handle: Handle,
    pub con_in: *mut RawSimpleTextInput,

    pub console_out_handle: Handle,
    pub con_out: *mut RawSimpleTextOutput,

    pub standard_error_handle: Handle,
    pub std_err: *mut RawSimpleTextOutput,

    pub runtime_services: *mut RawRuntimeServices,
    pub boot_services: *mut RawBootServices,

    pub number_of_table_entries: usize,
    pub configuration_table: *mut c_void,
}

impl RawSystemTable {
    pub const SIGNATURE: u64 = 0x5453595320494249;

    /// Validate the system table and the service tables it points at.
    ///
    /// # Safety
    ///
    /// - `this` must be a valid pointer from firmware
    /// - Must only be called before user code runs
    pub unsafe fn validate(this: *mut Self) -> Result<()> {
        Header::validate(this as *const u8, Self::SIGNATURE)?;
        let header = &*this;
        Header::validate(
            header.boot_services as *const u8,
            RawBootServices::SIGNATURE,
        )?;
        Header::validate(
            header.runtime_services as *const u8,
            RawRuntimeServices::SIGNATURE,
        )?;
        Ok(())
    }
}

#[repr(C)]
pub struct RawBootServices {
    /// Table header
    pub header: Header,

    // Task priority
    pub raise_tpl: *mut c_void,
    pub restore_tpl: *mut c_void,

    // Memory
    pub allocate_pages: *mut c_void,
    pub free_pages: *mut c_void,
    pub get_memory_map: *mut c_void,

    pub allocate_pool: Option<
        unsafe extern "efiapi" fn(
            mem_ty: MemoryType,
            size: usize,
            out: *mut *mut u8,
        ) -> Status,
    >,

    pub free_pool: Option<unsafe extern "efiapi" fn(mem: *mut u8) -> Status>,

    // Timers and events
    pub create_event: Option<
        unsafe extern "efiapi" fn(
            ty: u32,
            notify_tpl: usize,
            notify: Option<EventNotifyFn>,
            context: *mut c_void,
            out: *mut Event,
        ) -> Status,
    >,

    pub set_timer:
        Option<unsafe extern "efiapi" fn(event: Event, ty: TimerMode, trigger: u64) -> Status>,

    pub wait_for_event: Option<
        unsafe extern "efiapi" fn(count: usize, events: *mut Event, index: *mut usize) -> Status,
    >,

    pub signal_event: *mut c_void,

    pub close_event: Option<unsafe extern "efiapi" fn(event: Event) -> Status>,

    pub check_event: *mut c_void,

    // Protocols
    pub install_protocol_interface: *mut c_void,
    pub reinstall_protocol_interface: *mut c_void,
    pub uninstall_protocol_interface: *mut c_void,

    pub handle_protocol: Option<
        unsafe extern "efiapi" fn(
            handle: Handle,
            guid: *const Guid,
            out: *mut *mut c_void,
        ) -> Status,
    >,

    pub reserved: *mut c_void,
    pub register_protocol_notify: *mut c_void,

    pub locate_handle: Option<
        unsafe extern "efiapi" fn(
            search: LocateSearch,
            guid: *const Guid,
            key: *mut c_void,
            size: *mut usize,
            out: *mut Handle,
        ) -> Status,
    >,

    pub locate_device_path: *mut c_void,
    pub install_configuration_table: *mut c_void,

    // Images
    pub load_image: Option<
        unsafe extern "efiapi" fn(
            policy: Boolean,
            parent: Handle,
            path: *const u8,
            source: *mut c_void,
            source_size: usize,
            out: *mut Handle,
        ) -> Status,
    >,

    pub start_image: Option<
        unsafe extern "efiapi" fn(
            handle: Handle,
            exit_size: *mut usize,
            exit_data: *mut *mut Char16,
        ) -> Status,
    >,

    pub exit: *mut c_void,

    pub unload_image: Option<unsafe extern "efiapi" fn(handle: Handle) -> Status>,

    pub exit_boot_services: *mut c_void,

    // Misc
    pub get_next_monotonic_count: *mut c_void,

    pub stall: Option<unsafe extern "efiapi" fn(microseconds: usize) -> Status>,

    pub set_watchdog_timer: *mut c_void,

    // Drivers
    pub connect_controller: *mut c_void,
    pub disconnect_controller: *mut c_void,

    // Protocols, again
    pub open_protocol: *mut c_void,
    pub close_protocol: *mut c_void,
    pub open_protocol_information: *mut c_void,

    pub protocols_per_handle: *mut c_void,
    pub locate_handle_buffer: *mut c_void,

    pub locate_protocol: Option<
        unsafe extern "efiapi" fn(
            guid: *const Guid,
            registration: *mut c_void,
            out: *mut *mut c_void,
        ) -> Status,
    >,

    pub install_multiple_protocol_interfaces: *mut c_void,
    pub uninstall_multiple_protocol_interfaces: *mut c_void,

    pub calculate_crc32: *mut c_void,

    pub copy_mem: *mut c_void,
    pub set_mem: *mut c_void,
    pub create_event_ex: *mut c_void,
}

impl RawBootServices {
    pub const SIGNATURE: u64 = 0x56524553544f4f42;
}

#[repr(C)]
pub struct RawRuntimeServices {
    /// Table header
    pub header: Header,

    // Time
    pub get_time:
        Option<unsafe extern "efiapi" fn(time: *mut RawTime, caps: *mut c_void) -> Status>,
    pub set_time: *mut c_void,
    pub get_wakeup_time: *mut c_void,
    pub set_wakeup_time: *mut c_void,

    // Virtual memory
    pub set_virtual_address_map: *mut c_void,
    pub convert_pointer: *mut c_void,

    // Variables
    pub get_variable: Option<
        unsafe extern "efiapi" fn(
            name: *const Char16,
            vendor: *const Guid,
            attrs: *mut u32,
            size: *mut usize,
            data: *mut c_void,
        ) -> Status,
    >,

    pub get_next_variable_name: *mut c_void,

    pub set_variable: Option<
        unsafe extern "efiapi" fn(
            name: *const Char16,
            vendor: *const Guid,
            attrs: u32,
            size: usize,
            data: *const c_void,
        ) -> Status,
    >,

    // Misc
    pub get_next_high_monotonic_count: *mut c_void,

    pub reset_system: Option<
        unsafe extern "efiapi" fn(
            ty: ResetType,
            status: Status,
            data_size: usize,
            data: *const Char16,
        ),
    >,

    // Capsules
    pub update_capsule: *mut c_void,
    pub query_capsule_capabilities: *mut c_void,
    pub query_variable_info: *mut c_void,
}

impl RawRuntimeServices {
    pub const SIGNATURE: u64 = 0x56524553544e5552;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revision_parts() {
        let rev = Revision::new(2, 70);
        assert_eq!(rev.major(), 2);
        assert_eq!(rev.minor(), 70);
    }

    #[test]
    fn header_validation_checks_crc_and_signature() {
        #[repr(C)]
        struct Dummy {
            header: Header,
            extra: u64,
        }
        let mut t = Dummy {
            header: Header {
                signature: 0x1234,
                revision: Revision::new(2, 70),
                size: size_of::<Dummy>() as u32,
                crc32: 0,
                reserved: 0,
            },
            extra: 0xfeed,
        };
        let bytes = unsafe {
            core::slice::from_raw_parts(&t as *const Dummy as *const u8, size_of::<Dummy>())
        };
        let mut digest = CRC.digest();
        digest.update(bytes);
        t.header.crc32 = digest.finalize();

        let p = &t as *const Dummy as *const u8;
        unsafe {
            assert!(Header::validate(p, 0x1234).is_ok());
            assert_eq!(
                Header::validate(p, 0x9999).unwrap_err().status(),
                Status::INVALID_PARAMETER
            );
        }
        t.extra = 0xdead;
        unsafe {
            assert_eq!(
                Header::validate(p, 0x1234).unwrap_err().status(),
                Status::CRC_ERROR
            );
        }
    }
}
