//! Raw UEFI protocol layouts
//!
//! `#[repr(C)]` mirrors of the protocol interfaces the chainloader
//! consumes, plus their GUIDs. As in [`crate::table`], only the function
//! slots we call are typed.

use core::ffi::c_void;

use bitflags::bitflags;

use crate::{
    base::{Boolean, Char16, Event, Guid, Handle, Status},
    table::RawTime,
};

pub const DEVICE_PATH_GUID: Guid = Guid::from_fields(
    0x09576e91,
    0x6d3f,
    0x11d2,
    [0x8e, 0x39, 0x00, 0xa0, 0xc9, 0x69, 0x72, 0x3b],
);

pub const LOADED_IMAGE_GUID: Guid = Guid::from_fields(
    0x5b1b31a1,
    0x9562,
    0x11d2,
    [0x8e, 0x3f, 0x00, 0xa0, 0xc9, 0x69, 0x72, 0x3b],
);

pub const LOADED_IMAGE_DEVICE_PATH_GUID: Guid = Guid::from_fields(
    0xbc62157e,
    0x3e33,
    0x4fec,
    [0x99, 0x20, 0x2d, 0x3b, 0x36, 0xd7, 0x50, 0xdf],
);

pub const SIMPLE_FILE_SYSTEM_GUID: Guid = Guid::from_fields(
    0x964e5b22,
    0x6459,
    0x11d2,
    [0x8e, 0x39, 0x00, 0xa0, 0xc9, 0x69, 0x72, 0x3b],
);

pub const FILE_INFO_ID: Guid = Guid::from_fields(
    0x09576e92,
    0x6d3f,
    0x11d2,
    [0x8e, 0x39, 0x00, 0xa0, 0xc9, 0x69, 0x72, 0x3b],
);

pub const SIMPLE_TEXT_INPUT_EX_GUID: Guid = Guid::from_fields(
    0xdd9e7534,
    0x7762,
    0x4698,
    [0x8c, 0x14, 0xf5, 0x85, 0x17, 0xa6, 0x25, 0xaa],
);

/// Head of a device-path node. The payload follows unaligned; see
/// [`crate::devpath`] for the byte-level handling.
#[derive(Debug)]
#[repr(C, packed)]
pub struct RawDevicePath {
    pub ty: u8,
    pub sub_ty: u8,
    /// Length in bytes, including this header
    pub len: [u8; 2],
}

/// EFI_LOADED_IMAGE_PROTOCOL
#[derive(Debug)]
#[repr(C)]
pub struct RawLoadedImage {
    pub revision: u32,
    pub parent_handle: Handle,
    pub system_table: *mut c_void,

    pub device_handle: Handle,
    pub file_path: *mut RawDevicePath,
    pub reserved: *mut c_void,

    /// Size of `load_options`. For shell-style command lines grub reads
    /// this as a character count, not bytes.
    pub load_options_size: u32,
    pub load_options: *mut c_void,

    pub image_base: *mut c_void,
    pub image_size: u64,
    pub image_code_type: u32,
    pub image_data_type: u32,
    pub unload: *mut c_void,
}

/// EFI_SIMPLE_FILE_SYSTEM_PROTOCOL
#[repr(C)]
pub struct RawSimpleFileSystem {
    pub revision: u64,
    pub open_volume:
        Option<unsafe extern "efiapi" fn(this: *mut Self, out: *mut *mut RawFile) -> Status>,
}

bitflags! {
    /// Open modes for [`RawFile::open`]
    pub struct FileMode: u64 {
        const READ = 0x1;
        const WRITE = 0x2;
        const CREATE = 0x8000_0000_0000_0000;
    }
}

bitflags! {
    /// File attribute bits
    pub struct FileAttr: u64 {
        const READ_ONLY = 0x01;
        const HIDDEN = 0x02;
        const SYSTEM = 0x04;
        const RESERVED = 0x08;
        const DIRECTORY = 0x10;
        const ARCHIVE = 0x20;
    }
}

/// EFI_FILE_PROTOCOL
#[repr(C)]
pub struct RawFile {
    pub revision: u64,

    pub open: Option<
        unsafe extern "efiapi" fn(
            this: *mut Self,
            out: *mut *mut RawFile,
            name: *const Char16,
            mode: u64,
            attrs: u64,
        ) -> Status,
    >,

    pub close: Option<unsafe extern "efiapi" fn(this: *mut Self) -> Status>,

    pub delete: *mut c_void,

    pub read: Option<
        unsafe extern "efiapi" fn(this: *mut Self, size: *mut usize, buf: *mut c_void) -> Status,
    >,

    pub write: Option<
        unsafe extern "efiapi" fn(this: *mut Self, size: *mut usize, buf: *const c_void) -> Status,
    >,

    pub get_position: Option<unsafe extern "efiapi" fn(this: *mut Self, pos: *mut u64) -> Status>,

    pub set_position: Option<unsafe extern "efiapi" fn(this: *mut Self, pos: u64) -> Status>,

    pub get_info: Option<
        unsafe extern "efiapi" fn(
            this: *mut Self,
            ty: *const Guid,
            size: *mut usize,
            buf: *mut c_void,
        ) -> Status,
    >,

    pub set_info: *mut c_void,

    pub flush: Option<unsafe extern "efiapi" fn(this: *mut Self) -> Status>,
}

/// Fixed head of EFI_FILE_INFO; the file name follows as nul-terminated
/// UTF-16.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct RawFileInfo {
    pub size: u64,
    pub file_size: u64,
    pub physical_size: u64,
    pub create_time: RawTime,
    pub last_access_time: RawTime,
    pub modification_time: RawTime,
    pub attribute: u64,
}

/// A keypress: scan code plus printable character, each possibly zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct RawInputKey {
    pub scan_code: u16,
    pub unicode_char: Char16,
}

/// EFI_SIMPLE_TEXT_INPUT_PROTOCOL
#[repr(C)]
pub struct RawSimpleTextInput {
    pub reset: Option<unsafe extern "efiapi" fn(this: *mut Self, extended: Boolean) -> Status>,

    pub read_key_stroke:
        Option<unsafe extern "efiapi" fn(this: *mut Self, key: *mut RawInputKey) -> Status>,

    pub wait_for_key: Event,
}

/// Modifier state in a [`RawKeyData`]
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct RawKeyState {
    pub shift_state: u32,
    pub toggle_state: u8,
}

/// A keypress with modifier state, for the Ex input protocol
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct RawKeyData {
    pub key: RawInputKey,
    pub state: RawKeyState,
}

/// Callback invoked by firmware when a registered key fires. Runs at
/// raised priority; it must only flip flags.
pub type KeyNotifyFn = unsafe extern "efiapi" fn(key: *mut RawKeyData) -> Status;

/// EFI_SIMPLE_TEXT_INPUT_EX_PROTOCOL
#[repr(C)]
pub struct RawSimpleTextInputEx {
    pub reset: Option<unsafe extern "efiapi" fn(this: *mut Self, extended: Boolean) -> Status>,

    pub read_key_stroke_ex:
        Option<unsafe extern "efiapi" fn(this: *mut Self, key: *mut RawKeyData) -> Status>,

    pub wait_for_key_ex: Event,

    pub set_state: Option<unsafe extern "efiapi" fn(this: *mut Self, state: *const u8) -> Status>,

    pub register_key_notify: Option<
        unsafe extern "efiapi" fn(
            this: *mut Self,
            key: *const RawKeyData,
            notify: Option<KeyNotifyFn>,
            out: *mut *mut c_void,
        ) -> Status,
    >,

    pub unregister_key_notify:
        Option<unsafe extern "efiapi" fn(this: *mut Self, binding: *mut c_void) -> Status>,
}

/// Toggle-state bit asking for partial keystroke reporting.
pub const KEY_STATE_EXPOSED: u8 = 0x40;

/// Console scan codes the menu reacts to
pub const SCAN_UP: u16 = 0x01;
pub const SCAN_DOWN: u16 = 0x02;
pub const SCAN_F11: u16 = 0x15;
pub const SCAN_ESC: u16 = 0x17;

pub const CHAR_CARRIAGE_RETURN: u16 = 0x0d;
pub const CHAR_LINEFEED: u16 = 0x0a;

/// Text output mode description hanging off the output protocol
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct RawTextOutputMode {
    pub max_mode: i32,
    pub mode: i32,
    pub attribute: i32,
    pub cursor_column: i32,
    pub cursor_row: i32,
    pub cursor_visible: Boolean,
}

/// EFI_SIMPLE_TEXT_OUTPUT_PROTOCOL
#[repr(C)]
pub struct RawSimpleTextOutput {
    pub reset: Option<unsafe extern "efiapi" fn(this: *mut Self, extended: Boolean) -> Status>,

    pub output_string:
        Option<unsafe extern "efiapi" fn(this: *mut Self, string: *const Char16) -> Status>,

    pub test_string: *mut c_void,

    pub query_mode: Option<
        unsafe extern "efiapi" fn(
            this: *mut Self,
            mode: usize,
            cols: *mut usize,
            rows: *mut usize,
        ) -> Status,
    >,

    pub set_mode: Option<unsafe extern "efiapi" fn(this: *mut Self, mode: usize) -> Status>,

    pub set_attribute: Option<unsafe extern "efiapi" fn(this: *mut Self, attr: usize) -> Status>,

    pub clear_screen: Option<unsafe extern "efiapi" fn(this: *mut Self) -> Status>,

    pub set_cursor_position:
        Option<unsafe extern "efiapi" fn(this: *mut Self, col: usize, row: usize) -> Status>,

    pub enable_cursor:
        Option<unsafe extern "efiapi" fn(this: *mut Self, visible: Boolean) -> Status>,

    pub mode: *mut RawTextOutputMode,
}

/// Console output attributes used by the menu
pub const ATTR_DEFAULT: usize = 0x07; // light gray on black
pub const ATTR_SELECTED: usize = 0x05; // magenta on black
pub const ATTR_TITLE: usize = 0x0f; // white on black
