//! UEFI base types
//!
//! UEFI's native widths map directly onto Rust: `UINTN`/`INTN` are
//! `usize`/`isize`, `UINT<X>`/`INT<X>` are `u<X>`/`i<X>`, `VOID` is
//! [`c_void`][`core::ffi::c_void`]. The types here are the scalar
//! carriers everything else is built from.
//!
//! # References
//!
//! - [UEFI Section 2.3.][uefi_cc]
//!
//! [uefi_cc]: <https://uefi.org/specs/UEFI/2.10/02_Overview.html#calling-conventions>
use core::{ffi::c_void, fmt, ptr::null_mut};

use nuuid::Uuid;

/// High bit of a status word, indicating error
const ERROR_BIT: usize = 1 << (usize::BITS - 1);

/// UEFI logical Boolean type
///
/// ABI identical to a `u8`, mapping `0` to [`false`] and anything else to
/// [`true`]. Firmware in the wild emits values other than 0 and 1, which
/// would be instant UB read as a Rust `bool`; this type is valid for all
/// `u8` and so always sound.
#[derive(Debug, Clone, Copy, Eq, Default)]
#[repr(transparent)]
pub struct Boolean(u8);

impl Boolean {
    #[inline]
    pub const fn to_bool(self) -> bool {
        self.0 != 0
    }
}

impl PartialEq for Boolean {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.to_bool().eq(&other.to_bool())
    }
}

impl From<bool> for Boolean {
    #[inline]
    fn from(value: bool) -> Self {
        Self(value as u8)
    }
}

impl From<Boolean> for bool {
    #[inline]
    fn from(value: Boolean) -> Self {
        value.to_bool()
    }
}

/// A 1-byte UEFI character, ASCII Latin-1 unless specified otherwise.
pub type Char8 = u8;

/// A 2-byte UEFI character, UCS-2/UTF-16 as defined by Unicode 2.1 and
/// ISO/IEC 10646 unless specified otherwise.
pub type Char16 = u16;

/// UEFI Globally Unique Identifier
///
/// ABI identical to a 64-bit aligned 128-bit buffer, stored in the EFI
/// in-memory ("mixed-endian") layout: the first three groups are
/// little-endian, the rest is a plain byte sequence.
///
/// See [Appendix A. GUID and Time Formats][aa] for the gory details.
///
/// [aa]: <https://uefi.org/specs/UEFI/2.10/Apx_A_GUID_and_Time_Formats.html>
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(C, align(8))]
pub struct Guid([u8; 16]);

impl Guid {
    /// The all-zero GUID
    pub const NULL: Self = Self([0u8; 16]);

    /// Create a new [`Guid`] directly from in-memory `bytes`
    #[inline]
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Create a [`Guid`] from the classic `data1..data4` field form used
    /// by C GUID definitions, converting to the in-memory layout.
    pub const fn from_fields(d1: u32, d2: u16, d3: u16, d4: [u8; 8]) -> Self {
        let a = d1.to_le_bytes();
        let b = d2.to_le_bytes();
        let c = d3.to_le_bytes();
        Self([
            a[0], a[1], a[2], a[3], //
            b[0], b[1], //
            c[0], c[1], //
            d4[0], d4[1], d4[2], d4[3], d4[4], d4[5], d4[6], d4[7],
        ])
    }

    /// Raw in-memory GUID bytes
    #[inline]
    pub const fn to_bytes(self) -> [u8; 16] {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        let mut i = 0;
        while i < 16 {
            if self.0[i] != 0 {
                return false;
            }
            i += 1;
        }
        true
    }

    /// Parse canonical `aabbccdd-eeff-gghh-iijj-kkllmmnnoopp` text, in
    /// either case, into the in-memory layout. Returns [`None`] for
    /// anything that is not a well-formed UUID.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_me(s).ok().map(|u| Self(u.to_bytes()))
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Uuid::from_bytes_me(self.0).fmt(f)
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({self})")
    }
}

/// UEFI Status codes
///
/// ABI identical to a [`usize`]
///
/// # References
///
/// See [Appendix D. Status Codes][ad] for the exact values
///
/// [ad]: <https://uefi.org/specs/UEFI/2.10/Apx_D_Status_Codes.html>
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Status(usize);

impl Status {
    /// Create a new [`Status`]
    #[inline]
    pub const fn new(code: usize) -> Self {
        Self(code)
    }

    /// Raw UEFI status code
    #[inline]
    pub const fn code(self) -> usize {
        self.0
    }

    #[inline]
    pub const fn is_success(self) -> bool {
        self.0 == Self::SUCCESS.0
    }

    #[inline]
    pub const fn is_warning(self) -> bool {
        self.0 != 0 && self.0 & ERROR_BIT == 0
    }

    #[inline]
    pub const fn is_error(self) -> bool {
        self.0 & ERROR_BIT != 0
    }
}

impl Status {
    pub const SUCCESS: Self = Self(0);

    pub const WARN_UNKNOWN_GLYPH: Self = Self(1);
    pub const WARN_DELETE_FAILURE: Self = Self(2);
    pub const WARN_WRITE_FAILURE: Self = Self(3);
    pub const WARN_BUFFER_TOO_SMALL: Self = Self(4);
    pub const WARN_STALE_DATA: Self = Self(5);

    pub const LOAD_ERROR: Self = Self(ERROR_BIT | 1);
    pub const INVALID_PARAMETER: Self = Self(ERROR_BIT | 2);
    pub const UNSUPPORTED: Self = Self(ERROR_BIT | 3);
    pub const BAD_BUFFER_SIZE: Self = Self(ERROR_BIT | 4);
    pub const BUFFER_TOO_SMALL: Self = Self(ERROR_BIT | 5);
    pub const NOT_READY: Self = Self(ERROR_BIT | 6);
    pub const DEVICE_ERROR: Self = Self(ERROR_BIT | 7);
    pub const WRITE_PROTECTED: Self = Self(ERROR_BIT | 8);
    pub const OUT_OF_RESOURCES: Self = Self(ERROR_BIT | 9);
    pub const VOLUME_CORRUPTED: Self = Self(ERROR_BIT | 10);
    pub const VOLUME_FULL: Self = Self(ERROR_BIT | 11);
    pub const NO_MEDIA: Self = Self(ERROR_BIT | 12);
    pub const MEDIA_CHANGED: Self = Self(ERROR_BIT | 13);
    pub const NOT_FOUND: Self = Self(ERROR_BIT | 14);
    pub const ACCESS_DENIED: Self = Self(ERROR_BIT | 15);
    pub const NO_RESPONSE: Self = Self(ERROR_BIT | 16);
    pub const NO_MAPPING: Self = Self(ERROR_BIT | 17);
    pub const TIMEOUT: Self = Self(ERROR_BIT | 18);
    pub const NOT_STARTED: Self = Self(ERROR_BIT | 19);
    pub const ALREADY_STARTED: Self = Self(ERROR_BIT | 20);
    pub const ABORTED: Self = Self(ERROR_BIT | 21);
    pub const ICMP_ERROR: Self = Self(ERROR_BIT | 22);
    pub const TFTP_ERROR: Self = Self(ERROR_BIT | 23);
    pub const PROTOCOL_ERROR: Self = Self(ERROR_BIT | 24);
    pub const INCOMPATIBLE_VERSION: Self = Self(ERROR_BIT | 25);
    pub const SECURITY_VIOLATION: Self = Self(ERROR_BIT | 26);
    pub const CRC_ERROR: Self = Self(ERROR_BIT | 27);
    pub const END_OF_MEDIA: Self = Self(ERROR_BIT | 28);
    pub const END_OF_FILE: Self = Self(ERROR_BIT | 31);
    pub const INVALID_LANGUAGE: Self = Self(ERROR_BIT | 32);
    pub const COMPROMISED_DATA: Self = Self(ERROR_BIT | 33);
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Status::SUCCESS => write!(f, "success"),

            Status::WARN_UNKNOWN_GLYPH => write!(f, "unknown glyph"),
            Status::WARN_DELETE_FAILURE => write!(f, "delete failure"),
            Status::WARN_WRITE_FAILURE => write!(f, "write failure"),
            Status::WARN_BUFFER_TOO_SMALL => write!(f, "buffer too small warning"),
            Status::WARN_STALE_DATA => write!(f, "stale data"),

            Status::LOAD_ERROR => write!(f, "load error"),
            Status::INVALID_PARAMETER => write!(f, "invalid parameter"),
            Status::UNSUPPORTED => write!(f, "unsupported"),
            Status::BAD_BUFFER_SIZE => write!(f, "bad buffer"),
            Status::BUFFER_TOO_SMALL => write!(f, "buffer too small error"),
            Status::NOT_READY => write!(f, "not ready"),
            Status::DEVICE_ERROR => write!(f, "device error"),
            Status::WRITE_PROTECTED => write!(f, "write protected"),
            Status::OUT_OF_RESOURCES => write!(f, "out of resources"),
            Status::VOLUME_CORRUPTED => write!(f, "volume corrupted"),
            Status::VOLUME_FULL => write!(f, "volume full"),
            Status::NO_MEDIA => write!(f, "no media"),
            Status::MEDIA_CHANGED => write!(f, "media changed"),
            Status::NOT_FOUND => write!(f, "not found"),
            Status::ACCESS_DENIED => write!(f, "access denied"),
            Status::NO_RESPONSE => write!(f, "no response"),
            Status::NO_MAPPING => write!(f, "no mapping"),
            Status::TIMEOUT => write!(f, "time out"),
            Status::NOT_STARTED => write!(f, "not started"),
            Status::ALREADY_STARTED => write!(f, "already started"),
            Status::ABORTED => write!(f, "aborted"),
            Status::PROTOCOL_ERROR => write!(f, "protocol error"),
            Status::INCOMPATIBLE_VERSION => write!(f, "incompatible version"),
            Status::SECURITY_VIOLATION => write!(f, "security violation"),
            Status::CRC_ERROR => write!(f, "crc error"),
            Status::END_OF_MEDIA => write!(f, "end of media"),
            Status::END_OF_FILE => write!(f, "end of file"),
            Status::COMPROMISED_DATA => write!(f, "compromised data"),
            status => write!(f, "{status:?}"),
        }
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Status")
            .field(&self.0)
            .field(&format_args!("[Display] {self}"))
            .finish()
    }
}

/// An opaque handle to a UEFI object
///
/// ABI identical to a [`*mut c_void`], and may be null.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Handle(*mut c_void);

impl Handle {
    /// Create a new [`Handle`]
    ///
    /// # Safety
    ///
    /// `p` must be an actual UEFI handle, obtained from firmware. Much of
    /// the library relies on this.
    #[inline]
    pub const unsafe fn new(p: *mut c_void) -> Self {
        Self(p)
    }

    /// A null [`Handle`]. Safe because null is never dereferenced, only
    /// rejected.
    #[inline]
    pub const fn null() -> Self {
        Self(null_mut())
    }

    #[inline]
    pub const fn as_ptr(self) -> *mut c_void {
        self.0
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

/// An opaque handle to a UEFI event
///
/// ABI identical to a [`*mut c_void`], and may be null.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Event(*mut c_void);

impl Event {
    /// Create a new [`Event`]
    ///
    /// # Safety
    ///
    /// `p` must be an actual UEFI event, or something only ever handed
    /// back to the mock that fabricated it.
    #[inline]
    pub const unsafe fn new(p: *mut c_void) -> Self {
        Self(p)
    }

    #[inline]
    pub const fn null() -> Self {
        Self(null_mut())
    }

    #[inline]
    pub const fn as_ptr(self) -> *mut c_void {
        self.0
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}
