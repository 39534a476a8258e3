//! Device Path protocol
//!
//! The wrapper only exists to get the path bytes off a handle; all real
//! work on device paths is byte-level and lives in
//! [`steamcl_core::devpath`].

use alloc::vec::Vec;

use steamcl_core::{devpath, proto::RawDevicePath, proto::DEVICE_PATH_GUID};

use crate::util::{interface, protocol};

interface!(
    /// The device path hanging off a handle
    DevicePath(RawDevicePath)
);

protocol!(DevicePath(RawDevicePath), DEVICE_PATH_GUID);

impl<'table> DevicePath<'table> {
    /// Copy the whole path, END node included, out of firmware memory.
    pub fn to_bytes(&self) -> Vec<u8> {
        // Safety: construction guarantees a valid device path
        unsafe { devpath::clone_from_ptr(self.interface as *const u8) }
    }
}
