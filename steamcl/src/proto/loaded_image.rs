//! Loaded Image protocol

use alloc::{string::String, vec::Vec};

use steamcl_core::{
    base::Handle,
    devpath,
    proto::{RawLoadedImage, LOADED_IMAGE_GUID},
};

use crate::util::{interface, protocol};

interface!(
    /// Describes a loaded image: where it came from and its arguments
    LoadedImage(RawLoadedImage)
);

protocol!(LoadedImage(RawLoadedImage), LOADED_IMAGE_GUID);

impl<'table> LoadedImage<'table> {
    /// The device handle the image was loaded from, or [`None`].
    pub fn device(&self) -> Option<Handle> {
        let device = self.interface().device_handle;
        if device.is_null() {
            None
        } else {
            Some(device)
        }
    }

    /// The image's file path on its device, as device-path bytes.
    pub fn file_path_bytes(&self) -> Option<Vec<u8>> {
        let path = self.interface().file_path;
        if path.is_null() {
            return None;
        }
        // Safety: non-null file paths are valid device paths
        Some(unsafe { devpath::clone_from_ptr(path as *const u8) })
    }

    /// The image's file path as text, e.g. `\EFI\Shell\steamcl.efi`.
    pub fn file_path_text(&self) -> Option<String> {
        devpath::file_path_text(&self.file_path_bytes()?)
    }

    /// The LoadOptions buffer decoded as UTF-16 text, if present.
    pub fn load_options_text(&self) -> Option<String> {
        let raw = self.interface();
        if raw.load_options.is_null() || raw.load_options_size == 0 {
            return None;
        }
        let bytes = raw.load_options_size as usize;
        // Safety: buffer and size come from firmware together
        let data =
            unsafe { core::slice::from_raw_parts(raw.load_options as *const u8, bytes) };
        let units: Vec<u16> = data
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .take_while(|&u| u != 0)
            .collect();
        Some(
            char::decode_utf16(units.into_iter())
                .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect(),
        )
    }

    /// Point LoadOptions at `cmd`, a nul-terminated UTF-16 command line.
    ///
    /// The recorded size is the character count, not bytes: grub reads it
    /// that way.
    ///
    /// # Safety
    ///
    /// `cmd` must stay alive until the image has been started.
    pub unsafe fn set_options_utf16(&self, cmd: &[u16]) {
        let raw = self.interface;
        (*raw).load_options = cmd.as_ptr() as *mut core::ffi::c_void;
        (*raw).load_options_size = cmd.len().saturating_sub(1) as u32;
    }
}
