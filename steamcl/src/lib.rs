//! steamcl — first-stage UEFI chainloader for an A/B-slotted SteamOS
//!
//! Firmware hands control to [`efi_main`]; the loader discovers every
//! candidate OS image it can see, reads the per-image bootconf, picks
//! one (or asks, via the menu), and chains into that image's
//! second-stage loader. The selection logic is deliberately isolated
//! from firmware behind the [`platform`] traits so the whole decision
//! path runs on the host under `cargo test` — the tests hand
//! [`efi_main`] and the platform traits mocks, firmware hands them the
//! real thing.
#![no_std]

extern crate alloc;

use core::{
    ffi::c_void,
    ptr::null_mut,
    sync::atomic::{AtomicPtr, Ordering},
};

use steamcl_core::{
    base::{Handle, Status},
    table::RawSystemTable,
};

use crate::table::SystemTable;

pub mod discover;
pub mod exec;
pub mod handlers;
pub mod logger;
pub mod mem;
pub mod menu;
pub mod platform;
pub mod proto;
pub mod run;
pub mod select;
pub mod string;
pub mod table;
mod util;
pub mod vars;

#[cfg(test)]
mod tests;

/// The SystemTable pointer. Uses Acquire/Release.
static TABLE: AtomicPtr<RawSystemTable> = AtomicPtr::new(null_mut());

/// Our own image handle. Uses Relaxed, synchronised by [`TABLE`].
static HANDLE: AtomicPtr<c_void> = AtomicPtr::new(null_mut());

/// The global [`SystemTable`], once [`efi_main`] has validated it.
pub(crate) fn get_boot_table() -> Option<SystemTable<'static>> {
    let table = TABLE.load(Ordering::Acquire);
    if table.is_null() {
        return None;
    }
    // Safety:
    // - Table is not null
    // - Table was validated at entry, or this code could not be running
    Some(unsafe { SystemTable::new(table) })
}

/// Our image handle, once [`efi_main`] has stored it.
pub(crate) fn get_image_handle() -> Option<Handle> {
    let handle = HANDLE.load(Ordering::Relaxed);
    if handle.is_null() {
        None
    } else {
        // Safety: stored from the firmware-provided handle
        Some(unsafe { Handle::new(handle) })
    }
}

/// UEFI entry point.
///
/// Validates the tables, publishes them to the rest of the crate, wires
/// up logging, and runs one pass of the boot orchestrator. The status
/// returned to firmware is the last observed error; success means stage
/// two took over and then exited cleanly, which firmware treats the
/// same as any other return.
#[no_mangle]
pub extern "efiapi" fn efi_main(image: Handle, system_table: *mut RawSystemTable) -> Status {
    if image.is_null() || system_table.is_null() {
        return Status::INVALID_PARAMETER;
    }

    // Safety: the pointer comes from firmware (or a test's mock built to
    // the same layout)
    if let Err(e) = unsafe { RawSystemTable::validate(system_table) } {
        return e.status();
    }
    HANDLE.store(image.as_ptr(), Ordering::Relaxed);
    TABLE.store(system_table, Ordering::Release);

    logger::init();

    // Safety: non-null, validated above
    let st = unsafe { SystemTable::new(system_table) };
    match run::run(image, &st) {
        Ok(()) => Status::SUCCESS,
        Err(e) => e.status(),
    }
}

/// Firmware-build glue: heap and panic plumbing that host test builds
/// get from std instead.
#[cfg(all(target_os = "uefi", not(test)))]
mod fw_glue {
    use core::panic::PanicInfo;

    use crate::{handlers, mem::UefiAlloc};

    #[global_allocator]
    static ALLOCATOR: UefiAlloc = UefiAlloc::new();

    #[panic_handler]
    fn panic(info: &PanicInfo) -> ! {
        handlers::panic(info)
    }
}
