//! Firmware-variable surface
//!
//! Two vendor namespaces: the systemd boot-loader-interface namespace
//! ("loader") that stage two and the OS read, and the private
//! chainloader namespace for our own telemetry. Everything is volatile
//! except the boot-attempt counter, which must survive a crash during
//! stage two. Write failures are logged and never fatal; a device that
//! can't take telemetry can still boot.

use alloc::{
    format,
    string::{String, ToString},
    vec::Vec,
};

use bitflags::bitflags;
use log::{debug, info};

use steamcl_core::{base::Guid, error::Result};

use crate::{
    platform::{log_var_failure, VarAttrs, VarStore},
    string,
};

/// The systemd boot-loader-interface vendor GUID.
pub const LOADER_VENDOR: Guid = Guid::from_fields(
    0x4a67b082,
    0x0a4c,
    0x41cf,
    [0xb6, 0xc7, 0x44, 0x0b, 0x29, 0xbb, 0x8c, 0x4f],
);

/// Private chainloader vendor GUID.
pub const CHAINLOADER_VENDOR: Guid = Guid::from_fields(
    0x399abb9b,
    0x4bee,
    0x4a18,
    [0xab, 0x5b, 0x45, 0xc6, 0xe0, 0xe8, 0xc7, 0x16],
);

/// EFI global variable vendor GUID (OsIndications and friends).
pub const GLOBAL_VENDOR: Guid = Guid::from_fields(
    0x8be4df61,
    0x93ca,
    0x11d2,
    [0xaa, 0x0d, 0x00, 0xe0, 0x98, 0x03, 0x2b, 0x8c],
);

/// OsIndications bit requesting the firmware setup UI on next boot.
pub const BOOT_TO_FW_UI: u64 = 0x1;

/// Menu timeout when LoaderConfigTimeout is absent, in seconds.
pub const DEFAULT_CONFIG_TIMEOUT: u64 = 5;

bitflags! {
    /// LoaderFeatures bits this loader implements
    pub struct LoaderFeatures: u64 {
        const CONFIG_TIMEOUT = 1 << 0;
        const CONFIG_TIMEOUT_ONE_SHOT = 1 << 1;
        const ENTRY_ONESHOT = 1 << 3;
    }
}

bitflags! {
    /// Entry flags: how the chosen entry is to be (or was) booted.
    /// Doubles as the option bits carried by menu entries.
    pub struct EntryFlags: u64 {
        const NORMAL = 1 << 0;
        const VERBOSE = 1 << 1;
        const RESET = 1 << 2;
        const MENU = 1 << 3;
        const BOOT_OTHER = 1 << 4;
    }
}

const LOADER_INFO: &str = concat!("steamcl ", env!("CARGO_PKG_VERSION"));

/// A one-shot entry override read (and deleted) from NVRAM.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OneShot {
    /// The UUID the variable parsed to, if it parsed at all.
    pub uuid: Option<Guid>,
}

/// The named variable slots, over any [`VarStore`].
pub struct LoaderVars<'a> {
    store: &'a mut dyn VarStore,
}

impl<'a> LoaderVars<'a> {
    pub fn new(store: &'a mut dyn VarStore) -> Self {
        Self { store }
    }

    fn set_str(&mut self, name: &str, vendor: &Guid, value: &str) {
        debug!("{name}: {value}");
        let data = string::to_utf16_bytes(value);
        let attrs = VarAttrs::BOOT_SERVICE_ACCESS | VarAttrs::RUNTIME_ACCESS;
        if let Err(e) = self.store.set(name, vendor, attrs, &data) {
            log_var_failure(name, e);
        }
    }

    fn set_blob(&mut self, name: &str, vendor: &Guid, nv: bool, value: u64) {
        debug!("{name}: {value:#018x}");
        let mut attrs = VarAttrs::BOOT_SERVICE_ACCESS | VarAttrs::RUNTIME_ACCESS;
        if nv {
            attrs |= VarAttrs::NON_VOLATILE;
        }
        if let Err(e) = self.store.set(name, vendor, attrs, &value.to_le_bytes()) {
            log_var_failure(name, e);
        }
    }

    fn get_str(&self, name: &str, vendor: &Guid) -> Option<String> {
        let data = self.store.get(name, vendor).ok()?;
        if data.is_empty() {
            return None;
        }
        Some(string::decode_utf16_bytes(&data))
    }

    fn get_u64(&self, name: &str, vendor: &Guid) -> Option<u64> {
        let data = self.store.get(name, vendor).ok()?;
        if data.len() < 8 {
            return None;
        }
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&data[..8]);
        Some(u64::from_le_bytes(raw))
    }

    pub fn set_time_init_usec(&mut self, usec: u64) {
        self.set_str("LoaderTimeInitUSec", &LOADER_VENDOR, &usec.to_string());
    }

    pub fn set_time_menu_usec(&mut self, usec: u64) {
        self.set_str("LoaderTimeMenuUSec", &LOADER_VENDOR, &usec.to_string());
    }

    pub fn set_time_exec_usec(&mut self, usec: u64) {
        self.set_str("LoaderTimeExecUSec", &LOADER_VENDOR, &usec.to_string());
    }

    pub fn set_info(&mut self) {
        self.set_str("LoaderInfo", &LOADER_VENDOR, LOADER_INFO);
    }

    pub fn set_firmware_info(&mut self, vendor: &str, revision: u32) {
        let info = format!("{} {}.{:02}", vendor, revision >> 16, revision & 0xffff);
        self.set_str("LoaderFirmwareInfo", &LOADER_VENDOR, &info);
    }

    pub fn set_firmware_type(&mut self, major: u32, minor: u32) {
        let ty = format!("UEFI {major}.{minor:02}");
        self.set_str("LoaderFirmwareType", &LOADER_VENDOR, &ty);
    }

    pub fn set_features(&mut self) {
        self.set_blob(
            "LoaderFeatures",
            &LOADER_VENDOR,
            false,
            LoaderFeatures::all().bits(),
        );
    }

    pub fn set_device_part_uuid(&mut self, uuid: &Guid) {
        self.set_str("LoaderDevicePartUUID", &LOADER_VENDOR, &format!("{uuid}"));
    }

    pub fn set_image_identifier(&mut self, path: &str) {
        self.set_str("LoaderImageIdentifier", &LOADER_VENDOR, path);
    }

    /// Publish the discovered entries, one `auto-bootconf-<uuid>` per
    /// candidate, each individually nul-terminated.
    pub fn set_entries(&mut self, uuids: &[Guid]) {
        let mut data = Vec::new();
        for uuid in uuids {
            data.extend_from_slice(&string::to_utf16_bytes(&format!("auto-bootconf-{uuid}")));
        }
        info!("LoaderEntries: {} entries", uuids.len());
        let attrs = VarAttrs::BOOT_SERVICE_ACCESS | VarAttrs::RUNTIME_ACCESS;
        if let Err(e) = self.store.set("LoaderEntries", &LOADER_VENDOR, attrs, &data) {
            log_var_failure("LoaderEntries", e);
        }
    }

    pub fn set_entry_default(&mut self, uuid: &Guid) {
        self.set_str(
            "LoaderEntryDefault",
            &LOADER_VENDOR,
            &format!("auto-bootconf-{uuid}"),
        );
    }

    pub fn set_entry_selected(&mut self, uuid: &Guid) {
        self.set_str(
            "LoaderEntrySelected",
            &LOADER_VENDOR,
            &format!("auto-bootconf-{uuid}"),
        );
    }

    /// Consume LoaderEntryOneShot. The variable is deleted the moment it
    /// is read, whatever it contains, so a stale override can never
    /// outlive this boot. Accepts `auto-` and `bootconf-` prefixes.
    pub fn take_entry_oneshot(&mut self) -> Option<OneShot> {
        let text = self.get_str("LoaderEntryOneShot", &LOADER_VENDOR)?;
        let _ = self.store.delete("LoaderEntryOneShot", &LOADER_VENDOR);
        info!("LoaderEntryOneShot: {text}");
        let mut body = text.as_str();
        if let Some(rest) = body.strip_prefix("auto-") {
            body = rest;
        }
        if let Some(rest) = body.strip_prefix("bootconf-") {
            body = rest;
        }
        Some(OneShot {
            uuid: Guid::parse(body),
        })
    }

    /// Menu timeout in seconds, from LoaderConfigTimeout.
    pub fn config_timeout(&self) -> u64 {
        self.get_str("LoaderConfigTimeout", &LOADER_VENDOR)
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(DEFAULT_CONFIG_TIMEOUT)
    }

    /// Consume LoaderConfigTimeoutOneShot; deleted on read like the
    /// entry override.
    pub fn take_config_timeout_oneshot(&mut self) -> Option<u64> {
        let text = self.get_str("LoaderConfigTimeoutOneShot", &LOADER_VENDOR)?;
        let _ = self
            .store
            .delete("LoaderConfigTimeoutOneShot", &LOADER_VENDOR);
        text.trim().parse().ok()
    }

    pub fn set_chain_device_part_uuid(&mut self, uuid: &Guid) {
        self.set_str(
            "ChainLoaderDevicePartUUID",
            &CHAINLOADER_VENDOR,
            &format!("{uuid}"),
        );
    }

    pub fn set_chain_image_identifier(&mut self, ident: &str) {
        self.set_str("ChainLoaderImageIdentifier", &CHAINLOADER_VENDOR, ident);
    }

    pub fn set_entry_flags(&mut self, flags: EntryFlags) {
        self.set_blob(
            "ChainLoaderEntryFlags",
            &CHAINLOADER_VENDOR,
            false,
            flags.bits(),
        );
    }

    pub fn boot_attempts(&self) -> u64 {
        self.get_u64("ChainLoaderBootAttempts", &CHAINLOADER_VENDOR)
            .unwrap_or(0)
    }

    /// Read-increment-write the persistent attempt counter. Non-volatile
    /// on purpose: it is written *before* control transfer so a crash in
    /// stage two still counts.
    pub fn bump_boot_attempts(&mut self) -> u64 {
        let attempts = self.boot_attempts() + 1;
        info!("ChainLoaderBootAttempts: {attempts}");
        self.set_blob(
            "ChainLoaderBootAttempts",
            &CHAINLOADER_VENDOR,
            true,
            attempts,
        );
        attempts
    }

    /// Whether firmware advertises BOOT_TO_FW_UI support.
    pub fn reboot_into_firmware_supported(&self) -> bool {
        self.get_u64("OsIndicationsSupported", &GLOBAL_VENDOR)
            .map(|bits| bits & BOOT_TO_FW_UI != 0)
            .unwrap_or(false)
    }

    /// Request the firmware setup UI on the next boot. Additive: other
    /// pending indications survive.
    pub fn set_boot_to_firmware(&mut self) -> Result<()> {
        let bits = self.get_u64("OsIndications", &GLOBAL_VENDOR).unwrap_or(0) | BOOT_TO_FW_UI;
        let attrs =
            VarAttrs::NON_VOLATILE | VarAttrs::BOOT_SERVICE_ACCESS | VarAttrs::RUNTIME_ACCESS;
        self.store
            .set("OsIndications", &GLOBAL_VENDOR, attrs, &bits.to_le_bytes())
    }
}
