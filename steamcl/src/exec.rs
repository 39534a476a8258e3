//! Handoff to the stage-two loader
//!
//! The point of no return: build the absolute device path of the chosen
//! loader, load it, give it its command line, write the telemetry the
//! next stage and the OS read, and jump. If control ever comes back the
//! boot has failed and the orchestrator picks up the pieces.

use alloc::string::String;

use log::{info, warn};

use steamcl_core::{base::Guid, base::Handle, devpath::DevicePathBuf, error::Result};

use crate::{
    proto::loaded_image::LoadedImage,
    string,
    table::BootServices,
    vars::{EntryFlags, LoaderVars},
};

/// Everything the handoff needs to know about the chosen entry.
pub struct Handoff<'a> {
    /// Device path bytes of the partition the loader lives on.
    pub partition_path: &'a [u8],
    /// Absolute path of the loader on that partition.
    pub loader_path: &'a str,
    /// Partition UUID of the chosen image.
    pub part_uuid: Guid,
    /// Image slot name.
    pub ident: &'a str,
    /// Partition UUID of the engine's primary selection, for
    /// LoaderEntryDefault.
    pub default_uuid: Guid,
    pub flags: EntryFlags,
    pub command_line: String,
}

/// Write the handoff telemetry. Runs strictly before control transfer so
/// a crash in stage two still leaves a full record, attempt counter
/// included.
pub fn record_handoff_vars(vars: &mut LoaderVars, h: &Handoff) {
    vars.set_entry_default(&h.default_uuid);
    vars.set_entry_selected(&h.part_uuid);
    vars.set_chain_device_part_uuid(&h.part_uuid);
    vars.set_chain_image_identifier(h.ident);
    vars.set_entry_flags(h.flags);
    vars.bump_boot_attempts();
}

/// Load and execute the chosen loader. Only returns if loading failed or
/// the loaded image exited.
pub fn exec_loader(
    boot: &BootServices,
    parent: Handle,
    vars: &mut LoaderVars,
    h: &Handoff,
    exec_usec: u64,
) -> Result<()> {
    let dpath = DevicePathBuf::file_on_device(h.partition_path, h.loader_path);
    info!("loading {} from partition {}", h.loader_path, h.part_uuid);

    let image = boot.load_image(parent, dpath.as_bytes())?;

    let child: LoadedImage = boot.handle_protocol(image)?;
    let cmdline = string::to_utf16(&h.command_line);
    if !h.command_line.is_empty() {
        info!("command line: {}", h.command_line);
    }
    // Safety: `cmdline` lives until start_image below has returned
    unsafe { child.set_options_utf16(&cmdline) };

    record_handoff_vars(vars, h);
    vars.set_time_exec_usec(exec_usec);

    // Safety: freshly loaded image, started exactly once
    let res = unsafe { boot.start_image(image) };

    // still alive: the stage-two loader gave control back
    match &res {
        Ok(()) => warn!("stage-two loader exited cleanly"),
        Err(e) => warn!("stage-two loader failed: {e}"),
    }

    if let Err(e) = boot.unload_image(image) {
        warn!("unload of stage-two image failed: {e}");
    }

    res
}
