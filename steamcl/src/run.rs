//! The boot orchestrator
//!
//! One pass per power-on: publish who we are, find every bootable image,
//! pick one, maybe ask a human, hand over. Everything mutable lives in
//! this sequence; the only concurrent writer is the key-notify callback,
//! which does nothing but flip an atomic flag we poll.

use alloc::{string::String, vec::Vec};
use core::{
    ffi::c_void,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use log::{debug, error, info, warn};

use steamcl_core::{
    base::{Guid, Handle, Status},
    devpath,
    error::{Error, Result},
    proto::{RawInputKey, RawKeyData, KEY_STATE_EXPOSED, SCAN_F11},
    stamp::DateTime,
    table::ResetType,
};

use crate::{
    discover::{self, SelfImage},
    exec::{self, Handoff},
    logger,
    menu::{self, Menu, MenuBackend, MenuOption, MenuOutcome, TextMenu},
    platform::{self, FsVolume, FwConsole, FwVarStore, Volume},
    proto::{
        console::SimpleTextInputEx,
        device_path::DevicePath,
        loaded_image::LoadedImage,
        media::SimpleFileSystem,
    },
    select::{self, SelectInput, Selection, FAILSAFE_TIMEOUT},
    string,
    table::{BootServices, RuntimeServices, SystemTable},
    vars::{EntryFlags, LoaderVars},
};

pub const FLAGFILE_RESTRICT: &str = "steamcl-restricted";
pub const FLAGFILE_VERBOSE: &str = "steamcl-verbose";
pub const FLAGFILE_DEBUG: &str = "steamcl-nvram-debug";
pub const FLAGFILE_MENU: &str = "steamcl-menu";

/// Runtime modes, from flag files beside the loader binary or their
/// LoadOptions token equivalents.
#[derive(Debug, Clone, Copy, Default)]
pub struct Flags {
    /// Only boot images on the loader's own disk.
    pub restricted: bool,
    pub verbose: bool,
    pub debug: bool,
    /// Always open the menu.
    pub menu: bool,
}

/// Set by the key-notify callback, polled once selection runs.
static MENU_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Firmware calls this at raised priority whenever the menu key fires.
/// It must not allocate or do I/O.
unsafe extern "efiapi" fn menu_key_notify(_key: *mut RawKeyData) -> Status {
    MENU_REQUESTED.store(true, Ordering::Relaxed);
    Status::SUCCESS
}

pub fn menu_requested() -> bool {
    MENU_REQUESTED.load(Ordering::Relaxed)
}

/// Microseconds since the Unix epoch per the firmware RTC; 0 when the
/// clock is unusable.
fn time_usec(rt: &RuntimeServices) -> u64 {
    match rt.get_time() {
        Ok(t) if t.year >= 1970 && (1..=12).contains(&t.month) => {
            let dt = DateTime {
                year: t.year,
                month: t.month,
                day: t.day,
                hour: t.hour,
                minute: t.minute,
                second: t.second,
            };
            dt.unix_seconds() * 1_000_000 + t.nanosecond as u64 / 1_000
        }
        _ => 0,
    }
}

fn probe_flags(vol: &dyn Volume, self_file: &str, load_options: Option<&str>) -> Flags {
    let probe = |flag: &str| match string::resolve_path(flag, self_file) {
        Some(path) => vol.exists(&path),
        None => false,
    };
    let mut flags = Flags {
        restricted: probe(FLAGFILE_RESTRICT),
        verbose: probe(FLAGFILE_VERBOSE),
        debug: probe(FLAGFILE_DEBUG),
        menu: probe(FLAGFILE_MENU),
    };
    if let Some(opts) = load_options {
        for token in opts.split_whitespace() {
            match token {
                FLAGFILE_RESTRICT => flags.restricted = true,
                FLAGFILE_VERBOSE => flags.verbose = true,
                FLAGFILE_DEBUG => flags.debug = true,
                FLAGFILE_MENU => flags.menu = true,
                _ => {}
            }
        }
    }
    flags
}

/// Bind the interactive-menu hot key. Failure just means no hot key.
fn install_menu_hook(st: &SystemTable) -> Option<*mut c_void> {
    let ex: SimpleTextInputEx = match st.boot().handle_protocol(st.stdin_handle()) {
        Ok(ex) => ex,
        Err(e) => {
            debug!("no extended console input: {e}");
            return None;
        }
    };
    let _ = ex.reset();
    if let Err(e) = ex.set_state(KEY_STATE_EXPOSED) {
        // not all firmware supports this
        debug!("console set_state: {e} (likely harmless)");
    }
    let key = RawKeyData {
        key: RawInputKey {
            scan_code: SCAN_F11,
            unicode_char: 0,
        },
        state: Default::default(),
    };
    match ex.register_key_notify(key, menu_key_notify) {
        Ok(binding) => Some(binding),
        Err(e) => {
            debug!("cannot bind menu key: {e}");
            None
        }
    }
}

/// One boot, start to finish. Always comes back with the status the
/// firmware should see; the caller in `efi_main` converts it.
pub fn run(image: Handle, st: &SystemTable) -> Result<()> {
    let boot = st.boot();
    let rt = st.runtime();
    let mut store = FwVarStore::new(st.runtime());
    let mut vars = LoaderVars::new(&mut store);

    vars.set_time_init_usec(time_usec(&rt));

    // where we were loaded from
    let this: LoadedImage = boot.handle_protocol(image)?;
    let device = this.device().ok_or(Error::new(Status::NOT_FOUND))?;
    let self_file = this.file_path_text().unwrap_or_default();
    let load_options = this.load_options_text();

    let dp: DevicePath = boot.handle_protocol(device)?;
    let self_path = dp.to_bytes();
    let esp_uuid = devpath::harddrive_signature(&self_path).unwrap_or(Guid::NULL);

    // flag files sit beside the loader binary
    let flags = match FsVolume::mount(&boot, device) {
        Ok(vol) => {
            let flags = probe_flags(&vol, &self_file, load_options.as_deref());
            vol.unmount();
            flags
        }
        Err(e) => {
            warn!("cannot mount the boot volume: {e}");
            Flags::default()
        }
    };
    logger::apply_verbosity(flags.verbose, flags.debug);
    debug!("{flags:?}");

    // identity, for stage two and the OS
    vars.set_info();
    vars.set_firmware_info(&st.firmware_vendor(), st.firmware_revision());
    let rev = st.uefi_revision();
    vars.set_firmware_type(rev.major(), rev.minor());
    vars.set_features();
    vars.set_device_part_uuid(&esp_uuid);
    vars.set_image_identifier(&self_file);

    let _hook = install_menu_hook(st);

    // every filesystem firmware can see
    let handles = boot.handles_for_protocol::<SimpleFileSystem>()?;
    let mut volumes: Vec<FsVolume> = Vec::new();
    for (i, &handle) in handles.iter().enumerate() {
        match FsVolume::mount(&boot, handle) {
            Ok(vol) => volumes.push(vol),
            Err(e) => warn!("filesystem #{i}: not mountable: {e}"),
        }
    }
    let esp = volumes.iter().position(|v| v.handle() == device);

    if let Some(esp) = esp {
        discover::migrate_configs(&volumes, esp, &esp_uuid);
    }

    let this_image = SelfImage {
        esp,
        esp_uuid,
        restricted: if flags.restricted {
            Some(self_path.as_slice())
        } else {
            None
        },
    };
    let mut cands = discover::discover(&volumes, &this_image);
    select::rank(&mut cands);
    select::dedup_labels(&mut cands);

    let uuids: Vec<Guid> = cands.iter().map(|c| c.part_uuid).collect();
    vars.set_entries(&uuids);

    let input = SelectInput {
        oneshot: vars.take_entry_oneshot(),
        interactive: menu_requested(),
        menu_flag: flags.menu,
        config_timeout: vars.config_timeout(),
        oneshot_timeout: vars.take_config_timeout_oneshot(),
    };

    let res = boot_flow(st, &boot, image, &mut vars, &volumes, &cands, &input, &flags);

    // Only reached when there was nothing to boot or the handoff came
    // back. Ask for the firmware setup UI if the firmware can do that,
    // otherwise give the next boot entry its chance.
    if vars.reboot_into_firmware_supported() {
        info!("rebooting into firmware setup");
        if let Err(e) = vars.set_boot_to_firmware() {
            warn!("cannot request firmware setup: {e}");
        } else {
            let _ = rt.reset(ResetType::COLD, Status::SUCCESS);
        }
    }
    info!("returning to firmware in 5s");
    let _ = boot.stall(Duration::from_secs(5));

    res
}

#[allow(clippy::too_many_arguments)]
fn boot_flow(
    st: &SystemTable,
    boot: &BootServices,
    image: Handle,
    vars: &mut LoaderVars,
    volumes: &[FsVolume],
    cands: &[discover::Candidate],
    input: &SelectInput,
    flags: &Flags,
) -> Result<()> {
    let selection = match select::choose(cands, input) {
        Some(selection) => selection,
        None => {
            error!("no valid boot image found");
            show_failure_notice(st);
            return Err(Error::new(Status::NOT_FOUND));
        }
    };

    let (chosen_idx, menu_bits) = match selection.menu {
        Some(plan) => {
            info!("opening boot menu ({:?})", plan.reason);
            vars.set_time_menu_usec(time_usec(&st.runtime()));
            run_menu(st, cands, &selection, plan.preselect, plan.timeout_secs)?
        }
        None => (selection.index, EntryFlags::empty()),
    };

    let chosen = &cands[chosen_idx];
    let mut all_bits = selection.entry_flags | menu_bits;
    if chosen_idx != selection.index {
        // the human overrode the engine; the walk's verdict no longer
        // describes what is being booted
        all_bits -= EntryFlags::BOOT_OTHER;
    }

    let command_line = select::command_line(all_bits, flags.verbose, flags.debug);
    let handoff = Handoff {
        partition_path: volumes[chosen.volume].device_path(),
        loader_path: &chosen.loader_path,
        part_uuid: chosen.part_uuid,
        ident: &chosen.ident,
        default_uuid: cands[selection.index].part_uuid,
        flags: all_bits,
        command_line,
    };
    exec::exec_loader(boot, image, vars, &handoff, time_usec(&st.runtime()))
}

/// Run the menu until it produces something actionable. The factory
/// reset option is confirmation-gated; declining returns to the menu.
fn run_menu(
    st: &SystemTable,
    cands: &[discover::Candidate],
    selection: &Selection,
    preselect: usize,
    timeout_secs: u64,
) -> Result<(usize, EntryFlags)> {
    let menu = select::build_menu(cands, selection);
    let start = select::start_option(cands, preselect);

    let mut con = FwConsole::new(st);
    con.pick_best_mode();

    let mut up_for_ms = 0;
    let outcome = loop {
        let (outcome, elapsed_ms) = TextMenu::new(&mut con).run(&menu, start, timeout_secs)?;
        up_for_ms += elapsed_ms;
        let chosen = match outcome {
            MenuOutcome::Chosen(i) | MenuOutcome::TimedOut(i) => i,
            MenuOutcome::Cancelled => break outcome,
        };
        if menu.options[chosen].bits.contains(EntryFlags::RESET) {
            if menu::confirm(&mut con, "Factory reset: erase user data and reinstall?", false) {
                break outcome;
            }
            continue;
        }
        break outcome;
    };
    platform::reset_console(&mut con);
    debug!("menu was up for {up_for_ms} ms");

    match outcome {
        MenuOutcome::Chosen(i) | MenuOutcome::TimedOut(i) => {
            let opt = &menu.options[i];
            Ok((opt.candidate, opt.bits))
        }
        // Esc: boot the engine's selection with no menu extras
        MenuOutcome::Cancelled => Ok((selection.index, EntryFlags::empty())),
    }
}

/// Nothing is bootable: say so on screen for long enough to be read,
/// offering the only exit there is.
fn show_failure_notice(st: &SystemTable) {
    let menu = Menu {
        title: String::from("SteamOS chainloader"),
        options: alloc::vec![MenuOption {
            label: String::from("Reboot into firmware setup"),
            blurb: String::from("No bootable OS image was found"),
            candidate: 0,
            bits: EntryFlags::empty(),
        }],
    };
    let mut con = FwConsole::new(st);
    con.pick_best_mode();
    let _ = TextMenu::new(&mut con).run(&menu, 0, FAILSAFE_TIMEOUT);
    platform::reset_console(&mut con);
}
