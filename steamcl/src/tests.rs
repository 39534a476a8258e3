//! Boot-selection tests over the in-memory platform
//!
//! The raw-table mock drives `efi_main` the way firmware would; the
//! platform mocks drive discovery, selection, variables and the menu
//! directly. Together they cover the selection state machine end to
//! end without ever touching real firmware.


use alloc::{format, string::String, vec, vec::Vec};
use core::ptr::null_mut;

use steamcl_core::{base::Guid, base::Status, config::Store};

use crate::{
    discover::{self, Candidate, SelfImage, CONF_DIR, LEGACY_CONF, PARTSETS_DIR, STEAMOS_LOADER},
    efi_main,
    exec::{self, Handoff},
    menu::{confirm, Menu, MenuBackend, MenuOutcome, TextMenu},
    platform::VarAttrs,
    select::{self, MenuReason, SelectInput},
    string,
    vars::{EntryFlags, LoaderVars, OneShot, CHAINLOADER_VENDOR, GLOBAL_VENDOR, LOADER_VENDOR},
};

use mock::{disk_path, mock_system_table, uuid, valid_pe, MemVarStore, MemVolume, ScriptedConsole};

// ---------------------------------------------------------------------
// selection engine
// ---------------------------------------------------------------------

fn cand(n: u8, requested_at: u64, boot_other: bool, tries: u64) -> Candidate {
    let mut config = Store::new();
    config.set_string("title", &format!("Image {n}"));
    config.set_uint("boot-other", boot_other as u64);
    config.set_uint("boot-attempts", tries);
    config.set_stamp("boot-requested-at", requested_at);
    Candidate {
        volume: n as usize,
        part_uuid: uuid(n),
        ident: format!("{n}"),
        loader_path: String::from(STEAMOS_LOADER),
        label: format!("Image {n}"),
        config,
        disabled: false,
        requested_at,
        boot_time: 0,
        tries,
    }
}

fn ranked(mut cands: Vec<Candidate>) -> Vec<Candidate> {
    select::rank(&mut cands);
    cands
}

#[test]
fn newest_requested_image_wins() {
    let cands = ranked(vec![
        cand(1, 20_240_101_000_000, false, 0),
        cand(2, 20_240_102_000_000, false, 0),
    ]);
    let sel = select::choose(&cands, &SelectInput::default()).unwrap();
    assert_eq!(cands[sel.index].part_uuid, uuid(2));
    assert!(sel.menu.is_none());
    assert_eq!(sel.entry_flags, EntryFlags::empty());
    assert_eq!(
        select::command_line(sel.entry_flags, false, false),
        ""
    );
}

#[test]
fn boot_other_defers_to_sibling() {
    let cands = ranked(vec![
        cand(1, 20_240_101_000_000, false, 0),
        cand(2, 20_240_102_000_000, true, 0),
    ]);
    let sel = select::choose(&cands, &SelectInput::default()).unwrap();
    assert_eq!(cands[sel.index].part_uuid, uuid(1));
    assert!(sel.menu.is_none());
    assert!(sel.entry_flags.contains(EntryFlags::BOOT_OTHER));
    // booting "the other" never shows up on the command line
    assert_eq!(select::command_line(sel.entry_flags, false, false), "");
}

#[test]
fn all_boot_other_boots_the_oldest() {
    let cands = ranked(vec![
        cand(1, 20_240_101_000_000, true, 0),
        cand(2, 20_240_102_000_000, true, 0),
    ]);
    let sel = select::choose(&cands, &SelectInput::default()).unwrap();
    assert_eq!(cands[sel.index].part_uuid, uuid(1));
    assert!(sel.entry_flags.contains(EntryFlags::BOOT_OTHER));
}

#[test]
fn disabled_images_rank_last_but_stay_bootable() {
    let mut newest = cand(2, 20_240_102_000_000, false, 0);
    newest.disabled = true;
    let cands = ranked(vec![cand(1, 20_240_101_000_000, false, 0), newest]);
    // the enabled slot wins despite the older request stamp
    let sel = select::choose(&cands, &SelectInput::default()).unwrap();
    assert_eq!(cands[sel.index].part_uuid, uuid(1));
    // with nothing else left, a disabled slot is still offered
    let only = ranked(vec![{
        let mut c = cand(3, 20_240_101_000_000, false, 0);
        c.disabled = true;
        c
    }]);
    let sel = select::choose(&only, &SelectInput::default()).unwrap();
    assert_eq!(only[sel.index].part_uuid, uuid(3));
}

#[test]
fn failing_slot_opens_failsafe_menu() {
    let cands = ranked(vec![
        cand(1, 20_240_101_000_000, false, 0),
        cand(2, 20_240_102_000_000, false, select::MAX_BOOT_FAILURES),
    ]);
    let sel = select::choose(&cands, &SelectInput::default()).unwrap();
    assert_eq!(cands[sel.index].part_uuid, uuid(2));
    let plan = sel.menu.unwrap();
    assert_eq!(plan.reason, MenuReason::Failsafe);
    assert_eq!(plan.timeout_secs, 30);
    // the failing slot itself keeps the highlight below SUPERMAX
    assert_eq!(plan.preselect, sel.index);
}

#[test]
fn supermax_preselects_healthier_sibling() {
    let cands = ranked(vec![
        cand(1, 20_240_101_000_000, false, 0),
        cand(2, 20_240_102_000_000, false, select::SUPERMAX_BOOT_FAILURES),
    ]);
    let sel = select::choose(&cands, &SelectInput::default()).unwrap();
    // the engine still selects the newest entry
    assert_eq!(cands[sel.index].part_uuid, uuid(2));
    let plan = sel.menu.unwrap();
    assert_eq!(plan.reason, MenuReason::Failsafe);
    assert_eq!(plan.timeout_secs, 120);
    assert_eq!(cands[plan.preselect].part_uuid, uuid(1));
    // ... and the healthier sibling maps to the first displayed option
    assert_eq!(select::start_option(&cands, plan.preselect), 0);
}

#[test]
fn oneshot_override_replaces_selection() {
    let cands = ranked(vec![
        cand(1, 20_240_101_000_000, false, 0),
        cand(2, 20_240_102_000_000, false, 0),
    ]);
    let input = SelectInput {
        oneshot: Some(OneShot {
            uuid: Some(uuid(1)),
        }),
        ..Default::default()
    };
    let sel = select::choose(&cands, &input).unwrap();
    assert_eq!(cands[sel.index].part_uuid, uuid(1));
    assert!(sel.menu.is_none());
    assert_eq!(sel.entry_flags, EntryFlags::empty());
}

#[test]
fn oneshot_can_force_a_boot_other_slot() {
    let cands = ranked(vec![
        cand(1, 20_240_101_000_000, true, 0),
        cand(2, 20_240_102_000_000, false, 0),
    ]);
    let input = SelectInput {
        oneshot: Some(OneShot {
            uuid: Some(uuid(1)),
        }),
        ..Default::default()
    };
    let sel = select::choose(&cands, &input).unwrap();
    assert_eq!(cands[sel.index].part_uuid, uuid(1));
    // forced by one-shot: the boot-other key does not set the flag
    assert!(!sel.entry_flags.contains(EntryFlags::BOOT_OTHER));
}

#[test]
fn dangling_oneshot_forces_failsafe_menu() {
    let cands = ranked(vec![
        cand(1, 20_240_101_000_000, false, 0),
        cand(2, 20_240_102_000_000, false, 0),
    ]);
    for oneshot in [OneShot { uuid: Some(uuid(9)) }, OneShot { uuid: None }] {
        let input = SelectInput {
            oneshot: Some(oneshot),
            ..Default::default()
        };
        let sel = select::choose(&cands, &input).unwrap();
        // selection falls back to the primary
        assert_eq!(cands[sel.index].part_uuid, uuid(2));
        assert_eq!(sel.menu.unwrap().reason, MenuReason::Failsafe);
    }
}

#[test]
fn interactive_menu_never_times_out() {
    let cands = ranked(vec![cand(1, 20_240_101_000_000, false, 0)]);
    let input = SelectInput {
        interactive: true,
        ..Default::default()
    };
    let plan = select::choose(&cands, &input).unwrap().menu.unwrap();
    assert_eq!(plan.reason, MenuReason::Interactive);
    assert_eq!(plan.timeout_secs, 0);
}

#[test]
fn menu_flag_uses_configured_timeout() {
    let cands = ranked(vec![cand(1, 20_240_101_000_000, false, 0)]);
    let input = SelectInput {
        menu_flag: true,
        config_timeout: 5,
        ..Default::default()
    };
    let plan = select::choose(&cands, &input).unwrap().menu.unwrap();
    assert_eq!(plan.reason, MenuReason::Config);
    assert_eq!(plan.timeout_secs, 5);

    let input = SelectInput {
        menu_flag: true,
        config_timeout: 5,
        oneshot_timeout: Some(9),
        ..Default::default()
    };
    let plan = select::choose(&cands, &input).unwrap().menu.unwrap();
    assert_eq!(plan.timeout_secs, 9);
}

#[test]
fn empty_candidate_list_selects_nothing() {
    assert!(select::choose(&[], &SelectInput::default()).is_none());
}

#[test]
fn menu_offers_two_options_per_image_plus_reset() {
    let cands = ranked(vec![
        cand(1, 20_240_101_000_000, false, 0),
        cand(2, 20_240_102_000_000, false, 0),
    ]);
    let sel = select::choose(&cands, &SelectInput::default()).unwrap();
    let menu = select::build_menu(&cands, &sel);
    assert_eq!(menu.options.len(), 5);
    // oldest image first
    assert_eq!(menu.options[0].label, "Boot Image 1");
    assert!(menu.options[1].bits.contains(EntryFlags::MENU));
    assert_eq!(menu.options[2].label, "Boot Image 2");
    // the reset trailer is bound to the engine's selection
    let reset = menu.options.last().unwrap();
    assert!(reset.bits.contains(EntryFlags::RESET));
    assert_eq!(reset.candidate, sel.index);
    // the selection's own boot option carries the starting highlight
    assert_eq!(select::start_option(&cands, sel.index), 2);
}

// ---------------------------------------------------------------------
// discovery
// ---------------------------------------------------------------------

const ESP_UUID_BYTE: u8 = 0xe5;

fn esp_volume() -> MemVolume {
    MemVolume::new(disk_path(1, 1, uuid(ESP_UUID_BYTE)))
}

fn image_volume(disk: u8, part_index: u32, n: u8, ident: &str) -> MemVolume {
    let vol = MemVolume::new(disk_path(disk, part_index, uuid(n)));
    vol.add_file(
        &format!("{PARTSETS_DIR}\\{ident}"),
        format!("efi: {}\n", uuid(n)).as_bytes(),
        20_240_101_000_000,
    );
    vol.add_file(STEAMOS_LOADER, &valid_pe(), 20_240_101_000_000);
    vol
}

fn self_image(esp: Option<usize>) -> SelfImage<'static> {
    SelfImage {
        esp,
        esp_uuid: uuid(ESP_UUID_BYTE),
        restricted: None,
    }
}

#[test]
fn discovery_admits_valid_images_only() {
    let esp = esp_volume();
    esp.add_file(
        &format!("{CONF_DIR}\\A.conf"),
        b"title: SteamOS A\nboot-requested-at: 20240101000000\nboot-attempts: 1\n",
        20_240_101_000_000,
    );
    esp.add_file(
        &format!("{CONF_DIR}\\B.conf"),
        b"title: SteamOS B\n",
        20_240_101_000_000,
    );

    let good = image_volume(1, 2, 0x0a, "A");
    // B's loader is not a PE image
    let bad = image_volume(1, 3, 0x0b, "B");
    bad.add_file(STEAMOS_LOADER, b"not an efi binary at all", 1);

    let volumes = vec![esp, good, bad];
    let found = discover::discover(&volumes, &self_image(Some(0)));

    assert_eq!(found.len(), 1);
    let c = &found[0];
    assert_eq!(c.ident, "A");
    assert_eq!(c.label, "SteamOS A");
    assert_eq!(c.part_uuid, uuid(0x0a));
    assert_eq!(c.requested_at, 20_240_101_000_000);
    assert_eq!(c.tries, 1);
    // the loader's own partition is never a candidate
    assert!(found.iter().all(|c| c.part_uuid != uuid(ESP_UUID_BYTE)));
}

#[test]
fn discovery_falls_back_to_legacy_config() {
    let esp = esp_volume();
    let image = image_volume(1, 2, 0x0a, "A");
    image.add_file(
        LEGACY_CONF,
        b"boot-requested-at: 20240102000000\n",
        20_240_101_000_000,
    );

    let volumes = vec![esp, image];
    let found = discover::discover(&volumes, &self_image(Some(0)));
    assert_eq!(found.len(), 1);
    // no title key: the label is derived from the slot name
    assert_eq!(found[0].label, "Image A");
    assert_eq!(found[0].requested_at, 20_240_102_000_000);
}

#[test]
fn discovery_rejects_malformed_configs() {
    let esp = esp_volume();
    esp.add_file(
        &format!("{CONF_DIR}\\A.conf"),
        b"title SteamOS A without a separator\n",
        1,
    );
    let image = image_volume(1, 2, 0x0a, "A");
    let volumes = vec![esp, image];
    assert!(discover::discover(&volumes, &self_image(Some(0))).is_empty());
}

#[test]
fn discovery_ignores_reserved_partset_names() {
    let esp = esp_volume();
    let image = MemVolume::new(disk_path(1, 2, uuid(0x0a)));
    for name in ["all", "self", "other", "shared"] {
        image.add_file(
            &format!("{PARTSETS_DIR}\\{name}"),
            format!("efi: {}\n", uuid(0x0a)).as_bytes(),
            1,
        );
    }
    image.add_file(STEAMOS_LOADER, &valid_pe(), 1);
    image.add_file(LEGACY_CONF, b"title: x\n", 1);

    let volumes = vec![esp, image];
    assert!(discover::discover(&volumes, &self_image(Some(0))).is_empty());
}

#[test]
fn partset_uuid_compare_ignores_case() {
    let esp = esp_volume();
    let image = MemVolume::new(disk_path(1, 2, uuid(0x0a)));
    let upper = format!("{}", uuid(0x0a)).to_uppercase();
    image.add_file(
        &format!("{PARTSETS_DIR}\\A"),
        format!("efi: {upper}\n").as_bytes(),
        1,
    );
    image.add_file(STEAMOS_LOADER, &valid_pe(), 1);
    image.add_file(LEGACY_CONF, b"title: x\n", 1);

    let volumes = vec![esp, image];
    assert_eq!(discover::discover(&volumes, &self_image(Some(0))).len(), 1);
}

#[test]
fn restricted_mode_rejects_other_disks() {
    let esp = esp_volume();
    let same_disk = image_volume(1, 2, 0x0a, "A");
    same_disk.add_file(LEGACY_CONF, b"title: near\n", 1);
    let other_disk = image_volume(2, 1, 0x0b, "B");
    other_disk.add_file(LEGACY_CONF, b"title: far\n", 1);

    let volumes = vec![esp, same_disk, other_disk];
    let self_path = disk_path(1, 1, uuid(ESP_UUID_BYTE));
    let restricted = SelfImage {
        esp: Some(0),
        esp_uuid: uuid(ESP_UUID_BYTE),
        restricted: Some(self_path.as_slice()),
    };
    let found = discover::discover(&volumes, &restricted);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].part_uuid, uuid(0x0a));

    // without restriction both disks are fair game
    let open = SelfImage {
        esp: Some(0),
        esp_uuid: uuid(ESP_UUID_BYTE),
        restricted: None,
    };
    assert_eq!(discover::discover(&volumes, &open).len(), 2);
}

#[test]
fn config_loader_key_overrides_default() {
    let esp = esp_volume();
    esp.add_file(
        &format!("{CONF_DIR}\\A.conf"),
        b"loader: \\EFI\\other\\boot.efi\n",
        1,
    );
    let image = image_volume(1, 2, 0x0a, "A");
    image.add_file("\\EFI\\other\\boot.efi", &valid_pe(), 1);

    let volumes = vec![esp, image];
    let found = discover::discover(&volumes, &self_image(Some(0)));
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].loader_path, "\\EFI\\other\\boot.efi");
}

// ---------------------------------------------------------------------
// config migration
// ---------------------------------------------------------------------

#[test]
fn legacy_config_migrates_to_esp() {
    let esp = esp_volume();
    let image = image_volume(1, 2, 0x0a, "A");
    image.add_file(LEGACY_CONF, b"title: legacy\n", 20_240_101_000_000);

    let volumes = vec![esp, image];
    discover::migrate_configs(&volumes, 0, &uuid(ESP_UUID_BYTE));

    let copied = volumes[0].file(&format!("{CONF_DIR}\\A.conf"));
    assert_eq!(copied.as_deref(), Some(b"title: legacy\n".as_slice()));
    assert!(volumes[0].made_dirs().contains(&String::from(CONF_DIR)));
}

#[test]
fn newer_esp_config_is_not_overwritten() {
    let esp = esp_volume();
    esp.add_file(
        &format!("{CONF_DIR}\\A.conf"),
        b"title: fresh\n",
        20_240_102_000_000,
    );
    let image = image_volume(1, 2, 0x0a, "A");
    image.add_file(LEGACY_CONF, b"title: stale\n", 20_240_101_000_000);

    let volumes = vec![esp, image];
    discover::migrate_configs(&volumes, 0, &uuid(ESP_UUID_BYTE));

    assert_eq!(
        volumes[0].file(&format!("{CONF_DIR}\\A.conf")).as_deref(),
        Some(b"title: fresh\n".as_slice())
    );
}

// ---------------------------------------------------------------------
// variable surface
// ---------------------------------------------------------------------

#[test]
fn oneshot_variable_is_consumed_on_read() {
    let mut store = MemVarStore::new();
    store.put_str(
        "LoaderEntryOneShot",
        &LOADER_VENDOR,
        &format!("auto-bootconf-{}", uuid(7)),
    );
    let mut vars = LoaderVars::new(&mut store);
    let oneshot = vars.take_entry_oneshot().unwrap();
    assert_eq!(oneshot.uuid, Some(uuid(7)));
    assert!(vars.take_entry_oneshot().is_none());
    assert!(!store.contains("LoaderEntryOneShot", &LOADER_VENDOR));
}

#[test]
fn unparseable_oneshot_is_still_consumed() {
    let mut store = MemVarStore::new();
    store.put_str("LoaderEntryOneShot", &LOADER_VENDOR, "not-a-uuid");
    let mut vars = LoaderVars::new(&mut store);
    let oneshot = vars.take_entry_oneshot().unwrap();
    assert_eq!(oneshot.uuid, None);
    assert!(!store.contains("LoaderEntryOneShot", &LOADER_VENDOR));
}

#[test]
fn oneshot_prefixes_are_optional() {
    for text in [
        format!("{}", uuid(7)),
        format!("bootconf-{}", uuid(7)),
        format!("auto-bootconf-{}", uuid(7)),
    ] {
        let mut store = MemVarStore::new();
        store.put_str("LoaderEntryOneShot", &LOADER_VENDOR, &text);
        let mut vars = LoaderVars::new(&mut store);
        assert_eq!(vars.take_entry_oneshot().unwrap().uuid, Some(uuid(7)));
    }
}

#[test]
fn config_timeouts_and_their_oneshot() {
    let mut store = MemVarStore::new();
    store.put_str("LoaderConfigTimeout", &LOADER_VENDOR, "12");
    store.put_str("LoaderConfigTimeoutOneShot", &LOADER_VENDOR, "3");
    let mut vars = LoaderVars::new(&mut store);
    assert_eq!(vars.config_timeout(), 12);
    assert_eq!(vars.take_config_timeout_oneshot(), Some(3));
    // one-shot gone, plain timeout stays
    assert_eq!(vars.take_config_timeout_oneshot(), None);
    assert_eq!(vars.config_timeout(), 12);

    let mut empty = MemVarStore::new();
    let vars = LoaderVars::new(&mut empty);
    assert_eq!(vars.config_timeout(), 5);
}

#[test]
fn loader_entries_encoding() {
    let mut store = MemVarStore::new();
    let mut vars = LoaderVars::new(&mut store);
    vars.set_entries(&[uuid(1), uuid(2)]);

    let (_, data) = store.raw("LoaderEntries", &LOADER_VENDOR).unwrap();
    // two nul-terminated UTF-16 strings, back to back
    let expected: Vec<u8> = [uuid(1), uuid(2)]
        .iter()
        .flat_map(|u| string::to_utf16_bytes(&format!("auto-bootconf-{u}")))
        .collect();
    assert_eq!(data, &expected);
    assert_eq!(
        string::decode_utf16_bytes(data),
        format!("auto-bootconf-{}", uuid(1))
    );
}

#[test]
fn attempt_counter_is_nonvolatile_rmw() {
    let mut store = MemVarStore::new();
    let mut vars = LoaderVars::new(&mut store);
    assert_eq!(vars.boot_attempts(), 0);
    assert_eq!(vars.bump_boot_attempts(), 1);
    assert_eq!(vars.bump_boot_attempts(), 2);

    let (attrs, data) = store
        .raw("ChainLoaderBootAttempts", &CHAINLOADER_VENDOR)
        .unwrap();
    assert!(attrs.contains(VarAttrs::NON_VOLATILE));
    assert_eq!(data.as_slice(), &2u64.to_le_bytes());
}

#[test]
fn boot_to_firmware_request_is_additive() {
    let mut store = MemVarStore::new();
    store.put("OsIndications", &GLOBAL_VENDOR, &0x4u64.to_le_bytes());
    let mut vars = LoaderVars::new(&mut store);
    vars.set_boot_to_firmware().unwrap();
    let (attrs, data) = store.raw("OsIndications", &GLOBAL_VENDOR).unwrap();
    assert!(attrs.contains(VarAttrs::NON_VOLATILE));
    assert_eq!(data.as_slice(), &0x5u64.to_le_bytes());
}

#[test]
fn handoff_records_selected_entry_before_transfer() {
    let mut store = MemVarStore::new();
    let mut vars = LoaderVars::new(&mut store);
    let path = disk_path(1, 2, uuid(0x0a));
    let handoff = Handoff {
        partition_path: &path,
        loader_path: STEAMOS_LOADER,
        part_uuid: uuid(0x0a),
        ident: "A",
        default_uuid: uuid(0x0b),
        flags: EntryFlags::NORMAL | EntryFlags::VERBOSE | EntryFlags::BOOT_OTHER,
        command_line: String::from("steamos-verbose"),
    };
    exec::record_handoff_vars(&mut vars, &handoff);

    let selected = store.raw("LoaderEntrySelected", &LOADER_VENDOR).unwrap();
    assert_eq!(
        string::decode_utf16_bytes(&selected.1),
        format!("auto-bootconf-{}", uuid(0x0a))
    );
    let default = store.raw("LoaderEntryDefault", &LOADER_VENDOR).unwrap();
    assert_eq!(
        string::decode_utf16_bytes(&default.1),
        format!("auto-bootconf-{}", uuid(0x0b))
    );
    let flags = store
        .raw("ChainLoaderEntryFlags", &CHAINLOADER_VENDOR)
        .unwrap();
    assert_eq!(flags.1.as_slice(), &handoff.flags.bits().to_le_bytes());
    assert_eq!(
        string::decode_utf16_bytes(
            &store
                .raw("ChainLoaderImageIdentifier", &CHAINLOADER_VENDOR)
                .unwrap()
                .1
        ),
        "A"
    );
    let attempts = store
        .raw("ChainLoaderBootAttempts", &CHAINLOADER_VENDOR)
        .unwrap();
    assert_eq!(attempts.1.as_slice(), &1u64.to_le_bytes());
}

// ---------------------------------------------------------------------
// menu behaviour
// ---------------------------------------------------------------------

fn small_menu() -> Menu {
    let cands = ranked(vec![
        cand(1, 20_240_101_000_000, false, 0),
        cand(2, 20_240_102_000_000, false, 0),
    ]);
    let sel = select::choose(&cands, &SelectInput::default()).unwrap();
    select::build_menu(&cands, &sel)
}

#[test]
fn menu_enter_selects_highlight() {
    let menu = small_menu();
    let mut con = ScriptedConsole::new(&[ScriptedConsole::down(), ScriptedConsole::enter()]);
    let (outcome, _) = TextMenu::new(&mut con).run(&menu, 0, 0).unwrap();
    assert_eq!(outcome, MenuOutcome::Chosen(1));
}

#[test]
fn menu_wraps_to_top_past_the_end() {
    let menu = small_menu();
    let keys = [
        ScriptedConsole::down(),
        ScriptedConsole::down(),
        ScriptedConsole::down(),
        ScriptedConsole::down(),
        ScriptedConsole::down(),
        ScriptedConsole::enter(),
    ];
    let mut con = ScriptedConsole::new(&keys);
    // five downs from option 0 of five wrap back to the top
    let (outcome, _) = TextMenu::new(&mut con).run(&menu, 0, 0).unwrap();
    assert_eq!(outcome, MenuOutcome::Chosen(0));
}

#[test]
fn menu_up_stops_at_the_top() {
    let menu = small_menu();
    let keys = [
        ScriptedConsole::up(),
        ScriptedConsole::up(),
        ScriptedConsole::enter(),
    ];
    let mut con = ScriptedConsole::new(&keys);
    let (outcome, _) = TextMenu::new(&mut con).run(&menu, 1, 0).unwrap();
    assert_eq!(outcome, MenuOutcome::Chosen(0));
}

#[test]
fn menu_escape_cancels() {
    let menu = small_menu();
    let mut con = ScriptedConsole::new(&[ScriptedConsole::escape()]);
    let (outcome, _) = TextMenu::new(&mut con).run(&menu, 2, 0).unwrap();
    assert_eq!(outcome, MenuOutcome::Cancelled);
}

#[test]
fn menu_times_out_on_the_highlight() {
    let menu = small_menu();
    let mut con = ScriptedConsole::new(&[]);
    let (outcome, elapsed_ms) = TextMenu::new(&mut con).run(&menu, 2, 1).unwrap();
    assert_eq!(outcome, MenuOutcome::TimedOut(2));
    // ten 100 ms ticks per second
    assert_eq!(con.waits, 10);
    assert_eq!(elapsed_ms, 1_000);
    assert!(con.transcript.contains("Booting in 0:01"));
}

#[test]
fn countdown_label_appears_before_first_key() {
    let menu = small_menu();
    let mut con = ScriptedConsole::new(&[ScriptedConsole::enter()]);
    let _ = TextMenu::new(&mut con).run(&menu, 0, 30).unwrap();
    assert!(con.transcript.contains("Booting in 0:30"));
}

#[test]
fn confirm_reads_the_answer() {
    let mut con = ScriptedConsole::new(&[ScriptedConsole::chr(b'y')]);
    assert!(confirm(&mut con, "Really?", false));

    let mut con = ScriptedConsole::new(&[ScriptedConsole::enter()]);
    assert!(!confirm(&mut con, "Really?", false));
    let mut con = ScriptedConsole::new(&[ScriptedConsole::enter()]);
    assert!(confirm(&mut con, "Really?", true));

    let mut con = ScriptedConsole::new(&[ScriptedConsole::escape()]);
    assert!(!confirm(&mut con, "Really?", true));

    let mut con = ScriptedConsole::new(&[ScriptedConsole::chr(b'n')]);
    assert!(!confirm(&mut con, "Really?", true));
}

// ---------------------------------------------------------------------
// whole-pass integration and the raw entry point
// ---------------------------------------------------------------------

#[test]
fn full_pass_from_disks_to_selection() {
    let esp = esp_volume();
    esp.add_file(
        &format!("{CONF_DIR}\\A.conf"),
        b"title: SteamOS\nboot-requested-at: 20240101000000\n",
        1,
    );
    esp.add_file(
        &format!("{CONF_DIR}\\B.conf"),
        b"title: SteamOS\nboot-requested-at: 20240102000000\n",
        1,
    );
    let a = image_volume(1, 2, 0x0a, "A");
    let b = image_volume(1, 3, 0x0b, "B");
    let volumes = vec![esp, a, b];

    let mut cands = discover::discover(&volumes, &self_image(Some(0)));
    assert_eq!(cands.len(), 2);
    select::rank(&mut cands);
    select::dedup_labels(&mut cands);

    // identical titles were disambiguated with the partition UUID
    assert_eq!(cands[0].label, format!("SteamOS-{}", uuid(0x0b)));
    assert_eq!(cands[1].label, format!("SteamOS-{}", uuid(0x0a)));

    let sel = select::choose(&cands, &SelectInput::default()).unwrap();
    assert_eq!(cands[sel.index].part_uuid, uuid(0x0b));
    assert!(sel.menu.is_none());

    // at most one candidate is chosen, and the entries list matches
    let mut store = MemVarStore::new();
    let mut vars = LoaderVars::new(&mut store);
    let uuids: Vec<Guid> = cands.iter().map(|c| c.part_uuid).collect();
    vars.set_entries(&uuids);
    let (_, data) = store.raw("LoaderEntries", &LOADER_VENDOR).unwrap();
    assert!(!data.is_empty());
}

#[test]
fn efi_main_rejects_null_arguments() {
    use steamcl_core::base::Handle;
    assert_eq!(
        efi_main(Handle::null(), null_mut()),
        Status::INVALID_PARAMETER
    );
}

#[test]
fn efi_main_survives_a_firmware_with_no_disks() {
    let (image, st) = mock_system_table();
    // no filesystems, no candidates: the failure notice times out and
    // the loader reports not-found back to firmware
    assert_eq!(efi_main(image, st), Status::NOT_FOUND);
}
