//! The selection engine
//!
//! Takes the candidate list discovery built, ranks it, applies the
//! one-shot and boot-other overrides, and decides whether a human needs
//! to see the menu before control is handed over.

use alloc::{format, string::String, vec::Vec};

use log::{info, warn};

use steamcl_core::base::Guid;

use crate::{
    discover::Candidate,
    menu::{Menu, MenuOption},
    vars::{EntryFlags, OneShot},
};

/// Attempts after which a slot is considered failing.
pub const MAX_BOOT_FAILURES: u64 = 3;

/// Attempts after which the sibling slot is preselected instead.
pub const SUPERMAX_BOOT_FAILURES: u64 = 6;

/// Menu timeout when a slot is failing, in seconds.
pub const FAILSAFE_TIMEOUT: u64 = 30;

/// Menu timeout when a slot has failed past SUPERMAX, in seconds.
const SUPERMAX_TIMEOUT: u64 = 120;

/// Defensive cap on sort passes; the list is at most 16 long.
const MAX_SORT_PASSES: usize = 1024;

/// Why the menu is being shown. The reasons are mutually exclusive;
/// interactive intent wins over failure handling, which wins over
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuReason {
    /// The menu hot-key was pressed during init.
    Interactive,
    /// The `steamcl-menu` flag file is present.
    Config,
    /// A menu-equivalent token arrived on the command line.
    Cmdline,
    /// Failure handling: a failing slot, a dangling one-shot, or no
    /// usable candidate at all.
    Failsafe,
    /// Anything else.
    Misc,
}

/// The menu plan attached to a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuPlan {
    pub reason: MenuReason,
    /// Seconds before the preselected entry boots on its own; 0 waits
    /// forever.
    pub timeout_secs: u64,
    /// Candidate (sorted index) the highlight starts on.
    pub preselect: usize,
}

/// The engine's verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Chosen candidate, as an index into the ranked list.
    pub index: usize,
    pub entry_flags: EntryFlags,
    /// Present when the menu must run before handoff.
    pub menu: Option<MenuPlan>,
}

/// Everything the engine consumes besides the candidates themselves.
#[derive(Debug, Clone, Default)]
pub struct SelectInput {
    /// The consumed LoaderEntryOneShot, if it existed.
    pub oneshot: Option<OneShot>,
    /// The interactive hot-key fired.
    pub interactive: bool,
    /// The `steamcl-menu` flag file (or its LoadOptions token) is set.
    pub menu_flag: bool,
    /// LoaderConfigTimeout, already defaulted.
    pub config_timeout: u64,
    /// The consumed LoaderConfigTimeoutOneShot, if it existed.
    pub oneshot_timeout: Option<u64>,
}

/// Sort candidates: enabled before disabled, then newest request first.
/// Stable, so equal keys keep their discovery order. Bubble sort; the
/// list never exceeds sixteen entries.
pub fn rank(cands: &mut [Candidate]) {
    let mut passes = 0;
    let mut swapped = cands.len() > 1;
    while swapped && passes < MAX_SORT_PASSES {
        swapped = false;
        passes += 1;
        for i in 0..cands.len() - 1 {
            let a = (cands[i].disabled, core::cmp::Reverse(cands[i].requested_at));
            let b = (
                cands[i + 1].disabled,
                core::cmp::Reverse(cands[i + 1].requested_at),
            );
            if a > b {
                cands.swap(i, i + 1);
                swapped = true;
            }
        }
    }
}

/// Make displayed labels unique: when any two candidates share a label,
/// all labels get their partition UUID appended.
pub fn dedup_labels(cands: &mut [Candidate]) {
    let mut clash = false;
    for i in 0..cands.len() {
        for j in i + 1..cands.len() {
            if cands[i].label == cands[j].label {
                clash = true;
            }
        }
    }
    if !clash {
        return;
    }
    for c in cands.iter_mut() {
        c.label = format!("{}-{}", c.label, c.part_uuid);
    }
}

/// Run the selection state machine over the ranked list.
///
/// Returns [`None`] when there is nothing to boot; the caller turns that
/// into the failsafe path.
pub fn choose(cands: &[Candidate], input: &SelectInput) -> Option<Selection> {
    if cands.is_empty() {
        return None;
    }

    // Walk newest to oldest, skipping entries that ask to be skipped.
    // If everything says boot-other, the oldest runs anyway.
    let mut index = 0;
    for (i, c) in cands.iter().enumerate() {
        index = i;
        if c.config.get_uint("boot-other") == 0 {
            break;
        }
    }
    // The walk only ever advances past boot-other entries, so landing
    // anywhere but the front means we are booting "the other"; so does
    // landing on a boot-other entry because everything was flagged.
    let mut entry_flags = EntryFlags::empty();
    if index > 0 || cands[index].config.get_uint("boot-other") != 0 {
        entry_flags |= EntryFlags::BOOT_OTHER;
    }

    // One-shot override: consumed whatever happens. A match replaces the
    // selection outright; anything else leaves it alone and forces the
    // menu so a human sees the dangling override.
    let mut oneshot_dangling = false;
    if let Some(oneshot) = input.oneshot {
        match oneshot.uuid.and_then(|u| position_of(cands, &u)) {
            Some(i) => {
                info!("one-shot override: {}", cands[i].part_uuid);
                index = i;
                entry_flags = EntryFlags::empty();
            }
            None => {
                warn!("one-shot override matches no candidate");
                oneshot_dangling = true;
            }
        }
    }

    let tries = cands[index].tries;
    let reason = if input.interactive {
        Some(MenuReason::Interactive)
    } else if tries >= MAX_BOOT_FAILURES || oneshot_dangling {
        Some(MenuReason::Failsafe)
    } else if input.menu_flag {
        Some(MenuReason::Config)
    } else {
        None
    };

    let menu = reason.map(|reason| {
        let mut preselect = index;
        let timeout_secs = match reason {
            MenuReason::Interactive => 0,
            MenuReason::Failsafe => {
                if tries >= SUPERMAX_BOOT_FAILURES {
                    preselect = healthier_sibling(cands, index);
                    SUPERMAX_TIMEOUT
                } else {
                    FAILSAFE_TIMEOUT
                }
            }
            MenuReason::Config | MenuReason::Cmdline | MenuReason::Misc => {
                input.oneshot_timeout.unwrap_or(input.config_timeout)
            }
        };
        MenuPlan {
            reason,
            timeout_secs,
            preselect,
        }
    });

    Some(Selection {
        index,
        entry_flags,
        menu,
    })
}

fn position_of(cands: &[Candidate], uuid: &Guid) -> Option<usize> {
    cands.iter().position(|c| c.part_uuid == *uuid)
}

/// The sibling to offer instead of a slot that failed past SUPERMAX:
/// the neighbour above in sort order, then the one below, whichever has
/// no more failures than the failing slot itself.
fn healthier_sibling(cands: &[Candidate], failing: usize) -> usize {
    let limit = cands[failing].tries;
    if failing > 0 && cands[failing - 1].tries <= limit {
        return failing - 1;
    }
    if failing + 1 < cands.len() && cands[failing + 1].tries <= limit {
        return failing + 1;
    }
    failing
}

/// Build the menu for a ranked candidate list: every image gets a boot
/// option and a boot-to-stage-two-menu option, displayed oldest first,
/// plus one factory-reset option bound to the engine's selection.
pub fn build_menu(cands: &[Candidate], selection: &Selection) -> Menu {
    let mut options = Vec::with_capacity(cands.len() * 2 + 1);
    for (i, c) in cands.iter().enumerate().rev() {
        options.push(MenuOption {
            label: format!("Boot {}", c.label),
            blurb: format!("Boot the {} image", c.label),
            candidate: i,
            bits: EntryFlags::NORMAL | EntryFlags::VERBOSE,
        });
        options.push(MenuOption {
            label: format!("{} (boot menu)", c.label),
            blurb: format!("Boot {} into the stage-two boot menu", c.label),
            candidate: i,
            bits: EntryFlags::NORMAL | EntryFlags::VERBOSE | EntryFlags::MENU,
        });
    }
    options.push(MenuOption {
        label: String::from("Factory reset"),
        blurb: String::from("Reinstall the OS, wiping user data"),
        candidate: selection.index,
        bits: EntryFlags::VERBOSE | EntryFlags::RESET,
    });
    Menu {
        title: String::from("SteamOS chainloader"),
        options,
    }
}

/// Menu option index whose highlight should start on candidate
/// `preselect` (its plain boot option).
pub fn start_option(cands: &[Candidate], preselect: usize) -> usize {
    // options run oldest to newest, two per candidate
    let displayed = cands.len().saturating_sub(1).saturating_sub(preselect);
    displayed * 2
}

/// Assemble the kernel command line for the chosen entry. Order is
/// fixed; BOOT_OTHER is telemetry only and never appears here.
pub fn command_line(bits: EntryFlags, verbose_flag: bool, debug_flag: bool) -> String {
    let mut args: Vec<&str> = Vec::new();
    if bits.contains(EntryFlags::VERBOSE) || verbose_flag {
        args.push("steamos-verbose");
    }
    if bits.contains(EntryFlags::RESET) {
        args.push("steamos.factory-reset=1");
    }
    if bits.contains(EntryFlags::MENU) {
        args.push("steamos-bootmenu");
    }
    if debug_flag {
        // canary tokens: stage two echoes these back so command-line
        // plumbing can be verified end to end
        args.push("steamos-dummy");
        args.push("dummy");
    }
    args.join(" ")
}

#[cfg(test)]
mod tests {
    use steamcl_core::config::Store;

    use super::*;

    fn cand(n: u8, requested_at: u64, disabled: bool) -> Candidate {
        let mut uuid = [0u8; 16];
        uuid[15] = n;
        Candidate {
            volume: n as usize,
            part_uuid: Guid::new(uuid),
            ident: format!("{n}"),
            loader_path: String::from("\\EFI\\steamos\\grubx64.efi"),
            label: format!("Image {n}"),
            config: Store::new(),
            disabled,
            requested_at,
            boot_time: 0,
            tries: 0,
        }
    }

    #[test]
    fn rank_orders_newest_enabled_first() {
        let mut cands = alloc::vec![
            cand(1, 20_240_101_000_000, false),
            cand(2, 20_240_103_000_000, true),
            cand(3, 20_240_102_000_000, false),
        ];
        rank(&mut cands);
        let order: Vec<u64> = cands.iter().map(|c| c.requested_at).collect();
        assert_eq!(
            order,
            [20_240_102_000_000, 20_240_101_000_000, 20_240_103_000_000]
        );
        assert!(cands[2].disabled);
    }

    #[test]
    fn rank_is_stable_on_equal_keys() {
        let mut cands = alloc::vec![
            cand(1, 20_240_101_000_000, false),
            cand(2, 20_240_101_000_000, false),
            cand(3, 20_240_101_000_000, false),
        ];
        rank(&mut cands);
        let order: Vec<usize> = cands.iter().map(|c| c.volume).collect();
        assert_eq!(order, [1, 2, 3]);
    }

    #[test]
    fn labels_rewritten_only_on_clash() {
        let mut cands = alloc::vec![cand(1, 1, false), cand(2, 2, false)];
        cands[0].label = String::from("Image A");
        cands[1].label = String::from("Image B");
        dedup_labels(&mut cands);
        assert_eq!(cands[0].label, "Image A");

        cands[1].label = String::from("Image A");
        dedup_labels(&mut cands);
        assert!(cands[0].label.starts_with("Image A-"));
        assert!(cands[1].label.starts_with("Image A-"));
        assert_ne!(cands[0].label, cands[1].label);
    }

    #[test]
    fn command_line_ordering() {
        assert_eq!(command_line(EntryFlags::empty(), false, false), "");
        assert_eq!(
            command_line(EntryFlags::VERBOSE, false, false),
            "steamos-verbose"
        );
        assert_eq!(
            command_line(
                EntryFlags::VERBOSE | EntryFlags::RESET | EntryFlags::MENU,
                false,
                true
            ),
            "steamos-verbose steamos.factory-reset=1 steamos-bootmenu steamos-dummy dummy"
        );
        // the verbose flag file forces the token without the bit
        assert_eq!(
            command_line(EntryFlags::empty(), true, false),
            "steamos-verbose"
        );
    }

    #[test]
    fn start_option_maps_sorted_to_display_order() {
        let cands = alloc::vec![cand(1, 3, false), cand(2, 2, false), cand(3, 1, false)];
        // newest (index 0) is displayed last
        assert_eq!(start_option(&cands, 0), 4);
        assert_eq!(start_option(&cands, 2), 0);
    }
}
