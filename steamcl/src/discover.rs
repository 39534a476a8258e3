//! Candidate discovery
//!
//! Walks every mounted filesystem and decides which ones are bootable OS
//! image partitions. Any error while inspecting a volume rejects that
//! volume and nothing else; discovery itself never fails.

use alloc::{format, string::String, vec::Vec};

use log::{debug, info, warn};

use steamcl_core::{base::Guid, config::Store, devpath, pe};

use crate::{platform::Volume, string};

/// Cap on admitted candidates. Two is normal, sixteen would be a
/// fairly psychosis-inducing setup.
pub const MAX_BOOTCONFS: usize = 16;

/// Compiled-in second-stage loader.
pub const STEAMOS_LOADER: &str = "\\EFI\\steamos\\grubx64.efi";

/// Partset descriptors naming the image slots on a partition.
pub const PARTSETS_DIR: &str = "\\SteamOS\\partsets";

/// Per-image configs on the ESP, one `<ident>.conf` per slot.
pub const CONF_DIR: &str = "\\SteamOS\\conf";

/// Config location on the image partition itself, from before configs
/// moved to the ESP.
pub const LEGACY_CONF: &str = "\\SteamOS\\bootconf";

/// Partset names that describe groups rather than image slots.
const RESERVED_PARTSETS: [&str; 4] = ["all", "self", "other", "shared"];

/// An OS image admitted as a possible boot target.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Index of the volume this candidate lives on.
    pub volume: usize,
    /// Partition UUID of that volume.
    pub part_uuid: Guid,
    /// Image slot name from the partset descriptor (`A`, `B`, `dev`…).
    pub ident: String,
    /// Absolute path of the stage-two loader on the volume.
    pub loader_path: String,
    /// Menu label.
    pub label: String,
    /// The parsed per-image config.
    pub config: Store,
    /// Known-bad flag; disabled candidates rank after all enabled ones.
    pub disabled: bool,
    /// When this image last asked to be booted.
    pub requested_at: u64,
    /// When this image last booted successfully.
    pub boot_time: u64,
    /// Consecutive boot attempts without a success.
    pub tries: u64,
}

/// Where the loader itself lives, for self-exclusion and restriction.
pub struct SelfImage<'a> {
    /// The ESP volume index, when it is one of `volumes`.
    pub esp: Option<usize>,
    /// Partition UUID of the ESP.
    pub esp_uuid: Guid,
    /// The loader's device path when restricted mode is on: only
    /// partitions on the same physical disk are considered.
    pub restricted: Option<&'a [u8]>,
}

/// Build the candidate list from `volumes`.
pub fn discover<V: Volume>(volumes: &[V], this: &SelfImage) -> Vec<Candidate> {
    let mut found = Vec::new();

    for (index, vol) in volumes.iter().enumerate() {
        if found.len() >= MAX_BOOTCONFS {
            warn!("more than {MAX_BOOTCONFS} bootable images, ignoring the rest");
            break;
        }
        match inspect(volumes, this, index, vol) {
            Some(c) => {
                debug!(
                    "#{index} image {} on {} loader {}",
                    c.ident, c.part_uuid, c.loader_path
                );
                found.push(c);
            }
            None => continue,
        }
    }

    info!(
        "went through {} filesystems, {} bootable images found",
        volumes.len(),
        found.len()
    );
    found
}

fn inspect<V: Volume>(
    volumes: &[V],
    this: &SelfImage,
    index: usize,
    vol: &V,
) -> Option<Candidate> {
    let part_uuid = match vol.part_uuid() {
        Some(uuid) => uuid,
        None => {
            debug!("#{index}: no partition uuid, skipped");
            return None;
        }
    };

    // never offer the partition we booted from
    if part_uuid == this.esp_uuid {
        return None;
    }

    if let Some(self_path) = this.restricted {
        if !devpath::same_disk(self_path, vol.device_path()) {
            debug!("#{index}: not on the loader's disk, skipped (restricted)");
            return None;
        }
    }

    let ident = image_ident(vol, &part_uuid)?;

    let (config, conf_path) = load_config(volumes, this.esp, vol, &ident)?;

    let loader_path = resolve_loader(vol, &config, &conf_path)?;

    let label = match config.get_str("title") {
        "" => format!("Image {ident}"),
        title => String::from(title),
    };

    Some(Candidate {
        volume: index,
        part_uuid,
        ident,
        loader_path,
        label,
        disabled: config.get_uint("image-invalid") > 0,
        requested_at: config.get_uint("boot-requested-at"),
        boot_time: config.get_uint("boot-time"),
        tries: config.get_uint("boot-attempts"),
        config,
    })
}

/// The slot name of the partset whose `efi:` UUID matches `part_uuid`.
fn image_ident<V: Volume>(vol: &V, part_uuid: &Guid) -> Option<String> {
    let names = match vol.list_dir(PARTSETS_DIR) {
        Ok(names) => names,
        Err(_) => return None,
    };
    for name in names {
        if RESERVED_PARTSETS.contains(&name.as_str()) {
            continue;
        }
        let data = match vol.read(&format!("{PARTSETS_DIR}\\{name}")) {
            Ok(data) => data,
            Err(e) => {
                debug!("partset {name}: unreadable ({e})");
                continue;
            }
        };
        let set = match Store::parse(&data) {
            Ok(set) => set,
            Err(_) => {
                debug!("partset {name}: malformed");
                continue;
            }
        };
        if let Some(uuid) = Guid::parse(set.get_str("efi")) {
            if uuid == *part_uuid {
                return Some(name);
            }
        }
    }
    None
}

/// Load the per-image config: the ESP copy is preferred, the legacy
/// on-image file is the fallback. Returns the store and the path the
/// `loader` key resolves against.
fn load_config<V: Volume>(
    volumes: &[V],
    esp: Option<usize>,
    vol: &V,
    ident: &str,
) -> Option<(Store, String)> {
    if let Some(esp) = esp {
        let path = format!("{CONF_DIR}\\{ident}.conf");
        if let Ok(data) = volumes[esp].read(&path) {
            return match Store::parse(&data) {
                Ok(store) => Some((store, path)),
                Err(_) => {
                    warn!("config {path}: malformed, image {ident} rejected");
                    None
                }
            };
        }
    }
    match vol.read(LEGACY_CONF) {
        Ok(data) => match Store::parse(&data) {
            Ok(store) => Some((store, String::from(LEGACY_CONF))),
            Err(_) => {
                warn!("config {LEGACY_CONF}: malformed, image {ident} rejected");
                None
            }
        },
        Err(_) => None,
    }
}

/// Resolve and vet the stage-two loader for a candidate.
fn resolve_loader<V: Volume>(vol: &V, config: &Store, conf_path: &str) -> Option<String> {
    let configured = config.get_str("loader");
    let path = if configured.is_empty() {
        String::from(STEAMOS_LOADER)
    } else {
        string::resolve_path(configured, conf_path)?
    };

    match vol.read_head(&path, pe::HEADER_PROBE) {
        Ok(head) if pe::valid_image(&head) => Some(path),
        Ok(_) => {
            warn!("{path}: not a bootable x86_64 EFI binary");
            None
        }
        Err(e) => {
            debug!("{path}: unreadable ({e})");
            None
        }
    }
}

/// Move legacy on-image configs to their ESP home. Runs before
/// discovery; failure to copy any one config is logged and boot goes on.
pub fn migrate_configs<V: Volume>(volumes: &[V], esp: usize, esp_uuid: &Guid) {
    for (index, vol) in volumes.iter().enumerate() {
        if index == esp {
            continue;
        }
        let part_uuid = match vol.part_uuid() {
            Some(uuid) if uuid != *esp_uuid => uuid,
            _ => continue,
        };
        if !vol.exists(LEGACY_CONF) {
            continue;
        }
        let ident = match image_ident(vol, &part_uuid) {
            Some(ident) => ident,
            None => continue,
        };
        let new_path = format!("{CONF_DIR}\\{ident}.conf");

        let old_mtime = match vol.mtime(LEGACY_CONF) {
            Ok(t) => t,
            Err(e) => {
                warn!("migration: cannot stat {LEGACY_CONF} for {ident}: {e}");
                continue;
            }
        };
        // an ESP copy at least as fresh as the legacy file wins
        if let Ok(new_mtime) = volumes[esp].mtime(&new_path) {
            if new_mtime >= old_mtime {
                continue;
            }
        }

        let copied = vol
            .read(LEGACY_CONF)
            .and_then(|data| {
                volumes[esp].mkdir_p(CONF_DIR)?;
                volumes[esp].write(&new_path, &data)
            });
        match copied {
            Ok(()) => info!("migrated {LEGACY_CONF} ({ident}) to {new_path}"),
            Err(e) => warn!("migration of {ident} config failed: {e}"),
        }
    }
}
