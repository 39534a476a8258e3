//! Platform façade
//!
//! The thin contract between the boot-selection logic and the machine it
//! runs on. Discovery, selection, the variable surface and the menu all
//! talk to these traits; the firmware implementations live here, the
//! in-memory ones live with the tests. Nothing above this layer touches
//! a raw pointer.

use alloc::{string::String, vec::Vec};

use bitflags::bitflags;
use log::warn;

use steamcl_core::{
    base::{Guid, Handle, Status},
    error::{Error, Result},
    proto::{RawInputKey, ATTR_DEFAULT},
};

use crate::{
    proto::{
        console::{SimpleTextInput, SimpleTextOutput},
        device_path::DevicePath,
        media::{File, SimpleFileSystem},
    },
    table::{BootServices, RuntimeServices, SystemTable},
};

/// A mounted filesystem the loader may inspect. Paths are absolute,
/// `\`-separated, rooted at the volume.
pub trait Volume {
    /// The partition handle backing this volume.
    fn handle(&self) -> Handle;

    /// The partition's device path, as raw path bytes.
    fn device_path(&self) -> &[u8];

    /// The partition UUID from the device path's hard-drive node.
    fn part_uuid(&self) -> Option<Guid> {
        steamcl_core::devpath::harddrive_signature(self.device_path())
    }

    fn exists(&self, path: &str) -> bool;

    /// Read a whole file.
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Read at most `limit` bytes from the start of a file.
    fn read_head(&self, path: &str, limit: usize) -> Result<Vec<u8>>;

    /// Create or replace a file with `data`, written in one call.
    fn write(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Create directory `path`, parents included.
    fn mkdir_p(&self, path: &str) -> Result<()>;

    /// Modification time of a file as a packed stamp; 0 when unknown.
    fn mtime(&self, path: &str) -> Result<u64>;

    /// Names of the entries of directory `path`, `.`/`..` excluded.
    fn list_dir(&self, path: &str) -> Result<Vec<String>>;
}

bitflags! {
    /// Firmware variable attributes
    pub struct VarAttrs: u32 {
        const NON_VOLATILE = 0x1;
        const BOOT_SERVICE_ACCESS = 0x2;
        const RUNTIME_ACCESS = 0x4;
    }
}

/// Firmware variable access by (name, vendor GUID).
pub trait VarStore {
    fn get(&self, name: &str, vendor: &Guid) -> Result<Vec<u8>>;
    fn set(&mut self, name: &str, vendor: &Guid, attrs: VarAttrs, data: &[u8]) -> Result<()>;
    fn delete(&mut self, name: &str, vendor: &Guid) -> Result<()>;
}

/// A console keypress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Key {
    pub scan: u16,
    pub unicode: u16,
}

impl From<RawInputKey> for Key {
    fn from(k: RawInputKey) -> Self {
        Self {
            scan: k.scan_code,
            unicode: k.unicode_char,
        }
    }
}

/// What the menu needs from a console: cursor-addressed text output and
/// timed key waits.
pub trait MenuConsole {
    /// Columns and rows of the active mode.
    fn size(&mut self) -> (usize, usize);
    fn clear(&mut self);
    fn set_attr(&mut self, attr: usize);
    fn set_cursor(&mut self, col: usize, row: usize);
    fn show_cursor(&mut self, visible: bool);
    fn write(&mut self, text: &str);

    /// Wait up to `timeout_ms` for a key; [`Status::TIMEOUT`] if none
    /// arrived. A zero timeout waits indefinitely.
    fn wait_key(&mut self, timeout_ms: u64) -> Result<Key>;
}

/// A [`Volume`] over firmware's SimpleFileSystem.
pub struct FsVolume<'table> {
    handle: Handle,
    root: File<'table>,
    device_path: Vec<u8>,
}

impl<'table> FsVolume<'table> {
    /// Mount the filesystem on `handle` and capture its device path.
    pub fn mount(boot: &BootServices<'table>, handle: Handle) -> Result<Self> {
        let fs: SimpleFileSystem<'table> = boot.handle_protocol(handle)?;
        let root = fs.open_volume()?;
        let dp: DevicePath<'table> = boot.handle_protocol(handle)?;
        Ok(Self {
            handle,
            root,
            device_path: dp.to_bytes(),
        })
    }

    /// Release the root directory. Volumes are unmounted in reverse
    /// order of mounting.
    pub fn unmount(self) {
        let _ = self.root.close();
    }
}

impl<'table> Volume for FsVolume<'table> {
    fn handle(&self) -> Handle {
        self.handle
    }

    fn device_path(&self) -> &[u8] {
        &self.device_path
    }

    fn exists(&self, path: &str) -> bool {
        match self.root.open(path) {
            Ok(f) => {
                let _ = f.close();
                true
            }
            Err(_) => false,
        }
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let f = self.root.open(path)?;
        let data = f.read_to_end();
        let _ = f.close();
        data
    }

    fn read_head(&self, path: &str, limit: usize) -> Result<Vec<u8>> {
        let f = self.root.open(path)?;
        let mut buf = alloc::vec![0u8; limit];
        let res = f.read(&mut buf);
        let _ = f.close();
        let n = res?;
        buf.truncate(n);
        Ok(buf)
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let f = self.root.create(path)?;
        let wrote = f.write(data);
        let flushed = f.flush();
        let _ = f.close();
        if wrote? != data.len() {
            return Err(Error::new(Status::VOLUME_FULL));
        }
        flushed
    }

    fn mkdir_p(&self, path: &str) -> Result<()> {
        let mut so_far = String::new();
        for part in path.split('\\').filter(|p| !p.is_empty()) {
            so_far.push('\\');
            so_far.push_str(part);
            let dir = self.root.create_dir(&so_far)?;
            let _ = dir.close();
        }
        Ok(())
    }

    fn mtime(&self, path: &str) -> Result<u64> {
        let f = self.root.open(path)?;
        let info = f.info();
        let _ = f.close();
        Ok(info?.mtime)
    }

    fn list_dir(&self, path: &str) -> Result<Vec<String>> {
        let dir = self.root.open(path)?;
        let mut names = Vec::new();
        loop {
            match dir.read_dir_entry() {
                Ok(Some(info)) => {
                    if info.name != "." && info.name != ".." {
                        names.push(info.name);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = dir.close();
                    return Err(e);
                }
            }
        }
        let _ = dir.close();
        Ok(names)
    }
}

/// A [`VarStore`] over firmware NVRAM.
pub struct FwVarStore<'table> {
    rt: RuntimeServices<'table>,
}

impl<'table> FwVarStore<'table> {
    pub fn new(rt: RuntimeServices<'table>) -> Self {
        Self { rt }
    }
}

impl<'table> VarStore for FwVarStore<'table> {
    fn get(&self, name: &str, vendor: &Guid) -> Result<Vec<u8>> {
        self.rt.get_variable(name, vendor)
    }

    fn set(&mut self, name: &str, vendor: &Guid, attrs: VarAttrs, data: &[u8]) -> Result<()> {
        self.rt.set_variable(name, vendor, attrs.bits(), data)
    }

    fn delete(&mut self, name: &str, vendor: &Guid) -> Result<()> {
        self.rt.set_variable(name, vendor, 0, &[])
    }
}

/// A [`MenuConsole`] over the firmware text console.
pub struct FwConsole<'table> {
    boot: BootServices<'table>,
    out: SimpleTextOutput<'table>,
    input: SimpleTextInput<'table>,
}

impl<'table> FwConsole<'table> {
    pub fn new(st: &SystemTable<'table>) -> Self {
        Self {
            boot: st.boot(),
            out: st.stdout(),
            input: st.stdin(),
        }
    }

    /// Switch to the largest text mode the console will take, walking
    /// down from the top like the reference console menu does.
    pub fn pick_best_mode(&mut self) {
        let max = self.out.max_mode();
        if max <= 0 {
            return;
        }
        for mode in (1..max as usize).rev() {
            if self.out.set_mode(mode).is_ok() {
                return;
            }
        }
    }
}

impl<'table> MenuConsole for FwConsole<'table> {
    fn size(&mut self) -> (usize, usize) {
        let mode = self.out.current_mode().unwrap_or(0).max(0) as usize;
        // punch-card fallback when the console won't say
        self.out.query_mode(mode).unwrap_or((80, 25))
    }

    fn clear(&mut self) {
        let _ = self.out.clear();
    }

    fn set_attr(&mut self, attr: usize) {
        let _ = self.out.set_attribute(attr);
    }

    fn set_cursor(&mut self, col: usize, row: usize) {
        let _ = self.out.set_cursor_position(col, row);
    }

    fn show_cursor(&mut self, visible: bool) {
        let _ = self.out.enable_cursor(visible);
    }

    fn write(&mut self, text: &str) {
        let _ = self.out.output_string(text);
    }

    fn wait_key(&mut self, timeout_ms: u64) -> Result<Key> {
        // a minute is the most any caller is allowed to sleep blind
        let timeout_ms = timeout_ms.min(60_000);

        if timeout_ms == 0 {
            let mut waiters = [self.input.wait_for_key_event()];
            self.boot.wait_for_event(&mut waiters)?;
            return self.input.read_key().map(Key::from);
        }

        let timer = self.boot.create_timer_event()?;
        let res = (|| {
            self.boot.set_timer_relative(timer, timeout_ms)?;
            let mut waiters = [self.input.wait_for_key_event(), timer];
            let which = self.boot.wait_for_event(&mut waiters)?;
            if which == 1 {
                return Err(Error::new(Status::TIMEOUT));
            }
            self.input.read_key().map(Key::from)
        })();
        let _ = self.boot.close_event(timer);
        res
    }
}

/// Restore a sane console once the menu is done with it.
pub fn reset_console(con: &mut dyn MenuConsole) {
    con.set_attr(ATTR_DEFAULT);
    con.clear();
    con.show_cursor(true);
}

/// Warn-and-continue helper for variable writes, which are never fatal.
pub fn log_var_failure(name: &str, err: Error) {
    warn!("failed to write variable {name}: {err}");
}
