//! Filesystem protocols
//!
//! UEFI gives us `FAT{12,16,32}` through SimpleFileSystem; a [`File`] is
//! both files and directories. Files are closed explicitly, in reverse
//! order of opening, the same way the volume they came from is released
//! after they are.

use alloc::{string::String, vec, vec::Vec};
use core::{ffi::c_void, mem::size_of, ptr::null_mut};

use steamcl_core::{
    base::Status,
    error::{Error, Result},
    proto::{FileAttr, FileMode, RawFile, RawFileInfo, RawSimpleFileSystem, FILE_INFO_ID,
        SIMPLE_FILE_SYSTEM_GUID},
    stamp::DateTime,
};

use crate::{
    string,
    util::{interface, protocol},
};

interface!(
    /// Hierarchical file access to a volume
    SimpleFileSystem(RawSimpleFileSystem),
    /// An open file or directory
    File(RawFile),
);

protocol!(SimpleFileSystem(RawSimpleFileSystem), SIMPLE_FILE_SYSTEM_GUID);

impl<'table> SimpleFileSystem<'table> {
    /// Open the root directory of the volume. Close it when done or the
    /// volume stays referenced.
    pub fn open_volume(&self) -> Result<File<'table>> {
        let ov = self
            .interface()
            .open_volume
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        let mut out = null_mut();
        // Safety: statically correct arguments
        let ret = unsafe { (ov)(self.interface, &mut out) };
        if ret.is_success() && !out.is_null() {
            // Safety: success means a valid file
            Ok(unsafe { File::new(out) })
        } else if ret.is_success() {
            Err(Error::new(Status::VOLUME_CORRUPTED))
        } else {
            Err(ret.into())
        }
    }
}

/// Parsed EFI_FILE_INFO
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub file_size: u64,
    pub attr: FileAttr,
    /// Modification time as a packed decimal stamp; 0 when the
    /// filesystem carries no usable time.
    pub mtime: u64,
    pub name: String,
}

impl FileInfo {
    pub fn is_dir(&self) -> bool {
        self.attr.contains(FileAttr::DIRECTORY)
    }

    fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < size_of::<RawFileInfo>() {
            return Err(Error::new(Status::BAD_BUFFER_SIZE));
        }
        // Safety: length checked; the buffer came from GetInfo/Read
        let raw = unsafe { (buf.as_ptr() as *const RawFileInfo).read_unaligned() };
        let t = raw.modification_time;
        let mtime = if t.year >= 1970 && t.month >= 1 {
            DateTime {
                year: t.year,
                month: t.month,
                day: t.day,
                hour: t.hour,
                minute: t.minute,
                second: t.second,
            }
            .encode()
        } else {
            0
        };
        let name = string::decode_utf16_bytes(&buf[size_of::<RawFileInfo>()..]);
        Ok(FileInfo {
            file_size: raw.file_size,
            attr: FileAttr::from_bits_truncate(raw.attribute),
            mtime,
            name,
        })
    }
}

impl<'table> File<'table> {
    fn open_impl(&self, name: &str, mode: FileMode, attrs: FileAttr) -> Result<File<'table>> {
        let op = self
            .interface()
            .open
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        let name16 = string::to_utf16(name);
        let mut out = null_mut();
        // Safety: `name16` is nul-terminated and outlives the call
        let ret = unsafe {
            (op)(
                self.interface,
                &mut out,
                name16.as_ptr(),
                mode.bits(),
                attrs.bits(),
            )
        };
        if ret.is_success() && !out.is_null() {
            // Safety: success means a valid file
            Ok(unsafe { File::new(out) })
        } else if ret.is_success() {
            Err(Error::new(Status::NOT_FOUND))
        } else {
            Err(ret.into())
        }
    }

    /// Open `name` relative to this directory, read-only.
    pub fn open(&self, name: &str) -> Result<File<'table>> {
        self.open_impl(name, FileMode::READ, FileAttr::empty())
    }

    /// Open `name` for writing, creating it if missing.
    pub fn create(&self, name: &str) -> Result<File<'table>> {
        self.open_impl(
            name,
            FileMode::READ | FileMode::WRITE | FileMode::CREATE,
            FileAttr::empty(),
        )
    }

    /// Open (creating if missing) a directory named `name`.
    pub fn create_dir(&self, name: &str) -> Result<File<'table>> {
        self.open_impl(
            name,
            FileMode::READ | FileMode::WRITE | FileMode::CREATE,
            FileAttr::DIRECTORY,
        )
    }

    /// Read up to `buf.len()` bytes; returns how many arrived.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let rd = self
            .interface()
            .read
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        let mut size = buf.len();
        // Safety: `buf` is `size` bytes
        let ret = unsafe { (rd)(self.interface, &mut size, buf.as_mut_ptr() as *mut c_void) };
        if ret.is_success() {
            Ok(size)
        } else {
            Err(ret.into())
        }
    }

    /// Read the whole file from the current position.
    pub fn read_to_end(&self) -> Result<Vec<u8>> {
        let info = self.info()?;
        let mut buf = vec![0u8; info.file_size as usize];
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(buf)
    }

    /// Write all of `data` in one protocol call.
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        let wr = self
            .interface()
            .write
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        let mut size = data.len();
        // Safety: `data` is `size` bytes
        let ret = unsafe { (wr)(self.interface, &mut size, data.as_ptr() as *const c_void) };
        if ret.is_success() {
            Ok(size)
        } else {
            Err(ret.into())
        }
    }

    pub fn set_position(&self, pos: u64) -> Result<()> {
        let sp = self
            .interface()
            .set_position
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        // Safety: statically correct arguments
        unsafe { (sp)(self.interface, pos) }.into()
    }

    /// Size, attributes, name and modification time of this file.
    pub fn info(&self) -> Result<FileInfo> {
        let gi = self
            .interface()
            .get_info
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        let id = FILE_INFO_ID;
        let mut size = 0usize;
        // Safety: sizing call
        let ret = unsafe { (gi)(self.interface, &id, &mut size, null_mut()) };
        if ret != Status::BUFFER_TOO_SMALL {
            return if ret.is_success() {
                Err(Error::new(Status::BAD_BUFFER_SIZE))
            } else {
                Err(ret.into())
            };
        }
        let mut buf = vec![0u8; size];
        // Safety: `buf` is `size` bytes
        let ret = unsafe {
            (gi)(
                self.interface,
                &id,
                &mut size,
                buf.as_mut_ptr() as *mut c_void,
            )
        };
        if ret.is_success() {
            FileInfo::parse(&buf[..size])
        } else {
            Err(ret.into())
        }
    }

    /// Next entry of this directory, [`None`] at the end. Reading a
    /// directory yields one EFI_FILE_INFO per call.
    pub fn read_dir_entry(&self) -> Result<Option<FileInfo>> {
        let rd = self
            .interface()
            .read
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        let mut size = 0usize;
        // Safety: sizing call
        let ret = unsafe { (rd)(self.interface, &mut size, null_mut()) };
        if ret.is_success() && size == 0 {
            // end of directory
            return Ok(None);
        }
        if ret != Status::BUFFER_TOO_SMALL && !ret.is_success() {
            return Err(ret.into());
        }
        if size == 0 {
            return Ok(None);
        }
        let mut buf = vec![0u8; size];
        // Safety: `buf` is `size` bytes
        let ret = unsafe { (rd)(self.interface, &mut size, buf.as_mut_ptr() as *mut c_void) };
        if ret.is_success() {
            if size == 0 {
                Ok(None)
            } else {
                FileInfo::parse(&buf[..size]).map(Some)
            }
        } else {
            Err(ret.into())
        }
    }

    /// Flush pending writes to media.
    pub fn flush(&self) -> Result<()> {
        let fl = self
            .interface()
            .flush
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        // Safety: statically correct arguments
        unsafe { (fl)(self.interface) }.into()
    }

    /// Close the handle, flushing pending I/O.
    pub fn close(self) -> Result<()> {
        let cl = self
            .interface()
            .close
            .ok_or(Error::new(Status::UNSUPPORTED))?;
        // Safety: consumed by value, no further use possible
        unsafe { (cl)(self.interface) }.into()
    }
}
