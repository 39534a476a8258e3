//! Device-path byte handling
//!
//! A UEFI device path is a packed, unaligned sequence of variable-length
//! nodes, each headed by `(type, sub_type, len_le16)` and terminated by an
//! END node. Firmware hands them to us as raw pointers; everything here
//! works on plain byte slices so the interesting predicates are testable
//! without firmware.
//!
//! # References
//!
//! - [UEFI Section 10. Device Path Protocol][s10]
//!
//! [s10]: <https://uefi.org/specs/UEFI/2.10/10_Protocols_Device_Path_Protocol.html>

use alloc::{string::String, vec::Vec};

use crate::base::Guid;

pub const TYPE_HARDWARE: u8 = 0x01;
pub const TYPE_ACPI: u8 = 0x02;
pub const TYPE_MESSAGING: u8 = 0x03;
pub const TYPE_MEDIA: u8 = 0x04;
pub const TYPE_END: u8 = 0x7f;

pub const SUBTYPE_MEDIA_HARDDRIVE: u8 = 0x01;
pub const SUBTYPE_MEDIA_FILE: u8 = 0x04;
pub const SUBTYPE_END_ENTIRE: u8 = 0xff;

/// Signature type of a GPT hard-drive node: a partition GUID.
const SIGNATURE_TYPE_GUID: u8 = 0x02;

/// Byte length of a node header.
const HEADER_LEN: usize = 4;

/// Sanity cap when walking a path from a raw firmware pointer.
const MAX_RAW_PATH: usize = 64 * 1024;

/// One node of a device path. `data` is the payload after the 4-byte
/// header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node<'path> {
    pub ty: u8,
    pub sub_ty: u8,
    pub data: &'path [u8],
}

impl<'path> Node<'path> {
    #[inline]
    pub fn is_harddrive(&self) -> bool {
        self.ty == TYPE_MEDIA && self.sub_ty == SUBTYPE_MEDIA_HARDDRIVE
    }
}

/// Iterator over the nodes of a device path, stopping at the END node or
/// at the first structurally impossible header.
pub struct Nodes<'path> {
    rest: &'path [u8],
}

impl<'path> Iterator for Nodes<'path> {
    type Item = Node<'path>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.len() < HEADER_LEN {
            return None;
        }
        let ty = self.rest[0];
        let sub_ty = self.rest[1];
        let len = u16::from_le_bytes([self.rest[2], self.rest[3]]) as usize;
        if len < HEADER_LEN || len > self.rest.len() {
            // corrupt length, stop walking
            self.rest = &[];
            return None;
        }
        if ty == TYPE_END && sub_ty == SUBTYPE_END_ENTIRE {
            self.rest = &[];
            return None;
        }
        let node = Node {
            ty,
            sub_ty,
            data: &self.rest[HEADER_LEN..len],
        };
        self.rest = &self.rest[len..];
        Some(node)
    }
}

/// Iterate the nodes of `path`, END node excluded.
pub fn nodes(path: &[u8]) -> Nodes<'_> {
    Nodes { rest: path }
}

/// Whether two device paths sit on the same physical disk.
///
/// Both paths are walked in lockstep; every node must agree on type,
/// sub-type, length and payload bytes, except that the payload of the
/// first MEDIA/HARDDRIVE node is not compared (the partition index is
/// allowed to differ). Reaching that node on both sides is the only way
/// to succeed; a path that ends before a hard-drive node fails the test.
pub fn same_disk(a: &[u8], b: &[u8]) -> bool {
    let mut na = nodes(a);
    let mut nb = nodes(b);
    loop {
        match (na.next(), nb.next()) {
            (Some(a), Some(b)) => {
                if a.ty != b.ty || a.sub_ty != b.sub_ty || a.data.len() != b.data.len() {
                    return false;
                }
                if a.is_harddrive() {
                    return true;
                }
                if a.data != b.data {
                    return false;
                }
            }
            _ => return false,
        }
    }
}

/// The GPT partition GUID of the first hard-drive node in `path`, if any.
pub fn harddrive_signature(path: &[u8]) -> Option<Guid> {
    for node in nodes(path) {
        if !node.is_harddrive() {
            continue;
        }
        // HARDDRIVE payload: partition number u32, start u64, size u64,
        // signature [u8; 16], mbr type u8, signature type u8
        if node.data.len() < 38 || node.data[37] != SIGNATURE_TYPE_GUID {
            return None;
        }
        let mut sig = [0u8; 16];
        sig.copy_from_slice(&node.data[20..36]);
        return Some(Guid::new(sig));
    }
    None
}

/// Text of the file-path nodes of `path`, joined with `\`. This is how
/// the loader learns its own on-disk location from the LoadedImage file
/// path.
pub fn file_path_text(path: &[u8]) -> Option<String> {
    let mut text = String::new();
    for node in nodes(path) {
        if node.ty != TYPE_MEDIA || node.sub_ty != SUBTYPE_MEDIA_FILE {
            continue;
        }
        let units: Vec<u16> = node
            .data
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .take_while(|&u| u != 0)
            .collect();
        let part: String = char::decode_utf16(units.into_iter())
            .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect();
        if !text.is_empty() && !text.ends_with('\\') && !part.starts_with('\\') {
            text.push('\\');
        }
        text.push_str(&part);
    }
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// An owned device path, END node included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevicePathBuf {
    bytes: Vec<u8>,
}

impl DevicePathBuf {
    /// Concatenate the device `prefix` (END node stripped) with a
    /// MEDIA/FILE node holding `path` as nul-terminated UTF-16, then
    /// re-terminate. This is the absolute path handed to LoadImage.
    pub fn file_on_device(prefix: &[u8], path: &str) -> Self {
        let mut bytes = Vec::with_capacity(prefix.len() + path.len() * 2 + 2 * HEADER_LEN);
        for node in nodes(prefix) {
            push_node(&mut bytes, node.ty, node.sub_ty, node.data);
        }
        let mut utf16: Vec<u8> = Vec::with_capacity((path.len() + 1) * 2);
        for unit in path.encode_utf16() {
            utf16.extend_from_slice(&unit.to_le_bytes());
        }
        utf16.extend_from_slice(&0u16.to_le_bytes());
        push_node(&mut bytes, TYPE_MEDIA, SUBTYPE_MEDIA_FILE, &utf16);
        push_node(&mut bytes, TYPE_END, SUBTYPE_END_ENTIRE, &[]);
        Self { bytes }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.bytes.as_ptr()
    }
}

fn push_node(out: &mut Vec<u8>, ty: u8, sub_ty: u8, data: &[u8]) {
    out.push(ty);
    out.push(sub_ty);
    out.extend_from_slice(&((data.len() + HEADER_LEN) as u16).to_le_bytes());
    out.extend_from_slice(data);
}

/// Copy a device path out of raw firmware memory, END node included.
///
/// # Safety
///
/// `p` must point to a well-formed device path. The walk is capped at
/// [`MAX_RAW_PATH`] bytes in case it is not.
pub unsafe fn clone_from_ptr(p: *const u8) -> Vec<u8> {
    let mut out = Vec::new();
    let mut off = 0usize;
    while off + HEADER_LEN <= MAX_RAW_PATH {
        let ty = p.add(off).read();
        let sub_ty = p.add(off + 1).read();
        let len = u16::from_le_bytes([p.add(off + 2).read(), p.add(off + 3).read()]) as usize;
        if len < HEADER_LEN {
            break;
        }
        for i in 0..len {
            out.push(p.add(off + i).read());
        }
        off += len;
        if ty == TYPE_END && sub_ty == SUBTYPE_END_ENTIRE {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(ty: u8, sub_ty: u8, data: &[u8]) -> Vec<u8> {
        let mut v = Vec::new();
        push_node(&mut v, ty, sub_ty, data);
        v
    }

    fn end() -> Vec<u8> {
        node(TYPE_END, SUBTYPE_END_ENTIRE, &[])
    }

    fn harddrive(part_index: u32, uuid: Guid) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&part_index.to_le_bytes());
        data.extend_from_slice(&2048u64.to_le_bytes());
        data.extend_from_slice(&409_600u64.to_le_bytes());
        data.extend_from_slice(&uuid.to_bytes());
        data.push(0x02); // GPT
        data.push(SIGNATURE_TYPE_GUID);
        node(TYPE_MEDIA, SUBTYPE_MEDIA_HARDDRIVE, &data)
    }

    fn disk_path(disk: u8, part_index: u32, uuid: Guid) -> Vec<u8> {
        let mut path = Vec::new();
        path.extend_from_slice(&node(TYPE_ACPI, 0x01, &[0x41, 0xd0, 0x0a, disk]));
        path.extend_from_slice(&node(TYPE_HARDWARE, 0x01, &[0x02, 0x1f]));
        path.extend_from_slice(&harddrive(part_index, uuid));
        path.extend_from_slice(&end());
        path
    }

    fn uuid(n: u8) -> Guid {
        let mut b = [0u8; 16];
        b[15] = n;
        Guid::new(b)
    }

    #[test]
    fn node_iteration_stops_at_end() {
        let path = disk_path(1, 1, uuid(1));
        let all: Vec<_> = nodes(&path).collect();
        assert_eq!(all.len(), 3);
        assert!(all[2].is_harddrive());
    }

    #[test]
    fn same_disk_is_reflexive_and_symmetric() {
        let a = disk_path(1, 1, uuid(1));
        let b = disk_path(1, 2, uuid(2));
        assert!(same_disk(&a, &a));
        assert!(same_disk(&a, &b));
        assert!(same_disk(&b, &a));
    }

    #[test]
    fn same_disk_rejects_different_disks() {
        let a = disk_path(1, 1, uuid(1));
        let b = disk_path(2, 1, uuid(1));
        assert!(!same_disk(&a, &b));
    }

    #[test]
    fn same_disk_requires_a_harddrive_node() {
        let mut no_hd = Vec::new();
        no_hd.extend_from_slice(&node(TYPE_ACPI, 0x01, &[0x41, 0xd0, 0x0a, 1]));
        no_hd.extend_from_slice(&end());
        let full = disk_path(1, 1, uuid(1));
        assert!(!same_disk(&no_hd, &no_hd));
        assert!(!same_disk(&no_hd, &full));
        assert!(!same_disk(&full, &no_hd));
    }

    #[test]
    fn signature_extraction() {
        let path = disk_path(1, 3, uuid(7));
        assert_eq!(harddrive_signature(&path), Some(uuid(7)));
        let mut no_hd = node(TYPE_ACPI, 0x01, &[0, 0, 0, 0]);
        no_hd.extend_from_slice(&end());
        assert_eq!(harddrive_signature(&no_hd), None);
    }

    #[test]
    fn file_on_device_layout() {
        let prefix = disk_path(1, 1, uuid(1));
        let buf = DevicePathBuf::file_on_device(&prefix, "\\EFI\\steamos\\grubx64.efi");
        let all: Vec<_> = nodes(buf.as_bytes()).collect();
        assert_eq!(all.len(), 4);
        let file = all[3];
        assert_eq!((file.ty, file.sub_ty), (TYPE_MEDIA, SUBTYPE_MEDIA_FILE));
        // nul-terminated UTF-16 payload
        assert_eq!(file.data.len(), ("\\EFI\\steamos\\grubx64.efi".len() + 1) * 2);
        assert_eq!(&file.data[file.data.len() - 2..], &[0, 0]);
        // still a terminated path
        assert_eq!(
            &buf.as_bytes()[buf.as_bytes().len() - 4..],
            &[TYPE_END, SUBTYPE_END_ENTIRE, 4, 0]
        );
    }

    #[test]
    fn file_path_text_decodes() {
        let mut path = Vec::new();
        let name: Vec<u8> = "\\EFI\\Shell\\steamcl.efi"
            .encode_utf16()
            .chain([0u16])
            .flat_map(|u| u.to_le_bytes())
            .collect();
        path.extend_from_slice(&node(TYPE_MEDIA, SUBTYPE_MEDIA_FILE, &name));
        path.extend_from_slice(&end());
        assert_eq!(
            file_path_text(&path).as_deref(),
            Some("\\EFI\\Shell\\steamcl.efi")
        );
        assert_eq!(file_path_text(&end()), None);
    }

    #[test]
    fn clone_from_ptr_copies_whole_path() {
        let path = disk_path(1, 1, uuid(1));
        let copy = unsafe { clone_from_ptr(path.as_ptr()) };
        assert_eq!(copy, path);
    }

    #[test]
    fn corrupt_length_terminates_walk() {
        let mut path = node(TYPE_ACPI, 0x01, &[0; 4]);
        path.extend_from_slice(&[TYPE_MEDIA, SUBTYPE_MEDIA_FILE, 0x00, 0x00]); // len 0
        let all: Vec<_> = nodes(&path).collect();
        assert_eq!(all.len(), 1);
    }
}
