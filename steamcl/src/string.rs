//! UTF-16 and path string helpers
//!
//! Firmware talks nul-terminated UTF-16; the loader keeps everything as
//! Rust strings internally and converts at the boundary.

use alloc::{
    string::{String, ToString},
    vec::Vec,
};

use steamcl_core::base::Char16;

/// Encode `s` as nul-terminated UTF-16 code units.
pub fn to_utf16(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(core::iter::once(0)).collect()
}

/// Encode `s` as the little-endian byte image of a nul-terminated UTF-16
/// string, the form firmware variables store text in.
pub fn to_utf16_bytes(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity((s.len() + 1) * 2);
    for unit in s.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out.extend_from_slice(&0u16.to_le_bytes());
    out
}

/// Decode little-endian UTF-16 bytes up to the first nul (or the end).
pub fn decode_utf16_bytes(data: &[u8]) -> String {
    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|&u| u != 0)
        .collect();
    char::decode_utf16(units.into_iter())
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Decode a nul-terminated UTF-16 string out of raw memory.
///
/// # Safety
///
/// `p` must point at a nul-terminated string. The walk is capped at 4096
/// characters in case it is not.
pub unsafe fn decode_utf16_ptr(p: *const Char16) -> String {
    let mut units = Vec::new();
    let mut i = 0;
    while i < 4096 {
        let u = p.add(i).read();
        if u == 0 {
            break;
        }
        units.push(u);
        i += 1;
    }
    char::decode_utf16(units.into_iter())
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Resolve `path` against the file `relative_to`.
///
/// Separators are normalised to `\`. An absolute `path` is returned
/// as-is; otherwise the final component of `relative_to` is stripped and
/// `path` appended, so `loader: next.efi` beside `\SteamOS\conf\A.conf`
/// resolves to `\SteamOS\conf\next.efi`. An empty `path` resolves to
/// nothing; an empty `relative_to` means the volume root.
pub fn resolve_path(path: &str, relative_to: &str) -> Option<String> {
    if path.is_empty() {
        return None;
    }
    let path = path.replace('/', "\\");
    if path.starts_with('\\') {
        return Some(path);
    }

    let rel = if relative_to.is_empty() {
        "\\".to_string()
    } else {
        relative_to.replace('/', "\\")
    };
    let rel = match rel.rfind('\\') {
        Some(i) => &rel[..i],
        None => rel.as_str(),
    };
    if rel.is_empty() {
        let mut abs = String::with_capacity(path.len() + 1);
        abs.push('\\');
        abs.push_str(&path);
        return Some(abs);
    }

    let mut abs = String::with_capacity(rel.len() + path.len() + 2);
    if !rel.starts_with('\\') {
        abs.push('\\');
    }
    abs.push_str(rel);
    abs.push('\\');
    abs.push_str(&path);
    Some(abs)
}
