//! Safe protocol wrappers
//!
//! Each wrapper is a transparent pointer newtype produced by
//! [`interface!`][crate::util::interface]; the [`Protocol`] trait ties it
//! to the GUID firmware knows it by, so
//! [`BootServices::handle_protocol`][hp] can be generic over the
//! requested protocol.
//!
//! [hp]: crate::table::BootServices::handle_protocol

use steamcl_core::base::Guid;

pub mod console;
pub mod device_path;
pub mod loaded_image;
pub mod media;

/// A UEFI protocol: a GUID-identified interface obtainable from a handle.
///
/// # Safety
///
/// `GUID` must be the specification GUID for `Raw`, or firmware pointers
/// will be reinterpreted as the wrong type.
pub unsafe trait Protocol<'table> {
    const GUID: Guid;
    const NAME: &'static str;
    type Raw;

    /// Wrap a raw interface pointer.
    ///
    /// # Safety
    ///
    /// `this` must be a valid instance of `Raw` for the duration of
    /// `'table`.
    unsafe fn from_raw(this: *mut Self::Raw) -> Self;
}
