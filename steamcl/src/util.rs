//! Utilities

/// Create a new, transparent wrapper around a raw UEFI table or protocol
/// interface.
///
/// Uses a phantom lifetime `'table` so the wrapper can't outlive the
/// System Table that produced it. All interfaces derive [`Debug`].
macro_rules! interface {
    ($(
        $(#[$meta:meta])*
        $name:ident($raw:ty)
    ),* $(,)*) => {
        $(
            $(#[$meta])*
            #[derive(Debug)]
            #[repr(transparent)]
            pub struct $name<'table> {
                /// Interface pointer. Conceptually owned by firmware; the
                /// lifetime ties it to the SystemTable.
                interface: *mut $raw,

                phantom: core::marker::PhantomData<&'table mut $raw>,
            }

            #[allow(dead_code)]
            impl<'table> $name<'table> {
                /// Create a new interface wrapper
                ///
                /// # Safety
                ///
                /// - `interface` must be a valid non-null pointer from
                ///   firmware, or a faithful mock of one
                pub(crate) unsafe fn new(interface: *mut $raw) -> Self {
                    Self {
                        interface,
                        phantom: core::marker::PhantomData,
                    }
                }

                /// Reborrow the interface pointer
                fn interface(&self) -> &$raw {
                    // Safety: the existence of `&self` implies validity
                    unsafe { &*(self.interface as *const $raw) }
                }

                /// Raw pointer to this interface
                pub fn as_ptr(&self) -> *mut $raw {
                    self.interface
                }
            }
        )*
    };
}
pub(crate) use interface;

/// Implement [`crate::proto::Protocol`] for an [`interface!`] wrapper.
macro_rules! protocol {
    ($name:ident($raw:ty), $guid:expr) => {
        // Safety: `$guid` is the GUID the UEFI specification assigns to
        // this protocol
        unsafe impl<'table> $crate::proto::Protocol<'table> for $name<'table> {
            const GUID: ::steamcl_core::base::Guid = $guid;
            const NAME: &'static str = stringify!($name);
            type Raw = $raw;

            unsafe fn from_raw(this: *mut $raw) -> Self {
                Self::new(this)
            }
        }
    };
}
pub(crate) use protocol;
