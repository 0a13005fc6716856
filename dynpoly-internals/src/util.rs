//! Internal utility types.

/// Marker type used when type-erasing a stored value.
///
/// This zero-sized type is the pointee of every erased payload pointer. A
/// `NonNull<Erased>` points at a value of some concrete type that is only
/// known to the [`Lifecycle`](crate::Lifecycle) travelling next to it.
///
/// Using a distinct marker type (rather than `()` or `u8`) makes the intent
/// clearer in type signatures and prevents accidental reads through the
/// pointer.
pub(crate) struct Erased;
