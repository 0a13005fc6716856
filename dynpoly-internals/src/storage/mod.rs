//! Raw storage states, one per storage policy.
//!
//! A raw storage state holds the bytes of one payload whose concrete type has
//! been erased. It never remembers that type: every operation that needs it
//! takes the [`Lifecycle`] built for the payload, and the caller promises the
//! two belong together.
//!
//! The states differ only in where the bytes live and in what copying means:
//!
//! | state | location | copy |
//! |---|---|---|
//! | [`RawHeap`] | one heap block | deep |
//! | [`RawSbo`] | inline buffer, heap block if too large | deep |
//! | [`RawFixed`] | inline buffer only | deep |
//! | [`RawShared`] | one reference-counted block | shallow, detached on write |
//! | [`RawBorrowed`] | somewhere else, read-only | shallow |
//! | [`RawBorrowedMut`] | somewhere else, writable | not copyable |

mod borrowed;
mod heap;
mod inline;
mod shared;

use core::{alloc::Layout, fmt, ptr::NonNull};

pub use self::{
    borrowed::{RawBorrowed, RawBorrowedMut},
    heap::RawHeap,
    inline::{INLINE_ALIGN, RawFixed, RawSbo},
    shared::RawShared,
};
use crate::{
    erased::{ErasedMut, ErasedRef},
    util::Erased,
    vtable::Lifecycle,
};

/// Identifies a storage policy in errors and diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PolicyKind {
    /// One owned heap block per handle.
    Heap,
    /// Inline buffer with heap fallback.
    Sbo,
    /// Inline buffer without fallback.
    Fixed,
    /// Read-only reference to a value owned elsewhere.
    Borrowed,
    /// Writable reference to a value owned elsewhere.
    BorrowedMut,
    /// Reference-counted block with copy-on-write.
    SharedCow,
}

impl PolicyKind {
    /// Returns the name of the policy.
    pub const fn name(self) -> &'static str {
        match self {
            PolicyKind::Heap => "heap",
            PolicyKind::Sbo => "sbo",
            PolicyKind::Fixed => "fixed",
            PolicyKind::Borrowed => "borrowed",
            PolicyKind::BorrowedMut => "borrowed-mut",
            PolicyKind::SharedCow => "shared-cow",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Failure reported by a raw storage state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// The allocator could not provide a block for the payload.
    #[error(
        "out of memory allocating {} bytes (align {})",
        .layout.size(),
        .layout.align()
    )]
    OutOfMemory {
        /// Layout of the payload that did not fit.
        layout: Layout,
    },
    /// The policy does not support the requested operation.
    #[error("{operation} is not supported by the {policy} policy")]
    InvalidOperationForPolicy {
        /// The policy that refused.
        policy: PolicyKind,
        /// Name of the refused operation.
        operation: &'static str,
    },
    /// The policy cannot produce a second handle to its payload.
    #[error("the {policy} policy cannot be copied")]
    NotCopyable {
        /// The policy that refused.
        policy: PolicyKind,
    },
}

/// Prevents implementations of [`RawStorage`] outside of this crate.
mod sealed {
    /// Supertrait of [`RawStorage`](super::RawStorage).
    pub trait Sealed {}
}

/// Common contract of the raw storage states.
///
/// The lifetime of the payload is tied to the state: it is valid from
/// construction until [`RawStorage::destroy`] consumes the state. A state that
/// is dropped without being destroyed leaks its payload.
///
/// # Safety
///
/// Every method taking a [`Lifecycle`] requires that the lifecycle was created
/// for the concrete type of the payload held by this state.
pub trait RawStorage: Sized + sealed::Sealed {
    /// The policy this state implements.
    const KIND: PolicyKind;

    /// Returns a shared pointer to the payload.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `lifecycle` is the [`Lifecycle`] of the payload's concrete type.
    unsafe fn payload<'a>(&'a self, lifecycle: &Lifecycle) -> ErasedRef<'a>;

    /// Returns a unique pointer to the payload.
    ///
    /// Shared states first detach from other owners, cloning the payload if
    /// needed. Read-only states fail with
    /// [`StorageError::InvalidOperationForPolicy`].
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `lifecycle` is the [`Lifecycle`] of the payload's concrete type.
    unsafe fn payload_mut<'a>(
        &'a mut self,
        lifecycle: &Lifecycle,
    ) -> Result<ErasedMut<'a>, StorageError>;

    /// Creates a second state holding a copy of the payload.
    ///
    /// What a copy is depends on the policy, see the [module documentation].
    ///
    /// [module documentation]: self
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `lifecycle` is the [`Lifecycle`] of the payload's concrete type.
    unsafe fn try_clone(&self, lifecycle: &Lifecycle) -> Result<Self, StorageError>;

    /// Releases everything this state owns.
    ///
    /// Owning states run the payload's destructor and free its memory.
    /// Borrowing states do nothing.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `lifecycle` is the [`Lifecycle`] of the payload's concrete type.
    unsafe fn destroy(self, lifecycle: &Lifecycle);

    /// Returns `true` if the payload lives inside the state itself.
    fn is_inline(&self) -> bool {
        false
    }

    /// Returns the number of states sharing the payload, for policies that
    /// count them.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `lifecycle` is the [`Lifecycle`] of the payload's concrete type.
    unsafe fn strong_count(&self, lifecycle: &Lifecycle) -> Option<usize> {
        let _ = lifecycle;
        None
    }
}

/// Raw storage states that own their payload and can be created from a value.
pub trait OwningStorage: RawStorage {
    /// Moves `value` into a new state.
    ///
    /// On failure `value` is dropped and nothing is leaked.
    fn try_new<T: Clone + 'static>(value: T) -> Result<Self, StorageError>;
}

/// Allocates uninitialized heap memory for one `T`.
///
/// Zero-sized types get a dangling, well-aligned pointer.
pub(crate) fn allocate<T>() -> Option<NonNull<T>> {
    let layout = Layout::new::<T>();
    if layout.size() == 0 {
        return Some(NonNull::dangling());
    }
    // SAFETY: The layout has a non-zero size
    let ptr = unsafe { alloc::alloc::alloc(layout) };
    NonNull::new(ptr.cast::<T>())
}

/// Frees a block obtained from [`allocate`].
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. `ptr` was returned by [`allocate`] for a type with the given `layout`.
/// 2. The value in the block was already dropped or moved out, and the block
///    is not used afterwards.
pub(crate) unsafe fn deallocate(ptr: NonNull<Erased>, layout: Layout) {
    if layout.size() == 0 {
        return;
    }
    // SAFETY:
    // 1. The block was allocated by the global allocator with this layout
    //    (guaranteed by the caller)
    // 2. Guaranteed by the caller
    unsafe { alloc::alloc::dealloc(ptr.as_ptr().cast::<u8>(), layout) }
}

#[cfg(test)]
mod tests {
    use alloc::string::ToString;

    use super::*;

    #[test]
    fn test_policy_kind_display() {
        assert_eq!(PolicyKind::SharedCow.to_string(), "shared-cow");
        assert_eq!(PolicyKind::Sbo.to_string(), "sbo");
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::OutOfMemory {
            layout: Layout::new::<u64>(),
        };
        assert_eq!(err.to_string(), "out of memory allocating 8 bytes (align 8)");

        let err = StorageError::InvalidOperationForPolicy {
            policy: PolicyKind::Borrowed,
            operation: "call_mut",
        };
        assert_eq!(
            err.to_string(),
            "call_mut is not supported by the borrowed policy"
        );

        let err = StorageError::NotCopyable {
            policy: PolicyKind::BorrowedMut,
        };
        assert_eq!(err.to_string(), "the borrowed-mut policy cannot be copied");

        let err: &dyn core::error::Error = &err;
        assert!(err.source().is_none());
    }

    #[test]
    fn test_allocate_zero_sized() {
        let ptr = allocate::<()>().unwrap();
        assert_eq!(ptr, NonNull::dangling());
        // SAFETY: The block came from `allocate::<()>` and holds nothing
        unsafe { deallocate(ptr.cast(), Layout::new::<()>()) }
    }
}
