//! Storage that refers to a value owned elsewhere.
//!
//! Neither state ever allocates, clones the referent, or runs its destructor.
//! The referent's lifetime is carried as `'a`, so the borrow checker rejects a
//! state that would outlive it.
//!
//! This module encapsulates the `ptr` fields, ensuring they are only created
//! from a reference by [`RawBorrowed::new`] and [`RawBorrowedMut::new`].

use core::{marker::PhantomData, ptr::NonNull};

use crate::{
    erased::{ErasedMut, ErasedRef},
    storage::{PolicyKind, RawStorage, StorageError, sealed},
    util::Erased,
    vtable::Lifecycle,
};

/// A read-only reference to a payload owned elsewhere.
///
/// Copying copies the reference. Unique access is refused.
#[derive(Clone, Copy)]
pub struct RawBorrowed<'a> {
    /// Pointer to the referent
    ///
    /// # Safety
    ///
    /// The following safety invariants are guaranteed to be upheld as long as
    /// this struct exists:
    ///
    /// 1. The pointer was created from a `&'a T` for the referent's type `T`.
    ptr: NonNull<Erased>,
    /// Marker to tell the compiler that we should
    /// behave the same as a `&'a Erased`
    _marker: PhantomData<&'a Erased>,
}

impl<'a> RawBorrowed<'a> {
    /// Creates a new [`RawBorrowed`] referring to `value`.
    pub fn new<T: 'static>(value: &'a T) -> Self {
        Self {
            // SAFETY:
            // 1. Created from a `&'a T`
            ptr: NonNull::from(value).cast::<Erased>(),
            _marker: PhantomData,
        }
    }
}

impl sealed::Sealed for RawBorrowed<'_> {}

impl RawStorage for RawBorrowed<'_> {
    const KIND: PolicyKind = PolicyKind::Borrowed;

    unsafe fn payload<'b>(&'b self, lifecycle: &Lifecycle) -> ErasedRef<'b> {
        // SAFETY:
        // 1. The referent is initialized and `lifecycle` describes it (guaranteed by
        //    the caller)
        // 2. The referent is borrowed for `'a`, which outlives `'b`
        unsafe { ErasedRef::new(self.ptr, lifecycle.type_id_fn()) }
    }

    unsafe fn payload_mut<'b>(
        &'b mut self,
        _lifecycle: &Lifecycle,
    ) -> Result<ErasedMut<'b>, StorageError> {
        Err(StorageError::InvalidOperationForPolicy {
            policy: Self::KIND,
            operation: "mutable access",
        })
    }

    unsafe fn try_clone(&self, _lifecycle: &Lifecycle) -> Result<Self, StorageError> {
        Ok(*self)
    }

    unsafe fn destroy(self, _lifecycle: &Lifecycle) {}
}

/// A writable reference to a payload owned elsewhere.
///
/// Cannot be copied, since two copies would alias the unique borrow.
pub struct RawBorrowedMut<'a> {
    /// Pointer to the referent
    ///
    /// # Safety
    ///
    /// The following safety invariants are guaranteed to be upheld as long as
    /// this struct exists:
    ///
    /// 1. The pointer was created from a `&'a mut T` for the referent's type
    ///    `T`.
    ptr: NonNull<Erased>,
    /// Marker to tell the compiler that we should
    /// behave the same as a `&'a mut Erased`
    _marker: PhantomData<&'a mut Erased>,
}

impl<'a> RawBorrowedMut<'a> {
    /// Creates a new [`RawBorrowedMut`] referring to `value`.
    pub fn new<T: 'static>(value: &'a mut T) -> Self {
        Self {
            // SAFETY:
            // 1. Created from a `&'a mut T`
            ptr: NonNull::from(value).cast::<Erased>(),
            _marker: PhantomData,
        }
    }
}

impl sealed::Sealed for RawBorrowedMut<'_> {}

impl RawStorage for RawBorrowedMut<'_> {
    const KIND: PolicyKind = PolicyKind::BorrowedMut;

    unsafe fn payload<'b>(&'b self, lifecycle: &Lifecycle) -> ErasedRef<'b> {
        // SAFETY:
        // 1. The referent is initialized and `lifecycle` describes it (guaranteed by
        //    the caller)
        // 2. We hold the unique borrow for `'a` and lend it out shared for `'b`
        unsafe { ErasedRef::new(self.ptr, lifecycle.type_id_fn()) }
    }

    unsafe fn payload_mut<'b>(
        &'b mut self,
        lifecycle: &Lifecycle,
    ) -> Result<ErasedMut<'b>, StorageError> {
        // SAFETY:
        // 1. The referent is initialized and `lifecycle` describes it (guaranteed by
        //    the caller)
        // 2. We hold the unique borrow for `'a` and lend it out uniquely for `'b`.
        //    The pointer came from a `&mut`, so it allows writes
        Ok(unsafe { ErasedMut::new(self.ptr, lifecycle.type_id_fn()) })
    }

    unsafe fn try_clone(&self, _lifecycle: &Lifecycle) -> Result<Self, StorageError> {
        Err(StorageError::NotCopyable { policy: Self::KIND })
    }

    unsafe fn destroy(self, _lifecycle: &Lifecycle) {}
}
