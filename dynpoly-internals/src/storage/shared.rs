//! Storage in one reference-counted block with copy-on-write.
//!
//! This module encapsulates the `ptr` field of [`RawShared`], ensuring it is
//! only created from [`triomphe::Arc::into_raw`]. This guarantees the safety
//! invariant: **the pointer comes from a [`triomphe::Arc`] of the payload's
//! type, and this state owns one of its references**.

use core::ptr::NonNull;

use crate::{
    erased::{ErasedMut, ErasedRef},
    storage::{OwningStorage, PolicyKind, RawStorage, StorageError, sealed},
    util::Erased,
    vtable::{Lifecycle, into_erased},
};

/// A payload in a [`triomphe::Arc`] block that any number of states share.
///
/// Copying only increments the reference count. Unique access detaches this
/// state first if the block is shared, so writes are never observed by the
/// other owners.
#[repr(transparent)]
pub struct RawShared {
    /// Pointer to the payload
    ///
    /// # Safety
    ///
    /// The following safety invariants are guaranteed to be upheld as long as
    /// this struct exists:
    ///
    /// 1. The pointer came from [`triomphe::Arc::into_raw`] for the payload's
    ///    type.
    /// 2. This state owns one reference to the block.
    ptr: NonNull<Erased>,
}

impl sealed::Sealed for RawShared {}

impl OwningStorage for RawShared {
    fn try_new<T: Clone + 'static>(value: T) -> Result<Self, StorageError> {
        let arc = triomphe::Arc::new(value);
        Ok(Self {
            // SAFETY:
            // 1. `into_erased` calls `Arc::into_raw` on an `Arc<T>`
            // 2. The reference is moved into this state
            ptr: into_erased(arc),
        })
    }
}

impl RawStorage for RawShared {
    const KIND: PolicyKind = PolicyKind::SharedCow;

    unsafe fn payload<'a>(&'a self, lifecycle: &Lifecycle) -> ErasedRef<'a> {
        // SAFETY:
        // 1. The block holds an initialized payload (it is alive while we own a
        //    reference) and `lifecycle` describes it (guaranteed by the caller)
        // 2. Our reference keeps the block alive for `'a`. Other owners only read
        //    it or detach before writing
        unsafe { ErasedRef::new(self.ptr, lifecycle.type_id_fn()) }
    }

    unsafe fn payload_mut<'a>(
        &'a mut self,
        lifecycle: &Lifecycle,
    ) -> Result<ErasedMut<'a>, StorageError> {
        // SAFETY:
        // 1. The pointer came from `Arc::into_raw` for the type of `lifecycle`
        // 2. We hand over our reference and store the returned one right below
        self.ptr = unsafe { lifecycle.shared_make_unique(self.ptr) };
        // SAFETY:
        // 1. The block holds an initialized payload of the type of `lifecycle`
        // 2. `shared_make_unique` left us as the only owner and we hold `&mut self`
        Ok(unsafe { ErasedMut::new(self.ptr, lifecycle.type_id_fn()) })
    }

    unsafe fn try_clone(&self, lifecycle: &Lifecycle) -> Result<Self, StorageError> {
        Ok(Self {
            // SAFETY:
            // 1. The pointer came from `Arc::into_raw` and we still own it
            ptr: unsafe { lifecycle.shared_retain(self.ptr) },
        })
    }

    unsafe fn destroy(self, lifecycle: &Lifecycle) {
        // SAFETY:
        // 1. The pointer came from `Arc::into_raw` for the type of `lifecycle`
        // 2. `self` is consumed, so the pointer is not used again
        unsafe {
            lifecycle.shared_release(self.ptr);
        }
    }

    unsafe fn strong_count(&self, lifecycle: &Lifecycle) -> Option<usize> {
        // SAFETY:
        // 1. The pointer came from `Arc::into_raw` and we still own it
        Some(unsafe { lifecycle.shared_strong_count(self.ptr) })
    }
}

impl core::fmt::Debug for RawShared {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("RawShared").field(&self.ptr).finish()
    }
}
