//! Storage in one owned heap block.
//!
//! This module encapsulates the `ptr` field of [`RawHeap`], ensuring it is
//! only created by [`OwningStorage::try_new`] or [`RawStorage::try_clone`].
//! This guarantees the safety invariant: **the pointer was returned by
//! [`allocate`] for the payload's type and holds an initialized payload that
//! no other state owns**.

use core::{alloc::Layout, ptr::NonNull};

use crate::{
    erased::{ErasedMut, ErasedRef},
    storage::{OwningStorage, PolicyKind, RawStorage, StorageError, allocate, deallocate, sealed},
    util::Erased,
    vtable::Lifecycle,
};

/// A payload in its own heap block.
///
/// Copying allocates a second block and clones into it.
#[repr(transparent)]
pub struct RawHeap {
    /// Pointer to the payload
    ///
    /// # Safety
    ///
    /// The following safety invariants are guaranteed to be upheld as long as
    /// this struct exists:
    ///
    /// 1. The pointer was returned by [`allocate`] for the payload's type.
    /// 2. The block holds an initialized payload owned by this state alone.
    ptr: NonNull<Erased>,
}

impl sealed::Sealed for RawHeap {}

impl OwningStorage for RawHeap {
    fn try_new<T: Clone + 'static>(value: T) -> Result<Self, StorageError> {
        let Some(ptr) = allocate::<T>() else {
            return Err(StorageError::OutOfMemory {
                layout: Layout::new::<T>(),
            });
        };
        // SAFETY: `ptr` was just allocated for a `T`
        unsafe { ptr.as_ptr().write(value) };
        Ok(Self {
            // SAFETY:
            // 1. The block came from `allocate::<T>`
            // 2. We just wrote the value and nothing else knows about the block
            ptr: ptr.cast::<Erased>(),
        })
    }
}

impl RawStorage for RawHeap {
    const KIND: PolicyKind = PolicyKind::Heap;

    unsafe fn payload<'a>(&'a self, lifecycle: &Lifecycle) -> ErasedRef<'a> {
        // SAFETY:
        // 1. The payload is initialized (guaranteed by the invariants of this type)
        //    and `lifecycle` describes it (guaranteed by the caller)
        // 2. The payload lives until `destroy` consumes `self`
        unsafe { ErasedRef::new(self.ptr, lifecycle.type_id_fn()) }
    }

    unsafe fn payload_mut<'a>(
        &'a mut self,
        lifecycle: &Lifecycle,
    ) -> Result<ErasedMut<'a>, StorageError> {
        // SAFETY:
        // 1. The payload is initialized (guaranteed by the invariants of this type)
        //    and `lifecycle` describes it (guaranteed by the caller)
        // 2. This state is the only owner and we hold `&mut self`. The pointer came
        //    from the allocator, so it allows writes
        Ok(unsafe { ErasedMut::new(self.ptr, lifecycle.type_id_fn()) })
    }

    unsafe fn try_clone(&self, lifecycle: &Lifecycle) -> Result<Self, StorageError> {
        // SAFETY:
        // 1. The payload is initialized and `lifecycle` describes it
        let ptr = unsafe { lifecycle.clone_to_heap(self.ptr) };
        match ptr {
            Some(ptr) => Ok(Self {
                // SAFETY:
                // 1. `clone_to_heap` allocates with `allocate`
                // 2. The clone is fresh and only owned here
                ptr,
            }),
            None => Err(StorageError::OutOfMemory {
                layout: lifecycle.layout(),
            }),
        }
    }

    unsafe fn destroy(self, lifecycle: &Lifecycle) {
        // SAFETY:
        // 1. The payload is initialized and `lifecycle` describes it
        // 2. `self` is consumed, so the payload is never used again
        unsafe {
            lifecycle.drop_in_place(self.ptr);
        }
        // SAFETY:
        // 1. The block came from `allocate` with the layout of the payload
        // 2. The payload was dropped above and `self` is consumed
        unsafe {
            deallocate(self.ptr, lifecycle.layout());
        }
    }
}

impl core::fmt::Debug for RawHeap {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("RawHeap").field(&self.ptr).finish()
    }
}
