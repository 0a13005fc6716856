//! Storage inside the state itself.
//!
//! [`RawSbo`] keeps small payloads in an inline buffer and falls back to a
//! [`RawHeap`] block for the rest. [`RawFixed`] has the buffer only and
//! refuses oversized payloads at compile time.
//!
//! A payload fits a buffer of `N` bytes when its size is at most `N` and its
//! alignment is at most [`INLINE_ALIGN`].
//!
//! This module encapsulates the buffer of both states. This guarantees the
//! safety invariant: **an inline buffer always holds one initialized payload,
//! written by [`OwningStorage::try_new`] or [`RawStorage::try_clone`]**.

use core::{cell::UnsafeCell, marker::PhantomData, mem::MaybeUninit, ptr::NonNull};

use crate::{
    erased::{ErasedMut, ErasedRef},
    storage::{OwningStorage, PolicyKind, RawHeap, RawStorage, StorageError, sealed},
    util::Erased,
    vtable::Lifecycle,
};

/// Alignment of every inline buffer.
pub const INLINE_ALIGN: usize = 16;

/// Bytes of an inline payload.
///
/// Payloads may contain interior mutability, so the bytes live in an
/// [`UnsafeCell`].
#[repr(C, align(16))]
struct InlineBuffer<const N: usize> {
    /// The payload bytes
    bytes: UnsafeCell<[MaybeUninit<u8>; N]>,
    /// The payload type is unknown, so the buffer is neither `Send` nor `Sync`
    _marker: PhantomData<*mut Erased>,
}

const _: () = assert!(align_of::<InlineBuffer<0>>() == INLINE_ALIGN);

impl<const N: usize> InlineBuffer<N> {
    /// Returns `true` if a `T` fits this buffer.
    const fn fits<T>() -> bool {
        size_of::<T>() <= N && align_of::<T>() <= INLINE_ALIGN
    }

    /// Moves `value` into a new buffer.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `T` fits the buffer according to [`InlineBuffer::fits`].
    unsafe fn new<T>(value: T) -> Self {
        debug_assert!(Self::fits::<T>());
        let buffer = Self::uninit();
        // SAFETY: The buffer is large and aligned enough (guaranteed by the caller)
        unsafe { buffer.as_ptr().cast::<T>().as_ptr().write(value) };
        buffer
    }

    /// Creates a buffer without a payload.
    fn uninit() -> Self {
        Self {
            bytes: UnsafeCell::new([MaybeUninit::uninit(); N]),
            _marker: PhantomData,
        }
    }

    /// Returns a pointer to the start of the buffer that allows writes.
    fn as_ptr(&self) -> NonNull<Erased> {
        let ptr = self.bytes.get().cast::<Erased>();
        // SAFETY: `UnsafeCell::get` returns a pointer derived from `&self`, which is
        // never null
        unsafe { NonNull::new_unchecked(ptr) }
    }
}

/// A payload in an inline buffer of `N` bytes, or in a heap block when it does
/// not fit.
///
/// The heap fallback behaves exactly like [`RawHeap`].
pub struct RawSbo<const N: usize> {
    /// Where the payload lives
    repr: SboRepr<N>,
}

/// The two places a [`RawSbo`] payload can live.
enum SboRepr<const N: usize> {
    /// The payload fits the buffer.
    Inline(InlineBuffer<N>),
    /// The payload did not fit.
    Heap(RawHeap),
}

impl<const N: usize> sealed::Sealed for RawSbo<N> {}

impl<const N: usize> OwningStorage for RawSbo<N> {
    fn try_new<T: Clone + 'static>(value: T) -> Result<Self, StorageError> {
        let repr = if InlineBuffer::<N>::fits::<T>() {
            // SAFETY:
            // 1. We just checked that `T` fits
            SboRepr::Inline(unsafe { InlineBuffer::new(value) })
        } else {
            SboRepr::Heap(RawHeap::try_new(value)?)
        };
        Ok(Self { repr })
    }
}

impl<const N: usize> RawStorage for RawSbo<N> {
    const KIND: PolicyKind = PolicyKind::Sbo;

    unsafe fn payload<'a>(&'a self, lifecycle: &Lifecycle) -> ErasedRef<'a> {
        match &self.repr {
            SboRepr::Inline(buffer) => {
                // SAFETY:
                // 1. The buffer holds an initialized payload (guaranteed by the invariants
                //    of this type) and `lifecycle` describes it (guaranteed by the caller)
                // 2. The buffer is borrowed for `'a`
                unsafe { ErasedRef::new(buffer.as_ptr(), lifecycle.type_id_fn()) }
            }
            // SAFETY:
            // 1. Guaranteed by the caller
            SboRepr::Heap(heap) => unsafe { heap.payload(lifecycle) },
        }
    }

    unsafe fn payload_mut<'a>(
        &'a mut self,
        lifecycle: &Lifecycle,
    ) -> Result<ErasedMut<'a>, StorageError> {
        match &mut self.repr {
            SboRepr::Inline(buffer) => {
                // SAFETY:
                // 1. The buffer holds an initialized payload (guaranteed by the invariants
                //    of this type) and `lifecycle` describes it (guaranteed by the caller)
                // 2. The buffer is borrowed mutably for `'a`, and `as_ptr` goes through
                //    `UnsafeCell::get`, which allows writes
                Ok(unsafe { ErasedMut::new(buffer.as_ptr(), lifecycle.type_id_fn()) })
            }
            // SAFETY:
            // 1. Guaranteed by the caller
            SboRepr::Heap(heap) => unsafe { heap.payload_mut(lifecycle) },
        }
    }

    unsafe fn try_clone(&self, lifecycle: &Lifecycle) -> Result<Self, StorageError> {
        let repr = match &self.repr {
            SboRepr::Inline(buffer) => {
                let copy = InlineBuffer::uninit();
                // SAFETY:
                // 1. The source buffer holds an initialized payload of the type of
                //    `lifecycle`
                // 2. The payload fitted the source buffer, so it fits the copy
                unsafe {
                    lifecycle.clone_into(buffer.as_ptr(), copy.as_ptr());
                }
                SboRepr::Inline(copy)
            }
            // SAFETY:
            // 1. Guaranteed by the caller
            SboRepr::Heap(heap) => SboRepr::Heap(unsafe { heap.try_clone(lifecycle) }?),
        };
        Ok(Self { repr })
    }

    unsafe fn destroy(self, lifecycle: &Lifecycle) {
        match self.repr {
            SboRepr::Inline(buffer) => {
                // SAFETY:
                // 1. The buffer holds an initialized payload of the type of `lifecycle`
                // 2. The buffer is consumed here
                unsafe {
                    lifecycle.drop_in_place(buffer.as_ptr());
                }
            }
            // SAFETY:
            // 1. Guaranteed by the caller
            SboRepr::Heap(heap) => unsafe { heap.destroy(lifecycle) },
        }
    }

    fn is_inline(&self) -> bool {
        matches!(self.repr, SboRepr::Inline(_))
    }
}

/// A payload in an inline buffer of `N` bytes.
///
/// Never allocates. Creating one from a payload that does not fit fails to
/// compile.
pub struct RawFixed<const N: usize> {
    /// The payload
    buffer: InlineBuffer<N>,
}

impl<const N: usize> sealed::Sealed for RawFixed<N> {}

impl<const N: usize> OwningStorage for RawFixed<N> {
    fn try_new<T: Clone + 'static>(value: T) -> Result<Self, StorageError> {
        const {
            assert!(
                InlineBuffer::<N>::fits::<T>(),
                "value does not fit the fixed inline buffer"
            );
        }
        Ok(Self {
            // SAFETY:
            // 1. Checked at compile time above
            buffer: unsafe { InlineBuffer::new(value) },
        })
    }
}

impl<const N: usize> RawStorage for RawFixed<N> {
    const KIND: PolicyKind = PolicyKind::Fixed;

    unsafe fn payload<'a>(&'a self, lifecycle: &Lifecycle) -> ErasedRef<'a> {
        // SAFETY:
        // 1. The buffer holds an initialized payload (guaranteed by the invariants of
        //    this type) and `lifecycle` describes it (guaranteed by the caller)
        // 2. The buffer is borrowed for `'a`
        unsafe { ErasedRef::new(self.buffer.as_ptr(), lifecycle.type_id_fn()) }
    }

    unsafe fn payload_mut<'a>(
        &'a mut self,
        lifecycle: &Lifecycle,
    ) -> Result<ErasedMut<'a>, StorageError> {
        // SAFETY:
        // 1. The buffer holds an initialized payload (guaranteed by the invariants of
        //    this type) and `lifecycle` describes it (guaranteed by the caller)
        // 2. The buffer is borrowed mutably for `'a`, and `as_ptr` goes through
        //    `UnsafeCell::get`, which allows writes
        Ok(unsafe { ErasedMut::new(self.buffer.as_ptr(), lifecycle.type_id_fn()) })
    }

    unsafe fn try_clone(&self, lifecycle: &Lifecycle) -> Result<Self, StorageError> {
        let buffer = InlineBuffer::uninit();
        // SAFETY:
        // 1. The source buffer holds an initialized payload of the type of
        //    `lifecycle`
        // 2. Both buffers have the same size and alignment
        unsafe {
            lifecycle.clone_into(self.buffer.as_ptr(), buffer.as_ptr());
        }
        Ok(Self { buffer })
    }

    unsafe fn destroy(self, lifecycle: &Lifecycle) {
        // SAFETY:
        // 1. The buffer holds an initialized payload of the type of `lifecycle`
        // 2. The buffer is consumed here
        unsafe {
            lifecycle.drop_in_place(self.buffer.as_ptr());
        }
    }

    fn is_inline(&self) -> bool {
        true
    }
}
