//! Lifetime-bound pointers to an erased payload.
//!
//! Operation bodies stored in a [`VTable`](crate::VTable) receive one of these
//! pointers instead of a typed reference. Each operation was instantiated for
//! a single concrete type, so it knows what to downcast to; the pointer only
//! has to carry the address and the borrow.
//!
//! This module encapsulates the `ptr` field of [`ErasedRef`] and
//! [`ErasedMut`]. Both are only created inside this crate by the raw storage
//! states, which guarantees the safety invariant: **the pointer refers to an
//! initialized value of the type described by the `type_id` entry it carries,
//! for the entire lifetime `'a`**.

use core::{any::TypeId, marker::PhantomData, ptr::NonNull};

use crate::util::Erased;

/// A shared, lifetime-bound pointer to an erased payload.
///
/// Behaves like a `&'a T` for some `T` that is not known statically.
#[derive(Clone, Copy)]
pub struct ErasedRef<'a> {
    /// Pointer to the payload
    ///
    /// # Safety
    ///
    /// The following safety invariants are guaranteed to be upheld as long as
    /// this struct exists:
    ///
    /// 1. The pointee is an initialized value whose [`TypeId`] is returned by
    ///    `type_id`.
    /// 2. The pointee is valid for shared access for the lifetime `'a`.
    ptr: NonNull<Erased>,
    /// Returns the [`TypeId`] of the pointee
    type_id: fn() -> TypeId,
    /// Marker to tell the compiler that we should
    /// behave the same as a `&'a Erased`
    _marker: PhantomData<&'a Erased>,
}

impl<'a> ErasedRef<'a> {
    /// Creates a new [`ErasedRef`].
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `ptr` points to an initialized value whose [`TypeId`] is returned by
    ///    `type_id`.
    /// 2. The value is valid for shared access for the lifetime `'a`.
    #[inline]
    pub(crate) unsafe fn new(ptr: NonNull<Erased>, type_id: fn() -> TypeId) -> Self {
        Self {
            // SAFETY:
            // 1. Guaranteed by the caller
            // 2. Guaranteed by the caller
            ptr,
            type_id,
            _marker: PhantomData,
        }
    }

    /// Returns the [`TypeId`] of the payload.
    #[inline]
    pub fn type_id(self) -> TypeId {
        (self.type_id)()
    }

    /// Returns the address of the payload.
    #[inline]
    pub fn as_ptr(self) -> *const () {
        self.ptr.as_ptr().cast::<()>().cast_const()
    }

    /// Accesses the payload as a reference to `T`, checking the type.
    #[inline]
    pub fn downcast<T: 'static>(self) -> Option<&'a T> {
        if self.type_id() == TypeId::of::<T>() {
            // SAFETY:
            // 1. We just checked that the payload has type `T`
            Some(unsafe { self.downcast_unchecked::<T>() })
        } else {
            None
        }
    }

    /// Accesses the payload as a reference to `T`.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. The type `T` matches the actual type of the payload.
    #[inline]
    pub unsafe fn downcast_unchecked<T: 'static>(self) -> &'a T {
        // Debug assertion to catch type mismatches in case of bugs
        debug_assert_eq!(self.type_id(), TypeId::of::<T>());

        let this = self.ptr.cast::<T>();
        // SAFETY: Converting the NonNull pointer to a reference is sound because:
        // - The pointer is non-null, properly aligned, and dereferenceable (guaranteed
        //   by the invariants of this type)
        // - The pointee is an initialized `T` (guaranteed by the caller)
        // - Shared access is allowed for `'a` (guaranteed by the invariants of this
        //   type)
        unsafe { this.as_ref() }
    }
}

/// A unique, lifetime-bound pointer to an erased payload.
///
/// Behaves like a `&'a mut T` for some `T` that is not known statically.
pub struct ErasedMut<'a> {
    /// Pointer to the payload
    ///
    /// # Safety
    ///
    /// The following safety invariants are guaranteed to be upheld as long as
    /// this struct exists:
    ///
    /// 1. The pointee is an initialized value whose [`TypeId`] is returned by
    ///    `type_id`.
    /// 2. The pointee is valid for exclusive access for the lifetime `'a`.
    ptr: NonNull<Erased>,
    /// Returns the [`TypeId`] of the pointee
    type_id: fn() -> TypeId,
    /// Marker to tell the compiler that we should
    /// behave the same as a `&'a mut Erased`
    _marker: PhantomData<&'a mut Erased>,
}

impl<'a> ErasedMut<'a> {
    /// Creates a new [`ErasedMut`].
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `ptr` points to an initialized value whose [`TypeId`] is returned by
    ///    `type_id`.
    /// 2. The value is valid for exclusive access for the lifetime `'a`, and
    ///    `ptr` was derived from a pointer that allows writes.
    #[inline]
    pub(crate) unsafe fn new(ptr: NonNull<Erased>, type_id: fn() -> TypeId) -> Self {
        Self {
            // SAFETY:
            // 1. Guaranteed by the caller
            // 2. Guaranteed by the caller
            ptr,
            type_id,
            _marker: PhantomData,
        }
    }

    /// Returns the [`TypeId`] of the payload.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        (self.type_id)()
    }

    /// Returns the address of the payload.
    #[inline]
    pub fn as_ptr(&self) -> *const () {
        self.ptr.as_ptr().cast::<()>().cast_const()
    }

    /// Reborrows the pointer with a shorter lifetime.
    #[inline]
    pub fn reborrow<'b>(&'b mut self) -> ErasedMut<'b> {
        ErasedMut {
            // SAFETY:
            // 1. Guaranteed by the invariants of `self`
            // 2. Upheld by the mutable borrow of `self`
            ptr: self.ptr,
            type_id: self.type_id,
            _marker: PhantomData,
        }
    }

    /// Returns a shared pointer to the same payload.
    #[inline]
    pub fn as_ref(&self) -> ErasedRef<'_> {
        // SAFETY:
        // 1. Guaranteed by the invariants of `self`
        // 2. Exclusive access for `'a` implies shared access for the borrow of `self`
        unsafe { ErasedRef::new(self.ptr, self.type_id) }
    }

    /// Consumes the mutable pointer and returns a shared one with the same
    /// lifetime.
    #[inline]
    pub fn into_ref(self) -> ErasedRef<'a> {
        // SAFETY:
        // 1. Guaranteed by the invariants of `self`
        // 2. Exclusive access for `'a` implies shared access for `'a`
        unsafe { ErasedRef::new(self.ptr, self.type_id) }
    }

    /// Accesses the payload as a mutable reference to `T`, checking the type.
    #[inline]
    pub fn downcast<T: 'static>(self) -> Option<&'a mut T> {
        if self.type_id() == TypeId::of::<T>() {
            // SAFETY:
            // 1. We just checked that the payload has type `T`
            Some(unsafe { self.downcast_unchecked::<T>() })
        } else {
            None
        }
    }

    /// Accesses the payload as a mutable reference to `T`.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. The type `T` matches the actual type of the payload.
    #[inline]
    pub unsafe fn downcast_unchecked<T: 'static>(self) -> &'a mut T {
        // Debug assertion to catch type mismatches in case of bugs
        debug_assert_eq!(self.type_id(), TypeId::of::<T>());

        let mut this = self.ptr.cast::<T>();
        // SAFETY: Converting the NonNull pointer to a mutable reference is sound
        // because:
        // - The pointer is non-null, properly aligned, and dereferenceable (guaranteed
        //   by the invariants of this type)
        // - The pointee is an initialized `T` (guaranteed by the caller)
        // - Exclusive access is allowed for `'a` (guaranteed by the invariants of this
        //   type)
        unsafe { this.as_mut() }
    }
}
