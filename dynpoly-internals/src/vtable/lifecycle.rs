//! Lifecycle table for type-erased payloads.
//!
//! This module contains the [`Lifecycle`] which enables destroying, cloning and
//! sharing a payload when its concrete type `T` has been erased. Every storage
//! policy manages its memory through these entries; the entries themselves
//! never decide where memory comes from, except for the ones that explicitly
//! allocate (`clone_to_heap` and the shared-ownership family).
//!
//! This module encapsulates the fields of [`Lifecycle`] so they cannot be
//! accessed directly. This visibility restriction guarantees the safety
//! invariant: **every function pointer in a [`Lifecycle`] was instantiated
//! with the same type `T`, and `type_id` returns the [`TypeId`] of that `T`**.
//!
//! # Safety Invariant
//!
//! This invariant is maintained because lifecycles are created as `&'static`
//! references via [`Lifecycle::new`], which pairs the function pointers with
//! a specific type `T` at compile time.

use core::{alloc::Layout, any::TypeId, fmt, mem::ManuallyDrop, ptr::NonNull};

use crate::util::Erased;

/// Table of lifecycle operations for one concrete type.
///
/// Contains function pointers for destroying and copying a payload without
/// knowing its concrete type at compile time.
///
/// # Safety Invariant
///
/// All function pointers point to the functions defined below instantiated
/// with the type `T` that was used to create this [`Lifecycle`], and `layout`
/// is `Layout::new::<T>()`.
#[derive(Clone, Copy)]
pub struct Lifecycle {
    /// Gets the [`TypeId`] of the type that was used to create this
    /// [`Lifecycle`].
    type_id: fn() -> TypeId,
    /// Gets the [`core::any::type_name`] of the type that was used to create
    /// this [`Lifecycle`].
    type_name: fn() -> &'static str,
    /// Size and alignment of the payload.
    layout: Layout,
    /// Runs the destructor of the payload in place without freeing memory.
    drop_in_place: unsafe fn(NonNull<Erased>),
    /// Clones the payload into storage that the caller already allocated.
    clone_into: unsafe fn(NonNull<Erased>, NonNull<Erased>),
    /// Clones the payload into a fresh heap block.
    clone_to_heap: unsafe fn(NonNull<Erased>) -> Option<NonNull<Erased>>,
    /// Increments the reference count of a shared payload.
    shared_retain: unsafe fn(NonNull<Erased>) -> NonNull<Erased>,
    /// Decrements the reference count of a shared payload.
    shared_release: unsafe fn(NonNull<Erased>),
    /// Gets the reference count of a shared payload.
    shared_strong_count: unsafe fn(NonNull<Erased>) -> usize,
    /// Makes a shared payload unique, cloning it if needed.
    shared_make_unique: unsafe fn(NonNull<Erased>) -> NonNull<Erased>,
}

impl Lifecycle {
    /// Creates a new [`Lifecycle`] for the type `T`.
    ///
    /// The result is a promoted static, so calling this repeatedly for the
    /// same `T` never allocates.
    pub const fn new<T: Clone + 'static>() -> &'static Self {
        const {
            &Self {
                type_id: TypeId::of::<T>,
                type_name: core::any::type_name::<T>,
                layout: Layout::new::<T>(),
                drop_in_place: drop_in_place::<T>,
                clone_into: clone_into::<T>,
                clone_to_heap: clone_to_heap::<T>,
                shared_retain: shared_retain::<T>,
                shared_release: shared_release::<T>,
                shared_strong_count: shared_strong_count::<T>,
                shared_make_unique: shared_make_unique::<T>,
            }
        }
    }

    /// Gets the [`TypeId`] of the type that was used to create this
    /// [`Lifecycle`].
    #[inline]
    pub fn type_id(&self) -> TypeId {
        (self.type_id)()
    }

    /// Gets the [`core::any::type_name`] of the type that was used to create
    /// this [`Lifecycle`].
    #[inline]
    pub fn type_name(&self) -> &'static str {
        (self.type_name)()
    }

    /// Returns a function returning the [`TypeId`] of the payload.
    #[inline]
    pub(crate) fn type_id_fn(&self) -> fn() -> TypeId {
        self.type_id
    }

    /// Gets the size and alignment of the payload.
    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Runs the destructor of the payload pointed to by `ptr`.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `ptr` points to an initialized value of the type of this
    ///    [`Lifecycle`], valid for writes.
    /// 2. The value is not used after calling this method. The memory it
    ///    occupied is still owned by the caller.
    #[inline]
    pub(crate) unsafe fn drop_in_place(&self, ptr: NonNull<Erased>) {
        // SAFETY: We know that `self.drop_in_place` points to the function
        // `drop_in_place::<T>` below. That function's safety requirements are upheld:
        // 1. Guaranteed by the caller
        // 2. Guaranteed by the caller
        unsafe {
            (self.drop_in_place)(ptr);
        }
    }

    /// Clones the payload at `src` into the uninitialized memory at `dst`.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `src` points to an initialized value of the type of this
    ///    [`Lifecycle`].
    /// 2. `dst` is valid for writes of [`Lifecycle::layout`] bytes and is
    ///    suitably aligned.
    #[inline]
    pub(crate) unsafe fn clone_into(&self, src: NonNull<Erased>, dst: NonNull<Erased>) {
        // SAFETY: We know that `self.clone_into` points to the function
        // `clone_into::<T>` below. That function's safety requirements are upheld:
        // 1. Guaranteed by the caller
        // 2. Guaranteed by the caller
        unsafe {
            (self.clone_into)(src, dst);
        }
    }

    /// Clones the payload at `src` into a fresh heap block.
    ///
    /// Returns `None` if the allocation failed. The block must later be freed
    /// with [`deallocate`](crate::storage::deallocate) using
    /// [`Lifecycle::layout`].
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `src` points to an initialized value of the type of this
    ///    [`Lifecycle`].
    #[inline]
    pub(crate) unsafe fn clone_to_heap(&self, src: NonNull<Erased>) -> Option<NonNull<Erased>> {
        // SAFETY: We know that `self.clone_to_heap` points to the function
        // `clone_to_heap::<T>` below. That function's safety requirements are upheld:
        // 1. Guaranteed by the caller
        unsafe { (self.clone_to_heap)(src) }
    }

    /// Creates another owning pointer to the shared payload at `ptr`.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `ptr` comes from a [`triomphe::Arc`] of the type of this
    ///    [`Lifecycle`] via [`triomphe::Arc::into_raw`] and is still owned.
    #[inline]
    pub(crate) unsafe fn shared_retain(&self, ptr: NonNull<Erased>) -> NonNull<Erased> {
        // SAFETY: We know that `self.shared_retain` points to the function
        // `shared_retain::<T>` below. That function's safety requirements are upheld:
        // 1. Guaranteed by the caller
        unsafe { (self.shared_retain)(ptr) }
    }

    /// Gives up one owning pointer to the shared payload at `ptr`.
    ///
    /// The payload is dropped and freed when this was the last one.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `ptr` comes from a [`triomphe::Arc`] of the type of this
    ///    [`Lifecycle`] via [`triomphe::Arc::into_raw`].
    /// 2. The caller owns this pointer and does not use it afterwards.
    #[inline]
    pub(crate) unsafe fn shared_release(&self, ptr: NonNull<Erased>) {
        // SAFETY: We know that `self.shared_release` points to the function
        // `shared_release::<T>` below. That function's safety requirements are upheld:
        // 1. Guaranteed by the caller
        // 2. Guaranteed by the caller
        unsafe {
            (self.shared_release)(ptr);
        }
    }

    /// Gets the reference count of the shared payload at `ptr`.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `ptr` comes from a [`triomphe::Arc`] of the type of this
    ///    [`Lifecycle`] via [`triomphe::Arc::into_raw`] and is still owned.
    #[inline]
    pub(crate) unsafe fn shared_strong_count(&self, ptr: NonNull<Erased>) -> usize {
        // SAFETY: We know that `self.shared_strong_count` points to the function
        // `shared_strong_count::<T>` below. That function's safety requirements are
        // upheld:
        // 1. Guaranteed by the caller
        unsafe { (self.shared_strong_count)(ptr) }
    }

    /// Makes the shared payload at `ptr` unique and returns the pointer that
    /// now owns it.
    ///
    /// If other owners exist, the payload is cloned into a new allocation and
    /// the old one is released. Otherwise `ptr` is returned unchanged. If the
    /// clone panics, `ptr` stays valid and keeps its reference.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `ptr` comes from a [`triomphe::Arc`] of the type of this
    ///    [`Lifecycle`] via [`triomphe::Arc::into_raw`].
    /// 2. The caller owns this pointer. On return, ownership moves to the
    ///    returned pointer and `ptr` must no longer be used unless the two are
    ///    equal.
    #[inline]
    pub(crate) unsafe fn shared_make_unique(&self, ptr: NonNull<Erased>) -> NonNull<Erased> {
        // SAFETY: We know that `self.shared_make_unique` points to the function
        // `shared_make_unique::<T>` below. That function's safety requirements are
        // upheld:
        // 1. Guaranteed by the caller
        // 2. Guaranteed by the caller
        unsafe { (self.shared_make_unique)(ptr) }
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("type_name", &self.type_name())
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

/// Turns an owned [`triomphe::Arc`] into an erased pointer.
pub(crate) fn into_erased<T>(arc: triomphe::Arc<T>) -> NonNull<Erased> {
    let ptr: *const T = triomphe::Arc::into_raw(arc);
    let ptr: *mut Erased = ptr.cast::<Erased>().cast_mut();
    // SAFETY: Triomphe guarantees that `Arc::into_raw` returns a non-null pointer.
    unsafe { NonNull::new_unchecked(ptr) }
}

/// Runs the destructor of the `T` pointed to by `ptr`.
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. `ptr` points to an initialized `T` valid for writes
/// 2. The value is not used after calling this function
unsafe fn drop_in_place<T>(ptr: NonNull<Erased>) {
    let ptr: NonNull<T> = ptr.cast::<T>();
    // SAFETY:
    // 1. Guaranteed by the caller
    // 2. Guaranteed by the caller
    unsafe { core::ptr::drop_in_place(ptr.as_ptr()) }
}

/// Clones the `T` at `src` into `dst`.
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. `src` points to an initialized `T`
/// 2. `dst` is valid for writes of a `T` and suitably aligned
unsafe fn clone_into<T: Clone>(src: NonNull<Erased>, dst: NonNull<Erased>) {
    // SAFETY:
    // 1. Guaranteed by the caller
    let value: &T = unsafe { src.cast::<T>().as_ref() };
    let value = value.clone();
    // SAFETY:
    // 2. Guaranteed by the caller
    unsafe { dst.cast::<T>().as_ptr().write(value) }
}

/// Clones the `T` at `src` into a fresh heap block.
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. `src` points to an initialized `T`
unsafe fn clone_to_heap<T: Clone>(src: NonNull<Erased>) -> Option<NonNull<Erased>> {
    // SAFETY:
    // 1. Guaranteed by the caller
    let value: &T = unsafe { src.cast::<T>().as_ref() };
    // Clone before allocating so a panicking clone leaks nothing
    let value = value.clone();
    let dst = crate::storage::allocate::<T>()?;
    // SAFETY: `dst` was just allocated with the layout of `T`
    unsafe { dst.as_ptr().write(value) };
    Some(dst.cast::<Erased>())
}

/// Clones the [`triomphe::Arc<T>`] pointed to by `ptr`.
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. `ptr` comes from a [`triomphe::Arc<T>`] via [`triomphe::Arc::into_raw`]
///    and is still owned
unsafe fn shared_retain<T>(ptr: NonNull<Erased>) -> NonNull<Erased> {
    let ptr: *const T = ptr.cast::<T>().as_ptr();

    // SAFETY: The pointer is valid and came from `Arc::into_raw` with the correct
    // type (guaranteed by the caller), which fulfills the requirements for
    // `ArcBorrow::from_ptr`.
    let arc_borrow = unsafe { triomphe::ArcBorrow::from_ptr(ptr) };

    into_erased(arc_borrow.clone_arc())
}

/// Drops the [`triomphe::Arc<T>`] pointed to by `ptr`.
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. `ptr` comes from a [`triomphe::Arc<T>`] via [`triomphe::Arc::into_raw`]
/// 2. The pointer is not used after calling this function
unsafe fn shared_release<T>(ptr: NonNull<Erased>) {
    let ptr: *const T = ptr.cast::<T>().as_ptr();
    // SAFETY:
    // 1. The pointer has the correct type and came from `Arc::into_raw`
    //    (guaranteed by caller)
    // 2. After `from_raw`, the pointer is consumed and not accessed again
    let arc = unsafe { triomphe::Arc::from_raw(ptr) };
    core::mem::drop(arc);
}

/// Gets the strong count of the [`triomphe::Arc<T>`] pointed to by `ptr`.
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. `ptr` comes from a [`triomphe::Arc<T>`] via [`triomphe::Arc::into_raw`]
///    and is still owned
unsafe fn shared_strong_count<T>(ptr: NonNull<Erased>) -> usize {
    let ptr: *const T = ptr.cast::<T>().as_ptr();

    // SAFETY: The pointer is valid and came from `Arc::into_raw` with the correct
    // type (guaranteed by the caller), which fulfills the requirements for
    // `ArcBorrow::from_ptr`.
    let arc_borrow = unsafe { triomphe::ArcBorrow::from_ptr(ptr) };

    triomphe::ArcBorrow::strong_count(&arc_borrow)
}

/// Makes the [`triomphe::Arc<T>`] pointed to by `ptr` unique.
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. `ptr` comes from a [`triomphe::Arc<T>`] via [`triomphe::Arc::into_raw`]
/// 2. The caller owns the pointer and hands that ownership to this function
unsafe fn shared_make_unique<T: Clone>(ptr: NonNull<Erased>) -> NonNull<Erased> {
    let ptr: *const T = ptr.cast::<T>().as_ptr();
    // SAFETY:
    // 1. The pointer has the correct type and came from `Arc::into_raw`
    //    (guaranteed by caller)
    // 2. Ownership is transferred to us by the caller
    let arc = unsafe { triomphe::Arc::from_raw(ptr) };

    // If the clone inside `make_mut` panics, the caller still owns `ptr`, so the
    // reference must not be dropped during unwinding.
    let mut arc = ManuallyDrop::new(arc);
    let _unique: &mut T = triomphe::Arc::make_mut(&mut arc);
    into_erased(ManuallyDrop::into_inner(arc))
}

#[cfg(test)]
mod tests {
    use alloc::string::String;

    use super::*;

    #[derive(Clone)]
    struct Pair {
        _left: u64,
        _right: u8,
    }

    #[test]
    fn test_lifecycle_eq() {
        // Test that lifecycles have proper static lifetime and can be safely shared
        let lifecycle1 = Lifecycle::new::<i32>();
        let lifecycle2 = Lifecycle::new::<i32>();

        // Both should be the exact same static instance
        assert!(core::ptr::eq(lifecycle1, lifecycle2));
    }

    #[test]
    fn test_lifecycle_type_info() {
        let lifecycle = Lifecycle::new::<Pair>();
        assert_eq!(lifecycle.type_id(), TypeId::of::<Pair>());
        assert!(lifecycle.type_name().ends_with("Pair"));
        assert_eq!(lifecycle.layout(), Layout::new::<Pair>());
        assert_ne!(
            Lifecycle::new::<String>().type_id(),
            Lifecycle::new::<Pair>().type_id()
        );
    }

    #[test]
    fn test_lifecycle_clone_to_heap() {
        let lifecycle = Lifecycle::new::<String>();
        let original = String::from("heap");
        let src = NonNull::from(&original).cast::<Erased>();

        // SAFETY: `src` points to a live `String`
        let copy = unsafe { lifecycle.clone_to_heap(src) }.unwrap();
        assert_ne!(copy, src);

        // SAFETY: `copy` holds a `String` that nothing else references
        let copied: &String = unsafe { copy.cast::<String>().as_ref() };
        assert_eq!(copied, "heap");

        // SAFETY: `copy` is an initialized `String` on a block of its layout
        unsafe {
            lifecycle.drop_in_place(copy);
        }
        // SAFETY: The value was dropped above and the block is not used afterwards
        unsafe {
            crate::storage::deallocate(copy, lifecycle.layout());
        }
    }

    #[test]
    fn test_lifecycle_zero_sized_clone() {
        #[derive(Clone)]
        struct Unit;

        let lifecycle = Lifecycle::new::<Unit>();
        let unit = Unit;
        let src = NonNull::from(&unit).cast::<Erased>();

        // SAFETY: `src` points to a live `Unit`
        let copy = unsafe { lifecycle.clone_to_heap(src) }.unwrap();
        // SAFETY: Zero-sized blocks are never freed for real, and the value is not
        // used afterwards
        unsafe {
            lifecycle.drop_in_place(copy);
        }
        // SAFETY: The value was dropped and the block is not used afterwards
        unsafe {
            crate::storage::deallocate(copy, lifecycle.layout());
        }
    }

    #[test]
    fn test_lifecycle_shared_make_unique() {
        let lifecycle = Lifecycle::new::<String>();
        let first = into_erased(triomphe::Arc::new(String::from("shared")));

        // SAFETY: `first` is an owned `Arc<String>` pointer
        let second = unsafe { lifecycle.shared_retain(first) };
        assert_eq!(first, second);
        // SAFETY: `first` is still owned
        assert_eq!(unsafe { lifecycle.shared_strong_count(first) }, 2);

        // SAFETY: We hand over the ownership of `second`
        let unique = unsafe { lifecycle.shared_make_unique(second) };
        assert_ne!(unique, first);
        // SAFETY: Both pointers are owned
        assert_eq!(unsafe { lifecycle.shared_strong_count(first) }, 1);
        // SAFETY: Both pointers are owned
        assert_eq!(unsafe { lifecycle.shared_strong_count(unique) }, 1);

        // Making a unique pointer unique is a no-op
        // SAFETY: We hand over the ownership of `unique`
        let same = unsafe { lifecycle.shared_make_unique(unique) };
        assert_eq!(same, unique);

        // SAFETY: The pointer is owned and not used afterwards
        unsafe {
            lifecycle.shared_release(first);
        }
        // SAFETY: The pointer is owned and not used afterwards
        unsafe {
            lifecycle.shared_release(same);
        }
    }
}
