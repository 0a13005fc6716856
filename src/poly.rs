//! The polymorphic handle.
//!
//! A [`Poly<D, S, F, T>`] is bound to one value of some concrete type and
//! exposes the operations of the capability `D` on it. The concrete type is
//! forgotten after construction: every handle of the same `Poly` type has the
//! same size and can sit in the same `Vec`, whatever it holds.
//!
//! # Lifecycle
//!
//! A handle is **bound** from construction until [`Poly::destroy`] is called
//! or the handle is dropped. After `destroy` the handle is **destroyed**:
//! every fallible operation reports [`PolyError::UseAfterDestroy`], `destroy`
//! itself does nothing, and dropping it releases nothing.
//!
//! # Dispatch
//!
//! Capability authors expose their operations through extension traits built
//! on [`Poly::call`] and [`Poly::call_mut`]:
//!
//! ```
//! use dynpoly::{Capability, ErasedMut, ErasedRef, Implements, Poly, PolyError, VTable};
//!
//! enum Counter {}
//!
//! #[derive(Clone, Copy)]
//! struct CounterOps {
//!     get: unsafe fn(ErasedRef<'_>) -> u32,
//!     bump: unsafe fn(ErasedMut<'_>),
//! }
//!
//! impl Capability for Counter {
//!     type Ops = CounterOps;
//! }
//!
//! unsafe fn get<T: Into<u32> + Copy + 'static>(this: ErasedRef<'_>) -> u32 {
//!     // SAFETY: The table for `T` is only used with `T` payloads
//!     (*unsafe { this.downcast_unchecked::<T>() }).into()
//! }
//!
//! unsafe fn bump<T: From<u8> + core::ops::AddAssign + 'static>(this: ErasedMut<'_>) {
//!     // SAFETY: The table for `T` is only used with `T` payloads
//!     *unsafe { this.downcast_unchecked::<T>() } += T::from(1);
//! }
//!
//! // SAFETY: Both operations downcast to `T`
//! unsafe impl<T> Implements<T> for Counter
//! where
//!     T: Into<u32> + From<u8> + core::ops::AddAssign + Copy + 'static,
//! {
//!     const VTABLE: &'static VTable<Self> = &VTable::new::<T>(CounterOps {
//!         get: get::<T>,
//!         bump: bump::<T>,
//!     });
//! }
//!
//! let mut small: Poly<Counter> = Poly::new(7_u8);
//! let large: Poly<Counter> = Poly::new(70_000_u32);
//!
//! // SAFETY: `call` hands out the operations and payload of the same handle
//! small.call_mut(|ops, this| unsafe { (ops.bump)(this) })?;
//! assert_eq!(small.call(|ops, this| unsafe { (ops.get)(this) })?, 8);
//! assert_eq!(large.call(|ops, this| unsafe { (ops.get)(this) })?, 70_000);
//! # Ok::<(), PolyError>(())
//! ```

use core::{any::TypeId, fmt, marker::PhantomData};

use alloc::alloc::handle_alloc_error;
use dynpoly_internals::{
    Capability, ErasedMut, ErasedRef, Implements, Lifecycle, OwningStorage, PolicyKind,
    RawBorrowed, RawBorrowedMut, RawStorage, StorageError, VTable,
};

use crate::{
    error::PolyError,
    flavor::{Flavor, Remote},
    markers::{Local, ObjectMarkerFor, SendSync},
    storage::{Borrowed, BorrowedMut, CopyableStorage, Heap, OwningPolicy, StoragePolicy},
};

/// A handle to a value of an erased type, exposing the operations of `D`.
///
/// - `D`: the [`Capability`] whose operations the handle dispatches
/// - `S`: the [storage policy](crate::storage), [`Heap`] by default
/// - `F`: the [vtable flavor](crate::flavor), [`Remote`] by default
/// - `T`: the [thread-safety marker](crate::markers), [`Local`] by default
///
/// See the [module documentation](self) for the lifecycle and an example.
pub struct Poly<D, S = Heap, F = Remote, T = Local>
where
    D: Capability,
    S: StoragePolicy,
    F: Flavor,
{
    /// Table of the bound type
    ///
    /// # Safety
    ///
    /// The following safety invariants are guaranteed to be upheld as long as
    /// this struct exists:
    ///
    /// 1. The table was packed from `<D as Implements<V>>::VTABLE`, where `V`
    ///    is the type of the payload in `storage`.
    table: F::Table<D>,
    /// The payload, or `None` once destroyed
    storage: Option<S::Raw>,
    /// Marker for the thread-safety parameter
    _marker: PhantomData<T>,
}

/// Looks up the table of `V`, checking that it really was built for `V`.
fn table_for<D, V>() -> Result<&'static VTable<D>, PolyError>
where
    D: Implements<V>,
    V: 'static,
{
    let vtable = <D as Implements<V>>::VTABLE;
    let lifecycle = vtable.lifecycle();
    if lifecycle.type_id() == TypeId::of::<V>() {
        Ok(vtable)
    } else {
        Err(PolyError::CapabilityMismatch {
            expected: core::any::type_name::<V>(),
            found: lifecycle.type_name(),
        })
    }
}

/// Panics with the given error.
#[cold]
#[track_caller]
pub(crate) fn fail(err: PolyError) -> ! {
    panic!("{err}")
}

impl<D, S, F, T> Poly<D, S, F, T>
where
    D: Capability,
    S: OwningPolicy,
    F: Flavor,
{
    /// Moves `value` into a new handle.
    ///
    /// # Panics
    ///
    /// Panics if the [`Implements`] table for `V` was built for another type.
    /// Aborts through [`handle_alloc_error`] if the allocation fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use dynpoly::{Poly, function::Callable, storage::Sbo};
    ///
    /// let handle: Poly<Callable<u8, u8>, Sbo> = Poly::new(|x: u8| x + 1);
    /// assert!(handle.is_inline());
    /// ```
    #[track_caller]
    pub fn new<V>(value: V) -> Self
    where
        D: Implements<V>,
        V: ObjectMarkerFor<T> + Clone,
    {
        let vtable = table_for::<D, V>().unwrap_or_else(|err| fail(err));
        match S::Raw::try_new(value) {
            Ok(raw) => Self::bind(vtable, raw),
            Err(StorageError::OutOfMemory { layout }) => handle_alloc_error(layout),
            Err(err) => fail(err.into()),
        }
    }

    /// Moves `value` into a new handle, reporting failures instead of
    /// panicking.
    ///
    /// On failure `value` is dropped and nothing is leaked.
    ///
    /// # Errors
    ///
    /// - [`PolyError::CapabilityMismatch`] if the [`Implements`] table for `V`
    ///   was built for another type. Nothing is allocated in that case.
    /// - [`PolyError::OutOfMemory`] if the allocation fails.
    pub fn try_new<V>(value: V) -> Result<Self, PolyError>
    where
        D: Implements<V>,
        V: ObjectMarkerFor<T> + Clone,
    {
        let vtable = table_for::<D, V>()?;
        let raw = S::Raw::try_new(value)?;
        Ok(Self::bind(vtable, raw))
    }

    /// Wraps a freshly created owning state.
    fn bind(vtable: &'static VTable<D>, raw: S::Raw) -> Self {
        if <S::Raw as RawStorage>::KIND == PolicyKind::Sbo && !raw.is_inline() {
            tracing::trace!(
                type_name = vtable.lifecycle().type_name(),
                size = vtable.lifecycle().layout().size(),
                "payload does not fit inline, falling back to the heap"
            );
        }
        Self {
            // SAFETY:
            // 1. `raw` was created from a value of the type `vtable` was checked for
            table: F::pack(vtable),
            storage: Some(raw),
            _marker: PhantomData,
        }
    }
}

impl<'a, D, F, T> Poly<D, Borrowed<'a>, F, T>
where
    D: Capability,
    F: Flavor,
{
    /// Creates a handle that refers to `value` without owning it.
    ///
    /// The handle never allocates, copies or drops `value`. Copies of the
    /// handle refer to the same value. Mutating operations fail with
    /// [`PolyError::InvalidOperationForPolicy`].
    ///
    /// # Panics
    ///
    /// Panics if the [`Implements`] table for `V` was built for another type.
    #[track_caller]
    pub fn from_ref<V>(value: &'a V) -> Self
    where
        D: Implements<V>,
        V: ObjectMarkerFor<T>,
    {
        let vtable = table_for::<D, V>().unwrap_or_else(|err| fail(err));
        Self {
            // SAFETY:
            // 1. The state refers to a `V`, and the table was checked for `V`
            table: F::pack(vtable),
            storage: Some(RawBorrowed::new(value)),
            _marker: PhantomData,
        }
    }
}

impl<'a, D, F, T> Poly<D, BorrowedMut<'a>, F, T>
where
    D: Capability,
    F: Flavor,
{
    /// Creates a handle that refers to `value` mutably without owning it.
    ///
    /// The handle never allocates or drops `value`, and cannot be copied.
    ///
    /// # Panics
    ///
    /// Panics if the [`Implements`] table for `V` was built for another type.
    #[track_caller]
    pub fn from_mut<V>(value: &'a mut V) -> Self
    where
        D: Implements<V>,
        V: ObjectMarkerFor<T>,
    {
        let vtable = table_for::<D, V>().unwrap_or_else(|err| fail(err));
        Self {
            // SAFETY:
            // 1. The state refers to a `V`, and the table was checked for `V`
            table: F::pack(vtable),
            storage: Some(RawBorrowedMut::new(value)),
            _marker: PhantomData,
        }
    }
}

impl<D, S, F, T> Poly<D, S, F, T>
where
    D: Capability,
    S: StoragePolicy,
    F: Flavor,
{
    /// Gets the lifecycle of the bound type.
    #[inline]
    fn lifecycle(&self) -> &Lifecycle {
        F::lifecycle(&self.table)
    }

    /// Runs a shared operation on the payload.
    ///
    /// `f` receives the operations of `D` and a pointer to the payload. Both
    /// belong to the same concrete type, so passing the pointer to any of the
    /// operations satisfies their safety contract.
    ///
    /// # Errors
    ///
    /// - [`PolyError::UseAfterDestroy`] if the handle was destroyed.
    #[inline]
    pub fn call<R>(&self, f: impl FnOnce(&D::Ops, ErasedRef<'_>) -> R) -> Result<R, PolyError> {
        let storage = self.storage.as_ref().ok_or(PolyError::UseAfterDestroy)?;
        // SAFETY:
        // 1. The table belongs to the payload (guaranteed by the invariants of `Poly`)
        let payload = unsafe { storage.payload(F::lifecycle(&self.table)) };
        Ok(f(F::ops(&self.table), payload))
    }

    /// Runs a mutating operation on the payload.
    ///
    /// Shared storage is detached first, so other handles never observe the
    /// change. The pointer `f` receives belongs to the same concrete type as
    /// the operations.
    ///
    /// # Errors
    ///
    /// - [`PolyError::UseAfterDestroy`] if the handle was destroyed.
    /// - [`PolyError::InvalidOperationForPolicy`] for [`Borrowed`] handles.
    #[inline]
    pub fn call_mut<R>(
        &mut self,
        f: impl FnOnce(&D::Ops, ErasedMut<'_>) -> R,
    ) -> Result<R, PolyError> {
        let storage = self.storage.as_mut().ok_or(PolyError::UseAfterDestroy)?;
        let lifecycle = F::lifecycle(&self.table);
        // SAFETY:
        // 1. The table belongs to the payload (guaranteed by the invariants of `Poly`)
        if let Some(count @ 2..) = unsafe { storage.strong_count(lifecycle) } {
            tracing::trace!(
                type_name = lifecycle.type_name(),
                strong_count = count,
                "detaching shared payload before mutation"
            );
        }
        // SAFETY:
        // 1. The table belongs to the payload (guaranteed by the invariants of `Poly`)
        let payload = unsafe { storage.payload_mut(lifecycle) }?;
        Ok(f(F::ops(&self.table), payload))
    }

    /// Releases the payload.
    ///
    /// Owning policies run the payload's destructor and free its memory.
    /// Borrowing policies leave the referent alone. Calling this on a
    /// destroyed handle does nothing.
    pub fn destroy(&mut self) {
        if let Some(storage) = self.storage.take() {
            let lifecycle = F::lifecycle(&self.table);
            let policy = <S::Raw as RawStorage>::KIND;
            tracing::trace!(
                type_name = lifecycle.type_name(),
                policy = %policy,
                "destroying payload"
            );
            // SAFETY:
            // 1. The table belongs to the payload (guaranteed by the invariants of `Poly`)
            unsafe { storage.destroy(lifecycle) }
        }
    }

    /// Creates a second handle holding a copy of the payload.
    ///
    /// What a copy is depends on the storage policy: owning policies clone the
    /// value, [`Borrowed`] copies the reference and
    /// [`SharedCow`](crate::storage::SharedCow) shares the allocation. A copy
    /// of a [`Fixed`](crate::storage::Fixed) or inline [`Sbo`](crate::storage::Sbo)
    /// handle never allocates.
    ///
    /// # Errors
    ///
    /// - [`PolyError::UseAfterDestroy`] if the handle was destroyed.
    /// - [`PolyError::NotCopyable`] for [`BorrowedMut`] handles.
    /// - [`PolyError::OutOfMemory`] if the allocation fails.
    pub fn try_clone(&self) -> Result<Self, PolyError> {
        let storage = self.storage.as_ref().ok_or(PolyError::UseAfterDestroy)?;
        let copy = self.clone_storage(storage)?;
        Ok(Self {
            // SAFETY:
            // 1. The copy holds a payload of the same type as `self`
            table: self.table,
            storage: Some(copy),
            _marker: PhantomData,
        })
    }

    /// Copies the storage state of this handle.
    fn clone_storage(&self, storage: &S::Raw) -> Result<S::Raw, StorageError> {
        let lifecycle = self.lifecycle();
        let policy = <S::Raw as RawStorage>::KIND;
        tracing::trace!(
            type_name = lifecycle.type_name(),
            policy = %policy,
            "copying payload"
        );
        // SAFETY:
        // 1. The table belongs to the payload (guaranteed by the invariants of `Poly`)
        unsafe { storage.try_clone(lifecycle) }
    }

    /// Returns `true` once the handle has been destroyed.
    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.storage.is_none()
    }

    /// Returns the [`TypeId`] of the bound type.
    ///
    /// This stays available after the handle is destroyed.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.lifecycle().type_id()
    }

    /// Returns the [`core::any::type_name`] of the bound type.
    ///
    /// This stays available after the handle is destroyed.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.lifecycle().type_name()
    }

    /// Returns the storage policy of the handle.
    #[inline]
    pub fn policy(&self) -> PolicyKind {
        <S::Raw as RawStorage>::KIND
    }

    /// Returns `true` if the payload lives inside the handle itself.
    ///
    /// This is `false` for destroyed handles.
    #[inline]
    pub fn is_inline(&self) -> bool {
        self.storage.as_ref().is_some_and(RawStorage::is_inline)
    }

    /// Returns the number of handles sharing the payload.
    ///
    /// This is `None` for policies that do not count owners, and for
    /// destroyed handles.
    #[inline]
    pub fn strong_count(&self) -> Option<usize> {
        let storage = self.storage.as_ref()?;
        // SAFETY:
        // 1. The table belongs to the payload (guaranteed by the invariants of `Poly`)
        unsafe { storage.strong_count(self.lifecycle()) }
    }

    /// Returns the address of the payload.
    ///
    /// Two handles report the same address exactly when they share one
    /// payload.
    ///
    /// # Errors
    ///
    /// - [`PolyError::UseAfterDestroy`] if the handle was destroyed.
    #[inline]
    pub fn payload_addr(&self) -> Result<*const (), PolyError> {
        self.call(|_, this| this.as_ptr())
    }

    /// Accesses the payload as a `V`.
    ///
    /// # Errors
    ///
    /// - [`PolyError::UseAfterDestroy`] if the handle was destroyed.
    /// - [`PolyError::CapabilityMismatch`] if the handle is bound to another
    ///   type.
    pub fn downcast_ref<V: 'static>(&self) -> Result<&V, PolyError> {
        let storage = self.storage.as_ref().ok_or(PolyError::UseAfterDestroy)?;
        let lifecycle = self.lifecycle();
        // SAFETY:
        // 1. The table belongs to the payload (guaranteed by the invariants of `Poly`)
        let payload = unsafe { storage.payload(lifecycle) };
        payload
            .downcast::<V>()
            .ok_or_else(|| PolyError::CapabilityMismatch {
                expected: core::any::type_name::<V>(),
                found: lifecycle.type_name(),
            })
    }

    /// Accesses the payload mutably as a `V`.
    ///
    /// Shared storage is detached first, as with [`Poly::call_mut`].
    ///
    /// # Errors
    ///
    /// - [`PolyError::UseAfterDestroy`] if the handle was destroyed.
    /// - [`PolyError::CapabilityMismatch`] if the handle is bound to another
    ///   type. Shared storage is left attached in that case.
    /// - [`PolyError::InvalidOperationForPolicy`] for [`Borrowed`] handles.
    pub fn downcast_mut<V: 'static>(&mut self) -> Result<&mut V, PolyError> {
        let storage = self.storage.as_mut().ok_or(PolyError::UseAfterDestroy)?;
        let lifecycle = F::lifecycle(&self.table);
        let mismatch = PolyError::CapabilityMismatch {
            expected: core::any::type_name::<V>(),
            found: lifecycle.type_name(),
        };
        if lifecycle.type_id() != TypeId::of::<V>() {
            return Err(mismatch);
        }
        // SAFETY:
        // 1. The table belongs to the payload (guaranteed by the invariants of `Poly`)
        let payload = unsafe { storage.payload_mut(lifecycle) }?;
        payload.downcast::<V>().ok_or(mismatch)
    }
}

impl<D, S, F, T> Clone for Poly<D, S, F, T>
where
    D: Capability,
    S: CopyableStorage,
    F: Flavor,
{
    /// Copies the handle as [`Poly::try_clone`] does.
    ///
    /// A copy of a destroyed handle is destroyed too.
    ///
    /// Aborts through [`handle_alloc_error`] if the allocation fails.
    fn clone(&self) -> Self {
        let storage = self.storage.as_ref().map(|storage| {
            match self.clone_storage(storage) {
                Ok(copy) => copy,
                Err(StorageError::OutOfMemory { layout }) => handle_alloc_error(layout),
                Err(err) => fail(err.into()),
            }
        });
        Self {
            // SAFETY:
            // 1. The copy holds a payload of the same type as `self`
            table: self.table,
            storage,
            _marker: PhantomData,
        }
    }
}

impl<D, S, F, T> Drop for Poly<D, S, F, T>
where
    D: Capability,
    S: StoragePolicy,
    F: Flavor,
{
    fn drop(&mut self) {
        self.destroy();
    }
}

impl<D, S, F, T> fmt::Debug for Poly<D, S, F, T>
where
    D: Capability,
    S: StoragePolicy,
    F: Flavor,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Poly")
            .field("type_name", &self.type_name())
            .field("policy", &self.policy())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

// SAFETY: `SendSync` handles are only bound to payloads that are `Send + Sync`
// (enforced by `ObjectMarkerFor<SendSync>` at construction). Shared payloads
// use an atomic reference count. The tables only contain `Send + Sync` data.
unsafe impl<D, S, F> Send for Poly<D, S, F, SendSync>
where
    D: Capability<Ops: Send + Sync>,
    S: StoragePolicy,
    F: Flavor,
{
}

// SAFETY: Shared access to a `SendSync` handle only hands out shared access to
// the payload, which is `Sync`. Copying a shared payload only touches the
// atomic reference count.
unsafe impl<D, S, F> Sync for Poly<D, S, F, SendSync>
where
    D: Capability<Ops: Send + Sync>,
    S: StoragePolicy,
    F: Flavor,
{
}
