//! Capability descriptors and the tables built from them.
//!
//! A [`Capability`] names the fixed, ordered set of operations that a
//! polymorphic handle exposes. The operations are the fields of its
//! [`Capability::Ops`] struct, so selecting one is a field access resolved at
//! compile time.
//!
//! [`Implements<T>`] is the per-type side: it supplies the one static
//! [`VTable`] that binds the operations to the concrete type `T`. A type that
//! lacks one of the operations cannot satisfy the bound, which turns a
//! capability mismatch into a compile error at the construction site.

use core::fmt;

use crate::vtable::Lifecycle;

/// Describes the operations that a polymorphic handle exposes.
///
/// Implementors are usually uninhabited marker types. The operations live in
/// [`Capability::Ops`], typically a struct of `unsafe fn` pointers taking an
/// [`ErasedRef`](crate::ErasedRef) or [`ErasedMut`](crate::ErasedMut) as
/// their first argument.
pub trait Capability: 'static {
    /// The table of domain operations, in declaration order.
    type Ops: Copy + 'static;
}

/// Provides the table of `Self`'s operations for the concrete type `T`.
///
/// # Safety
///
/// Implementors must ensure:
///
/// 1. [`Implements::VTABLE`] was created by [`VTable::new::<T>`](VTable::new)
///    with this exact `T`.
/// 2. Every operation in its [`Capability::Ops`] may only be invoked with a
///    payload pointer to a `T`, and is sound when invoked that way.
pub unsafe trait Implements<T>: Capability {
    /// The static table binding `T` to the operations of `Self`.
    ///
    /// Typically written as `&VTable::new::<T>(Ops { ... })`, which the
    /// compiler promotes to a static.
    const VTABLE: &'static VTable<Self>;
}

/// The [`Lifecycle`] of a concrete type paired with the domain operations of
/// a [`Capability`].
///
/// # Safety Invariant
///
/// The lifecycle was created for the same type that the operations were
/// written for. This is upheld by the safety contract of [`Implements`].
pub struct VTable<D: Capability + ?Sized> {
    /// Lifecycle of the concrete type.
    lifecycle: &'static Lifecycle,
    /// Domain operations of the capability.
    ops: D::Ops,
}

impl<D: Capability + ?Sized> VTable<D> {
    /// Creates a new [`VTable`] for the type `T` with the given operations.
    ///
    /// This does not allocate. The [`Lifecycle`] part is a shared static.
    #[inline]
    pub const fn new<T: Clone + 'static>(ops: D::Ops) -> Self {
        Self {
            lifecycle: Lifecycle::new::<T>(),
            ops,
        }
    }

    /// Gets the [`Lifecycle`] of the concrete type.
    #[inline]
    pub fn lifecycle(&self) -> &'static Lifecycle {
        self.lifecycle
    }

    /// Gets the domain operations.
    #[inline]
    pub fn ops(&self) -> &D::Ops {
        &self.ops
    }
}

impl<D: Capability + ?Sized> Clone for VTable<D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D: Capability + ?Sized> Copy for VTable<D> {}

impl<D: Capability + ?Sized> fmt::Debug for VTable<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VTable")
            .field("lifecycle", self.lifecycle)
            .finish_non_exhaustive()
    }
}
