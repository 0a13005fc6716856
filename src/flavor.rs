//! Where a handle keeps its vtable.
//!
//! The third type parameter of [`Poly<D, S, F, T>`](crate::Poly) selects the
//! layout of the table. All flavors dispatch to the same operations and behave
//! identically; they only trade handle size against indirections per call.
//!
//! | flavor | handle holds | per call |
//! |---|---|---|
//! | [`Remote`] | `&'static VTable<D>` | one extra load |
//! | [`Local`] | the lifecycle and the operations by value | none |
//! | [`Joined`] | the operations by value, `&'static` lifecycle | none for operations |

use core::fmt;

use dynpoly_internals::{Capability, Lifecycle, VTable};

mod sealed {
    pub trait Sealed: 'static {}

    impl Sealed for super::Remote {}
    impl Sealed for super::Local {}
    impl Sealed for super::Joined {}
}

/// Selects how a handle stores its vtable.
///
/// This trait is sealed. Use [`Remote`], [`Local`] or [`Joined`].
pub trait Flavor: sealed::Sealed {
    /// The table as stored inside the handle.
    type Table<D: Capability>: Copy;

    /// Builds the stored table from the static one.
    fn pack<D: Capability>(vtable: &'static VTable<D>) -> Self::Table<D>;

    /// Gets the domain operations.
    fn ops<D: Capability>(table: &Self::Table<D>) -> &D::Ops;

    /// Gets the lifecycle of the bound type.
    fn lifecycle<D: Capability>(table: &Self::Table<D>) -> &Lifecycle;
}

/// The handle points at the shared static table.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash)]
pub struct Remote;

/// The handle carries a full copy of the table.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash)]
pub struct Local;

/// The handle carries the operations, and points at the shared lifecycle.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash)]
pub struct Joined;

/// A full copy of a [`VTable`], stored by [`Local`] handles.
pub struct LocalTable<D: Capability> {
    /// Copy of the lifecycle entries
    lifecycle: Lifecycle,
    /// Copy of the domain operations
    ops: D::Ops,
}

impl<D: Capability> Clone for LocalTable<D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D: Capability> Copy for LocalTable<D> {}

impl<D: Capability> fmt::Debug for LocalTable<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTable")
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

impl Flavor for Remote {
    type Table<D: Capability> = &'static VTable<D>;

    #[inline]
    fn pack<D: Capability>(vtable: &'static VTable<D>) -> Self::Table<D> {
        vtable
    }

    #[inline]
    fn ops<D: Capability>(table: &Self::Table<D>) -> &D::Ops {
        table.ops()
    }

    #[inline]
    fn lifecycle<D: Capability>(table: &Self::Table<D>) -> &Lifecycle {
        table.lifecycle()
    }
}

impl Flavor for Local {
    type Table<D: Capability> = LocalTable<D>;

    #[inline]
    fn pack<D: Capability>(vtable: &'static VTable<D>) -> Self::Table<D> {
        LocalTable {
            lifecycle: *vtable.lifecycle(),
            ops: *vtable.ops(),
        }
    }

    #[inline]
    fn ops<D: Capability>(table: &Self::Table<D>) -> &D::Ops {
        &table.ops
    }

    #[inline]
    fn lifecycle<D: Capability>(table: &Self::Table<D>) -> &Lifecycle {
        &table.lifecycle
    }
}

impl Flavor for Joined {
    type Table<D: Capability> = VTable<D>;

    #[inline]
    fn pack<D: Capability>(vtable: &'static VTable<D>) -> Self::Table<D> {
        *vtable
    }

    #[inline]
    fn ops<D: Capability>(table: &Self::Table<D>) -> &D::Ops {
        table.ops()
    }

    #[inline]
    fn lifecycle<D: Capability>(table: &Self::Table<D>) -> &Lifecycle {
        table.lifecycle()
    }
}
