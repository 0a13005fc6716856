//! Type-erased callables.
//!
//! [`Callable<A, R>`] is a ready-made [`Capability`] with a single operation:
//! call the payload with an `A` and get an `R` back. Any
//! `Fn(A) -> R + Clone + 'static` implements it. Combined with the storage
//! policies it gives the usual family of function wrappers:
//!
//! | alias | storage |
//! |---|---|
//! | [`Function<A, R>`] | [`Sbo`] with the default inline size |
//! | [`FunctionView<'a, A, R>`] | [`Borrowed<'a>`] |
//! | [`InplaceFunction<A, R, N>`] | [`Fixed<N>`] |
//! | [`SharedFunction<A, R>`] | [`SharedCow`] |
//!
//! Functions with several arguments take them as a tuple.
//!
//! # Examples
//!
//! ```
//! use dynpoly::function::{Function, FunctionView, InplaceFunction};
//!
//! let offset = 10;
//! let add: Function<i32, i32> = Function::from_fn(move |x| x + offset);
//! assert_eq!(add.invoke(5), 15);
//!
//! let add_pair = |(a, b): (i32, i32)| a + b;
//! let view: FunctionView<'_, (i32, i32), i32> = FunctionView::from_ref(&add_pair);
//! assert_eq!(view.invoke((2, 3)), 5);
//!
//! let fixed: InplaceFunction<(), &str> = InplaceFunction::from_fn(|()| "inline");
//! assert!(fixed.is_inline());
//! ```

use core::{fmt, marker::PhantomData};

use dynpoly_internals::{Capability, ErasedRef, Implements, VTable};

use crate::{
    error::PolyError,
    flavor::{Flavor, Remote},
    markers::{Local, ObjectMarkerFor},
    poly::{Poly, fail},
    storage::{Borrowed, DEFAULT_SBO_SIZE, Fixed, OwningPolicy, Sbo, SharedCow, StoragePolicy},
};

/// Capability of values that can be called with an `A`, returning an `R`.
///
/// This type is never instantiated. It only names the capability.
pub struct Callable<A, R> {
    /// Ties the argument and result types to the capability
    _marker: PhantomData<fn(A) -> R>,
}

/// The operations of [`Callable<A, R>`].
pub struct CallableOps<A, R> {
    /// Calls the payload.
    pub(crate) call: unsafe fn(ErasedRef<'_>, A) -> R,
}

impl<A, R> Clone for CallableOps<A, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A, R> Copy for CallableOps<A, R> {}

impl<A, R> fmt::Debug for CallableOps<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallableOps").finish_non_exhaustive()
    }
}

impl<A: 'static, R: 'static> Capability for Callable<A, R> {
    type Ops = CallableOps<A, R>;
}

/// Calls the `G` behind `this`.
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. `this` points to a `G`.
unsafe fn call<A, R, G>(this: ErasedRef<'_>, arg: A) -> R
where
    G: Fn(A) -> R + 'static,
{
    // SAFETY:
    // 1. Guaranteed by the caller
    let this = unsafe { this.downcast_unchecked::<G>() };
    this(arg)
}

// SAFETY: The table is built for `G` and `call::<A, R, G>` downcasts to `G`
unsafe impl<A, R, G> Implements<G> for Callable<A, R>
where
    A: 'static,
    R: 'static,
    G: Fn(A) -> R + Clone + 'static,
{
    const VTABLE: &'static VTable<Self> = &VTable::new::<G>(CallableOps {
        call: call::<A, R, G>,
    });
}

/// An owned callable, stored inline when it is small enough.
pub type Function<A, R, T = Local> = Poly<Callable<A, R>, Sbo<DEFAULT_SBO_SIZE>, Remote, T>;

/// A callable borrowed for `'a`.
pub type FunctionView<'a, A, R, T = Local> = Poly<Callable<A, R>, Borrowed<'a>, Remote, T>;

/// An owned callable that always lives inside the handle.
pub type InplaceFunction<A, R, const N: usize = 32, T = Local> =
    Poly<Callable<A, R>, Fixed<N>, Remote, T>;

/// A callable shared between copies of the handle.
pub type SharedFunction<A, R, T = Local> = Poly<Callable<A, R>, SharedCow, Remote, T>;

impl<A, R, S, F, T> Poly<Callable<A, R>, S, F, T>
where
    A: 'static,
    R: 'static,
    S: OwningPolicy,
    F: Flavor,
{
    /// Moves the callable `f` into a new handle.
    ///
    /// Same as [`Poly::new`], but lets the compiler infer the argument types of
    /// a closure.
    #[track_caller]
    pub fn from_fn<G>(f: G) -> Self
    where
        G: Fn(A) -> R + Clone + ObjectMarkerFor<T>,
    {
        Self::new(f)
    }
}

impl<A, R, S, F, T> Poly<Callable<A, R>, S, F, T>
where
    A: 'static,
    R: 'static,
    S: StoragePolicy,
    F: Flavor,
{
    /// Calls the payload with `arg`.
    ///
    /// # Errors
    ///
    /// - [`PolyError::UseAfterDestroy`] if the handle was destroyed.
    #[inline]
    pub fn try_invoke(&self, arg: A) -> Result<R, PolyError> {
        self.call(|ops, this| {
            // SAFETY:
            // 1. `call` hands out the payload that belongs to `ops`
            unsafe { (ops.call)(this, arg) }
        })
    }

    /// Calls the payload with `arg`.
    ///
    /// # Panics
    ///
    /// Panics if the handle was destroyed.
    #[inline]
    #[track_caller]
    pub fn invoke(&self, arg: A) -> R {
        self.try_invoke(arg).unwrap_or_else(|err| fail(err))
    }
}
