//! Storage policy selectors.
//!
//! The second type parameter of [`Poly<D, S, F, T>`](crate::Poly) decides
//! where the payload lives and what copying a handle means:
//!
//! | selector | allocation | copy | mutation |
//! |---|---|---|---|
//! | [`Heap`] | always one block | deep | yes |
//! | [`Sbo<N>`] | none if the payload fits `N` bytes, else one block | deep | yes |
//! | [`Fixed<N>`] | never (oversized payloads fail to compile) | deep | yes |
//! | [`Borrowed<'a>`] | never | shallow | no |
//! | [`BorrowedMut<'a>`] | never | not copyable | yes |
//! | [`SharedCow`] | one block per distinct value | shallow | yes, detaches first |
//!
//! A payload fits `N` bytes when its size is at most `N` and its alignment is
//! at most [`INLINE_ALIGN`].

use core::marker::PhantomData;

pub use dynpoly_internals::INLINE_ALIGN;
use dynpoly_internals::{
    OwningStorage, RawBorrowed, RawBorrowedMut, RawFixed, RawHeap, RawSbo, RawShared, RawStorage,
};

/// Inline capacity of [`Sbo`] when none is given.
pub const DEFAULT_SBO_SIZE: usize = 16;

mod sealed {
    pub trait Sealed {}

    impl Sealed for super::Heap {}
    impl<const N: usize> Sealed for super::Sbo<N> {}
    impl<const N: usize> Sealed for super::Fixed<N> {}
    impl Sealed for super::Borrowed<'_> {}
    impl Sealed for super::BorrowedMut<'_> {}
    impl Sealed for super::SharedCow {}
}

/// Selects where a handle stores its payload.
///
/// This trait is sealed. Use one of the selectors in this module.
pub trait StoragePolicy: sealed::Sealed {
    /// The raw storage state kept inside the handle.
    type Raw: RawStorage;
}

/// Storage policies that own their payload and can be built from a value.
pub trait OwningPolicy: StoragePolicy<Raw: OwningStorage> {}

/// Storage policies whose handles implement [`Clone`].
///
/// [`BorrowedMut`] is the only policy without it.
pub trait CopyableStorage: StoragePolicy {}

/// One owned heap block per handle.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash)]
pub struct Heap;

/// Inline buffer of `N` bytes, with a heap block for payloads that do not fit.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash)]
pub struct Sbo<const N: usize = DEFAULT_SBO_SIZE>;

/// Inline buffer of `N` bytes and nothing else.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash)]
pub struct Fixed<const N: usize>;

/// Read-only reference to a payload owned elsewhere, valid for `'a`.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash)]
pub struct Borrowed<'a>(PhantomData<&'a ()>);

/// Writable reference to a payload owned elsewhere, valid for `'a`.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash)]
pub struct BorrowedMut<'a>(PhantomData<&'a mut ()>);

/// One reference-counted block shared by all copies, detached on write.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash)]
pub struct SharedCow;

impl StoragePolicy for Heap {
    type Raw = RawHeap;
}

impl<const N: usize> StoragePolicy for Sbo<N> {
    type Raw = RawSbo<N>;
}

impl<const N: usize> StoragePolicy for Fixed<N> {
    type Raw = RawFixed<N>;
}

impl<'a> StoragePolicy for Borrowed<'a> {
    type Raw = RawBorrowed<'a>;
}

impl<'a> StoragePolicy for BorrowedMut<'a> {
    type Raw = RawBorrowedMut<'a>;
}

impl StoragePolicy for SharedCow {
    type Raw = RawShared;
}

impl OwningPolicy for Heap {}
impl<const N: usize> OwningPolicy for Sbo<N> {}
impl<const N: usize> OwningPolicy for Fixed<N> {}
impl OwningPolicy for SharedCow {}

impl CopyableStorage for Heap {}
impl<const N: usize> CopyableStorage for Sbo<N> {}
impl<const N: usize> CopyableStorage for Fixed<N> {}
impl CopyableStorage for Borrowed<'_> {}
impl CopyableStorage for SharedCow {}
