#![no_std]
#![deny(
    missing_docs,
    clippy::alloc_instead_of_core,
    clippy::std_instead_of_alloc,
    clippy::std_instead_of_core,
    clippy::missing_safety_doc,
    clippy::missing_docs_in_private_items,
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    unused_doc_comments
)]
#![allow(rustdoc::private_intra_doc_links)]
//! Internal implementation crate for [`dynpoly`].
//!
//! # Overview
//!
//! This crate contains the low-level, type-erased data structures and unsafe
//! operations that power the [`dynpoly`] polymorphic handle. It provides
//! hand-built function-pointer tables and a family of raw storage states that
//! hold a value whose concrete type has been forgotten.
//!
//! **This crate is an implementation detail.** No semantic versioning guarantees
//! are provided. Users should depend on the [`dynpoly`] crate, not this one.
//!
//! # Architecture
//!
//! - **[`vtable`]**: Function-pointer tables
//!   - [`Lifecycle`]: destroy/clone/shared-ownership entries, one static per
//!     concrete type
//!   - [`Capability`]: the fixed operation set a handle type exposes
//!   - [`Implements`]: the per-type table of those operations
//!   - [`VTable`]: a [`Lifecycle`] paired with the operations of a
//!     [`Capability`]
//!
//! - **[`storage`]**: Raw storage states, one per policy
//!   - [`RawHeap`]: one owned heap block
//!   - [`RawSbo`]: inline buffer with heap fallback
//!   - [`RawFixed`]: inline buffer only
//!   - [`RawShared`]: reference-counted block with copy-on-write
//!   - [`RawBorrowed`]/[`RawBorrowedMut`]: non-owning references
//!
//! - **[`erased`]**: [`ErasedRef`] and [`ErasedMut`], the payload pointers that
//!   operation bodies receive and downcast.
//!
//! # Safety Strategy
//!
//! None of the raw storage states remember which concrete type they hold.
//! Every operation that needs the type takes the [`Lifecycle`] that was built
//! for it, and the caller promises that the two belong together. The
//! [`dynpoly`] crate keeps the pair in a single handle whose fields are never
//! exposed, so the promise is checked in one place.
//!
//! - **Module-based encapsulation**: the pointer fields of every raw state are
//!   private to its module, so the provenance of each pointer is locally
//!   verifiable
//! - **Static tables**: [`Lifecycle::new`] produces one `&'static` table per
//!   type, so pairing happens at compile time
//! - **Debug checks**: downcasts compare [`TypeId`]s in debug builds
//!
//! [`dynpoly`]: https://docs.rs/dynpoly/latest/dynpoly/
//! [`TypeId`]: core::any::TypeId

extern crate alloc;

pub mod erased;
pub mod storage;
mod util;
pub mod vtable;

pub use erased::{ErasedMut, ErasedRef};
pub use storage::{
    INLINE_ALIGN, OwningStorage, PolicyKind, RawBorrowed, RawBorrowedMut, RawFixed, RawHeap,
    RawSbo, RawShared, RawStorage, StorageError,
};
pub use vtable::{Capability, Implements, Lifecycle, VTable};
