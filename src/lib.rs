#![cfg_attr(not(doc), no_std)]
#![deny(
    missing_docs,
    clippy::alloc_instead_of_core,
    clippy::std_instead_of_alloc,
    clippy::std_instead_of_core,
    clippy::missing_safety_doc,
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::as_ptr_cast_mut,
    clippy::ptr_as_ptr,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    unused_doc_comments
)]

//! Runtime polymorphism without inheritance.
//!
//! ## Overview
//!
//! This crate lets values of unrelated concrete types be stored and used
//! through one uniform handle, [`Poly`]. Instead of a trait object, each
//! handle carries a hand-built table of function pointers for the operations
//! it supports, and a storage policy that decides where the value's bytes
//! live.
//!
//! The three ingredients are chosen independently, as type parameters of
//! [`Poly<D, S, F, T>`](Poly):
//!
//! - **What it can do**: a [`Capability`] `D` lists the operations. Each
//!   concrete type provides its table through [`Implements`].
//! - **Where it lives**: a [storage policy](storage) `S` ([`Heap`],
//!   [`Sbo<N>`], [`Fixed<N>`], [`Borrowed<'a>`], [`BorrowedMut<'a>`] or
//!   [`SharedCow`]).
//! - **How it dispatches**: a [vtable flavor](flavor) `F` stores the table by
//!   reference or by value.
//!
//! A fourth parameter, the [thread-safety marker](markers) `T`, decides
//! whether the handle is `Send + Sync`.
//!
//! ## Quick Example
//!
//! ```
//! use dynpoly::function::{Function, SharedFunction};
//!
//! let greeters: Vec<Function<&'static str, String>> = vec![
//!     Function::from_fn(|name| format!("Hello, {name}!")),
//!     Function::from_fn(|name| format!("Welcome back, {name}.")),
//! ];
//! let greetings: Vec<String> = greeters.iter().map(|f| f.invoke("Ada")).collect();
//! assert_eq!(greetings, ["Hello, Ada!", "Welcome back, Ada."]);
//!
//! // Copies of a shared handle use one allocation
//! let shared: SharedFunction<u8, u8> = SharedFunction::from_fn(|x| x + 1);
//! let copy = shared.clone();
//! assert_eq!(shared.payload_addr(), copy.payload_addr());
//! ```
//!
//! ## Defining a Capability
//!
//! A capability is a type implementing [`Capability`] whose `Ops` struct holds
//! one `unsafe fn` pointer per operation. The operations receive the payload
//! as an [`ErasedRef`] or [`ErasedMut`] and downcast it to the type they were
//! written for. A blanket [`Implements`] impl builds the static table for
//! every type that supports the operations, and an extension trait turns
//! [`Poly::call`] into ordinary method calls. See the [`poly`] module for a
//! complete example.
//!
//! ## Storage Policies
//!
//! | policy | allocates | copy | mutation |
//! |---|---|---|---|
//! | [`Heap`] | always | deep | yes |
//! | [`Sbo<N>`] | only if the value exceeds `N` bytes | deep | yes |
//! | [`Fixed<N>`] | never | deep | yes |
//! | [`Borrowed<'a>`] | never | shallow | no |
//! | [`BorrowedMut<'a>`] | never | not copyable | yes |
//! | [`SharedCow`] | once per distinct value | shallow | copy-on-write |
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events at the `TRACE` level when a handle falls
//! back to the heap, copies, detaches or destroys a payload. Dispatch itself
//! never logs.
//!
//! ## Features
//!
//! - `std`: implements `std::error::Error` for [`PolyError`] through
//!   `thiserror`. The crate is `no_std` otherwise and only needs `alloc`.
//!
//! [`Heap`]: storage::Heap
//! [`Sbo<N>`]: storage::Sbo
//! [`Fixed<N>`]: storage::Fixed
//! [`Borrowed<'a>`]: storage::Borrowed
//! [`BorrowedMut<'a>`]: storage::BorrowedMut
//! [`SharedCow`]: storage::SharedCow

extern crate alloc;

mod error;
pub mod flavor;
pub mod function;
pub mod markers;
pub mod poly;
pub mod storage;

pub use dynpoly_internals::{
    Capability, ErasedMut, ErasedRef, Implements, Lifecycle, PolicyKind, VTable,
};

pub use self::{error::PolyError, poly::Poly};

/// Commonly used items.
///
/// ```
/// use dynpoly::prelude::*;
///
/// let f: Function<i32, i32> = Function::from_fn(|x| x - 1);
/// assert_eq!(f.invoke(1), 0);
/// ```
pub mod prelude {
    pub use crate::{
        Capability, ErasedMut, ErasedRef, Implements, Poly, PolyError, VTable,
        function::{Function, FunctionView, InplaceFunction, SharedFunction},
        markers::{self, Local, SendSync},
        storage::{Borrowed, BorrowedMut, Fixed, Heap, Sbo, SharedCow},
    };
}
