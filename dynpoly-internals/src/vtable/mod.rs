//! Function-pointer tables for type-erased payloads.
//!
//! A [`VTable`] is built once per pair of concrete type and [`Capability`]. It
//! holds the [`Lifecycle`] of the concrete type, which every storage policy
//! needs, and the domain operations listed by the capability.

mod capability;
mod lifecycle;

pub(crate) use self::lifecycle::into_erased;
pub use self::{
    capability::{Capability, Implements, VTable},
    lifecycle::Lifecycle,
};
