//! Marker types for the thread-safety of a handle.
//!
//! The last type parameter of [`Poly<D, S, F, T>`](crate::Poly) decides
//! whether the handle may cross thread boundaries:
//!
//! - [`Local`] (the default): any payload is accepted, including `Rc` and
//!   other `!Send` types. The handle is neither `Send` nor `Sync`.
//! - [`SendSync`]: only `Send + Sync` payloads are accepted, and the handle is
//!   `Send + Sync` in return.
//!
//! The constraint is enforced at construction time through
//! [`ObjectMarkerFor`]. It is impossible to bind a `Poly<_, _, _, SendSync>`
//! to a payload that is not `Send + Sync`.
//!
//! # Examples
//!
//! ```
//! use std::rc::Rc;
//!
//! use dynpoly::{function::Function, markers};
//!
//! let offset = Rc::new(1);
//! let local: Function<i32, i32> = Function::from_fn(move |x| x + *offset);
//! assert_eq!(local.invoke(1), 2);
//!
//! let shared: Function<i32, i32, markers::SendSync> = Function::from_fn(|x| x * 10);
//! std::thread::spawn(move || assert_eq!(shared.invoke(3), 30))
//!     .join()
//!     .unwrap();
//! ```

/// Marker type for handles that are `Send + Sync`.
///
/// Handles with this marker can only be bound to payloads that are themselves
/// `Send + Sync`.
///
/// ```compile_fail
/// use std::rc::Rc;
///
/// use dynpoly::{function::Function, markers};
///
/// let offset = Rc::new(1);
/// let handle: Function<i32, i32, markers::SendSync> = Function::from_fn(move |x| x + *offset);
/// ```
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash)]
pub struct SendSync;

/// Marker type for handles that stay on one thread.
///
/// Any payload is accepted. The handle is neither `Send` nor `Sync`, whatever
/// the payload.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash)]
pub struct Local;

/// Marker trait combining payload and thread-safety requirements.
///
/// - For `T = Local`: implemented for all `Sized + 'static` types.
/// - For `T = SendSync`: implemented for `Sized + 'static` types that are also
///   `Send + Sync`.
///
/// # Safety
///
/// Implementing `ObjectMarkerFor<SendSync>` for a type asserts that the type is
/// `Send + Sync`. Handles rely on this to be `Send + Sync` themselves. The
/// blanket implementations below cover every type that qualifies, so there is
/// no reason to implement this trait by hand.
pub unsafe trait ObjectMarkerFor<T>: Sized + 'static {}

// SAFETY: `Local` handles are never `Send` or `Sync`
unsafe impl<O: Sized + 'static> ObjectMarkerFor<Local> for O {}

// SAFETY: The bound requires `Send + Sync`
unsafe impl<O: Sized + 'static> ObjectMarkerFor<SendSync> for O where O: Send + Sync {}
