//! The error type reported by fallible handle operations.

use dynpoly_internals::{PolicyKind, StorageError};

/// Reasons a [`Poly`](crate::Poly) operation can fail.
///
/// Failed operations never leave partial state behind: a construction that
/// fails drops the value it was given, and a failed copy-on-write detach
/// leaves the shared allocation untouched.
///
/// # Examples
///
/// ```
/// use dynpoly::{PolyError, function::FunctionView};
///
/// let double = |x: i32| x * 2;
/// let mut view: FunctionView<'_, i32, i32> = FunctionView::from_ref(&double);
/// assert_eq!(view.try_invoke(4), Ok(8));
///
/// view.destroy();
/// assert_eq!(view.try_invoke(4), Err(PolyError::UseAfterDestroy));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PolyError {
    /// The requested concrete type is not the one the handle is bound to.
    #[error("capability mismatch: expected {expected}, found {found}")]
    CapabilityMismatch {
        /// The type that was asked for.
        expected: &'static str,
        /// The type the handle is bound to.
        found: &'static str,
    },
    /// The allocator could not provide storage for the payload.
    #[error("out of memory allocating {size} bytes (align {align})")]
    OutOfMemory {
        /// Size of the failed allocation.
        size: usize,
        /// Alignment of the failed allocation.
        align: usize,
    },
    /// The storage policy does not support the operation.
    #[error("{operation} is not supported by the {policy} policy")]
    InvalidOperationForPolicy {
        /// The policy that refused.
        policy: PolicyKind,
        /// Name of the refused operation.
        operation: &'static str,
    },
    /// The handle was destroyed before this operation.
    #[error("the handle has already been destroyed")]
    UseAfterDestroy,
    /// The storage policy cannot produce a second handle.
    #[error("the {policy} policy cannot be copied")]
    NotCopyable {
        /// The policy that refused.
        policy: PolicyKind,
    },
}

impl From<StorageError> for PolyError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::OutOfMemory { layout } => PolyError::OutOfMemory {
                size: layout.size(),
                align: layout.align(),
            },
            StorageError::InvalidOperationForPolicy { policy, operation } => {
                PolyError::InvalidOperationForPolicy { policy, operation }
            }
            StorageError::NotCopyable { policy } => PolyError::NotCopyable { policy },
        }
    }
}
