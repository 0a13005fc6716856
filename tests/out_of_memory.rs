//! Allocation failures, simulated with a global allocator that refuses one
//! request size on demand.

mod common;

use std::{
    alloc::{GlobalAlloc, Layout, System},
    cell::Cell,
    ptr,
};

use common::{Drive, Vehicle, VehicleExt};
use dynpoly::{
    Poly, PolyError,
    flavor::Remote,
    storage::{Fixed, Heap, OwningPolicy, Sbo},
};

/// Size of the only requests that can be refused.
const REFUSED_SIZE: usize = 4099;

struct RefusingAlloc;

thread_local! {
    static REFUSING: Cell<bool> = const { Cell::new(false) };
}

fn refuses(layout: Layout) -> bool {
    layout.size() == REFUSED_SIZE && REFUSING.try_with(Cell::get).unwrap_or(false)
}

// SAFETY: Every call is forwarded to the system allocator unless it is refused
// by returning null, which is how allocation failure is reported
unsafe impl GlobalAlloc for RefusingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if refuses(layout) {
            return ptr::null_mut();
        }
        // SAFETY: Forwarded from our caller
        unsafe { System.alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        // SAFETY: Forwarded from our caller
        unsafe { System.dealloc(ptr, layout) }
    }
}

#[global_allocator]
static GLOBAL: RefusingAlloc = RefusingAlloc;

/// Runs `f` while requests of [`REFUSED_SIZE`] bytes fail on this thread.
fn refusing<R>(f: impl FnOnce() -> R) -> R {
    REFUSING.with(|refusing| refusing.set(true));
    let result = f();
    REFUSING.with(|refusing| refusing.set(false));
    result
}

#[derive(Clone)]
struct Huge([u8; REFUSED_SIZE]);

impl Drive for Huge {
    fn accelerate(&self) -> String {
        "Huge::accelerate()".to_string()
    }

    fn speed(&self) -> u32 {
        self.0.iter().map(|&b| u32::from(b)).sum()
    }

    fn boost(&mut self, by: u32) {
        self.0[0] = self.0[0].wrapping_add(by as u8);
    }
}

const HUGE_OOM: PolyError = PolyError::OutOfMemory {
    size: REFUSED_SIZE,
    align: 1,
};

fn assert_construction_fails<S: OwningPolicy>() {
    let result = refusing(|| Poly::<Vehicle, S, Remote>::try_new(Huge([1; REFUSED_SIZE])));
    assert_eq!(result.unwrap_err(), HUGE_OOM);

    // Nothing is left behind, so the next attempt succeeds
    let handle = Poly::<Vehicle, S, Remote>::try_new(Huge([1; REFUSED_SIZE])).unwrap();
    assert_eq!(handle.speed(), Ok(REFUSED_SIZE as u32));
}

fn assert_copy_fails<S: OwningPolicy>() {
    let mut handle = Poly::<Vehicle, S, Remote>::try_new(Huge([1; REFUSED_SIZE])).unwrap();
    let result = refusing(|| handle.try_clone());
    assert_eq!(result.unwrap_err(), HUGE_OOM);

    // The original is untouched
    handle.boost(1).unwrap();
    assert_eq!(handle.speed(), Ok(REFUSED_SIZE as u32 + 1));
    let copy = handle.try_clone().unwrap();
    assert_eq!(copy.speed(), Ok(REFUSED_SIZE as u32 + 1));
}

#[test]
fn test_heap_construction_reports_out_of_memory() {
    assert_construction_fails::<Heap>();
}

#[test]
fn test_sbo_fallback_construction_reports_out_of_memory() {
    assert_construction_fails::<Sbo<16>>();
}

#[test]
fn test_heap_copy_reports_out_of_memory() {
    assert_copy_fails::<Heap>();
}

#[test]
fn test_sbo_fallback_copy_reports_out_of_memory() {
    assert_copy_fails::<Sbo<16>>();
}

#[test]
fn test_inline_storage_is_unaffected() {
    let handle = refusing(|| {
        Poly::<Vehicle, Fixed<{ REFUSED_SIZE + 1 }>, Remote>::try_new(Huge([2; REFUSED_SIZE]))
    });
    let handle = handle.unwrap();
    assert!(handle.is_inline());
    let copy = refusing(|| handle.try_clone()).unwrap();
    assert_eq!(copy.speed(), Ok(2 * REFUSED_SIZE as u32));
}
