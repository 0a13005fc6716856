//! Allocation behavior of the storage policies, measured with a counting
//! global allocator.

mod common;

use std::{
    alloc::{GlobalAlloc, Layout, System},
    cell::Cell,
    sync::Once,
};

use common::{Car, Decoy, Plane, Vehicle, VehicleExt};
use dynpoly::{
    Poly, PolyError,
    flavor::{Joined, Local, Remote},
    function::{Function, FunctionView, InplaceFunction},
    storage::{Borrowed, BorrowedMut, Fixed, Heap, Sbo, SharedCow},
};

struct CountingAlloc;

thread_local! {
    static ALLOCATIONS: Cell<usize> = const { Cell::new(0) };
}

// SAFETY: Every call is forwarded to the system allocator unchanged
unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let _ = ALLOCATIONS.try_with(|count| count.set(count.get() + 1));
        // SAFETY: Forwarded from our caller
        unsafe { System.alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        // SAFETY: Forwarded from our caller
        unsafe { System.dealloc(ptr, layout) }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let _ = ALLOCATIONS.try_with(|count| count.set(count.get() + 1));
        // SAFETY: Forwarded from our caller
        unsafe { System.alloc_zeroed(layout) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let _ = ALLOCATIONS.try_with(|count| count.set(count.get() + 1));
        // SAFETY: Forwarded from our caller
        unsafe { System.realloc(ptr, layout, new_size) }
    }
}

#[global_allocator]
static GLOBAL: CountingAlloc = CountingAlloc;

/// Hits every logging callsite once, so their registration is not counted.
fn warm_up() {
    static WARM_UP: Once = Once::new();
    WARM_UP.call_once(|| {
        let mut handle = Poly::<Vehicle, Sbo<16>, Remote>::new(Bytes([0_u8; 32]));
        let _ = handle.clone();
        let mut shared = Poly::<Vehicle, SharedCow, Remote>::new(Plane { speed: 0 });
        let _copy = shared.clone();
        let _ = shared.boost(1);
        handle.destroy();
    });
}

/// Returns how many allocations the current thread made while running `f`.
fn allocations<R>(f: impl FnOnce() -> R) -> (usize, R) {
    warm_up();
    let before = ALLOCATIONS.with(Cell::get);
    let result = f();
    (ALLOCATIONS.with(Cell::get) - before, result)
}

#[derive(Clone)]
struct Bytes<const N: usize>([u8; N]);

impl<const N: usize> common::Drive for Bytes<N> {
    fn accelerate(&self) -> String {
        String::new()
    }

    fn speed(&self) -> u32 {
        self.0.iter().map(|&b| u32::from(b)).sum()
    }

    fn boost(&mut self, by: u32) {
        if let Some(first) = self.0.first_mut() {
            *first = first.wrapping_add(by as u8);
        }
    }
}

#[test]
fn test_heap_allocates_once_per_value() {
    let (count, handle) = allocations(|| Poly::<Vehicle, Heap, Remote>::new(Plane { speed: 1 }));
    assert_eq!(count, 1);
    let (count, copy) = allocations(|| handle.clone());
    assert_eq!(count, 1);
    let (count, ()) = allocations(|| drop((handle, copy)));
    assert_eq!(count, 0);
}

#[test]
fn test_sbo_at_threshold_never_allocates() {
    let (count, mut handle) =
        allocations(|| Poly::<Vehicle, Sbo<16>, Remote>::new(Bytes([1_u8; 16])));
    assert_eq!(count, 0);
    assert!(handle.is_inline());

    let (count, copy) = allocations(|| handle.clone());
    assert_eq!(count, 0);

    let (count, speed) = allocations(|| {
        handle.boost(1).unwrap();
        handle.speed().unwrap()
    });
    assert_eq!(count, 0);
    assert_eq!(speed, 17);
    assert_eq!(copy.speed(), Ok(16));
}

#[test]
fn test_sbo_above_threshold_falls_back_to_heap() {
    let (count, handle) =
        allocations(|| Poly::<Vehicle, Sbo<16>, Remote>::new(Bytes([1_u8; 17])));
    assert_eq!(count, 1);
    assert!(!handle.is_inline());

    // The fallback behaves like the heap policy
    let (count, copy) = allocations(|| handle.clone());
    assert_eq!(count, 1);
    assert_ne!(handle.payload_addr(), copy.payload_addr());
    assert_eq!(copy.speed(), Ok(17));
}

#[test]
fn test_sbo_respects_inline_alignment() {
    #[derive(Clone)]
    #[repr(align(32))]
    struct Wide(u8);

    impl common::Drive for Wide {
        fn accelerate(&self) -> String {
            String::new()
        }

        fn speed(&self) -> u32 {
            u32::from(self.0)
        }

        fn boost(&mut self, by: u32) {
            self.0 += by as u8;
        }
    }

    let (count, handle) = allocations(|| Poly::<Vehicle, Sbo<64>, Remote>::new(Wide(3)));
    assert_eq!(count, 1);
    assert!(!handle.is_inline());
    assert_eq!(handle.speed(), Ok(3));
}

#[test]
fn test_fixed_never_allocates() {
    let (count, ()) = allocations(|| {
        let mut handle = Poly::<Vehicle, Fixed<64>, Local>::new(Bytes([2_u8; 64]));
        let copy = handle.clone();
        handle.boost(1).unwrap();
        assert_eq!(handle.speed(), Ok(129));
        assert_eq!(copy.speed(), Ok(128));
    });
    assert_eq!(count, 0);
}

#[test]
fn test_borrowed_never_allocates() {
    let car = Car::new("Audi", 2017);
    let mut plane = Plane { speed: 5 };
    let (count, ()) = allocations(|| {
        let view = Poly::<Vehicle, Borrowed<'_>, Joined>::from_ref(&car);
        let copies = [view.clone(), view.clone()];
        assert_eq!(copies[1].speed(), Ok(0));
        drop(copies);

        let mut unique = Poly::<Vehicle, BorrowedMut<'_>, Joined>::from_mut(&mut plane);
        unique.boost(1).unwrap();
        assert!(unique.try_clone().is_err());
    });
    assert_eq!(count, 0);
    assert_eq!(plane.speed, 15);
}

#[test]
fn test_shared_allocates_once_per_distinct_value() {
    let (count, mut handle) =
        allocations(|| Poly::<Vehicle, SharedCow, Remote>::new(Plane { speed: 1 }));
    assert_eq!(count, 1);

    let (count, copies) = allocations(|| [handle.clone(), handle.clone(), handle.clone()]);
    assert_eq!(count, 0);

    let (count, ()) = allocations(|| handle.boost(1).unwrap());
    assert_eq!(count, 1);

    let (count, ()) = allocations(|| handle.boost(1).unwrap());
    assert_eq!(count, 0);
    assert_eq!(copies[0].strong_count(), Some(3));
}

#[test]
fn test_function_wrappers() {
    let (count, f) = allocations(|| Function::<u32, u32>::from_fn(|x| x + 1));
    assert_eq!(count, 0);
    assert_eq!(f.invoke(1), 2);

    let big = [7_u64; 8];
    let (count, f) = allocations(|| Function::<usize, u64>::from_fn(move |i| big[i]));
    assert_eq!(count, 1);
    assert_eq!(f.invoke(0), 7);

    let (count, f) = allocations(|| InplaceFunction::<usize, u64, 64>::from_fn(move |i| big[i]));
    assert_eq!(count, 0);
    assert_eq!(f.invoke(7), 7);

    let closure = move |i: usize| big[i] * 2;
    let (count, view) = allocations(|| FunctionView::<usize, u64>::from_ref(&closure));
    assert_eq!(count, 0);
    assert_eq!(view.invoke(1), 14);
}

#[test]
fn test_mismatched_table_allocates_nothing() {
    let (count, result) =
        allocations(|| Poly::<Vehicle, Heap, Remote>::try_new(Decoy([1_u8; 64])));
    assert_eq!(count, 0);
    assert!(matches!(result, Err(PolyError::CapabilityMismatch { .. })));

    let (count, result) =
        allocations(|| Poly::<Vehicle, SharedCow, Remote>::try_new(Decoy([1_u8; 64])));
    assert_eq!(count, 0);
    assert!(result.is_err());
}
