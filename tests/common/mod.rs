//! Fixtures shared by the integration suites.

#![allow(dead_code)]

use std::{
    cell::Cell,
    rc::Rc,
    sync::atomic::{AtomicUsize, Ordering},
};

use dynpoly::{
    Capability, ErasedMut, ErasedRef, Implements, Poly, PolyError, VTable, flavor::Flavor,
    storage::StoragePolicy,
};

/// Something that can speed up.
pub enum Vehicle {}

#[derive(Clone, Copy)]
pub struct VehicleOps {
    accelerate: unsafe fn(ErasedRef<'_>) -> String,
    speed: unsafe fn(ErasedRef<'_>) -> u32,
    boost: unsafe fn(ErasedMut<'_>, u32),
}

impl Capability for Vehicle {
    type Ops = VehicleOps;
}

/// The operations a concrete vehicle provides.
pub trait Drive: Clone + 'static {
    fn accelerate(&self) -> String;
    fn speed(&self) -> u32;
    fn boost(&mut self, by: u32);
}

unsafe fn accelerate<V: Drive>(this: ErasedRef<'_>) -> String {
    // SAFETY: The table of `V` is only paired with `V` payloads
    unsafe { this.downcast_unchecked::<V>() }.accelerate()
}

unsafe fn speed<V: Drive>(this: ErasedRef<'_>) -> u32 {
    // SAFETY: The table of `V` is only paired with `V` payloads
    unsafe { this.downcast_unchecked::<V>() }.speed()
}

unsafe fn boost<V: Drive>(this: ErasedMut<'_>, by: u32) {
    // SAFETY: The table of `V` is only paired with `V` payloads
    unsafe { this.downcast_unchecked::<V>() }.boost(by);
}

// SAFETY: All three operations downcast to `V`
unsafe impl<V: Drive> Implements<V> for Vehicle {
    const VTABLE: &'static VTable<Self> = &VTable::new::<V>(VehicleOps {
        accelerate: accelerate::<V>,
        speed: speed::<V>,
        boost: boost::<V>,
    });
}

/// Method syntax for vehicle handles.
pub trait VehicleExt {
    fn accelerate(&self) -> Result<String, PolyError>;
    fn speed(&self) -> Result<u32, PolyError>;
    fn boost(&mut self, by: u32) -> Result<(), PolyError>;
}

impl<S: StoragePolicy, F: Flavor, T> VehicleExt for Poly<Vehicle, S, F, T> {
    fn accelerate(&self) -> Result<String, PolyError> {
        // SAFETY: `call` pairs the operations with their own payload
        self.call(|ops, this| unsafe { (ops.accelerate)(this) })
    }

    fn speed(&self) -> Result<u32, PolyError> {
        // SAFETY: `call` pairs the operations with their own payload
        self.call(|ops, this| unsafe { (ops.speed)(this) })
    }

    fn boost(&mut self, by: u32) -> Result<(), PolyError> {
        // SAFETY: `call_mut` pairs the operations with their own payload
        self.call_mut(|ops, this| unsafe { (ops.boost)(this, by) })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Car {
    pub brand: String,
    pub year: u16,
    pub speed: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Truck {
    pub brand: String,
    pub year: u16,
    pub load: [u32; 8],
    pub speed: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    pub speed: u32,
}

impl Car {
    pub fn new(brand: &str, year: u16) -> Self {
        Self {
            brand: brand.to_string(),
            year,
            speed: 0,
        }
    }
}

impl Truck {
    pub fn new(brand: &str, year: u16) -> Self {
        Self {
            brand: brand.to_string(),
            year,
            load: [0; 8],
            speed: 0,
        }
    }
}

impl Drive for Car {
    fn accelerate(&self) -> String {
        format!("Car::accelerate() {} {}", self.brand, self.year)
    }

    fn speed(&self) -> u32 {
        self.speed
    }

    fn boost(&mut self, by: u32) {
        self.speed += by;
    }
}

impl Drive for Truck {
    fn accelerate(&self) -> String {
        format!("Truck::accelerate() {} {}", self.brand, self.year)
    }

    fn speed(&self) -> u32 {
        self.speed
    }

    fn boost(&mut self, by: u32) {
        // Trucks are slow to pick up speed
        self.speed += by / 2;
    }
}

impl Drive for Plane {
    fn accelerate(&self) -> String {
        "Plane::accelerate()".to_string()
    }

    fn speed(&self) -> u32 {
        self.speed
    }

    fn boost(&mut self, by: u32) {
        self.speed += by * 10;
    }
}

/// Counts how many values are alive and how many were ever dropped.
#[derive(Clone, Default)]
pub struct Counters {
    live: Rc<Cell<isize>>,
    drops: Rc<Cell<usize>>,
}

impl Counters {
    pub fn live(&self) -> isize {
        self.live.get()
    }

    pub fn drops(&self) -> usize {
        self.drops.get()
    }
}

/// A vehicle that reports its construction and destruction to [`Counters`].
pub struct Tracked {
    pub speed: u32,
    counters: Counters,
}

impl Tracked {
    pub fn new(counters: &Counters) -> Self {
        counters.live.set(counters.live.get() + 1);
        Self {
            speed: 0,
            counters: counters.clone(),
        }
    }
}

impl Clone for Tracked {
    fn clone(&self) -> Self {
        let mut copy = Tracked::new(&self.counters);
        copy.speed = self.speed;
        copy
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.counters.live.set(self.counters.live.get() - 1);
        self.counters.drops.set(self.counters.drops.get() + 1);
    }
}

impl Drive for Tracked {
    fn accelerate(&self) -> String {
        "Tracked::accelerate()".to_string()
    }

    fn speed(&self) -> u32 {
        self.speed
    }

    fn boost(&mut self, by: u32) {
        self.speed += by;
    }
}

/// A thread-safe vehicle that counts drops in a static.
#[derive(Clone, Debug)]
pub struct Courier {
    pub speed: u32,
}

pub static COURIER_DROPS: AtomicUsize = AtomicUsize::new(0);

impl Drop for Courier {
    fn drop(&mut self) {
        COURIER_DROPS.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drive for Courier {
    fn accelerate(&self) -> String {
        "Courier::accelerate()".to_string()
    }

    fn speed(&self) -> u32 {
        self.speed
    }

    fn boost(&mut self, by: u32) {
        self.speed += by;
    }
}

/// A vehicle whose `Clone` panics while it is armed.
pub struct Fragile {
    pub speed: u32,
    pub armed: Rc<Cell<bool>>,
}

impl Clone for Fragile {
    fn clone(&self) -> Self {
        assert!(!self.armed.get(), "Fragile::clone while armed");
        Self {
            speed: self.speed,
            armed: Rc::clone(&self.armed),
        }
    }
}

impl Drive for Fragile {
    fn accelerate(&self) -> String {
        "Fragile::accelerate()".to_string()
    }

    fn speed(&self) -> u32 {
        self.speed
    }

    fn boost(&mut self, by: u32) {
        self.speed += by;
    }
}

/// A type whose vehicle table was wrongly built for [`Plane`].
#[derive(Clone, Debug)]
pub struct Decoy(pub [u8; 64]);

// SAFETY: This table breaks the contract on purpose. Handles check the type of
// every table before binding a value, so it is never paired with a `Decoy`.
unsafe impl Implements<Decoy> for Vehicle {
    const VTABLE: &'static VTable<Self> = &VTable::new::<Plane>(VehicleOps {
        accelerate: accelerate::<Plane>,
        speed: speed::<Plane>,
        boost: boost::<Plane>,
    });
}
