//! Allocator capability used for message footprints and attached blocks.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// Allocate/free primitive injected into the factory and into blocks.
///
/// Whatever allocator produced a buffer must be the one that frees it. The
/// factory and every block hold the allocator through an `Rc`, so it lives
/// at least as long as the last buffer it handed out.
pub trait Allocator: fmt::Debug {
    /// Allocate a zeroed buffer of `size` bytes, or `None` when exhausted.
    fn allocate(&self, size: usize) -> Option<Box<[u8]>>;

    /// Return a buffer previously produced by [`allocate`](Self::allocate).
    fn free(&self, data: Box<[u8]>);

    /// Allocator type name for diagnostics.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Unbounded allocator backed by the global heap.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

impl Allocator for HeapAllocator {
    fn allocate(&self, size: usize) -> Option<Box<[u8]>> {
        Some(vec![0u8; size].into_boxed_slice())
    }

    fn free(&self, data: Box<[u8]>) {
        drop(data);
    }

    fn name(&self) -> &'static str {
        "heap"
    }
}

/// Heap allocator with a fixed byte budget.
///
/// Allocations that would push usage past `capacity` fail. Counters are kept
/// for diagnostics and tests.
#[derive(Debug)]
pub struct BudgetAllocator {
    capacity: usize,
    used: Cell<usize>,
    allocations: Cell<usize>,
    frees: Cell<usize>,
}

impl BudgetAllocator {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            used: Cell::new(0),
            allocations: Cell::new(0),
            frees: Cell::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently handed out.
    pub fn used(&self) -> usize {
        self.used.get()
    }

    pub fn available(&self) -> usize {
        self.capacity - self.used.get()
    }

    /// Successful allocations so far.
    pub fn allocations(&self) -> usize {
        self.allocations.get()
    }

    pub fn frees(&self) -> usize {
        self.frees.get()
    }

    /// Allocations not yet freed.
    pub fn outstanding(&self) -> usize {
        self.allocations.get() - self.frees.get()
    }
}

impl Allocator for BudgetAllocator {
    fn allocate(&self, size: usize) -> Option<Box<[u8]>> {
        if size > self.available() {
            return None;
        }
        self.used.set(self.used.get() + size);
        self.allocations.set(self.allocations.get() + 1);
        Some(vec![0u8; size].into_boxed_slice())
    }

    fn free(&self, data: Box<[u8]>) {
        self.used.set(self.used.get().saturating_sub(data.len()));
        self.frees.set(self.frees.get() + 1);
    }

    fn name(&self) -> &'static str {
        "budget"
    }
}

/// A buffer paired with the allocator that must free it.
///
/// Dropping an `Allocation` frees the buffer through that allocator exactly
/// once. [`into_parts`](Self::into_parts) hands both out without freeing.
pub struct Allocation {
    data: Option<Box<[u8]>>,
    allocator: Rc<dyn Allocator>,
}

impl Allocation {
    /// Allocate `size` bytes from `allocator`.
    pub fn new(allocator: Rc<dyn Allocator>, size: usize) -> Option<Self> {
        let data = allocator.allocate(size)?;
        Some(Self::from_parts(allocator, data))
    }

    /// Take ownership of a buffer `allocator` produced earlier.
    pub fn from_parts(allocator: Rc<dyn Allocator>, data: Box<[u8]>) -> Self {
        Self {
            data: Some(data),
            allocator,
        }
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_deref().unwrap_or_default()
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.data.as_deref_mut().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.data().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn allocator(&self) -> &Rc<dyn Allocator> {
        &self.allocator
    }

    /// Give up ownership without freeing. The caller must free `data`
    /// through the returned allocator.
    pub fn into_parts(mut self) -> (Box<[u8]>, Rc<dyn Allocator>) {
        let data = self.data.take().unwrap_or_default();
        (data, Rc::clone(&self.allocator))
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            self.allocator.free(data);
        }
    }
}

impl fmt::Debug for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocation")
            .field("len", &self.len())
            .field("allocator", &self.allocator.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_allocator_enforces_capacity() {
        let allocator = BudgetAllocator::new(16);
        let first = allocator.allocate(10).unwrap();
        assert_eq!(allocator.used(), 10);
        assert!(allocator.allocate(7).is_none());
        assert_eq!(allocator.allocations(), 1);

        allocator.free(first);
        assert_eq!(allocator.used(), 0);
        assert_eq!(allocator.frees(), 1);
        assert!(allocator.allocate(16).is_some());
    }

    #[test]
    fn allocation_frees_once_on_drop() {
        let budget = Rc::new(BudgetAllocator::new(64));
        let allocator: Rc<dyn Allocator> = budget.clone();

        let allocation = Allocation::new(allocator, 32).unwrap();
        assert_eq!(allocation.len(), 32);
        assert_eq!(budget.outstanding(), 1);

        drop(allocation);
        assert_eq!(budget.frees(), 1);
        assert_eq!(budget.used(), 0);
    }

    #[test]
    fn into_parts_transfers_ownership_without_freeing() {
        let budget = Rc::new(BudgetAllocator::new(64));
        let allocation = Allocation::new(budget.clone(), 8).unwrap();

        let (data, allocator) = allocation.into_parts();
        assert_eq!(data.len(), 8);
        assert_eq!(budget.frees(), 0);

        allocator.free(data);
        assert_eq!(budget.frees(), 1);
    }

    #[test]
    fn heap_allocator_zeroes() {
        let data = HeapAllocator.allocate(4).unwrap();
        assert_eq!(&*data, &[0, 0, 0, 0]);
        HeapAllocator.free(data);
    }
}
