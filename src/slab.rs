//! A fixed-capacity object pool addressed by index instead of pointer.
//!
//! The source this crate is descended from manages depth-layer URL storage
//! with `wr_cache_t`: a flat array plus a used-bitmap, where a handed-out
//! object's "address" is recovered from its raw pointer offset into the
//! array (`wr_cache_mark_used`/`wr_cache_mark_unused`). That arithmetic
//! doesn't carry over to safe Rust, and one of the two macros computing it
//! is missing an operator in the source (the unused-marking macro never
//! actually divides the byte offset by `objsize`) — so a handle here is
//! simply the slot index, never reconstructed from a pointer.
//!
//! Capacity is fixed at construction, matching the source's one-shot
//! `wr_cache_create`; there is no growth path, because a depth layer's
//! slab is sized once per [`SlabLimits::layer_capacity`] and discarded
//! when the layer is done.

use crate::errors::ErrorKind;

/// An index-based handle into a [`Slab`]. Opaque outside this module aside
/// from its `Debug`/equality impls; holding one does not keep the slot
/// alive past a [`Slab::dealloc`] or [`Slab::reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(usize);

/// A fixed-capacity pool of `T`, allocated and freed by slot index.
///
/// `alloc`/`dealloc` are O(1): a free list threaded through unused slots
/// tracks the next candidate, mirroring the source's `next_free` field.
pub struct Slab<T> {
    slots: Vec<Option<T>>,
    free_list: Vec<usize>,
    nr_used: usize,
}

impl<T> Slab<T> {
    /// Creates a pool with room for exactly `capacity` live objects.
    pub fn with_capacity(capacity: usize) -> Result<Self, ErrorKind> {
        if capacity == 0 {
            return Err(ErrorKind::AllocationFailure);
        }

        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| ErrorKind::AllocationFailure)?;
        slots.resize_with(capacity, || None);

        Ok(Self {
            free_list: (0..capacity).rev().collect(),
            slots,
            nr_used: 0,
        })
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.nr_used
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.nr_used == 0
    }

    #[inline(always)]
    pub fn is_full(&self) -> bool {
        self.nr_used == self.capacity()
    }

    /// Occupies the next free slot with `value`, returning its handle.
    /// Fails once the pool is at capacity — the caller is expected to
    /// rotate to a fresh layer rather than grow this one.
    pub fn alloc(&mut self, value: T) -> Result<Handle, ErrorKind> {
        let idx = self.free_list.pop().ok_or(ErrorKind::AllocationFailure)?;
        self.slots[idx] = Some(value);
        self.nr_used += 1;
        Ok(Handle(idx))
    }

    /// Releases the slot behind `handle`, returning its value.
    pub fn dealloc(&mut self, handle: Handle) -> Option<T> {
        let slot = self.slots.get_mut(handle.0)?;
        let value = slot.take();
        if value.is_some() {
            self.nr_used -= 1;
            self.free_list.push(handle.0);
        }
        value
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.slots.get(handle.0)?.as_ref()
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.slots.get_mut(handle.0)?.as_mut()
    }

    /// Empties every slot, restoring the pool to its just-allocated state.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.free_list = (0..self.slots.len()).rev().collect();
        self.nr_used = 0;
    }

    /// Iterates over the occupied slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_dealloc_round_trip() {
        let mut slab: Slab<u32> = Slab::with_capacity(4).unwrap();
        let h = slab.alloc(42).unwrap();
        assert_eq!(slab.get(h), Some(&42));
        assert_eq!(slab.dealloc(h), Some(42));
        assert_eq!(slab.get(h), None);
    }

    #[test]
    fn alloc_fails_once_full() {
        let mut slab: Slab<u32> = Slab::with_capacity(2).unwrap();
        slab.alloc(1).unwrap();
        slab.alloc(2).unwrap();
        assert!(slab.is_full());
        assert!(slab.alloc(3).is_err());
    }

    #[test]
    fn dealloc_frees_a_slot_for_reuse() {
        let mut slab: Slab<u32> = Slab::with_capacity(1).unwrap();
        let h = slab.alloc(1).unwrap();
        slab.dealloc(h);
        assert!(slab.alloc(2).is_ok());
    }

    #[test]
    fn reset_clears_every_slot() {
        let mut slab: Slab<u32> = Slab::with_capacity(3).unwrap();
        slab.alloc(1).unwrap();
        slab.alloc(2).unwrap();
        slab.reset();
        assert_eq!(slab.len(), 0);
        assert_eq!(slab.iter().count(), 0);
        assert!(slab.alloc(9).is_ok());
    }

    #[test]
    fn iter_yields_only_occupied_slots() {
        let mut slab: Slab<u32> = Slab::with_capacity(3).unwrap();
        let h1 = slab.alloc(1).unwrap();
        slab.alloc(2).unwrap();
        slab.dealloc(h1);
        let remaining: Vec<_> = slab.iter().copied().collect();
        assert_eq!(remaining, vec![2]);
    }
}
