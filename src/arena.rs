//! Pre-allocated entry storage for the map.
//!
//! All entry slots live in one contiguous allocation made at construction
//! time. Unused slots are threaded into a singly linked free list through the
//! same link word that occupied slots later use for their bucket chain, so
//! the arena needs no side table to track availability.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::mem::MaybeUninit;
use core::ptr::NonNull;

/// End-of-list marker for slot links, and the "no slot" value for bucket
/// heads and the free-list head.
pub(crate) const NIL: u32 = u32::MAX;

/// One entry slot.
///
/// `next` is always initialized: it links the slot into either the free list
/// or a bucket chain. `pair` is initialized exactly while the slot is
/// reachable from a bucket chain.
pub(crate) struct Slot<K, V> {
    pub(crate) next: u32,
    pub(crate) pair: MaybeUninit<(K, V)>,
}

/// A fixed block of entry slots with an intrusive free list.
///
/// Every slot is in exactly one of two disjoint sets: reachable from
/// `free_head` with an uninitialized payload, or reachable from exactly one
/// bucket chain with a live payload. The arena hands out slots and raw
/// payload access; upholding the partition is the container's job.
pub(crate) struct EntryArena<K, V> {
    slots: Box<[Slot<K, V>]>,
    free_head: u32,
}

impl<K, V> EntryArena<K, V> {
    /// Allocates `capacity` uninitialized slots and threads them all into the
    /// free list in index order. `capacity == 0` allocates nothing.
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        assert!(capacity < NIL as usize, "capacity exceeds index range");

        let mut slots = Vec::with_capacity(capacity);
        for i in 0..capacity {
            let next = if i + 1 == capacity { NIL } else { (i + 1) as u32 };
            slots.push(Slot {
                next,
                pair: MaybeUninit::uninit(),
            });
        }

        EntryArena {
            slots: slots.into_boxed_slice(),
            free_head: if capacity == 0 { NIL } else { 0 },
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn free_head(&self) -> u32 {
        self.free_head
    }

    /// Pops the free-list head in O(1).
    ///
    /// The returned slot's payload is uninitialized and its link word is
    /// stale; the caller constructs the payload and relinks the slot into a
    /// bucket chain. Returns `None` when the arena is exhausted. Slots are
    /// never returned to the free list.
    pub(crate) fn allocate(&mut self) -> Option<u32> {
        if self.free_head == NIL {
            return None;
        }
        let slot = self.free_head;
        self.free_head = self.next(slot);
        Some(slot)
    }

    pub(crate) fn next(&self, index: u32) -> u32 {
        self.slots[index as usize].next
    }

    pub(crate) fn set_next(&mut self, index: u32, next: u32) {
        self.slots[index as usize].next = next;
    }

    /// Constructs a pair in place in slot `index`.
    ///
    /// The slot must hold no live payload (freshly allocated, or produced by
    /// [`clone_links`](Self::clone_links)); writing over a live pair leaks
    /// it.
    pub(crate) fn write_pair(&mut self, index: u32, pair: (K, V)) {
        self.slots[index as usize].pair.write(pair);
    }

    /// # Safety
    ///
    /// The payload at `index` must be initialized, i.e. the slot must be
    /// reachable from a bucket chain.
    pub(crate) unsafe fn pair_ref(&self, index: u32) -> &(K, V) {
        // SAFETY: guaranteed by the caller.
        unsafe { self.slots[index as usize].pair.assume_init_ref() }
    }

    /// # Safety
    ///
    /// The payload at `index` must be initialized.
    pub(crate) unsafe fn pair_mut(&mut self, index: u32) -> &mut (K, V) {
        // SAFETY: guaranteed by the caller.
        unsafe { self.slots[index as usize].pair.assume_init_mut() }
    }

    /// # Safety
    ///
    /// The payload at `index` must be initialized, and must not be read
    /// again afterwards.
    pub(crate) unsafe fn drop_pair(&mut self, index: u32) {
        // SAFETY: guaranteed by the caller.
        unsafe { self.slots[index as usize].pair.assume_init_drop() }
    }

    /// Reproduces the link words and free-list head with every payload left
    /// uninitialized. Used by the container's deep copy, which then clones
    /// payloads chain by chain into the same slot indices.
    pub(crate) fn clone_links(&self) -> Self {
        let slots = self
            .slots
            .iter()
            .map(|slot| Slot {
                next: slot.next,
                pair: MaybeUninit::uninit(),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        EntryArena {
            slots,
            free_head: self.free_head,
        }
    }

    /// Base pointer for read-only traversal.
    pub(crate) fn base_ptr(&self) -> NonNull<Slot<K, V>> {
        NonNull::from(&*self.slots).cast()
    }

    /// Base pointer for traversal that hands out mutable payload references.
    pub(crate) fn base_ptr_mut(&mut self) -> NonNull<Slot<K, V>> {
        NonNull::from(&mut *self.slots).cast()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_list_is_threaded_in_index_order() {
        let mut arena: EntryArena<u32, u32> = EntryArena::with_capacity(4);
        assert_eq!(arena.capacity(), 4);
        assert_eq!(arena.free_head(), 0);

        for expected in 0..4 {
            assert_eq!(arena.allocate(), Some(expected));
        }
        assert_eq!(arena.allocate(), None);
        assert_eq!(arena.free_head(), NIL);
    }

    #[test]
    fn zero_capacity_is_empty_and_exhausted() {
        let mut arena: EntryArena<u32, u32> = EntryArena::with_capacity(0);
        assert_eq!(arena.capacity(), 0);
        assert_eq!(arena.free_head(), NIL);
        assert_eq!(arena.allocate(), None);
    }

    #[test]
    fn payload_round_trip() {
        let mut arena: EntryArena<u32, alloc::string::String> = EntryArena::with_capacity(2);
        let slot = arena.allocate().unwrap();
        arena.write_pair(slot, (7, alloc::string::String::from("seven")));

        // SAFETY: the payload was just written.
        let pair = unsafe { arena.pair_ref(slot) };
        assert_eq!(pair.0, 7);
        assert_eq!(pair.1, "seven");

        // SAFETY: the payload is live and not read again.
        unsafe { arena.drop_pair(slot) };
    }

    #[test]
    fn clone_links_copies_structure_only() {
        let mut arena: EntryArena<u32, u32> = EntryArena::with_capacity(3);
        arena.allocate().unwrap();

        let copy = arena.clone_links();
        assert_eq!(copy.capacity(), 3);
        assert_eq!(copy.free_head(), arena.free_head());
        for i in 0..3 {
            assert_eq!(copy.next(i), arena.next(i));
        }
    }
}
