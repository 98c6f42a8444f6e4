//! A fixed-capacity hash map using separate chaining through a
//! pre-allocated entry pool.
//!
//! All entry storage is allocated once, at construction. Inserting never
//! touches the allocator and the table never grows; when the pool runs out
//! the insert is rejected and the key/value pair is handed back. Collisions
//! are resolved by chaining entries through an intrusive link word, and
//! unused entries are threaded into a free list through that same word:
//!
//! ```text
//! capacity 6, 4 buckets, keys A..D hashed to buckets 0, 1, 2, 2:
//!
//!            +------+------+------+------+
//! heads      |  e0  |  e2  |  e4  | nil  |
//!            +------+------+------+------+
//!               |      |      |
//!               v      v      v
//!            +------+------+------+------+------+------+
//! slots      |A nil |  ->3 |B nil | nil  |C ->5 |D nil |
//!            +------+------+------+------+------+------+
//!                      ^             |
//! free head -----------+    (slot 3 is the free tail)
//! ```
//!
//! Lookup walks one chain. A miss is not an error: it returns a reference to
//! a shared default-constructed sentinel value instead.

use alloc::boxed::Box;
use alloc::vec;
use core::fmt;
use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;
use core::marker::PhantomData;
use core::ops::Index;
use core::ptr::NonNull;

use crate::arena::EntryArena;
use crate::arena::NIL;
use crate::arena::Slot;
use crate::error::CapacityError;
use crate::hash::MixBuildHasher;

/// Largest power of two at or below `max(capacity, 1)`.
///
/// Half-sized relative to capacity is enough for short chains; the floor of
/// one bucket keeps lookup and iteration total even for a zero-capacity
/// table.
#[inline]
fn bucket_count_for(capacity: usize) -> usize {
    let target = capacity.max(1);
    1usize << target.ilog2()
}

/// The chain-head array and the mask that folds hashes into it.
///
/// The bucket count is a power of two, so the mask is derived once at
/// construction and never changes (the table does not resize).
#[derive(Clone)]
struct BucketTable {
    heads: Box<[u32]>,
    mask: usize,
}

impl BucketTable {
    fn with_capacity(capacity: usize) -> Self {
        let count = bucket_count_for(capacity);
        BucketTable {
            heads: vec![NIL; count].into_boxed_slice(),
            mask: count - 1,
        }
    }

    #[inline]
    fn len(&self) -> usize {
        self.heads.len()
    }

    #[inline]
    fn mask(&self) -> usize {
        self.mask
    }

    #[inline]
    fn bucket_index(&self, hash: u64) -> usize {
        (hash as usize) & self.mask
    }

    #[inline]
    fn head(&self, bucket: usize) -> u32 {
        self.heads[bucket]
    }

    #[inline]
    fn set_head(&mut self, bucket: usize, entry: u32) {
        self.heads[bucket] = entry;
    }

    fn heads_ptr(&self) -> NonNull<u32> {
        NonNull::from(&*self.heads).cast()
    }
}

/// A fixed-capacity hash map with separate chaining over a pre-allocated
/// entry pool.
///
/// `PoolMap<K, V, S>` stores key-value pairs in storage sized once at
/// construction. Insertion is O(1) and allocation-free; lookup walks a
/// single bucket chain. The trade-offs relative to a general-purpose map:
///
/// - **No growth.** A full map rejects further inserts and returns the pair
///   to the caller. Capacity planning is the caller's responsibility.
/// - **No removal.** Entries live until the map is dropped; pool slots are
///   never recycled.
/// - **Duplicate keys are permitted.** Each insert takes its own slot;
///   lookups resolve to the most recently inserted entry for a key.
/// - **Misses return a sentinel.** [`lookup`](Self::lookup) and indexing
///   return a reference to a shared default-constructed `V` (see
///   [`none`](Self::none)) rather than failing; [`get`](Self::get) offers
///   the `Option` view.
///
/// Integer keys are placed with a deterministic avalanche mix (see
/// [`MixBuildHasher`]); any other [`BuildHasher`] can be supplied through
/// `S`.
///
/// # Examples
///
/// ```rust
/// # use pool_hash::PoolMap;
/// #
/// let mut routes: PoolMap<u64, &str> = PoolMap::with_capacity(16);
/// routes.insert(80, "http").unwrap();
/// routes.insert(443, "https").unwrap();
///
/// assert_eq!(routes.len(), 2);
/// assert_eq!(routes[&443], "https");
/// assert_eq!(routes[&22], ""); // miss: the shared sentinel
/// ```
pub struct PoolMap<K, V, S = MixBuildHasher> {
    arena: EntryArena<K, V>,
    buckets: BucketTable,
    len: usize,
    none: V,
    hash_builder: S,
}

impl<K, V, S> Debug for PoolMap<K, V, S>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        struct Chain<'a, K, V, S>(&'a PoolMap<K, V, S>, u32);

        impl<K: Debug, V: Debug, S> Debug for Chain<'_, K, V, S> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let mut list = f.debug_list();
                let mut entry = self.1;
                while entry != NIL {
                    // SAFETY: slots reachable from a bucket chain hold live
                    // pairs.
                    let pair = unsafe { self.0.arena.pair_ref(entry) };
                    list.entry(&(entry, &pair.0, &pair.1));
                    entry = self.0.arena.next(entry);
                }
                list.finish()
            }
        }

        struct Buckets<'a, K, V, S>(&'a PoolMap<K, V, S>);

        impl<K: Debug, V: Debug, S> Debug for Buckets<'_, K, V, S> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_map()
                    .entries(
                        (0..self.0.buckets.len())
                            .map(|b| (b, Chain(self.0, self.0.buckets.head(b)))),
                    )
                    .finish()
            }
        }

        struct FreeList<'a, K, V>(&'a EntryArena<K, V>);

        impl<K, V> Debug for FreeList<'_, K, V> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let mut list = f.debug_list();
                let mut slot = self.0.free_head();
                while slot != NIL {
                    list.entry(&slot);
                    slot = self.0.next(slot);
                }
                list.finish()
            }
        }

        f.debug_struct("PoolMap")
            .field("len", &self.len)
            .field("capacity", &self.arena.capacity())
            .field("mask", &self.buckets.mask())
            .field("buckets", &Buckets(self))
            .field("free", &FreeList(&self.arena))
            .finish()
    }
}

impl<K, V, S> Clone for PoolMap<K, V, S>
where
    K: Clone,
    V: Clone,
    S: Clone,
{
    /// Deep copy: a fresh pool and bucket table of identical capacity, with
    /// the link structure and free list reproduced slot for slot and every
    /// live pair cloned into the same slot index. Chain order, duplicate
    /// resolution, and iteration order all match the source exactly.
    fn clone(&self) -> Self {
        let mut arena = self.arena.clone_links();
        for bucket in 0..self.buckets.len() {
            let mut entry = self.buckets.head(bucket);
            while entry != NIL {
                // SAFETY: slots reachable from a bucket chain hold live
                // pairs; the copy's slot at the same index is uninitialized.
                let pair = unsafe { self.arena.pair_ref(entry) }.clone();
                arena.write_pair(entry, pair);
                entry = self.arena.next(entry);
            }
        }

        PoolMap {
            arena,
            buckets: self.buckets.clone(),
            len: self.len,
            none: self.none.clone(),
            hash_builder: self.hash_builder.clone(),
        }
    }
}

impl<K, V, S> Drop for PoolMap<K, V, S> {
    fn drop(&mut self) {
        if !core::mem::needs_drop::<(K, V)>() || self.len == 0 {
            return;
        }
        for bucket in 0..self.buckets.len() {
            let mut entry = self.buckets.head(bucket);
            while entry != NIL {
                let next = self.arena.next(entry);
                // SAFETY: every chain slot holds a live pair, each chain is
                // walked once, and nothing reads the pair afterwards.
                unsafe { self.arena.drop_pair(entry) };
                entry = next;
            }
        }
    }
}

impl<K, V, S> PoolMap<K, V, S>
where
    V: Default,
{
    /// Creates a map holding at most `capacity` entries, using the given
    /// hasher builder.
    ///
    /// The entry pool and bucket table are allocated here; no further
    /// allocation happens for the map's lifetime. The value type must
    /// implement [`Default`] to provide the shared absent-value sentinel
    /// (see [`none`](Self::none)).
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use pool_hash::PoolMap;
    /// # use pool_hash::MixBuildHasher;
    /// #
    /// let map: PoolMap<u64, u64> = PoolMap::with_capacity_and_hasher(100, MixBuildHasher);
    /// assert_eq!(map.capacity(), 100);
    /// assert!(map.is_empty());
    /// ```
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        PoolMap {
            arena: EntryArena::with_capacity(capacity),
            buckets: BucketTable::with_capacity(capacity),
            len: 0,
            none: V::default(),
            hash_builder,
        }
    }

    /// Creates an empty, zero-capacity map using the given hasher builder.
    ///
    /// Every insert into a zero-capacity map is rejected; lookups answer
    /// with the sentinel.
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::with_capacity_and_hasher(0, hash_builder)
    }
}

impl<K, V, S> PoolMap<K, V, S>
where
    V: Default,
    S: Default,
{
    /// Creates an empty, zero-capacity map with the default hasher.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use pool_hash::PoolMap;
    /// #
    /// let map: PoolMap<u64, u64> = PoolMap::new();
    /// assert_eq!(map.capacity(), 0);
    /// ```
    pub fn new() -> Self {
        Self::with_capacity_and_hasher(0, S::default())
    }

    /// Creates a map holding at most `capacity` entries, with the default
    /// hasher.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use pool_hash::PoolMap;
    /// #
    /// let map: PoolMap<u64, &str> = PoolMap::with_capacity(10);
    /// assert_eq!(map.capacity(), 10);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, S::default())
    }
}

impl<K, V, S> Default for PoolMap<K, V, S>
where
    V: Default,
    S: Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> PoolMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Inserts a key-value pair, consuming one pool slot.
    ///
    /// The new entry is prepended to its bucket's chain. Existing entries
    /// are never overwritten: inserting a key that is already present adds
    /// a second entry, and lookups then resolve to the newer one.
    ///
    /// # Errors
    ///
    /// When the pool is exhausted the pair is returned inside
    /// [`CapacityError`] and the map is left untouched. A full table never
    /// silently drops an insert.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use pool_hash::PoolMap;
    /// #
    /// let mut map: PoolMap<u64, &str> = PoolMap::with_capacity(2);
    /// map.insert(7, "first").unwrap();
    /// map.insert(7, "second").unwrap();
    /// assert_eq!(map.len(), 2);
    /// assert_eq!(*map.lookup(&7), "second");
    ///
    /// let err = map.insert(8, "full").unwrap_err();
    /// assert_eq!(err.into_inner(), (8, "full"));
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> Result<(), CapacityError<(K, V)>> {
        let hash = self.hash_builder.hash_one(&key);
        let Some(slot) = self.arena.allocate() else {
            return Err(CapacityError::new((key, value)));
        };

        let bucket = self.buckets.bucket_index(hash);
        self.arena.write_pair(slot, (key, value));
        self.arena.set_next(slot, self.buckets.head(bucket));
        self.buckets.set_head(bucket, slot);
        self.len += 1;
        Ok(())
    }

    /// Returns a reference to the value for `key`, or `None` if absent.
    ///
    /// With duplicate keys present, this is the most recently inserted
    /// value.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use pool_hash::PoolMap;
    /// #
    /// let mut map: PoolMap<u64, &str> = PoolMap::with_capacity(4);
    /// map.insert(1, "one").unwrap();
    /// assert_eq!(map.get(&1), Some(&"one"));
    /// assert_eq!(map.get(&2), None);
    /// ```
    pub fn get(&self, key: &K) -> Option<&V> {
        // SAFETY: find_slot only yields chain-reachable slots.
        self.find_slot(key)
            .map(|slot| unsafe { &self.arena.pair_ref(slot).1 })
    }

    /// Returns a mutable reference to the value for `key`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use pool_hash::PoolMap;
    /// #
    /// let mut map: PoolMap<u64, u64> = PoolMap::with_capacity(4);
    /// map.insert(1, 10).unwrap();
    /// if let Some(v) = map.get_mut(&1) {
    ///     *v += 1;
    /// }
    /// assert_eq!(map.get(&1), Some(&11));
    /// ```
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let slot = self.find_slot(key)?;
        // SAFETY: find_slot only yields chain-reachable slots.
        Some(unsafe { &mut self.arena.pair_mut(slot).1 })
    }

    /// Returns `true` if the map contains an entry for `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        self.find_slot(key).is_some()
    }

    /// Returns a reference to the value for `key`, or to the shared absent
    /// sentinel if the key is not present.
    ///
    /// Never fails and never inserts on a miss. Use [`get`](Self::get) to
    /// distinguish a missing key from a stored default value.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use pool_hash::PoolMap;
    /// #
    /// let mut map: PoolMap<u64, &str> = PoolMap::with_capacity(4);
    /// map.insert(1, "one").unwrap();
    /// assert_eq!(*map.lookup(&1), "one");
    /// assert_eq!(map.lookup(&9), map.none());
    /// ```
    pub fn lookup(&self, key: &K) -> &V {
        self.get(key).unwrap_or(&self.none)
    }

    /// Walks the chain for `key`'s bucket and returns the first slot whose
    /// key matches. Chains are prepend-ordered, so the first match is the
    /// most recent insert.
    fn find_slot(&self, key: &K) -> Option<u32> {
        let hash = self.hash_builder.hash_one(key);
        let mut entry = self.buckets.head(self.buckets.bucket_index(hash));
        while entry != NIL {
            // SAFETY: slots reachable from a bucket chain hold live pairs.
            let pair = unsafe { self.arena.pair_ref(entry) };
            if pair.0 == *key {
                return Some(entry);
            }
            entry = self.arena.next(entry);
        }
        None
    }
}

impl<K, V, S> PoolMap<K, V, S> {
    /// Returns the number of entries in the map.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the map contains no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the maximum number of entries the map can hold.
    ///
    /// Fixed for the map's lifetime.
    pub fn capacity(&self) -> usize {
        self.arena.capacity()
    }

    /// Returns the shared absent-value sentinel.
    ///
    /// A default-constructed `V` owned by the map; [`lookup`](Self::lookup)
    /// and indexing return a reference to it on a miss.
    pub fn none(&self) -> &V {
        &self.none
    }

    /// Exchanges the entire contents of two maps: pools, bucket tables,
    /// counters, sentinels, and hasher state.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use pool_hash::PoolMap;
    /// #
    /// let mut a: PoolMap<u64, &str> = PoolMap::with_capacity(1);
    /// let mut b: PoolMap<u64, &str> = PoolMap::with_capacity(10);
    /// a.insert(1, "one").unwrap();
    ///
    /// a.swap(&mut b);
    /// assert_eq!(a.capacity(), 10);
    /// assert_eq!(b.capacity(), 1);
    /// assert_eq!(*b.lookup(&1), "one");
    /// ```
    pub fn swap(&mut self, other: &mut Self) {
        core::mem::swap(self, other);
    }

    /// Returns an iterator over the entries as `(&K, &V)`.
    ///
    /// Entries are produced in bucket order and then chain order within a
    /// bucket; within one bucket the most recent insert comes first. This
    /// is not insertion order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use pool_hash::PoolMap;
    /// #
    /// let mut map: PoolMap<u64, u64> = PoolMap::with_capacity(8);
    /// map.insert(1, 10).unwrap();
    /// map.insert(2, 20).unwrap();
    ///
    /// let total: u64 = map.iter().map(|(_, v)| *v).sum();
    /// assert_eq!(total, 30);
    /// ```
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            raw: RawIter::new(
                self.buckets.heads_ptr(),
                self.arena.base_ptr(),
                self.buckets.len(),
            ),
            marker: PhantomData,
        }
    }

    /// Returns an iterator over the entries as `(&K, &mut V)`.
    ///
    /// Keys stay immutable; rekeying an entry in place would strand it in
    /// the wrong bucket.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use pool_hash::PoolMap;
    /// #
    /// let mut map: PoolMap<u64, u64> = PoolMap::with_capacity(8);
    /// map.insert(1, 10).unwrap();
    /// map.insert(2, 20).unwrap();
    ///
    /// for (_, v) in map.iter_mut() {
    ///     *v *= 2;
    /// }
    /// assert_eq!(map.get(&2), Some(&40));
    /// ```
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            raw: RawIter::new(
                self.buckets.heads_ptr(),
                self.arena.base_ptr_mut(),
                self.buckets.len(),
            ),
            marker: PhantomData,
        }
    }
}

/// Indexing returns the stored value, or the shared sentinel on a miss.
///
/// Unlike the standard library maps this never panics on an absent key; it
/// behaves exactly like [`lookup`](PoolMap::lookup).
impl<K, V, S> Index<&K> for PoolMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    type Output = V;

    fn index(&self, key: &K) -> &V {
        self.lookup(key)
    }
}

impl<'a, K, V, S> IntoIterator for &'a PoolMap<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

impl<'a, K, V, S> IntoIterator for &'a mut PoolMap<K, V, S> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> IterMut<'a, K, V> {
        self.iter_mut()
    }
}

/// The one traversal implementation both iterator flavors share.
///
/// Walks buckets in ascending index order and each chain head to tail,
/// yielding raw pointers to live pairs. The canonical end state is bucket 0
/// with a nil entry, regardless of which bucket the walk exhausted on, so
/// an empty table starts and ends in the same state.
struct RawIter<K, V> {
    heads: NonNull<u32>,
    slots: NonNull<Slot<K, V>>,
    bucket_count: usize,
    bucket: usize,
    entry: u32,
}

impl<K, V> RawIter<K, V> {
    fn new(heads: NonNull<u32>, slots: NonNull<Slot<K, V>>, bucket_count: usize) -> Self {
        let mut raw = RawIter {
            heads,
            slots,
            bucket_count,
            bucket: 0,
            entry: NIL,
        };
        for bucket in 0..bucket_count {
            // SAFETY: bucket is below bucket_count, in range for heads.
            let head = unsafe { *raw.heads.as_ptr().add(bucket) };
            if head != NIL {
                raw.bucket = bucket;
                raw.entry = head;
                break;
            }
        }
        raw
    }

    /// # Safety
    ///
    /// The map the pointers were taken from must still be alive and must
    /// not have been structurally mutated since this cursor was created.
    unsafe fn next(&mut self) -> Option<NonNull<(K, V)>> {
        if self.entry == NIL {
            return None;
        }
        // SAFETY: a non-nil cursor entry is always a chain-reachable slot
        // index, in range for the pool, with a live payload. No reference
        // to the slot is materialized here, so the wrappers are free to
        // hand out mutable payload borrows.
        unsafe {
            let slot = self.slots.as_ptr().add(self.entry as usize);
            let next_in_chain = (*slot).next;
            let pair = NonNull::new_unchecked((&raw mut (*slot).pair).cast::<(K, V)>());
            self.step(next_in_chain);
            Some(pair)
        }
    }

    /// Follows the chain link, or scans forward for the next non-empty
    /// bucket, or resets to the canonical end state.
    fn step(&mut self, next_in_chain: u32) {
        if next_in_chain != NIL {
            self.entry = next_in_chain;
            return;
        }
        while self.bucket + 1 < self.bucket_count {
            self.bucket += 1;
            // SAFETY: bucket stays below bucket_count.
            let head = unsafe { *self.heads.as_ptr().add(self.bucket) };
            if head != NIL {
                self.entry = head;
                return;
            }
        }
        self.bucket = 0;
        self.entry = NIL;
    }
}

/// An iterator over a [`PoolMap`]'s entries as `(&K, &V)`.
///
/// Created by [`PoolMap::iter`].
pub struct Iter<'a, K, V> {
    raw: RawIter<K, V>,
    marker: PhantomData<&'a (K, V)>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        // SAFETY: the shared borrow held through `marker` keeps the map
        // alive and un-mutated for 'a.
        unsafe {
            self.raw.next().map(|pair| {
                let pair = &*pair.as_ptr();
                (&pair.0, &pair.1)
            })
        }
    }
}

/// An iterator over a [`PoolMap`]'s entries as `(&K, &mut V)`.
///
/// Created by [`PoolMap::iter_mut`]. Keys are read-only; only values may be
/// mutated through it.
pub struct IterMut<'a, K, V> {
    raw: RawIter<K, V>,
    marker: PhantomData<&'a mut (K, V)>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        // SAFETY: the exclusive borrow held through `marker` keeps the map
        // alive and un-mutated for 'a, and the traversal visits every slot
        // at most once, so the mutable value borrows never alias.
        unsafe {
            self.raw.next().map(|pair| {
                let pair = &mut *pair.as_ptr();
                (&pair.0, &mut pair.1)
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;
    use alloc::string::String;
    use alloc::string::ToString;
    use alloc::vec::Vec;
    use core::cell::Cell;
    use core::hash::BuildHasher;

    use rand::Rng;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use siphasher::sip::SipHasher;

    use super::*;

    #[test]
    fn initial_sizes() {
        let m0: PoolMap<i32, String> = PoolMap::new();
        let m1: PoolMap<i32, String> = PoolMap::with_capacity(1);
        let m10: PoolMap<i32, String> = PoolMap::with_capacity(10);

        assert_eq!((m0.len(), m0.capacity()), (0, 0));
        assert_eq!((m1.len(), m1.capacity()), (0, 1));
        assert_eq!((m10.len(), m10.capacity()), (0, 10));
        assert!(m0.is_empty() && m1.is_empty() && m10.is_empty());
    }

    #[test]
    fn bucket_count_is_floored_power_of_two() {
        for capacity in 0..=64usize {
            let map: PoolMap<u64, u64> = PoolMap::with_capacity(capacity);
            let count = map.buckets.len();

            let target = capacity.max(1);
            let mut expected = 1;
            while expected * 2 <= target {
                expected *= 2;
            }

            assert!(count.is_power_of_two(), "capacity {capacity}");
            assert_eq!(count, expected, "capacity {capacity}");
            assert_eq!(map.buckets.mask(), count - 1, "capacity {capacity}");
        }
    }

    #[test]
    fn insert_and_get() {
        let mut map: PoolMap<i32, String> = PoolMap::with_capacity(1);
        map.insert(3, "a".to_string()).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&3), Some(&"a".to_string()));
    }

    #[test]
    fn insert_then_lookup_many() {
        let mut map: PoolMap<u64, u64> = PoolMap::with_capacity(64);
        for k in 0..64u64 {
            map.insert(k, k * 2).unwrap();
        }
        assert_eq!(map.len(), 64);
        for k in 0..64u64 {
            assert_eq!(map.get(&k), Some(&(k * 2)), "{map:#?}");
        }
        assert_eq!(map.get(&999), None);
    }

    #[test]
    fn duplicate_keys_resolve_to_most_recent() {
        let mut map: PoolMap<u64, &str> = PoolMap::with_capacity(4);
        map.insert(7, "first").unwrap();
        map.insert(7, "second").unwrap();

        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&7), Some(&"second"));
        assert_eq!(map.iter().count(), 2);
    }

    #[test]
    fn miss_returns_shared_sentinel() {
        let mut map: PoolMap<i32, String> = PoolMap::with_capacity(10);
        map.insert(1, "A".to_string()).unwrap();

        assert_eq!(map.lookup(&5), map.none());
        assert_eq!(map.lookup(&-1), map.none());
        assert_eq!(map.none(), &String::new());
        assert!(core::ptr::eq(map.lookup(&5), map.none()));
    }

    #[test]
    fn zero_capacity_table_is_inert() {
        let mut map: PoolMap<u64, u64> = PoolMap::new();
        assert!(map.insert(1, 1).is_err());
        assert_eq!(map.len(), 0);
        assert_eq!(map.get(&1), None);
        assert_eq!(*map.lookup(&1), 0);
        assert_eq!(map.iter().next(), None);
    }

    #[test]
    fn full_table_insert_is_rejected() {
        let mut map: PoolMap<u64, u64> = PoolMap::with_capacity(3);
        for k in 0..3u64 {
            map.insert(k, k).unwrap();
        }
        assert_eq!(map.len(), map.capacity());

        let err = map.insert(99, 990).unwrap_err();
        assert_eq!(err.into_inner(), (99, 990));
        assert_eq!(map.len(), 3);
        assert_eq!(map.get(&99), None);
    }

    #[test]
    fn size_accounting() {
        let mut map: PoolMap<u64, u64> = PoolMap::with_capacity(5);
        let mut accepted = 0;
        for k in 0..9u64 {
            if map.insert(k, k).is_ok() {
                accepted += 1;
            }
            assert!(map.len() <= map.capacity());
        }
        assert_eq!(accepted, 5);
        assert_eq!(map.len(), 5);
    }

    #[test]
    fn index_returns_sentinel_on_miss() {
        let mut map: PoolMap<u64, &str> = PoolMap::with_capacity(4);
        map.insert(2, "B").unwrap();

        assert_eq!(map[&2], "B");
        assert_eq!(map[&9], "");
    }

    #[test]
    fn iteration_visits_each_entry_once() {
        let mut map: PoolMap<i32, String> = PoolMap::with_capacity(10);
        for (k, v) in [(0, "X"), (1, "A"), (2, "B"), (3, "C"), (4, "D")] {
            map.insert(k, v.to_string()).unwrap();
        }

        let mut found = [0u8; 5];
        for (k, _) in &map {
            found[*k as usize] += 1;
        }
        assert_eq!(found, [1, 1, 1, 1, 1], "{map:#?}");
        assert_eq!(map.iter().count(), map.len());
    }

    #[test]
    fn empty_iteration_terminates_immediately() {
        let empty: PoolMap<u64, u64> = PoolMap::with_capacity(10);
        assert_eq!(empty.iter().next(), None);
        assert_eq!(empty.iter().count(), 0);
    }

    #[test]
    fn iter_mut_updates_values() {
        let mut map: PoolMap<u64, u64> = PoolMap::with_capacity(8);
        for k in 0..5u64 {
            map.insert(k, 1).unwrap();
        }
        for (_, v) in &mut map {
            *v += 9;
        }
        for k in 0..5u64 {
            assert_eq!(map.get(&k), Some(&10));
        }
    }

    #[test]
    fn clone_is_deep_and_independent() {
        let mut a: PoolMap<u64, String> = PoolMap::with_capacity(8);
        a.insert(1, "one".to_string()).unwrap();
        a.insert(2, "two".to_string()).unwrap();

        let mut b = a.clone();
        assert_eq!(b.len(), 2);
        assert_eq!(b.capacity(), 8);
        assert_eq!(b.get(&1), a.get(&1));

        b.insert(3, "three".to_string()).unwrap();
        *b.get_mut(&1).unwrap() = "uno".to_string();

        assert_eq!(a.len(), 2);
        assert_eq!(a.get(&3), None);
        assert_eq!(a.get(&1), Some(&"one".to_string()));
        assert_eq!(b.get(&1), Some(&"uno".to_string()));
    }

    #[test]
    fn clone_preserves_chain_order() {
        let mut a: PoolMap<u64, u64> = PoolMap::with_capacity(8);
        for (k, v) in [(1, 10), (1, 11), (9, 90), (1, 12)] {
            a.insert(k, v).unwrap();
        }

        let b = a.clone();
        assert_eq!(b.get(&1), Some(&12));

        let original: Vec<(u64, u64)> = a.iter().map(|(k, v)| (*k, *v)).collect();
        let copied: Vec<(u64, u64)> = b.iter().map(|(k, v)| (*k, *v)).collect();
        assert_eq!(original, copied);
    }

    #[test]
    fn swap_exchanges_everything() {
        let mut small: PoolMap<i32, String> = PoolMap::with_capacity(1);
        let mut large: PoolMap<i32, String> = PoolMap::with_capacity(10);
        small.insert(1, "a".to_string()).unwrap();
        for k in 0..4 {
            large.insert(k, k.to_string()).unwrap();
        }

        small.swap(&mut large);

        assert_eq!((small.len(), small.capacity()), (4, 10));
        assert_eq!((large.len(), large.capacity()), (1, 1));
        assert_eq!(small.get(&2), Some(&"2".to_string()));
        assert_eq!(large.get(&1), Some(&"a".to_string()));
        assert!(large.insert(5, "full".to_string()).is_err());
    }

    #[derive(Default)]
    struct Tally(Option<Rc<Cell<usize>>>);

    impl Drop for Tally {
        fn drop(&mut self) {
            if let Some(count) = &self.0 {
                count.set(count.get() + 1);
            }
        }
    }

    #[test]
    fn drop_releases_every_live_payload() {
        let drops = Rc::new(Cell::new(0));
        {
            let mut map: PoolMap<u64, Tally> = PoolMap::with_capacity(4);
            for k in 0..4u64 {
                map.insert(k, Tally(Some(Rc::clone(&drops)))).unwrap();
            }
            assert_eq!(drops.get(), 0);
        }
        assert_eq!(drops.get(), 4);
    }

    #[test]
    fn rejected_insert_hands_the_payload_back() {
        let drops = Rc::new(Cell::new(0));
        let mut map: PoolMap<u64, Tally> = PoolMap::with_capacity(1);
        map.insert(0, Tally(Some(Rc::clone(&drops)))).unwrap();

        let err = map.insert(1, Tally(Some(Rc::clone(&drops)))).unwrap_err();
        assert_eq!(drops.get(), 0);
        let (key, _value) = err.into_inner();
        assert_eq!(key, 1);
    }

    #[test]
    fn clone_storage_outlives_source() {
        let mut map: PoolMap<u64, u64> = PoolMap::with_capacity(3);
        map.insert(1, 10).unwrap();

        let copy = map.clone();
        drop(map);
        assert_eq!(copy.get(&1), Some(&10));
    }

    struct SipState;

    impl BuildHasher for SipState {
        type Hasher = SipHasher;

        fn build_hasher(&self) -> SipHasher {
            SipHasher::new()
        }
    }

    #[test]
    fn caller_supplied_hasher_state() {
        let mut map: PoolMap<String, u32, SipState> =
            PoolMap::with_capacity_and_hasher(8, SipState);
        map.insert("one".to_string(), 1).unwrap();
        map.insert("two".to_string(), 2).unwrap();

        assert_eq!(map.get(&"one".to_string()), Some(&1));
        assert_eq!(map.get(&"three".to_string()), None);
        assert_eq!(map.iter().count(), 2);
    }

    #[test]
    fn randomized_fill_matches_reference_model() {
        let mut rng = SmallRng::seed_from_u64(0x517c_c1b7_2722_0a95);
        let mut map: PoolMap<u64, u64> = PoolMap::with_capacity(512);
        let mut model: hashbrown::HashMap<u64, u64> = hashbrown::HashMap::new();

        for _ in 0..512 {
            let key = rng.random_range(0..256u64);
            let value = rng.random();
            map.insert(key, value).unwrap();
            model.insert(key, value);
        }

        assert_eq!(map.len(), 512);
        for (key, value) in &model {
            assert_eq!(map.get(key), Some(value));
        }
    }

    #[test]
    fn concrete_scenario() {
        let mut map: PoolMap<i32, &str> = PoolMap::with_capacity(10);
        for (k, v) in [(1, "A"), (2, "B"), (3, "C"), (4, "D")] {
            map.insert(k, v).unwrap();
        }

        assert_eq!(map.len(), 4);
        assert_eq!(map.capacity(), 10);
        assert_eq!(map[&2], "B");
        assert_eq!(map[&9], *map.none());

        let mut keys: Vec<i32> = map.iter().map(|(k, _)| *k).collect();
        keys.sort_unstable();
        assert_eq!(keys, [1, 2, 3, 4]);
    }

    #[test]
    fn debug_dump_shows_structure() {
        let mut map: PoolMap<u64, &str> = PoolMap::with_capacity(4);
        map.insert(1, "one").unwrap();

        let dump = alloc::format!("{map:?}");
        assert!(dump.contains("len: 1"));
        assert!(dump.contains("capacity: 4"));
        assert!(dump.contains("free"));
    }
}
