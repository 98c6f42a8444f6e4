//! Key hashing for [`PoolMap`](crate::PoolMap).
//!
//! Integer keys go through a fixed avalanche mix so their bucket placement
//! is fully deterministic and reproducible across runs and platforms. Byte
//! streams (strings and other composite `Hash` types) fall back to a
//! general-purpose primitive: `foldhash` with a fixed seed when the
//! `foldhash` feature is enabled, otherwise an 8-byte chunked fold through
//! the same mix.

use core::hash::BuildHasher;
use core::hash::Hasher;

/// Folds one 64-bit word into the running state.
///
/// The shift/add/xor sequence is load-bearing: bucket placement of integer
/// keys is pinned by tests and must not change.
#[inline]
fn mix(h: u64, word: u64) -> u64 {
    let mut h = h.wrapping_add(word);
    h = h.wrapping_add(h << 10);
    h ^= h >> 6;
    h = h.wrapping_add(h << 3);
    h ^= h >> 11;
    h.wrapping_add(h << 15)
}

cfg_if::cfg_if! {
    if #[cfg(feature = "foldhash")] {
        #[inline]
        fn hash_bytes(bytes: &[u8]) -> u64 {
            foldhash::fast::FixedState::with_seed(0xa076_1d64_78bd_642f).hash_one(bytes)
        }
    } else {
        #[inline]
        fn hash_bytes(bytes: &[u8]) -> u64 {
            let mut h = 0u64;
            for chunk in bytes.chunks(8) {
                let mut word = [0u8; 8];
                word[..chunk.len()].copy_from_slice(chunk);
                h = mix(h, u64::from_le_bytes(word));
            }
            mix(h, bytes.len() as u64)
        }
    }
}

/// Streaming hasher built around the avalanche [`mix`].
///
/// Every integer write folds one word into the state, so hashing a single
/// integer key applies the mix to that key exactly once. Signed writes
/// sign-extend into the word first, matching the masked placement of
/// negative keys. Byte-stream writes defer to the general-purpose primitive
/// and fold its result in.
///
/// # Examples
///
/// ```rust
/// # use core::hash::BuildHasher;
/// #
/// # use pool_hash::MixBuildHasher;
/// #
/// let state = MixBuildHasher;
/// assert_eq!(state.hash_one(42u64), state.hash_one(42u64));
/// assert_ne!(state.hash_one(42u64), state.hash_one(43u64));
/// ```
#[derive(Clone, Debug, Default)]
pub struct MixHasher {
    state: u64,
}

impl Hasher for MixHasher {
    #[inline]
    fn finish(&self) -> u64 {
        self.state
    }

    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        self.state = mix(self.state, hash_bytes(bytes));
    }

    #[inline]
    fn write_u8(&mut self, i: u8) {
        self.state = mix(self.state, u64::from(i));
    }

    #[inline]
    fn write_u16(&mut self, i: u16) {
        self.state = mix(self.state, u64::from(i));
    }

    #[inline]
    fn write_u32(&mut self, i: u32) {
        self.state = mix(self.state, u64::from(i));
    }

    #[inline]
    fn write_u64(&mut self, i: u64) {
        self.state = mix(self.state, i);
    }

    #[inline]
    fn write_u128(&mut self, i: u128) {
        self.state = mix(self.state, (i >> 64) as u64);
        self.state = mix(self.state, i as u64);
    }

    #[inline]
    fn write_usize(&mut self, i: usize) {
        self.state = mix(self.state, i as u64);
    }

    #[inline]
    fn write_i8(&mut self, i: i8) {
        self.state = mix(self.state, i as i64 as u64);
    }

    #[inline]
    fn write_i16(&mut self, i: i16) {
        self.state = mix(self.state, i as i64 as u64);
    }

    #[inline]
    fn write_i32(&mut self, i: i32) {
        self.state = mix(self.state, i as i64 as u64);
    }

    #[inline]
    fn write_i64(&mut self, i: i64) {
        self.state = mix(self.state, i as u64);
    }

    #[inline]
    fn write_i128(&mut self, i: i128) {
        self.write_u128(i as u128);
    }

    #[inline]
    fn write_isize(&mut self, i: isize) {
        self.state = mix(self.state, i as i64 as u64);
    }
}

/// The default [`BuildHasher`] for [`PoolMap`](crate::PoolMap).
///
/// Stateless and deterministic. Any other `BuildHasher` (a keyed SipHash,
/// for instance) can be supplied through the map's `S` parameter when
/// hash-flooding resistance matters more than reproducible placement.
#[derive(Clone, Copy, Debug, Default)]
pub struct MixBuildHasher;

impl BuildHasher for MixBuildHasher {
    type Hasher = MixHasher;

    #[inline]
    fn build_hasher(&self) -> MixHasher {
        MixHasher::default()
    }
}
