#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod arena;

pub mod error;
pub mod fixed_vec;
pub mod hash;
pub mod pool_map;

pub use error::CapacityError;
pub use fixed_vec::FixedVec;
pub use hash::MixBuildHasher;
pub use hash::MixHasher;
pub use pool_map::PoolMap;
