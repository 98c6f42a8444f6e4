//! The capacity-exhausted error shared by both containers.

use core::fmt;

/// Error returned when inserting into a container whose pre-allocated
/// storage is already full.
///
/// Capacity is fixed at construction, so a full container stays full. The
/// rejected payload is carried inside the error and can be recovered with
/// [`into_inner`](CapacityError::into_inner) instead of being dropped.
///
/// # Examples
///
/// ```rust
/// # use pool_hash::PoolMap;
/// #
/// let mut map: PoolMap<u64, u64> = PoolMap::with_capacity(1);
/// map.insert(1, 10).unwrap();
///
/// let err = map.insert(2, 20).unwrap_err();
/// assert_eq!(err.into_inner(), (2, 20));
/// assert_eq!(map.len(), 1);
/// ```
pub struct CapacityError<T> {
    value: T,
}

impl<T> CapacityError<T> {
    pub(crate) fn new(value: T) -> Self {
        CapacityError { value }
    }

    /// Consumes the error, returning the payload the container rejected.
    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> fmt::Debug for CapacityError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapacityError").finish_non_exhaustive()
    }
}

impl<T> fmt::Display for CapacityError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("capacity exhausted")
    }
}

impl<T> core::error::Error for CapacityError<T> {}
