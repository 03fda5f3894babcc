use std::collections::BTreeSet;

use parking_lot::{Mutex, MutexGuard};
use xxhash_rust::xxh3::xxh3_64;

/// Striped per-object mutation locks. A mutation holds the stripes of every object whose
/// index document it will change, from the store update through the index update.
pub(crate) struct LockTable {
    stripes: Vec<Mutex<()>>,
}

/// Held stripes; released on drop.
pub(crate) struct StripeGuard<'a> {
    _held: Vec<MutexGuard<'a, ()>>,
}

impl LockTable {
    pub fn new(stripes: usize) -> Self {
        Self { stripes: (0..stripes.max(1)).map(|_| Mutex::new(())).collect() }
    }

    fn stripe_of(&self, id: &str) -> usize {
        (xxh3_64(id.as_bytes()) % self.stripes.len() as u64) as usize
    }

    /// Locks the stripes covering `ids`, always in ascending stripe order.
    pub fn lock<'a, I, S>(&'a self, ids: I) -> StripeGuard<'a>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let wanted: BTreeSet<usize> = ids.into_iter().map(|id| self.stripe_of(id.as_ref())).collect();
        StripeGuard { _held: wanted.into_iter().map(|i| self.stripes[i].lock()).collect() }
    }

    /// Every stripe; used by mutations whose object set is only known inside the arena.
    pub fn lock_all(&self) -> StripeGuard<'_> {
        StripeGuard { _held: self.stripes.iter().map(|m| m.lock()).collect() }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize { self.stripes.len() }
}
