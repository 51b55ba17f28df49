//! Cost-bounded multi-pool batching.
//!
//! A greedy, online, non-repacking bin packer: items land in the current
//! bin of their named pool and the bin closes once its accumulated cost
//! exceeds one capacity unit. Placed items never move and there is no
//! lookahead; overshooting the capacity is accepted so a single large
//! item cannot starve its pool.

use std::collections::BTreeMap;

/// Cost threshold that closes a bin.
pub const CAPACITY: f64 = 1.0;

#[derive(Debug)]
struct Pool<T> {
    bins: Vec<Vec<T>>,
    cursor: usize,
    cost: f64,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self {
            bins: Vec::new(),
            cursor: 0,
            cost: 0.0,
        }
    }
}

/// Per-pool cost-bounded batch queues. Pools are created lazily on first
/// push and kept in name order.
#[derive(Debug)]
pub struct PoolQueue<T> {
    pools: BTreeMap<String, Pool<T>>,
}

impl<T> Default for PoolQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PoolQueue<T> {
    pub fn new() -> Self {
        Self {
            pools: BTreeMap::new(),
        }
    }

    /// Append one weighted fragment to the pool's current bin.
    ///
    /// The capacity check runs after insertion: an item whose own cost
    /// exceeds a whole unit is still inserted, and only then closes its
    /// bin.
    pub fn push<I>(&mut self, pool: &str, items: I, cost: f64)
    where
        I: IntoIterator<Item = T>,
    {
        let state = self.pools.entry(pool.to_string()).or_default();

        if state.bins.len() == state.cursor {
            state.bins.push(Vec::new());
            tracing::trace!("{}: opened bin {}", pool, state.cursor);
        }
        state.bins[state.cursor].extend(items);

        state.cost += cost;
        if state.cost > CAPACITY {
            tracing::trace!(
                "{}: closed bin {} at cost {:.3}",
                pool,
                state.cursor,
                state.cost
            );
            state.cursor += 1;
            state.cost = 0.0;
        }
    }

    /// Total number of bins across all pools.
    pub fn total_bins(&self) -> usize {
        self.pools.values().map(|pool| pool.bins.len()).sum()
    }

    /// Consume the queue, returning the ordered bins per pool for FIFO
    /// drain.
    pub fn finalize(self) -> BTreeMap<String, Vec<Vec<T>>> {
        self.pools
            .into_iter()
            .map(|(name, pool)| (name, pool.bins))
            .collect()
    }
}
