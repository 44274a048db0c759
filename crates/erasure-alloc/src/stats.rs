// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Process-wide allocation counters.
//!
//! A registered [`TrackingAllocator`](crate::TrackingAllocator) is responsible for updating
//! these counters; any thread can read them at any time. All accesses use
//! `Ordering::Relaxed`: the counters are statistics, not synchronization.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Alignment above which an allocation is counted as over-aligned. This is the guarantee
/// of `max_align_t` on the common 64-bit targets.
pub const OVER_ALIGNED_THRESHOLD: usize = 16;

/// The raw counters behind [`memory_stats`].
pub(crate) struct GlobalCounters {
    current_bytes: AtomicUsize,
    peak_bytes: AtomicUsize,
    allocations: AtomicU64,
    deallocations: AtomicU64,
    reallocations: AtomicU64,
    bytes_allocated: AtomicU64,
    bytes_deallocated: AtomicU64,
    over_aligned: AtomicU64,
}

pub(crate) static GLOBAL: GlobalCounters = GlobalCounters::new();

impl GlobalCounters {
    pub(crate) const fn new() -> Self {
        Self {
            current_bytes: AtomicUsize::new(0),
            peak_bytes: AtomicUsize::new(0),
            allocations: AtomicU64::new(0),
            deallocations: AtomicU64::new(0),
            reallocations: AtomicU64::new(0),
            bytes_allocated: AtomicU64::new(0),
            bytes_deallocated: AtomicU64::new(0),
            over_aligned: AtomicU64::new(0),
        }
    }

    /// Records a new allocation of `size` bytes aligned to `align`.
    pub(crate) fn record_alloc(&self, size: usize, align: usize) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
        self.bytes_allocated.fetch_add(size as u64, Ordering::Relaxed);
        if align > OVER_ALIGNED_THRESHOLD {
            self.over_aligned.fetch_add(1, Ordering::Relaxed);
        }
        self.grow(size);
    }

    /// Records the release of an allocation of `size` bytes.
    pub(crate) fn record_dealloc(&self, size: usize) {
        self.deallocations.fetch_add(1, Ordering::Relaxed);
        self.bytes_deallocated.fetch_add(size as u64, Ordering::Relaxed);
        self.shrink(size);
    }

    /// Records an allocation resized in place or moved from `old_size` to `new_size` bytes.
    pub(crate) fn record_realloc(&self, old_size: usize, new_size: usize) {
        self.reallocations.fetch_add(1, Ordering::Relaxed);
        if new_size > old_size {
            let grown = new_size - old_size;
            self.bytes_allocated.fetch_add(grown as u64, Ordering::Relaxed);
            self.grow(grown);
        } else if new_size < old_size {
            let shrunk = old_size - new_size;
            self.bytes_deallocated.fetch_add(shrunk as u64, Ordering::Relaxed);
            self.shrink(shrunk);
        }
    }

    fn grow(&self, size: usize) {
        let result = self
            .current_bytes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                current.checked_add(size)
            });
        match result {
            Ok(previous) => {
                self.peak_bytes.fetch_max(previous + size, Ordering::Relaxed);
            }
            Err(_) => log::error!("Allocation counter overflowed! Size: {size}"),
        }
    }

    fn shrink(&self, size: usize) {
        let result = self
            .current_bytes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                current.checked_sub(size)
            });
        if result.is_err() {
            log::error!("Allocation counter underflowed! Size: {size}");
        }
    }
}

/// A snapshot of the process-wide allocation counters, with derived metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemoryStats {
    /// Bytes currently allocated.
    pub current_bytes: usize,
    /// Highest value `current_bytes` has reached.
    pub peak_bytes: usize,
    /// Number of `alloc`/`alloc_zeroed` calls that succeeded.
    pub allocations: u64,
    /// Number of `dealloc` calls.
    pub deallocations: u64,
    /// Number of `realloc` calls that succeeded.
    pub reallocations: u64,
    /// Allocations alive at the time of the snapshot (`allocations - deallocations`).
    pub live_allocations: i64,
    /// Cumulative bytes ever allocated, including growth through `realloc`.
    pub bytes_allocated_lifetime: u64,
    /// Cumulative bytes ever released, including shrinking through `realloc`.
    pub bytes_deallocated_lifetime: u64,
    /// Allocations with an alignment above [`OVER_ALIGNED_THRESHOLD`].
    pub over_aligned_allocations: u64,
    /// Mean size of an allocation (`bytes_allocated_lifetime / allocations`).
    pub average_allocation_size: f64,
}

impl MemoryStats {
    /// Fills in the fields computed from the raw counters.
    pub fn calculate_derived_metrics(&mut self) {
        self.live_allocations = self.allocations as i64 - self.deallocations as i64;
        self.average_allocation_size = if self.allocations > 0 {
            self.bytes_allocated_lifetime as f64 / self.allocations as f64
        } else {
            0.0
        };
    }

    /// Net bytes over the lifetime. Equal to `current_bytes` when no counter overflowed.
    pub fn net_lifetime_bytes(&self) -> i64 {
        self.bytes_allocated_lifetime as i64 - self.bytes_deallocated_lifetime as i64
    }
}

/// Takes a snapshot of all process-wide counters.
///
/// Counters are read one by one, so a snapshot taken while other threads allocate is
/// not a single consistent point in time.
pub fn memory_stats() -> MemoryStats {
    let mut stats = MemoryStats {
        current_bytes: GLOBAL.current_bytes.load(Ordering::Relaxed),
        peak_bytes: GLOBAL.peak_bytes.load(Ordering::Relaxed),
        allocations: GLOBAL.allocations.load(Ordering::Relaxed),
        deallocations: GLOBAL.deallocations.load(Ordering::Relaxed),
        reallocations: GLOBAL.reallocations.load(Ordering::Relaxed),
        bytes_allocated_lifetime: GLOBAL.bytes_allocated.load(Ordering::Relaxed),
        bytes_deallocated_lifetime: GLOBAL.bytes_deallocated.load(Ordering::Relaxed),
        over_aligned_allocations: GLOBAL.over_aligned.load(Ordering::Relaxed),
        ..Default::default()
    };

    stats.calculate_derived_metrics();
    stats
}

/// Returns the number of bytes currently allocated. Cheaper than [`memory_stats`] when only
/// the current usage is needed.
pub fn current_allocated_bytes() -> usize {
    GLOBAL.current_bytes.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_metrics() {
        let mut stats = MemoryStats {
            allocations: 4,
            deallocations: 1,
            bytes_allocated_lifetime: 100,
            bytes_deallocated_lifetime: 40,
            ..Default::default()
        };
        stats.calculate_derived_metrics();

        assert_eq!(stats.live_allocations, 3);
        assert_eq!(stats.average_allocation_size, 25.0);
        assert_eq!(stats.net_lifetime_bytes(), 60);
    }

    #[test]
    fn test_derived_metrics_without_allocations() {
        let mut stats = MemoryStats::default();
        stats.calculate_derived_metrics();
        assert_eq!(stats.average_allocation_size, 0.0);
        assert_eq!(stats.live_allocations, 0);
    }

    #[test]
    fn test_local_counters() {
        let counters = GlobalCounters::new();

        counters.record_alloc(64, 8);
        counters.record_alloc(32, 64);
        counters.record_realloc(64, 128);
        counters.record_dealloc(32);
        counters.record_realloc(128, 16);

        assert_eq!(counters.current_bytes.load(Ordering::Relaxed), 16);
        assert_eq!(counters.peak_bytes.load(Ordering::Relaxed), 160);
        assert_eq!(counters.allocations.load(Ordering::Relaxed), 2);
        assert_eq!(counters.deallocations.load(Ordering::Relaxed), 1);
        assert_eq!(counters.reallocations.load(Ordering::Relaxed), 2);
        assert_eq!(counters.bytes_allocated.load(Ordering::Relaxed), 160);
        assert_eq!(counters.bytes_deallocated.load(Ordering::Relaxed), 144);
        assert_eq!(counters.over_aligned.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_underflow_is_ignored() {
        let counters = GlobalCounters::new();

        counters.record_dealloc(8);
        assert_eq!(counters.current_bytes.load(Ordering::Relaxed), 0);
    }
}
