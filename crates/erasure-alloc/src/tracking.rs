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

//! An implementation of `GlobalAlloc` that accounts for every allocation, process-wide
//! and per thread.

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::stats::GLOBAL;

static TRACKING_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Per-thread counters. Plain `Cell`s with no destructor: the thread local never
/// registers a dtor and accessing it never allocates, which the allocator relies on.
struct ThreadCounters {
    allocations: Cell<u64>,
    deallocations: Cell<u64>,
    live_bytes: Cell<isize>,
}

impl ThreadCounters {
    const fn new() -> Self {
        Self {
            allocations: Cell::new(0),
            deallocations: Cell::new(0),
            live_bytes: Cell::new(0),
        }
    }

    fn snapshot(&self) -> ThreadSnapshot {
        ThreadSnapshot {
            allocations: self.allocations.get(),
            deallocations: self.deallocations.get(),
            live_bytes: self.live_bytes.get(),
        }
    }
}

thread_local! {
    static THREAD: ThreadCounters = const { ThreadCounters::new() };
}

fn with_thread(f: impl FnOnce(&ThreadCounters)) {
    // Fails only while the thread is being torn down; those allocations go unaccounted
    let _ = THREAD.try_with(f);
}

fn on_alloc(layout: Layout) {
    TRACKING_ACTIVE.store(true, Ordering::Relaxed);
    GLOBAL.record_alloc(layout.size(), layout.align());
    with_thread(|t| {
        t.allocations.set(t.allocations.get() + 1);
        t.live_bytes
            .set(t.live_bytes.get().wrapping_add_unsigned(layout.size()));
    });
}

fn on_dealloc(layout: Layout) {
    GLOBAL.record_dealloc(layout.size());
    with_thread(|t| {
        t.deallocations.set(t.deallocations.get() + 1);
        t.live_bytes
            .set(t.live_bytes.get().wrapping_sub_unsigned(layout.size()));
    });
}

fn on_realloc(old_size: usize, new_size: usize) {
    GLOBAL.record_realloc(old_size, new_size);
    with_thread(|t| {
        let live = t
            .live_bytes
            .get()
            .wrapping_sub_unsigned(old_size)
            .wrapping_add_unsigned(new_size);
        t.live_bytes.set(live);
    });
}

/// A wrapper around a `GlobalAlloc` implementation (like `std::alloc::System`) that
/// updates the counters of [`stats`](crate::stats) and of the calling thread on every
/// allocation call.
///
/// Registering it as the `#[global_allocator]` of a test binary lets tests check, with
/// [`AllocationScope`], that a piece of code releases everything it allocates.
///
/// # Type Parameters
///
/// * `A`: The underlying allocator that performs the actual allocation.
///   Defaults to `System`, the standard Rust allocator.
///
/// # Usage
///
/// ```rust,ignore
/// use erasure_alloc::TrackingAllocator;
///
/// #[global_allocator]
/// static GLOBAL: TrackingAllocator = TrackingAllocator::new(std::alloc::System);
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct TrackingAllocator<A = System> {
    inner: A,
}

impl<A> TrackingAllocator<A> {
    /// Creates a new tracking allocator that wraps the given inner allocator.
    pub const fn new(inner: A) -> Self {
        Self { inner }
    }
}

unsafe impl<A: GlobalAlloc> GlobalAlloc for TrackingAllocator<A> {
    /// Allocates memory and updates the counters if the allocation succeeded.
    ///
    /// # Safety
    ///
    /// Same contract as [`GlobalAlloc::alloc`]: `layout` must have a non-zero size.
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc(layout);
        if !ptr.is_null() {
            on_alloc(layout);
        }
        ptr
    }

    /// Deallocates memory and updates the counters.
    ///
    /// # Safety
    ///
    /// Same contract as [`GlobalAlloc::dealloc`]: `ptr` must have been allocated by this
    /// allocator with the same `layout`.
    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        on_dealloc(layout);
        self.inner.dealloc(ptr, layout);
    }

    /// Allocates zero-initialized memory and updates the counters if the allocation succeeded.
    ///
    /// # Safety
    ///
    /// Same contract as [`GlobalAlloc::alloc_zeroed`].
    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc_zeroed(layout);
        if !ptr.is_null() {
            on_alloc(layout);
        }
        ptr
    }

    /// Reallocates memory and updates the counters if the reallocation succeeded.
    ///
    /// # Safety
    ///
    /// Same contract as [`GlobalAlloc::realloc`].
    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = self.inner.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            on_realloc(layout.size(), new_size);
        }
        new_ptr
    }
}

/// Returns `true` once at least one allocation has gone through a [`TrackingAllocator`].
///
/// Tests use it to make sure the allocator is actually registered before trusting an
/// [`AllocationScope`] that reports nothing.
pub fn is_tracking() -> bool {
    TRACKING_ACTIVE.load(Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy)]
struct ThreadSnapshot {
    allocations: u64,
    deallocations: u64,
    live_bytes: isize,
}

fn thread_snapshot() -> ThreadSnapshot {
    THREAD
        .try_with(ThreadCounters::snapshot)
        .unwrap_or(ThreadSnapshot {
            allocations: 0,
            deallocations: 0,
            live_bytes: 0,
        })
}

/// Measures the allocations made by the current thread from the moment it begins.
///
/// Only allocations of the calling thread are counted, so scopes in parallel tests do
/// not see each other. A scope compares against the counters of the thread that began
/// it, so it cannot be sent to another thread:
///
/// ```compile_fail
/// use erasure_alloc::AllocationScope;
///
/// let scope = AllocationScope::begin();
/// std::thread::spawn(move || scope.report());
/// ```
#[derive(Debug)]
pub struct AllocationScope {
    start: ThreadSnapshot,
    _not_send: PhantomData<*const ()>,
}

/// What happened on a thread between [`AllocationScope::begin`] and
/// [`AllocationScope::report`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeReport {
    /// Number of successful allocations.
    pub allocations: u64,
    /// Number of deallocations.
    pub deallocations: u64,
    /// Bytes allocated minus bytes released.
    pub net_bytes: isize,
}

impl ScopeReport {
    /// Allocations made minus allocations released.
    pub fn net_allocations(&self) -> i64 {
        self.allocations as i64 - self.deallocations as i64
    }

    /// Returns `true` if everything allocated in the scope was released.
    pub fn is_balanced(&self) -> bool {
        self.net_bytes == 0 && self.net_allocations() == 0
    }
}

impl AllocationScope {
    /// Starts measuring on the current thread.
    pub fn begin() -> Self {
        Self {
            start: thread_snapshot(),
            _not_send: PhantomData,
        }
    }

    /// Returns the counts accumulated since [`begin`](Self::begin). Can be called several
    /// times; each report covers the whole scope so far.
    pub fn report(&self) -> ScopeReport {
        let now = thread_snapshot();
        ScopeReport {
            allocations: now.allocations - self.start.allocations,
            deallocations: now.deallocations - self.start.deallocations,
            net_bytes: now.live_bytes.wrapping_sub(self.start.live_bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::memory_stats;
    use std::hint::black_box;

    #[test]
    fn test_tracking_is_installed() {
        drop(black_box(Box::new(1u8)));
        assert!(is_tracking());
    }

    #[test]
    fn test_scope_sees_allocation_and_release() {
        let scope = AllocationScope::begin();
        let values = black_box(vec![0u64; 16]);

        let report = scope.report();
        assert_eq!(report.allocations, 1);
        assert_eq!(report.deallocations, 0);
        assert_eq!(report.net_bytes, 128);
        assert!(!report.is_balanced());

        drop(values);
        let report = scope.report();
        assert_eq!(report.deallocations, 1);
        assert!(report.is_balanced(), "{report:?}");
    }

    #[test]
    fn test_scope_tracks_realloc() {
        let scope = AllocationScope::begin();
        let mut values: Vec<u8> = Vec::with_capacity(8);
        values.extend_from_slice(&[1; 8]);
        values.reserve_exact(56);
        assert_eq!(scope.report().net_bytes, values.capacity() as isize);

        values.shrink_to_fit();
        assert_eq!(scope.report().net_bytes, 8);

        drop(black_box(values));
        assert!(scope.report().is_balanced());
    }

    #[test]
    fn test_scope_is_per_thread() {
        let kept = black_box(vec![1u8; 4096]);
        let report = std::thread::spawn(|| {
            let scope = AllocationScope::begin();
            let local = black_box(vec![1u8; 32]);
            let report = scope.report();
            drop(local);
            report
        })
        .join()
        .unwrap();

        // The spawning thread's live buffer never shows up in the child's scope
        assert_eq!(report.allocations, 1);
        assert_eq!(report.net_bytes, 32);
        drop(kept);
    }

    #[test]
    fn test_over_aligned_counted() {
        #[repr(align(64))]
        struct Wide([u8; 64]);

        let before = memory_stats().over_aligned_allocations;
        let wide = black_box(Box::new(Wide([7; 64])));
        assert!(memory_stats().over_aligned_allocations > before);
        assert_eq!(wide.0[63], 7);
    }

    #[test]
    fn test_net_allocations() {
        let report = ScopeReport {
            allocations: 5,
            deallocations: 7,
            net_bytes: -12,
        };
        assert_eq!(report.net_allocations(), -2);
        assert!(!report.is_balanced());
    }
}
