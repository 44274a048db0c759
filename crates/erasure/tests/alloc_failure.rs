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

//! The fallible constructors of `ThinErasedBox` report allocator failures instead of
//! diverging, and release everything they were handed.

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::ptr::{self, NonNull};
use std::rc::Rc;

use erasure::{EraseError, ThinErasedBox};
use erasure_alloc::{AllocationScope, TrackingAllocator};

/// A tracking allocator that returns null while the current thread asks it to.
struct FailingAllocator {
    inner: TrackingAllocator<System>,
}

thread_local! {
    static FAIL_ALLOCATIONS: Cell<bool> = const { Cell::new(false) };
}

fn should_fail() -> bool {
    FAIL_ALLOCATIONS.try_with(Cell::get).unwrap_or(false)
}

unsafe impl GlobalAlloc for FailingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if should_fail() {
            return ptr::null_mut();
        }
        self.inner.alloc(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        self.inner.dealloc(ptr, layout)
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if should_fail() {
            return ptr::null_mut();
        }
        self.inner.alloc_zeroed(layout)
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if should_fail() {
            return ptr::null_mut();
        }
        self.inner.realloc(ptr, layout, new_size)
    }
}

#[global_allocator]
static ALLOCATOR: FailingAllocator = FailingAllocator {
    inner: TrackingAllocator::new(System),
};

// --- HELPERS ---

/// Runs `f` with every allocation of the current thread failing.
fn with_failing_allocations<R>(f: impl FnOnce() -> R) -> R {
    FAIL_ALLOCATIONS.with(|fail| fail.set(true));
    let result = f();
    FAIL_ALLOCATIONS.with(|fail| fail.set(false));
    result
}

/// Layout of a block holding a drop function, `meta` and then `value`.
fn expected_block(meta: Layout, value: Layout) -> Layout {
    let (header, _) = Layout::new::<unsafe fn(NonNull<()>)>().extend(meta).unwrap();
    let (block, _) = header.pad_to_align().extend(value).unwrap();
    block.pad_to_align()
}

struct DropCounter(Rc<Cell<usize>>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.set(self.0.get() + 1);
    }
}

// --- TESTS ---

#[test]
fn test_try_new_reports_alloc_failure() {
    let scope = AllocationScope::begin();
    let result = with_failing_allocations(|| ThinErasedBox::try_new([3u64; 4]));

    assert_eq!(
        result.unwrap_err(),
        EraseError::AllocFailed {
            layout: expected_block(Layout::new::<()>(), Layout::new::<[u64; 4]>()),
        }
    );
    assert!(scope.report().is_balanced());
}

#[test]
fn test_try_new_drops_value_on_failure() {
    let drops = Rc::new(Cell::new(0));
    let value = DropCounter(drops.clone());

    let result = with_failing_allocations(|| ThinErasedBox::try_new(value));
    assert!(matches!(result, Err(EraseError::AllocFailed { .. })));
    assert_eq!(drops.get(), 1);
}

#[test]
fn test_try_from_box_reports_alloc_failure() {
    let values = vec![1u16, 2, 3].into_boxed_slice();

    let scope = AllocationScope::begin();
    let result = with_failing_allocations(|| ThinErasedBox::try_from_box(values));

    assert_eq!(
        result.unwrap_err(),
        EraseError::AllocFailed {
            layout: expected_block(Layout::new::<usize>(), Layout::new::<[u16; 3]>()),
        }
    );
    // The source box was freed and nothing else is left behind
    let report = scope.report();
    assert_eq!(report.allocations, 0);
    assert_eq!(report.deallocations, 1);
    assert_eq!(report.net_bytes, -(std::mem::size_of::<[u16; 3]>() as isize));
}

#[test]
fn test_try_from_box_drops_source_on_failure() {
    let drops = Rc::new(Cell::new(0));
    let boxed = Box::new(DropCounter(drops.clone()));

    let result = with_failing_allocations(|| ThinErasedBox::try_from_box(boxed));
    assert!(matches!(result, Err(EraseError::AllocFailed { .. })));
    assert_eq!(drops.get(), 1);
}

#[test]
fn test_allocations_succeed_again_after_failure() {
    let failed = with_failing_allocations(|| ThinErasedBox::try_new(7u32));
    assert!(failed.is_err());

    let tb = ThinErasedBox::try_new(7u32).unwrap();
    assert_eq!(unsafe { *tb.reify_ref::<u32>() }, 7);
}
