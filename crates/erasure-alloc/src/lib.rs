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

//! # Erasure Alloc
//!
//! Allocation accounting for test binaries. Register [`TrackingAllocator`] as the global
//! allocator, then use [`AllocationScope`] to check that a piece of code releases
//! everything it allocates, or [`memory_stats`] for process-wide totals.
//!
//! The erased containers of the `erasure` crate manage their heap blocks by hand; their
//! tests run under this allocator to prove every block and every boxed metadata is freed.

#![warn(missing_docs)]

pub mod stats;
pub mod tracking;

pub use stats::{current_allocated_bytes, memory_stats, MemoryStats};
pub use tracking::{is_tracking, AllocationScope, ScopeReport, TrackingAllocator};

#[cfg(test)]
#[global_allocator]
static ALLOCATOR: TrackingAllocator = TrackingAllocator::new(std::alloc::System);
