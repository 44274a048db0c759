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

//! Errors raised while erasing a value or converting between erased pointers.

use alloc::alloc::{handle_alloc_error, Layout};
use core::fmt;

/// An error produced by the fallible constructors and conversions of this crate.
///
/// Reification never fails at runtime: naming the wrong type is undefined behaviour
/// and is ruled out by the `# Safety` contract of each `reify_*` method instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseError {
    /// The heap block needed to store the value (header plus value) does not fit in
    /// `isize::MAX` bytes.
    LayoutOverflow {
        /// Size of the value being erased, in bytes.
        size: usize,
        /// Alignment of the value being erased, in bytes.
        align: usize,
    },
    /// The global allocator could not satisfy the request.
    AllocFailed {
        /// The layout that was requested.
        layout: Layout,
    },
    /// A null erased pointer was converted into a non-null one.
    NullPointer,
}

impl EraseError {
    /// Diverges the way `alloc` itself does for the same failure: the allocation
    /// error handler for exhausted memory, a panic otherwise.
    pub(crate) fn raise(self) -> ! {
        log::error!("{self}");
        match self {
            EraseError::AllocFailed { layout } => handle_alloc_error(layout),
            other => panic!("{other}"),
        }
    }
}

impl fmt::Display for EraseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EraseError::LayoutOverflow { size, align } => {
                write!(
                    f,
                    "Erased block for a value of {size} bytes (align {align}) overflows isize"
                )
            }
            EraseError::AllocFailed { layout } => {
                write!(
                    f,
                    "Failed to allocate {} bytes (align {}) for an erased value",
                    layout.size(),
                    layout.align()
                )
            }
            EraseError::NullPointer => write!(f, "Erased pointer is null"),
        }
    }
}

impl core::error::Error for EraseError {}
