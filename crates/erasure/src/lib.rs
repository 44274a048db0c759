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

//! # Erasure
//!
//! Type-erased containers for possibly unsized values: boxes, raw pointers and
//! references whose static type no longer names the type they point to.
//!
//! Erasing is always safe. Getting the value back ("reifying") is `unsafe`, because only
//! the caller knows which type was stored; naming any other type is undefined behaviour.
//!
//! | Type               | Owns the value | Width      |
//! |--------------------|----------------|------------|
//! | [`ErasedBox`]      | yes            | 3 pointers |
//! | [`ThinErasedBox`]  | yes            | 1 pointer  |
//! | [`ErasedPtr`]      | no             | 3 pointers |
//! | [`ErasedNonNull`]  | no             | 3 pointers |
//! | [`ErasedRef`]      | no (borrows)   | 3 pointers |
//! | [`ErasedMut`]      | no (borrows)   | 3 pointers |
//!
//! ```
//! use erasure::{ErasedRef, ThinErasedBox};
//!
//! let erased: ThinErasedBox = String::from("hello").into_boxed_str().into();
//! // SAFETY: the box was created from a `Box<str>`
//! assert_eq!(unsafe { erased.reify_ref::<str>() }, "hello");
//!
//! let numbers = [1, 2, 3];
//! let erased = ErasedRef::new(&numbers[..]);
//! // SAFETY: the reference was created from a `&[i32]`
//! assert_eq!(unsafe { erased.reify_ref::<[i32]>() }.len(), 3);
//! ```

#![no_std]
#![feature(ptr_metadata, layout_for_ptr)]
#![warn(missing_docs)]

extern crate alloc;

pub mod ebox;
pub mod eptr;
pub mod eref;
pub mod error;
mod meta;
pub mod thin_ebox;

pub use ebox::ErasedBox;
pub use eptr::{ErasedNonNull, ErasedPtr};
pub use eref::{ErasedMut, ErasedRef};
pub use error::EraseError;
pub use thin_ebox::ThinErasedBox;
