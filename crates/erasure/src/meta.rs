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

//! Heap storage for the pointer metadata of a forgotten type.
//!
//! The size of `<T as Pointee>::Metadata` depends on `T`, so once `T` is erased the
//! metadata cannot live inline. It is moved into its own allocation instead, and
//! only ever read back through the `T` it was created for.

use alloc::boxed::Box;
use core::fmt;
use core::ptr::{NonNull, Pointee};

/// Moves `meta` to the heap and returns an untyped pointer to it.
pub(crate) fn leak<T: ?Sized>(meta: <T as Pointee>::Metadata) -> NonNull<()> {
    NonNull::from(Box::leak(Box::new(meta))).cast()
}

/// Reads back a metadata value created by [`leak`].
///
/// # Safety
///
/// `meta` must come from `leak::<T>` and must not have been freed.
pub(crate) unsafe fn read<T: ?Sized>(meta: NonNull<()>) -> <T as Pointee>::Metadata {
    // SAFETY: By contract the allocation holds a live `T::Metadata`
    unsafe { *meta.cast::<<T as Pointee>::Metadata>().as_ref() }
}

/// Frees a metadata value created by [`leak`].
///
/// # Safety
///
/// `meta` must come from `leak::<T>` and must not be used afterwards.
pub(crate) unsafe fn free<T: ?Sized>(meta: NonNull<()>) {
    // SAFETY: By contract the allocation came from `Box::leak` of a `T::Metadata`
    drop(unsafe { Box::from_raw(meta.cast::<<T as Pointee>::Metadata>().as_ptr()) });
}

unsafe fn duplicate<T: ?Sized>(meta: NonNull<()>) -> NonNull<()> {
    // SAFETY: Same contract as `read`, forwarded from `MetaVTable::clone`
    leak::<T>(unsafe { read::<T>(meta) })
}

/// The type-specific operations needed to manage a boxed metadata value after its
/// type has been erased.
pub(crate) struct MetaVTable {
    free: unsafe fn(NonNull<()>),
    duplicate: unsafe fn(NonNull<()>) -> NonNull<()>,
}

impl MetaVTable {
    fn of<T: ?Sized>() -> &'static MetaVTable {
        &MetaVTable {
            free: free::<T>,
            duplicate: duplicate::<T>,
        }
    }
}

/// An owned, boxed pointer metadata of an erased type. Two pointers wide.
pub(crate) struct BoxedMeta {
    ptr: NonNull<()>,
    vtable: &'static MetaVTable,
}

impl BoxedMeta {
    /// Boxes the metadata of a `T` pointer.
    pub(crate) fn new<T: ?Sized>(meta: <T as Pointee>::Metadata) -> BoxedMeta {
        BoxedMeta {
            ptr: leak::<T>(meta),
            vtable: MetaVTable::of::<T>(),
        }
    }

    /// Address of the boxed metadata value.
    pub(crate) fn as_ptr(&self) -> NonNull<()> {
        self.ptr
    }

    /// # Safety
    ///
    /// `T` must be the type this metadata was boxed for.
    pub(crate) unsafe fn get<T: ?Sized>(&self) -> <T as Pointee>::Metadata {
        // SAFETY: `ptr` is live for as long as `self`, and `T` matches by contract
        unsafe { read::<T>(self.ptr) }
    }
}

impl Clone for BoxedMeta {
    fn clone(&self) -> Self {
        BoxedMeta {
            // SAFETY: The vtable was built for the type `ptr` was leaked with
            ptr: unsafe { (self.vtable.duplicate)(self.ptr) },
            vtable: self.vtable,
        }
    }
}

impl fmt::Debug for BoxedMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.ptr, f)
    }
}

impl Drop for BoxedMeta {
    fn drop(&mut self) {
        // SAFETY: The vtable was built for the type `ptr` was leaked with, and `ptr` is
        //         never used again
        unsafe { (self.vtable.free)(self.ptr) }
    }
}
