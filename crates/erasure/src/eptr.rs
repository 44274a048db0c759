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

//! Erased pointer types, all three pointers wide.

use core::fmt;
use core::mem::ManuallyDrop;
use core::ptr::{self, NonNull};

use crate::meta::BoxedMeta;
use crate::EraseError;

/// An erased pointer, pointing to a (possibly unsized) value of unknown type. Creating one
/// is safe, but converting it back into any type is unsafe as it requires the user to know the
/// type stored behind the pointer.
///
/// This type is always three pointers wide, even for sized types, because the metadata of an
/// unknown type has to be boxed separately. Dropping it frees that metadata, never the pointee.
///
/// Note that, like [`NonNull`], this type provides `From<&T>`. This has the same invariants as
/// [`NonNull`]: it is UB to mutate through a pointer derived from a shared reference.
#[derive(Clone)]
pub struct ErasedPtr {
    data: *const (),
    meta: BoxedMeta,
}

impl ErasedPtr {
    /// Creates a new `ErasedPtr` from an existing [`*const T`](pointer).
    pub fn new<T: ?Sized>(val: *const T) -> ErasedPtr {
        let (data, meta) = val.to_raw_parts();

        ErasedPtr {
            data,
            meta: BoxedMeta::new::<T>(meta),
        }
    }

    /// Returns the raw pointer to the contained data.
    pub fn raw_ptr(&self) -> *const () {
        self.data
    }

    /// Returns the raw pointer to the contained data, as a mutable pointer.
    pub fn raw_ptr_mut(&self) -> *mut () {
        self.data.cast_mut()
    }

    /// Returns the raw pointer to the boxed metadata of the contained data.
    pub fn raw_meta_ptr(&self) -> NonNull<()> {
        self.meta.as_ptr()
    }

    /// Returns `true` if the data pointer is null.
    pub fn is_null(&self) -> bool {
        self.data.is_null()
    }

    /// Returns a pointer to the value behind this `ErasedPtr`.
    ///
    /// # Safety
    ///
    /// The provided `T` must be the same type as originally stored in the pointer.
    pub unsafe fn reify_ptr<T: ?Sized>(&self) -> *const T {
        // SAFETY: Forwarded from the caller
        ptr::from_raw_parts(self.data, unsafe { self.meta.get::<T>() })
    }

    /// Returns a mutable pointer to the value behind this `ErasedPtr`.
    ///
    /// # Safety
    ///
    /// The provided `T` must be the same type as originally stored in the pointer.
    pub unsafe fn reify_ptr_mut<T: ?Sized>(&self) -> *mut T {
        // SAFETY: Forwarded from the caller
        ptr::from_raw_parts_mut(self.raw_ptr_mut(), unsafe { self.meta.get::<T>() })
    }
}

impl fmt::Pointer for ErasedPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.data, f)
    }
}

impl fmt::Debug for ErasedPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedPtr")
            .field("data", &self.data)
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

impl<T: ?Sized> From<*const T> for ErasedPtr {
    fn from(val: *const T) -> Self {
        ErasedPtr::new(val)
    }
}

impl<T: ?Sized> From<*mut T> for ErasedPtr {
    fn from(val: *mut T) -> Self {
        ErasedPtr::new(val.cast_const())
    }
}

impl<T: ?Sized> From<&T> for ErasedPtr {
    fn from(val: &T) -> Self {
        ErasedPtr::new(val as *const T)
    }
}

impl<T: ?Sized> From<&mut T> for ErasedPtr {
    fn from(val: &mut T) -> Self {
        ErasedPtr::new(val as *mut T as *const T)
    }
}

impl From<ErasedNonNull> for ErasedPtr {
    fn from(val: ErasedNonNull) -> Self {
        let val = ManuallyDrop::new(val);
        ErasedPtr {
            data: val.data.as_ptr().cast_const(),
            // SAFETY: `val` is never dropped, so the metadata is moved rather than duplicated
            meta: unsafe { ptr::read(&val.meta) },
        }
    }
}

/// An erased non-null pointer, pointing to a (possibly unsized) value of unknown type. Creating
/// one is safe, but converting it back into any type is unsafe as it requires the user to know
/// the type stored behind the pointer.
///
/// This type is always three pointers wide, even for sized types, because the metadata of an
/// unknown type has to be boxed separately.
///
/// Note that, like [`NonNull`], this type provides `From<&T>`. This has the same invariants as
/// [`NonNull`]: it is UB to mutate through a pointer derived from a shared reference.
#[derive(Clone)]
pub struct ErasedNonNull {
    data: NonNull<()>,
    meta: BoxedMeta,
}

impl ErasedNonNull {
    /// Creates a new `ErasedNonNull` from a [`NonNull<T>`](NonNull).
    pub fn new<T: ?Sized>(val: NonNull<T>) -> ErasedNonNull {
        let (data, meta) = val.to_raw_parts();

        ErasedNonNull {
            data,
            meta: BoxedMeta::new::<T>(meta),
        }
    }

    /// Returns the raw pointer to the contained data.
    pub fn raw_ptr(&self) -> NonNull<()> {
        self.data
    }

    /// Returns the raw pointer to the boxed metadata of the contained data.
    pub fn raw_meta_ptr(&self) -> NonNull<()> {
        self.meta.as_ptr()
    }

    /// Returns the pointer stored in this `ErasedNonNull`.
    ///
    /// # Safety
    ///
    /// The provided `T` must be the same type as originally stored in the pointer.
    pub unsafe fn reify_ptr<T: ?Sized>(&self) -> NonNull<T> {
        // SAFETY: Forwarded from the caller
        NonNull::from_raw_parts(self.data, unsafe { self.meta.get::<T>() })
    }
}

impl fmt::Pointer for ErasedNonNull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.data, f)
    }
}

impl fmt::Debug for ErasedNonNull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedNonNull")
            .field("data", &self.data)
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

impl<T: ?Sized> From<NonNull<T>> for ErasedNonNull {
    fn from(val: NonNull<T>) -> Self {
        ErasedNonNull::new(val)
    }
}

impl<T: ?Sized> From<&T> for ErasedNonNull {
    fn from(val: &T) -> Self {
        ErasedNonNull::new(NonNull::from(val))
    }
}

impl<T: ?Sized> From<&mut T> for ErasedNonNull {
    fn from(val: &mut T) -> Self {
        ErasedNonNull::new(NonNull::from(val))
    }
}

impl TryFrom<ErasedPtr> for ErasedNonNull {
    type Error = EraseError;

    fn try_from(val: ErasedPtr) -> Result<Self, Self::Error> {
        let data = NonNull::new(val.raw_ptr_mut()).ok_or(EraseError::NullPointer)?;
        let val = ManuallyDrop::new(val);
        Ok(ErasedNonNull {
            data,
            // SAFETY: `val` is never dropped, so the metadata is moved rather than duplicated
            meta: unsafe { ptr::read(&val.meta) },
        })
    }
}
