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

//! Erased reference types, all three pointers wide.

use core::fmt;
use core::marker::PhantomData;

use crate::ErasedNonNull;

/// An erased reference, referencing a (possibly unsized) value of unknown type. Creating one is
/// safe, but converting it back into any type is unsafe as it requires the user to know the type
/// stored behind the reference.
///
/// This type is always three pointers wide, even for sized types, because the metadata of an
/// unknown type has to be boxed separately.
#[derive(Clone)]
pub struct ErasedRef<'a> {
    ptr: ErasedNonNull,
    _phantom: PhantomData<&'a ()>,
}

impl<'a> ErasedRef<'a> {
    /// Creates a new `ErasedRef` from a reference.
    pub fn new<T: ?Sized>(val: &'a T) -> ErasedRef<'a> {
        ErasedRef {
            ptr: ErasedNonNull::from(val),
            _phantom: PhantomData,
        }
    }

    /// Returns the internal erased pointer of this reference.
    pub fn as_ptr(&self) -> &ErasedNonNull {
        &self.ptr
    }

    /// Returns the reference stored in this `ErasedRef`.
    ///
    /// # Safety
    ///
    /// The provided `T` must be the same type as originally stored in the reference.
    pub unsafe fn reify_ref<T: ?Sized>(&self) -> &'a T {
        // SAFETY: The pointer came from a `&'a T`, by contract of the same type
        unsafe { self.ptr.reify_ptr::<T>().as_ref() }
    }
}

impl<'a, T: ?Sized> From<&'a T> for ErasedRef<'a> {
    fn from(val: &'a T) -> Self {
        ErasedRef::new(val)
    }
}

impl fmt::Pointer for ErasedRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.ptr, f)
    }
}

impl fmt::Debug for ErasedRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedRef")
            .field("ptr", &self.ptr)
            .finish_non_exhaustive()
    }
}

/// An erased mutable reference, referencing a (possibly unsized) value of unknown type. Creating
/// one is safe, but converting it back into any type is unsafe as it requires the user to know the
/// type stored behind the reference.
///
/// This type is always three pointers wide, even for sized types, because the metadata of an
/// unknown type has to be boxed separately.
pub struct ErasedMut<'a> {
    ptr: ErasedNonNull,
    _phantom: PhantomData<&'a mut ()>,
}

impl<'a> ErasedMut<'a> {
    /// Creates a new `ErasedMut` from a mutable reference.
    pub fn new<T: ?Sized>(val: &'a mut T) -> ErasedMut<'a> {
        ErasedMut {
            ptr: ErasedNonNull::from(val),
            _phantom: PhantomData,
        }
    }

    /// Returns the internal erased pointer of this reference.
    pub fn as_ptr(&self) -> &ErasedNonNull {
        &self.ptr
    }

    /// Returns a shared reference to the value behind this `ErasedMut`.
    ///
    /// # Safety
    ///
    /// The provided `T` must be the same type as originally stored in the reference.
    pub unsafe fn reify_ref<T: ?Sized>(&self) -> &T {
        // SAFETY: Shared access for the lifetime of `&self`, type matches by contract
        unsafe { self.ptr.reify_ptr::<T>().as_ref() }
    }

    /// Returns the mutable reference stored in this `ErasedMut`.
    ///
    /// # Safety
    ///
    /// The provided `T` must be the same type as originally stored in the reference.
    pub unsafe fn reify_mut<T: ?Sized>(&mut self) -> &mut T {
        // SAFETY: Unique access for the lifetime of `&mut self`, type matches by contract
        unsafe { self.ptr.reify_ptr::<T>().as_mut() }
    }

    /// Converts this `ErasedMut` back into the mutable reference it was created from.
    ///
    /// # Safety
    ///
    /// The provided `T` must be the same type as originally stored in the reference.
    pub unsafe fn into_mut<T: ?Sized>(self) -> &'a mut T {
        // SAFETY: `self` is consumed, so the unique borrow moves to the returned reference
        unsafe { self.ptr.reify_ptr::<T>().as_mut() }
    }

    /// Reborrows this reference for a shorter lifetime, leaving `self` usable afterwards.
    pub fn reborrow(&mut self) -> ErasedMut<'_> {
        ErasedMut {
            ptr: self.ptr.clone(),
            _phantom: PhantomData,
        }
    }

    /// Returns a shared erased reference to the same value, borrowing `self`.
    pub fn as_erased_ref(&self) -> ErasedRef<'_> {
        ErasedRef {
            ptr: self.ptr.clone(),
            _phantom: PhantomData,
        }
    }

    /// Downgrades this reference into a shared erased reference for the full lifetime.
    pub fn into_erased_ref(self) -> ErasedRef<'a> {
        ErasedRef {
            ptr: self.ptr,
            _phantom: PhantomData,
        }
    }
}

impl<'a, T: ?Sized> From<&'a mut T> for ErasedMut<'a> {
    fn from(val: &'a mut T) -> Self {
        ErasedMut::new(val)
    }
}

impl fmt::Pointer for ErasedMut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.ptr, f)
    }
}

impl fmt::Debug for ErasedMut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedMut")
            .field("ptr", &self.ptr)
            .finish_non_exhaustive()
    }
}
