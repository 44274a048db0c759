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

//! The standard erased box: three pointers wide, with a simple implementation.

use alloc::boxed::Box;
use core::fmt;
use core::mem::ManuallyDrop;
use core::ptr::NonNull;

use crate::meta;

/// # Safety
///
/// `data` and `meta` must be the parts of a `NonNull<T>` stored by an `ErasedBox`.
unsafe fn reify_ptr<T: ?Sized>(data: NonNull<()>, meta: NonNull<()>) -> NonNull<T> {
    // SAFETY: `meta` was leaked for this `T` by `ErasedBox::from_raw`
    NonNull::from_raw_parts(data, unsafe { meta::read::<T>(meta) })
}

/// # Safety
///
/// Same as [`reify_ptr`]. Ownership of both allocations moves to the returned box.
unsafe fn reify_box<T: ?Sized>(data: NonNull<()>, meta: NonNull<()>) -> Box<T> {
    // SAFETY: Forwarded from the caller
    let ptr = unsafe { reify_ptr::<T>(data, meta) };
    // SAFETY: The metadata has been copied out and is not used again
    unsafe { meta::free::<T>(meta) };
    // SAFETY: `ptr` came from `Box::leak` or satisfies `from_raw`'s contract
    unsafe { Box::from_raw(ptr.as_ptr()) }
}

unsafe fn drop_erased<T: ?Sized>(data: NonNull<()>, meta: NonNull<()>) {
    // SAFETY: Only ever installed by `ErasedBox::from_raw::<T>`
    drop(unsafe { reify_box::<T>(data, meta) });
}

/// An erased box, storing a (possibly unsized) value of unknown type. Creating one is safe,
/// but converting it back into any type is unsafe as it requires the user to know the type
/// stored in the box.
///
/// This box is always three pointers wide, even for sized types, because the metadata of an
/// unknown type has to be boxed separately. For a box that is always one pointer wide, see
/// [`ThinErasedBox`](crate::ThinErasedBox).
///
/// # Examples
///
/// ```
/// use erasure::ErasedBox;
///
/// let mut erased = ErasedBox::from(vec![1u8, 2, 3].into_boxed_slice());
/// // SAFETY: the box was created from a `Box<[u8]>`
/// unsafe { erased.reify_mut::<[u8]>()[0] = 9 };
/// assert_eq!(unsafe { erased.reify_ref::<[u8]>() }, [9, 2, 3]);
/// ```
pub struct ErasedBox {
    data: NonNull<()>,
    meta: NonNull<()>,
    drop: unsafe fn(NonNull<()>, NonNull<()>),
}

impl ErasedBox {
    /// Creates a new `ErasedBox` from a value.
    pub fn new<T>(val: T) -> ErasedBox {
        ErasedBox::from(Box::new(val))
    }

    /// Creates a new `ErasedBox` that takes ownership of an existing allocation.
    ///
    /// # Safety
    ///
    /// The pointer must be valid, and the allocation must be one that can later be passed to
    /// [`Box::from_raw`]. Ownership of the pointee moves into the returned box.
    pub unsafe fn from_raw<T: ?Sized>(val: NonNull<T>) -> ErasedBox {
        let (data, meta) = val.to_raw_parts();

        ErasedBox {
            data,
            meta: meta::leak::<T>(meta),
            drop: drop_erased::<T>,
        }
    }

    /// Returns the raw pointer to the contained data.
    pub fn raw_ptr(&self) -> NonNull<()> {
        self.data
    }

    /// Returns the raw pointer to the boxed metadata of the contained data.
    pub fn raw_meta_ptr(&self) -> NonNull<()> {
        self.meta
    }

    /// Returns a pointer to the value stored in this `ErasedBox`.
    ///
    /// # Safety
    ///
    /// The provided `T` must be the same type as originally stored in the box.
    pub unsafe fn reify_ptr<T: ?Sized>(&self) -> NonNull<T> {
        // SAFETY: Forwarded from the caller
        unsafe { reify_ptr(self.data, self.meta) }
    }

    /// Converts an `ErasedBox` back into a [`Box`] of the provided type.
    ///
    /// # Safety
    ///
    /// The provided `T` must be the same type as originally stored in the box.
    pub unsafe fn reify_box<T: ?Sized>(self) -> Box<T> {
        // The value moves out, so our own drop must not run
        let this = ManuallyDrop::new(self);
        // SAFETY: Forwarded from the caller, and `this` is never used again
        unsafe { reify_box(this.data, this.meta) }
    }

    /// Returns a reference to the value stored in this `ErasedBox`.
    ///
    /// # Safety
    ///
    /// The provided `T` must be the same type as originally stored in the box.
    pub unsafe fn reify_ref<T: ?Sized>(&self) -> &T {
        // SAFETY: The pointer is valid for the lifetime of `self`
        unsafe { self.reify_ptr::<T>().as_ref() }
    }

    /// Returns a mutable reference to the value stored in this `ErasedBox`.
    ///
    /// # Safety
    ///
    /// The provided `T` must be the same type as originally stored in the box.
    pub unsafe fn reify_mut<T: ?Sized>(&mut self) -> &mut T {
        // SAFETY: The pointer is valid and uniquely borrowed through `self`
        unsafe { self.reify_ptr::<T>().as_mut() }
    }
}

impl<T: ?Sized> From<Box<T>> for ErasedBox {
    fn from(b: Box<T>) -> Self {
        let val = NonNull::from(Box::leak(b));
        // SAFETY: We just got this pointer from `Box::leak`, it upholds the requirements
        unsafe { ErasedBox::from_raw(val) }
    }
}

impl fmt::Pointer for ErasedBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.data, f)
    }
}

impl fmt::Debug for ErasedBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedBox")
            .field("data", &self.data)
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

impl Drop for ErasedBox {
    fn drop(&mut self) {
        // SAFETY: `drop` was instantiated for the type stored in `data` and `meta`
        unsafe { (self.drop)(self.data, self.meta) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;
    use alloc::rc::Rc;
    use alloc::string::String;
    use alloc::vec;
    use core::cell::Cell;
    use core::mem;

    struct DropCounter(Rc<Cell<usize>>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn test_eb_drop() {
        ErasedBox::new::<i32>(1);
    }

    #[test]
    fn test_eb_three_pointers_wide() {
        assert_eq!(mem::size_of::<ErasedBox>(), 3 * mem::size_of::<usize>());
    }

    #[test]
    fn test_eb_reify_box() {
        let b = unsafe { ErasedBox::new::<u32>(1).reify_box::<u32>() };
        assert_eq!(*b, 1);
    }

    #[test]
    fn test_eb_reify_ref() {
        let eb = ErasedBox::new::<bool>(true);
        let val = unsafe { eb.reify_ref::<bool>() };
        assert!(*val);
    }

    #[test]
    fn test_eb_reify_mut() {
        let mut eb = ErasedBox::new::<f32>(1.5);
        let val = unsafe { eb.reify_mut::<f32>() };
        assert_eq!(*val, 1.5);
        *val = 2.5;
        let val2 = unsafe { eb.reify_mut::<f32>() };
        assert_eq!(*val2, 2.5);
    }

    #[test]
    fn test_eb_drop_runs_destructor_once() {
        let drops = Rc::new(Cell::new(0));
        let eb = ErasedBox::new(DropCounter(drops.clone()));
        assert_eq!(drops.get(), 0);
        drop(eb);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_eb_reify_box_transfers_ownership() {
        let drops = Rc::new(Cell::new(0));
        let b = unsafe { ErasedBox::new(DropCounter(drops.clone())).reify_box::<DropCounter>() };
        assert_eq!(drops.get(), 0, "reify_box must not drop the value");
        drop(b);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_eb_unsized_values() {
        let eb = ErasedBox::from(String::from("foo").into_boxed_str());
        assert_eq!(unsafe { eb.reify_ref::<str>() }, "foo");

        let eb = ErasedBox::from(vec![1u16, 2, 3].into_boxed_slice());
        assert_eq!(unsafe { eb.reify_ref::<[u16]>() }, [1, 2, 3]);

        let eb = ErasedBox::from(Box::new(7u8) as Box<dyn fmt::Debug>);
        assert_eq!(format!("{:?}", unsafe { eb.reify_ref::<dyn fmt::Debug>() }), "7");
    }

    #[test]
    fn test_eb_unsized_drop() {
        let drops = Rc::new(Cell::new(0));
        let items = vec![DropCounter(drops.clone()), DropCounter(drops.clone())];
        drop(ErasedBox::from(items.into_boxed_slice()));
        assert_eq!(drops.get(), 2);
    }

    #[test]
    fn test_eb_from_raw() {
        let raw = NonNull::from(Box::leak(Box::new([4i64, 5])));
        let eb = unsafe { ErasedBox::from_raw(raw) };
        assert_eq!(eb.raw_ptr(), raw.cast());
        assert_eq!(unsafe { *eb.reify_ref::<[i64; 2]>() }, [4, 5]);
    }

    #[test]
    fn test_eb_zst() {
        #[derive(Debug, PartialEq)]
        struct Unit;

        let eb = ErasedBox::new(Unit);
        assert_eq!(*unsafe { eb.reify_ref::<Unit>() }, Unit);
    }

    #[test]
    fn test_eb_debug() {
        let eb = ErasedBox::new(0u8);
        assert!(format!("{eb:?}").starts_with("ErasedBox"));
    }
}
