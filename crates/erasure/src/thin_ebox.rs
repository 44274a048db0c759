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

//! A thin erased box: one pointer wide, storing its metadata next to the value.
//!
//! Every `ThinErasedBox` owns a single heap block laid out as a `Block`:
//!
//! ```text
//! +----------------------+---------------+---------+-------------------+
//! | drop: unsafe fn      | meta: T::Meta | padding | data: T           |
//! +----------------------+---------------+---------+-------------------+
//!  `Header<T::Metadata>`, same offsets for every `T`
//! ```
//!
//! The drop function sits at offset zero whatever `T` is, so `Drop` can find it without
//! knowing the type. Once the drop function knows `T`, it reads the metadata and the
//! compiler computes every other offset from a `*mut Block<_, T>`.

use alloc::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use alloc::boxed::Box;
use core::fmt;
use core::mem::ManuallyDrop;
use core::ptr::{self, NonNull, Pointee};

use crate::EraseError;

type DropFn = unsafe fn(NonNull<()>);

/// The start of every block. Its layout only depends on the metadata type.
#[repr(C)]
struct Header<M> {
    drop: DropFn,
    meta: M,
}

/// The full heap block of a `ThinErasedBox` holding a `T`, with `M = <T as Pointee>::Metadata`.
///
/// `Block<M, T>` has the same pointer metadata as `T`, so `*mut T as *mut Block<M, T>`
/// is a plain pointer cast.
#[repr(C)]
struct Block<M, T: ?Sized> {
    header: Header<M>,
    data: T,
}

/// Pointer to the block holding a `T`. Carries the same metadata as `*mut T`.
type BlockPtr<T> = *mut Block<<T as Pointee>::Metadata, T>;

/// Layout of the block for a value with layout `value`. Matches the `#[repr(C)]` layout
/// of `Block<M, T>`.
fn block_layout<M>(value: Layout) -> Result<Layout, EraseError> {
    let (layout, _) = Layout::new::<Header<M>>()
        .extend(value)
        .map_err(|_| EraseError::LayoutOverflow {
            size: value.size(),
            align: value.align(),
        })?;
    Ok(layout.pad_to_align())
}

/// Views the block at `base` as a `Block` holding a `T`.
///
/// # Safety
///
/// `base` must point to a live block created for `T`.
unsafe fn block_ptr<T: ?Sized>(base: NonNull<()>) -> BlockPtr<T> {
    let header = base.as_ptr().cast::<Header<<T as Pointee>::Metadata>>();
    // SAFETY: Every block starts with an initialized `Header` for its own type
    let meta = unsafe { (*header).meta };
    ptr::from_raw_parts_mut::<T>(base.as_ptr(), meta) as BlockPtr<T>
}

/// Allocates an uninitialized block for a value of layout `value_layout` and writes its header.
fn allocate<T: ?Sized>(
    value_layout: Layout,
    meta: <T as Pointee>::Metadata,
) -> Result<BlockPtr<T>, EraseError> {
    let layout = block_layout::<<T as Pointee>::Metadata>(value_layout)?;

    // SAFETY: The layout is never zero-sized, it always holds at least a function pointer
    let base = NonNull::new(unsafe { alloc(layout) })
        .ok_or(EraseError::AllocFailed { layout })?
        .cast::<()>();
    log::trace!("Allocated thin erased block at {base:p} ({layout:?})");

    let block = ptr::from_raw_parts_mut::<T>(base.as_ptr(), meta) as BlockPtr<T>;
    // SAFETY: We just allocated this block with room for a header. Writing through the raw
    //         place avoids creating references to uninitialized memory
    unsafe {
        (&raw mut (*block).header).write(Header {
            drop: drop_block::<T>,
            meta,
        });
    }
    Ok(block)
}

/// Frees a block when dropped, including while unwinding out of the value's destructor.
struct BlockDealloc {
    base: NonNull<()>,
    layout: Layout,
}

impl Drop for BlockDealloc {
    fn drop(&mut self) {
        // SAFETY: The block was allocated with this layout and nothing uses it afterwards
        unsafe { dealloc(self.base.as_ptr().cast(), self.layout) };
        log::trace!("Freed thin erased block at {:p}", self.base);
    }
}

/// Drops the value stored in a block and frees the block.
///
/// # Safety
///
/// `base` must point to a live, fully initialized block created for `T`, and must not be used
/// afterwards.
unsafe fn drop_block<T: ?Sized>(base: NonNull<()>) {
    // SAFETY: Forwarded from the caller
    let block = unsafe { block_ptr::<T>(base) };
    // SAFETY: The block is live, so its metadata describes a valid allocation
    let layout = unsafe { Layout::for_value_raw(block) };
    let _dealloc = BlockDealloc { base, layout };
    // SAFETY: The value is initialized and dropped exactly once. The guard frees the block
    //         afterwards, even if this panics
    unsafe { ptr::drop_in_place(&raw mut (*block).data) };
}

/// An erased box, storing a (possibly unsized) value of unknown type. Creating one is safe,
/// but converting it back into any type is unsafe as it requires the user to know the type
/// stored in the box.
///
/// This box is always one pointer wide, storing the metadata on the heap alongside the
/// contained data. This requires more unsafety, but less indirection. For a simpler alternative,
/// take a look at [`ErasedBox`](crate::ErasedBox).
///
/// # Examples
///
/// ```
/// use erasure::ThinErasedBox;
/// use std::fmt::Display;
///
/// let erased = ThinErasedBox::from(Box::new(12.5f32) as Box<dyn Display>);
/// // SAFETY: the box was created from a `Box<dyn Display>`
/// let shown = unsafe { erased.reify_ref::<dyn Display>() }.to_string();
/// assert_eq!(shown, "12.5");
/// ```
pub struct ThinErasedBox {
    /// Start of a `Block` of the type this box was created from
    inner: NonNull<()>,
}

impl ThinErasedBox {
    /// Creates a new `ThinErasedBox` from a value.
    ///
    /// Diverges through [`handle_alloc_error`] if the allocation fails.
    pub fn new<T>(val: T) -> ThinErasedBox {
        ThinErasedBox::try_new(val).unwrap_or_else(|err| err.raise())
    }

    /// Creates a new `ThinErasedBox` from a value, returning an error instead of diverging if
    /// the block cannot be allocated.
    pub fn try_new<T>(val: T) -> Result<ThinErasedBox, EraseError> {
        let block = allocate::<T>(Layout::new::<T>(), ptr::metadata(&val))?;
        // SAFETY: The block was allocated for a `T` and its data field is uninitialized
        unsafe { (&raw mut (*block).data).write(val) };

        Ok(ThinErasedBox {
            // SAFETY: `allocate` returns a pointer derived from a non-null allocation
            inner: unsafe { NonNull::new_unchecked(block.cast::<()>()) },
        })
    }

    /// Moves the contents of a [`Box`] into a new `ThinErasedBox`, freeing the original box
    /// allocation. Returns an error instead of diverging if the block cannot be allocated, in
    /// which case the boxed value is dropped.
    pub fn try_from_box<T: ?Sized>(val: Box<T>) -> Result<ThinErasedBox, EraseError> {
        let value_layout = Layout::for_value(&*val);
        let block = allocate::<T>(value_layout, ptr::metadata(&*val))?;

        // Take the value out of the box without running its destructor
        let src = Box::into_raw(val);
        // SAFETY:
        // - `src` is from `Box::into_raw`, valid and aligned for `value_layout.size()` bytes
        // - The block's data field is in our new allocation, valid for the same size
        // - The two are unrelated allocations, so they cannot overlap
        unsafe {
            let dst = &raw mut (*block).data;
            ptr::copy_nonoverlapping(src.cast::<u8>(), dst.cast::<u8>(), value_layout.size());
        }
        // Free the original allocation, its contents have been moved out
        if value_layout.size() != 0 {
            // SAFETY: The box came from the global allocator with this layout
            unsafe { dealloc(src.cast(), value_layout) };
        }

        Ok(ThinErasedBox {
            // SAFETY: `allocate` returns a pointer derived from a non-null allocation
            inner: unsafe { NonNull::new_unchecked(block.cast::<()>()) },
        })
    }

    /// Returns a pointer to the value stored in this `ThinErasedBox`. This pointer is
    /// guaranteed correctly aligned and dereferenceable until this box is dropped.
    ///
    /// # Safety
    ///
    /// The provided `T` must be the same type as originally stored in the box.
    pub unsafe fn reify_ptr<T: ?Sized>(&self) -> NonNull<T> {
        // SAFETY: `inner` is a live block for `T` by contract. The field pointer is computed
        //         without creating a reference, so it cannot conflict with other reifications
        unsafe { NonNull::new_unchecked(&raw mut (*block_ptr::<T>(self.inner)).data) }
    }

    /// Converts a `ThinErasedBox` back into a [`Box`] of the provided type.
    ///
    /// # Safety
    ///
    /// The provided `T` must be the same type as originally stored in the box.
    pub unsafe fn reify_box<T: ?Sized>(self) -> Box<T> {
        // The value moves out, so our own drop must not run
        let this = ManuallyDrop::new(self);

        // SAFETY: `inner` is a live block for `T` by contract
        let block = unsafe { block_ptr::<T>(this.inner) };
        // SAFETY: As above, the header is initialized
        let meta = unsafe { (*block).header.meta };
        // SAFETY: Projecting a field of a live block
        let src = unsafe { &raw mut (*block).data };
        // SAFETY: `src` points to a live, initialized value
        let value_layout = unsafe { Layout::for_value_raw(src) };

        let dst = if value_layout.size() == 0 {
            // A non-null aligned pointer, valid for zero-sized values
            ptr::without_provenance_mut::<u8>(value_layout.align())
        } else {
            // SAFETY: Layout is non-zero-sized and correct for the value
            let dst = unsafe { alloc(value_layout) };
            if dst.is_null() {
                handle_alloc_error(value_layout);
            }
            // SAFETY:
            // - `src` is a live value, valid and aligned
            // - `dst` is a fresh allocation of the same layout
            // - The two are unrelated allocations, so they cannot overlap
            unsafe { ptr::copy_nonoverlapping(src.cast::<u8>(), dst, value_layout.size()) };
            dst
        };

        // Free the block without dropping, the value now lives in `dst`
        // SAFETY: The block was allocated with this layout and is not used again
        unsafe { dealloc(this.inner.as_ptr().cast(), Layout::for_value_raw(block)) };
        log::trace!("Freed thin erased block at {:p} into a box", this.inner);

        // SAFETY: `dst` is either a global allocation with the value's layout, or an aligned
        //         dangling pointer for a zero-sized value
        unsafe { Box::from_raw(ptr::from_raw_parts_mut::<T>(dst.cast::<()>(), meta)) }
    }

    /// Returns a reference to the value stored in this `ThinErasedBox`.
    ///
    /// # Safety
    ///
    /// The provided `T` must be the same type as originally stored in the box.
    pub unsafe fn reify_ref<T: ?Sized>(&self) -> &T {
        // SAFETY: Matching safety invariants, and the pointer lives as long as `self`
        unsafe { self.reify_ptr::<T>().as_ref() }
    }

    /// Returns a mutable reference to the value stored in this `ThinErasedBox`.
    ///
    /// # Safety
    ///
    /// The provided `T` must be the same type as originally stored in the box.
    pub unsafe fn reify_mut<T: ?Sized>(&mut self) -> &mut T {
        // SAFETY: Matching safety invariants, and uniqueness comes from `&mut self`
        unsafe { self.reify_ptr::<T>().as_mut() }
    }
}

impl<T: ?Sized> From<Box<T>> for ThinErasedBox {
    /// Diverges through [`handle_alloc_error`] if the allocation fails.
    fn from(val: Box<T>) -> Self {
        ThinErasedBox::try_from_box(val).unwrap_or_else(|err| err.raise())
    }
}

impl fmt::Pointer for ThinErasedBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.inner, f)
    }
}

impl fmt::Debug for ThinErasedBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThinErasedBox")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl Drop for ThinErasedBox {
    fn drop(&mut self) {
        // SAFETY: Every block starts with its `Header`, whose first field is the drop function
        let drop_fn = unsafe { *self.inner.as_ptr().cast::<DropFn>() };
        // SAFETY: The drop function was instantiated for the type stored in this block
        unsafe { drop_fn(self.inner) }
    }
}
