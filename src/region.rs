//! Backing memory for arenas
//!
//! A [`Region`] is the arena's only contact with the outside world: reserve a
//! byte range up front and give it back when dropped.

use core::alloc::Layout;
use core::ptr::NonNull;

use alloc::alloc::{alloc_zeroed, dealloc};

#[cfg(feature = "log")]
use log::error;

use crate::{AllocError, AllocResult, DEFAULT_PAGE_SIZE};

/// Reserved, zero-initialised backing memory for one arena.
///
/// Dropping the region releases the memory.
///
/// # Safety
///
/// Implementors must guarantee that `as_ptr()..as_ptr() + len()` is readable
/// and writable for the lifetime of the value, zero-filled when reserved,
/// aligned to [`region_align(len)`](region_align), and that the address does
/// not change when the region value is moved.
pub unsafe trait Region: Sized {
    /// Reserve `len` bytes.
    fn reserve(len: usize) -> AllocResult<Self>;

    /// First byte of the region.
    fn as_ptr(&self) -> NonNull<u8>;

    /// Length in bytes.
    fn len(&self) -> usize;
}

/// Alignment a region of `len` bytes must have.
///
/// At least a page, and the whole length when it is a power of two, so a
/// `2^max_order` arena base is itself `2^max_order`-aligned.
pub const fn region_align(len: usize) -> usize {
    if len.is_power_of_two() && len > DEFAULT_PAGE_SIZE {
        len
    } else {
        DEFAULT_PAGE_SIZE
    }
}

/// Region carved from the global allocator.
pub struct HeapRegion {
    ptr: NonNull<u8>,
    layout: Layout,
}

// SAFETY: the region exclusively owns its allocation.
unsafe impl Send for HeapRegion {}

// SAFETY: `alloc_zeroed` returns zeroed memory with the requested
// alignment, owned until `Drop`.
unsafe impl Region for HeapRegion {
    fn reserve(len: usize) -> AllocResult<Self> {
        if len == 0 {
            return Err(AllocError::ReservationFailed);
        }
        let layout = Layout::from_size_align(len, region_align(len))
            .map_err(|_| AllocError::ReservationFailed)?;
        // SAFETY: layout has non-zero size.
        let ptr = NonNull::new(unsafe { alloc_zeroed(layout) }).ok_or_else(|| {
            error!("heap region: failed to reserve {:#x} bytes", len);
            AllocError::ReservationFailed
        })?;
        Ok(Self { ptr, layout })
    }

    fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    fn len(&self) -> usize {
        self.layout.size()
    }
}

impl Drop for HeapRegion {
    fn drop(&mut self) {
        // SAFETY: allocated in `reserve` with this layout.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

/// Region backed by a private anonymous memory mapping.
///
/// The mapping is `len` bytes longer than requested; the region is the first
/// window inside it that starts on a [`region_align`] boundary.
#[cfg(feature = "mmap")]
pub struct MmapRegion {
    // Only held so the mapping is unmapped on drop.
    _map: memmap2::MmapMut,
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the mapping is exclusively owned by the region.
#[cfg(feature = "mmap")]
unsafe impl Send for MmapRegion {}

// SAFETY: anonymous mappings are zero-filled and stay at the same address
// until unmapped on drop; `ptr` is aligned inside the over-sized mapping.
#[cfg(feature = "mmap")]
unsafe impl Region for MmapRegion {
    fn reserve(len: usize) -> AllocResult<Self> {
        if len == 0 {
            return Err(AllocError::ReservationFailed);
        }
        let align = region_align(len);
        let map_len = len.checked_add(align).ok_or(AllocError::ReservationFailed)?;
        let mut map = memmap2::MmapOptions::new()
            .len(map_len)
            .map_anon()
            .map_err(|_err| {
                error!("mmap region: failed to map {:#x} bytes: {}", map_len, _err);
                AllocError::ReservationFailed
            })?;

        let addr = map.as_ptr() as usize;
        let offset = (align - addr % align) % align;
        // SAFETY: `offset < align`, so `offset + len <= map_len`.
        let ptr = NonNull::new(unsafe { map.as_mut_ptr().add(offset) })
            .ok_or(AllocError::ReservationFailed)?;
        Ok(Self {
            _map: map,
            ptr,
            len,
        })
    }

    fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    fn len(&self) -> usize {
        self.len
    }
}
