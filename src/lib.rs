//! Buddy Arena Allocator
//!
//! A binary buddy allocator that manages one contiguous, power-of-two sized
//! arena, featuring:
//! - Per-order intrusive circular free lists with O(1) insert and unlink
//! - Split-on-allocate and maximal coalesce-on-free
//! - Resize that keeps the block in place whenever its order still fits
//! - Pluggable backing regions (anonymous mappings or the global heap)
//!
//! The engine is single-threaded. Share an arena between threads by wrapping
//! it in a lock of your choice.

#![no_std]

extern crate alloc;

#[cfg(feature = "mmap")]
extern crate std;

use core::fmt;

// Logging support - conditionally import log crate
#[cfg(feature = "log")]
extern crate log;

// Stub macros when log is disabled - these become no-ops
#[cfg(not(feature = "log"))]
macro_rules! error {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
macro_rules! warn {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
macro_rules! info {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
macro_rules! debug {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
#[allow(unused_macros)]
macro_rules! trace {
    ($($arg:tt)*) => {};
}

/// Default page size, used as the alignment of heap-backed regions.
pub const DEFAULT_PAGE_SIZE: usize = 0x1000;

/// The error type used for allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// Invalid arena configuration.
    InvalidParam,
    /// The request exceeds the arena capacity, or no free block is large enough.
    OutOfMemory,
    /// The backing region could not be reserved.
    ReservationFailed,
    /// The pointer handed to `try_free` does not name a reserved block.
    InvalidFree,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            AllocError::InvalidParam => "invalid arena configuration",
            AllocError::OutOfMemory => "out of memory",
            AllocError::ReservationFailed => "failed to reserve arena memory",
            AllocError::InvalidFree => "pointer does not name a reserved block",
        };
        f.write_str(msg)
    }
}

#[cfg(feature = "mmap")]
impl std::error::Error for AllocError {}

/// A [`Result`] type with [`AllocError`] as the error type.
pub type AllocResult<T = ()> = Result<T, AllocError>;

/// Checks whether the offset has the demanded alignment.
///
/// Equivalent to `offset % align == 0`, but the alignment must be a power of two.
#[inline]
const fn is_aligned(offset: usize, align: usize) -> bool {
    offset & (align - 1) == 0
}

pub mod buddy;
#[cfg(feature = "tracking")]
pub use buddy::OpCounters;
pub use buddy::{
    ArenaConfig, BlockOffset, BlockState, BuddyArena, BuddyStats, FreeBlocks, HEADER_SIZE,
    ORDER_LIMIT,
};

pub mod region;
#[cfg(feature = "mmap")]
pub use region::MmapRegion;
pub use region::{region_align, HeapRegion, Region};

/// Arena reserved through anonymous memory mappings.
#[cfg(feature = "mmap")]
pub type MmapArena = BuddyArena<MmapRegion>;

/// Arena reserved from the global heap.
pub type HeapArena = BuddyArena<HeapRegion>;
