//! Buddy allocator over a single arena
//!
//! Implements allocate (search and split), free (coalesce and reinsert) and
//! resize on top of the per-order free lists.

use core::ptr::{self, NonNull};

use crate::region::{region_align, Region};
use crate::{AllocError, AllocResult};

#[cfg(feature = "log")]
use log::{debug, info, warn};

use super::buddy_block::{BlockOffset, BlockState};
use super::config::ArenaConfig;
use super::free_list::{FreeBlocks, FreeListTable};
use super::order::{order_for_request, usable_size, HEADER_SIZE, ORDER_LIMIT};
use super::stats::BuddyStats;

#[cfg(feature = "tracking")]
use super::stats::{MemoryStatsReporter, OpCounters};

/// Buddy allocator owning one power-of-two arena.
///
/// Every block is `2^order` bytes, starts with a header, and sits at an
/// offset from the arena base that is a multiple of its size. Pointers handed
/// out point just past the header.
///
/// Dropping the arena (or calling [`destroy`](Self::destroy)) releases the
/// backing region; any pointer still outstanding dangles from then on.
pub struct BuddyArena<R: Region> {
    lists: FreeListTable,
    max_order: usize,
    min_block_order: usize,
    #[cfg(feature = "tracking")]
    counters: OpCounters,
    // Declared last so the table never outlives the memory it points into.
    region: R,
}

// SAFETY: the arena exclusively owns its region and every header in it; all
// mutation goes through `&mut self`.
unsafe impl<R: Region + Send> Send for BuddyArena<R> {}

impl<R: Region> BuddyArena<R> {
    /// Reserve an arena for `capacity_hint` bytes with the default configuration.
    ///
    /// A hint of zero selects the default arena size.
    pub fn init(capacity_hint: usize) -> AllocResult<Self> {
        Self::with_config(capacity_hint, ArenaConfig::default())
    }

    /// Reserve an arena for `capacity_hint` bytes.
    ///
    /// The arena spans `2^config.arena_order(capacity_hint)` bytes and starts
    /// out as one free block of that order.
    pub fn with_config(capacity_hint: usize, config: ArenaConfig) -> AllocResult<Self> {
        config.validate()?;

        let max_order = config.arena_order(capacity_hint);
        let total_size = 1usize << max_order;
        let region = R::reserve(total_size)?;
        if region.len() < total_size {
            return Err(AllocError::ReservationFailed);
        }
        debug_assert!(
            crate::is_aligned(region.as_ptr().as_ptr() as usize, region_align(total_size)),
            "buddy arena: region at {:p} not aligned to its size",
            region.as_ptr()
        );

        // SAFETY: the region is writable, aligned to `total_size` and at least
        // `total_size` bytes, and the arena keeps it alive as long as the table.
        let lists = unsafe { FreeListTable::new(region.as_ptr(), total_size) };

        let mut arena = Self {
            lists,
            max_order,
            min_block_order: config.block_order_floor(),
            #[cfg(feature = "tracking")]
            counters: OpCounters::default(),
            region,
        };
        arena.lists.push_front(max_order, BlockOffset::new(0));

        info!(
            "buddy arena: reserved [{:p}, +{:#x}) max_order={} min_block_order={}",
            arena.region.as_ptr(),
            total_size,
            max_order,
            arena.min_block_order
        );
        Ok(arena)
    }

    /// Release the backing region.
    pub fn destroy(self) {}

    /// First byte of the arena, aligned to [`total_size`](Self::total_size).
    pub fn base(&self) -> NonNull<u8> {
        self.region.as_ptr()
    }

    /// Arena size in bytes, always `2^max_order()`.
    pub fn total_size(&self) -> usize {
        self.lists.size()
    }

    /// Order of the whole-arena block.
    pub fn max_order(&self) -> usize {
        self.max_order
    }

    /// Order of the smallest block ever handed out.
    pub fn min_block_order(&self) -> usize {
        self.min_block_order
    }

    /// Allocate at least `size` bytes.
    ///
    /// Returns `Ok(None)` for a zero-sized request. The memory is not zeroed.
    /// On failure the free lists are left exactly as they were.
    pub fn allocate(&mut self, size: usize) -> AllocResult<Option<NonNull<u8>>> {
        if size == 0 {
            return Ok(None);
        }

        let order = match order_for_request(size, self.min_block_order) {
            Some(order) if order <= self.max_order => order,
            request_order => return Err(self.alloc_failure(size, request_order)),
        };

        let Some(found) = (order..=self.max_order).find(|&o| !self.lists.is_empty(o)) else {
            return Err(self.alloc_failure(size, Some(order)));
        };
        let block = self.lists.pop_front(found).ok_or(AllocError::OutOfMemory)?;

        // Split down to the requested order, keeping the lower half each time.
        let mut current = found;
        while current > order {
            current -= 1;
            self.lists.push_front(current, block.upper_half(current));
            #[cfg(feature = "tracking")]
            {
                self.counters.splits += 1;
            }
        }

        self.lists.mark(block, BlockState::Reserved, order);
        #[cfg(feature = "tracking")]
        {
            self.counters.allocations += 1;
        }

        Ok(Some(self.payload_of(block)))
    }

    /// Return a block to the arena, merging it with free buddies.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`allocate`](Self::allocate) or
    /// [`resize`](Self::resize) on this arena and not freed since. Builds with
    /// debug assertions check this and panic on a violation; release builds
    /// do not.
    pub unsafe fn free(&mut self, ptr: NonNull<u8>) {
        debug_assert!(
            self.validate_reserved(ptr).is_ok(),
            "buddy arena: invalid free of {:p}",
            ptr
        );
        let block = self.block_of(ptr);
        self.release(block);
    }

    /// Checked variant of [`free`](Self::free).
    ///
    /// Rejects pointers outside the arena, pointers not at a block boundary,
    /// and blocks that are not currently reserved (including double frees),
    /// returning [`AllocError::InvalidFree`] without touching any list.
    ///
    /// # Safety
    ///
    /// Detection relies on header contents. A pointer into the middle of a
    /// live allocation whose payload happens to look like a reserved header is
    /// not caught, so `ptr` must still satisfy the contract of `free`.
    pub unsafe fn try_free(&mut self, ptr: NonNull<u8>) -> AllocResult {
        match self.validate_reserved(ptr) {
            Ok(block) => {
                self.release(block);
                Ok(())
            }
            Err(err) => {
                warn!("buddy arena: rejected free of {:p}", ptr);
                Err(err)
            }
        }
    }

    /// Grow or keep an allocation.
    ///
    /// - `ptr == None` behaves as [`allocate`](Self::allocate).
    /// - `new_size == 0` frees `ptr` and returns `Ok(None)`.
    /// - If the current block already holds `new_size` bytes the same pointer
    ///   comes back; blocks are never shrunk in place.
    /// - Otherwise the contents move to a new block and the old one is freed.
    ///   If no new block is available the old one is left untouched.
    ///
    /// # Safety
    ///
    /// A `Some` pointer must satisfy the contract of [`free`](Self::free).
    pub unsafe fn resize(
        &mut self,
        ptr: Option<NonNull<u8>>,
        new_size: usize,
    ) -> AllocResult<Option<NonNull<u8>>> {
        let Some(ptr) = ptr else {
            return self.allocate(new_size);
        };
        if new_size == 0 {
            self.free(ptr);
            return Ok(None);
        }

        let old_usable = self.usable_size(ptr);
        if new_size <= old_usable {
            return Ok(Some(ptr));
        }

        let new_ptr = self.allocate(new_size)?.ok_or(AllocError::OutOfMemory)?;
        ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.as_ptr(), old_usable.min(new_size));
        self.free(ptr);
        Ok(Some(new_ptr))
    }

    /// Payload bytes available behind `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must be a live allocation from this arena.
    pub unsafe fn usable_size(&self, ptr: NonNull<u8>) -> usize {
        usable_size(self.lists.header(self.block_of(ptr)).order())
    }

    /// Whether `ptr` could be a payload pointer of this arena.
    pub fn contains(&self, ptr: NonNull<u8>) -> bool {
        let addr = ptr.as_ptr() as usize;
        let base = self.base().as_ptr() as usize;
        addr >= base + HEADER_SIZE && addr < base + self.total_size()
    }

    /// Number of free blocks of `order`.
    pub fn free_block_count(&self, order: usize) -> usize {
        if order < ORDER_LIMIT {
            self.lists.len(order)
        } else {
            0
        }
    }

    /// Free blocks of `order`, most recently freed first.
    ///
    /// # Panics
    ///
    /// Panics if `order >= ORDER_LIMIT`.
    pub fn free_blocks(&self, order: usize) -> FreeBlocks<'_> {
        self.lists.iter(order)
    }

    /// Bytes held by free blocks.
    pub fn free_bytes(&self) -> usize {
        (0..=self.max_order)
            .map(|order| self.lists.len(order) << order)
            .sum()
    }

    /// Bytes held by reserved blocks, headers included.
    pub fn used_bytes(&self) -> usize {
        self.total_size() - self.free_bytes()
    }

    /// Snapshot of the free lists.
    pub fn stats(&self) -> BuddyStats {
        let mut stats = BuddyStats::new();
        stats.total_bytes = self.total_size();
        for order in 0..=self.max_order {
            let count = self.lists.len(order);
            stats.free_blocks_by_order[order] = count;
            stats.free_bytes += count << order;
        }
        stats.used_bytes = stats.total_bytes - stats.free_bytes;
        stats
    }

    #[cfg(feature = "tracking")]
    pub fn counters(&self) -> OpCounters {
        self.counters
    }

    /// Print the arena layout and free block distribution
    pub fn print_arena_info(&self) {
        let _stats = self.stats();
        info!("========== Buddy Arena Info ==========");
        info!(
            "Range: [{:p}, +{:#x}) max_order={}",
            self.base(),
            self.total_size(),
            self.max_order
        );
        info!(
            "Free: {} bytes, used: {} bytes",
            _stats.free_bytes, _stats.used_bytes
        );
        info!("Free blocks distribution:");
        for order in (self.min_block_order..=self.max_order).rev() {
            let _count = self.lists.len(order);
            if _count > 0 {
                info!(
                    "  Order {}: {} blocks (size {} bytes each)",
                    order,
                    _count,
                    1usize << order
                );
            }
        }
        info!("======================================");
    }

    fn payload_of(&self, block: BlockOffset) -> NonNull<u8> {
        self.lists.addr_of(BlockOffset::new(block.get() + HEADER_SIZE))
    }

    fn block_of(&self, ptr: NonNull<u8>) -> BlockOffset {
        let offset = ptr.as_ptr() as usize - self.base().as_ptr() as usize - HEADER_SIZE;
        BlockOffset::new(offset)
    }

    /// Resolve `ptr` to the header of a reserved block, or fail without side effects.
    fn validate_reserved(&self, ptr: NonNull<u8>) -> AllocResult<BlockOffset> {
        let offset = (ptr.as_ptr() as usize)
            .checked_sub(self.base().as_ptr() as usize)
            .and_then(|offset| offset.checked_sub(HEADER_SIZE))
            .ok_or(AllocError::InvalidFree)?;
        let block = BlockOffset::new(offset);
        if !self.lists.header_in_bounds(block) || !block.is_aligned_for(self.min_block_order) {
            return Err(AllocError::InvalidFree);
        }

        let header = self.lists.header(block);
        let order = header.order();
        if header.state() != Some(BlockState::Reserved)
            || order < self.min_block_order
            || order > self.max_order
            || !block.is_aligned_for(order)
        {
            return Err(AllocError::InvalidFree);
        }
        Ok(block)
    }

    /// Merge `block` with free buddies as far up as possible, then list it.
    fn release(&mut self, block: BlockOffset) {
        let mut block = block;
        let mut order = self.lists.header(block).order();
        // An upper half absorbed below keeps this tag, so a second free of it is caught.
        self.lists.mark(block, BlockState::Free, order);

        while order < self.max_order {
            let buddy = block.buddy(order);
            let header = self.lists.header(buddy);
            if header.state() != Some(BlockState::Free) || header.order() != order {
                break;
            }
            self.lists.unlink(buddy);
            block = block.parent(order);
            order += 1;
            #[cfg(feature = "tracking")]
            {
                self.counters.merges += 1;
            }
        }

        self.lists.push_front(order, block);
        #[cfg(feature = "tracking")]
        {
            self.counters.frees += 1;
        }
    }

    #[allow(unused_variables)]
    fn alloc_failure(&mut self, size: usize, request_order: Option<usize>) -> AllocError {
        debug!(
            "buddy arena: allocation failure: {} bytes (order {:?}, max_order {})",
            size, request_order, self.max_order
        );
        #[cfg(feature = "tracking")]
        {
            self.counters.failures += 1;
            MemoryStatsReporter::print_alloc_failure_stats(
                &self.stats(),
                &self.counters,
                size,
                request_order,
            );
        }
        AllocError::OutOfMemory
    }
}

impl<R: Region> Drop for BuddyArena<R> {
    fn drop(&mut self) {
        debug!(
            "buddy arena: releasing [{:p}, +{:#x}) with {} bytes still reserved",
            self.base(),
            self.total_size(),
            self.used_bytes()
        );
    }
}
