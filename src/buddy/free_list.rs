//! Intrusive per-order free lists
//!
//! Each order owns a circular doubly-linked list anchored at a sentinel that
//! lives in the table itself. List nodes are the headers of free blocks inside
//! arena memory, so linking and unlinking never allocate.

use core::ptr::{self, NonNull};

use super::buddy_block::{BlockHeader, BlockOffset, BlockState, Link};
use super::order::{HEADER_SIZE, ORDER_LIMIT};

/// Free lists for every order, plus header access into the arena.
pub struct FreeListTable {
    base: NonNull<u8>,
    size: usize,
    heads: [BlockHeader; ORDER_LIMIT],
    lens: [usize; ORDER_LIMIT],
}

impl FreeListTable {
    /// Create a table with every list empty.
    ///
    /// # Safety
    ///
    /// `base..base + size` must be writable for as long as the table is used,
    /// and `base` must be aligned for [`BlockHeader`].
    pub unsafe fn new(base: NonNull<u8>, size: usize) -> Self {
        debug_assert!(base.as_ptr() as usize % core::mem::align_of::<BlockHeader>() == 0);
        Self {
            base,
            size,
            heads: core::array::from_fn(BlockHeader::sentinel),
            lens: [0; ORDER_LIMIT],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether a header at `offset` lies entirely inside the arena.
    pub fn header_in_bounds(&self, offset: BlockOffset) -> bool {
        offset.get() <= self.size.saturating_sub(HEADER_SIZE)
    }

    fn header_ptr(&self, offset: BlockOffset) -> *mut BlockHeader {
        debug_assert!(
            self.header_in_bounds(offset),
            "block offset {:#x} outside arena of {:#x} bytes",
            offset.get(),
            self.size
        );
        // SAFETY: offsets handed to the table name block headers inside the arena.
        unsafe { self.base.as_ptr().add(offset.get()).cast() }
    }

    /// Address of the byte at `offset`.
    pub fn addr_of(&self, offset: BlockOffset) -> NonNull<u8> {
        // SAFETY: in-bounds offset from a non-null base.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset.get())) }
    }

    /// Read the header of the block at `offset`.
    pub fn header(&self, offset: BlockOffset) -> BlockHeader {
        // SAFETY: see `header_ptr`; headers are plain data with no invalid bit patterns.
        unsafe { ptr::read(self.header_ptr(offset)) }
    }

    pub fn write_header(&mut self, offset: BlockOffset, header: BlockHeader) {
        // SAFETY: see `header_ptr`.
        unsafe { ptr::write(self.header_ptr(offset), header) }
    }

    /// Retag a block that is not linked into any list.
    pub fn mark(&mut self, offset: BlockOffset, state: BlockState, order: usize) {
        let mut header = self.header(offset);
        header.set_state(state);
        header.set_order(order);
        self.write_header(offset, header);
    }

    fn next(&self, link: Link) -> Link {
        match link.as_block() {
            Some(offset) => self.header(offset).next,
            None => self.heads[Self::sentinel_index(link)].next,
        }
    }

    fn set_next(&mut self, link: Link, next: Link) {
        match link.as_block() {
            Some(offset) => {
                // SAFETY: see `header_ptr`.
                unsafe { (*self.header_ptr(offset)).next = next }
            }
            None => self.heads[Self::sentinel_index(link)].next = next,
        }
    }

    fn set_prev(&mut self, link: Link, prev: Link) {
        match link.as_block() {
            Some(offset) => {
                // SAFETY: see `header_ptr`.
                unsafe { (*self.header_ptr(offset)).prev = prev }
            }
            None => self.heads[Self::sentinel_index(link)].prev = prev,
        }
    }

    fn sentinel_index(link: Link) -> usize {
        link.sentinel_order().unwrap_or_default()
    }

    /// Tag the block Free with `order` and link it at the head of that list.
    pub fn push_front(&mut self, order: usize, offset: BlockOffset) {
        debug_assert!(order < ORDER_LIMIT);
        debug_assert!(offset.is_aligned_for(order));

        let head = Link::sentinel(order);
        let first = self.heads[order].next;
        let node = Link::block(offset);

        self.write_header(offset, BlockHeader::new(BlockState::Free, order, head, first));
        self.set_prev(first, node);
        self.set_next(head, node);
        self.lens[order] += 1;
    }

    /// Unlink a Free block from the list of its current order.
    ///
    /// The block keeps its tag; callers retag it.
    pub fn unlink(&mut self, offset: BlockOffset) {
        let header = self.header(offset);
        debug_assert_eq!(header.state(), Some(BlockState::Free));

        self.set_next(header.prev, header.next);
        self.set_prev(header.next, header.prev);
        self.lens[header.order()] -= 1;
    }

    /// Unlink and return the head of the list for `order`.
    pub fn pop_front(&mut self, order: usize) -> Option<BlockOffset> {
        let first = self.heads[order].next.as_block()?;
        self.unlink(first);
        Some(first)
    }

    pub fn is_empty(&self, order: usize) -> bool {
        self.heads[order].next == Link::sentinel(order)
    }

    /// Number of blocks on the list for `order`.
    pub fn len(&self, order: usize) -> usize {
        self.lens[order]
    }

    /// Walk the list for `order` from head to tail.
    pub fn iter(&self, order: usize) -> FreeBlocks<'_> {
        FreeBlocks {
            table: self,
            order,
            cursor: self.heads[order].next,
            remaining: self.lens[order],
        }
    }
}

/// Iterator over the free blocks of one order, as `(offset, order)` pairs.
pub struct FreeBlocks<'a> {
    table: &'a FreeListTable,
    order: usize,
    cursor: Link,
    remaining: usize,
}

impl Iterator for FreeBlocks<'_> {
    type Item = (BlockOffset, usize);

    fn next(&mut self) -> Option<Self::Item> {
        // `remaining` bounds the walk even if the links were corrupted.
        if self.remaining == 0 {
            return None;
        }
        let offset = self.cursor.as_block()?;
        self.cursor = self.table.next(self.cursor);
        self.remaining -= 1;
        Some((offset, self.order))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}
