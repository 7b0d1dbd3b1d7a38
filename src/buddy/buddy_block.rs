//! Buddy block metadata
//!
//! Every block in the arena starts with a [`BlockHeader`]. Blocks are named by
//! their offset from the arena base, never by address, so the arena handle
//! stays movable and bounds can be checked before memory is touched.

/// Lifecycle tag stored in a block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum BlockState {
    /// Free-list sentinels only; never a real block.
    Unused = 0,
    /// Linked into the free list of its order.
    Free = 1,
    /// Handed out to a caller.
    Reserved = 2,
}

impl BlockState {
    /// Decode a raw tag read from arena memory.
    pub const fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            0 => Some(BlockState::Unused),
            1 => Some(BlockState::Free),
            2 => Some(BlockState::Reserved),
            _ => None,
        }
    }
}

/// Arena-relative offset of a block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockOffset(usize);

impl BlockOffset {
    pub const fn new(offset: usize) -> Self {
        Self(offset)
    }

    pub const fn get(self) -> usize {
        self.0
    }

    /// Calculate the buddy offset for a block of the given order.
    ///
    /// The buddy is the other half of the parent block at the next higher
    /// order. For a block at order k with offset A, its buddy is at A ^ 2^k.
    /// This only holds while A is a multiple of 2^k.
    #[inline]
    pub const fn buddy(self, order: usize) -> Self {
        Self(self.0 ^ (1 << order))
    }

    /// The lower-addressed block of this block and its buddy, i.e. the
    /// offset of their merged parent.
    #[inline]
    pub const fn parent(self, order: usize) -> Self {
        Self(self.0 & !(1 << order))
    }

    /// Offset of the upper half after splitting a block of `order + 1`.
    #[inline]
    pub const fn upper_half(self, order: usize) -> Self {
        Self(self.0 + (1 << order))
    }

    #[inline]
    pub const fn is_aligned_for(self, order: usize) -> bool {
        crate::is_aligned(self.0, 1 << order)
    }
}

/// Free-list link: either a block in arena memory or the sentinel of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Link(usize);

const SENTINEL_BIT: usize = 1 << (usize::BITS - 1);

impl Link {
    pub const fn block(offset: BlockOffset) -> Self {
        Self(offset.0)
    }

    pub const fn sentinel(order: usize) -> Self {
        Self(SENTINEL_BIT | order)
    }

    pub const fn is_sentinel(self) -> bool {
        self.0 & SENTINEL_BIT != 0
    }

    /// Order of the sentinel this link points at, if any.
    pub const fn sentinel_order(self) -> Option<usize> {
        if self.is_sentinel() {
            Some(self.0 & !SENTINEL_BIT)
        } else {
            None
        }
    }

    /// Block this link points at, if it is not a sentinel.
    pub const fn as_block(self) -> Option<BlockOffset> {
        if self.is_sentinel() {
            None
        } else {
            Some(BlockOffset(self.0))
        }
    }
}

/// Header placed at the front of every block.
///
/// The tag is kept as a raw `u16` because headers are read back from arena
/// memory, where an arbitrary bit pattern must not be interpreted as an enum.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct BlockHeader {
    tag: u16,
    order: u16,
    pub(crate) prev: Link,
    pub(crate) next: Link,
}

impl BlockHeader {
    /// A sentinel for `order` whose list is empty.
    pub const fn sentinel(order: usize) -> Self {
        Self {
            tag: BlockState::Unused as u16,
            order: order as u16,
            prev: Link::sentinel(order),
            next: Link::sentinel(order),
        }
    }

    pub const fn new(state: BlockState, order: usize, prev: Link, next: Link) -> Self {
        Self {
            tag: state as u16,
            order: order as u16,
            prev,
            next,
        }
    }

    pub const fn state(&self) -> Option<BlockState> {
        BlockState::from_raw(self.tag)
    }

    pub fn set_state(&mut self, state: BlockState) {
        self.tag = state as u16;
    }

    pub const fn order(&self) -> usize {
        self.order as usize
    }

    pub fn set_order(&mut self, order: usize) {
        debug_assert!(order <= u16::MAX as usize);
        self.order = order as u16;
    }
}
