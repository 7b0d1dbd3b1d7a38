//! Arena sizing configuration

use crate::{AllocError, AllocResult};

use super::order::{ceil_log2, HEADER_SIZE, ORDER_LIMIT};

/// Smallest block handed out by default: 64 bytes.
pub const DEFAULT_MIN_BLOCK_ORDER: usize = 6;

/// Smallest arena reserved by default: 1 MiB.
pub const DEFAULT_MIN_ARENA_ORDER: usize = 20;

/// Arena order used for a zero capacity hint: 1 GiB.
pub const DEFAULT_ARENA_ORDER: usize = 30;

/// Order bounds applied when an arena is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaConfig {
    min_block_order: usize,
    min_arena_order: usize,
    default_arena_order: usize,
}

impl ArenaConfig {
    pub const fn new() -> Self {
        Self {
            min_block_order: DEFAULT_MIN_BLOCK_ORDER,
            min_arena_order: DEFAULT_MIN_ARENA_ORDER,
            default_arena_order: DEFAULT_ARENA_ORDER,
        }
    }

    /// Smallest block order the allocator will hand out.
    pub const fn min_block_order(mut self, order: usize) -> Self {
        self.min_block_order = order;
        self
    }

    /// Arenas are never smaller than `2^order` bytes.
    pub const fn min_arena_order(mut self, order: usize) -> Self {
        self.min_arena_order = order;
        self
    }

    /// Arena order used when the capacity hint is zero.
    pub const fn default_arena_order(mut self, order: usize) -> Self {
        self.default_arena_order = order;
        self
    }

    pub const fn block_order_floor(&self) -> usize {
        self.min_block_order
    }

    /// Check that the bounds are consistent with each other and with the header.
    pub fn validate(&self) -> AllocResult {
        if self.min_block_order >= usize::BITS as usize
            || (1usize << self.min_block_order) <= HEADER_SIZE
        {
            return Err(AllocError::InvalidParam);
        }
        if self.min_arena_order < self.min_block_order || self.min_arena_order >= ORDER_LIMIT {
            return Err(AllocError::InvalidParam);
        }
        if self.default_arena_order < self.min_arena_order
            || self.default_arena_order >= ORDER_LIMIT
        {
            return Err(AllocError::InvalidParam);
        }
        Ok(())
    }

    /// Order of the arena reserved for `capacity_hint` bytes.
    ///
    /// Zero selects the default order. Other hints round up to the next power
    /// of two and are clamped to `[min_arena_order, ORDER_LIMIT - 1]`.
    pub const fn arena_order(&self, capacity_hint: usize) -> usize {
        if capacity_hint == 0 {
            return self.default_arena_order;
        }
        let order = ceil_log2(capacity_hint);
        if order < self.min_arena_order {
            self.min_arena_order
        } else if order >= ORDER_LIMIT {
            ORDER_LIMIT - 1
        } else {
            order
        }
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self::new()
    }
}
