//! Buddy arena module
//!
//! This module provides the complete buddy system:
//! - Order calculation with exact power-of-two fits
//! - Block headers and buddy offset arithmetic
//! - Intrusive circular free lists, one per order
//! - The allocator engine, configuration and statistics

pub mod buddy_arena;
pub mod buddy_block;
pub mod config;
pub(crate) mod free_list;
pub mod order;
pub mod stats;

pub use buddy_arena::BuddyArena;
pub use buddy_block::{BlockHeader, BlockOffset, BlockState};
pub use config::{
    ArenaConfig, DEFAULT_ARENA_ORDER, DEFAULT_MIN_ARENA_ORDER, DEFAULT_MIN_BLOCK_ORDER,
};
pub use free_list::FreeBlocks;
pub use order::{ceil_log2, order_for_request, usable_size, HEADER_SIZE, ORDER_LIMIT};
#[cfg(feature = "tracking")]
pub use stats::OpCounters;
pub use stats::BuddyStats;
