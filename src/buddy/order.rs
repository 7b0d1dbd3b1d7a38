//! Size-class computation
//!
//! Maps byte counts to block orders. A block of order `k` spans `2^k` bytes,
//! header included.

use super::buddy_block::BlockHeader;

/// Bytes taken by the header at the front of every block.
pub const HEADER_SIZE: usize = core::mem::size_of::<BlockHeader>();

/// Exclusive upper bound on block and arena orders.
///
/// Also the number of free lists an arena carries.
pub const ORDER_LIMIT: usize = if usize::BITS >= 64 {
    48
} else {
    usize::BITS as usize - 1
};

/// Smallest `k` such that `2^k >= n`.
#[inline]
pub const fn ceil_log2(n: usize) -> usize {
    if n <= 1 {
        0
    } else {
        (usize::BITS - (n - 1).leading_zeros()) as usize
    }
}

/// Order of the smallest block that holds `bytes` of payload plus its header.
///
/// Zero bytes map to `min_block_order`. Returns `None` when the block would
/// need an order at or above [`ORDER_LIMIT`]; such a request can never be
/// satisfied and must not be rounded down to a block that is too small.
#[inline]
pub const fn order_for_request(bytes: usize, min_block_order: usize) -> Option<usize> {
    let needed = match bytes.checked_add(HEADER_SIZE) {
        Some(needed) => needed,
        None => return None,
    };
    let mut order = ceil_log2(needed);
    if order < min_block_order {
        order = min_block_order;
    }
    if order >= ORDER_LIMIT {
        return None;
    }
    Some(order)
}

/// Payload bytes available in a block of `order`.
#[inline]
pub const fn usable_size(order: usize) -> usize {
    (1 << order) - HEADER_SIZE
}
