//! Statistics and debugging for the buddy arena
//!
//! Provides free-list snapshots and failure reporting.

use super::order::ORDER_LIMIT;

/// Snapshot of how the arena's bytes are split between free and reserved blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuddyStats {
    pub total_bytes: usize,
    pub free_bytes: usize,
    pub used_bytes: usize,
    pub free_blocks_by_order: [usize; ORDER_LIMIT],
}

impl Default for BuddyStats {
    fn default() -> Self {
        Self::new()
    }
}

impl BuddyStats {
    pub const fn new() -> Self {
        Self {
            total_bytes: 0,
            free_bytes: 0,
            used_bytes: 0,
            free_blocks_by_order: [0; ORDER_LIMIT],
        }
    }

    /// Largest order that currently has a free block.
    pub fn largest_free_order(&self) -> Option<usize> {
        self.free_blocks_by_order.iter().rposition(|&count| count > 0)
    }
}

/// Cumulative operation counters
#[cfg(feature = "tracking")]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpCounters {
    pub allocations: usize,
    pub frees: usize,
    pub splits: usize,
    pub merges: usize,
    pub failures: usize,
}

/// Detailed memory statistics reporter
#[cfg(feature = "tracking")]
pub struct MemoryStatsReporter;

#[cfg(feature = "tracking")]
impl MemoryStatsReporter {
    /// Print detailed allocation failure statistics
    #[allow(unused_variables)]
    pub fn print_alloc_failure_stats(
        stats: &BuddyStats,
        counters: &OpCounters,
        request_bytes: usize,
        request_order: Option<usize>,
    ) {
        #[cfg(feature = "log")]
        use log::error;
        error!("========================================");
        if let Some(order) = request_order {
            error!(
                "Request: {} bytes (order {}, block {} bytes)",
                request_bytes,
                order,
                1usize << order
            );
        } else {
            error!("Request: {} bytes (beyond largest order)", request_bytes);
        }
        error!("Arena state:");
        error!("  Total: {} bytes", stats.total_bytes);
        error!("  Free: {} bytes", stats.free_bytes);
        error!("  Used: {} bytes", stats.used_bytes);
        error!(
            "  Ops: {} allocs, {} frees, {} splits, {} merges, {} failures",
            counters.allocations,
            counters.frees,
            counters.splits,
            counters.merges,
            counters.failures
        );
        error!("  Free blocks by order:");
        for order in (0..ORDER_LIMIT).rev() {
            let count = stats.free_blocks_by_order[order];
            if count > 0 {
                error!(
                    "    Order {}: {} blocks ({} bytes each)",
                    order,
                    count,
                    1usize << order
                );
            }
        }
        error!("========================================");
    }
}
