//! Integration tests for the buddy arena crate
//!
//! Exercises the public API end to end over both kinds of backing region.

use std::ptr::NonNull;

use buddy_arena::{
    AllocError, ArenaConfig, BlockOffset, BuddyArena, HeapArena, HeapRegion, Region,
    HEADER_SIZE,
};

const ARENA_ORDER: usize = 10;
const ARENA_SIZE: usize = 1 << ARENA_ORDER; // 1KB

fn small_config() -> ArenaConfig {
    ArenaConfig::new().min_arena_order(ARENA_ORDER)
}

fn new_arena<R: Region>(capacity: usize) -> BuddyArena<R> {
    BuddyArena::with_config(capacity, small_config()).unwrap()
}

fn offset_of<R: Region>(arena: &BuddyArena<R>, ptr: NonNull<u8>) -> usize {
    ptr.as_ptr() as usize - arena.base().as_ptr() as usize - HEADER_SIZE
}

fn assert_fully_coalesced<R: Region>(arena: &BuddyArena<R>) {
    let top: Vec<_> = arena.free_blocks(arena.max_order()).collect();
    assert_eq!(top, [(BlockOffset::new(0), arena.max_order())]);
    for order in 0..arena.max_order() {
        assert_eq!(arena.free_block_count(order), 0, "order {} not empty", order);
    }
    assert_eq!(arena.free_bytes(), arena.total_size());
}

/// Allocate `sizes`, check every block against the others, then free them.
fn check_disjoint_allocations<R: Region>(arena: &mut BuddyArena<R>, sizes: &[usize]) {
    let mut live: Vec<(usize, usize)> = Vec::new();
    let mut ptrs = Vec::new();

    for &size in sizes {
        let ptr = arena.allocate(size).unwrap().unwrap();
        let usable = unsafe { arena.usable_size(ptr) };
        assert!(usable >= size);

        let block_size = usable + HEADER_SIZE;
        let start = offset_of(arena, ptr);
        assert_eq!(start % block_size, 0, "block at {:#x} misaligned", start);
        assert!(start + block_size <= arena.total_size());

        for &(other_start, other_size) in &live {
            assert!(
                start + block_size <= other_start || other_start + other_size <= start,
                "[{:#x}, +{:#x}) overlaps [{:#x}, +{:#x})",
                start,
                block_size,
                other_start,
                other_size
            );
        }
        live.push((start, block_size));
        ptrs.push(ptr);
    }

    for ptr in ptrs {
        unsafe { arena.free(ptr) };
    }
}

#[test]
fn test_heap_arena_end_to_end() {
    let mut arena: HeapArena = new_arena(ARENA_SIZE);
    assert_eq!(arena.total_size(), 1024);

    let a = arena.allocate(100).unwrap().unwrap();
    let b = arena.allocate(100).unwrap().unwrap();
    assert_ne!(a, b);
    assert_eq!(unsafe { arena.usable_size(a) }, unsafe {
        arena.usable_size(b)
    });

    unsafe { arena.free(a) };
    unsafe { arena.free(b) };
    assert_fully_coalesced(&arena);
    arena.destroy();
}

#[cfg(feature = "mmap")]
#[test]
fn test_mmap_arena_end_to_end() {
    use buddy_arena::MmapArena;

    let mut arena: MmapArena = new_arena(ARENA_SIZE);
    let a = arena.allocate(100).unwrap().unwrap();
    let b = arena.allocate(100).unwrap().unwrap();
    unsafe {
        a.as_ptr().write_bytes(0x11, 100);
        b.as_ptr().write_bytes(0x22, 100);
        assert_eq!(a.as_ptr().add(99).read(), 0x11);
        arena.free(a);
        arena.free(b);
    }
    assert_fully_coalesced(&arena);
    arena.destroy();
}

#[cfg(feature = "mmap")]
#[test]
fn test_mmap_default_config_arena() {
    use buddy_arena::MmapArena;

    let mut arena = MmapArena::init(1 << 20).unwrap();
    assert_eq!(arena.max_order(), 20);

    let ptr = arena.allocate(4000).unwrap().unwrap();
    assert_eq!(unsafe { arena.usable_size(ptr) }, 4096 - HEADER_SIZE);
    unsafe { arena.free(ptr) };
    assert_fully_coalesced(&arena);
}

#[cfg(feature = "mmap")]
#[test]
fn test_mmap_arenas_are_aligned_to_their_size() {
    use buddy_arena::MmapArena;

    let arenas: Vec<MmapArena> = (0..16).map(|_| MmapArena::init(1 << 20).unwrap()).collect();
    let misaligned = arenas
        .iter()
        .filter(|arena| arena.base().as_ptr() as usize % arena.total_size() != 0)
        .count();
    assert_eq!(misaligned, 0);
}

#[test]
fn test_heap_arenas_are_aligned_to_their_size() {
    let arenas: Vec<HeapArena> = (0..16).map(|_| new_arena(1 << 16)).collect();
    for arena in &arenas {
        assert_eq!(arena.base().as_ptr() as usize % arena.total_size(), 0);
    }
}

#[test]
fn test_small_hint_is_clamped_to_min_arena() {
    let arena = HeapArena::init(1).unwrap();
    assert_eq!(arena.max_order(), 20);
    assert_eq!(arena.total_size(), 1 << 20);
}

#[test]
fn test_disjoint_mixed_sizes() {
    let mut arena: HeapArena = new_arena(1 << 16);
    check_disjoint_allocations(&mut arena, &[1, 40, 41, 100, 1000, 3000, 7, 500, 64, 8000]);
    assert_fully_coalesced(&arena);
}

#[test]
fn test_exact_fit_at_every_order() {
    let mut arena: HeapArena = new_arena(1 << 16);
    for order in arena.min_block_order()..=arena.max_order() {
        let exact = (1 << order) - HEADER_SIZE;
        let ptr = arena.allocate(exact).unwrap().unwrap();
        assert_eq!(unsafe { arena.usable_size(ptr) }, exact);
        assert_eq!(arena.used_bytes(), 1 << order);
        unsafe { arena.free(ptr) };
    }
    assert_fully_coalesced(&arena);
}

#[test]
fn test_fragmentation_recovers_in_any_order() {
    let mut arena: HeapArena = new_arena(1 << 14);
    let count = arena.total_size() >> arena.min_block_order();
    let ptrs: Vec<_> = (0..count)
        .map(|_| arena.allocate(1).unwrap().unwrap())
        .collect();
    assert_eq!(arena.allocate(1), Err(AllocError::OutOfMemory));

    // Free every other block first: nothing can merge yet.
    for ptr in ptrs.iter().step_by(2) {
        unsafe { arena.free(*ptr) };
    }
    assert_eq!(arena.free_block_count(arena.min_block_order()), count / 2);
    assert_eq!(arena.allocate(100), Err(AllocError::OutOfMemory));

    for ptr in ptrs.iter().skip(1).step_by(2).rev() {
        unsafe { arena.free(*ptr) };
    }
    assert_fully_coalesced(&arena);
}

#[test]
fn test_resize_chain_preserves_contents() {
    let mut arena: HeapArena = new_arena(1 << 16);
    let mut ptr = arena.allocate(16).unwrap().unwrap();
    unsafe { ptr.as_ptr().copy_from_nonoverlapping(b"buddy arena data".as_ptr(), 16) };

    for size in [32, 200, 1000, 5000, 20000] {
        ptr = unsafe { arena.resize(Some(ptr), size) }.unwrap().unwrap();
        assert!(unsafe { arena.usable_size(ptr) } >= size);
        let head = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), 16) };
        assert_eq!(head, b"buddy arena data");
    }

    // Shrinking keeps the block where it is.
    let same = unsafe { arena.resize(Some(ptr), 10) }.unwrap();
    assert_eq!(same, Some(ptr));

    assert_eq!(unsafe { arena.resize(Some(ptr), 0) }, Ok(None));
    assert_fully_coalesced(&arena);
}

#[test]
fn test_resize_beyond_capacity_fails_cleanly() {
    let mut arena: HeapArena = new_arena(ARENA_SIZE);
    let ptr = arena.allocate(100).unwrap().unwrap();
    let before = arena.stats();

    assert_eq!(
        unsafe { arena.resize(Some(ptr), ARENA_SIZE) },
        Err(AllocError::OutOfMemory)
    );
    assert_eq!(arena.stats(), before);
    unsafe { arena.free(ptr) };
}

#[test]
fn test_try_free_detects_invalid_frees() {
    let mut arena: HeapArena = new_arena(ARENA_SIZE);
    let other: HeapArena = new_arena(ARENA_SIZE);

    let ptr = arena.allocate(10).unwrap().unwrap();
    assert!(arena.contains(ptr));
    assert!(!other.contains(ptr));

    assert_eq!(unsafe { arena.try_free(ptr) }, Ok(()));
    assert_eq!(unsafe { arena.try_free(ptr) }, Err(AllocError::InvalidFree));
    assert_fully_coalesced(&arena);
}

#[test]
fn test_arenas_are_independent_across_threads() {
    let handles: Vec<_> = (0..4)
        .map(|i| {
            std::thread::spawn(move || {
                let mut arena: BuddyArena<HeapRegion> = new_arena(1 << 12);
                let ptrs: Vec<_> = (0..8)
                    .map(|j| arena.allocate(16 * (i + j + 1)).unwrap().unwrap())
                    .collect();
                for ptr in ptrs {
                    unsafe { arena.free(ptr) };
                }
                arena.free_bytes() == arena.total_size()
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap());
    }
}

#[test]
fn test_shared_arena_behind_mutex() {
    use std::sync::{Arc, Mutex};

    let arena: HeapArena = new_arena(1 << 16);
    let arena = Arc::new(Mutex::new(arena));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let arena = Arc::clone(&arena);
            std::thread::spawn(move || {
                for size in [24, 100, 300, 700] {
                    let mut guard = arena.lock().unwrap();
                    let ptr = guard.allocate(size).unwrap().unwrap();
                    unsafe { guard.free(ptr) };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    let arena = arena.lock().unwrap();
    assert_fully_coalesced(&*arena);
}
