//! Integration tests for the slab layer against the crate's public surface.

use tc_slab_alloc::{Arena, Slab, NUM_CLASSES, SIZE_CLASSES};

#[test]
fn size_classes_table_is_sorted_and_matches_spec_count() {
    assert_eq!(NUM_CLASSES, 21);
    assert!(SIZE_CLASSES.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(SIZE_CLASSES[0], 8);
    assert_eq!(SIZE_CLASSES[NUM_CLASSES - 1], 4_194_304);
}

#[test]
fn every_class_can_allocate_and_free_once() {
    let mut arena = Arena::new();
    arena.init();
    let mut slab = Slab::new();
    slab.init();

    let mut ptrs = Vec::with_capacity(NUM_CLASSES);
    for &size in SIZE_CLASSES.iter().take(18) {
        // Skip the top three classes here; covered directly by the ignored
        // full-range scenario in `src/slab.rs`'s own unit tests.
        let p = slab.alloc(&mut arena, size);
        assert!(!p.is_null(), "allocation failed for size {size}");
        ptrs.push((p, size));
    }

    for (p, size) in ptrs.into_iter().rev() {
        unsafe { slab.free(p, size) };
    }

    arena.destroy();
}

#[test]
fn freed_nodes_are_reused_lifo_within_a_class() {
    let mut arena = Arena::new();
    arena.init();
    let mut slab = Slab::new();
    slab.init();

    let first = slab.alloc(&mut arena, 256);
    let second = slab.alloc(&mut arena, 256);
    assert_ne!(first, second);

    unsafe {
        slab.free(second, 256);
        slab.free(first, 256);
    }

    // LIFO: the most recently freed node (`first`) comes back first.
    let reused = slab.alloc(&mut arena, 256);
    assert_eq!(reused, first);

    arena.destroy();
}
