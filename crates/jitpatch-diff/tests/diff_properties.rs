//! Diff/apply properties over page-sized snapshots.
//!
//! Snapshots come from seeded `fastrand` generators so every run sees the
//! same inputs.

use fastrand::Rng;
use jitpatch_diff::{MemorySnapshot, SparseDiff};
use jitpatch_types::abi::WASM_PAGE_SIZE;
use jitpatch_types::{ErrorKind, HarnessError};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn random_snapshot(rng: &mut Rng, pages: usize) -> MemorySnapshot {
    let mut bytes = vec![0u8; pages * WASM_PAGE_SIZE];
    rng.fill(&mut bytes);
    MemorySnapshot::new(bytes)
}

/// Copy of `base` with roughly one byte in `stride` rewritten.
fn mutate(rng: &mut Rng, base: &MemorySnapshot, stride: u64) -> MemorySnapshot {
    let mut out = base.clone();
    for byte in out.as_bytes_mut() {
        if rng.u64(0..stride) == 0 {
            *byte = byte.wrapping_add(rng.u8(1..=255));
        }
    }
    out
}

// ══════════════════════════════════════════════════════════════════════════════
// Properties
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn apply_reproduces_after_snapshot() {
    let mut rng = Rng::with_seed(0x9E37_79B9_7F4A_7C15);
    for stride in [1, 3, 97, 4096] {
        let before = random_snapshot(&mut rng, 1);
        let after = mutate(&mut rng, &before, stride);

        let diff = SparseDiff::between(before.as_bytes(), after.as_bytes()).unwrap();
        let mut replayed = before.clone();
        diff.apply_to(replayed.as_bytes_mut()).unwrap();

        assert_eq!(replayed, after, "stride {stride}");
    }
}

#[test]
fn diff_only_covers_changed_offsets() {
    let mut rng = Rng::with_seed(42);
    let before = random_snapshot(&mut rng, 1);
    let after = mutate(&mut rng, &before, 50);
    let diff = SparseDiff::between(before.as_bytes(), after.as_bytes()).unwrap();

    let changed = before
        .as_bytes()
        .iter()
        .zip(after.as_bytes())
        .filter(|(a, b)| a != b)
        .count();
    assert_eq!(diff.len(), changed);
    for (offset, value) in diff.iter() {
        assert_ne!(before.as_bytes()[offset], value);
        assert_eq!(after.as_bytes()[offset], value);
    }
}

#[test]
fn self_diff_is_empty() {
    let mut rng = Rng::with_seed(7);
    let snap = random_snapshot(&mut rng, 2);
    assert!(SparseDiff::between(snap.as_bytes(), snap.as_bytes())
        .unwrap()
        .is_empty());
}

#[test]
fn unequal_lengths_always_fail() {
    let mut rng = Rng::with_seed(11);
    let one = random_snapshot(&mut rng, 1);
    let two = random_snapshot(&mut rng, 2);

    for (a, b) in [(&one, &two), (&two, &one)] {
        let err = SparseDiff::between(a.as_bytes(), b.as_bytes()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SizeMismatch);
    }
}

#[test]
fn diff_from_larger_memory_does_not_fit_smaller_target() {
    let mut rng = Rng::with_seed(13);
    let before = random_snapshot(&mut rng, 2);
    let mut after = before.clone();
    let last = after.len() - 1;
    after.as_bytes_mut()[last] ^= 0xFF;

    let diff = SparseDiff::between(before.as_bytes(), after.as_bytes()).unwrap();
    let mut small = vec![0u8; WASM_PAGE_SIZE];
    let err = diff.apply_to(&mut small).unwrap_err();
    assert!(matches!(err, HarnessError::OutOfBounds { .. }));
}

#[test]
fn text_round_trip_through_file() {
    let mut rng = Rng::with_seed(0xDEAD_BEEF);
    let before = random_snapshot(&mut rng, 1);
    let after = mutate(&mut rng, &before, 13);
    let diff = SparseDiff::between(before.as_bytes(), after.as_bytes()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("diff.txt");
    diff.save(&path).unwrap();
    let loaded = SparseDiff::load(&path).unwrap();
    assert_eq!(loaded, diff);

    let text = std::fs::read_to_string(&path).unwrap();
    let offsets: Vec<usize> = text
        .lines()
        .map(|l| l.split(' ').next().unwrap().parse().unwrap())
        .collect();
    assert!(offsets.windows(2).all(|w| w[0] < w[1]), "not ascending");
}
