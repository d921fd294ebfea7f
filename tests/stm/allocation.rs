//! Allocation Tests
//!
//! Dynamic segments: allocation, free, deferred reclamation.

use crate::common::*;
use std::sync::Barrier;
use std::thread;
use tl2_stm::{Error, Stm, VirtualAddress};

fn read_word(stm: &Stm, address: VirtualAddress) -> i64 {
    let mut tx = stm.begin(true);
    let value = read_i64(&mut tx, address).unwrap();
    assert!(tx.end());
    value
}

#[test]
fn allocated_segment_is_zeroed_and_usable() {
    let stm = Stm::create(64, 8).unwrap();

    let mut tx = stm.begin(false);
    let seg = tx.alloc(256).unwrap();
    assert_eq!(seg.offset(), 0);

    let mut out = [0xFFu8; 256];
    tx.read(seg, &mut out).unwrap();
    assert!(out.iter().all(|&b| b == 0));

    write_i64(&mut tx, seg.add(248).unwrap(), 77).unwrap();
    assert!(tx.end());

    assert_eq!(read_word(&stm, seg.add(248).unwrap()), 77);
    assert_eq!(stm.segment_count(), 1);
}

#[test]
fn alloc_in_read_only_transaction() {
    let stm = Stm::create(64, 8).unwrap();
    let mut tx = stm.begin(true);
    let seg = tx.alloc(64).unwrap();
    assert_eq!(read_i64(&mut tx, seg).unwrap(), 0);
    assert!(tx.end());
}

#[test]
fn alloc_survives_abort() {
    let stm = Stm::create(64, 8).unwrap();

    let mut tx = stm.begin(false);
    read_i64(&mut tx, word(&stm, 0)).unwrap();
    let seg = tx.alloc(32).unwrap();
    write_i64(&mut tx, seg, 5).unwrap();

    let mut other = stm.begin(false);
    write_i64(&mut other, word(&stm, 0), 1).unwrap();
    assert!(other.end());
    assert!(!tx.end());

    // The segment exists; the buffered write does not.
    assert_eq!(read_word(&stm, seg), 0);
}

#[test]
fn bad_alloc_size_keeps_transaction_alive() {
    let stm = Stm::create(64, 8).unwrap();
    let mut tx = stm.begin(false);
    assert!(tx.alloc(0).is_err());
    assert!(tx.alloc(20).is_err());
    assert!(tx.is_active());
    write_i64(&mut tx, word(&stm, 0), 1).unwrap();
    assert!(tx.end());
}

#[test]
fn segments_never_alias() {
    let stm = Stm::create(64, 8).unwrap();
    let mut tx = stm.begin(false);
    let a = tx.alloc(16).unwrap();
    let b = tx.alloc(16).unwrap();
    assert_ne!(a.segment(), b.segment());
    write_i64(&mut tx, a, 1).unwrap();
    write_i64(&mut tx, b, 2).unwrap();
    write_i64(&mut tx, stm.start(), 3).unwrap();
    assert!(tx.end());

    assert_eq!(read_word(&stm, a), 1);
    assert_eq!(read_word(&stm, b), 2);
    assert_eq!(read_word(&stm, stm.start()), 3);
}

#[test]
fn access_beyond_allocated_size_is_rejected() {
    let stm = Stm::create(64, 8).unwrap();
    let mut tx = stm.begin(false);
    let seg = tx.alloc(16).unwrap();
    assert!(matches!(
        tx.read(seg.add(16).unwrap(), &mut [0; 8]),
        Err(Error::InvalidAddress(_))
    ));
}

// ============================================================================
// Free
// ============================================================================

#[test]
fn free_then_sweep_unmaps_segment() {
    let stm = Stm::create(64, 8).unwrap();
    let mut tx = stm.begin(false);
    let seg = tx.alloc(16).unwrap();
    tx.free(seg).unwrap();
    // Still usable until the freeing transaction ends.
    assert_eq!(read_i64(&mut tx, seg).unwrap(), 0);
    assert!(tx.end());

    // Retired but not yet swept: unreachable for new transactions.
    assert_eq!(stm.segment_count(), 1);
    let mut tx = stm.begin(true);
    assert!(matches!(
        tx.read(seg, &mut [0; 8]),
        Err(Error::InvalidAddress(_))
    ));

    assert_eq!(stm.sweep(), 1);
    assert_eq!(stm.segment_count(), 0);
    let mut tx = stm.begin(true);
    assert!(matches!(
        tx.read(seg, &mut [0; 8]),
        Err(Error::InvalidAddress(_))
    ));
}

#[test]
fn free_rejects_bad_addresses() {
    let stm = Stm::create(64, 8).unwrap();
    let mut tx = stm.begin(false);
    let seg = tx.alloc(16).unwrap();

    assert!(matches!(tx.free(stm.start()), Err(Error::InvalidOperation(_))));
    assert!(matches!(
        tx.free(seg.add(8).unwrap()),
        Err(Error::InvalidOperation(_))
    ));
    tx.free(seg).unwrap();
    assert!(matches!(tx.free(seg), Err(Error::InvalidOperation(_))));
    assert!(tx.is_active());
    assert!(tx.end());
}

#[test]
fn sweep_runs_at_threshold() {
    let stm = Stm::builder().size(64).sweep_threshold(4).open().unwrap();
    let mut tx = stm.begin(false);
    let segs: Vec<_> = (0..4).map(|_| tx.alloc(8).unwrap()).collect();
    for &seg in &segs {
        tx.free(seg).unwrap();
    }
    assert_eq!(stm.segment_count(), 4);
    assert!(tx.end());
    assert_eq!(stm.segment_count(), 0);

    let mut tx = stm.begin(false);
    let segs: Vec<_> = (0..3).map(|_| tx.alloc(8).unwrap()).collect();
    for &seg in &segs {
        tx.free(seg).unwrap();
    }
    assert!(tx.end());
    assert_eq!(stm.segment_count(), 3);
}

#[test]
fn transaction_keeps_freed_segment_alive() {
    let stm = Stm::builder().size(64).sweep_threshold(1).open().unwrap();

    let mut setup = stm.begin(false);
    let seg = setup.alloc(16).unwrap();
    write_i64(&mut setup, seg, 42).unwrap();
    assert!(setup.end());

    let mut reader = stm.begin(true);
    assert_eq!(read_i64(&mut reader, seg).unwrap(), 42);

    let mut freer = stm.begin(false);
    freer.free(seg).unwrap();
    assert!(freer.end());
    // The reader holds the retirement back.
    assert_eq!(stm.segment_count(), 1);

    assert_eq!(read_i64(&mut reader, seg.add(8).unwrap()).unwrap(), 0);
    assert!(reader.end());
    assert_eq!(stm.sweep(), 1);
    assert_eq!(stm.segment_count(), 0);
}

#[test]
fn in_flight_transaction_resolves_segment_freed_after_it_began() {
    let stm = Stm::builder().size(64).sweep_threshold(1).open().unwrap();

    let mut setup = stm.begin(false);
    let seg = setup.alloc(16).unwrap();
    write_i64(&mut setup, seg, 7).unwrap();
    assert!(setup.end());

    // Begins and touches only the default segment.
    let mut tx = stm.begin(false);
    assert_eq!(read_i64(&mut tx, stm.start()).unwrap(), 0);

    let mut freer = stm.begin(false);
    freer.free(seg).unwrap();
    assert!(freer.end());

    // First resolution of the freed segment happens now.
    assert_eq!(read_i64(&mut tx, seg).unwrap(), 7);
    assert!(tx.end());
}

#[test]
fn ids_are_recycled_past_the_id_space() {
    const CYCLES: i64 = 70_000;

    let stm = Stm::builder().size(64).sweep_threshold(64).open().unwrap();
    for i in 0..CYCLES {
        let mut tx = stm.begin(false);
        let seg = tx.alloc(8).unwrap();
        assert_eq!(read_i64(&mut tx, seg).unwrap(), 0, "cycle {}", i);
        write_i64(&mut tx, seg, i).unwrap();
        tx.free(seg).unwrap();
        assert!(tx.end());
    }
    assert!(stm.segment_count() < 64);

    let mut tx = stm.begin(false);
    let seg = tx.alloc(8).unwrap();
    assert_eq!(read_i64(&mut tx, seg).unwrap(), 0);
    assert!(tx.end());
}

#[test]
fn concurrent_alloc_free_never_shares_segments() {
    const THREADS: usize = 4;
    const ROUNDS: usize = 50;
    const LIVE: usize = 4;

    let stm = Stm::builder().size(64).sweep_threshold(8).open().unwrap();
    let barrier = Barrier::new(THREADS);

    thread::scope(|s| {
        for t in 0..THREADS {
            let stm = &stm;
            let barrier = &barrier;
            s.spawn(move || {
                barrier.wait();
                for round in 0..ROUNDS {
                    let tag = |k: usize| ((t * ROUNDS + round) * LIVE + k) as i64;

                    let mut tx = stm.begin(false);
                    let segs: Vec<VirtualAddress> =
                        (0..LIVE).map(|_| tx.alloc(16).unwrap()).collect();
                    for (k, &seg) in segs.iter().enumerate() {
                        assert_eq!(read_i64(&mut tx, seg).unwrap(), 0);
                        write_i64(&mut tx, seg, tag(k)).unwrap();
                    }
                    assert!(tx.end());

                    // Every live segment still holds its own tag.
                    let mut tx = stm.begin(false);
                    for (k, &seg) in segs.iter().enumerate() {
                        assert_eq!(read_i64(&mut tx, seg).unwrap(), tag(k));
                    }
                    for &seg in &segs {
                        tx.free(seg).unwrap();
                    }
                    assert!(tx.end());
                }
            });
        }
    });

    stm.sweep();
    assert_eq!(stm.segment_count(), 0);
}
