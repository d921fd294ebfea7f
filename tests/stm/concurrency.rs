//! Concurrency Tests
//!
//! Isolation and atomicity under real thread interleavings.

use crate::common::*;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use tl2_stm::{Error, Stm};

/// Move `amount` from word `from` to word `to`, retrying until it commits.
fn transfer(stm: &Stm, from: u64, to: u64, amount: i64) -> u64 {
    let mut attempts = 0;
    loop {
        attempts += 1;
        let mut tx = stm.begin(false);
        let result = (|| -> Result<(), Error> {
            let a = read_i64(&mut tx, word(stm, from))?;
            let b = read_i64(&mut tx, word(stm, to))?;
            write_i64(&mut tx, word(stm, from), a - amount)?;
            write_i64(&mut tx, word(stm, to), b + amount)
        })();
        match result {
            Ok(()) => {
                if tx.end() {
                    return attempts;
                }
            }
            Err(e) if e.is_retryable() => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}

// ============================================================================
// Conflicts
// ============================================================================

#[test]
fn conflicting_writers_at_most_one_commits() {
    let stm = Stm::create(64, 8).unwrap();

    let mut a = stm.begin(false);
    let mut b = stm.begin(false);
    for tx in [&mut a, &mut b] {
        let value = read_i64(tx, word(&stm, 0)).unwrap();
        write_i64(tx, word(&stm, 0), value + 1).unwrap();
    }

    let committed = [a.end(), b.end()];
    assert_eq!(committed, [true, false]);

    let mut tx = stm.begin(true);
    assert_eq!(read_i64(&mut tx, word(&stm, 0)).unwrap(), 1);
}

#[test]
fn disjoint_writers_both_commit() {
    let stm = Stm::create(64, 8).unwrap();

    let mut a = stm.begin(false);
    let mut b = stm.begin(false);
    write_i64(&mut a, word(&stm, 0), 1).unwrap();
    write_i64(&mut b, word(&stm, 1), 2).unwrap();
    assert!(a.end());
    assert!(b.end());

    let mut tx = stm.begin(true);
    assert_eq!(read_i64(&mut tx, word(&stm, 0)).unwrap(), 1);
    assert_eq!(read_i64(&mut tx, word(&stm, 1)).unwrap(), 2);
}

#[test]
fn concurrent_increments_are_not_lost() {
    const THREADS: usize = 4;
    const PER_THREAD: i64 = 500;

    let stm = Stm::create(64, 8).unwrap();
    let barrier = Barrier::new(THREADS);

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                barrier.wait();
                for _ in 0..PER_THREAD {
                    loop {
                        let mut tx = stm.begin(false);
                        let Ok(value) = read_i64(&mut tx, word(&stm, 0)) else {
                            continue;
                        };
                        if write_i64(&mut tx, word(&stm, 0), value + 1).is_ok() && tx.end() {
                            break;
                        }
                    }
                }
            });
        }
    });

    assert_eq!(snapshot_sum(&stm, 1), THREADS as i64 * PER_THREAD);
}

// ============================================================================
// Atomicity
// ============================================================================

/// Run `threads` threads of `transfers` alternating transfers between two
/// accounts and check the total is unchanged.
fn run_two_account_transfers(threads: usize, transfers: usize) {
    let stm = Stm::create(16, 8).unwrap();
    let barrier = Barrier::new(threads);

    thread::scope(|s| {
        for t in 0..threads {
            let stm = &stm;
            let barrier = &barrier;
            s.spawn(move || {
                barrier.wait();
                for i in 0..transfers {
                    let (from, to) = if (i + t) % 2 == 0 { (0, 1) } else { (1, 0) };
                    transfer(stm, from, to, (i % 7) as i64 + 1);
                }
            });
        }
    });

    assert_eq!(snapshot_sum(&stm, 2), 0);
    assert!(stm.metrics().committed >= (threads * transfers) as u64);
}

#[test]
fn transfers_conserve_total() {
    run_two_account_transfers(3, 2_000);
}

#[test]
#[ignore = "slow: 300k contended transfers"]
fn transfers_conserve_total_full_scale() {
    run_two_account_transfers(3, 100_000);
}

#[test]
fn randomized_transfers_conserve_total_under_observation() {
    const ACCOUNTS: u64 = 10;
    const WRITERS: usize = 4;
    const TRANSFERS: usize = 1_000;

    let stm = Arc::new(Stm::create(ACCOUNTS as usize * 8, 8).unwrap());
    let barrier = Arc::new(Barrier::new(WRITERS + 1));
    let observations = Arc::new(AtomicU64::new(0));

    let writers: Vec<_> = (0..WRITERS)
        .map(|_| {
            let stm = Arc::clone(&stm);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                barrier.wait();
                for _ in 0..TRANSFERS {
                    let from = rng.gen_range(0..ACCOUNTS);
                    let to = (from + rng.gen_range(1..ACCOUNTS)) % ACCOUNTS;
                    transfer(&stm, from, to, rng.gen_range(1..100));
                }
            })
        })
        .collect();

    // A read-only observer must never see money created or destroyed.
    let observer = {
        let stm = Arc::clone(&stm);
        let barrier = Arc::clone(&barrier);
        let observations = Arc::clone(&observations);
        thread::spawn(move || {
            barrier.wait();
            for _ in 0..200 {
                assert_eq!(snapshot_sum(&stm, ACCOUNTS), 0);
                observations.fetch_add(1, Ordering::Relaxed);
            }
        })
    };

    for w in writers {
        w.join().unwrap();
    }
    observer.join().unwrap();

    assert_eq!(observations.load(Ordering::Relaxed), 200);
    assert_eq!(snapshot_sum(&stm, ACCOUNTS), 0);

    let metrics = stm.metrics();
    assert!(metrics.committed >= (WRITERS * TRANSFERS) as u64);
}

#[test]
fn multi_word_writes_are_never_torn() {
    const WORDS: u64 = 8;
    const ROUNDS: i64 = 500;

    let stm = Stm::create(WORDS as usize * 8, 8).unwrap();
    let barrier = Barrier::new(3);

    thread::scope(|s| {
        s.spawn(|| {
            barrier.wait();
            for round in 1..=ROUNDS {
                loop {
                    let mut tx = stm.begin(false);
                    let ok = (0..WORDS).all(|i| write_i64(&mut tx, word(&stm, i), round).is_ok());
                    if ok && tx.end() {
                        break;
                    }
                }
            }
        });
        for _ in 0..2 {
            s.spawn(|| {
                barrier.wait();
                for _ in 0..ROUNDS {
                    let mut tx = stm.begin(true);
                    let mut out = vec![0u8; WORDS as usize * 8];
                    if tx.read(stm.start(), &mut out).is_err() {
                        continue;
                    }
                    let first = &out[..8];
                    assert!(out.chunks_exact(8).all(|w| w == first), "torn read: {:?}", out);
                    assert!(tx.end());
                }
            });
        }
    });
}

// ============================================================================
// Read-only transactions
// ============================================================================

#[test]
fn read_only_transactions_do_not_block_writers() {
    let stm = Stm::create(64, 8).unwrap();

    let mut reader = stm.begin(true);
    assert_eq!(read_i64(&mut reader, word(&stm, 0)).unwrap(), 0);

    let mut writer = stm.begin(false);
    write_i64(&mut writer, word(&stm, 0), 3).unwrap();
    assert!(writer.end());

    // Nothing recorded, nothing to validate.
    assert!(reader.end());
    assert_eq!(stm.metrics().total_aborted(), 0);
}

#[test]
fn many_read_only_transactions_in_parallel() {
    let stm = Stm::create(800, 8).unwrap();
    let mut tx = stm.begin(false);
    for i in 0..100 {
        write_i64(&mut tx, word(&stm, i), i as i64).unwrap();
    }
    assert!(tx.end());

    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for _ in 0..100 {
                    assert_eq!(snapshot_sum(&stm, 100), (0..100).sum::<i64>());
                }
            });
        }
    });
    assert_eq!(stm.metrics().total_aborted(), 0);
}
