//! Concurrent index tests: disjoint-range writers, readers racing writers.

use std::sync::Arc;
use stratum_buffer::BufferPoolManager;
use stratum_common::page::PageId;
use stratum_common::rid::RecordId;
use stratum_common::StorageConfig;
use stratum_disk::DiskManager;
use stratum_index::BPlusTree;

fn open_tree(dir: &std::path::Path) -> Arc<BPlusTree<u64>> {
    let config = StorageConfig {
        data_dir: dir.to_path_buf(),
        fsync_enabled: false,
        pool_size: 256,
        leaf_max_size: 4,
        internal_max_size: 4,
        ..Default::default()
    };
    let disk = Arc::new(DiskManager::open(&config).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(&config, disk));
    Arc::new(BPlusTree::new("conc", bpm, &config).unwrap())
}

fn rid(k: u64) -> RecordId {
    RecordId::new(PageId(k as u32), 0)
}

#[test]
fn test_concurrent_disjoint_inserts() {
    const THREADS: u64 = 4;
    const PER_THREAD: u64 = 250;

    let dir = tempfile::tempdir().unwrap();
    let tree = open_tree(dir.path());

    let mut handles = Vec::new();
    for t in 0..THREADS {
        let tree = Arc::clone(&tree);
        handles.push(std::thread::spawn(move || {
            let base = t * PER_THREAD;
            for k in base..base + PER_THREAD {
                assert!(tree.insert(&k, rid(k)).unwrap());
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    // The final ordered key list matches a serial run of the same inserts.
    let keys: Vec<u64> = tree.iter().unwrap().map(|i| i.unwrap().0).collect();
    assert_eq!(keys, (0..THREADS * PER_THREAD).collect::<Vec<_>>());
    for k in 0..THREADS * PER_THREAD {
        assert_eq!(tree.get_value(&k).unwrap(), Some(rid(k)));
    }
}

#[test]
fn test_concurrent_interleaved_key_space() {
    // Threads insert stripes of the key space, maximizing shared paths.
    const THREADS: u64 = 4;
    const TOTAL: u64 = 1000;

    let dir = tempfile::tempdir().unwrap();
    let tree = open_tree(dir.path());

    let mut handles = Vec::new();
    for t in 0..THREADS {
        let tree = Arc::clone(&tree);
        handles.push(std::thread::spawn(move || {
            let mut k = t;
            while k < TOTAL {
                assert!(tree.insert(&k, rid(k)).unwrap());
                k += THREADS;
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    let keys: Vec<u64> = tree.iter().unwrap().map(|i| i.unwrap().0).collect();
    assert_eq!(keys, (0..TOTAL).collect::<Vec<_>>());
}

#[test]
fn test_readers_race_writers() {
    // Readers hammer an already-loaded range while writers extend another;
    // reads must always see complete, correct values.
    let dir = tempfile::tempdir().unwrap();
    let tree = open_tree(dir.path());

    for k in 0..500u64 {
        tree.insert(&k, rid(k)).unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..3 {
        let tree = Arc::clone(&tree);
        handles.push(std::thread::spawn(move || {
            for round in 0..20u64 {
                for k in (0..500).step_by(13) {
                    let k = (k + round) % 500;
                    assert_eq!(tree.get_value(&k).unwrap(), Some(rid(k)));
                }
            }
        }));
    }
    for t in 0..2u64 {
        let tree = Arc::clone(&tree);
        handles.push(std::thread::spawn(move || {
            let base = 1000 + t * 500;
            for k in base..base + 500 {
                assert!(tree.insert(&k, rid(k)).unwrap());
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(tree.iter().unwrap().count(), 1500);
}

#[test]
fn test_concurrent_duplicate_inserts_single_winner() {
    // Every thread tries the same key set; exactly one insert per key may
    // succeed.
    const THREADS: usize = 4;
    const KEYS: u64 = 200;

    let dir = tempfile::tempdir().unwrap();
    let tree = open_tree(dir.path());

    let mut handles = Vec::new();
    for t in 0..THREADS {
        let tree = Arc::clone(&tree);
        handles.push(std::thread::spawn(move || {
            let mut won = 0u64;
            for k in 0..KEYS {
                if tree.insert(&k, rid(t as u64 * 10_000 + k)).unwrap() {
                    won += 1;
                }
            }
            won
        }));
    }

    let total_wins: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(total_wins, KEYS);
    assert_eq!(tree.iter().unwrap().count(), KEYS as usize);
}
