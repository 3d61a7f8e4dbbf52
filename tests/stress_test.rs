use std::sync::Arc;
use std::sync::Barrier;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::thread;

use tether_sync::OrderedMap;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_concurrent_store_disjoint_keys() {
    init_tracing();
    let map = Arc::new(OrderedMap::new());
    let threads = 8;
    let per_thread = 2000;

    let mut handles = vec![];
    for t in 0..threads {
        let m = map.clone();
        handles.push(thread::spawn(move || {
            for i in 0..per_thread {
                let key = t * per_thread + i;
                m.store(key, key * 3);
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(map.len(), threads * per_thread);
    for key in 0..threads * per_thread {
        assert_eq!(map.load(&key), Some(key * 3));
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_per_thread_order_is_preserved() {
    let map = Arc::new(OrderedMap::new());
    let threads = 4;
    let per_thread = 1000;

    let mut handles = vec![];
    for t in 0..threads {
        let m = map.clone();
        handles.push(thread::spawn(move || {
            for i in 0..per_thread {
                m.store((t, i), ());
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    // Interleaving across threads is arbitrary, but each thread's keys must
    // appear in the order that thread stored them.
    let mut last_seen = vec![None; threads];
    map.range(|&(t, i), _| {
        if let Some(prev) = last_seen[t] {
            assert!(i > prev, "thread {t}: {i} visited after {prev}");
        }
        last_seen[t] = Some(i);
        true
    });
    assert!(last_seen.iter().all(|last| *last == Some(per_thread - 1)));
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_load_or_store_single_winner() {
    let map = Arc::new(OrderedMap::new());
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let stored = Arc::new(AtomicUsize::new(0));

    let mut handles = vec![];
    for t in 0..threads {
        let m = map.clone();
        let barrier = barrier.clone();
        let stored = stored.clone();
        handles.push(thread::spawn(move || {
            barrier.wait();
            let mut winners = vec![];
            for key in 0..500 {
                let (value, loaded) = m.load_or_store(key, t);
                if !loaded {
                    assert_eq!(value, t);
                    stored.fetch_add(1, Ordering::Relaxed);
                    winners.push(key);
                }
            }
            winners
        }));
    }

    let mut all_winners = vec![];
    for h in handles {
        all_winners.extend(h.join().unwrap());
    }

    assert_eq!(stored.load(Ordering::Relaxed), 500);
    all_winners.sort_unstable();
    assert_eq!(all_winners, (0..500).collect::<Vec<_>>());
    assert_eq!(map.len(), 500);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_range_while_mutating() {
    init_tracing();
    let map = Arc::new(OrderedMap::new());
    for i in 0..1000 {
        map.store(i, i);
    }

    let mut handles = vec![];

    // Writers churn through the key space: delete and re-insert.
    for t in 0..4 {
        let m = map.clone();
        handles.push(thread::spawn(move || {
            for round in 0..20 {
                for i in (t..1000).step_by(4) {
                    if (i + round) % 3 == 0 {
                        m.delete(&i);
                    } else {
                        m.store(i, i + round);
                    }
                }
            }
        }));
    }

    // Readers traverse concurrently; every visited entry must be well formed.
    for _ in 0..4 {
        let m = map.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..50 {
                m.range(|&key, &value| {
                    assert!(key < 1000);
                    assert!(value >= key && value < key + 20);
                    true
                });
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    let mut count = 0;
    map.range(|_, _| {
        count += 1;
        true
    });
    assert_eq!(count, map.len());
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_concurrent_drain_via_range() {
    let map = Arc::new(OrderedMap::new());
    let size = 5000;
    for i in 0..size {
        map.store(i, ());
    }

    let removed = Arc::new(AtomicUsize::new(0));
    let mut handles = vec![];
    for _ in 0..4 {
        let m = map.clone();
        let removed = removed.clone();
        handles.push(thread::spawn(move || {
            // Restart until the map is empty: a traversal may end early when
            // another thread removes both its position and successor.
            while !m.is_empty() {
                m.range(|key, _| {
                    if m.load_and_delete(key).is_some() {
                        removed.fetch_add(1, Ordering::Relaxed);
                    }
                    true
                });
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    assert!(map.is_empty());
    assert_eq!(removed.load(Ordering::Relaxed), size);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_read_heavy() {
    let map = Arc::new(OrderedMap::new());

    for i in 0..1000 {
        map.store(i, i * 2);
    }

    let mut handles = vec![];

    for _ in 0..8 {
        let m = map.clone();
        handles.push(thread::spawn(move || {
            for i in 0..10_000 {
                let key = i % 1000;
                assert_eq!(m.load(&key), Some(key * 2));
            }
        }));
    }

    {
        let m = map.clone();
        handles.push(thread::spawn(move || {
            for i in 1000..2000 {
                m.store(i, i * 2);
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(map.len(), 2000);
    let keys: Vec<_> = map.all().map(|(key, _)| key).collect();
    assert_eq!(keys, (0..2000).collect::<Vec<_>>());
}
