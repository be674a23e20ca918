//! Client provider bounds, pool exhaustion, and conflicting writers.

use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ntest::timeout;

use table_store_core::nosql::{InMemoryCoordinator, MemoryKvStore};
use table_store_core::{StoreConfig, StoreError, TransactionRunnerExt};

use crate::helpers::{count_in, counter_row, counter_schema, nosql_providers, CountingConnector};

fn pooled_config(size: usize, timeout_ms: u64) -> StoreConfig {
    StoreConfig {
        tx_client_pool_size: size,
        tx_client_obtain_timeout_ms: timeout_ms,
        ..StoreConfig::with_storage("nosql")
    }
}

#[timeout(10000)]
#[test]
fn test_pool_bounds_concurrent_transactions() {
    let connector = CountingConnector::new(InMemoryCoordinator::new());
    let counters = connector.counters.clone();
    let providers = nosql_providers(
        pooled_config(2, 5000),
        Arc::new(connector),
        Arc::new(MemoryKvStore::new()),
    );
    for table in ["t0", "t1", "t2"] {
        providers.admin().create_table(&counter_schema(table)).unwrap();
    }

    std::thread::scope(|s| {
        let handles: Vec<_> = ["t0", "t1", "t2"]
            .into_iter()
            .map(|table| {
                let runner = providers.runner();
                s.spawn(move || {
                    runner.run(|ctx| {
                        ctx.table(table)?.upsert(counter_row("w", 1))?;
                        std::thread::sleep(Duration::from_millis(50));
                        Ok(())
                    })
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
    });

    assert!(counters.peak_in_flight.load(Ordering::SeqCst) <= 2);
    assert!(counters.connections.load(Ordering::SeqCst) <= 2);
    for table in ["t0", "t1", "t2"] {
        assert_eq!(count_in(&providers, table, "w"), Some(1));
    }
}

#[timeout(5000)]
#[test]
fn test_exhausted_pool_times_out() {
    let providers = nosql_providers(
        pooled_config(1, 100),
        Arc::new(InMemoryCoordinator::new()),
        Arc::new(MemoryKvStore::new()),
    );
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    std::thread::scope(|s| {
        let runner = providers.runner();
        let holder = s.spawn(move || {
            runner.run(|_| {
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                Ok(())
            })
        });
        started_rx.recv().unwrap();

        let start = Instant::now();
        let err = providers.runner().run(|_| Ok(())).unwrap_err();
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert!(matches!(err, StoreError::PoolTimeout { .. }), "{:?}", err);
        assert!(err.is_retryable());

        release_tx.send(()).unwrap();
        holder.join().unwrap().unwrap();
    });

    // The client came back
    providers.runner().run(|_| Ok(())).unwrap();
}

#[timeout(5000)]
#[test]
fn test_thread_local_clients_are_per_thread() {
    let connector = CountingConnector::new(InMemoryCoordinator::new());
    let counters = connector.counters.clone();
    let config = StoreConfig {
        tx_client_provider: "thread-local".to_string(),
        ..StoreConfig::with_storage("nosql")
    };
    let providers = nosql_providers(config, Arc::new(connector), Arc::new(MemoryKvStore::new()));
    providers.admin().create_table(&counter_schema("tl")).unwrap();

    std::thread::scope(|s| {
        for worker in 0..2 {
            let runner = providers.runner();
            s.spawn(move || {
                for i in 0..5 {
                    let name = format!("w{}-{}", worker, i);
                    runner
                        .run(|ctx| ctx.table("tl")?.upsert(counter_row(&name, i)))
                        .unwrap();
                }
            });
        }
    });

    assert_eq!(counters.connections.load(Ordering::SeqCst), 2);
    assert_eq!(count_in(&providers, "tl", "w1-4"), Some(4));
}

#[timeout(5000)]
#[test]
fn test_conflicting_writer_is_aborted() {
    let coordinator = InMemoryCoordinator::new();
    let providers = nosql_providers(
        StoreConfig::with_storage("nosql"),
        Arc::new(coordinator.clone()),
        Arc::new(MemoryKvStore::new()),
    );
    providers.admin().create_table(&counter_schema("stock")).unwrap();
    providers
        .runner()
        .run(|ctx| ctx.table("stock")?.upsert(counter_row("apples", 10)))
        .unwrap();

    let (ready_tx, ready_rx) = mpsc::channel();
    let (go_tx, go_rx) = mpsc::channel::<()>();

    std::thread::scope(|s| {
        let runner = providers.runner();
        let slow = s.spawn(move || {
            runner.run(|ctx| {
                let mut stock = ctx.table("stock")?;
                stock.upsert(counter_row("apples", 9))?;
                ready_tx.send(()).unwrap();
                go_rx.recv().unwrap();
                Ok(())
            })
        });

        ready_rx.recv().unwrap();
        providers
            .runner()
            .run(|ctx| ctx.table("stock")?.upsert(counter_row("apples", 5)))
            .unwrap();
        go_tx.send(()).unwrap();

        let err = slow.join().unwrap().unwrap_err();
        assert!(matches!(err, StoreError::TransactionAborted(_)), "{:?}", err);
    });

    assert_eq!(count_in(&providers, "stock", "apples"), Some(5));
    assert_eq!(coordinator.in_progress_count(), 0);
}

#[timeout(5000)]
#[test]
fn test_disjoint_writers_both_commit() {
    let providers = nosql_providers(
        StoreConfig::with_storage("nosql"),
        Arc::new(InMemoryCoordinator::new()),
        Arc::new(MemoryKvStore::new()),
    );
    providers.admin().create_table(&counter_schema("stock")).unwrap();

    let (ready_tx, ready_rx) = mpsc::channel();
    let (go_tx, go_rx) = mpsc::channel::<()>();

    std::thread::scope(|s| {
        let runner = providers.runner();
        let slow = s.spawn(move || {
            runner.run(|ctx| {
                ctx.table("stock")?.upsert(counter_row("pears", 3))?;
                ready_tx.send(()).unwrap();
                go_rx.recv().unwrap();
                Ok(())
            })
        });

        ready_rx.recv().unwrap();
        providers
            .runner()
            .run(|ctx| ctx.table("stock")?.upsert(counter_row("plums", 7)))
            .unwrap();
        go_tx.send(()).unwrap();
        slow.join().unwrap().unwrap();
    });

    assert_eq!(count_in(&providers, "stock", "pears"), Some(3));
    assert_eq!(count_in(&providers, "stock", "plums"), Some(7));
}
