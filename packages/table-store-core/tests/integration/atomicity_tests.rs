//! All-or-nothing behaviour of units of work on both backends.

use std::sync::Arc;

use ntest::timeout;

use table_store_core::nosql::InMemoryCoordinator;
use table_store_core::{StoreConfig, StoreError, TransactionRunnerExt, Value};

use crate::helpers::{
    count_in, counter_row, counter_schema, local_providers, nosql_providers, FlakyKvStore,
};

const BACKENDS: [&str; 2] = ["nosql", "sql"];

#[timeout(5000)]
#[test]
fn test_successful_work_is_visible_afterwards() {
    for backend in BACKENDS {
        let providers = local_providers(backend);
        providers.admin().create_table(&counter_schema("a")).unwrap();
        providers.admin().create_table(&counter_schema("b")).unwrap();

        providers
            .runner()
            .run(|ctx| {
                ctx.table("a")?.upsert(counter_row("x", 1))?;
                ctx.table("b")?.upsert(counter_row("y", 2))?;
                ctx.table("a")?.upsert(counter_row("z", 3))
            })
            .unwrap();

        assert_eq!(count_in(&providers, "a", "x"), Some(1), "{}", backend);
        assert_eq!(count_in(&providers, "b", "y"), Some(2), "{}", backend);
        assert_eq!(count_in(&providers, "a", "z"), Some(3), "{}", backend);
    }
}

#[timeout(5000)]
#[test]
fn test_failed_work_leaves_nothing_behind() {
    for backend in BACKENDS {
        let providers = local_providers(backend);
        providers.admin().create_table(&counter_schema("a")).unwrap();
        providers.admin().create_table(&counter_schema("b")).unwrap();
        providers
            .runner()
            .run(|ctx| ctx.table("a")?.upsert(counter_row("kept", 1)))
            .unwrap();

        let err = providers
            .runner()
            .run(|ctx| {
                ctx.table("a")?.upsert(counter_row("kept", 100))?;
                ctx.table("b")?.upsert(counter_row("new", 1))?;
                ctx.table("a")?.delete(&[Value::from("kept")])?;
                Err::<(), _>(StoreError::WorkFailed("validation failed".to_string()))
            })
            .unwrap_err();
        assert_eq!(err, StoreError::WorkFailed("validation failed".to_string()));

        assert_eq!(count_in(&providers, "a", "kept"), Some(1), "{}", backend);
        assert_eq!(count_in(&providers, "b", "new"), None, "{}", backend);
    }
}

#[timeout(5000)]
#[test]
fn test_panicking_work_is_rolled_back() {
    for backend in BACKENDS {
        let providers = local_providers(backend);
        providers.admin().create_table(&counter_schema("a")).unwrap();

        let err = providers
            .runner()
            .run(|ctx| -> table_store_core::Result<()> {
                ctx.table("a")?.upsert(counter_row("x", 1))?;
                panic!("index out of range");
            })
            .unwrap_err();
        assert_eq!(err, StoreError::WorkPanicked("index out of range".to_string()));
        assert_eq!(count_in(&providers, "a", "x"), None, "{}", backend);

        // The runner stays usable
        providers
            .runner()
            .run(|ctx| ctx.table("a")?.upsert(counter_row("x", 2)))
            .unwrap();
        assert_eq!(count_in(&providers, "a", "x"), Some(2), "{}", backend);
    }
}

#[timeout(5000)]
#[test]
fn test_work_runs_exactly_once() {
    for backend in BACKENDS {
        let providers = local_providers(backend);
        let mut calls = 0;
        let value = providers
            .runner()
            .run(|_| {
                calls += 1;
                Ok(42)
            })
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(calls, 1);
    }
}

#[timeout(5000)]
#[test]
fn test_failed_participant_rolls_back_the_others() {
    let coordinator = InMemoryCoordinator::new();
    let store = Arc::new(FlakyKvStore::default());
    let providers = nosql_providers(
        StoreConfig::with_storage("nosql"),
        Arc::new(coordinator.clone()),
        store.clone(),
    );
    providers.admin().create_table(&counter_schema("a")).unwrap();
    providers.admin().create_table(&counter_schema("b")).unwrap();
    store.fail_writes_to("b");

    let err = providers
        .runner()
        .run(|ctx| {
            ctx.table("a")?.upsert(counter_row("x", 1))?;
            ctx.table("b")?.upsert(counter_row("y", 1))
        })
        .unwrap_err();
    assert!(matches!(err, StoreError::TransactionAborted(_)), "{:?}", err);
    assert!(err.is_retryable());

    // "a" persisted first and was undone
    assert_eq!(store.inner.version_count("a").unwrap(), 0);
    assert_eq!(count_in(&providers, "a", "x"), None);
    assert_eq!(coordinator.in_progress_count(), 0);
    assert_eq!(coordinator.invalid_count(), 0);
}

#[timeout(5000)]
#[test]
fn test_failed_rollback_invalidates_transaction() {
    let coordinator = InMemoryCoordinator::new();
    let store = Arc::new(FlakyKvStore::default());
    let providers = nosql_providers(
        StoreConfig::with_storage("nosql"),
        Arc::new(coordinator.clone()),
        store.clone(),
    );
    providers.admin().create_table(&counter_schema("a")).unwrap();
    providers.admin().create_table(&counter_schema("b")).unwrap();
    store.fail_writes_to("b");
    store.fail_undo(true);

    let err = providers
        .runner()
        .run(|ctx| {
            ctx.table("a")?.upsert(counter_row("x", 1))?;
            ctx.table("b")?.upsert(counter_row("y", 1))
        })
        .unwrap_err();
    assert!(matches!(err, StoreError::TransactionAborted(_)));

    // The leftover version stays in storage but is never visible
    assert_eq!(store.inner.version_count("a").unwrap(), 1);
    assert_eq!(coordinator.invalid_count(), 1);
    assert_eq!(count_in(&providers, "a", "x"), None);
}

#[timeout(5000)]
#[test]
fn test_sql_commit_failure_is_aborted_and_invisible() {
    let db = table_store_core::sql::MemoryDatabase::new(
        "memory://flaky",
        4,
        std::time::Duration::from_millis(200),
    );
    let providers = table_store_core::StorageProviders::from_parts(
        &StoreConfig::with_storage("sql"),
        table_store_core::Backends::sql(Arc::new(db.clone())),
    )
    .unwrap();
    providers.admin().create_table(&counter_schema("a")).unwrap();

    db.set_fail_commits(true);
    let err = providers
        .runner()
        .run(|ctx| ctx.table("a")?.upsert(counter_row("x", 1)))
        .unwrap_err();
    assert!(matches!(err, StoreError::TransactionAborted(_)));
    db.set_fail_commits(false);

    assert_eq!(count_in(&providers, "a", "x"), None);
    assert_eq!(db.connection_stats().outstanding, 0);
}
