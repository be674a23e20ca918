//! Backend selection from configuration files and explicit collaborators.

use std::sync::Arc;

use tempfile::tempdir;

use table_store_core::nosql::{InMemoryCoordinator, MemoryKvStore};
use table_store_core::sql::MemoryDatabase;
use table_store_core::{
    Backends, StorageBackendKind, StorageProviders, StoreConfig, StoreError,
};

#[test]
fn test_providers_from_config_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.toml");
    std::fs::write(
        &path,
        r#"
            storage_implementation = "NoSQL"
            tx_client_provider = "thread-local"
        "#,
    )
    .unwrap();

    let config = StoreConfig::from_file(&path).unwrap();
    let providers = StorageProviders::from_config(&config).unwrap();
    assert_eq!(providers.kind(), StorageBackendKind::NoSql);
    assert_eq!(providers.runner().kind(), StorageBackendKind::NoSql);
    assert_eq!(providers.admin().kind(), StorageBackendKind::NoSql);
    assert_eq!(providers.registry().kind(), StorageBackendKind::NoSql);
}

#[test]
fn test_every_capability_reports_the_selected_kind() {
    for (value, expected) in [
        ("nosql", StorageBackendKind::NoSql),
        ("sql", StorageBackendKind::Sql),
    ] {
        let providers = StorageProviders::from_config(&StoreConfig::with_storage(value)).unwrap();
        let kinds = [
            providers.runner().kind(),
            providers.admin().kind(),
            providers.registry().kind(),
        ];
        assert!(kinds.iter().all(|kind| *kind == expected), "{}: {:?}", value, kinds);
    }
}

#[test]
fn test_unsupported_backend_is_fatal() {
    let err = StorageProviders::from_config(&StoreConfig::with_storage("leveldb")).unwrap_err();
    match err {
        StoreError::Configuration(msg) => {
            assert!(msg.contains("nosql"));
            assert!(msg.contains("sql"));
        }
        other => panic!("expected configuration error, got {:?}", other),
    }
}

#[test]
fn test_from_parts_uses_supplied_collaborators() {
    let db = MemoryDatabase::new("memory://shared", 2, std::time::Duration::from_millis(100));
    let providers =
        StorageProviders::from_parts(&StoreConfig::with_storage("sql"), Backends::sql(Arc::new(db.clone())))
            .unwrap();
    assert_eq!(providers.kind(), StorageBackendKind::Sql);
    // The registry table is created at startup
    assert_eq!(db.table_names(), vec!["structured_table_registry".to_string()]);

    let providers = StorageProviders::from_parts(
        &StoreConfig::with_storage("nosql"),
        Backends::nosql(
            Arc::new(InMemoryCoordinator::new()),
            Arc::new(MemoryKvStore::new()),
        ),
    )
    .unwrap();
    assert_eq!(providers.kind(), StorageBackendKind::NoSql);
}

#[test]
fn test_invalid_bounds_rejected_before_wiring() {
    let config = StoreConfig {
        tx_client_pool_size: 0,
        ..StoreConfig::with_storage("nosql")
    };
    assert!(matches!(
        StorageProviders::from_config(&config),
        Err(StoreError::Configuration(_))
    ));
}
