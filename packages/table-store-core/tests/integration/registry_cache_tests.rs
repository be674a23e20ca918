//! Schema registry lookups through the cache on both backends.

use std::sync::Arc;

use table_store_core::nosql::{MemoryKvStore, NoSqlStructuredTableRegistry};
use table_store_core::{CachedStructuredTableRegistry, StoreError, StructuredTableRegistry};

use crate::helpers::{counter_schema, local_providers};

#[test]
fn test_lookups_are_idempotent() {
    for backend in ["nosql", "sql"] {
        let providers = local_providers(backend);
        let registry = providers.registry();

        for _ in 0..3 {
            assert_eq!(
                registry.get("visits"),
                Err(StoreError::TableNotFound("visits".to_string()))
            );
        }

        providers.admin().create_table(&counter_schema("visits")).unwrap();
        let first = registry.get("visits").unwrap();
        let second = registry.get("visits").unwrap();
        assert_eq!(first, second);
        assert_eq!(*first, counter_schema("visits"));
        assert_eq!(registry.table_names().unwrap(), vec!["visits".to_string()]);

        providers.admin().drop_table("visits").unwrap();
        assert!(matches!(
            registry.get("visits"),
            Err(StoreError::TableNotFound(_))
        ));
        assert!(registry.table_names().unwrap().is_empty(), "{}", backend);
    }
}

#[test]
fn test_concurrent_lookups_agree() {
    for backend in ["nosql", "sql"] {
        let providers = local_providers(backend);
        providers.admin().create_table(&counter_schema("hits")).unwrap();
        let expected = counter_schema("hits");

        std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let registry = providers.registry();
                    s.spawn(move || {
                        (0..50)
                            .map(|_| registry.get("hits").map(|schema| (*schema).clone()))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            for handle in handles {
                for lookup in handle.join().unwrap() {
                    assert_eq!(lookup.as_ref(), Ok(&expected), "{}", backend);
                }
            }
        });
    }
}

#[test]
fn test_changes_behind_the_cache_need_invalidation() {
    let backing: Arc<dyn StructuredTableRegistry> = Arc::new(NoSqlStructuredTableRegistry::new(
        Arc::new(MemoryKvStore::new()),
    ));
    let cached = CachedStructuredTableRegistry::new(backing.clone());

    assert!(cached.get("late").is_err());
    backing.register(&counter_schema("late")).unwrap();

    // The negative lookup is still cached
    assert_eq!(cached.get("late"), Err(StoreError::TableNotFound("late".to_string())));

    cached.invalidate("late");
    assert_eq!(*cached.get("late").unwrap(), counter_schema("late"));
    assert_eq!(cached.cached_len(), 1);

    cached.invalidate_all();
    assert_eq!(cached.cached_len(), 0);
}

#[test]
fn test_registration_through_cache_is_not_duplicated() {
    let cached = CachedStructuredTableRegistry::new(Arc::new(NoSqlStructuredTableRegistry::new(
        Arc::new(MemoryKvStore::new()),
    )));
    cached.register(&counter_schema("once")).unwrap();
    assert_eq!(
        cached.register(&counter_schema("once")),
        Err(StoreError::TableAlreadyExists("once".to_string()))
    );
    cached.remove("once").unwrap();
    assert_eq!(
        cached.remove("once"),
        Err(StoreError::TableNotFound("once".to_string()))
    );
}
