//! End-to-end table lifecycle scenarios.

use std::sync::Arc;

use ntest::timeout;

use table_store_core::sql::MemoryDatabase;
use table_store_core::{
    row, Backends, FieldType, StorageProviders, StoreConfig, StoreError, TableSchema,
    TransactionRunnerExt, Value,
};

use crate::helpers::{counter_row, counter_schema, local_providers};

fn orders_schema() -> TableSchema {
    TableSchema::builder("orders")
        .column("id", FieldType::Integer)
        .column("amount", FieldType::Decimal)
        .nullable_column("note", FieldType::String)
        .primary_key(["id"])
        .index("amount")
        .build()
        .unwrap()
}

fn amount(unscaled: i128) -> Value {
    Value::Decimal { unscaled, scale: 2 }
}

#[timeout(5000)]
#[test]
fn test_orders_lifecycle() {
    for backend in ["nosql", "sql"] {
        let providers = local_providers(backend);
        let admin = providers.admin();

        admin.create_table(&orders_schema()).unwrap();
        assert_eq!(*admin.get_schema("orders").unwrap(), orders_schema());
        assert!(admin.exists("orders").unwrap());
        assert_eq!(
            admin.create_table(&orders_schema()),
            Err(StoreError::TableAlreadyExists("orders".to_string()))
        );

        providers
            .runner()
            .run(|ctx| {
                let mut orders = ctx.table("orders")?;
                orders.upsert(row([("id", Value::Integer(2)), ("amount", amount(1999))]))?;
                orders.upsert(row([
                    ("id", Value::Integer(1)),
                    ("amount", amount(500)),
                    ("note", "gift".into()),
                ]))?;
                orders.upsert(row([("id", Value::Integer(2)), ("amount", amount(2499))]))
            })
            .unwrap();

        let rows = providers
            .runner()
            .run(|ctx| ctx.table("orders")?.scan())
            .unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.get("id").cloned()).collect();
        assert_eq!(ids, vec![Some(Value::Integer(1)), Some(Value::Integer(2))], "{}", backend);
        assert_eq!(rows[0].get("note"), Some(&Value::from("gift")));
        assert_eq!(rows[1].get("amount"), Some(&amount(2499)));

        admin.drop_table("orders").unwrap();
        assert_eq!(
            admin.get_schema("orders"),
            Err(StoreError::TableNotFound("orders".to_string()))
        );
        assert!(!admin.exists("orders").unwrap());
        let err = providers
            .runner()
            .run(|ctx| ctx.table("orders").map(|_| ()))
            .unwrap_err();
        assert_eq!(err, StoreError::TableNotFound("orders".to_string()));
    }
}

#[timeout(5000)]
#[test]
fn test_recreated_table_starts_empty() {
    for backend in ["nosql", "sql"] {
        let providers = local_providers(backend);
        providers.admin().create_table(&counter_schema("c")).unwrap();
        providers
            .runner()
            .run(|ctx| ctx.table("c")?.upsert(counter_row("x", 1)))
            .unwrap();

        providers.admin().drop_table("c").unwrap();
        providers.admin().create_table(&counter_schema("c")).unwrap();

        let rows = providers
            .runner()
            .run(|ctx| ctx.table("c")?.scan())
            .unwrap();
        assert!(rows.is_empty(), "{}", backend);
    }
}

#[timeout(5000)]
#[test]
fn test_rows_are_validated_against_schema() {
    for backend in ["nosql", "sql"] {
        let providers = local_providers(backend);
        providers.admin().create_table(&orders_schema()).unwrap();

        let wrong_type = providers
            .runner()
            .run(|ctx| {
                ctx.table("orders")?
                    .upsert(row([("id", Value::Integer(1)), ("amount", Value::Long(5))]))
            })
            .unwrap_err();
        assert!(matches!(wrong_type, StoreError::InvalidRow { .. }), "{}", backend);

        let unknown_column = providers
            .runner()
            .run(|ctx| {
                ctx.table("orders")?.upsert(row([
                    ("id", Value::Integer(1)),
                    ("amount", amount(1)),
                    ("colour", "red".into()),
                ]))
            })
            .unwrap_err();
        assert!(matches!(unknown_column, StoreError::InvalidRow { .. }), "{}", backend);

        let short_key = providers
            .runner()
            .run(|ctx| ctx.table("orders")?.read(&[]))
            .unwrap_err();
        assert!(matches!(short_key, StoreError::InvalidRow { .. }), "{}", backend);
    }
}

#[timeout(5000)]
#[test]
fn test_delete_then_read_in_same_transaction() {
    for backend in ["nosql", "sql"] {
        let providers = local_providers(backend);
        providers.admin().create_table(&counter_schema("c")).unwrap();
        providers
            .runner()
            .run(|ctx| ctx.table("c")?.upsert(counter_row("gone", 1)))
            .unwrap();

        let seen = providers
            .runner()
            .run(|ctx| {
                let mut table = ctx.table("c")?;
                table.delete(&[Value::from("gone")])?;
                table.delete(&[Value::from("never-there")])?;
                table.read(&[Value::from("gone")])
            })
            .unwrap();
        assert_eq!(seen, None, "{}", backend);
    }
}

#[timeout(5000)]
#[test]
fn test_single_connection_database_resolves_cold_tables() {
    let config = StoreConfig {
        sql_max_connections: 1,
        sql_acquire_timeout_ms: 200,
        ..StoreConfig::with_storage("sql")
    };
    let db = MemoryDatabase::new("memory://single", 1, config.sql_acquire_timeout());
    let writer =
        StorageProviders::from_parts(&config, Backends::sql(Arc::new(db.clone()))).unwrap();
    writer.admin().create_table(&orders_schema()).unwrap();

    // A second set of providers starts with an empty registry cache
    let reader =
        StorageProviders::from_parts(&config, Backends::sql(Arc::new(db.clone()))).unwrap();
    reader
        .runner()
        .run(|ctx| {
            ctx.table("orders")?
                .upsert(row([("id", Value::Integer(7)), ("amount", amount(100))]))
        })
        .unwrap();
    let err = reader
        .runner()
        .run(|ctx| ctx.table("refunds").map(|_| ()))
        .unwrap_err();
    assert_eq!(err, StoreError::TableNotFound("refunds".to_string()));

    let rows = writer
        .runner()
        .run(|ctx| ctx.table("orders")?.scan())
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(db.connection_stats().outstanding, 0);
}
