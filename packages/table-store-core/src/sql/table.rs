//! Table views bound to one relational connection.

use std::collections::HashMap;
use std::sync::Arc;

use super::connection::SqlConnection;
use super::registry::lookup_on;
use crate::error::Result;
use crate::registry::StructuredTableRegistry;
use crate::runner::{StructuredTable, StructuredTableContext};
use crate::schema::{Row, TableSchema, Value};

struct SqlTable<'a> {
    schema: Arc<TableSchema>,
    conn: &'a mut dyn SqlConnection,
}

impl StructuredTable for SqlTable<'_> {
    fn schema(&self) -> &TableSchema {
        &self.schema
    }

    fn upsert(&mut self, row: Row) -> Result<()> {
        let key = self.schema.key_of(&row)?;
        let existing = self.conn.read(&self.schema, &key)?;
        let merged = self.schema.merge_row(existing.as_ref(), row)?;
        self.conn.upsert(&self.schema, &merged)
    }

    fn read(&mut self, key: &[Value]) -> Result<Option<Row>> {
        let key = self.schema.key_from_values(key)?;
        self.conn.read(&self.schema, &key)
    }

    fn delete(&mut self, key: &[Value]) -> Result<()> {
        let key = self.schema.key_from_values(key)?;
        self.conn.delete(&self.schema, &key)
    }

    fn scan(&mut self) -> Result<Vec<Row>> {
        self.conn.scan(&self.schema)
    }
}

/// Table access for one relational transaction.
pub(crate) struct SqlTableContext<'a> {
    conn: &'a mut dyn SqlConnection,
    registry: &'a dyn StructuredTableRegistry,
    schemas: HashMap<String, Arc<TableSchema>>,
}

impl<'a> SqlTableContext<'a> {
    pub(crate) fn new(conn: &'a mut dyn SqlConnection, registry: &'a dyn StructuredTableRegistry) -> Self {
        Self {
            conn,
            registry,
            schemas: HashMap::new(),
        }
    }
}

impl StructuredTableContext for SqlTableContext<'_> {
    fn table(&mut self, name: &str) -> Result<Box<dyn StructuredTable + '_>> {
        let schema = match self.schemas.get(name) {
            Some(schema) => schema.clone(),
            None => {
                // A second pooled connection could starve behind this one
                let conn = &mut *self.conn;
                let schema = self
                    .registry
                    .get_or_load(name, &mut || lookup_on(&mut *conn, name))?;
                self.schemas.insert(name.to_string(), schema.clone());
                schema
            }
        };
        Ok(Box::new(SqlTable {
            schema,
            conn: &mut *self.conn,
        }))
    }
}
