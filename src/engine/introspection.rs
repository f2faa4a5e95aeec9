// SPDX-License-Identifier: Apache-2.0

//! Read-only catalog introspection: schemas, tables, table structure.

use gate_core::{EngineError, EngineResult, StatementOutput, Value};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::engine::executor::QueryEngine;

const SCHEMAS_SQL: &str = r#"
SELECT n.nspname::text AS schema_name,
       pg_catalog.pg_get_userbyid(n.nspowner)::text AS owner,
       count(c.oid)::bigint AS table_count
FROM pg_catalog.pg_namespace n
LEFT JOIN pg_catalog.pg_class c
       ON c.relnamespace = n.oid AND c.relkind IN ('r', 'p')
WHERE n.nspname NOT IN ('information_schema', 'pg_catalog', 'pg_toast')
  AND n.nspname NOT LIKE 'pg_temp_%'
  AND n.nspname NOT LIKE 'pg_toast_temp_%'
GROUP BY n.nspname, n.nspowner
ORDER BY n.nspname
"#;

const TABLES_SQL: &str = r#"
SELECT c.relname::text AS table_name,
       CASE c.relkind
           WHEN 'r' THEN 'table'
           WHEN 'p' THEN 'partitioned_table'
           WHEN 'v' THEN 'view'
           WHEN 'm' THEN 'materialized_view'
           WHEN 'f' THEN 'foreign_table'
       END AS table_type,
       greatest(c.reltuples, 0)::bigint AS row_estimate,
       pg_catalog.obj_description(c.oid, 'pg_class') AS description
FROM pg_catalog.pg_class c
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
WHERE n.nspname = $1
  AND c.relkind IN ('r', 'p', 'v', 'm', 'f')
ORDER BY c.relname
"#;

const COLUMNS_SQL: &str = r#"
SELECT column_name::text AS column_name,
       data_type::text AS data_type,
       is_nullable::text AS is_nullable,
       column_default::text AS column_default
FROM information_schema.columns
WHERE table_schema = $1 AND table_name = $2
ORDER BY ordinal_position
"#;

const PRIMARY_KEY_SQL: &str = r#"
SELECT a.attname::text AS column_name
FROM pg_catalog.pg_index i
JOIN pg_catalog.pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey)
JOIN pg_catalog.pg_class c ON c.oid = i.indrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
WHERE i.indisprimary
  AND n.nspname = $1
  AND c.relname = $2
ORDER BY array_position(i.indkey, a.attnum)
"#;

const FOREIGN_KEYS_SQL: &str = r#"
SELECT kcu.column_name::text AS column_name,
       ccu.table_schema::text AS foreign_schema,
       ccu.table_name::text AS foreign_table,
       ccu.column_name::text AS foreign_column,
       tc.constraint_name::text AS constraint_name
FROM information_schema.table_constraints AS tc
JOIN information_schema.key_column_usage AS kcu
  ON tc.constraint_name = kcu.constraint_name
 AND tc.table_schema = kcu.table_schema
JOIN information_schema.constraint_column_usage AS ccu
  ON ccu.constraint_name = tc.constraint_name
 AND ccu.table_schema = tc.table_schema
WHERE tc.constraint_type = 'FOREIGN KEY'
  AND tc.table_schema = $1
  AND tc.table_name = $2
ORDER BY tc.constraint_name, kcu.ordinal_position
"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub name: String,
    pub owner: Option<String>,
    pub table_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    /// table, partitioned_table, view, materialized_view or foreign_table
    pub table_type: String,
    pub row_estimate: Option<i64>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableColumn {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default_value: Option<String>,
    pub is_primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column: String,
    pub referenced_schema: String,
    pub referenced_table: String,
    pub referenced_column: String,
    pub constraint_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub schema: String,
    pub table: String,
    pub columns: Vec<TableColumn>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
}

fn text(output: &StatementOutput, row: usize, column: &str) -> Option<String> {
    output.value(row, column).and_then(Value::as_str).map(str::to_string)
}

fn int(output: &StatementOutput, row: usize, column: &str) -> Option<i64> {
    output.value(row, column).and_then(Value::as_i64)
}

fn required_identifier(value: &str, what: &str) -> EngineResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::validation(format!("{what} must not be empty")));
    }
    Ok(trimmed.to_string())
}

fn first_output(outputs: &[StatementOutput]) -> EngineResult<&StatementOutput> {
    outputs
        .first()
        .ok_or_else(|| EngineError::internal("Catalog query returned no result set"))
}

impl QueryEngine {
    /// User-visible schemas with their owner and table count.
    #[instrument(skip(self))]
    pub async fn list_schemas(&self) -> EngineResult<Vec<SchemaInfo>> {
        let outputs = self.run_catalog_queries(vec![(SCHEMAS_SQL, Vec::new())]).await?;
        let output = first_output(&outputs)?;
        Ok((0..output.rows.len())
            .map(|row| SchemaInfo {
                name: text(output, row, "schema_name").unwrap_or_default(),
                owner: text(output, row, "owner"),
                table_count: int(output, row, "table_count").unwrap_or(0),
            })
            .collect())
    }

    /// Tables, views and foreign tables of one schema.
    #[instrument(skip(self))]
    pub async fn list_tables(&self, schema: &str) -> EngineResult<Vec<TableInfo>> {
        let schema = required_identifier(schema, "schema_name")?;
        let outputs = self
            .run_catalog_queries(vec![(TABLES_SQL, vec![Value::Text(schema)])])
            .await?;
        let output = first_output(&outputs)?;
        Ok((0..output.rows.len())
            .map(|row| TableInfo {
                name: text(output, row, "table_name").unwrap_or_default(),
                table_type: text(output, row, "table_type").unwrap_or_else(|| "table".to_string()),
                row_estimate: int(output, row, "row_estimate"),
                description: text(output, row, "description"),
            })
            .collect())
    }

    /// Columns, primary key and foreign keys of one table, read in a single
    /// round trip.
    #[instrument(skip(self))]
    pub async fn describe_table(&self, schema: &str, table: &str) -> EngineResult<TableSchema> {
        let schema = required_identifier(schema, "schema_name")?;
        let table = required_identifier(table, "table")?;
        let params = || vec![Value::Text(schema.clone()), Value::Text(table.clone())];

        let outputs = self
            .run_catalog_queries(vec![
                (COLUMNS_SQL, params()),
                (PRIMARY_KEY_SQL, params()),
                (FOREIGN_KEYS_SQL, params()),
            ])
            .await?;
        let [columns, primary_key, foreign_keys] = outputs.as_slice() else {
            return Err(EngineError::internal("Catalog queries returned an unexpected number of result sets"));
        };

        if columns.rows.is_empty() {
            return Err(EngineError::validation(format!("Table {schema}.{table} does not exist")));
        }

        let primary_key: Vec<String> = (0..primary_key.rows.len())
            .filter_map(|row| text(primary_key, row, "column_name"))
            .collect();

        let columns = (0..columns.rows.len())
            .map(|row| {
                let name = text(columns, row, "column_name").unwrap_or_default();
                TableColumn {
                    is_primary_key: primary_key.contains(&name),
                    data_type: text(columns, row, "data_type").unwrap_or_default(),
                    nullable: text(columns, row, "is_nullable").as_deref() == Some("YES"),
                    default_value: text(columns, row, "column_default"),
                    name,
                }
            })
            .collect();

        let foreign_keys = (0..foreign_keys.rows.len())
            .map(|row| ForeignKey {
                column: text(foreign_keys, row, "column_name").unwrap_or_default(),
                referenced_schema: text(foreign_keys, row, "foreign_schema").unwrap_or_default(),
                referenced_table: text(foreign_keys, row, "foreign_table").unwrap_or_default(),
                referenced_column: text(foreign_keys, row, "foreign_column").unwrap_or_default(),
                constraint_name: text(foreign_keys, row, "constraint_name").unwrap_or_default(),
            })
            .collect();

        Ok(TableSchema {
            schema,
            table,
            columns,
            primary_key,
            foreign_keys,
        })
    }
}
