//! Postgres-family backup engine.
//!
//! Introspects the `public` schema through `information_schema` and the
//! `pg_catalog` views, decodes rows into [`SqlValue`]s and assembles one
//! concatenated SQL script. Table order is catalog retrieval order and is
//! reused unmodified as the creation order; foreign keys are wired in a
//! second phase after every CREATE instead of topologically sorting.

use crate::config::Config;
use crate::encode::SqlValue;
use crate::error::DumpError;
use crate::model::{
    BackupMode, BackupRequest, ColumnDescriptor, EnumTypeDescriptor, ForeignKeyDescriptor,
    PermissionGrant, SequenceDescriptor, TableDescriptor, TableKind,
};

use super::statement;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{Column, Connection, Row, TypeInfo, ValueRef};
use tracing::{debug, info};

/// Everything introspected for one run, built fresh per invocation and
/// discarded with it. `catalog_wide` records whether the run covers the
/// whole database; only then are sequences and enum types in scope.
#[derive(Debug, Default)]
pub(crate) struct PgSnapshot {
    pub catalog_wide: bool,
    pub tables: Vec<PgTable>,
    pub sequences: Vec<SequenceDescriptor>,
    pub enum_types: Vec<EnumTypeDescriptor>,
}

#[derive(Debug)]
pub(crate) struct PgTable {
    pub descriptor: TableDescriptor,
    pub primary_keys: Vec<String>,
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
    pub grants: Vec<PermissionGrant>,
    /// Column names of the fetched rows, in SELECT * order.
    pub data_columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

pub struct PostgresBackup {
    conn: PgConnection,
}

impl PostgresBackup {
    /// Open a single connection to the target database. The connection is
    /// owned by this engine and released on drop on every exit path.
    pub async fn connect(cfg: &Config) -> Result<PostgresBackup, DumpError> {
        let opts = PgConnectOptions::new()
            .host(&cfg.host)
            .username(&cfg.user)
            .password(&cfg.password)
            .database(&cfg.db_name);
        let conn = PgConnection::connect_with(&opts)
            .await
            .map_err(|e| DumpError::Connection {
                host: cfg.host.clone(),
                user: cfg.user.clone(),
                source: e,
            })?;
        Ok(PostgresBackup { conn })
    }

    /// Run the backup and return the concatenated script. Consumes the
    /// engine; the connection closes when the run ends, success or not.
    pub async fn backup(mut self, req: &BackupRequest) -> Result<String, DumpError> {
        let snapshot = self.introspect(req).await?;
        info!(
            tables = snapshot.tables.len(),
            sequences = snapshot.sequences.len(),
            enum_types = snapshot.enum_types.len(),
            "postgres snapshot complete"
        );
        Ok(assemble(req.mode, &snapshot, req.include_permissions))
    }

    async fn introspect(&mut self, req: &BackupRequest) -> Result<PgSnapshot, DumpError> {
        let mut snapshot = PgSnapshot {
            catalog_wide: req.tables.is_none(),
            ..PgSnapshot::default()
        };

        // Catalog retrieval order; an explicit filter list is taken verbatim,
        // without existence or kind checks.
        let table_names = match &req.tables {
            None => self.list_tables().await?,
            Some(names) => names.clone(),
        };

        if snapshot.catalog_wide && req.mode.wants_structure() {
            snapshot.sequences = self.sequences().await?;
            snapshot.enum_types = self.enum_types().await?;
        }

        for name in table_names {
            let columns = self.table_columns(&name).await?;
            let primary_keys = self.primary_keys(&name).await?;
            let foreign_keys = self.foreign_keys(&name).await?;
            let grants = if req.include_permissions {
                self.table_grants(&name).await?
            } else {
                Vec::new()
            };

            let (data_columns, rows) = if req.mode.wants_data() {
                self.table_rows(&name).await?
            } else {
                (Vec::new(), Vec::new())
            };
            debug!(table = %name, rows = rows.len(), "introspected table");

            snapshot.tables.push(PgTable {
                descriptor: TableDescriptor {
                    name,
                    kind: TableKind::BaseTable,
                    columns,
                },
                primary_keys,
                foreign_keys,
                grants,
                data_columns,
                rows,
            });
        }

        Ok(snapshot)
    }

    async fn list_tables(&mut self) -> Result<Vec<String>, DumpError> {
        let rows = sqlx::query(
            "SELECT table_name \
             FROM information_schema.tables \
             WHERE table_schema = 'public' AND table_type = 'BASE TABLE'",
        )
        .fetch_all(&mut self.conn)
        .await
        .map_err(|e| DumpError::backup("listing tables", e))?;
        rows.iter()
            .map(|row| row.try_get::<String, _>(0))
            .collect::<Result<_, _>>()
            .map_err(|e| DumpError::backup("listing tables", e))
    }

    async fn table_columns(&mut self, table: &str) -> Result<Vec<ColumnDescriptor>, DumpError> {
        let rows = sqlx::query(
            "SELECT column_name, data_type, is_nullable, column_default \
             FROM information_schema.columns \
             WHERE table_name = $1 \
             ORDER BY ordinal_position",
        )
        .bind(table)
        .fetch_all(&mut self.conn)
        .await
        .map_err(|e| DumpError::backup(format!("columns of table {table}"), e))?;

        rows.iter()
            .map(|row| {
                Ok(ColumnDescriptor {
                    name: row.try_get(0)?,
                    data_type: row.try_get(1)?,
                    nullable: row.try_get::<String, _>(2)? != "NO",
                    default: row.try_get(3)?,
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(|e| DumpError::backup(format!("columns of table {table}"), e))
    }

    async fn primary_keys(&mut self, table: &str) -> Result<Vec<String>, DumpError> {
        let rows = sqlx::query(
            "SELECT kcu.column_name \
             FROM information_schema.table_constraints tco \
             JOIN information_schema.key_column_usage kcu \
               ON kcu.constraint_name = tco.constraint_name \
             WHERE tco.constraint_type = 'PRIMARY KEY' \
               AND kcu.table_name = $1 \
             ORDER BY kcu.ordinal_position",
        )
        .bind(table)
        .fetch_all(&mut self.conn)
        .await
        .map_err(|e| DumpError::backup(format!("primary keys of table {table}"), e))?;
        rows.iter()
            .map(|row| row.try_get::<String, _>(0))
            .collect::<Result<_, _>>()
            .map_err(|e| DumpError::backup(format!("primary keys of table {table}"), e))
    }

    async fn foreign_keys(&mut self, table: &str) -> Result<Vec<ForeignKeyDescriptor>, DumpError> {
        let rows = sqlx::query(
            "SELECT tc.constraint_name, tc.table_name, kcu.column_name, \
                    ccu.table_name AS foreign_table_name, \
                    ccu.column_name AS foreign_column_name \
             FROM information_schema.table_constraints AS tc \
             JOIN information_schema.key_column_usage AS kcu \
               ON tc.constraint_name = kcu.constraint_name \
             JOIN information_schema.constraint_column_usage AS ccu \
               ON ccu.constraint_name = tc.constraint_name \
             WHERE constraint_type = 'FOREIGN KEY' AND tc.table_name = $1",
        )
        .bind(table)
        .fetch_all(&mut self.conn)
        .await
        .map_err(|e| DumpError::backup(format!("foreign keys of table {table}"), e))?;

        rows.iter()
            .map(|row| {
                Ok(ForeignKeyDescriptor {
                    constraint: row.try_get(0)?,
                    table: row.try_get(1)?,
                    column: row.try_get(2)?,
                    referenced_table: row.try_get(3)?,
                    referenced_column: row.try_get(4)?,
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(|e| DumpError::backup(format!("foreign keys of table {table}"), e))
    }

    async fn sequences(&mut self) -> Result<Vec<SequenceDescriptor>, DumpError> {
        let names = sqlx::query(
            "SELECT sequence_name \
             FROM information_schema.sequences \
             WHERE sequence_schema = 'public'",
        )
        .fetch_all(&mut self.conn)
        .await
        .map_err(|e| DumpError::backup("listing sequences", e))?;

        let mut sequences = Vec::with_capacity(names.len());
        for row in &names {
            let name: String = row
                .try_get(0)
                .map_err(|e| DumpError::backup("listing sequences", e))?;
            let info = sqlx::query(
                "SELECT start_value, increment_by, min_value, max_value, cache_size \
                 FROM pg_sequences \
                 WHERE schemaname = 'public' AND sequencename = $1",
            )
            .bind(&name)
            .fetch_one(&mut self.conn)
            .await
            .map_err(|e| DumpError::backup(format!("sequence {name}"), e))?;

            sequences.push(SequenceDescriptor {
                start: info
                    .try_get(0)
                    .map_err(|e| DumpError::backup(format!("sequence {name}"), e))?,
                increment: info
                    .try_get(1)
                    .map_err(|e| DumpError::backup(format!("sequence {name}"), e))?,
                min_value: info
                    .try_get(2)
                    .map_err(|e| DumpError::backup(format!("sequence {name}"), e))?,
                max_value: info
                    .try_get(3)
                    .map_err(|e| DumpError::backup(format!("sequence {name}"), e))?,
                cache: info
                    .try_get(4)
                    .map_err(|e| DumpError::backup(format!("sequence {name}"), e))?,
                name,
            });
        }
        Ok(sequences)
    }

    async fn enum_types(&mut self) -> Result<Vec<EnumTypeDescriptor>, DumpError> {
        let rows = sqlx::query(
            "SELECT t.typname AS type_name, e.enumlabel AS enum_label \
             FROM pg_type t \
             JOIN pg_enum e ON t.oid = e.enumtypid \
             JOIN pg_catalog.pg_namespace n ON n.oid = t.typnamespace \
             WHERE n.nspname = 'public' \
             ORDER BY t.typname, e.enumsortorder",
        )
        .fetch_all(&mut self.conn)
        .await
        .map_err(|e| DumpError::backup("listing enum types", e))?;

        // Rows arrive grouped by type name with labels in catalog sort order.
        let mut types: Vec<EnumTypeDescriptor> = Vec::new();
        for row in &rows {
            let name: String = row
                .try_get(0)
                .map_err(|e| DumpError::backup("listing enum types", e))?;
            let label: String = row
                .try_get(1)
                .map_err(|e| DumpError::backup("listing enum types", e))?;
            match types.last_mut() {
                Some(ty) if ty.name == name => ty.labels.push(label),
                _ => types.push(EnumTypeDescriptor {
                    name,
                    labels: vec![label],
                }),
            }
        }
        Ok(types)
    }

    async fn table_grants(&mut self, table: &str) -> Result<Vec<PermissionGrant>, DumpError> {
        let rows = sqlx::query(
            "SELECT grantee, privilege_type \
             FROM information_schema.role_table_grants \
             WHERE table_name = $1",
        )
        .bind(table)
        .fetch_all(&mut self.conn)
        .await
        .map_err(|e| DumpError::backup(format!("grants of table {table}"), e))?;

        rows.iter()
            .map(|row| {
                Ok(PermissionGrant {
                    grantee: row.try_get(0)?,
                    privilege: row.try_get(1)?,
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(|e| DumpError::backup(format!("grants of table {table}"), e))
    }

    async fn table_rows(
        &mut self,
        table: &str,
    ) -> Result<(Vec<String>, Vec<Vec<SqlValue>>), DumpError> {
        let rows = sqlx::query(&format!("SELECT * FROM public.{table}"))
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| DumpError::backup(format!("rows of table {table}"), e))?;

        let columns = rows
            .first()
            .map(|row| {
                row.columns()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect()
            })
            .unwrap_or_default();
        let decoded = rows
            .iter()
            .map(decode_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DumpError::backup(format!("rows of table {table}"), e))?;
        Ok((columns, decoded))
    }
}

/// Assemble the final script from a snapshot. Pure; the fixed emission
/// order is: preamble, enum types, sequences, table DDL, data, deferred
/// foreign keys, grants. Sequences and enum types are skipped outright
/// unless the snapshot covers the whole catalog.
pub(crate) fn assemble(mode: BackupMode, snapshot: &PgSnapshot, include_permissions: bool) -> String {
    let mut sql = statement::POSTGRES_PREAMBLE.to_string();

    if mode.wants_structure() && snapshot.catalog_wide {
        for ty in &snapshot.enum_types {
            sql.push_str(&statement::postgres_enum_type_statement(ty));
            sql.push('\n');
        }
        for seq in &snapshot.sequences {
            sql.push_str(&statement::postgres_sequence_statement(seq));
            sql.push('\n');
        }
    }

    if mode.wants_structure() {
        for table in &snapshot.tables {
            sql.push_str(&statement::postgres_table_statement(
                &table.descriptor,
                &table.primary_keys,
            ));
            sql.push('\n');
        }
    }

    if mode.wants_data() {
        for table in &snapshot.tables {
            if table.rows.is_empty() {
                continue;
            }
            sql.push_str(&statement::postgres_insert_statement(
                &table.descriptor.name,
                &table.data_columns,
                &table.rows,
            ));
            sql.push('\n');
        }
    }

    if mode.wants_structure() {
        for table in &snapshot.tables {
            if table.foreign_keys.is_empty() {
                continue;
            }
            sql.push_str(&statement::postgres_foreign_key_statements(
                &table.foreign_keys,
            ));
            sql.push('\n');
        }
    }

    if include_permissions {
        for table in &snapshot.tables {
            if table.grants.is_empty() {
                continue;
            }
            sql.push_str(&statement::postgres_grant_statements(
                &table.descriptor.name,
                &table.grants,
            ));
            sql.push('\n');
        }
    }

    sql
}

fn decode_row(row: &PgRow) -> Result<Vec<SqlValue>, sqlx::Error> {
    (0..row.len()).map(|idx| decode_value(row, idx)).collect()
}

/// Decode one column by catalog type name. Types without a faithful
/// textual rendering fall back to [`fallback_value`].
fn decode_value(row: &PgRow, idx: usize) -> Result<SqlValue, sqlx::Error> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let type_name = raw.type_info().name().to_string();

    match type_name.as_str() {
        "BOOL" => row.try_get::<bool, _>(idx).map(SqlValue::Bool),
        "INT2" => row.try_get::<i16, _>(idx).map(|v| SqlValue::Int(v.into())),
        "INT4" => row.try_get::<i32, _>(idx).map(|v| SqlValue::Int(v.into())),
        "INT8" => row.try_get::<i64, _>(idx).map(SqlValue::Int),
        "FLOAT4" => row
            .try_get::<f32, _>(idx)
            .map(|v| SqlValue::Float(v.into())),
        "FLOAT8" => row.try_get::<f64, _>(idx).map(SqlValue::Float),
        "NUMERIC" => row
            .try_get::<Decimal, _>(idx)
            .map(|d| SqlValue::Other(d.to_string())),
        "CHAR" | "BPCHAR" | "VARCHAR" | "TEXT" | "NAME" => {
            row.try_get::<String, _>(idx).map(SqlValue::Text)
        }
        "DATE" => row.try_get::<NaiveDate, _>(idx).map(SqlValue::Date),
        "TIMESTAMP" => row
            .try_get::<NaiveDateTime, _>(idx)
            .map(SqlValue::DateTime),
        "TIMESTAMPTZ" => row
            .try_get::<DateTime<Utc>, _>(idx)
            .map(|dt| SqlValue::DateTime(dt.naive_utc())),
        "TIME" => row
            .try_get::<NaiveTime, _>(idx)
            .map(|t| SqlValue::Other(t.format("%H:%M:%S").to_string())),
        "BYTEA" => row.try_get::<Vec<u8>, _>(idx).map(SqlValue::Bytes),
        "JSON" | "JSONB" => row
            .try_get::<serde_json::Value, _>(idx)
            .map(|v| SqlValue::Other(v.to_string())),
        "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => {
            row.try_get::<Vec<String>, _>(idx).map(SqlValue::Array)
        }
        "INT2[]" => row
            .try_get::<Vec<i16>, _>(idx)
            .map(|v| SqlValue::Array(v.iter().map(i16::to_string).collect())),
        "INT4[]" => row
            .try_get::<Vec<i32>, _>(idx)
            .map(|v| SqlValue::Array(v.iter().map(i32::to_string).collect())),
        "INT8[]" => row
            .try_get::<Vec<i64>, _>(idx)
            .map(|v| SqlValue::Array(v.iter().map(i64::to_string).collect())),
        _ => Ok(fallback_value(row, idx, &type_name)),
    }
}

/// Last-resort decode: textual, then raw bytes, then a quoted placeholder
/// naming the type (the value itself is not serialized).
fn fallback_value(row: &PgRow, idx: usize, type_name: &str) -> SqlValue {
    if let Ok(s) = row.try_get::<String, _>(idx) {
        return SqlValue::Text(s);
    }
    if let Ok(b) = row.try_get::<Vec<u8>, _>(idx) {
        return SqlValue::Bytes(b);
    }
    SqlValue::Other(format!("'<{}>'", type_name.to_lowercase()))
}
