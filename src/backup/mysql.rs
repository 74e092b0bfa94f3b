//! MySQL-family backup engine.
//!
//! Unlike the Postgres engine, table DDL is taken verbatim from the
//! server's own `SHOW CREATE TABLE` output, and the artifact is a
//! per-table fragment map (plus reserved `permissions` and `footer`
//! sections) so a writer can route structure, data and grants into
//! separate files.

use crate::config::Config;
use crate::encode::SqlValue;
use crate::error::DumpError;
use crate::model::{BackupMode, BackupRequest, MysqlArtifact, TableKind};

use super::statement;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column, Connection, Row, TypeInfo, ValueRef};
use tracing::{debug, info};

/// One table as captured for the run: the engine-produced DDL plus the
/// decoded rows (when the mode asks for data).
#[derive(Debug)]
pub(crate) struct MysqlTableSnapshot {
    pub name: String,
    pub kind: TableKind,
    pub create_sql: Option<String>,
    pub data_columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

#[derive(Debug, Default)]
pub(crate) struct MysqlSnapshot {
    pub tables: Vec<MysqlTableSnapshot>,
    /// Verbatim `SHOW GRANTS FOR CURRENT_USER` lines.
    pub grants: Vec<String>,
}

pub struct MySqlBackup {
    conn: MySqlConnection,
    db_name: String,
}

impl MySqlBackup {
    pub async fn connect(cfg: &Config) -> Result<MySqlBackup, DumpError> {
        let opts = MySqlConnectOptions::new()
            .host(&cfg.host)
            .username(&cfg.user)
            .password(&cfg.password)
            .database(&cfg.db_name);
        let conn = MySqlConnection::connect_with(&opts)
            .await
            .map_err(|e| DumpError::Connection {
                host: cfg.host.clone(),
                user: cfg.user.clone(),
                source: e,
            })?;
        Ok(MySqlBackup {
            conn,
            db_name: cfg.db_name.clone(),
        })
    }

    /// Run the backup and return the per-table artifact. Consumes the
    /// engine; the connection closes when the run ends, success or not.
    pub async fn backup(mut self, req: &BackupRequest) -> Result<MysqlArtifact, DumpError> {
        let snapshot = self.introspect(req).await?;
        info!(tables = snapshot.tables.len(), "mysql snapshot complete");
        Ok(assemble(req.mode, &snapshot, req.include_permissions))
    }

    async fn introspect(&mut self, req: &BackupRequest) -> Result<MysqlSnapshot, DumpError> {
        let mut snapshot = MysqlSnapshot::default();

        for (name, kind) in self.list_tables(req.tables.as_deref()).await? {
            let create_sql = if req.mode.wants_structure() {
                Some(self.show_create(&name).await?)
            } else {
                None
            };
            // Views are never given data statements.
            let (data_columns, rows) =
                if kind == TableKind::BaseTable && req.mode.wants_data() {
                    self.table_rows(&name).await?
                } else {
                    (Vec::new(), Vec::new())
                };
            debug!(table = %name, rows = rows.len(), "introspected table");
            snapshot.tables.push(MysqlTableSnapshot {
                name,
                kind,
                create_sql,
                data_columns,
                rows,
            });
        }

        if req.include_permissions {
            snapshot.grants = self.current_grants().await?;
        }

        Ok(snapshot)
    }

    async fn list_tables(
        &mut self,
        filter: Option<&[String]>,
    ) -> Result<Vec<(String, TableKind)>, DumpError> {
        let rows = match filter {
            None => sqlx::query(
                "SELECT table_name AS table_name, table_type AS table_type \
                 FROM information_schema.tables \
                 WHERE table_schema = ?",
            )
            .bind(&self.db_name)
            .fetch_all(&mut self.conn)
            .await,
            Some(tables) => {
                let placeholders = vec!["?"; tables.len()].join(",");
                let sql = format!(
                    "SELECT table_name AS table_name, table_type AS table_type \
                     FROM information_schema.tables \
                     WHERE table_schema = ? AND table_name IN ({placeholders})"
                );
                let mut query = sqlx::query(&sql).bind(&self.db_name);
                for table in tables {
                    query = query.bind(table);
                }
                query.fetch_all(&mut self.conn).await
            }
        }
        .map_err(|e| DumpError::backup("listing tables", e))?;

        rows.iter()
            .map(|row| {
                let name: String = row.try_get("table_name")?;
                let kind: String = row.try_get("table_type")?;
                Ok((name, TableKind::from_catalog(&kind)))
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(|e| DumpError::backup("listing tables", e))
    }

    async fn show_create(&mut self, table: &str) -> Result<String, DumpError> {
        // Works for views too; the DDL is always in the second column.
        let row = sqlx::query(&format!("SHOW CREATE TABLE `{table}`"))
            .fetch_one(&mut self.conn)
            .await
            .map_err(|e| DumpError::backup(format!("SHOW CREATE TABLE {table}"), e))?;
        row.try_get::<String, _>(1)
            .map_err(|e| DumpError::backup(format!("SHOW CREATE TABLE {table}"), e))
    }

    async fn table_rows(
        &mut self,
        table: &str,
    ) -> Result<(Vec<String>, Vec<Vec<SqlValue>>), DumpError> {
        let rows = sqlx::query(&format!("SELECT * FROM `{table}`"))
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

    async fn current_grants(&mut self) -> Result<Vec<String>, DumpError> {
        let rows = sqlx::query("SHOW GRANTS FOR CURRENT_USER")
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| DumpError::backup("reading grants", e))?;
        rows.iter()
            .map(|row| row.try_get::<String, _>(0))
            .collect::<Result<_, _>>()
            .map_err(|e| DumpError::backup("reading grants", e))
    }
}

/// Assemble the per-table artifact. The shared pragma header is inserted
/// once, before the very first table's first fragment; the `footer`
/// section is appended only when a header was written. The `permissions`
/// section is independent of both.
pub(crate) fn assemble(
    mode: BackupMode,
    snapshot: &MysqlSnapshot,
    include_permissions: bool,
) -> MysqlArtifact {
    let mut artifact = MysqlArtifact::new();
    let mut header_written = false;

    for table in &snapshot.tables {
        let mut fragments = Vec::new();
        if !header_written {
            fragments.push(statement::MYSQL_HEADER.to_string());
            header_written = true;
        }
        if mode.wants_structure()
            && let Some(create_sql) = &table.create_sql
        {
            fragments.push(statement::mysql_structure_fragment(
                &table.name,
                table.kind,
                create_sql,
            ));
        }
        if mode.wants_data() && table.kind == TableKind::BaseTable && !table.rows.is_empty() {
            fragments.push(statement::mysql_data_fragment(
                &table.name,
                &table.data_columns,
                &table.rows,
            ));
        }
        artifact.push(table.name.clone(), fragments);
    }

    if include_permissions {
        artifact.push(
            MysqlArtifact::PERMISSIONS_KEY,
            vec![statement::mysql_permissions_fragment(&snapshot.grants)],
        );
    }

    if header_written {
        artifact.push(
            MysqlArtifact::FOOTER_KEY,
            vec![statement::MYSQL_FOOTER.to_string()],
        );
    }

    artifact
}

fn decode_row(row: &MySqlRow) -> Result<Vec<SqlValue>, sqlx::Error> {
    (0..row.len()).map(|idx| decode_value(row, idx)).collect()
}

fn decode_value(row: &MySqlRow, idx: usize) -> Result<SqlValue, sqlx::Error> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let type_name = raw.type_info().name().to_string();

    match type_name.as_str() {
        "BOOLEAN" => row.try_get::<bool, _>(idx).map(SqlValue::Bool),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            row.try_get::<i64, _>(idx).map(SqlValue::Int)
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => row.try_get::<u64, _>(idx).map(SqlValue::UInt),
        "FLOAT" => row
            .try_get::<f32, _>(idx)
            .map(|v| SqlValue::Float(v.into())),
        "DOUBLE" => row.try_get::<f64, _>(idx).map(SqlValue::Float),
        "DECIMAL" => row
            .try_get::<Decimal, _>(idx)
            .map(|d| SqlValue::Other(d.to_string())),
        "CHAR" | "VARCHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" | "SET" => {
            row.try_get::<String, _>(idx).map(SqlValue::Text)
        }
        "DATE" => row.try_get::<NaiveDate, _>(idx).map(SqlValue::Date),
        "DATETIME" | "TIMESTAMP" => row
            .try_get::<NaiveDateTime, _>(idx)
            .map(SqlValue::DateTime),
        "TIME" => row
            .try_get::<NaiveTime, _>(idx)
            .map(|t| SqlValue::Other(t.format("%H:%M:%S").to_string())),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            row.try_get::<Vec<u8>, _>(idx).map(SqlValue::Bytes)
        }
        "JSON" => row
            .try_get::<serde_json::Value, _>(idx)
            .map(|v| SqlValue::Other(v.to_string())),
        _ => Ok(fallback_value(row, idx, &type_name)),
    }
}

/// Last-resort decode: textual, then raw bytes, then a placeholder naming
/// the type. The MySQL encoder quotes `Other` values, so the placeholder
/// stays a valid literal.
fn fallback_value(row: &MySqlRow, idx: usize, type_name: &str) -> SqlValue {
    if let Ok(s) = row.try_get::<String, _>(idx) {
        return SqlValue::Text(s);
    }
    if let Ok(b) = row.try_get::<Vec<u8>, _>(idx) {
        return SqlValue::Bytes(b);
    }
    SqlValue::Other(format!("<{}>", type_name.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str, kind: TableKind, rows: Vec<Vec<SqlValue>>) -> MysqlTableSnapshot {
        MysqlTableSnapshot {
            name: name.to_string(),
            kind,
            create_sql: Some(format!("CREATE TABLE `{name}` (`id` int NOT NULL)")),
            data_columns: vec!["id".into()],
            rows,
        }
    }

    #[test]
    fn header_appears_once_before_first_fragment_and_footer_closes() {
        let snapshot = MysqlSnapshot {
            tables: vec![
                table("users", TableKind::BaseTable, vec![vec![SqlValue::Int(1)]]),
                table("orders", TableKind::BaseTable, Vec::new()),
            ],
            grants: Vec::new(),
        };
        let artifact = assemble(BackupMode::StructureData, &snapshot, false);
        let users = artifact.get("users").unwrap();
        assert_eq!(users[0], statement::MYSQL_HEADER);
        let orders = artifact.get("orders").unwrap();
        assert!(!orders.iter().any(|f| f == statement::MYSQL_HEADER));
        assert_eq!(
            artifact.get(MysqlArtifact::FOOTER_KEY).unwrap(),
            &[statement::MYSQL_FOOTER.to_string()][..]
        );
        assert_eq!(artifact.concat().matches("/*!50503 SET NAMES").count(), 1);
    }

    #[test]
    fn zero_row_table_emits_structure_but_no_data_fragment() {
        let snapshot = MysqlSnapshot {
            tables: vec![table("users", TableKind::BaseTable, Vec::new())],
            grants: Vec::new(),
        };
        let artifact = assemble(BackupMode::StructureData, &snapshot, false);
        let fragments = artifact.get("users").unwrap();
        assert!(fragments.iter().any(|f| f.contains("Table structure")));
        assert!(!fragments.iter().any(|f| f.contains("Data for table")));
    }

    #[test]
    fn views_never_receive_data_fragments() {
        let snapshot = MysqlSnapshot {
            tables: vec![table(
                "v_users",
                TableKind::View,
                vec![vec![SqlValue::Int(1)]],
            )],
            grants: Vec::new(),
        };
        let artifact = assemble(BackupMode::StructureData, &snapshot, false);
        let fragments = artifact.get("v_users").unwrap();
        assert!(fragments.iter().any(|f| f.contains("Structure for view")));
        assert!(!fragments.iter().any(|f| f.contains("Data for table")));
    }

    #[test]
    fn permissions_section_present_without_any_tables() {
        let snapshot = MysqlSnapshot {
            tables: Vec::new(),
            grants: vec!["GRANT ALL PRIVILEGES ON *.* TO `root`@`%`".into()],
        };
        let artifact = assemble(BackupMode::Structure, &snapshot, true);
        let perms = artifact.get(MysqlArtifact::PERMISSIONS_KEY).unwrap();
        assert!(perms[0].starts_with("-- Permissions\n"));
        assert!(perms[0].contains("GRANT ALL PRIVILEGES"));
        // No tables means no header, hence no footer either.
        assert!(artifact.get(MysqlArtifact::FOOTER_KEY).is_none());
    }

    #[test]
    fn data_mode_keeps_insert_fragments_only() {
        let snapshot = MysqlSnapshot {
            tables: vec![table(
                "users",
                TableKind::BaseTable,
                vec![vec![SqlValue::Int(1)]],
            )],
            grants: Vec::new(),
        };
        let artifact = assemble(BackupMode::Data, &snapshot, false);
        let fragments = artifact.get("users").unwrap();
        assert!(!fragments.iter().any(|f| f.contains("Table structure")));
        assert!(fragments.iter().any(|f| f.contains("Data for table")));
    }
}
