//! Pure SQL statement assembly from introspected metadata and rows.
//!
//! Nothing here touches a connection; the backup engines feed this module
//! with descriptors and decoded rows and concatenate the results.

use crate::encode::{SqlValue, mysql_literal, postgres_literal};
use crate::model::{
    EnumTypeDescriptor, ForeignKeyDescriptor, PermissionGrant, SequenceDescriptor, TableDescriptor,
    TableKind,
};

/// Session pragmas emitted once before the first MySQL table fragment.
pub const MYSQL_HEADER: &str = "\n\
/*!40101 SET @OLD_CHARACTER_SET_CLIENT=@@CHARACTER_SET_CLIENT */;\n\
/*!40101 SET @OLD_CHARACTER_SET_RESULTS=@@CHARACTER_SET_RESULTS */;\n\
/*!40101 SET @OLD_COLLATION_CONNECTION=@@COLLATION_CONNECTION */;\n\
/*!50503 SET NAMES utf8mb4 */;\n\
/*!40103 SET @OLD_TIME_ZONE=@@TIME_ZONE */;\n\
/*!40103 SET TIME_ZONE='+00:00' */;\n\
/*!40014 SET @OLD_UNIQUE_CHECKS=@@UNIQUE_CHECKS, UNIQUE_CHECKS=0 */;\n\
/*!40014 SET @OLD_FOREIGN_KEY_CHECKS=@@FOREIGN_KEY_CHECKS, FOREIGN_KEY_CHECKS=0 */;\n\
/*!40101 SET @OLD_SQL_MODE=@@SQL_MODE, SQL_MODE='NO_AUTO_VALUE_ON_ZERO' */;\n\
/*!40111 SET @OLD_SQL_NOTES=@@SQL_NOTES, SQL_NOTES=0 */;\n\n";

/// Session restore pragmas appended as the artifact's `footer` section.
pub const MYSQL_FOOTER: &str = "\n\
/*!40101 SET SQL_MODE=@OLD_SQL_MODE */;\n\
/*!40014 SET FOREIGN_KEY_CHECKS=@OLD_FOREIGN_KEY_CHECKS */;\n\
/*!40014 SET UNIQUE_CHECKS=@OLD_UNIQUE_CHECKS */;\n\
/*!40101 SET CHARACTER_SET_CLIENT=@OLD_CHARACTER_SET_CLIENT */;\n\
/*!40101 SET CHARACTER_SET_RESULTS=@OLD_CHARACTER_SET_RESULTS */;\n\
/*!40101 SET COLLATION_CONNECTION=@OLD_COLLATION_CONNECTION */;\n\
/*!40103 SET TIME_ZONE=@OLD_TIME_ZONE */;\n\
/*!40111 SET SQL_NOTES=@OLD_SQL_NOTES */;\n";

/// Fixed preamble of every Postgres-family script, emitted unconditionally.
pub const POSTGRES_PREAMBLE: &str = "\
SET statement_timeout = 0;\n\
SET lock_timeout = 0;\n\
SET idle_in_transaction_session_timeout = 0;\n\
SET client_encoding = 'UTF8';\n\
SET standard_conforming_strings = on;\n\
SELECT pg_catalog.set_config('search_path', '', false);\n\
SET check_function_bodies = false;\n\
SET xmloption = content;\n\
SET client_min_messages = warning;\n\
SET row_security = off;\n";

/// Wrap the engine-produced `SHOW CREATE` DDL into a structure fragment.
/// The `Table structure` / `Structure for view` markers are load-bearing:
/// the writer routes fragments into per-table files by them.
pub fn mysql_structure_fragment(table: &str, kind: TableKind, create_sql: &str) -> String {
    match kind {
        TableKind::View => format!(
            "-- Structure for view `{table}`\nDROP VIEW IF EXISTS `{table}`;\n{create_sql};\n\n"
        ),
        TableKind::BaseTable => format!(
            "-- Table structure for table `{table}`\nDROP TABLE IF EXISTS `{table}`;\n{create_sql};\n\n"
        ),
    }
}

/// One multi-row INSERT for a MySQL table, wrapped in a lock/unlock pair.
/// Callers must not invoke this for empty row sets; a table with zero rows
/// emits no data fragment at all.
pub fn mysql_data_fragment(table: &str, columns: &[String], rows: &[Vec<SqlValue>]) -> String {
    let column_list = columns
        .iter()
        .map(|c| format!("`{c}`"))
        .collect::<Vec<_>>()
        .join(", ");
    let values = rows
        .iter()
        .map(|row| {
            let literals = row.iter().map(mysql_literal).collect::<Vec<_>>();
            format!("({})", literals.join(", "))
        })
        .collect::<Vec<_>>()
        .join(",\n");
    format!(
        "-- Data for table `{table}`\nLOCK TABLES `{table}` WRITE;\n\
         INSERT INTO `{table}` ({column_list}) VALUES {values};\nUNLOCK TABLES;\n\n\n"
    )
}

/// Verbatim `SHOW GRANTS` output as the artifact's `permissions` section.
pub fn mysql_permissions_fragment(grant_lines: &[String]) -> String {
    format!("-- Permissions\n{}\n\n", grant_lines.join("\n"))
}

/// DROP-then-CREATE DDL for one Postgres table, with the primary key inline.
///
/// Catalog types are normalized with deliberate, dialect-specific
/// simplifications rather than a general type translation:
/// `USER-DEFINED` is bridged to a fixed enum type, array types collapse to
/// `text[]`, and bare `character` is forced to a width. Sequence-backed
/// defaults are re-qualified with the `public.` schema.
pub fn postgres_table_statement(table: &TableDescriptor, primary_keys: &[String]) -> String {
    let mut stmt = format!("DROP TABLE IF EXISTS public.{} CASCADE;\n", table.name);
    stmt.push_str(&format!("CREATE TABLE public.{} (\n", table.name));

    let mut col_defs = Vec::with_capacity(table.columns.len() + 1);
    for col in &table.columns {
        let mut data_type = col.data_type.as_str();
        let mut default = col.default.clone();
        if data_type == "USER-DEFINED" {
            // information_schema does not surface the concrete enum type.
            data_type = "public.mpaa_rating";
            default = Some("'G'::public.mpaa_rating".to_string());
        } else if data_type.contains("ARRAY") {
            data_type = "text[]";
        } else if data_type == "character" {
            data_type = "character(100)";
        }
        let mut def = format!("\t{} {}", col.name, data_type);
        if let Some(default) = default.filter(|d| !d.is_empty()) {
            let default = if default.contains("nextval('") {
                default.replace("nextval('", "nextval('public.")
            } else {
                default
            };
            def.push_str(&format!(" DEFAULT {default}"));
        }
        if !col.nullable {
            def.push_str(" NOT NULL");
        }
        col_defs.push(def);
    }
    if !primary_keys.is_empty() {
        col_defs.push(format!("\tPRIMARY KEY ({})", primary_keys.join(", ")));
    }
    stmt.push_str(&col_defs.join(",\n"));
    stmt.push_str("\n);\n");
    stmt
}

/// Deferred foreign-key wiring, one ALTER per edge. Emitted after every
/// CREATE of the batch; two-phase emission is this system's whole answer
/// to dependency ordering, so no topological sort happens here.
pub fn postgres_foreign_key_statements(foreign_keys: &[ForeignKeyDescriptor]) -> String {
    foreign_keys
        .iter()
        .map(|fk| {
            format!(
                "ALTER TABLE ONLY public.{} ADD CONSTRAINT {} FOREIGN KEY ({}) \
                 REFERENCES public.{}({}) ON UPDATE CASCADE ON DELETE RESTRICT;",
                fk.table, fk.constraint, fk.column, fk.referenced_table, fk.referenced_column
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn postgres_sequence_statement(seq: &SequenceDescriptor) -> String {
    let mut stmt = format!("DROP SEQUENCE IF EXISTS public.{} CASCADE;\n", seq.name);
    stmt.push_str(&format!("CREATE SEQUENCE public.{}\n", seq.name));
    stmt.push_str(&format!("    START WITH {}\n", seq.start));
    stmt.push_str(&format!("    INCREMENT BY {}\n", seq.increment));
    match seq.min_value {
        Some(min) => stmt.push_str(&format!("    MINVALUE {min}\n")),
        None => stmt.push_str("    NO MINVALUE\n"),
    }
    match seq.max_value {
        Some(max) => stmt.push_str(&format!("    MAXVALUE {max}\n")),
        None => stmt.push_str("    NO MAXVALUE\n"),
    }
    stmt.push_str(&format!("    CACHE {};\n", seq.cache));
    stmt
}

pub fn postgres_enum_type_statement(ty: &EnumTypeDescriptor) -> String {
    let labels = ty
        .labels
        .iter()
        .map(|label| format!("    '{label}'"))
        .collect::<Vec<_>>()
        .join(",\n");
    format!(
        "DROP TYPE IF EXISTS public.{name} CASCADE;\n\
         CREATE TYPE public.{name} AS ENUM (\n{labels}\n);\n",
        name = ty.name
    )
}

/// One multi-row INSERT for a Postgres table. Never called with zero rows.
pub fn postgres_insert_statement(
    table: &str,
    columns: &[String],
    rows: &[Vec<SqlValue>],
) -> String {
    let values = rows
        .iter()
        .map(|row| {
            let literals = row.iter().map(postgres_literal).collect::<Vec<_>>();
            format!("({})", literals.join(", "))
        })
        .collect::<Vec<_>>()
        .join(",\n");
    format!(
        "INSERT INTO public.{table} ({}) VALUES \n{values};",
        columns.join(", ")
    )
}

pub fn postgres_grant_statements(table: &str, grants: &[PermissionGrant]) -> String {
    grants
        .iter()
        .map(|grant| {
            format!(
                "GRANT {} ON TABLE public.{table} TO {};",
                grant.privilege, grant.grantee
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ColumnDescriptor;

    fn users_table() -> TableDescriptor {
        TableDescriptor {
            name: "users".into(),
            kind: TableKind::BaseTable,
            columns: vec![
                ColumnDescriptor {
                    name: "id".into(),
                    data_type: "int".into(),
                    nullable: false,
                    default: None,
                },
                ColumnDescriptor {
                    name: "name".into(),
                    data_type: "varchar".into(),
                    nullable: true,
                    default: None,
                },
            ],
        }
    }

    #[test]
    fn table_ddl_drops_then_creates_with_inline_primary_key() {
        let ddl = postgres_table_statement(&users_table(), &["id".to_string()]);
        assert!(ddl.starts_with("DROP TABLE IF EXISTS public.users CASCADE;\n"));
        assert!(ddl.contains("CREATE TABLE public.users (\n"));
        assert!(ddl.contains("\tid int NOT NULL"));
        assert!(ddl.contains("\tname varchar"));
        assert!(ddl.contains("\tPRIMARY KEY (id)"));
        assert!(ddl.ends_with("\n);\n"));
    }

    #[test]
    fn table_ddl_omits_primary_key_clause_when_key_set_empty() {
        let ddl = postgres_table_statement(&users_table(), &[]);
        assert!(!ddl.contains("PRIMARY KEY"));
    }

    #[test]
    fn type_normalizations_apply() {
        let table = TableDescriptor {
            name: "film".into(),
            kind: TableKind::BaseTable,
            columns: vec![
                ColumnDescriptor {
                    name: "rating".into(),
                    data_type: "USER-DEFINED".into(),
                    nullable: true,
                    default: None,
                },
                ColumnDescriptor {
                    name: "features".into(),
                    data_type: "ARRAY".into(),
                    nullable: true,
                    default: None,
                },
                ColumnDescriptor {
                    name: "code".into(),
                    data_type: "character".into(),
                    nullable: true,
                    default: None,
                },
                ColumnDescriptor {
                    name: "id".into(),
                    data_type: "integer".into(),
                    nullable: false,
                    default: Some("nextval('film_id_seq'::regclass)".into()),
                },
            ],
        };
        let ddl = postgres_table_statement(&table, &[]);
        assert!(ddl.contains("rating public.mpaa_rating DEFAULT 'G'::public.mpaa_rating"));
        assert!(ddl.contains("features text[]"));
        assert!(ddl.contains("code character(100)"));
        assert!(ddl.contains("DEFAULT nextval('public.film_id_seq'::regclass)"));
    }

    #[test]
    fn foreign_key_alter_joins_one_statement_per_edge() {
        let fks = vec![
            ForeignKeyDescriptor {
                constraint: "orders_user_fk".into(),
                table: "orders".into(),
                column: "user_id".into(),
                referenced_table: "users".into(),
                referenced_column: "id".into(),
            },
            ForeignKeyDescriptor {
                constraint: "orders_item_fk".into(),
                table: "orders".into(),
                column: "item_id".into(),
                referenced_table: "items".into(),
                referenced_column: "id".into(),
            },
        ];
        let sql = postgres_foreign_key_statements(&fks);
        assert_eq!(sql.lines().count(), 2);
        assert!(sql.starts_with(
            "ALTER TABLE ONLY public.orders ADD CONSTRAINT orders_user_fk \
             FOREIGN KEY (user_id) REFERENCES public.users(id)"
        ));
        assert!(sql.contains("ON UPDATE CASCADE ON DELETE RESTRICT;"));
    }

    #[test]
    fn sequence_statement_handles_open_bounds() {
        let seq = SequenceDescriptor {
            name: "users_id_seq".into(),
            start: 1,
            increment: 1,
            min_value: None,
            max_value: Some(99),
            cache: 1,
        };
        let sql = postgres_sequence_statement(&seq);
        assert!(sql.starts_with("DROP SEQUENCE IF EXISTS public.users_id_seq CASCADE;\n"));
        assert!(sql.contains("    START WITH 1\n"));
        assert!(sql.contains("    NO MINVALUE\n"));
        assert!(sql.contains("    MAXVALUE 99\n"));
        assert!(sql.contains("    CACHE 1;\n"));
    }

    #[test]
    fn enum_type_statement_preserves_label_order() {
        let ty = EnumTypeDescriptor {
            name: "mood".into(),
            labels: vec!["sad".into(), "ok".into(), "happy".into()],
        };
        let sql = postgres_enum_type_statement(&ty);
        assert!(sql.starts_with("DROP TYPE IF EXISTS public.mood CASCADE;\n"));
        let sad = sql.find("'sad'").unwrap();
        let ok = sql.find("'ok'").unwrap();
        let happy = sql.find("'happy'").unwrap();
        assert!(sad < ok && ok < happy);
    }

    #[test]
    fn insert_statement_matches_reference_shape() {
        let rows = vec![
            vec![SqlValue::Int(1), SqlValue::Text("Ann".into())],
            vec![SqlValue::Int(2), SqlValue::Null],
        ];
        let sql = postgres_insert_statement("users", &["id".into(), "name".into()], &rows);
        assert_eq!(
            sql,
            "INSERT INTO public.users (id, name) VALUES \n(1, 'Ann'),\n(2, NULL);"
        );
    }

    #[test]
    fn mysql_data_fragment_wraps_insert_in_lock_pair() {
        let rows = vec![vec![SqlValue::Int(1), SqlValue::Text("O'Brien".into())]];
        let fragment = mysql_data_fragment("users", &["id".into(), "name".into()], &rows);
        assert!(fragment.starts_with("-- Data for table `users`\n"));
        let lock = fragment.find("LOCK TABLES `users` WRITE;").unwrap();
        let insert = fragment
            .find("INSERT INTO `users` (`id`, `name`) VALUES (1, 'O''Brien');")
            .unwrap();
        let unlock = fragment.find("UNLOCK TABLES;").unwrap();
        assert!(lock < insert && insert < unlock);
    }

    #[test]
    fn mysql_structure_fragment_branches_on_kind() {
        let table = mysql_structure_fragment("users", TableKind::BaseTable, "CREATE TABLE ...");
        assert!(table.starts_with("-- Table structure for table `users`\n"));
        assert!(table.contains("DROP TABLE IF EXISTS `users`;"));

        let view = mysql_structure_fragment("v_users", TableKind::View, "CREATE VIEW ...");
        assert!(view.starts_with("-- Structure for view `v_users`\n"));
        assert!(view.contains("DROP VIEW IF EXISTS `v_users`;"));
    }

    #[test]
    fn grant_statements_emit_one_line_per_grant() {
        let grants = vec![
            PermissionGrant {
                grantee: "reporting".into(),
                privilege: "SELECT".into(),
            },
            PermissionGrant {
                grantee: "app".into(),
                privilege: "INSERT".into(),
            },
        ];
        let sql = postgres_grant_statements("users", &grants);
        assert_eq!(
            sql,
            "GRANT SELECT ON TABLE public.users TO reporting;\n\
             GRANT INSERT ON TABLE public.users TO app;"
        );
    }
}
