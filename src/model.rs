use crate::error::DumpError;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Engine family the connection speaks. Selected once per invocation;
/// there is no cross-family translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineFamily {
    Mysql,
    Postgres,
}

impl fmt::Display for EngineFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineFamily::Mysql => write!(f, "mysql"),
            EngineFamily::Postgres => write!(f, "postgres"),
        }
    }
}

impl FromStr for EngineFamily {
    type Err = DumpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mysql" => Ok(EngineFamily::Mysql),
            "postgres" => Ok(EngineFamily::Postgres),
            other => Err(DumpError::InvalidOption {
                what: "engine family",
                value: other.to_string(),
            }),
        }
    }
}

/// What a backup run emits: schema objects, row data, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupMode {
    Structure,
    Data,
    StructureData,
}

impl BackupMode {
    pub fn wants_structure(self) -> bool {
        matches!(self, BackupMode::Structure | BackupMode::StructureData)
    }

    pub fn wants_data(self) -> bool {
        matches!(self, BackupMode::Data | BackupMode::StructureData)
    }
}

impl FromStr for BackupMode {
    type Err = DumpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "structure" => Ok(BackupMode::Structure),
            "data" => Ok(BackupMode::Data),
            "structure_data" => Ok(BackupMode::StructureData),
            other => Err(DumpError::InvalidOption {
                what: "backup mode",
                value: other.to_string(),
            }),
        }
    }
}

/// One backup request: mode, optional table subset, permissions flag.
/// An absent filter means "all tables" and additionally unlocks
/// sequence/enum-type backup for the Postgres family.
#[derive(Debug, Clone)]
pub struct BackupRequest {
    pub mode: BackupMode,
    pub tables: Option<Vec<String>>,
    pub include_permissions: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    BaseTable,
    View,
}

impl TableKind {
    /// Catalogs report the kind as free text (`BASE TABLE`, `VIEW`, ...).
    /// Anything that is not a view is treated as a base table.
    pub fn from_catalog(s: &str) -> TableKind {
        if s.eq_ignore_ascii_case("VIEW") {
            TableKind::View
        } else {
            TableKind::BaseTable
        }
    }
}

/// One column as the catalog reports it, in ordinal position order.
#[derive(Debug, Clone)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
}

/// One table or view with its ordered column list.
#[derive(Debug, Clone)]
pub struct TableDescriptor {
    pub name: String,
    pub kind: TableKind,
    pub columns: Vec<ColumnDescriptor>,
}

/// A single foreign-key edge. Introspected per table and passed through
/// uninspected: dangling or circular references are not detected here.
#[derive(Debug, Clone)]
pub struct ForeignKeyDescriptor {
    pub constraint: String,
    pub table: String,
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

#[derive(Debug, Clone)]
pub struct SequenceDescriptor {
    pub name: String,
    pub start: i64,
    pub increment: i64,
    pub min_value: Option<i64>,
    pub max_value: Option<i64>,
    pub cache: i64,
}

/// An enum type with its labels in catalog sort order.
#[derive(Debug, Clone)]
pub struct EnumTypeDescriptor {
    pub name: String,
    pub labels: Vec<String>,
}

/// One (grantee, privilege) pair for a table (Postgres family).
#[derive(Debug, Clone)]
pub struct PermissionGrant {
    pub grantee: String,
    pub privilege: String,
}

/// Output of a backup run. The shape differs by family on purpose:
/// the MySQL family produces per-table fragment lists a writer can route
/// into separate files, the Postgres family one concatenated script.
/// Downstream consumers must branch on the variant.
#[derive(Debug)]
pub enum BackupArtifact {
    Mysql(MysqlArtifact),
    Postgres(String),
}

impl BackupArtifact {
    /// Flatten the artifact into a single script, whatever its shape.
    pub fn concat(&self) -> String {
        match self {
            BackupArtifact::Mysql(artifact) => artifact.concat(),
            BackupArtifact::Postgres(sql) => sql.clone(),
        }
    }
}

/// Insertion-ordered mapping from table name to text fragments, plus the
/// reserved `permissions` and `footer` sections.
#[derive(Debug, Default)]
pub struct MysqlArtifact {
    sections: Vec<(String, Vec<String>)>,
}

impl MysqlArtifact {
    pub const PERMISSIONS_KEY: &'static str = "permissions";
    pub const FOOTER_KEY: &'static str = "footer";

    pub fn new() -> MysqlArtifact {
        MysqlArtifact::default()
    }

    pub fn push(&mut self, name: impl Into<String>, fragments: Vec<String>) {
        self.sections.push((name.into(), fragments));
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.sections
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, fragments)| fragments.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.sections
            .iter()
            .map(|(key, fragments)| (key.as_str(), fragments.as_slice()))
    }

    pub fn concat(&self) -> String {
        self.sections
            .iter()
            .flat_map(|(_, fragments)| fragments.iter())
            .map(String::as_str)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_family_parses_known_names() {
        assert_eq!("mysql".parse::<EngineFamily>().unwrap(), EngineFamily::Mysql);
        assert_eq!(
            "postgres".parse::<EngineFamily>().unwrap(),
            EngineFamily::Postgres
        );
        assert!("oracle".parse::<EngineFamily>().is_err());
    }

    #[test]
    fn backup_mode_predicates() {
        let mode: BackupMode = "structure_data".parse().unwrap();
        assert!(mode.wants_structure());
        assert!(mode.wants_data());
        assert!(!"data".parse::<BackupMode>().unwrap().wants_structure());
        assert!(!"structure".parse::<BackupMode>().unwrap().wants_data());
    }

    #[test]
    fn mysql_artifact_preserves_insertion_order() {
        let mut artifact = MysqlArtifact::new();
        artifact.push("users", vec!["a".into(), "b".into()]);
        artifact.push("orders", vec!["c".into()]);
        let keys: Vec<&str> = artifact.iter().map(|(key, _)| key).collect();
        assert_eq!(keys, ["users", "orders"]);
        assert_eq!(artifact.get("orders"), Some(&["c".to_string()][..]));
        assert_eq!(artifact.concat(), "abc");
    }
}
