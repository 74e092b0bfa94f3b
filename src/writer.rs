//! On-disk persistence for backup artifacts.
//!
//! A thin collaborator around the core: nothing here inspects SQL beyond
//! the marker substrings the MySQL fragments carry. The core never
//! persists anything itself; a failed backup reaches this module with no
//! artifact at all.

use crate::error::DumpError;
use crate::model::{BackupArtifact, MysqlArtifact};

use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const SINGLE_DIR: &str = "./single_backups";
const MULTIPLE_DIR: &str = "./multiple_backups";

/// Write the whole artifact, whatever its shape, into one file under
/// `./single_backups`. A version string prefixes the file name with a
/// timestamp so consecutive runs sort chronologically.
pub fn save_single(
    artifact: &BackupArtifact,
    output_file: &str,
    version: Option<&str>,
) -> Result<PathBuf, DumpError> {
    let file_name = match version {
        Some(version) => format!(
            "{}_v{}_{}",
            Local::now().format("%Y-%m-%d_%H-%M"),
            version,
            output_file
        ),
        None => output_file.to_string(),
    };
    fs::create_dir_all(SINGLE_DIR)?;
    let path = Path::new(SINGLE_DIR).join(file_name);
    fs::write(&path, artifact.concat())?;
    info!(path = %path.display(), "backup written");
    Ok(path)
}

/// Route MySQL fragments into per-table files under `./multiple_backups`,
/// keyed by the marker substring each fragment carries. Fragments without
/// a recognized marker (the pragma header and footer) are skipped.
pub fn save_multiple(artifact: &MysqlArtifact) -> Result<Vec<PathBuf>, DumpError> {
    fs::create_dir_all(MULTIPLE_DIR)?;
    let mut written = Vec::new();
    for (table, fragments) in artifact.iter() {
        for fragment in fragments {
            let Some(file_name) = route_fragment(table, fragment) else {
                continue;
            };
            let path = Path::new(MULTIPLE_DIR).join(file_name);
            fs::write(&path, fragment)?;
            written.push(path);
        }
    }
    info!(files = written.len(), "backup split into per-table files");
    Ok(written)
}

/// Persist an artifact according to the requested layout. Per-table
/// splitting is only defined for the MySQL artifact shape.
pub fn save(
    artifact: &BackupArtifact,
    output_file: Option<&str>,
    version: Option<&str>,
    split: bool,
) -> Result<(), DumpError> {
    if let Some(output_file) = output_file {
        save_single(artifact, output_file, version)?;
        return Ok(());
    }
    if split {
        match artifact {
            BackupArtifact::Mysql(artifact) => {
                save_multiple(artifact)?;
            }
            BackupArtifact::Postgres(_) => {
                warn!("per-table files are only supported for the mysql family; printing instead");
                println!("{}", artifact.concat());
            }
        }
        return Ok(());
    }
    println!("{}", artifact.concat());
    Ok(())
}

fn route_fragment(table: &str, fragment: &str) -> Option<String> {
    if fragment.contains("Permissions") {
        Some(format!("{table}.permissions.dpl"))
    } else if fragment.contains("Table structure") {
        Some(format!("{table}.structure.ddl"))
    } else if fragment.contains("Data for table") {
        Some(format!("{table}.data.dml"))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_route_by_marker() {
        assert_eq!(
            route_fragment("users", "-- Table structure for table `users`\n..."),
            Some("users.structure.ddl".to_string())
        );
        assert_eq!(
            route_fragment("users", "-- Data for table `users`\n..."),
            Some("users.data.dml".to_string())
        );
        assert_eq!(
            route_fragment("permissions", "-- Permissions\nGRANT ..."),
            Some("permissions.permissions.dpl".to_string())
        );
    }

    #[test]
    fn pragma_header_and_footer_are_not_routed() {
        assert_eq!(
            route_fragment("users", crate::backup::statement::MYSQL_HEADER),
            None
        );
        assert_eq!(
            route_fragment("footer", crate::backup::statement::MYSQL_FOOTER),
            None
        );
    }
}
