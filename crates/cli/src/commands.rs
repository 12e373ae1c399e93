use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use thiserror::Error;

use formledger_storage::migrations::highest_version;
use formledger_storage::migrator::{current_version, verify_schema};
use formledger_storage::{
    MigrationEngine, SchemaIssue, StorageError, UpgradeReport, UpgradeTarget, MIGRATIONS,
};

#[derive(Debug, Error)]
pub enum CliError {
    #[error("--db is required")]
    MissingDatabase,

    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug)]
pub enum Command {
    Upgrade {
        db: PathBuf,
        target: Option<u32>,
        backup_dir: Option<PathBuf>,
    },
    Verify {
        db: PathBuf,
    },
    Generate {
        description: String,
        from_file: Option<PathBuf>,
    },
}

/// Rendered JSON plus whether the process should exit successfully.
#[derive(Debug)]
pub struct Outcome {
    pub output: String,
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct VerifyOutput {
    pub valid: bool,
    pub current_version: u32,
    pub issues: Vec<SchemaIssue>,
}

#[derive(Debug, Serialize)]
pub struct MigrationDraft {
    pub version: u32,
    pub description: String,
    pub statements: Vec<String>,
}

impl Command {
    pub fn run(self) -> Result<Outcome, CliError> {
        match self {
            Self::Upgrade {
                db,
                target,
                backup_dir,
            } => {
                let report = upgrade(&db, target, backup_dir.as_deref())?;
                Ok(Outcome {
                    output: serde_json::to_string_pretty(&report)?,
                    success: true,
                })
            }
            Self::Verify { db } => {
                let result = verify(&db)?;
                Ok(Outcome {
                    success: result.valid,
                    output: serde_json::to_string_pretty(&result)?,
                })
            }
            Self::Generate {
                description,
                from_file,
            } => {
                let draft = generate(&description, from_file.as_deref())?;
                Ok(Outcome {
                    output: serde_json::to_string_pretty(&draft)?,
                    success: true,
                })
            }
        }
    }
}

pub fn upgrade(
    db: &Path,
    target: Option<u32>,
    backup_dir: Option<&Path>,
) -> Result<UpgradeReport, CliError> {
    let mut conn = Connection::open(db)?;
    formledger_storage::schema::configure(&conn)?;
    let mut engine = MigrationEngine::new(&mut conn);
    if let Some(dir) = backup_dir {
        engine = engine.with_backup_dir(dir);
    }
    let target = target.map_or(UpgradeTarget::Latest, UpgradeTarget::Version);
    Ok(engine.upgrade(target)?)
}

/// Opens without `CREATE`, so a missing store file is an error rather than
/// a new empty store.
pub fn verify(db: &Path) -> Result<VerifyOutput, CliError> {
    let conn = Connection::open_with_flags(
        db,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    let report = verify_schema(&conn)?;
    Ok(VerifyOutput {
        valid: report.is_valid(),
        current_version: current_version(&conn)?,
        issues: report.issues,
    })
}

pub fn generate(description: &str, from_file: Option<&Path>) -> Result<MigrationDraft, CliError> {
    let statements = match from_file {
        Some(path) => {
            let sql = std::fs::read_to_string(path).map_err(|source| CliError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            split_statements(&sql)
        }
        None => Vec::new(),
    };
    Ok(MigrationDraft {
        version: highest_version(MIGRATIONS) + 1,
        description: description.to_string(),
        statements,
    })
}

fn split_statements(sql: &str) -> Vec<String> {
    sql.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
