//! Forward-only schema upgrades with a pre-upgrade backup.
//!
//! Each migration commits in its own transaction together with its
//! `schema_version` row, so a failure leaves the store at the last version
//! that succeeded and a rerun resumes from there.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{Connection, DatabaseName, TransactionBehavior};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::StorageError;
use crate::migrations::{check_sequence, highest_version, Migration, MIGRATIONS};
use crate::schema::{BOOTSTRAP_SQL, EXPECTED_SCHEMA};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeTarget {
    Latest,
    Version(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpgradeReport {
    pub from: u32,
    pub to: u32,
    pub applied: Vec<u32>,
    /// Copy of the store taken before the first migration ran.
    pub backup: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaIssue {
    MissingTable { table: String },
    MissingColumn { table: String, column: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaReport {
    pub issues: Vec<SchemaIssue>,
}

impl SchemaReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Highest applied version; 0 when the bookkeeping table does not exist.
pub fn current_version(conn: &Connection) -> Result<u32, StorageError> {
    let has_table: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version')",
        [],
        |row| row.get(0),
    )?;
    if !has_table {
        return Ok(0);
    }
    let version: u32 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
            row.get(0)
        })?;
    Ok(version)
}

/// Whether the store holds any table besides the version bookkeeping.
fn has_user_tables(conn: &Connection) -> Result<bool, StorageError> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table'
             AND name NOT LIKE 'sqlite_%' AND name <> 'schema_version')",
        [],
        |row| row.get(0),
    )?)
}

pub struct MigrationEngine<'c> {
    conn: &'c mut Connection,
    migrations: &'c [Migration],
    backup_dir: Option<PathBuf>,
}

impl<'c> MigrationEngine<'c> {
    pub fn new(conn: &'c mut Connection) -> Self {
        Self::with_migrations(conn, MIGRATIONS)
    }

    pub fn with_migrations(conn: &'c mut Connection, migrations: &'c [Migration]) -> Self {
        Self {
            conn,
            migrations,
            backup_dir: None,
        }
    }

    /// Where pre-upgrade backups go. Defaults to a `backups` directory next
    /// to the database file.
    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = Some(dir.into());
        self
    }

    /// Creates the version bookkeeping table. Idempotent.
    pub fn initialize(&self) -> Result<(), StorageError> {
        self.conn
            .execute_batch(BOOTSTRAP_SQL)
            .map_err(StorageError::Bootstrap)
    }

    pub fn current_version(&self) -> Result<u32, StorageError> {
        current_version(self.conn)
    }

    pub fn highest_version(&self) -> u32 {
        highest_version(self.migrations)
    }

    /// Applies every pending migration up to `target`, in version order.
    pub fn upgrade(&mut self, target: UpgradeTarget) -> Result<UpgradeReport, StorageError> {
        check_sequence(self.migrations)?;
        self.initialize()?;

        let highest = self.highest_version();
        let target = match target {
            UpgradeTarget::Latest => highest,
            UpgradeTarget::Version(v) if v > highest => {
                return Err(StorageError::UnknownSchemaVersion {
                    requested: v,
                    highest,
                });
            }
            UpgradeTarget::Version(v) => v,
        };

        let from = self.current_version()?;
        if from >= target {
            debug!(current = from, target, "schema already up to date");
            return Ok(UpgradeReport {
                from,
                to: from,
                applied: Vec::new(),
                backup: None,
            });
        }

        let backup = self.backup(from)?;

        let mut pending: Vec<&Migration> = self
            .migrations
            .iter()
            .filter(|m| m.version > from && m.version <= target)
            .collect();
        pending.sort_by_key(|m| m.version);

        let mut applied = Vec::with_capacity(pending.len());
        for migration in pending {
            self.apply(migration)?;
            applied.push(migration.version);
        }

        info!(from, to = target, applied = applied.len(), "schema upgraded");
        Ok(UpgradeReport {
            from,
            to: target,
            applied,
            backup,
        })
    }

    fn apply(&mut self, migration: &Migration) -> Result<(), StorageError> {
        let wrap = |source: StorageError| StorageError::Migration {
            version: migration.version,
            description: migration.description.to_string(),
            source: Box::new(source),
        };

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| wrap(e.into()))?;

        let result = (|| -> Result<(), StorageError> {
            if let Some(hook) = migration.pre_hook {
                hook(&tx)?;
            }
            for statement in migration.statements {
                tx.execute_batch(statement)?;
            }
            if let Some(hook) = migration.post_hook {
                hook(&tx)?;
            }
            tx.execute(
                "INSERT INTO schema_version (version, applied_at, description) VALUES (?1, ?2, ?3)",
                rusqlite::params![migration.version, Utc::now(), migration.description],
            )?;
            Ok(())
        })();

        match result {
            Ok(()) => {
                tx.commit().map_err(|e| wrap(e.into()))?;
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applied migration"
                );
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback() {
                    warn!(version = migration.version, error = %rollback, "rollback failed");
                }
                Err(wrap(e))
            }
        }
    }

    /// Copies the live store aside and checks the copy opens cleanly.
    /// Skipped for a store with nothing in it yet and for in-memory stores
    /// with no backup directory configured.
    fn backup(&self, current: u32) -> Result<Option<PathBuf>, StorageError> {
        if current == 0 {
            debug!("fresh store, no backup taken");
            return Ok(None);
        }
        let db_path = self
            .conn
            .path()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);
        let dir = match (&self.backup_dir, &db_path) {
            (Some(dir), _) => dir.clone(),
            (None, Some(path)) => path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("backups"),
            (None, None) => {
                debug!("in-memory store without backup directory, no backup taken");
                return Ok(None);
            }
        };
        let stem = db_path
            .as_deref()
            .and_then(Path::file_stem)
            .and_then(|s| s.to_str())
            .unwrap_or("store");
        let file = dir.join(format!(
            "{stem}.v{current}.{}.bak",
            Utc::now().format("%Y%m%dT%H%M%S%.3f")
        ));

        let failed = |path: &Path, reason: String| StorageError::Backup {
            path: path.to_path_buf(),
            reason,
        };
        std::fs::create_dir_all(&dir).map_err(|e| failed(&dir, e.to_string()))?;
        self.conn
            .backup(DatabaseName::Main, &file, None)
            .map_err(|e| failed(&file, e.to_string()))?;

        let copy = Connection::open(&file).map_err(|e| failed(&file, e.to_string()))?;
        let check: String = copy
            .query_row("PRAGMA quick_check", [], |row| row.get(0))
            .map_err(|e| failed(&file, e.to_string()))?;
        if check != "ok" {
            return Err(failed(&file, format!("integrity check reported: {check}")));
        }

        info!(path = %file.display(), version = current, "pre-upgrade backup written");
        Ok(Some(file))
    }

    /// Compares the live tables and columns against the expected layout.
    pub fn verify_schema(&self) -> Result<SchemaReport, StorageError> {
        verify_schema(self.conn)
    }
}

pub fn verify_schema(conn: &Connection) -> Result<SchemaReport, StorageError> {
    let tables: HashSet<String> = {
        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table'")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        names
    };

    let mut report = SchemaReport::default();
    let mut columns_stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    for expected in EXPECTED_SCHEMA {
        if !tables.contains(expected.name) {
            report.issues.push(SchemaIssue::MissingTable {
                table: expected.name.to_string(),
            });
            continue;
        }
        let columns: HashSet<String> = columns_stmt
            .query_map([expected.name], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        for column in expected.columns {
            if !columns.contains(*column) {
                report.issues.push(SchemaIssue::MissingColumn {
                    table: expected.name.to_string(),
                    column: column.to_string(),
                });
            }
        }
    }
    Ok(report)
}
