//! Hand-rolled migration engine, favoring runtime file discovery over
//! compile-time embedding (`diesel_migrations::embed_migrations!`): the
//! CLI's `create <name>` subcommand needs to write a new migration file at
//! runtime, and the status/up/down subcommands need to discover files from a
//! directory rather than a baked-in migration list. The parsed SQL still
//! executes through a pooled `PgConnection` via `SimpleConnection`.

use chrono::{DateTime, Utc};
use diesel::connection::SimpleConnection;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

use wfo_core::errors::{CoreError, CoreResult};

use crate::error::PersistenceError;
use crate::schema::migrations;

const DOWN_MARKER: &str = "\n-- DOWN\n";

/// Danger patterns flagged (not blocked) before a migration runs.
const DANGER_PATTERNS: &[(&str, &str)] = &[
    ("DELETE", "DELETE without WHERE"),
    ("UPDATE", "UPDATE without WHERE"),
    ("TRUNCATE TABLE", "TRUNCATE TABLE"),
    ("DROP TABLE", "DROP TABLE"),
    ("DROP DATABASE", "DROP DATABASE"),
];

#[derive(Debug, Clone)]
pub struct MigrationFile {
    pub id: String,
    pub name: String,
    pub up_sql: String,
    pub down_sql: String,
}

#[derive(Queryable, Debug, Clone)]
pub struct MigrationRecord {
    pub id: String,
    pub name: String,
    pub up_sql: String,
    pub down_sql: String,
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum MigrationOutcome {
    Applied,
    AlreadyApplied,
}

/// Parses the `-- UP`/`-- DOWN` sections out of a migration file's contents.
/// The id is the filename minus its `.sql` extension (canonical form
/// `YYYYMMDDHHMMSS_slug`); the name is read from the `-- Migration: <name>`
/// header when present, else falls back to the slug portion of the id.
pub fn parse_migration_file(path: &Path) -> CoreResult<MigrationFile> {
    let id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| CoreError::Validation(format!("unreadable migration filename: {path:?}")))?
        .to_string();
    let contents = fs::read_to_string(path).map_err(|err| CoreError::StorageUnavailable(format!("{path:?}: {err}")))?;

    let name = contents
        .lines()
        .find_map(|line| line.strip_prefix("-- Migration:"))
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| id.splitn(2, '_').nth(1).unwrap_or(&id).to_string());

    let (up_sql, down_sql) = match contents.split_once(DOWN_MARKER) {
        Some((up, down)) => (strip_up_marker(up), down.trim().to_string()),
        None => (strip_up_marker(&contents), String::new()),
    };

    Ok(MigrationFile { id, name, up_sql, down_sql })
}

fn strip_up_marker(section: &str) -> String {
    section
        .split_once("-- UP\n")
        .map(|(_, rest)| rest)
        .unwrap_or(section)
        .trim()
        .to_string()
}

/// Loads every `*.sql` file in `dir`, sorted by id (the sortable filename
/// prefix makes lexicographic sort equal chronological sort).
pub fn load_migrations_dir(dir: &Path) -> CoreResult<Vec<MigrationFile>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|err| CoreError::StorageUnavailable(format!("{dir:?}: {err}")))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("sql"))
        .collect();
    files.sort();

    files.iter().map(|path| parse_migration_file(path)).collect()
}

/// Writes a template file for `create <name>`, returning its path.
pub fn create_migration_file(dir: &Path, name: &str, now: DateTime<Utc>) -> CoreResult<PathBuf> {
    fs::create_dir_all(dir).map_err(|err| CoreError::StorageUnavailable(format!("{dir:?}: {err}")))?;
    let slug = name.trim().replace(' ', "_").to_lowercase();
    let prefix = now.format("%Y%m%d%H%M%S");
    let path = dir.join(format!("{prefix}_{slug}.sql"));
    let body = format!(
        "-- Migration: {name}\n-- Created: {}\n\n-- UP\n\n\n-- DOWN\n\n",
        now.to_rfc3339()
    );
    fs::write(&path, body).map_err(|err| CoreError::StorageUnavailable(format!("{path:?}: {err}")))?;
    Ok(path)
}

fn danger_warnings(sql: &str) -> Vec<&'static str> {
    let upper = sql.to_uppercase();
    DANGER_PATTERNS
        .iter()
        .filter_map(|(keyword, label)| {
            if !upper.contains(keyword) {
                return None;
            }
            let has_where = upper.contains("WHERE");
            let flagged = match *keyword {
                "DELETE" | "UPDATE" => !has_where,
                _ => true,
            };
            flagged.then_some(*label)
        })
        .collect()
}

pub fn ensure_migrations_table(conn: &mut PgConnection) -> CoreResult<()> {
    conn.batch_execute(
        "CREATE TABLE IF NOT EXISTS migrations (\
            id TEXT PRIMARY KEY, \
            name TEXT NOT NULL, \
            up_sql TEXT NOT NULL, \
            down_sql TEXT NOT NULL, \
            executed_at TIMESTAMPTZ NOT NULL DEFAULT now())",
    )
    .map_err(|err| CoreError::from(PersistenceError::from(err)))
}

pub fn run_migration(conn: &mut PgConnection, m: &MigrationFile) -> CoreResult<MigrationOutcome> {
    ensure_migrations_table(conn)?;

    let already: i64 = migrations::table
        .filter(migrations::id.eq(&m.id))
        .count()
        .get_result(conn)
        .map_err(|err| CoreError::from(PersistenceError::from(err)))?;
    if already > 0 {
        return Ok(MigrationOutcome::AlreadyApplied);
    }

    for warning in danger_warnings(&m.up_sql) {
        tracing::warn!(migration = %m.id, pattern = warning, "migration contains a flagged SQL pattern");
    }

    conn.transaction(|tx| -> Result<(), diesel::result::Error> {
        tx.batch_execute(&m.up_sql)?;
        diesel::insert_into(migrations::table)
            .values((
                migrations::id.eq(&m.id),
                migrations::name.eq(&m.name),
                migrations::up_sql.eq(&m.up_sql),
                migrations::down_sql.eq(&m.down_sql),
                migrations::executed_at.eq(Utc::now()),
            ))
            .execute(tx)?;
        Ok(())
    })
    .map_err(|err| CoreError::from(PersistenceError::from(err)))?;

    Ok(MigrationOutcome::Applied)
}

pub fn rollback_migration(conn: &mut PgConnection, id: &str) -> CoreResult<()> {
    let record: MigrationRecord = migrations::table
        .filter(migrations::id.eq(id))
        .first(conn)
        .map_err(|err| match err {
            diesel::result::Error::NotFound => CoreError::NotFound(id.to_string()),
            other => CoreError::from(PersistenceError::from(other)),
        })?;

    conn.transaction(|tx| -> Result<(), diesel::result::Error> {
        if !record.down_sql.trim().is_empty() {
            tx.batch_execute(&record.down_sql)?;
        }
        diesel::delete(migrations::table.filter(migrations::id.eq(id))).execute(tx)?;
        Ok(())
    })
    .map_err(|err| CoreError::RollbackFailed(format!("{id}: {err}")))
}

pub fn pending_migrations(conn: &mut PgConnection, all: &[MigrationFile]) -> CoreResult<Vec<MigrationFile>> {
    ensure_migrations_table(conn)?;
    let applied_ids: Vec<String> =
        migrations::table.select(migrations::id).load(conn).map_err(|err| CoreError::from(PersistenceError::from(err)))?;
    Ok(all.iter().filter(|m| !applied_ids.contains(&m.id)).cloned().collect())
}

pub fn applied_migrations(conn: &mut PgConnection) -> CoreResult<Vec<MigrationRecord>> {
    ensure_migrations_table(conn)?;
    migrations::table
        .order(migrations::executed_at.desc())
        .load(conn)
        .map_err(|err| CoreError::from(PersistenceError::from(err)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_up_and_down_sections() {
        let contents = "-- Migration: add users\n-- Created: 2024-01-01T00:00:00Z\n\n-- UP\nCREATE TABLE users (id UUID);\n\n-- DOWN\nDROP TABLE users;\n";
        let path = Path::new("20240101000000_add_users.sql");
        std::fs::write(path, contents).unwrap();
        let parsed = parse_migration_file(path).unwrap();
        std::fs::remove_file(path).ok();

        assert_eq!(parsed.id, "20240101000000_add_users");
        assert_eq!(parsed.name, "add users");
        assert!(parsed.up_sql.contains("CREATE TABLE users"));
        assert!(parsed.down_sql.contains("DROP TABLE users"));
    }

    #[test]
    fn missing_down_section_yields_empty_down_sql() {
        let contents = "-- Migration: seed\n\n-- UP\nINSERT INTO x VALUES (1);\n";
        let path = Path::new("20240101000001_seed.sql");
        std::fs::write(path, contents).unwrap();
        let parsed = parse_migration_file(path).unwrap();
        std::fs::remove_file(path).ok();

        assert_eq!(parsed.down_sql, "");
    }

    #[test]
    fn danger_patterns_flag_unqualified_statements() {
        assert_eq!(danger_warnings("DELETE FROM users;"), vec!["DELETE without WHERE"]);
        assert!(danger_warnings("DELETE FROM users WHERE id = 1;").is_empty());
        assert_eq!(danger_warnings("DROP TABLE users;"), vec!["DROP TABLE"]);
    }
}
