//! Schema migration framework.
//!
//! Numbered SQL migrations are embedded at compile time via `include_str!`.
//! Each migration runs exactly once, tracked by the `schema_version` table.
//!
//! Databases written by the earlier bot (`cap_events` + `user_activity`
//! tables) are imported into the current schema once the migrations have run.

use rusqlite::Connection;

struct Migration {
    version: i32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: include_str!("migrations/001_baseline.sql"),
    },
    Migration {
        version: 2,
        sql: include_str!("migrations/002_occurrence_time_index.sql"),
    },
];

/// Create the `schema_version` table if it doesn't exist.
fn ensure_schema_version_table(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| format!("Failed to create schema_version table: {}", e))
}

/// Return the highest applied migration version, or 0 if none.
fn current_version(conn: &Connection) -> Result<i32, String> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .map_err(|e| format!("Failed to read schema version: {}", e))
}

fn table_exists(conn: &Connection, table: &str) -> bool {
    conn.prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")
        .and_then(|mut stmt| stmt.exists([table]))
        .unwrap_or(false)
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> bool {
    conn.prepare("SELECT 1 FROM pragma_table_info(?1) WHERE name = ?2")
        .and_then(|mut stmt| stmt.exists([table, column]))
        .unwrap_or(false)
}

/// Legacy per-member activity tables, newest name first.
const LEGACY_ACTIVITY_TABLES: &[&str] = &["user_activity", "last_user_activity"];

/// Copy rows from the legacy `cap_events` / `user_activity` tables.
///
/// Idempotent: inserts are `OR IGNORE` and the legacy tables
/// are left in place. Older `user_activity` tables predate the `private` column.
fn import_legacy_tables(conn: &Connection) -> Result<usize, String> {
    let mut imported = 0;

    if table_exists(conn, "cap_events") {
        imported += conn
            .execute(
                "INSERT OR IGNORE INTO occurrences (entity_id, occurred_at, source, recorded_by)
                 SELECT rsn, CAST(cap_timestamp AS INTEGER), COALESCE(source, 'auto'), manual_user
                 FROM cap_events",
                [],
            )
            .map_err(|e| format!("Failed to import cap_events: {}", e))?;
    }

    // Earlier bot revisions named this table `last_user_activity`
    for table in LEGACY_ACTIVITY_TABLES {
        if !table_exists(conn, table) {
            continue;
        }
        let private_expr = if column_exists(conn, table, "private") {
            "COALESCE(private, 0)"
        } else {
            "0"
        };
        let sql = format!(
            "INSERT OR IGNORE INTO polling_state (entity_id, last_activity_at, last_polled_at, inaccessible)
             SELECT rsn, CAST(last_activity_timestamp AS INTEGER), CAST(last_query_timestamp AS INTEGER), {}
             FROM {}",
            private_expr, table
        );
        imported += conn
            .execute(&sql, [])
            .map_err(|e| format!("Failed to import {}: {}", table, e))?;
    }

    if imported > 0 {
        log::info!("Migration: imported {} rows from legacy tables", imported);
    }
    Ok(imported)
}

/// Back up the database before applying migrations.
///
/// Uses SQLite's online backup API to create a hot copy at
/// `<db_path>.pre-migration.bak`. Only called when there are pending migrations
/// against a database that already has tables.
fn backup_before_migration(conn: &Connection) -> Result<(), String> {
    let db_path: String = conn
        .query_row("PRAGMA database_list", [], |row| row.get(2))
        .map_err(|e| format!("Failed to get database path: {}", e))?;

    if db_path.is_empty() || db_path == ":memory:" {
        return Ok(());
    }

    let backup_path = format!("{}.pre-migration.bak", db_path);
    let mut backup_conn = rusqlite::Connection::open(&backup_path)
        .map_err(|e| format!("Failed to open backup file: {}", e))?;

    let backup = rusqlite::backup::Backup::new(conn, &mut backup_conn)
        .map_err(|e| format!("Failed to initialize pre-migration backup: {}", e))?;

    backup
        .step(-1)
        .map_err(|e| format!("Pre-migration backup failed: {}", e))?;

    log::info!("Pre-migration backup created at {}", backup_path);
    Ok(())
}

/// Whether every known migration has been applied. Never writes.
pub fn is_up_to_date(conn: &Connection) -> bool {
    let max_known = MIGRATIONS.last().map(|m| m.version).unwrap_or(0);
    table_exists(conn, "schema_version")
        && current_version(conn).map(|v| v >= max_known).unwrap_or(false)
}

/// Run all pending migrations, then import any legacy tables.
///
/// Returns the number of migrations applied (0 if already up-to-date).
///
/// Forward-compat guard: if the database has a higher version than the highest
/// known migration, returns an error telling the user to update capwatch.
pub fn run_migrations(conn: &Connection) -> Result<usize, String> {
    ensure_schema_version_table(conn)?;

    let current = current_version(conn)?;
    let max_known = MIGRATIONS.last().map(|m| m.version).unwrap_or(0);

    if current > max_known {
        return Err(format!(
            "Database schema version ({}) is newer than this version of capwatch supports ({}). \
             Please update capwatch.",
            current, max_known
        ));
    }

    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();

    if pending.is_empty() {
        return Ok(0);
    }

    let has_data = current > 0 || table_exists(conn, "cap_events");
    if has_data {
        backup_before_migration(conn)?;
    }

    for migration in &pending {
        conn.execute_batch(migration.sql)
            .map_err(|e| format!("Migration v{} failed: {}", migration.version, e))?;

        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [migration.version],
        )
        .map_err(|e| format!("Failed to record migration v{}: {}", migration.version, e))?;

        log::info!("Applied migration v{}", migration.version);
    }

    import_legacy_tables(conn)?;

    Ok(pending.len())
}
