//! Named, idempotent schema migrations recorded in a ledger table.

use braid_core::{now_utc, timestamp_from_db, timestamp_to_db};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::BraidResult;

pub(crate) type Migration = (&'static str, fn(&Connection) -> BraidResult<()>);

pub(crate) const MIGRATIONS: &[Migration] = &[
    ("m001_initial", m001_initial),
    (
        "m002_track_current_conversation",
        m002_track_current_conversation,
    ),
    ("m003_canonical_timestamps", m003_canonical_timestamps),
];

/// Applies every migration missing from the ledger. Returns how many ran.
pub(crate) fn migrate(connection: &Connection) -> BraidResult<usize> {
    migrate_with(connection, MIGRATIONS)
}

pub(crate) fn migrate_with(connection: &Connection, migrations: &[Migration]) -> BraidResult<usize> {
    connection.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS _braid_migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL
        );
        "#,
    )?;

    let mut applied = 0usize;
    for (name, apply) in migrations {
        let already_applied = connection
            .query_row(
                "SELECT 1 FROM _braid_migrations WHERE name = ?1",
                params![name],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .is_some();
        if already_applied {
            continue;
        }

        let transaction = connection.unchecked_transaction()?;
        apply(&transaction)?;
        transaction.execute(
            "INSERT INTO _braid_migrations (name, applied_at) VALUES (?1, ?2)",
            params![name, timestamp_to_db(now_utc())],
        )?;
        transaction.commit()?;
        info!(migration = name, "applied schema migration");
        applied += 1;
    }
    Ok(applied)
}

fn m001_initial(connection: &Connection) -> BraidResult<()> {
    connection.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS conversations (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            model TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS turns (
            id TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            created_at TEXT NOT NULL,
            model TEXT NULL,
            prompt TEXT NULL,
            system TEXT NULL,
            response TEXT NULL,
            options_json TEXT NULL,
            input_tokens INTEGER NULL,
            output_tokens INTEGER NULL,
            duration_ms INTEGER NULL
        );
        "#,
    )?;
    Ok(())
}

fn m002_track_current_conversation(connection: &Connection) -> BraidResult<()> {
    connection.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS state (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )?;
    if !column_exists(connection, "turns", "parent_id")? {
        connection
            .execute_batch("ALTER TABLE turns ADD COLUMN parent_id TEXT NULL REFERENCES turns(id);")?;
    }
    if !column_exists(connection, "turns", "parent_tracked")? {
        connection.execute_batch(
            "ALTER TABLE turns ADD COLUMN parent_tracked INTEGER NOT NULL DEFAULT 0;",
        )?;
    }
    connection.execute_batch(
        r#"
        CREATE INDEX IF NOT EXISTS idx_turns_parent_id ON turns (parent_id);
        CREATE INDEX IF NOT EXISTS idx_turns_conversation_created
            ON turns (conversation_id, created_at);
        "#,
    )?;
    Ok(())
}

/// Rewrites `created_at` values into the fixed-width encoding so SQL string
/// comparison matches time order.
fn m003_canonical_timestamps(connection: &Connection) -> BraidResult<()> {
    let mut statement = connection.prepare("SELECT rowid, created_at FROM turns")?;
    let rows = statement
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut rewritten = 0usize;
    for (rowid, raw) in rows {
        let canonical = timestamp_to_db(timestamp_from_db(&raw)?);
        if canonical != raw {
            connection.execute(
                "UPDATE turns SET created_at = ?1 WHERE rowid = ?2",
                params![canonical, rowid],
            )?;
            rewritten += 1;
        }
    }
    if rewritten > 0 {
        info!(rewritten, "normalized legacy turn timestamps");
    }
    Ok(())
}

fn column_exists(connection: &Connection, table: &str, column: &str) -> BraidResult<bool> {
    let mut statement = connection.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut rows = statement.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
