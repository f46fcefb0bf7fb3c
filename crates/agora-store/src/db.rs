use rusqlite::Connection;

use crate::error::Result;

/// Initialise the conversation schema.
///
/// Safe to call on every startup — uses `IF NOT EXISTS` throughout, then
/// applies additive migrations for databases created by older builds.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
        CREATE TABLE IF NOT EXISTS conversations (
            id            TEXT PRIMARY KEY,
            model         TEXT,
            mode          TEXT NOT NULL DEFAULT 'simple',
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL,
            message_count INTEGER NOT NULL DEFAULT 0,
            title         TEXT,
            metadata_json TEXT NOT NULL DEFAULT '{}'
        );
        CREATE TABLE IF NOT EXISTS messages (
            seq             INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            role            TEXT NOT NULL,
            content         TEXT NOT NULL,
            timestamp       TEXT NOT NULL,
            model           TEXT,
            message_type    TEXT,
            iteration       INTEGER,
            metadata_json   TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, seq);
        CREATE INDEX IF NOT EXISTS idx_conversations_updated
            ON conversations(updated_at DESC);",
    )?;

    run_migrations(conn)?;
    Ok(())
}

/// Additive migrations for databases that predate a column.
///
/// Each entry is a no-op when the column already exists, so the whole list
/// re-runs on every open.
fn run_migrations(conn: &Connection) -> Result<()> {
    add_column_if_missing(conn, "messages", "message_type", "TEXT")?;
    add_column_if_missing(conn, "messages", "iteration", "INTEGER")?;
    add_column_if_missing(conn, "messages", "metadata_json", "TEXT")?;
    add_column_if_missing(
        conn,
        "conversations",
        "metadata_json",
        "TEXT NOT NULL DEFAULT '{}'",
    )?;
    Ok(())
}

fn add_column_if_missing(
    conn: &Connection,
    table: &str,
    column: &str,
    ddl_type: &str,
) -> Result<()> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let exists = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .filter_map(|r| r.ok())
        .any(|name| name == column);

    if !exists {
        conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column} {ddl_type};"))?;
    }
    Ok(())
}
