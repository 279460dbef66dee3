//! SQLite-backed `TurnStore` implementation with durable persistence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use braid_core::{timestamp_from_db, timestamp_to_db};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};
use tracing::debug;

use crate::migrations::migrate;
use crate::{BraidError, BraidResult, Conversation, ConversationSummary, Turn, TurnStore};

const HEAD_KEY: &str = "head";

const TURN_COLUMNS: &str = r#"
    rowid, id, conversation_id, parent_id, parent_tracked, created_at, model, prompt,
    system, response, options_json, input_tokens, output_tokens, duration_ms
"#;

/// Persistent SQLite turn store holding one connection for its lifetime.
#[derive(Debug)]
pub struct SqliteTurnStore {
    connection: Connection,
    path: Option<PathBuf>,
}

impl SqliteTurnStore {
    /// Opens (creating if needed) the log database at `path` and upgrades its
    /// schema.
    pub fn open(path: impl AsRef<Path>) -> BraidResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let connection = Connection::open(&path)?;
        Self::from_connection(connection, Some(path))
    }

    /// Opens a private in-memory store.
    pub fn open_in_memory() -> BraidResult<Self> {
        Self::from_connection(Connection::open_in_memory()?, None)
    }

    fn from_connection(connection: Connection, path: Option<PathBuf>) -> BraidResult<Self> {
        connection.busy_timeout(Duration::from_secs(5))?;
        connection.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            "#,
        )?;
        let applied = migrate(&connection)?;
        debug!(applied, path = ?path, "opened sqlite turn store");
        Ok(Self { connection, path })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.connection
    }

    fn query_turns(
        &self,
        sql_tail: &str,
        params: impl rusqlite::Params,
    ) -> BraidResult<Vec<Turn>> {
        let mut statement = self
            .connection
            .prepare(&format!("SELECT {TURN_COLUMNS} FROM turns {sql_tail}"))?;
        let rows = statement.query_map(params, TurnRow::from_row)?;
        let mut turns = Vec::new();
        for row in rows {
            turns.push(row?.into_turn()?);
        }
        Ok(turns)
    }

    fn query_turn(&self, sql_tail: &str, params: impl rusqlite::Params) -> BraidResult<Option<Turn>> {
        self.connection
            .query_row(
                &format!("SELECT {TURN_COLUMNS} FROM turns {sql_tail}"),
                params,
                TurnRow::from_row,
            )
            .optional()?
            .map(TurnRow::into_turn)
            .transpose()
    }
}

impl TurnStore for SqliteTurnStore {
    fn insert_conversation(&self, conversation: &Conversation) -> BraidResult<()> {
        self.connection.execute(
            r#"
            INSERT INTO conversations (id, name, model)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO NOTHING
            "#,
            params![conversation.id, conversation.name, conversation.model],
        )?;
        Ok(())
    }

    fn get_conversation(&self, id: &str) -> BraidResult<Option<Conversation>> {
        Ok(self
            .connection
            .query_row(
                "SELECT id, name, model FROM conversations WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Conversation {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        model: row.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    fn insert_turn(&self, turn: &Turn) -> BraidResult<Turn> {
        if turn.conversation_id.trim().is_empty() {
            return Err(BraidError::Validation(format!(
                "turn {} has no conversation_id",
                turn.id
            )));
        }
        if self.get_conversation(&turn.conversation_id)?.is_none() {
            return Err(BraidError::Validation(format!(
                "turn {} references unknown conversation {}",
                turn.id, turn.conversation_id
            )));
        }

        let options_json = if turn.options.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&turn.options)?)
        };
        self.connection.execute(
            r#"
            INSERT INTO turns (
                id, conversation_id, parent_id, parent_tracked, created_at, model, prompt,
                system, response, options_json, input_tokens, output_tokens, duration_ms
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                turn.id,
                turn.conversation_id,
                turn.parent_id,
                turn.parent_tracked,
                timestamp_to_db(turn.created_at),
                turn.model,
                turn.prompt,
                turn.system,
                turn.response,
                options_json,
                option_u64_to_db("input_tokens", turn.input_tokens)?,
                option_u64_to_db("output_tokens", turn.output_tokens)?,
                option_u64_to_db("duration_ms", turn.duration_ms)?,
            ],
        )?;

        let mut stored = turn.clone();
        stored.sequence = self.connection.last_insert_rowid();
        Ok(stored)
    }

    fn append_turn(&self, conversation: &Conversation, turn: &Turn) -> BraidResult<Turn> {
        let transaction = self.connection.unchecked_transaction()?;
        self.insert_conversation(conversation)?;
        let stored = self.insert_turn(turn)?;
        transaction.commit()?;
        Ok(stored)
    }

    fn get_turn(&self, id: &str) -> BraidResult<Turn> {
        self.find_turn(id)?
            .ok_or_else(|| BraidError::turn_not_found(id))
    }

    fn find_turn(&self, id: &str) -> BraidResult<Option<Turn>> {
        self.query_turn("WHERE id = ?1", params![id])
    }

    fn turns_in_conversation(&self, conversation_id: &str) -> BraidResult<Vec<Turn>> {
        self.query_turns("WHERE conversation_id = ?1", params![conversation_id])
    }

    fn most_recent_turn_before(
        &self,
        conversation_id: &str,
        before: DateTime<Utc>,
    ) -> BraidResult<Option<Turn>> {
        self.query_turn(
            r#"
            WHERE conversation_id = ?1 AND created_at < ?2
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
            "#,
            params![conversation_id, timestamp_to_db(before)],
        )
    }

    fn latest_turn(&self, conversation_id: &str) -> BraidResult<Option<Turn>> {
        self.query_turn(
            r#"
            WHERE conversation_id = ?1
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
            "#,
            params![conversation_id],
        )
    }

    fn most_recently_active_conversation(&self) -> BraidResult<Option<String>> {
        Ok(self
            .connection
            .query_row(
                "SELECT conversation_id FROM turns ORDER BY created_at DESC, rowid DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn conversation_summaries(&self) -> BraidResult<Vec<ConversationSummary>> {
        let mut statement = self.connection.prepare(
            r#"
            SELECT c.id, c.name, c.model, COUNT(t.id), MAX(t.created_at)
            FROM conversations c
            LEFT JOIN turns t ON t.conversation_id = c.id
            GROUP BY c.id
            "#,
        )?;
        let rows = statement.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            let (id, name, model, turn_count, last_active) = row?;
            summaries.push(ConversationSummary {
                id,
                name,
                model,
                turn_count: usize::try_from(turn_count).map_err(|_| {
                    BraidError::InvalidPersistedValue {
                        field: "turn_count",
                        value: turn_count.to_string(),
                    }
                })?,
                last_active: last_active.as_deref().map(timestamp_from_db).transpose()?,
            });
        }
        Ok(summaries)
    }

    fn link_parent(&self, turn_id: &str, parent_id: &str) -> BraidResult<bool> {
        let changed = self.connection.execute(
            r#"
            UPDATE turns
            SET parent_id = ?2, parent_tracked = 1
            WHERE id = ?1 AND parent_id IS NULL
            "#,
            params![turn_id, parent_id],
        )?;
        if changed == 0 && self.find_turn(turn_id)?.is_none() {
            return Err(BraidError::turn_not_found(turn_id));
        }
        Ok(changed > 0)
    }

    fn get_head(&self) -> BraidResult<Option<String>> {
        Ok(self
            .connection
            .query_row(
                "SELECT value FROM state WHERE key = ?1",
                params![HEAD_KEY],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn set_head(&self, turn_id: &str) -> BraidResult<()> {
        self.connection.execute(
            r#"
            INSERT INTO state (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
            params![HEAD_KEY, turn_id],
        )?;
        Ok(())
    }

    fn clear_head(&self) -> BraidResult<()> {
        self.connection
            .execute("DELETE FROM state WHERE key = ?1", params![HEAD_KEY])?;
        Ok(())
    }
}

struct TurnRow {
    sequence: i64,
    id: String,
    conversation_id: String,
    parent_id: Option<String>,
    parent_tracked: bool,
    created_at: String,
    model: Option<String>,
    prompt: Option<String>,
    system: Option<String>,
    response: Option<String>,
    options_json: Option<String>,
    input_tokens: Option<i64>,
    output_tokens: Option<i64>,
    duration_ms: Option<i64>,
}

impl TurnRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            sequence: row.get(0)?,
            id: row.get(1)?,
            conversation_id: row.get(2)?,
            parent_id: row.get(3)?,
            parent_tracked: row.get(4)?,
            created_at: row.get(5)?,
            model: row.get(6)?,
            prompt: row.get(7)?,
            system: row.get(8)?,
            response: row.get(9)?,
            options_json: row.get(10)?,
            input_tokens: row.get(11)?,
            output_tokens: row.get(12)?,
            duration_ms: row.get(13)?,
        })
    }

    fn into_turn(self) -> BraidResult<Turn> {
        let options = match self.options_json.as_deref().map(str::trim) {
            None | Some("") => Map::new(),
            Some(raw) => match serde_json::from_str::<Value>(raw)? {
                Value::Object(map) => map,
                Value::Null => Map::new(),
                other => {
                    return Err(BraidError::InvalidPersistedValue {
                        field: "options_json",
                        value: other.to_string(),
                    })
                }
            },
        };
        Ok(Turn {
            id: self.id,
            conversation_id: self.conversation_id,
            // Older loggers store an empty string instead of NULL.
            parent_id: self.parent_id.filter(|parent| !parent.is_empty()),
            parent_tracked: self.parent_tracked,
            created_at: timestamp_from_db(&self.created_at)?,
            sequence: self.sequence,
            model: self.model.unwrap_or_default(),
            prompt: self.prompt.unwrap_or_default(),
            system: self.system,
            response: self.response.unwrap_or_default(),
            options,
            input_tokens: option_u64_from_db("input_tokens", self.input_tokens)?,
            output_tokens: option_u64_from_db("output_tokens", self.output_tokens)?,
            duration_ms: option_u64_from_db("duration_ms", self.duration_ms)?,
        })
    }
}

fn option_u64_to_db(field: &'static str, value: Option<u64>) -> BraidResult<Option<i64>> {
    value
        .map(|value| {
            i64::try_from(value)
                .map_err(|_| BraidError::Validation(format!("{field} {value} exceeds sqlite integer")))
        })
        .transpose()
}

fn option_u64_from_db(field: &'static str, value: Option<i64>) -> BraidResult<Option<u64>> {
    value
        .map(|value| {
            u64::try_from(value).map_err(|_| BraidError::InvalidPersistedValue {
                field,
                value: value.to_string(),
            })
        })
        .transpose()
}
