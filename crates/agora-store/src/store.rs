use std::sync::Mutex;

use agora_core::types::{MessageType, Mode, Role};
use rusqlite::Connection;
use tracing::{debug, instrument};

use crate::db::init_db;
use crate::error::{Result, StoreError};
use crate::types::{Conversation, ConversationSummary, StoredMessage};

/// Key inside `conversations.metadata_json` holding the serialized debate state.
const DEBATE_STATE_KEY: &str = "debate_state";
/// Derived titles are cut at this many characters.
const TITLE_MAX_CHARS: usize = 60;

/// Fields of a message to append, beyond role and content.
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub model: Option<String>,
    pub message_type: Option<MessageType>,
    pub iteration: Option<u32>,
    pub metadata: Option<serde_json::Value>,
}

/// Thread-safe storage engine for conversations and messages.
///
/// Wraps a single SQLite connection in a `Mutex` — writes are serialized,
/// which is sufficient for the single-node target.
pub struct ConversationStore {
    db: Mutex<Connection>,
}

impl ConversationStore {
    /// Open (or create) the database at `path` and initialise the schema.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Create the conversation if absent, otherwise bump `updated_at`.
    ///
    /// The model binding is recorded on creation and refreshed whenever the
    /// caller supplies one.
    #[instrument(skip(self))]
    pub fn create_or_touch(&self, conversation_id: &str, model: Option<&str>) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        let inserted = db.execute(
            "INSERT OR IGNORE INTO conversations (id, model, mode, created_at, updated_at)
             VALUES (?1, ?2, 'simple', ?3, ?3)",
            rusqlite::params![conversation_id, model, now],
        )?;
        if inserted == 0 {
            db.execute(
                "UPDATE conversations
                 SET updated_at = ?1, model = COALESCE(?2, model)
                 WHERE id = ?3",
                rusqlite::params![now, model, conversation_id],
            )?;
        } else {
            debug!(conversation_id, "created conversation");
        }
        Ok(())
    }

    /// Append a message, bump the counters, and derive the title from the
    /// first user message when none is set yet.
    #[instrument(skip(self, content, msg), fields(role = %role))]
    pub fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
        msg: NewMessage,
    ) -> Result<i64> {
        let now = chrono::Utc::now().to_rfc3339();
        let metadata = msg
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE conversations
             SET message_count = message_count + 1, updated_at = ?1
             WHERE id = ?2",
            rusqlite::params![now, conversation_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                id: conversation_id.to_string(),
            });
        }

        db.execute(
            "INSERT INTO messages
             (conversation_id, role, content, timestamp, model, message_type, iteration, metadata_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                conversation_id,
                role.as_str(),
                content,
                now,
                msg.model,
                msg.message_type.map(|t| t.as_str()),
                msg.iteration,
                metadata,
            ],
        )?;
        let seq = db.last_insert_rowid();

        if role == Role::User {
            db.execute(
                "UPDATE conversations SET title = COALESCE(title, ?1) WHERE id = ?2",
                rusqlite::params![truncate_title(content), conversation_id],
            )?;
        }

        Ok(seq)
    }

    /// Retrieve a conversation by id, returning `None` if it does not exist.
    #[instrument(skip(self))]
    pub fn get(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT id, model, mode, created_at, updated_at, message_count, title, metadata_json
             FROM conversations WHERE id = ?1",
            rusqlite::params![conversation_id],
            row_to_conversation,
        ) {
            Ok(c) => Ok(Some(c)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    /// List conversations, most recently updated first.
    #[instrument(skip(self))]
    pub fn list_conversations(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ConversationSummary>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, title, updated_at, mode, message_count
             FROM conversations
             ORDER BY updated_at DESC
             LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![limit as i64, offset as i64], |row| {
            let mode_str: String = row.get(3)?;
            Ok(ConversationSummary {
                id: row.get(0)?,
                title: row.get(1)?,
                updated_at: row.get(2)?,
                mode: Mode::parse(&mode_str).unwrap_or_default(),
                message_count: row.get::<_, i64>(4)? as u32,
            })
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Load the full ordered message sequence of one conversation.
    #[instrument(skip(self))]
    pub fn load_messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT seq, conversation_id, role, content, timestamp, model,
                    message_type, iteration, metadata_json
             FROM messages
             WHERE conversation_id = ?1
             ORDER BY seq",
        )?;
        let rows = stmt.query_map(rusqlite::params![conversation_id], row_to_message)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Change the conversation's operating mode.
    #[instrument(skip(self))]
    pub fn update_mode(&self, conversation_id: &str, mode: Mode) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE conversations SET mode = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![mode.as_str(), now, conversation_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                id: conversation_id.to_string(),
            });
        }
        Ok(())
    }

    /// Read the debate-state blob, if any.
    #[instrument(skip(self))]
    pub fn read_debate_state(&self, conversation_id: &str) -> Result<Option<serde_json::Value>> {
        let db = self.db.lock().unwrap();
        let metadata: String = match db.query_row(
            "SELECT metadata_json FROM conversations WHERE id = ?1",
            rusqlite::params![conversation_id],
            |row| row.get(0),
        ) {
            Ok(m) => m,
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                return Err(StoreError::NotFound {
                    id: conversation_id.to_string(),
                })
            }
            Err(e) => return Err(StoreError::Database(e)),
        };
        let parsed: serde_json::Value = serde_json::from_str(&metadata)?;
        Ok(parsed.get(DEBATE_STATE_KEY).cloned())
    }

    /// Write the debate-state blob, preserving other metadata keys.
    #[instrument(skip(self, state))]
    pub fn write_debate_state(
        &self,
        conversation_id: &str,
        state: &serde_json::Value,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        let metadata: String = match db.query_row(
            "SELECT metadata_json FROM conversations WHERE id = ?1",
            rusqlite::params![conversation_id],
            |row| row.get(0),
        ) {
            Ok(m) => m,
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                return Err(StoreError::NotFound {
                    id: conversation_id.to_string(),
                })
            }
            Err(e) => return Err(StoreError::Database(e)),
        };
        let mut parsed: serde_json::Value =
            serde_json::from_str(&metadata).unwrap_or_else(|_| serde_json::json!({}));
        parsed[DEBATE_STATE_KEY] = state.clone();

        db.execute(
            "UPDATE conversations SET metadata_json = ?1 WHERE id = ?2",
            rusqlite::params![serde_json::to_string(&parsed)?, conversation_id],
        )?;
        Ok(())
    }

    /// Delete one conversation and all its messages.
    /// Returns false if the id was unknown.
    #[instrument(skip(self))]
    pub fn delete(&self, conversation_id: &str) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "DELETE FROM conversations WHERE id = ?1",
            rusqlite::params![conversation_id],
        )?;
        Ok(changed > 0)
    }

    /// Delete every conversation. Returns the number removed.
    #[instrument(skip(self))]
    pub fn delete_all(&self) -> Result<usize> {
        let db = self.db.lock().unwrap();
        let changed = db.execute("DELETE FROM conversations", [])?;
        Ok(changed)
    }
}

fn truncate_title(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.chars().count() <= TITLE_MAX_CHARS {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
        format!("{cut}…")
    }
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    let mode_str: String = row.get(2)?;
    let metadata_str: String = row.get(7)?;
    Ok(Conversation {
        id: row.get(0)?,
        model: row.get(1)?,
        mode: Mode::parse(&mode_str).unwrap_or_default(),
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        message_count: row.get::<_, i64>(5)? as u32,
        title: row.get(6)?,
        metadata: serde_json::from_str(&metadata_str).unwrap_or_else(|_| serde_json::json!({})),
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredMessage> {
    let role_str: String = row.get(2)?;
    let type_str: Option<String> = row.get(6)?;
    let metadata_str: Option<String> = row.get(8)?;
    Ok(StoredMessage {
        seq: row.get(0)?,
        conversation_id: row.get(1)?,
        role: Role::parse(&role_str).unwrap_or(Role::System),
        content: row.get(3)?,
        timestamp: row.get(4)?,
        model: row.get(5)?,
        message_type: type_str.as_deref().and_then(MessageType::parse),
        iteration: row.get::<_, Option<i64>>(7)?.map(|i| i as u32),
        metadata: metadata_str.and_then(|m| serde_json::from_str(&m).ok()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ConversationStore {
        ConversationStore::in_memory().expect("open in-memory store")
    }

    #[test]
    fn append_then_load_round_trips() {
        let s = store();
        s.create_or_touch("c1", Some("gpt-4o")).unwrap();
        s.append_message(
            "c1",
            Role::User,
            "hello there",
            NewMessage {
                model: Some("gpt-4o".to_string()),
                message_type: Some(MessageType::User),
                ..Default::default()
            },
        )
        .unwrap();

        let msgs = s.load_messages("c1").unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].role, Role::User);
        assert_eq!(msgs[0].content, "hello there");
        assert_eq!(msgs[0].model.as_deref(), Some("gpt-4o"));
        assert_eq!(msgs[0].message_type, Some(MessageType::User));
        assert_eq!(msgs[0].iteration, None);
    }

    #[test]
    fn message_count_tracks_appends() {
        let s = store();
        s.create_or_touch("c1", None).unwrap();
        for i in 0..3 {
            s.append_message("c1", Role::User, &format!("m{i}"), NewMessage::default())
                .unwrap();
        }
        let conv = s.get("c1").unwrap().unwrap();
        assert_eq!(conv.message_count, 3);
        assert_eq!(s.load_messages("c1").unwrap().len(), 3);
    }

    #[test]
    fn title_derives_from_first_user_message() {
        let s = store();
        s.create_or_touch("c1", None).unwrap();
        s.append_message("c1", Role::Assistant, "greeting", NewMessage::default())
            .unwrap();
        s.append_message("c1", Role::User, "What is Rust?", NewMessage::default())
            .unwrap();
        s.append_message("c1", Role::User, "And why?", NewMessage::default())
            .unwrap();

        let conv = s.get("c1").unwrap().unwrap();
        assert_eq!(conv.title.as_deref(), Some("What is Rust?"));
    }

    #[test]
    fn long_titles_are_truncated() {
        let s = store();
        s.create_or_touch("c1", None).unwrap();
        let long = "x".repeat(200);
        s.append_message("c1", Role::User, &long, NewMessage::default())
            .unwrap();
        let title = s.get("c1").unwrap().unwrap().title.unwrap();
        assert!(title.chars().count() <= TITLE_MAX_CHARS + 1);
        assert!(title.ends_with('…'));
    }

    #[test]
    fn updated_at_is_non_decreasing() {
        let s = store();
        s.create_or_touch("c1", None).unwrap();
        let before = s.get("c1").unwrap().unwrap();
        assert!(before.updated_at >= before.created_at);

        s.append_message("c1", Role::User, "hi", NewMessage::default())
            .unwrap();
        let after = s.get("c1").unwrap().unwrap();
        assert!(after.updated_at >= before.updated_at);
    }

    #[test]
    fn append_to_unknown_conversation_fails() {
        let s = store();
        let err = s
            .append_message("nope", Role::User, "hi", NewMessage::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn delete_cascades_to_messages() {
        let s = store();
        s.create_or_touch("c1", None).unwrap();
        s.append_message("c1", Role::User, "hi", NewMessage::default())
            .unwrap();

        assert!(s.delete("c1").unwrap());
        assert!(s.get("c1").unwrap().is_none());
        assert!(s.load_messages("c1").unwrap().is_empty());
        assert!(!s.delete("c1").unwrap());
    }

    #[test]
    fn delete_all_counts_conversations() {
        let s = store();
        s.create_or_touch("c1", None).unwrap();
        s.create_or_touch("c2", None).unwrap();
        assert_eq!(s.delete_all().unwrap(), 2);
        assert!(s.list_conversations(10, 0).unwrap().is_empty());
    }

    #[test]
    fn list_orders_by_recency_and_paginates() {
        let s = store();
        s.create_or_touch("old", None).unwrap();
        s.create_or_touch("new", None).unwrap();
        // Touching `old` again makes it the most recent.
        s.append_message("old", Role::User, "bump", NewMessage::default())
            .unwrap();

        let all = s.list_conversations(10, 0).unwrap();
        assert_eq!(all[0].id, "old");

        let page = s.list_conversations(1, 1).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, "new");
    }

    #[test]
    fn mode_updates_and_rejects_unknown_ids() {
        let s = store();
        s.create_or_touch("c1", None).unwrap();
        s.update_mode("c1", Mode::Debate).unwrap();
        assert_eq!(s.get("c1").unwrap().unwrap().mode, Mode::Debate);

        assert!(matches!(
            s.update_mode("nope", Mode::Simple),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn debate_state_round_trips_and_preserves_other_metadata() {
        let s = store();
        s.create_or_touch("c1", None).unwrap();
        assert!(s.read_debate_state("c1").unwrap().is_none());

        let state = serde_json::json!({"active": true, "max_iterations": 3});
        s.write_debate_state("c1", &state).unwrap();
        assert_eq!(s.read_debate_state("c1").unwrap(), Some(state));

        assert!(matches!(
            s.read_debate_state("nope"),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn round_artifact_messages_carry_iteration() {
        let s = store();
        s.create_or_touch("c1", None).unwrap();
        s.append_message(
            "c1",
            Role::System,
            "{}",
            NewMessage {
                message_type: Some(MessageType::ExpertAnswer),
                iteration: Some(1),
                metadata: Some(serde_json::json!({"confidence": 0.9})),
                ..Default::default()
            },
        )
        .unwrap();

        let msgs = s.load_messages("c1").unwrap();
        assert_eq!(msgs[0].message_type, Some(MessageType::ExpertAnswer));
        assert_eq!(msgs[0].iteration, Some(1));
        assert_eq!(
            msgs[0].metadata.as_ref().unwrap()["confidence"],
            serde_json::json!(0.9)
        );
    }
}
