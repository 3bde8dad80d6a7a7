//! SQLite persistence for conversations, messages, and embeddings.
//!
//! This is the narrow storage collaborator behind the retrieval engine:
//! keyed inserts and selects plus an embedding upsert. Vector search lives
//! in [`crate::search`]; both share the same connection with the
//! `sqlite-vec` extension registered process-wide.

use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::Once;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::{Connection, OptionalExtension, ffi};
use uuid::Uuid;

use crate::errors::StoreError;

/// A persisted conversation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A persisted message. Immutable once created except for being read.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Connection handle for the message store.
///
/// Cloning is cheap: the underlying connection is shared.
#[derive(Clone)]
pub struct MessageStore {
    conn: Connection,
}

impl MessageStore {
    /// Open (or create) the store at `path`, registering the `sqlite-vec`
    /// extension and applying the schema.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        register_sqlite_vec()?;
        let conn = Connection::open(path)
            .await
            .map_err(|err| StoreError::Storage(err.to_string()))?;
        Self::init(conn).await
    }

    /// Open an in-memory store (tests).
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        register_sqlite_vec()?;
        let conn = Connection::open_in_memory()
            .await
            .map_err(|err| StoreError::Storage(err.to_string()))?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| {
            // Verify the vector extension actually loaded.
            conn.query_row("select vec_version()", [], |row| row.get::<_, String>(0))?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    /// The underlying connection, for queries owned by other modules.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Create a conversation owned by `owner_id`.
    pub async fn create_conversation(
        &self,
        owner_id: &str,
        title: &str,
    ) -> Result<ConversationRecord, StoreError> {
        let record = ConversationRecord {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            title: title.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let row = record.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO conversations (id, owner_id, title, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    [
                        &row.id,
                        &row.owner_id,
                        &row.title,
                        &timestamp(row.created_at),
                        &timestamp(row.updated_at),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(record)
    }

    /// True if `conversation_id` exists and belongs to `owner_id`.
    pub async fn conversation_owned_by(
        &self,
        conversation_id: &str,
        owner_id: &str,
    ) -> Result<bool, StoreError> {
        let conversation_id = conversation_id.to_string();
        let owner_id = owner_id.to_string();
        let found = self
            .conn
            .call(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT id FROM conversations WHERE id = ?1 AND owner_id = ?2",
                        [&conversation_id, &owner_id],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?;
                Ok(row.is_some())
            })
            .await?;
        Ok(found)
    }

    /// Insert a message and bump the conversation's `updated_at`.
    ///
    /// Persistence is synchronous: the message row is committed before this
    /// returns. Embedding generation happens later, off the request path.
    pub async fn insert_message(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str,
    ) -> Result<MessageRecord, StoreError> {
        let record = MessageRecord {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            role: role.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };
        let row = record.clone();
        self.conn
            .call(move |conn| {
                let created = timestamp(row.created_at);
                conn.execute(
                    "INSERT INTO messages (id, conversation_id, role, content, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    [&row.id, &row.conversation_id, &row.role, &row.content, &created],
                )?;
                conn.execute(
                    "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
                    [&created, &row.conversation_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(record)
    }

    /// List a conversation's messages in creation order.
    pub async fn list_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        let conversation_id = conversation_id.to_string();
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT id, conversation_id, role, content, created_at
                         FROM messages WHERE conversation_id = ?1
                         ORDER BY created_at ASC, id ASC",
                    )?;
                let rows = stmt
                    .query_map([&conversation_id], |row| {
                        Ok(MessageRecord {
                            id: row.get(0)?,
                            conversation_id: row.get(1)?,
                            role: row.get(2)?,
                            content: row.get(3)?,
                            created_at: parse_timestamp(&row.get::<_, String>(4)?),
                        })
                    })?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await?;
        Ok(rows)
    }

    /// Store the embedding for a message, replacing any previous vector.
    ///
    /// At most one embedding exists per message; re-embedding upserts.
    pub async fn upsert_embedding(
        &self,
        message_id: &str,
        vector: &[f32],
    ) -> Result<(), StoreError> {
        let message_id = message_id.to_string();
        let embedding_json = serde_json::to_string(vector)?;
        let created = timestamp(Utc::now());
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO message_embeddings (message_id, embedding, created_at)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT (message_id)
                     DO UPDATE SET embedding = excluded.embedding,
                                   created_at = excluded.created_at",
                    [&message_id, &embedding_json, &created],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Number of stored embeddings (diagnostics and tests).
    pub async fn embedding_count(&self) -> Result<usize, StoreError> {
        let count = self
            .conn
            .call(|conn| {
                let count: i64 = conn
                    .query_row("SELECT COUNT(*) FROM message_embeddings", [], |row| {
                        row.get(0)
                    })?;
                Ok(count as usize)
            })
            .await?;
        Ok(count)
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    title TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_conversations_owner ON conversations(owner_id);
CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL REFERENCES conversations(id),
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id);
CREATE TABLE IF NOT EXISTS message_embeddings (
    message_id TEXT PRIMARY KEY REFERENCES messages(id),
    embedding TEXT NOT NULL,
    created_at TEXT NOT NULL
);
";

/// Fixed-width RFC 3339 (millisecond precision, Z suffix) so lexicographic
/// and chronological order agree.
pub(crate) fn timestamp(when: DateTime<Utc>) -> String {
    when.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

fn register_sqlite_vec() -> Result<(), StoreError> {
    use std::sync::Mutex;

    static INIT: Once = Once::new();
    static INIT_RESULT: Mutex<Option<Result<(), String>>> = Mutex::new(None);

    INIT.call_once(|| {
        let result = unsafe {
            type SqliteExtensionInit = unsafe extern "C" fn(
                *mut ffi::sqlite3,
                *mut *mut c_char,
                *const ffi::sqlite3_api_routines,
            ) -> i32;

            let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
            let init_fn: SqliteExtensionInit =
                transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
            let rc = ffi::sqlite3_auto_extension(Some(init_fn));
            if rc != 0 {
                Err(format!(
                    "failed to register sqlite-vec extension (code {rc})"
                ))
            } else {
                Ok(())
            }
        };
        *INIT_RESULT.lock().expect("init result mutex poisoned") = Some(result);
    });

    INIT_RESULT
        .lock()
        .expect("init result mutex poisoned")
        .clone()
        .expect("init was called but result not set")
        .map_err(StoreError::Storage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn message_persists_before_any_embedding_exists() {
        let store = MessageStore::open_in_memory().await.unwrap();
        let conv = store.create_conversation("owner-1", "Mars notes").await.unwrap();
        let msg = store
            .insert_message(&conv.id, "user", "How do tardigrades survive vacuum?")
            .await
            .unwrap();

        let listed = store.list_messages(&conv.id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, msg.id);
        assert_eq!(store.embedding_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn embedding_upsert_keeps_one_row_per_message() {
        let store = MessageStore::open_in_memory().await.unwrap();
        let conv = store.create_conversation("owner-1", "t").await.unwrap();
        let msg = store.insert_message(&conv.id, "user", "hello").await.unwrap();

        store.upsert_embedding(&msg.id, &[0.1, 0.2]).await.unwrap();
        store.upsert_embedding(&msg.id, &[0.3, 0.4]).await.unwrap();
        assert_eq!(store.embedding_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn ownership_check_scopes_by_owner() {
        let store = MessageStore::open_in_memory().await.unwrap();
        let conv = store.create_conversation("alice", "t").await.unwrap();
        assert!(store.conversation_owned_by(&conv.id, "alice").await.unwrap());
        assert!(!store.conversation_owned_by(&conv.id, "mallory").await.unwrap());
    }
}
