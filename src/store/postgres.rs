//! Postgres backend on `deadpool-postgres`.
//!
//! Status is stored as a rank so forward-only transitions are a single
//! `GREATEST(status, $n)` update, and reactions live in their own table with a
//! unique `(message_id, user_id, emoji)` key.

use super::{inbox_entry, ConversationStore, MessageStore};
use crate::error::{AppError, AppResult};
use crate::models::{
    Conversation, DeliveryStatus, InboxEntry, Message, NewMessage, Reaction, ReadScope,
};
use async_trait::async_trait;
use db_pool::PgPool;
use std::collections::HashMap;
use tokio_postgres::Row;
use uuid::Uuid;

const MESSAGE_COLUMNS: &str = "id, seq, conversation_id, sender_id, receiver_id, body, \
     attachment_url, attachment_name, reply_to, is_edited, is_deleted, is_read, status, \
     created_at, updated_at";

const CONVERSATION_COLUMNS: &str = "id, user_low, user_high, last_message_id, created_at";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attaches reactions to already-loaded rows, preserving row order
    async fn hydrate(&self, rows: Vec<Row>) -> AppResult<Vec<Message>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.get("id")).collect();

        let client = self.pool.get().await?;
        let reaction_rows = client
            .query(
                "SELECT message_id, user_id, emoji FROM message_reactions
                 WHERE message_id = ANY($1)
                 ORDER BY created_at, user_id, emoji",
                &[&ids],
            )
            .await?;

        let mut reactions: HashMap<Uuid, Vec<Reaction>> = HashMap::new();
        for row in reaction_rows {
            reactions
                .entry(row.get("message_id"))
                .or_default()
                .push(Reaction {
                    user_id: row.get("user_id"),
                    emoji: row.get("emoji"),
                });
        }

        rows.iter()
            .map(|row| {
                let id: Uuid = row.get("id");
                message_from_row(row, reactions.remove(&id).unwrap_or_default())
            })
            .collect()
    }

    async fn hydrate_one(&self, row: Option<Row>) -> AppResult<Option<Message>> {
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }
}

fn message_from_row(row: &Row, reactions: Vec<Reaction>) -> AppResult<Message> {
    let rank: i16 = row.get("status");
    let status = DeliveryStatus::from_db(rank).ok_or_else(|| {
        tracing::error!(status = rank, "unknown message status in store");
        AppError::Internal
    })?;

    Ok(Message {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        sender_id: row.get("sender_id"),
        receiver_id: row.get("receiver_id"),
        body: row.get("body"),
        attachment_url: row.get("attachment_url"),
        attachment_name: row.get("attachment_name"),
        reply_to: row.get("reply_to"),
        is_edited: row.get("is_edited"),
        is_deleted: row.get("is_deleted"),
        is_read: row.get("is_read"),
        status,
        reactions,
        sequence_number: row.get("seq"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        client_temp_id: None,
    })
}

fn conversation_from_row(row: &Row) -> Conversation {
    Conversation {
        id: row.get("id"),
        members: [row.get("user_low"), row.get("user_high")],
        last_message_id: row.get("last_message_id"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl ConversationStore for PgStore {
    async fn get_or_create(&self, a: Uuid, b: Uuid) -> AppResult<Conversation> {
        let (low, high) = Conversation::pair(a, b);
        let client = self.pool.get().await?;

        // A concurrent insert for the same pair hits the unique key and returns
        // nothing; the follow-up select then sees the winner's row.
        let inserted = client
            .query_opt(
                &format!(
                    "INSERT INTO conversations (id, user_low, user_high)
                     VALUES ($1, $2, $3)
                     ON CONFLICT (user_low, user_high) DO NOTHING
                     RETURNING {CONVERSATION_COLUMNS}"
                ),
                &[&Uuid::new_v4(), &low, &high],
            )
            .await?;

        if let Some(row) = inserted {
            let conversation = conversation_from_row(&row);
            tracing::debug!(conversation_id = %conversation.id, "conversation created");
            return Ok(conversation);
        }

        let row = client
            .query_one(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations
                     WHERE user_low = $1 AND user_high = $2"
                ),
                &[&low, &high],
            )
            .await?;
        Ok(conversation_from_row(&row))
    }

    async fn find(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1"),
                &[&id],
            )
            .await?;
        Ok(row.as_ref().map(conversation_from_row))
    }

    async fn find_by_pair(&self, a: Uuid, b: Uuid) -> AppResult<Option<Conversation>> {
        let (low, high) = Conversation::pair(a, b);
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations
                     WHERE user_low = $1 AND user_high = $2"
                ),
                &[&low, &high],
            )
            .await?;
        Ok(row.as_ref().map(conversation_from_row))
    }
}

#[async_trait]
impl MessageStore for PgStore {
    async fn insert(&self, new: NewMessage) -> AppResult<Message> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let row = tx
            .query_one(
                &format!(
                    "INSERT INTO messages
                        (id, conversation_id, sender_id, receiver_id, body,
                         attachment_url, attachment_name, reply_to, status)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                     RETURNING {MESSAGE_COLUMNS}"
                ),
                &[
                    &Uuid::new_v4(),
                    &new.conversation_id,
                    &new.sender_id,
                    &new.receiver_id,
                    &new.body,
                    &new.attachment_url,
                    &new.attachment_name,
                    &new.reply_to,
                    &DeliveryStatus::Sent.to_db(),
                ],
            )
            .await?;
        let message = message_from_row(&row, Vec::new())?;

        // concurrent sends may commit out of order; the pointer only moves forward
        tx.execute(
            "UPDATE conversations SET last_message_id = $1
             WHERE id = $2
               AND (last_message_id IS NULL
                    OR (SELECT seq FROM messages WHERE id = last_message_id) < $3)",
            &[&message.id, &message.conversation_id, &message.sequence_number],
        )
        .await?;
        tx.commit().await?;

        Ok(message)
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Message>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"),
                &[&id],
            )
            .await?;
        drop(client);
        self.hydrate_one(row).await
    }

    async fn update_body(&self, id: Uuid, body: String) -> AppResult<Option<Message>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    "UPDATE messages SET body = $2, is_edited = TRUE, updated_at = NOW()
                     WHERE id = $1 AND is_deleted = FALSE
                     RETURNING {MESSAGE_COLUMNS}"
                ),
                &[&id, &body],
            )
            .await?;
        drop(client);
        self.hydrate_one(row).await
    }

    async fn tombstone(&self, id: Uuid) -> AppResult<Option<Message>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    "UPDATE messages
                     SET body = NULL, attachment_url = NULL, attachment_name = NULL,
                         updated_at = CASE WHEN is_deleted THEN updated_at ELSE NOW() END,
                         is_deleted = TRUE
                     WHERE id = $1
                     RETURNING {MESSAGE_COLUMNS}"
                ),
                &[&id],
            )
            .await?;
        drop(client);
        self.hydrate_one(row).await
    }

    async fn add_reaction(&self, id: Uuid, reaction: Reaction) -> AppResult<Option<Message>> {
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO message_reactions (message_id, user_id, emoji)
                 SELECT $1, $2, $3 WHERE EXISTS (SELECT 1 FROM messages WHERE id = $1)
                 ON CONFLICT (message_id, user_id, emoji) DO NOTHING",
                &[&id, &reaction.user_id, &reaction.emoji],
            )
            .await?;
        drop(client);
        self.get(id).await
    }

    async fn advance_status(&self, id: Uuid, to: DeliveryStatus) -> AppResult<Option<Message>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    "UPDATE messages SET status = GREATEST(status, $2)
                     WHERE id = $1
                     RETURNING {MESSAGE_COLUMNS}"
                ),
                &[&id, &to.to_db()],
            )
            .await?;
        drop(client);
        self.hydrate_one(row).await
    }

    async fn mark_read(&self, reader: Uuid, scope: ReadScope) -> AppResult<Vec<Message>> {
        let (filter, other) = match scope {
            ReadScope::Conversation(id) => ("conversation_id = $3", id),
            ReadScope::From(sender) => ("sender_id = $3", sender),
        };

        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    "WITH changed AS (
                        UPDATE messages
                        SET is_read = TRUE, status = GREATEST(status, $2), updated_at = NOW()
                        WHERE receiver_id = $1 AND is_read = FALSE AND {filter}
                        RETURNING {MESSAGE_COLUMNS}
                     )
                     SELECT {MESSAGE_COLUMNS} FROM changed ORDER BY created_at, seq"
                ),
                &[&reader, &DeliveryStatus::Seen.to_db(), &other],
            )
            .await?;
        drop(client);
        self.hydrate(rows).await
    }

    async fn mark_one_read(&self, id: Uuid) -> AppResult<Option<(Message, bool)>> {
        let client = self.pool.get().await?;
        let updated = client
            .query_opt(
                &format!(
                    "UPDATE messages
                     SET is_read = TRUE, status = GREATEST(status, $2), updated_at = NOW()
                     WHERE id = $1 AND (is_read = FALSE OR status < $2)
                     RETURNING {MESSAGE_COLUMNS}"
                ),
                &[&id, &DeliveryStatus::Seen.to_db()],
            )
            .await?;
        drop(client);

        match self.hydrate_one(updated).await? {
            Some(message) => Ok(Some((message, true))),
            None => Ok(self.get(id).await?.map(|m| (m, false))),
        }
    }

    async fn list_by_conversation(&self, conversation_id: Uuid) -> AppResult<Vec<Message>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE conversation_id = $1
                     ORDER BY created_at, seq"
                ),
                &[&conversation_id],
            )
            .await?;
        drop(client);
        self.hydrate(rows).await
    }

    async fn inbox(&self, user: Uuid) -> AppResult<Vec<InboxEntry>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT m.* FROM conversations c
                 JOIN messages m ON m.id = c.last_message_id
                 WHERE c.user_low = $1 OR c.user_high = $1
                 ORDER BY m.created_at DESC, m.seq DESC",
                &[&user],
            )
            .await?;

        rows.iter()
            .map(|row| message_from_row(row, Vec::new()).map(|m| inbox_entry(user, &m)))
            .collect()
    }
}
