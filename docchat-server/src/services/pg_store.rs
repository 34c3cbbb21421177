//! Postgres-backed repositories.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::models::{
    Chat, ChatCreate, Document, KnowledgeBase, KnowledgeBaseCreate, Message, MessageCreate,
    MessageUpdate, Role,
};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use super::repository::{
    ChatRepository, DocumentRepository, MessageRepository, RepositoryError, RepositoryResult,
};

const MESSAGE_COLUMNS: &str = "uuid, chat_id, role, model, content, components, error, in_progress, created_at, updated_at";
const DOCUMENT_COLUMNS: &str = "uuid, owner_uuid, filename, knowledge_base_id, pages, created_at";
const KNOWLEDGE_BASE_COLUMNS: &str =
    "uuid, title, description, owner_uuid, is_public, token_count, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ChatRow {
    uuid: Uuid,
    name: String,
    user_uuid: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ChatRow> for Chat {
    fn from(row: ChatRow) -> Self {
        Self {
            uuid: row.uuid,
            name: row.name,
            user_uuid: row.user_uuid,
            created_at: row.created_at.into(),
            updated_at: row.updated_at.into(),
        }
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    uuid: Uuid,
    chat_id: Uuid,
    role: String,
    model: String,
    content: String,
    components: String,
    error: Option<String>,
    in_progress: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = RepositoryError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let role = Role::try_from(row.role.as_str())
            .map_err(|err| RepositoryError::Corrupt(format!("message {}: {err}", row.uuid)))?;
        Ok(Self {
            uuid: row.uuid,
            chat_id: row.chat_id,
            role,
            model: row.model,
            content: row.content,
            components: row.components,
            error: row.error,
            in_progress: row.in_progress,
            created_at: row.created_at.into(),
            updated_at: row.updated_at.into(),
        })
    }
}

#[derive(sqlx::FromRow)]
struct KnowledgeBaseRow {
    uuid: Uuid,
    title: String,
    description: String,
    owner_uuid: Uuid,
    is_public: bool,
    token_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<KnowledgeBaseRow> for KnowledgeBase {
    fn from(row: KnowledgeBaseRow) -> Self {
        Self {
            uuid: row.uuid,
            title: row.title,
            description: row.description,
            owner_uuid: row.owner_uuid,
            is_public: row.is_public,
            token_count: row.token_count,
            created_at: row.created_at.into(),
            updated_at: row.updated_at.into(),
        }
    }
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    uuid: Uuid,
    owner_uuid: Uuid,
    filename: String,
    knowledge_base_id: Option<Uuid>,
    pages: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<DocumentRow> for Document {
    type Error = RepositoryError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        let pages: BTreeMap<u32, String> = serde_json::from_str(&row.pages)
            .map_err(|err| RepositoryError::Corrupt(format!("document {}: {err}", row.uuid)))?;
        Ok(Self {
            uuid: row.uuid,
            owner_uuid: row.owner_uuid,
            filename: row.filename,
            knowledge_base_id: row.knowledge_base_id,
            pages,
            created_at: row.created_at.into(),
        })
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> RepositoryResult<Vec<T>>
where
    T: TryFrom<R, Error = RepositoryError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatRepository for PgStore {
    #[instrument(name = "pg.create_chat", skip(self, create), err)]
    async fn create_chat(&self, create: ChatCreate) -> RepositoryResult<Chat> {
        let chat = Chat::from_create(create);
        sqlx::query(
            "INSERT INTO chats (uuid, name, user_uuid, created_at, updated_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(chat.uuid)
        .bind(&chat.name)
        .bind(chat.user_uuid)
        .bind(chat.created_at.0)
        .bind(chat.updated_at.0)
        .execute(&self.pool)
        .await?;
        Ok(chat)
    }

    async fn get_chat(&self, chat_id: Uuid) -> RepositoryResult<Option<Chat>> {
        let row = sqlx::query_as::<_, ChatRow>(
            "SELECT uuid, name, user_uuid, created_at, updated_at FROM chats WHERE uuid = $1",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Chat::from))
    }

    async fn list_chats(&self, user_uuid: Uuid) -> RepositoryResult<Vec<Chat>> {
        let rows = sqlx::query_as::<_, ChatRow>(
            "SELECT uuid, name, user_uuid, created_at, updated_at FROM chats WHERE user_uuid = $1 ORDER BY created_at DESC",
        )
        .bind(user_uuid)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Chat::from).collect())
    }

    async fn rename_chat(&self, chat_id: Uuid, name: &str) -> RepositoryResult<Option<Chat>> {
        let row = sqlx::query_as::<_, ChatRow>(
            "UPDATE chats SET name = $2, updated_at = NOW() WHERE uuid = $1 RETURNING uuid, name, user_uuid, created_at, updated_at",
        )
        .bind(chat_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Chat::from))
    }

    #[instrument(name = "pg.delete_chat", skip(self), err)]
    async fn delete_chat(&self, chat_id: Uuid) -> RepositoryResult<Option<Chat>> {
        let row = sqlx::query_as::<_, ChatRow>(
            "DELETE FROM chats WHERE uuid = $1 RETURNING uuid, name, user_uuid, created_at, updated_at",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Chat::from))
    }
}

#[async_trait]
impl MessageRepository for PgStore {
    #[instrument(name = "pg.create_message", skip(self, create), err)]
    async fn create_message(&self, create: MessageCreate) -> RepositoryResult<Message> {
        let message = Message::from_create(create);
        sqlx::query(
            "INSERT INTO messages (uuid, chat_id, role, model, content, components, error, in_progress, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(message.uuid)
        .bind(message.chat_id)
        .bind(message.role.as_str())
        .bind(&message.model)
        .bind(&message.content)
        .bind(&message.components)
        .bind(message.error.as_deref())
        .bind(message.in_progress)
        .bind(message.created_at.0)
        .bind(message.updated_at.0)
        .execute(&self.pool)
        .await?;
        Ok(message)
    }

    #[instrument(name = "pg.update_message", skip(self, update), err)]
    async fn update_message(
        &self,
        message_id: Uuid,
        update: MessageUpdate,
    ) -> RepositoryResult<Option<Message>> {
        let query = format!(
            "UPDATE messages SET \
             content = COALESCE($2, content), \
             components = COALESCE($3, components), \
             error = COALESCE($4, error), \
             in_progress = COALESCE($5, in_progress), \
             updated_at = NOW() \
             WHERE uuid = $1 RETURNING {MESSAGE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, MessageRow>(&query)
            .bind(message_id)
            .bind(update.content)
            .bind(update.components)
            .bind(update.error)
            .bind(update.in_progress)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Message::try_from).transpose()
    }

    async fn get_message(&self, message_id: Uuid) -> RepositoryResult<Option<Message>> {
        let query = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE uuid = $1");
        let row = sqlx::query_as::<_, MessageRow>(&query)
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Message::try_from).transpose()
    }

    async fn chat_messages(&self, chat_id: Uuid) -> RepositoryResult<Vec<Message>> {
        let query = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE chat_id = $1 ORDER BY created_at, seq"
        );
        let rows = sqlx::query_as::<_, MessageRow>(&query)
            .bind(chat_id)
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn last_messages(&self, chat_ids: &[Uuid]) -> RepositoryResult<HashMap<Uuid, Message>> {
        if chat_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let query = format!(
            "SELECT DISTINCT ON (chat_id) {MESSAGE_COLUMNS} FROM messages \
             WHERE chat_id = ANY($1) ORDER BY chat_id, created_at DESC, seq DESC"
        );
        let rows = sqlx::query_as::<_, MessageRow>(&query)
            .bind(chat_ids.to_vec())
            .fetch_all(&self.pool)
            .await?;

        let messages: Vec<Message> = convert_all(rows)?;
        Ok(messages
            .into_iter()
            .map(|message| (message.chat_id, message))
            .collect())
    }
}

#[async_trait]
impl DocumentRepository for PgStore {
    async fn create_knowledge_base(
        &self,
        owner_uuid: Uuid,
        create: KnowledgeBaseCreate,
    ) -> RepositoryResult<KnowledgeBase> {
        let knowledge_base = KnowledgeBase::from_create(owner_uuid, create);
        sqlx::query(
            "INSERT INTO knowledge_bases (uuid, title, description, owner_uuid, is_public, token_count, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(knowledge_base.uuid)
        .bind(&knowledge_base.title)
        .bind(&knowledge_base.description)
        .bind(knowledge_base.owner_uuid)
        .bind(knowledge_base.is_public)
        .bind(knowledge_base.token_count)
        .bind(knowledge_base.created_at.0)
        .bind(knowledge_base.updated_at.0)
        .execute(&self.pool)
        .await?;
        Ok(knowledge_base)
    }

    async fn get_knowledge_base(&self, kb_id: Uuid) -> RepositoryResult<Option<KnowledgeBase>> {
        let query = format!("SELECT {KNOWLEDGE_BASE_COLUMNS} FROM knowledge_bases WHERE uuid = $1");
        let row = sqlx::query_as::<_, KnowledgeBaseRow>(&query)
            .bind(kb_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(KnowledgeBase::from))
    }

    async fn visible_knowledge_bases(
        &self,
        user_uuid: Uuid,
    ) -> RepositoryResult<Vec<KnowledgeBase>> {
        let query = format!(
            "SELECT {KNOWLEDGE_BASE_COLUMNS} FROM knowledge_bases \
             WHERE owner_uuid = $1 OR is_public ORDER BY created_at"
        );
        let rows = sqlx::query_as::<_, KnowledgeBaseRow>(&query)
            .bind(user_uuid)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(KnowledgeBase::from).collect())
    }

    #[instrument(name = "pg.create_document", skip(self, document), fields(document_id = %document.uuid), err)]
    async fn create_document(&self, document: Document) -> RepositoryResult<Document> {
        let pages = serde_json::to_string(&document.pages)
            .map_err(|err| RepositoryError::Corrupt(err.to_string()))?;
        sqlx::query(
            "INSERT INTO documents (uuid, owner_uuid, filename, knowledge_base_id, pages, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(document.uuid)
        .bind(document.owner_uuid)
        .bind(&document.filename)
        .bind(document.knowledge_base_id)
        .bind(pages)
        .bind(document.created_at.0)
        .execute(&self.pool)
        .await?;
        Ok(document)
    }

    async fn list_documents(&self, owner_uuid: Uuid) -> RepositoryResult<Vec<Document>> {
        let query = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE owner_uuid = $1 ORDER BY created_at"
        );
        let rows = sqlx::query_as::<_, DocumentRow>(&query)
            .bind(owner_uuid)
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn documents_by_ids(
        &self,
        owner_uuid: Uuid,
        ids: &[Uuid],
    ) -> RepositoryResult<Vec<Document>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let query = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents \
             WHERE owner_uuid = $1 AND uuid = ANY($2) ORDER BY created_at"
        );
        let rows = sqlx::query_as::<_, DocumentRow>(&query)
            .bind(owner_uuid)
            .bind(ids.to_vec())
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn knowledge_base_documents(&self, kb_id: Uuid) -> RepositoryResult<Vec<Document>> {
        let query = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE knowledge_base_id = $1 ORDER BY created_at"
        );
        let rows = sqlx::query_as::<_, DocumentRow>(&query)
            .bind(kb_id)
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_row(role: &str) -> MessageRow {
        let now = Utc::now();
        MessageRow {
            uuid: Uuid::new_v4(),
            chat_id: Uuid::new_v4(),
            role: role.to_string(),
            model: "gpt".into(),
            content: "hello".into(),
            components: String::new(),
            error: None,
            in_progress: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn message_row_converts_known_roles() {
        let message = Message::try_from(message_row("assistant")).unwrap();
        assert_eq!(message.role, Role::Assistant);
    }

    #[test]
    fn message_row_rejects_unknown_role() {
        let err = Message::try_from(message_row("robot")).unwrap_err();
        assert!(matches!(err, RepositoryError::Corrupt(_)));
    }

    #[test]
    fn document_pages_round_trip_through_text_column() {
        let row = DocumentRow {
            uuid: Uuid::new_v4(),
            owner_uuid: Uuid::new_v4(),
            filename: "a.pdf".into(),
            knowledge_base_id: None,
            pages: r#"{"1":"first","2":"second"}"#.into(),
            created_at: Utc::now(),
        };

        let document = Document::try_from(row).unwrap();
        assert_eq!(document.pages.get(&2).map(String::as_str), Some("second"));
    }
}
