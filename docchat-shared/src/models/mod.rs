pub mod chat;
pub mod completion;
pub mod knowledge;
pub mod message;
pub mod streaming;
pub mod timestamp;

pub use chat::{Chat, ChatCreate, ChatRenameRequest, ChatSummary, DEFAULT_CHAT_NAME};
pub use completion::{CompletionRequest, LlmCatalog, LlmCatalogEntry, RequestType};
pub use knowledge::{Document, DocumentCreate, KnowledgeBase, KnowledgeBaseCreate};
pub use message::{Message, MessageCreate, MessageUpdate, Role};
pub use streaming::StreamEvent;
pub use timestamp::Timestamp;
