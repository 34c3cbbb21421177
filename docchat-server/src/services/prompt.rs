//! Prompt construction for document question answering.

use serde_json::{Map, Value, json};
use shared::models::{Document, KnowledgeBase, RequestType};

use super::completion_client::PromptMessage;

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant. Use the provided document(s) to answer \
as accurately as possible. If the answer is not contained in the documents, \
say you don't know. When documents have page numbers, you can reference \
specific pages and their filenames in your answer.";

pub const SUGGESTIONS_PROMPT: &str = "You are a helpful assistant that generates relevant questions about the provided documents. \
Based on the content and context of the documents, generate 3-5 thoughtful questions that \
users might want to ask. Focus on the key topics, insights, and information contained in the documents. \
Return the questions as a unordered markdown list and prefix each question with **SUGGESTION:**. \
Example response: \
```markdown\n\
The following questions may be helpful:\
- **SUGGESTION:**What are the main features of this product?\n\
- **SUGGESTION:**How does the pricing structure work?\n\
- **SUGGESTION:**What are the system requirements?";

const DOCUMENTS_INTRO: &str = "Here are the relevant documents with each document separated by three dashes, \
and each page numbered with 'Page <num>: <content>':";

/// Appends document text to `message`. Returns `message` unchanged when there are no documents.
pub fn augment_with_documents(message: &str, documents: &[Document]) -> String {
    if documents.is_empty() {
        return message.to_string();
    }

    let sections: Vec<String> = documents
        .iter()
        .map(|document| {
            let pages = document
                .pages
                .iter()
                .map(|(number, text)| format!("Page {number}:\n{text}"))
                .collect::<Vec<_>>()
                .join("\n");
            format!("File: {}\ncontents:\n{pages}\n---\n\n", document.filename)
        })
        .collect();

    format!(
        "{message}\n\n{DOCUMENTS_INTRO}\n\n{}",
        sections.join("\n---\n")
    )
}

/// System and user turns for a plain model completion.
pub fn model_messages(
    request_type: RequestType,
    message: &str,
    documents: &[Document],
) -> Vec<PromptMessage> {
    let system = match request_type {
        RequestType::Message => SYSTEM_PROMPT,
        RequestType::Suggestion => SUGGESTIONS_PROMPT,
    };

    vec![
        PromptMessage::system(system),
        PromptMessage::user(augment_with_documents(message, documents)),
    ]
}

/// Single user turn for the retrieval agent. The content is a JSON document
/// carrying the topic, the question and, when given, the knowledge base.
pub fn agent_messages(
    request_type: RequestType,
    message: &str,
    files: &[Document],
    knowledge_base: Option<(&KnowledgeBase, &[Document])>,
) -> Vec<PromptMessage> {
    let question = match request_type {
        RequestType::Message => message,
        RequestType::Suggestion => SUGGESTIONS_PROMPT,
    };

    let mut content = Map::new();
    content.insert("topic".into(), Value::from("documentation"));
    content.insert(
        "question".into(),
        Value::from(augment_with_documents(question, files)),
    );

    if let Some((knowledge_base, documents)) = knowledge_base {
        content.insert(
            "knowledge_base".into(),
            knowledge_base_schema(knowledge_base, documents),
        );
        content.insert(
            "topic".into(),
            Value::from(knowledge_base.description.clone()),
        );
    }

    vec![PromptMessage::user(Value::Object(content).to_string())]
}

fn knowledge_base_schema(knowledge_base: &KnowledgeBase, documents: &[Document]) -> Value {
    let files: Vec<Value> = documents
        .iter()
        .map(|document| {
            json!({
                "uuid": document.uuid,
                "filename": document.filename,
                "pages": document.pages,
            })
        })
        .collect();

    json!({
        "uuid": knowledge_base.uuid,
        "title": knowledge_base.title,
        "description": knowledge_base.description,
        "token_count": knowledge_base.token_count,
        "is_public": knowledge_base.is_public,
        "files": files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{DocumentCreate, KnowledgeBaseCreate, Role};
    use uuid::Uuid;

    fn document(filename: &str, pages: &[&str]) -> Document {
        Document::from_create(
            Uuid::new_v4(),
            DocumentCreate {
                filename: filename.into(),
                pages: pages.iter().map(|page| (*page).to_string()).collect(),
                ..DocumentCreate::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn augmentation_lists_files_and_pages() {
        let augmented = augment_with_documents(
            "What is covered?",
            &[document("a.pdf", &["intro", "body"]), document("b.txt", &["notes"])],
        );

        assert!(augmented.starts_with("What is covered?\n\nHere are the relevant documents"));
        assert!(augmented.contains("File: a.pdf\ncontents:\nPage 1:\nintro\nPage 2:\nbody\n---\n\n"));
        assert!(augmented.contains("\n---\nFile: b.txt\ncontents:\nPage 1:\nnotes"));
    }

    #[test]
    fn augmentation_without_documents_is_identity() {
        assert_eq!(augment_with_documents("plain", &[]), "plain");
    }

    #[test]
    fn suggestion_requests_swap_system_prompt() {
        let messages = model_messages(RequestType::Suggestion, "", &[]);

        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, SUGGESTIONS_PROMPT);
        assert_eq!(messages[1].role, Role::User);
    }

    #[test]
    fn agent_content_uses_knowledge_base_description_as_topic() {
        let owner = Uuid::new_v4();
        let knowledge_base = KnowledgeBase::from_create(
            owner,
            KnowledgeBaseCreate {
                title: "Handbook".into(),
                description: "HR policies".into(),
                is_public: false,
                token_count: 10,
            },
        );
        let kb_documents = vec![document("policy.pdf", &["leave policy"])];

        let messages = agent_messages(
            RequestType::Message,
            "How many vacation days?",
            &[],
            Some((&knowledge_base, &kb_documents)),
        );

        assert_eq!(messages.len(), 1);
        let content: Value = serde_json::from_str(&messages[0].content).unwrap();
        assert_eq!(content["topic"], "HR policies");
        assert_eq!(content["question"], "How many vacation days?");
        assert_eq!(content["knowledge_base"]["files"][0]["pages"]["1"], "leave policy");
    }

    #[test]
    fn agent_content_defaults_to_documentation_topic() {
        let messages = agent_messages(RequestType::Suggestion, "ignored", &[], None);
        let content: Value = serde_json::from_str(&messages[0].content).unwrap();

        assert_eq!(content["topic"], "documentation");
        assert_eq!(content["question"], SUGGESTIONS_PROMPT);
        assert!(content.get("knowledge_base").is_none());
    }
}
