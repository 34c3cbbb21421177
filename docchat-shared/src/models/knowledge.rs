use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::Timestamp;

pub const MAX_TITLE_LEN: usize = 255;
pub const MAX_DESCRIPTION_LEN: usize = 1000;

/// A named collection of documents. Visible to its owner, or to everyone when public.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KnowledgeBase {
    pub uuid: Uuid,
    pub title: String,
    pub description: String,
    pub owner_uuid: Uuid,
    pub is_public: bool,
    pub token_count: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl KnowledgeBase {
    #[must_use]
    pub fn from_create(owner_uuid: Uuid, create: KnowledgeBaseCreate) -> Self {
        let now = Timestamp::now();
        Self {
            uuid: Uuid::new_v4(),
            title: create.title,
            description: create.description,
            owner_uuid,
            is_public: create.is_public,
            token_count: create.token_count,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn is_visible_to(&self, user_uuid: Uuid) -> bool {
        self.is_public || self.owner_uuid == user_uuid
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KnowledgeBaseCreate {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub token_count: i64,
}

impl KnowledgeBaseCreate {
    /// Checks field bounds.
    ///
    /// # Errors
    /// Returns a human readable message for the first violated bound.
    pub fn validate(&self) -> Result<(), String> {
        check_length("title", &self.title, MAX_TITLE_LEN)?;
        check_length("description", &self.description, MAX_DESCRIPTION_LEN)?;
        if self.token_count < 0 {
            return Err("token_count must not be negative".into());
        }
        Ok(())
    }
}

fn check_length(field: &str, value: &str, max: usize) -> Result<(), String> {
    let len = value.trim().chars().count();
    if len == 0 {
        return Err(format!("{field} must not be empty"));
    }
    if len > max {
        return Err(format!("{field} must be at most {max} characters"));
    }
    Ok(())
}

/// An uploaded file with its extracted text, keyed by page number.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    pub uuid: Uuid,
    pub owner_uuid: Uuid,
    pub filename: String,
    #[serde(default)]
    pub knowledge_base_id: Option<Uuid>,
    pub pages: BTreeMap<u32, String>,
    pub created_at: Timestamp,
}

impl Document {
    /// Builds a document from a create request.
    ///
    /// # Errors
    /// Returns a message when the filename is blank or no text was supplied.
    pub fn from_create(owner_uuid: Uuid, create: DocumentCreate) -> Result<Self, String> {
        if create.filename.trim().is_empty() {
            return Err("filename must not be empty".into());
        }

        let mut pages: Vec<String> = create.pages;
        if pages.is_empty() {
            if let Some(content) = create.content {
                pages.push(content);
            }
        }
        if pages.iter().all(|page| page.trim().is_empty()) {
            return Err("document must contain text".into());
        }

        let pages = (1..).zip(pages).collect();
        Ok(Self {
            uuid: Uuid::new_v4(),
            owner_uuid,
            filename: create.filename,
            knowledge_base_id: create.knowledge_base_id,
            pages,
            created_at: Timestamp::now(),
        })
    }
}

/// Body of `POST /files`. Either `pages` (in order) or a single `content` blob.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentCreate {
    pub filename: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub pages: Vec<String>,
    #[serde(default)]
    pub knowledge_base_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn knowledge_base_create_enforces_bounds() {
        let mut create = KnowledgeBaseCreate {
            title: "Handbook".into(),
            description: "Employee handbook".into(),
            is_public: false,
            token_count: 0,
        };
        assert!(create.validate().is_ok());

        create.title = "   ".into();
        assert!(create.validate().unwrap_err().contains("title"));

        create.title = "x".repeat(MAX_TITLE_LEN + 1);
        assert!(create.validate().unwrap_err().contains("at most"));
    }

    #[test]
    fn visibility_follows_owner_or_public_flag() {
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let mut kb = KnowledgeBase::from_create(
            owner,
            KnowledgeBaseCreate {
                title: "t".into(),
                description: "d".into(),
                is_public: false,
                token_count: 0,
            },
        );

        assert!(kb.is_visible_to(owner));
        assert!(!kb.is_visible_to(stranger));

        kb.is_public = true;
        assert!(kb.is_visible_to(stranger));
    }

    #[test]
    fn document_numbers_pages_from_one() {
        let document = Document::from_create(
            Uuid::new_v4(),
            DocumentCreate {
                filename: "report.pdf".into(),
                pages: vec!["intro".into(), "body".into()],
                ..DocumentCreate::default()
            },
        )
        .unwrap();

        assert_eq!(document.pages.get(&1).map(String::as_str), Some("intro"));
        assert_eq!(document.pages.get(&2).map(String::as_str), Some("body"));
    }

    #[test]
    fn document_falls_back_to_single_content_page() {
        let document = Document::from_create(
            Uuid::new_v4(),
            DocumentCreate {
                filename: "notes.txt".into(),
                content: Some("all of it".into()),
                ..DocumentCreate::default()
            },
        )
        .unwrap();

        assert_eq!(document.pages.len(), 1);
        assert!(
            Document::from_create(
                Uuid::new_v4(),
                DocumentCreate {
                    filename: "empty.txt".into(),
                    ..DocumentCreate::default()
                }
            )
            .is_err()
        );
    }
}
