//! Content rows served by the public site.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Draft,
    Published,
}

impl ContentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentStatus::Draft => "draft",
            ContentStatus::Published => "published",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentRecord {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    /// Pre-rendered, trusted HTML produced by the editor.
    pub body_html: String,
    pub excerpt: String,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub featured_media_id: Option<Uuid>,
    pub status: ContentStatus,
    pub published_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl ContentRecord {
    pub fn is_published(&self) -> bool {
        self.status == ContentStatus::Published
    }
}
