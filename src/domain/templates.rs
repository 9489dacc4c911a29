//! Stored template definitions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::error::DomainError;

/// Role a template plays when a page is assembled.
///
/// At most one template per type is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateType {
    Header,
    Footer,
    Page,
    ArticleLoop,
}

impl TemplateType {
    pub const ALL: [TemplateType; 4] = [
        TemplateType::Header,
        TemplateType::Footer,
        TemplateType::Page,
        TemplateType::ArticleLoop,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TemplateType::Header => "header",
            TemplateType::Footer => "footer",
            TemplateType::Page => "page",
            TemplateType::ArticleLoop => "article_loop",
        }
    }

    /// Header and footer output is embedded into other templates rather
    /// than served on its own.
    pub fn is_fragment(self) -> bool {
        matches!(self, TemplateType::Header | TemplateType::Footer)
    }
}

impl fmt::Display for TemplateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemplateType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "header" => Ok(TemplateType::Header),
            "footer" => Ok(TemplateType::Footer),
            "page" => Ok(TemplateType::Page),
            "article_loop" | "article-loop" => Ok(TemplateType::ArticleLoop),
            other => Err(DomainError::validation(format!(
                "unknown template type `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateRecord {
    pub id: Uuid,
    pub name: String,
    pub template_type: TemplateType,
    pub html_source: String,
    /// Bumped on every source update.
    pub version: i64,
    pub is_active: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// The slice of a template row the engine needs to compile it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSource {
    pub id: Uuid,
    pub html_source: String,
    pub version: i64,
}

impl From<&TemplateRecord> for TemplateSource {
    fn from(record: &TemplateRecord) -> Self {
        Self {
            id: record.id,
            html_source: record.html_source.clone(),
            version: record.version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_type_round_trips_through_str() {
        for kind in TemplateType::ALL {
            assert_eq!(kind.as_str().parse::<TemplateType>().expect("parse"), kind);
        }
    }

    #[test]
    fn template_type_accepts_hyphenated_loop() {
        assert_eq!(
            "article-loop".parse::<TemplateType>().expect("parse"),
            TemplateType::ArticleLoop
        );
        assert!("sidebar".parse::<TemplateType>().is_err());
    }

    #[test]
    fn only_header_and_footer_are_fragments() {
        assert!(TemplateType::Header.is_fragment());
        assert!(TemplateType::Footer.is_fragment());
        assert!(!TemplateType::Page.is_fragment());
        assert!(!TemplateType::ArticleLoop.is_fragment());
    }
}
