//! Requests and views of mentionable content.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dao::models::ContentEntity,
    dto::{format_system_time, mention::MentionLinkView},
    mention::ContentKind,
};

/// Payload creating a news article, comment or forum entry.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateContentRequest {
    /// Existing user writing the content.
    pub author_id: i64,
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    /// Raw text; mention tokens are resolved after the content is saved.
    #[validate(length(min = 1, max = 20000))]
    pub body: String,
    /// Article, thread or match the entry belongs to.
    pub parent_id: Option<i64>,
}

/// Payload editing content; mentions are re-synchronised with the new body.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct UpdateContentRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 20000))]
    pub body: String,
}

/// Content as served to readers, with tokens rendered into links.
#[derive(Debug, Serialize, ToSchema)]
pub struct ContentView {
    pub kind: ContentKind,
    pub id: i64,
    pub author_id: i64,
    pub title: Option<String>,
    /// Raw text as written.
    pub body: String,
    /// HTML-escaped body with resolved tokens turned into anchors.
    pub rendered_body: String,
    pub parent_id: Option<i64>,
    /// Page the content lives on.
    pub url: String,
    /// Links currently stored for the content.
    pub mentions: Vec<MentionLinkView>,
    pub created_at: String,
    pub updated_at: String,
    /// Rows newly stored by the write that produced this view.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mentions_stored: Option<usize>,
}

impl ContentView {
    pub fn new(
        content: &ContentEntity,
        rendered_body: String,
        mentions: Vec<MentionLinkView>,
        base_url: &str,
    ) -> Self {
        Self {
            kind: content.kind,
            id: content.id,
            author_id: content.author_id,
            title: content.title.clone(),
            body: content.body.clone(),
            rendered_body,
            parent_id: content.parent_id,
            url: format!("{base_url}{}", content_path(content.kind, content.id, content.parent_id)),
            mentions,
            created_at: format_system_time(content.created_at),
            updated_at: format_system_time(content.updated_at),
            mentions_stored: None,
        }
    }

    /// Attach the number of rows a create or update stored.
    pub fn with_stored(mut self, stored: usize) -> Self {
        self.mentions_stored = Some(stored);
        self
    }
}

/// Site path of one content entry; replies anchor into their parent's page.
pub fn content_path(kind: ContentKind, id: i64, parent_id: Option<i64>) -> String {
    match (kind, parent_id) {
        (ContentKind::News, _) => format!("/news/{id}"),
        (ContentKind::NewsComment, Some(parent)) => format!("/news/{parent}#comment-{id}"),
        (ContentKind::ForumThread, _) => format!("/forums/threads/{id}"),
        (ContentKind::ForumPost, Some(parent)) => format!("/forums/threads/{parent}#post-{id}"),
        (ContentKind::MatchComment, Some(parent)) => format!("/matches/{parent}#comment-{id}"),
        (ContentKind::NewsComment, None) => format!("/news#comment-{id}"),
        (ContentKind::ForumPost, None) => format!("/forums#post-{id}"),
        (ContentKind::MatchComment, None) => format!("/matches#comment-{id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replies_link_into_their_parent_page() {
        assert_eq!(content_path(ContentKind::News, 3, None), "/news/3");
        assert_eq!(
            content_path(ContentKind::NewsComment, 9, Some(3)),
            "/news/3#comment-9"
        );
        assert_eq!(
            content_path(ContentKind::ForumThread, 4, None),
            "/forums/threads/4"
        );
        assert_eq!(
            content_path(ContentKind::ForumPost, 12, Some(4)),
            "/forums/threads/4#post-12"
        );
        assert_eq!(
            content_path(ContentKind::MatchComment, 2, Some(77)),
            "/matches/77#comment-2"
        );
    }

    #[test]
    fn empty_bodies_are_rejected() {
        let request = UpdateContentRequest {
            title: None,
            body: String::new(),
        };
        assert!(request.validate().is_err());
    }
}
