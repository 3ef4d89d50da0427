use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    dao::models::{ContentEntity, DirectoryEntity, MentionEntity},
    mention::{ContentRef, EntityKind, EntityRef},
};

pub const CONTENT_PREFIX: &str = "content::";
pub const MENTION_PREFIX: &str = "mention::";
pub const COUNTER_PREFIX: &str = "counter::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    #[serde(default)]
    pub doc: Option<Value>,
}

/// Body of a Mango `_find` answer.
#[derive(Debug, Deserialize)]
pub struct FindResponse {
    pub docs: Vec<Value>,
    #[serde(default)]
    pub bookmark: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchDirectoryDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub lookup_keys: Vec<String>,
    pub entity: DirectoryEntity,
}

impl From<(DirectoryEntity, Option<String>)> for CouchDirectoryDocument {
    fn from((entity, rev): (DirectoryEntity, Option<String>)) -> Self {
        Self {
            id: directory_doc_id(entity.target()),
            rev,
            lookup_keys: entity.lookup_keys(),
            entity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchContentDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub content: ContentEntity,
}

impl From<(ContentEntity, Option<String>)> for CouchContentDocument {
    fn from((content, rev): (ContentEntity, Option<String>)) -> Self {
        Self {
            id: content_doc_id(content.id),
            rev,
            content,
        }
    }
}

/// Mention row keyed by its `(mentionable, mentioned)` tuple so a second insert conflicts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchMentionDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub mention: MentionEntity,
}

impl From<(MentionEntity, Option<String>)> for CouchMentionDocument {
    fn from((mention, rev): (MentionEntity, Option<String>)) -> Self {
        Self {
            id: mention_doc_id(mention.mentionable, mention.mentioned),
            rev,
            mention,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchCounterDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub seq: i64,
}

pub fn directory_prefix(kind: EntityKind) -> String {
    format!("{}::", kind.as_str())
}

pub fn directory_doc_id(target: EntityRef) -> String {
    format!("{}{}", directory_prefix(target.kind), target.id)
}

pub fn content_doc_id(id: i64) -> String {
    format!("{CONTENT_PREFIX}{id}")
}

/// Prefix shared by every mention owned by `owner`.
pub fn owner_prefix(owner: ContentRef) -> String {
    format!("{MENTION_PREFIX}{}:{}:", owner.kind, owner.id)
}

pub fn mention_doc_id(owner: ContentRef, target: EntityRef) -> String {
    format!("{}{}:{}", owner_prefix(owner), target.kind, target.id)
}

pub fn counter_doc_id(name: &str) -> String {
    format!("{COUNTER_PREFIX}{name}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mention::ContentKind;

    #[test]
    fn mention_ids_share_their_owner_prefix() {
        let owner = ContentRef::new(ContentKind::NewsComment, 12);
        let id = mention_doc_id(owner, EntityRef::new(EntityKind::Team, 3));
        assert_eq!(id, "mention::news_comment:12:team:3");
        assert!(id.starts_with(&owner_prefix(owner)));
        assert!(!id.starts_with(&owner_prefix(ContentRef::new(ContentKind::NewsComment, 1))));
    }
}
