use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};

use crate::{
    dao::models::{
        ContentEntity, DirectoryEntity, MentionEntity, PlayerEntity, TeamEntity, UserEntity,
        UserStatus,
    },
    mention::{ContentKind, ContentRef, EntityKind, EntityRef},
};

/// Row of the `users`, `teams` or `players` collection.
///
/// The three tables share one flat shape; fields that do not apply to a kind stay unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoDirectoryDocument {
    #[serde(rename = "_id")]
    id: i64,
    kind: EntityKind,
    handle: String,
    name: String,
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    avatar: Option<String>,
    #[serde(default)]
    status: Option<UserStatus>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    team_id: Option<i64>,
    lookup_keys: Vec<String>,
    created_at: DateTime,
}

impl From<DirectoryEntity> for MongoDirectoryDocument {
    fn from(value: DirectoryEntity) -> Self {
        let lookup_keys = value.lookup_keys();
        let created_at = DateTime::from_system_time(value.created_at());
        let kind = value.kind();
        let base = Self {
            id: value.id(),
            kind,
            handle: value.handle().to_owned(),
            name: value.display_name().to_owned(),
            real_name: None,
            avatar: value.avatar().map(str::to_owned),
            status: None,
            region: None,
            role: None,
            team_id: None,
            lookup_keys,
            created_at,
        };

        match value {
            DirectoryEntity::User(user) => Self {
                status: Some(user.status),
                ..base
            },
            DirectoryEntity::Team(team) => Self {
                name: team.name,
                region: team.region,
                ..base
            },
            DirectoryEntity::Player(player) => Self {
                name: player.username,
                real_name: player.real_name,
                role: player.role,
                team_id: player.team_id,
                ..base
            },
        }
    }
}

impl From<MongoDirectoryDocument> for DirectoryEntity {
    fn from(value: MongoDirectoryDocument) -> Self {
        let created_at = value.created_at.to_system_time();
        match value.kind {
            EntityKind::User => DirectoryEntity::User(UserEntity {
                id: value.id,
                name: value.handle,
                avatar: value.avatar,
                status: value.status.unwrap_or_default(),
                created_at,
            }),
            EntityKind::Team => DirectoryEntity::Team(TeamEntity {
                id: value.id,
                name: value.name,
                short_name: value.handle,
                logo: value.avatar,
                region: value.region,
                created_at,
            }),
            EntityKind::Player => DirectoryEntity::Player(PlayerEntity {
                id: value.id,
                username: value.handle,
                real_name: value.real_name,
                avatar: value.avatar,
                role: value.role,
                team_id: value.team_id,
                created_at,
            }),
        }
    }
}

/// Row of the `content` collection; ids are unique across content kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoContentDocument {
    #[serde(rename = "_id")]
    id: i64,
    kind: ContentKind,
    author_id: i64,
    #[serde(default)]
    title: Option<String>,
    body: String,
    #[serde(default)]
    parent_id: Option<i64>,
    created_at: DateTime,
    updated_at: DateTime,
}

impl From<ContentEntity> for MongoContentDocument {
    fn from(value: ContentEntity) -> Self {
        Self {
            id: value.id,
            kind: value.kind,
            author_id: value.author_id,
            title: value.title,
            body: value.body,
            parent_id: value.parent_id,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl From<MongoContentDocument> for ContentEntity {
    fn from(value: MongoContentDocument) -> Self {
        Self {
            kind: value.kind,
            id: value.id,
            author_id: value.author_id,
            title: value.title,
            body: value.body,
            parent_id: value.parent_id,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

/// Row of the `mentions` collection with both references flattened for indexing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMentionDocument {
    #[serde(rename = "_id")]
    id: i64,
    mentionable_kind: ContentKind,
    mentionable_id: i64,
    mentioned_kind: EntityKind,
    mentioned_id: i64,
    author_id: i64,
    mention_text: String,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    is_read: bool,
    mentioned_at: DateTime,
}

impl From<MentionEntity> for MongoMentionDocument {
    fn from(value: MentionEntity) -> Self {
        Self {
            id: value.id,
            mentionable_kind: value.mentionable.kind,
            mentionable_id: value.mentionable.id,
            mentioned_kind: value.mentioned.kind,
            mentioned_id: value.mentioned.id,
            author_id: value.author_id,
            mention_text: value.mention_text,
            context: value.context,
            is_read: value.is_read,
            mentioned_at: DateTime::from_system_time(value.mentioned_at),
        }
    }
}

impl From<MongoMentionDocument> for MentionEntity {
    fn from(value: MongoMentionDocument) -> Self {
        Self {
            id: value.id,
            mentionable: ContentRef::new(value.mentionable_kind, value.mentionable_id),
            mentioned: EntityRef::new(value.mentioned_kind, value.mentioned_id),
            author_id: value.author_id,
            mention_text: value.mention_text,
            context: value.context,
            is_read: value.is_read,
            mentioned_at: value.mentioned_at.to_system_time(),
        }
    }
}

pub fn doc_id(id: i64) -> Document {
    doc! {"_id": id}
}

pub fn content_filter(owner: ContentRef) -> Document {
    doc! {"_id": owner.id, "kind": owner.kind.as_str()}
}

pub fn owner_filter(owner: ContentRef) -> Document {
    doc! {
        "mentionable_kind": owner.kind.as_str(),
        "mentionable_id": owner.id,
    }
}

pub fn target_filter(target: EntityRef) -> Document {
    doc! {
        "mentioned_kind": target.kind.as_str(),
        "mentioned_id": target.id,
    }
}

/// Filter matching the `(mentionable, mentioned)` tuple of `mention`.
pub fn tuple_filter(mention: &MentionEntity) -> Document {
    let mut filter = owner_filter(mention.mentionable);
    filter.extend(target_filter(mention.mentioned));
    filter
}
