use serde::{Deserialize, Serialize};
use std::{collections::HashMap, time::SystemTime};
use utoipa::ToSchema;

use crate::mention::{ContentKind, ContentRef, EntityKind, EntityRef};

/// Account state of a user; only active users can be mentioned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    /// Regular account.
    #[default]
    Active,
    /// Dormant or self-deactivated account.
    Inactive,
    /// Account suspended by moderation.
    Banned,
}

/// Registered platform user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserEntity {
    /// Primary key.
    pub id: i64,
    /// Unique handle, mentioned as `@name`.
    pub name: String,
    /// Avatar URL.
    pub avatar: Option<String>,
    /// Account state.
    pub status: UserStatus,
    /// Registration timestamp.
    pub created_at: SystemTime,
}

/// Esports organisation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamEntity {
    /// Primary key.
    pub id: i64,
    /// Full team name (e.g. "Team SoloMid").
    pub name: String,
    /// Short tag used in `@team:` tokens (e.g. "tsm").
    pub short_name: String,
    /// Logo URL.
    pub logo: Option<String>,
    /// Competitive region.
    pub region: Option<String>,
    /// Creation timestamp.
    pub created_at: SystemTime,
}

/// Professional player.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEntity {
    /// Primary key.
    pub id: i64,
    /// In-game name used in `@player:` tokens.
    pub username: String,
    /// Legal name, also accepted in tokens when it is a single word.
    pub real_name: Option<String>,
    /// Avatar URL.
    pub avatar: Option<String>,
    /// Role in the roster (e.g. "duelist").
    pub role: Option<String>,
    /// Current team, if any.
    pub team_id: Option<i64>,
    /// Creation timestamp.
    pub created_at: SystemTime,
}

/// Any row of the users/teams/players tables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DirectoryEntity {
    /// Row of the users table.
    User(UserEntity),
    /// Row of the teams table.
    Team(TeamEntity),
    /// Row of the players table.
    Player(PlayerEntity),
}

impl DirectoryEntity {
    /// Kind of the table the row lives in.
    pub fn kind(&self) -> EntityKind {
        match self {
            DirectoryEntity::User(_) => EntityKind::User,
            DirectoryEntity::Team(_) => EntityKind::Team,
            DirectoryEntity::Player(_) => EntityKind::Player,
        }
    }

    /// Primary key inside the table.
    pub fn id(&self) -> i64 {
        match self {
            DirectoryEntity::User(user) => user.id,
            DirectoryEntity::Team(team) => team.id,
            DirectoryEntity::Player(player) => player.id,
        }
    }

    /// Polymorphic reference to this row.
    pub fn target(&self) -> EntityRef {
        EntityRef::new(self.kind(), self.id())
    }

    /// Canonical handle written after the token prefix.
    pub fn handle(&self) -> &str {
        match self {
            DirectoryEntity::User(user) => &user.name,
            DirectoryEntity::Team(team) => &team.short_name,
            DirectoryEntity::Player(player) => &player.username,
        }
    }

    /// Name shown to readers.
    pub fn display_name(&self) -> &str {
        match self {
            DirectoryEntity::User(user) => &user.name,
            DirectoryEntity::Team(team) => &team.name,
            DirectoryEntity::Player(player) => {
                player.real_name.as_deref().unwrap_or(&player.username)
            }
        }
    }

    /// Avatar or logo URL.
    pub fn avatar(&self) -> Option<&str> {
        match self {
            DirectoryEntity::User(user) => user.avatar.as_deref(),
            DirectoryEntity::Team(team) => team.logo.as_deref(),
            DirectoryEntity::Player(player) => player.avatar.as_deref(),
        }
    }

    /// Creation timestamp.
    pub fn created_at(&self) -> SystemTime {
        match self {
            DirectoryEntity::User(user) => user.created_at,
            DirectoryEntity::Team(team) => team.created_at,
            DirectoryEntity::Player(player) => player.created_at,
        }
    }

    /// Lowercased names a token identifier may match.
    pub fn lookup_keys(&self) -> Vec<String> {
        let mut keys = match self {
            DirectoryEntity::User(user) => vec![user.name.to_ascii_lowercase()],
            DirectoryEntity::Team(team) => vec![
                team.short_name.to_ascii_lowercase(),
                team.name.to_ascii_lowercase(),
            ],
            DirectoryEntity::Player(player) => {
                let mut keys = vec![player.username.to_ascii_lowercase()];
                if let Some(real_name) = &player.real_name {
                    keys.push(real_name.to_ascii_lowercase());
                }
                keys
            }
        };
        keys.dedup();
        keys
    }

    /// Whether tokens may resolve to this row.
    pub fn is_mentionable(&self) -> bool {
        match self {
            DirectoryEntity::User(user) => user.status == UserStatus::Active,
            DirectoryEntity::Team(_) | DirectoryEntity::Player(_) => true,
        }
    }
}

/// News article, comment or forum entry that can contain mention tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentEntity {
    /// Kind of content.
    pub kind: ContentKind,
    /// Primary key (shared sequence across kinds).
    pub id: i64,
    /// User who wrote the content.
    pub author_id: i64,
    /// Headline for articles and threads.
    pub title: Option<String>,
    /// Raw text, tokens included.
    pub body: String,
    /// Article, thread or match this entry belongs to.
    pub parent_id: Option<i64>,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Last edit timestamp.
    pub updated_at: SystemTime,
}

impl ContentEntity {
    /// Polymorphic reference to this content.
    pub fn reference(&self) -> ContentRef {
        ContentRef::new(self.kind, self.id)
    }
}

/// One resolved reference from a piece of content to a directory entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MentionEntity {
    /// Primary key.
    pub id: i64,
    /// Content containing the token.
    pub mentionable: ContentRef,
    /// Entity the token resolved to.
    pub mentioned: EntityRef,
    /// Author of the owning content.
    pub author_id: i64,
    /// Token as written when the row was stored.
    pub mention_text: String,
    /// Text surrounding the first occurrence of the token.
    pub context: Option<String>,
    /// Whether the mentioned party has seen the mention.
    pub is_read: bool,
    /// Time the row was stored.
    pub mentioned_at: SystemTime,
}

/// Result of inserting a mention keyed by `(mentionable, mentioned)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No row existed for the tuple; the provided row was stored.
    Inserted(MentionEntity),
    /// A row already existed and was left untouched.
    Existing(MentionEntity),
    /// The owning content is gone; nothing was stored.
    OwnerMissing,
}

impl UpsertOutcome {
    /// Row now stored for the tuple, if any.
    pub fn mention(&self) -> Option<&MentionEntity> {
        match self {
            UpsertOutcome::Inserted(mention) | UpsertOutcome::Existing(mention) => Some(mention),
            UpsertOutcome::OwnerMissing => None,
        }
    }
}

/// Whether autocomplete offers `entity` for the lowercased `needle`.
pub fn search_matches(entity: &DirectoryEntity, needle: &str) -> bool {
    entity.is_mentionable() && entity.lookup_keys().iter().any(|key| key.contains(needle))
}

/// Autocomplete order inside one kind: prefix matches, then shorter handles, then lower ids.
pub fn search_rank(entity: &DirectoryEntity, needle: &str) -> (bool, usize, i64) {
    let prefix = entity
        .lookup_keys()
        .iter()
        .any(|key| key.starts_with(needle));
    (!prefix, entity.handle().len(), entity.id())
}

/// Apply [`search_matches`] and [`search_rank`] to a full table scan, keeping `limit` rows.
pub fn select_search_results(
    rows: impl IntoIterator<Item = DirectoryEntity>,
    needle: &str,
    limit: usize,
) -> Vec<DirectoryEntity> {
    let mut matches: Vec<DirectoryEntity> = rows
        .into_iter()
        .filter(|entity| search_matches(entity, needle))
        .collect();
    matches.sort_by_cached_key(|entity| search_rank(entity, needle));
    matches.truncate(limit);
    matches
}

/// 1-based page selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Page number starting at 1.
    pub page: u32,
    /// Rows per page.
    pub per_page: u32,
}

impl PageRequest {
    /// Number of rows to skip.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }
}

/// One page of rows plus the total row count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Rows of the requested page.
    pub items: Vec<T>,
    /// Rows across all pages.
    pub total: u64,
}

impl<T> Page<T> {
    /// Cut one page out of rows already in display order.
    pub fn from_sorted(rows: Vec<T>, page: PageRequest) -> Self {
        let total = rows.len() as u64;
        let items = rows
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(page.per_page as usize)
            .collect();
        Self { items, total }
    }
}

/// Mention totals for one entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MentionCounts {
    /// Every stored mention of the entity.
    pub total: u64,
    /// Mentions not yet marked read.
    pub unread: u64,
}

/// Entity ranked by recent mention volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopularTarget {
    /// Mentioned entity.
    pub target: EntityRef,
    /// Mentions inside the requested window.
    pub count: u64,
}

/// Count mentions stored at or after `since` per target, most mentioned first.
///
/// Ties are ordered by target so the ranking is stable across calls.
pub fn rank_targets<'a>(
    mentions: impl IntoIterator<Item = &'a MentionEntity>,
    since: SystemTime,
    limit: usize,
) -> Vec<PopularTarget> {
    let mut counts: HashMap<EntityRef, u64> = HashMap::new();
    for mention in mentions {
        if mention.mentioned_at >= since {
            *counts.entry(mention.mentioned).or_default() += 1;
        }
    }

    let mut ranked: Vec<PopularTarget> = counts
        .into_iter()
        .map(|(target, count)| PopularTarget { target, count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.target.cmp(&b.target)));
    ranked.truncate(limit);
    ranked
}

/// Id sequences handed out by the storage backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sequence {
    /// Ids of one directory table.
    Directory(EntityKind),
    /// Ids of content rows, shared across content kinds.
    Content,
    /// Ids of mention rows.
    Mention,
}

impl Sequence {
    /// Stable counter name.
    pub fn name(self) -> &'static str {
        match self {
            Sequence::Directory(kind) => kind.path_segment(),
            Sequence::Content => "content",
            Sequence::Mention => "mentions",
        }
    }
}

/// Sort key shared by every backend: newest first, ties broken by id descending.
pub fn newest_first(a: &MentionEntity, b: &MentionEntity) -> std::cmp::Ordering {
    b.mentioned_at
        .cmp(&a.mentioned_at)
        .then_with(|| b.id.cmp(&a.id))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn mention(id: i64, target: EntityRef, age_secs: u64) -> MentionEntity {
        MentionEntity {
            id,
            mentionable: ContentRef::new(ContentKind::News, id),
            mentioned: target,
            author_id: 1,
            mention_text: "@x".into(),
            context: None,
            is_read: false,
            mentioned_at: SystemTime::UNIX_EPOCH + Duration::from_secs(1_000 - age_secs),
        }
    }

    #[test]
    fn pages_are_one_based() {
        let page = Page::from_sorted((1..=5).collect(), PageRequest { page: 2, per_page: 2 });
        assert_eq!(page.items, vec![3, 4]);
        assert_eq!(page.total, 5);

        let past_end = Page::from_sorted(vec![1, 2], PageRequest { page: 3, per_page: 2 });
        assert!(past_end.items.is_empty());
        assert_eq!(past_end.total, 2);
    }

    #[test]
    fn ranking_ignores_mentions_outside_the_window() {
        let team = EntityRef::new(EntityKind::Team, 1);
        let user = EntityRef::new(EntityKind::User, 2);
        let rows = [
            mention(1, team, 10),
            mention(2, team, 20),
            mention(3, user, 10),
            mention(4, user, 900),
            mention(5, user, 950),
        ];

        let since = SystemTime::UNIX_EPOCH + Duration::from_secs(500);
        let ranked = rank_targets(&rows, since, 10);
        assert_eq!(
            ranked,
            vec![
                PopularTarget { target: team, count: 2 },
                PopularTarget { target: user, count: 1 },
            ]
        );
        assert_eq!(rank_targets(&rows, since, 1).len(), 1);
    }

    fn user(id: i64, name: &str, status: UserStatus) -> DirectoryEntity {
        DirectoryEntity::User(UserEntity {
            id,
            name: name.into(),
            avatar: None,
            status,
            created_at: SystemTime::UNIX_EPOCH,
        })
    }

    #[test]
    fn search_selection_skips_inactive_rows_before_the_cut() {
        let rows = vec![
            user(1, "ghost", UserStatus::Banned),
            user(2, "ghoul", UserStatus::Inactive),
            user(3, "ghost2", UserStatus::Active),
        ];
        let picked = select_search_results(rows, "gh", 1);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].id(), 3);
    }

    #[test]
    fn search_selection_ranks_prefix_matches_before_the_cut() {
        let rows = vec![
            user(1, "boss", UserStatus::Active),
            user(2, "sniper", UserStatus::Active),
            user(3, "sq", UserStatus::Active),
        ];
        let picked: Vec<i64> = select_search_results(rows, "s", 2)
            .iter()
            .map(DirectoryEntity::id)
            .collect();
        assert_eq!(picked, vec![3, 2]);
    }

    #[test]
    fn newest_first_breaks_ties_by_id() {
        let target = EntityRef::new(EntityKind::User, 1);
        let mut rows = vec![mention(1, target, 5), mention(2, target, 5), mention(3, target, 1)];
        rows.sort_by(newest_first);
        let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }
}
