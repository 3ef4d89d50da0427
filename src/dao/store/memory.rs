use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::SystemTime,
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::sync::RwLock;

use super::{ContentStore, DirectoryStore, MentionStore, PlatformStore};
use crate::{
    dao::{
        models::{
            ContentEntity, DirectoryEntity, MentionCounts, MentionEntity, Page, PageRequest,
            PopularTarget, Sequence, UpsertOutcome, newest_first, rank_targets,
            select_search_results,
        },
        storage::StorageResult,
    },
    mention::{ContentRef, EntityKind, EntityRef},
};

/// Backend keeping every table in process memory.
///
/// Content and mentions share one lock so deleting content and its mentions is atomic;
/// the directory is read far more often than written and lives in a [`DashMap`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    directory: DashMap<EntityRef, DirectoryEntity>,
    tables: RwLock<Tables>,
    sequences: DashMap<Sequence, i64>,
}

#[derive(Default)]
struct Tables {
    content: HashMap<ContentRef, ContentEntity>,
    mentions: BTreeMap<i64, MentionEntity>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn entities_of(&self, kind: EntityKind) -> Vec<DirectoryEntity> {
        let mut rows: Vec<DirectoryEntity> = self
            .inner
            .directory
            .iter()
            .filter(|entry| entry.key().kind == kind)
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(DirectoryEntity::id);
        rows
    }
}

impl DirectoryStore for MemoryStore {
    fn save_entity(&self, entity: DirectoryEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.inner.directory.insert(entity.target(), entity);
            Ok(())
        })
    }

    fn find_entity(
        &self,
        target: EntityRef,
    ) -> BoxFuture<'static, StorageResult<Option<DirectoryEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .inner
                .directory
                .get(&target)
                .map(|entry| entry.value().clone()))
        })
    }

    fn find_by_handle(
        &self,
        kind: EntityKind,
        handle: String,
    ) -> BoxFuture<'static, StorageResult<Option<DirectoryEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let key = handle.to_ascii_lowercase();
            Ok(store
                .entities_of(kind)
                .into_iter()
                .find(|entity| entity.lookup_keys().contains(&key)))
        })
    }

    fn search_entities(
        &self,
        kind: EntityKind,
        query: String,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<DirectoryEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let needle = query.to_ascii_lowercase();
            Ok(select_search_results(store.entities_of(kind), &needle, limit))
        })
    }

    fn recent_entities(
        &self,
        kind: EntityKind,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<DirectoryEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut rows = store.entities_of(kind);
            rows.sort_by(|a, b| {
                b.created_at()
                    .cmp(&a.created_at())
                    .then_with(|| b.id().cmp(&a.id()))
            });
            rows.truncate(limit);
            Ok(rows)
        })
    }
}

impl ContentStore for MemoryStore {
    fn save_content(&self, content: ContentEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut tables = store.inner.tables.write().await;
            tables.content.insert(content.reference(), content);
            Ok(())
        })
    }

    fn update_content(&self, content: ContentEntity) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let mut tables = store.inner.tables.write().await;
            match tables.content.get_mut(&content.reference()) {
                Some(row) => {
                    *row = content;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    fn find_content(
        &self,
        owner: ContentRef,
    ) -> BoxFuture<'static, StorageResult<Option<ContentEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.inner.tables.read().await;
            Ok(tables.content.get(&owner).cloned())
        })
    }

    fn delete_content(&self, owner: ContentRef) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let mut tables = store.inner.tables.write().await;
            let existed = tables.content.remove(&owner).is_some();
            tables
                .mentions
                .retain(|_, mention| mention.mentionable != owner);
            Ok(existed)
        })
    }
}

impl MentionStore for MemoryStore {
    fn upsert_mention(
        &self,
        mention: MentionEntity,
    ) -> BoxFuture<'static, StorageResult<UpsertOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            let mut tables = store.inner.tables.write().await;
            if !tables.content.contains_key(&mention.mentionable) {
                return Ok(UpsertOutcome::OwnerMissing);
            }
            let existing = tables.mentions.values().find(|row| {
                row.mentionable == mention.mentionable && row.mentioned == mention.mentioned
            });
            if let Some(existing) = existing {
                return Ok(UpsertOutcome::Existing(existing.clone()));
            }

            tables.mentions.insert(mention.id, mention.clone());
            Ok(UpsertOutcome::Inserted(mention))
        })
    }

    fn find_mention(&self, id: i64) -> BoxFuture<'static, StorageResult<Option<MentionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.inner.tables.read().await;
            Ok(tables.mentions.get(&id).cloned())
        })
    }

    fn mentions_in(
        &self,
        owner: ContentRef,
    ) -> BoxFuture<'static, StorageResult<Vec<MentionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.inner.tables.read().await;
            Ok(tables
                .mentions
                .values()
                .filter(|mention| mention.mentionable == owner)
                .cloned()
                .collect())
        })
    }

    fn mentions_of(
        &self,
        target: EntityRef,
        page: PageRequest,
    ) -> BoxFuture<'static, StorageResult<Page<MentionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.inner.tables.read().await;
            let mut rows: Vec<MentionEntity> = tables
                .mentions
                .values()
                .filter(|mention| mention.mentioned == target)
                .cloned()
                .collect();
            rows.sort_by(newest_first);
            Ok(Page::from_sorted(rows, page))
        })
    }

    fn count_mentions_of(
        &self,
        target: EntityRef,
    ) -> BoxFuture<'static, StorageResult<MentionCounts>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.inner.tables.read().await;
            let counts = tables
                .mentions
                .values()
                .filter(|mention| mention.mentioned == target)
                .fold(MentionCounts::default(), |mut counts, mention| {
                    counts.total += 1;
                    if !mention.is_read {
                        counts.unread += 1;
                    }
                    counts
                });
            Ok(counts)
        })
    }

    fn delete_mentions(&self, ids: Vec<i64>) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            let mut tables = store.inner.tables.write().await;
            let removed = ids
                .iter()
                .filter(|id| tables.mentions.remove(*id).is_some())
                .count();
            Ok(removed as u64)
        })
    }

    fn mark_read(&self, id: i64) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let mut tables = store.inner.tables.write().await;
            match tables.mentions.get_mut(&id) {
                Some(mention) => {
                    mention.is_read = true;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    fn popular_targets(
        &self,
        since: SystemTime,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<PopularTarget>>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.inner.tables.read().await;
            Ok(rank_targets(tables.mentions.values(), since, limit))
        })
    }
}

impl PlatformStore for MemoryStore {
    fn allocate_id(&self, sequence: Sequence) -> BoxFuture<'static, StorageResult<i64>> {
        let store = self.clone();
        Box::pin(async move {
            let mut counter = store.inner.sequences.entry(sequence).or_insert(0);
            *counter += 1;
            Ok(*counter)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::models::{TeamEntity, UserEntity, UserStatus},
        mention::ContentKind,
    };

    fn mention(id: i64, owner: ContentRef, target: EntityRef) -> MentionEntity {
        MentionEntity {
            id,
            mentionable: owner,
            mentioned: target,
            author_id: 1,
            mention_text: "@x".into(),
            context: None,
            is_read: false,
            mentioned_at: SystemTime::now(),
        }
    }

    fn news(id: i64) -> ContentEntity {
        let now = SystemTime::now();
        ContentEntity {
            kind: ContentKind::News,
            id,
            author_id: 9,
            title: None,
            body: "@x".into(),
            parent_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn upsert_is_keyed_by_owner_and_target() {
        let store = MemoryStore::new();
        let owner = ContentRef::new(ContentKind::News, 1);
        let target = EntityRef::new(EntityKind::Team, 4);
        store.save_content(news(1)).await.unwrap();

        let first = store.upsert_mention(mention(1, owner, target)).await.unwrap();
        let second = store.upsert_mention(mention(2, owner, target)).await.unwrap();

        assert!(matches!(first, UpsertOutcome::Inserted(_)));
        match second {
            UpsertOutcome::Existing(row) => assert_eq!(row.id, 1),
            other => panic!("expected existing row, got {other:?}"),
        }
        assert_eq!(store.mentions_in(owner).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deleting_content_cascades_to_its_mentions_only() {
        let store = MemoryStore::new();
        let kept = ContentRef::new(ContentKind::ForumPost, 2);
        let dropped = ContentRef::new(ContentKind::News, 1);
        let target = EntityRef::new(EntityKind::User, 9);

        store.save_content(news(1)).await.unwrap();
        store
            .save_content(ContentEntity {
                kind: ContentKind::ForumPost,
                id: 2,
                parent_id: Some(7),
                ..news(2)
            })
            .await
            .unwrap();
        store.upsert_mention(mention(1, dropped, target)).await.unwrap();
        store.upsert_mention(mention(2, kept, target)).await.unwrap();

        assert!(store.delete_content(dropped).await.unwrap());
        assert!(store.mentions_in(dropped).await.unwrap().is_empty());
        assert_eq!(store.mentions_in(kept).await.unwrap().len(), 1);
        assert!(!store.delete_content(dropped).await.unwrap());
    }

    #[tokio::test]
    async fn mentions_of_deleted_content_are_not_stored() {
        let store = MemoryStore::new();
        let owner = ContentRef::new(ContentKind::News, 1);
        let target = EntityRef::new(EntityKind::Team, 4);

        store.save_content(news(1)).await.unwrap();
        assert!(store.delete_content(owner).await.unwrap());

        let outcome = store.upsert_mention(mention(1, owner, target)).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::OwnerMissing);
        assert!(outcome.mention().is_none());
        assert!(store.mentions_in(owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn updating_deleted_content_does_not_recreate_it() {
        let store = MemoryStore::new();
        let owner = ContentRef::new(ContentKind::News, 1);
        store.save_content(news(1)).await.unwrap();

        let edited = ContentEntity {
            body: "edited".into(),
            ..news(1)
        };
        assert!(store.update_content(edited.clone()).await.unwrap());
        assert_eq!(store.find_content(owner).await.unwrap().unwrap().body, "edited");

        store.delete_content(owner).await.unwrap();
        assert!(!store.update_content(edited).await.unwrap());
        assert!(store.find_content(owner).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn handle_lookup_is_case_insensitive_and_prefers_lowest_id() {
        let store = MemoryStore::new();
        let now = SystemTime::now();
        for (id, short_name) in [(2, "TSM"), (1, "tsm")] {
            store
                .save_entity(DirectoryEntity::Team(TeamEntity {
                    id,
                    name: format!("Team {id}"),
                    short_name: short_name.into(),
                    logo: None,
                    region: None,
                    created_at: now,
                }))
                .await
                .unwrap();
        }
        store
            .save_entity(DirectoryEntity::User(UserEntity {
                id: 1,
                name: "tsm".into(),
                avatar: None,
                status: UserStatus::Active,
                created_at: now,
            }))
            .await
            .unwrap();

        let found = store
            .find_by_handle(EntityKind::Team, "Tsm".into())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.target(), EntityRef::new(EntityKind::Team, 1));

        let missing = store
            .find_by_handle(EntityKind::Player, "tsm".into())
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn sequences_are_independent() {
        let store = MemoryStore::new();
        assert_eq!(store.allocate_id(Sequence::Content).await.unwrap(), 1);
        assert_eq!(store.allocate_id(Sequence::Content).await.unwrap(), 2);
        assert_eq!(store.allocate_id(Sequence::Mention).await.unwrap(), 1);
    }
}
