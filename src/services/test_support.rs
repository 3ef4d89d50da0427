use std::{
    sync::{Arc, Mutex},
    time::SystemTime,
};

use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::{
    config::AppConfig,
    dao::{
        models::{
            ContentEntity, DirectoryEntity, MentionCounts, MentionEntity, Page, PageRequest,
            PlayerEntity, PopularTarget, Sequence, TeamEntity, UpsertOutcome, UserEntity,
            UserStatus,
        },
        storage::{StorageError, StorageResult},
        store::{ContentStore, DirectoryStore, MentionStore, PlatformStore, memory::MemoryStore},
    },
    mention::{ContentKind, ContentRef, EntityKind, EntityRef},
    services::notifier::MentionNotification,
    state::{AppState, SharedState},
};

/// user 1 `alice` (active), user 2 `ghost` (banned), team 1 `tsm` / "Team SoloMid",
/// player 1 `shroud` / "Grzesiek".
async fn seed(store: &MemoryStore) {
    let now = SystemTime::now();
    let rows = [
        DirectoryEntity::User(UserEntity {
            id: 1,
            name: "alice".into(),
            avatar: None,
            status: UserStatus::Active,
            created_at: now,
        }),
        DirectoryEntity::User(UserEntity {
            id: 2,
            name: "ghost".into(),
            avatar: None,
            status: UserStatus::Banned,
            created_at: now,
        }),
        DirectoryEntity::Team(TeamEntity {
            id: 1,
            name: "Team SoloMid".into(),
            short_name: "tsm".into(),
            logo: None,
            region: Some("NA".into()),
            created_at: now,
        }),
        DirectoryEntity::Player(PlayerEntity {
            id: 1,
            username: "shroud".into(),
            real_name: Some("Grzesiek".into()),
            avatar: None,
            role: None,
            team_id: None,
            created_at: now,
        }),
    ];
    for row in rows {
        // keep the id sequences ahead of the seeded rows
        store
            .allocate_id(Sequence::Directory(row.kind()))
            .await
            .unwrap();
        store.save_entity(row).await.unwrap();
    }
}

/// State over an in-memory store holding the rows listed on [`seed`].
pub(crate) async fn seeded() -> (
    SharedState,
    Arc<MemoryStore>,
    mpsc::Receiver<MentionNotification>,
) {
    let store = Arc::new(MemoryStore::new());
    seed(&store).await;

    let (state, rx) = AppState::with_store(AppConfig::default(), store.clone()).await;
    (state, store, rx)
}

/// Like [`seeded`], over a store whose writes and lookups can be made to fail per kind.
pub(crate) async fn seeded_flaky() -> (
    SharedState,
    Arc<FlakyStore>,
    mpsc::Receiver<MentionNotification>,
) {
    let inner = MemoryStore::new();
    seed(&inner).await;
    let store = Arc::new(FlakyStore {
        inner,
        failing_upserts: Mutex::new(None),
        failing_lookups: Mutex::new(None),
    });

    let (state, rx) = AppState::with_store(AppConfig::default(), store.clone()).await;
    (state, store, rx)
}

/// Store a bare news article so mentions can be attached to it.
pub(crate) async fn save_news(store: &dyn PlatformStore, id: i64) -> ContentRef {
    let now = SystemTime::now();
    let content = ContentEntity {
        kind: ContentKind::News,
        id,
        author_id: 1,
        title: Some(format!("News {id}")),
        body: String::new(),
        parent_id: None,
        created_at: now,
        updated_at: now,
    };
    let owner = content.reference();
    store.save_content(content).await.unwrap();
    owner
}

fn outage<T: Send + 'static>(operation: &str) -> BoxFuture<'static, StorageResult<T>> {
    let err = StorageError::unavailable(
        format!("{operation} failed"),
        std::io::Error::other("injected outage"),
    );
    Box::pin(async move { Err(err) })
}

/// In-memory store that fails mention writes or handle lookups of one kind on demand.
pub(crate) struct FlakyStore {
    inner: MemoryStore,
    failing_upserts: Mutex<Option<EntityKind>>,
    failing_lookups: Mutex<Option<EntityKind>>,
}

impl FlakyStore {
    pub(crate) fn fail_upserts_for(&self, kind: EntityKind) {
        *self.failing_upserts.lock().unwrap() = Some(kind);
    }

    pub(crate) fn fail_lookups_for(&self, kind: EntityKind) {
        *self.failing_lookups.lock().unwrap() = Some(kind);
    }

    pub(crate) fn heal(&self) {
        *self.failing_upserts.lock().unwrap() = None;
        *self.failing_lookups.lock().unwrap() = None;
    }
}

impl DirectoryStore for FlakyStore {
    fn save_entity(&self, entity: DirectoryEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.save_entity(entity)
    }

    fn find_entity(
        &self,
        target: EntityRef,
    ) -> BoxFuture<'static, StorageResult<Option<DirectoryEntity>>> {
        self.inner.find_entity(target)
    }

    fn find_by_handle(
        &self,
        kind: EntityKind,
        handle: String,
    ) -> BoxFuture<'static, StorageResult<Option<DirectoryEntity>>> {
        if *self.failing_lookups.lock().unwrap() == Some(kind) {
            return outage("handle lookup");
        }
        self.inner.find_by_handle(kind, handle)
    }

    fn search_entities(
        &self,
        kind: EntityKind,
        query: String,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<DirectoryEntity>>> {
        self.inner.search_entities(kind, query, limit)
    }

    fn recent_entities(
        &self,
        kind: EntityKind,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<DirectoryEntity>>> {
        self.inner.recent_entities(kind, limit)
    }
}

impl ContentStore for FlakyStore {
    fn save_content(&self, content: ContentEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.save_content(content)
    }

    fn update_content(&self, content: ContentEntity) -> BoxFuture<'static, StorageResult<bool>> {
        self.inner.update_content(content)
    }

    fn find_content(
        &self,
        owner: ContentRef,
    ) -> BoxFuture<'static, StorageResult<Option<ContentEntity>>> {
        self.inner.find_content(owner)
    }

    fn delete_content(&self, owner: ContentRef) -> BoxFuture<'static, StorageResult<bool>> {
        self.inner.delete_content(owner)
    }
}

impl MentionStore for FlakyStore {
    fn upsert_mention(
        &self,
        mention: MentionEntity,
    ) -> BoxFuture<'static, StorageResult<UpsertOutcome>> {
        if *self.failing_upserts.lock().unwrap() == Some(mention.mentioned.kind) {
            return outage("mention upsert");
        }
        self.inner.upsert_mention(mention)
    }

    fn find_mention(&self, id: i64) -> BoxFuture<'static, StorageResult<Option<MentionEntity>>> {
        self.inner.find_mention(id)
    }

    fn mentions_in(
        &self,
        owner: ContentRef,
    ) -> BoxFuture<'static, StorageResult<Vec<MentionEntity>>> {
        self.inner.mentions_in(owner)
    }

    fn mentions_of(
        &self,
        target: EntityRef,
        page: PageRequest,
    ) -> BoxFuture<'static, StorageResult<Page<MentionEntity>>> {
        self.inner.mentions_of(target, page)
    }

    fn count_mentions_of(
        &self,
        target: EntityRef,
    ) -> BoxFuture<'static, StorageResult<MentionCounts>> {
        self.inner.count_mentions_of(target)
    }

    fn delete_mentions(&self, ids: Vec<i64>) -> BoxFuture<'static, StorageResult<u64>> {
        self.inner.delete_mentions(ids)
    }

    fn mark_read(&self, id: i64) -> BoxFuture<'static, StorageResult<bool>> {
        self.inner.mark_read(id)
    }

    fn popular_targets(
        &self,
        since: SystemTime,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<PopularTarget>>> {
        self.inner.popular_targets(since, limit)
    }
}

impl PlatformStore for FlakyStore {
    fn allocate_id(&self, sequence: Sequence) -> BoxFuture<'static, StorageResult<i64>> {
        self.inner.allocate_id(sequence)
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.health_check()
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.try_reconnect()
    }
}
