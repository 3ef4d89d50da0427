#[cfg(feature = "couch-store")]
pub mod couchdb;
/// Process-local backend used for development and tests.
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::time::SystemTime;

use futures::future::BoxFuture;

use crate::{
    dao::{
        models::{
            ContentEntity, DirectoryEntity, MentionCounts, MentionEntity, Page, PageRequest,
            PopularTarget, Sequence, UpsertOutcome,
        },
        storage::StorageResult,
    },
    mention::{ContentRef, EntityKind, EntityRef},
};

/// Lookups over the users, teams and players tables.
pub trait DirectoryStore: Send + Sync {
    /// Insert or replace a directory row.
    fn save_entity(&self, entity: DirectoryEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch a row by reference.
    fn find_entity(
        &self,
        target: EntityRef,
    ) -> BoxFuture<'static, StorageResult<Option<DirectoryEntity>>>;
    /// Fetch the lowest-id row of `kind` whose lookup keys contain `handle` (case-insensitive).
    fn find_by_handle(
        &self,
        kind: EntityKind,
        handle: String,
    ) -> BoxFuture<'static, StorageResult<Option<DirectoryEntity>>>;
    /// Mentionable rows of `kind` whose lookup keys contain `query` as a case-insensitive
    /// substring, ordered by [`search_rank`](crate::dao::models::search_rank) before `limit`
    /// is applied.
    fn search_entities(
        &self,
        kind: EntityKind,
        query: String,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<DirectoryEntity>>>;
    /// Newest rows of `kind`.
    fn recent_entities(
        &self,
        kind: EntityKind,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<DirectoryEntity>>>;
}

/// Persistence of news, comments and forum entries.
pub trait ContentStore: Send + Sync {
    /// Insert or replace a content row.
    fn save_content(&self, content: ContentEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Replace an existing content row; `false` when it no longer exists.
    fn update_content(&self, content: ContentEntity) -> BoxFuture<'static, StorageResult<bool>>;
    /// Fetch a content row.
    fn find_content(
        &self,
        owner: ContentRef,
    ) -> BoxFuture<'static, StorageResult<Option<ContentEntity>>>;
    /// Delete a content row together with every mention it owns.
    fn delete_content(&self, owner: ContentRef) -> BoxFuture<'static, StorageResult<bool>>;
}

/// Persistence of mention rows.
pub trait MentionStore: Send + Sync {
    /// Store `mention` unless a row with the same `(mentionable, mentioned)` exists.
    ///
    /// Answers [`UpsertOutcome::OwnerMissing`] instead of storing a row for content that
    /// has been deleted.
    fn upsert_mention(
        &self,
        mention: MentionEntity,
    ) -> BoxFuture<'static, StorageResult<UpsertOutcome>>;
    /// Fetch a mention by id.
    fn find_mention(&self, id: i64) -> BoxFuture<'static, StorageResult<Option<MentionEntity>>>;
    /// Every mention owned by one content row, oldest id first.
    fn mentions_in(
        &self,
        owner: ContentRef,
    ) -> BoxFuture<'static, StorageResult<Vec<MentionEntity>>>;
    /// Mentions of one entity, newest first.
    fn mentions_of(
        &self,
        target: EntityRef,
        page: PageRequest,
    ) -> BoxFuture<'static, StorageResult<Page<MentionEntity>>>;
    /// Total and unread mentions of one entity.
    fn count_mentions_of(
        &self,
        target: EntityRef,
    ) -> BoxFuture<'static, StorageResult<MentionCounts>>;
    /// Delete mentions by id, returning how many rows went away.
    fn delete_mentions(&self, ids: Vec<i64>) -> BoxFuture<'static, StorageResult<u64>>;
    /// Flag a mention as read; `false` when it does not exist.
    fn mark_read(&self, id: i64) -> BoxFuture<'static, StorageResult<bool>>;
    /// Entities with the most mentions stored at or after `since`.
    fn popular_targets(
        &self,
        since: SystemTime,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<PopularTarget>>>;
}

/// Complete storage backend injected into the services.
pub trait PlatformStore: DirectoryStore + ContentStore + MentionStore {
    /// Hand out the next id of `sequence`.
    fn allocate_id(&self, sequence: Sequence) -> BoxFuture<'static, StorageResult<i64>>;
    /// Cheap round-trip proving the backend answers.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
