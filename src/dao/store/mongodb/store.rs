use std::{sync::Arc, time::SystemTime};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{Bson, DateTime, Document, doc},
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{IndexOptions, ReturnDocument},
};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoContentDocument, MongoDirectoryDocument, MongoMentionDocument, content_filter,
        doc_id, owner_filter, target_filter, tuple_filter,
    },
};
use crate::{
    dao::{
        models::{
            ContentEntity, DirectoryEntity, MentionCounts, MentionEntity, Page, PageRequest,
            PopularTarget, Sequence, UpsertOutcome,
        },
        storage::StorageResult,
        store::{ContentStore, DirectoryStore, MentionStore, PlatformStore},
    },
    mention::{ContentRef, EntityKind, EntityRef},
};

const CONTENT_COLLECTION_NAME: &str = "content";
const MENTION_COLLECTION_NAME: &str = "mentions";
const COUNTER_COLLECTION_NAME: &str = "counters";
const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Clone)]
pub struct MongoPlatformStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        &*err.kind,
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY_CODE
    )
}

fn directory_collection_name(kind: EntityKind) -> &'static str {
    kind.path_segment()
}

fn parse_popular(document: &Document) -> MongoResult<PopularTarget> {
    let decode = |reason: String| MongoDaoError::Decode {
        collection: MENTION_COLLECTION_NAME,
        reason,
    };

    let key = document
        .get_document("_id")
        .map_err(|err| decode(err.to_string()))?;
    let kind = key
        .get_str("kind")
        .map_err(|err| decode(err.to_string()))?
        .parse::<EntityKind>()
        .map_err(|err| decode(err.to_string()))?;
    let id = key.get_i64("id").map_err(|err| decode(err.to_string()))?;
    let count = match document.get("count") {
        Some(Bson::Int32(count)) => u64::try_from(*count).unwrap_or_default(),
        Some(Bson::Int64(count)) => u64::try_from(*count).unwrap_or_default(),
        other => return Err(decode(format!("unexpected count {other:?}"))),
    };

    Ok(PopularTarget {
        target: EntityRef::new(kind, id),
        count,
    })
}

impl MongoPlatformStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;

        for kind in EntityKind::ALL {
            let collection_name = directory_collection_name(kind);
            let index = IndexModel::builder()
                .keys(doc! {"lookup_keys": 1})
                .options(
                    IndexOptions::builder()
                        .name(Some("lookup_keys_idx".to_owned()))
                        .build(),
                )
                .build();
            database
                .collection::<Document>(collection_name)
                .create_index(index)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection: collection_name,
                    index: "lookup_keys",
                    source,
                })?;
        }

        let mentions = database.collection::<Document>(MENTION_COLLECTION_NAME);
        let tuple_index = IndexModel::builder()
            .keys(doc! {
                "mentionable_kind": 1,
                "mentionable_id": 1,
                "mentioned_kind": 1,
                "mentioned_id": 1,
            })
            .options(
                IndexOptions::builder()
                    .name(Some("mention_tuple_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        mentions
            .create_index(tuple_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: MENTION_COLLECTION_NAME,
                index: "mentionable,mentioned",
                source,
            })?;

        let target_index = IndexModel::builder()
            .keys(doc! {"mentioned_kind": 1, "mentioned_id": 1, "mentioned_at": -1})
            .options(
                IndexOptions::builder()
                    .name(Some("mention_target_idx".to_owned()))
                    .build(),
            )
            .build();
        mentions
            .create_index(target_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: MENTION_COLLECTION_NAME,
                index: "mentioned,mentioned_at",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn directory(&self, kind: EntityKind) -> Collection<MongoDirectoryDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoDirectoryDocument>(directory_collection_name(kind))
    }

    async fn content(&self) -> Collection<MongoContentDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoContentDocument>(CONTENT_COLLECTION_NAME)
    }

    async fn mentions(&self) -> Collection<MongoMentionDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoMentionDocument>(MENTION_COLLECTION_NAME)
    }

    async fn next_id(&self, sequence: Sequence) -> MongoResult<i64> {
        let counters = self
            .database()
            .await
            .collection::<Document>(COUNTER_COLLECTION_NAME);
        let name = sequence.name();

        let counter = counters
            .find_one_and_update(doc! {"_id": name}, doc! {"$inc": {"seq": 1_i64}})
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::NextId {
                sequence: name,
                source,
            })?
            .ok_or_else(|| MongoDaoError::Decode {
                collection: COUNTER_COLLECTION_NAME,
                reason: format!("counter `{name}` vanished during upsert"),
            })?;

        counter.get_i64("seq").map_err(|err| MongoDaoError::Decode {
            collection: COUNTER_COLLECTION_NAME,
            reason: err.to_string(),
        })
    }

    async fn save_entity(&self, entity: DirectoryEntity) -> MongoResult<()> {
        let target = entity.target();
        let document: MongoDirectoryDocument = entity.into();
        self.directory(target.kind)
            .await
            .replace_one(doc_id(target.id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveEntity { target, source })?;
        Ok(())
    }

    async fn find_entity(&self, target: EntityRef) -> MongoResult<Option<DirectoryEntity>> {
        let document = self
            .directory(target.kind)
            .await
            .find_one(doc_id(target.id))
            .await
            .map_err(|source| MongoDaoError::QueryDirectory {
                collection: directory_collection_name(target.kind),
                source,
            })?;
        Ok(document.map(Into::into))
    }

    async fn find_by_handle(
        &self,
        kind: EntityKind,
        handle: String,
    ) -> MongoResult<Option<DirectoryEntity>> {
        let document = self
            .directory(kind)
            .await
            .find_one(doc! {"lookup_keys": handle.to_ascii_lowercase()})
            .sort(doc! {"_id": 1})
            .await
            .map_err(|source| MongoDaoError::QueryDirectory {
                collection: directory_collection_name(kind),
                source,
            })?;
        Ok(document.map(Into::into))
    }

    async fn find_directory(
        &self,
        kind: EntityKind,
        filter: Document,
        sort: Document,
        limit: usize,
    ) -> MongoResult<Vec<DirectoryEntity>> {
        let map_err = |source| MongoDaoError::QueryDirectory {
            collection: directory_collection_name(kind),
            source,
        };
        let documents: Vec<MongoDirectoryDocument> = self
            .directory(kind)
            .await
            .find(filter)
            .sort(sort)
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .await
            .map_err(map_err)?
            .try_collect()
            .await
            .map_err(map_err)?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    /// Mentionable rows containing `needle`, ranked server-side before the limit applies.
    async fn search_directory(
        &self,
        kind: EntityKind,
        needle: String,
        limit: usize,
    ) -> MongoResult<Vec<DirectoryEntity>> {
        let map_err = |source| MongoDaoError::QueryDirectory {
            collection: directory_collection_name(kind),
            source,
        };
        // lookup keys are stored lowercased, so a plain escaped regex is case-insensitive here
        let pattern = regex::escape(&needle);
        let key_position = doc! {"$indexOfCP": ["$$key", needle]};
        let pipeline = vec![
            doc! {"$match": {
                "lookup_keys": {"$regex": pattern},
                "status": {"$in": ["active", null]},
            }},
            doc! {"$addFields": {
                "search_prefix": {"$anyElementTrue": [{"$map": {
                    "input": "$lookup_keys",
                    "as": "key",
                    "in": {"$eq": [key_position, 0]},
                }}]},
                "search_handle_len": {"$strLenBytes": "$handle"},
            }},
            doc! {"$sort": {"search_prefix": -1, "search_handle_len": 1, "_id": 1}},
            doc! {"$limit": i64::try_from(limit).unwrap_or(i64::MAX)},
            doc! {"$project": {"search_prefix": 0, "search_handle_len": 0}},
        ];

        let documents: Vec<MongoDirectoryDocument> = self
            .directory(kind)
            .await
            .aggregate(pipeline)
            .with_type::<MongoDirectoryDocument>()
            .await
            .map_err(map_err)?
            .try_collect()
            .await
            .map_err(map_err)?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn owner_exists(&self, owner: ContentRef) -> MongoResult<bool> {
        let count = self
            .content()
            .await
            .count_documents(content_filter(owner))
            .await
            .map_err(|source| MongoDaoError::LoadContent { owner, source })?;
        Ok(count > 0)
    }

    async fn save_content(&self, content: ContentEntity) -> MongoResult<()> {
        let owner = content.reference();
        let document: MongoContentDocument = content.into();
        self.content()
            .await
            .replace_one(doc_id(owner.id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveContent { owner, source })?;
        Ok(())
    }

    async fn update_content(&self, content: ContentEntity) -> MongoResult<bool> {
        let owner = content.reference();
        let document: MongoContentDocument = content.into();
        let result = self
            .content()
            .await
            .replace_one(content_filter(owner), &document)
            .await
            .map_err(|source| MongoDaoError::SaveContent { owner, source })?;
        Ok(result.matched_count > 0)
    }

    async fn find_content(&self, owner: ContentRef) -> MongoResult<Option<ContentEntity>> {
        let document = self
            .content()
            .await
            .find_one(content_filter(owner))
            .await
            .map_err(|source| MongoDaoError::LoadContent { owner, source })?;
        Ok(document.map(Into::into))
    }

    /// Content goes first so a concurrent [`Self::upsert_mention`] either sees it gone or
    /// inserts before the mention sweep below.
    async fn delete_content(&self, owner: ContentRef) -> MongoResult<bool> {
        let result = self
            .content()
            .await
            .delete_one(content_filter(owner))
            .await
            .map_err(|source| MongoDaoError::DeleteContent { owner, source })?;

        self.mentions()
            .await
            .delete_many(owner_filter(owner))
            .await
            .map_err(|source| MongoDaoError::DeleteContent { owner, source })?;
        Ok(result.deleted_count > 0)
    }

    async fn upsert_mention(&self, mention: MentionEntity) -> MongoResult<UpsertOutcome> {
        let owner = mention.mentionable;
        if !self.owner_exists(owner).await? {
            return Ok(UpsertOutcome::OwnerMissing);
        }

        let collection = self.mentions().await;
        let filter = tuple_filter(&mention);

        let existing = collection
            .find_one(filter.clone())
            .await
            .map_err(|source| MongoDaoError::QueryMentions { source })?;
        if let Some(existing) = existing {
            return Ok(UpsertOutcome::Existing(existing.into()));
        }

        let id = mention.id;
        let document: MongoMentionDocument = mention.clone().into();
        match collection.insert_one(&document).await {
            Ok(_) => {
                // The owner may have been deleted between the check above and the insert.
                if !self.owner_exists(owner).await? {
                    collection
                        .delete_one(doc_id(id))
                        .await
                        .map_err(|source| MongoDaoError::DeleteMentions { source })?;
                    return Ok(UpsertOutcome::OwnerMissing);
                }
                Ok(UpsertOutcome::Inserted(mention))
            }
            // Lost the race against a concurrent save of the same content.
            Err(err) if is_duplicate_key(&err) => collection
                .find_one(filter)
                .await
                .map_err(|source| MongoDaoError::QueryMentions { source })?
                .map(|winner| UpsertOutcome::Existing(winner.into()))
                .ok_or_else(|| MongoDaoError::Decode {
                    collection: MENTION_COLLECTION_NAME,
                    reason: format!("duplicate of mention `{id}` disappeared"),
                }),
            Err(source) => Err(MongoDaoError::SaveMention { id, source }),
        }
    }

    async fn find_mention(&self, id: i64) -> MongoResult<Option<MentionEntity>> {
        let document = self
            .mentions()
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::QueryMentions { source })?;
        Ok(document.map(Into::into))
    }

    async fn mentions_in(&self, owner: ContentRef) -> MongoResult<Vec<MentionEntity>> {
        let documents: Vec<MongoMentionDocument> = self
            .mentions()
            .await
            .find(owner_filter(owner))
            .sort(doc! {"_id": 1})
            .await
            .map_err(|source| MongoDaoError::QueryMentions { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::QueryMentions { source })?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn mentions_of(
        &self,
        target: EntityRef,
        page: PageRequest,
    ) -> MongoResult<Page<MentionEntity>> {
        let collection = self.mentions().await;
        let total = collection
            .count_documents(target_filter(target))
            .await
            .map_err(|source| MongoDaoError::QueryMentions { source })?;

        let documents: Vec<MongoMentionDocument> = collection
            .find(target_filter(target))
            .sort(doc! {"mentioned_at": -1, "_id": -1})
            .skip(page.offset())
            .limit(i64::from(page.per_page))
            .await
            .map_err(|source| MongoDaoError::QueryMentions { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::QueryMentions { source })?;

        Ok(Page {
            items: documents.into_iter().map(Into::into).collect(),
            total,
        })
    }

    async fn count_mentions_of(&self, target: EntityRef) -> MongoResult<MentionCounts> {
        let collection = self.mentions().await;
        let total = collection
            .count_documents(target_filter(target))
            .await
            .map_err(|source| MongoDaoError::QueryMentions { source })?;

        let mut unread_filter = target_filter(target);
        unread_filter.insert("is_read", false);
        let unread = collection
            .count_documents(unread_filter)
            .await
            .map_err(|source| MongoDaoError::QueryMentions { source })?;

        Ok(MentionCounts { total, unread })
    }

    async fn delete_mentions(&self, ids: Vec<i64>) -> MongoResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = self
            .mentions()
            .await
            .delete_many(doc! {"_id": {"$in": ids}})
            .await
            .map_err(|source| MongoDaoError::DeleteMentions { source })?;
        Ok(result.deleted_count)
    }

    async fn mark_read(&self, id: i64) -> MongoResult<bool> {
        let result = self
            .mentions()
            .await
            .update_one(doc_id(id), doc! {"$set": {"is_read": true}})
            .await
            .map_err(|source| MongoDaoError::UpdateMention { id, source })?;
        Ok(result.matched_count > 0)
    }

    async fn popular_targets(
        &self,
        since: SystemTime,
        limit: usize,
    ) -> MongoResult<Vec<PopularTarget>> {
        let pipeline = vec![
            doc! {"$match": {"mentioned_at": {"$gte": DateTime::from_system_time(since)}}},
            doc! {"$group": {
                "_id": {"kind": "$mentioned_kind", "id": "$mentioned_id"},
                "count": {"$sum": 1},
            }},
            doc! {"$sort": {"count": -1, "_id.kind": 1, "_id.id": 1}},
            doc! {"$limit": i64::try_from(limit).unwrap_or(i64::MAX)},
        ];

        let documents: Vec<Document> = self
            .mentions()
            .await
            .aggregate(pipeline)
            .await
            .map_err(|source| MongoDaoError::QueryMentions { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::QueryMentions { source })?;

        documents.iter().map(parse_popular).collect()
    }
}

impl DirectoryStore for MongoPlatformStore {
    fn save_entity(&self, entity: DirectoryEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_entity(entity).await.map_err(Into::into) })
    }

    fn find_entity(
        &self,
        target: EntityRef,
    ) -> BoxFuture<'static, StorageResult<Option<DirectoryEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_entity(target).await.map_err(Into::into) })
    }

    fn find_by_handle(
        &self,
        kind: EntityKind,
        handle: String,
    ) -> BoxFuture<'static, StorageResult<Option<DirectoryEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_by_handle(kind, handle).await.map_err(Into::into) })
    }

    fn search_entities(
        &self,
        kind: EntityKind,
        query: String,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<DirectoryEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .search_directory(kind, query.to_ascii_lowercase(), limit)
                .await
                .map_err(Into::into)
        })
    }

    fn recent_entities(
        &self,
        kind: EntityKind,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<DirectoryEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_directory(kind, doc! {}, doc! {"created_at": -1, "_id": -1}, limit)
                .await
                .map_err(Into::into)
        })
    }
}

impl ContentStore for MongoPlatformStore {
    fn save_content(&self, content: ContentEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_content(content).await.map_err(Into::into) })
    }

    fn update_content(&self, content: ContentEntity) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.update_content(content).await.map_err(Into::into) })
    }

    fn find_content(
        &self,
        owner: ContentRef,
    ) -> BoxFuture<'static, StorageResult<Option<ContentEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_content(owner).await.map_err(Into::into) })
    }

    fn delete_content(&self, owner: ContentRef) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_content(owner).await.map_err(Into::into) })
    }
}

impl MentionStore for MongoPlatformStore {
    fn upsert_mention(
        &self,
        mention: MentionEntity,
    ) -> BoxFuture<'static, StorageResult<UpsertOutcome>> {
        let store = self.clone();
        Box::pin(async move { store.upsert_mention(mention).await.map_err(Into::into) })
    }

    fn find_mention(&self, id: i64) -> BoxFuture<'static, StorageResult<Option<MentionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_mention(id).await.map_err(Into::into) })
    }

    fn mentions_in(
        &self,
        owner: ContentRef,
    ) -> BoxFuture<'static, StorageResult<Vec<MentionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.mentions_in(owner).await.map_err(Into::into) })
    }

    fn mentions_of(
        &self,
        target: EntityRef,
        page: PageRequest,
    ) -> BoxFuture<'static, StorageResult<Page<MentionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.mentions_of(target, page).await.map_err(Into::into) })
    }

    fn count_mentions_of(
        &self,
        target: EntityRef,
    ) -> BoxFuture<'static, StorageResult<MentionCounts>> {
        let store = self.clone();
        Box::pin(async move { store.count_mentions_of(target).await.map_err(Into::into) })
    }

    fn delete_mentions(&self, ids: Vec<i64>) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move { store.delete_mentions(ids).await.map_err(Into::into) })
    }

    fn mark_read(&self, id: i64) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.mark_read(id).await.map_err(Into::into) })
    }

    fn popular_targets(
        &self,
        since: SystemTime,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<PopularTarget>>> {
        let store = self.clone();
        Box::pin(async move { store.popular_targets(since, limit).await.map_err(Into::into) })
    }
}

impl PlatformStore for MongoPlatformStore {
    fn allocate_id(&self, sequence: Sequence) -> BoxFuture<'static, StorageResult<i64>> {
        let store = self.clone();
        Box::pin(async move { store.next_id(sequence).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
