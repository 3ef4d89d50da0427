use std::{sync::Arc, time::SystemTime};

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, from_value, json};

use crate::{
    dao::{
        models::{
            ContentEntity, DirectoryEntity, MentionCounts, MentionEntity, Page, PageRequest,
            PopularTarget, Sequence, UpsertOutcome, newest_first, rank_targets,
            select_search_results,
        },
        storage::StorageResult,
        store::{ContentStore, DirectoryStore, MentionStore, PlatformStore},
    },
    mention::{ContentRef, EntityKind, EntityRef},
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        AllDocsResponse, CouchContentDocument, CouchCounterDocument, CouchDirectoryDocument,
        CouchMentionDocument, END_SUFFIX, FindResponse, MENTION_PREFIX, content_doc_id,
        counter_doc_id, directory_doc_id, directory_prefix, mention_doc_id, owner_prefix,
    },
};

const FIND_PAGE_SIZE: usize = 500;
const MAX_WRITE_ATTEMPTS: u32 = 16;

#[derive(Clone)]
pub struct CouchPlatformStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchPlatformStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            base_url,
            database,
            auth,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth {
            Some((ref user, ref pass)) => builder.basic_auth(user.as_ref(), Some(pass.as_ref())),
            None => builder,
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        self.authorize(self.client.request(method, url))
    }

    fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = self.database_url();

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .authorize(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                // 412 means another instance created it first.
                if create.status().is_success() || create.status() == StatusCode::PRECONDITION_FAILED
                {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn ping(&self) -> CouchResult<()> {
        let url = self.database_url();
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: url.clone(),
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(CouchDaoError::RequestStatus {
                path: url,
                status: response.status(),
            })
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    /// Write a document; `Ok(false)` when CouchDB reports a revision conflict.
    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<bool>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::CONFLICT => Ok(false),
            status if status.is_success() => Ok(true),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    /// Delete one revision of a document; `Ok(false)` when it is already gone.
    async fn delete_document(&self, doc_id: &str, rev: &str) -> CouchResult<bool> {
        let response = self
            .request(Method::DELETE, doc_id)
            .query(&[("rev", rev)])
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::CONFLICT => Ok(false),
            status if status.is_success() => Ok(true),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn list_documents<T>(&self, prefix: &str) -> CouchResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        const ALL_DOCS: &str = "_all_docs";
        let query = [
            ("include_docs", "true".to_string()),
            ("startkey", format!("\"{}\"", prefix)),
            ("endkey", format!("\"{}{}\"", prefix, END_SUFFIX)),
        ];

        let response = self
            .request(Method::GET, ALL_DOCS)
            .query(&query)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: ALL_DOCS.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: ALL_DOCS.to_string(),
                status: response.status(),
            });
        }

        let payload = response.json::<AllDocsResponse>().await.map_err(|source| {
            CouchDaoError::DecodeResponse {
                path: ALL_DOCS.to_string(),
                source,
            }
        })?;

        payload
            .rows
            .into_iter()
            .filter_map(|row| row.doc)
            .map(|doc| {
                from_value(doc).map_err(|source| CouchDaoError::DeserializeValue {
                    path: ALL_DOCS.to_string(),
                    source,
                })
            })
            .collect()
    }

    /// Run a Mango query, following bookmarks until every match is read.
    async fn find_documents<T>(&self, selector: Value) -> CouchResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        const FIND: &str = "_find";
        let mut documents = Vec::new();
        let mut bookmark: Option<String> = None;

        loop {
            let mut body = json!({
                "selector": selector,
                "limit": FIND_PAGE_SIZE,
            });
            if let Some(ref mark) = bookmark {
                body["bookmark"] = Value::String(mark.clone());
            }

            let response = self
                .request(Method::POST, FIND)
                .json(&body)
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: FIND.to_string(),
                    source,
                })?;

            if !response.status().is_success() {
                return Err(CouchDaoError::RequestStatus {
                    path: FIND.to_string(),
                    status: response.status(),
                });
            }

            let payload = response.json::<FindResponse>().await.map_err(|source| {
                CouchDaoError::DecodeResponse {
                    path: FIND.to_string(),
                    source,
                }
            })?;

            let received = payload.docs.len();
            for doc in payload.docs {
                documents.push(from_value(doc).map_err(|source| {
                    CouchDaoError::DeserializeValue {
                        path: FIND.to_string(),
                        source,
                    }
                })?);
            }

            if received < FIND_PAGE_SIZE {
                break;
            }
            bookmark = payload.bookmark;
            if bookmark.is_none() {
                break;
            }
        }

        Ok(documents)
    }

    async fn entities_of(&self, kind: EntityKind) -> CouchResult<Vec<DirectoryEntity>> {
        let mut rows: Vec<DirectoryEntity> = self
            .list_documents::<CouchDirectoryDocument>(&directory_prefix(kind))
            .await?
            .into_iter()
            .map(|doc| doc.entity)
            .collect();
        rows.sort_by_key(DirectoryEntity::id);
        Ok(rows)
    }

    async fn mention_documents(&self, selector: Value) -> CouchResult<Vec<CouchMentionDocument>> {
        let mut scoped = json!({
            "_id": {"$gt": MENTION_PREFIX, "$lt": format!("{MENTION_PREFIX}{END_SUFFIX}")},
        });
        if let (Some(scope), Value::Object(extra)) = (scoped.as_object_mut(), selector) {
            scope.extend(extra);
        }
        self.find_documents(scoped).await
    }

    async fn mentions_targeting(&self, target: EntityRef) -> CouchResult<Vec<MentionEntity>> {
        Ok(self
            .mention_documents(json!({
                "mention.mentioned.kind": target.kind.as_str(),
                "mention.mentioned.id": target.id,
            }))
            .await?
            .into_iter()
            .map(|doc| doc.mention)
            .collect())
    }

    async fn save_entity(&self, entity: DirectoryEntity) -> CouchResult<()> {
        let doc_id = directory_doc_id(entity.target());
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let rev = self
                .get_document::<CouchDirectoryDocument>(&doc_id)
                .await?
                .and_then(|existing| existing.rev);
            let doc = CouchDirectoryDocument::from((entity.clone(), rev));
            if self.put_document(&doc_id, &doc).await? {
                return Ok(());
            }
        }
        Err(CouchDaoError::Contended {
            doc_id,
            attempts: MAX_WRITE_ATTEMPTS,
        })
    }

    async fn save_content(&self, content: ContentEntity) -> CouchResult<()> {
        let doc_id = content_doc_id(content.id);
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let rev = self
                .get_document::<CouchContentDocument>(&doc_id)
                .await?
                .and_then(|existing| existing.rev);
            let doc = CouchContentDocument::from((content.clone(), rev));
            if self.put_document(&doc_id, &doc).await? {
                return Ok(());
            }
        }
        Err(CouchDaoError::Contended {
            doc_id,
            attempts: MAX_WRITE_ATTEMPTS,
        })
    }

    async fn update_content(&self, content: ContentEntity) -> CouchResult<bool> {
        let owner = content.reference();
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let Some(existing) = self.find_content_document(owner).await? else {
                return Ok(false);
            };
            let doc = CouchContentDocument::from((content.clone(), existing.rev));
            if self.put_document(&existing.id, &doc).await? {
                return Ok(true);
            }
        }
        Err(CouchDaoError::Contended {
            doc_id: content_doc_id(owner.id),
            attempts: MAX_WRITE_ATTEMPTS,
        })
    }

    async fn find_content_document(
        &self,
        owner: ContentRef,
    ) -> CouchResult<Option<CouchContentDocument>> {
        Ok(self
            .get_document::<CouchContentDocument>(&content_doc_id(owner.id))
            .await?
            .filter(|doc| doc.content.kind == owner.kind))
    }

    /// The content document goes first; [`Self::upsert_mention`] re-checks it after writing.
    async fn delete_content(&self, owner: ContentRef) -> CouchResult<bool> {
        let deleted = match self.find_content_document(owner).await? {
            Some(CouchContentDocument {
                id, rev: Some(rev), ..
            }) => self.delete_document(&id, &rev).await?,
            _ => false,
        };

        let owned = self
            .list_documents::<CouchMentionDocument>(&owner_prefix(owner))
            .await?;
        for doc in owned {
            if let Some(rev) = doc.rev.as_deref() {
                self.delete_document(&doc.id, rev).await?;
            }
        }
        Ok(deleted)
    }

    async fn upsert_mention(&self, mention: MentionEntity) -> CouchResult<UpsertOutcome> {
        let owner = mention.mentionable;
        if self.find_content_document(owner).await?.is_none() {
            return Ok(UpsertOutcome::OwnerMissing);
        }

        let doc_id = mention_doc_id(owner, mention.mentioned);
        let doc = CouchMentionDocument::from((mention.clone(), None));
        if self.put_document(&doc_id, &doc).await? {
            if self.find_content_document(owner).await?.is_some() {
                return Ok(UpsertOutcome::Inserted(mention));
            }
            // Deleted while we were writing; the owner sweep may already have run.
            if let Some(CouchMentionDocument { rev: Some(rev), .. }) = self
                .get_document::<CouchMentionDocument>(&doc_id)
                .await?
                .filter(|stored| stored.mention.id == mention.id)
            {
                self.delete_document(&doc_id, &rev).await?;
            }
            return Ok(UpsertOutcome::OwnerMissing);
        }

        // 409: a row for this tuple is already stored.
        match self.get_document::<CouchMentionDocument>(&doc_id).await? {
            Some(existing) => Ok(UpsertOutcome::Existing(existing.mention)),
            None => Err(CouchDaoError::Contended {
                doc_id,
                attempts: 1,
            }),
        }
    }

    async fn find_mention_document(&self, id: i64) -> CouchResult<Option<CouchMentionDocument>> {
        Ok(self
            .mention_documents(json!({"mention.id": id}))
            .await?
            .into_iter()
            .next())
    }

    async fn mark_read(&self, id: i64) -> CouchResult<bool> {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let Some(mut doc) = self.find_mention_document(id).await? else {
                return Ok(false);
            };
            if doc.mention.is_read {
                return Ok(true);
            }
            doc.mention.is_read = true;
            if self.put_document(&doc.id, &doc).await? {
                return Ok(true);
            }
        }
        Err(CouchDaoError::Contended {
            doc_id: format!("{MENTION_PREFIX}#{id}"),
            attempts: MAX_WRITE_ATTEMPTS,
        })
    }

    async fn delete_mentions(&self, ids: Vec<i64>) -> CouchResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let docs = self
            .mention_documents(json!({"mention.id": {"$in": ids}}))
            .await?;

        let mut removed = 0;
        for doc in docs {
            if let Some(rev) = doc.rev.as_deref()
                && self.delete_document(&doc.id, rev).await?
            {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn next_id(&self, sequence: Sequence) -> CouchResult<i64> {
        let doc_id = counter_doc_id(sequence.name());
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let (rev, seq) = match self.get_document::<CouchCounterDocument>(&doc_id).await? {
                Some(counter) => (counter.rev, counter.seq),
                None => (None, 0),
            };
            let next = CouchCounterDocument {
                id: doc_id.clone(),
                rev,
                seq: seq + 1,
            };
            if self.put_document(&doc_id, &next).await? {
                return Ok(next.seq);
            }
        }
        Err(CouchDaoError::Contended {
            doc_id,
            attempts: MAX_WRITE_ATTEMPTS,
        })
    }
}

impl DirectoryStore for CouchPlatformStore {
    fn save_entity(&self, entity: DirectoryEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_entity(entity).await.map_err(Into::into) })
    }

    fn find_entity(
        &self,
        target: EntityRef,
    ) -> BoxFuture<'static, StorageResult<Option<DirectoryEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc = store
                .get_document::<CouchDirectoryDocument>(&directory_doc_id(target))
                .await?;
            Ok(doc.map(|doc| doc.entity))
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
                .await?
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
            Ok(select_search_results(
                store.entities_of(kind).await?,
                &needle,
                limit,
            ))
        })
    }

    fn recent_entities(
        &self,
        kind: EntityKind,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<DirectoryEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut rows = store.entities_of(kind).await?;
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

impl ContentStore for CouchPlatformStore {
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
        Box::pin(async move {
            let doc = store.find_content_document(owner).await?;
            Ok(doc.map(|doc| doc.content))
        })
    }

    fn delete_content(&self, owner: ContentRef) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_content(owner).await.map_err(Into::into) })
    }
}

impl MentionStore for CouchPlatformStore {
    fn upsert_mention(
        &self,
        mention: MentionEntity,
    ) -> BoxFuture<'static, StorageResult<UpsertOutcome>> {
        let store = self.clone();
        Box::pin(async move { store.upsert_mention(mention).await.map_err(Into::into) })
    }

    fn find_mention(&self, id: i64) -> BoxFuture<'static, StorageResult<Option<MentionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc = store.find_mention_document(id).await?;
            Ok(doc.map(|doc| doc.mention))
        })
    }

    fn mentions_in(
        &self,
        owner: ContentRef,
    ) -> BoxFuture<'static, StorageResult<Vec<MentionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut rows: Vec<MentionEntity> = store
                .list_documents::<CouchMentionDocument>(&owner_prefix(owner))
                .await?
                .into_iter()
                .map(|doc| doc.mention)
                .collect();
            rows.sort_by_key(|mention| mention.id);
            Ok(rows)
        })
    }

    fn mentions_of(
        &self,
        target: EntityRef,
        page: PageRequest,
    ) -> BoxFuture<'static, StorageResult<Page<MentionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut rows = store.mentions_targeting(target).await?;
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
            let rows = store.mentions_targeting(target).await?;
            Ok(MentionCounts {
                total: rows.len() as u64,
                unread: rows.iter().filter(|mention| !mention.is_read).count() as u64,
            })
        })
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
        Box::pin(async move {
            let docs = store
                .list_documents::<CouchMentionDocument>(MENTION_PREFIX)
                .await?;
            Ok(rank_targets(docs.iter().map(|doc| &doc.mention), since, limit))
        })
    }
}

impl PlatformStore for CouchPlatformStore {
    fn allocate_id(&self, sequence: Sequence) -> BoxFuture<'static, StorageResult<i64>> {
        let store = self.clone();
        Box::pin(async move { store.next_id(sequence).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
