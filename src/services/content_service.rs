//! Content lifecycle. Mentions are stored as a side effect of every write.

use std::time::SystemTime;

use tracing::info;

use crate::{
    dao::{
        models::{ContentEntity, Sequence},
        store::{ContentStore, DirectoryStore, PlatformStore},
    },
    dto::{
        content::{ContentView, CreateContentRequest, UpdateContentRequest},
        mention::MentionLinkView,
    },
    error::ServiceError,
    mention::{ContentKind, ContentRef, EntityKind, EntityRef},
    services::mention_service,
    state::SharedState,
};

async fn require_content(
    store: &dyn PlatformStore,
    owner: ContentRef,
) -> Result<ContentEntity, ServiceError> {
    store
        .find_content(owner)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("content {owner} not found")))
}

async fn ensure_author(store: &dyn PlatformStore, author_id: i64) -> Result<(), ServiceError> {
    let author = EntityRef::new(EntityKind::User, author_id);
    if store.find_entity(author).await?.is_none() {
        return Err(ServiceError::InvalidInput(format!(
            "author {author_id} does not exist"
        )));
    }
    Ok(())
}

async fn ensure_parent(
    store: &dyn PlatformStore,
    kind: ContentKind,
    parent_id: Option<i64>,
) -> Result<(), ServiceError> {
    match (parent_id, kind.parent_kind()) {
        (None, _) if kind.requires_parent() => Err(ServiceError::InvalidInput(format!(
            "{kind} requires a parent_id"
        ))),
        (Some(_), _) if !kind.requires_parent() => Err(ServiceError::InvalidInput(format!(
            "{kind} does not take a parent_id"
        ))),
        (Some(parent_id), Some(parent_kind)) => {
            let parent = ContentRef::new(parent_kind, parent_id);
            if store.find_content(parent).await?.is_none() {
                return Err(ServiceError::InvalidInput(format!(
                    "parent {parent} does not exist"
                )));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

async fn render(
    state: &SharedState,
    store: &dyn PlatformStore,
    content: &ContentEntity,
) -> ContentView {
    let base_url = &state.config().links.base_url;
    let links = mention_service::links_for_content(store, content.reference()).await;
    let rendered = links.render(&content.body, base_url);
    let views = links
        .links
        .iter()
        .map(|link| MentionLinkView::from_link(link, base_url))
        .collect();
    ContentView::new(content, rendered, views, base_url)
}

/// Save new content, then store the mentions of its body.
pub async fn create_content(
    state: &SharedState,
    kind: ContentKind,
    payload: CreateContentRequest,
) -> Result<ContentView, ServiceError> {
    let store = state.require_store().await?;
    ensure_author(store.as_ref(), payload.author_id).await?;
    ensure_parent(store.as_ref(), kind, payload.parent_id).await?;

    let id = store.allocate_id(Sequence::Content).await?;
    let now = SystemTime::now();
    let content = ContentEntity {
        kind,
        id,
        author_id: payload.author_id,
        title: payload.title,
        body: payload.body,
        parent_id: payload.parent_id,
        created_at: now,
        updated_at: now,
    };
    store.save_content(content.clone()).await?;

    let owner = content.reference();
    let stored = mention_service::store_mentions(
        state,
        store.as_ref(),
        &content.body,
        owner,
        content.author_id,
    )
    .await;
    info!(owner = %owner, author_id = content.author_id, mentions = stored, "content created");

    Ok(render(state, store.as_ref(), &content).await.with_stored(stored))
}

/// Fetch content with its body rendered.
pub async fn get_content(
    state: &SharedState,
    owner: ContentRef,
) -> Result<ContentView, ServiceError> {
    let store = state.require_store().await?;
    let content = require_content(store.as_ref(), owner).await?;
    Ok(render(state, store.as_ref(), &content).await)
}

/// Replace title and body, then re-synchronise the stored mentions.
pub async fn update_content(
    state: &SharedState,
    owner: ContentRef,
    payload: UpdateContentRequest,
) -> Result<ContentView, ServiceError> {
    let store = state.require_store().await?;
    let mut content = require_content(store.as_ref(), owner).await?;

    if payload.title.is_some() {
        content.title = payload.title;
    }
    content.body = payload.body;
    content.updated_at = SystemTime::now();
    // deleted since it was read: do not bring it back
    if !store.update_content(content.clone()).await? {
        return Err(ServiceError::NotFound(format!("content {owner} not found")));
    }

    let report = mention_service::sync_mentions(
        state,
        store.as_ref(),
        &content.body,
        owner,
        content.author_id,
    )
    .await;
    info!(
        owner = %owner,
        stored = report.stored,
        removed = report.removed,
        "content updated"
    );

    Ok(render(state, store.as_ref(), &content)
        .await
        .with_stored(report.stored))
}

/// Delete content and every mention it owns.
pub async fn delete_content(state: &SharedState, owner: ContentRef) -> Result<(), ServiceError> {
    let store = state.require_store().await?;
    if !store.delete_content(owner).await? {
        return Err(ServiceError::NotFound(format!("content {owner} not found")));
    }
    info!(owner = %owner, "content deleted");
    Ok(())
}
