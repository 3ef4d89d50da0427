//! Turning tokens into stored mention rows, and reading them back.
//!
//! Storing is best-effort: unresolved tokens are skipped and storage failures are
//! logged, so a content save never fails because of its mentions.

use std::{
    collections::{HashMap, HashSet},
    ops::Range,
    time::SystemTime,
};

use tracing::{debug, warn};

use crate::{
    dao::{
        models::{DirectoryEntity, MentionEntity, PageRequest, Sequence, UpsertOutcome},
        store::{ContentStore, DirectoryStore, MentionStore, PlatformStore},
    },
    dto::{
        common::{Paginated, Pagination},
        content::content_path,
        mention::{
            AuthorView, ContentSummary, MentionCountsView, MentionLinkView, MentionView,
            PreviewView, ReadReceipt, TokenView,
        },
    },
    error::ServiceError,
    mention::{
        ContentRef, EntityKind, EntityRef, MentionLink, Token, extract_tokens, render_mentions,
        unique_tokens,
    },
    services::{directory_service, notifier},
    state::SharedState,
};

const UNKNOWN_AUTHOR: &str = "Unknown";

/// Tokens that resolved to a mentionable entity, one per target.
struct Resolution {
    resolved: Vec<(Token, DirectoryEntity)>,
    /// Tokens that resolved to an entity already claimed by an earlier token.
    aliases: Vec<(Token, DirectoryEntity)>,
    /// `false` when a lookup failed, so absent targets may just be unknown.
    complete: bool,
}

impl Resolution {
    fn targets(&self) -> HashSet<EntityRef> {
        self.resolved
            .iter()
            .map(|(_, entity)| entity.target())
            .collect()
    }

    fn links(&self) -> impl Iterator<Item = MentionLink> + '_ {
        self.resolved
            .iter()
            .chain(&self.aliases)
            .map(|(token, entity)| link_for(&token.raw, entity))
    }
}

/// Effect of synchronising the mentions of one content item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Rows inserted by this write.
    pub stored: usize,
    /// Rows deleted because their target no longer appears.
    pub removed: u64,
}

/// Stored links of one content item plus spellings that render to the same targets.
#[derive(Debug, Clone, Default)]
pub struct ContentLinks {
    /// One link per stored row.
    pub links: Vec<MentionLink>,
    aliases: Vec<MentionLink>,
}

impl ContentLinks {
    /// Render `text` against every known spelling of the linked targets.
    pub fn render(&self, text: &str, base_url: &str) -> String {
        let all: Vec<MentionLink> = self.links.iter().chain(&self.aliases).cloned().collect();
        render_mentions(text, &all, base_url)
    }
}

fn link_for(mention_text: &str, entity: &DirectoryEntity) -> MentionLink {
    MentionLink {
        mention_text: mention_text.to_owned(),
        target: entity.target(),
        display_name: entity.display_name().to_owned(),
    }
}

/// Text around `span`, up to `radius` characters on each side, trimmed.
pub fn context_around(text: &str, span: Range<usize>, radius: usize) -> String {
    let start = text[..span.start]
        .char_indices()
        .rev()
        .take(radius)
        .last()
        .map_or(span.start, |(idx, _)| idx);
    let end = text[span.end..]
        .char_indices()
        .nth(radius)
        .map_or(text.len(), |(idx, _)| span.end + idx);
    text[start..end].trim().to_owned()
}

async fn resolve(store: &dyn PlatformStore, tokens: Vec<Token>) -> Resolution {
    let mut resolution = Resolution {
        resolved: Vec::new(),
        aliases: Vec::new(),
        complete: true,
    };
    let mut claimed = HashSet::new();

    for token in unique_tokens(tokens) {
        match store
            .find_by_handle(token.kind, token.identifier.clone())
            .await
        {
            Ok(Some(entity)) if entity.is_mentionable() => {
                if claimed.insert(entity.target()) {
                    resolution.resolved.push((token, entity));
                } else {
                    resolution.aliases.push((token, entity));
                }
            }
            Ok(Some(entity)) => {
                debug!(token = %token.raw, target = %entity.target(), "token points at an inactive entity");
            }
            Ok(None) => debug!(token = %token.raw, "token did not resolve"),
            Err(err) => {
                warn!(token = %token.raw, error = %err, "mention lookup failed; skipping token");
                resolution.complete = false;
            }
        }
    }

    resolution
}

async fn apply(
    state: &SharedState,
    store: &dyn PlatformStore,
    text: &str,
    owner: ContentRef,
    author_id: i64,
    prune: bool,
) -> SyncReport {
    let resolution = resolve(store, extract_tokens(text)).await;
    let radius = state.config().mentions.context_radius;

    let existing = match store.mentions_in(owner).await {
        Ok(rows) => Some(rows),
        Err(err) => {
            warn!(owner = %owner, error = %err, "failed to load stored mentions");
            None
        }
    };
    let already: HashSet<EntityRef> = existing
        .iter()
        .flatten()
        .map(|row| row.mentioned)
        .collect();

    let mut report = SyncReport::default();
    let mut owner_gone = false;
    for (token, entity) in &resolution.resolved {
        let target = entity.target();
        if already.contains(&target) {
            continue;
        }

        let id = match store.allocate_id(Sequence::Mention).await {
            Ok(id) => id,
            Err(err) => {
                warn!(owner = %owner, target = %target, error = %err, "failed to allocate mention id");
                continue;
            }
        };

        let mention = MentionEntity {
            id,
            mentionable: owner,
            mentioned: target,
            author_id,
            mention_text: token.raw.clone(),
            context: Some(context_around(text, token.span(), radius)),
            is_read: false,
            mentioned_at: SystemTime::now(),
        };

        match store.upsert_mention(mention).await {
            Ok(UpsertOutcome::Inserted(row)) => {
                report.stored += 1;
                notifier::enqueue(state, &row);
            }
            Ok(UpsertOutcome::Existing(_)) => {}
            Ok(UpsertOutcome::OwnerMissing) => {
                debug!(owner = %owner, "content was deleted; dropping its mentions");
                owner_gone = true;
                break;
            }
            Err(err) => {
                warn!(owner = %owner, target = %target, error = %err, "failed to store mention");
            }
        }
    }

    if prune && !owner_gone {
        match existing {
            Some(rows) if resolution.complete => {
                let current = resolution.targets();
                let stale: Vec<i64> = rows
                    .iter()
                    .filter(|row| !current.contains(&row.mentioned))
                    .map(|row| row.id)
                    .collect();
                if !stale.is_empty() {
                    match store.delete_mentions(stale).await {
                        Ok(removed) => report.removed = removed,
                        Err(err) => {
                            warn!(owner = %owner, error = %err, "failed to delete stale mentions");
                        }
                    }
                }
            }
            _ => debug!(owner = %owner, "skipping stale mention cleanup after a failed lookup"),
        }
    }

    debug!(
        owner = %owner,
        stored = report.stored,
        removed = report.removed,
        "mentions synchronised"
    );
    report
}

/// Resolve the tokens of `text` and store one row per new target owned by `owner`.
///
/// Returns how many rows were newly inserted; each of them is also queued for notification.
pub async fn store_mentions(
    state: &SharedState,
    store: &dyn PlatformStore,
    text: &str,
    owner: ContentRef,
    author_id: i64,
) -> usize {
    apply(state, store, text, owner, author_id, false).await.stored
}

/// Like [`store_mentions`], and also delete rows whose target no longer appears in `text`.
pub async fn sync_mentions(
    state: &SharedState,
    store: &dyn PlatformStore,
    text: &str,
    owner: ContentRef,
    author_id: i64,
) -> SyncReport {
    apply(state, store, text, owner, author_id, true).await
}

/// Stored links of `owner`; rows whose target is gone are left out.
pub async fn links_for_content(store: &dyn PlatformStore, owner: ContentRef) -> ContentLinks {
    let rows = match store.mentions_in(owner).await {
        Ok(rows) => rows,
        Err(err) => {
            warn!(owner = %owner, error = %err, "failed to load mentions for rendering");
            return ContentLinks::default();
        }
    };

    let mut links = ContentLinks::default();
    for row in rows {
        match store.find_entity(row.mentioned).await {
            Ok(Some(entity)) => {
                let link = link_for(&row.mention_text, &entity);
                let handle_text = row.mentioned.kind.mention_text(entity.handle());
                if !handle_text.eq_ignore_ascii_case(&link.mention_text) {
                    links.aliases.push(link_for(&handle_text, &entity));
                }
                links.links.push(link);
            }
            Ok(None) => debug!(target = %row.mentioned, "mentioned entity no longer exists"),
            Err(err) => warn!(target = %row.mentioned, error = %err, "failed to load mentioned entity"),
        }
    }
    links
}

/// Extract, resolve and render `text` without storing anything.
pub async fn preview(state: &SharedState, text: &str) -> Result<PreviewView, ServiceError> {
    let store = state.require_store().await?;
    let base_url = &state.config().links.base_url;

    let tokens = extract_tokens(text);
    let resolution = resolve(store.as_ref(), tokens.clone()).await;

    let by_key: HashMap<(EntityKind, String), EntityRef> = resolution
        .resolved
        .iter()
        .chain(&resolution.aliases)
        .map(|(token, entity)| (token.key(), entity.target()))
        .collect();

    let render_links: Vec<MentionLink> = resolution.links().collect();
    let links = resolution
        .resolved
        .iter()
        .map(|(token, entity)| MentionLinkView::from_link(&link_for(&token.raw, entity), base_url))
        .collect();

    Ok(PreviewView {
        tokens: tokens
            .iter()
            .map(|token| TokenView::new(token, by_key.get(&token.key()).copied()))
            .collect(),
        links,
        rendered: render_mentions(text, &render_links, base_url),
    })
}

/// Newest-first mentions of `target`, with author and content summaries.
pub async fn list_mentions_of(
    state: &SharedState,
    target: EntityRef,
    page: PageRequest,
) -> Result<Paginated<MentionView>, ServiceError> {
    let store = state.require_store().await?;
    directory_service::require_entity(store.as_ref(), target).await?;
    let base_url = &state.config().links.base_url;

    let rows = store.mentions_of(target, page).await?;
    let mut authors: HashMap<i64, String> = HashMap::new();
    let mut views = Vec::with_capacity(rows.items.len());

    for row in &rows.items {
        let name = match authors.get(&row.author_id) {
            Some(name) => name.clone(),
            None => {
                let name = store
                    .find_entity(EntityRef::new(EntityKind::User, row.author_id))
                    .await?
                    .map_or_else(|| UNKNOWN_AUTHOR.to_owned(), |user| user.display_name().to_owned());
                authors.insert(row.author_id, name.clone());
                name
            }
        };

        let content = store
            .find_content(row.mentionable)
            .await?
            .map(|content| ContentSummary {
                kind: content.kind,
                id: content.id,
                title: content
                    .title
                    .clone()
                    .unwrap_or_else(|| content.kind.label().to_owned()),
                url: format!(
                    "{base_url}{}",
                    content_path(content.kind, content.id, content.parent_id)
                ),
            });

        views.push(MentionView::new(
            row,
            AuthorView {
                id: row.author_id,
                name,
            },
            content,
        ));
    }

    Ok(Paginated::new(views, Pagination::new(page, rows.total)))
}

/// Total and unread mentions of `target`.
pub async fn mention_counts(
    state: &SharedState,
    target: EntityRef,
) -> Result<MentionCountsView, ServiceError> {
    let store = state.require_store().await?;
    directory_service::require_entity(store.as_ref(), target).await?;
    let counts = store.count_mentions_of(target).await?;
    Ok(MentionCountsView::new(target, counts))
}

/// Flag a mention as read.
pub async fn mark_read(state: &SharedState, id: i64) -> Result<ReadReceipt, ServiceError> {
    let store = state.require_store().await?;
    if !store.mark_read(id).await? {
        return Err(ServiceError::NotFound(format!("mention {id} not found")));
    }
    Ok(ReadReceipt { id, is_read: true })
}

/// Resolved links of one content item.
pub async fn content_mentions(
    state: &SharedState,
    owner: ContentRef,
) -> Result<Vec<MentionLinkView>, ServiceError> {
    let store = state.require_store().await?;
    if store.find_content(owner).await?.is_none() {
        return Err(ServiceError::NotFound(format!("content {owner} not found")));
    }
    let base_url = &state.config().links.base_url;
    Ok(links_for_content(store.as_ref(), owner)
        .await
        .links
        .iter()
        .map(|link| MentionLinkView::from_link(link, base_url))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        mention::ContentKind,
        services::test_support::{save_news, seeded, seeded_flaky},
        state::AppState,
    };

    fn news(id: i64) -> ContentRef {
        ContentRef::new(ContentKind::News, id)
    }

    fn targets_of(rows: Vec<MentionEntity>) -> Vec<EntityRef> {
        rows.into_iter().map(|row| row.mentioned).collect()
    }

    #[test]
    fn context_is_cut_on_char_boundaries() {
        let text = "ééééé @alice ééééé";
        let token = &extract_tokens(text)[0];
        assert_eq!(context_around(text, token.span(), 2), "é @alice é");
        assert_eq!(context_around(text, token.span(), 100), text);
        assert_eq!(context_around(text, token.span(), 0), "@alice");
    }

    #[tokio::test]
    async fn stores_one_row_per_resolved_target() {
        let (state, store, mut rx) = seeded().await;
        save_news(store.as_ref(), 1).await;
        let text = "Great game @team:tsm and @player:shroud!";

        let stored = store_mentions(&state, store.as_ref(), text, news(1), 1).await;
        assert_eq!(stored, 2);

        let rows = store.mentions_in(news(1)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].mention_text, "@team:tsm");
        assert_eq!(rows[0].context.as_deref(), Some(text));
        assert_eq!(rx.try_recv().unwrap().mention.mentioned, EntityRef::new(EntityKind::Team, 1));
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn re_saving_is_idempotent() {
        let (state, store, mut rx) = seeded().await;
        save_news(store.as_ref(), 1).await;
        let text = "@alice @team:tsm";
        assert_eq!(store_mentions(&state, store.as_ref(), text, news(1), 1).await, 2);
        assert_eq!(store_mentions(&state, store.as_ref(), text, news(1), 1).await, 0);
        assert_eq!(store.mentions_in(news(1)).await.unwrap().len(), 2);

        while rx.try_recv().is_ok() {}
        assert_eq!(store_mentions(&state, store.as_ref(), text, news(1), 1).await, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unknown_and_inactive_targets_are_skipped() {
        let (state, store, _rx) = seeded().await;
        save_news(store.as_ref(), 1).await;
        let text = "@team:nobody @ghost @player:unknown me@example.com";
        assert_eq!(store_mentions(&state, store.as_ref(), text, news(1), 1).await, 0);
        assert!(store.mentions_in(news(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn spellings_of_one_target_store_once() {
        let (state, store, _rx) = seeded().await;
        save_news(store.as_ref(), 1).await;
        let text = "@team:tsm @team:TSM @player:shroud @player:grzesiek";
        assert_eq!(store_mentions(&state, store.as_ref(), text, news(1), 1).await, 2);
    }

    #[tokio::test]
    async fn editing_adds_and_removes_rows() {
        let (state, store, mut rx) = seeded().await;
        save_news(store.as_ref(), 1).await;
        store_mentions(&state, store.as_ref(), "@alice and @team:tsm", news(1), 1).await;
        while rx.try_recv().is_ok() {}

        let report =
            sync_mentions(&state, store.as_ref(), "@team:tsm and @player:shroud", news(1), 1).await;
        assert_eq!(report, SyncReport { stored: 1, removed: 1 });

        let notification = rx.try_recv().unwrap();
        assert_eq!(notification.mention.mentioned, EntityRef::new(EntityKind::Player, 1));
        assert!(rx.try_recv().is_err());

        let targets = targets_of(store.mentions_in(news(1)).await.unwrap());
        assert_eq!(
            targets,
            vec![EntityRef::new(EntityKind::Team, 1), EntityRef::new(EntityKind::Player, 1)]
        );
    }

    #[tokio::test]
    async fn read_state_survives_a_re_save() {
        let (state, store, _rx) = seeded().await;
        save_news(store.as_ref(), 1).await;
        store_mentions(&state, store.as_ref(), "hi @alice", news(1), 1).await;
        let id = store.mentions_in(news(1)).await.unwrap()[0].id;

        let receipt = mark_read(&state, id).await.unwrap();
        assert!(receipt.is_read);
        sync_mentions(&state, store.as_ref(), "hi again @alice", news(1), 1).await;

        let row = store.find_mention(id).await.unwrap().unwrap();
        assert!(row.is_read);
        assert_eq!(row.context.as_deref(), Some("hi @alice"));
        assert!(matches!(mark_read(&state, 999).await, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn preview_renders_without_storing() {
        let (state, store, _rx) = seeded().await;
        let view = preview(&state, "<b>@team:tsm</b> vs @team:c9 @player:Grzesiek")
            .await
            .unwrap();

        assert_eq!(view.tokens.len(), 3);
        assert_eq!(view.tokens[0].resolved, Some(EntityRef::new(EntityKind::Team, 1)));
        assert_eq!(view.tokens[1].resolved, None);
        assert_eq!(view.links.len(), 2);
        assert!(view.rendered.starts_with("&lt;b&gt;<a href=\"/teams/1\""));
        assert!(view.rendered.contains("@team:c9"));
        assert!(view.rendered.contains("href=\"/players/1\""));
        assert_eq!(store.count_mentions_of(EntityRef::new(EntityKind::Team, 1)).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn mention_feed_is_paginated_newest_first() {
        let (state, store, _rx) = seeded().await;
        for id in 1..=3 {
            save_news(store.as_ref(), id).await;
            store_mentions(&state, store.as_ref(), "gg @team:tsm", news(id), 1).await;
        }
        let tsm = EntityRef::new(EntityKind::Team, 1);

        let page = list_mentions_of(&state, tsm, PageRequest { page: 1, per_page: 2 })
            .await
            .unwrap();
        assert_eq!(page.pagination.total, 3);
        assert_eq!(page.pagination.last_page, 2);
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.data[0].mentionable, news(3));
        assert_eq!(page.data[0].author.name, "alice");
        let content = page.data[0].content.as_ref().unwrap();
        assert_eq!(content.title, "News 3");
        assert_eq!(content.url, "/news/3");

        let counts = mention_counts(&state, tsm).await.unwrap();
        assert_eq!((counts.total, counts.unread), (3, 3));

        let missing = EntityRef::new(EntityKind::Team, 42);
        assert!(matches!(
            mention_counts(&state, missing).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn stored_links_also_render_the_current_handle() {
        let (state, store, _rx) = seeded().await;
        save_news(store.as_ref(), 1).await;
        store_mentions(&state, store.as_ref(), "@player:GRZESIEK", news(1), 1).await;

        let links = links_for_content(store.as_ref(), news(1)).await;
        assert_eq!(links.links.len(), 1);
        let html = links.render("@player:shroud & @player:grzesiek", "");
        assert_eq!(html.matches("<a href=\"/players/1\"").count(), 2);
        assert!(html.contains(" &amp; "));
    }

    #[tokio::test]
    async fn mentions_of_deleted_content_are_dropped() {
        let (state, store, mut rx) = seeded().await;
        save_news(store.as_ref(), 1).await;
        store.delete_content(news(1)).await.unwrap();

        let report =
            sync_mentions(&state, store.as_ref(), "@alice @team:tsm", news(1), 1).await;
        assert_eq!(report, SyncReport::default());
        assert!(store.mentions_in(news(1)).await.unwrap().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_upserts_keep_the_other_targets() {
        let (state, store, mut rx) = seeded_flaky().await;
        save_news(store.as_ref(), 1).await;
        store.fail_upserts_for(EntityKind::Player);

        let stored =
            store_mentions(&state, store.as_ref(), "@team:tsm @player:shroud", news(1), 1).await;
        assert_eq!(stored, 1);
        assert_eq!(
            targets_of(store.mentions_in(news(1)).await.unwrap()),
            vec![EntityRef::new(EntityKind::Team, 1)]
        );
        assert_eq!(rx.try_recv().unwrap().mention.mentioned.kind, EntityKind::Team);
        assert!(rx.try_recv().is_err());

        // the next save picks up what failed before
        store.heal();
        let stored =
            store_mentions(&state, store.as_ref(), "@team:tsm @player:shroud", news(1), 1).await;
        assert_eq!(stored, 1);
    }

    #[tokio::test]
    async fn failed_lookup_skips_stale_cleanup() {
        let (state, store, mut rx) = seeded_flaky().await;
        save_news(store.as_ref(), 1).await;
        store_mentions(&state, store.as_ref(), "@alice @team:tsm", news(1), 1).await;
        while rx.try_recv().is_ok() {}

        store.fail_lookups_for(EntityKind::Player);
        let report =
            sync_mentions(&state, store.as_ref(), "@team:tsm @player:shroud", news(1), 1).await;
        assert_eq!(report, SyncReport { stored: 0, removed: 0 });
        assert_eq!(
            targets_of(store.mentions_in(news(1)).await.unwrap()),
            vec![EntityRef::new(EntityKind::User, 1), EntityRef::new(EntityKind::Team, 1)]
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn degraded_state_blocks_reads() {
        let (state, _rx) = AppState::new(AppConfig::default());
        assert!(matches!(
            preview(&state, "@alice").await,
            Err(ServiceError::Degraded)
        ));
    }
}
